use crate::demo::{run_demo, run_registry_ingest, DemoArgs, RegistryIngestArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use dnc_scrub::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "DNC Scrub Service",
    about = "Run and demonstrate do-not-call compliance scrubbing from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Work with registry change-list files
    Registry {
        #[command(subcommand)]
        command: RegistryCommand,
    },
    /// Seed a registry, scrub a sample batch and print the classified result
    Demo(DemoArgs),
}

#[derive(Subcommand, Debug)]
enum RegistryCommand {
    /// Validate and apply a change-list CSV against a fresh registry
    Ingest(RegistryIngestArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Registry {
            command: RegistryCommand::Ingest(args),
        } => run_registry_ingest(args),
        Command::Demo(args) => run_demo(args).await,
    }
}
