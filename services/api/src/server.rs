use crate::cli::ServeArgs;
use crate::infra::{AppState, InMemoryChangeListLedger, InMemoryScrubJobRepository};
use crate::routes::with_scrub_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use dnc_scrub::config::AppConfig;
use dnc_scrub::error::AppError;
use dnc_scrub::telemetry;
use dnc_scrub::workflows::registry::{ChangeListIngestor, RegistryStore};
use dnc_scrub::workflows::scrub::{NoExistingLeads, ScrubJobService};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let registry = Arc::new(RegistryStore::new());
    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
        registry: Arc::clone(&registry),
    };

    let ingestor = Arc::new(ChangeListIngestor::new(
        Arc::clone(&registry),
        Arc::new(InMemoryChangeListLedger::default()),
        config.scrub.subscribed_area_codes.iter().cloned(),
    ));
    let scrub_service = Arc::new(ScrubJobService::new(
        Arc::new(InMemoryScrubJobRepository::default()),
        registry,
        Arc::new(NoExistingLeads),
        &config.scrub,
    ));

    let app = with_scrub_routes(scrub_service, ingestor)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        workers = config.scrub.worker_count,
        subscribed = config.scrub.subscribed_area_codes.len(),
        "dnc scrub service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
