use crate::infra::{parse_date, InMemoryChangeListLedger, InMemoryScrubJobRepository};
use chrono::{Duration, Local, NaiveDate};
use clap::Args;
use dnc_scrub::config::{AppConfig, ScrubConfig};
use dnc_scrub::error::AppError;
use dnc_scrub::workflows::registry::{
    parse_change_list_file, AreaCode, AuthorizedScope, ChangeListEntry, ChangeListIngestor,
    ChangeListRequest, IngestOutcome, RegistrySource, RegistryStore, StateCode, UserId,
};
use dnc_scrub::workflows::scrub::{
    NoExistingLeads, RawLeadRecord, ScoredLead, ScrubJobService, ScrubResult, ScrubSubmission,
};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Worker count for the scrub fan-out (defaults to the configured value)
    #[arg(long)]
    pub(crate) workers: Option<usize>,
    /// Reference date used to age the seeded registry listings (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub(crate) today: Option<NaiveDate>,
    /// Print every score component behind each classification
    #[arg(long, default_value_t = false)]
    pub(crate) show_components: bool,
}

#[derive(Args, Debug)]
pub(crate) struct RegistryIngestArgs {
    /// Change-list CSV with `area_code,phone_number` rows
    #[arg(long)]
    pub(crate) file: PathBuf,
    /// `additions` or `deletions`
    #[arg(long, default_value = "additions")]
    pub(crate) change_type: String,
    /// `national`, `litigator` or `state:<XX>` (defaults to national)
    #[arg(long)]
    pub(crate) source: Option<String>,
    /// Area codes named in the change-list header
    #[arg(long = "area-code", required = true, num_args = 1..)]
    pub(crate) area_codes: Vec<String>,
    /// Upstream file date (YYYY-MM-DD, defaults to today)
    #[arg(long, value_parser = parse_date)]
    pub(crate) file_date: Option<NaiveDate>,
    /// Explicit idempotency fingerprint for the change list
    #[arg(long)]
    pub(crate) fingerprint: Option<String>,
}

pub(crate) fn run_registry_ingest(args: RegistryIngestArgs) -> Result<(), AppError> {
    let RegistryIngestArgs {
        file,
        change_type,
        source,
        area_codes,
        file_date,
        fingerprint,
    } = args;

    let config = AppConfig::load()?;
    let entries = parse_change_list_file(&file)?;

    // A standalone store has no subscription of its own; fall back to the header's codes.
    let subscribed: Vec<AreaCode> = if config.scrub.subscribed_area_codes.is_empty() {
        area_codes
            .iter()
            .filter_map(|raw| AreaCode::parse(raw).ok())
            .collect()
    } else {
        config.scrub.subscribed_area_codes.clone()
    };

    let store = Arc::new(RegistryStore::new());
    let ingestor = ChangeListIngestor::new(
        Arc::clone(&store),
        Arc::new(InMemoryChangeListLedger::default()),
        subscribed,
    );
    let request = ChangeListRequest {
        change_type,
        source,
        area_codes,
        source_file_date: file_date.unwrap_or_else(|| Local::now().date_naive()),
        fingerprint,
        submitted_by: UserId("cli".to_string()),
    };

    println!("Registry change-list ingest");
    println!("File: {} ({} rows)", file.display(), entries.len());
    let outcome = ingestor.ingest(request, entries)?;
    render_ingest_outcome(&outcome);

    if let Ok(snapshot) = store.snapshot() {
        println!(
            "Registry snapshot v{} holds {} active listings",
            snapshot.version(),
            snapshot.active_count()
        );
    }
    Ok(())
}

fn render_ingest_outcome(outcome: &IngestOutcome) {
    match outcome {
        IngestOutcome::Applied { change_list } | IngestOutcome::Failed { change_list } => {
            let report = &change_list.report;
            println!(
                "- {} {} ({} {}) -> {}",
                change_list.id,
                outcome.label(),
                change_list.change_type.label(),
                change_list.source,
                change_list.status.label()
            );
            println!(
                "  {} entries | {} added | {} removed | {} unchanged",
                report.entries, report.added, report.removed, report.unchanged
            );
            if report.failures.is_empty() {
                println!("  Entry failures: none");
            } else {
                println!("  Entry failures:");
                for failure in &report.failures {
                    println!(
                        "    - row {} ({} / {}): {}",
                        failure.index, failure.area_code, failure.phone, failure.reason
                    );
                }
            }
        }
        IngestOutcome::Rejected { reason } => {
            println!("- change list rejected: {}", reason);
        }
        IngestOutcome::Duplicate { existing_id } => {
            println!("- change list already ingested as {}", existing_id);
        }
    }
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        workers,
        today,
        show_components,
    } = args;

    let today = today.unwrap_or_else(|| Local::now().date_naive());
    let mut config = ScrubConfig::default();
    if let Some(workers) = workers {
        config.worker_count = workers.max(1);
    }

    println!("DNC scrub demo");
    let store = Arc::new(RegistryStore::new());
    let ingestor = ChangeListIngestor::new(
        Arc::clone(&store),
        Arc::new(InMemoryChangeListLedger::default()),
        ["801", "385"].iter().filter_map(|raw| AreaCode::parse(raw).ok()),
    );

    println!("\nSeeding registry");
    let seeds = [
        ("national", today - Duration::days(420), vec!["8015550101", "3855550104"]),
        ("litigator", today - Duration::days(12), vec!["8015550103"]),
        ("state:UT", today - Duration::days(9), vec!["3855550102", "8015550101"]),
    ];
    for (source, file_date, phones) in seeds {
        let (request, entries) = demo_change_list(source, file_date, &phones);
        let outcome = ingestor.ingest(request, entries)?;
        render_ingest_outcome(&outcome);
    }

    let service = Arc::new(ScrubJobService::new(
        Arc::new(InMemoryScrubJobRepository::default()),
        Arc::clone(&store),
        Arc::new(NoExistingLeads),
        &config,
    ));

    let job = service.submit(ScrubSubmission {
        requested_by: UserId("demo-analyst".to_string()),
        scope: demo_scope(),
        records: demo_batch(today),
    })?;
    println!(
        "\nSubmitted {} for batch {} ({} records, {} workers)",
        job.id, job.batch_id, job.total_records, config.worker_count
    );

    let finished = service.run(&job.id).await?;
    let view = finished.status_view();
    println!(
        "Job {} -> {} ({}/{} processed)",
        view.job_id, view.status, view.processed_count, view.total_count
    );
    if let Some(failure) = &finished.failure {
        println!("  Failure: {} ({})", failure.reason.label(), failure.detail);
        return Ok(());
    }

    let result = service.result(&job.id)?;
    render_result(&result, show_components);
    Ok(())
}

fn render_result(result: &ScrubResult, show_components: bool) {
    let counts = &result.counts;
    println!(
        "\nSummary: {} clean | {} caution | {} blocked | {} invalid | {} duplicates removed",
        counts.clean, counts.caution, counts.blocked, counts.invalid, counts.duplicates_removed
    );

    for (heading, leads) in [
        ("Blocked", &result.blocked),
        ("Caution", &result.caution),
        ("Clean", &result.clean),
    ] {
        if leads.is_empty() {
            println!("\n{}: none", heading);
            continue;
        }
        println!("\n{}", heading);
        for lead in leads {
            render_lead(lead, show_components);
        }
    }

    if !result.invalid.is_empty() {
        println!("\nInvalid rows");
        for invalid in &result.invalid {
            println!(
                "- row {} '{}': {}",
                invalid.input_index, invalid.raw_phone, invalid.reason
            );
        }
    }
}

fn render_lead(lead: &ScoredLead, show_components: bool) {
    let flags: Vec<String> = lead
        .assessment
        .flags
        .iter()
        .map(|flag| flag.label())
        .collect();
    println!(
        "- {} score {} [{}] rows {:?}",
        lead.record.phone_key,
        lead.assessment.score,
        if flags.is_empty() {
            "no flags".to_string()
        } else {
            flags.join(", ")
        },
        lead.merged_indices
    );
    if show_components {
        for component in &lead.assessment.components {
            println!(
                "    - {:?}: {} ({})",
                component.factor, component.points, component.notes
            );
        }
    }
}

fn demo_change_list(
    source: &str,
    file_date: NaiveDate,
    phones: &[&str],
) -> (ChangeListRequest, Vec<ChangeListEntry>) {
    let entries: Vec<ChangeListEntry> = phones
        .iter()
        .map(|phone| ChangeListEntry {
            area_code: phone[..3].to_string(),
            phone: phone.to_string(),
        })
        .collect();
    let area_codes: BTreeSet<String> = entries.iter().map(|entry| entry.area_code.clone()).collect();

    let request = ChangeListRequest {
        change_type: "additions".to_string(),
        source: Some(source.to_string()),
        area_codes: area_codes.into_iter().collect(),
        source_file_date: file_date,
        fingerprint: None,
        submitted_by: UserId("demo-registry-sync".to_string()),
    };
    (request, entries)
}

fn demo_scope() -> AuthorizedScope {
    let mut sources = BTreeSet::from([RegistrySource::National, RegistrySource::Litigator]);
    if let Some(utah) = StateCode::parse("UT") {
        sources.insert(RegistrySource::State(utah));
    }
    AuthorizedScope {
        area_codes: ["801", "385"]
            .iter()
            .filter_map(|raw| AreaCode::parse(raw).ok())
            .collect(),
        sources,
        max_records: 500,
    }
}

fn demo_batch(today: NaiveDate) -> Vec<RawLeadRecord> {
    let recent_contact = (today - Duration::days(20)).format("%Y-%m-%d").to_string();
    vec![
        RawLeadRecord {
            name: Some("Dana Whitaker".to_string()),
            state: Some("UT".to_string()),
            ..RawLeadRecord::with_phone("(801) 555-0100")
        },
        RawLeadRecord {
            state: Some("UT".to_string()),
            last_contact_date: Some(recent_contact),
            ..RawLeadRecord::with_phone("801-555-0101")
        },
        RawLeadRecord {
            name: Some("Dana Whitaker".to_string()),
            email: Some("Dana@Example.com".to_string()),
            ..RawLeadRecord::with_phone("8015550100")
        },
        RawLeadRecord {
            state: Some("UT".to_string()),
            ..RawLeadRecord::with_phone("385.555.0102")
        },
        RawLeadRecord::with_phone("801 555 0103"),
        RawLeadRecord::with_phone("3855550104"),
        RawLeadRecord::with_phone("(415) 555-0199"),
        RawLeadRecord::with_phone("555-0100"),
    ]
}
