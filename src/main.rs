use clap::Parser;
use destlist_cleanup::adapters::StdinConfirmation;
use destlist_cleanup::config::cli::CliArgs;
use destlist_cleanup::domain::ports::ListApi;
use destlist_cleanup::utils::validation::Validate;
use destlist_cleanup::{
    CleanupConfig, CleanupError, CleanupWorkflow, FileReportSink, HttpListClient,
    HttpTelemetryClient, LocalStorage,
};
use std::sync::Arc;

/// Exit code for a run stopped by Ctrl-C.
const EXIT_CANCELLED: i32 = 130;

fn fail(e: &CleanupError) -> ! {
    tracing::error!("❌ {}", e);
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());
    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 {}", e.recovery_suggestion());
    std::process::exit(if e.is_cancelled() { EXIT_CANCELLED } else { 1 });
}

fn load_config(args: &CliArgs) -> Result<CleanupConfig, CleanupError> {
    let mut config = CleanupConfig::from_file(&args.config)?;
    args.apply_to(&mut config);
    if args.list_lists {
        config.validate_list_access()?;
    } else {
        config.validate()?;
    }
    Ok(config)
}

async fn print_lists(client: &HttpListClient) -> Result<(), CleanupError> {
    let lists = client
        .list_lists()
        .await
        .map_err(|e| CleanupError::ProcessingError {
            message: format!("Could not read the list index: {}", e),
        })?;

    if lists.is_empty() {
        println!("No destination lists found");
    }
    for list in &lists {
        match list.destination_count {
            Some(count) => println!("{}\t{}\t{} destinations", list.id, list.name, count),
            None => println!("{}\t{}", list.id, list.name),
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();

    args.log_settings().init();

    tracing::info!("Starting destlist-cleanup");
    if args.verbose {
        tracing::debug!("CLI args: {:?}", args);
    }

    let config = match load_config(&args) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            tracing::error!("❌ Configuration validation failed");
            fail(&e);
        }
    };

    if args.list_lists {
        let client = match HttpListClient::new(config.clone()) {
            Ok(client) => client,
            Err(e) => fail(&e),
        };
        if let Err(e) = print_lists(&client).await {
            fail(&e);
        }
        return;
    }

    if config.dry_run() {
        tracing::info!("🔍 Dry-run mode: nothing will be deleted");
    } else {
        tracing::warn!("⚠️ Live mode: confirmed deletions will be submitted");
    }

    let list_api = match HttpListClient::new(config.clone()) {
        Ok(client) => client,
        Err(e) => fail(&e),
    };
    let telemetry_api = if config.crosscheck_enabled() {
        match HttpTelemetryClient::new(&config) {
            Ok(client) => Some(client),
            Err(e) => fail(&e),
        }
    } else {
        None
    };

    let workflow = CleanupWorkflow::new(config.clone(), list_api, telemetry_api);

    let cancel = workflow.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("🛑 Interrupt received; stopping the run");
            cancel.cancel();
        }
    });

    let sink = FileReportSink::new(LocalStorage::new("."), config.output_path());
    let confirmation = StdinConfirmation::stdin();

    match workflow.run(chrono::Utc::now(), &confirmation, &sink).await {
        Ok(summary) => {
            let s = &summary.report.summary;
            println!("✅ Cleanup run finished");
            println!(
                "   fetched {} | rejected {} | keep {} | flag {} | delete candidates {}",
                s.total_fetched, s.rejected_malformed, s.kept, s.flagged, s.delete_candidates
            );
            println!(
                "   deleted {} | dry-run {} | failed {} | cancelled {}",
                s.deleted, s.skipped_dry_run, s.failed, s.cancelled
            );
            if summary.report.confirmation_denied {
                println!("🛑 Deletion was not confirmed; no entries were removed");
            }
            println!("📁 Audit report saved to: {}", summary.report_location);

            if summary.was_cancelled() {
                eprintln!("🛑 Run interrupted; unissued batches are marked CANCELLED");
                std::process::exit(EXIT_CANCELLED);
            }
            if summary.any_batch_failed() {
                eprintln!("⚠️ Some deletion batches failed; see the audit report");
                std::process::exit(2);
            }
        }
        Err(e) if !e.is_fatal() => {
            tracing::warn!("{}", e.user_friendly_message());
        }
        Err(e) => fail(&e),
    }
}
