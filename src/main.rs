//! Binary entrypoint.
//!
//! `sanctions-sentinel serve` runs the scheduler loop; `sanctions-sentinel
//! run <SOURCE>` executes one run and exits with 0 on SUCCESS/SKIPPED,
//! 1 on FAILED. Invalid configuration or usage exits with 2.

use sanctions_sentinel::config::Config;
use sanctions_sentinel::fetcher::HttpFetcher;
use sanctions_sentinel::notifier::Notifier;
use sanctions_sentinel::orchestrator::Orchestrator;
use sanctions_sentinel::parser::build_registry;
use sanctions_sentinel::scheduler::Scheduler;
use sanctions_sentinel::schema::{RunStatus, Source};
use sanctions_sentinel::store::memory::MemoryStore;

use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const EXIT_FAILED: i32 = 1;
const EXIT_BAD_CONFIG: i32 = 2;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => Arc::new(config),
        Err(err) => {
            error!("invalid configuration: {err:#}");
            std::process::exit(EXIT_BAD_CONFIG);
        }
    };

    let fetcher = match HttpFetcher::new(&config) {
        Ok(fetcher) => Arc::new(fetcher),
        Err(err) => {
            error!("invalid configuration: {err}");
            std::process::exit(EXIT_BAD_CONFIG);
        }
    };

    let store = Arc::new(MemoryStore::new());
    let notifier = Arc::new(Notifier::from_config(&config.notifier));
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&config),
        Arc::clone(&store),
        fetcher,
        build_registry(),
        Arc::clone(&notifier),
    ));
    let scheduler = Scheduler::new(config, store, orchestrator, notifier);

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        None | Some("serve") => {
            scheduler.run_forever().await;
        }
        Some("run") => {
            let Some(source) = args.get(1).and_then(|raw| Source::parse(raw)) else {
                error!("usage: sanctions-sentinel run <OFAC|UN|EU|UK_HMT>");
                std::process::exit(EXIT_BAD_CONFIG);
            };
            match scheduler.trigger_now(source, None).await {
                Ok(report) => {
                    info!(
                        run_id = %report.run_id,
                        status = %report.status,
                        added = report.entities_added,
                        modified = report.entities_modified,
                        removed = report.entities_removed,
                        "run complete"
                    );
                    if !matches!(report.status, RunStatus::Success | RunStatus::Skipped) {
                        std::process::exit(EXIT_FAILED);
                    }
                }
                Err(err) => {
                    error!(code = err.code(), "run aborted: {err}");
                    std::process::exit(EXIT_FAILED);
                }
            }
        }
        Some(other) => {
            error!("unknown command {other:?}; expected \"serve\" or \"run <SOURCE>\"");
            std::process::exit(EXIT_BAD_CONFIG);
        }
    }
}
