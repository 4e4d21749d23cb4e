//! Cadence loop driving per-source runs.
//!
//! Every tick, sources whose interval has elapsed since their last
//! attempt are launched (the orchestrator enforces single-flight and the
//! global concurrency ceiling). A calendar-day rollover flushes the
//! MEDIUM/LOW digest queue.

use crate::config::Config;
use crate::error::PipelineError;
use crate::fetcher::Fetch;
use crate::notifier::Notifier;
use crate::orchestrator::{Orchestrator, RunReport};
use crate::repository::Store;
use crate::schema::Source;

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

pub struct Scheduler<S: Store, F: Fetch> {
    config: Arc<Config>,
    store: Arc<S>,
    orchestrator: Arc<Orchestrator<S, F>>,
    notifier: Arc<Notifier>,
}

/// A source is due when it has never been attempted or its configured
/// interval has elapsed since the last attempt.
fn is_due(last_attempt: Option<DateTime<Utc>>, now: DateTime<Utc>, interval_hours: u64) -> bool {
    match last_attempt {
        None => true,
        Some(last) => now - last >= ChronoDuration::hours(interval_hours as i64),
    }
}

impl<S: Store, F: Fetch> Scheduler<S, F> {
    pub fn new(
        config: Arc<Config>,
        store: Arc<S>,
        orchestrator: Arc<Orchestrator<S, F>>,
        notifier: Arc<Notifier>,
    ) -> Self {
        Scheduler {
            config,
            store,
            orchestrator,
            notifier,
        }
    }

    /// Request-triggered run, same path as the cadence loop.
    pub async fn trigger_now(
        &self,
        source: Source,
        run_id: Option<String>,
    ) -> Result<RunReport, PipelineError> {
        self.orchestrator.trigger(source, run_id).await
    }

    pub async fn run_forever(&self) {
        let mut tick = tokio::time::interval(Duration::from_secs(self.config.tick_seconds));
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut last_attempt = self.seed_last_attempts().await;
        let mut last_digest_day = Utc::now().date_naive();
        info!(
            tick_seconds = self.config.tick_seconds,
            "scheduler started"
        );

        loop {
            tick.tick().await;
            self.tick(&mut last_attempt).await;
            last_digest_day = self.maybe_flush_digest(last_digest_day).await;
        }
    }

    /// Resume cadence from persisted history so a restart does not
    /// immediately re-run every source.
    async fn seed_last_attempts(&self) -> HashMap<Source, DateTime<Utc>> {
        let lookback_hours = self
            .config
            .sources
            .values()
            .map(|s| s.interval_hours)
            .max()
            .unwrap_or(24) as i64
            * 2;
        let mut seeded = HashMap::new();
        for source in Source::ALL {
            match self.store.recent_runs(lookback_hours, Some(source)).await {
                Ok(runs) => {
                    if let Some(latest) = runs.first() {
                        seeded.insert(source, latest.started_at);
                    }
                }
                Err(err) => warn!(%source, %err, "failed to load run history"),
            }
        }
        seeded
    }

    async fn tick(&self, last_attempt: &mut HashMap<Source, DateTime<Utc>>) {
        let now = Utc::now();
        for source in Source::ALL {
            let interval_hours = self.config.source(source).interval_hours;
            if !is_due(last_attempt.get(&source).copied(), now, interval_hours) {
                continue;
            }
            last_attempt.insert(source, now);

            let orchestrator = Arc::clone(&self.orchestrator);
            tokio::spawn(async move {
                match orchestrator.trigger(source, None).await {
                    Ok(report) => info!(
                        %source,
                        run_id = %report.run_id,
                        status = %report.status,
                        "scheduled run finished"
                    ),
                    Err(err) => warn!(%source, %err, "scheduled run not started"),
                }
            });
        }
    }

    async fn maybe_flush_digest(&self, last_digest_day: NaiveDate) -> NaiveDate {
        let today = Utc::now().date_naive();
        if today == last_digest_day {
            return last_digest_day;
        }
        if let Some(report) = self.notifier.send_digest().await {
            info!(
                events = report.notified_events.len(),
                errors = report.channel_errors.len(),
                "daily digest dispatched"
            );
            if !report.notified_events.is_empty() {
                if let Err(err) = self
                    .store
                    .mark_events_notified(&report.notified_events, &report.channels, Utc::now())
                    .await
                {
                    warn!(%err, "failed to mark digest events notified");
                }
            }
        }
        today
    }
}

// ── Tests ───────────────────────────────────────────────────────
