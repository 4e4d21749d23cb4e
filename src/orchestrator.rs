//! Run orchestration: one source, end to end.
//!
//! fetch → skip-check → parse → diff → classify → transactional commit →
//! dispatch. Retries happen only at the fetch boundary and only for
//! retryable errors; a fatal error at any stage marks the run FAILED
//! (best-effort, outside the unit of work) and aborts the remaining
//! stages. Single-flight per source is enforced here so request-triggered
//! and scheduled runs share the same guarantee.

use crate::classifier::classify;
use crate::config::{Config, SourceConfig};
use crate::differ::diff_source;
use crate::error::PipelineError;
use crate::fetcher::{should_skip, Fetch};
use crate::notifier::Notifier;
use crate::parser::SanctionsParser;
use crate::repository::{Store, UnitOfWork};
use crate::schema::{
    ChangeEvent, ChangeType, ContentSnapshot, FetchResult, RiskLevel, RunStatus,
    SanctionedEntity, ScraperRun, Source,
};

use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Condensed outcome of one run, for callers and exit codes.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: String,
    pub source: Source,
    pub status: RunStatus,
    pub entities_processed: u64,
    pub entities_added: u64,
    pub entities_modified: u64,
    pub entities_removed: u64,
    pub error_message: Option<String>,
}

impl From<&ScraperRun> for RunReport {
    fn from(run: &ScraperRun) -> Self {
        RunReport {
            run_id: run.run_id.clone(),
            source: run.source,
            status: run.status,
            entities_processed: run.entities_processed,
            entities_added: run.entities_added,
            entities_modified: run.entities_modified,
            entities_removed: run.entities_removed,
            error_message: run.error_message.clone(),
        }
    }
}

struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<Source>>,
    source: Source,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(set: &'a Mutex<HashSet<Source>>, source: Source) -> Option<Self> {
        let mut in_flight = set.lock().unwrap();
        if !in_flight.insert(source) {
            return None;
        }
        Some(InFlightGuard { set, source })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set.lock().unwrap().remove(&self.source);
    }
}

pub struct Orchestrator<S: Store, F: Fetch> {
    config: Arc<Config>,
    store: Arc<S>,
    fetcher: Arc<F>,
    parsers: HashMap<Source, Arc<dyn SanctionsParser>>,
    notifier: Arc<Notifier>,
    in_flight: Mutex<HashSet<Source>>,
    limiter: Arc<Semaphore>,
}

impl<S: Store, F: Fetch> Orchestrator<S, F> {
    pub fn new(
        config: Arc<Config>,
        store: Arc<S>,
        fetcher: Arc<F>,
        parsers: HashMap<Source, Arc<dyn SanctionsParser>>,
        notifier: Arc<Notifier>,
    ) -> Self {
        let limiter = Arc::new(Semaphore::new(config.parallel_scrapers));
        Orchestrator {
            config,
            store,
            fetcher,
            parsers,
            notifier,
            in_flight: Mutex::new(HashSet::new()),
            limiter,
        }
    }

    /// Launch one run. Returns `Busy` immediately when a run for this
    /// source is already in flight; no run record is created in that
    /// case.
    pub async fn trigger(
        &self,
        source: Source,
        run_id: Option<String>,
    ) -> Result<RunReport, PipelineError> {
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight, source) else {
            info!(%source, "run already in flight, returning busy");
            return Err(PipelineError::Busy(source));
        };
        let _permit = self
            .limiter
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| PipelineError::Transaction("concurrency limiter closed".into()))?;

        let run_id = run_id.unwrap_or_else(|| {
            format!(
                "{}_{}",
                source.as_str().to_lowercase(),
                Utc::now().timestamp()
            )
        });
        let source_config = self.config.source(source).clone();

        let mut run = ScraperRun::begin(run_id.clone(), source, source_config.url.clone());
        self.store.create_run(&run).await?;
        info!(%source, run_id = %run_id, "run started");

        let deadline = Duration::from_secs(self.config.timeout_seconds);
        match tokio::time::timeout(deadline, self.execute(&mut run, source, &source_config)).await
        {
            Ok(Ok(report)) => Ok(report),
            Ok(Err(err)) => Ok(self.fail_run(run, &err).await),
            Err(_) => {
                let err = PipelineError::Timeout(self.config.timeout_seconds);
                Ok(self.fail_run(run, &err).await)
            }
        }
    }

    async fn execute(
        &self,
        run: &mut ScraperRun,
        source: Source,
        source_config: &SourceConfig,
    ) -> Result<RunReport, PipelineError> {
        // ── 1. Fetch (the only retry point) ──────────────────────
        let mut fetched = self.fetch_with_retry(run, source, &source_config.url).await?;
        run.content_hash = Some(fetched.content_hash.clone());
        run.content_size_bytes = Some(fetched.size_bytes);
        run.download_time_ms = Some(fetched.download_time_ms);

        // ── 2. Skip short-circuit ────────────────────────────────
        if should_skip(self.store.as_ref(), source, &fetched.content_hash).await? {
            run.complete_skipped(fetched.content_hash.clone(), fetched.download_time_ms);
            self.store.update_run(run).await?;
            info!(%source, run_id = %run.run_id, "content unchanged, run skipped");
            return Ok(RunReport::from(&*run));
        }

        // ── 3. Parse (CPU-bound, off the async runtime) ──────────
        let parser = self
            .parsers
            .get(&source)
            .cloned()
            .ok_or_else(|| PipelineError::Validation(format!("no parser registered for {source}")))?;
        let parse_started = Instant::now();
        let content = std::mem::take(&mut fetched.content);
        let outcome = tokio::task::spawn_blocking(move || parser.parse(&content))
            .await
            .map_err(|e| PipelineError::Parsing {
                src: source,
                reason: format!("parser task panicked: {e}"),
            })??;
        run.parsing_time_ms = Some(parse_started.elapsed().as_millis() as u64);

        if outcome.entities.len() < source_config.min_expected_entities {
            return Err(PipelineError::InvalidSourceData {
                src: source,
                count: outcome.entities.len(),
                floor: source_config.min_expected_entities,
            });
        }

        // ── 4. Diff + classify ───────────────────────────────────
        let diff_started = Instant::now();
        let previous = self.store.active_entities(source).await?;
        let changes = diff_source(&previous, &outcome.entities);
        let diff_time_ms = diff_started.elapsed().as_millis() as u64;
        run.diff_time_ms = Some(diff_time_ms);

        let detected_at = Utc::now();
        let events: Vec<ChangeEvent> = changes
            .iter()
            .map(|change| ChangeEvent {
                event_id: Uuid::new_v4(),
                entity_uid: change.uid.clone(),
                entity_name: change.entity_name.clone(),
                source,
                change_type: change.change_type,
                risk_level: classify(change),
                field_changes: change.field_changes.clone(),
                change_summary: change.summary(source),
                old_content_hash: change.old_content_hash.clone(),
                new_content_hash: change.new_content_hash.clone(),
                detected_at,
                scraper_run_id: run.run_id.clone(),
                processing_time_ms: Some(diff_time_ms),
                notification_sent_at: None,
                notification_channels: Vec::new(),
            })
            .collect();

        run.entities_processed = outcome.entities.len() as u64;
        for event in &events {
            match event.change_type {
                ChangeType::Added => run.entities_added += 1,
                ChangeType::Modified => run.entities_modified += 1,
                ChangeType::Removed => run.entities_removed += 1,
            }
            match event.risk_level {
                RiskLevel::Critical => run.critical_changes += 1,
                RiskLevel::High => run.high_risk_changes += 1,
                RiskLevel::Medium => run.medium_risk_changes += 1,
                RiskLevel::Low => run.low_risk_changes += 1,
            }
        }

        // ── 5. Atomic commit ─────────────────────────────────────
        let storage_started = Instant::now();
        let mut uow = self.store.begin().await?;
        let staged = self
            .stage_writes(&mut uow, run, source, &fetched, &outcome.entities, &events, storage_started)
            .await;
        if let Err(err) = staged {
            if let Err(rollback_err) = uow.rollback().await {
                warn!(%source, %rollback_err, "rollback after failed staging also failed");
            }
            return Err(err);
        }
        if let Err(err) = uow.commit().await {
            // the unit of work has already rolled itself back
            return Err(err);
        }
        info!(
            %source,
            run_id = %run.run_id,
            added = run.entities_added,
            modified = run.entities_modified,
            removed = run.entities_removed,
            "run committed"
        );

        // ── 6. Dispatch (outside the transaction) ────────────────
        if !events.is_empty() {
            let report = self.notifier.dispatch_run_changes(source, &events).await;
            if !report.notified_events.is_empty() {
                if let Err(err) = self
                    .store
                    .mark_events_notified(&report.notified_events, &report.channels, Utc::now())
                    .await
                {
                    warn!(%source, %err, "failed to mark events notified");
                }
            }
        }

        Ok(RunReport::from(&*run))
    }

    async fn fetch_with_retry(
        &self,
        run: &mut ScraperRun,
        source: Source,
        url: &str,
    ) -> Result<FetchResult, PipelineError> {
        let mut attempt: u32 = 0;
        loop {
            match self.fetcher.fetch(source, url).await {
                Ok(result) => return Ok(result),
                Err(err) if err.is_retryable() && attempt < self.config.max_retries => {
                    let delay = self.config.backoff_factor * f64::from(2u32.pow(attempt));
                    warn!(
                        %source,
                        attempt,
                        delay_secs = delay,
                        %err,
                        "fetch failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_secs_f64(delay)).await;
                    attempt += 1;
                    run.retry_count = attempt;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Buffer the four writes in persistence order: snapshot, change
    /// events, entity replacement, run record.
    #[allow(clippy::too_many_arguments)]
    async fn stage_writes(
        &self,
        uow: &mut S::Uow,
        run: &mut ScraperRun,
        source: Source,
        fetched: &FetchResult,
        entities: &[SanctionedEntity],
        events: &[ChangeEvent],
        storage_started: Instant,
    ) -> Result<(), PipelineError> {
        let snapshot = ContentSnapshot::new(
            source,
            fetched.content_hash.clone(),
            fetched.size_bytes,
            run.run_id.clone(),
        )?;
        uow.create_snapshot(snapshot).await?;
        uow.create_change_events(events.to_vec()).await?;
        uow.replace_source_data(source, entities.to_vec()).await?;

        run.storage_time_ms = Some(storage_started.elapsed().as_millis() as u64);
        run.complete_success();
        uow.update_run(run.clone()).await?;
        Ok(())
    }

    /// Best-effort FAILED record outside the unit of work.
    async fn fail_run(&self, mut run: ScraperRun, err: &PipelineError) -> RunReport {
        error!(
            source = %run.source,
            run_id = %run.run_id,
            code = err.code(),
            %err,
            "run failed"
        );
        run.complete_failed(err.run_message());
        if let Err(update_err) = self.store.update_run(&run).await {
            warn!(
                run_id = %run.run_id,
                %update_err,
                "failed to record run failure"
            );
        }
        RunReport::from(&run)
    }
}

// ── Tests ───────────────────────────────────────────────────────
