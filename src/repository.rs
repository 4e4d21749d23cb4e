//! Storage contracts consumed by the pipeline.
//!
//! `Store` is the query side plus the transaction factory; `UnitOfWork`
//! is the write side for exactly one run, committing the snapshot, the
//! change events, the entity replacement, and the run record atomically.
//! Concrete backends are pluggable; the in-memory implementation in
//! `store::memory` is first-class and shared by runtime and tests.

use crate::error::PipelineError;
use crate::schema::{
    ChangeEvent, ChangeType, ChannelKind, ContentSnapshot, RiskLevel, SanctionedEntity,
    ScraperRun, Source,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

/// Outcome of a full-source entity replacement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaceCounts {
    pub added: u64,
    pub updated: u64,
    pub removed: u64,
}

/// Aggregate health composed of each collection's probe.
#[derive(Debug, Clone, Default)]
pub struct StoreHealth {
    pub healthy: bool,
    pub entities_ok: bool,
    pub change_events_ok: bool,
    pub scraper_runs_ok: bool,
    pub content_snapshots_ok: bool,
    pub active_entities: u64,
    pub total_entities: u64,
}

/// Write transaction spanning the four collections for one run.
///
/// Construction is `begin`; operations buffer until `commit`, which
/// validates then applies all-or-nothing. After `commit` or `rollback`
/// every further operation is rejected. A failed commit rolls back
/// automatically; both outcomes are final.
#[async_trait]
pub trait UnitOfWork: Send {
    async fn create_snapshot(&mut self, snapshot: ContentSnapshot) -> Result<(), PipelineError>;

    async fn create_change_events(&mut self, events: Vec<ChangeEvent>)
        -> Result<(), PipelineError>;

    /// Upsert all provided entities for the source and soft-delete the
    /// ones no longer present. Counts are computed against the state
    /// visible when the transaction began.
    async fn replace_source_data(
        &mut self,
        source: Source,
        entities: Vec<SanctionedEntity>,
    ) -> Result<ReplaceCounts, PipelineError>;

    async fn update_run(&mut self, run: ScraperRun) -> Result<(), PipelineError>;

    async fn commit(&mut self) -> Result<(), PipelineError>;

    async fn rollback(&mut self) -> Result<(), PipelineError>;
}

#[async_trait]
pub trait Store: Send + Sync + 'static {
    type Uow: UnitOfWork;

    async fn begin(&self) -> Result<Self::Uow, PipelineError>;

    /// Insert a RUNNING run record. `run_id` must be globally unique.
    async fn create_run(&self, run: &ScraperRun) -> Result<(), PipelineError>;

    /// Upsert by run_id outside a unit of work (best-effort failure
    /// records). Status transitions are validated.
    async fn update_run(&self, run: &ScraperRun) -> Result<(), PipelineError>;

    /// Active entities for a source, the differ's prior snapshot.
    async fn active_entities(&self, source: Source)
        -> Result<Vec<SanctionedEntity>, PipelineError>;

    /// Hash of the most recent content snapshot for the source.
    async fn last_content_hash(&self, source: Source) -> Result<Option<String>, PipelineError>;

    async fn last_successful_run(
        &self,
        source: Source,
    ) -> Result<Option<ScraperRun>, PipelineError>;

    async fn recent_runs(
        &self,
        hours: i64,
        source: Option<Source>,
    ) -> Result<Vec<ScraperRun>, PipelineError>;

    async fn recent_events(
        &self,
        days: i64,
        source: Option<Source>,
        risk_level: Option<RiskLevel>,
    ) -> Result<Vec<ChangeEvent>, PipelineError>;

    async fn count_events_by_risk(
        &self,
        since: DateTime<Utc>,
        source: Option<Source>,
    ) -> Result<HashMap<RiskLevel, u64>, PipelineError>;

    async fn count_events_by_change_type(
        &self,
        since: DateTime<Utc>,
        source: Option<Source>,
    ) -> Result<HashMap<ChangeType, u64>, PipelineError>;

    async fn events_by_risk(
        &self,
        risk_level: RiskLevel,
        since: DateTime<Utc>,
    ) -> Result<Vec<ChangeEvent>, PipelineError>;

    /// Post-dispatch bookkeeping, deliberately outside the run's
    /// transaction.
    async fn mark_events_notified(
        &self,
        event_ids: &[Uuid],
        channels: &[ChannelKind],
        sent_at: DateTime<Utc>,
    ) -> Result<(), PipelineError>;

    async fn health(&self) -> StoreHealth;
}
