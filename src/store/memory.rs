//! In-memory store.
//!
//! First-class implementation of the repository contracts: the runtime
//! default for single-process deployments and the fake every test drives.
//! All four collections live behind one mutex; a unit of work buffers
//! its writes and applies them under a single lock acquisition at commit,
//! validate-first, so a failed commit leaves no partial state behind.

use crate::error::PipelineError;
use crate::repository::{ReplaceCounts, Store, StoreHealth, UnitOfWork};
use crate::schema::{
    ChangeEvent, ChangeType, ChannelKind, ContentSnapshot, RiskLevel, RunStatus,
    SanctionedEntity, ScraperRun, Source,
};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tracing::debug;
use uuid::Uuid;

#[derive(Default)]
struct MemoryState {
    entities: HashMap<Source, HashMap<String, SanctionedEntity>>,
    events: Vec<ChangeEvent>,
    runs: HashMap<String, ScraperRun>,
    snapshots: Vec<ContentSnapshot>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }
}

fn transition_check(existing: Option<&ScraperRun>, incoming: &ScraperRun) -> Result<(), PipelineError> {
    incoming
        .validate()
        .map_err(|e| PipelineError::Transaction(e.to_string()))?;
    if let Some(existing) = existing {
        if !existing.status.can_transition_to(incoming.status) {
            return Err(PipelineError::Transaction(format!(
                "run {} cannot move from {} to {}",
                incoming.run_id, existing.status, incoming.status
            )));
        }
    }
    Ok(())
}

impl MemoryState {
    fn apply_replace(&mut self, source: Source, entities: Vec<SanctionedEntity>) {
        let now = Utc::now();
        let map = self.entities.entry(source).or_default();
        let incoming_uids: HashSet<String> = entities.iter().map(|e| e.uid.clone()).collect();

        for mut entity in entities {
            if let Some(existing) = map.get(&entity.uid) {
                entity.created_at = existing.created_at;
            }
            entity.updated_at = now;
            entity.last_seen = Some(now);
            entity.is_active = true;
            map.insert(entity.uid.clone(), entity);
        }

        for (uid, existing) in map.iter_mut() {
            if existing.is_active && !incoming_uids.contains(uid) {
                existing.is_active = false;
                existing.updated_at = now;
            }
        }
    }
}

// ── Unit of work ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UowPhase {
    Active,
    Committed,
    RolledBack,
}

enum PendingWrite {
    Snapshot(ContentSnapshot),
    Events(Vec<ChangeEvent>),
    Replace {
        source: Source,
        entities: Vec<SanctionedEntity>,
    },
    Run(ScraperRun),
}

pub struct MemoryUnitOfWork {
    state: Arc<Mutex<MemoryState>>,
    pending: Vec<PendingWrite>,
    phase: UowPhase,
}

impl MemoryUnitOfWork {
    fn ensure_active(&self, operation: &str) -> Result<(), PipelineError> {
        match self.phase {
            UowPhase::Active => Ok(()),
            UowPhase::Committed => Err(PipelineError::Transaction(format!(
                "{operation} rejected: transaction already committed"
            ))),
            UowPhase::RolledBack => Err(PipelineError::Transaction(format!(
                "{operation} rejected: transaction already rolled back"
            ))),
        }
    }

    fn abort(&mut self) {
        self.pending.clear();
        self.phase = UowPhase::RolledBack;
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn create_snapshot(&mut self, snapshot: ContentSnapshot) -> Result<(), PipelineError> {
        self.ensure_active("create_snapshot")?;
        self.pending.push(PendingWrite::Snapshot(snapshot));
        Ok(())
    }

    async fn create_change_events(
        &mut self,
        events: Vec<ChangeEvent>,
    ) -> Result<(), PipelineError> {
        self.ensure_active("create_change_events")?;
        self.pending.push(PendingWrite::Events(events));
        Ok(())
    }

    async fn replace_source_data(
        &mut self,
        source: Source,
        entities: Vec<SanctionedEntity>,
    ) -> Result<ReplaceCounts, PipelineError> {
        self.ensure_active("replace_source_data")?;

        // counts against the committed state; the mutation itself waits
        // for commit
        let counts = {
            let state = self.state.lock().unwrap();
            let current = state.entities.get(&source);
            let incoming_uids: HashSet<&str> = entities.iter().map(|e| e.uid.as_str()).collect();
            let mut counts = ReplaceCounts::default();
            for entity in &entities {
                match current.and_then(|m| m.get(&entity.uid)) {
                    Some(_) => counts.updated += 1,
                    None => counts.added += 1,
                }
            }
            if let Some(current) = current {
                counts.removed = current
                    .values()
                    .filter(|e| e.is_active && !incoming_uids.contains(e.uid.as_str()))
                    .count() as u64;
            }
            counts
        };

        self.pending.push(PendingWrite::Replace { source, entities });
        Ok(counts)
    }

    async fn update_run(&mut self, run: ScraperRun) -> Result<(), PipelineError> {
        self.ensure_active("update_run")?;
        self.pending.push(PendingWrite::Run(run));
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), PipelineError> {
        self.ensure_active("commit")?;

        let mut state = self.state.lock().unwrap();

        // validate everything before touching state; a failed commit
        // auto-rolls-back and leaves nothing applied
        let invalid = self.pending.iter().find_map(|write| match write {
            PendingWrite::Run(run) => transition_check(state.runs.get(&run.run_id), run).err(),
            _ => None,
        });
        if let Some(err) = invalid {
            drop(state);
            self.abort();
            return Err(err);
        }

        for write in self.pending.drain(..) {
            match write {
                PendingWrite::Snapshot(snapshot) => state.snapshots.push(snapshot),
                PendingWrite::Events(events) => state.events.extend(events),
                PendingWrite::Replace { source, entities } => {
                    state.apply_replace(source, entities)
                }
                PendingWrite::Run(run) => {
                    state.runs.insert(run.run_id.clone(), run);
                }
            }
        }

        self.phase = UowPhase::Committed;
        debug!("unit of work committed");
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), PipelineError> {
        self.ensure_active("rollback")?;
        self.abort();
        Ok(())
    }
}

// ── Store ───────────────────────────────────────────────────────

#[async_trait]
impl Store for MemoryStore {
    type Uow = MemoryUnitOfWork;

    async fn begin(&self) -> Result<Self::Uow, PipelineError> {
        Ok(MemoryUnitOfWork {
            state: Arc::clone(&self.state),
            pending: Vec::new(),
            phase: UowPhase::Active,
        })
    }

    async fn create_run(&self, run: &ScraperRun) -> Result<(), PipelineError> {
        run.validate()?;
        let mut state = self.state.lock().unwrap();
        if state.runs.contains_key(&run.run_id) {
            return Err(PipelineError::Database(format!(
                "run_id {} already exists",
                run.run_id
            )));
        }
        state.runs.insert(run.run_id.clone(), run.clone());
        Ok(())
    }

    async fn update_run(&self, run: &ScraperRun) -> Result<(), PipelineError> {
        let mut state = self.state.lock().unwrap();
        transition_check(state.runs.get(&run.run_id), run)?;
        state.runs.insert(run.run_id.clone(), run.clone());
        Ok(())
    }

    async fn active_entities(
        &self,
        source: Source,
    ) -> Result<Vec<SanctionedEntity>, PipelineError> {
        let state = self.state.lock().unwrap();
        let mut entities: Vec<SanctionedEntity> = state
            .entities
            .get(&source)
            .map(|m| m.values().filter(|e| e.is_active).cloned().collect())
            .unwrap_or_default();
        entities.sort_by(|a, b| a.uid.cmp(&b.uid));
        Ok(entities)
    }

    async fn last_content_hash(&self, source: Source) -> Result<Option<String>, PipelineError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .snapshots
            .iter()
            .filter(|s| s.source == source)
            .max_by_key(|s| s.snapshot_time)
            .map(|s| s.content_hash.clone()))
    }

    async fn last_successful_run(
        &self,
        source: Source,
    ) -> Result<Option<ScraperRun>, PipelineError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .runs
            .values()
            .filter(|r| r.source == source && r.status == RunStatus::Success)
            .max_by_key(|r| r.started_at)
            .cloned())
    }

    async fn recent_runs(
        &self,
        hours: i64,
        source: Option<Source>,
    ) -> Result<Vec<ScraperRun>, PipelineError> {
        let cutoff = Utc::now() - Duration::hours(hours);
        let state = self.state.lock().unwrap();
        let mut runs: Vec<ScraperRun> = state
            .runs
            .values()
            .filter(|r| r.started_at >= cutoff)
            .filter(|r| source.is_none_or(|s| r.source == s))
            .cloned()
            .collect();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(runs)
    }

    async fn recent_events(
        &self,
        days: i64,
        source: Option<Source>,
        risk_level: Option<RiskLevel>,
    ) -> Result<Vec<ChangeEvent>, PipelineError> {
        let cutoff = Utc::now() - Duration::days(days);
        let state = self.state.lock().unwrap();
        let mut events: Vec<ChangeEvent> = state
            .events
            .iter()
            .filter(|e| e.detected_at >= cutoff)
            .filter(|e| source.is_none_or(|s| e.source == s))
            .filter(|e| risk_level.is_none_or(|r| e.risk_level == r))
            .cloned()
            .collect();
        events.sort_by(|a, b| b.detected_at.cmp(&a.detected_at));
        Ok(events)
    }

    async fn count_events_by_risk(
        &self,
        since: DateTime<Utc>,
        source: Option<Source>,
    ) -> Result<HashMap<RiskLevel, u64>, PipelineError> {
        let state = self.state.lock().unwrap();
        let mut counts = HashMap::new();
        for event in state
            .events
            .iter()
            .filter(|e| e.detected_at >= since)
            .filter(|e| source.is_none_or(|s| e.source == s))
        {
            *counts.entry(event.risk_level).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn count_events_by_change_type(
        &self,
        since: DateTime<Utc>,
        source: Option<Source>,
    ) -> Result<HashMap<ChangeType, u64>, PipelineError> {
        let state = self.state.lock().unwrap();
        let mut counts = HashMap::new();
        for event in state
            .events
            .iter()
            .filter(|e| e.detected_at >= since)
            .filter(|e| source.is_none_or(|s| e.source == s))
        {
            *counts.entry(event.change_type).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn events_by_risk(
        &self,
        risk_level: RiskLevel,
        since: DateTime<Utc>,
    ) -> Result<Vec<ChangeEvent>, PipelineError> {
        let state = self.state.lock().unwrap();
        let mut events: Vec<ChangeEvent> = state
            .events
            .iter()
            .filter(|e| e.detected_at >= since && e.risk_level == risk_level)
            .cloned()
            .collect();
        events.sort_by(|a, b| b.detected_at.cmp(&a.detected_at));
        Ok(events)
    }

    async fn mark_events_notified(
        &self,
        event_ids: &[Uuid],
        channels: &[ChannelKind],
        sent_at: DateTime<Utc>,
    ) -> Result<(), PipelineError> {
        let ids: HashSet<&Uuid> = event_ids.iter().collect();
        let mut state = self.state.lock().unwrap();
        for event in state.events.iter_mut() {
            if ids.contains(&event.event_id) {
                event.notification_sent_at = Some(sent_at);
                for channel in channels {
                    if !event.notification_channels.contains(channel) {
                        event.notification_channels.push(*channel);
                    }
                }
            }
        }
        Ok(())
    }

    async fn health(&self) -> StoreHealth {
        let state = self.state.lock().unwrap();
        let total: u64 = state.entities.values().map(|m| m.len() as u64).sum();
        let active: u64 = state
            .entities
            .values()
            .map(|m| m.values().filter(|e| e.is_active).count() as u64)
            .sum();
        StoreHealth {
            healthy: true,
            entities_ok: true,
            change_events_ok: true,
            scraper_runs_ok: true,
            content_snapshots_ok: true,
            active_entities: active,
            total_entities: total,
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────
