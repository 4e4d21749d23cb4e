//! Canonical domain model shared by every pipeline stage.
//!
//! Parsers emit `EntityDraft`s; `EntityDraft::build` is the single
//! normalization point that produces a validated `SanctionedEntity` with
//! its content fingerprint. Everything downstream (differ, classifier,
//! store, notifier) operates on the types in this module.

use crate::error::PipelineError;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt;
use uuid::Uuid;

// ── Enums ───────────────────────────────────────────────────────

/// Upstream sanctions authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Source {
    #[serde(rename = "OFAC")]
    Ofac,
    #[serde(rename = "UN")]
    Un,
    #[serde(rename = "EU")]
    Eu,
    #[serde(rename = "UK_HMT")]
    UkHmt,
}

impl Source {
    pub const ALL: [Source; 4] = [Source::Ofac, Source::Un, Source::Eu, Source::UkHmt];

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Ofac => "OFAC",
            Source::Un => "UN",
            Source::Eu => "EU",
            Source::UkHmt => "UK_HMT",
        }
    }

    pub fn parse(value: &str) -> Option<Source> {
        match value.trim().to_uppercase().as_str() {
            "OFAC" | "US_OFAC" => Some(Source::Ofac),
            "UN" => Some(Source::Un),
            "EU" => Some(Source::Eu),
            "UK_HMT" | "UK" => Some(Source::UkHmt),
            _ => None,
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EntityType {
    #[serde(rename = "PERSON")]
    Person,
    #[serde(rename = "COMPANY")]
    Company,
    #[serde(rename = "VESSEL")]
    Vessel,
    #[serde(rename = "AIRCRAFT")]
    Aircraft,
    #[default]
    #[serde(rename = "OTHER")]
    Other,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Person => "PERSON",
            EntityType::Company => "COMPANY",
            EntityType::Vessel => "VESSEL",
            EntityType::Aircraft => "AIRCRAFT",
            EntityType::Other => "OTHER",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeType {
    #[serde(rename = "ADDED")]
    Added,
    #[serde(rename = "MODIFIED")]
    Modified,
    #[serde(rename = "REMOVED")]
    Removed,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Added => "ADDED",
            ChangeType::Modified => "MODIFIED",
            ChangeType::Removed => "REMOVED",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordinal risk classification. Ordering is LOW < MEDIUM < HIGH < CRITICAL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskLevel {
    #[serde(rename = "LOW")]
    Low,
    #[serde(rename = "MEDIUM")]
    Medium,
    #[serde(rename = "HIGH")]
    High,
    #[serde(rename = "CRITICAL")]
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
            RiskLevel::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scraper run lifecycle. RUNNING moves to exactly one terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunStatus {
    #[serde(rename = "RUNNING")]
    Running,
    #[serde(rename = "SUCCESS")]
    Success,
    #[serde(rename = "FAILED")]
    Failed,
    #[serde(rename = "PARTIAL")]
    Partial,
    #[serde(rename = "SKIPPED")]
    Skipped,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "RUNNING",
            RunStatus::Success => "SUCCESS",
            RunStatus::Failed => "FAILED",
            RunStatus::Partial => "PARTIAL",
            RunStatus::Skipped => "SKIPPED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }

    /// Terminal states are final; RUNNING may move anywhere (including a
    /// counter refresh while still RUNNING).
    pub fn can_transition_to(&self, _next: RunStatus) -> bool {
        matches!(self, RunStatus::Running)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notification delivery channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelKind {
    #[serde(rename = "LOG")]
    Log,
    #[serde(rename = "EMAIL")]
    Email,
    #[serde(rename = "WEBHOOK")]
    Webhook,
    #[serde(rename = "SLACK")]
    Slack,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Log => "LOG",
            ChannelKind::Email => "EMAIL",
            ChannelKind::Webhook => "WEBHOOK",
            ChannelKind::Slack => "SLACK",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Value objects ───────────────────────────────────────────────

/// Structured address. At least one of street/city/country must be set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub street: Option<String>,
    pub city: Option<String>,
    pub state_province: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
}

impl Address {
    pub fn is_valid(&self) -> bool {
        [&self.street, &self.city, &self.country]
            .iter()
            .any(|part| part.as_deref().is_some_and(|s| !s.trim().is_empty()))
    }

    /// Single-line rendering used for diffing and notifications.
    pub fn render(&self) -> String {
        [
            &self.street,
            &self.city,
            &self.state_province,
            &self.postal_code,
            &self.country,
        ]
        .iter()
        .filter_map(|part| part.as_deref())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
    }

    fn trimmed(mut self) -> Self {
        for part in [
            &mut self.street,
            &mut self.city,
            &mut self.state_province,
            &mut self.postal_code,
            &mut self.country,
        ] {
            if let Some(value) = part.take() {
                let value = value.trim().to_string();
                if !value.is_empty() {
                    *part = Some(value);
                }
            }
        }
        self
    }
}

/// Person-only attributes, derived at build time for PERSON entities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonalInfo {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    /// `YYYY-MM-DD` or `YYYY`.
    pub date_of_birth: Option<String>,
    pub place_of_birth: Option<String>,
    pub nationality: Option<String>,
}

impl PersonalInfo {
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.date_of_birth.is_none()
            && self.place_of_birth.is_none()
            && self.nationality.is_none()
    }
}

/// Accepts `YYYY-MM-DD` or bare `YYYY`; anything else is dropped from
/// `PersonalInfo` (the raw list keeps the original string).
pub fn canonical_birth_date(raw: &str) -> Option<String> {
    let s = raw.trim();
    let b = s.as_bytes();
    match b.len() {
        4 if b.iter().all(|c| c.is_ascii_digit()) => Some(s.to_string()),
        10 => {
            let dashes = b[4] == b'-' && b[7] == b'-';
            let digits = [0, 1, 2, 3, 5, 6, 8, 9].iter().all(|&i| b[i].is_ascii_digit());
            (dashes && digits).then(|| s.to_string())
        }
        _ => None,
    }
}

// ── Sanctioned entity ───────────────────────────────────────────

pub const MAX_NAME_LEN: usize = 500;

/// Unvalidated entity data as extracted by a source parser.
#[derive(Debug, Clone, Default)]
pub struct EntityDraft {
    pub uid: String,
    pub entity_type: EntityType,
    pub name: String,
    pub programs: Vec<String>,
    pub aliases: Vec<String>,
    pub addresses: Vec<Address>,
    pub dates_of_birth: Vec<String>,
    pub places_of_birth: Vec<String>,
    pub nationalities: Vec<String>,
    pub remarks: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl EntityDraft {
    /// Normalize and validate into a canonical entity.
    ///
    /// Trims every string, uppercases programs, deduplicates set-valued
    /// fields preserving first-encounter order, drops invalid addresses,
    /// derives `personal_info` for persons, and computes `content_hash`.
    pub fn build(self, source: Source) -> Result<SanctionedEntity, PipelineError> {
        let uid = self.uid.trim().to_string();
        if uid.is_empty() {
            return Err(PipelineError::Validation("entity uid is empty".into()));
        }

        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(PipelineError::Validation(format!(
                "entity {uid} has an empty name"
            )));
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(PipelineError::Validation(format!(
                "entity {uid} name exceeds {MAX_NAME_LEN} characters"
            )));
        }

        let programs = dedup_normalized(self.programs, true);
        let mut aliases = dedup_normalized(self.aliases, false);
        aliases.retain(|alias| alias != &name);

        let addresses: Vec<Address> = self
            .addresses
            .into_iter()
            .map(Address::trimmed)
            .filter(Address::is_valid)
            .collect();

        let dates_of_birth = dedup_normalized(self.dates_of_birth, false);
        let places_of_birth = dedup_normalized(self.places_of_birth, false);
        let nationalities = dedup_normalized(self.nationalities, false);
        let remarks = self
            .remarks
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());

        // personal_info present only for PERSON entities.
        let personal_info = if self.entity_type == EntityType::Person {
            let info = PersonalInfo {
                first_name: trimmed_opt(self.first_name),
                last_name: trimmed_opt(self.last_name),
                date_of_birth: dates_of_birth.iter().find_map(|d| canonical_birth_date(d)),
                place_of_birth: places_of_birth.first().cloned(),
                nationality: nationalities.first().cloned(),
            };
            (!info.is_empty()).then_some(info)
        } else {
            None
        };

        let content_hash = compute_content_hash(
            &name,
            self.entity_type,
            &programs,
            &aliases,
            &addresses,
            &nationalities,
            &dates_of_birth,
            &places_of_birth,
            remarks.as_deref(),
        );

        let now = Utc::now();
        Ok(SanctionedEntity {
            uid,
            source,
            entity_type: self.entity_type,
            name,
            programs,
            aliases,
            addresses,
            dates_of_birth,
            places_of_birth,
            nationalities,
            personal_info,
            remarks,
            content_hash,
            is_active: true,
            created_at: now,
            updated_at: now,
            last_seen: Some(now),
        })
    }
}

/// Canonical, normalized representation of a sanctioned party.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SanctionedEntity {
    pub uid: String,
    pub source: Source,
    pub entity_type: EntityType,
    pub name: String,
    /// Uppercased, deduplicated, first-encounter order.
    pub programs: Vec<String>,
    pub aliases: Vec<String>,
    pub addresses: Vec<Address>,
    pub dates_of_birth: Vec<String>,
    pub places_of_birth: Vec<String>,
    pub nationalities: Vec<String>,
    pub personal_info: Option<PersonalInfo>,
    pub remarks: Option<String>,
    /// SHA-256 over the canonical fields; cheap equality check.
    pub content_hash: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_seen: Option<DateTime<Utc>>,
}

fn trimmed_opt(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn dedup_normalized(values: Vec<String>, uppercase: bool) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for value in values {
        let mut value = value.trim().to_string();
        if uppercase {
            value = value.to_uppercase();
        }
        if !value.is_empty() && seen.insert(value.clone()) {
            out.push(value);
        }
    }
    out
}

/// Fingerprint over the canonical tracked fields. Set-valued fields are
/// hashed sorted so encounter order cannot produce spurious mismatches;
/// field tags and separators keep adjacent fields from colliding.
#[allow(clippy::too_many_arguments)]
fn compute_content_hash(
    name: &str,
    entity_type: EntityType,
    programs: &[String],
    aliases: &[String],
    addresses: &[Address],
    nationalities: &[String],
    dates_of_birth: &[String],
    places_of_birth: &[String],
    remarks: Option<&str>,
) -> String {
    let mut hasher = Sha256::new();
    let mut field = |tag: &str, value: &str| {
        hasher.update(tag.as_bytes());
        hasher.update([0x1f]);
        hasher.update(value.as_bytes());
        hasher.update([0x1e]);
    };

    let sorted_joined = |values: &[String]| {
        let mut sorted: Vec<&str> = values.iter().map(String::as_str).collect();
        sorted.sort_unstable();
        sorted.join("\x1f")
    };

    field("name", name);
    field("entity_type", entity_type.as_str());
    field("programs", &sorted_joined(programs));
    field("aliases", &sorted_joined(aliases));
    let rendered: Vec<String> = addresses.iter().map(Address::render).collect();
    field("addresses", &sorted_joined(&rendered));
    field("nationalities", &sorted_joined(nationalities));
    field("dates_of_birth", &sorted_joined(dates_of_birth));
    field("places_of_birth", &sorted_joined(places_of_birth));
    field("remarks", remarks.unwrap_or(""));

    hex::encode(hasher.finalize())
}

// ── Change records ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldChangeKind {
    #[serde(rename = "added")]
    Added,
    #[serde(rename = "removed")]
    Removed,
    #[serde(rename = "modified")]
    Modified,
}

/// One tracked field that differs between two snapshots of an entity.
/// List-valued fields carry sorted JSON arrays in `old_value`/`new_value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field_name: String,
    pub old_value: serde_json::Value,
    pub new_value: serde_json::Value,
    pub kind: FieldChangeKind,
}

/// Committed record of one entity-level change observed in one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub event_id: Uuid,
    pub entity_uid: String,
    /// Name snapshot at detection time.
    pub entity_name: String,
    pub source: Source,
    pub change_type: ChangeType,
    pub risk_level: RiskLevel,
    /// Empty for ADDED/REMOVED.
    pub field_changes: Vec<FieldChange>,
    pub change_summary: String,
    pub old_content_hash: Option<String>,
    pub new_content_hash: Option<String>,
    pub detected_at: DateTime<Utc>,
    pub scraper_run_id: String,
    pub processing_time_ms: Option<u64>,
    pub notification_sent_at: Option<DateTime<Utc>>,
    pub notification_channels: Vec<ChannelKind>,
}

// ── Content snapshot ────────────────────────────────────────────

/// Fingerprint of one raw fetch; the deduplication authority.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentSnapshot {
    pub snapshot_id: Uuid,
    pub source: Source,
    pub content_hash: String,
    pub content_size_bytes: u64,
    pub snapshot_time: DateTime<Utc>,
    pub scraper_run_id: String,
    pub archive_path: Option<String>,
}

impl ContentSnapshot {
    pub fn new(
        source: Source,
        content_hash: String,
        content_size_bytes: u64,
        scraper_run_id: String,
    ) -> Result<Self, PipelineError> {
        if content_hash.trim().is_empty() {
            return Err(PipelineError::Validation(
                "snapshot content_hash is empty".into(),
            ));
        }
        if content_size_bytes == 0 {
            return Err(PipelineError::Validation(
                "snapshot content_size_bytes must be positive".into(),
            ));
        }
        Ok(ContentSnapshot {
            snapshot_id: Uuid::new_v4(),
            source,
            content_hash,
            content_size_bytes,
            snapshot_time: Utc::now(),
            scraper_run_id,
            archive_path: None,
        })
    }
}

// ── Scraper run ─────────────────────────────────────────────────

/// One end-to-end execution of the pipeline for one source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperRun {
    pub run_id: String,
    pub source: Source,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
    pub status: RunStatus,
    pub source_url: Option<String>,
    pub content_hash: Option<String>,
    pub content_size_bytes: Option<u64>,
    pub content_changed: Option<bool>,
    pub entities_processed: u64,
    pub entities_added: u64,
    pub entities_modified: u64,
    pub entities_removed: u64,
    pub critical_changes: u64,
    pub high_risk_changes: u64,
    pub medium_risk_changes: u64,
    pub low_risk_changes: u64,
    pub download_time_ms: Option<u64>,
    pub parsing_time_ms: Option<u64>,
    pub diff_time_ms: Option<u64>,
    pub storage_time_ms: Option<u64>,
    pub error_message: Option<String>,
    pub retry_count: u32,
}

impl ScraperRun {
    pub fn begin(run_id: String, source: Source, source_url: String) -> Self {
        ScraperRun {
            run_id,
            source,
            started_at: Utc::now(),
            completed_at: None,
            duration_seconds: None,
            status: RunStatus::Running,
            source_url: Some(source_url),
            content_hash: None,
            content_size_bytes: None,
            content_changed: None,
            entities_processed: 0,
            entities_added: 0,
            entities_modified: 0,
            entities_removed: 0,
            critical_changes: 0,
            high_risk_changes: 0,
            medium_risk_changes: 0,
            low_risk_changes: 0,
            download_time_ms: None,
            parsing_time_ms: None,
            diff_time_ms: None,
            storage_time_ms: None,
            error_message: None,
            retry_count: 0,
        }
    }

    fn finish(&mut self, status: RunStatus) {
        let now = Utc::now();
        self.completed_at = Some(now);
        self.duration_seconds = Some((now - self.started_at).num_seconds());
        self.status = status;
    }

    pub fn complete_success(&mut self) {
        self.content_changed = Some(true);
        self.finish(RunStatus::Success);
    }

    /// Content was byte-identical to the last SUCCESS; nothing was written.
    /// SKIPPED implies `content_changed == false`.
    pub fn complete_skipped(&mut self, content_hash: String, download_time_ms: u64) {
        self.content_hash = Some(content_hash);
        self.download_time_ms = Some(download_time_ms);
        self.content_changed = Some(false);
        self.finish(RunStatus::Skipped);
    }

    pub fn complete_failed(&mut self, error_message: String) {
        self.error_message = Some(error_message);
        self.finish(RunStatus::Failed);
    }

    /// Run-record invariants checked at the store boundary.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.run_id.trim().is_empty() {
            return Err(PipelineError::Validation("run_id is empty".into()));
        }
        if self.status == RunStatus::Skipped && self.content_changed != Some(false) {
            return Err(PipelineError::Validation(format!(
                "run {} is SKIPPED but content_changed is not false",
                self.run_id
            )));
        }
        if self.status.is_terminal() && self.completed_at.is_none() {
            return Err(PipelineError::Validation(format!(
                "run {} is terminal without completed_at",
                self.run_id
            )));
        }
        Ok(())
    }
}

/// Raw bytes plus fingerprint for one successful fetch.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub content: Vec<u8>,
    pub content_hash: String,
    pub size_bytes: u64,
    pub download_time_ms: u64,
}

// ── Tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(uid: &str, name: &str) -> EntityDraft {
        EntityDraft {
            uid: uid.into(),
            name: name.into(),
            ..EntityDraft::default()
        }
    }

    #[test]
    fn test_build_normalizes_programs_and_dedups() {
        let mut d = draft("1", "  Acme Corp  ");
        d.entity_type = EntityType::Company;
        d.programs = vec!["sdgt".into(), "SDGT".into(), " cyber ".into(), "".into()];
        d.aliases = vec!["Acme".into(), "Acme".into(), "Acme Corp".into()];

        let entity = d.build(Source::Ofac).unwrap();
        assert_eq!(entity.name, "Acme Corp");
        assert_eq!(entity.programs, vec!["SDGT", "CYBER"]);
        // duplicate removed, primary-name alias removed
        assert_eq!(entity.aliases, vec!["Acme"]);
        assert!(entity.is_active);
    }

    #[test]
    fn test_build_rejects_empty_name_and_uid() {
        assert!(draft("1", "   ").build(Source::Un).is_err());
        assert!(draft("", "Name").build(Source::Un).is_err());
    }

    #[test]
    fn test_build_rejects_oversized_name() {
        let d = draft("1", &"x".repeat(MAX_NAME_LEN + 1));
        assert!(d.build(Source::Eu).is_err());
    }

    #[test]
    fn test_personal_info_only_for_persons() {
        let mut d = draft("1", "Acme Corp");
        d.entity_type = EntityType::Company;
        d.first_name = Some("John".into());
        d.dates_of_birth = vec!["1980-05-15".into()];
        let entity = d.build(Source::Ofac).unwrap();
        assert!(entity.personal_info.is_none());

        let mut d = draft("2", "John Smith");
        d.entity_type = EntityType::Person;
        d.first_name = Some("John".into());
        d.last_name = Some("Smith".into());
        d.dates_of_birth = vec!["not-a-date".into(), "1980-05-15".into()];
        d.places_of_birth = vec!["Birth City".into()];
        d.nationalities = vec!["Test Nationality".into()];
        let entity = d.build(Source::Ofac).unwrap();
        let info = entity.personal_info.unwrap();
        assert_eq!(info.first_name.as_deref(), Some("John"));
        assert_eq!(info.date_of_birth.as_deref(), Some("1980-05-15"));
        assert_eq!(info.place_of_birth.as_deref(), Some("Birth City"));
        // unparseable date stays in the raw list
        assert_eq!(entity.dates_of_birth.len(), 2);
    }

    #[test]
    fn test_canonical_birth_date_formats() {
        assert_eq!(canonical_birth_date("1980-05-15").as_deref(), Some("1980-05-15"));
        assert_eq!(canonical_birth_date(" 1975 ").as_deref(), Some("1975"));
        assert_eq!(canonical_birth_date("15/05/1980"), None);
        assert_eq!(canonical_birth_date("circa 1980"), None);
    }

    #[test]
    fn test_invalid_addresses_dropped() {
        let mut d = draft("1", "Entity");
        d.addresses = vec![
            Address {
                state_province: Some("NY".into()),
                postal_code: Some("10001".into()),
                ..Address::default()
            },
            Address {
                city: Some("Moscow".into()),
                ..Address::default()
            },
        ];
        let entity = d.build(Source::Un).unwrap();
        assert_eq!(entity.addresses.len(), 1);
        assert_eq!(entity.addresses[0].city.as_deref(), Some("Moscow"));
    }

    #[test]
    fn test_content_hash_ignores_set_order() {
        let mut a = draft("1", "Name");
        a.programs = vec!["SDGT".into(), "CYBER".into()];
        a.nationalities = vec!["Cuba".into(), "Iran".into()];
        let mut b = draft("1", "Name");
        b.programs = vec!["CYBER".into(), "SDGT".into()];
        b.nationalities = vec!["Iran".into(), "Cuba".into()];

        let ea = a.build(Source::Ofac).unwrap();
        let eb = b.build(Source::Ofac).unwrap();
        assert_eq!(ea.content_hash, eb.content_hash);
    }

    #[test]
    fn test_content_hash_changes_with_fields() {
        let base = draft("1", "Name").build(Source::Ofac).unwrap();
        let mut d = draft("1", "Name");
        d.remarks = Some("now listed".into());
        let changed = d.build(Source::Ofac).unwrap();
        assert_ne!(base.content_hash, changed.content_hash);
    }

    #[test]
    fn test_address_render() {
        let addr = Address {
            street: Some("123 Main St".into()),
            city: Some("New York".into()),
            state_province: Some("NY".into()),
            postal_code: Some("10001".into()),
            country: Some("United States".into()),
        };
        assert_eq!(addr.render(), "123 Main St, New York, NY, 10001, United States");
    }

    #[test]
    fn test_run_status_transitions() {
        assert!(RunStatus::Running.can_transition_to(RunStatus::Success));
        assert!(RunStatus::Running.can_transition_to(RunStatus::Failed));
        assert!(!RunStatus::Success.can_transition_to(RunStatus::Failed));
        assert!(!RunStatus::Failed.can_transition_to(RunStatus::Failed));
        assert!(!RunStatus::Skipped.can_transition_to(RunStatus::Running));
    }

    #[test]
    fn test_skipped_run_content_changed_invariant() {
        let mut run = ScraperRun::begin("ofac_1".into(), Source::Ofac, "http://x".into());
        run.complete_skipped("abc".into(), 12);
        assert_eq!(run.content_changed, Some(false));
        assert!(run.validate().is_ok());

        run.content_changed = Some(true);
        assert!(run.validate().is_err());
    }

    #[test]
    fn test_snapshot_invariants() {
        assert!(ContentSnapshot::new(Source::Un, "".into(), 10, "r".into()).is_err());
        assert!(ContentSnapshot::new(Source::Un, "abc".into(), 0, "r".into()).is_err());
        assert!(ContentSnapshot::new(Source::Un, "abc".into(), 10, "r".into()).is_ok());
    }

    #[test]
    fn test_risk_level_ordering() {
        assert!(RiskLevel::Low < RiskLevel::Medium);
        assert!(RiskLevel::Medium < RiskLevel::High);
        assert!(RiskLevel::High < RiskLevel::Critical);
    }

    #[test]
    fn test_source_parse_canonicalizes_legacy_values() {
        assert_eq!(Source::parse("us_ofac"), Some(Source::Ofac));
        assert_eq!(Source::parse("OFAC"), Some(Source::Ofac));
        assert_eq!(Source::parse("uk"), Some(Source::UkHmt));
        assert_eq!(Source::parse("nope"), None);
    }
}
