//! Source-specific parsers producing the canonical entity model.
//!
//! Each parser decodes one authority's published document into fully
//! normalized `SanctionedEntity` values. Per-record failures never abort
//! a document: they are counted, the first few are logged, and parsing
//! continues. The registry is built once at startup and passed to the
//! orchestrator.

pub mod eu;
pub mod ofac;
pub mod uk;
pub mod un;
pub mod xml;

use crate::error::PipelineError;
use crate::schema::{EntityType, SanctionedEntity, Source};

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// How many per-record failures get logged in full per document.
const LOGGED_RECORD_ERRORS: usize = 5;

#[derive(Debug, Clone, Default)]
pub struct ParserStats {
    pub records_seen: usize,
    pub records_parsed: usize,
    pub records_skipped: usize,
    pub parse_errors: usize,
    pub persons: usize,
    pub companies: usize,
    pub vessels: usize,
    pub aircraft: usize,
    pub other: usize,
    pub with_aliases: usize,
    pub with_addresses: usize,
    pub with_birth_dates: usize,
}

impl ParserStats {
    pub fn record(&mut self, entity: &SanctionedEntity) {
        self.records_parsed += 1;
        match entity.entity_type {
            EntityType::Person => self.persons += 1,
            EntityType::Company => self.companies += 1,
            EntityType::Vessel => self.vessels += 1,
            EntityType::Aircraft => self.aircraft += 1,
            EntityType::Other => self.other += 1,
        }
        if !entity.aliases.is_empty() {
            self.with_aliases += 1;
        }
        if !entity.addresses.is_empty() {
            self.with_addresses += 1;
        }
        if !entity.dates_of_birth.is_empty() {
            self.with_birth_dates += 1;
        }
    }

    pub fn record_error(&mut self, source: Source, detail: &str) {
        self.parse_errors += 1;
        if self.parse_errors <= LOGGED_RECORD_ERRORS {
            warn!(%source, detail, "failed to parse record");
        }
    }

    pub fn log_summary(&self, source: Source) {
        info!(
            %source,
            seen = self.records_seen,
            parsed = self.records_parsed,
            skipped = self.records_skipped,
            errors = self.parse_errors,
            persons = self.persons,
            companies = self.companies,
            vessels = self.vessels,
            aircraft = self.aircraft,
            other = self.other,
            with_aliases = self.with_aliases,
            with_addresses = self.with_addresses,
            with_birth_dates = self.with_birth_dates,
            "parse complete"
        );
    }
}

#[derive(Debug, Clone, Default)]
pub struct ParseOutcome {
    pub entities: Vec<SanctionedEntity>,
    pub stats: ParserStats,
}

/// Decodes one source's raw document. CPU-bound and synchronous; the
/// orchestrator runs it on the blocking pool.
pub trait SanctionsParser: Send + Sync {
    fn source(&self) -> Source;

    fn parse(&self, content: &[u8]) -> Result<ParseOutcome, PipelineError>;
}

/// Parser registry, one entry per source, built once at startup.
pub fn build_registry() -> HashMap<Source, Arc<dyn SanctionsParser>> {
    let mut registry: HashMap<Source, Arc<dyn SanctionsParser>> = HashMap::new();
    registry.insert(Source::Ofac, Arc::new(ofac::OfacParser));
    registry.insert(Source::Un, Arc::new(un::UnParser));
    registry.insert(Source::Eu, Arc::new(eu::EuParser));
    registry.insert(Source::UkHmt, Arc::new(uk::UkParser));
    registry
}

/// Shared error mapping for document-level XML failures.
pub(crate) fn document_error(source: Source, err: quick_xml::Error) -> PipelineError {
    PipelineError::Parsing {
        src: source,
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_covers_every_source() {
        let registry = build_registry();
        for source in Source::ALL {
            let parser = registry.get(&source).expect("parser registered");
            assert_eq!(parser.source(), source);
        }
    }
}
