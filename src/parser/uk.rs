//! UK OFSI consolidated sanctions list parser.
//!
//! Each `Designation` carries a `UniqueID`, one or more `Names/Name`
//! records (the `Primary Name` becomes the display name, every other
//! quality becomes an alias) and a `RegimeName` programme. Address lines
//! are free-form; lines are folded into the street field. OFSI publishes
//! birth dates as `dd/mm/yyyy`, which are reformatted to ISO for the
//! canonical model.

use crate::error::PipelineError;
use crate::parser::xml::{parse_document, XmlNode};
use crate::parser::{document_error, ParseOutcome, SanctionsParser};
use crate::schema::{Address, EntityDraft, EntityType, Source};

pub struct UkParser;

impl SanctionsParser for UkParser {
    fn source(&self) -> Source {
        Source::UkHmt
    }

    fn parse(&self, content: &[u8]) -> Result<ParseOutcome, PipelineError> {
        let root = parse_document(content).map_err(|e| document_error(Source::UkHmt, e))?;

        let mut outcome = ParseOutcome::default();
        for entry in root.descendants("Designation") {
            outcome.stats.records_seen += 1;
            match parse_record(entry) {
                Some(draft) => match draft.build(Source::UkHmt) {
                    Ok(entity) => {
                        outcome.stats.record(&entity);
                        outcome.entities.push(entity);
                    }
                    Err(err) => outcome.stats.record_error(Source::UkHmt, &err.to_string()),
                },
                None => outcome.stats.records_skipped += 1,
            }
        }
        outcome.stats.log_summary(Source::UkHmt);
        Ok(outcome)
    }
}

fn map_designation_type(value: Option<&str>) -> EntityType {
    match value.map(str::to_lowercase).as_deref() {
        Some("individual") => EntityType::Person,
        Some("entity") => EntityType::Company,
        Some("ship") => EntityType::Vessel,
        _ => EntityType::Other,
    }
}

/// OFSI date strings are `dd/mm/yyyy`; fold them to `yyyy-mm-dd` when
/// well-formed, otherwise keep the raw value.
fn normalize_uk_date(raw: &str) -> String {
    let parts: Vec<&str> = raw.trim().split('/').collect();
    if parts.len() == 3
        && parts[0].len() == 2
        && parts[1].len() == 2
        && parts[2].len() == 4
        && parts.iter().all(|p| p.bytes().all(|b| b.is_ascii_digit()))
    {
        return format!("{}-{}-{}", parts[2], parts[1], parts[0]);
    }
    raw.trim().to_string()
}

fn full_name(name: &XmlNode) -> Option<String> {
    let parts: Vec<&str> = ["Name1", "Name2", "Name3", "Name4", "Name5", "Name6"]
        .iter()
        .filter_map(|tag| name.text_of(tag))
        .collect();
    (!parts.is_empty()).then(|| parts.join(" "))
}

fn parse_record(entry: &XmlNode) -> Option<EntityDraft> {
    let unique_id = entry.text_of("UniqueID")?;
    let entity_type = map_designation_type(entry.text_of("IndividualEntityShip"));

    let mut primary: Option<String> = None;
    let mut aliases = Vec::new();
    if let Some(names) = entry.child("Names") {
        for name in names.children_named("Name") {
            let Some(value) = full_name(name) else {
                continue;
            };
            let is_primary = name
                .text_of("NameType")
                .is_some_and(|t| t.eq_ignore_ascii_case("Primary Name"));
            if is_primary && primary.is_none() {
                primary = Some(value);
            } else {
                aliases.push(value);
            }
        }
    }
    // some designations carry only alias-quality names
    let name = primary.or_else(|| {
        (!aliases.is_empty()).then(|| aliases.remove(0))
    })?;

    let mut draft = EntityDraft {
        uid: format!("UK-{unique_id}"),
        entity_type,
        name,
        aliases,
        remarks: entry.text_of("OtherInformation").map(str::to_string),
        ..EntityDraft::default()
    };

    if let Some(regime) = entry.text_of("RegimeName") {
        draft.programs.push(regime.to_string());
    }

    if let Some(addresses) = entry.child("Addresses") {
        for addr in addresses.children_named("Address") {
            let lines: Vec<&str> = [
                "AddressLine1",
                "AddressLine2",
                "AddressLine3",
                "AddressLine4",
                "AddressLine5",
                "AddressLine6",
            ]
            .iter()
            .filter_map(|tag| addr.text_of(tag))
            .collect();
            draft.addresses.push(Address {
                street: (!lines.is_empty()).then(|| lines.join(", ")),
                city: None,
                state_province: None,
                postal_code: addr.text_of("PostCode").map(str::to_string),
                country: addr.text_of("AddressCountry").map(str::to_string),
            });
        }
    }

    if let Some(dobs) = entry.child("DOBs") {
        for dob in dobs.children_named("DOB") {
            let value = dob.text.trim();
            if !value.is_empty() {
                draft.dates_of_birth.push(normalize_uk_date(value));
            }
        }
    }

    if let Some(nationalities) = entry.child("Nationalities") {
        for nationality in nationalities.children_named("Nationality") {
            let value = nationality.text.trim();
            if !value.is_empty() {
                draft.nationalities.push(value.to_string());
            }
        }
    }

    Some(draft)
}
