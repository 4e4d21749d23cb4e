//! EU consolidated financial sanctions (FSF) list parser.
//!
//! The FSF export is attribute-heavy: every `sanctionEntity` carries a
//! `logicalId`, names arrive as `nameAlias` elements, and programmes hang
//! off `regulation` elements. The first usable name is the primary; the
//! rest become aliases.

use crate::error::PipelineError;
use crate::parser::xml::{parse_document, XmlNode};
use crate::parser::{document_error, ParseOutcome, SanctionsParser};
use crate::schema::{Address, EntityDraft, EntityType, Source};

pub struct EuParser;

impl SanctionsParser for EuParser {
    fn source(&self) -> Source {
        Source::Eu
    }

    fn parse(&self, content: &[u8]) -> Result<ParseOutcome, PipelineError> {
        let root = parse_document(content).map_err(|e| document_error(Source::Eu, e))?;

        let mut outcome = ParseOutcome::default();
        for entry in root.descendants("sanctionEntity") {
            outcome.stats.records_seen += 1;
            match parse_record(entry) {
                Some(draft) => match draft.build(Source::Eu) {
                    Ok(entity) => {
                        outcome.stats.record(&entity);
                        outcome.entities.push(entity);
                    }
                    Err(err) => outcome.stats.record_error(Source::Eu, &err.to_string()),
                },
                None => outcome.stats.records_skipped += 1,
            }
        }
        outcome.stats.log_summary(Source::Eu);
        Ok(outcome)
    }
}

fn map_subject_type(code: Option<&str>) -> EntityType {
    match code.map(str::to_lowercase).as_deref() {
        Some("person") => EntityType::Person,
        Some("enterprise") => EntityType::Company,
        _ => EntityType::Other,
    }
}

fn name_of(alias: &XmlNode) -> Option<String> {
    if let Some(whole) = alias.attr("wholeName") {
        return Some(whole.to_string());
    }
    let joined: Vec<&str> = ["firstName", "middleName", "lastName"]
        .iter()
        .filter_map(|a| alias.attr(a))
        .collect();
    (!joined.is_empty()).then(|| joined.join(" "))
}

fn parse_record(entry: &XmlNode) -> Option<EntityDraft> {
    let logical_id = entry.attr("logicalId")?;
    let entity_type = map_subject_type(entry.child("subjectType").and_then(|s| s.attr("code")));

    let mut names = entry.children_named("nameAlias").filter_map(name_of);
    let name = names.next()?;
    let aliases: Vec<String> = names.collect();

    let mut draft = EntityDraft {
        uid: format!("EU-{logical_id}"),
        entity_type,
        name,
        aliases,
        remarks: entry.text_of("remark").map(str::to_string),
        ..EntityDraft::default()
    };
    if entity_type == EntityType::Person {
        if let Some(primary) = entry.children_named("nameAlias").next() {
            draft.first_name = primary.attr("firstName").map(str::to_string);
            draft.last_name = primary.attr("lastName").map(str::to_string);
        }
    }

    for regulation in entry.children_named("regulation") {
        if let Some(programme) = regulation.attr("programme") {
            draft.programs.push(programme.to_string());
        }
    }

    for addr in entry.children_named("address") {
        draft.addresses.push(Address {
            street: addr.attr("street").map(str::to_string),
            city: addr.attr("city").map(str::to_string),
            state_province: addr.attr("region").map(str::to_string),
            postal_code: addr.attr("zipCode").map(str::to_string),
            country: addr.attr("countryDescription").map(str::to_string),
        });
    }

    for birth in entry.children_named("birthdate") {
        if let Some(date) = birth.attr("birthdate").or_else(|| birth.attr("year")) {
            draft.dates_of_birth.push(date.to_string());
        }
        let place: Vec<&str> = ["city", "countryDescription"]
            .iter()
            .filter_map(|a| birth.attr(a))
            .collect();
        if !place.is_empty() {
            draft.places_of_birth.push(place.join(", "));
        }
    }

    for citizenship in entry.children_named("citizenship") {
        if let Some(country) = citizenship.attr("countryDescription") {
            draft.nationalities.push(country.to_string());
        }
    }

    Some(draft)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &[u8] = br#"<?xml version="1.0" encoding="UTF-8"?>
<export generationDate="2026-01-15T00:00:00">
  <sanctionEntity logicalId="13">
    <remark>Listed under the hybrid threats framework.</remark>
    <subjectType code="person" classificationCode="P"/>
    <regulation programme="HYBRID" numberTitle="2024/2642"/>
    <nameAlias firstName="Ivan" lastName="Petrov" wholeName="Ivan Petrov" function="Officer"/>
    <nameAlias wholeName="I. Petrov"/>
    <address city="Minsk" street="Lenina 5" zipCode="220030" countryDescription="Belarus"/>
    <birthdate birthdate="1969-11-04" city="Gomel" countryDescription="Belarus"/>
    <citizenship countryDescription="Belarus"/>
  </sanctionEntity>
  <sanctionEntity logicalId="27">
    <subjectType code="enterprise"/>
    <regulation programme="UKR"/>
    <nameAlias wholeName="Novator Design Bureau"/>
  </sanctionEntity>
</export>"#;

    #[test]
    fn test_person_record() {
        let outcome = EuParser.parse(SAMPLE).unwrap();
        let person = outcome
            .entities
            .iter()
            .find(|e| e.uid == "EU-13")
            .expect("person parsed");
        assert_eq!(person.name, "Ivan Petrov");
        assert_eq!(person.entity_type, EntityType::Person);
        assert_eq!(person.aliases, vec!["I. Petrov"]);
        assert_eq!(person.programs, vec!["HYBRID"]);
        assert_eq!(person.addresses[0].country.as_deref(), Some("Belarus"));
        assert_eq!(person.dates_of_birth, vec!["1969-11-04"]);
        assert_eq!(person.places_of_birth, vec!["Gomel, Belarus"]);
        assert_eq!(person.nationalities, vec!["Belarus"]);

        let info = person.personal_info.as_ref().unwrap();
        assert_eq!(info.first_name.as_deref(), Some("Ivan"));
        assert_eq!(info.last_name.as_deref(), Some("Petrov"));
        assert_eq!(info.date_of_birth.as_deref(), Some("1969-11-04"));
    }

    #[test]
    fn test_enterprise_record() {
        let outcome = EuParser.parse(SAMPLE).unwrap();
        let company = outcome
            .entities
            .iter()
            .find(|e| e.uid == "EU-27")
            .expect("enterprise parsed");
        assert_eq!(company.name, "Novator Design Bureau");
        assert_eq!(company.entity_type, EntityType::Company);
        assert_eq!(company.programs, vec!["UKR"]);
        assert!(company.aliases.is_empty());
    }

    #[test]
    fn test_record_without_name_is_skipped() {
        let doc = br#"<export><sanctionEntity logicalId="1">
            <subjectType code="person"/>
        </sanctionEntity></export>"#;
        let outcome = EuParser.parse(doc).unwrap();
        assert!(outcome.entities.is_empty());
        assert_eq!(outcome.stats.records_skipped, 1);
    }

    #[test]
    fn test_unknown_subject_type_maps_to_other() {
        assert_eq!(map_subject_type(None), EntityType::Other);
        assert_eq!(map_subject_type(Some("vessel")), EntityType::Other);
    }
}
