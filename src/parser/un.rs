//! UN consolidated list parser.
//!
//! Individuals and entities live in separate sections keyed by `DATAID`;
//! canonical uids are prefixed `UN-IND-` / `UN-ENT-` so the two sections
//! cannot collide. Person names are the concatenation of up to four name
//! fields.

use crate::error::PipelineError;
use crate::parser::xml::{parse_document, XmlNode};
use crate::parser::{document_error, ParseOutcome, SanctionsParser};
use crate::schema::{Address, EntityDraft, EntityType, Source};

pub struct UnParser;

impl SanctionsParser for UnParser {
    fn source(&self) -> Source {
        Source::Un
    }

    fn parse(&self, content: &[u8]) -> Result<ParseOutcome, PipelineError> {
        let root = parse_document(content).map_err(|e| document_error(Source::Un, e))?;

        let mut outcome = ParseOutcome::default();
        if let Some(individuals) = root.child("INDIVIDUALS") {
            for entry in individuals.children_named("INDIVIDUAL") {
                collect(&mut outcome, parse_record(entry, true));
            }
        }
        if let Some(entities) = root.child("ENTITIES") {
            for entry in entities.children_named("ENTITY") {
                collect(&mut outcome, parse_record(entry, false));
            }
        }
        outcome.stats.log_summary(Source::Un);
        Ok(outcome)
    }
}

fn collect(outcome: &mut ParseOutcome, draft: Option<EntityDraft>) {
    outcome.stats.records_seen += 1;
    let Some(draft) = draft else {
        outcome.stats.records_skipped += 1;
        return;
    };
    match draft.build(Source::Un) {
        Ok(entity) => {
            outcome.stats.record(&entity);
            outcome.entities.push(entity);
        }
        Err(err) => outcome.stats.record_error(Source::Un, &err.to_string()),
    }
}

fn parse_record(entry: &XmlNode, individual: bool) -> Option<EntityDraft> {
    let data_id = entry.text_of("DATAID")?;
    let uid = if individual {
        format!("UN-IND-{data_id}")
    } else {
        format!("UN-ENT-{data_id}")
    };

    let name_parts: Vec<&str> = ["FIRST_NAME", "SECOND_NAME", "THIRD_NAME", "FOURTH_NAME"]
        .iter()
        .filter_map(|tag| entry.text_of(tag))
        .collect();
    if name_parts.is_empty() {
        return None;
    }
    let name = name_parts.join(" ");

    let mut draft = EntityDraft {
        uid,
        entity_type: if individual {
            EntityType::Person
        } else {
            EntityType::Company
        },
        name,
        remarks: entry.text_of("COMMENTS1").map(str::to_string),
        ..EntityDraft::default()
    };
    if individual {
        draft.first_name = entry.text_of("FIRST_NAME").map(str::to_string);
        draft.last_name = entry.text_of("SECOND_NAME").map(str::to_string);
    }

    if let Some(list_type) = entry.text_of("UN_LIST_TYPE") {
        draft.programs.push(list_type.to_string());
    }
    if let Some(committee) = entry.text_of("COMMITTEE") {
        draft.programs.push(committee.to_string());
    }

    let alias_tag = if individual { "INDIVIDUAL_ALIAS" } else { "ENTITY_ALIAS" };
    for alias in entry.children_named(alias_tag) {
        if let Some(alias_name) = alias.text_of("ALIAS_NAME") {
            draft.aliases.push(alias_name.to_string());
        }
    }

    let address_tag = if individual { "INDIVIDUAL_ADDRESS" } else { "ENTITY_ADDRESS" };
    for addr in entry.children_named(address_tag) {
        draft.addresses.push(Address {
            street: addr.text_of("STREET").map(str::to_string),
            city: addr.text_of("CITY").map(str::to_string),
            state_province: addr.text_of("STATE_PROVINCE").map(str::to_string),
            postal_code: addr.text_of("ZIP_CODE").map(str::to_string),
            country: addr.text_of("COUNTRY").map(str::to_string),
        });
    }

    for dob in entry.children_named("INDIVIDUAL_DATE_OF_BIRTH") {
        if let Some(date) = dob.text_of("DATE").or_else(|| dob.text_of("YEAR")) {
            draft.dates_of_birth.push(date.to_string());
        }
    }

    for pob in entry.children_named("INDIVIDUAL_PLACE_OF_BIRTH") {
        let place: Vec<&str> = ["CITY", "STATE_PROVINCE", "COUNTRY"]
            .iter()
            .filter_map(|tag| pob.text_of(tag))
            .collect();
        if !place.is_empty() {
            draft.places_of_birth.push(place.join(", "));
        }
    }

    for nationality in entry.children_named("NATIONALITY") {
        if let Some(value) = nationality.text_of("VALUE") {
            draft.nationalities.push(value.to_string());
        }
    }

    Some(draft)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &[u8] = br#"<?xml version="1.0" encoding="UTF-8"?>
<CONSOLIDATED_LIST>
    <INDIVIDUALS>
        <INDIVIDUAL>
            <DATAID>12345</DATAID>
            <FIRST_NAME>John</FIRST_NAME>
            <SECOND_NAME>Michael</SECOND_NAME>
            <THIRD_NAME>Smith</THIRD_NAME>
            <UN_LIST_TYPE>ISIL (Da'esh) and Al-Qaida</UN_LIST_TYPE>
            <COMMITTEE>1267 Committee</COMMITTEE>
            <LISTED_ON>2020-01-15</LISTED_ON>
            <COMMENTS1>Test individual for sanctions</COMMENTS1>
            <INDIVIDUAL_ALIAS>
                <QUALITY>Good</QUALITY>
                <ALIAS_NAME>Johnny Smith</ALIAS_NAME>
            </INDIVIDUAL_ALIAS>
            <INDIVIDUAL_ADDRESS>
                <STREET>123 Test Street</STREET>
                <CITY>Test City</CITY>
                <COUNTRY>Test Country</COUNTRY>
            </INDIVIDUAL_ADDRESS>
            <INDIVIDUAL_DATE_OF_BIRTH>
                <DATE>1980-05-15</DATE>
            </INDIVIDUAL_DATE_OF_BIRTH>
            <INDIVIDUAL_PLACE_OF_BIRTH>
                <CITY>Birth City</CITY>
                <COUNTRY>Birth Country</COUNTRY>
            </INDIVIDUAL_PLACE_OF_BIRTH>
            <NATIONALITY>
                <VALUE>Test Nationality</VALUE>
            </NATIONALITY>
        </INDIVIDUAL>
    </INDIVIDUALS>
    <ENTITIES>
        <ENTITY>
            <DATAID>67890</DATAID>
            <FIRST_NAME>Test Organization Ltd</FIRST_NAME>
            <UN_LIST_TYPE>Taliban</UN_LIST_TYPE>
            <LISTED_ON>2021-06-20</LISTED_ON>
            <COMMENTS1>Test entity for sanctions</COMMENTS1>
            <ENTITY_ALIAS>
                <ALIAS_NAME>Test Org</ALIAS_NAME>
            </ENTITY_ALIAS>
            <ENTITY_ADDRESS>
                <STREET>456 Business Avenue</STREET>
                <CITY>Business City</CITY>
                <COUNTRY>Business Country</COUNTRY>
            </ENTITY_ADDRESS>
        </ENTITY>
    </ENTITIES>
</CONSOLIDATED_LIST>"#;

    #[test]
    fn test_individual_record() {
        let outcome = UnParser.parse(SAMPLE).unwrap();
        let person = outcome
            .entities
            .iter()
            .find(|e| e.uid == "UN-IND-12345")
            .expect("individual parsed");
        assert_eq!(person.name, "John Michael Smith");
        assert_eq!(person.entity_type, EntityType::Person);
        assert_eq!(
            person.programs,
            vec!["ISIL (DA'ESH) AND AL-QAIDA", "1267 COMMITTEE"]
        );
        assert_eq!(person.aliases, vec!["Johnny Smith"]);
        assert_eq!(person.addresses.len(), 1);
        assert_eq!(person.addresses[0].street.as_deref(), Some("123 Test Street"));
        assert_eq!(person.dates_of_birth, vec!["1980-05-15"]);
        assert_eq!(person.places_of_birth, vec!["Birth City, Birth Country"]);
        assert_eq!(person.nationalities, vec!["Test Nationality"]);
        assert_eq!(
            person.remarks.as_deref(),
            Some("Test individual for sanctions")
        );
    }

    #[test]
    fn test_entity_record() {
        let outcome = UnParser.parse(SAMPLE).unwrap();
        let org = outcome
            .entities
            .iter()
            .find(|e| e.uid == "UN-ENT-67890")
            .expect("entity parsed");
        assert_eq!(org.name, "Test Organization Ltd");
        assert_eq!(org.entity_type, EntityType::Company);
        assert_eq!(org.programs, vec!["TALIBAN"]);
        assert_eq!(org.aliases, vec!["Test Org"]);
        assert_eq!(org.addresses[0].city.as_deref(), Some("Business City"));
        assert!(org.personal_info.is_none());
    }

    #[test]
    fn test_counts() {
        let outcome = UnParser.parse(SAMPLE).unwrap();
        assert_eq!(outcome.entities.len(), 2);
        assert_eq!(outcome.stats.records_seen, 2);
        assert_eq!(outcome.stats.persons, 1);
        assert_eq!(outcome.stats.companies, 1);
        assert_eq!(outcome.stats.parse_errors, 0);
    }

    #[test]
    fn test_record_without_dataid_is_skipped() {
        let doc = br#"<CONSOLIDATED_LIST><INDIVIDUALS>
            <INDIVIDUAL><FIRST_NAME>No Id</FIRST_NAME></INDIVIDUAL>
        </INDIVIDUALS></CONSOLIDATED_LIST>"#;
        let outcome = UnParser.parse(doc).unwrap();
        assert!(outcome.entities.is_empty());
        assert_eq!(outcome.stats.records_skipped, 1);
    }

    #[test]
    fn test_year_fallback_for_birth_date() {
        let doc = br#"<CONSOLIDATED_LIST><INDIVIDUALS>
            <INDIVIDUAL>
                <DATAID>1</DATAID>
                <FIRST_NAME>Jane</FIRST_NAME>
                <INDIVIDUAL_DATE_OF_BIRTH><YEAR>1975</YEAR></INDIVIDUAL_DATE_OF_BIRTH>
            </INDIVIDUAL>
        </INDIVIDUALS></CONSOLIDATED_LIST>"#;
        let outcome = UnParser.parse(doc).unwrap();
        assert_eq!(outcome.entities[0].dates_of_birth, vec!["1975"]);
        let info = outcome.entities[0].personal_info.as_ref().unwrap();
        assert_eq!(info.date_of_birth.as_deref(), Some("1975"));
    }
}
