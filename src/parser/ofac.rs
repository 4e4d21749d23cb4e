//! OFAC SDN list parser.
//!
//! The SDN XML keys every entry by `<uid>` and classifies it with
//! `<sdnType>`. OFAC stores company names in `lastName`, so the display
//! name is `firstName lastName` for persons and bare `lastName` for
//! everything else, with `title` as the fallback.

use crate::error::PipelineError;
use crate::parser::xml::{parse_document, XmlNode};
use crate::parser::{document_error, ParseOutcome, SanctionsParser};
use crate::schema::{Address, EntityDraft, EntityType, Source};

pub struct OfacParser;

impl SanctionsParser for OfacParser {
    fn source(&self) -> Source {
        Source::Ofac
    }

    fn parse(&self, content: &[u8]) -> Result<ParseOutcome, PipelineError> {
        let root = parse_document(content).map_err(|e| document_error(Source::Ofac, e))?;

        let mut outcome = ParseOutcome::default();
        for entry in root.descendants("sdnEntry") {
            outcome.stats.records_seen += 1;
            match parse_entry(entry) {
                Ok(Some(draft)) => match draft.build(Source::Ofac) {
                    Ok(entity) => {
                        outcome.stats.record(&entity);
                        outcome.entities.push(entity);
                    }
                    Err(err) => outcome.stats.record_error(Source::Ofac, &err.to_string()),
                },
                Ok(None) => outcome.stats.records_skipped += 1,
                Err(detail) => outcome.stats.record_error(Source::Ofac, &detail),
            }
        }
        outcome.stats.log_summary(Source::Ofac);
        Ok(outcome)
    }
}

fn map_entity_type(sdn_type: Option<&str>) -> EntityType {
    match sdn_type.map(|t| t.trim().to_lowercase()).as_deref() {
        Some("individual") => EntityType::Person,
        Some("entity") => EntityType::Company,
        Some("vessel") => EntityType::Vessel,
        Some("aircraft") => EntityType::Aircraft,
        _ => EntityType::Other,
    }
}

/// `Ok(None)` means the entry carries no uid or no usable name and is
/// skipped, matching the upstream list's own conventions for stub rows.
fn parse_entry(entry: &XmlNode) -> Result<Option<EntityDraft>, String> {
    let Some(uid) = entry.text_of("uid") else {
        return Ok(None);
    };

    let entity_type = map_entity_type(entry.text_of("sdnType"));
    let last_name = entry.text_of("lastName");
    let first_name = entry.text_of("firstName");
    let title = entry.text_of("title");

    let name = match (last_name, first_name) {
        (Some(last), Some(first)) if entity_type == EntityType::Person => {
            format!("{first} {last}")
        }
        (Some(last), _) => last.to_string(),
        (None, _) => match title {
            Some(t) => t.to_string(),
            None => return Ok(None),
        },
    };

    let mut draft = EntityDraft {
        uid: uid.to_string(),
        entity_type,
        name: name.clone(),
        remarks: entry.text_of("remarks").map(str::to_string),
        ..EntityDraft::default()
    };
    if entity_type == EntityType::Person {
        draft.first_name = first_name.map(str::to_string);
        draft.last_name = last_name.map(str::to_string);
    }

    if let Some(list) = entry.child("programList") {
        for program in list.children_named("program") {
            let text = program.text.trim();
            if !text.is_empty() {
                draft.programs.push(text.to_string());
            }
        }
    }

    if let Some(list) = entry.child("addressList") {
        for addr in list.children_named("address") {
            draft.addresses.push(parse_address(addr));
        }
    }

    if let Some(list) = entry.child("akaList") {
        for aka in list.children_named("aka") {
            if let Some(alias) = alias_name(aka) {
                if alias != name && alias.chars().count() > 1 {
                    draft.aliases.push(alias);
                }
            }
        }
    }

    draft.dates_of_birth =
        item_values(entry, "dateOfBirthList", "dateOfBirthItem", &["dateOfBirth", "date"]);
    draft.places_of_birth = item_values(
        entry,
        "placeOfBirthList",
        "placeOfBirthItem",
        &["placeOfBirth", "place"],
    );
    draft.nationalities = item_values(
        entry,
        "nationalityList",
        "nationalityItem",
        &["nationality", "country"],
    );

    Ok(Some(draft))
}

fn parse_address(addr: &XmlNode) -> Address {
    let street: Vec<&str> = ["address1", "address2", "address3"]
        .iter()
        .filter_map(|tag| addr.text_of(tag))
        .collect();
    Address {
        street: (!street.is_empty()).then(|| street.join(", ")),
        city: addr.text_of("city").map(str::to_string),
        state_province: addr.text_of("stateOrProvince").map(str::to_string),
        postal_code: addr.text_of("postalCode").map(str::to_string),
        country: addr.text_of("country").map(str::to_string),
    }
}

fn alias_name(aka: &XmlNode) -> Option<String> {
    let first = aka.text_of("firstName");
    let last = aka.text_of("lastName");
    match (first, last) {
        (None, None) => aka.text_of("title").map(str::to_string),
        (first, last) => {
            let joined = [first, last]
                .iter()
                .filter_map(|p| *p)
                .collect::<Vec<_>>()
                .join(" ");
            (!joined.is_empty()).then_some(joined)
        }
    }
}

/// Structured `<xList><xItem>` lookup with legacy flat-element fallback,
/// mirroring both generations of the published schema.
fn item_values(entry: &XmlNode, list_tag: &str, item_tag: &str, value_tags: &[&str]) -> Vec<String> {
    let mut values = Vec::new();
    if let Some(list) = entry.child(list_tag) {
        for item in list.children_named(item_tag) {
            let value = value_tags
                .iter()
                .find_map(|tag| item.text_of(tag))
                .unwrap_or_else(|| item.text.trim());
            if !value.is_empty() {
                values.push(value.to_string());
            }
        }
    }
    if values.is_empty() {
        // legacy format: flat elements named after the first value tag
        for item in entry.children_named(value_tags[0]) {
            let value = item.text.trim();
            if !value.is_empty() {
                values.push(value.to_string());
            }
        }
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &[u8] = br#"<?xml version="1.0" encoding="utf-8"?>
<sdnList xmlns="http://tempuri.org/sdnList.xsd">
  <publshInformation><Publish_Date>01/15/2026</Publish_Date></publshInformation>
  <sdnEntry>
    <uid>36</uid>
    <lastName>AEROCARIBBEAN AIRLINES</lastName>
    <sdnType>Entity</sdnType>
    <remarks>Linked to national carrier.</remarks>
    <programList><program>CUBA</program></programList>
    <akaList>
      <aka><uid>12</uid><type>a.k.a.</type><lastName>AERO-CARIBBEAN</lastName></aka>
    </akaList>
    <addressList>
      <address>
        <uid>25</uid>
        <address1>Calle 23 No 64</address1>
        <city>Havana</city>
        <country>Cuba</country>
      </address>
    </addressList>
  </sdnEntry>
  <sdnEntry>
    <uid>7160</uid>
    <firstName>Usama</firstName>
    <lastName>BIN LADIN</lastName>
    <sdnType>Individual</sdnType>
    <programList><program>SDGT</program></programList>
    <akaList>
      <aka><firstName>Osama</firstName><lastName>BIN LADEN</lastName></aka>
    </akaList>
    <dateOfBirthList>
      <dateOfBirthItem><uid>1</uid><dateOfBirth>1957-03-10</dateOfBirth></dateOfBirthItem>
    </dateOfBirthList>
    <placeOfBirthList>
      <placeOfBirthItem><placeOfBirth>Jiddah, Saudi Arabia</placeOfBirth></placeOfBirthItem>
    </placeOfBirthList>
    <nationalityList>
      <nationalityItem><country>Saudi Arabia</country></nationalityItem>
    </nationalityList>
  </sdnEntry>
  <sdnEntry>
    <title>UNNAMED VESSEL</title>
    <sdnType>Vessel</sdnType>
  </sdnEntry>
</sdnList>"#;

    #[test]
    fn test_company_uses_last_name_as_display_name() {
        let outcome = OfacParser.parse(SAMPLE).unwrap();
        let company = outcome
            .entities
            .iter()
            .find(|e| e.uid == "36")
            .expect("company parsed");
        assert_eq!(company.name, "AEROCARIBBEAN AIRLINES");
        assert_eq!(company.entity_type, EntityType::Company);
        assert_eq!(company.programs, vec!["CUBA"]);
        assert_eq!(company.aliases, vec!["AERO-CARIBBEAN"]);
        assert_eq!(company.addresses.len(), 1);
        assert_eq!(company.addresses[0].city.as_deref(), Some("Havana"));
        assert_eq!(company.remarks.as_deref(), Some("Linked to national carrier."));
        assert!(company.personal_info.is_none());
    }

    #[test]
    fn test_person_combines_first_and_last_name() {
        let outcome = OfacParser.parse(SAMPLE).unwrap();
        let person = outcome
            .entities
            .iter()
            .find(|e| e.uid == "7160")
            .expect("person parsed");
        assert_eq!(person.name, "Usama BIN LADIN");
        assert_eq!(person.entity_type, EntityType::Person);
        assert_eq!(person.aliases, vec!["Osama BIN LADEN"]);
        assert_eq!(person.dates_of_birth, vec!["1957-03-10"]);
        assert_eq!(person.places_of_birth, vec!["Jiddah, Saudi Arabia"]);
        assert_eq!(person.nationalities, vec!["Saudi Arabia"]);

        let info = person.personal_info.as_ref().expect("personal info derived");
        assert_eq!(info.first_name.as_deref(), Some("Usama"));
        assert_eq!(info.date_of_birth.as_deref(), Some("1957-03-10"));
        assert_eq!(info.nationality.as_deref(), Some("Saudi Arabia"));
    }

    #[test]
    fn test_entry_without_uid_is_skipped() {
        let outcome = OfacParser.parse(SAMPLE).unwrap();
        assert_eq!(outcome.stats.records_seen, 3);
        assert_eq!(outcome.entities.len(), 2);
        assert_eq!(outcome.stats.records_skipped, 1);
        assert_eq!(outcome.stats.parse_errors, 0);
    }

    #[test]
    fn test_title_fallback_display_name() {
        let doc = br#"<sdnList><sdnEntry>
            <uid>9</uid><title>M/V SOMETHING</title><sdnType>Vessel</sdnType>
        </sdnEntry></sdnList>"#;
        let outcome = OfacParser.parse(doc).unwrap();
        assert_eq!(outcome.entities[0].name, "M/V SOMETHING");
        assert_eq!(outcome.entities[0].entity_type, EntityType::Vessel);
    }

    #[test]
    fn test_unknown_sdn_type_maps_to_other() {
        assert_eq!(map_entity_type(None), EntityType::Other);
        assert_eq!(map_entity_type(Some("weird")), EntityType::Other);
        assert_eq!(map_entity_type(Some("Individual")), EntityType::Person);
    }

    #[test]
    fn test_malformed_document_is_fatal() {
        let err = OfacParser.parse(b"<sdnList><sdnEntry>").unwrap_err();
        assert_eq!(err.code(), "PARSING_ERROR");
    }
}
