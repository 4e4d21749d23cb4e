//! Risk classification of detected changes.
//!
//! A pure function from change to risk level. Rules are evaluated from
//! most to least severe, so adding further field changes can never lower
//! the outcome.

use crate::differ::EntityChange;
use crate::schema::{ChangeType, EntityType, RiskLevel};

/// Programs whose mere presence on a newly added entity is CRITICAL.
pub const HIGH_RISK_PROGRAMS: [&str; 4] = ["SDGT", "TERRORISM", "PROLIFERATION", "CYBER"];

/// Fields whose modification is CRITICAL.
const CRITICAL_FIELDS: [&str; 3] = ["name", "programs", "entity_type"];

/// Fields whose modification is HIGH.
const HIGH_FIELDS: [&str; 3] = ["addresses", "aliases", "nationalities"];

/// Fields whose modification is MEDIUM.
const MEDIUM_FIELDS: [&str; 3] = ["dates_of_birth", "places_of_birth", "remarks"];

pub fn classify(change: &EntityChange) -> RiskLevel {
    match change.change_type {
        // removals are compliance-relevant regardless of anything else
        ChangeType::Removed => RiskLevel::Critical,

        ChangeType::Added => {
            if change
                .programs
                .iter()
                .any(|p| HIGH_RISK_PROGRAMS.contains(&p.as_str()))
            {
                RiskLevel::Critical
            } else if change.entity_type == EntityType::Person {
                RiskLevel::High
            } else {
                RiskLevel::Medium
            }
        }

        ChangeType::Modified => {
            let touched =
                |fields: &[&str]| change.field_changes.iter().any(|f| fields.contains(&f.field_name.as_str()));

            if touched(&CRITICAL_FIELDS) {
                RiskLevel::Critical
            } else if touched(&HIGH_FIELDS) {
                RiskLevel::High
            } else if change.field_changes.len() >= 3 || touched(&MEDIUM_FIELDS) {
                RiskLevel::Medium
            } else {
                RiskLevel::Low
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ChangeType, FieldChange, FieldChangeKind};
    use serde_json::Value;

    fn change(change_type: ChangeType) -> EntityChange {
        EntityChange {
            change_type,
            uid: "1".into(),
            entity_name: "Test".into(),
            entity_type: EntityType::Company,
            programs: Vec::new(),
            old_content_hash: None,
            new_content_hash: None,
            field_changes: Vec::new(),
        }
    }

    fn field(name: &str) -> FieldChange {
        FieldChange {
            field_name: name.into(),
            old_value: Value::Null,
            new_value: Value::String("x".into()),
            kind: FieldChangeKind::Modified,
        }
    }

    #[test]
    fn test_removed_is_always_critical() {
        assert_eq!(classify(&change(ChangeType::Removed)), RiskLevel::Critical);
    }

    #[test]
    fn test_added_base_is_medium() {
        assert_eq!(classify(&change(ChangeType::Added)), RiskLevel::Medium);
    }

    #[test]
    fn test_added_person_is_high() {
        let mut c = change(ChangeType::Added);
        c.entity_type = EntityType::Person;
        assert_eq!(classify(&c), RiskLevel::High);
    }

    #[test]
    fn test_added_high_risk_program_is_critical_regardless_of_type() {
        let mut c = change(ChangeType::Added);
        c.programs = vec!["SDGT".into()];
        assert_eq!(classify(&c), RiskLevel::Critical);

        // person on a high-risk program stays critical, not high
        c.entity_type = EntityType::Person;
        assert_eq!(classify(&c), RiskLevel::Critical);
    }

    #[test]
    fn test_modified_critical_fields() {
        for name in CRITICAL_FIELDS {
            let mut c = change(ChangeType::Modified);
            c.field_changes = vec![field(name)];
            assert_eq!(classify(&c), RiskLevel::Critical, "{name}");
        }
    }

    #[test]
    fn test_modified_high_fields() {
        for name in HIGH_FIELDS {
            let mut c = change(ChangeType::Modified);
            c.field_changes = vec![field(name)];
            assert_eq!(classify(&c), RiskLevel::High, "{name}");
        }
    }

    #[test]
    fn test_modified_medium_fields() {
        for name in MEDIUM_FIELDS {
            let mut c = change(ChangeType::Modified);
            c.field_changes = vec![field(name)];
            assert_eq!(classify(&c), RiskLevel::Medium, "{name}");
        }
    }

    #[test]
    fn test_modified_three_unclassified_fields_is_medium() {
        let mut c = change(ChangeType::Modified);
        c.field_changes = vec![field("a"), field("b"), field("c")];
        assert_eq!(classify(&c), RiskLevel::Medium);
    }

    #[test]
    fn test_modified_unknown_field_is_low() {
        let mut c = change(ChangeType::Modified);
        c.field_changes = vec![field("unknown")];
        assert_eq!(classify(&c), RiskLevel::Low);
    }

    #[test]
    fn test_risk_never_downgrades_with_more_changes() {
        // growing the change set monotonically can only raise the level
        let mut c = change(ChangeType::Modified);
        let additions = ["remarks", "aliases", "name", "unknown"];
        let mut previous = RiskLevel::Low;
        for name in additions {
            c.field_changes.push(field(name));
            let current = classify(&c);
            assert!(current >= previous, "risk lowered after adding {name}");
            previous = current;
        }
        assert_eq!(previous, RiskLevel::Critical);
    }
}
