//! Snapshot diffing: set-diff on uids plus field-diff on survivors.
//!
//! One hash-join over both snapshots; no nested scans. Output is
//! deterministic for equivalent inputs: ADDED, then MODIFIED, then
//! REMOVED, each sorted by uid.

use crate::schema::{
    ChangeType, EntityType, FieldChange, FieldChangeKind, SanctionedEntity, Source,
};

use serde_json::Value;
use std::collections::{BTreeSet, HashMap};

/// One detected entity-level change, before risk classification.
#[derive(Debug, Clone)]
pub struct EntityChange {
    pub change_type: ChangeType,
    pub uid: String,
    pub entity_name: String,
    pub entity_type: EntityType,
    /// Programs of the surviving snapshot (new for ADDED/MODIFIED, old
    /// for REMOVED); input to the risk classifier.
    pub programs: Vec<String>,
    pub old_content_hash: Option<String>,
    pub new_content_hash: Option<String>,
    pub field_changes: Vec<FieldChange>,
}

impl EntityChange {
    /// Deterministic one-line description for the change event.
    pub fn summary(&self, source: Source) -> String {
        let base = format!(
            "{} {} ({}) from {}",
            self.change_type, self.entity_name, self.uid, source
        );
        if self.field_changes.is_empty() {
            base
        } else {
            let fields: Vec<&str> = self
                .field_changes
                .iter()
                .map(|f| f.field_name.as_str())
                .collect();
            format!("{base}: {}", fields.join(", "))
        }
    }
}

/// Compare the prior snapshot against the new entity set.
///
/// Both inputs are uniquely keyed by uid; later duplicates in `new`
/// replace earlier ones, matching upsert semantics.
pub fn diff_source(old: &[SanctionedEntity], new: &[SanctionedEntity]) -> Vec<EntityChange> {
    let old_by_uid: HashMap<&str, &SanctionedEntity> =
        old.iter().map(|e| (e.uid.as_str(), e)).collect();
    let new_by_uid: HashMap<&str, &SanctionedEntity> =
        new.iter().map(|e| (e.uid.as_str(), e)).collect();

    let mut added = Vec::new();
    let mut modified = Vec::new();
    let mut removed = Vec::new();

    for (uid, entity) in &new_by_uid {
        match old_by_uid.get(uid) {
            None => added.push(EntityChange {
                change_type: ChangeType::Added,
                uid: entity.uid.clone(),
                entity_name: entity.name.clone(),
                entity_type: entity.entity_type,
                programs: entity.programs.clone(),
                old_content_hash: None,
                new_content_hash: Some(entity.content_hash.clone()),
                field_changes: Vec::new(),
            }),
            Some(prior) => {
                if prior.content_hash == entity.content_hash {
                    continue;
                }
                let field_changes = diff_fields(prior, entity);
                if field_changes.is_empty() {
                    continue;
                }
                modified.push(EntityChange {
                    change_type: ChangeType::Modified,
                    uid: entity.uid.clone(),
                    entity_name: entity.name.clone(),
                    entity_type: entity.entity_type,
                    programs: entity.programs.clone(),
                    old_content_hash: Some(prior.content_hash.clone()),
                    new_content_hash: Some(entity.content_hash.clone()),
                    field_changes,
                });
            }
        }
    }

    for (uid, entity) in &old_by_uid {
        if !new_by_uid.contains_key(uid) {
            removed.push(EntityChange {
                change_type: ChangeType::Removed,
                uid: entity.uid.clone(),
                entity_name: entity.name.clone(),
                entity_type: entity.entity_type,
                programs: entity.programs.clone(),
                old_content_hash: Some(entity.content_hash.clone()),
                new_content_hash: None,
                field_changes: Vec::new(),
            });
        }
    }

    added.sort_by(|a, b| a.uid.cmp(&b.uid));
    modified.sort_by(|a, b| a.uid.cmp(&b.uid));
    removed.sort_by(|a, b| a.uid.cmp(&b.uid));

    let mut changes = added;
    changes.append(&mut modified);
    changes.append(&mut removed);
    changes
}

/// Field-level diff over the tracked set. Scalars compare trimmed;
/// list fields compare as sets of normalized strings (order and
/// duplicates ignored) and report sorted arrays.
fn diff_fields(old: &SanctionedEntity, new: &SanctionedEntity) -> Vec<FieldChange> {
    let mut changes = Vec::new();

    push_scalar(&mut changes, "name", Some(&old.name), Some(&new.name));
    push_scalar(
        &mut changes,
        "entity_type",
        Some(old.entity_type.as_str()),
        Some(new.entity_type.as_str()),
    );
    push_list(&mut changes, "programs", &old.programs, &new.programs);
    push_list(&mut changes, "aliases", &old.aliases, &new.aliases);

    let old_addresses: Vec<String> = old.addresses.iter().map(|a| a.render()).collect();
    let new_addresses: Vec<String> = new.addresses.iter().map(|a| a.render()).collect();
    push_list(&mut changes, "addresses", &old_addresses, &new_addresses);

    push_list(
        &mut changes,
        "nationalities",
        &old.nationalities,
        &new.nationalities,
    );
    push_list(
        &mut changes,
        "dates_of_birth",
        &old.dates_of_birth,
        &new.dates_of_birth,
    );
    push_list(
        &mut changes,
        "places_of_birth",
        &old.places_of_birth,
        &new.places_of_birth,
    );
    push_scalar(
        &mut changes,
        "remarks",
        old.remarks.as_deref(),
        new.remarks.as_deref(),
    );

    changes
}

fn push_scalar(changes: &mut Vec<FieldChange>, name: &str, old: Option<&str>, new: Option<&str>) {
    let old_norm = old.map(str::trim).filter(|s| !s.is_empty());
    let new_norm = new.map(str::trim).filter(|s| !s.is_empty());
    if old_norm == new_norm {
        return;
    }
    let kind = match (old_norm, new_norm) {
        (None, Some(_)) => FieldChangeKind::Added,
        (Some(_), None) => FieldChangeKind::Removed,
        _ => FieldChangeKind::Modified,
    };
    changes.push(FieldChange {
        field_name: name.to_string(),
        old_value: old_norm.map_or(Value::Null, |s| Value::String(s.to_string())),
        new_value: new_norm.map_or(Value::Null, |s| Value::String(s.to_string())),
        kind,
    });
}

fn push_list(changes: &mut Vec<FieldChange>, name: &str, old: &[String], new: &[String]) {
    let old_set = normalized_set(old);
    let new_set = normalized_set(new);
    if old_set == new_set {
        return;
    }
    let kind = match (old_set.is_empty(), new_set.is_empty()) {
        (true, false) => FieldChangeKind::Added,
        (false, true) => FieldChangeKind::Removed,
        _ => FieldChangeKind::Modified,
    };
    changes.push(FieldChange {
        field_name: name.to_string(),
        old_value: sorted_array(&old_set),
        new_value: sorted_array(&new_set),
        kind,
    });
}

fn normalized_set(values: &[String]) -> BTreeSet<String> {
    values
        .iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

fn sorted_array(set: &BTreeSet<String>) -> Value {
    Value::Array(set.iter().cloned().map(Value::String).collect())
}
