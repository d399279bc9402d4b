//! Group observations and annotation edits.

use tracing::{debug, info};

use crate::catalog::{RecordStore, RecordUpdate};
use crate::domain::{new_observation_id, FieldValue, Observation};
use crate::error::{Error, Result};
use crate::fields::{FieldSchema, FieldType, RELATION_FIELDS};

/// Add another observation of `image_path`, copied from its highest group.
///
/// The copy gets the next `group_number` and a fresh id; fields with a
/// `clear_to` value in `schema` are reset, and the relation is never copied.
pub fn add_group<S: RecordStore + ?Sized>(
    store: &mut S,
    schema: &FieldSchema,
    image_path: &str,
) -> Result<Observation> {
    let existing = store.records_by_path(image_path)?;
    if !existing.iter().any(|o| o.group_number == 1) {
        return Err(Error::PathNotCataloged(image_path.to_string()));
    }
    let latest = existing
        .iter()
        .max_by_key(|o| o.group_number)
        .ok_or_else(|| Error::PathNotCataloged(image_path.to_string()))?;

    let mut observation = latest.clone();
    observation.observation_id = new_observation_id();
    observation.group_number = latest.group_number + 1;

    for field in &schema.fields {
        let Some(ref reset) = field.clear_to else {
            continue;
        };
        if field.is_protected() && !RELATION_FIELDS.contains(&field.name.as_str()) {
            debug!(field = %field.name, "ignoring clear_to on identity field");
            continue;
        }
        observation.set(&field.name, reset.clone())?;
    }
    observation.related = None;
    observation.related_time = None;
    observation.related_seconds = None;

    store.insert(&observation)?;
    info!(
        path = image_path,
        group = observation.group_number,
        id = %observation.observation_id,
        "added group observation"
    );
    Ok(observation)
}

/// Write one declared, non-protected field of an observation.
///
/// Text is converted to the field's storage type. Membership in the field's
/// value set is not enforced here.
pub fn set_field<S: RecordStore + ?Sized>(
    store: &mut S,
    schema: &FieldSchema,
    observation_id: &str,
    name: &str,
    value: FieldValue,
) -> Result<Observation> {
    let field = schema
        .field(name)
        .ok_or_else(|| Error::UnknownField(name.to_string()))?;
    if field.is_protected() {
        return Err(Error::ProtectedField(name.to_string()));
    }

    let value = match value {
        FieldValue::Text(text) if field.kind != FieldType::Text => field.parse_value(&text)?,
        FieldValue::Integer(i) if field.kind == FieldType::Real => FieldValue::Real(i as f64),
        other => other,
    };
    if !field.allows(&value) {
        debug!(field = name, value = %value, "value outside declared set");
    }

    let mut observation = store
        .record(observation_id)?
        .ok_or_else(|| Error::RelationTargetNotFound(observation_id.to_string()))?;
    observation.set(name, value)?;
    store.update(RecordUpdate::new(observation_id).set(name, observation.get(name)))?;
    Ok(observation)
}
