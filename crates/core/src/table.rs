//! CSV exchange of catalog records, keyed by field name.
//!
//! The header is the schema's field list. Empty cells are null.

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::Path;

use tracing::{info, warn};

use crate::catalog::RecordStore;
use crate::domain::Observation;
use crate::error::{Error, Result};
use crate::fields::FieldSchema;

/// Write every observation, chronologically, one column per schema field.
pub fn export_table<S: RecordStore + ?Sized>(
    store: &S,
    schema: &FieldSchema,
    destination: &Path,
) -> Result<usize> {
    let file = std::fs::File::create(destination)?;
    let count = write_table(store, schema, file)?;
    info!(path = %destination.display(), rows = count, "exported table");
    Ok(count)
}

pub fn write_table<S: RecordStore + ?Sized, W: io::Write>(
    store: &S,
    schema: &FieldSchema,
    writer: W,
) -> Result<usize> {
    let mut writer = csv::Writer::from_writer(writer);
    let names: Vec<&str> = schema.names().collect();
    writer.write_record(&names)?;

    let records = store.all_records()?;
    for observation in &records {
        writer.write_record(names.iter().map(|name| observation.get(name).to_string()))?;
    }
    writer.flush()?;
    Ok(records.len())
}

/// Insert every row of the table at `source` as a new observation.
pub fn import_table<S: RecordStore + ?Sized>(
    source: &Path,
    schema: &FieldSchema,
    store: &mut S,
) -> Result<usize> {
    let file = std::fs::File::open(source)?;
    let count = read_table(file, schema, store)?;
    info!(path = %source.display(), rows = count, "imported table");
    Ok(count)
}

/// All rows are parsed and checked against the store before the first insert,
/// so a malformed table, a clashing id or a one-sided relation leaves the
/// store untouched. A `related` id must name an observation, in the table or
/// already stored, that relates back.
pub fn read_table<R: io::Read, S: RecordStore + ?Sized>(
    reader: R,
    schema: &FieldSchema,
    store: &mut S,
) -> Result<usize> {
    let mut reader = csv::Reader::from_reader(reader);
    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

    for required in ["observation_id", "image_path"] {
        if !headers.iter().any(|h| h == required) {
            return Err(Error::InvalidFieldSchema(format!(
                "table has no {required:?} column"
            )));
        }
    }
    let columns: Vec<Option<_>> = headers
        .iter()
        .map(|name| {
            let field = schema.field(name);
            if field.is_none() {
                warn!(column = %name, "ignoring undeclared column");
            }
            field
        })
        .collect();

    let mut observations = Vec::new();
    for row in reader.records() {
        let row = row?;
        let mut observation = Observation::new(String::new());
        for (cell, field) in row.iter().zip(&columns) {
            let Some(field) = field else { continue };
            observation.set(&field.name, field.parse_value(cell)?)?;
        }
        observations.push(observation);
    }

    let mut ids = HashSet::new();
    let mut slots = HashSet::new();
    for observation in &observations {
        let id = observation.observation_id.as_str();
        if !ids.insert(id) || store.record(id)?.is_some() {
            return Err(Error::DuplicateObservation(id.to_string()));
        }
        let path = observation.image_path.as_str();
        let taken = store
            .records_by_path(path)?
            .iter()
            .any(|o| o.group_number == observation.group_number);
        if !slots.insert((path, observation.group_number)) || taken {
            return Err(Error::DuplicatePath(format!(
                "{path}#{}",
                observation.group_number
            )));
        }
    }

    let by_id: HashMap<&str, &Observation> = observations
        .iter()
        .map(|o| (o.observation_id.as_str(), o))
        .collect();
    for observation in &observations {
        let id = observation.observation_id.as_str();
        let Some(partner_id) = observation.related.as_deref() else {
            continue;
        };
        if partner_id == id {
            return Err(Error::SelfRelation(id.to_string()));
        }
        let partner_related = match by_id.get(partner_id) {
            Some(partner) => partner.related.clone(),
            None => {
                store
                    .record(partner_id)?
                    .ok_or_else(|| Error::RelationTargetNotFound(partner_id.to_string()))?
                    .related
            }
        };
        if partner_related.as_deref() != Some(id) {
            return Err(Error::InvalidFieldValue {
                field: "related".to_string(),
                message: format!("{partner_id} does not relate back to {id}"),
            });
        }
    }

    for observation in &observations {
        store.insert(observation)?;
    }
    Ok(observations.len())
}
