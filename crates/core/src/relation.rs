//! Reciprocal "related" links between observations.
//!
//! Invariant: if A.related == B then B.related == A. Every write here clears
//! whatever would otherwise be left pointing one way.

use std::collections::BTreeSet;

use tracing::{debug, info};

use crate::catalog::{RecordStore, RecordUpdate};
use crate::domain::{seconds_between, FieldValue, Observation};
use crate::error::{Error, Result};

/// What a call to [`set_related`] changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationChange {
    /// Absolute capture-time separation, if both observations are dated.
    pub separation_seconds: Option<i64>,
    /// Former partners whose back-reference was cleared.
    pub detached: Vec<String>,
}

fn load<S: RecordStore + ?Sized>(store: &S, id: &str) -> Result<Observation> {
    store
        .record(id)?
        .ok_or_else(|| Error::RelationTargetNotFound(id.to_string()))
}

fn cleared(id: &str) -> RecordUpdate {
    RecordUpdate::new(id)
        .set("related", FieldValue::Null)
        .set("related_time", FieldValue::Null)
        .set("related_seconds", FieldValue::Null)
}

fn linked(id: &str, partner: &Observation, seconds: Option<i64>) -> RecordUpdate {
    RecordUpdate::new(id)
        .set("related", partner.observation_id.as_str())
        .set(
            "related_time",
            partner
                .image_time
                .clone()
                .map_or(FieldValue::Null, FieldValue::Text),
        )
        .set("related_seconds", seconds.map_or(FieldValue::Null, FieldValue::Integer))
}

/// Link `id_a` and `id_b` both ways, snapshotting each other's capture time
/// and their separation. Any earlier partner of either side is unlinked in
/// the same transaction.
pub fn set_related<S: RecordStore + ?Sized>(
    store: &mut S,
    id_a: &str,
    id_b: &str,
) -> Result<RelationChange> {
    if id_a == id_b {
        return Err(Error::SelfRelation(id_a.to_string()));
    }
    let a = load(store, id_a)?;
    let b = load(store, id_b)?;

    let seconds = match (&a.image_time, &b.image_time) {
        (Some(ta), Some(tb)) => seconds_between(ta, tb),
        _ => None,
    };

    let mut stale = BTreeSet::new();
    for other in store.related_records(id_a, id_b)? {
        stale.insert(other.observation_id);
    }
    for other in store.related_records(id_b, id_a)? {
        stale.insert(other.observation_id);
    }

    let mut updates: Vec<RecordUpdate> = stale.iter().map(|id| cleared(id)).collect();
    updates.push(linked(id_a, &b, seconds));
    updates.push(linked(id_b, &a, seconds));
    store.update_batch(&updates)?;

    info!(a = id_a, b = id_b, seconds = ?seconds, detached = stale.len(), "related observations");
    Ok(RelationChange {
        separation_seconds: seconds,
        detached: stale.into_iter().collect(),
    })
}

/// Clear the relation of `id` and of its partner. Returns the ids that were
/// cleared; empty when there was no relation.
pub fn unset_related<S: RecordStore + ?Sized>(store: &mut S, id: &str) -> Result<Vec<String>> {
    let observation = load(store, id)?;

    let mut targets = BTreeSet::new();
    if let Some(ref partner) = observation.related {
        targets.insert(id.to_string());
        match store.record(partner)? {
            Some(p) if p.related.as_deref() == Some(id) => {
                targets.insert(p.observation_id);
            }
            Some(_) => {}
            None => debug!(id, partner = %partner, "partner no longer exists"),
        }
    }
    for other in store.related_records(id, id)? {
        targets.insert(other.observation_id);
    }

    if targets.is_empty() {
        return Ok(Vec::new());
    }
    let updates: Vec<RecordUpdate> = targets.iter().map(|t| cleared(t)).collect();
    store.update_batch(&updates)?;
    info!(id, cleared = targets.len(), "unrelated observation");
    Ok(targets.into_iter().collect())
}

/// Observations currently linked to `id`.
pub fn partners<S: RecordStore + ?Sized>(store: &S, id: &str) -> Result<Vec<Observation>> {
    load(store, id)?;
    store.related_records(id, id)
}
