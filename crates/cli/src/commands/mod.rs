pub mod edit;
pub mod ls;
pub mod rename;
pub mod root;
pub mod status;
pub mod sync;
pub mod table;

/// First characters of an observation id, enough to tell rows apart.
pub(crate) fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}
