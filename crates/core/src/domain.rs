use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Storage format of `image_time`. Lexicographic order equals chronological order.
pub const IMAGE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A single cell value, as stored in the catalog and exchanged through tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    #[default]
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    fn text(value: Option<&str>) -> Self {
        value.map_or(FieldValue::Null, |v| FieldValue::Text(v.to_string()))
    }

    fn integer<T: Into<i64>>(value: Option<T>) -> Self {
        value.map_or(FieldValue::Null, |v| FieldValue::Integer(v.into()))
    }

    /// Loose conversion used for the typed core columns.
    fn as_text(&self) -> Option<String> {
        match self {
            FieldValue::Null => None,
            FieldValue::Integer(i) => Some(i.to_string()),
            FieldValue::Real(r) => Some(r.to_string()),
            FieldValue::Text(s) if s.is_empty() => None,
            FieldValue::Text(s) => Some(s.clone()),
        }
    }

    fn as_i64(&self, field: &str) -> Result<Option<i64>> {
        let invalid = |message: String| Error::InvalidFieldValue {
            field: field.to_string(),
            message,
        };
        match self {
            FieldValue::Null => Ok(None),
            FieldValue::Integer(i) => Ok(Some(*i)),
            FieldValue::Real(r) if r.fract() == 0.0 => Ok(Some(*r as i64)),
            FieldValue::Real(r) => Err(invalid(format!("{r} is not a whole number"))),
            FieldValue::Text(s) if s.trim().is_empty() => Ok(None),
            FieldValue::Text(s) => s
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| invalid(format!("{s:?} is not an integer"))),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => Ok(()),
            FieldValue::Integer(i) => write!(f, "{i}"),
            FieldValue::Real(r) => write!(f, "{r}"),
            FieldValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Real(value)
    }
}

/// One observation of a photo. A file has one observation per `group_number`.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub observation_id: String,
    /// Path relative to the image root, `/`-separated.
    pub image_path: String,
    pub image_hash: Option<String>,
    /// Capture time formatted with [`IMAGE_TIME_FORMAT`].
    pub image_time: Option<String>,
    pub image_w: Option<u32>,
    pub image_h: Option<u32>,
    pub image_bytes: Option<u64>,
    pub group_number: u32,
    pub related: Option<String>,
    pub related_time: Option<String>,
    pub related_seconds: Option<i64>,
    /// User-annotated fields declared by the field schema.
    pub annotations: BTreeMap<String, FieldValue>,
}

impl Observation {
    /// A blank first observation for `image_path` with a freshly generated id.
    pub fn new(image_path: impl Into<String>) -> Self {
        Self {
            observation_id: new_observation_id(),
            image_path: image_path.into(),
            image_hash: None,
            image_time: None,
            image_w: None,
            image_h: None,
            image_bytes: None,
            group_number: 1,
            related: None,
            related_time: None,
            related_seconds: None,
            annotations: BTreeMap::new(),
        }
    }

    /// Name-keyed read access over core columns and annotations alike.
    pub fn get(&self, name: &str) -> FieldValue {
        match name {
            "observation_id" => FieldValue::Text(self.observation_id.clone()),
            "image_path" => FieldValue::Text(self.image_path.clone()),
            "image_hash" => FieldValue::text(self.image_hash.as_deref()),
            "image_time" => FieldValue::text(self.image_time.as_deref()),
            "image_w" => FieldValue::integer(self.image_w),
            "image_h" => FieldValue::integer(self.image_h),
            "image_bytes" => FieldValue::integer(self.image_bytes.map(|b| b as i64)),
            "group_number" => FieldValue::Integer(self.group_number as i64),
            "related" => FieldValue::text(self.related.as_deref()),
            "related_time" => FieldValue::text(self.related_time.as_deref()),
            "related_seconds" => FieldValue::integer(self.related_seconds),
            other => self.annotations.get(other).cloned().unwrap_or_default(),
        }
    }

    /// Name-keyed write access. Core columns are converted to their typed form.
    pub fn set(&mut self, name: &str, value: FieldValue) -> Result<()> {
        match name {
            "observation_id" => {
                self.observation_id = value
                    .as_text()
                    .ok_or_else(|| Error::InvalidFieldValue {
                        field: name.to_string(),
                        message: "observation id cannot be empty".to_string(),
                    })?
            }
            "image_path" => self.image_path = value.as_text().unwrap_or_default(),
            "image_hash" => self.image_hash = value.as_text(),
            "image_time" => {
                self.image_time = match value.as_text() {
                    Some(text) => Some(normalize_image_time(&text).ok_or_else(|| {
                        Error::InvalidFieldValue {
                            field: name.to_string(),
                            message: format!("{text:?} is not a timestamp"),
                        }
                    })?),
                    None => None,
                }
            }
            "image_w" => self.image_w = to_u32(name, value.as_i64(name)?)?,
            "image_h" => self.image_h = to_u32(name, value.as_i64(name)?)?,
            "image_bytes" => self.image_bytes = value.as_i64(name)?.map(|b| b.max(0) as u64),
            "group_number" => {
                self.group_number = to_u32(name, value.as_i64(name)?)?.unwrap_or(1).max(1)
            }
            "related" => self.related = value.as_text(),
            "related_time" => self.related_time = value.as_text(),
            "related_seconds" => self.related_seconds = value.as_i64(name)?,
            other if value.is_null() => {
                self.annotations.remove(other);
            }
            other => {
                self.annotations.insert(other.to_string(), value);
            }
        }
        Ok(())
    }

    pub fn capture_time(&self) -> Option<NaiveDateTime> {
        self.image_time.as_deref().and_then(parse_image_time)
    }

    /// File name component of `image_path`.
    pub fn file_name(&self) -> &str {
        self.image_path
            .rsplit('/')
            .next()
            .unwrap_or(&self.image_path)
    }
}

fn to_u32(field: &str, value: Option<i64>) -> Result<Option<u32>> {
    value
        .map(|v| {
            u32::try_from(v).map_err(|_| Error::InvalidFieldValue {
                field: field.to_string(),
                message: format!("{v} is out of range"),
            })
        })
        .transpose()
}

/// Observation ids are 32-char lowercase hex UUIDs.
pub fn new_observation_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

pub fn parse_image_time(text: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text.trim(), IMAGE_TIME_FORMAT).ok()
}

/// Accepts both the raw EXIF form (`2021:09:24 15:46:41`) and the stored form
/// (`2021-09-24 15:46:41`), returning the stored form.
pub fn normalize_image_time(text: &str) -> Option<String> {
    let text = text.trim().trim_end_matches('\0');
    ["%Y:%m:%d %H:%M:%S", IMAGE_TIME_FORMAT, "%Y-%m-%dT%H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map(|dt| dt.format(IMAGE_TIME_FORMAT).to_string())
}

/// Absolute separation between two stored timestamps, in whole seconds.
pub fn seconds_between(a: &str, b: &str) -> Option<i64> {
    let a = parse_image_time(a)?;
    let b = parse_image_time(b)?;
    Some((b - a).num_seconds().abs())
}

/// Result of comparing the files on disk with the catalogued first observations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncDiff {
    pub only_on_disk: BTreeSet<String>,
    pub only_in_store: BTreeSet<String>,
    pub both: BTreeSet<String>,
}

impl SyncDiff {
    pub fn is_in_sync(&self) -> bool {
        self.only_on_disk.is_empty() && self.only_in_store.is_empty()
    }
}

/// Summary counts over the catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogStats {
    pub total_files: usize,
    pub total_observations: usize,
    pub related_observations: usize,
    pub undated_files: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_image_time_accepts_exif_and_stored_forms() {
        assert_eq!(
            normalize_image_time("2021:09:24 15:46:41").as_deref(),
            Some("2021-09-24 15:46:41")
        );
        assert_eq!(
            normalize_image_time("2021-09-24 15:46:41").as_deref(),
            Some("2021-09-24 15:46:41")
        );
        assert_eq!(normalize_image_time("0000:00:00 00:00:00"), None);
        assert_eq!(normalize_image_time("garbage"), None);
    }

    #[test]
    fn test_seconds_between_is_absolute() {
        assert_eq!(
            seconds_between("2021-09-24 15:46:41", "2021-09-24 15:48:11"),
            Some(90)
        );
        assert_eq!(
            seconds_between("2021-09-24 15:48:11", "2021-09-24 15:46:41"),
            Some(90)
        );
        assert_eq!(seconds_between("2021-09-24 15:48:11", "nope"), None);
    }

    #[test]
    fn test_new_observation_ids_are_unique_hex() {
        let a = new_observation_id();
        let b = new_observation_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_get_and_set_core_fields() {
        let mut obs = Observation::new("2021/a.jpg");
        obs.set("image_w", FieldValue::Text("4000".into())).unwrap();
        obs.set("image_time", "2021:09:24 15:46:41".into()).unwrap();
        obs.set("group_number", FieldValue::Integer(3)).unwrap();
        obs.set("direction", "north".into()).unwrap();

        assert_eq!(obs.image_w, Some(4000));
        assert_eq!(obs.get("image_w"), FieldValue::Integer(4000));
        assert_eq!(obs.image_time.as_deref(), Some("2021-09-24 15:46:41"));
        assert_eq!(obs.group_number, 3);
        assert_eq!(obs.get("direction"), FieldValue::Text("north".into()));
        assert_eq!(obs.get("undeclared"), FieldValue::Null);
        assert_eq!(obs.file_name(), "a.jpg");
    }

    #[test]
    fn test_set_rejects_malformed_core_values() {
        let mut obs = Observation::new("a.jpg");
        assert!(obs.set("image_w", "wide".into()).is_err());
        assert!(obs.set("image_h", FieldValue::Integer(-1)).is_err());
        assert!(obs.set("image_time", "yesterday".into()).is_err());
        assert!(obs.set("observation_id", FieldValue::Null).is_err());
    }

    #[test]
    fn test_empty_text_clears_optional_core_fields() {
        let mut obs = Observation::new("a.jpg");
        obs.related = Some("abc".into());
        obs.set("related", FieldValue::Text(String::new())).unwrap();
        assert_eq!(obs.related, None);
    }
}
