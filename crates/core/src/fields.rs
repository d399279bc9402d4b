//! The field schema: which columns an observation carries, how they are
//! stored, and how a new group observation resets them.
//!
//! The schema is configuration. A catalog honors whatever schema it is opened
//! with; the core columns are always present regardless of what a schema file
//! declares.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};

use crate::domain::FieldValue;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Integer,
    Real,
}

impl FieldType {
    pub fn sql_type(&self) -> &'static str {
        match self {
            FieldType::Text => "TEXT",
            FieldType::Integer => "INTEGER",
            FieldType::Real => "REAL",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FieldType,
    #[serde(default)]
    pub show: bool,
    #[serde(default)]
    pub input: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<String>>,
    /// Value a new group observation starts with. `Some(Null)` clears the field.
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub clear_to: Option<FieldValue>,
}

fn deserialize_present<'de, D>(deserializer: D) -> std::result::Result<Option<FieldValue>, D::Error>
where
    D: Deserializer<'de>,
{
    FieldValue::deserialize(deserializer).map(Some)
}

impl FieldDef {
    pub fn new(name: &str, kind: FieldType) -> Self {
        Self {
            name: name.to_string(),
            kind,
            show: false,
            input: false,
            values: None,
            clear_to: None,
        }
    }

    fn shown(mut self) -> Self {
        self.show = true;
        self
    }

    fn editable(mut self) -> Self {
        self.input = true;
        self
    }

    fn cleared_to(mut self, value: FieldValue) -> Self {
        self.clear_to = Some(value);
        self
    }

    fn with_values(mut self, values: &[&str]) -> Self {
        self.values = Some(values.iter().map(|v| v.to_string()).collect());
        self
    }

    pub fn is_core(&self) -> bool {
        CORE_FIELDS.iter().any(|(name, _)| *name == self.name)
    }

    /// Identity and relation columns are only written by the engine itself.
    pub fn is_protected(&self) -> bool {
        PROTECTED_FIELDS.contains(&self.name.as_str())
    }

    /// Convert user-entered text to this field's storage type. Empty text is null.
    pub fn parse_value(&self, text: &str) -> Result<FieldValue> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(FieldValue::Null);
        }
        let invalid = |what: &str| Error::InvalidFieldValue {
            field: self.name.clone(),
            message: format!("{trimmed:?} is not {what}"),
        };
        match self.kind {
            FieldType::Text => Ok(FieldValue::Text(text.to_string())),
            FieldType::Integer => trimmed
                .parse()
                .map(FieldValue::Integer)
                .map_err(|_| invalid("an integer")),
            FieldType::Real => trimmed
                .parse()
                .map(FieldValue::Real)
                .map_err(|_| invalid("a number")),
        }
    }

    /// Whether `value` lies in the declared value set. Fields without one accept anything.
    pub fn allows(&self, value: &FieldValue) -> bool {
        match (&self.values, value) {
            (None, _) | (_, FieldValue::Null) => true,
            (Some(values), v) => values.iter().any(|allowed| *allowed == v.to_string()),
        }
    }

    fn value_matches_kind(&self, value: &FieldValue) -> bool {
        matches!(
            (self.kind, value),
            (_, FieldValue::Null)
                | (FieldType::Text, FieldValue::Text(_))
                | (FieldType::Integer, FieldValue::Integer(_))
                | (FieldType::Real, FieldValue::Real(_))
                | (FieldType::Real, FieldValue::Integer(_))
        )
    }
}

/// Core columns in storage order. Every schema contains these.
pub const CORE_FIELDS: &[(&str, FieldType)] = &[
    ("observation_id", FieldType::Text),
    ("image_path", FieldType::Text),
    ("image_hash", FieldType::Text),
    ("image_time", FieldType::Text),
    ("image_w", FieldType::Integer),
    ("image_h", FieldType::Integer),
    ("image_bytes", FieldType::Integer),
    ("group_number", FieldType::Integer),
    ("related", FieldType::Text),
    ("related_time", FieldType::Text),
    ("related_seconds", FieldType::Integer),
];

pub const PROTECTED_FIELDS: &[&str] = &[
    "observation_id",
    "image_path",
    "image_hash",
    "group_number",
    "related",
    "related_time",
    "related_seconds",
];

pub const RELATION_FIELDS: &[&str] = &["related", "related_time", "related_seconds"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    #[serde(default = "default_version")]
    pub version: u32,
    pub fields: Vec<FieldDef>,
}

fn default_version() -> u32 {
    1
}

impl Default for FieldSchema {
    /// Core fields plus the annotations of a wildlife/people sighting log.
    fn default() -> Self {
        let directions = ["N", "NE", "E", "SE", "S", "SW", "W", "NW", "unknown"];
        let activities = ["walking", "running", "cycling", "sitting", "feeding", "other"];
        let fields = vec![
            FieldDef::new("adults_n", FieldType::Integer)
                .editable()
                .cleared_to(FieldValue::Null),
            FieldDef::new("children_n", FieldType::Integer)
                .editable()
                .cleared_to(FieldValue::Null),
            FieldDef::new("pets_n", FieldType::Integer)
                .editable()
                .cleared_to(FieldValue::Null),
            FieldDef::new("direction", FieldType::Text)
                .editable()
                .with_values(&directions)
                .cleared_to(FieldValue::Null),
            FieldDef::new("activity", FieldType::Text)
                .editable()
                .with_values(&activities)
                .cleared_to(FieldValue::Null),
            FieldDef::new("notes", FieldType::Text).editable(),
        ];
        // The built-in set always validates.
        Self::from_fields(1, fields).unwrap_or_else(|_| Self {
            version: 1,
            fields: core_defs(),
        })
    }
}

fn core_defs() -> Vec<FieldDef> {
    CORE_FIELDS
        .iter()
        .map(|(name, kind)| {
            let def = FieldDef::new(name, *kind);
            match *name {
                "observation_id" | "image_path" | "image_time" | "group_number" => def.shown(),
                "related" => def.editable().cleared_to(FieldValue::Null),
                "related_time" | "related_seconds" => def.shown().cleared_to(FieldValue::Null),
                _ => def,
            }
        })
        .collect()
}

impl FieldSchema {
    /// Build a schema from declared fields. Missing core fields are added in
    /// front; declared core fields keep their flags but not a different type.
    pub fn from_fields(version: u32, declared: Vec<FieldDef>) -> Result<Self> {
        let mut seen = HashSet::new();
        for def in &declared {
            if !is_identifier(&def.name) {
                return Err(Error::InvalidFieldSchema(format!(
                    "field name {:?} must be alphanumeric/underscore and not start with a digit",
                    def.name
                )));
            }
            if !seen.insert(def.name.to_ascii_lowercase()) {
                return Err(Error::InvalidFieldSchema(format!(
                    "field {:?} declared twice",
                    def.name
                )));
            }
            if let Some((_, kind)) = CORE_FIELDS.iter().find(|(name, _)| *name == def.name) {
                if *kind != def.kind {
                    return Err(Error::InvalidFieldSchema(format!(
                        "core field {:?} must have type {:?}",
                        def.name, kind
                    )));
                }
            }
            if let Some(ref clear_to) = def.clear_to {
                if !def.value_matches_kind(clear_to) {
                    return Err(Error::InvalidFieldSchema(format!(
                        "clear_to of {:?} does not match its type",
                        def.name
                    )));
                }
            }
        }

        let mut fields: Vec<FieldDef> = core_defs()
            .into_iter()
            .filter(|core| !declared.iter().any(|d| d.name == core.name))
            .collect();
        fields.extend(declared);
        // Core columns first, in storage order; annotations keep declaration order.
        fields.sort_by_key(|f| {
            CORE_FIELDS
                .iter()
                .position(|(name, _)| *name == f.name)
                .unwrap_or(CORE_FIELDS.len())
        });
        Ok(Self { version, fields })
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let raw: FieldSchema = serde_json::from_str(text)?;
        Self::from_fields(raw.version, raw.fields)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// All column names, core first.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// User-declared, non-core fields.
    pub fn annotation_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|f| !f.is_core())
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
