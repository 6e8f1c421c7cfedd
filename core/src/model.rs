/// Records, schemas and match results shared by the scan and replace phases
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Field descriptor of a record type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSchema {
    pub id: String,
    pub api_key: String,
    #[serde(default)]
    pub localized: bool,
}

impl FieldSchema {
    pub fn new(id: impl Into<String>, api_key: impl Into<String>, localized: bool) -> Self {
        Self {
            id: id.into(),
            api_key: api_key.into(),
            localized,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordTypeInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_field_id: Option<String>,
    /// Set for singleton models; the record is fetched by id instead of listed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub singleton_item_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteInfo {
    pub locales: Vec<String>,
}

impl SiteInfo {
    /// First configured locale, used to pick localized titles.
    pub fn main_locale(&self) -> Option<&str> {
        self.locales.first().map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: String,
    pub record_type_id: String,
    pub fields: Map<String, Value>,
}

impl Record {
    pub fn new(id: impl Into<String>, record_type_id: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            record_type_id: record_type_id.into(),
            fields,
        }
    }

    pub fn field(&self, api_key: &str) -> Option<&Value> {
        self.fields.get(api_key)
    }
}

/// Runtime shape of a single field (or locale) value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue<'a> {
    Scalar(&'a str),
    Structured(&'a Value),
    Empty,
}

impl<'a> FieldValue<'a> {
    pub fn of(value: &'a Value) -> Self {
        match value {
            Value::String(text) => FieldValue::Scalar(text),
            Value::Object(_) | Value::Array(_) => FieldValue::Structured(value),
            Value::Null | Value::Bool(_) | Value::Number(_) => FieldValue::Empty,
        }
    }
}

/// One substring hit inside a searched blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Occurrence {
    pub matched_text: String,
    pub context: String,
    /// Byte offset into the searched text.
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "shape")]
pub enum FieldMatch {
    Single {
        matches: Vec<Occurrence>,
    },
    Localized {
        locale_matches: BTreeMap<String, Vec<Occurrence>>,
    },
}

impl FieldMatch {
    pub fn occurrence_count(&self) -> usize {
        match self {
            FieldMatch::Single { matches } => matches.len(),
            FieldMatch::Localized { locale_matches } => {
                locale_matches.values().map(Vec::len).sum()
            }
        }
    }

    pub fn is_localized(&self) -> bool {
        matches!(self, FieldMatch::Localized { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMatches {
    pub field_key: String,
    #[serde(flatten)]
    pub matches: FieldMatch,
}

/// Every match found in one record, grouped by field and locale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedRecord {
    pub record_id: String,
    pub record_type_id: String,
    pub record_type_name: String,
    pub title: String,
    pub fields: Vec<FieldMatches>,
    #[serde(default)]
    pub replaced: bool,
}

impl AggregatedRecord {
    pub fn field(&self, field_key: &str) -> Option<&FieldMatches> {
        self.fields.iter().find(|field| field.field_key == field_key)
    }

    pub fn occurrence_count(&self) -> usize {
        self.fields
            .iter()
            .map(|field| field.matches.occurrence_count())
            .sum()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaceProgress {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub in_progress: bool,
}

impl ReplaceProgress {
    pub fn started(total: usize) -> Self {
        Self {
            total,
            completed: 0,
            failed: 0,
            in_progress: true,
        }
    }

    pub fn finished(&self) -> usize {
        self.completed + self.failed
    }

    pub fn percentage(&self) -> f32 {
        if self.total == 0 {
            return 100.0;
        }
        (self.finished() as f32 / self.total as f32) * 100.0
    }
}
