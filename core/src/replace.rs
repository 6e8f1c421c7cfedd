//! Rewriting of matched fields.
//!
//! Structured values are rewritten on their serialized form and parsed back,
//! so a replacement that breaks the JSON syntax surfaces as a
//! `SerializationFailure` instead of a corrupted write.

use crate::error::EngineError;
use crate::model::{AggregatedRecord, FieldMatch, FieldValue, Record};
use crate::pattern::SearchPattern;
use crate::store::RecordStore;
use log::{debug, info};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceOutcome {
    /// The store accepted a patch touching this many fields.
    Updated { fields: usize },
    /// Nothing changed in the fresh copy, no write was made.
    Unchanged,
}

pub struct ReplaceEngine<'a> {
    pattern: &'a SearchPattern,
    replacement: &'a str,
}

impl<'a> ReplaceEngine<'a> {
    pub fn new(pattern: &'a SearchPattern, replacement: &'a str) -> Self {
        Self {
            pattern,
            replacement,
        }
    }

    /// Reads a fresh copy of the record, rewrites the matched fields and
    /// writes back only what changed.
    pub async fn replace_record<S>(
        &self,
        store: &S,
        aggregated: &AggregatedRecord,
    ) -> Result<ReplaceOutcome, EngineError>
    where
        S: RecordStore + ?Sized,
    {
        let record_id = &aggregated.record_id;
        let fresh = store
            .get_record(record_id)
            .await
            .map_err(|source| EngineError::RecordFetchFailure {
                record_id: record_id.clone(),
                source,
            })?;

        let patch = build_patch(&fresh, aggregated, self.pattern, self.replacement)?;
        if patch.is_empty() {
            debug!("record {record_id}: nothing left to replace");
            return Ok(ReplaceOutcome::Unchanged);
        }

        let fields = patch.len();
        store
            .update_record(record_id, patch)
            .await
            .map_err(|source| EngineError::UpdateRejected {
                record_id: record_id.clone(),
                source,
            })?;
        info!("record {record_id}: updated {fields} field(s)");
        Ok(ReplaceOutcome::Updated { fields })
    }
}

/// Patch for `record` covering the fields listed in `aggregated`. Only fields
/// whose value actually changes are included.
pub fn build_patch(
    record: &Record,
    aggregated: &AggregatedRecord,
    pattern: &SearchPattern,
    replacement: &str,
) -> Result<Map<String, Value>, EngineError> {
    let mut patch = Map::new();

    for field in &aggregated.fields {
        let key = &field.field_key;
        let Some(current) = record.field(key) else {
            debug!("record {}: field {key} is gone, skipping", record.id);
            continue;
        };

        let updated = match &field.matches {
            FieldMatch::Localized { locale_matches } => {
                let Some(locales) = current.as_object() else {
                    debug!("record {}: field {key} is no longer localized, skipping", record.id);
                    continue;
                };
                let mut rewritten = locales.clone();
                for locale in locale_matches.keys() {
                    if let Some(value) = locales.get(locale) {
                        let value = substitute_value(&record.id, key, value, pattern, replacement)?;
                        rewritten.insert(locale.clone(), value);
                    }
                }
                Value::Object(rewritten)
            }
            FieldMatch::Single { .. } => {
                substitute_value(&record.id, key, current, pattern, replacement)?
            }
        };

        if &updated != current {
            patch.insert(key.clone(), updated);
        }
    }

    Ok(patch)
}

/// Substitutes every hit inside one value.
pub fn substitute_value(
    record_id: &str,
    field_key: &str,
    value: &Value,
    pattern: &SearchPattern,
    replacement: &str,
) -> Result<Value, EngineError> {
    match FieldValue::of(value) {
        FieldValue::Scalar(text) => Ok(Value::String(pattern.replace_all(text, replacement).0)),
        FieldValue::Structured(node) => {
            let failure = |message: String| EngineError::SerializationFailure {
                record_id: record_id.to_string(),
                field_key: field_key.to_string(),
                message,
            };
            let serialized = serde_json::to_string(node).map_err(|err| failure(err.to_string()))?;
            let (text, count) = pattern.replace_all(&serialized, replacement);
            if count == 0 {
                return Ok(value.clone());
            }
            serde_json::from_str(&text).map_err(|err| failure(err.to_string()))
        }
        FieldValue::Empty => Ok(value.clone()),
    }
}
