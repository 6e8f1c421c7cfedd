/// Matching of a single record against the search pattern
use crate::classifier::FieldClassification;
use crate::model::{Occurrence, Record, RecordTypeInfo};
use crate::pattern::{find_occurrences, SearchPattern};
use log::debug;
use serde::Serialize;
use serde_json::Value;

/// Envelope keys that never hold content.
pub const SKIPPED_KEYS: &[&str] = &["id", "item_type", "meta"];

/// Hits of one field (and one locale, for localized fields) of one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMatch {
    pub record_id: String,
    pub record_type_id: String,
    pub record_type_name: String,
    pub title: String,
    pub field_key: String,
    pub locale: Option<String>,
    pub occurrences: Vec<Occurrence>,
}

#[derive(Debug, Clone, Default)]
pub struct RecordScan {
    pub title: String,
    pub hits: Vec<RawMatch>,
}

pub struct RecordScanner<'a> {
    record_type: &'a RecordTypeInfo,
    classification: &'a FieldClassification,
    main_locale: Option<&'a str>,
}

impl<'a> RecordScanner<'a> {
    pub fn new(
        record_type: &'a RecordTypeInfo,
        classification: &'a FieldClassification,
        main_locale: Option<&'a str>,
    ) -> Self {
        Self {
            record_type,
            classification,
            main_locale,
        }
    }

    pub fn scan(&self, record: &Record, pattern: &SearchPattern) -> RecordScan {
        let title = self.resolve_title(record);
        let mut hits = Vec::new();

        for (field_key, value) in &record.fields {
            if SKIPPED_KEYS.contains(&field_key.as_str()) {
                continue;
            }

            if self.classification.is_localized(field_key) {
                let Some(locales) = value.as_object() else {
                    debug!(
                        "record {}: localized field {field_key} holds no locale map, skipping",
                        record.id
                    );
                    continue;
                };
                for (locale, locale_value) in locales {
                    let occurrences = find_occurrences(locale_value, pattern);
                    if !occurrences.is_empty() {
                        hits.push(self.raw_match(record, &title, field_key, Some(locale), occurrences));
                    }
                }
            } else {
                let occurrences = find_occurrences(value, pattern);
                if !occurrences.is_empty() {
                    hits.push(self.raw_match(record, &title, field_key, None, occurrences));
                }
            }
        }

        RecordScan { title, hits }
    }

    fn raw_match(
        &self,
        record: &Record,
        title: &str,
        field_key: &str,
        locale: Option<&String>,
        occurrences: Vec<Occurrence>,
    ) -> RawMatch {
        RawMatch {
            record_id: record.id.clone(),
            record_type_id: self.record_type.id.clone(),
            record_type_name: self.record_type.name.clone(),
            title: title.to_string(),
            field_key: field_key.to_string(),
            locale: locale.cloned(),
            occurrences,
        }
    }

    /// Display title of a record. Localized titles prefer the main locale and
    /// fall back to the first locale with a non-empty value.
    pub fn resolve_title(&self, record: &Record) -> String {
        let Some(title_key) = self.classification.title_field() else {
            return String::new();
        };
        let Some(value) = record.field(title_key) else {
            return String::new();
        };

        match value.as_object() {
            Some(locales) if self.classification.is_localized(title_key) => {
                let preferred = self
                    .main_locale
                    .and_then(|locale| locales.get(locale))
                    .map(display_text)
                    .filter(|text| !text.is_empty());
                preferred
                    .or_else(|| {
                        locales
                            .values()
                            .map(display_text)
                            .find(|text| !text.is_empty())
                    })
                    .unwrap_or_default()
            }
            _ => display_text(value),
        }
    }
}

fn display_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        _ => value.to_string(),
    }
}
