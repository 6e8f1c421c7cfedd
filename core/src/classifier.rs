use crate::model::{FieldSchema, RecordTypeInfo};
use std::collections::HashSet;

/// Per-record-type answer to "does this field hold one value or a locale map?".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldClassification {
    localized: HashSet<String>,
    title_field: Option<String>,
}

impl FieldClassification {
    pub fn is_localized(&self, api_key: &str) -> bool {
        self.localized.contains(api_key)
    }

    pub fn title_field(&self) -> Option<&str> {
        self.title_field.as_deref()
    }

    pub fn localized_fields(&self) -> impl Iterator<Item = &str> {
        self.localized.iter().map(String::as_str)
    }
}

pub fn classify(record_type: &RecordTypeInfo, fields: &[FieldSchema]) -> FieldClassification {
    let localized = fields
        .iter()
        .filter(|field| field.localized)
        .map(|field| field.api_key.clone())
        .collect();

    let title_field = record_type.title_field_id.as_deref().and_then(|title_id| {
        fields
            .iter()
            .find(|field| field.id == title_id)
            .map(|field| field.api_key.clone())
    });

    FieldClassification {
        localized,
        title_field,
    }
}
