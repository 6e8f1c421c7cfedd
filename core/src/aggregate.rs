use crate::model::{AggregatedRecord, FieldMatch, FieldMatches, Occurrence};
use crate::scanner::RawMatch;
use log::warn;
use std::collections::{BTreeMap, HashMap};

/// Folds raw per-field hits into one entry per record, keeping the order in
/// which records were first seen.
#[derive(Debug, Default)]
pub struct Aggregator {
    records: Vec<AggregatedRecord>,
    index: HashMap<String, usize>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, raw: RawMatch) {
        let slot = match self.index.get(&raw.record_id) {
            Some(&slot) => slot,
            None => {
                self.records.push(AggregatedRecord {
                    record_id: raw.record_id.clone(),
                    record_type_id: raw.record_type_id.clone(),
                    record_type_name: raw.record_type_name.clone(),
                    title: raw.title.clone(),
                    fields: Vec::new(),
                    replaced: false,
                });
                self.index.insert(raw.record_id.clone(), self.records.len() - 1);
                self.records.len() - 1
            }
        };

        let record = &mut self.records[slot];
        match record
            .fields
            .iter_mut()
            .find(|field| field.field_key == raw.field_key)
        {
            Some(existing) => merge_into(&record.record_id, existing, raw.locale, raw.occurrences),
            None => record.fields.push(FieldMatches {
                field_key: raw.field_key,
                matches: new_field_match(raw.locale, raw.occurrences),
            }),
        }
    }

    pub fn extend<I: IntoIterator<Item = RawMatch>>(&mut self, raws: I) {
        for raw in raws {
            self.push(raw);
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn finish(self) -> Vec<AggregatedRecord> {
        self.records
    }
}

fn new_field_match(locale: Option<String>, occurrences: Vec<Occurrence>) -> FieldMatch {
    match locale {
        Some(locale) => {
            let mut locale_matches = BTreeMap::new();
            locale_matches.insert(locale, occurrences);
            FieldMatch::Localized { locale_matches }
        }
        None => FieldMatch::Single {
            matches: occurrences,
        },
    }
}

fn merge_into(
    record_id: &str,
    existing: &mut FieldMatches,
    locale: Option<String>,
    occurrences: Vec<Occurrence>,
) {
    match (&mut existing.matches, locale) {
        (FieldMatch::Localized { locale_matches }, Some(locale)) => {
            locale_matches.entry(locale).or_default().extend(occurrences);
        }
        (FieldMatch::Single { matches }, None) => matches.extend(occurrences),
        (FieldMatch::Single { matches }, Some(locale)) => {
            warn!(
                "record {record_id}: field {} switched to per-locale hits, dropping {} unlocalized hit(s)",
                existing.field_key,
                matches.len()
            );
            existing.matches = new_field_match(Some(locale), occurrences);
        }
        (FieldMatch::Localized { .. }, None) => {
            warn!(
                "record {record_id}: unlocalized hits for localized field {}, dropping {} hit(s)",
                existing.field_key,
                occurrences.len()
            );
        }
    }
}

/// Total occurrences across all records.
pub fn total_occurrences(records: &[AggregatedRecord]) -> usize {
    records.iter().map(AggregatedRecord::occurrence_count).sum()
}
