//! Pattern matching over field values.
//!
//! Literal patterns are matched case-insensitively. When collecting
//! occurrences the scan resumes one character after the start of every hit,
//! so overlapping hits ("aa" in "aaa") are all reported. Substitution and
//! highlighting consume hits left to right without overlap.

use crate::context::context_around;
use crate::error::EngineError;
use crate::model::{FieldValue, Occurrence};
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use serde_json::Value;
use std::ops::Range;

#[derive(Debug, Clone)]
pub enum SearchPattern {
    Literal { text: String, folded: Vec<char> },
    Regex(Regex),
}

impl SearchPattern {
    /// Builds a literal pattern. Surrounding whitespace is kept, only blank
    /// input is rejected.
    pub fn literal(input: &str) -> Result<Self, EngineError> {
        if input.trim().is_empty() {
            return Err(EngineError::EmptyInput);
        }
        Ok(SearchPattern::Literal {
            text: input.to_string(),
            folded: fold(input),
        })
    }

    pub fn regex(input: &str) -> Result<Self, EngineError> {
        if input.trim().is_empty() {
            return Err(EngineError::EmptyInput);
        }
        let regex = RegexBuilder::new(input)
            .case_insensitive(true)
            .build()
            .map_err(|err| EngineError::InvalidPattern(err.to_string()))?;
        Ok(SearchPattern::Regex(regex))
    }

    pub fn parse(input: &str, use_regex: bool) -> Result<Self, EngineError> {
        if use_regex {
            Self::regex(input)
        } else {
            Self::literal(input)
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            SearchPattern::Literal { text, .. } => text,
            SearchPattern::Regex(regex) => regex.as_str(),
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, SearchPattern::Literal { .. })
    }

    /// Every hit in `text`, in scan order. Literal hits may overlap.
    pub fn find_ranges(&self, text: &str) -> Vec<Range<usize>> {
        match self {
            SearchPattern::Literal { folded, .. } => text
                .char_indices()
                .filter_map(|(start, _)| {
                    caseless_prefix_len(&text[start..], folded).map(|len| start..start + len)
                })
                .collect(),
            SearchPattern::Regex(regex) => regex_ranges(regex, text),
        }
    }

    /// Hits that do not overlap, leftmost first.
    pub fn find_disjoint_ranges(&self, text: &str) -> Vec<Range<usize>> {
        match self {
            SearchPattern::Literal { folded, .. } => {
                let mut ranges = Vec::new();
                let mut cursor = 0;
                while cursor < text.len() {
                    match caseless_prefix_len(&text[cursor..], folded) {
                        Some(len) => {
                            ranges.push(cursor..cursor + len);
                            cursor += len;
                        }
                        None => cursor += next_char_len(text, cursor),
                    }
                }
                ranges
            }
            SearchPattern::Regex(regex) => regex_ranges(regex, text),
        }
    }

    /// Replaces every disjoint hit with `replacement` taken verbatim.
    /// Returns the new text and the number of substitutions.
    pub fn replace_all(&self, text: &str, replacement: &str) -> (String, usize) {
        let ranges = self.find_disjoint_ranges(text);
        if ranges.is_empty() {
            return (text.to_string(), 0);
        }

        let mut output = String::with_capacity(text.len());
        let mut last = 0;
        for range in &ranges {
            output.push_str(&text[last..range.start]);
            output.push_str(replacement);
            last = range.end;
        }
        output.push_str(&text[last..]);
        (output, ranges.len())
    }
}

fn fold(input: &str) -> Vec<char> {
    input.chars().flat_map(char::to_lowercase).collect()
}

fn regex_ranges(regex: &Regex, text: &str) -> Vec<Range<usize>> {
    regex
        .find_iter(text)
        .filter(|found| !found.is_empty())
        .map(|found| found.range())
        .collect()
}

fn next_char_len(text: &str, at: usize) -> usize {
    text[at..].chars().next().map(char::len_utf8).unwrap_or(1)
}

/// Byte length of the prefix of `haystack` that equals `needle` ignoring case,
/// provided the match ends on a character boundary of `haystack`.
fn caseless_prefix_len(haystack: &str, needle: &[char]) -> Option<usize> {
    if needle.is_empty() {
        return None;
    }
    let mut wanted = needle.iter().peekable();
    for (index, ch) in haystack.char_indices() {
        for lower in ch.to_lowercase() {
            match wanted.next() {
                Some(&expected) if expected == lower => {}
                _ => return None,
            }
        }
        if wanted.peek().is_none() {
            return Some(index + ch.len_utf8());
        }
    }
    None
}

/// Text that gets searched for a field value; `None` for values that never match.
pub fn searchable_text(value: &Value) -> Option<String> {
    match FieldValue::of(value) {
        FieldValue::Scalar(text) => Some(text.to_string()),
        FieldValue::Structured(node) => serde_json::to_string(node).ok(),
        FieldValue::Empty => None,
    }
}

pub fn find_occurrences(value: &Value, pattern: &SearchPattern) -> Vec<Occurrence> {
    match searchable_text(value) {
        Some(text) => search_text(&text, pattern),
        None => Vec::new(),
    }
}

pub fn search_text(text: &str, pattern: &SearchPattern) -> Vec<Occurrence> {
    pattern
        .find_ranges(text)
        .into_iter()
        .map(|range| Occurrence {
            matched_text: text[range.clone()].to_string(),
            context: context_around(text, range.start, range.len()),
            offset: range.start,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HighlightSegment {
    pub text: String,
    pub highlight: bool,
}

/// Splits `text` into plain and highlighted runs for display.
pub fn highlight_segments(text: &str, pattern: &SearchPattern) -> Vec<HighlightSegment> {
    let mut segments = Vec::new();
    let mut last = 0;
    for range in pattern.find_disjoint_ranges(text) {
        if range.start > last {
            segments.push(HighlightSegment {
                text: text[last..range.start].to_string(),
                highlight: false,
            });
        }
        segments.push(HighlightSegment {
            text: text[range.clone()].to_string(),
            highlight: true,
        });
        last = range.end;
    }
    if last < text.len() {
        segments.push(HighlightSegment {
            text: text[last..].to_string(),
            highlight: false,
        });
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn literal(input: &str) -> SearchPattern {
        SearchPattern::literal(input).unwrap()
    }

    #[test]
    fn rejects_blank_input() {
        assert!(matches!(SearchPattern::literal("   "), Err(EngineError::EmptyInput)));
        assert!(matches!(SearchPattern::regex(""), Err(EngineError::EmptyInput)));
    }

    #[test]
    fn rejects_malformed_regex() {
        let error = SearchPattern::regex("(unclosed").unwrap_err();
        assert!(matches!(error, EngineError::InvalidPattern(_)));
    }

    #[test]
    fn finds_case_insensitive_hits_preserving_original_case() {
        let occurrences = search_text("Hello world, hello again", &literal("hello"));
        assert_eq!(occurrences.len(), 2);
        assert_eq!(occurrences[0].offset, 0);
        assert_eq!(occurrences[0].matched_text, "Hello");
        assert_eq!(occurrences[1].offset, 13);
        assert_eq!(occurrences[1].matched_text, "hello");
    }

    #[test]
    fn counts_non_overlapping_hits_with_increasing_offsets() {
        let text = "cat dog cat bird cat";
        let occurrences = search_text(text, &literal("cat"));
        assert_eq!(occurrences.len(), 3);
        assert!(occurrences.windows(2).all(|pair| pair[0].offset < pair[1].offset));
        for occurrence in &occurrences {
            assert!(occurrence.offset + occurrence.matched_text.len() <= text.len());
        }
    }

    #[test]
    fn reports_overlapping_literal_hits() {
        let ranges = literal("aa").find_ranges("aaaa");
        assert_eq!(ranges, vec![0..2, 1..3, 2..4]);

        let disjoint = literal("aa").find_disjoint_ranges("aaaa");
        assert_eq!(disjoint, vec![0..2, 2..4]);
    }

    #[test]
    fn matches_multibyte_text_on_char_boundaries() {
        let text = "Ärger über ÄRGER";
        let ranges = literal("ärger").find_ranges(text);
        assert_eq!(ranges.len(), 2);
        assert_eq!(&text[ranges[1].clone()], "ÄRGER");
    }

    #[test]
    fn ignores_scalars_without_text() {
        let pattern = literal("1");
        assert!(find_occurrences(&json!(1), &pattern).is_empty());
        assert!(find_occurrences(&json!(true), &pattern).is_empty());
        assert!(find_occurrences(&Value::Null, &pattern).is_empty());
    }

    #[test]
    fn searches_serialized_structures() {
        let value = json!({"blocks": [{"text": "Nested needle here"}]});
        let occurrences = find_occurrences(&value, &literal("needle"));
        assert_eq!(occurrences.len(), 1);
        assert_eq!(occurrences[0].context, "Nested needle here");
    }

    #[test]
    fn regex_mode_is_case_insensitive_and_skips_empty_hits() {
        let pattern = SearchPattern::regex(r"\d{3}-\d{4}").unwrap();
        let occurrences = search_text("call 555-1234 or 555-9876", &pattern);
        assert_eq!(occurrences.len(), 2);
        assert_eq!(occurrences[1].matched_text, "555-9876");

        let pattern = SearchPattern::regex("HELLO").unwrap();
        assert_eq!(search_text("hello", &pattern).len(), 1);

        let pattern = SearchPattern::regex("x*").unwrap();
        assert_eq!(pattern.find_ranges("abxxc"), vec![2..4]);
    }

    #[test]
    fn replace_all_deletes_without_trimming() {
        let (output, count) = literal("hello").replace_all("Hello world, hello again", "");
        assert_eq!(output, " world,  again");
        assert_eq!(count, 2);
    }

    #[test]
    fn regex_replacement_is_inserted_literally() {
        let pattern = SearchPattern::regex(r"(\w+)@example\.com").unwrap();
        let (output, count) = pattern.replace_all("mail bob@example.com", "$1 at home");
        assert_eq!(output, "mail $1 at home");
        assert_eq!(count, 1);
    }

    #[test]
    fn highlights_hits_in_excerpt() {
        let segments = highlight_segments("Say Hello and hello", &literal("hello"));
        let rendered: Vec<(&str, bool)> = segments
            .iter()
            .map(|segment| (segment.text.as_str(), segment.highlight))
            .collect();
        assert_eq!(
            rendered,
            vec![
                ("Say ", false),
                ("Hello", true),
                (" and ", false),
                ("hello", true)
            ]
        );
    }
}
