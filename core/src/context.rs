/// Excerpt extraction around a match
use std::ops::Range;

const WORDS_AROUND: usize = 4;
const FALLBACK_CHARS: usize = 100;
const ELLIPSIS: &str = "...";

/// Returns a short excerpt of `text` around the hit at `offset..offset + length`.
///
/// When the hit sits inside a double-quoted string (the usual case for
/// serialized JSON) only that string is used, so JSON punctuation does not
/// leak into the excerpt. The excerpt holds the word containing the hit and
/// up to four words on each side. A hit starting on whitespace is anchored
/// on the first word it covers rather than on the 100-character window;
/// that window is only used when the hit covers no word at all.
pub fn context_around(text: &str, offset: usize, length: usize) -> String {
    let offset = offset.min(text.len());
    let end = offset.saturating_add(length).min(text.len());

    if let Some((open, close)) = enclosing_quotes(text, offset, end) {
        let inner = &text[open + 1..close];
        if let Some(excerpt) = word_window(inner, offset - open - 1, end - open - 1) {
            return excerpt;
        }
    }

    if let Some(excerpt) = word_window(text, offset, end) {
        return excerpt;
    }

    char_window(text, offset, end)
}

/// Byte positions of the unescaped quotes around `start..end`.
///
/// The left scan stops at the first quote not preceded by a backslash. A
/// quote right after a colon opens a JSON value, so it is accepted as the
/// opening quote as well.
fn enclosing_quotes(text: &str, start: usize, end: usize) -> Option<(usize, usize)> {
    let bytes = text.as_bytes();

    let open = (0..start)
        .rev()
        .find(|&index| bytes[index] == b'"' && !is_escaped(bytes, index))?;

    let close = (end..bytes.len()).find(|&index| bytes[index] == b'"' && !is_escaped(bytes, index))?;

    Some((open, close))
}

fn is_escaped(bytes: &[u8], index: usize) -> bool {
    index > 0 && bytes[index - 1] == b'\\'
}

fn word_spans(text: &str) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut current: Option<usize> = None;
    for (index, ch) in text.char_indices() {
        if ch.is_whitespace() {
            if let Some(start) = current.take() {
                spans.push(start..index);
            }
        } else if current.is_none() {
            current = Some(index);
        }
    }
    if let Some(start) = current {
        spans.push(start..text.len());
    }
    spans
}

fn word_window(text: &str, start: usize, end: usize) -> Option<String> {
    let spans = word_spans(text);
    let anchor = spans
        .iter()
        .position(|span| span.start <= start && start < span.end)
        .or_else(|| {
            spans
                .iter()
                .position(|span| span.start >= start && span.start < end)
        })?;

    let first = anchor.saturating_sub(WORDS_AROUND);
    let last = (anchor + WORDS_AROUND + 1).min(spans.len());

    let words: Vec<&str> = spans[first..last]
        .iter()
        .map(|span| &text[span.clone()])
        .collect();

    let mut excerpt = words.join(" ");
    if first > 0 {
        excerpt.insert_str(0, ELLIPSIS);
    }
    if last < spans.len() {
        excerpt.push_str(ELLIPSIS);
    }
    Some(excerpt)
}

fn char_window(text: &str, start: usize, end: usize) -> String {
    let from = floor_boundary(text, start.saturating_sub(FALLBACK_CHARS));
    let to = ceil_boundary(text, end.saturating_add(FALLBACK_CHARS).min(text.len()));
    text[from..to].to_string()
}

fn floor_boundary(text: &str, mut index: usize) -> usize {
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn ceil_boundary(text: &str, mut index: usize) -> usize {
    while index < text.len() && !text.is_char_boundary(index) {
        index += 1;
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;

    fn excerpt_for(text: &str, needle: &str) -> String {
        let offset = text.find(needle).unwrap();
        context_around(text, offset, needle.len())
    }

    #[test]
    fn keeps_window_inside_json_string() {
        let blob = r#"{"a":"the quick brown fox jumps"}"#;
        let excerpt = excerpt_for(blob, "brown");
        assert_eq!(excerpt, "the quick brown fox jumps");
        assert!(!excerpt.contains("{\"a\":"));
    }

    #[test]
    fn truncates_long_text_with_ellipsis() {
        let text = "one two three four five six seven eight nine ten eleven twelve";
        let excerpt = excerpt_for(text, "six");
        assert_eq!(excerpt, "...two three four five six seven eight nine ten...");
    }

    #[test]
    fn no_ellipsis_at_edges() {
        let excerpt = excerpt_for("alpha beta gamma", "alpha");
        assert_eq!(excerpt, "alpha beta gamma");
    }

    #[test]
    fn skips_escaped_quotes() {
        let blob = r#"{"text":"say \"hi\" to the brown dog"}"#;
        let excerpt = excerpt_for(blob, "brown");
        assert_eq!(excerpt, r#"say \"hi\" to the brown dog"#);
    }

    #[test]
    fn collapses_runs_of_whitespace() {
        let excerpt = excerpt_for("first   second\n\nthird", "second");
        assert_eq!(excerpt, "first second third");
    }

    #[test]
    fn is_deterministic() {
        let blob = r#"{"title":"A","body":"lorem ipsum dolor sit amet consectetur adipiscing elit sed do"}"#;
        let offset = blob.find("amet").unwrap();
        let first = context_around(blob, offset, 4);
        let second = context_around(blob, offset, 4);
        assert_eq!(first, second);
        assert_eq!(first, "lorem ipsum dolor sit amet consectetur adipiscing elit sed...");
    }

    #[test]
    fn falls_back_to_character_window() {
        let text = format!("{}{}", "x".repeat(150), "   ");
        let excerpt = context_around(&text, 150, 2);
        assert_eq!(excerpt.len(), 103);
        assert!(excerpt.starts_with('x'));
    }

    #[test]
    fn window_around_whitespace_hit_uses_following_word() {
        let text = "alpha beta gamma";
        let excerpt = context_around(text, 5, 5);
        assert_eq!(excerpt, "alpha beta gamma");
    }
}
