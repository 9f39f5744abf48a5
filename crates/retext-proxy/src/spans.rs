//! Tagged span extraction and in-place replacement.
//!
//! Tags are matched literally. A span runs from a start tag to the first end
//! tag after it, across newlines; scanning resumes after that end tag, so
//! spans never overlap and nested start tags become part of the inner text.

/// One `start ... end` block found in a text. Offsets are byte indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    /// Content between the tags with surrounding whitespace removed
    pub inner_text: String,
    /// Start of the start tag
    pub full_match_start: usize,
    /// One past the end of the end tag
    pub full_match_end: usize,
    /// Where `inner_text` begins inside the block
    pub inner_start: usize,
    /// Where `inner_text` ends inside the block
    pub inner_end: usize,
}

/// Every span in `text`, in document order.
///
/// Empty text, empty tags, or text lacking a complete tag pair yield no spans.
pub fn extract_spans(text: &str, start_tag: &str, end_tag: &str) -> Vec<Span> {
    let mut spans = Vec::new();
    if text.is_empty() || start_tag.is_empty() || end_tag.is_empty() {
        return spans;
    }

    let mut cursor = 0;
    while let Some(found) = text[cursor..].find(start_tag) {
        let full_match_start = cursor + found;
        let body_start = full_match_start + start_tag.len();
        let Some(body_len) = text[body_start..].find(end_tag) else {
            break;
        };
        let body_end = body_start + body_len;
        let full_match_end = body_end + end_tag.len();

        let body = &text[body_start..body_end];
        let inner_text = body.trim();
        let inner_start = body_start + (body.len() - body.trim_start().len());

        spans.push(Span {
            inner_text: inner_text.to_string(),
            full_match_start,
            full_match_end,
            inner_start,
            inner_end: inner_start + inner_text.len(),
        });
        cursor = full_match_end;
    }

    spans
}

/// Whether `text` contains both tags; the cheap check before extraction.
pub fn contains_tags(text: &str, start_tag: &str, end_tag: &str) -> bool {
    !start_tag.is_empty() && !end_tag.is_empty() && text.contains(start_tag) && text.contains(end_tag)
}

/// Put `rewrites[i]` in place of `spans[i].inner_text`, working from the
/// last span to the first so earlier offsets stay valid.
///
/// Tags and the whitespace just inside them are kept. A span without a
/// rewrite, or one that does not describe `text`, is left as it was.
pub fn replace_spans<S: AsRef<str>>(text: &str, spans: &[Span], rewrites: &[S]) -> String {
    let mut output = text.to_string();

    for (index, span) in spans.iter().enumerate().rev() {
        let Some(rewrite) = rewrites.get(index) else {
            continue;
        };
        if text.get(span.inner_start..span.inner_end) != Some(span.inner_text.as_str())
            || span.inner_start < span.full_match_start
            || span.inner_end > span.full_match_end
        {
            continue;
        }
        output.replace_range(span.inner_start..span.inner_end, rewrite.as_ref());
    }

    output
}
