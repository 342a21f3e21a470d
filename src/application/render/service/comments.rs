use std::borrow::Cow;

use serde::{Deserialize, Serialize};

const COMMENT_OPEN: &str = "<!--";
const COMMENT_CLOSE: &str = "-->";

/// Reserved class carried by visible comment spans.
pub const COMMENT_CLASS: &str = "md-comment";

/// A structural comment captured by the forward transform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentSpan {
    pub original_text: String,
    pub escaped_text: String,
}

/// Turn hidden `<!-- -->` comments into visible spans when `show` is set.
///
/// Always call this on the pristine document source. Feeding it its own
/// output is unsupported.
pub fn transform(source: &str, show: bool) -> Cow<'_, str> {
    if !show {
        return Cow::Borrowed(source);
    }

    let spans = scan(source);
    if spans.is_empty() {
        return Cow::Borrowed(source);
    }

    let mut output = String::with_capacity(source.len() + spans.len() * 32);
    let mut cursor = 0;
    for (range, span) in spans {
        output.push_str(&source[cursor..range.start]);
        output.push_str("<span class=\"");
        output.push_str(COMMENT_CLASS);
        output.push_str("\">");
        output.push_str(&span.escaped_text);
        output.push_str("</span>");
        cursor = range.end;
    }
    output.push_str(&source[cursor..]);

    Cow::Owned(output)
}

/// Comments the forward transform would replace, in source order.
pub fn comment_spans(source: &str) -> Vec<CommentSpan> {
    scan(source).into_iter().map(|(_, span)| span).collect()
}

/// Offset of the first `<!--` at or after `from` with no `-->` anywhere after it.
pub(crate) fn unpaired_opener(source: &str, from: usize) -> Option<usize> {
    let mut offset = from;
    while let Some(open_rel) = source.get(offset..)?.find(COMMENT_OPEN) {
        let start = offset + open_rel;
        let body_start = start + COMMENT_OPEN.len();
        if !source[body_start..].contains(COMMENT_CLOSE) {
            return Some(start);
        }
        offset = body_start;
    }
    None
}

/// Escape the opener at `start` so the parser reads it as literal text.
pub(crate) fn escape_opener(source: &str, start: usize) -> String {
    let mut output = String::with_capacity(source.len() + 3);
    output.push_str(&source[..start]);
    output.push_str("&lt;");
    output.push_str(&source[start + 1..]);
    output
}

fn scan(source: &str) -> Vec<(std::ops::Range<usize>, CommentSpan)> {
    let mut spans = Vec::new();
    let mut offset = 0;

    while let Some(open_rel) = source[offset..].find(COMMENT_OPEN) {
        let start = offset + open_rel;
        let body_start = start + COMMENT_OPEN.len();
        let Some(close_rel) = source[body_start..].find(COMMENT_CLOSE) else {
            // unpaired opener: leave it and the rest of the text alone
            break;
        };
        let body_end = body_start + close_rel;
        let end = body_end + COMMENT_CLOSE.len();

        let inner = source[body_start..body_end].trim();
        spans.push((
            start..end,
            CommentSpan {
                original_text: source[start..end].to_string(),
                escaped_text: escape_markup(inner),
            },
        ));
        offset = end;
    }

    spans
}

fn escape_markup(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
