//! HTML and JSON helpers shared by the extractor and the size resolver.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

static NEXT_DATA_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<script[^>]*id=["']__NEXT_DATA__["'][^>]*>(.*?)</script>"#)
        .expect("valid next data regex")
});
static INVISIBLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(?:script|style|noscript|template)\b[^>]*>.*?</(?:script|style|noscript|template)>")
        .expect("valid invisible block regex")
});
static COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid comment regex"));
static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<[^>]+>").expect("valid tags regex"));

/// Parses the embedded `__NEXT_DATA__` JSON block, if the page has one.
pub(crate) fn next_data(html: &str) -> Option<Value> {
    let raw = NEXT_DATA_RE.captures(html)?.get(1)?.as_str();
    match serde_json::from_str(raw.trim()) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::debug!(error = %e, "ignoring malformed __NEXT_DATA__ block");
            None
        }
    }
}

/// Strips markup down to the text a reader would see, whitespace collapsed.
pub(crate) fn visible_text(html: &str) -> String {
    let without_blocks = INVISIBLE_RE.replace_all(html, " ");
    let without_comments = COMMENT_RE.replace_all(&without_blocks, " ");
    let no_tags = TAG_RE.replace_all(&without_comments, " ");
    decode_entities(&no_tags)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// Walks `path` through nested objects; numeric segments index into arrays.
pub(crate) fn walk_path<'a>(value: &'a Value, path: &[String]) -> Option<&'a Value> {
    path.iter().try_fold(value, |node, segment| match node {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Renders a scalar as text so `1` and `"1"` compare equal. Non-scalars and
/// blank strings yield `None`.
pub(crate) fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_owned())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}
