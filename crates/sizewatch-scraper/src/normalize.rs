//! Size-label canonicalization.

use std::sync::LazyLock;

use regex::Regex;
use sizewatch_core::CanonicalSize;

static SIZE_NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([0-9]{1,2}(?:\.[0-9])?)").expect("valid size number regex")
});

/// Reduces a free-text size label to its numeric key.
///
/// `"表記サイズ: 27.5cm"` → `"27.5"`, `"US 9"` → `"9"`. The first number wins;
/// unit suffixes and surrounding text are dropped. Returns `None` when the
/// label holds no number.
#[must_use]
pub fn normalize_size(label: &str) -> Option<CanonicalSize> {
    SIZE_NUMBER_RE
        .captures(label)
        .and_then(|cap| cap.get(1))
        .map(|m| CanonicalSize::new(m.as_str()))
}
