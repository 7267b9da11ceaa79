//! Utility functions for text cleanup and logging.
//!
//! - HTML to plain text conversion for feed descriptions
//! - String truncation for log lines and error bodies

use scraper::Html;

/// Convert an HTML snippet to plain text.
///
/// Tags are removed and every tag boundary becomes whitespace, so
/// `"<p>one</p><p>two</p>"` reads `"one two"` rather than `"onetwo"`.
/// Entities are decoded, runs of whitespace collapse to a single space and
/// the result is trimmed.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(strip_html("<p>Hello <b>world</b></p>"), "Hello world");
/// assert_eq!(strip_html("a<br/>b"), "a b");
/// ```
pub fn strip_html(html: &str) -> String {
    if !html.contains('<') && !html.contains('&') {
        return collapse_whitespace(html);
    }
    let fragment = Html::parse_fragment(html);
    let joined = fragment.root_element().text().collect::<Vec<_>>().join(" ");
    collapse_whitespace(&joined)
}

/// Collapse every run of whitespace to one space and trim the ends.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncate a string for logging purposes.
///
/// Long strings are cut to `max` characters with an ellipsis and a count of
/// the dropped bytes appended. The cut never splits a multi-byte character.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        None => s.to_string(),
        Some((cut, _)) => format!("{}…(+{} bytes)", &s[..cut], s.len() - cut),
    }
}
