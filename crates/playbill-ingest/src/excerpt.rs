//! Excerpt extraction
//!
//! Article bodies carry a pair of section markers; the excerpt is the text
//! strictly between them. Malformed content (either marker absent, or the end
//! marker before the start marker) is never an error: the full content is
//! returned unchanged.

/// Extract the substring strictly between `start_marker` and `end_marker`,
/// exclusive of both markers. Falls back to the unmodified input when the
/// markers cannot be resolved in order.
pub fn extract_excerpt(content: &str, start_marker: &str, end_marker: &str) -> String {
    let (Some(start), Some(end)) = (content.find(start_marker), content.find(end_marker)) else {
        return content.to_string();
    };

    let body_start = start + start_marker.len();
    if end < body_start {
        return content.to_string();
    }

    content[body_start..end].to_string()
}
