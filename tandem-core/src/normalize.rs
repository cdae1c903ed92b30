//! Canonical views for change detection.
//!
//! Board descriptions carry a URL trailer pointing back at the tracker item:
//!
//! ```text
//! {body}
//!
//! ---
//! **URL:** {url}
//! ```
//!
//! Normalisation strips any trailer already present before appending the
//! current one, so feeding a board description back through it is a no-op.

use crate::status::closed_state_to_completion;
use crate::types::{BoardItem, CanonicalView, FieldChanges, TrackerItem};

/// Marker that starts the trailer line.
pub const URL_MARKER: &str = "**URL:** ";

/// Separator between the body and the trailer.
pub const TRAILER_SEPARATOR: &str = "\n\n---\n";

/// Build the board description for a tracker item.
pub fn normalize_tracker_description(body: Option<&str>, url: &str) -> String {
    let body = strip_url_trailer(body.unwrap_or_default());
    if body.trim().is_empty() {
        format!("{URL_MARKER}{url}")
    } else {
        format!("{body}{TRAILER_SEPARATOR}{URL_MARKER}{url}")
    }
}

/// Remove every trailing URL trailer from `text`.
///
/// Also collapses trailers accumulated by older sync runs that appended
/// without stripping.
pub fn strip_url_trailer(text: &str) -> String {
    let mut current = normalize_line_endings(text);
    while let Some(stripped) = strip_one_trailer(&current) {
        current = stripped;
    }
    current
}

fn strip_one_trailer(text: &str) -> Option<String> {
    let trimmed = text.trim_end();
    let pos = trimmed.rfind(URL_MARKER)?;
    let tail = &trimmed[pos + URL_MARKER.len()..];
    if tail.contains('\n') {
        return None;
    }
    let head = &trimmed[..pos];
    if head.is_empty() {
        return Some(String::new());
    }
    head.strip_suffix(TRAILER_SEPARATOR).map(str::to_owned)
}

/// Compare two optional text fields, treating absent and empty as equal.
pub fn fields_equal(a: Option<&str>, b: Option<&str>) -> bool {
    normalize_line_endings(a.unwrap_or_default()) == normalize_line_endings(b.unwrap_or_default())
}

fn normalize_line_endings(content: &str) -> String {
    content.replace("\r\n", "\n")
}

/// Project a tracker item onto the board's field set.
pub fn canonical_from_tracker(item: &TrackerItem) -> CanonicalView {
    CanonicalView {
        title: item.title.clone(),
        description: normalize_tracker_description(item.body.as_deref(), &item.url),
        completion: closed_state_to_completion(item.state, &item.labels),
    }
}

pub fn canonical_from_board(item: &BoardItem) -> CanonicalView {
    CanonicalView {
        title: item.title.clone(),
        description: normalize_line_endings(item.description.as_deref().unwrap_or_default()),
        completion: item.completion,
    }
}

impl CanonicalView {
    /// Fields of `other` that differ from `self`.
    pub fn differences(&self, other: &CanonicalView) -> FieldChanges {
        FieldChanges {
            title: !fields_equal(Some(&self.title), Some(&other.title)),
            description: !fields_equal(Some(&self.description), Some(&other.description)),
            completion: self.completion != other.completion,
        }
    }
}
