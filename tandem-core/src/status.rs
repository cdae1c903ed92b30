//! Status translation between tracker signals and board completion.
//!
//! The tracker expresses progress through its open/closed state plus workflow
//! labels; the board only knows a completion percentage. Completion of 100 is
//! the sole signal for "closed" in the other direction.

use crate::types::ItemState;

/// Workflow labels in priority order, highest completion first.
///
/// The first entry matching any input label wins, regardless of the order of
/// the labels on the item.
pub const LABEL_COMPLETION: &[(&str, u8)] = &[
    ("done", 100),
    ("in review", 75),
    ("in progress", 50),
    ("ready", 30),
    ("todo", 20),
    ("backlog", 0),
    ("ideas", 0),
];

/// Completion percentage treated as finished.
pub const COMPLETE: u8 = 100;

/// Map a label set to a completion percentage. No recognised label → 0.
pub fn labels_to_completion<S: AsRef<str>>(labels: &[S]) -> u8 {
    let normalized: Vec<String> = labels
        .iter()
        .map(|label| label.as_ref().trim().to_lowercase())
        .collect();

    LABEL_COMPLETION
        .iter()
        .find(|(name, _)| normalized.iter().any(|label| label == name))
        .map(|(_, completion)| *completion)
        .unwrap_or(0)
}

/// Closed items are always complete; open items defer to their labels.
pub fn closed_state_to_completion<S: AsRef<str>>(state: ItemState, labels: &[S]) -> u8 {
    if state.is_closed() {
        COMPLETE
    } else {
        labels_to_completion(labels)
    }
}

/// Inverse mapping: anything short of 100 is open.
pub fn completion_to_open_state(percent: u8) -> ItemState {
    if percent >= COMPLETE {
        ItemState::Closed
    } else {
        ItemState::Open
    }
}
