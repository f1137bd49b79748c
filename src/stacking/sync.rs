use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::common::collections::HashSet;
use crate::model::window::StackId;
use crate::sys::server::{ServerError, StackWriter};

/// One restacking request for the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestackOp {
    /// Impose an order on a run of windows, topmost first. The first window
    /// is an anchor and stays where it is; each subsequent window is placed
    /// directly below its predecessor.
    Restack(Vec<StackId>),
    /// Place `window` directly above `sibling`.
    PlaceAbove { window: StackId, sibling: StackId },
    /// Place `window` directly below `sibling`.
    PlaceBelow { window: StackId, sibling: StackId },
    /// Push `window` to the very bottom of the stack.
    LowerToBottom(StackId),
}

impl std::fmt::Display for RestackOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RestackOp::Restack(order) => {
                write!(f, "restack [")?;
                for (i, id) in order.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{id}")?;
                }
                write!(f, "]")
            }
            RestackOp::PlaceAbove { window, sibling } => {
                write!(f, "place {window} above {sibling}")
            }
            RestackOp::PlaceBelow { window, sibling } => {
                write!(f, "place {window} below {sibling}")
            }
            RestackOp::LowerToBottom(window) => write!(f, "lower {window} to the bottom"),
        }
    }
}

pub(super) fn apply(server: &mut dyn StackWriter, op: &RestackOp) -> Result<(), ServerError> {
    match op {
        RestackOp::Restack(order) => server.restack(order),
        RestackOp::PlaceAbove { window, sibling } => server.place_above(*window, *sibling),
        RestackOp::PlaceBelow { window, sibling } => server.place_below(*window, *sibling),
        RestackOp::LowerToBottom(window) => server.lower_to_bottom(*window),
    }
}

/// Minimal operations taking the server from `previous` to `new_order`
/// (both bottom to top).
///
/// Without a previous order the whole stack is imposed in one restack.
/// Otherwise both orders are walked downward from the top with two cursors.
/// Matching windows advance both cursors and become the `last_seen` anchor.
/// An old-cursor window that is destroyed, or that was already placed
/// earlier in this walk, is skipped; anything else means the new-cursor
/// window moved, and it is placed directly below `last_seen` (or above the
/// topmost remaining old window when nothing has been seen yet). Any new
/// windows left after the old order is exhausted are imposed with a single
/// restack anchored at the last window already in place above them.
pub(super) fn plan_restack(
    previous: Option<&[StackId]>,
    new_order: &[StackId],
    known: impl Fn(StackId) -> bool,
) -> Vec<RestackOp> {
    let Some(previous) = previous else {
        if new_order.len() >= 2 {
            let order: Vec<StackId> = new_order.iter().rev().copied().collect();
            return vec![RestackOp::Restack(order)];
        }
        return Vec::new();
    };

    let mut ops = Vec::new();
    let mut placed: HashSet<StackId> = HashSet::default();
    let mut last_seen: Option<StackId> = None;
    let mut old = previous.len();
    let mut new = new_order.len();

    while old > 0 && new > 0 {
        let old_window = previous[old - 1];
        let new_window = new_order[new - 1];
        if old_window == new_window {
            last_seen = Some(new_window);
            old -= 1;
            new -= 1;
        } else if !known(old_window) || placed.contains(&old_window) {
            // Destroyed behind our back, or already moved earlier in this
            // walk; either way the old entry is stale.
            old -= 1;
        } else {
            match last_seen {
                Some(sibling) => ops.push(RestackOp::PlaceBelow { window: new_window, sibling }),
                // The new topmost window; raise it over whatever currently
                // tops the old order.
                None => ops.push(RestackOp::PlaceAbove { window: new_window, sibling: old_window }),
            }
            placed.insert(new_window);
            last_seen = Some(new_window);
            new -= 1;
        }
    }

    if new > 0 {
        // Impose the unconsumed tail in bulk, anchored at the window already
        // placed directly above it (when there is one).
        let end = (new + 1).min(new_order.len());
        let tail: Vec<StackId> = new_order[..end].iter().rev().copied().collect();
        if tail.len() >= 2 {
            ops.push(RestackOp::Restack(tail));
        }
    }

    trace!(operations = ops.len(), "planned restack");
    ops
}

/// Parks hidden windows below the guard sentinel as one anchored block.
/// When the previous order is unknown the guard itself is re-anchored at
/// the bottom first.
pub(super) fn plan_hidden_block(
    guard: StackId,
    hidden: &[StackId],
    recover_guard: bool,
) -> Vec<RestackOp> {
    if hidden.is_empty() {
        return Vec::new();
    }
    let mut ops = Vec::new();
    if recover_guard {
        ops.push(RestackOp::LowerToBottom(guard));
    }
    let mut block = Vec::with_capacity(hidden.len() + 1);
    block.push(guard);
    block.extend(hidden.iter().rev().copied());
    ops.push(RestackOp::Restack(block));
    ops
}
