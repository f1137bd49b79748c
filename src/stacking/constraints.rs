use tracing::trace;

use super::engine::Stack;
use crate::model::store::WindowStore;
use crate::model::window::{TransientTarget, WindowKey};

/// A directed edge: `above` must end up over `below`.
///
/// Constraints chain: satisfying an edge may move its `above` window, which
/// any edge stacked on top of that window then has to react to, so edges are
/// applied in chain order starting from the roots.
struct Constraint {
    above: WindowKey,
    below: WindowKey,
    /// Constraints whose `below` is our `above`.
    next: Vec<usize>,
    /// Applied once; guards traversal against cycles.
    applied: bool,
    /// Has an incoming chain link. Roots are the nodes without one.
    has_prev: bool,
}

/// Transiency edges for every window currently in the stack, deduplicated
/// per `(above, below)` pair. Shared by the resolver and [`Stack::audit`].
///
/// A window transient for its whole group is constrained above every
/// non-transient-type member of that group; constraining it above fellow
/// dialogs as well would create promotion chains between peers. A window
/// transient for one specific parent is constrained above that parent alone.
/// Windows not in the stack, and pairs straddling screens, produce no edges.
pub(super) fn edges(stack: &Stack, store: &WindowStore) -> Vec<(WindowKey, WindowKey)> {
    let mut out = Vec::new();
    for &key in &stack.sorted {
        let window = &store[key];
        match window.transient {
            TransientTarget::Group if window.kind.is_transient_type() => {
                let Some(group) = window.group else { continue };
                for &member in store.group_members(group) {
                    let other = &store[member];
                    if !other.in_stack()
                        || other.screen != window.screen
                        || other.kind.is_transient_type()
                    {
                        continue;
                    }
                    trace!(above = %window.id, below = %other.id, "constraining transient-for-group window");
                    push_dedup(&mut out, key, member);
                }
            }
            TransientTarget::Window(parent) => {
                let Some(parent_key) = store.key_of(parent) else { continue };
                let parent_window = &store[parent_key];
                if parent_window.in_stack() && parent_window.screen == window.screen {
                    trace!(above = %window.id, below = %parent_window.id, "constraining transient above its parent");
                    push_dedup(&mut out, key, parent_key);
                }
            }
            _ => {}
        }
    }
    out
}

fn push_dedup(edges: &mut Vec<(WindowKey, WindowKey)>, above: WindowKey, below: WindowKey) {
    if !edges.contains(&(above, below)) {
        edges.push((above, below));
    }
}

/// Moves stack positions (and promotes layers) until every edge holds.
///
/// Terminates even if malformed group data slipped a cycle past the edge
/// construction rules: each constraint is applied at most once, and a pure
/// cycle has no root to start from at all.
pub(super) fn resolve(stack: &mut Stack, store: &mut WindowStore) {
    let edge_list = edges(stack, store);
    if edge_list.is_empty() {
        return;
    }

    let mut nodes: Vec<Constraint> = edge_list
        .into_iter()
        .map(|(above, below)| Constraint {
            above,
            below,
            next: Vec::new(),
            applied: false,
            has_prev: false,
        })
        .collect();

    // Bucket constraints by the position of their `below` window so chain
    // links are found without a scan per node.
    let mut by_below: Vec<Vec<usize>> = vec![Vec::new(); stack.n_positions];
    for (idx, node) in nodes.iter().enumerate() {
        if let Some(position) = store[node.below].stack_position {
            by_below[position].push(idx);
        }
    }

    for idx in 0..nodes.len() {
        let Some(above_position) = store[nodes[idx].above].stack_position else {
            continue;
        };
        let next = by_below[above_position].clone();
        for &succ in &next {
            nodes[succ].has_prev = true;
        }
        nodes[idx].next = next;
    }

    // Depth-first from every root, with an explicit work list so pathological
    // inputs cannot overflow the call stack.
    let mut work: Vec<usize> = Vec::new();
    for root in 0..nodes.len() {
        if nodes[root].has_prev {
            continue;
        }
        work.push(root);
        while let Some(idx) = work.pop() {
            if nodes[idx].applied {
                continue;
            }
            nodes[idx].applied = true;
            ensure_above(stack, store, nodes[idx].above, nodes[idx].below);
            for &succ in nodes[idx].next.iter().rev() {
                if !nodes[succ].applied {
                    work.push(succ);
                }
            }
        }
    }
}

fn ensure_above(stack: &mut Stack, store: &mut WindowStore, above: WindowKey, below: WindowKey) {
    let (Some(above_position), Some(below_position)) =
        (store[above].stack_position, store[below].stack_position)
    else {
        return;
    };
    if above_position < below_position {
        // Land exactly one over `below`, bumping it down by one.
        stack.set_position_no_sync(store, above, below_position);
    }
    if store[above].kind.is_transient_type() && store[above].layer < store[below].layer {
        let to = store[below].layer;
        trace!(
            window = %store[above].id,
            from = %store[above].layer,
            to = %to,
            "promoting window's layer to satisfy a constraint"
        );
        store[above].layer = to;
        stack.need_resort = true;
    }
    trace!(
        above = %store[above].id,
        above_position = ?store[above].stack_position,
        below = %store[below].id,
        below_position = ?store[below].stack_position,
        "constraint applied"
    );
}
