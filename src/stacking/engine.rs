use std::cmp::Ordering;

use tracing::{debug, trace, warn};

use super::constraints;
use super::layers::{self, FocusContext};
use super::sync::{self, RestackOp};
use crate::model::geometry::Point;
use crate::model::store::WindowStore;
use crate::model::window::{
    ScreenId, StackId, TransientTarget, WindowKey, WindowKind, WindowRecord, WorkspaceId,
};
use crate::sys::server::StackWriter;

/// Which windows cover which other windows.
///
/// The stack owns the total front-to-back order of one screen's managed
/// windows: a dense `stack_position` per window, the layer each one is
/// classified into, and the sorted order derived from both. Mutations stage
/// work behind dirty flags; a sync folds pending additions and removals,
/// recomputes layers, reapplies transiency constraints, resorts, and pushes
/// the minimal set of restacking operations to the server. All of that is
/// batched through [`freeze`](Stack::freeze)/[`thaw`](Stack::thaw).
pub struct Stack {
    screen: ScreenId,
    /// Sentinel the server keeps near the bottom of the stack; hidden
    /// windows are parked below it, out of the interactive stack.
    guard_window: StackId,
    /// Topmost first.
    pub(super) sorted: Vec<WindowKey>,
    /// Added but not yet folded into `sorted`.
    added: Vec<WindowKey>,
    /// Server ids staged for removal from the client list.
    removed: Vec<StackId>,
    /// Managed windows in order of addition (the client list).
    ids: Vec<StackId>,
    pub(super) n_positions: usize,
    freeze_count: u32,
    pub(super) need_resort: bool,
    need_relayer: bool,
    need_constrain: bool,
    expected_focus: Option<WindowKey>,
    /// Bottom-to-top order last pushed to the server, if any.
    last_synced: Option<Vec<StackId>>,
    last_hidden: Vec<StackId>,
    /// Published copies of the client list property pair.
    client_list: Vec<StackId>,
    client_list_stacking: Vec<StackId>,
}

impl Stack {
    pub fn new(screen: ScreenId, guard_window: StackId) -> Self {
        Stack {
            screen,
            guard_window,
            sorted: Vec::new(),
            added: Vec::new(),
            removed: Vec::new(),
            ids: Vec::new(),
            n_positions: 0,
            freeze_count: 0,
            need_resort: false,
            need_relayer: false,
            need_constrain: false,
            expected_focus: None,
            last_synced: None,
            last_hidden: Vec::new(),
            client_list: Vec::new(),
            client_list_stacking: Vec::new(),
        }
    }

    pub fn screen(&self) -> ScreenId {
        self.screen
    }

    /// Number of windows currently in the stack, pending additions included.
    pub fn len(&self) -> usize {
        self.n_positions
    }

    pub fn is_empty(&self) -> bool {
        self.n_positions == 0
    }

    /// The last published client list, bottom to top in order of addition.
    pub fn client_list(&self) -> &[StackId] {
        &self.client_list
    }

    /// The last published stacking-order client list, bottom to top.
    pub fn client_list_stacking(&self) -> &[StackId] {
        &self.client_list_stacking
    }

    // ---- mutation ----------------------------------------------------

    /// Puts a window into the stack at the top position. The record must
    /// already be registered in `store`.
    pub fn add(&mut self, store: &mut WindowStore, server: &mut dyn StackWriter, key: WindowKey) {
        let Some(window) = store.get_mut(key) else {
            warn!("add of a window that is not in the store");
            return;
        };
        if window.screen != self.screen {
            debug_assert!(false, "window {} belongs to another screen", window.id);
            warn!(window = %window.id, "window belongs to another screen; not adding it");
            return;
        }
        if window.stack_position.is_some() {
            debug_assert!(false, "window {} is already in the stack", window.id);
            warn!(window = %window.id, "window is already in the stack");
            return;
        }
        debug!(window = %window.id, position = self.n_positions, "adding window to the stack");
        window.stack_position = Some(self.n_positions);
        self.n_positions += 1;
        self.added.push(key);
        self.sync(store, server);
    }

    /// Takes a window out of the stack. The record itself stays in the
    /// store until the window management layer drops it.
    pub fn remove(&mut self, store: &mut WindowStore, server: &mut dyn StackWriter, key: WindowKey) {
        let Some(window) = store.get(key) else {
            warn!("remove of a window that is not in the store");
            return;
        };
        if window.stack_position.is_none() {
            debug_assert!(false, "window {} is not in the stack", window.id);
            warn!(window = %window.id, "window is not in the stack");
            return;
        }
        let id = window.id;
        debug!(window = %id, "removing window from the stack");

        // Relocate to the top position first so the dense range stays
        // gapless once it is vacated.
        self.set_position_no_sync(store, key, self.n_positions - 1);
        store[key].stack_position = None;
        self.n_positions -= 1;

        self.added.retain(|&k| k != key);
        self.sorted.retain(|&k| k != key);
        self.removed.push(id);
        self.sync(store, server);
    }

    /// Raises a window over everything on its workspace. Layer still
    /// dominates: a normal window does not climb over a dock this way.
    pub fn raise(&mut self, store: &mut WindowStore, server: &mut dyn StackWriter, key: WindowKey) {
        self.ensure_sorted(store);
        let Some(window) = store.get(key) else {
            warn!("raise of a window that is not in the store");
            return;
        };
        let Some(position) = window.stack_position else {
            warn!(window = %window.id, "raise of a window that is not in the stack");
            return;
        };
        if window.screen != self.screen {
            debug_assert!(false, "window {} belongs to another screen", window.id);
            warn!(window = %window.id, "raise of a window from another screen");
            return;
        }
        let workspace = window.workspace;
        let mut target = position;
        for &other in &self.sorted {
            let other = &store[other];
            if let Some(p) = other.stack_position
                && located_on_workspace(other, workspace)
                && p > target
            {
                target = p;
            }
        }
        if target == position {
            return;
        }
        self.set_position_no_sync(store, key, target);
        self.sync(store, server);
    }

    /// Lowers a window under everything on its workspace.
    pub fn lower(&mut self, store: &mut WindowStore, server: &mut dyn StackWriter, key: WindowKey) {
        self.ensure_sorted(store);
        let Some(window) = store.get(key) else {
            warn!("lower of a window that is not in the store");
            return;
        };
        let Some(position) = window.stack_position else {
            warn!(window = %window.id, "lower of a window that is not in the stack");
            return;
        };
        if window.screen != self.screen {
            debug_assert!(false, "window {} belongs to another screen", window.id);
            warn!(window = %window.id, "lower of a window from another screen");
            return;
        }
        let workspace = window.workspace;
        let mut target = position;
        for &other in &self.sorted {
            let other = &store[other];
            if let Some(p) = other.stack_position
                && located_on_workspace(other, workspace)
                && p < target
            {
                target = p;
            }
        }
        if target == position {
            return;
        }
        self.set_position_no_sync(store, key, target);
        self.sync(store, server);
    }

    /// Some window's classification inputs changed; recompute layers on the
    /// next sync.
    pub fn mark_layer_dirty(&mut self, store: &mut WindowStore, server: &mut dyn StackWriter) {
        self.need_relayer = true;
        self.sync(store, server);
    }

    /// Some window's transiency or group changed; reapply constraints on
    /// the next sync.
    pub fn mark_transient_dirty(&mut self, store: &mut WindowStore, server: &mut dyn StackWriter) {
        self.need_constrain = true;
        self.sync(store, server);
    }

    /// Tells the fullscreen classification rule which window is expected to
    /// take focus next.
    pub fn set_expected_focus(
        &mut self,
        store: &mut WindowStore,
        server: &mut dyn StackWriter,
        key: Option<WindowKey>,
    ) {
        if self.expected_focus == key {
            return;
        }
        self.expected_focus = key;
        self.need_relayer = true;
        self.sync(store, server);
    }

    /// Explicitly repositions a window, e.g. for session restore.
    pub fn set_stack_position(
        &mut self,
        store: &mut WindowStore,
        server: &mut dyn StackWriter,
        key: WindowKey,
        position: usize,
    ) {
        self.set_position_no_sync(store, key, position);
        self.sync(store, server);
    }

    /// Snapshot of the stack, bottom to top by raw position, for
    /// transactional use with [`set_positions`](Stack::set_positions).
    pub fn get_positions(&mut self, store: &mut WindowStore) -> Vec<WindowKey> {
        self.ensure_sorted(store);
        let mut snapshot = self.sorted.clone();
        snapshot.sort_by_key(|&key| store[key].stack_position);
        snapshot
    }

    /// Restores a snapshot taken with [`get_positions`](Stack::get_positions).
    /// Rejected if the window set has changed since the snapshot was taken.
    pub fn set_positions(
        &mut self,
        store: &mut WindowStore,
        server: &mut dyn StackWriter,
        windows: &[WindowKey],
    ) {
        self.ensure_sorted(store);
        if !same_window_set(&self.sorted, windows) {
            debug_assert!(false, "window set changed since the snapshot was taken");
            warn!("window set changed since the snapshot was taken; not restoring positions");
            return;
        }
        for (position, &key) in windows.iter().enumerate() {
            store[key].stack_position = Some(position);
        }
        self.need_resort = true;
        self.need_constrain = true;
        debug!("reset stack positions from a snapshot");
        self.sync(store, server);
    }

    // ---- freezing ----------------------------------------------------

    /// Starts a batch: syncs are suppressed until the matching
    /// [`thaw`](Stack::thaw).
    pub fn freeze(&mut self) {
        self.freeze_count += 1;
    }

    /// Ends a batch; the outermost thaw runs one sync covering everything
    /// that was staged. Thawing below zero is a caller bug.
    pub fn thaw(&mut self, store: &mut WindowStore, server: &mut dyn StackWriter) {
        if self.freeze_count == 0 {
            debug_assert!(false, "thaw without a matching freeze");
            warn!("thaw without a matching freeze");
            return;
        }
        self.freeze_count -= 1;
        self.sync(store, server);
    }

    pub fn frozen(&self) -> bool {
        self.freeze_count > 0
    }

    // ---- queries -----------------------------------------------------

    pub fn top(&mut self, store: &mut WindowStore) -> Option<WindowKey> {
        self.ensure_sorted(store);
        self.sorted.first().copied()
    }

    pub fn bottom(&mut self, store: &mut WindowStore) -> Option<WindowKey> {
        self.ensure_sorted(store);
        self.sorted.last().copied()
    }

    /// The window directly over `key`, optionally only within its layer.
    pub fn above(
        &mut self,
        store: &mut WindowStore,
        key: WindowKey,
        only_within_layer: bool,
    ) -> Option<WindowKey> {
        self.ensure_sorted(store);
        let index = self.sorted.iter().position(|&k| k == key)?;
        let above = *self.sorted.get(index.checked_sub(1)?)?;
        if only_within_layer && store[above].layer != store[key].layer {
            None
        } else {
            Some(above)
        }
    }

    /// The window directly under `key`, optionally only within its layer.
    pub fn below(
        &mut self,
        store: &mut WindowStore,
        key: WindowKey,
        only_within_layer: bool,
    ) -> Option<WindowKey> {
        self.ensure_sorted(store);
        let index = self.sorted.iter().position(|&k| k == key)?;
        let below = *self.sorted.get(index + 1)?;
        if only_within_layer && store[below].layer != store[key].layer {
            None
        } else {
            Some(below)
        }
    }

    /// Windows bottom to top, optionally narrowed to one workspace.
    pub fn list(
        &mut self,
        store: &mut WindowStore,
        workspace: Option<WorkspaceId>,
    ) -> Vec<WindowKey> {
        self.ensure_sorted(store);
        self.sorted
            .iter()
            .rev()
            .copied()
            .filter(|&key| located_on_workspace(&store[key], workspace))
            .collect()
    }

    /// How two windows compare in the final order; `Less` means `a` is
    /// under `b`.
    pub fn order(&mut self, store: &mut WindowStore, a: WindowKey, b: WindowKey) -> Ordering {
        self.ensure_sorted(store);
        let wa = &store[a];
        let wb = &store[b];
        debug_assert_eq!(wa.screen, wb.screen);
        (wa.layer, wa.stack_position).cmp(&(wb.layer, wb.stack_position))
    }

    /// The topmost focusable, mapped window meeting the filters: preferring
    /// the excluded window's transient parent, then one of its group mates,
    /// then any non-dock window, and a dock only as a last resort.
    pub fn default_focus_candidate(
        &mut self,
        store: &mut WindowStore,
        workspace: Option<WorkspaceId>,
        exclude: Option<WindowKey>,
        at_point: Option<Point>,
    ) -> Option<WindowKey> {
        self.ensure_sorted(store);

        let excluded = exclude.and_then(|key| store.get(key));
        let exclude_group = excluded.and_then(|w| w.group);
        let exclude_parent = excluded.and_then(|w| match w.transient {
            TransientTarget::Window(parent) => store.key_of(parent),
            _ => None,
        });

        let mut transient_parent = None;
        let mut group_mate = None;
        let mut topmost = None;
        let mut dock = None;
        for &key in &self.sorted {
            let window = &store[key];
            if Some(key) == exclude || window.hidden || !window.focusable() {
                continue;
            }
            if !located_on_workspace(window, workspace) {
                continue;
            }
            if let Some(point) = at_point
                && !window.frame.contains(point)
            {
                continue;
            }
            if window.kind == WindowKind::Dock {
                if dock.is_none() {
                    dock = Some(key);
                }
                continue;
            }
            if transient_parent.is_none() && exclude_parent == Some(key) {
                transient_parent = Some(key);
            }
            if group_mate.is_none() && exclude_group.is_some() && window.group == exclude_group {
                group_mate = Some(key);
            }
            if topmost.is_none() {
                topmost = Some(key);
            }
        }
        transient_parent.or(group_mate).or(topmost).or(dock)
    }

    /// Renders the current stack as a tree of layers, for debugging.
    pub fn describe(&mut self, store: &mut WindowStore) -> String {
        self.ensure_sorted(store);
        let mut bands: Vec<ascii_tree::Tree> = Vec::new();
        let mut index = 0;
        while index < self.sorted.len() {
            let layer = store[self.sorted[index]].layer;
            let mut lines = Vec::new();
            while index < self.sorted.len() && store[self.sorted[index]].layer == layer {
                let window = &store[self.sorted[index]];
                lines.push(format!(
                    "{} {} at {}",
                    window.id,
                    window.kind,
                    window.stack_position.unwrap_or(0)
                ));
                index += 1;
            }
            bands.push(ascii_tree::Tree::Node(
                layer.to_string(),
                vec![ascii_tree::Tree::Leaf(lines)],
            ));
        }
        let tree = ascii_tree::Tree::Node("stack".to_string(), bands);
        let mut out = String::new();
        let _ = ascii_tree::write_tree(&mut out, &tree);
        out
    }

    /// Checks the engine invariants, returning a finding per violation.
    /// Empty means the stack is consistent.
    pub fn audit(&mut self, store: &mut WindowStore) -> Vec<String> {
        self.ensure_sorted(store);
        let mut findings = Vec::new();

        if self.sorted.len() != self.n_positions {
            findings.push(format!(
                "{} windows in the sorted list but {} positions allocated",
                self.sorted.len(),
                self.n_positions
            ));
        }
        let mut seen = vec![false; self.n_positions];
        for &key in &self.sorted {
            match store[key].stack_position {
                Some(p) if p < self.n_positions && !seen[p] => seen[p] = true,
                other => findings.push(format!(
                    "window {} has a duplicate or out-of-range position {other:?}",
                    store[key].id
                )),
            }
        }

        for pair in self.sorted.windows(2) {
            let (upper, lower) = (&store[pair[0]], &store[pair[1]]);
            if (upper.layer, upper.stack_position) <= (lower.layer, lower.stack_position) {
                findings.push(format!(
                    "sorted order is inconsistent between {} and {}",
                    upper.id, lower.id
                ));
            }
        }

        for (above, below) in constraints::edges(self, store) {
            let (above, below) = (&store[above], &store[below]);
            if above.stack_position <= below.stack_position {
                findings.push(format!(
                    "constraint violated: {} is not over {}",
                    above.id, below.id
                ));
            }
            // The resolver only promotes layers for transient-type windows.
            if above.kind.is_transient_type() && above.layer < below.layer {
                findings.push(format!(
                    "constraint violated: {} is layered under {}",
                    above.id, below.id
                ));
            }
        }

        findings
    }

    // ---- internals ---------------------------------------------------

    /// Moves a window to `position`, shifting every window in between by
    /// one to keep positions dense and unique. No sync.
    pub(super) fn set_position_no_sync(
        &mut self,
        store: &mut WindowStore,
        key: WindowKey,
        position: usize,
    ) {
        let Some(window) = store.get(key) else {
            warn!("reposition of a window that is not in the store");
            return;
        };
        let Some(current) = window.stack_position else {
            debug_assert!(false, "window {} is not in the stack", window.id);
            warn!(window = %window.id, "reposition of a window that is not in the stack");
            return;
        };
        if window.screen != self.screen {
            debug_assert!(false, "window {} belongs to another screen", window.id);
            warn!(window = %window.id, "reposition of a window from another screen");
            return;
        }
        if position >= self.n_positions {
            debug_assert!(false, "position {position} is out of range");
            warn!(position, "reposition outside the stack; ignored");
            return;
        }
        if position == current {
            return;
        }

        self.need_resort = true;
        self.need_constrain = true;

        let (low, high, delta) = if position < current {
            (position, current - 1, 1isize)
        } else {
            (current + 1, position, -1isize)
        };
        let screen = self.screen;
        for (other_key, other) in store.iter_mut() {
            if other_key == key || other.screen != screen {
                continue;
            }
            if let Some(p) = other.stack_position
                && p >= low
                && p <= high
            {
                other.stack_position = Some((p as isize + delta) as usize);
            }
        }
        store[key].stack_position = Some(position);
        trace!(window = %store[key].id, position, "stack position set");
    }

    fn do_deletions(&mut self) {
        for id in self.removed.drain(..) {
            if let Some(index) = self.ids.iter().rposition(|&known| known == id) {
                self.ids.remove(index);
            }
        }
    }

    fn do_additions(&mut self, store: &WindowStore) {
        if self.added.is_empty() {
            return;
        }
        debug!(count = self.added.len(), "folding new windows into the stack");
        for key in std::mem::take(&mut self.added) {
            let Some(window) = store.get(key) else {
                warn!("pending window vanished from the store before it was folded in");
                continue;
            };
            self.ids.push(window.id);
            self.sorted.insert(0, key);
        }
        self.need_resort = true;
        self.need_relayer = true;
        self.need_constrain = true;
    }

    fn do_relayer(&mut self, store: &mut WindowStore) {
        if !self.need_relayer {
            return;
        }
        debug!("recomputing layers");
        let focus = self.focus_context(store);
        for index in 0..self.sorted.len() {
            let key = self.sorted[index];
            let old = store[key].layer;
            let new = layers::compute_layer(store, key, focus);
            if new != old {
                debug!(window = %store[key].id, from = %old, to = %new, "window changed layer");
                store[key].layer = new;
                self.need_resort = true;
                self.need_constrain = true;
            }
        }
        self.need_relayer = false;
    }

    fn do_constrain(&mut self, store: &mut WindowStore) {
        if !self.need_constrain {
            return;
        }
        debug!("reapplying transiency constraints");
        constraints::resolve(self, store);
        self.need_constrain = false;
    }

    fn do_resort(&mut self, store: &WindowStore) {
        if !self.need_resort {
            return;
        }
        debug!("sorting the stack");
        self.sorted.sort_by(|&a, &b| {
            let ka = (store[a].layer, store[a].stack_position);
            let kb = (store[b].layer, store[b].stack_position);
            kb.cmp(&ka)
        });
        self.need_resort = false;
    }

    /// Puts the stack into canonical form: folds removals and additions,
    /// then recomputes layers, constraints and the sort, each only when its
    /// dirty flag is set.
    pub(crate) fn ensure_sorted(&mut self, store: &mut WindowStore) {
        self.do_deletions();
        self.do_additions(store);
        self.do_relayer(store);
        self.do_constrain(store);
        self.do_resort(store);
    }

    fn focus_context(&self, store: &WindowStore) -> FocusContext {
        let expected = self.expected_focus.filter(|&key| store.contains(key));
        FocusContext {
            expected_focus: expected,
            expected_focus_monitor: expected.and_then(|key| store[key].monitor),
        }
    }

    /// Orders the windows on the server to match our structure, then
    /// publishes the client list property pair. A no-op while frozen.
    /// Individual server failures are logged and dropped; the next sync
    /// reconciles against whatever actually happened.
    pub fn sync(&mut self, store: &mut WindowStore, server: &mut dyn StackWriter) {
        if self.freeze_count > 0 {
            return;
        }
        self.ensure_sorted(store);
        trace!("syncing window stack to the server");

        let mut stacking = Vec::with_capacity(self.sorted.len());
        let mut visible = Vec::new();
        let mut hidden = Vec::new();
        for &key in self.sorted.iter().rev() {
            let window = &store[key];
            stacking.push(window.id);
            if window.hidden {
                hidden.push(window.id);
            } else {
                visible.push(window.id);
            }
        }

        let mut ops: Vec<RestackOp> =
            sync::plan_restack(self.last_synced.as_deref(), &visible, |id| store.contains_id(id));
        if self.last_synced.is_none() || self.last_hidden != hidden {
            ops.extend(sync::plan_hidden_block(
                self.guard_window,
                &hidden,
                self.last_synced.is_none(),
            ));
        }

        for op in &ops {
            if let Err(err) = sync::apply(server, op) {
                warn!(%op, %err, "restack operation failed; the next sync will reconcile");
            }
        }

        if self.client_list != self.ids || self.client_list_stacking != stacking {
            if let Err(err) = server.publish_client_lists(&self.ids, &stacking) {
                warn!(%err, "failed to publish client lists");
            }
            self.client_list = self.ids.clone();
            self.client_list_stacking = stacking;
        }

        self.last_hidden = hidden;
        self.last_synced = Some(visible);
    }
}

fn located_on_workspace(window: &WindowRecord, workspace: Option<WorkspaceId>) -> bool {
    match (window.workspace, workspace) {
        (None, _) | (_, None) => true,
        (Some(a), Some(b)) => a == b,
    }
}

fn same_window_set(a: &[WindowKey], b: &[WindowKey]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut a = a.to_vec();
    let mut b = b.to_vec();
    a.sort_unstable();
    b.sort_unstable();
    a == b
}
