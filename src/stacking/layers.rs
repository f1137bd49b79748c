use tracing::trace;

use crate::model::store::WindowStore;
use crate::model::window::{
    GroupId, Layer, MonitorId, TransientTarget, WindowHints, WindowKey, WindowKind, WindowRecord,
};

/// Focus context consulted by the fullscreen classification rule.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct FocusContext {
    pub expected_focus: Option<WindowKey>,
    pub expected_focus_monitor: Option<MonitorId>,
}

/// Layer for a window considered on its own, ignoring transiency and group.
pub(crate) fn standalone_layer(key: WindowKey, window: &WindowRecord, focus: FocusContext) -> Layer {
    if window.hidden {
        return Layer::Desktop;
    }
    match window.kind {
        WindowKind::Desktop => Layer::Desktop,
        WindowKind::Dock => {
            if window.hints.contains(WindowHints::BELOW) {
                Layer::Bottom
            } else {
                Layer::Dock
            }
        }
        _ => {
            if window.hints.contains(WindowHints::BELOW) {
                Layer::Bottom
            } else if window.hints.contains(WindowHints::FULLSCREEN)
                && may_cover_expected_focus(key, window, focus)
            {
                Layer::Fullscreen
            } else if window.hints.contains(WindowHints::ABOVE) {
                Layer::Top
            } else {
                Layer::Normal
            }
        }
    }
}

/// A fullscreen window only takes the fullscreen layer while doing so cannot
/// obscure the window that is expected to receive focus.
fn may_cover_expected_focus(key: WindowKey, window: &WindowRecord, focus: FocusContext) -> bool {
    match focus.expected_focus {
        None => true,
        Some(expected) if expected == key => true,
        Some(_) => window.attached_focus || focus.expected_focus_monitor != window.monitor,
    }
}

/// Highest standalone layer among the group's members. Peer layers are taken
/// standalone, never already-promoted, so one promoted window cannot drag
/// the whole group upward round after round.
fn max_layer_in_group(store: &WindowStore, group: GroupId, focus: FocusContext) -> Layer {
    let mut max = Layer::Desktop;
    for &member in store.group_members(group) {
        let layer = standalone_layer(member, &store[member], focus);
        if layer > max {
            max = layer;
        }
    }
    max
}

/// Final layer for a window: its standalone layer, promoted to the group
/// maximum for dialogs and other transient-type windows that are transient
/// for their whole group or for nothing in particular. Windows transient
/// for one specific window are left alone; promoting those would lift a
/// dialog over, say, a dock it would normally sit below.
pub(crate) fn compute_layer(store: &WindowStore, key: WindowKey, focus: FocusContext) -> Layer {
    let window = &store[key];
    let mut layer = standalone_layer(key, window, focus);
    if layer != Layer::Desktop
        && window.kind.is_transient_type()
        && matches!(window.transient, TransientTarget::None | TransientTarget::Group)
        && let Some(group) = window.group
    {
        let group_max = max_layer_in_group(store, group, focus);
        if group_max > layer {
            trace!(
                window = %window.id,
                from = %layer,
                to = %group_max,
                "promoting window to its group's layer"
            );
            layer = group_max;
        }
    }
    layer
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::window::{ScreenId, StackId, WindowRecord};

    fn store_with(records: Vec<WindowRecord>) -> (WindowStore, Vec<WindowKey>) {
        let mut store = WindowStore::new();
        let keys = records.into_iter().map(|r| store.insert(r)).collect();
        (store, keys)
    }

    fn window(id: u64, kind: WindowKind) -> WindowRecord {
        let mut record = WindowRecord::new(StackId::new(id), kind);
        record.screen = ScreenId(0);
        record
    }

    #[test]
    fn kind_policy() {
        let (store, keys) = store_with(vec![
            window(1, WindowKind::Desktop),
            window(2, WindowKind::Dock),
            window(3, WindowKind::Normal),
        ]);
        let focus = FocusContext::default();
        assert_eq!(standalone_layer(keys[0], &store[keys[0]], focus), Layer::Desktop);
        assert_eq!(standalone_layer(keys[1], &store[keys[1]], focus), Layer::Dock);
        assert_eq!(standalone_layer(keys[2], &store[keys[2]], focus), Layer::Normal);
    }

    #[test]
    fn hidden_windows_sink_to_the_desktop_band() {
        let mut record = window(1, WindowKind::Dock);
        record.hidden = true;
        let (store, keys) = store_with(vec![record]);
        assert_eq!(
            standalone_layer(keys[0], &store[keys[0]], FocusContext::default()),
            Layer::Desktop
        );
    }

    #[test]
    fn below_hint_demotes_docks() {
        let mut record = window(1, WindowKind::Dock);
        record.hints |= WindowHints::BELOW;
        let (store, keys) = store_with(vec![record]);
        assert_eq!(
            standalone_layer(keys[0], &store[keys[0]], FocusContext::default()),
            Layer::Bottom
        );
    }

    #[test]
    fn above_and_below_hints() {
        let mut above = window(1, WindowKind::Normal);
        above.hints |= WindowHints::ABOVE;
        let mut below = window(2, WindowKind::Normal);
        below.hints |= WindowHints::BELOW;
        let mut both = window(3, WindowKind::Normal);
        both.hints |= WindowHints::ABOVE | WindowHints::BELOW;
        let (store, keys) = store_with(vec![above, below, both]);
        let focus = FocusContext::default();
        assert_eq!(standalone_layer(keys[0], &store[keys[0]], focus), Layer::Top);
        assert_eq!(standalone_layer(keys[1], &store[keys[1]], focus), Layer::Bottom);
        // Below wins when both are set.
        assert_eq!(standalone_layer(keys[2], &store[keys[2]], focus), Layer::Bottom);
    }

    #[test]
    fn fullscreen_defers_to_the_expected_focus_window() {
        let mut fullscreen = window(1, WindowKind::Normal);
        fullscreen.hints |= WindowHints::FULLSCREEN;
        fullscreen.monitor = Some(MonitorId(0));
        let mut other = window(2, WindowKind::Normal);
        other.monitor = Some(MonitorId(0));
        let (mut store, keys) = store_with(vec![fullscreen, other]);

        // No expected focus: fullscreen layer applies.
        assert_eq!(
            standalone_layer(keys[0], &store[keys[0]], FocusContext::default()),
            Layer::Fullscreen
        );

        // The window itself is expected to take focus: still fullscreen.
        let focus = FocusContext {
            expected_focus: Some(keys[0]),
            expected_focus_monitor: Some(MonitorId(0)),
        };
        assert_eq!(standalone_layer(keys[0], &store[keys[0]], focus), Layer::Fullscreen);

        // Another window on the same monitor will take focus: drop to normal.
        let focus = FocusContext {
            expected_focus: Some(keys[1]),
            expected_focus_monitor: Some(MonitorId(0)),
        };
        assert_eq!(standalone_layer(keys[0], &store[keys[0]], focus), Layer::Normal);

        // ... unless that window sits on a different monitor.
        let focus = FocusContext {
            expected_focus: Some(keys[1]),
            expected_focus_monitor: Some(MonitorId(1)),
        };
        assert_eq!(standalone_layer(keys[0], &store[keys[0]], focus), Layer::Fullscreen);

        // ... or a transient of the fullscreen window holds the focus.
        store[keys[0]].attached_focus = true;
        let focus = FocusContext {
            expected_focus: Some(keys[1]),
            expected_focus_monitor: Some(MonitorId(0)),
        };
        assert_eq!(standalone_layer(keys[0], &store[keys[0]], focus), Layer::Fullscreen);
    }

    #[test]
    fn group_promotion_lifts_dialogs() {
        let group = GroupId(1);
        let mut leader = window(1, WindowKind::Normal);
        leader.hints |= WindowHints::FULLSCREEN;
        leader.group = Some(group);
        let mut dialog = window(2, WindowKind::Dialog);
        dialog.group = Some(group);
        dialog.transient = TransientTarget::Group;
        let (store, keys) = store_with(vec![leader, dialog]);

        let focus = FocusContext::default();
        assert_eq!(compute_layer(&store, keys[1], focus), Layer::Fullscreen);
        // The leader itself is not transient-type and stays where it is.
        assert_eq!(compute_layer(&store, keys[0], focus), Layer::Fullscreen);
    }

    #[test]
    fn promotion_skips_window_specific_transients() {
        let group = GroupId(1);
        let mut leader = window(1, WindowKind::Normal);
        leader.hints |= WindowHints::ABOVE;
        leader.group = Some(group);
        let mut dialog = window(2, WindowKind::Dialog);
        dialog.group = Some(group);
        dialog.transient = TransientTarget::Window(StackId::new(1));
        let (store, keys) = store_with(vec![leader, dialog]);

        assert_eq!(compute_layer(&store, keys[1], FocusContext::default()), Layer::Normal);
    }

    #[test]
    fn promotion_uses_standalone_peer_layers() {
        // Two dialogs in one group must not promote each other: each peer is
        // read standalone, so both stay at the group's real maximum.
        let group = GroupId(1);
        let mut leader = window(1, WindowKind::Normal);
        leader.group = Some(group);
        let mut first = window(2, WindowKind::Dialog);
        first.group = Some(group);
        first.transient = TransientTarget::Group;
        first.hints |= WindowHints::ABOVE;
        let mut second = window(3, WindowKind::Dialog);
        second.group = Some(group);
        second.transient = TransientTarget::Group;
        let (store, keys) = store_with(vec![leader, first, second]);

        let focus = FocusContext::default();
        // `second` is lifted to Top because `first` standalone-classifies
        // there, but no higher: promotion does not feed back.
        assert_eq!(compute_layer(&store, keys[2], focus), Layer::Top);
        assert_eq!(compute_layer(&store, keys[0], focus), Layer::Normal);
    }

    #[test]
    fn promotion_never_applies_to_desktop_band_windows() {
        let group = GroupId(1);
        let mut leader = window(1, WindowKind::Normal);
        leader.hints |= WindowHints::ABOVE;
        leader.group = Some(group);
        let mut dialog = window(2, WindowKind::Dialog);
        dialog.group = Some(group);
        dialog.transient = TransientTarget::Group;
        dialog.hidden = true;
        let (store, keys) = store_with(vec![leader, dialog]);

        assert_eq!(compute_layer(&store, keys[1], FocusContext::default()), Layer::Desktop);
    }
}
