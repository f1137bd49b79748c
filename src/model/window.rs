use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use static_assertions::const_assert;
use strum::Display;

use super::geometry::Rect;

slotmap::new_key_type! {
    /// Handle to a window record in a [`WindowStore`](super::store::WindowStore).
    pub struct WindowKey;
}

/// Identifier a window is known by on the display server.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StackId(pub u64);

impl StackId {
    #[inline]
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    #[inline]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl From<StackId> for u64 {
    #[inline]
    fn from(id: StackId) -> Self {
        id.0
    }
}

impl fmt::Display for StackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

/// Identifier of a window group. Group membership is bookkept by the window
/// management layer; the stacking engine only ever looks groups up by id.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct GroupId(pub u32);

/// Identifier of a workspace.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct WorkspaceId(pub u32);

/// Identifier of a monitor within a screen.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MonitorId(pub u32);

/// Identifier of a logical screen. Each screen has its own stack; transient
/// relationships never constrain windows across screens.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ScreenId(pub u32);

/// What kind of window this is, as declared by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum WindowKind {
    Normal,
    Dialog,
    ModalDialog,
    Dock,
    Desktop,
    Toolbar,
    Menu,
    Utility,
    Splash,
}

impl WindowKind {
    /// Dialogs and accessory windows that stay above whatever they belong to.
    pub fn is_transient_type(self) -> bool {
        matches!(
            self,
            WindowKind::Dialog
                | WindowKind::ModalDialog
                | WindowKind::Toolbar
                | WindowKind::Menu
                | WindowKind::Utility
        )
    }
}

bitflags! {
    /// Client hints that feed layer classification and focus queries.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub struct WindowHints: u8 {
        const FULLSCREEN = 1 << 0;
        const ABOVE = 1 << 1;
        const BELOW = 1 << 2;
        const DEMANDS_ATTENTION = 1 << 3;
        const ACCEPTS_FOCUS = 1 << 4;
    }
}

/// What a window declares itself transient for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransientTarget {
    /// Not transient for anything.
    #[default]
    None,
    /// Transient for its whole group, with no specific parent.
    Group,
    /// Transient for one specific window.
    Window(StackId),
}

/// Coarse band a window is stacked into. Layer always dominates stack
/// position when computing the final order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, Display,
)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Layer {
    Desktop,
    Bottom,
    #[default]
    Normal,
    Dock,
    Fullscreen,
    Top,
}

// The whole engine leans on this ordering.
const_assert!((Layer::Desktop as u8) < (Layer::Bottom as u8));
const_assert!((Layer::Bottom as u8) < (Layer::Normal as u8));
const_assert!((Layer::Normal as u8) < (Layer::Dock as u8));
const_assert!((Layer::Dock as u8) < (Layer::Fullscreen as u8));
const_assert!((Layer::Fullscreen as u8) < (Layer::Top as u8));

/// Per-window state the stacking engine orders by.
///
/// Identity and the classification inputs (`kind`, `hints`, `hidden`,
/// transiency, group) are owned by the window management layer; the engine
/// reads them and maintains `stack_position` and `layer`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowRecord {
    pub id: StackId,
    pub kind: WindowKind,
    #[serde(default)]
    pub hints: WindowHints,
    #[serde(default)]
    pub hidden: bool,
    /// A transient window in this window's focus chain holds the focus.
    #[serde(default)]
    pub attached_focus: bool,
    #[serde(default)]
    pub screen: ScreenId,
    #[serde(default)]
    pub monitor: Option<MonitorId>,
    /// `None` means the window shows on every workspace.
    #[serde(default)]
    pub workspace: Option<WorkspaceId>,
    /// Mutate through [`WindowStore::set_group`](super::store::WindowStore::set_group)
    /// once the record is in a store, so the group index stays consistent.
    #[serde(default)]
    pub group: Option<GroupId>,
    #[serde(default)]
    pub transient: TransientTarget,
    #[serde(default)]
    pub frame: Rect,
    #[serde(skip)]
    pub(crate) stack_position: Option<usize>,
    #[serde(skip)]
    pub(crate) layer: Layer,
}

impl WindowRecord {
    pub fn new(id: StackId, kind: WindowKind) -> Self {
        WindowRecord {
            id,
            kind,
            hints: WindowHints::empty(),
            hidden: false,
            attached_focus: false,
            screen: ScreenId::default(),
            monitor: None,
            workspace: None,
            group: None,
            transient: TransientTarget::None,
            frame: Rect::ZERO,
            stack_position: None,
            layer: Layer::Normal,
        }
    }

    /// Dense position within the stack, if the window is currently in one.
    pub fn stack_position(&self) -> Option<usize> {
        self.stack_position
    }

    /// Layer as of the last classification pass.
    pub fn layer(&self) -> Layer {
        self.layer
    }

    pub fn in_stack(&self) -> bool {
        self.stack_position.is_some()
    }

    pub fn focusable(&self) -> bool {
        self.hints.contains(WindowHints::ACCEPTS_FOCUS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_types() {
        assert!(WindowKind::Dialog.is_transient_type());
        assert!(WindowKind::ModalDialog.is_transient_type());
        assert!(WindowKind::Utility.is_transient_type());
        assert!(!WindowKind::Normal.is_transient_type());
        assert!(!WindowKind::Dock.is_transient_type());
        assert!(!WindowKind::Desktop.is_transient_type());
        assert!(!WindowKind::Splash.is_transient_type());
    }

    #[test]
    fn layer_band_order() {
        assert!(Layer::Desktop < Layer::Bottom);
        assert!(Layer::Normal < Layer::Dock);
        assert!(Layer::Dock < Layer::Fullscreen);
        assert!(Layer::Fullscreen < Layer::Top);
    }
}
