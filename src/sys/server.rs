use thiserror::Error;

use crate::common::collections::HashSet;
use crate::model::window::StackId;
use crate::stacking::sync::RestackOp;

/// Failure of an individual stacking request.
///
/// These are transient: the window in question raced away while the request
/// was in flight. Callers log them and carry on; the next sync reconciles.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("window {0} is gone")]
    WindowGone(StackId),
    #[error("sibling window {0} is gone")]
    SiblingGone(StackId),
}

/// Where the computed stacking order is written.
///
/// A production implementation forwards these to the display connection;
/// [`SimulatedServer`] applies them to an in-memory stack for tests and the
/// replay tool.
pub trait StackWriter {
    /// A window came into existence on the server, above everything else.
    fn window_created(&mut self, window: StackId);

    /// A window was destroyed on the server.
    fn window_destroyed(&mut self, window: StackId);

    /// Imposes `order` (topmost first) on the listed windows. The first
    /// window stays put; each subsequent one is placed directly below its
    /// predecessor.
    fn restack(&mut self, order: &[StackId]) -> Result<(), ServerError>;

    /// Places `window` directly above `sibling`.
    fn place_above(&mut self, window: StackId, sibling: StackId) -> Result<(), ServerError>;

    /// Places `window` directly below `sibling`.
    fn place_below(&mut self, window: StackId, sibling: StackId) -> Result<(), ServerError>;

    /// Moves `window` to the very bottom of the stack.
    fn lower_to_bottom(&mut self, window: StackId) -> Result<(), ServerError>;

    /// Publishes the client list property pair (both bottom to top: in
    /// order of addition, and in stacking order).
    fn publish_client_lists(
        &mut self,
        list: &[StackId],
        stacking: &[StackId],
    ) -> Result<(), ServerError>;
}

/// In-memory stand-in for the display server.
///
/// Maintains a bottom-to-top stack, applies operations the way the real
/// server would, records everything it was asked to do, and can be primed
/// to fail for chosen windows.
#[derive(Debug, Default)]
pub struct SimulatedServer {
    stack: Vec<StackId>,
    gone: HashSet<StackId>,
    ops: Vec<RestackOp>,
    published: Option<(Vec<StackId>, Vec<StackId>)>,
}

impl SimulatedServer {
    /// A server whose stack starts out holding only the guard sentinel.
    pub fn new(guard_window: StackId) -> Self {
        SimulatedServer {
            stack: vec![guard_window],
            gone: HashSet::default(),
            ops: Vec::new(),
            published: None,
        }
    }

    /// Pretend `window` was destroyed behind the engine's back: it drops
    /// out of the stack and every later request naming it fails.
    pub fn fail_for(&mut self, window: StackId) {
        self.gone.insert(window);
        self.stack.retain(|&w| w != window);
    }

    /// Current stack, bottom to top.
    pub fn order(&self) -> &[StackId] {
        &self.stack
    }

    /// Every operation requested so far, in order.
    pub fn ops(&self) -> &[RestackOp] {
        &self.ops
    }

    /// Drains the recorded operation log.
    pub fn take_ops(&mut self) -> Vec<RestackOp> {
        std::mem::take(&mut self.ops)
    }

    /// The last published client list pair, if any.
    pub fn published_lists(&self) -> Option<&(Vec<StackId>, Vec<StackId>)> {
        self.published.as_ref()
    }

    fn position(&self, window: StackId) -> Option<usize> {
        self.stack.iter().position(|&w| w == window)
    }

    fn move_below(&mut self, window: StackId, sibling: StackId) -> Result<(), ServerError> {
        if self.gone.contains(&window) {
            return Err(ServerError::WindowGone(window));
        }
        let from = self.position(window).ok_or(ServerError::WindowGone(window))?;
        let sibling_at = self.position(sibling).ok_or(ServerError::SiblingGone(sibling))?;
        if from == sibling_at {
            return Ok(());
        }
        let moved = self.stack.remove(from);
        let target = if from < sibling_at { sibling_at - 1 } else { sibling_at };
        self.stack.insert(target, moved);
        Ok(())
    }

    fn move_above(&mut self, window: StackId, sibling: StackId) -> Result<(), ServerError> {
        if self.gone.contains(&window) {
            return Err(ServerError::WindowGone(window));
        }
        let from = self.position(window).ok_or(ServerError::WindowGone(window))?;
        let sibling_at = self.position(sibling).ok_or(ServerError::SiblingGone(sibling))?;
        if from == sibling_at {
            return Ok(());
        }
        let moved = self.stack.remove(from);
        let target = if from < sibling_at { sibling_at } else { sibling_at + 1 };
        self.stack.insert(target, moved);
        Ok(())
    }
}

impl StackWriter for SimulatedServer {
    fn window_created(&mut self, window: StackId) {
        if !self.gone.contains(&window) && self.position(window).is_none() {
            self.stack.push(window);
        }
    }

    fn window_destroyed(&mut self, window: StackId) {
        self.stack.retain(|&w| w != window);
    }

    fn restack(&mut self, order: &[StackId]) -> Result<(), ServerError> {
        self.ops.push(RestackOp::Restack(order.to_vec()));
        for pair in order.windows(2) {
            self.move_below(pair[1], pair[0])?;
        }
        Ok(())
    }

    fn place_above(&mut self, window: StackId, sibling: StackId) -> Result<(), ServerError> {
        self.ops.push(RestackOp::PlaceAbove { window, sibling });
        self.move_above(window, sibling)
    }

    fn place_below(&mut self, window: StackId, sibling: StackId) -> Result<(), ServerError> {
        self.ops.push(RestackOp::PlaceBelow { window, sibling });
        self.move_below(window, sibling)
    }

    fn lower_to_bottom(&mut self, window: StackId) -> Result<(), ServerError> {
        self.ops.push(RestackOp::LowerToBottom(window));
        if self.gone.contains(&window) {
            return Err(ServerError::WindowGone(window));
        }
        let from = self.position(window).ok_or(ServerError::WindowGone(window))?;
        let moved = self.stack.remove(from);
        self.stack.insert(0, moved);
        Ok(())
    }

    fn publish_client_lists(
        &mut self,
        list: &[StackId],
        stacking: &[StackId],
    ) -> Result<(), ServerError> {
        self.published = Some((list.to_vec(), stacking.to_vec()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GUARD: StackId = StackId(1000);

    fn server_with(windows: &[u64]) -> SimulatedServer {
        let mut server = SimulatedServer::new(GUARD);
        for &id in windows {
            server.window_created(StackId::new(id));
        }
        server
    }

    #[test]
    fn restack_imposes_order_under_the_anchor() {
        let mut server = server_with(&[1, 2, 3]);
        server.restack(&[StackId::new(1), StackId::new(3), StackId::new(2)]).unwrap();
        assert_eq!(server.order(), &[GUARD, StackId::new(2), StackId::new(3), StackId::new(1)]);
    }

    #[test]
    fn place_above_and_below_are_exact() {
        let mut server = server_with(&[1, 2, 3]);
        server.place_above(StackId::new(1), StackId::new(3)).unwrap();
        assert_eq!(server.order(), &[GUARD, StackId::new(2), StackId::new(3), StackId::new(1)]);
        server.place_below(StackId::new(1), StackId::new(2)).unwrap();
        assert_eq!(server.order(), &[GUARD, StackId::new(1), StackId::new(2), StackId::new(3)]);
    }

    #[test]
    fn lower_to_bottom_goes_under_the_guard() {
        let mut server = server_with(&[1, 2]);
        server.lower_to_bottom(StackId::new(2)).unwrap();
        assert_eq!(server.order(), &[StackId::new(2), GUARD, StackId::new(1)]);
    }

    #[test]
    fn failed_windows_report_gone() {
        let mut server = server_with(&[1, 2]);
        server.fail_for(StackId::new(2));
        let err = server.place_above(StackId::new(2), StackId::new(1)).unwrap_err();
        assert!(matches!(err, ServerError::WindowGone(id) if id == StackId::new(2)));
        // The op is still recorded; the engine logs and moves on.
        assert_eq!(server.ops().len(), 1);
    }
}
