//! Window stacking engine: which windows cover which other windows.
//!
//! The engine maintains a single deterministic front-to-back order over all
//! managed windows, derived from a layering policy, transiency and group
//! constraints, and explicit raise/lower requests, and resynchronizes that
//! order to a display server with a minimal set of restacking operations.

pub mod common;
pub mod model;
pub mod replay;
pub mod stacking;
pub mod sys;
