//! Compositor core module
//!
//! This module contains the core window-management logic:
//! - The root coordinator and its transaction engine
//! - View state snapshots and the view arena
//! - Per-output state and the output registry
//! - The geometric output layout
//! - The stack primitive the three state phases are threaded on

pub mod layout;
pub mod output;
pub mod root;
pub mod stack;
pub mod view;

pub use layout::{LayoutDemand, OutputLayout};
pub use output::{
    Output, OutputId, OutputManager, OutputMode, OutputStatusEvent, OutputTransform,
    ProposedOutputState,
};
pub use root::{AtResult, AtTarget, Root, TransactionTimer, TRANSACTION_TIMEOUT};
pub use stack::ViewStack;
pub use view::{SurfaceId, View, ViewManager, ViewId, ViewShell, ViewState};
