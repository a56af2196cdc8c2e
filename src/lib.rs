//! Waytile - the core of a tiling Wayland compositor
//!
//! Waytile coordinates a tiling compositor around a transactional pipeline:
//! window-management state moves from *pending* (what was asked for) through
//! *inflight* (what the compositor committed to) to *current* (what is on
//! screen), with a single serialization point on the event loop.
//!
//! # Architecture
//!
//! - **Scene graph**: a node tree with reparenting, enable/disable, and
//!   hit testing; views, layer surfaces, and outputs own subtrees of it
//! - **Compositor core**: the root coordinator, view and output arenas, the
//!   output layout, and the transaction engine
//! - **Protocol layer**: socket-free output-management, power-management,
//!   xdg-output, and layer-shell logic
//! - **Server**: wayland-server globals and dispatch glued to the core
//!
//! # Example
//!
//! ```no_run
//! use waytile::compositor::Root;
//!
//! // The compositor is typically run via the main binary; the core can be
//! // driven directly for testing
//! let mut root = Root::new();
//! root.apply_pending();
//! ```

pub mod backend;
pub mod compositor;
pub mod input;
pub mod protocol;
pub mod scene;
pub mod server;
