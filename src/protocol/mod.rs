//! Wayland protocol implementations
//!
//! Socket-free logic for the protocols the core speaks:
//! - wlr-output-management (test/apply of head configurations)
//! - wlr-output-power-management (on/off per output)
//! - xdg-output (logical geometry)
//! - wlr-layer-shell (surface data model and arrangement)
//!
//! The wire glue that binds these to wayland-server lives in
//! [`crate::server`].

pub mod layer_shell;
pub mod output_config;
pub mod output_power;
pub mod xdg_output;

pub use layer_shell::{Anchor, Layer, LayerSurface, LayerSurfaceId};
pub use output_config::{ConfigResult, HeadConfig, HeadState};
pub use output_power::PowerMode;
pub use xdg_output::XdgOutputEvent;
