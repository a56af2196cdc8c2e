//! Waytile - the core of a tiling Wayland compositor
//!
//! This is the entry point that sets up the Wayland server with virtual
//! outputs and runs the event loop.

use log::info;

fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let output_count = std::env::var("WAYTILE_OUTPUTS")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(1);

    info!("Starting waytile with {} virtual output(s)", output_count);
    waytile::server::run(output_count)
}
