//! Wayland global registry implementations
//!
//! Implements GlobalDispatch for advertising globals to clients.

use log::debug;
use wayland_protocols::xdg::xdg_output::zv1::server::zxdg_output_manager_v1;
use wayland_protocols_wlr::output_management::v1::server::zwlr_output_manager_v1;
use wayland_protocols_wlr::output_power_management::v1::server::zwlr_output_power_manager_v1;
use wayland_server::protocol::wl_output;
use wayland_server::{Client, DataInit, DisplayHandle, GlobalDispatch, New, Resource};

use super::dispatch::{self, OutputData};
use super::Server;
use crate::protocol::output_config;

// ============================================================================
// wl_output global (one per advertised output)
// ============================================================================

impl GlobalDispatch<wl_output::WlOutput, OutputData> for Server {
    fn bind(
        state: &mut Self,
        _handle: &DisplayHandle,
        _client: &Client,
        resource: New<wl_output::WlOutput>,
        global_data: &OutputData,
        data_init: &mut DataInit<'_, Self>,
    ) {
        let output_id = global_data.output_id;
        debug!("Client bound wl_output for {:?}", output_id);
        let output_resource = data_init.init(resource, OutputData { output_id });

        let Some(output) = state.root.outputs.get(output_id) else {
            return;
        };
        let (x, y) = state
            .root
            .output_layout
            .position(output_id)
            .unwrap_or(output.position);

        // Physical dimensions are unknown for virtual outputs
        output_resource.geometry(
            x,
            y,
            0,
            0,
            wl_output::Subpixel::Unknown,
            output.make.clone(),
            output.model.clone(),
            wl_output::Transform::Normal,
        );

        if let Some(mode) = output.mode() {
            let mut flags = wl_output::Mode::Current;
            if mode.preferred {
                flags |= wl_output::Mode::Preferred;
            }
            output_resource.mode(flags, mode.width, mode.height, mode.refresh);
        }

        if output_resource.version() >= 2 {
            output_resource.scale(output.scale.round() as i32);
        }
        if output_resource.version() >= 4 {
            output_resource.name(output.name.clone());
            output_resource.description(format!("{} {}", output.make, output.model));
        }
        if output_resource.version() >= 2 {
            output_resource.done();
        }
    }
}

// ============================================================================
// zwlr_output_manager_v1 global
// ============================================================================

impl GlobalDispatch<zwlr_output_manager_v1::ZwlrOutputManagerV1, ()> for Server {
    fn bind(
        state: &mut Self,
        handle: &DisplayHandle,
        _client: &Client,
        resource: New<zwlr_output_manager_v1::ZwlrOutputManagerV1>,
        _global_data: &(),
        data_init: &mut DataInit<'_, Self>,
    ) {
        debug!("Client bound zwlr_output_manager");
        let manager = data_init.init(resource, ());

        let heads = match output_config::snapshot(&state.root) {
            Ok(heads) => dispatch::send_heads(handle, &manager, &heads),
            Err(err) => {
                log::error!("Skipping initial configuration: {}", err);
                Vec::new()
            }
        };
        manager.done(state.config_serial());
        state.bind_config_manager(manager, heads);
    }
}

// ============================================================================
// zwlr_output_power_manager_v1 global
// ============================================================================

impl GlobalDispatch<zwlr_output_power_manager_v1::ZwlrOutputPowerManagerV1, ()> for Server {
    fn bind(
        _state: &mut Self,
        _handle: &DisplayHandle,
        _client: &Client,
        resource: New<zwlr_output_power_manager_v1::ZwlrOutputPowerManagerV1>,
        _global_data: &(),
        data_init: &mut DataInit<'_, Self>,
    ) {
        debug!("Client bound zwlr_output_power_manager");
        data_init.init(resource, ());
    }
}

// ============================================================================
// zxdg_output_manager_v1 global
// ============================================================================

impl GlobalDispatch<zxdg_output_manager_v1::ZxdgOutputManagerV1, ()> for Server {
    fn bind(
        _state: &mut Self,
        _handle: &DisplayHandle,
        _client: &Client,
        resource: New<zxdg_output_manager_v1::ZxdgOutputManagerV1>,
        _global_data: &(),
        data_init: &mut DataInit<'_, Self>,
    ) {
        debug!("Client bound zxdg_output_manager");
        data_init.init(resource, ());
    }
}
