//! Wayland protocol dispatch implementations
//!
//! Implements the Dispatch trait for each protocol object the server
//! exposes. Configuration objects accumulate their head edits behind a
//! Mutex, since resource user data is shared immutably with the dispatch
//! machinery.

use std::sync::{Arc, Mutex};

use log::{debug, warn};
use wayland_protocols::xdg::xdg_output::zv1::server::{zxdg_output_manager_v1, zxdg_output_v1};
use wayland_protocols_wlr::output_management::v1::server::{
    zwlr_output_configuration_head_v1, zwlr_output_configuration_v1, zwlr_output_head_v1,
    zwlr_output_manager_v1, zwlr_output_mode_v1,
};
use wayland_protocols_wlr::output_power_management::v1::server::{
    zwlr_output_power_manager_v1, zwlr_output_power_v1,
};
use wayland_server::protocol::wl_output;
use wayland_server::{Client, DataInit, Dispatch, DisplayHandle, Resource};

use crate::compositor::{OutputId, OutputTransform, ProposedOutputState};
use crate::protocol::{output_config, output_power, xdg_output};
use crate::protocol::output_config::{ConfigResult, HeadConfig, HeadState};

use super::Server;

/// Resource data tying a protocol object to an output
#[derive(Debug, Clone, Copy)]
pub struct OutputData {
    pub output_id: OutputId,
}

/// Resource data for an advertised mode
#[derive(Debug, Clone, Copy)]
pub struct ModeData {
    pub output_id: OutputId,
    pub index: usize,
}

/// Accumulated state of a configuration object
pub struct ConfigData {
    /// The publication serial the client created this configuration against
    pub serial: u32,
    heads: Mutex<Vec<(OutputId, Arc<Mutex<ProposedOutputState>>)>>,
}

impl ConfigData {
    fn new(serial: u32) -> Self {
        Self {
            serial,
            heads: Mutex::new(Vec::new()),
        }
    }

    fn push(&self, output: OutputId, state: Arc<Mutex<ProposedOutputState>>) {
        self.heads.lock().unwrap().push((output, state));
    }

    fn head_configs(&self) -> Vec<HeadConfig> {
        self.heads
            .lock()
            .unwrap()
            .iter()
            .map(|(output, state)| HeadConfig {
                output: *output,
                state: *state.lock().unwrap(),
            })
            .collect()
    }
}

/// Per-head edit state of a configuration
pub struct ConfigHeadData {
    pub output_id: OutputId,
    state: Arc<Mutex<ProposedOutputState>>,
}

fn to_wl_transform(transform: OutputTransform) -> wl_output::Transform {
    match transform {
        OutputTransform::Normal => wl_output::Transform::Normal,
        OutputTransform::Rotate90 => wl_output::Transform::_90,
        OutputTransform::Rotate180 => wl_output::Transform::_180,
        OutputTransform::Rotate270 => wl_output::Transform::_270,
        OutputTransform::Flipped => wl_output::Transform::Flipped,
        OutputTransform::Flipped90 => wl_output::Transform::Flipped90,
        OutputTransform::Flipped180 => wl_output::Transform::Flipped180,
        OutputTransform::Flipped270 => wl_output::Transform::Flipped270,
    }
}

fn from_wl_transform(transform: wl_output::Transform) -> OutputTransform {
    match transform {
        wl_output::Transform::Normal => OutputTransform::Normal,
        wl_output::Transform::_90 => OutputTransform::Rotate90,
        wl_output::Transform::_180 => OutputTransform::Rotate180,
        wl_output::Transform::_270 => OutputTransform::Rotate270,
        wl_output::Transform::Flipped => OutputTransform::Flipped,
        wl_output::Transform::Flipped90 => OutputTransform::Flipped90,
        wl_output::Transform::Flipped180 => OutputTransform::Flipped180,
        wl_output::Transform::Flipped270 => OutputTransform::Flipped270,
        _ => OutputTransform::Normal,
    }
}

/// Advertise the given heads on a bound output manager
///
/// Returns the created head resources so they can be finished when the
/// configuration is republished.
pub(super) fn send_heads(
    dh: &DisplayHandle,
    manager: &zwlr_output_manager_v1::ZwlrOutputManagerV1,
    heads: &[HeadState],
) -> Vec<zwlr_output_head_v1::ZwlrOutputHeadV1> {
    let Some(client) = manager.client() else {
        return Vec::new();
    };
    let version = manager.version();
    let mut created = Vec::with_capacity(heads.len());

    for state in heads {
        let head = match client
            .create_resource::<zwlr_output_head_v1::ZwlrOutputHeadV1, OutputData, Server>(
                dh,
                version,
                OutputData {
                    output_id: state.output,
                },
            ) {
            Ok(head) => head,
            Err(err) => {
                warn!("Failed to create head resource: {}", err);
                continue;
            }
        };
        manager.head(&head);
        head.name(state.name.clone());
        head.description(format!("{} {}", state.make, state.model));
        if version >= 2 {
            head.make(state.make.clone());
            head.model(state.model.clone());
        }

        let mut current = None;
        for (index, mode) in state.modes.iter().enumerate() {
            let mode_resource = match client
                .create_resource::<zwlr_output_mode_v1::ZwlrOutputModeV1, ModeData, Server>(
                    dh,
                    version,
                    ModeData {
                        output_id: state.output,
                        index,
                    },
                ) {
                Ok(resource) => resource,
                Err(err) => {
                    warn!("Failed to create mode resource: {}", err);
                    continue;
                }
            };
            head.mode(&mode_resource);
            mode_resource.size(mode.width, mode.height);
            mode_resource.refresh(mode.refresh);
            if mode.preferred {
                mode_resource.preferred();
            }
            if state.current_mode == Some(index) {
                current = Some(mode_resource);
            }
        }

        head.enabled(state.enabled as i32);
        if state.enabled {
            if let Some(mode_resource) = current {
                head.current_mode(&mode_resource);
            }
            head.position(state.position.0, state.position.1);
            head.transform(to_wl_transform(state.transform));
            head.scale(state.scale);
            if version >= 4 {
                head.adaptive_sync(if state.adaptive_sync {
                    zwlr_output_head_v1::AdaptiveSyncState::Enabled
                } else {
                    zwlr_output_head_v1::AdaptiveSyncState::Disabled
                });
            }
        }
        created.push(head);
    }
    created
}

// ============================================================================
// wl_output
// ============================================================================

impl Dispatch<wl_output::WlOutput, OutputData> for Server {
    fn request(
        _state: &mut Self,
        _client: &Client,
        _resource: &wl_output::WlOutput,
        request: wl_output::Request,
        data: &OutputData,
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        if let wl_output::Request::Release = request {
            debug!("Output {:?} released", data.output_id);
        }
    }
}

// ============================================================================
// zwlr_output_manager_v1
// ============================================================================

impl Dispatch<zwlr_output_manager_v1::ZwlrOutputManagerV1, ()> for Server {
    fn request(
        state: &mut Self,
        _client: &Client,
        resource: &zwlr_output_manager_v1::ZwlrOutputManagerV1,
        request: zwlr_output_manager_v1::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            zwlr_output_manager_v1::Request::CreateConfiguration { id, serial } => {
                debug!("Client creates output configuration, serial {}", serial);
                let config = data_init.init(id, ConfigData::new(serial));
                if serial != state.config_serial() {
                    // Built against an outdated configuration
                    config.cancelled();
                }
            }
            zwlr_output_manager_v1::Request::Stop => {
                resource.finished();
                state.unbind_config_manager(resource);
            }
            _ => {}
        }
    }
}

// ============================================================================
// zwlr_output_head_v1 / zwlr_output_mode_v1
// ============================================================================

impl Dispatch<zwlr_output_head_v1::ZwlrOutputHeadV1, OutputData> for Server {
    fn request(
        _state: &mut Self,
        _client: &Client,
        _resource: &zwlr_output_head_v1::ZwlrOutputHeadV1,
        request: zwlr_output_head_v1::Request,
        _data: &OutputData,
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        let _ = request;
    }
}

impl Dispatch<zwlr_output_mode_v1::ZwlrOutputModeV1, ModeData> for Server {
    fn request(
        _state: &mut Self,
        _client: &Client,
        _resource: &zwlr_output_mode_v1::ZwlrOutputModeV1,
        request: zwlr_output_mode_v1::Request,
        _data: &ModeData,
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        let _ = request;
    }
}

// ============================================================================
// zwlr_output_configuration_v1
// ============================================================================

impl Dispatch<zwlr_output_configuration_v1::ZwlrOutputConfigurationV1, ConfigData> for Server {
    fn request(
        state: &mut Self,
        _client: &Client,
        resource: &zwlr_output_configuration_v1::ZwlrOutputConfigurationV1,
        request: zwlr_output_configuration_v1::Request,
        data: &ConfigData,
        _dhandle: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            zwlr_output_configuration_v1::Request::EnableHead { id, head } => {
                let output_id = match head.data::<OutputData>() {
                    Some(data) => data.output_id,
                    None => {
                        warn!("enable_head on a head without output data");
                        OutputId(0)
                    }
                };
                let proposed = Arc::new(Mutex::new(ProposedOutputState {
                    enabled: true,
                    ..Default::default()
                }));
                data.push(output_id, proposed.clone());
                data_init.init(
                    id,
                    ConfigHeadData {
                        output_id,
                        state: proposed,
                    },
                );
            }
            zwlr_output_configuration_v1::Request::DisableHead { head } => {
                let Some(head_data) = head.data::<OutputData>() else {
                    warn!("disable_head on a head without output data");
                    return;
                };
                data.push(
                    head_data.output_id,
                    Arc::new(Mutex::new(ProposedOutputState::default())),
                );
            }
            zwlr_output_configuration_v1::Request::Test => {
                if data.serial != state.config_serial() {
                    resource.cancelled();
                    return;
                }
                match output_config::test(&state.root, &data.head_configs()) {
                    ConfigResult::Succeeded => resource.succeeded(),
                    ConfigResult::Failed => resource.failed(),
                }
            }
            zwlr_output_configuration_v1::Request::Apply => {
                if data.serial != state.config_serial() {
                    resource.cancelled();
                    return;
                }
                let result = output_config::apply(&mut state.root, &data.head_configs());
                match result {
                    ConfigResult::Succeeded => resource.succeeded(),
                    ConfigResult::Failed => resource.failed(),
                }
                // Publication reflects what actually applied, including
                // partial effects of a failed configuration
                state.publish_output_config();
            }
            zwlr_output_configuration_v1::Request::Destroy => {}
            _ => {}
        }
    }
}

// ============================================================================
// zwlr_output_configuration_head_v1
// ============================================================================

impl Dispatch<zwlr_output_configuration_head_v1::ZwlrOutputConfigurationHeadV1, ConfigHeadData>
    for Server
{
    fn request(
        _state: &mut Self,
        _client: &Client,
        _resource: &zwlr_output_configuration_head_v1::ZwlrOutputConfigurationHeadV1,
        request: zwlr_output_configuration_head_v1::Request,
        data: &ConfigHeadData,
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        let mut proposed = data.state.lock().unwrap();
        match request {
            zwlr_output_configuration_head_v1::Request::SetMode { mode } => {
                match mode.data::<ModeData>() {
                    Some(mode_data) if mode_data.output_id == data.output_id => {
                        proposed.mode = Some(mode_data.index);
                    }
                    _ => warn!("set_mode with a mode of another output"),
                }
            }
            zwlr_output_configuration_head_v1::Request::SetCustomMode {
                width,
                height,
                refresh,
            } => {
                proposed.custom_mode = Some((width, height, refresh));
            }
            zwlr_output_configuration_head_v1::Request::SetPosition { x, y } => {
                proposed.position = Some((x, y));
            }
            zwlr_output_configuration_head_v1::Request::SetTransform { transform } => {
                match transform.into_result() {
                    Ok(transform) => proposed.transform = Some(from_wl_transform(transform)),
                    Err(_) => warn!("set_transform with invalid transform"),
                }
            }
            zwlr_output_configuration_head_v1::Request::SetScale { scale } => {
                proposed.scale = Some(scale);
            }
            zwlr_output_configuration_head_v1::Request::SetAdaptiveSync { state } => {
                match state.into_result() {
                    Ok(sync_state) => {
                        proposed.adaptive_sync = Some(matches!(
                            sync_state,
                            zwlr_output_head_v1::AdaptiveSyncState::Enabled
                        ));
                    }
                    Err(_) => warn!("set_adaptive_sync with invalid state"),
                }
            }
            _ => {}
        }
    }
}

// ============================================================================
// zwlr_output_power_manager_v1 / zwlr_output_power_v1
// ============================================================================

impl Dispatch<zwlr_output_power_manager_v1::ZwlrOutputPowerManagerV1, ()> for Server {
    fn request(
        state: &mut Self,
        _client: &Client,
        _resource: &zwlr_output_power_manager_v1::ZwlrOutputPowerManagerV1,
        request: zwlr_output_power_manager_v1::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            zwlr_output_power_manager_v1::Request::GetOutputPower { id, output } => {
                let Some(output_data) = output.data::<OutputData>() else {
                    warn!("get_output_power on an unknown wl_output");
                    return;
                };
                let output_id = output_data.output_id;
                let power = data_init.init(id, OutputData { output_id });
                match output_power::mode(&state.root, output_id) {
                    Some(output_power::PowerMode::On) => {
                        power.mode(zwlr_output_power_v1::Mode::On)
                    }
                    Some(output_power::PowerMode::Off) => {
                        power.mode(zwlr_output_power_v1::Mode::Off)
                    }
                    None => power.failed(),
                }
            }
            zwlr_output_power_manager_v1::Request::Destroy => {}
            _ => {}
        }
    }
}

impl Dispatch<zwlr_output_power_v1::ZwlrOutputPowerV1, OutputData> for Server {
    fn request(
        state: &mut Self,
        _client: &Client,
        resource: &zwlr_output_power_v1::ZwlrOutputPowerV1,
        request: zwlr_output_power_v1::Request,
        data: &OutputData,
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            zwlr_output_power_v1::Request::SetMode { mode } => {
                let mode = match mode.into_result() {
                    Ok(zwlr_output_power_v1::Mode::On) => output_power::PowerMode::On,
                    Ok(zwlr_output_power_v1::Mode::Off) => output_power::PowerMode::Off,
                    _ => {
                        warn!("set_mode with invalid power mode");
                        return;
                    }
                };
                match output_power::set_mode(&mut state.root, data.output_id, mode) {
                    ConfigResult::Succeeded => resource.mode(match mode {
                        output_power::PowerMode::On => zwlr_output_power_v1::Mode::On,
                        output_power::PowerMode::Off => zwlr_output_power_v1::Mode::Off,
                    }),
                    ConfigResult::Failed => resource.failed(),
                }
                state.publish_output_config();
            }
            zwlr_output_power_v1::Request::Destroy => {}
            _ => {}
        }
    }
}

// ============================================================================
// zxdg_output_manager_v1 / zxdg_output_v1
// ============================================================================

impl Dispatch<zxdg_output_manager_v1::ZxdgOutputManagerV1, ()> for Server {
    fn request(
        state: &mut Self,
        _client: &Client,
        _resource: &zxdg_output_manager_v1::ZxdgOutputManagerV1,
        request: zxdg_output_manager_v1::Request,
        _data: &(),
        _dhandle: &DisplayHandle,
        data_init: &mut DataInit<'_, Self>,
    ) {
        match request {
            zxdg_output_manager_v1::Request::GetXdgOutput { id, output } => {
                let Some(output_data) = output.data::<OutputData>() else {
                    warn!("get_xdg_output on an unknown wl_output");
                    return;
                };
                let output_id = output_data.output_id;
                let xdg = data_init.init(id, OutputData { output_id });
                if let Some(event) = xdg_output::describe(&state.root, output_id) {
                    xdg.logical_position(event.logical_x, event.logical_y);
                    xdg.logical_size(event.logical_width, event.logical_height);
                    if xdg.version() >= 2 {
                        xdg.name(event.name);
                        xdg.description(event.description);
                    }
                    // Deprecated since v3, where wl_output.done covers it
                    if xdg.version() < 3 {
                        xdg.done();
                    }
                }
            }
            zxdg_output_manager_v1::Request::Destroy => {}
            _ => {}
        }
    }
}

impl Dispatch<zxdg_output_v1::ZxdgOutputV1, OutputData> for Server {
    fn request(
        _state: &mut Self,
        _client: &Client,
        _resource: &zxdg_output_v1::ZxdgOutputV1,
        request: zxdg_output_v1::Request,
        _data: &OutputData,
        _dhandle: &DisplayHandle,
        _data_init: &mut DataInit<'_, Self>,
    ) {
        let _ = request;
    }
}
