//! Wayland server integration
//!
//! This module sets up the Wayland display, registers globals, and glues
//! protocol dispatch to the compositor core. The run loop bounds every
//! dispatch by the transaction deadline so a stalled client cannot hold a
//! commit past the timeout.

mod dispatch;
mod globals;

use std::collections::HashMap;
use std::io;
use std::os::unix::io::AsFd;
use std::time::Instant;

use calloop::generic::Generic;
use calloop::{Interest, Mode, PostAction};
use log::{debug, error, info, warn};
use wayland_protocols::xdg::xdg_output::zv1::server::zxdg_output_manager_v1::ZxdgOutputManagerV1;
use wayland_protocols_wlr::output_management::v1::server::zwlr_output_head_v1::ZwlrOutputHeadV1;
use wayland_protocols_wlr::output_management::v1::server::zwlr_output_manager_v1::ZwlrOutputManagerV1;
use wayland_protocols_wlr::output_power_management::v1::server::zwlr_output_power_manager_v1::ZwlrOutputPowerManagerV1;
use wayland_server::backend::{ClientData, ClientId, DisconnectReason, GlobalId};
use wayland_server::protocol::wl_output::WlOutput;
use wayland_server::{Display, DisplayHandle, ListeningSocket, Resource};

use crate::backend::headless::OutputDescriptor;
use crate::backend::EventLoop;
use crate::compositor::{OutputId, Root};
use crate::protocol::output_config;

pub use dispatch::{ConfigData, ConfigHeadData, ModeData, OutputData};

/// Per-client data; nothing is tracked per client yet
pub struct ClientState;

impl ClientData for ClientState {
    fn initialized(&self, _client_id: ClientId) {
        debug!("New Wayland client connected");
    }

    fn disconnected(&self, _client_id: ClientId, _reason: DisconnectReason) {
        debug!("Wayland client disconnected");
    }
}

/// A client's binding of the output-manager global, with the head resources
/// last sent to it
struct ManagerBinding {
    manager: ZwlrOutputManagerV1,
    heads: Vec<ZwlrOutputHeadV1>,
}

/// State passed to Wayland dispatch handlers
pub struct Server {
    /// The compositor core
    pub root: Root,
    dh: DisplayHandle,
    /// One wl_output global per advertised output
    output_globals: HashMap<OutputId, GlobalId>,
    /// Output-manager bindings to republish configurations to
    config_managers: Vec<ManagerBinding>,
    /// Serial of the last published configuration
    config_serial: u32,
}

impl Server {
    /// Create the server state around a display handle
    pub fn new(dh: DisplayHandle) -> Self {
        Self {
            root: Root::new(),
            dh,
            output_globals: HashMap::new(),
            config_managers: Vec::new(),
            config_serial: 0,
        }
    }

    /// The display handle
    pub fn display_handle(&self) -> DisplayHandle {
        self.dh.clone()
    }

    /// The serial configurations must be created against
    pub fn config_serial(&self) -> u32 {
        self.config_serial
    }

    /// Register the protocol-manager globals
    pub fn register_globals(&mut self) {
        let dh = self.dh.clone();
        dh.create_global::<Server, ZwlrOutputManagerV1, _>(4, ());
        dh.create_global::<Server, ZwlrOutputPowerManagerV1, _>(1, ());
        dh.create_global::<Server, ZxdgOutputManagerV1, _>(3, ());
        info!(
            "Registered globals: zwlr_output_manager, zwlr_output_power_manager, zxdg_output_manager"
        );
    }

    /// A backend advertised an output
    ///
    /// A descriptor that cannot initialize is logged and dropped without
    /// registering anything.
    pub fn handle_new_output(&mut self, desc: OutputDescriptor) {
        let id = match self.root.create_output(&desc.name, desc.mode) {
            Ok(id) => id,
            Err(err) => {
                error!("Failed to initialize output {}: {}", desc.name, err);
                return;
            }
        };
        if let Some(output) = self.root.outputs.get_mut(id) {
            output.make = desc.make;
            output.model = desc.model;
        }
        let global = self
            .dh
            .create_global::<Server, WlOutput, _>(4, OutputData { output_id: id });
        self.output_globals.insert(id, global);
        self.root.add_output(id);
        info!("Output {} advertised", desc.name);
    }

    /// A backend destroyed an output
    pub fn handle_output_destroyed(&mut self, id: OutputId) {
        if let Some(global) = self.output_globals.remove(&id) {
            self.dh.remove_global::<Server>(global);
        }
        self.root.output_destroyed(id);
    }

    /// Record a fresh output-manager binding
    fn bind_config_manager(&mut self, manager: ZwlrOutputManagerV1, heads: Vec<ZwlrOutputHeadV1>) {
        self.config_managers.push(ManagerBinding { manager, heads });
    }

    /// Drop the binding of a stopped manager
    fn unbind_config_manager(&mut self, manager: &ZwlrOutputManagerV1) {
        self.config_managers
            .retain(|b| b.manager.id() != manager.id());
    }

    /// Push the current output configuration to every bound manager
    pub fn publish_output_config(&mut self) {
        let heads = match output_config::snapshot(&self.root) {
            Ok(heads) => heads,
            Err(err) => {
                error!("Skipping configuration publication: {}", err);
                return;
            }
        };
        self.config_serial = self.config_serial.wrapping_add(1);
        let serial = self.config_serial;
        let dh = self.dh.clone();

        let mut bindings = std::mem::take(&mut self.config_managers);
        for binding in &mut bindings {
            for head in binding.heads.drain(..) {
                head.finished();
            }
            binding.heads = dispatch::send_heads(&dh, &binding.manager, &heads);
            binding.manager.done(serial);
        }
        self.config_managers = bindings;
        debug!("Published output configuration, serial {}", serial);
    }

    /// Flush outbound protocol events
    pub fn flush(&mut self) {
        if let Err(err) = self.dh.flush_clients() {
            warn!("Failed to flush clients: {}", err);
        }
    }
}

/// Run the compositor server until stopped
pub fn run(virtual_output_count: usize) -> anyhow::Result<()> {
    let mut event_loop: EventLoop<Server> = EventLoop::new()?;
    let mut display: Display<Server> = Display::new()?;
    let dh = display.handle();

    let socket = ListeningSocket::bind_auto("wayland", 0..33)?;
    let socket_name = socket
        .socket_name()
        .and_then(|n| n.to_str().map(String::from))
        .unwrap_or_else(|| "wayland-0".to_string());
    info!("Wayland socket: {}", socket_name);

    let mut server = Server::new(dh.clone());
    server.register_globals();
    for desc in crate::backend::headless::virtual_outputs(virtual_output_count) {
        server.handle_new_output(desc);
    }

    let handle = event_loop.handle();

    // New client connections
    handle
        .insert_source(
            Generic::new(
                socket.as_fd().try_clone_to_owned()?,
                Interest::READ,
                Mode::Level,
            ),
            {
                let mut dh = dh.clone();
                move |_, _, _server: &mut Server| {
                    if let Some(stream) = socket.accept()? {
                        if let Err(err) = dh.insert_client(stream, std::sync::Arc::new(ClientState))
                        {
                            error!("Failed to insert client: {}", err);
                        }
                    }
                    Ok(PostAction::Continue)
                }
            },
        )
        .map_err(|e| anyhow::anyhow!("failed to insert socket source: {}", e))?;

    // Client requests
    handle
        .insert_source(
            Generic::new(
                display.backend().poll_fd().try_clone_to_owned()?,
                Interest::READ,
                Mode::Level,
            ),
            move |_, _, server: &mut Server| {
                display
                    .dispatch_clients(server)
                    .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
                display
                    .flush_clients()
                    .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
                Ok(PostAction::Continue)
            },
        )
        .map_err(|e| anyhow::anyhow!("failed to insert display source: {}", e))?;

    info!("Compositor running");
    loop {
        // Bound the turn by the transaction deadline so a slow client
        // cannot stall the commit
        let timeout = server
            .root
            .timer
            .deadline()
            .map(|deadline| deadline.saturating_duration_since(Instant::now()));
        event_loop.dispatch(timeout, &mut server)?;

        if server.root.timer.expired(Instant::now()) {
            server.root.handle_transaction_timeout();
        }
        if server.root.take_config_dirty() {
            server.publish_output_config();
        }
        server.flush();
    }
}
