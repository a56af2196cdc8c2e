//! Output/display management
//!
//! This module tracks monitors/displays: their modes and placement, their
//! per-layer scene subtrees, and the three window-management state snapshots
//! (pending, inflight, current) the transaction engine moves views through.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::bail;
use log::debug;

use crate::compositor::layout::LayoutDemand;
use crate::compositor::stack::ViewStack;
use crate::compositor::ViewId;
use crate::protocol::layer_shell::{self, LayerSurface};
use crate::scene::{NodeId, Rect, SceneGraph};

/// Unique identifier for outputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutputId(pub u64);

impl OutputId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        OutputId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Output transform (rotation/flip)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputTransform {
    #[default]
    Normal,
    Rotate90,
    Rotate180,
    Rotate270,
    Flipped,
    Flipped90,
    Flipped180,
    Flipped270,
}

impl OutputTransform {
    /// Convert to Wayland wl_output::transform value
    pub fn to_wayland(&self) -> u32 {
        match self {
            OutputTransform::Normal => 0,
            OutputTransform::Rotate90 => 1,
            OutputTransform::Rotate180 => 2,
            OutputTransform::Rotate270 => 3,
            OutputTransform::Flipped => 4,
            OutputTransform::Flipped90 => 5,
            OutputTransform::Flipped180 => 6,
            OutputTransform::Flipped270 => 7,
        }
    }

    /// Create from Wayland wl_output::transform value
    pub fn from_wayland(value: u32) -> Option<Self> {
        match value {
            0 => Some(OutputTransform::Normal),
            1 => Some(OutputTransform::Rotate90),
            2 => Some(OutputTransform::Rotate180),
            3 => Some(OutputTransform::Rotate270),
            4 => Some(OutputTransform::Flipped),
            5 => Some(OutputTransform::Flipped90),
            6 => Some(OutputTransform::Flipped180),
            7 => Some(OutputTransform::Flipped270),
            _ => None,
        }
    }
}

/// An output mode (resolution + refresh rate)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputMode {
    /// Width in pixels
    pub width: i32,
    /// Height in pixels
    pub height: i32,
    /// Refresh rate in mHz (e.g., 60000 for 60Hz)
    pub refresh: i32,
    /// Is this the preferred mode?
    pub preferred: bool,
}

/// One phase of an output's window-management state
#[derive(Debug, Default)]
pub struct OutputState {
    /// Bitmask of visible tags
    pub tags: u32,
    /// The view taking the whole output, if any
    pub fullscreen: Option<ViewId>,
    /// Views by recency of keyboard focus
    pub focus_stack: ViewStack,
    /// Views in window-management (spatial) order
    pub wm_stack: ViewStack,
}

impl OutputState {
    fn new(tags: u32) -> Self {
        Self {
            tags,
            ..Self::default()
        }
    }
}

/// The per-layer scene subtrees of an output, bottom to top
#[derive(Debug, Clone, Copy)]
pub struct Layers {
    pub background: NodeId,
    pub bottom: NodeId,
    pub layout: NodeId,
    pub float: NodeId,
    pub top: NodeId,
    pub fullscreen: NodeId,
    pub overlay: NodeId,
    pub popups: NodeId,
}

/// A change proposed for an output by the configuration protocol
#[derive(Debug, Clone, Copy, Default)]
pub struct ProposedOutputState {
    pub enabled: bool,
    /// Index into the output's mode list
    pub mode: Option<usize>,
    /// A mode not in the list, as (width, height, refresh)
    pub custom_mode: Option<(i32, i32, i32)>,
    pub position: Option<(i32, i32)>,
    pub transform: Option<OutputTransform>,
    pub scale: Option<f64>,
    pub adaptive_sync: Option<bool>,
}

/// Per-protocol status published after each transaction commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputStatusEvent {
    pub tags: u32,
    pub fullscreen: bool,
}

/// A display output (monitor)
#[derive(Debug)]
pub struct Output {
    /// Unique identifier
    pub id: OutputId,
    /// Output name (e.g., "HEADLESS-1")
    pub name: String,
    /// Manufacturer name
    pub make: String,
    /// Model name
    pub model: String,
    /// Whether the output is enabled
    pub enabled: bool,
    /// Available modes
    pub modes: Vec<OutputMode>,
    /// Current mode index
    pub current_mode: Option<usize>,
    /// Position in layout coordinates
    pub position: (i32, i32),
    /// Scale factor
    pub scale: f64,
    /// Transform applied to the output
    pub transform: OutputTransform,
    /// Adaptive sync enabled
    pub adaptive_sync: bool,

    /// This output's scene subtree, positioned in layout coordinates
    pub tree: NodeId,
    /// Per-layer subtrees under `tree`
    pub layers: Layers,
    background_rect: NodeId,

    pub pending: OutputState,
    pub inflight: OutputState,
    pub current: OutputState,

    /// Outstanding request to the layout generator (inflight only)
    pub layout_demand: Option<LayoutDemand>,
    /// Namespace of the attached layout generator, if any
    pub layout_generator: Option<String>,

    /// Layer-shell surfaces bound to this output
    pub layer_surfaces: Vec<LayerSurface>,
    /// Area left for views after exclusive zones
    pub usable_area: Rect,
}

impl Output {
    /// Create an output with its scene subtree under `parent`
    ///
    /// The tree starts disabled; it is enabled when the output becomes
    /// active.
    pub fn new(scene: &mut SceneGraph, parent: NodeId, name: String, mode: OutputMode) -> Self {
        let tree = scene.create_tree(parent);
        scene.set_enabled(tree, false);
        let layers = Layers {
            background: scene.create_tree(tree),
            bottom: scene.create_tree(tree),
            layout: scene.create_tree(tree),
            float: scene.create_tree(tree),
            top: scene.create_tree(tree),
            fullscreen: scene.create_tree(tree),
            overlay: scene.create_tree(tree),
            popups: scene.create_tree(tree),
        };
        // Fullscreen layer stays disabled until a view is fullscreen
        scene.set_enabled(layers.fullscreen, false);
        let background_rect = scene.create_rect(layers.background, mode.width, mode.height);

        let usable_area = Rect::new(0, 0, mode.width, mode.height);
        Self {
            id: OutputId::new(),
            name,
            make: String::new(),
            model: String::new(),
            enabled: false,
            modes: vec![mode],
            current_mode: Some(0),
            position: (0, 0),
            scale: 1.0,
            transform: OutputTransform::Normal,
            adaptive_sync: false,
            tree,
            layers,
            background_rect,
            pending: OutputState::new(1),
            inflight: OutputState::new(1),
            current: OutputState::new(1),
            layout_demand: None,
            layout_generator: None,
            layer_surfaces: Vec::new(),
            usable_area,
        }
    }

    /// Get the current mode
    pub fn mode(&self) -> Option<OutputMode> {
        self.current_mode.and_then(|i| self.modes.get(i)).copied()
    }

    /// Effective resolution, (0, 0) if no mode is set
    pub fn dims(&self) -> (i32, i32) {
        self.mode().map(|m| (m.width, m.height)).unwrap_or((0, 0))
    }

    /// Logical size as exposed via xdg-output
    pub fn logical_size(&self) -> (i32, i32) {
        let (w, h) = self.dims();
        ((w as f64 / self.scale) as i32, (h as f64 / self.scale) as i32)
    }

    /// Whether the output would accept the proposed state
    pub fn test_state(&self, proposed: &ProposedOutputState) -> bool {
        if let Some(index) = proposed.mode {
            if index >= self.modes.len() {
                return false;
            }
        }
        if let Some((width, height, refresh)) = proposed.custom_mode {
            if width <= 0 || height <= 0 || refresh < 0 {
                return false;
            }
        }
        if let Some(scale) = proposed.scale {
            if scale <= 0.0 {
                return false;
            }
        }
        true
    }

    /// Commit the proposed state
    ///
    /// Position is layout business and is applied by the caller.
    pub fn commit_state(&mut self, proposed: &ProposedOutputState) -> anyhow::Result<()> {
        if !self.test_state(proposed) {
            bail!("output {} rejected proposed state", self.name);
        }
        self.enabled = proposed.enabled;
        if let Some(index) = proposed.mode {
            self.current_mode = Some(index);
        }
        if let Some((width, height, refresh)) = proposed.custom_mode {
            self.modes.push(OutputMode {
                width,
                height,
                refresh,
                preferred: false,
            });
            self.current_mode = Some(self.modes.len() - 1);
        }
        if let Some(transform) = proposed.transform {
            self.transform = transform;
        }
        if let Some(scale) = proposed.scale {
            self.scale = scale;
        }
        if let Some(adaptive_sync) = proposed.adaptive_sync {
            self.adaptive_sync = adaptive_sync;
        }
        debug!("Output {} committed new state", self.name);
        Ok(())
    }

    /// Resize the background fill to the current mode
    pub fn update_background_rect(&mut self, scene: &mut SceneGraph) {
        let (width, height) = self.dims();
        scene.destroy(self.background_rect);
        self.background_rect = scene.create_rect(self.layers.background, width, height);
        scene.lower_to_bottom(self.background_rect);
    }

    /// Re-run layer-surface arrangement and recompute the usable area
    pub fn arrange_layers(&mut self, scene: &mut SceneGraph) {
        let dims = self.dims();
        self.usable_area = layer_shell::arrange(&mut self.layer_surfaces, dims, scene);
    }

    /// Destroy every layer-surface scene node on this output
    pub fn destroy_layer_surfaces(&mut self, scene: &mut SceneGraph) {
        for surface in self.layer_surfaces.drain(..) {
            scene.destroy(surface.node);
        }
    }

    /// Build the status event for the committed state
    pub fn status(&self) -> OutputStatusEvent {
        OutputStatusEvent {
            tags: self.current.tags,
            fullscreen: self.current.fullscreen.is_some(),
        }
    }
}

/// Registry of all outputs
///
/// `all` is every output the backend has advertised that still exists, used
/// only to publish configurations; `active` is the outputs currently in the
/// layout and receiving views.
#[derive(Debug, Default)]
pub struct OutputManager {
    outputs: HashMap<OutputId, Output>,
    all: Vec<OutputId>,
    active: Vec<OutputId>,
}

impl OutputManager {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly advertised output
    pub fn insert(&mut self, output: Output) -> OutputId {
        let id = output.id;
        self.outputs.insert(id, output);
        self.all.push(id);
        id
    }

    /// Get an output by ID
    pub fn get(&self, id: OutputId) -> Option<&Output> {
        self.outputs.get(&id)
    }

    /// Get a mutable output by ID
    pub fn get_mut(&mut self, id: OutputId) -> Option<&mut Output> {
        self.outputs.get_mut(&id)
    }

    /// Every advertised output, in advertisement order
    pub fn all(&self) -> &[OutputId] {
        &self.all
    }

    /// Active outputs, in activation order
    pub fn active(&self) -> &[OutputId] {
        &self.active
    }

    /// Whether the output is active
    pub fn is_active(&self, id: OutputId) -> bool {
        self.active.contains(&id)
    }

    /// Append the output to the active list
    pub fn activate(&mut self, id: OutputId) {
        debug_assert!(!self.is_active(id));
        self.active.push(id);
    }

    /// Unlink the output from the active list
    pub fn deactivate(&mut self, id: OutputId) {
        self.active.retain(|o| *o != id);
    }

    /// The first active output, the fallback for evacuations
    pub fn first_active(&self) -> Option<OutputId> {
        self.active.first().copied()
    }

    /// Forget the output entirely
    pub fn remove(&mut self, id: OutputId) -> Option<Output> {
        self.all.retain(|o| *o != id);
        self.active.retain(|o| *o != id);
        self.outputs.remove(&id)
    }

    /// Number of advertised outputs
    pub fn len(&self) -> usize {
        self.all.len()
    }

    /// Whether no outputs are advertised
    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }
}
