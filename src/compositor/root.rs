//! Root coordinator
//!
//! The root owns the global scene graph, the output registry, and the
//! transaction engine that moves window-management state from pending (what
//! was asked for) through inflight (what the compositor committed to) to
//! current (what is on screen).
//!
//! External mutators write only to pending state. `apply_pending` snapshots
//! pending into inflight, raises layout demands, sends configures, and once
//! every counted client has acked (or the deadline passed) promotes inflight
//! to current and updates the scene graph in a single event-loop turn, so
//! observers see either the whole old scene or the whole new one.

use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::compositor::layout::{LayoutDemand, OutputLayout};
use crate::compositor::output::{Output, OutputManager, OutputMode};
use crate::compositor::stack::ViewStack;
use crate::compositor::view::{View, ViewManager, ViewShell};
use crate::compositor::{OutputId, SurfaceId, ViewId};
use crate::input::SeatManager;
use crate::scene::{HitResult, LockSurfaceId, NodeData, NodeId, Rect, SceneGraph};

/// How long a transaction waits for configure acks before committing anyway
pub const TRANSACTION_TIMEOUT: Duration = Duration::from_millis(200);

/// The configure-ack deadline of the running transaction
///
/// The deadline is plain data; the server loop derives its dispatch timeout
/// from it and invokes [`Root::handle_transaction_timeout`] once it passes.
#[derive(Debug, Default)]
pub struct TransactionTimer {
    deadline: Option<Instant>,
}

impl TransactionTimer {
    fn arm(&mut self) {
        self.deadline = Some(Instant::now() + TRANSACTION_TIMEOUT);
    }

    fn disarm(&mut self) {
        self.deadline = None;
    }

    /// The pending deadline, if armed
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Whether the deadline has passed
    pub fn expired(&self, now: Instant) -> bool {
        self.deadline.map(|d| now >= d).unwrap_or(false)
    }
}

/// A focus stack and a window-management stack for one phase
#[derive(Debug, Default)]
pub struct StackPair {
    pub focus_stack: ViewStack,
    pub wm_stack: ViewStack,
}

/// The holding area for views attached to no output, in all three phases
#[derive(Debug, Default)]
pub struct HiddenStacks {
    pub pending: StackPair,
    pub inflight: StackPair,
    pub current: StackPair,
}

/// What a hit test resolved to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtTarget {
    View(ViewId),
    LayerSurface(crate::protocol::layer_shell::LayerSurfaceId),
    LockSurface(LockSurfaceId),
    #[cfg(feature = "xwayland")]
    XwaylandOverrideRedirect(crate::scene::XwaylandSurfaceId),
}

/// Result of routing a layout coordinate to interactive content
#[derive(Debug, Clone, Copy)]
pub struct AtResult {
    pub surface: SurfaceId,
    /// Surface-local coordinates of the hit
    pub sx: f64,
    pub sy: f64,
    pub target: AtTarget,
}

/// The process-wide compositor root
#[derive(Debug)]
pub struct Root {
    pub scene: SceneGraph,
    /// Everything that can receive input, bottom tier
    pub interactive_content: NodeId,
    /// Parent of per-output subtrees
    pub output_tree: NodeId,
    /// Legacy layout-positioned X11 surfaces
    #[cfg(feature = "xwayland")]
    pub override_redirect_tree: NodeId,
    /// Drag-and-drop icons, never hit-tested, always on top
    pub drag_icons: NodeId,
    /// Disabled holding area for views attached to no output
    pub hidden_tree: NodeId,

    pub views: ViewManager,
    pub outputs: OutputManager,
    pub output_layout: OutputLayout,
    pub seats: SeatManager,

    pub hidden: HiddenStacks,
    /// Tags saved from the last output to go away, restored on replug
    pub hidden_tags: u32,

    inflight_layout_demands: u32,
    inflight_configures: u32,
    pending_state_dirty: bool,
    pub timer: TransactionTimer,

    serial: u32,
    config_dirty: bool,
    idle_inhibit_generation: u64,
}

impl Root {
    /// Create the root with its three scene tiers
    pub fn new() -> Self {
        let mut scene = SceneGraph::new();
        // Tiers bottom to top: interactive content, drag icons, hidden
        let interactive_content = scene.create_tree(scene.root());
        let output_tree = scene.create_tree(interactive_content);
        #[cfg(feature = "xwayland")]
        let override_redirect_tree = scene.create_tree(interactive_content);
        let drag_icons = scene.create_tree(scene.root());
        let hidden_tree = scene.create_tree(scene.root());
        scene.set_enabled(hidden_tree, false);

        Self {
            scene,
            interactive_content,
            output_tree,
            #[cfg(feature = "xwayland")]
            override_redirect_tree,
            drag_icons,
            hidden_tree,
            views: ViewManager::new(),
            outputs: OutputManager::new(),
            output_layout: OutputLayout::new(),
            seats: SeatManager::new(),
            hidden: HiddenStacks::default(),
            hidden_tags: 1,
            inflight_layout_demands: 0,
            inflight_configures: 0,
            pending_state_dirty: false,
            timer: TransactionTimer::default(),
            serial: 1,
            config_dirty: false,
            idle_inhibit_generation: 0,
        }
    }

    /// Tear down the scene tiers, reversing creation order
    pub fn deinit(&mut self) {
        debug_assert!(self.views.is_empty());
        self.scene.destroy(self.hidden_tree);
        self.scene.destroy(self.drag_icons);
        self.scene.destroy(self.interactive_content);
    }

    fn next_serial(&mut self) -> u32 {
        let serial = self.serial;
        self.serial = self.serial.wrapping_add(1);
        serial
    }

    /// Whether a transaction is between collection and commit
    pub fn transaction_inflight(&self) -> bool {
        self.inflight_configures > 0 || self.inflight_layout_demands > 0
    }

    /// Outstanding configure count of the running transaction
    pub fn inflight_configures(&self) -> u32 {
        self.inflight_configures
    }

    /// Outstanding layout-demand count of the running transaction
    pub fn inflight_layout_demands(&self) -> u32 {
        self.inflight_layout_demands
    }

    /// Whether pending mutations arrived while a transaction was running
    pub fn pending_state_dirty(&self) -> bool {
        self.pending_state_dirty
    }

    /// Generation counter the idle-inhibit manager watches
    pub fn idle_inhibit_generation(&self) -> u64 {
        self.idle_inhibit_generation
    }

    // ========================================================================
    // Hit testing
    // ========================================================================

    /// Map a layout coordinate to the topmost interactive node
    ///
    /// Returns `None` outside any interactive subtree or when the node
    /// carries no owner metadata.
    pub fn at(&self, lx: f64, ly: f64) -> Option<AtResult> {
        let HitResult { node, sx, sy } = self.scene.node_at(self.interactive_content, lx, ly)?;
        let target = match self.scene.data_for(node)? {
            NodeData::View(id) => AtTarget::View(id),
            NodeData::LayerSurface(id) => AtTarget::LayerSurface(id),
            NodeData::LockSurface(id) => AtTarget::LockSurface(id),
            #[cfg(feature = "xwayland")]
            NodeData::XwaylandOverrideRedirect(id) => AtTarget::XwaylandOverrideRedirect(id),
        };
        let surface = self.scene.surface(node)?;
        Some(AtResult {
            surface,
            sx,
            sy,
            target,
        })
    }

    // ========================================================================
    // View lifecycle
    // ========================================================================

    /// Create a view parked in the hidden area
    ///
    /// The view joins the hidden stacks in every phase; `map_view` later
    /// promotes it to an output if one exists.
    pub fn create_view(&mut self, shell: ViewShell) -> ViewId {
        let view = View::new(&mut self.scene, self.hidden_tree, shell);
        let id = self.views.insert(view);
        self.hidden.pending.focus_stack.push_front(id);
        self.hidden.pending.wm_stack.push_front(id);
        self.hidden.inflight.focus_stack.push_front(id);
        self.hidden.inflight.wm_stack.push_front(id);
        self.hidden.current.focus_stack.push_front(id);
        self.hidden.current.wm_stack.push_front(id);
        id
    }

    /// Mark a view mapped and hand it to an output, if any is active
    pub fn map_view(&mut self, id: ViewId) {
        let Some(view) = self.views.get_mut(id) else {
            return;
        };
        if view.mapped {
            return;
        }
        view.mapped = true;
        if let Some(output) = self.outputs.first_active() {
            self.set_pending_output(id, Some(output));
        }
        self.apply_pending();
    }

    /// Begin destroying a view
    ///
    /// The view is retargeted to the hidden area; the commit that observes
    /// it there reclaims it.
    pub fn begin_destroy_view(&mut self, id: ViewId) {
        let Some(view) = self.views.get_mut(id) else {
            return;
        };
        view.destroying = true;
        view.mapped = false;
        self.set_pending_output(id, None);
        self.apply_pending();
    }

    /// Move a view's pending membership to an output (or to hidden)
    ///
    /// Relinks the pending focus and wm stacks; all other phases are the
    /// transaction engine's business.
    pub fn set_pending_output(&mut self, id: ViewId, target: Option<OutputId>) {
        let Some(view) = self.views.get(id) else {
            return;
        };
        let old = view.pending.output;
        if old == target {
            return;
        }
        match old {
            None => {
                self.hidden.pending.focus_stack.remove(id);
                self.hidden.pending.wm_stack.remove(id);
            }
            Some(o) => {
                if let Some(out) = self.outputs.get_mut(o) {
                    out.pending.focus_stack.remove(id);
                    out.pending.wm_stack.remove(id);
                }
            }
        }
        match target {
            None => {
                self.hidden.pending.focus_stack.push_back(id);
                self.hidden.pending.wm_stack.push_back(id);
            }
            Some(o) => {
                if let Some(out) = self.outputs.get_mut(o) {
                    out.pending.focus_stack.push_back(id);
                    out.pending.wm_stack.push_back(id);
                }
            }
        }
        if let Some(view) = self.views.get_mut(id) {
            view.pending.output = target;
        }
    }

    /// Move a view to the top of its pending focus stack
    ///
    /// Focus recency decides fullscreen elections and what `apply_pending`
    /// hands the seats.
    pub fn raise_focus(&mut self, id: ViewId) {
        let Some(view) = self.views.get(id) else {
            return;
        };
        let stack = match view.pending.output {
            None => &mut self.hidden.pending.focus_stack,
            Some(o) => match self.outputs.get_mut(o) {
                Some(output) => &mut output.pending.focus_stack,
                None => return,
            },
        };
        if stack.remove(id) {
            stack.push_front(id);
        }
    }

    /// Pending-state mutators; none of them re-evaluates focus, that happens
    /// once per transaction in `apply_pending`
    pub fn set_pending_tags(&mut self, id: ViewId, tags: u32) {
        if let Some(view) = self.views.get_mut(id) {
            view.pending.tags = tags;
        }
    }

    pub fn set_pending_float(&mut self, id: ViewId, float: bool) {
        if let Some(view) = self.views.get_mut(id) {
            view.pending.float = float;
        }
    }

    pub fn set_pending_fullscreen(&mut self, id: ViewId, fullscreen: bool) {
        if let Some(view) = self.views.get_mut(id) {
            view.pending.fullscreen = fullscreen;
        }
    }

    pub fn set_pending_geometry(&mut self, id: ViewId, geometry: Rect) {
        if let Some(view) = self.views.get_mut(id) {
            view.pending.geometry = geometry;
        }
    }

    /// Set the tags an output shows
    pub fn set_output_pending_tags(&mut self, id: OutputId, tags: u32) {
        if let Some(output) = self.outputs.get_mut(id) {
            output.pending.tags = tags;
        }
    }

    /// Attach a layout generator to an output
    pub fn attach_layout_generator(&mut self, id: OutputId, namespace: &str) {
        if let Some(output) = self.outputs.get_mut(id) {
            output.layout_generator = Some(namespace.to_string());
        }
    }

    // ========================================================================
    // Output lifecycle
    // ========================================================================

    /// Register a backend-advertised output
    ///
    /// Fails when the descriptor cannot back a usable output; the caller
    /// logs and drops it without registering anything.
    pub fn create_output(&mut self, name: &str, mode: OutputMode) -> anyhow::Result<OutputId> {
        if mode.width <= 0 || mode.height <= 0 {
            anyhow::bail!("output {} has unusable mode {}x{}", name, mode.width, mode.height);
        }
        let output = Output::new(&mut self.scene, self.output_tree, name.to_string(), mode);
        Ok(self.outputs.insert(output))
    }

    /// Make an output active: place it in the layout and hand it views
    pub fn add_output(&mut self, id: OutputId) {
        if self.outputs.is_active(id) {
            return;
        }
        let Some(output) = self.outputs.get(id) else {
            return;
        };
        let (width, height) = output.dims();
        self.outputs.activate(id);
        let (x, y) = self.output_layout.add_auto(id, width, height);
        if let Some(output) = self.outputs.get_mut(id) {
            output.position = (x, y);
            output.enabled = true;
            let tree = output.tree;
            self.scene.set_enabled(tree, true);
            self.scene.set_position(tree, x, y);
        }

        if self.outputs.active().len() == 1 {
            // First output: it adopts the hidden area's tags and views
            if let Some(output) = self.outputs.get_mut(id) {
                output.pending.tags = self.hidden_tags;
            }
            for view_id in self.hidden.pending.focus_stack.iter() {
                // Views mid-destruction stay hidden for the commit to reclaim
                let destroying = self
                    .views
                    .get(view_id)
                    .map(|v| v.destroying)
                    .unwrap_or(true);
                if !destroying {
                    self.set_pending_output(view_id, Some(id));
                }
            }
            debug_assert!(self
                .hidden
                .pending
                .focus_stack
                .iter()
                .into_iter()
                .all(|v| self.views.get(v).map(|view| view.destroying).unwrap_or(false)));
            for seat in self.seats.iter_mut() {
                seat.focus_output(Some(id));
            }
        }

        self.handle_layout_change();
        self.apply_pending();
    }

    /// Deactivate an output, evacuating its views
    pub fn remove_output(&mut self, id: OutputId) {
        if !self.outputs.is_active(id) {
            return;
        }
        self.outputs.deactivate(id);

        // Cancel the outstanding layout demand and drop the generator. The
        // counter is decremented without completing the transaction; the
        // apply at the end of removal starts over from evacuated state.
        if let Some(output) = self.outputs.get_mut(id) {
            output.layout_generator = None;
            if output.layout_demand.take().is_some() {
                debug_assert!(self.inflight_layout_demands > 0);
                self.inflight_layout_demands = self.inflight_layout_demands.saturating_sub(1);
            }
        }

        // Evacuate inflight (and with it current) state to the hidden area
        let inflight_views = self
            .outputs
            .get(id)
            .map(|o| o.inflight.focus_stack.iter())
            .unwrap_or_default();
        for view_id in inflight_views {
            let Some(view) = self.views.get_mut(view_id) else {
                continue;
            };
            view.inflight.output = None;
            view.current.output = None;
            let (tree, popup) = (view.tree, view.popup_tree);
            self.scene.reparent(tree, self.hidden_tree);
            self.scene.reparent(popup, self.hidden_tree);
        }
        if let Some(output) = self.outputs.get_mut(id) {
            self.hidden
                .inflight
                .focus_stack
                .prepend_all(&mut output.inflight.focus_stack);
            self.hidden
                .inflight
                .wm_stack
                .prepend_all(&mut output.inflight.wm_stack);
            self.hidden
                .current
                .focus_stack
                .prepend_all(&mut output.current.focus_stack);
            self.hidden
                .current
                .wm_stack
                .prepend_all(&mut output.current.wm_stack);
            output.inflight.fullscreen = None;
            output.current.fullscreen = None;
        }

        // Evacuate pending state to the first remaining output, or hidden
        let fallback = self.outputs.first_active();
        let pending_views = self
            .outputs
            .get(id)
            .map(|o| o.pending.focus_stack.iter())
            .unwrap_or_default();
        match fallback {
            Some(_) => {
                for view_id in pending_views {
                    self.set_pending_output(view_id, fallback);
                }
            }
            None => {
                if let Some(output) = self.outputs.get_mut(id) {
                    self.hidden_tags = output.pending.tags;
                }
                for view_id in &pending_views {
                    if let Some(view) = self.views.get_mut(*view_id) {
                        view.pending.output = None;
                    }
                }
                if let Some(output) = self.outputs.get_mut(id) {
                    self.hidden
                        .pending
                        .focus_stack
                        .prepend_all(&mut output.pending.focus_stack);
                    self.hidden
                        .pending
                        .wm_stack
                        .prepend_all(&mut output.pending.wm_stack);
                }
            }
        }

        // Layer surfaces die with the output's layers
        if let Some(output) = self.outputs.get_mut(id) {
            output.destroy_layer_surfaces(&mut self.scene);
        }

        for seat in self.seats.iter_mut() {
            if seat.focused_output() == Some(id) {
                seat.focus_output(fallback);
            }
        }

        self.apply_pending();
    }

    /// Forget a backend-destroyed output entirely
    pub fn output_destroyed(&mut self, id: OutputId) {
        self.remove_output(id);
        if let Some(output) = self.outputs.get(id) {
            let tree = output.tree;
            self.scene.destroy(tree);
        }
        self.output_layout.remove(id);
        self.outputs.remove(id);
        self.handle_layout_change();
    }

    // ========================================================================
    // Output configuration publication
    // ========================================================================

    /// React to a layout change by republishing the output configuration
    pub fn handle_layout_change(&mut self) {
        if self.output_layout.changes_suppressed() {
            return;
        }
        if self.output_layout.take_changed() {
            self.config_dirty = true;
        }
    }

    /// Consume the request to republish the output configuration
    pub fn take_config_dirty(&mut self) -> bool {
        std::mem::take(&mut self.config_dirty)
    }

    // ========================================================================
    // Transaction engine
    // ========================================================================

    /// Run the transaction pipeline over the pending state
    ///
    /// If a transaction is already in flight the request is latched and
    /// re-run when that transaction commits.
    pub fn apply_pending(&mut self) {
        // Seats recompute focus against pending state here, and only here
        self.refocus_seats();

        if self.transaction_inflight() {
            self.pending_state_dirty = true;
            return;
        }

        self.collect_inflight();
        self.start_layout_demands();

        if self.inflight_layout_demands == 0 {
            self.send_configures();
        }
    }

    fn refocus_seats(&mut self) {
        let mut targets = Vec::with_capacity(self.seats.len());
        for seat in self.seats.iter() {
            let target = seat
                .focused_output()
                .and_then(|o| self.outputs.get(o))
                .and_then(|output| {
                    output.pending.focus_stack.iter().into_iter().find(|v| {
                        self.views
                            .get(*v)
                            .map(|view| {
                                view.mapped
                                    && !view.destroying
                                    && view.pending.tags & output.pending.tags != 0
                            })
                            .unwrap_or(false)
                    })
                });
            targets.push(target);
        }
        for (seat, target) in self.seats.iter_mut().zip(targets) {
            seat.set_focus(target);
        }
    }

    fn unlink_inflight(&mut self, owner: Option<OutputId>, view: ViewId) {
        match owner {
            None => {
                self.hidden.inflight.focus_stack.remove(view);
                self.hidden.inflight.wm_stack.remove(view);
            }
            Some(o) => {
                if let Some(output) = self.outputs.get_mut(o) {
                    output.inflight.focus_stack.remove(view);
                    output.inflight.wm_stack.remove(view);
                }
            }
        }
    }

    /// Snapshot pending state into inflight
    fn collect_inflight(&mut self) {
        // Views pending-hidden move to the hidden inflight stacks
        for view_id in self.hidden.pending.focus_stack.iter() {
            let Some(view) = self.views.get(view_id) else {
                continue;
            };
            debug_assert_eq!(view.pending.output, None);
            let old = view.inflight.output;
            self.unlink_inflight(old, view_id);
            self.hidden.inflight.focus_stack.push_back(view_id);
            if let Some(view) = self.views.get_mut(view_id) {
                view.inflight = view.pending;
            }
        }
        for view_id in self.hidden.pending.wm_stack.iter() {
            self.hidden.inflight.wm_stack.push_back(view_id);
        }

        let active: Vec<OutputId> = self.outputs.active().to_vec();

        // First pass: relink, copy state, elect fullscreen per output
        for &output_id in &active {
            if let Some(output) = self.outputs.get_mut(output_id) {
                output.pending.fullscreen = None;
            }
            let pending_focus = self
                .outputs
                .get(output_id)
                .map(|o| o.pending.focus_stack.iter())
                .unwrap_or_default();
            let usable = self
                .outputs
                .get(output_id)
                .map(|o| o.usable_area)
                .unwrap_or_default();

            for view_id in pending_focus {
                let (wants_fullscreen, view_tags, old_owner) = {
                    let Some(view) = self.views.get_mut(view_id) else {
                        continue;
                    };
                    debug_assert_eq!(view.pending.output, Some(output_id));
                    // Float transitions save and restore the float geometry
                    if view.current.float && !view.pending.float {
                        view.float_geometry = view.current.geometry;
                    }
                    if !view.current.float && view.pending.float {
                        view.pending.geometry = view.float_geometry;
                        view.clamp_to(usable);
                    }
                    (view.pending.fullscreen, view.pending.tags, view.inflight.output)
                };

                // Most recently focused eligible view wins the election
                if let Some(output) = self.outputs.get_mut(output_id) {
                    if output.pending.fullscreen.is_none()
                        && wants_fullscreen
                        && view_tags & output.pending.tags != 0
                    {
                        output.pending.fullscreen = Some(view_id);
                    }
                }

                self.unlink_inflight(old_owner, view_id);
                if let Some(output) = self.outputs.get_mut(output_id) {
                    output.inflight.focus_stack.push_back(view_id);
                }
                if let Some(view) = self.views.get_mut(view_id) {
                    view.inflight = view.pending;
                }
            }

            // A view leaving fullscreen gets its saved geometry back
            let (elected, prior) = self
                .outputs
                .get(output_id)
                .map(|o| (o.pending.fullscreen, o.inflight.fullscreen))
                .unwrap_or((None, None));
            if elected != prior {
                if let Some(old_fs) = prior {
                    let clamp_area = self
                        .views
                        .get(old_fs)
                        .and_then(|v| v.pending.output)
                        .and_then(|o| self.outputs.get(o))
                        .map(|o| o.usable_area)
                        .unwrap_or(usable);
                    if let Some(view) = self.views.get_mut(old_fs) {
                        view.pending.geometry = view.post_fullscreen_geometry;
                        view.clamp_to(clamp_area);
                        view.inflight.geometry = view.pending.geometry;
                    }
                }
            }

            let pending_wm = self
                .outputs
                .get(output_id)
                .map(|o| o.pending.wm_stack.iter())
                .unwrap_or_default();
            for view_id in pending_wm {
                if let Some(output) = self.outputs.get_mut(output_id) {
                    output.inflight.wm_stack.push_back(view_id);
                }
            }

            if let Some(output) = self.outputs.get_mut(output_id) {
                output.inflight.tags = output.pending.tags;
            }
        }

        // Second pass, separate so fullscreen can migrate between outputs:
        // the incoming fullscreen view takes the whole output
        for &output_id in &active {
            let (elected, prior) = self
                .outputs
                .get(output_id)
                .map(|o| (o.pending.fullscreen, o.inflight.fullscreen))
                .unwrap_or((None, None));
            if elected == prior {
                continue;
            }
            if let Some(view_id) = elected {
                let dims = self.outputs.get(output_id).map(|o| o.dims()).unwrap_or((0, 0));
                if let Some(view) = self.views.get_mut(view_id) {
                    view.post_fullscreen_geometry = view.current.geometry;
                    view.pending.geometry = Rect::new(0, 0, dims.0, dims.1);
                    view.inflight.geometry = view.pending.geometry;
                }
            }
            if let Some(output) = self.outputs.get_mut(output_id) {
                output.inflight.fullscreen = elected;
            }
        }
    }

    fn view_is_tileable(&self, view_id: ViewId, output_id: OutputId) -> bool {
        let Some(view) = self.views.get(view_id) else {
            return false;
        };
        let Some(output) = self.outputs.get(output_id) else {
            return false;
        };
        !view.inflight.float
            && !view.inflight.fullscreen
            && view.inflight.tags & output.inflight.tags != 0
    }

    /// Third collection pass: raise a layout demand per output that has a
    /// generator and tileable views
    fn start_layout_demands(&mut self) {
        let active: Vec<OutputId> = self.outputs.active().to_vec();
        for output_id in active {
            let Some(output) = self.outputs.get(output_id) else {
                continue;
            };
            if output.layout_generator.is_none() {
                continue;
            }
            let count = output
                .inflight
                .wm_stack
                .iter()
                .into_iter()
                .filter(|v| self.view_is_tileable(*v, output_id))
                .count();
            if count == 0 {
                continue;
            }
            if let Some(output) = self.outputs.get_mut(output_id) {
                output.layout_demand = Some(LayoutDemand { view_count: count });
            }
            self.inflight_layout_demands += 1;
            debug!(
                "Output {:?} layout demand for {} views",
                output_id, count
            );
        }
    }

    /// The layout generator produced geometry for an output's demand
    ///
    /// Boxes are applied to the tileable inflight views in wm-stack order,
    /// clamped into the usable area.
    pub fn complete_layout_demand(&mut self, output_id: OutputId, boxes: &[Rect]) {
        let (demand, usable, wm_order) = {
            let Some(output) = self.outputs.get_mut(output_id) else {
                return;
            };
            let Some(demand) = output.layout_demand.take() else {
                warn!("Layout result for {:?} without a demand", output_id);
                return;
            };
            (demand, output.usable_area, output.inflight.wm_stack.iter())
        };
        if boxes.len() != demand.view_count {
            warn!(
                "Layout result for {:?} has {} boxes, wanted {}",
                output_id,
                boxes.len(),
                demand.view_count
            );
        }
        let tileable: Vec<ViewId> = wm_order
            .into_iter()
            .filter(|v| self.view_is_tileable(*v, output_id))
            .collect();
        for (view_id, geometry) in tileable.into_iter().zip(boxes.iter().copied()) {
            if let Some(view) = self.views.get_mut(view_id) {
                view.inflight.geometry = geometry;
                let geo = &mut view.inflight.geometry;
                geo.width = geo.width.min(usable.width);
                geo.height = geo.height.min(usable.height);
            }
        }
        self.notify_layout_demand_done();
    }

    /// A layout generator resolved (or aborted) one demand
    pub fn notify_layout_demand_done(&mut self) {
        if self.inflight_layout_demands == 0 {
            warn!("Spurious layout demand completion");
            return;
        }
        self.inflight_layout_demands -= 1;
        if self.inflight_layout_demands == 0 {
            self.send_configures();
        }
    }

    /// Propose the inflight state to every client that needs it and arm the
    /// commit deadline
    fn send_configures(&mut self) {
        debug_assert_eq!(self.inflight_layout_demands, 0);
        debug_assert_eq!(self.inflight_configures, 0);

        let active: Vec<OutputId> = self.outputs.active().to_vec();
        for output_id in active {
            let views = self
                .outputs
                .get(output_id)
                .map(|o| o.inflight.focus_stack.iter())
                .unwrap_or_default();
            for view_id in views {
                let needs = self
                    .views
                    .get(view_id)
                    .map(|v| v.needs_configure())
                    .unwrap_or(false);
                if !needs {
                    continue;
                }
                let serial = self.next_serial();
                let Some(view) = self.views.get_mut(view_id) else {
                    continue;
                };
                view.configure(serial);
                // X11 views are not frame-perfect; don't wait on them
                if view.counts_configure() {
                    self.inflight_configures += 1;
                }
                view.save_surface_tree();
                view.send_frame_done();
            }
        }

        if self.inflight_configures > 0 {
            self.timer.arm();
            debug!(
                "Transaction awaiting {} configures",
                self.inflight_configures
            );
        } else {
            self.commit_transaction();
        }
    }

    /// A counted view acked the configure for the running transaction
    pub fn ack_configure(&mut self, view_id: ViewId, serial: u32) {
        let Some(view) = self.views.get(view_id) else {
            return;
        };
        if view.inflight_serial != Some(serial) {
            return;
        }
        if view.counts_configure() {
            self.notify_configured();
        }
    }

    /// One fewer configure outstanding; commit when the count drains
    pub fn notify_configured(&mut self) {
        if self.inflight_configures == 0 {
            // Ack raced the timeout; the commit already happened
            return;
        }
        self.inflight_configures -= 1;
        if self.inflight_configures == 0 {
            self.timer.disarm();
            self.commit_transaction();
        }
    }

    /// The configure deadline passed; commit with whatever acked
    pub fn handle_transaction_timeout(&mut self) {
        self.timer.disarm();
        if self.inflight_configures == 0 {
            return;
        }
        warn!(
            "Transaction timed out, committing with {} configures outstanding",
            self.inflight_configures
        );
        self.inflight_configures = 0;
        self.commit_transaction();
    }

    /// Promote inflight to current and update the scene graph
    fn commit_transaction(&mut self) {
        debug_assert!(!self.transaction_inflight());

        // Hidden views first; the reclaim step below may destroy some
        let hidden_views = self.hidden.inflight.focus_stack.iter();
        for view_id in &hidden_views {
            let Some(view) = self.views.get_mut(*view_id) else {
                continue;
            };
            debug_assert_eq!(view.inflight.output, None);
            view.current.output = None;
            let (tree, popup) = (view.tree, view.popup_tree);
            self.scene.reparent(tree, self.hidden_tree);
            self.scene.reparent(popup, self.hidden_tree);
            if let Some(view) = self.views.get_mut(*view_id) {
                view.update_current(&mut self.scene);
            }
        }

        let active: Vec<OutputId> = self.outputs.active().to_vec();
        for &output_id in &active {
            let Some(output) = self.outputs.get_mut(output_id) else {
                continue;
            };
            if output.current.tags != output.inflight.tags {
                debug!(
                    "Output {} tags {:b} -> {:b}",
                    output.name, output.current.tags, output.inflight.tags
                );
            }
            output.current.tags = output.inflight.tags;
            let layers = output.layers;
            let inflight_fullscreen = output.inflight.fullscreen;
            let output_tags = output.current.tags;

            let views = output.inflight.focus_stack.iter();
            for view_id in views {
                let Some(view) = self.views.get(view_id) else {
                    continue;
                };
                debug_assert_eq!(view.inflight.output, Some(output_id));
                let (tree, popup) = (view.tree, view.popup_tree);
                let output_changed = view.current.output != view.inflight.output;
                let leaving_fullscreen = view.current.fullscreen && !view.inflight.fullscreen;
                let float_changed = view.current.float != view.inflight.float;
                let layer = if view.inflight.float {
                    layers.float
                } else {
                    layers.layout
                };

                if let Some(view) = self.views.get_mut(view_id) {
                    view.inflight_serial = None;
                }
                if output_changed || leaving_fullscreen {
                    self.scene.reparent(tree, layer);
                    self.scene.reparent(popup, layers.popups);
                }
                // Redundant with the reparent above when the output also
                // changed; preserved as-is
                if float_changed {
                    self.scene.reparent(tree, layer);
                }

                if let Some(view) = self.views.get_mut(view_id) {
                    view.update_current(&mut self.scene);
                }
                let enabled = self
                    .views
                    .get(view_id)
                    .map(|v| v.current.tags & output_tags != 0)
                    .unwrap_or(false);
                self.scene.set_enabled(tree, enabled);
                self.scene.set_enabled(popup, enabled);

                if inflight_fullscreen != Some(view_id) {
                    // TODO: this may over-damage; revisit with damage
                    // tracking in the renderer
                    self.scene.lower_to_bottom(tree);
                }
            }

            // Fullscreen layer follows the elected view
            let Some(output) = self.outputs.get_mut(output_id) else {
                continue;
            };
            if output.inflight.fullscreen != output.current.fullscreen {
                output.current.fullscreen = output.inflight.fullscreen;
                let fullscreen = output.current.fullscreen;
                if let Some(view_id) = fullscreen {
                    let nodes = self.views.get(view_id).map(|v| (v.tree, v.popup_tree));
                    if let Some((tree, popup)) = nodes {
                        self.scene.reparent(tree, layers.fullscreen);
                        self.scene.reparent(popup, layers.popups);
                    }
                }
                self.scene.set_enabled(layers.fullscreen, fullscreen.is_some());
            }

            let status = self.outputs.get(output_id).map(|o| o.status());
            debug!("Output {:?} status {:?}", output_id, status);
        }

        self.sync_current_stacks(&active);

        // Move/resize targets may have been retargeted under the cursor
        for seat in self.seats.iter_mut() {
            seat.cursor.update_state();
        }

        // Reclaim views whose destruction waited on this commit
        for view_id in self.hidden.inflight.focus_stack.iter() {
            let destroying = self
                .views
                .get(view_id)
                .map(|v| v.destroying)
                .unwrap_or(false);
            if destroying {
                self.destroy_view(view_id);
            }
        }

        self.idle_inhibit_generation += 1;

        if self.pending_state_dirty {
            self.pending_state_dirty = false;
            self.apply_pending();
        }
    }

    /// Current-phase stack membership mirrors inflight after every commit
    fn sync_current_stacks(&mut self, active: &[OutputId]) {
        let order = self.hidden.inflight.focus_stack.iter();
        self.hidden.current.focus_stack.clear();
        for view_id in order {
            self.hidden.current.focus_stack.push_back(view_id);
        }
        let order = self.hidden.inflight.wm_stack.iter();
        self.hidden.current.wm_stack.clear();
        for view_id in order {
            self.hidden.current.wm_stack.push_back(view_id);
        }
        for &output_id in active {
            let Some(output) = self.outputs.get_mut(output_id) else {
                continue;
            };
            let focus = output.inflight.focus_stack.iter();
            output.current.focus_stack.clear();
            for view_id in focus {
                output.current.focus_stack.push_back(view_id);
            }
            let wm = output.inflight.wm_stack.iter();
            output.current.wm_stack.clear();
            for view_id in wm {
                output.current.wm_stack.push_back(view_id);
            }
        }
    }

    fn destroy_view(&mut self, view_id: ViewId) {
        self.hidden.pending.focus_stack.remove(view_id);
        self.hidden.pending.wm_stack.remove(view_id);
        self.hidden.inflight.focus_stack.remove(view_id);
        self.hidden.inflight.wm_stack.remove(view_id);
        self.hidden.current.focus_stack.remove(view_id);
        self.hidden.current.wm_stack.remove(view_id);
        for seat in self.seats.iter_mut() {
            if seat.focused_view() == Some(view_id) {
                seat.set_focus(None);
            }
        }
        if let Some(view) = self.views.remove(view_id) {
            view.destroy_scene(&mut self.scene);
            debug!("Reclaimed view {:?}", view_id);
        }
    }
}

impl Default for Root {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::output::OutputState;
    use crate::compositor::view::ViewState;

    fn test_mode() -> OutputMode {
        OutputMode {
            width: 1920,
            height: 1080,
            refresh: 60000,
            preferred: true,
        }
    }

    fn root_with_output() -> (Root, OutputId) {
        let mut root = Root::new();
        let id = root.create_output("HEADLESS-1", test_mode()).unwrap();
        root.add_output(id);
        (root, id)
    }

    /// Drive outstanding layout demands and configure acks until idle
    fn settle(root: &mut Root) {
        let mut turns = 0;
        while root.transaction_inflight() {
            turns += 1;
            assert!(turns < 16, "transaction does not drain");
            for output_id in root.outputs.active().to_vec() {
                let demand = root.outputs.get(output_id).and_then(|o| o.layout_demand);
                if let Some(demand) = demand {
                    let boxes: Vec<Rect> = (0..demand.view_count)
                        .map(|i| Rect::new(0, i as i32 * 200, 960, 200))
                        .collect();
                    root.complete_layout_demand(output_id, &boxes);
                }
            }
            for view_id in root.views.ids() {
                let serial = root.views.get(view_id).and_then(|v| v.inflight_serial);
                if let Some(serial) = serial {
                    root.ack_configure(view_id, serial);
                }
            }
        }
    }

    fn mapped_view(root: &mut Root) -> ViewId {
        let id = root.create_view(ViewShell::Xdg);
        root.set_pending_geometry(id, Rect::new(0, 0, 640, 480));
        root.map_view(id);
        settle(root);
        id
    }

    fn phase_state<'a>(output: &'a Output, phase: usize) -> &'a OutputState {
        match phase {
            0 => &output.pending,
            1 => &output.inflight,
            _ => &output.current,
        }
    }

    fn hidden_pair<'a>(root: &'a Root, phase: usize) -> &'a StackPair {
        match phase {
            0 => &root.hidden.pending,
            1 => &root.hidden.inflight,
            _ => &root.hidden.current,
        }
    }

    /// Stack-membership exclusivity and output-link agreement in all phases
    fn assert_stack_invariants(root: &Root) {
        for view_id in root.views.ids() {
            let view = root.views.get(view_id).unwrap();
            for phase in 0..3 {
                let expected = match phase {
                    0 => view.pending.output,
                    1 => view.inflight.output,
                    _ => view.current.output,
                };
                let mut focus_owners = 0;
                let mut wm_owners = 0;
                let hidden = hidden_pair(root, phase);
                if hidden.focus_stack.contains(view_id) {
                    assert_eq!(expected, None, "phase {} focus link disagrees", phase);
                    focus_owners += 1;
                }
                if hidden.wm_stack.contains(view_id) {
                    wm_owners += 1;
                }
                for &output_id in root.outputs.all() {
                    let state = phase_state(root.outputs.get(output_id).unwrap(), phase);
                    if state.focus_stack.contains(view_id) {
                        assert_eq!(
                            expected,
                            Some(output_id),
                            "phase {} focus link disagrees",
                            phase
                        );
                        focus_owners += 1;
                    }
                    if state.wm_stack.contains(view_id) {
                        wm_owners += 1;
                    }
                }
                assert_eq!(focus_owners, 1, "phase {} focus membership", phase);
                assert_eq!(wm_owners, 1, "phase {} wm membership", phase);
            }
        }
    }

    #[test]
    fn test_add_output_idempotent() {
        let (mut root, id) = root_with_output();
        let placed = root.output_layout.position(id);
        root.add_output(id);
        assert_eq!(root.outputs.active().len(), 1);
        assert_eq!(root.output_layout.position(id), placed);
    }

    #[test]
    fn test_remove_output_idempotent() {
        let (mut root, id) = root_with_output();
        root.remove_output(id);
        root.remove_output(id);
        assert!(root.outputs.active().is_empty());
        assert_eq!(root.outputs.all().len(), 1);
    }

    #[test]
    fn test_view_maps_to_first_output() {
        let (mut root, output) = root_with_output();
        let view = mapped_view(&mut root);

        let v = root.views.get(view).unwrap();
        assert_eq!(v.pending.output, Some(output));
        assert_eq!(v.current.output, Some(output));
        assert_stack_invariants(&root);
        // Drained: all three snapshots agree
        assert!(!root.transaction_inflight());
        assert!(!root.pending_state_dirty());
        assert_eq!(v.pending, v.inflight);
        assert_eq!(v.inflight, v.current);
    }

    #[test]
    fn test_hidden_tree_always_disabled() {
        let (mut root, output) = root_with_output();
        assert!(!root.scene.enabled(root.hidden_tree));
        let _view = mapped_view(&mut root);
        assert!(!root.scene.enabled(root.hidden_tree));
        root.remove_output(output);
        settle(&mut root);
        assert!(!root.scene.enabled(root.hidden_tree));
    }

    #[test]
    fn test_tag_change_transaction() {
        // Scenario: one output, one tiled view, tags move from 0b01 to 0b10
        let (mut root, output) = root_with_output();
        root.attach_layout_generator(output, "tiler");
        let view = mapped_view(&mut root);

        root.set_output_pending_tags(output, 0b10);
        root.set_pending_tags(view, 0b10);
        root.apply_pending();

        // Turn one: the layout generator answers
        let demand = root.outputs.get(output).unwrap().layout_demand;
        assert_eq!(demand, Some(LayoutDemand { view_count: 1 }));
        root.complete_layout_demand(output, &[Rect::new(0, 0, 1920, 1080)]);

        // Turn two: the client acks
        let serial = root.views.get(view).unwrap().inflight_serial;
        if let Some(serial) = serial {
            root.ack_configure(view, serial);
        }

        assert!(!root.transaction_inflight());
        assert_eq!(root.outputs.get(output).unwrap().current.tags, 0b10);
        let v = root.views.get(view).unwrap();
        assert_eq!(v.current.tags, 0b10);
        assert!(root.scene.enabled(v.tree));
        assert_stack_invariants(&root);
    }

    #[test]
    fn test_view_disabled_when_tags_hidden() {
        let (mut root, output) = root_with_output();
        let view = mapped_view(&mut root);

        root.set_output_pending_tags(output, 0b10);
        root.apply_pending();
        settle(&mut root);

        let v = root.views.get(view).unwrap();
        assert!(!root.scene.enabled(v.tree));
        assert_eq!(root.outputs.get(output).unwrap().current.tags, 0b10);
    }

    #[test]
    fn test_float_fullscreen_roundtrip() {
        // Scenario: float at (100,100,400,300), fullscreen, then back
        let (mut root, output) = root_with_output();
        let view = root.create_view(ViewShell::Xdg);
        root.set_pending_float(view, true);
        root.set_pending_geometry(view, Rect::new(100, 100, 400, 300));
        root.map_view(view);
        settle(&mut root);
        assert_eq!(
            root.views.get(view).unwrap().current.geometry,
            Rect::new(100, 100, 400, 300)
        );

        root.set_pending_fullscreen(view, true);
        root.apply_pending();
        {
            let v = root.views.get(view).unwrap();
            assert_eq!(v.post_fullscreen_geometry, Rect::new(100, 100, 400, 300));
            assert_eq!(v.inflight.geometry, Rect::new(0, 0, 1920, 1080));
        }
        settle(&mut root);
        {
            let layers = root.outputs.get(output).unwrap().layers;
            let v = root.views.get(view).unwrap();
            assert_eq!(root.scene.parent(v.tree), Some(layers.fullscreen));
            assert!(root.scene.enabled(layers.fullscreen));
            assert_eq!(root.outputs.get(output).unwrap().current.fullscreen, Some(view));
        }

        root.set_pending_fullscreen(view, false);
        root.apply_pending();
        settle(&mut root);
        {
            let layers = root.outputs.get(output).unwrap().layers;
            let v = root.views.get(view).unwrap();
            assert_eq!(v.current.geometry, Rect::new(100, 100, 400, 300));
            assert_eq!(root.scene.parent(v.tree), Some(layers.float));
            assert!(!root.scene.enabled(layers.fullscreen));
            assert_eq!(root.outputs.get(output).unwrap().current.fullscreen, None);
        }
        assert_stack_invariants(&root);
    }

    #[test]
    fn test_fullscreen_election_most_recently_focused_wins() {
        let (mut root, output) = root_with_output();
        let first = mapped_view(&mut root);
        let second = mapped_view(&mut root);

        root.set_pending_fullscreen(first, true);
        root.set_pending_fullscreen(second, true);
        root.raise_focus(second);
        root.apply_pending();
        settle(&mut root);

        assert_eq!(
            root.outputs.get(output).unwrap().current.fullscreen,
            Some(second)
        );
        // Only the elected view is actually fullscreen on the output
        let fullscreen_count = [first, second]
            .iter()
            .filter(|v| root.outputs.get(output).unwrap().current.fullscreen == Some(**v))
            .count();
        assert_eq!(fullscreen_count, 1);
    }

    #[test]
    fn test_hotplug_down_to_zero_then_up() {
        // Scenario: A and B, view on B, unplug both, replug
        let mut root = Root::new();
        let a = root.create_output("HEADLESS-1", test_mode()).unwrap();
        let b = root.create_output("HEADLESS-2", test_mode()).unwrap();
        root.add_output(a);
        root.add_output(b);

        let view = mapped_view(&mut root);
        root.set_pending_tags(view, 0b100);
        root.set_pending_output(view, Some(b));
        root.set_output_pending_tags(a, 0b100);
        root.apply_pending();
        settle(&mut root);
        assert_eq!(root.views.get(view).unwrap().current.output, Some(b));

        root.remove_output(b);
        settle(&mut root);
        assert_eq!(root.views.get(view).unwrap().pending.output, Some(a));
        assert!(!root.outputs.is_active(b));
        assert_stack_invariants(&root);

        root.remove_output(a);
        settle(&mut root);
        {
            let v = root.views.get(view).unwrap();
            assert_eq!(v.pending.output, None);
            assert_eq!(v.current.output, None);
            assert_eq!(root.scene.parent(v.tree), Some(root.hidden_tree));
            assert_eq!(root.scene.parent(v.popup_tree), Some(root.hidden_tree));
        }
        assert_eq!(root.hidden_tags, 0b100);
        assert_stack_invariants(&root);

        let c = root.create_output("HEADLESS-3", test_mode()).unwrap();
        root.add_output(c);
        settle(&mut root);
        {
            let v = root.views.get(view).unwrap();
            assert_eq!(v.pending.output, Some(c));
            assert_eq!(v.current.output, Some(c));
            assert!(root.scene.enabled(v.tree));
        }
        assert_eq!(root.outputs.get(c).unwrap().pending.tags, 0b100);
        assert_stack_invariants(&root);
    }

    #[test]
    fn test_slow_client_times_out() {
        // Scenario: the client never acks; the timeout commits anyway
        let (mut root, _output) = root_with_output();
        let view = root.create_view(ViewShell::Xdg);
        root.set_pending_geometry(view, Rect::new(0, 0, 640, 480));
        root.map_view(view);

        assert_eq!(root.inflight_configures(), 1);
        assert!(root.timer.deadline().is_some());
        let old_current = root.views.get(view).unwrap().current;

        // No ack arrives; current is untouched until the deadline
        assert_eq!(root.views.get(view).unwrap().current, old_current);

        root.handle_transaction_timeout();
        assert_eq!(root.inflight_configures(), 0);
        assert!(root.timer.deadline().is_none());
        assert_eq!(
            root.views.get(view).unwrap().current.geometry,
            Rect::new(0, 0, 640, 480)
        );
    }

    #[test]
    fn test_late_ack_after_timeout_is_ignored() {
        let (mut root, _output) = root_with_output();
        let view = root.create_view(ViewShell::Xdg);
        root.set_pending_geometry(view, Rect::new(0, 0, 640, 480));
        root.map_view(view);

        root.handle_transaction_timeout();
        assert!(!root.transaction_inflight());
        root.notify_configured();
        assert_eq!(root.inflight_configures(), 0);
    }

    #[test]
    fn test_dirty_latch_reruns_pipeline() {
        // Scenario: pending mutates while configures are outstanding
        let (mut root, output) = root_with_output();
        let view = root.create_view(ViewShell::Xdg);
        root.set_pending_geometry(view, Rect::new(0, 0, 640, 480));
        root.map_view(view);
        assert_eq!(root.inflight_configures(), 1);

        root.set_output_pending_tags(output, 0b10);
        root.apply_pending();
        assert!(root.pending_state_dirty());
        // The first transaction's snapshot is stable
        assert_eq!(root.outputs.get(output).unwrap().inflight.tags, 1);

        let serial = root.views.get(view).unwrap().inflight_serial.unwrap();
        root.ack_configure(view, serial);

        // Commit re-ran the pipeline for the latched tag change
        assert!(!root.pending_state_dirty());
        settle(&mut root);
        assert_eq!(root.outputs.get(output).unwrap().current.tags, 0b10);
    }

    #[test]
    fn test_apply_pending_while_awaiting_layout_sets_dirty() {
        let (mut root, output) = root_with_output();
        root.attach_layout_generator(output, "tiler");
        let view = root.create_view(ViewShell::Xdg);
        root.set_pending_geometry(view, Rect::new(0, 0, 640, 480));
        root.map_view(view);
        assert_eq!(root.inflight_layout_demands(), 1);

        root.apply_pending();
        assert!(root.pending_state_dirty());

        root.complete_layout_demand(output, &[Rect::new(0, 0, 960, 1080)]);
        settle(&mut root);
        assert!(!root.pending_state_dirty());
        assert!(!root.transaction_inflight());
    }

    #[test]
    fn test_remove_output_cancels_layout_demand() {
        let mut root = Root::new();
        let a = root.create_output("HEADLESS-1", test_mode()).unwrap();
        let b = root.create_output("HEADLESS-2", test_mode()).unwrap();
        root.add_output(a);
        root.add_output(b);
        root.attach_layout_generator(b, "tiler");

        let view = mapped_view(&mut root);
        root.set_pending_output(view, Some(b));
        root.apply_pending();
        assert_eq!(root.inflight_layout_demands(), 1);

        root.remove_output(b);
        settle(&mut root);
        assert_eq!(root.inflight_layout_demands(), 0);
        assert_eq!(root.views.get(view).unwrap().current.output, Some(a));
        assert_stack_invariants(&root);
    }

    #[test]
    fn test_destroying_view_reclaimed_on_commit() {
        let (mut root, _output) = root_with_output();
        let view = mapped_view(&mut root);
        let nodes_before = root.scene.len();

        root.begin_destroy_view(view);
        settle(&mut root);

        assert!(root.views.get(view).is_none());
        assert!(root.scene.len() < nodes_before);
        for seat in root.seats.iter() {
            assert_ne!(seat.focused_view(), Some(view));
        }
    }

    #[test]
    fn test_destroying_view_not_adopted_by_new_output() {
        let mut root = Root::new();
        let view = root.create_view(ViewShell::Xdg);
        root.map_view(view);
        root.begin_destroy_view(view);

        let output = root.create_output("HEADLESS-1", test_mode()).unwrap();
        root.add_output(output);
        settle(&mut root);

        // Reclaimed, not migrated
        assert!(root.views.get(view).is_none());
    }

    #[test]
    fn test_xwayland_views_exempt_from_configures() {
        #[cfg(feature = "xwayland")]
        {
            let (mut root, _output) = root_with_output();
            let view = root.create_view(ViewShell::Xwayland);
            root.set_pending_geometry(view, Rect::new(0, 0, 640, 480));
            root.map_view(view);
            // Configured but not counted; the transaction commits at once
            assert_eq!(root.inflight_configures(), 0);
            assert!(!root.transaction_inflight());
        }
    }

    #[test]
    fn test_seat_focus_follows_pending_stack() {
        let (mut root, output) = root_with_output();
        let first = mapped_view(&mut root);
        let second = mapped_view(&mut root);

        root.raise_focus(first);
        root.apply_pending();
        settle(&mut root);
        assert_eq!(root.seats.iter().next().unwrap().focused_view(), Some(first));

        root.raise_focus(second);
        root.apply_pending();
        settle(&mut root);
        assert_eq!(
            root.seats.iter().next().unwrap().focused_view(),
            Some(second)
        );

        // Focus skips views whose tags are not visible
        root.set_pending_tags(second, 0b100);
        root.set_output_pending_tags(output, 0b1);
        root.apply_pending();
        settle(&mut root);
        assert_eq!(root.seats.iter().next().unwrap().focused_view(), Some(first));
    }

    #[test]
    fn test_cursor_refreshed_on_commit() {
        let (mut root, _output) = root_with_output();
        for seat in root.seats.iter_mut() {
            seat.cursor.clear_stale();
        }
        let _view = mapped_view(&mut root);
        assert!(root.seats.iter().all(|s| s.cursor.is_stale()));
    }

    #[test]
    fn test_idle_inhibit_poked_each_commit() {
        let (mut root, _output) = root_with_output();
        let before = root.idle_inhibit_generation();
        let _view = mapped_view(&mut root);
        assert!(root.idle_inhibit_generation() > before);
    }

    #[test]
    fn test_hit_test_resolves_views() {
        let (mut root, _output) = root_with_output();
        let view = mapped_view(&mut root);

        let hit = root.at(10.0, 10.0).expect("view under cursor");
        assert_eq!(hit.target, AtTarget::View(view));
        assert_eq!(hit.sx, 10.0);
        assert_eq!(hit.sy, 10.0);

        // Nothing interactive outside the outputs
        assert!(root.at(-50.0, -50.0).is_none());
    }

    #[test]
    fn test_hit_test_ignores_hidden_views() {
        let mut root = Root::new();
        let view = root.create_view(ViewShell::Xdg);
        root.set_pending_geometry(view, Rect::new(0, 0, 640, 480));
        root.map_view(view);
        settle(&mut root);
        // No output: the view sits in the disabled hidden tree
        assert!(root.at(10.0, 10.0).is_none());
    }

    #[test]
    fn test_layout_demand_geometry_applied() {
        let (mut root, output) = root_with_output();
        root.attach_layout_generator(output, "tiler");
        let first = mapped_view(&mut root);
        let second = mapped_view(&mut root);

        root.apply_pending();
        assert_eq!(
            root.outputs.get(output).unwrap().layout_demand,
            Some(LayoutDemand { view_count: 2 })
        );
        root.complete_layout_demand(
            output,
            &[Rect::new(0, 0, 960, 1080), Rect::new(960, 0, 960, 1080)],
        );
        settle(&mut root);

        let geometries: Vec<Rect> = root
            .outputs
            .get(output)
            .unwrap()
            .current
            .wm_stack
            .iter()
            .into_iter()
            .map(|v| root.views.get(v).unwrap().current.geometry)
            .collect();
        assert!(geometries.contains(&Rect::new(0, 0, 960, 1080)));
        assert!(geometries.contains(&Rect::new(960, 0, 960, 1080)));
        let _ = (first, second);
    }

    #[test]
    fn test_float_view_not_tiled() {
        let (mut root, output) = root_with_output();
        root.attach_layout_generator(output, "tiler");
        let view = root.create_view(ViewShell::Xdg);
        root.set_pending_float(view, true);
        root.set_pending_geometry(view, Rect::new(10, 20, 300, 200));
        root.map_view(view);

        // A lone floating view raises no layout demand
        assert_eq!(root.inflight_layout_demands(), 0);
        settle(&mut root);
        assert_eq!(
            root.views.get(view).unwrap().current.geometry,
            Rect::new(10, 20, 300, 200)
        );
        let layers = root.outputs.get(output).unwrap().layers;
        assert_eq!(
            root.scene.parent(root.views.get(view).unwrap().tree),
            Some(layers.float)
        );
    }

    #[test]
    fn test_transaction_drains_to_agreement() {
        let (mut root, output) = root_with_output();
        root.attach_layout_generator(output, "tiler");
        let views: Vec<ViewId> = (0..3).map(|_| mapped_view(&mut root)).collect();

        root.set_output_pending_tags(output, 0b11);
        for (i, view) in views.iter().enumerate() {
            root.set_pending_tags(*view, 1 << (i % 2));
        }
        root.apply_pending();
        settle(&mut root);

        assert!(!root.transaction_inflight());
        assert!(!root.pending_state_dirty());
        for view in &views {
            // Geometry of tiled views is generator-owned and lives only in
            // inflight/current; everything else must agree across phases
            let v = root.views.get(*view).unwrap();
            let key = |s: &ViewState| (s.output, s.tags, s.float, s.fullscreen);
            assert_eq!(key(&v.pending), key(&v.inflight));
            assert_eq!(key(&v.inflight), key(&v.current));
            assert_eq!(v.inflight.geometry, v.current.geometry);
        }
        assert_stack_invariants(&root);
    }
}
