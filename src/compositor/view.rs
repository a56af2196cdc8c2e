//! Views
//!
//! A view is a mapped toplevel window. Views carry three state snapshots:
//! `pending` is what external mutators ask for, `inflight` is what the
//! current transaction has committed to, and `current` is what is on screen.
//! Promotion between the phases is driven entirely by the transaction engine
//! in [`crate::compositor::Root`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use log::debug;

use crate::compositor::OutputId;
use crate::scene::{NodeData, NodeId, Rect, SceneGraph};

/// Unique identifier for surfaces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceId(pub u64);

impl SurfaceId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        SurfaceId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Unique identifier for views
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewId(pub u64);

impl ViewId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        ViewId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Which shell implementation backs the view
///
/// X11 views are exempt from configure counting: their resizes are not
/// frame-perfect and waiting on them would stall every transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewShell {
    Xdg,
    #[cfg(feature = "xwayland")]
    Xwayland,
}

/// One phase of a view's window-management state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewState {
    /// The output the view belongs to in this phase; `None` parks it in the
    /// hidden area
    pub output: Option<OutputId>,
    /// Bitmask of the tags the view carries
    pub tags: u32,
    pub float: bool,
    pub fullscreen: bool,
    /// Geometry in output-local coordinates
    pub geometry: Rect,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            output: None,
            tags: 1,
            float: false,
            fullscreen: false,
            geometry: Rect::default(),
        }
    }
}

/// A toplevel window under compositor management
#[derive(Debug)]
pub struct View {
    pub id: ViewId,
    pub surface: SurfaceId,
    pub shell: ViewShell,

    pub pending: ViewState,
    pub inflight: ViewState,
    pub current: ViewState,

    /// Geometry to restore when the view stops floating
    pub float_geometry: Rect,
    /// Geometry to restore when the view leaves fullscreen
    pub post_fullscreen_geometry: Rect,

    /// Serial of the configure sent for the running transaction
    pub inflight_serial: Option<u32>,
    /// Size last proposed to the client
    sent_size: Option<(i32, i32)>,

    pub mapped: bool,
    pub destroying: bool,

    /// Surface and decoration subtree
    pub tree: NodeId,
    /// Popups, kept above sibling views
    pub popup_tree: NodeId,
    buffer_node: NodeId,

    /// Whether the surface tree is snapshotted for the running transaction
    saved_buffers: bool,
}

impl View {
    /// Create a view parked in the hidden area
    ///
    /// Both scene subtrees are created under `hidden_tree` and tagged so hit
    /// tests resolve back to the view.
    pub fn new(scene: &mut SceneGraph, hidden_tree: NodeId, shell: ViewShell) -> Self {
        let id = ViewId::new();
        let surface = SurfaceId::new();
        let tree = scene.create_tree(hidden_tree);
        scene.set_data(tree, NodeData::View(id));
        let buffer_node = scene.create_buffer(tree, surface, 0, 0);
        let popup_tree = scene.create_tree(hidden_tree);
        scene.set_data(popup_tree, NodeData::View(id));

        Self {
            id,
            surface,
            shell,
            pending: ViewState::default(),
            inflight: ViewState::default(),
            current: ViewState::default(),
            float_geometry: Rect::default(),
            post_fullscreen_geometry: Rect::default(),
            inflight_serial: None,
            sent_size: None,
            mapped: false,
            destroying: false,
            tree,
            popup_tree,
            buffer_node,
            saved_buffers: false,
        }
    }

    /// Whether committing the inflight state requires a client round trip
    pub fn needs_configure(&self) -> bool {
        let size = (self.inflight.geometry.width, self.inflight.geometry.height);
        self.mapped && !self.destroying && self.sent_size != Some(size)
    }

    /// Whether this view's configure is counted toward transaction completion
    pub fn counts_configure(&self) -> bool {
        match self.shell {
            ViewShell::Xdg => true,
            #[cfg(feature = "xwayland")]
            ViewShell::Xwayland => false,
        }
    }

    /// Propose the inflight size to the client
    pub fn configure(&mut self, serial: u32) {
        let size = (self.inflight.geometry.width, self.inflight.geometry.height);
        self.inflight_serial = Some(serial);
        self.sent_size = Some(size);
        debug!(
            "View {:?} configure serial {} size {}x{}",
            self.id, serial, size.0, size.1
        );
    }

    /// Snapshot the surface tree so the old content stays on screen until
    /// the transaction commits
    pub fn save_surface_tree(&mut self) {
        self.saved_buffers = true;
    }

    /// Whether a surface-tree snapshot is held
    pub fn has_saved_buffers(&self) -> bool {
        self.saved_buffers
    }

    /// Let the client draw at the new size while the transaction is inflight
    pub fn send_frame_done(&self) {
        debug!("View {:?} frame done", self.id);
    }

    /// Promote inflight to current and apply geometry to the scene
    pub fn update_current(&mut self, scene: &mut SceneGraph) {
        self.current = self.inflight;
        let geo = self.current.geometry;
        scene.set_position(self.tree, geo.x, geo.y);
        scene.set_position(self.popup_tree, geo.x, geo.y);
        scene.set_buffer_size(self.buffer_node, geo.width, geo.height);
        self.saved_buffers = false;
    }

    /// Clamp the pending geometry into the given usable area
    pub fn clamp_to(&mut self, usable: Rect) {
        let geo = &mut self.pending.geometry;
        if geo.width > usable.width {
            geo.width = usable.width;
        }
        if geo.height > usable.height {
            geo.height = usable.height;
        }
        geo.x = geo.x.clamp(usable.x, usable.x + usable.width - geo.width);
        geo.y = geo.y.clamp(usable.y, usable.y + usable.height - geo.height);
    }

    /// Destroy the view's scene subtrees
    pub fn destroy_scene(&self, scene: &mut SceneGraph) {
        scene.destroy(self.tree);
        scene.destroy(self.popup_tree);
    }
}

/// Arena of all live views
#[derive(Debug, Default)]
pub struct ViewManager {
    views: HashMap<ViewId, View>,
}

impl ViewManager {
    /// Create an empty view arena
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a view, returning its id
    pub fn insert(&mut self, view: View) -> ViewId {
        let id = view.id;
        self.views.insert(id, view);
        id
    }

    /// Get a view by id
    pub fn get(&self, id: ViewId) -> Option<&View> {
        self.views.get(&id)
    }

    /// Get a mutable view by id
    pub fn get_mut(&mut self, id: ViewId) -> Option<&mut View> {
        self.views.get_mut(&id)
    }

    /// Remove a view from the arena
    pub fn remove(&mut self, id: ViewId) -> Option<View> {
        self.views.remove(&id)
    }

    /// All live view ids
    pub fn ids(&self) -> Vec<ViewId> {
        self.views.keys().copied().collect()
    }

    /// Number of live views
    pub fn len(&self) -> usize {
        self.views.len()
    }

    /// Whether no views are live
    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene_and_view() -> (SceneGraph, View) {
        let mut scene = SceneGraph::new();
        let hidden = scene.create_tree(scene.root());
        let view = View::new(&mut scene, hidden, ViewShell::Xdg);
        (scene, view)
    }

    #[test]
    fn test_view_starts_hidden() {
        let (_, view) = scene_and_view();
        assert_eq!(view.pending.output, None);
        assert!(!view.mapped);
        assert!(!view.destroying);
    }

    #[test]
    fn test_needs_configure_on_size_change() {
        let (_, mut view) = scene_and_view();
        view.mapped = true;
        view.inflight.geometry = Rect::new(0, 0, 640, 480);
        assert!(view.needs_configure());

        view.configure(1);
        assert!(!view.needs_configure());
        assert_eq!(view.inflight_serial, Some(1));

        view.inflight.geometry.width = 800;
        assert!(view.needs_configure());
    }

    #[test]
    fn test_update_current_applies_geometry() {
        let (mut scene, mut view) = scene_and_view();
        view.inflight.geometry = Rect::new(10, 20, 300, 200);
        view.save_surface_tree();
        view.update_current(&mut scene);

        assert_eq!(view.current.geometry, Rect::new(10, 20, 300, 200));
        assert_eq!(scene.position(view.tree), (10, 20));
        assert!(!view.has_saved_buffers());
    }

    #[test]
    fn test_clamp_to_output() {
        let (_, mut view) = scene_and_view();
        view.pending.geometry = Rect::new(1800, -50, 400, 300);
        view.clamp_to(Rect::new(0, 0, 1920, 1080));
        assert_eq!(view.pending.geometry, Rect::new(1520, 0, 400, 300));

        view.pending.geometry = Rect::new(0, 0, 4000, 4000);
        view.clamp_to(Rect::new(0, 0, 1920, 1080));
        assert_eq!(view.pending.geometry, Rect::new(0, 0, 1920, 1080));
    }

    #[test]
    fn test_view_manager() {
        let mut scene = SceneGraph::new();
        let hidden = scene.create_tree(scene.root());
        let mut manager = ViewManager::new();
        let id = manager.insert(View::new(&mut scene, hidden, ViewShell::Xdg));
        assert!(manager.get(id).is_some());
        manager.remove(id);
        assert!(manager.get(id).is_none());
    }
}
