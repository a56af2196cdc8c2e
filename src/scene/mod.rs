//! Scene graph
//!
//! This module provides the node tree the compositor composes from: tree
//! nodes group subtrees, buffer nodes carry client surfaces, rect nodes fill
//! solid areas. Nodes can be reparented without copying content, enabled or
//! disabled as whole subtrees, positioned relative to their parent, and
//! hit-tested from the top of the stacking order down.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use log::warn;

use crate::compositor::{SurfaceId, ViewId};
use crate::protocol::layer_shell::LayerSurfaceId;

/// Unique identifier for scene nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u64);

impl NodeId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        NodeId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Unique identifier for session-lock surfaces
///
/// Lock surfaces are managed by an external subsystem; the scene only tags
/// their nodes so hit tests can route input to them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LockSurfaceId(pub u64);

/// Unique identifier for X11 override-redirect surfaces
#[cfg(feature = "xwayland")]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct XwaylandSurfaceId(pub u64);

/// A rectangle in layout or output coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    /// Create a new rectangle
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Whether the point lies within the rectangle
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x as f64
            && y >= self.y as f64
            && x < (self.x + self.width) as f64
            && y < (self.y + self.height) as f64
    }
}

/// What a node renders
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// Groups child nodes; renders nothing itself
    Tree,
    /// A client buffer with its committed size
    Buffer {
        surface: SurfaceId,
        width: i32,
        height: i32,
    },
    /// A solid rectangle (not hit-testable)
    Rect { width: i32, height: i32 },
}

/// Identifies the real owner of an interactive subtree
///
/// Hit tests decode this tag to route input to the right subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeData {
    View(ViewId),
    LayerSurface(LayerSurfaceId),
    LockSurface(LockSurfaceId),
    #[cfg(feature = "xwayland")]
    XwaylandOverrideRedirect(XwaylandSurfaceId),
}

/// A node in the scene graph
#[derive(Debug)]
struct Node {
    parent: Option<NodeId>,
    /// Children in stacking order, bottom to top
    children: Vec<NodeId>,
    enabled: bool,
    /// Position relative to the parent
    x: i32,
    y: i32,
    kind: NodeKind,
    data: Option<NodeData>,
}

/// Result of a hit test: the topmost node under the point and the
/// node-local coordinates of the hit
#[derive(Debug, Clone, Copy)]
pub struct HitResult {
    pub node: NodeId,
    pub sx: f64,
    pub sy: f64,
}

/// The scene graph arena
#[derive(Debug)]
pub struct SceneGraph {
    nodes: HashMap<NodeId, Node>,
    root: NodeId,
}

impl SceneGraph {
    /// Create a scene graph with an enabled root tree node
    pub fn new() -> Self {
        let root = NodeId::new();
        let mut nodes = HashMap::new();
        nodes.insert(
            root,
            Node {
                parent: None,
                children: Vec::new(),
                enabled: true,
                x: 0,
                y: 0,
                kind: NodeKind::Tree,
                data: None,
            },
        );
        Self { nodes, root }
    }

    /// The root node
    pub fn root(&self) -> NodeId {
        self.root
    }

    fn insert(&mut self, parent: NodeId, kind: NodeKind) -> NodeId {
        let id = NodeId::new();
        self.nodes.insert(
            id,
            Node {
                parent: Some(parent),
                children: Vec::new(),
                enabled: true,
                x: 0,
                y: 0,
                kind,
                data: None,
            },
        );
        if let Some(p) = self.nodes.get_mut(&parent) {
            p.children.push(id);
        } else {
            warn!("Scene node created under missing parent {:?}", parent);
        }
        id
    }

    /// Create a tree node under `parent`, on top of its siblings
    pub fn create_tree(&mut self, parent: NodeId) -> NodeId {
        self.insert(parent, NodeKind::Tree)
    }

    /// Create a buffer node under `parent`
    pub fn create_buffer(
        &mut self,
        parent: NodeId,
        surface: SurfaceId,
        width: i32,
        height: i32,
    ) -> NodeId {
        self.insert(
            parent,
            NodeKind::Buffer {
                surface,
                width,
                height,
            },
        )
    }

    /// Create a rect node under `parent`
    pub fn create_rect(&mut self, parent: NodeId, width: i32, height: i32) -> NodeId {
        self.insert(parent, NodeKind::Rect { width, height })
    }

    /// Attach owner metadata to a node
    pub fn set_data(&mut self, node: NodeId, data: NodeData) {
        if let Some(n) = self.nodes.get_mut(&node) {
            n.data = Some(data);
        }
    }

    /// Read a node's owner metadata
    pub fn data(&self, node: NodeId) -> Option<NodeData> {
        self.nodes.get(&node).and_then(|n| n.data)
    }

    /// Move a node to a new parent, on top of the new siblings
    ///
    /// The node's content and its whole subtree move with it.
    pub fn reparent(&mut self, node: NodeId, new_parent: NodeId) {
        if node == new_parent || self.is_ancestor(node, new_parent) {
            warn!("Refusing cyclic reparent of {:?} under {:?}", node, new_parent);
            return;
        }
        let old_parent = match self.nodes.get(&node) {
            Some(n) => n.parent,
            None => return,
        };
        if old_parent == Some(new_parent) {
            return;
        }
        if let Some(old) = old_parent.and_then(|p| self.nodes.get_mut(&p)) {
            old.children.retain(|c| *c != node);
        }
        if let Some(new) = self.nodes.get_mut(&new_parent) {
            new.children.push(node);
        }
        if let Some(n) = self.nodes.get_mut(&node) {
            n.parent = Some(new_parent);
        }
    }

    /// Whether `ancestor` is an ancestor of `node` (or the node itself)
    pub fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut cur = Some(node);
        while let Some(id) = cur {
            if id == ancestor {
                return true;
            }
            cur = self.nodes.get(&id).and_then(|n| n.parent);
        }
        false
    }

    /// Enable or disable a subtree
    ///
    /// A disabled subtree renders nothing and receives no input.
    pub fn set_enabled(&mut self, node: NodeId, enabled: bool) {
        if let Some(n) = self.nodes.get_mut(&node) {
            n.enabled = enabled;
        }
    }

    /// Whether the node itself is enabled
    pub fn enabled(&self, node: NodeId) -> bool {
        self.nodes.get(&node).map(|n| n.enabled).unwrap_or(false)
    }

    /// Set a node's position relative to its parent
    pub fn set_position(&mut self, node: NodeId, x: i32, y: i32) {
        if let Some(n) = self.nodes.get_mut(&node) {
            n.x = x;
            n.y = y;
        }
    }

    /// A node's position relative to its parent
    pub fn position(&self, node: NodeId) -> (i32, i32) {
        self.nodes.get(&node).map(|n| (n.x, n.y)).unwrap_or((0, 0))
    }

    /// Update the committed size of a buffer node
    pub fn set_buffer_size(&mut self, node: NodeId, width: i32, height: i32) {
        if let Some(n) = self.nodes.get_mut(&node) {
            if let NodeKind::Buffer {
                width: w,
                height: h,
                ..
            } = &mut n.kind
            {
                *w = width;
                *h = height;
            }
        }
    }

    /// Raise a node to the top of its siblings
    pub fn raise_to_top(&mut self, node: NodeId) {
        let parent = self.nodes.get(&node).and_then(|n| n.parent);
        if let Some(p) = parent.and_then(|p| self.nodes.get_mut(&p)) {
            p.children.retain(|c| *c != node);
            p.children.push(node);
        }
    }

    /// Lower a node to the bottom of its siblings
    pub fn lower_to_bottom(&mut self, node: NodeId) {
        let parent = self.nodes.get(&node).and_then(|n| n.parent);
        if let Some(p) = parent.and_then(|p| self.nodes.get_mut(&p)) {
            p.children.retain(|c| *c != node);
            p.children.insert(0, node);
        }
    }

    /// A node's parent
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(&node).and_then(|n| n.parent)
    }

    /// A node's children, bottom to top
    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.nodes
            .get(&node)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    /// Destroy a node and its whole subtree
    pub fn destroy(&mut self, node: NodeId) {
        if let Some(parent) = self.nodes.get(&node).and_then(|n| n.parent) {
            if let Some(p) = self.nodes.get_mut(&parent) {
                p.children.retain(|c| *c != node);
            }
        }
        let mut stack = vec![node];
        while let Some(id) = stack.pop() {
            if let Some(n) = self.nodes.remove(&id) {
                stack.extend(n.children);
            }
        }
    }

    /// The surface of a buffer node, if any
    pub fn surface(&self, node: NodeId) -> Option<SurfaceId> {
        match self.nodes.get(&node).map(|n| &n.kind) {
            Some(NodeKind::Buffer { surface, .. }) => Some(*surface),
            _ => None,
        }
    }

    /// Number of live nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph holds only the root
    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// Find the topmost enabled buffer node under the point
    ///
    /// `(lx, ly)` are coordinates in `from`'s space. Rect nodes do not
    /// participate. Returns the hit node and node-local coordinates.
    pub fn node_at(&self, from: NodeId, lx: f64, ly: f64) -> Option<HitResult> {
        let node = self.nodes.get(&from)?;
        if !node.enabled {
            return None;
        }
        // Topmost child wins
        for child in node.children.iter().rev() {
            let Some(c) = self.nodes.get(child) else {
                continue;
            };
            if !c.enabled {
                continue;
            }
            let cx = lx - c.x as f64;
            let cy = ly - c.y as f64;
            match c.kind {
                NodeKind::Tree => {
                    if let Some(hit) = self.node_at(*child, cx, cy) {
                        return Some(hit);
                    }
                }
                NodeKind::Buffer { width, height, .. } => {
                    if cx >= 0.0 && cy >= 0.0 && cx < width as f64 && cy < height as f64 {
                        return Some(HitResult {
                            node: *child,
                            sx: cx,
                            sy: cy,
                        });
                    }
                }
                NodeKind::Rect { .. } => {}
            }
        }
        None
    }

    /// Walk up from a node to the first ancestor (or the node itself)
    /// carrying owner metadata
    pub fn data_for(&self, node: NodeId) -> Option<NodeData> {
        let mut cur = Some(node);
        while let Some(id) = cur {
            let n = self.nodes.get(&id)?;
            if let Some(data) = n.data {
                return Some(data);
            }
            cur = n.parent;
        }
        None
    }
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_unique() {
        let id1 = NodeId::new();
        let id2 = NodeId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_create_and_destroy() {
        let mut scene = SceneGraph::new();
        let tree = scene.create_tree(scene.root());
        let buffer = scene.create_buffer(tree, SurfaceId(1), 100, 100);
        assert_eq!(scene.parent(buffer), Some(tree));
        assert_eq!(scene.len(), 3);

        scene.destroy(tree);
        assert_eq!(scene.len(), 1);
        assert_eq!(scene.parent(buffer), None);
    }

    #[test]
    fn test_reparent_moves_subtree() {
        let mut scene = SceneGraph::new();
        let a = scene.create_tree(scene.root());
        let b = scene.create_tree(scene.root());
        let buffer = scene.create_buffer(a, SurfaceId(1), 10, 10);

        scene.reparent(buffer, b);
        assert_eq!(scene.parent(buffer), Some(b));
        assert!(scene.children(a).is_empty());
        assert_eq!(scene.children(b), vec![buffer]);
    }

    #[test]
    fn test_reparent_rejects_cycle() {
        let mut scene = SceneGraph::new();
        let a = scene.create_tree(scene.root());
        let b = scene.create_tree(a);

        scene.reparent(a, b);
        assert_eq!(scene.parent(a), Some(scene.root()));
    }

    #[test]
    fn test_hit_test_topmost() {
        let mut scene = SceneGraph::new();
        let bottom = scene.create_buffer(scene.root(), SurfaceId(1), 100, 100);
        let top = scene.create_buffer(scene.root(), SurfaceId(2), 100, 100);

        let hit = scene.node_at(scene.root(), 50.0, 50.0).unwrap();
        assert_eq!(hit.node, top);

        scene.raise_to_top(bottom);
        let hit = scene.node_at(scene.root(), 50.0, 50.0).unwrap();
        assert_eq!(hit.node, bottom);
    }

    #[test]
    fn test_hit_test_disabled_subtree() {
        let mut scene = SceneGraph::new();
        let tree = scene.create_tree(scene.root());
        scene.create_buffer(tree, SurfaceId(1), 100, 100);

        assert!(scene.node_at(scene.root(), 10.0, 10.0).is_some());
        scene.set_enabled(tree, false);
        assert!(scene.node_at(scene.root(), 10.0, 10.0).is_none());
    }

    #[test]
    fn test_hit_test_position_offset() {
        let mut scene = SceneGraph::new();
        let tree = scene.create_tree(scene.root());
        scene.set_position(tree, 100, 200);
        let buffer = scene.create_buffer(tree, SurfaceId(1), 50, 50);

        assert!(scene.node_at(scene.root(), 50.0, 50.0).is_none());
        let hit = scene.node_at(scene.root(), 110.0, 220.0).unwrap();
        assert_eq!(hit.node, buffer);
        assert_eq!(hit.sx, 10.0);
        assert_eq!(hit.sy, 20.0);
    }

    #[test]
    fn test_rect_not_hit_testable() {
        let mut scene = SceneGraph::new();
        scene.create_rect(scene.root(), 100, 100);
        assert!(scene.node_at(scene.root(), 50.0, 50.0).is_none());
    }

    #[test]
    fn test_data_for_walks_ancestors() {
        let mut scene = SceneGraph::new();
        let tree = scene.create_tree(scene.root());
        scene.set_data(tree, NodeData::View(ViewId(7)));
        let inner = scene.create_tree(tree);
        let buffer = scene.create_buffer(inner, SurfaceId(1), 10, 10);

        assert_eq!(scene.data_for(buffer), Some(NodeData::View(ViewId(7))));
    }
}
