//! Layer surfaces
//!
//! Data model and arrangement for wlr-layer-shell surfaces: panels, bars,
//! wallpapers, and overlays attached to a specific output. The protocol
//! state machine itself lives with the per-surface shell handling; the core
//! only needs each surface's placement inputs and the usable area that is
//! left for views after exclusive zones are reserved.

use std::sync::atomic::{AtomicU64, Ordering};

use log::debug;

use crate::compositor::SurfaceId;
use crate::scene::{NodeId, Rect, SceneGraph};

/// Unique identifier for layer surfaces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayerSurfaceId(pub u64);

impl LayerSurfaceId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        LayerSurfaceId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Layer shell layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Layer {
    /// Background layer (below everything)
    Background,
    /// Bottom layer (below views)
    #[default]
    Bottom,
    /// Top layer (above views)
    Top,
    /// Overlay layer (above everything)
    Overlay,
}

impl Layer {
    /// Create from protocol value
    pub fn from_protocol(value: u32) -> Option<Self> {
        match value {
            0 => Some(Layer::Background),
            1 => Some(Layer::Bottom),
            2 => Some(Layer::Top),
            3 => Some(Layer::Overlay),
            _ => None,
        }
    }

    /// Convert to protocol value
    pub fn to_protocol(&self) -> u32 {
        match self {
            Layer::Background => 0,
            Layer::Bottom => 1,
            Layer::Top => 2,
            Layer::Overlay => 3,
        }
    }
}

// Edge anchoring for layer surfaces
bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Anchor: u32 {
        const TOP = 1;
        const BOTTOM = 2;
        const LEFT = 4;
        const RIGHT = 8;
    }
}

/// A layer shell surface bound to an output
#[derive(Debug)]
pub struct LayerSurface {
    /// Unique identifier
    pub id: LayerSurfaceId,
    /// Associated wl_surface
    pub surface_id: SurfaceId,
    /// Layer
    pub layer: Layer,
    /// Namespace (application identifier)
    pub namespace: String,
    /// Desired size (0 = use anchor constraints)
    pub size: (u32, u32),
    /// Anchor edges
    pub anchor: Anchor,
    /// Exclusive zone (pixels to reserve along the anchored edge)
    pub exclusive_zone: i32,
    /// Margin from edges: top, right, bottom, left
    pub margin: (i32, i32, i32, i32),
    /// Scene node carrying the surface, under the output's layer subtree
    pub node: NodeId,
    /// Geometry assigned by the last arrangement
    pub geometry: Rect,
}

impl LayerSurface {
    /// Create a layer surface whose scene node lives under `layer_tree`
    pub fn new(
        scene: &mut SceneGraph,
        layer_tree: NodeId,
        layer: Layer,
        namespace: String,
    ) -> Self {
        let id = LayerSurfaceId::new();
        let surface_id = SurfaceId(id.0);
        let node = scene.create_buffer(layer_tree, surface_id, 0, 0);
        scene.set_data(node, crate::scene::NodeData::LayerSurface(id));
        debug!("Created layer surface {:?} ({})", id, namespace);
        Self {
            id,
            surface_id,
            layer,
            namespace,
            size: (0, 0),
            anchor: Anchor::empty(),
            exclusive_zone: 0,
            margin: (0, 0, 0, 0),
            node,
            geometry: Rect::default(),
        }
    }

    /// Calculate the surface's geometry within the given area
    pub fn calculate_geometry(&self, area: Rect) -> Rect {
        let (mut width, mut height) = (self.size.0 as i32, self.size.1 as i32);
        let (margin_top, margin_right, margin_bottom, margin_left) = self.margin;

        // Anchored to opposite edges with size 0 stretches to fill
        if self.anchor.contains(Anchor::LEFT | Anchor::RIGHT) && width == 0 {
            width = area.width - margin_left - margin_right;
        }
        if self.anchor.contains(Anchor::TOP | Anchor::BOTTOM) && height == 0 {
            height = area.height - margin_top - margin_bottom;
        }

        let x = if self.anchor.contains(Anchor::LEFT) {
            area.x + margin_left
        } else if self.anchor.contains(Anchor::RIGHT) {
            area.x + area.width - width - margin_right
        } else {
            area.x + (area.width - width) / 2
        };

        let y = if self.anchor.contains(Anchor::TOP) {
            area.y + margin_top
        } else if self.anchor.contains(Anchor::BOTTOM) {
            area.y + area.height - height - margin_bottom
        } else {
            area.y + (area.height - height) / 2
        };

        Rect::new(x, y, width.max(0), height.max(0))
    }

    /// Shrink `usable` by this surface's exclusive zone, if it claims one
    fn apply_exclusive(&self, usable: &mut Rect) {
        if self.exclusive_zone <= 0 {
            return;
        }
        let zone = self.exclusive_zone;
        if self.anchor.contains(Anchor::TOP) && !self.anchor.contains(Anchor::BOTTOM) {
            usable.y += zone;
            usable.height -= zone;
        } else if self.anchor.contains(Anchor::BOTTOM) && !self.anchor.contains(Anchor::TOP) {
            usable.height -= zone;
        } else if self.anchor.contains(Anchor::LEFT) && !self.anchor.contains(Anchor::RIGHT) {
            usable.x += zone;
            usable.width -= zone;
        } else if self.anchor.contains(Anchor::RIGHT) && !self.anchor.contains(Anchor::LEFT) {
            usable.width -= zone;
        }
        usable.width = usable.width.max(0);
        usable.height = usable.height.max(0);
    }
}

/// Arrange an output's layer surfaces and compute the remaining usable area
///
/// Surfaces are placed overlay first, background last. A surface claiming an
/// exclusive zone is placed against the full output and shrinks the usable
/// area; others are placed within what remains. Each surface's scene node is
/// positioned to match.
pub fn arrange(
    surfaces: &mut [LayerSurface],
    output_size: (i32, i32),
    scene: &mut SceneGraph,
) -> Rect {
    let full = Rect::new(0, 0, output_size.0, output_size.1);
    let mut usable = full;

    for layer in [Layer::Overlay, Layer::Top, Layer::Bottom, Layer::Background] {
        for surface in surfaces.iter_mut().filter(|s| s.layer == layer) {
            let area = if surface.exclusive_zone > 0 { full } else { usable };
            let geo = surface.calculate_geometry(area);
            surface.geometry = geo;
            scene.set_position(surface.node, geo.x, geo.y);
            scene.set_buffer_size(surface.node, geo.width, geo.height);
            surface.apply_exclusive(&mut usable);
        }
    }

    usable
}

#[cfg(test)]
mod tests {
    use super::*;

    fn panel(scene: &mut SceneGraph, tree: NodeId, layer: Layer) -> LayerSurface {
        LayerSurface::new(scene, tree, layer, "panel".to_string())
    }

    #[test]
    fn test_layer_protocol_values() {
        assert_eq!(Layer::from_protocol(0), Some(Layer::Background));
        assert_eq!(Layer::from_protocol(9), None);
        assert_eq!(Layer::Top.to_protocol(), 2);
    }

    #[test]
    fn test_top_panel_geometry() {
        let mut scene = SceneGraph::new();
        let tree = scene.create_tree(scene.root());
        let mut surface = panel(&mut scene, tree, Layer::Top);
        surface.anchor = Anchor::TOP | Anchor::LEFT | Anchor::RIGHT;
        surface.size = (0, 50);

        let geo = surface.calculate_geometry(Rect::new(0, 0, 1920, 1080));
        assert_eq!(geo, Rect::new(0, 0, 1920, 50));
    }

    #[test]
    fn test_arrange_reserves_exclusive_zone() {
        let mut scene = SceneGraph::new();
        let tree = scene.create_tree(scene.root());
        let mut bar = panel(&mut scene, tree, Layer::Top);
        bar.anchor = Anchor::TOP | Anchor::LEFT | Anchor::RIGHT;
        bar.size = (0, 30);
        bar.exclusive_zone = 30;

        let mut surfaces = vec![bar];
        let usable = arrange(&mut surfaces, (1920, 1080), &mut scene);
        assert_eq!(usable, Rect::new(0, 30, 1920, 1050));
        assert_eq!(surfaces[0].geometry.height, 30);
        assert_eq!(scene.position(surfaces[0].node), (0, 0));
    }

    #[test]
    fn test_arrange_without_exclusive_keeps_full_area() {
        let mut scene = SceneGraph::new();
        let tree = scene.create_tree(scene.root());
        let mut wallpaper = panel(&mut scene, tree, Layer::Background);
        wallpaper.anchor = Anchor::all();

        let mut surfaces = vec![wallpaper];
        let usable = arrange(&mut surfaces, (800, 600), &mut scene);
        assert_eq!(usable, Rect::new(0, 0, 800, 600));
        assert_eq!(surfaces[0].geometry, Rect::new(0, 0, 800, 600));
    }
}
