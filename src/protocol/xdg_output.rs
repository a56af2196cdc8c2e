//! xdg-output protocol implementation
//!
//! Exposes each output's logical geometry: its position in the layout and
//! its mode size divided by scale.

use crate::compositor::{OutputId, Root};

/// Logical geometry event data for one output
#[derive(Debug, Clone, PartialEq)]
pub struct XdgOutputEvent {
    pub logical_x: i32,
    pub logical_y: i32,
    pub logical_width: i32,
    pub logical_height: i32,
    pub name: String,
    pub description: String,
}

/// Build the xdg-output event burst for an output
pub fn describe(root: &Root, id: OutputId) -> Option<XdgOutputEvent> {
    let output = root.outputs.get(id)?;
    let (x, y) = root.output_layout.position(id).unwrap_or(output.position);
    let (width, height) = output.logical_size();
    Some(XdgOutputEvent {
        logical_x: x,
        logical_y: y,
        logical_width: width,
        logical_height: height,
        name: output.name.clone(),
        description: format!("{} {}", output.make, output.model),
    })
}
