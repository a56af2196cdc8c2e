//! Output layout
//!
//! Geometric arrangement of outputs in the shared layout coordinate space,
//! plus the layout-demand bookkeeping the transaction engine uses to wait on
//! per-output layout generators.
//!
//! Layout mutations raise a change flag that the root turns into a fresh
//! output-configuration publication. While the configuration protocol itself
//! is editing the layout the flag is suppressed, otherwise every applied
//! head would recursively republish.

use std::collections::HashMap;

use log::debug;

use crate::compositor::OutputId;

/// An outstanding request to an output's layout generator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutDemand {
    /// Number of tileable views geometry was requested for
    pub view_count: usize,
}

#[derive(Debug, Clone, Copy)]
struct LayoutEntry {
    x: i32,
    y: i32,
    width: i32,
    height: i32,
}

/// Placement of outputs in layout coordinates
#[derive(Debug, Default)]
pub struct OutputLayout {
    entries: HashMap<OutputId, LayoutEntry>,
    changed: bool,
    suppressed: bool,
}

impl OutputLayout {
    /// Create an empty layout
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the output is in the layout
    pub fn contains(&self, id: OutputId) -> bool {
        self.entries.contains_key(&id)
    }

    /// An output's assigned position
    pub fn position(&self, id: OutputId) -> Option<(i32, i32)> {
        self.entries.get(&id).map(|e| (e.x, e.y))
    }

    /// Add an output left-to-right: directly right of the rightmost edge
    ///
    /// Returns the assigned position.
    pub fn add_auto(&mut self, id: OutputId, width: i32, height: i32) -> (i32, i32) {
        let x = self
            .entries
            .values()
            .map(|e| e.x + e.width)
            .max()
            .unwrap_or(0);
        self.entries.insert(
            id,
            LayoutEntry {
                x,
                y: 0,
                width,
                height,
            },
        );
        self.mark_changed();
        debug!("Output {:?} auto-placed at ({}, 0)", id, x);
        (x, 0)
    }

    /// Add or move an output at an explicit position
    pub fn upsert(&mut self, id: OutputId, x: i32, y: i32, width: i32, height: i32) {
        self.entries.insert(
            id,
            LayoutEntry {
                x,
                y,
                width,
                height,
            },
        );
        self.mark_changed();
    }

    /// Drop an output from the layout
    pub fn remove(&mut self, id: OutputId) {
        if self.entries.remove(&id).is_some() {
            self.mark_changed();
        }
    }

    /// Number of outputs in the layout
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the layout is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn mark_changed(&mut self) {
        if !self.suppressed {
            self.changed = true;
        }
    }

    /// Consume the change flag
    pub fn take_changed(&mut self) -> bool {
        std::mem::take(&mut self.changed)
    }

    /// Detach the change listener for a programmatic edit
    pub fn suppress_changes(&mut self) {
        self.suppressed = true;
    }

    /// Reattach the change listener
    pub fn resume_changes(&mut self) {
        self.suppressed = false;
    }

    /// Whether change handling is currently detached
    pub fn changes_suppressed(&self) -> bool {
        self.suppressed
    }
}
