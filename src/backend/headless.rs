//! Headless output source
//!
//! Advertises virtual outputs so the compositor runs without display
//! hardware. Each descriptor becomes a real output; a descriptor whose mode
//! cannot back a renderer fails initialization and is dropped.

use crate::compositor::OutputMode;

/// Description of an output the backend advertises
#[derive(Debug, Clone)]
pub struct OutputDescriptor {
    pub name: String,
    pub make: String,
    pub model: String,
    pub mode: OutputMode,
}

/// Build `count` virtual 1920x1080@60 outputs
pub fn virtual_outputs(count: usize) -> Vec<OutputDescriptor> {
    (0..count)
        .map(|i| OutputDescriptor {
            name: format!("HEADLESS-{}", i + 1),
            make: "Waytile".to_string(),
            model: "Virtual Display".to_string(),
            mode: OutputMode {
                width: 1920,
                height: 1080,
                refresh: 60000,
                preferred: true,
            },
        })
        .collect()
}
