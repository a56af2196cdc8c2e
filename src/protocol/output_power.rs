//! Output power management
//!
//! Implements the power-management verb: turning a head on or off. Power
//! changes ride the same apply path as the configuration protocol so
//! enabling an output hands it views and disabling one evacuates them.

use log::info;

use crate::compositor::{OutputId, ProposedOutputState, Root};
use crate::protocol::output_config::{self, ConfigResult, HeadConfig};

/// Power state of an output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerMode {
    Off,
    On,
}

impl PowerMode {
    /// Create from protocol value
    pub fn from_protocol(value: u32) -> Option<Self> {
        match value {
            0 => Some(PowerMode::Off),
            1 => Some(PowerMode::On),
            _ => None,
        }
    }

    /// Convert to protocol value
    pub fn to_protocol(&self) -> u32 {
        match self {
            PowerMode::Off => 0,
            PowerMode::On => 1,
        }
    }
}

/// The power mode an output currently reports
pub fn mode(root: &Root, output: OutputId) -> Option<PowerMode> {
    root.outputs.get(output).map(|o| {
        if o.enabled {
            PowerMode::On
        } else {
            PowerMode::Off
        }
    })
}

/// Set an output's power mode
pub fn set_mode(root: &mut Root, output: OutputId, mode: PowerMode) -> ConfigResult {
    info!("Power mode {:?} for output {:?}", mode, output);
    let head = HeadConfig {
        output,
        state: ProposedOutputState {
            enabled: mode == PowerMode::On,
            ..Default::default()
        },
    };
    output_config::apply(root, &[head])
}
