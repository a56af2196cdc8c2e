//! Output configuration
//!
//! Socket-free logic for the output-management protocol: clients propose a
//! configuration of heads and either test it (never mutates) or apply it.
//! Application may take partial effect: heads that commit stay committed
//! even when a later head fails, and the requester is told `Failed` for the
//! configuration as a whole.
//!
//! While a configuration is being applied the layout's change handling is
//! detached; every head edit would otherwise recursively republish the
//! configuration.

use anyhow::{bail, Context};
use log::{debug, error};

use crate::compositor::{
    OutputId, OutputMode, OutputTransform, ProposedOutputState, Root,
};

/// One head of a proposed output configuration
#[derive(Debug, Clone, Copy)]
pub struct HeadConfig {
    pub output: OutputId,
    pub state: ProposedOutputState,
}

/// The verdict reported back to the requester
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigResult {
    Succeeded,
    Failed,
}

/// Test a proposed configuration without mutating anything
///
/// Any rejected head fails the whole test.
pub fn test(root: &Root, heads: &[HeadConfig]) -> ConfigResult {
    for head in heads {
        let Some(output) = root.outputs.get(head.output) else {
            return ConfigResult::Failed;
        };
        if !output.test_state(&head.state) {
            return ConfigResult::Failed;
        }
    }
    ConfigResult::Succeeded
}

/// Apply a proposed configuration
///
/// Heads are committed one at a time; an accepted, enabled head is placed in
/// the layout and activated, an accepted, disabled head is deactivated and
/// dropped from the layout. A rejected head flips the result to `Failed`
/// without undoing the others.
pub fn apply(root: &mut Root, heads: &[HeadConfig]) -> ConfigResult {
    root.output_layout.suppress_changes();
    let mut failed = false;

    for head in heads {
        let id = head.output;
        let committed = match root.outputs.get_mut(id) {
            None => {
                error!("Configuration names unknown output {:?}", id);
                failed = true;
                continue;
            }
            Some(output) => output.commit_state(&head.state),
        };
        match committed {
            Err(err) => {
                error!("Output commit failed: {}", err);
                failed = true;
            }
            Ok(()) if head.state.enabled => {
                // No-op if the head was already active
                root.add_output(id);
                let dims = root.outputs.get(id).map(|o| o.dims()).unwrap_or((0, 0));
                if let Some((x, y)) = head.state.position {
                    root.output_layout.upsert(id, x, y, dims.0, dims.1);
                    if let Some(output) = root.outputs.get_mut(id) {
                        output.position = (x, y);
                    }
                }
                if let Some(output) = root.outputs.get_mut(id) {
                    let tree = output.tree;
                    let (x, y) = output.position;
                    root.scene.set_enabled(tree, true);
                    root.scene.set_position(tree, x, y);
                    output.update_background_rect(&mut root.scene);
                    output.arrange_layers(&mut root.scene);
                }
                debug!("Applied head for output {:?}", id);
            }
            Ok(()) => {
                root.remove_output(id);
                root.output_layout.remove(id);
                if let Some(output) = root.outputs.get(id) {
                    let tree = output.tree;
                    root.scene.set_enabled(tree, false);
                }
                debug!("Disabled output {:?}", id);
            }
        }
    }

    root.output_layout.resume_changes();
    root.apply_pending();

    if failed {
        ConfigResult::Failed
    } else {
        ConfigResult::Succeeded
    }
}

/// The state of one head as published to configuration clients
#[derive(Debug, Clone)]
pub struct HeadState {
    pub output: OutputId,
    pub name: String,
    pub make: String,
    pub model: String,
    pub enabled: bool,
    pub modes: Vec<OutputMode>,
    pub current_mode: Option<usize>,
    pub position: (i32, i32),
    pub transform: OutputTransform,
    pub scale: f64,
    pub adaptive_sync: bool,
}

/// Build the publication snapshot of every advertised output
///
/// Fails (and the caller skips the publication) when an enabled output has
/// no current mode to report.
pub fn snapshot(root: &Root) -> anyhow::Result<Vec<HeadState>> {
    let mut heads = Vec::with_capacity(root.outputs.all().len());
    for &id in root.outputs.all() {
        let output = root
            .outputs
            .get(id)
            .with_context(|| format!("output {:?} missing from registry", id))?;
        if output.enabled && output.mode().is_none() {
            bail!("output {} is enabled but has no mode", output.name);
        }
        heads.push(HeadState {
            output: id,
            name: output.name.clone(),
            make: output.make.clone(),
            model: output.model.clone(),
            enabled: output.enabled,
            modes: output.modes.clone(),
            current_mode: output.current_mode,
            position: root
                .output_layout
                .position(id)
                .unwrap_or(output.position),
            transform: output.transform,
            scale: output.scale,
            adaptive_sync: output.adaptive_sync,
        });
    }
    Ok(heads)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_mode() -> OutputMode {
        OutputMode {
            width: 1920,
            height: 1080,
            refresh: 60000,
            preferred: true,
        }
    }

    fn root_with_outputs(count: usize) -> (Root, Vec<OutputId>) {
        let mut root = Root::new();
        let mut ids = Vec::new();
        for i in 0..count {
            let id = root
                .create_output(&format!("HEADLESS-{}", i + 1), test_mode())
                .unwrap();
            root.add_output(id);
            ids.push(id);
        }
        (root, ids)
    }

    fn enabled_head(output: OutputId) -> HeadConfig {
        HeadConfig {
            output,
            state: ProposedOutputState {
                enabled: true,
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_test_rejects_bad_head() {
        let (root, ids) = root_with_outputs(1);
        assert_eq!(test(&root, &[enabled_head(ids[0])]), ConfigResult::Succeeded);

        let mut bad = enabled_head(ids[0]);
        bad.state.custom_mode = Some((0, 0, 0));
        assert_eq!(test(&root, &[bad]), ConfigResult::Failed);
        // Test never mutates
        assert_eq!(root.outputs.get(ids[0]).unwrap().dims(), (1920, 1080));
    }

    #[test]
    fn test_apply_moves_head() {
        let (mut root, ids) = root_with_outputs(1);
        let mut head = enabled_head(ids[0]);
        head.state.position = Some((500, 200));

        assert_eq!(apply(&mut root, &[head]), ConfigResult::Succeeded);
        assert_eq!(root.output_layout.position(ids[0]), Some((500, 200)));
        assert_eq!(root.outputs.get(ids[0]).unwrap().position, (500, 200));
    }

    #[test]
    fn test_apply_disable_removes_output() {
        let (mut root, ids) = root_with_outputs(2);
        let head = HeadConfig {
            output: ids[1],
            state: ProposedOutputState::default(),
        };

        assert_eq!(apply(&mut root, &[head]), ConfigResult::Succeeded);
        assert!(!root.outputs.is_active(ids[1]));
        assert!(!root.output_layout.contains(ids[1]));
        // Still advertised, just inactive
        assert_eq!(root.outputs.all().len(), 2);
    }

    #[test]
    fn test_apply_partial_failure() {
        let (mut root, ids) = root_with_outputs(2);
        let mut good = enabled_head(ids[0]);
        good.state.position = Some((100, 100));
        let mut bad = enabled_head(ids[1]);
        bad.state.custom_mode = Some((-1, 0, 0));

        assert_eq!(apply(&mut root, &[good, bad]), ConfigResult::Failed);
        // The accepted head stays applied
        assert_eq!(root.output_layout.position(ids[0]), Some((100, 100)));
        // The rejected head is untouched
        assert_eq!(root.outputs.get(ids[1]).unwrap().dims(), (1920, 1080));
        assert!(root.outputs.is_active(ids[1]));
    }

    #[test]
    fn test_apply_does_not_republish_during_edit() {
        let (mut root, ids) = root_with_outputs(1);
        root.take_config_dirty();

        let mut head = enabled_head(ids[0]);
        head.state.position = Some((10, 10));
        apply(&mut root, &[head]);
        // The layout edit above must not have raised the change flag
        root.handle_layout_change();
        assert!(!root.take_config_dirty());
    }

    #[test]
    fn test_snapshot_reports_layout_positions() {
        let (root, ids) = root_with_outputs(2);
        let heads = snapshot(&root).unwrap();
        assert_eq!(heads.len(), 2);
        assert_eq!(heads[0].position, (0, 0));
        assert_eq!(heads[1].position, (1920, 0));
        assert!(heads.iter().all(|h| h.enabled));
        assert_eq!(heads[0].output, ids[0]);
    }
}
