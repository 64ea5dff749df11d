//! Heuristics deciding where a draw operation should execute.
//!
//! These are performance gates, not correctness requirements: a wrong
//! answer costs speed, never pixels. They are re-evaluated on every call
//! because their inputs (area, batch depth) change every call.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::batch::OpKind;
use crate::caps::{CAP_BLEND, CAP_PIXELBUFFER};

/// Tunable thresholds for the decision functions. Loadable from JSON so a
/// host can ship per-device tuning files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Pixel area above which an operation goes to the pixel buffer
    #[serde(default = "default_min_pixel_buffer_area")]
    pub min_pixel_buffer_area: i64,

    /// Batch depth beyond which buffer setup amortizes over many draws
    #[serde(default = "default_batch_depth_threshold")]
    pub batch_depth_threshold: usize,

    /// Widget pixel area above which the draw dispatch enables optimization
    #[serde(default = "default_widget_area_threshold")]
    pub widget_area_threshold: i64,

    /// Child-object count marking a widget as complex
    #[serde(default = "default_widget_child_threshold")]
    pub widget_child_threshold: usize,

    /// Batched-op count from the previous pass marking a widget as busy
    #[serde(default = "default_widget_batched_ops_threshold")]
    pub widget_batched_ops_threshold: usize,
}

fn default_min_pixel_buffer_area() -> i64 {
    1000
}

fn default_batch_depth_threshold() -> usize {
    3
}

fn default_widget_area_threshold() -> i64 {
    2000
}

fn default_widget_child_threshold() -> usize {
    5
}

fn default_widget_batched_ops_threshold() -> usize {
    8
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            min_pixel_buffer_area: default_min_pixel_buffer_area(),
            batch_depth_threshold: default_batch_depth_threshold(),
            widget_area_threshold: default_widget_area_threshold(),
            widget_child_threshold: default_widget_child_threshold(),
            widget_batched_ops_threshold: default_widget_batched_ops_threshold(),
        }
    }
}

impl PolicyConfig {
    /// Save config to a JSON file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), String> {
        let json = serde_json::to_string_pretty(self).map_err(|e| e.to_string())?;
        fs::write(path, json).map_err(|e| e.to_string())
    }

    /// Load config from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, String> {
        let json = fs::read_to_string(path).map_err(|e| e.to_string())?;
        serde_json::from_str(&json).map_err(|e| e.to_string())
    }
}

/// Should this operation go through the pixel buffer?
///
/// First match wins: no capability → never; big area → yes; gradient →
/// always (never worth doing scalar); deep batch → yes (amortize the
/// buffer setup); blend with accelerated blending → yes; otherwise no.
pub fn should_use_pixel_buffer(
    caps: u32,
    config: &PolicyConfig,
    kind: OpKind,
    area: i64,
    batch_depth: usize,
) -> bool {
    if caps & CAP_PIXELBUFFER == 0 {
        return false;
    }
    if area > config.min_pixel_buffer_area {
        return true;
    }
    if kind == OpKind::Gradient {
        return true;
    }
    if batch_depth > config.batch_depth_threshold {
        return true;
    }
    if kind == OpKind::Blend && caps & CAP_BLEND != 0 {
        return true;
    }
    false
}

/// What the widget draw dispatch knows about a widget when deciding
/// whether to bracket its draw with the optimization layer. Plain data:
/// the widget layer itself lives outside this crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct WidgetProfile {
    /// Widget pixel area (width x height)
    pub area: i64,
    /// Number of child objects
    pub child_count: usize,
    /// Batched operations recorded for this widget on the previous pass
    pub last_pass_batched_ops: usize,
    /// Widget uses a non-trivial frame decoration
    pub decorated_frame: bool,
}

/// Heuristic gate for enabling optimization around a widget's draw.
/// False negatives only cost performance, never correctness.
pub fn should_optimize_widget(config: &PolicyConfig, profile: &WidgetProfile) -> bool {
    profile.area > config.widget_area_threshold
        || profile.child_count > config.widget_child_threshold
        || profile.last_pass_batched_ops > config.widget_batched_ops_threshold
        || profile.decorated_frame
}
