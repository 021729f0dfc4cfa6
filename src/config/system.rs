//! Engine configuration - root configuration structure.

use heapless::{FnvIndexMap, String};
use serde::Deserialize;

use super::axis::{AxisConfig, AxisKind};
use super::features::{BabystepConfig, LinearAdvanceConfig, MotionConfig, MultistepConfig};
use super::timing::TimingConfig;

/// Root configuration structure from TOML.
///
/// Axis order in the `axes` table defines the axis index used by the engine.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Timer and pulse timing.
    pub timing: TimingConfig,

    /// Named axes, in index order.
    pub axes: FnvIndexMap<String<32>, AxisConfig, 8>,

    /// Multi-stepping behaviour.
    #[serde(default)]
    pub multistep: MultistepConfig,

    /// Velocity profile selection.
    #[serde(default)]
    pub motion: MotionConfig,

    /// Linear advance.
    #[serde(default)]
    pub linear_advance: LinearAdvanceConfig,

    /// Babystepping.
    #[serde(default)]
    pub babystep: BabystepConfig,
}

impl EngineConfig {
    /// Get an axis configuration by name.
    pub fn axis(&self, name: &str) -> Option<&AxisConfig> {
        self.axes
            .iter()
            .find(|(k, _)| k.as_str() == name)
            .map(|(_, v)| v)
    }

    /// Get the index of an axis by name.
    pub fn axis_index(&self, name: &str) -> Option<usize> {
        self.axes.keys().position(|k| k.as_str() == name)
    }

    /// List all axis names in index order.
    pub fn axis_names(&self) -> impl Iterator<Item = &str> {
        self.axes.keys().map(|s| s.as_str())
    }

    /// Number of configured axes.
    #[inline]
    pub fn axis_count(&self) -> usize {
        self.axes.len()
    }

    /// Index of the extruder axis, if exactly one is configured.
    pub fn extruder_index(&self) -> Option<usize> {
        let mut found = None;
        for (index, axis) in self.axes.values().enumerate() {
            if axis.kind == AxisKind::Extruder {
                if found.is_some() {
                    return None;
                }
                found = Some(index);
            }
        }
        found
    }

    /// Add an axis programmatically (used when building configs in code).
    ///
    /// Returns the axis back if the map is full or the name is too long.
    pub fn with_axis(mut self, name: &str, axis: AxisConfig) -> core::result::Result<Self, AxisConfig> {
        let Ok(key) = String::try_from(name) else {
            return Err(axis);
        };
        match self.axes.insert(key, axis) {
            Ok(_) => Ok(self),
            Err((_, axis)) => Err(axis),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timing: TimingConfig::default(),
            axes: FnvIndexMap::new(),
            multistep: MultistepConfig::default(),
            motion: MotionConfig::default(),
            linear_advance: LinearAdvanceConfig::default(),
            babystep: BabystepConfig::default(),
        }
    }
}
