//! Mapper configuration.
//!
//! Loaded from TOML; every field has a default so a partial file (or none)
//! is valid.
//!
//! ```toml
//! resolution = 0.05
//! max_range = 2.0
//! compress_map = true
//!
//! [sensor_model]
//! hit = 0.7
//! miss = 0.4
//!
//! [noentry]
//! ground_as_noentry = true
//!
//! [classes]
//! default_pitch = 0.02
//! classes = [{ id = 41, name = "mug", pitch = 0.01 }]
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::constants::ClassId;
use crate::error::{MapError, Result};

/// Hit/miss probabilities and clamping bounds of the occupancy update.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct SensorModel {
  /// Probability assigned to a hit observation.
  pub hit: f64,
  /// Probability assigned to a miss observation.
  pub miss: f64,
  /// Lower clamping bound.
  pub min: f64,
  /// Upper clamping bound. Cells saturated at this value mark another
  /// object's territory in the no-entry derivation.
  pub max: f64,
}

impl Default for SensorModel {
  fn default() -> Self {
    Self {
      hit: 0.7,
      miss: 0.4,
      min: 0.12,
      max: 0.97,
    }
  }
}

/// Toggles for the no-entry derivation. Reconfigurable at runtime.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NoEntryRules {
  /// Cells below the ground plane (world z < 0) are no-entry.
  pub ground_as_noentry: bool,
  /// Known-free background cells are no-entry.
  pub free_as_noentry: bool,
}

/// One object class.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ClassEntry {
  pub id: ClassId,
  pub name: String,
  /// Voxel pitch used for trees of this class.
  pub pitch: f64,
}

/// Class id to name/pitch table.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClassCatalog {
  /// Pitch for classes missing from `classes`.
  pub default_pitch: f64,
  pub classes: Vec<ClassEntry>,
}

impl Default for ClassCatalog {
  fn default() -> Self {
    Self {
      default_pitch: 0.01,
      classes: Vec::new(),
    }
  }
}

impl ClassCatalog {
  pub fn get(&self, class_id: ClassId) -> Option<&ClassEntry> {
    self.classes.iter().find(|entry| entry.id == class_id)
  }

  /// Voxel pitch for a class.
  pub fn pitch_for(&self, class_id: ClassId) -> f64 {
    self.get(class_id).map_or(self.default_pitch, |entry| entry.pitch)
  }

  /// Class name, if cataloged.
  pub fn name_of(&self, class_id: ClassId) -> Option<&str> {
    self.get(class_id).map(|entry| entry.name.as_str())
  }
}

/// Mapper configuration.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct MapperConfig {
  /// Background tree pitch.
  pub resolution: f64,
  /// Insertion range; negative means unbounded.
  pub max_range: f64,
  pub sensor_model: SensorModel,
  /// Prune every tree after insertion.
  pub compress_map: bool,
  pub noentry: NoEntryRules,
  /// Use the remote render service instead of local ray casting.
  pub use_render_service: bool,
  /// Minimum IoU for a region to keep a predicted identity.
  pub association_threshold: f64,
  /// Hide isolated background voxels in marker output.
  pub filter_speckles: bool,
  /// World frame name carried on outputs.
  pub frame_id: String,
  /// Sensor frame name carried on sensor-frame grids.
  pub sensor_frame_id: String,
  /// Upper bound on pose resolution wait.
  pub pose_timeout_ms: u64,
  pub classes: ClassCatalog,
}

impl Default for MapperConfig {
  fn default() -> Self {
    Self {
      resolution: 0.05,
      max_range: -1.0,
      sensor_model: SensorModel::default(),
      compress_map: true,
      noentry: NoEntryRules::default(),
      use_render_service: false,
      association_threshold: 0.5,
      filter_speckles: false,
      frame_id: "map".to_string(),
      sensor_frame_id: "camera_color_optical_frame".to_string(),
      pose_timeout_ms: 100,
      classes: ClassCatalog::default(),
    }
  }
}

impl MapperConfig {
  /// Parse and validate a TOML document.
  pub fn from_toml_str(content: &str) -> Result<Self> {
    let config: MapperConfig = toml::from_str(content)?;
    config.validate()?;
    Ok(config)
  }

  /// Load and validate a TOML file.
  pub fn load(path: &Path) -> Result<Self> {
    let content = std::fs::read_to_string(path)?;
    Self::from_toml_str(&content)
  }

  /// Insertion range, `None` when unbounded.
  #[inline]
  pub fn range_limit(&self) -> Option<f64> {
    (self.max_range >= 0.0).then_some(self.max_range)
  }

  /// Check value ranges.
  pub fn validate(&self) -> Result<()> {
    if !(self.resolution.is_finite() && self.resolution > 0.0) {
      return Err(MapError::Config(format!(
        "resolution must be positive, got {}",
        self.resolution
      )));
    }
    let model = &self.sensor_model;
    for (name, p) in [
      ("hit", model.hit),
      ("miss", model.miss),
      ("min", model.min),
      ("max", model.max),
    ] {
      if !(p > 0.0 && p < 1.0) {
        return Err(MapError::Config(format!(
          "sensor_model.{} must be in (0, 1), got {}",
          name, p
        )));
      }
    }
    if model.min >= model.max {
      return Err(MapError::Config(format!(
        "sensor_model.min ({}) must be below sensor_model.max ({})",
        model.min, model.max
      )));
    }
    if !(model.miss < 0.5 && model.hit > 0.5) {
      return Err(MapError::Config(format!(
        "sensor_model requires miss < 0.5 < hit, got miss {} hit {}",
        model.miss, model.hit
      )));
    }
    if !(self.association_threshold > 0.0 && self.association_threshold <= 1.0) {
      return Err(MapError::Config(format!(
        "association_threshold must be in (0, 1], got {}",
        self.association_threshold
      )));
    }
    if !(self.classes.default_pitch.is_finite() && self.classes.default_pitch > 0.0) {
      return Err(MapError::Config(format!(
        "classes.default_pitch must be positive, got {}",
        self.classes.default_pitch
      )));
    }
    if let Some(entry) = self
      .classes
      .classes
      .iter()
      .find(|entry| !(entry.pitch.is_finite() && entry.pitch > 0.0))
    {
      return Err(MapError::Config(format!(
        "class {} ({}) has non-positive pitch {}",
        entry.id, entry.name, entry.pitch
      )));
    }
    Ok(())
  }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;
