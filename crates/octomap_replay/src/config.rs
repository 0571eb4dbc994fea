//! Configuration parsing for scene replay.

use anyhow::{Context, Result};
use instance_octomap::{ClassEntry, MapperConfig};
use serde::Deserialize;
use std::path::Path;

/// Root configuration: the mapper plus the synthetic scene.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
	/// Mapper settings, same keys as a standalone mapper config.
	pub mapper: MapperConfig,
	pub scene: SceneConfig,
}

/// Synthetic tabletop scene seen by an orbiting camera.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
	/// Image width in pixels.
	pub width: usize,
	/// Image height in pixels.
	pub height: usize,
	/// Number of scans along the orbit.
	pub scans: usize,
	/// Orbit radius around the table center.
	pub orbit_radius: f64,
	/// Camera height above the table.
	pub orbit_height: f64,
	/// Total orbit angle in degrees.
	pub orbit_degrees: f64,
	/// Uniform depth noise amplitude in meters.
	pub depth_noise: f64,
	/// Seed for noise and transient id shuffling.
	pub seed: u64,
	/// Objects standing on the table (z = 0).
	pub objects: Vec<ObjectConfig>,
}

/// One box-shaped object.
#[derive(Debug, Clone, Deserialize)]
pub struct ObjectConfig {
	pub class_id: u32,
	/// Footprint center on the table.
	pub center: [f64; 2],
	/// Half extents along x, y and z.
	pub half_extents: [f64; 3],
}

impl Default for Config {
	fn default() -> Self {
		let mut mapper = MapperConfig::default();
		mapper.classes.classes = [(2, "bottle", 0.01), (5, "box", 0.01), (11, "can", 0.005)]
			.into_iter()
			.map(|(id, name, pitch)| ClassEntry {
				id,
				name: name.to_string(),
				pitch,
			})
			.collect();
		Self {
			mapper,
			scene: SceneConfig::default(),
		}
	}
}

impl Default for SceneConfig {
	fn default() -> Self {
		Self {
			width: 160,
			height: 120,
			scans: 12,
			orbit_radius: 0.8,
			orbit_height: 0.6,
			orbit_degrees: 90.0,
			depth_noise: 0.002,
			seed: 7,
			objects: vec![
				ObjectConfig {
					class_id: 2,
					center: [0.0, 0.0],
					half_extents: [0.04, 0.04, 0.06],
				},
				ObjectConfig {
					class_id: 5,
					center: [0.15, 0.1],
					half_extents: [0.05, 0.03, 0.04],
				},
				ObjectConfig {
					class_id: 11,
					center: [-0.12, 0.12],
					half_extents: [0.03, 0.03, 0.09],
				},
			],
		}
	}
}

impl Config {
	/// Load configuration from a TOML file.
	pub fn load(path: &Path) -> Result<Self> {
		let content = std::fs::read_to_string(path)
			.with_context(|| format!("Failed to read config file: {}", path.display()))?;
		let config: Config =
			toml::from_str(&content).with_context(|| "Failed to parse config TOML")?;
		config.validate()?;
		Ok(config)
	}

	pub fn validate(&self) -> Result<()> {
		self.mapper.validate().context("Invalid mapper config")?;
		let scene = &self.scene;
		if scene.width < 2 || scene.height < 2 {
			anyhow::bail!(
				"scene image must be at least 2x2, got {}x{}",
				scene.width,
				scene.height
			);
		}
		if scene.scans == 0 {
			anyhow::bail!("scene.scans must be positive");
		}
		if scene.orbit_radius <= 0.0 {
			anyhow::bail!("scene.orbit_radius must be positive, got {}", scene.orbit_radius);
		}
		for (index, object) in scene.objects.iter().enumerate() {
			if object.half_extents.iter().any(|&extent| extent <= 0.0) {
				anyhow::bail!("object {} has a non-positive half extent", index);
			}
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_partial_config_keeps_defaults() {
		let config: Config = toml::from_str(
			r#"
			[mapper]
			resolution = 0.02

			[scene]
			scans = 3
			"#,
		)
		.unwrap();
		assert_eq!(config.mapper.resolution, 0.02);
		assert_eq!(config.scene.scans, 3);
		assert_eq!(config.scene.objects.len(), 3);
		assert!(config.validate().is_ok());
	}

	#[test]
	fn test_default_catalog_names_scene_objects() {
		let config = Config::default();
		for object in &config.scene.objects {
			assert!(config.mapper.classes.name_of(object.class_id).is_some());
		}
	}

	#[test]
	fn test_rejects_empty_replay() {
		let mut config = Config::default();
		config.scene.scans = 0;
		assert!(config.validate().is_err());
	}
}
