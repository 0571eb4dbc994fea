//! Synthetic tabletop capture.
//!
//! Boxes stand on the z = 0 plane; a pinhole camera orbits them and every
//! pixel is ray-traced against the boxes and the plane. Each capture gets a
//! fresh shuffle of transient segment ids, as a frame-by-frame segmenter
//! would produce.

use std::collections::HashMap;
use std::time::SystemTime;

use glam::{DAffine3, DMat3, DVec3};
use instance_octomap::{
	CameraIntrinsics, LabelImage, PointCloud, Scan, BACKGROUND_ID, UNCERTAIN_ID,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::config::SceneConfig;

/// Transient ids start here so they never look like persistent ones.
const TRANSIENT_BASE: i32 = 100;

/// Farthest ground hit considered a valid return.
const MAX_DEPTH: f64 = 4.0;

pub struct Scene {
	config: SceneConfig,
	intrinsics: CameraIntrinsics,
	rng: StdRng,
}

impl Scene {
	pub fn new(config: SceneConfig) -> Self {
		let intrinsics = CameraIntrinsics {
			fx: config.width as f64 * 0.8,
			fy: config.width as f64 * 0.8,
			cx: (config.width as f64 - 1.0) / 2.0,
			cy: (config.height as f64 - 1.0) / 2.0,
		};
		let rng = StdRng::seed_from_u64(config.seed);
		Self {
			config,
			intrinsics,
			rng,
		}
	}

	pub fn len(&self) -> usize {
		self.config.scans
	}

	/// Camera pose of scan `index`, optical frame (x right, y down, z forward).
	pub fn pose(&self, index: usize) -> DAffine3 {
		let steps = self.config.scans.saturating_sub(1).max(1) as f64;
		let sweep = self.config.orbit_degrees.to_radians();
		let angle = sweep * (index as f64 / steps) - sweep / 2.0;
		let eye = DVec3::new(
			self.config.orbit_radius * angle.cos(),
			self.config.orbit_radius * angle.sin(),
			self.config.orbit_height,
		);
		look_at(eye, DVec3::new(0.0, 0.0, 0.05))
	}

	/// Render scan `index`.
	pub fn capture(&mut self, index: usize) -> Scan {
		let pose = self.pose(index);
		let rotation = pose.matrix3;
		let eye = pose.translation;
		let (width, height) = (self.config.width, self.config.height);

		let boxes: Vec<(DVec3, DVec3)> = self
			.config
			.objects
			.iter()
			.map(|object| {
				let [cx, cy] = object.center;
				let [hx, hy, hz] = object.half_extents;
				(
					DVec3::new(cx - hx, cy - hy, 0.0),
					DVec3::new(cx + hx, cy + hy, 2.0 * hz),
				)
			})
			.collect();

		let mut transient: Vec<i32> = (0..boxes.len() as i32).collect();
		transient.shuffle(&mut self.rng);
		let classes: HashMap<i32, u32> = self
			.config
			.objects
			.iter()
			.zip(&transient)
			.map(|(object, &slot)| (TRANSIENT_BASE + slot, object.class_id))
			.collect();

		let mut cloud = PointCloud::invalid(width, height);
		let mut labels = LabelImage::unlabeled(width, height);
		for row in 0..height {
			for col in 0..width {
				let ray = self.intrinsics.back_project(row, col);
				let direction = rotation * ray;

				let mut nearest: Option<(f64, i32)> = ground_hit(eye, direction)
					.filter(|&depth| depth < MAX_DEPTH)
					.map(|depth| (depth, BACKGROUND_ID));
				for (index, (min, max)) in boxes.iter().enumerate() {
					if let Some(depth) = box_hit(eye, direction, *min, *max) {
						if nearest.map_or(true, |(best, _)| depth < best) {
							nearest = Some((depth, TRANSIENT_BASE + transient[index]));
						}
					}
				}

				let Some((depth, label)) = nearest else {
					labels.set(row, col, UNCERTAIN_ID);
					continue;
				};
				let noise = self.config.depth_noise;
				let depth = depth + self.rng.random_range(-noise..=noise);
				cloud.set(row, col, ray * depth);
				labels.set(row, col, label);
			}
		}

		Scan {
			stamp: SystemTime::now(),
			sensor_to_world: pose,
			intrinsics: self.intrinsics,
			cloud,
			labels,
			classes,
		}
	}
}

/// Optical-frame pose at `eye` looking at `target`, world z up.
fn look_at(eye: DVec3, target: DVec3) -> DAffine3 {
	let forward = (target - eye).normalize();
	let right = forward.cross(DVec3::Z).normalize();
	let down = forward.cross(right);
	DAffine3::from_mat3_translation(DMat3::from_cols(right, down, forward), eye)
}

/// Ray parameter of the z = 0 plane, if in front of the camera.
fn ground_hit(origin: DVec3, direction: DVec3) -> Option<f64> {
	(direction.z < 0.0).then(|| -origin.z / direction.z)
}

/// Entry parameter of a slab test against `[min, max]`.
fn box_hit(origin: DVec3, direction: DVec3, min: DVec3, max: DVec3) -> Option<f64> {
	let inverse = direction.recip();
	let t0 = (min - origin) * inverse;
	let t1 = (max - origin) * inverse;
	let near = t0.min(t1).max_element();
	let far = t0.max(t1).min_element();
	(near <= far && near > 0.0).then_some(near)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_look_at_points_forward() {
		let pose = look_at(DVec3::new(1.0, 0.0, 1.0), DVec3::ZERO);
		let forward = pose.transform_vector3(DVec3::Z);
		assert!((forward - DVec3::new(-1.0, 0.0, -1.0).normalize()).length() < 1e-12);
		// Image "down" points towards the ground.
		assert!(pose.transform_vector3(DVec3::Y).z < 0.0);
	}

	#[test]
	fn test_box_hit() {
		let hit = box_hit(
			DVec3::new(0.0, 0.0, 2.0),
			DVec3::NEG_Z,
			DVec3::splat(-0.5),
			DVec3::splat(0.5),
		);
		assert_eq!(hit, Some(1.5));
		assert_eq!(
			box_hit(DVec3::new(2.0, 0.0, 2.0), DVec3::NEG_Z, DVec3::splat(-0.5), DVec3::splat(0.5)),
			None
		);
	}

	#[test]
	fn test_capture_sees_objects_and_table() {
		let config = SceneConfig {
			depth_noise: 0.0,
			..Default::default()
		};
		let objects = config.objects.len();
		let mut scene = Scene::new(config);
		let scan = scene.capture(0);

		assert_eq!(scan.classes.len(), objects);
		assert!(scan.labels.data.contains(&BACKGROUND_ID));
		let seen: std::collections::HashSet<i32> = scan
			.labels
			.data
			.iter()
			.copied()
			.filter(|&label| label >= TRANSIENT_BASE)
			.collect();
		assert!(!seen.is_empty());
		assert!(seen.iter().all(|label| scan.classes.contains_key(label)));

		// Ground points land on z = 0 in the world.
		let row = scan.labels.height - 1;
		let col = scan.labels.width / 2;
		assert_eq!(scan.labels.get(row, col), BACKGROUND_ID);
		let world = scan.sensor_to_world.transform_point3(scan.cloud.get(row, col));
		assert!(world.z.abs() < 1e-9);
	}
}
