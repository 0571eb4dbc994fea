//! Voxel ray traversal (3D DDA) over a VoxelOctree.
//!
//! # Algorithm
//!
//! Amanatides-Woo stepping: for each axis track the ray parameter `t` at
//! which the next voxel border is crossed, always step along the axis with
//! the smallest one.
//!
//! ```text
//!  origin ──► ░ ░ ░ ░ ░ ▓   ray_keys: every ░ (origin voxel included,
//!                             end voxel ▓ excluded)
//!  origin ──► · · · █        cast_ray: first known-occupied █, unknown
//!                             voxels are skipped
//! ```

use glam::DVec3;
use smallvec::SmallVec;

use super::key::{KeyCoder, VoxelKey};
use super::tree::VoxelOctree;

/// Keys traversed by one ray. Most rays stay within a few dozen voxels.
pub type KeyRay = SmallVec<[VoxelKey; 64]>;

/// DDA stepping state.
struct Traversal {
  key: VoxelKey,
  step: [i32; 3],
  t_max: [f64; 3],
  t_delta: [f64; 3],
}

impl Traversal {
  /// `direction` must be normalized.
  fn new(coder: &KeyCoder, origin: DVec3, direction: DVec3, key: VoxelKey) -> Self {
    let pitch = coder.pitch();
    let mut step = [0; 3];
    let mut t_max = [f64::INFINITY; 3];
    let mut t_delta = [f64::INFINITY; 3];
    for axis in 0..3 {
      let d = direction[axis];
      if d > 0.0 {
        step[axis] = 1;
      } else if d < 0.0 {
        step[axis] = -1;
      }
      if step[axis] != 0 {
        let border = coder.axis_key_to_coord(key.axis(axis)) + step[axis] as f64 * pitch * 0.5;
        t_max[axis] = (border - origin[axis]) / d;
        t_delta[axis] = pitch / d.abs();
      }
    }
    Self {
      key,
      step,
      t_max,
      t_delta,
    }
  }

  /// Step into the next voxel. Returns the ray parameter at which it was
  /// entered, `None` when leaving the key range.
  fn advance(&mut self) -> Option<f64> {
    let axis = if self.t_max[0] < self.t_max[1] {
      if self.t_max[0] < self.t_max[2] {
        0
      } else {
        2
      }
    } else if self.t_max[1] < self.t_max[2] {
      1
    } else {
      2
    };
    let entered_at = self.t_max[axis];
    let next = self.key.axis(axis) as i32 + self.step[axis];
    self.key.set_axis(axis, u16::try_from(next).ok()?);
    self.t_max[axis] += self.t_delta[axis];
    Some(entered_at)
  }

  fn t_next(&self) -> f64 {
    self.t_max[0].min(self.t_max[1]).min(self.t_max[2])
  }
}

/// Ray parameter at which a ray leaves the box `[min, max]`. `None` when the
/// ray misses it or the box lies behind the origin.
fn slab_exit(origin: DVec3, direction: DVec3, min: DVec3, max: DVec3) -> Option<f64> {
  let mut t_enter = f64::NEG_INFINITY;
  let mut t_exit = f64::INFINITY;
  for axis in 0..3 {
    let d = direction[axis];
    if d == 0.0 {
      if origin[axis] < min[axis] || origin[axis] > max[axis] {
        return None;
      }
      continue;
    }
    let t0 = (min[axis] - origin[axis]) / d;
    let t1 = (max[axis] - origin[axis]) / d;
    t_enter = t_enter.max(t0.min(t1));
    t_exit = t_exit.min(t0.max(t1));
  }
  (t_exit >= t_enter.max(0.0)).then_some(t_exit)
}

impl VoxelOctree {
  /// Keys of the voxels traversed from `origin` to `end`.
  ///
  /// The origin voxel is included, the end voxel is not. `None` when either
  /// endpoint or an intermediate voxel is outside the key range.
  pub fn ray_keys(&self, origin: DVec3, end: DVec3) -> Option<KeyRay> {
    let coder = self.coder();
    let key_origin = coder.coord_to_key(origin)?;
    let key_end = coder.coord_to_key(end)?;
    let mut ray = KeyRay::new();
    if key_origin == key_end {
      return Some(ray);
    }
    ray.push(key_origin);

    let delta = end - origin;
    let length = delta.length();
    let direction = delta / length;
    let mut traversal = Traversal::new(coder, origin, direction, key_origin);

    loop {
      traversal.advance()?;
      if traversal.key == key_end {
        break;
      }
      // Numerical drift can step past the end voxel without hitting it.
      if traversal.t_next() > length {
        break;
      }
      ray.push(traversal.key);
    }
    Some(ray)
  }

  /// Cast a ray and return the center of the first occupied voxel.
  ///
  /// Unknown voxels are skipped. `max_range` bounds the distance from
  /// `origin` to a candidate voxel center; `None` casts until the ray leaves
  /// the region this tree has ever observed.
  pub fn cast_ray(&self, origin: DVec3, direction: DVec3, max_range: Option<f64>) -> Option<DVec3> {
    let extent = self.extent()?;
    let coder = self.coder();
    let direction = direction.try_normalize()?;
    let key = coder.coord_to_key(origin)?;

    if self.is_occupied_key(key) {
      return Some(coder.key_to_coord(key));
    }

    let half = DVec3::splat(coder.pitch() * 0.5);
    let extent_min = coder.key_to_coord(extent.min) - half;
    let extent_max = coder.key_to_coord(extent.max) + half;
    let t_exit = slab_exit(origin, direction, extent_min, extent_max)?;
    let max_range_sq = max_range.filter(|range| *range > 0.0).map(|range| range * range);

    let mut traversal = Traversal::new(coder, origin, direction, key);
    loop {
      let entered_at = traversal.advance()?;
      if entered_at > t_exit {
        return None;
      }
      let center = coder.key_to_coord(traversal.key);
      if let Some(limit) = max_range_sq {
        if (center - origin).length_squared() > limit {
          return None;
        }
      }
      if self.is_occupied_key(traversal.key) {
        return Some(center);
      }
    }
  }
}

#[cfg(test)]
#[path = "ray_test.rs"]
mod ray_test;
