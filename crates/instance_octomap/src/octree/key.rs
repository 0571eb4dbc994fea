//! VoxelKey - immutable value type addressing one finest-level voxel.
//!
//! Keys are 16-bit per axis. A key also names every coarser node containing
//! the voxel: the node at depth `d` is identified by the key's upper `d` bits.

use glam::DVec3;

use crate::constants::{KEY_CENTER, TREE_DEPTH};

/// Voxel key - immutable value type.
///
/// Ordering is lexicographic (x, y, z); only used to make iteration
/// deterministic.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct VoxelKey {
  pub x: u16,
  pub y: u16,
  pub z: u16,
}

impl VoxelKey {
  /// Create a key from raw per-axis values.
  pub fn new(x: u16, y: u16, z: u16) -> Self {
    Self { x, y, z }
  }

  /// Index (0-7) of the child containing this key when descending from a
  /// node at `depth`.
  ///
  /// Octant bits represent +X, +Y, +Z offsets:
  /// - bit 0: X offset (0 or 1)
  /// - bit 1: Y offset (0 or 1)
  /// - bit 2: Z offset (0 or 1)
  #[inline]
  pub fn child_index(&self, depth: u8) -> usize {
    debug_assert!(depth < TREE_DEPTH);
    let shift = TREE_DEPTH - 1 - depth;
    let cx = ((self.x >> shift) & 1) as usize;
    let cy = ((self.y >> shift) & 1) as usize;
    let cz = ((self.z >> shift) & 1) as usize;
    cx | (cy << 1) | (cz << 2)
  }

  /// Key of the child `octant` of the node at `depth` identified by `self`.
  #[inline]
  pub fn child(&self, depth: u8, octant: usize) -> Self {
    debug_assert!(depth < TREE_DEPTH);
    let bit = 1u16 << (TREE_DEPTH - 1 - depth);
    let mut key = *self;
    if octant & 1 != 0 {
      key.x |= bit;
    }
    if octant & 2 != 0 {
      key.y |= bit;
    }
    if octant & 4 != 0 {
      key.z |= bit;
    }
    key
  }

  /// Min-corner key of the node at `depth` containing this key.
  #[inline]
  pub fn at_depth(&self, depth: u8) -> Self {
    if depth >= TREE_DEPTH {
      return *self;
    }
    let mask = !((1u32 << (TREE_DEPTH - depth)) - 1) as u16;
    Self::new(self.x & mask, self.y & mask, self.z & mask)
  }

  /// Neighbour key offset by whole voxels. `None` when leaving the key range.
  #[inline]
  pub fn offset(&self, dx: i32, dy: i32, dz: i32) -> Option<Self> {
    let shift = |v: u16, d: i32| u16::try_from(v as i32 + d).ok();
    Some(Self::new(
      shift(self.x, dx)?,
      shift(self.y, dy)?,
      shift(self.z, dz)?,
    ))
  }

  #[inline]
  pub fn axis(&self, axis: usize) -> u16 {
    match axis {
      0 => self.x,
      1 => self.y,
      _ => self.z,
    }
  }

  #[inline]
  pub(crate) fn set_axis(&mut self, axis: usize, value: u16) {
    match axis {
      0 => self.x = value,
      1 => self.y = value,
      _ => self.z = value,
    }
  }
}

/// Conversion between world coordinates and keys for one voxel pitch.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KeyCoder {
  pitch: f64,
  inv_pitch: f64,
}

impl KeyCoder {
  pub fn new(pitch: f64) -> Self {
    debug_assert!(pitch > 0.0, "voxel pitch must be positive");
    Self {
      pitch,
      inv_pitch: 1.0 / pitch,
    }
  }

  /// Edge length of a finest-level voxel.
  #[inline]
  pub fn pitch(&self) -> f64 {
    self.pitch
  }

  /// Key along one axis, `None` outside the addressable range.
  #[inline]
  pub fn coord_to_axis_key(&self, coord: f64) -> Option<u16> {
    if !coord.is_finite() {
      return None;
    }
    let scaled = (coord * self.inv_pitch).floor() as i64 + KEY_CENTER;
    u16::try_from(scaled).ok()
  }

  /// Key of the voxel containing `point`.
  #[inline]
  pub fn coord_to_key(&self, point: DVec3) -> Option<VoxelKey> {
    Some(VoxelKey::new(
      self.coord_to_axis_key(point.x)?,
      self.coord_to_axis_key(point.y)?,
      self.coord_to_axis_key(point.z)?,
    ))
  }

  /// Center coordinate of a finest-level key along one axis.
  #[inline]
  pub fn axis_key_to_coord(&self, key: u16) -> f64 {
    ((key as i64 - KEY_CENTER) as f64 + 0.5) * self.pitch
  }

  /// Center of the finest-level voxel `key`.
  #[inline]
  pub fn key_to_coord(&self, key: VoxelKey) -> DVec3 {
    DVec3::new(
      self.axis_key_to_coord(key.x),
      self.axis_key_to_coord(key.y),
      self.axis_key_to_coord(key.z),
    )
  }

  /// Center of the node at `depth` containing `key`.
  pub fn key_to_coord_at_depth(&self, key: VoxelKey, depth: u8) -> DVec3 {
    if depth >= TREE_DEPTH {
      return self.key_to_coord(key);
    }
    let base = key.at_depth(depth);
    let half_block = (1u32 << (TREE_DEPTH - depth)) as f64 * 0.5;
    let axis = |k: u16| ((k as i64 - KEY_CENTER) as f64 + half_block) * self.pitch;
    DVec3::new(axis(base.x), axis(base.y), axis(base.z))
  }

  /// Edge length of a node at `depth`.
  #[inline]
  pub fn node_size(&self, depth: u8) -> f64 {
    let depth = depth.min(TREE_DEPTH);
    self.pitch * (1u32 << (TREE_DEPTH - depth)) as f64
  }
}

#[cfg(test)]
#[path = "key_test.rs"]
mod key_test;
