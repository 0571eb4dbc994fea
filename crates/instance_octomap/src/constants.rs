//! Reserved instance ids, octree key layout and the 32³ export grid layout.
//!
//! # Export Grid Layout
//!
//! ```text
//! Grid memory layout (row-major, Z innermost):
//!
//! Address:  0    1    2   ...  31   32   33  ...  1023  1024 ...
//! Content: [0,0,0][0,0,1]...[0,0,31][0,1,0]...[0,31,31][1,0,0]...
//!          └─────── Z ───────┘└─────── Z ───────┘
//! ```
//!
//! # 3D Indexing
//!
//! ```text
//! index = x << 10 | y << 5 | z
//!       = x * 1024 + y * 32 + z
//! ```
//!
//! Downstream consumers rely on this ordering, so it is fixed.
//!
//! # Octree Keys
//!
//! ```text
//! key = floor(coord / pitch) + KEY_CENTER      (per axis, 16 bits)
//!
//! depth 0  = root, covers the whole key space
//! depth 16 = leaf, one voxel of edge `pitch`
//! ```

/// Instance id type. Non-negative values are tracked objects.
pub type InstanceId = i32;

/// Semantic class id attached to an object instance.
pub type ClassId = u32;

/// Instance id of the background volume.
pub const BACKGROUND_ID: InstanceId = -1;

/// Instance id for uncertain pixels (segment borders, no prediction).
///
/// Never materialized into a tree. Predicted label images use it for pixels
/// no instance was projected onto.
pub const UNCERTAIN_ID: InstanceId = -2;

/// Number of octree levels below the root.
pub const TREE_DEPTH: u8 = 16;

/// Key offset so that world coordinate 0 maps to the middle of the key range.
pub const KEY_CENTER: i64 = 1 << (TREE_DEPTH - 1); // 32768

/// Cells per axis of an exported grid (must be 32 for bit-shift indexing)
pub const GRID_SIZE: usize = 32;

/// Grid cells squared (32² = 1024)
pub const GRID_SIZE_SQ: usize = GRID_SIZE * GRID_SIZE;

/// Total cells in an exported grid (32³ = 32768)
pub const GRID_SIZE_CB: usize = GRID_SIZE * GRID_SIZE * GRID_SIZE;

/// Bit shift for Y coordinate indexing (log2(32) = 5)
pub const Y_SHIFT: u32 = 5;

/// Bit shift for X coordinate indexing (log2(1024) = 10)
pub const X_SHIFT: u32 = 10;

/// Mask for extracting single axis from index (0x1F = 31)
pub const INDEX_MASK: usize = 0x1F;

/// Pixel stride used by projection and insertion (every other row/column).
pub const PIXEL_STRIDE: usize = 2;

/// Convert 3D grid coordinates to linear index using bit shifts.
///
/// Layout: X is major axis (stride 1024), Y is middle (stride 32), Z is minor
/// (stride 1)
#[inline(always)]
pub const fn coord_to_index(x: usize, y: usize, z: usize) -> usize {
  (x << X_SHIFT) | (y << Y_SHIFT) | z
}

/// Convert linear grid index to 3D coordinates.
#[inline(always)]
pub const fn index_to_coord(idx: usize) -> (usize, usize, usize) {
  let x = idx >> X_SHIFT;
  let y = (idx >> Y_SHIFT) & INDEX_MASK;
  let z = idx & INDEX_MASK;
  (x, y, z)
}

/// Offsets of the 26 neighbours of a voxel (3×3×3 minus center).
pub const NEIGHBOR_OFFSETS: [(i32, i32, i32); 26] = {
  let mut offsets = [(0, 0, 0); 26];
  let mut n = 0;
  let mut dz = -1;
  while dz <= 1 {
    let mut dy = -1;
    while dy <= 1 {
      let mut dx = -1;
      while dx <= 1 {
        if dx != 0 || dy != 0 || dz != 0 {
          offsets[n] = (dx, dy, dz);
          n += 1;
        }
        dx += 1;
      }
      dy += 1;
    }
    dz += 1;
  }
  offsets
};

#[cfg(test)]
#[path = "constants_test.rs"]
mod constants_test;
