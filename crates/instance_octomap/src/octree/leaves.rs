//! Leaf iteration over a VoxelOctree.
//!
//! Depth-first, octant order. Nodes at `max_depth` are reported as leaves
//! even when they have children, so a coarse view can be taken without
//! pruning.

use glam::DVec3;

use super::key::{KeyCoder, VoxelKey};
use super::node::OcNode;
use super::occupancy::LogOddsModel;
use super::tree::VoxelOctree;
use crate::constants::TREE_DEPTH;

/// One leaf reported by [`Leaves`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LeafInfo {
  /// Min-corner key of the leaf's block.
  pub key: VoxelKey,
  /// Depth of the leaf (16 = finest).
  pub depth: u8,
  pub log_odds: f32,
  /// World-space center of the leaf's block.
  pub center: DVec3,
  /// Edge length of the leaf's block.
  pub size: f64,
}

impl LeafInfo {
  #[inline]
  pub fn is_occupied(&self) -> bool {
    LogOddsModel::is_occupied(self.log_odds)
  }

  #[inline]
  pub fn occupancy(&self) -> f64 {
    super::occupancy::probability(self.log_odds)
  }
}

/// Depth-first leaf iterator.
pub struct Leaves<'a> {
  coder: KeyCoder,
  max_depth: u8,
  stack: Vec<(&'a OcNode, VoxelKey, u8)>,
}

impl<'a> Iterator for Leaves<'a> {
  type Item = LeafInfo;

  fn next(&mut self) -> Option<LeafInfo> {
    while let Some((node, key, depth)) = self.stack.pop() {
      if depth >= self.max_depth || !node.has_children() {
        return Some(LeafInfo {
          key,
          depth,
          log_odds: node.log_odds,
          center: self.coder.key_to_coord_at_depth(key, depth),
          size: self.coder.node_size(depth),
        });
      }
      // Push in reverse so octant 0 is visited first.
      for octant in (0..8).rev() {
        if let Some(child) = node.child(octant) {
          self.stack.push((child, key.child(depth, octant), depth + 1));
        }
      }
    }
    None
  }
}

impl VoxelOctree {
  /// Iterate leaves, treating nodes at `max_depth` as leaves.
  pub fn leaves(&self, max_depth: u8) -> Leaves<'_> {
    let mut stack = Vec::with_capacity(TREE_DEPTH as usize * 8);
    if let Some(root) = self.root() {
      stack.push((root, VoxelKey::new(0, 0, 0), 0));
    }
    Leaves {
      coder: *self.coder(),
      max_depth: max_depth.min(TREE_DEPTH),
      stack,
    }
  }
}

#[cfg(test)]
#[path = "leaves_test.rs"]
mod leaves_test;
