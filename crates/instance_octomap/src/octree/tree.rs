//! VoxelOctree - sparse probabilistic occupancy octree.
//!
//! Explicit pointer tree, 16 levels below the root. Only observed space has
//! nodes; a missing node is unknown space.
//!
//! # Update Rule
//!
//! ```text
//! leaf:  log_odds = clamp(log_odds + hit|miss)
//! inner: log_odds = max(children)
//! ```

use glam::DVec3;

use super::key::{KeyCoder, VoxelKey};
use super::node::{Children, OcNode};
use super::occupancy::LogOddsModel;
use crate::config::SensorModel;
use crate::constants::TREE_DEPTH;

/// Key-space extent of every node ever updated, inclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyExtent {
  pub min: VoxelKey,
  pub max: VoxelKey,
}

impl KeyExtent {
  fn from_key(key: VoxelKey) -> Self {
    Self { min: key, max: key }
  }

  fn encapsulate(&mut self, key: VoxelKey) {
    self.min = VoxelKey::new(self.min.x.min(key.x), self.min.y.min(key.y), self.min.z.min(key.z));
    self.max = VoxelKey::new(self.max.x.max(key.x), self.max.y.max(key.y), self.max.z.max(key.z));
  }
}

/// Sparse occupancy octree with fixed voxel pitch.
#[derive(Clone, Debug)]
pub struct VoxelOctree {
  coder: KeyCoder,
  model: LogOddsModel,
  root: Option<Box<OcNode>>,
  extent: Option<KeyExtent>,
}

impl VoxelOctree {
  /// Create an empty tree. `pitch` never changes afterwards.
  pub fn new(pitch: f64, sensor_model: &SensorModel) -> Self {
    Self::with_model(pitch, LogOddsModel::new(sensor_model))
  }

  pub(crate) fn with_model(pitch: f64, model: LogOddsModel) -> Self {
    Self {
      coder: KeyCoder::new(pitch),
      model,
      root: None,
      extent: None,
    }
  }

  /// Edge length of a finest-level voxel.
  #[inline]
  pub fn pitch(&self) -> f64 {
    self.coder.pitch()
  }

  #[inline]
  pub fn coder(&self) -> &KeyCoder {
    &self.coder
  }

  #[inline]
  pub fn model(&self) -> &LogOddsModel {
    &self.model
  }

  #[inline]
  pub fn coord_to_key(&self, point: DVec3) -> Option<VoxelKey> {
    self.coder.coord_to_key(point)
  }

  #[inline]
  pub fn key_to_coord(&self, key: VoxelKey) -> DVec3 {
    self.coder.key_to_coord(key)
  }

  /// Edge length of a node at `depth`.
  #[inline]
  pub fn node_size(&self, depth: u8) -> f64 {
    self.coder.node_size(depth)
  }

  /// True when nothing has been observed.
  pub fn is_empty(&self) -> bool {
    self.root.is_none()
  }

  /// Total number of nodes (inner and leaf).
  pub fn node_count(&self) -> usize {
    self.root.as_ref().map_or(0, |root| root.subtree_size())
  }

  /// Key extent of all updated voxels.
  pub fn extent(&self) -> Option<KeyExtent> {
    self.extent
  }

  pub(crate) fn root(&self) -> Option<&OcNode> {
    self.root.as_deref()
  }

  /// Remove every node.
  pub fn clear(&mut self) {
    self.root = None;
    self.extent = None;
  }

  /// Integrate one hit (`occupied`) or miss at `key`. Returns the new
  /// log-odds of the finest-level node.
  pub fn update_node(&mut self, key: VoxelKey, occupied: bool) -> f32 {
    let mut created = false;
    let root = self.root.get_or_insert_with(|| {
      created = true;
      Box::new(OcNode::default())
    });
    let value = update_recursive(root, created, key, 0, occupied, &self.model);
    match &mut self.extent {
      Some(extent) => extent.encapsulate(key),
      None => self.extent = Some(KeyExtent::from_key(key)),
    }
    value
  }

  /// Integrate one observation at a world coordinate. `None` when the
  /// coordinate is outside the key range.
  pub fn update_coord(&mut self, point: DVec3, occupied: bool) -> Option<f32> {
    let key = self.coord_to_key(point)?;
    Some(self.update_node(key, occupied))
  }

  /// Deepest existing node on the path to `key`.
  ///
  /// A pruned leaf answers for its whole block. `None` for unknown space.
  pub fn search(&self, key: VoxelKey) -> Option<&OcNode> {
    let mut node = self.root.as_deref()?;
    for depth in 0..TREE_DEPTH {
      if !node.has_children() {
        return Some(node);
      }
      node = node.child(key.child_index(depth))?;
    }
    Some(node)
  }

  /// Occupancy probability at `key`, `None` when unknown.
  #[inline]
  pub fn occupancy_at_key(&self, key: VoxelKey) -> Option<f64> {
    self.search(key).map(OcNode::occupancy)
  }

  /// Occupancy probability at a world coordinate, `None` when unknown or
  /// outside the key range.
  #[inline]
  pub fn occupancy_at(&self, point: DVec3) -> Option<f64> {
    self.occupancy_at_key(self.coord_to_key(point)?)
  }

  /// True when the node at `key` is known and occupied.
  #[inline]
  pub fn is_occupied_key(&self, key: VoxelKey) -> bool {
    self
      .search(key)
      .is_some_and(|node| LogOddsModel::is_occupied(node.log_odds))
  }

  /// Merge uniform subtrees. Queries answer identically afterwards.
  ///
  /// Returns the number of collapsed inner nodes.
  pub fn prune(&mut self) -> usize {
    match self.root.as_deref_mut() {
      Some(root) => prune_recursive(root),
      None => 0,
    }
  }

  /// Replace the whole tree (used by deserialization).
  pub(crate) fn set_root(&mut self, root: Option<Box<OcNode>>) {
    self.root = root;
    self.extent = None;
    let blocks: Vec<(VoxelKey, VoxelKey)> = self
      .leaves(TREE_DEPTH)
      .map(|leaf| (leaf.key, key_block_max(leaf.key, leaf.depth)))
      .collect();
    for (min, max) in blocks {
      for corner in [min, max] {
        match &mut self.extent {
          Some(extent) => extent.encapsulate(corner),
          None => self.extent = Some(KeyExtent::from_key(corner)),
        }
      }
    }
  }
}

/// Largest key inside the block of the node at `depth` containing `key`.
fn key_block_max(key: VoxelKey, depth: u8) -> VoxelKey {
  let base = key.at_depth(depth);
  let span = ((1u32 << (TREE_DEPTH - depth.min(TREE_DEPTH))) - 1) as u16;
  VoxelKey::new(base.x + span, base.y + span, base.z + span)
}

fn update_recursive(
  node: &mut OcNode,
  node_just_created: bool,
  key: VoxelKey,
  depth: u8,
  occupied: bool,
  model: &LogOddsModel,
) -> f32 {
  if depth == TREE_DEPTH {
    node.log_odds = model.update(node.log_odds, occupied);
    return node.log_odds;
  }

  // A childless node that already existed is a pruned leaf: its block was
  // uniform, so every child inherits its value.
  if !node.has_children() && !node_just_created {
    node.expand();
  }

  let octant = key.child_index(depth);
  let mut child_created = false;
  let children = node
    .children
    .get_or_insert_with(|| Box::new(Children::default()));
  let child = children[octant].get_or_insert_with(|| {
    child_created = true;
    Box::new(OcNode::default())
  });
  let value = update_recursive(child, child_created, key, depth + 1, occupied, model);
  node.update_inner_occupancy();
  value
}

fn prune_recursive(node: &mut OcNode) -> usize {
  let mut pruned = 0;
  if let Some(children) = node.children.as_deref_mut() {
    for child in children.iter_mut().flatten() {
      pruned += prune_recursive(child);
    }
  }
  if node.is_collapsible() {
    if let Some(value) = node.child(0).map(|child| child.log_odds) {
      node.log_odds = value;
      node.children = None;
      pruned += 1;
    }
  }
  pruned
}

#[cfg(test)]
#[path = "tree_test.rs"]
mod tree_test;
