//! InstanceStore - one occupancy tree per tracked instance.
//!
//! The store exclusively owns every tree. Callers refer to trees by instance
//! id only. Entries are kept in a `BTreeMap` so iteration is in ascending id
//! order (background `-1` first).
//!
//! ```text
//! id  -1 ─► background tree (pitch = resolution)
//! id   0 ─► tree (class pitch) + class, bbox, centroid
//! id   3 ─► tree (class pitch) + class, bbox, centroid
//! ```
//!
//! The store only grows; [`InstanceStore::clear`] is the single way to drop
//! entries.

use std::collections::BTreeMap;

use glam::DVec3;
use rayon::prelude::*;

use crate::config::SensorModel;
use crate::constants::{ClassId, InstanceId, BACKGROUND_ID};
use crate::octree::{DAabb3, VoxelOctree};

/// One mapped instance.
#[derive(Clone, Debug)]
pub struct InstanceEntry {
  pub(crate) tree: VoxelOctree,
  pub(crate) class_id: Option<ClassId>,
  pub(crate) bbox: Option<DAabb3>,
  pub(crate) centroid: Option<DVec3>,
}

impl InstanceEntry {
  fn new(tree: VoxelOctree, class_id: Option<ClassId>) -> Self {
    Self {
      tree,
      class_id,
      bbox: None,
      centroid: None,
    }
  }

  #[inline]
  pub fn tree(&self) -> &VoxelOctree {
    &self.tree
  }

  /// Class of the instance. Always `None` for the background.
  #[inline]
  pub fn class_id(&self) -> Option<ClassId> {
    self.class_id
  }

  /// Extent of every point ever inserted for this instance.
  #[inline]
  pub fn bbox(&self) -> Option<DAabb3> {
    self.bbox
  }

  /// Mean of the points inserted by the latest scan that observed this
  /// instance.
  #[inline]
  pub fn centroid(&self) -> Option<DVec3> {
    self.centroid
  }

  /// True until the first points were recorded for this instance.
  #[inline]
  pub fn is_new(&self) -> bool {
    self.bbox.is_none()
  }

  /// Grow the bounding box by a scan's extent and replace the centroid.
  pub(crate) fn record_points(&mut self, extent: DAabb3, centroid: DVec3) {
    self.bbox = Some(match self.bbox {
      Some(bbox) => bbox.union(&extent),
      None => extent,
    });
    self.centroid = Some(centroid);
  }
}

/// Owner of every instance tree.
#[derive(Clone, Debug)]
pub struct InstanceStore {
  entries: BTreeMap<InstanceId, InstanceEntry>,
  sensor_model: SensorModel,
  resolution: f64,
}

impl InstanceStore {
  /// Empty store. `resolution` is the background pitch.
  pub fn new(resolution: f64, sensor_model: SensorModel) -> Self {
    Self {
      entries: BTreeMap::new(),
      sensor_model,
      resolution,
    }
  }

  #[inline]
  pub fn sensor_model(&self) -> &SensorModel {
    &self.sensor_model
  }

  #[inline]
  pub fn resolution(&self) -> f64 {
    self.resolution
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn contains(&self, id: InstanceId) -> bool {
    self.entries.contains_key(&id)
  }

  pub fn get(&self, id: InstanceId) -> Option<&InstanceEntry> {
    self.entries.get(&id)
  }

  pub(crate) fn get_mut(&mut self, id: InstanceId) -> Option<&mut InstanceEntry> {
    self.entries.get_mut(&id)
  }

  pub fn tree(&self, id: InstanceId) -> Option<&VoxelOctree> {
    self.entries.get(&id).map(InstanceEntry::tree)
  }

  pub fn background(&self) -> Option<&VoxelOctree> {
    self.tree(BACKGROUND_ID)
  }

  /// All instance ids in ascending order.
  pub fn ids(&self) -> impl Iterator<Item = InstanceId> + '_ {
    self.entries.keys().copied()
  }

  /// All entries in ascending id order, background included.
  pub fn iter(&self) -> impl Iterator<Item = (InstanceId, &InstanceEntry)> {
    self.entries.iter().map(|(id, entry)| (*id, entry))
  }

  /// Entries of tracked objects (background excluded).
  pub fn objects(&self) -> impl Iterator<Item = (InstanceId, &InstanceEntry)> {
    self.iter().filter(|(id, _)| *id != BACKGROUND_ID)
  }

  pub(crate) fn entries_mut(&mut self) -> &mut BTreeMap<InstanceId, InstanceEntry> {
    &mut self.entries
  }

  /// Create the background tree if missing.
  pub fn ensure_background(&mut self) -> &mut InstanceEntry {
    let resolution = self.resolution;
    let model = self.sensor_model;
    self
      .entries
      .entry(BACKGROUND_ID)
      .or_insert_with(|| InstanceEntry::new(VoxelOctree::new(resolution, &model), None))
  }

  /// Create the tree for an object instance if missing.
  ///
  /// An existing tree keeps its pitch; only the class is refreshed. Returns
  /// true when the tree was created.
  pub fn ensure_instance(&mut self, id: InstanceId, class_id: ClassId, pitch: f64) -> bool {
    debug_assert!(id >= 0, "object instance ids are non-negative");
    if let Some(entry) = self.entries.get_mut(&id) {
      entry.class_id = Some(class_id);
      return false;
    }
    let tree = VoxelOctree::new(pitch, &self.sensor_model);
    self
      .entries
      .insert(id, InstanceEntry::new(tree, Some(class_id)));
    tracing::debug!(id, class_id, pitch, "created instance tree");
    true
  }

  /// Persistent id to class id for every tracked object.
  pub fn class_table(&self) -> BTreeMap<InstanceId, ClassId> {
    self
      .objects()
      .filter_map(|(id, entry)| entry.class_id.map(|class| (id, class)))
      .collect()
  }

  /// Prune every tree. Returns the total number of collapsed nodes.
  pub fn prune_all(&mut self) -> usize {
    self
      .entries
      .par_iter_mut()
      .map(|(_, entry)| entry.tree.prune())
      .sum()
  }

  /// Drop every entry.
  pub fn clear(&mut self) {
    self.entries.clear();
  }
}

#[cfg(test)]
#[path = "store_test.rs"]
mod store_test;
