//! GridExporter - dense 32³ snapshots of each instance tree.
//!
//! # Grid Geometry
//!
//! ```text
//! origin = centroid - (GRID_SIZE / 2 - 0.5) * pitch     (center of cell 0)
//! cell(i, j, k) = origin + (i, j, k) * pitch
//! index = i * 1024 + j * 32 + k
//! ```
//!
//! World grids are laid out axis-aligned in the world frame. Sensor grids are
//! laid out axis-aligned in the sensor frame around the centroid seen from
//! the sensor; each cell is mapped back to world before querying the trees.
//!
//! # No-Entry Derivation (sensor grids)
//!
//! ```text
//! world z < 0 and ground rule      -> no-entry (prob_max)
//! own occupancy > 0.5              -> occupied
//! background free and free rule    -> candidate 1 - occupancy
//! other tree >= saturated value    -> candidate occupancy
//! ```
//!
//! At most one no-entry entry per cell, carrying the largest candidate.

use glam::{DAffine3, DVec3};
use rayon::prelude::*;
use serde::Serialize;

use crate::config::{MapperConfig, NoEntryRules};
use crate::constants::{coord_to_index, ClassId, InstanceId, BACKGROUND_ID, GRID_SIZE};
use crate::octree::{LogOddsModel, VoxelOctree};
use crate::store::{InstanceEntry, InstanceStore};

/// Sparse dense-grid snapshot of one instance.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct VoxelGrid {
  pub instance_id: InstanceId,
  pub class_id: Option<ClassId>,
  /// Frame the grid is laid out in.
  pub frame_id: String,
  pub pitch: f64,
  pub dims: [u32; 3],
  /// Center of cell 0.
  pub origin: [f64; 3],
  /// Linear cell indices, ascending.
  pub indices: Vec<u32>,
  /// Probability or confidence per index.
  pub values: Vec<f64>,
}

impl VoxelGrid {
  fn new(
    instance_id: InstanceId,
    class_id: Option<ClassId>,
    frame_id: &str,
    pitch: f64,
    origin: DVec3,
  ) -> Self {
    Self {
      instance_id,
      class_id,
      frame_id: frame_id.to_string(),
      pitch,
      dims: [GRID_SIZE as u32; 3],
      origin: origin.to_array(),
      indices: Vec::new(),
      values: Vec::new(),
    }
  }

  #[inline]
  fn push(&mut self, index: usize, value: f64) {
    self.indices.push(index as u32);
    self.values.push(value);
  }

  pub fn len(&self) -> usize {
    self.indices.len()
  }

  pub fn is_empty(&self) -> bool {
    self.indices.is_empty()
  }

  /// Center of cell `(i, j, k)` in the grid's frame.
  pub fn cell_center(&self, i: usize, j: usize, k: usize) -> DVec3 {
    DVec3::from_array(self.origin) + DVec3::new(i as f64, j as f64, k as f64) * self.pitch
  }

  /// Iterate `(index, value)` pairs.
  pub fn cells(&self) -> impl Iterator<Item = (u32, f64)> + '_ {
    self.indices.iter().copied().zip(self.values.iter().copied())
  }
}

/// Grid origin (center of cell 0) for a grid centered on `center`.
#[inline]
pub fn grid_origin(center: DVec3, pitch: f64) -> DVec3 {
  center - DVec3::splat((GRID_SIZE as f64 / 2.0 - 0.5) * pitch)
}

/// Every cell of a 32³ grid as `(index, offset from origin in cells)`.
fn grid_cells() -> impl Iterator<Item = (usize, DVec3)> {
  (0..GRID_SIZE).flat_map(|i| {
    (0..GRID_SIZE).flat_map(move |j| {
      (0..GRID_SIZE).map(move |k| (coord_to_index(i, j, k), DVec3::new(i as f64, j as f64, k as f64)))
    })
  })
}

/// Grid extraction with no-entry derivation.
#[derive(Clone, Debug)]
pub struct GridExporter {
  rules: NoEntryRules,
  /// Confidence for ground-plane no-entry cells.
  prob_max: f64,
  /// Occupancy of a saturated cell; other trees at or above it are no-entry.
  high_occupancy: f64,
  frame_id: String,
  sensor_frame_id: String,
}

impl GridExporter {
  pub fn new(config: &MapperConfig) -> Self {
    Self {
      rules: config.noentry,
      prob_max: config.sensor_model.max,
      high_occupancy: LogOddsModel::new(&config.sensor_model).saturated_occupancy(),
      frame_id: config.frame_id.clone(),
      sensor_frame_id: config.sensor_frame_id.clone(),
    }
  }

  #[inline]
  pub fn rules(&self) -> NoEntryRules {
    self.rules
  }

  pub fn set_rules(&mut self, rules: NoEntryRules) {
    self.rules = rules;
  }

  /// Occupied cells of every object tree, world-aligned.
  #[tracing::instrument(skip_all, name = "export::world_grids")]
  pub fn world_grids(&self, store: &InstanceStore) -> Vec<VoxelGrid> {
    let objects: Vec<(InstanceId, &InstanceEntry)> = store.objects().collect();
    objects
      .into_par_iter()
      .filter_map(|(id, entry)| {
        let centroid = entry.centroid()?;
        let tree = entry.tree();
        let origin = grid_origin(centroid, tree.pitch());
        let mut grid = VoxelGrid::new(id, entry.class_id(), &self.frame_id, tree.pitch(), origin);
        for (index, offset) in grid_cells() {
          let point = origin + offset * tree.pitch();
          if let Some(occupancy) = tree.occupancy_at(point).filter(|occ| *occ > 0.5) {
            grid.push(index, occupancy);
          }
        }
        Some(grid)
      })
      .collect()
  }

  /// Sensor-aligned occupied grids and their no-entry grids, one pair per
  /// object tree.
  #[tracing::instrument(skip_all, name = "export::sensor_grids")]
  pub fn sensor_grids(
    &self,
    store: &InstanceStore,
    sensor_to_world: &DAffine3,
  ) -> (Vec<VoxelGrid>, Vec<VoxelGrid>) {
    let world_to_sensor = sensor_to_world.inverse();
    let trees: Vec<(InstanceId, &VoxelOctree)> =
      store.iter().map(|(id, entry)| (id, entry.tree())).collect();
    let objects: Vec<(InstanceId, &InstanceEntry)> = store.objects().collect();

    objects
      .into_par_iter()
      .filter_map(|(id, entry)| {
        let centroid = entry.centroid()?;
        let tree = entry.tree();
        let pitch = tree.pitch();
        let origin = grid_origin(world_to_sensor.transform_point3(centroid), pitch);
        let mut occupied =
          VoxelGrid::new(id, entry.class_id(), &self.sensor_frame_id, pitch, origin);
        let mut noentry = occupied.clone();

        for (index, offset) in grid_cells() {
          let world = sensor_to_world.transform_point3(origin + offset * pitch);
          if self.rules.ground_as_noentry && world.z < 0.0 {
            noentry.push(index, self.prob_max);
            continue;
          }
          if let Some(occupancy) = tree.occupancy_at(world).filter(|occ| *occ > 0.5) {
            occupied.push(index, occupancy);
            continue;
          }
          if let Some(confidence) = self.noentry_confidence(id, &trees, world) {
            noentry.push(index, confidence);
          }
        }
        Some((occupied, noentry))
      })
      .unzip()
  }

  /// Largest no-entry confidence contributed by trees other than `own`.
  fn noentry_confidence(
    &self,
    own: InstanceId,
    trees: &[(InstanceId, &VoxelOctree)],
    world: DVec3,
  ) -> Option<f64> {
    let mut best: Option<f64> = None;
    for (id, tree) in trees.iter().filter(|(id, _)| *id != own) {
      let Some(occupancy) = tree.occupancy_at(world) else {
        continue;
      };
      let candidate = if *id == BACKGROUND_ID && self.rules.free_as_noentry && occupancy < 0.5 {
        Some(1.0 - occupancy)
      } else if occupancy >= self.high_occupancy {
        Some(occupancy)
      } else {
        None
      };
      if let Some(candidate) = candidate {
        best = Some(best.map_or(candidate, |current: f64| current.max(candidate)));
      }
    }
    best
  }
}

#[cfg(test)]
#[path = "export_test.rs"]
mod export_test;
