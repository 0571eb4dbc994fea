//! MapPublisher - the outward views of the map after each scan.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │ PublishRequest          output                                       │
//! │                                                                      │
//! │   occupied_markers  →   one MarkerSet per tree, cubes grouped by     │
//! │                         leaf depth (cube edge = node size)           │
//! │   free_markers      →   free background leaves                       │
//! │   binary_map        →   background tree, 2 bits per child            │
//! │   full_map          →   background tree, log-odds per node           │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Background cubes are hidden where an object tree is occupied, so each
//! voxel is drawn once with the object's identity. With the speckle filter
//! on, isolated finest-depth background voxels are skipped.
//!
//! Outputs are only computed when requested. A failed serialization is
//! logged and that output is skipped; the map itself is never touched.

use std::collections::BTreeMap;

use glam::DVec3;
use rayon::prelude::*;
use serde::Serialize;

use crate::config::MapperConfig;
use crate::constants::{ClassId, InstanceId, BACKGROUND_ID, NEIGHBOR_OFFSETS, TREE_DEPTH};
use crate::octree::{LeafInfo, VoxelKey, VoxelOctree};
use crate::store::InstanceStore;

/// Which outputs to produce.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PublishRequest {
  pub occupied_markers: bool,
  pub free_markers: bool,
  pub binary_map: bool,
  pub full_map: bool,
}

impl PublishRequest {
  /// Request every output.
  pub fn all() -> Self {
    Self {
      occupied_markers: true,
      free_markers: true,
      binary_map: true,
      full_map: true,
    }
  }

  /// Nothing requested.
  pub fn is_empty(&self) -> bool {
    !(self.occupied_markers || self.free_markers || self.binary_map || self.full_map)
  }
}

/// Cubes of one leaf depth.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CubeList {
  pub depth: u8,
  /// Edge length of every cube in the list.
  pub size: f64,
  pub centers: Vec<[f64; 3]>,
}

/// Visualization cubes for one tree.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MarkerSet {
  pub instance_id: InstanceId,
  pub class_id: Option<ClassId>,
  pub frame_id: String,
  /// Ascending depth.
  pub layers: Vec<CubeList>,
}

impl MarkerSet {
  /// Total cubes over all depths.
  pub fn cube_count(&self) -> usize {
    self.layers.iter().map(|layer| layer.centers.len()).sum()
  }

  pub fn is_empty(&self) -> bool {
    self.layers.is_empty()
  }

  /// Every cube center, coarse depths first.
  pub fn centers(&self) -> impl Iterator<Item = DVec3> + '_ {
    self
      .layers
      .iter()
      .flat_map(|layer| layer.centers.iter().map(|&center| DVec3::from_array(center)))
  }
}

/// Everything produced by one publish call.
#[derive(Clone, Debug, Default)]
pub struct PublishedMap {
  /// Occupied cubes per tree, ascending id. Empty sets are omitted.
  pub occupied: Vec<MarkerSet>,
  pub free: Option<MarkerSet>,
  pub binary_map: Option<Vec<u8>>,
  pub full_map: Option<Vec<u8>>,
}

impl PublishedMap {
  pub fn is_empty(&self) -> bool {
    self.occupied.is_empty()
      && self.free.is_none()
      && self.binary_map.is_none()
      && self.full_map.is_none()
  }
}

/// Produces marker sets and serialized maps from an [`InstanceStore`].
#[derive(Clone, Debug)]
pub struct MapPublisher {
  filter_speckles: bool,
  frame_id: String,
}

impl MapPublisher {
  pub fn new(config: &MapperConfig) -> Self {
    Self {
      filter_speckles: config.filter_speckles,
      frame_id: config.frame_id.clone(),
    }
  }

  pub fn filter_speckles(&self) -> bool {
    self.filter_speckles
  }

  /// Produce the requested outputs. An empty store publishes nothing.
  #[tracing::instrument(skip_all, name = "publish::publish")]
  pub fn publish(&self, store: &InstanceStore, request: &PublishRequest) -> PublishedMap {
    let Some(background) = store.background() else {
      return PublishedMap::default();
    };

    let mut published = PublishedMap::default();
    if request.occupied_markers {
      published.occupied = self.occupied_markers(store);
    }
    if request.free_markers {
      published.free = Some(self.free_markers(background));
    }
    if request.binary_map {
      published.binary_map = serialize("binary", |buffer| background.write_binary(buffer));
    }
    if request.full_map {
      published.full_map = serialize("full", |buffer| background.write_full(buffer));
    }
    published
  }

  /// Occupied cubes of every tree, ascending id.
  pub fn occupied_markers(&self, store: &InstanceStore) -> Vec<MarkerSet> {
    let objects: Vec<&VoxelOctree> = store.objects().map(|(_, entry)| entry.tree()).collect();
    let entries: Vec<_> = store.iter().collect();
    entries
      .into_par_iter()
      .map(|(id, entry)| {
        let tree = entry.tree();
        let leaves = tree.leaves(TREE_DEPTH).filter(LeafInfo::is_occupied);
        let layers = if id == BACKGROUND_ID {
          group_by_depth(leaves.filter(|leaf| {
            !covered_by_object(&objects, leaf.center)
              && !(self.filter_speckles && leaf.depth == TREE_DEPTH && is_speckle(tree, leaf.key))
          }))
        } else {
          group_by_depth(leaves)
        };
        MarkerSet {
          instance_id: id,
          class_id: entry.class_id(),
          frame_id: self.frame_id.clone(),
          layers,
        }
      })
      .filter(|set| !set.is_empty())
      .collect()
  }

  /// Free background cubes.
  pub fn free_markers(&self, background: &VoxelOctree) -> MarkerSet {
    let layers = group_by_depth(
      background
        .leaves(TREE_DEPTH)
        .filter(|leaf| !leaf.is_occupied()),
    );
    MarkerSet {
      instance_id: BACKGROUND_ID,
      class_id: None,
      frame_id: self.frame_id.clone(),
      layers,
    }
  }
}

/// True when no 26-neighbour of `key` is occupied in `tree`.
pub fn is_speckle(tree: &VoxelOctree, key: VoxelKey) -> bool {
  !NEIGHBOR_OFFSETS.iter().any(|&(dx, dy, dz)| {
    key
      .offset(dx, dy, dz)
      .is_some_and(|neighbour| tree.is_occupied_key(neighbour))
  })
}

fn covered_by_object(objects: &[&VoxelOctree], center: DVec3) -> bool {
  objects
    .iter()
    .any(|tree| tree.occupancy_at(center).is_some_and(|occupancy| occupancy > 0.5))
}

fn group_by_depth(leaves: impl Iterator<Item = LeafInfo>) -> Vec<CubeList> {
  let mut layers: BTreeMap<u8, CubeList> = BTreeMap::new();
  for leaf in leaves {
    layers
      .entry(leaf.depth)
      .or_insert_with(|| CubeList {
        depth: leaf.depth,
        size: leaf.size,
        centers: Vec::new(),
      })
      .centers
      .push(leaf.center.to_array());
  }
  layers.into_values().collect()
}

fn serialize(
  format: &str,
  write: impl FnOnce(&mut Vec<u8>) -> crate::error::Result<()>,
) -> Option<Vec<u8>> {
  let mut buffer = Vec::new();
  match write(&mut buffer) {
    Ok(()) => Some(buffer),
    Err(err) => {
      tracing::error!(format, error = %err, "map serialization failed, output skipped");
      None
    }
  }
}

#[cfg(test)]
#[path = "publish_test.rs"]
mod publish_test;
