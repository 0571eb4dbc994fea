//! Shared scene builders for unit tests.

use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use glam::{DAffine3, DVec3};

use crate::config::SensorModel;
use crate::constants::{ClassId, InstanceId, BACKGROUND_ID};
use crate::octree::DAabb3;
use crate::store::InstanceStore;
use crate::types::{CameraIntrinsics, LabelImage, PointCloud, Scan};

/// Pinhole camera with a 90° field of view for a `width`×`height` image.
pub fn pinhole(width: usize, height: usize) -> CameraIntrinsics {
  CameraIntrinsics {
    fx: width as f64 / 2.0,
    fy: width as f64 / 2.0,
    cx: (width as f64 - 1.0) / 2.0,
    cy: (height as f64 - 1.0) / 2.0,
  }
}

pub fn store() -> InstanceStore {
  InstanceStore::new(0.05, SensorModel::default())
}

/// Mark every voxel whose center lies in `[min, max]` occupied, `hits` times.
///
/// Object ids get a tree of `pitch` plus bbox `[min, max]` and its center as
/// centroid. The background ignores `pitch`.
pub fn add_box(
  store: &mut InstanceStore,
  id: InstanceId,
  pitch: f64,
  min: DVec3,
  max: DVec3,
  hits: usize,
) {
  if id == BACKGROUND_ID {
    store.ensure_background();
  } else {
    store.ensure_instance(id, 1, pitch);
  }
  let entry = store.get_mut(id).unwrap();
  let tree = &mut entry.tree;
  let lo = tree.coord_to_key(min).unwrap();
  let hi = tree.coord_to_key(max).unwrap();
  for x in lo.x..=hi.x {
    for y in lo.y..=hi.y {
      for z in lo.z..=hi.z {
        let key = crate::octree::VoxelKey::new(x, y, z);
        for _ in 0..hits {
          tree.update_node(key, true);
        }
      }
    }
  }
  if id != BACKGROUND_ID {
    let bbox = DAabb3::new(min, max);
    entry.record_points(bbox, bbox.center());
  }
}

/// Scan stamped `secs` after the epoch.
pub fn stamp(secs: u64) -> SystemTime {
  SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
}

/// One-pixel scan of `point` (world frame) seen from the origin.
pub fn single_point_scan(
  point: DVec3,
  label: InstanceId,
  classes: &[(InstanceId, ClassId)],
) -> Scan {
  Scan {
    stamp: SystemTime::now(),
    sensor_to_world: DAffine3::IDENTITY,
    intrinsics: pinhole(1, 1),
    cloud: PointCloud::new(1, 1, vec![point]),
    labels: LabelImage::filled(1, 1, label),
    classes: classes.iter().copied().collect::<HashMap<_, _>>(),
  }
}

/// Scan with per-pixel points and labels from closures.
pub fn grid_scan(
  width: usize,
  height: usize,
  sensor_to_world: DAffine3,
  point: impl Fn(usize, usize) -> DVec3,
  label: impl Fn(usize, usize) -> InstanceId,
  classes: &[(InstanceId, ClassId)],
) -> Scan {
  let mut cloud = PointCloud::invalid(width, height);
  let mut labels = LabelImage::unlabeled(width, height);
  for row in 0..height {
    for col in 0..width {
      cloud.set(row, col, point(row, col));
      labels.set(row, col, label(row, col));
    }
  }
  Scan {
    stamp: SystemTime::now(),
    sensor_to_world,
    intrinsics: pinhole(width, height),
    cloud,
    labels,
    classes: classes.iter().copied().collect(),
  }
}
