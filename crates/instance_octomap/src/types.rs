//! Core data types for scans and label images.

use std::collections::HashMap;
use std::time::SystemTime;

use glam::{DAffine3, DVec3};

use crate::constants::{ClassId, InstanceId, PIXEL_STRIDE, UNCERTAIN_ID};
use crate::error::{MapError, Result};

/// Pinhole camera intrinsics.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraIntrinsics {
  pub fx: f64,
  pub fy: f64,
  pub cx: f64,
  pub cy: f64,
}

impl CameraIntrinsics {
  /// Sensor-frame point at unit depth (z = 1) seen by pixel `(row, col)`.
  #[inline]
  pub fn back_project(&self, row: usize, col: usize) -> DVec3 {
    DVec3::new(
      (col as f64 - self.cx) / self.fx,
      (row as f64 - self.cy) / self.fy,
      1.0,
    )
  }
}

/// Row-major image of instance ids.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabelImage {
  pub width: usize,
  pub height: usize,
  pub data: Vec<InstanceId>,
}

impl LabelImage {
  /// Image with every pixel set to `value`.
  pub fn filled(width: usize, height: usize, value: InstanceId) -> Self {
    Self {
      width,
      height,
      data: vec![value; width * height],
    }
  }

  /// Image with every pixel unlabeled.
  pub fn unlabeled(width: usize, height: usize) -> Self {
    Self::filled(width, height, UNCERTAIN_ID)
  }

  #[inline]
  pub fn index(&self, row: usize, col: usize) -> usize {
    row * self.width + col
  }

  #[inline]
  pub fn get(&self, row: usize, col: usize) -> InstanceId {
    self.data[self.index(row, col)]
  }

  #[inline]
  pub fn set(&mut self, row: usize, col: usize, value: InstanceId) {
    let index = self.index(row, col);
    self.data[index] = value;
  }

  pub fn len(&self) -> usize {
    self.data.len()
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }
}

/// Organized point cloud: one point per pixel, NaN for invalid returns.
#[derive(Clone, Debug, PartialEq)]
pub struct PointCloud {
  pub width: usize,
  pub height: usize,
  pub points: Vec<DVec3>,
}

impl PointCloud {
  pub fn new(width: usize, height: usize, points: Vec<DVec3>) -> Self {
    debug_assert_eq!(points.len(), width * height);
    Self {
      width,
      height,
      points,
    }
  }

  /// Cloud with every point invalid.
  pub fn invalid(width: usize, height: usize) -> Self {
    Self::new(width, height, vec![DVec3::NAN; width * height])
  }

  #[inline]
  pub fn get(&self, row: usize, col: usize) -> DVec3 {
    self.points[row * self.width + col]
  }

  #[inline]
  pub fn set(&mut self, row: usize, col: usize, point: DVec3) {
    self.points[row * self.width + col] = point;
  }

  /// Apply a rigid transform; invalid points stay invalid.
  pub fn transformed(&self, transform: &DAffine3) -> PointCloud {
    let points = self
      .points
      .iter()
      .map(|point| {
        if is_valid_point(*point) {
          transform.transform_point3(*point)
        } else {
          DVec3::NAN
        }
      })
      .collect();
    PointCloud::new(self.width, self.height, points)
  }
}

/// Cloud and labels share one `width x height` layout and both buffers are
/// full.
pub fn check_layout(cloud: &PointCloud, labels: &LabelImage) -> Result<()> {
  let pixels = cloud.width * cloud.height;
  if cloud.width != labels.width
    || cloud.height != labels.height
    || cloud.points.len() != pixels
    || labels.data.len() != pixels
  {
    return Err(MapError::LayoutMismatch {
      cloud_width: cloud.width,
      cloud_height: cloud.height,
      points: cloud.points.len(),
      label_width: labels.width,
      label_height: labels.height,
      labels: labels.data.len(),
    });
  }
  Ok(())
}

/// False for NaN or infinite coordinates.
#[inline]
pub fn is_valid_point(point: DVec3) -> bool {
  point.is_finite()
}

/// Pixels with even row and column, row-major.
pub fn sampled_pixels(width: usize, height: usize) -> impl Iterator<Item = (usize, usize)> {
  (0..height)
    .step_by(PIXEL_STRIDE)
    .flat_map(move |row| (0..width).step_by(PIXEL_STRIDE).map(move |col| (row, col)))
}

/// Persistent instance with its class, as reported in the class summary.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize)]
pub struct ObjectClass {
  pub instance_id: InstanceId,
  pub class_id: ClassId,
  pub confidence: f64,
}

/// One registered, labeled scan.
#[derive(Clone, Debug)]
pub struct Scan {
  /// Capture time.
  pub stamp: SystemTime,
  /// Sensor pose in the world frame.
  pub sensor_to_world: DAffine3,
  pub intrinsics: CameraIntrinsics,
  /// Points in the sensor frame.
  pub cloud: PointCloud,
  /// Transient segmentation ids, same layout as `cloud`.
  pub labels: LabelImage,
  /// Transient id to class id.
  pub classes: HashMap<InstanceId, ClassId>,
}

impl Scan {
  /// Sensor origin in the world frame.
  #[inline]
  pub fn sensor_origin(&self) -> DVec3 {
    self.sensor_to_world.translation
  }
}

#[cfg(test)]
#[path = "types_test.rs"]
mod types_test;
