//! Local ray-cast projection.
//!
//! # Stages
//!
//! ```text
//! 1. z-buffer     instances × sampled pixels, in parallel
//!                 packed = depth_bits << 32 | id      AtomicU64::fetch_min
//!
//! 2. stamp        every output pixel takes the nearest sample in its
//!                 3×3 neighbourhood
//!
//!    sampled:  S . S .        pixel (1,1) sees the four S around it
//!              . x . .
//!              S . S .
//! ```
//!
//! Depths are non-negative, so their `f32` bit patterns order like the
//! values. Equal depths resolve to the lower instance id.

use std::sync::atomic::{AtomicU64, Ordering};

use rayon::prelude::*;

use super::{ProjectionRequest, Projector};
use crate::constants::{InstanceId, PIXEL_STRIDE};
use crate::error::Result;
use crate::octree::{DAabb3, VoxelOctree};
use crate::types::{is_valid_point, sampled_pixels, LabelImage};

/// Ray range factor for valid points.
const RANGE_FACTOR: f64 = 1.1;

const EMPTY: u64 = u64::MAX;

#[inline]
fn pack(depth: f32, id: InstanceId) -> u64 {
  ((depth.to_bits() as u64) << 32) | id as u32 as u64
}

#[inline]
fn unpack_id(packed: u64) -> InstanceId {
  packed as u32 as InstanceId
}

/// Predicts labels by casting rays into every object tree.
#[derive(Clone, Copy, Debug, Default)]
pub struct RaycastProjector;

impl RaycastProjector {
  pub fn new() -> Self {
    Self
  }
}

impl Projector for RaycastProjector {
  #[tracing::instrument(skip_all, name = "projection::raycast")]
  fn project(&self, request: &ProjectionRequest<'_>) -> Result<LabelImage> {
    let cloud = request.cloud;
    let (width, height) = (cloud.width, cloud.height);
    let mut labels = LabelImage::unlabeled(width, height);

    let objects: Vec<(InstanceId, &VoxelOctree, Option<DAabb3>)> = request
      .store
      .objects()
      .map(|(id, entry)| (id, entry.tree(), entry.bbox()))
      .collect();
    if objects.is_empty() || labels.is_empty() {
      return Ok(labels);
    }

    let pixels: Vec<(usize, usize)> = sampled_pixels(width, height).collect();
    let zbuffer: Vec<AtomicU64> = (0..width * height).map(|_| AtomicU64::new(EMPTY)).collect();
    let origin = request.origin();

    {
      let _span = tracing::info_span!("zbuffer", instances = objects.len(), pixels = pixels.len())
        .entered();
      objects.par_iter().for_each(|&(id, tree, bbox)| {
        pixels.par_iter().for_each(|&(row, col)| {
          let point = cloud.get(row, col);
          let hit = if is_valid_point(point) {
            if !bbox.is_some_and(|bbox| bbox.contains_point(point)) {
              return;
            }
            let direction = point - origin;
            tree.cast_ray(origin, direction, Some(RANGE_FACTOR * direction.length()))
          } else {
            let direction = request
              .sensor_to_world
              .transform_vector3(request.intrinsics.back_project(row, col));
            tree.cast_ray(origin, direction, None)
          };
          if let Some(hit) = hit {
            let depth = hit.distance(origin) as f32;
            zbuffer[row * width + col].fetch_min(pack(depth, id), Ordering::Relaxed);
          }
        });
      });
    }

    let _span = tracing::info_span!("stamp").entered();
    labels
      .data
      .par_chunks_mut(width)
      .enumerate()
      .for_each(|(row, out)| {
        for (col, label) in out.iter_mut().enumerate() {
          let nearest = stamp_sources(row, col, width, height)
            .map(|(r, c)| zbuffer[r * width + c].load(Ordering::Relaxed))
            .min()
            .unwrap_or(EMPTY);
          if nearest != EMPTY {
            *label = unpack_id(nearest);
          }
        }
      });
    Ok(labels)
  }
}

/// Sampled pixels whose 3×3 stamp covers `(row, col)`.
fn stamp_sources(
  row: usize,
  col: usize,
  width: usize,
  height: usize,
) -> impl Iterator<Item = (usize, usize)> {
  let rows = row.saturating_sub(1)..=(row + 1).min(height - 1);
  rows
    .filter(|r| r % PIXEL_STRIDE == 0)
    .flat_map(move |r| {
      (col.saturating_sub(1)..=(col + 1).min(width - 1))
        .filter(|c| c % PIXEL_STRIDE == 0)
        .map(move |c| (r, c))
    })
}

#[cfg(test)]
#[path = "raycast_test.rs"]
mod raycast_test;
