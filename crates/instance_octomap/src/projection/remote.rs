//! Projection through an out-of-process renderer.
//!
//! The renderer receives the sensor pose, intrinsics, per-pixel depth and the
//! world-frame grid of every instance, and answers with a label image of the
//! scan's dimensions. Transport is up to the [`RenderService`]
//! implementation.

use glam::DAffine3;

use super::{ProjectionRequest, Projector};
use crate::error::{MapError, Result};
use crate::export::{GridExporter, VoxelGrid};
use crate::types::{is_valid_point, CameraIntrinsics, LabelImage};

/// Payload of one render call.
#[derive(Clone, Debug)]
pub struct RenderRequest {
  pub sensor_to_world: DAffine3,
  pub intrinsics: CameraIntrinsics,
  pub width: usize,
  pub height: usize,
  /// Sensor-frame depth (z) per pixel, NaN where the scan has no return.
  pub depth: Vec<f32>,
  /// World-frame occupied grid of every instance.
  pub grids: Vec<VoxelGrid>,
}

/// External renderer producing predicted label images.
pub trait RenderService: Send + Sync {
  /// Render the instance labels seen from the request pose. Failures are
  /// reported as [`MapError::RenderService`].
  fn render(&self, request: &RenderRequest) -> Result<LabelImage>;
}

impl<T: RenderService + ?Sized> RenderService for Box<T> {
  fn render(&self, request: &RenderRequest) -> Result<LabelImage> {
    (**self).render(request)
  }
}

/// [`Projector`] backed by a [`RenderService`].
pub struct RenderServiceProjector<S> {
  service: S,
  exporter: GridExporter,
}

impl<S: RenderService> RenderServiceProjector<S> {
  /// `exporter` produces the world grids sent with each request.
  pub fn new(service: S, exporter: GridExporter) -> Self {
    Self { service, exporter }
  }

  pub fn service(&self) -> &S {
    &self.service
  }
}

impl<S: RenderService> Projector for RenderServiceProjector<S> {
  #[tracing::instrument(skip_all, name = "projection::remote")]
  fn project(&self, request: &ProjectionRequest<'_>) -> Result<LabelImage> {
    let cloud = request.cloud;
    let world_to_sensor = request.sensor_to_world.inverse();
    let depth = cloud
      .points
      .iter()
      .map(|point| {
        if is_valid_point(*point) {
          world_to_sensor.transform_point3(*point).z as f32
        } else {
          f32::NAN
        }
      })
      .collect();

    let render = RenderRequest {
      sensor_to_world: *request.sensor_to_world,
      intrinsics: *request.intrinsics,
      width: cloud.width,
      height: cloud.height,
      depth,
      grids: self.exporter.world_grids(request.store),
    };
    let labels = self.service.render(&render)?;
    if labels.width != cloud.width
      || labels.height != cloud.height
      || labels.data.len() != cloud.width * cloud.height
    {
      return Err(MapError::RenderService(format!(
        "rendered {}x{} labels for a {}x{} scan",
        labels.width, labels.height, cloud.width, cloud.height
      )));
    }
    Ok(labels)
  }
}

#[cfg(test)]
#[path = "remote_test.rs"]
mod remote_test;
