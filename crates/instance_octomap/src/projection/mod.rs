//! Label prediction: which instance the sensor should see at each pixel.
//!
//! ```text
//!   store + pose + cloud ──► Projector ──► LabelImage (reference)
//!                             │
//!                ┌────────────┴────────────┐
//!                ▼                         ▼
//!         RaycastProjector        RenderServiceProjector
//!         (local, rayon)          (out-of-process renderer)
//! ```
//!
//! The background tree never appears in a prediction. Pixels no instance
//! projects onto hold [`crate::constants::UNCERTAIN_ID`].

pub mod raycast;
pub mod remote;

use glam::{DAffine3, DVec3};

use crate::error::Result;
use crate::store::InstanceStore;
use crate::types::{CameraIntrinsics, LabelImage, PointCloud};

pub use raycast::RaycastProjector;
pub use remote::{RenderRequest, RenderService, RenderServiceProjector};

/// Inputs of one projection.
#[derive(Clone, Copy)]
pub struct ProjectionRequest<'a> {
  pub store: &'a InstanceStore,
  pub sensor_to_world: &'a DAffine3,
  pub intrinsics: &'a CameraIntrinsics,
  /// Scan points in the world frame.
  pub cloud: &'a PointCloud,
}

impl ProjectionRequest<'_> {
  #[inline]
  pub fn origin(&self) -> DVec3 {
    self.sensor_to_world.translation
  }
}

/// Predicts a label image from the current map.
pub trait Projector: Send + Sync {
  fn project(&self, request: &ProjectionRequest<'_>) -> Result<LabelImage>;
}

impl<P: Projector + ?Sized> Projector for Box<P> {
  fn project(&self, request: &ProjectionRequest<'_>) -> Result<LabelImage> {
    (**self).project(request)
  }
}
