//! instance_octomap - multi-instance probabilistic occupancy mapping
//!
//! Builds a live 3D map from a stream of registered point-cloud scans whose
//! pixels carry object-instance labels. Every tracked object gets its own
//! occupancy octree (pitch chosen by its class) next to one background tree,
//! with a bounding box and centroid kept current per object.
//!
//! # Per-Scan Pipeline
//!
//! ```text
//! Projector ──► IdentityTracker ──► ScanInserter ──► GridExporter ──► MapPublisher
//! (predict)     (transient →        (free/occupied    (32³ grids,      (markers,
//!                persistent ids)     per instance)     no-entry)        map codec)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use instance_octomap::{InstanceMapper, MapperConfig, ScanOutcome};
//!
//! let mut mapper = InstanceMapper::new(MapperConfig::load(path)?)?;
//! if let ScanOutcome::Processed(output) = mapper.process_scan(scan)? {
//!     for grid in &output.grids {
//!         println!("instance {} -> {} cells", grid.instance_id, grid.len());
//!     }
//! }
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod export;
pub mod insertion;
pub mod mapper;
pub mod metrics;
pub mod octree;
pub mod projection;
pub mod publish;
pub mod store;
pub mod tracking;
pub mod types;
pub mod worker;

#[cfg(test)]
mod test_utils;

// Re-export commonly used items
pub use config::{ClassCatalog, ClassEntry, MapperConfig, NoEntryRules, SensorModel};
pub use constants::{ClassId, InstanceId, BACKGROUND_ID, GRID_SIZE, UNCERTAIN_ID};
pub use error::{MapError, Result};
pub use export::{GridExporter, VoxelGrid};
pub use insertion::{InsertionReport, ScanInserter};
pub use mapper::{InstanceMapper, ScanOutcome, ScanOutput, SharedMapper};
pub use metrics::{MapMetrics, RollingWindow, Stage};
pub use octree::{DAabb3, VoxelKey, VoxelOctree};
pub use projection::{
  ProjectionRequest, Projector, RaycastProjector, RenderRequest, RenderService,
  RenderServiceProjector,
};
pub use publish::{MapPublisher, MarkerSet, PublishRequest, PublishedMap};
pub use store::{InstanceEntry, InstanceStore};
pub use tracking::{IdentityTracker, TrackedFrame};
pub use types::{CameraIntrinsics, LabelImage, ObjectClass, PointCloud, Scan};
pub use worker::{MapWorker, PoseResolver, ScanInput, StaticPose, WorkerEvent};
