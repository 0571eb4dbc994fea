//! InstanceMapper - the per-scan pipeline around one [`InstanceStore`].
//!
//! # Flow
//!
//! ```text
//! Scan (sensor frame, transient labels)
//!   │
//!   │ stamp < reset epoch ──────────────────────────► Stale
//!   ▼
//! cloud → world
//!   │
//!   ▼
//! Projector ──── error ─────────────────────────────► ProjectionFailed
//!   │ rendered (predicted persistent labels)
//!   ▼
//! IdentityTracker      transient → persistent, class table (+ stale classes)
//!   │ tracked
//!   ▼
//! ScanInserter         fatal on missing class entry, store untouched
//!   │
//!   ▼
//! GridExporter         sensor-frame grids + no-entry grids
//!   │
//!   ▼
//! MapPublisher         requested outputs only
//!   │
//!   ▼
//! Processed(ScanOutput)
//! ```
//!
//! Share a mapper between the scan worker and a reset handler through
//! [`SharedMapper`]; the mutex is the one exclusive section of the map.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::Mutex;

use crate::config::{MapperConfig, NoEntryRules};
use crate::constants::InstanceId;
use crate::error::{MapError, Result};
use crate::export::{GridExporter, VoxelGrid};
use crate::insertion::{InsertionReport, ScanInserter};
use crate::metrics::{MapMetrics, Stage};
use crate::projection::{
  ProjectionRequest, Projector, RaycastProjector, RenderService, RenderServiceProjector,
};
use crate::publish::{MapPublisher, PublishRequest, PublishedMap};
use crate::store::InstanceStore;
use crate::tracking::IdentityTracker;
use crate::types::{check_layout, LabelImage, ObjectClass, Scan};

/// A mapper behind the exclusive section.
pub type SharedMapper = Arc<Mutex<InstanceMapper>>;

/// Everything one processed scan produced.
#[derive(Clone, Debug)]
pub struct ScanOutput {
  /// Labels predicted from the map before insertion.
  pub rendered: LabelImage,
  /// The scan's labels rewritten to persistent ids.
  pub tracked: LabelImage,
  /// Transient id to persistent id.
  pub mapping: BTreeMap<InstanceId, InstanceId>,
  /// Class summary, ascending id.
  pub classes: Vec<ObjectClass>,
  pub insertion: InsertionReport,
  /// Sensor-frame occupied grids.
  pub grids: Vec<VoxelGrid>,
  /// Sensor-frame no-entry grids, index-aligned with `grids`.
  pub grids_noentry: Vec<VoxelGrid>,
  pub published: PublishedMap,
}

/// Result of offering one scan to the mapper.
#[derive(Clone, Debug)]
pub enum ScanOutcome {
  Processed(Box<ScanOutput>),
  /// Captured before the last reset.
  Stale,
  /// No sensor pose within the timeout.
  PoseUnavailable,
  /// The projector failed; the map is unchanged.
  ProjectionFailed,
}

impl ScanOutcome {
  pub fn is_processed(&self) -> bool {
    matches!(self, ScanOutcome::Processed(_))
  }

  pub fn output(&self) -> Option<&ScanOutput> {
    match self {
      ScanOutcome::Processed(output) => Some(output),
      _ => None,
    }
  }
}

/// Owns the map and runs the scan pipeline.
pub struct InstanceMapper {
  config: MapperConfig,
  store: InstanceStore,
  tracker: IdentityTracker,
  projector: Box<dyn Projector>,
  inserter: ScanInserter,
  exporter: GridExporter,
  publisher: MapPublisher,
  publish_request: PublishRequest,
  reset_stamp: SystemTime,
  metrics: MapMetrics,
}

impl InstanceMapper {
  /// Mapper with the local ray-cast projector.
  ///
  /// Fails when `use_render_service` is set: that needs
  /// [`InstanceMapper::with_render_service`].
  pub fn new(config: MapperConfig) -> Result<Self> {
    if config.use_render_service {
      return Err(MapError::Config(
        "use_render_service is set but no render service was provided".into(),
      ));
    }
    Self::with_projector(config, Box::new(RaycastProjector::new()))
  }

  /// Mapper predicting labels through an external renderer.
  pub fn with_render_service<S: RenderService + 'static>(
    config: MapperConfig,
    service: S,
  ) -> Result<Self> {
    let exporter = GridExporter::new(&config);
    Self::with_projector(config, Box::new(RenderServiceProjector::new(service, exporter)))
  }

  pub fn with_projector(config: MapperConfig, projector: Box<dyn Projector>) -> Result<Self> {
    config.validate()?;
    tracing::info!(
      resolution = config.resolution,
      max_range = config.max_range,
      classes = config.classes.classes.len(),
      "instance mapper created"
    );
    Ok(Self {
      store: InstanceStore::new(config.resolution, config.sensor_model),
      tracker: IdentityTracker::new(config.association_threshold),
      projector,
      inserter: ScanInserter::new(&config),
      exporter: GridExporter::new(&config),
      publisher: MapPublisher::new(&config),
      publish_request: PublishRequest::default(),
      reset_stamp: SystemTime::now(),
      metrics: MapMetrics::new(),
      config,
    })
  }

  /// Wrap in the shared exclusive section.
  pub fn into_shared(self) -> SharedMapper {
    Arc::new(Mutex::new(self))
  }

  pub fn config(&self) -> &MapperConfig {
    &self.config
  }

  pub fn store(&self) -> &InstanceStore {
    &self.store
  }

  pub fn tracker(&self) -> &IdentityTracker {
    &self.tracker
  }

  pub fn metrics(&self) -> &MapMetrics {
    &self.metrics
  }

  pub(crate) fn metrics_mut(&mut self) -> &mut MapMetrics {
    &mut self.metrics
  }

  /// Scans stamped before this are dropped.
  pub fn reset_stamp(&self) -> SystemTime {
    self.reset_stamp
  }

  pub fn publish_request(&self) -> PublishRequest {
    self.publish_request
  }

  /// Choose which outputs each processed scan publishes.
  pub fn set_publish_request(&mut self, request: PublishRequest) {
    self.publish_request = request;
  }

  /// Swap the no-entry toggles. Takes effect from the next export.
  pub fn set_noentry_rules(&mut self, rules: NoEntryRules) {
    tracing::info!(
      ground_as_noentry = rules.ground_as_noentry,
      free_as_noentry = rules.free_as_noentry,
      "no-entry rules updated"
    );
    self.config.noentry = rules;
    self.exporter.set_rules(rules);
  }

  /// Clear every tree and identity, and start a new epoch.
  pub fn reset(&mut self) {
    let instances = self.store.len();
    self.store.clear();
    self.tracker.reset();
    self.reset_stamp = SystemTime::now();
    self.metrics.resets += 1;
    tracing::info!(instances, "map reset");
  }

  /// World-frame grids of every object, as sent to a render service.
  pub fn world_grids(&self) -> Vec<VoxelGrid> {
    self.exporter.world_grids(&self.store)
  }

  /// Every persistent id with its class, confidence 1.
  pub fn class_summary(&self) -> Vec<ObjectClass> {
    summarize(self.tracker.known_classes())
  }

  /// Publish the requested outputs for the current map.
  pub fn publish(&self, request: &PublishRequest) -> PublishedMap {
    self.publisher.publish(&self.store, request)
  }

  /// Run one scan through the pipeline.
  ///
  /// Dropped scans are reported through [`ScanOutcome`]. An error means the
  /// scan violated the input contract; the store is unchanged.
  #[tracing::instrument(skip_all, name = "mapper::process_scan")]
  pub fn process_scan(&mut self, scan: Scan) -> Result<ScanOutcome> {
    if scan.stamp < self.reset_stamp {
      tracing::debug!("scan predates the last reset, dropped");
      self.metrics.stale += 1;
      return Ok(ScanOutcome::Stale);
    }

    let Scan {
      sensor_to_world,
      intrinsics,
      cloud,
      labels,
      classes,
      ..
    } = scan;
    check_layout(&cloud, &labels)?;
    let origin = sensor_to_world.translation;
    let cloud = cloud.transformed(&sensor_to_world);

    let projector = &self.projector;
    let store = &self.store;
    let rendered = self.metrics.time(Stage::Projection, || {
      projector.project(&ProjectionRequest {
        store,
        sensor_to_world: &sensor_to_world,
        intrinsics: &intrinsics,
        cloud: &cloud,
      })
    });
    let rendered = match rendered {
      Ok(rendered) => rendered,
      Err(err) => {
        tracing::warn!(error = %err, "projection failed, scan dropped");
        self.metrics.projection_failed += 1;
        return Ok(ScanOutcome::ProjectionFailed);
      }
    };

    let mut tracked = labels;
    let tracker = &self.tracker;
    let frame = self.metrics.time(Stage::Tracking, || {
      tracker.associate(&rendered, &mut tracked, &classes)
    });

    let inserter = &self.inserter;
    let store = &mut self.store;
    let insertion = self.metrics.time(Stage::Insertion, || {
      inserter.insert(store, origin, &cloud, &tracked, &frame.classes)
    })?;
    self.tracker.commit(&frame);

    let exporter = &self.exporter;
    let store = &self.store;
    let (grids, grids_noentry) = self.metrics.time(Stage::Export, || {
      exporter.sensor_grids(store, &sensor_to_world)
    });

    let publisher = &self.publisher;
    let request = self.publish_request;
    let published = self
      .metrics
      .time(Stage::Publish, || publisher.publish(store, &request));

    self.metrics.processed += 1;
    tracing::debug!(
      instances = self.store.len(),
      points = insertion.points,
      grids = grids.len(),
      "scan processed"
    );
    Ok(ScanOutcome::Processed(Box::new(ScanOutput {
      rendered,
      tracked,
      mapping: frame.mapping,
      classes: summarize(&frame.classes),
      insertion,
      grids,
      grids_noentry,
      published,
    })))
  }
}

fn summarize(classes: &BTreeMap<InstanceId, crate::constants::ClassId>) -> Vec<ObjectClass> {
  classes
    .iter()
    .filter(|(&instance_id, _)| instance_id >= 0)
    .map(|(&instance_id, &class_id)| ObjectClass {
      instance_id,
      class_id,
      confidence: 1.0,
    })
    .collect()
}

#[cfg(test)]
#[path = "mapper_test.rs"]
mod mapper_test;
