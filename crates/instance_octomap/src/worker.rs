//! MapWorker - background scan processing, newest scan first.
//!
//! # Flow
//!
//! ```text
//! Caller thread                       Worker thread
//! ┌──────────────┐
//! │ submit(scan) │──► scans ──┐
//! └──────────────┘            ▼
//!                       ┌──────────────────────┐
//!                       │ drain to newest      │  older pending scans skipped
//!                       └──────────┬───────────┘
//!                                  ▼   (mapper lock held from here)
//!                       ┌──────────────────────┐
//!                       │ stale? / pose wait   │  bounded by pose_timeout_ms
//!                       └──────────┬───────────┘
//!                                  ▼
//!                       ┌──────────────────────┐
//!                       │ process_scan         │
//!                       └──────────┬───────────┘
//! ┌──────────────┐                 │
//! │ poll_event() │◄── events ──────┘
//! └──────────────┘
//! ```
//!
//! There is no request queue: a scan that arrives while another is being
//! processed replaces any scan still waiting. `reset()` takes the same lock
//! as processing, so it never interleaves with a scan.

use std::collections::HashMap;
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime};

use crossbeam_channel::{self as channel, Receiver, RecvTimeoutError, Sender, TryRecvError};
use glam::DAffine3;

use crate::constants::{ClassId, InstanceId};
use crate::error::{MapError, Result};
use crate::mapper::{ScanOutcome, SharedMapper};
use crate::types::{CameraIntrinsics, LabelImage, PointCloud, Scan};

/// A scan whose sensor pose is still to be resolved.
#[derive(Clone, Debug)]
pub struct ScanInput {
  pub stamp: SystemTime,
  pub intrinsics: CameraIntrinsics,
  /// Points in the sensor frame.
  pub cloud: PointCloud,
  /// Transient segmentation ids.
  pub labels: LabelImage,
  /// Transient id to class id.
  pub classes: HashMap<InstanceId, ClassId>,
}

impl ScanInput {
  pub fn with_pose(self, sensor_to_world: DAffine3) -> Scan {
    Scan {
      stamp: self.stamp,
      sensor_to_world,
      intrinsics: self.intrinsics,
      cloud: self.cloud,
      labels: self.labels,
      classes: self.classes,
    }
  }
}

/// Looks up the sensor pose in the world frame.
pub trait PoseResolver: Send + 'static {
  /// Pose at `stamp`, waiting at most `timeout`. `None` drops the scan.
  fn resolve(&self, stamp: SystemTime, timeout: Duration) -> Option<DAffine3>;
}

/// A sensor that never moves.
#[derive(Clone, Copy, Debug)]
pub struct StaticPose(pub DAffine3);

impl PoseResolver for StaticPose {
  fn resolve(&self, _stamp: SystemTime, _timeout: Duration) -> Option<DAffine3> {
    Some(self.0)
  }
}

impl<F> PoseResolver for F
where
  F: Fn(SystemTime, Duration) -> Option<DAffine3> + Send + 'static,
{
  fn resolve(&self, stamp: SystemTime, timeout: Duration) -> Option<DAffine3> {
    self(stamp, timeout)
  }
}

/// Reported for every scan the worker picked up.
#[derive(Debug)]
pub enum WorkerEvent {
  Outcome {
    stamp: SystemTime,
    outcome: ScanOutcome,
  },
  /// The scan broke the input contract; the map is unchanged.
  Failed { stamp: SystemTime, error: MapError },
}

/// Owns the worker thread feeding a [`SharedMapper`].
pub struct MapWorker {
  mapper: SharedMapper,
  scans: Option<Sender<ScanInput>>,
  events: Receiver<WorkerEvent>,
  handle: Option<JoinHandle<()>>,
}

impl MapWorker {
  /// Start the worker thread.
  pub fn spawn<P: PoseResolver>(mapper: SharedMapper, poses: P) -> Result<Self> {
    let (scan_tx, scan_rx) = channel::unbounded();
    let (event_tx, event_rx) = channel::unbounded();
    let handle = {
      let mapper = mapper.clone();
      std::thread::Builder::new()
        .name("octomap-worker".into())
        .spawn(move || run_worker(mapper, poses, scan_rx, event_tx))?
    };
    Ok(Self {
      mapper,
      scans: Some(scan_tx),
      events: event_rx,
      handle: Some(handle),
    })
  }

  pub fn mapper(&self) -> &SharedMapper {
    &self.mapper
  }

  /// Hand a scan to the worker. Returns false once the worker has stopped.
  pub fn submit(&self, scan: ScanInput) -> bool {
    self
      .scans
      .as_ref()
      .is_some_and(|scans| scans.send(scan).is_ok())
  }

  /// Next event, if one is ready (non-blocking).
  pub fn poll_event(&self) -> Option<WorkerEvent> {
    match self.events.try_recv() {
      Ok(event) => Some(event),
      Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
    }
  }

  /// Next event, waiting at most `timeout`.
  pub fn wait_event(&self, timeout: Duration) -> Option<WorkerEvent> {
    match self.events.recv_timeout(timeout) {
      Ok(event) => Some(event),
      Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
    }
  }

  /// Clear the map. Waits for a scan in progress to finish.
  pub fn reset(&self) {
    self.mapper.lock().reset();
  }

  /// Stop accepting scans, finish pending work and join the thread.
  pub fn shutdown(mut self) {
    self.stop();
  }

  fn stop(&mut self) {
    self.scans = None;
    if let Some(handle) = self.handle.take() {
      if handle.join().is_err() {
        tracing::error!("map worker panicked");
      }
    }
  }
}

impl Drop for MapWorker {
  fn drop(&mut self) {
    self.stop();
  }
}

fn run_worker<P: PoseResolver>(
  mapper: SharedMapper,
  poses: P,
  scans: Receiver<ScanInput>,
  events: Sender<WorkerEvent>,
) {
  while let Ok(mut scan) = scans.recv() {
    let mut skipped = 0u64;
    while let Ok(newer) = scans.try_recv() {
      scan = newer;
      skipped += 1;
    }

    let stamp = scan.stamp;
    let result = {
      let mut mapper = mapper.lock();
      if skipped > 0 {
        tracing::debug!(skipped, "superseded scans skipped");
        mapper.metrics_mut().skipped += skipped;
      }
      let timeout = Duration::from_millis(mapper.config().pose_timeout_ms);
      if stamp < mapper.reset_stamp() {
        tracing::debug!("scan predates the last reset, dropped");
        mapper.metrics_mut().stale += 1;
        Ok(ScanOutcome::Stale)
      } else {
        match poses.resolve(stamp, timeout) {
          Some(pose) => mapper.process_scan(scan.with_pose(pose)),
          None => {
            tracing::warn!(timeout_ms = timeout.as_millis() as u64, "sensor pose unavailable, scan dropped");
            mapper.metrics_mut().pose_dropped += 1;
            Ok(ScanOutcome::PoseUnavailable)
          }
        }
      }
    };

    let event = match result {
      Ok(outcome) => WorkerEvent::Outcome { stamp, outcome },
      Err(error) => {
        tracing::error!(error = %error, "scan rejected");
        WorkerEvent::Failed { stamp, error }
      }
    };
    // Receiver dropped means nobody listens; keep mapping.
    let _ = events.send(event);
  }
  tracing::debug!("map worker stopped");
}

#[cfg(test)]
#[path = "worker_test.rs"]
mod worker_test;
