//! Error type for mapping operations.

use thiserror::Error;

use crate::constants::InstanceId;

/// Mapping errors.
///
/// Dropped scans (stale stamp, missing pose) are not errors; they are reported
/// through [`crate::mapper::ScanOutcome`].
#[derive(Error, Debug)]
pub enum MapError {
  /// A persistent instance id reached insertion without a class entry.
  ///
  /// Means the tracker/segmenter contract was broken upstream. The insertion
  /// is aborted before any tree is touched.
  #[error("no class entry for instance id {instance_id}")]
  UnknownInstanceClass { instance_id: InstanceId },

  /// Point cloud and label image disagree in size, or a buffer does not
  /// hold `width * height` entries.
  #[error(
    "cloud is {cloud_width}x{cloud_height} with {points} points but labels are \
     {label_width}x{label_height} with {labels} entries"
  )]
  LayoutMismatch {
    cloud_width: usize,
    cloud_height: usize,
    points: usize,
    label_width: usize,
    label_height: usize,
    labels: usize,
  },

  /// Map (de)serialization failed.
  #[error("map serialization failed: {0}")]
  Serialization(#[source] std::io::Error),

  /// Malformed serialized map.
  #[error("malformed map data: {0}")]
  MalformedMap(String),

  /// External render service call failed.
  #[error("render service error: {0}")]
  RenderService(String),

  /// Invalid configuration value.
  #[error("invalid configuration: {0}")]
  Config(String),

  /// Configuration file could not be parsed.
  #[error("config parse error: {0}")]
  ConfigParse(#[from] toml::de::Error),

  /// I/O error.
  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),
}

/// Result alias for mapping operations.
pub type Result<T> = std::result::Result<T, MapError>;
