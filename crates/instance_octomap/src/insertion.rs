//! ScanInserter - integrates one labeled scan into every instance tree.
//!
//! # Flow
//!
//! ```text
//! sampled pixels (even row/col, valid point, label != -2)
//!        │
//!        │ validate: every label >= 0 has a class, else abort untouched
//!        ▼
//! ┌──────────────────────┐   rayon fold/reduce, per-worker partial sets
//! │ classify             │   free:      background keys along each ray
//! │                      │   occupied:  endpoint key per target tree
//! └──────────┬───────────┘
//!            ▼
//! ┌──────────────────────┐   rayon, one task per tree
//! │ apply                │   background: miss(free - occupied), hit(occupied)
//! │                      │   objects:    hit(occupied)
//! └──────────┬───────────┘
//!            ▼
//!   bbox ∪= scan extent, centroid = scan mean, optional prune
//! ```
//!
//! Object trees never receive misses; free space is only tracked by the
//! background.

use std::collections::{BTreeMap, HashMap, HashSet};

use glam::DVec3;
use rayon::prelude::*;

use crate::config::{ClassCatalog, MapperConfig};
use crate::constants::{ClassId, InstanceId, BACKGROUND_ID, UNCERTAIN_ID};
use crate::error::{MapError, Result};
use crate::octree::{DAabb3, KeyCoder, VoxelKey, VoxelOctree};
use crate::store::InstanceStore;
use crate::types::{check_layout, is_valid_point, sampled_pixels, LabelImage, PointCloud};

/// Summary of one insertion.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InsertionReport {
  /// Points classified (sampled, valid, labeled).
  pub points: usize,
  /// Points beyond `max_range` (only their truncated ray was integrated).
  pub truncated: usize,
  /// Points whose key fell outside a tree's addressable range.
  pub out_of_bounds: usize,
  /// Instance trees created by this scan, ascending.
  pub created: Vec<InstanceId>,
  /// Instance ids observed by this scan, ascending.
  pub observed: Vec<InstanceId>,
  /// Background misses applied.
  pub free_cells: usize,
  /// Hits applied over all trees.
  pub occupied_cells: usize,
  /// Nodes collapsed by pruning.
  pub pruned: usize,
}

/// Running extent and sum of an instance's points.
#[derive(Clone, Copy, Debug)]
struct PointStats {
  extent: DAabb3,
  sum: DVec3,
  count: usize,
}

impl PointStats {
  fn new(point: DVec3) -> Self {
    Self {
      extent: DAabb3::from_point(point),
      sum: point,
      count: 1,
    }
  }

  fn add(&mut self, point: DVec3) {
    self.extent.encapsulate(point);
    self.sum += point;
    self.count += 1;
  }

  fn merge(&mut self, other: &PointStats) {
    self.extent = self.extent.union(&other.extent);
    self.sum += other.sum;
    self.count += other.count;
  }

  fn centroid(&self) -> DVec3 {
    self.sum / self.count as f64
  }
}

/// Per-worker classification result.
#[derive(Default)]
struct Classified {
  free: HashSet<VoxelKey>,
  occupied: HashMap<InstanceId, HashSet<VoxelKey>>,
  stats: HashMap<InstanceId, PointStats>,
  points: usize,
  truncated: usize,
  out_of_bounds: usize,
}

impl Classified {
  fn merge(self, other: Classified) -> Classified {
    // Extend the larger partial.
    let (mut into, from) = if self.free.len() >= other.free.len() {
      (self, other)
    } else {
      (other, self)
    };
    into.free.extend(from.free);
    for (id, keys) in from.occupied {
      into.occupied.entry(id).or_default().extend(keys);
    }
    for (id, stats) in from.stats {
      into
        .stats
        .entry(id)
        .and_modify(|existing| existing.merge(&stats))
        .or_insert(stats);
    }
    into.points += from.points;
    into.truncated += from.truncated;
    into.out_of_bounds += from.out_of_bounds;
    into
  }
}

/// One labeled, valid, sampled point.
#[derive(Clone, Copy)]
struct LabeledPoint {
  point: DVec3,
  id: InstanceId,
}

/// Integrates scans into an [`InstanceStore`].
#[derive(Clone, Debug)]
pub struct ScanInserter {
  max_range: Option<f64>,
  compress: bool,
  catalog: ClassCatalog,
}

impl ScanInserter {
  pub fn new(config: &MapperConfig) -> Self {
    Self {
      max_range: config.range_limit(),
      compress: config.compress_map,
      catalog: config.classes.clone(),
    }
  }

  /// Integrate one scan.
  ///
  /// `cloud` is in the world frame and `labels` holds persistent ids. On
  /// error the store is left untouched.
  #[tracing::instrument(skip_all, name = "insertion::insert")]
  pub fn insert(
    &self,
    store: &mut InstanceStore,
    origin: DVec3,
    cloud: &PointCloud,
    labels: &LabelImage,
    classes: &BTreeMap<InstanceId, ClassId>,
  ) -> Result<InsertionReport> {
    check_layout(cloud, labels)?;

    let points: Vec<LabeledPoint> = sampled_pixels(cloud.width, cloud.height)
      .filter_map(|(row, col)| {
        let id = labels.get(row, col);
        let point = cloud.get(row, col);
        (id != UNCERTAIN_ID && is_valid_point(point)).then_some(LabeledPoint { point, id })
      })
      .collect();

    // Validate before touching the store.
    let mut new_ids: BTreeMap<InstanceId, ClassId> = BTreeMap::new();
    for labeled in points.iter().filter(|labeled| labeled.id >= 0) {
      let Some(&class_id) = classes.get(&labeled.id) else {
        tracing::error!(instance_id = labeled.id, "label without class entry, insertion aborted");
        return Err(MapError::UnknownInstanceClass {
          instance_id: labeled.id,
        });
      };
      new_ids.insert(labeled.id, class_id);
    }

    let mut report = InsertionReport::default();
    store.ensure_background();
    for (&id, &class_id) in &new_ids {
      if store.ensure_instance(id, class_id, self.catalog.pitch_for(class_id)) {
        report.created.push(id);
      }
    }

    let classified = {
      let _span = tracing::info_span!("classify", points = points.len()).entered();
      let coders: HashMap<InstanceId, KeyCoder> = store
        .iter()
        .map(|(id, entry)| (id, *entry.tree().coder()))
        .collect();
      let Some(background) = store.background() else {
        return Ok(report);
      };
      self.classify(&points, origin, background, &coders)
    };

    {
      let _span = tracing::info_span!("apply").entered();
      let Classified {
        free, occupied, ..
      } = &classified;
      let empty: HashSet<VoxelKey> = HashSet::new();
      let counts: Vec<(usize, usize)> = store
        .entries_mut()
        .par_iter_mut()
        .map(|(id, entry)| {
          let hits = occupied.get(id).unwrap_or(&empty);
          apply_updates(&mut entry.tree, *id == BACKGROUND_ID, free, hits)
        })
        .collect();
      for (misses, hits) in counts {
        report.free_cells += misses;
        report.occupied_cells += hits;
      }
    }

    for (id, stats) in &classified.stats {
      if *id == BACKGROUND_ID {
        continue;
      }
      if let Some(entry) = store.get_mut(*id) {
        entry.record_points(stats.extent, stats.centroid());
      }
    }

    if self.compress {
      let _span = tracing::info_span!("prune").entered();
      report.pruned = store.prune_all();
    }

    report.points = classified.points;
    report.truncated = classified.truncated;
    report.out_of_bounds = classified.out_of_bounds;
    report.observed = {
      let mut observed: Vec<InstanceId> = classified.stats.keys().copied().collect();
      observed.sort_unstable();
      observed
    };
    tracing::debug!(
      points = report.points,
      created = report.created.len(),
      free = report.free_cells,
      occupied = report.occupied_cells,
      "scan inserted"
    );
    Ok(report)
  }

  fn classify(
    &self,
    points: &[LabeledPoint],
    origin: DVec3,
    background: &VoxelOctree,
    coders: &HashMap<InstanceId, KeyCoder>,
  ) -> Classified {
    points
      .par_iter()
      .fold(Classified::default, |mut acc, labeled| {
        self.classify_point(&mut acc, labeled, origin, background, coders);
        acc
      })
      .reduce(Classified::default, Classified::merge)
  }

  fn classify_point(
    &self,
    acc: &mut Classified,
    labeled: &LabeledPoint,
    origin: DVec3,
    background: &VoxelOctree,
    coders: &HashMap<InstanceId, KeyCoder>,
  ) {
    let LabeledPoint { point, id } = *labeled;
    acc.points += 1;
    match acc.stats.get_mut(&id) {
      Some(stats) => stats.add(point),
      None => {
        acc.stats.insert(id, PointStats::new(point));
      }
    }

    let offset = point - origin;
    let distance = offset.length();
    let in_range = self.max_range.map_or(true, |range| distance <= range);
    let end = match self.max_range {
      Some(range) if !in_range => origin + offset * (range / distance),
      _ => point,
    };

    match background.ray_keys(origin, end) {
      Some(keys) => acc.free.extend(keys),
      None => acc.out_of_bounds += 1,
    }
    if !in_range {
      acc.truncated += 1;
      return;
    }

    let Some(key) = coders.get(&id).and_then(|coder| coder.coord_to_key(point)) else {
      acc.out_of_bounds += 1;
      return;
    };
    acc.occupied.entry(id).or_default().insert(key);
    if id != BACKGROUND_ID {
      if let Some(background_key) = background.coord_to_key(point) {
        acc.free.insert(background_key);
      }
    }
  }
}

/// Apply one scan's updates to a tree. Returns `(misses, hits)`.
fn apply_updates(
  tree: &mut VoxelOctree,
  is_background: bool,
  free: &HashSet<VoxelKey>,
  occupied: &HashSet<VoxelKey>,
) -> (usize, usize) {
  let mut misses = 0;
  if is_background {
    for key in free.iter().filter(|key| !occupied.contains(key)) {
      tree.update_node(*key, false);
      misses += 1;
    }
  }
  for key in occupied {
    tree.update_node(*key, true);
  }
  (misses, occupied.len())
}

#[cfg(test)]
#[path = "insertion_test.rs"]
mod insertion_test;
