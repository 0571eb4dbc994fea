//! IdentityTracker - transient segmentation ids to persistent instance ids.
//!
//! # Association
//!
//! ```text
//! reference (predicted)     target (segmented)
//! ┌─────────────┐           ┌─────────────┐
//! │  3 3 . . .  │           │  a a a . .  │   IoU(a, 3) = 0.8  -> a keeps 3
//! │  3 3 . 5 5  │           │  a a . b b  │   IoU(b, 5) = 0.4  -> b is new
//! └─────────────┘           └─────────────┘
//! ```
//!
//! A region keeps a predicted identity only when exactly one reference
//! instance overlaps it with IoU above the threshold. Candidates are granted
//! by descending IoU and each reference id is granted at most once per frame;
//! every other region receives a fresh id from a monotonic counter.
//!
//! [`IdentityTracker::associate`] only computes a frame; the counter and the
//! class table advance when the frame is passed to
//! [`IdentityTracker::commit`], so a scan rejected downstream leaves no trace.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::constants::{ClassId, InstanceId, UNCERTAIN_ID};
use crate::types::LabelImage;

/// Result of resolving one frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrackedFrame {
  /// Transient id to persistent id, for every region in the frame.
  pub mapping: BTreeMap<InstanceId, InstanceId>,
  /// Persistent id to class id, including ids not observed this frame.
  pub classes: BTreeMap<InstanceId, ClassId>,
  /// Counter value once this frame is committed.
  pub next_id: InstanceId,
}

#[derive(Clone, Copy, Debug)]
struct Candidate {
  region: InstanceId,
  reference: InstanceId,
  iou: f64,
}

/// Persistent identity allocation across frames.
#[derive(Clone, Debug)]
pub struct IdentityTracker {
  threshold: f64,
  next_id: InstanceId,
  known_classes: BTreeMap<InstanceId, ClassId>,
}

impl IdentityTracker {
  pub fn new(association_threshold: f64) -> Self {
    Self {
      threshold: association_threshold,
      next_id: 0,
      known_classes: BTreeMap::new(),
    }
  }

  /// Next id the counter would hand out.
  #[inline]
  pub fn next_id(&self) -> InstanceId {
    self.next_id
  }

  /// Class of every persistent id seen so far.
  #[inline]
  pub fn known_classes(&self) -> &BTreeMap<InstanceId, ClassId> {
    &self.known_classes
  }

  /// Forget all identities and restart the counter.
  pub fn reset(&mut self) {
    self.next_id = 0;
    self.known_classes.clear();
  }

  /// Resolve and commit in one step.
  pub fn resolve(
    &mut self,
    reference: &LabelImage,
    target: &mut LabelImage,
    transient_classes: &HashMap<InstanceId, ClassId>,
  ) -> TrackedFrame {
    let frame = self.associate(reference, target, transient_classes);
    self.commit(&frame);
    frame
  }

  /// Adopt the counter and class table of a resolved frame.
  pub fn commit(&mut self, frame: &TrackedFrame) {
    self.next_id = frame.next_id;
    self.known_classes.clone_from(&frame.classes);
  }

  /// Resolve the regions of `target` against `reference` and rewrite
  /// `target` in place with persistent ids. Negative ids pass through.
  ///
  /// A reference with a different layout predicts nothing, so every region
  /// gets a fresh id. The tracker itself is not modified.
  #[tracing::instrument(skip_all, name = "tracking::associate")]
  pub fn associate(
    &self,
    reference: &LabelImage,
    target: &mut LabelImage,
    transient_classes: &HashMap<InstanceId, ClassId>,
  ) -> TrackedFrame {
    let aligned = reference.width == target.width
      && reference.height == target.height
      && reference.len() == target.len();
    if !aligned {
      tracing::warn!(
        reference = reference.len(),
        target = target.len(),
        "reference layout differs from the frame, ignored"
      );
    }

    let mut region_area: BTreeMap<InstanceId, usize> = BTreeMap::new();
    let mut reference_area: HashMap<InstanceId, usize> = HashMap::new();
    let mut overlap: HashMap<(InstanceId, InstanceId), usize> = HashMap::new();
    for (index, &region) in target.data.iter().enumerate() {
      let predicted = if aligned {
        reference.data[index]
      } else {
        UNCERTAIN_ID
      };
      if region >= 0 {
        *region_area.entry(region).or_default() += 1;
      }
      if predicted >= 0 {
        *reference_area.entry(predicted).or_default() += 1;
        if region >= 0 {
          *overlap.entry((region, predicted)).or_default() += 1;
        }
      }
    }

    let mut above: BTreeMap<InstanceId, Vec<Candidate>> = BTreeMap::new();
    for (&(region, predicted), &intersection) in &overlap {
      let union = region_area[&region] + reference_area[&predicted] - intersection;
      let iou = intersection as f64 / union as f64;
      if iou > self.threshold {
        above.entry(region).or_default().push(Candidate {
          region,
          reference: predicted,
          iou,
        });
      }
    }
    let mut candidates: Vec<Candidate> = above
      .into_values()
      .filter(|matches| matches.len() == 1)
      .map(|matches| matches[0])
      .collect();
    candidates.sort_by(|a, b| {
      b.iou
        .total_cmp(&a.iou)
        .then(a.region.cmp(&b.region))
        .then(a.reference.cmp(&b.reference))
    });

    let mut mapping = BTreeMap::new();
    let mut granted = HashSet::new();
    for candidate in candidates {
      if granted.insert(candidate.reference) {
        mapping.insert(candidate.region, candidate.reference);
      }
    }
    let mut next_id = self.next_id;
    for &region in region_area.keys() {
      if !mapping.contains_key(&region) {
        mapping.insert(region, next_id);
        next_id += 1;
      }
    }

    for label in target.data.iter_mut().filter(|label| **label >= 0) {
      *label = mapping[&*label];
    }

    let mut classes = self.known_classes.clone();
    for (region, persistent) in &mapping {
      if let Some(&class_id) = transient_classes.get(region) {
        classes.insert(*persistent, class_id);
      }
    }

    tracing::debug!(
      regions = mapping.len(),
      kept = granted.len(),
      next_id,
      "resolved identities"
    );
    TrackedFrame {
      mapping,
      classes,
      next_id,
    }
  }
}

#[cfg(test)]
#[path = "tracking_test.rs"]
mod tracking_test;
