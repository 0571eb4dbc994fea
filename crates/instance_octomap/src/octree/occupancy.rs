//! Log-odds occupancy model.
//!
//! ```text
//! P(occupied) = 1 / (1 + exp(-log_odds))
//!
//! log_odds = log(P(occupied) / P(free))
//!
//! Update: log_odds_new = clamp(log_odds_old + log_odds_observation)
//! ```

use crate::config::SensorModel;

/// Log-odds of a probability.
#[inline]
pub fn logodds(probability: f64) -> f32 {
  (probability / (1.0 - probability)).ln() as f32
}

/// Probability of a log-odds value.
#[inline]
pub fn probability(log_odds: f32) -> f64 {
  1.0 - 1.0 / (1.0 + (log_odds as f64).exp())
}

/// Sensor model converted to log-odds increments and clamping bounds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LogOddsModel {
  pub hit: f32,
  pub miss: f32,
  pub clamp_min: f32,
  pub clamp_max: f32,
}

impl LogOddsModel {
  /// Log-odds above which a node counts as occupied (P = 0.5).
  pub const OCCUPIED_THRESHOLD: f32 = 0.0;

  pub fn new(model: &SensorModel) -> Self {
    Self {
      hit: logodds(model.hit),
      miss: logodds(model.miss),
      clamp_min: logodds(model.min),
      clamp_max: logodds(model.max),
    }
  }

  /// Apply one observation to a stored value.
  #[inline]
  pub fn update(&self, log_odds: f32, occupied: bool) -> f32 {
    let delta = if occupied { self.hit } else { self.miss };
    (log_odds + delta).clamp(self.clamp_min, self.clamp_max)
  }

  /// Occupancy of a cell saturated by hits.
  #[inline]
  pub fn saturated_occupancy(&self) -> f64 {
    probability(self.clamp_max)
  }

  #[inline]
  pub fn is_occupied(log_odds: f32) -> bool {
    log_odds > Self::OCCUPIED_THRESHOLD
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_logodds_roundtrip() {
    for p in [0.12, 0.4, 0.5, 0.7, 0.97] {
      assert!((probability(logodds(p)) - p).abs() < 1e-6, "p = {}", p);
    }
    assert_eq!(logodds(0.5), 0.0);
  }

  #[test]
  fn test_update_clamps() {
    let model = LogOddsModel::new(&SensorModel::default());
    let mut value = 0.0;
    for _ in 0..50 {
      value = model.update(value, true);
    }
    assert_eq!(value, model.clamp_max);
    for _ in 0..50 {
      value = model.update(value, false);
    }
    assert_eq!(value, model.clamp_min);
  }

  /// Repeated hits never decrease occupancy.
  #[test]
  fn test_hits_are_monotonic() {
    let model = LogOddsModel::new(&SensorModel::default());
    let mut value = 0.0;
    for _ in 0..20 {
      let next = model.update(value, true);
      assert!(next >= value);
      value = next;
    }
  }

  #[test]
  fn test_saturated_occupancy_matches_max() {
    let model = LogOddsModel::new(&SensorModel::default());
    assert!((model.saturated_occupancy() - 0.97).abs() < 1e-6);
  }
}
