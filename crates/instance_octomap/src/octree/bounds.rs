//! Axis-aligned bounding box with double precision.

use glam::DVec3;

/// Double-precision axis-aligned bounding box.
///
/// Used as the spatial extent of an instance. Ray casts against an instance
/// tree are skipped for points outside its extent.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DAabb3 {
	/// Minimum corner (inclusive).
	pub min: DVec3,
	/// Maximum corner (inclusive).
	pub max: DVec3,
}

impl DAabb3 {
	/// Create a new AABB from min and max corners.
	///
	/// # Panics
	/// Debug-asserts that min <= max on all axes.
	pub fn new(min: DVec3, max: DVec3) -> Self {
		debug_assert!(
			min.x <= max.x && min.y <= max.y && min.z <= max.z,
			"AABB min must be <= max on all axes"
		);
		Self { min, max }
	}

	/// Degenerate AABB containing a single point.
	pub fn from_point(point: DVec3) -> Self {
		Self {
			min: point,
			max: point,
		}
	}

	/// Expand to include a point.
	#[inline]
	pub fn encapsulate(&mut self, point: DVec3) {
		self.min = self.min.min(point);
		self.max = self.max.max(point);
	}

	/// Smallest AABB containing both.
	#[inline]
	pub fn union(&self, other: &DAabb3) -> DAabb3 {
		Self {
			min: self.min.min(other.min),
			max: self.max.max(other.max),
		}
	}

	/// Check if this AABB contains another entirely.
	#[inline]
	pub fn contains(&self, other: &DAabb3) -> bool {
		self.contains_point(other.min) && self.contains_point(other.max)
	}

	/// Check if this AABB contains a point.
	#[inline]
	pub fn contains_point(&self, point: DVec3) -> bool {
		point.x >= self.min.x
			&& point.x <= self.max.x
			&& point.y >= self.min.y
			&& point.y <= self.max.y
			&& point.z >= self.min.z
			&& point.z <= self.max.z
	}

	/// Get the center of the AABB.
	#[inline]
	pub fn center(&self) -> DVec3 {
		(self.min + self.max) * 0.5
	}
}
