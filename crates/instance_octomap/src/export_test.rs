use std::collections::HashSet;

use super::*;
use crate::constants::{GRID_SIZE_CB, GRID_SIZE_SQ};
use crate::octree::DAabb3;

fn config(rules: NoEntryRules) -> MapperConfig {
  MapperConfig {
    noentry: rules,
    ..Default::default()
  }
}

fn store() -> InstanceStore {
  InstanceStore::new(0.05, Default::default())
}

/// Add instance `id` (pitch 0.01) with `hits` hits at `point`, centered on it.
fn add_instance(store: &mut InstanceStore, id: InstanceId, point: DVec3, hits: usize) {
  store.ensure_instance(id, 41, 0.01);
  let entry = store.get_mut(id).unwrap();
  for _ in 0..hits {
    entry.tree.update_coord(point, true);
  }
  entry.record_points(DAabb3::from_point(point), point);
}

#[test]
fn test_empty_store_exports_nothing() {
  let exporter = GridExporter::new(&MapperConfig::default());
  let store = store();
  assert!(exporter.world_grids(&store).is_empty());
  let (grids, noentry) = exporter.sensor_grids(&store, &DAffine3::IDENTITY);
  assert!(grids.is_empty());
  assert!(noentry.is_empty());
}

/// Background alone produces no grids.
#[test]
fn test_background_is_not_exported() {
  let exporter = GridExporter::new(&MapperConfig::default());
  let mut store = store();
  store.ensure_background().tree.update_coord(DVec3::ZERO, true);
  assert!(exporter.world_grids(&store).is_empty());
}

#[test]
fn test_world_grid_centered_on_centroid() {
  let exporter = GridExporter::new(&MapperConfig::default());
  let mut store = store();
  add_instance(&mut store, 3, DVec3::new(1.0, 0.0, 0.5), 1);

  let grids = exporter.world_grids(&store);
  assert_eq!(grids.len(), 1);
  let grid = &grids[0];
  assert_eq!(grid.instance_id, 3);
  assert_eq!(grid.class_id, Some(41));
  assert_eq!(grid.pitch, 0.01);
  assert_eq!(grid.dims, [32, 32, 32]);
  assert_eq!(grid.frame_id, "map");

  let origin = DVec3::from_array(grid.origin);
  assert!((origin - DVec3::new(0.845, -0.155, 0.345)).abs().max_element() < 1e-9);
  assert_eq!(grid.indices, vec![coord_to_index(16, 16, 16) as u32]);
  assert!((grid.values[0] - 0.7).abs() < 1e-6);
  // Cell 16 along each axis holds the voxel containing the hit.
  let center = grid.cell_center(16, 16, 16);
  assert!((center - DVec3::new(1.005, 0.005, 0.505)).abs().max_element() < 1e-9);
}

#[test]
fn test_grid_indices_in_range() {
  let exporter = GridExporter::new(&MapperConfig::default());
  let mut store = store();
  let center = DVec3::new(0.3, 0.2, 0.1);
  store.ensure_instance(0, 1, 0.01);
  let entry = store.get_mut(0).unwrap();
  for i in 0..40 {
    let point = DVec3::new(0.105 + i as f64 * 0.01, 0.205, 0.105);
    entry.tree.update_coord(point, true);
  }
  entry.record_points(DAabb3::from_point(center), center);

  let grid = &exporter.world_grids(&store)[0];
  // The line is clipped to the 32 cells along x.
  assert_eq!(grid.len(), 32);
  assert!(grid.cells().all(|(index, _)| (index as usize) < GRID_SIZE_CB));
}

/// Identity pose: sensor grids match world grids.
#[test]
fn test_sensor_grid_identity_pose_matches_world() {
  let exporter = GridExporter::new(&MapperConfig::default());
  let mut store = store();
  add_instance(&mut store, 3, DVec3::new(1.0, 0.0, 0.5), 1);

  let world = exporter.world_grids(&store);
  let (sensor, noentry) = exporter.sensor_grids(&store, &DAffine3::IDENTITY);
  assert_eq!(sensor[0].indices, world[0].indices);
  assert_eq!(sensor[0].frame_id, "camera_color_optical_frame");
  assert!(noentry[0].is_empty());
}

/// Sensor grid content follows the object, not the sensor.
#[test]
fn test_sensor_grid_under_translation() {
  let exporter = GridExporter::new(&MapperConfig::default());
  let mut store = store();
  let point = DVec3::new(1.0, 0.0, 0.5);
  add_instance(&mut store, 3, point, 1);

  let pose = DAffine3::from_translation(DVec3::new(0.3, -0.2, 0.1));
  let (sensor, _) = exporter.sensor_grids(&store, &pose);
  let grid = &sensor[0];
  let origin = DVec3::from_array(grid.origin);
  assert!((origin - (point - DVec3::new(0.3, -0.2, 0.1) - DVec3::splat(0.155))).length() < 1e-9);
  assert_eq!(grid.len(), 1);
}

#[test]
fn test_ground_rule_marks_below_ground() {
  let rules = NoEntryRules {
    ground_as_noentry: true,
    free_as_noentry: false,
  };
  let exporter = GridExporter::new(&config(rules));
  let mut store = store();
  add_instance(&mut store, 0, DVec3::new(0.5, 0.5, 0.002), 1);

  let (occupied, noentry) = exporter.sensor_grids(&store, &DAffine3::IDENTITY);
  assert_eq!(noentry[0].len(), GRID_SIZE_SQ * 16);
  assert!(noentry[0].values.iter().all(|value| *value == 0.97));
  assert_eq!(occupied[0].indices, vec![coord_to_index(16, 16, 16) as u32]);

  let occupied: HashSet<u32> = occupied[0].indices.iter().copied().collect();
  assert!(noentry[0].indices.iter().all(|index| !occupied.contains(index)));
}

#[test]
fn test_free_rule_uses_background() {
  let mut store = store();
  let point = DVec3::new(0.5, 0.5, 0.5);
  add_instance(&mut store, 0, point, 1);
  // Background free voxel covering the cell next to the object.
  let free = DVec3::new(0.515, 0.505, 0.505);
  store.ensure_background().tree.update_coord(free, false);

  let without = GridExporter::new(&MapperConfig::default());
  assert!(without.sensor_grids(&store, &DAffine3::IDENTITY).1[0].is_empty());

  let rules = NoEntryRules {
    ground_as_noentry: false,
    free_as_noentry: true,
  };
  let with = GridExporter::new(&config(rules));
  let (occupied, noentry) = with.sensor_grids(&store, &DAffine3::IDENTITY);
  let noentry = &noentry[0];

  let neighbour = coord_to_index(17, 16, 16) as u32;
  let position = noentry.indices.iter().position(|index| *index == neighbour).unwrap();
  assert!((noentry.values[position] - 0.6).abs() < 1e-6);
  // The object's own occupied cell is never no-entry.
  assert!(!noentry.indices.contains(&occupied[0].indices[0]));
}

/// Saturated cells of another object are that object's territory.
#[test]
fn test_other_saturated_tree_is_noentry() {
  let exporter = GridExporter::new(&MapperConfig::default());
  let mut store = store();
  add_instance(&mut store, 0, DVec3::new(0.5, 0.5, 0.5), 1);
  add_instance(&mut store, 1, DVec3::new(0.525, 0.505, 0.505), 30);
  add_instance(&mut store, 2, DVec3::new(0.485, 0.505, 0.505), 1);

  let (_, noentry) = exporter.sensor_grids(&store, &DAffine3::IDENTITY);
  let grid = &noentry[0];
  assert_eq!(grid.instance_id, 0);
  assert_eq!(grid.indices, vec![coord_to_index(18, 16, 16) as u32]);
  assert!((grid.values[0] - 0.97).abs() < 1e-6);
}
