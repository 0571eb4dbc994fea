//! End-to-end scans through `InstanceMapper`.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, SystemTime};

use glam::{DAffine3, DVec3};
use instance_octomap::{
  CameraIntrinsics, ClassEntry, InstanceId, InstanceMapper, LabelImage, MapError, MapperConfig,
  NoEntryRules, ObjectClass, PointCloud, PublishRequest, RenderRequest, RenderService, Scan,
  ScanOutcome, ScanOutput, VoxelOctree, BACKGROUND_ID, UNCERTAIN_ID,
};

const SIZE: usize = 16;
const MUG: u32 = 41;

fn config() -> MapperConfig {
  let mut config = MapperConfig::default();
  config.classes.classes.push(ClassEntry {
    id: MUG,
    name: "mug".into(),
    pitch: 0.01,
  });
  config
}

fn intrinsics() -> CameraIntrinsics {
  CameraIntrinsics {
    fx: SIZE as f64 / 2.0,
    fy: SIZE as f64 / 2.0,
    cx: (SIZE as f64 - 1.0) / 2.0,
    cy: (SIZE as f64 - 1.0) / 2.0,
  }
}

fn in_mug(row: usize, col: usize) -> bool {
  (6..10).contains(&row) && (6..10).contains(&col)
}

/// A mug at depth 1 in front of a wall at depth 2, segmented as `transient`.
fn tabletop_scan(transient: InstanceId) -> Scan {
  let intrinsics = intrinsics();
  let mut points = Vec::with_capacity(SIZE * SIZE);
  let mut labels = LabelImage::unlabeled(SIZE, SIZE);
  for row in 0..SIZE {
    for col in 0..SIZE {
      let ray = intrinsics.back_project(row, col);
      if in_mug(row, col) {
        points.push(ray * 1.0);
        labels.set(row, col, transient);
      } else {
        points.push(ray * 2.0);
        labels.set(row, col, BACKGROUND_ID);
      }
    }
  }
  Scan {
    stamp: SystemTime::now(),
    sensor_to_world: DAffine3::IDENTITY,
    intrinsics,
    cloud: PointCloud::new(SIZE, SIZE, points),
    labels,
    classes: HashMap::from([(transient, MUG)]),
  }
}

fn processed(outcome: ScanOutcome) -> ScanOutput {
  match outcome {
    ScanOutcome::Processed(output) => *output,
    other => panic!("expected a processed scan, got {:?}", other),
  }
}

#[test]
fn tracked_object_keeps_identity_across_scans() {
  let mut mapper = InstanceMapper::new(config()).unwrap();
  let mug_point = intrinsics().back_project(6, 6);

  let mut previous_bbox = None;
  let mut previous_occupancy = 0.0;
  for transient in [5, 9, 2] {
    let output = processed(mapper.process_scan(tabletop_scan(transient)).unwrap());
    assert_eq!(output.mapping.get(&transient), Some(&0));
    assert_eq!(
      output.classes,
      vec![ObjectClass {
        instance_id: 0,
        class_id: MUG,
        confidence: 1.0
      }]
    );

    let entry = mapper.store().get(0).unwrap();
    let bbox = entry.bbox().unwrap();
    if let Some(previous) = previous_bbox {
      assert!(bbox.contains(&previous));
    }
    previous_bbox = Some(bbox);

    let occupancy = entry.tree().occupancy_at(mug_point).unwrap();
    assert!(occupancy >= previous_occupancy);
    previous_occupancy = occupancy;
  }
  assert_eq!(mapper.tracker().next_id(), 1);
  assert_eq!(mapper.store().len(), 2);

  // The wall is background, the space in front of it is free.
  let background = mapper.store().background().unwrap();
  let wall = intrinsics().back_project(0, 0) * 2.0;
  assert!(background.occupancy_at(wall).unwrap() > 0.5);
  assert!(background.occupancy_at(wall * 0.43).unwrap() < 0.5);
}

#[test]
fn grids_are_in_range_and_disjoint() {
  let mut config = config();
  config.noentry = NoEntryRules {
    ground_as_noentry: true,
    free_as_noentry: true,
  };
  // Sensor one metre above the ground looking down.
  let pose = DAffine3::from_translation(DVec3::new(0.0, 0.0, 1.0))
    * DAffine3::from_rotation_x(std::f64::consts::PI);
  let mut mapper = InstanceMapper::new(config).unwrap();

  for transient in [5, 6] {
    let mut scan = tabletop_scan(transient);
    scan.sensor_to_world = pose;
    let output = processed(mapper.process_scan(scan).unwrap());
    assert_eq!(output.grids.len(), output.grids_noentry.len());
    for (occupied, noentry) in output.grids.iter().zip(&output.grids_noentry) {
      assert_eq!(occupied.instance_id, noentry.instance_id);
      assert_eq!(occupied.dims, [32, 32, 32]);
      assert!(!occupied.is_empty());
      assert!(!noentry.is_empty());
      let occupied_cells: HashSet<u32> = occupied.indices.iter().copied().collect();
      for &index in occupied.indices.iter().chain(&noentry.indices) {
        assert!(index < 32 * 32 * 32);
      }
      assert!(noentry
        .indices
        .iter()
        .all(|index| !occupied_cells.contains(index)));
    }
  }
}

#[test]
fn reset_empties_map_and_rejects_older_scans() {
  let mut mapper = InstanceMapper::new(config()).unwrap();
  processed(mapper.process_scan(tabletop_scan(5)).unwrap());
  assert!(!mapper.store().is_empty());

  let old = tabletop_scan(5);
  std::thread::sleep(Duration::from_millis(5));
  mapper.reset();
  assert!(mapper.store().is_empty());

  assert!(matches!(mapper.process_scan(old).unwrap(), ScanOutcome::Stale));
  assert!(mapper.store().is_empty());
  assert!(mapper.class_summary().is_empty());
}

#[test]
fn unknown_class_fails_without_mutation() {
  let mut mapper = InstanceMapper::new(config()).unwrap();
  processed(mapper.process_scan(tabletop_scan(5)).unwrap());
  let nodes_before: Vec<usize> = mapper
    .store()
    .iter()
    .map(|(_, entry)| entry.tree().node_count())
    .collect();

  // A second object without a class entry.
  let mut scan = tabletop_scan(5);
  scan.labels.set(0, 0, 77);
  scan.labels.set(0, 1, 77);
  let result = mapper.process_scan(scan);
  assert!(matches!(
    result,
    Err(MapError::UnknownInstanceClass { instance_id: 1 })
  ));
  let nodes_after: Vec<usize> = mapper
    .store()
    .iter()
    .map(|(_, entry)| entry.tree().node_count())
    .collect();
  assert_eq!(nodes_before, nodes_after);
  assert_eq!(mapper.store().len(), 2);
}

#[test]
fn published_binary_map_decodes() {
  let mut mapper = InstanceMapper::new(config()).unwrap();
  mapper.set_publish_request(PublishRequest {
    binary_map: true,
    ..Default::default()
  });
  let output = processed(mapper.process_scan(tabletop_scan(5)).unwrap());
  let bytes = output.published.binary_map.unwrap();
  let decoded =
    VoxelOctree::read_binary(&mut bytes.as_slice(), &mapper.config().sensor_model).unwrap();

  let wall = intrinsics().back_project(0, 0) * 2.0;
  assert!(decoded.occupancy_at(wall).unwrap() > 0.5);
  assert_eq!(decoded.pitch(), mapper.config().resolution);
}

/// A renderer that never predicts anything.
struct BlindRenderer;

impl RenderService for BlindRenderer {
  fn render(&self, request: &RenderRequest) -> instance_octomap::Result<LabelImage> {
    Ok(LabelImage::filled(request.width, request.height, UNCERTAIN_ID))
  }
}

/// Without predictions every region is new; ids are never reused.
#[test]
fn ids_are_allocated_monotonically() {
  let config = MapperConfig {
    use_render_service: true,
    ..config()
  };
  let mut mapper = InstanceMapper::with_render_service(config, BlindRenderer).unwrap();
  let mut seen = Vec::new();
  for _ in 0..3 {
    let output = processed(mapper.process_scan(tabletop_scan(5)).unwrap());
    seen.push(output.mapping[&5]);
  }
  assert_eq!(seen, vec![0, 1, 2]);
  assert_eq!(mapper.store().ids().collect::<Vec<_>>(), vec![BACKGROUND_ID, 0, 1, 2]);
  assert_eq!(mapper.class_summary().len(), 3);
}
