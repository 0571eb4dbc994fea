use glam::DVec3;

use super::*;

fn sensor() -> SensorModel {
  SensorModel::default()
}

fn sample_tree() -> VoxelOctree {
  let mut tree = VoxelOctree::new(0.05, &sensor());
  for i in 0..20 {
    let x = -0.5 + 0.05 * i as f64;
    tree.update_coord(DVec3::new(x, 0.1, 0.3), i % 3 != 0);
    tree.update_coord(DVec3::new(x, -0.2, 0.3), false);
  }
  tree.update_coord(DVec3::new(0.2, 0.1, 0.3), true);
  tree
}

#[test]
fn test_full_roundtrip_preserves_values() {
  let tree = sample_tree();
  let mut bytes = Vec::new();
  tree.write_full(&mut bytes).unwrap();

  let restored = VoxelOctree::read_full(&mut bytes.as_slice(), &sensor()).unwrap();
  assert_eq!(restored.pitch(), tree.pitch());
  assert_eq!(restored.node_count(), tree.node_count());
  assert_eq!(restored.extent(), tree.extent());

  let original: Vec<_> = tree.leaves(TREE_DEPTH).collect();
  let decoded: Vec<_> = restored.leaves(TREE_DEPTH).collect();
  assert_eq!(original, decoded);
}

/// Binary maps keep the occupied/free classification only.
#[test]
fn test_binary_roundtrip_thresholds_leaves() {
  let tree = sample_tree();
  let mut bytes = Vec::new();
  tree.write_binary(&mut bytes).unwrap();

  let restored = VoxelOctree::read_binary(&mut bytes.as_slice(), &sensor()).unwrap();
  let model = *restored.model();
  let original: Vec<_> = tree.leaves(TREE_DEPTH).collect();
  let decoded: Vec<_> = restored.leaves(TREE_DEPTH).collect();

  assert_eq!(original.len(), decoded.len());
  for (before, after) in original.iter().zip(&decoded) {
    assert_eq!(before.key, after.key);
    assert_eq!(before.is_occupied(), after.is_occupied());
    let expected = if before.is_occupied() {
      model.clamp_max
    } else {
      model.clamp_min
    };
    assert_eq!(after.log_odds, expected);
  }
}

#[test]
fn test_empty_tree_roundtrip() {
  let tree = VoxelOctree::new(0.1, &sensor());

  let mut binary = Vec::new();
  tree.write_binary(&mut binary).unwrap();
  assert!(VoxelOctree::read_binary(&mut binary.as_slice(), &sensor())
    .unwrap()
    .is_empty());

  let mut full = Vec::new();
  tree.write_full(&mut full).unwrap();
  let restored = VoxelOctree::read_full(&mut full.as_slice(), &sensor()).unwrap();
  assert!(restored.is_empty());
  assert_eq!(restored.pitch(), 0.1);
}

#[test]
fn test_wrong_magic_is_rejected() {
  let mut bytes = Vec::new();
  sample_tree().write_full(&mut bytes).unwrap();
  let result = VoxelOctree::read_binary(&mut bytes.as_slice(), &sensor());
  assert!(matches!(result, Err(MapError::MalformedMap(_))));
}

#[test]
fn test_truncated_data_is_rejected() {
  let mut bytes = Vec::new();
  sample_tree().write_binary(&mut bytes).unwrap();
  bytes.truncate(bytes.len() - 3);
  let result = VoxelOctree::read_binary(&mut bytes.as_slice(), &sensor());
  assert!(matches!(result, Err(MapError::Serialization(_))));
}
