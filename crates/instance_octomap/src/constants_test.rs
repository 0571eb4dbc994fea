use super::*;

#[test]
fn test_grid_size_is_power_of_two() {
  assert!(GRID_SIZE.is_power_of_two());
  assert_eq!(GRID_SIZE, 32);
  assert_eq!(GRID_SIZE_CB, 32768);
}

#[test]
fn test_coord_to_index_roundtrip() {
  for x in 0..GRID_SIZE {
    for y in 0..GRID_SIZE {
      for z in 0..GRID_SIZE {
        let idx = coord_to_index(x, y, z);
        assert!(idx < GRID_SIZE_CB);
        assert_eq!((x, y, z), index_to_coord(idx), "Roundtrip failed for ({}, {}, {})", x, y, z);
      }
    }
  }
}

/// Index must match `i * dy * dz + j * dz + k`.
#[test]
fn test_index_matches_row_major_formula() {
  assert_eq!(coord_to_index(1, 2, 3), GRID_SIZE_SQ + 2 * GRID_SIZE + 3);
  assert_eq!(coord_to_index(31, 31, 31), GRID_SIZE_CB - 1);
}

#[test]
fn test_neighbor_offsets_are_unique_and_exclude_center() {
  let mut seen = std::collections::HashSet::new();
  for offset in NEIGHBOR_OFFSETS {
    assert_ne!(offset, (0, 0, 0));
    assert!(seen.insert(offset), "duplicate offset {:?}", offset);
  }
  assert_eq!(seen.len(), 26);
}

#[test]
fn test_reserved_ids() {
  assert_eq!(BACKGROUND_ID, -1);
  assert_eq!(UNCERTAIN_ID, -2);
  assert_eq!(KEY_CENTER, 32768);
}
