use super::*;

fn store() -> InstanceStore {
  InstanceStore::new(0.05, SensorModel::default())
}

#[test]
fn test_background_uses_resolution() {
  let mut store = store();
  assert!(store.background().is_none());
  store.ensure_background();

  let entry = store.get(BACKGROUND_ID).unwrap();
  assert_eq!(entry.tree().pitch(), 0.05);
  assert_eq!(entry.class_id(), None);
}

#[test]
fn test_instance_pitch_is_fixed_at_creation() {
  let mut store = store();
  assert!(store.ensure_instance(3, 41, 0.01));
  assert!(!store.ensure_instance(3, 42, 0.02));

  let entry = store.get(3).unwrap();
  assert_eq!(entry.tree().pitch(), 0.01);
  assert_eq!(entry.class_id(), Some(42));
  assert!(entry.is_new());
  assert!(entry.bbox().is_none());
  assert!(entry.centroid().is_none());
}

#[test]
fn test_ids_iterate_ascending() {
  let mut store = store();
  store.ensure_instance(7, 1, 0.01);
  store.ensure_instance(2, 1, 0.01);
  store.ensure_background();
  store.ensure_instance(4, 1, 0.01);

  assert_eq!(store.ids().collect::<Vec<_>>(), vec![-1, 2, 4, 7]);
  assert_eq!(
    store.objects().map(|(id, _)| id).collect::<Vec<_>>(),
    vec![2, 4, 7]
  );
}

/// Bounding boxes only grow.
#[test]
fn test_record_points_unions_bbox() {
  let mut store = store();
  store.ensure_instance(0, 1, 0.01);
  let entry = store.get_mut(0).unwrap();

  entry.record_points(DAabb3::new(DVec3::ZERO, DVec3::ONE), DVec3::splat(0.5));
  assert!(!entry.is_new());
  entry.record_points(
    DAabb3::new(DVec3::splat(2.0), DVec3::splat(3.0)),
    DVec3::splat(2.5),
  );

  assert_eq!(
    entry.bbox(),
    Some(DAabb3::new(DVec3::ZERO, DVec3::splat(3.0)))
  );
  assert_eq!(entry.centroid(), Some(DVec3::splat(2.5)));
}

#[test]
fn test_class_table_excludes_background() {
  let mut store = store();
  store.ensure_background();
  store.ensure_instance(5, 9, 0.01);
  assert_eq!(store.class_table().into_iter().collect::<Vec<_>>(), vec![(5, 9)]);
}

#[test]
fn test_clear_empties_store() {
  let mut store = store();
  store.ensure_background();
  store.ensure_instance(1, 1, 0.01);
  store.clear();
  assert!(store.is_empty());
  assert_eq!(store.ids().count(), 0);
}
