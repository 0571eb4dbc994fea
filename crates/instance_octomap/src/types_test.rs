use super::*;

#[test]
fn test_check_layout() {
  let cloud = PointCloud::invalid(2, 2);
  assert!(check_layout(&cloud, &LabelImage::unlabeled(2, 2)).is_ok());
  assert!(check_layout(&cloud, &LabelImage::unlabeled(4, 1)).is_err());

  let short = LabelImage {
    width: 2,
    height: 2,
    data: vec![0; 3],
  };
  assert!(matches!(
    check_layout(&cloud, &short),
    Err(MapError::LayoutMismatch { points: 4, labels: 3, .. })
  ));
}

#[test]
fn test_sampled_pixels_even_rows_and_cols() {
  let pixels: Vec<(usize, usize)> = sampled_pixels(5, 3).collect();
  assert_eq!(
    pixels,
    vec![(0, 0), (0, 2), (0, 4), (2, 0), (2, 2), (2, 4)]
  );
  assert_eq!(sampled_pixels(0, 4).count(), 0);
}

#[test]
fn test_back_project_principal_point() {
  let intrinsics = CameraIntrinsics {
    fx: 100.0,
    fy: 50.0,
    cx: 20.0,
    cy: 10.0,
  };
  assert_eq!(intrinsics.back_project(10, 20), DVec3::new(0.0, 0.0, 1.0));
  assert_eq!(intrinsics.back_project(0, 120), DVec3::new(1.0, -0.2, 1.0));
}

#[test]
fn test_label_image_indexing() {
  let mut image = LabelImage::unlabeled(4, 2);
  assert!(image.data.iter().all(|&id| id == UNCERTAIN_ID));
  image.set(1, 3, 7);
  assert_eq!(image.get(1, 3), 7);
  assert_eq!(image.data[7], 7);
  assert_eq!(image.len(), 8);
}

#[test]
fn test_transform_keeps_invalid_points() {
  let mut cloud = PointCloud::invalid(2, 1);
  cloud.set(0, 0, DVec3::new(1.0, 0.0, 0.0));
  let moved = cloud.transformed(&DAffine3::from_translation(DVec3::new(0.0, 2.0, 0.0)));

  assert_eq!(moved.get(0, 0), DVec3::new(1.0, 2.0, 0.0));
  assert!(!is_valid_point(moved.get(0, 1)));
}
