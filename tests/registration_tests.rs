// tests/registration_tests.rs

// End-to-end registration scenarios over synthetic clouds with fixed seeds.

use fpcs::{
    DummyVisitor, LARGE_NUMBER, MatchOptions, Matcher, MatrixType, Point3D, Scalar, Strategy,
    UniformDistSampler, VectorType,
};
use nalgebra::{Matrix3, Rotation3, Unit};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{RngExt, SeedableRng};

// Uniformly distributed points on the unit sphere (rejection sampling in
// the cube, then projection).
fn sphere_cloud(n: usize, seed: u64) -> Vec<Point3D> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut cloud = Vec::with_capacity(n);
    while cloud.len() < n {
        let v = VectorType::new(
            rng.random::<Scalar>() * 2.0 - 1.0,
            rng.random::<Scalar>() * 2.0 - 1.0,
            rng.random::<Scalar>() * 2.0 - 1.0,
        );
        let norm = v.norm();
        if norm > 0.1 && norm <= 1.0 {
            cloud.push(Point3D::from_vector(v / norm));
        }
    }
    cloud
}

fn rotated(cloud: &[Point3D], rotation: &Rotation3<Scalar>) -> Vec<Point3D> {
    cloud
        .iter()
        .map(|p| Point3D::from_vector(rotation * p.pos()))
        .collect()
}

fn upper_block(mat: &MatrixType) -> Matrix3<Scalar> {
    mat.fixed_view::<3, 3>(0, 0).into_owned()
}

// Angle (radians) by which `m` deviates from the identity rotation.
fn deviation_angle(m: &Matrix3<Scalar>) -> Scalar {
    (((m.trace() - 1.0) / 2.0).clamp(-1.0, 1.0)).acos()
}

#[test]
#[cfg(not(feature = "multiscale"))]
fn test_identity_recovery() {
    let p = sphere_cloud(1000, 42);
    let mut q = p.clone();

    let mut options = MatchOptions::new();
    options.delta = 0.01;
    options.random_seed = 42;
    options.configure_overlap(1.0).unwrap();

    let mut matcher = Matcher::new(options, Strategy::Super4pcs).unwrap();
    let mut mat = MatrixType::identity();
    let lcp =
        matcher.compute_transformation(&p, &mut q, &mut mat, &UniformDistSampler, &DummyVisitor);

    assert!(lcp >= 0.98, "identical clouds should align fully, lcp {}", lcp);
    let rotation = upper_block(&mat);
    assert!(deviation_angle(&rotation) <= 1e-3);
    assert!(mat.fixed_view::<3, 1>(0, 3).norm() <= 1e-3);
}

#[test]
#[cfg(not(feature = "multiscale"))]
fn test_pure_rotation_recovery() {
    let p = sphere_cloud(1000, 42);
    let axis = Unit::new_normalize(VectorType::new(1.0, 1.0, 1.0));
    let rot = Rotation3::from_axis_angle(&axis, 30.0_f32.to_radians());
    let mut q = rotated(&p, &rot);

    let mut options = MatchOptions::new();
    options.delta = 0.01;
    options.random_seed = 42;
    options.configure_overlap(1.0).unwrap();

    let mut matcher = Matcher::new(options, Strategy::Brute4pcs).unwrap();
    let mut mat = MatrixType::identity();
    let lcp =
        matcher.compute_transformation(&p, &mut q, &mut mat, &UniformDistSampler, &DummyVisitor);

    assert!(lcp >= 0.95, "rotated cloud should register, lcp {}", lcp);

    // The transform maps Q onto P, so its rotation block is the inverse of
    // the applied rotation; composing them must land near the identity.
    let recovered = upper_block(&mat);
    let residual = recovered * rot.matrix();
    assert!(
        deviation_angle(&residual) <= 1.0_f32.to_radians(),
        "recovered rotation off by {} rad",
        deviation_angle(&residual)
    );

    // Returned transform is a valid rigid motion.
    let gram = recovered.transpose() * recovered;
    for r in 0..3 {
        for c in 0..3 {
            let expected = if r == c { 1.0 } else { 0.0 };
            assert!((gram[(r, c)] - expected).abs() < 1e-4);
        }
    }
    assert!((recovered.determinant().abs() - 1.0).abs() < 1e-3);

    // The caller's cloud was rewritten onto P.
    let mean_error: Scalar = q
        .iter()
        .zip(p.iter())
        .map(|(qi, pi)| (qi.pos() - pi.pos()).norm())
        .sum::<Scalar>()
        / p.len() as Scalar;
    assert!(mean_error <= 0.05, "rewritten Q deviates: {}", mean_error);
}

#[test]
#[cfg(not(feature = "multiscale"))]
fn test_partial_overlap() {
    let p = sphere_cloud(200, 42);
    let axis = Unit::new_normalize(VectorType::new(0.0, 1.0, 0.0));
    let rot = Rotation3::from_axis_angle(&axis, 45.0_f32.to_radians());

    // Rotate and drop 30% of the points.
    let mut rng = StdRng::seed_from_u64(7);
    let mut indices: Vec<usize> = (0..p.len()).collect();
    indices.shuffle(&mut rng);
    indices.truncate(p.len() * 7 / 10);
    let mut q: Vec<Point3D> = indices
        .iter()
        .map(|&i| Point3D::from_vector(rot * p[i].pos()))
        .collect();

    let mut options = MatchOptions::new();
    options.sample_size = 1000; // keep both clouds whole
    options.delta = 0.02; // 1% of the diameter
    options.max_time_seconds = 20.0;
    options.random_seed = 42;
    options.configure_overlap(0.5).unwrap();

    let mut matcher = Matcher::new(options, Strategy::Super4pcs).unwrap();
    let mut mat = MatrixType::identity();
    let lcp =
        matcher.compute_transformation(&p, &mut q, &mut mat, &UniformDistSampler, &DummyVisitor);

    assert!(lcp >= 0.4, "partial overlap should still register, lcp {}", lcp);
    let residual = upper_block(&mat) * rot.matrix();
    assert!(
        deviation_angle(&residual) <= 3.0_f32.to_radians(),
        "recovered rotation off by {} rad",
        deviation_angle(&residual)
    );
}

#[test]
#[cfg(not(feature = "multiscale"))]
fn test_no_overlap_scores_low() {
    // Two unrelated clouds in far-apart regions.
    let p = sphere_cloud(1000, 1);
    let q_src = sphere_cloud(1000, 2);
    let mut q: Vec<Point3D> = q_src
        .iter()
        .map(|pt| Point3D::from_vector(pt.pos() + VectorType::new(100.0, 100.0, 100.0)))
        .collect();

    let mut options = MatchOptions::new();
    options.delta = 0.005;
    options.max_time_seconds = 1.0;
    options.random_seed = 42;
    options.configure_overlap(0.5).unwrap();

    let mut matcher = Matcher::new(options, Strategy::Brute4pcs).unwrap();
    let mut mat = MatrixType::identity();
    let lcp =
        matcher.compute_transformation(&p, &mut q, &mut mat, &UniformDistSampler, &DummyVisitor);

    assert!((0.0..=1.0).contains(&lcp));
    assert!(lcp <= 0.1, "unrelated clouds must not register, lcp {}", lcp);
}

#[test]
fn test_empty_input_returns_sentinel() {
    let p = sphere_cloud(100, 3);
    let mut q: Vec<Point3D> = Vec::new();

    let options = MatchOptions::new();
    let mut matcher = Matcher::new(options, Strategy::Super4pcs).unwrap();
    let mut mat = MatrixType::identity();
    let lcp =
        matcher.compute_transformation(&p, &mut q, &mut mat, &UniformDistSampler, &DummyVisitor);

    assert_eq!(lcp, LARGE_NUMBER);
    assert_eq!(mat, MatrixType::identity(), "matrix must stay untouched");
    assert!(q.is_empty());

    // Same for an empty reference cloud.
    let mut q2 = sphere_cloud(100, 4);
    let lcp2 =
        matcher.compute_transformation(&[], &mut q2, &mut mat, &UniformDistSampler, &DummyVisitor);
    assert_eq!(lcp2, LARGE_NUMBER);
    assert_eq!(q2, sphere_cloud(100, 4), "cloud must stay untouched");
}

#[test]
#[cfg(feature = "multiscale")]
fn test_scale_recovery() {
    let p = sphere_cloud(60, 42);
    let axis = Unit::new_normalize(VectorType::new(0.0, 0.0, 1.0));
    let rot = Rotation3::from_axis_angle(&axis, 20.0_f32.to_radians());
    let mut q: Vec<Point3D> = p
        .iter()
        .map(|pt| Point3D::from_vector(1.5 * (rot * pt.pos())))
        .collect();

    let mut options = MatchOptions::new();
    options.delta = 0.01;
    options.random_seed = 42;
    options.configure_overlap(1.0).unwrap();

    let mut matcher = Matcher::new(options, Strategy::Brute4pcs).unwrap();
    let mut mat = MatrixType::identity();
    let lcp =
        matcher.compute_transformation(&p, &mut q, &mut mat, &UniformDistSampler, &DummyVisitor);

    assert!(lcp >= 0.95, "scaled cloud should register, lcp {}", lcp);

    // Q was grown by 1.5, so the recovered isotropic scale is its inverse.
    let scale = upper_block(&mat).determinant().abs().cbrt();
    assert!(
        (scale * 1.5 - 1.0).abs() <= 0.02,
        "recovered scale {} should invert 1.5",
        scale
    );
}
