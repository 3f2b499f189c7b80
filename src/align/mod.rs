// src/align/mod.rs

//! Rigid-transformation fitting from four corresponding points.
//!
//! Two numeric workhorses live here: the segment-to-segment closest
//! approach used to canonicalize bases and derive their invariants, and
//! the orthonormal-frame fit that turns an ordered base / candidate pair
//! into a validated rigid (or similarity) transform.

use nalgebra::Matrix3;

use crate::core::{MatrixType, Point3D, Scalar, VectorType};

/// Threshold below which the segment-distance denominators are treated as
/// parallel / zero.
const SEGMENT_EPSILON: Scalar = 1e-4;

/// Threshold on the orthogonality defect of the fitted rotation.
const ORTHOGONALITY_EPSILON: Scalar = 1e-6;

/// Maximum relative disagreement between the two scale ratios.
const SCALE_RATIO_DEVIATION: Scalar = 0.1;

/// Closest approach between segments `p1p2` and `q1q2`.
///
/// Returns the distance together with the clamped parametric positions of
/// the two nearest points, each in `[0, 1]`: the positions double as the
/// affine invariants of a quadrilateral whose diagonals are the two
/// segments. For parallel segments the parametrization degenerates and the
/// endpoint solution is returned.
pub(crate) fn dist_segment_to_segment(
    p1: &VectorType,
    p2: &VectorType,
    q1: &VectorType,
    q2: &VectorType,
) -> (Scalar, Scalar, Scalar) {
    let u = p2 - p1;
    let v = q2 - q1;
    let w = p1 - q1;
    let a = u.dot(&u);
    let b = u.dot(&v);
    let c = v.dot(&v);
    let d = u.dot(&w);
    let e = v.dot(&w);
    let f = a * c - b * b;

    // s1/s2 and t1/t2 are the parametric representation of the closest
    // approach; they become the invariants once the clamping settles.
    let mut s1;
    let mut s2 = f;
    let mut t1;
    let mut t2 = f;

    if f < SEGMENT_EPSILON {
        s1 = 0.0;
        s2 = 1.0;
        t1 = e;
        t2 = c;
    } else {
        s1 = b * e - c * d;
        t1 = a * e - b * d;
        if s1 < 0.0 {
            s1 = 0.0;
            t1 = e;
            t2 = c;
        } else if s1 > s2 {
            s1 = s2;
            t1 = e + b;
            t2 = c;
        }
    }

    if t1 < 0.0 {
        t1 = 0.0;
        if -d < 0.0 {
            s1 = 0.0;
        } else if -d > a {
            s1 = s2;
        } else {
            s1 = -d;
            s2 = a;
        }
    } else if t1 > t2 {
        t1 = t2;
        if (-d + b) < 0.0 {
            s1 = 0.0;
        } else if (-d + b) > a {
            s1 = s2;
        } else {
            s1 = -d + b;
            s2 = a;
        }
    }

    let invariant1 = if s1.abs() < SEGMENT_EPSILON { 0.0 } else { s1 / s2 };
    let invariant2 = if t1.abs() < SEGMENT_EPSILON { 0.0 } else { t1 / t2 };

    let distance = (w + invariant1 * u - invariant2 * v).norm();
    (distance, invariant1, invariant2)
}

/// Estimates the transform aligning `candidate` onto `reference`.
///
/// Only the first three correspondences drive the fit: the base is near
/// planar, so an orthonormal frame per side determines the rotation, and
/// the fourth point only participates in the optional scale estimate. The
/// centroids are those of the first three points of each side; `candidate`
/// maps into `reference`'s frame as `c1 + R·(s·x − c2)`.
///
/// `max_angle` is in radians; a negative value disables the per-axis caps.
/// With `compute_scale` the isotropic scale is the mean of the two
/// diagonal length ratios, rejected when they disagree by more than 10%.
///
/// Returns the homogeneous transform and the RMS error over the three
/// fitted correspondences, or `None` when the fit is degenerate, fails the
/// orthogonality check, exceeds an angle cap, or the scale ratios diverge.
pub(crate) fn compute_rigid_transformation(
    reference: &[Point3D; 4],
    candidate: &[Point3D; 4],
    centroid1: &VectorType,
    centroid2: &VectorType,
    max_angle: Scalar,
    compute_scale: bool,
) -> Option<(MatrixType, Scalar)> {
    let p0 = reference[0].pos();
    let p1 = reference[1].pos();
    let p2 = reference[2].pos();
    let mut q0 = *candidate[0].pos();
    let mut q1 = *candidate[1].pos();
    let mut q2 = *candidate[2].pos();
    let mut centroid2 = *centroid2;

    let mut scale_est: Scalar = 1.0;
    if compute_scale {
        let p3 = reference[3].pos();
        let q3 = candidate[3].pos();

        let ratio1 = (p1 - p0).norm() / (q1 - q0).norm();
        let ratio2 = (p3 - p2).norm() / (q3 - q2).norm();

        let ratio_dev = (ratio1 / ratio2 - 1.0).abs();
        let ratio_mean = (ratio1 + ratio2) / 2.0;
        if !ratio_dev.is_finite() || ratio_dev > SCALE_RATIO_DEVIATION {
            return None;
        }
        scale_est = ratio_mean;

        q0 *= scale_est;
        q1 *= scale_est;
        q2 *= scale_est;
        centroid2 *= scale_est;
    }

    let frame_p = orthonormal_frame(p0, p1, p2)?;
    let frame_q = orthonormal_frame(&q0, &q1, &q2)?;

    let rotation = frame_p.transpose() * frame_q;

    // Discard singular solutions: the product must stay orthogonal.
    let product = rotation * rotation;
    for k in 0..3 {
        if product[(k, k)] - 1.0 > ORTHOGONALITY_EPSILON {
            return None;
        }
    }

    if max_angle >= 0.0 {
        let roll = rotation[(2, 1)].atan2(rotation[(2, 2)]).abs();
        let pitch = (-rotation[(2, 0)])
            .atan2((rotation[(2, 1)].powi(2) + rotation[(2, 2)].powi(2)).sqrt())
            .abs();
        let yaw = rotation[(1, 0)].atan2(rotation[(0, 0)]).abs();
        if roll > max_angle || pitch > max_angle || yaw > max_angle {
            return None;
        }
    }

    let mut rms: Scalar = 0.0;
    for i in 0..3 {
        let first = scale_est * candidate[i].pos() - centroid2;
        let transformed = rotation * first;
        rms += (transformed - reference[i].pos() + centroid1).norm();
    }
    rms /= 3.0;

    let transform = MatrixType::new_translation(centroid1)
        * rotation.to_homogeneous()
        * MatrixType::new_translation(&(-centroid2))
        * MatrixType::new_scaling(scale_est);

    Some((transform, rms))
}

/// Orthonormal frame spanned by `p1 - p0` and the component of `p2 - p0`
/// orthogonal to it, completed by their cross product. Rows are the frame
/// axes. `None` on zero-length inputs.
fn orthonormal_frame(p0: &VectorType, p1: &VectorType, p2: &VectorType) -> Option<Matrix3<Scalar>> {
    let mut v1 = p1 - p0;
    if v1.norm_squared() == 0.0 {
        return None;
    }
    v1.normalize_mut();
    let mut v2 = (p2 - p0) - (p2 - p0).dot(&v1) * v1;
    if v2.norm_squared() == 0.0 {
        return None;
    }
    v2.normalize_mut();
    let v3 = v1.cross(&v2);

    Some(Matrix3::from_rows(&[
        v1.transpose(),
        v2.transpose(),
        v3.transpose(),
    ]))
}
