// src/core/point.rs

use nalgebra::{Matrix4, Vector3};

/// Floating-point precision used throughout the crate.
///
/// Positions are single-precision: the registration tolerances (`delta`,
/// the pair-distance window, the LCP radius) are orders of magnitude above
/// `f32` round-off for any sanely scaled cloud, and half-width points keep
/// the sampled working sets and the k-d trees compact.
pub type Scalar = f32;

/// 3-component vector alias shared by positions, normals and colours.
pub type VectorType = Vector3<Scalar>;

/// Homogeneous 4x4 transform mapping Q into the frame of P.
pub type MatrixType = Matrix4<Scalar>;

/// A single element of a point cloud.
///
/// The position is primary; the normal and the RGB triple are optional
/// attributes that only participate in the pair filters. A present normal
/// is expected to be unit length (see [`sanitize_normals`]); a present
/// colour has all channels non-negative.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point3D {
    pos: VectorType,
    normal: Option<VectorType>,
    rgb: Option<VectorType>,
}

impl Point3D {
    /// Creates a bare point at the given position.
    pub fn new(x: Scalar, y: Scalar, z: Scalar) -> Self {
        Self {
            pos: VectorType::new(x, y, z),
            normal: None,
            rgb: None,
        }
    }

    /// Creates a bare point from a position vector.
    pub fn from_vector(pos: VectorType) -> Self {
        Self {
            pos,
            normal: None,
            rgb: None,
        }
    }

    /// Attaches a normal. The vector is stored as given; run
    /// [`sanitize_normals`] over the cloud if the source data is untrusted.
    pub fn with_normal(mut self, normal: VectorType) -> Self {
        self.normal = Some(normal);
        self
    }

    /// Attaches an RGB triple.
    pub fn with_rgb(mut self, rgb: VectorType) -> Self {
        self.rgb = Some(rgb);
        self
    }

    /// Position accessor.
    pub fn pos(&self) -> &VectorType {
        &self.pos
    }

    /// Overwrites the position. Used when recentring the sampled clouds and
    /// when applying the final transform to the caller's cloud.
    pub fn set_pos(&mut self, pos: VectorType) {
        self.pos = pos;
    }

    /// The unit normal, if one is attached.
    pub fn normal(&self) -> Option<&VectorType> {
        self.normal.as_ref()
    }

    /// The RGB triple, if one is attached.
    pub fn rgb(&self) -> Option<&VectorType> {
        self.rgb.as_ref()
    }

    /// Applies a homogeneous transform to the position.
    pub fn transformed(&self, mat: &MatrixType) -> VectorType {
        (mat * self.pos.push(1.0)).xyz()
    }
}

/// Arithmetic mean of the positions. Zero for an empty slice.
pub fn centroid(points: &[Point3D]) -> VectorType {
    if points.is_empty() {
        return VectorType::zeros();
    }
    let sum = points
        .iter()
        .fold(VectorType::zeros(), |acc, p| acc + p.pos());
    sum / points.len() as Scalar
}

/// Drops degenerate normals and renormalizes the rest.
///
/// Source data frequently carries zero or non-finite normals (unreferenced
/// mesh vertices, scanner artefacts). The pair filter treats an absent
/// normal as "no constraint", so stripping the invalid ones here keeps the
/// filter honest without rejecting the points themselves.
pub fn sanitize_normals(points: &mut [Point3D]) {
    for p in points.iter_mut() {
        if let Some(n) = p.normal {
            let sq = n.norm_squared();
            if !sq.is_finite() || sq == 0.0 {
                p.normal = None;
            } else {
                p.normal = Some(n / sq.sqrt());
            }
        }
    }
}
