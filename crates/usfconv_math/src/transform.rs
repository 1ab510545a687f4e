// Transform utilities for Mat4
//
// Decomposition helpers shared by the USF and glTF sides. glam::Mat4 already
// provides transform_point3(), inverse() and to_scale_rotation_translation().

use glam::{Mat4, Quat, Vec3, Vec4};

/// Transform components that can be composed into a matrix.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    /// Translation
    pub translation: Vec3,

    /// Rotation (as quaternion)
    pub rotation: Quat,

    /// Scale
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    /// Create a new transform with only translation.
    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Default::default()
        }
    }

    /// Create a new transform from a 4x4 matrix.
    ///
    /// Decomposes the matrix into translation, rotation, and scale. A
    /// degenerate matrix (zero scale on any axis) keeps its translation and
    /// falls back to identity rotation so rest poses stay finite.
    pub fn from_matrix(matrix: Mat4) -> Self {
        let (scale, rotation, translation) = matrix.to_scale_rotation_translation();
        let rotation = if rotation.is_finite() {
            rotation.normalize()
        } else {
            Quat::IDENTITY
        };
        Self {
            translation,
            rotation,
            scale,
        }
    }

    /// Convert to a 4x4 transformation matrix.
    ///
    /// Order: Scale -> Rotate -> Translate (SRT)
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }
}

/// Extension trait for Mat4 to provide additional transform utilities
pub trait Mat4Ext {
    /// Transform a vector in 3D space (applies rotation and scale, but NOT translation).
    /// Vectors have an implicit w=0 component.
    fn transform_direction(&self, vector: Vec3) -> Vec3;

    /// Component-wise comparison with a tolerance.
    fn approx_eq(&self, other: &Mat4, epsilon: f32) -> bool;

    /// Decompose into a `Transform`.
    fn to_transform(&self) -> Transform;
}

impl Mat4Ext for Mat4 {
    fn transform_direction(&self, vector: Vec3) -> Vec3 {
        let v4 = Vec4::new(vector.x, vector.y, vector.z, 0.0);
        let transformed = *self * v4;
        Vec3::new(transformed.x, transformed.y, transformed.z)
    }

    fn approx_eq(&self, other: &Mat4, epsilon: f32) -> bool {
        self.to_cols_array()
            .iter()
            .zip(other.to_cols_array().iter())
            .all(|(a, b)| (a - b).abs() <= epsilon)
    }

    fn to_transform(&self) -> Transform {
        Transform::from_matrix(*self)
    }
}
