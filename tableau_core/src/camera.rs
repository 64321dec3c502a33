// Copyright 2026 the Tableau Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Cameras attached to nodes.
//!
//! A camera derives its view matrix from the world matrix of the node it is
//! attached to. Both matrices are double-buffered so the render stage reads
//! the frame it was handed while the next one is computed.

use glam::{Mat4, Vec3, Vec4};
use kurbo::Size;

use crate::property::{BufferIndex, InheritedProperty};

/// Default vertical field of view, in radians.
pub const DEFAULT_FIELD_OF_VIEW: f32 = core::f32::consts::FRAC_PI_4;

/// Projection of a camera.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Projection {
    /// Perspective projection.
    Perspective {
        /// Vertical field of view in radians.
        fov_y: f32,
        /// Width over height.
        aspect: f32,
        /// Near clipping distance.
        near: f32,
        /// Far clipping distance.
        far: f32,
    },
    /// Orthographic projection.
    Orthographic {
        /// Left clipping plane.
        left: f32,
        /// Right clipping plane.
        right: f32,
        /// Bottom clipping plane.
        bottom: f32,
        /// Top clipping plane.
        top: f32,
        /// Near clipping distance.
        near: f32,
        /// Far clipping distance.
        far: f32,
    },
}

/// A camera.
///
/// Projections flip Y by default so that world Y grows downwards like screen
/// coordinates.
#[derive(Clone, Debug)]
pub struct Camera {
    projection: Projection,
    invert_y: bool,
    reflection_plane: Option<Vec4>,
    view_matrix: InheritedProperty<Mat4>,
    projection_matrix: InheritedProperty<Mat4>,
}

impl Camera {
    /// Creates a camera with the given projection.
    #[must_use]
    pub const fn new(projection: Projection) -> Self {
        Self {
            projection,
            invert_y: true,
            reflection_plane: None,
            view_matrix: InheritedProperty::new(Mat4::IDENTITY),
            projection_matrix: InheritedProperty::new(Mat4::IDENTITY),
        }
    }

    /// Creates the perspective camera used for a surface of `size`.
    ///
    /// The camera node must be placed at
    /// [`stage_distance`](Self::stage_distance) on the Z axis so that one
    /// world unit maps to one pixel at `z = 0`.
    #[must_use]
    pub fn for_surface(size: Size) -> Self {
        #[expect(
            clippy::cast_possible_truncation,
            reason = "surface sizes fit in single precision"
        )]
        let (w, h) = (size.width as f32, size.height as f32);
        let distance = Self::stage_distance(h, DEFAULT_FIELD_OF_VIEW);
        let aspect = if h > 0.0 { w / h } else { 1.0 };
        Self::new(Projection::Perspective {
            fov_y: DEFAULT_FIELD_OF_VIEW,
            aspect,
            near: 1.0,
            far: distance * 2.0 + 1.0,
        })
    }

    /// Distance at which a perspective camera sees exactly `height` world
    /// units vertically.
    #[must_use]
    pub fn stage_distance(height: f32, fov_y: f32) -> f32 {
        (height * 0.5) / (fov_y * 0.5).tan()
    }

    /// Returns the projection parameters.
    #[must_use]
    pub fn projection(&self) -> Projection {
        self.projection
    }

    /// Replaces the projection parameters.
    pub fn set_projection(&mut self, projection: Projection) {
        self.projection = projection;
    }

    /// Sets whether the projection flips Y.
    pub fn set_invert_y(&mut self, invert_y: bool) {
        self.invert_y = invert_y;
    }

    /// Sets or clears the reflection plane `(normal, distance)`.
    pub fn set_reflection_plane(&mut self, plane: Option<Vec4>) {
        self.reflection_plane = plane;
    }

    /// Returns whether the view mirrors the scene.
    #[must_use]
    pub fn is_reflection(&self) -> bool {
        self.reflection_plane.is_some()
    }

    /// View matrix for `buffer`.
    #[must_use]
    pub fn view_matrix(&self, buffer: BufferIndex) -> Mat4 {
        self.view_matrix.get(buffer)
    }

    /// Projection matrix for `buffer`.
    #[must_use]
    pub fn projection_matrix(&self, buffer: BufferIndex) -> Mat4 {
        self.projection_matrix.get(buffer)
    }

    /// Recomputes both matrices for `buffer` from the camera node's world
    /// matrix.
    pub fn update(&mut self, buffer: BufferIndex, world: Mat4) {
        let mut view = if world.determinant() == 0.0 {
            Mat4::IDENTITY
        } else {
            world.inverse()
        };
        if let Some(plane) = self.reflection_plane {
            view *= reflection_matrix(plane);
        }
        self.view_matrix.set(buffer, view);
        self.projection_matrix.set(buffer, self.compute_projection());
    }

    fn compute_projection(&self) -> Mat4 {
        let m = match self.projection {
            Projection::Perspective {
                fov_y,
                aspect,
                near,
                far,
            } => Mat4::perspective_rh_gl(fov_y, aspect, near, far),
            Projection::Orthographic {
                left,
                right,
                bottom,
                top,
                near,
                far,
            } => Mat4::orthographic_rh_gl(left, right, bottom, top, near, far),
        };
        if self.invert_y {
            Mat4::from_scale(Vec3::new(1.0, -1.0, 1.0)) * m
        } else {
            m
        }
    }
}

/// Householder reflection about the plane `n·p + d = 0`.
fn reflection_matrix(plane: Vec4) -> Mat4 {
    let n = plane.truncate().normalize_or_zero();
    let d = plane.w;
    let x = Vec4::new(
        1.0 - 2.0 * n.x * n.x,
        -2.0 * n.y * n.x,
        -2.0 * n.z * n.x,
        0.0,
    );
    let y = Vec4::new(
        -2.0 * n.x * n.y,
        1.0 - 2.0 * n.y * n.y,
        -2.0 * n.z * n.y,
        0.0,
    );
    let z = Vec4::new(
        -2.0 * n.x * n.z,
        -2.0 * n.y * n.z,
        1.0 - 2.0 * n.z * n.z,
        0.0,
    );
    let w = Vec4::new(-2.0 * d * n.x, -2.0 * d * n.y, -2.0 * d * n.z, 1.0);
    Mat4::from_cols(x, y, z, w)
}

#[cfg(test)]
mod tests {
    use super::*;

    const B0: BufferIndex = BufferIndex::ZERO;
    const B1: BufferIndex = BufferIndex::ONE;

    #[test]
    fn view_is_inverse_of_world() {
        let mut cam = Camera::for_surface(Size::new(480.0, 800.0));
        let world = Mat4::from_translation(Vec3::new(0.0, 0.0, 500.0));
        cam.update(B0, world);
        let p = cam.view_matrix(B0).transform_point3(Vec3::ZERO);
        assert!(p.abs_diff_eq(Vec3::new(0.0, 0.0, -500.0), 1e-3), "got {p}");
        assert_eq!(cam.view_matrix(B1), Mat4::IDENTITY, "other buffer untouched");
    }

    #[test]
    fn stage_distance_fits_height() {
        let d = Camera::stage_distance(800.0, DEFAULT_FIELD_OF_VIEW);
        let half = d * (DEFAULT_FIELD_OF_VIEW * 0.5).tan();
        assert!((half - 400.0).abs() < 1e-2, "got {half}");
    }

    #[test]
    fn surface_camera_maps_stage_edge_to_ndc_edge() {
        let mut cam = Camera::for_surface(Size::new(400.0, 400.0));
        let d = Camera::stage_distance(400.0, DEFAULT_FIELD_OF_VIEW);
        cam.update(B0, Mat4::from_translation(Vec3::new(0.0, 0.0, d)));
        let vp = cam.projection_matrix(B0) * cam.view_matrix(B0);
        // World Y grows downwards, so the top edge is at y = -200.
        let top = vp.project_point3(Vec3::new(0.0, -200.0, 0.0));
        assert!((top.y - 1.0).abs() < 1e-3, "got {top}");
    }

    #[test]
    fn reflection_mirrors_points_across_plane() {
        let m = reflection_matrix(Vec4::new(0.0, 1.0, 0.0, 0.0));
        let p = m.transform_point3(Vec3::new(1.0, 2.0, 3.0));
        assert!(p.abs_diff_eq(Vec3::new(1.0, -2.0, 3.0), 1e-6));

        let mut cam = Camera::new(Projection::Orthographic {
            left: -1.0,
            right: 1.0,
            bottom: -1.0,
            top: 1.0,
            near: -1.0,
            far: 1.0,
        });
        assert!(!cam.is_reflection());
        cam.set_reflection_plane(Some(Vec4::new(0.0, 1.0, 0.0, 0.0)));
        assert!(cam.is_reflection());
    }
}
