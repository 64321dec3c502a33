// Copyright 2026 the Tableau Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Small transform helpers shared by the update and render stages.

use glam::{Mat3, Mat4, Quat, Vec2, Vec3, Vec4};
use kurbo::{Point, Rect};

/// Parent origin of a new node: top-left corner, mid depth.
pub const DEFAULT_PARENT_ORIGIN: Vec3 = Vec3::new(0.0, 0.0, 0.5);

/// Anchor point of a new node: its center.
pub const DEFAULT_ANCHOR_POINT: Vec3 = Vec3::new(0.5, 0.5, 0.5);

/// Opaque white.
pub const WHITE: Vec4 = Vec4::ONE;

/// Tolerance used for identity and degeneracy checks.
pub const EPSILON: f32 = f32::EPSILON;

/// Builds a world matrix from scale, rotation, and translation, applied in
/// that order.
#[inline]
#[must_use]
pub fn set_transform_components(scale: Vec3, rotation: Quat, position: Vec3) -> Mat4 {
    Mat4::from_scale_rotation_translation(scale, rotation, position)
}

/// Returns whether `q` is the identity rotation.
#[inline]
#[must_use]
pub fn is_identity(q: Quat) -> bool {
    q.abs_diff_eq(Quat::IDENTITY, EPSILON)
}

/// Inverse-transpose of the upper 3x3 of `model_view`.
///
/// Falls back to the plain upper 3x3 when it is singular.
#[must_use]
pub fn normal_matrix(model_view: Mat4) -> Mat3 {
    let m = Mat3::from_mat4(model_view);
    if m.determinant().abs() <= EPSILON {
        return m;
    }
    m.inverse().transpose()
}

/// Maps a screen point to normalized device coordinates of `viewport`.
///
/// Screen Y grows downwards; device Y grows upwards.
#[must_use]
pub fn screen_to_ndc(viewport: Rect, screen: Point) -> Option<Vec2> {
    if viewport.width() <= 0.0 || viewport.height() <= 0.0 {
        return None;
    }
    let x = 2.0 * (screen.x - viewport.x0) / viewport.width() - 1.0;
    let y = 1.0 - 2.0 * (screen.y - viewport.y0) / viewport.height();
    #[expect(
        clippy::cast_possible_truncation,
        reason = "device coordinates are single precision"
    )]
    Some(Vec2::new(x as f32, y as f32))
}

/// Maps a screen point onto the local plane of a node.
///
/// The ray through `screen` is unprojected with `projection * view * world`
/// and intersected with the node's `z = 0` plane. The result is measured
/// from the node's top-left corner, so a point inside the node lies within
/// `0..=size` on both axes. Returns `None` for degenerate matrices or rays
/// parallel to the plane.
#[must_use]
pub fn screen_to_local(
    world: Mat4,
    size: Vec3,
    view: Mat4,
    projection: Mat4,
    viewport: Rect,
    screen: Point,
) -> Option<Vec2> {
    let ndc = screen_to_ndc(viewport, screen)?;
    let mvp = projection * view * world;
    if mvp.determinant().abs() <= f32::MIN_POSITIVE {
        return None;
    }
    let inverse = mvp.inverse();
    let near = inverse.project_point3(Vec3::new(ndc.x, ndc.y, -1.0));
    let far = inverse.project_point3(Vec3::new(ndc.x, ndc.y, 1.0));
    let dir = far - near;
    if dir.z.abs() <= EPSILON || !near.is_finite() || !far.is_finite() {
        return None;
    }
    let t = -near.z / dir.z;
    let hit = near + dir * t;
    Some(Vec2::new(hit.x + size.x * 0.5, hit.y + size.y * 0.5))
}
