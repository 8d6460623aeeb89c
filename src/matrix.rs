//! Camera matrix math and the flat wire layout shared with the consumer.
//!
//! Every matrix leaves this module flattened **column-major**: element `i`
//! of a 4x4 array is column `i / 4`, row `i % 4` (9 floats, column `i / 3`,
//! row `i % 3` for 3x3). Clip space follows the OpenGL convention with the
//! camera looking down -Z.

use crate::types::{Camera, InterfaceOrientation, Size};
use crate::{BridgeError, Result};
use nalgebra::{Matrix3, Matrix4};

/// Projection, view and model matrices of one camera, flattened for transport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraMatrices {
    pub projection: [f32; 16],
    pub view: [f32; 16],
    /// Inverse of `view` (camera-to-world in the oriented frame).
    pub model: [f32; 16],
}

impl CameraMatrices {
    pub fn compute(
        camera: &Camera,
        orientation: InterfaceOrientation,
        viewport: Size,
        z_near: f32,
        z_far: f32,
    ) -> Result<Self> {
        let projection = projection_matrix(camera, orientation, viewport, z_near, z_far)?;
        let view = view_matrix(camera, orientation)?;
        let model = model_matrix(&view)?;
        Ok(Self {
            projection: to_column_major(&projection),
            view: to_column_major(&view),
            model: to_column_major(&model),
        })
    }
}

/// Flatten a 4x4 matrix column-major.
pub fn to_column_major(m: &Matrix4<f32>) -> [f32; 16] {
    let mut out = [0.0; 16];
    out.copy_from_slice(m.as_slice());
    out
}

/// Flatten a 3x3 matrix column-major.
pub fn to_column_major3(m: &Matrix3<f32>) -> [f32; 9] {
    let mut out = [0.0; 9];
    out.copy_from_slice(m.as_slice());
    out
}

/// Inverse of [`to_column_major`].
pub fn from_column_major(values: &[f32; 16]) -> Matrix4<f32> {
    Matrix4::from_column_slice(values)
}

/// Rotation about Z by the orientation's quarter turns from the native sensor frame.
///
/// Built from exact 0/±1 entries so orientation changes never add rounding error.
fn orientation_rotation(orientation: InterfaceOrientation) -> Matrix4<f32> {
    let (c, s) = match orientation.quarter_turns() {
        0 => (1.0, 0.0),
        1 => (0.0, 1.0),
        2 => (-1.0, 0.0),
        _ => (0.0, -1.0),
    };
    #[rustfmt::skip]
    let m = Matrix4::new(
        c,  -s,  0.0, 0.0,
        s,   c,  0.0, 0.0,
        0.0, 0.0, 1.0, 0.0,
        0.0, 0.0, 0.0, 1.0,
    );
    m
}

/// Perspective projection in the sensor's native orientation, straight from the intrinsics.
fn native_projection(camera: &Camera, z_near: f32, z_far: f32) -> Result<Matrix4<f32>> {
    let res = camera.image_resolution;
    if !res.is_drawable() {
        return Err(BridgeError::InvalidGeometry(format!(
            "image resolution {}x{}",
            res.width, res.height
        )));
    }
    if !(z_near > 0.0 && z_far > z_near) {
        return Err(BridgeError::InvalidGeometry(format!(
            "clip planes near={} far={}",
            z_near, z_far
        )));
    }

    let k = &camera.intrinsics;
    let (fx, fy, cx, cy) = (k[(0, 0)], k[(1, 1)], k[(0, 2)], k[(1, 2)]);
    if !(fx.is_finite() && fy.is_finite() && fx > 0.0 && fy > 0.0) {
        return Err(BridgeError::InvalidGeometry(format!(
            "focal lengths fx={} fy={}",
            fx, fy
        )));
    }

    let (w, h) = (res.width, res.height);
    let depth = z_near - z_far;
    #[rustfmt::skip]
    let m = Matrix4::new(
        2.0 * fx / w, 0.0,          1.0 - 2.0 * cx / w,        0.0,
        0.0,          2.0 * fy / h, 2.0 * cy / h - 1.0,        0.0,
        0.0,          0.0,          (z_far + z_near) / depth, 2.0 * z_far * z_near / depth,
        0.0,          0.0,          -1.0,                     0.0,
    );
    Ok(m)
}

/// Projection matrix for `orientation`, aspect-filled to `viewport`.
///
/// The camera image is rotated into the interface orientation and scaled to
/// cover the viewport; the axis that overflows is cropped symmetrically.
pub fn projection_matrix(
    camera: &Camera,
    orientation: InterfaceOrientation,
    viewport: Size,
    z_near: f32,
    z_far: f32,
) -> Result<Matrix4<f32>> {
    if !viewport.is_drawable() {
        return Err(BridgeError::InvalidGeometry(format!(
            "viewport {}x{}",
            viewport.width, viewport.height
        )));
    }

    let native = native_projection(camera, z_near, z_far)?;
    let rot = orientation_rotation(orientation);
    let oriented = rot * native * rot.transpose();

    let res = camera.image_resolution;
    let image_aspect = if orientation.is_portrait() {
        res.height / res.width
    } else {
        res.width / res.height
    };
    let viewport_aspect = viewport.width / viewport.height;

    let (sx, sy) = if viewport_aspect > image_aspect {
        (1.0, viewport_aspect / image_aspect)
    } else {
        (image_aspect / viewport_aspect, 1.0)
    };
    let fill = Matrix4::new_nonuniform_scaling(&nalgebra::Vector3::new(sx, sy, 1.0));

    Ok(fill * oriented)
}

/// World-to-view transform for `orientation`.
pub fn view_matrix(camera: &Camera, orientation: InterfaceOrientation) -> Result<Matrix4<f32>> {
    let world_to_camera = checked_inverse(&camera.transform)?;
    Ok(orientation_rotation(orientation) * world_to_camera)
}

/// Camera-to-world transform, the exact inverse of `view`.
pub fn model_matrix(view: &Matrix4<f32>) -> Result<Matrix4<f32>> {
    checked_inverse(view)
}

/// Invert `m`, refusing singular or non-finite input instead of emitting NaNs.
pub fn checked_inverse(m: &Matrix4<f32>) -> Result<Matrix4<f32>> {
    if m.iter().any(|v| !v.is_finite()) {
        return Err(BridgeError::SingularMatrix);
    }
    let inv = m.try_inverse().ok_or(BridgeError::SingularMatrix)?;
    if inv.iter().any(|v| !v.is_finite()) {
        return Err(BridgeError::SingularMatrix);
    }
    Ok(inv)
}
