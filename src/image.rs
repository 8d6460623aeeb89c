//! Transport encoding of captured image planes.

use crate::types::{CapturedImage, ImagePlane};
use crate::{BridgeError, Result};
use base64::Engine;
use nalgebra::Matrix3;
use serde::Serialize;

/// Bytes per pixel of the 8-bit luma plane.
pub const LUMA_BYTES_PER_PIXEL: usize = 1;
/// Bytes per pixel of the interleaved 16-bit chroma plane.
pub const CHROMA_BYTES_PER_PIXEL: usize = 2;

/// Geometry of an encoded plane. `bytes_per_row` describes the packed encoded
/// bytes, not the source stride.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaneGeometry {
    pub width: usize,
    pub height: usize,
    pub bytes_per_row: usize,
    pub bytes_per_pixel: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EncodedPlane {
    pub size: PlaneGeometry,
    /// Standard base64 of the packed rows.
    pub buffer: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub luma: EncodedPlane,
    pub chroma: EncodedPlane,
}

/// Encode both planes of `image` at their original resolution.
pub fn encode_image(image: &CapturedImage) -> Result<EncodedImage> {
    Ok(EncodedImage {
        luma: encode_plane(&image.luma, LUMA_BYTES_PER_PIXEL, "luma")?,
        chroma: encode_plane(&image.chroma, CHROMA_BYTES_PER_PIXEL, "chroma")?,
    })
}

/// Strip row padding from `plane` and base64 the packed bytes.
pub fn encode_plane(plane: &ImagePlane, bytes_per_pixel: usize, name: &'static str) -> Result<EncodedPlane> {
    let row_bytes = validate_plane(plane, bytes_per_pixel, name)?;

    let buffer = if plane.bytes_per_row == row_bytes {
        base64::engine::general_purpose::STANDARD.encode(&plane.data[..row_bytes * plane.height])
    } else {
        let mut packed = Vec::with_capacity(row_bytes * plane.height);
        for row in plane.data.chunks(plane.bytes_per_row).take(plane.height) {
            packed.extend_from_slice(&row[..row_bytes]);
        }
        base64::engine::general_purpose::STANDARD.encode(&packed)
    };

    Ok(EncodedPlane {
        size: PlaneGeometry {
            width: plane.width,
            height: plane.height,
            bytes_per_row: row_bytes,
            bytes_per_pixel,
        },
        buffer,
    })
}

/// Check that the declared geometry fits the buffer; returns packed row length.
fn validate_plane(plane: &ImagePlane, bytes_per_pixel: usize, name: &'static str) -> Result<usize> {
    let malformed = |reason: String| BridgeError::MalformedPlane { plane: name, reason };

    if plane.width == 0 || plane.height == 0 {
        return Err(malformed(format!("empty {}x{}", plane.width, plane.height)));
    }
    let row_bytes = plane
        .width
        .checked_mul(bytes_per_pixel)
        .ok_or_else(|| malformed(format!("width {} overflows", plane.width)))?;
    if plane.bytes_per_row < row_bytes {
        return Err(malformed(format!(
            "stride {} < row {}",
            plane.bytes_per_row, row_bytes
        )));
    }
    let needed = plane
        .bytes_per_row
        .checked_mul(plane.height - 1)
        .and_then(|n| n.checked_add(row_bytes))
        .ok_or_else(|| malformed(format!("{} rows overflow", plane.height)))?;
    if plane.data.len() < needed {
        return Err(malformed(format!(
            "{} bytes, need {}",
            plane.data.len(),
            needed
        )));
    }
    Ok(row_bytes)
}

/// Rescale camera intrinsics to an image downscaled by `scale`.
///
/// The first two rows are divided by `scale`; the third row is kept and its
/// bottom-right entry is pinned to exactly 1.0.
pub fn scale_intrinsics(intrinsics: &Matrix3<f32>, scale: f32) -> Result<Matrix3<f32>> {
    if !(scale.is_finite() && scale > 0.0) {
        return Err(BridgeError::InvalidScaleFactor(scale));
    }
    let mut scaled = *intrinsics;
    for row in 0..2 {
        for col in 0..3 {
            scaled[(row, col)] = intrinsics[(row, col)] / scale;
        }
    }
    scaled[(2, 2)] = 1.0;
    Ok(scaled)
}
