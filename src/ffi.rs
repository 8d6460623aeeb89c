//! C FFI layer for xrbridge.
//!
//! Provides an opaque handle-based API for a native host that owns the
//! tracking session and the transport. Matrices cross the boundary
//! column-major. The generated C header is written to `include/xrbridge.h`
//! by cbindgen.

use crate::aggregator::FrameAggregator;
use crate::config::BridgeConfig;
use crate::error::LastError;
use crate::types::{
    Anchor, AnchorKind, Camera, CapturedImage, DirectionalLight, ImagePlane, InterfaceOrientation,
    LightEstimate, PixelFormat, RawFrame, RequestDescriptor, RequestFlags, Size, WorldMappingStatus,
};
use crate::{BridgeError, Result};
use nalgebra::{Matrix3, Matrix4, Vector3};
use std::ffi::{c_char, c_int, CStr};

/// Last error message for C consumers.
static LAST_ERROR: LastError = LastError::new();

/// Opaque bridge handle for C consumers.
pub struct XrBridge(FrameAggregator);

/// One image plane. `data` must stay valid for the duration of the call.
#[repr(C)]
pub struct XrPlane {
    pub data: *const u8,
    pub len: usize,
    pub width: usize,
    pub height: usize,
    pub bytes_per_row: usize,
}

#[repr(C)]
pub struct XrAnchor {
    /// Null-terminated UTF-8 identifier.
    pub identifier: *const c_char,
    /// Anchor-to-world, column-major.
    pub transform: [f32; 16],
    /// 0 = anchor, 1 = plane, 2 = image, 3 = face.
    pub kind: u32,
}

/// Frame description in C-compatible layout.
#[repr(C)]
pub struct XrFrame {
    /// Capture time in seconds.
    pub timestamp: f64,
    /// Camera-to-world, column-major.
    pub camera_transform: [f32; 16],
    /// 3x3 intrinsics, column-major.
    pub intrinsics: [f32; 9],
    pub image_resolution: Size,
    pub has_light_estimate: bool,
    pub ambient_intensity: f32,
    pub ambient_color_temperature: f32,
    pub has_directional_light: bool,
    pub primary_light_direction: [f32; 3],
    pub primary_light_intensity: f32,
    pub has_image: bool,
    /// 0 = `420f`, 1 = `420v`.
    pub pixel_format: u32,
    pub luma: XrPlane,
    pub chroma: XrPlane,
    /// 0 = not available, 1 = limited, 2 = extending, 3 = mapped.
    pub world_mapping_status: u32,
    pub anchors: *const XrAnchor,
    pub anchor_count: usize,
}

/// Aggregation counters in C-compatible layout.
#[repr(C)]
pub struct XrFrameStats {
    pub published: u64,
    pub skipped_unsubscribed: u64,
    pub defects: u64,
    pub cv_published: u64,
}

fn fail(e: BridgeError) -> c_int {
    LAST_ERROR.set(&e);
    -1
}

unsafe fn c_str_to_string(ptr: *const c_char, what: &str) -> Result<String> {
    if ptr.is_null() {
        return Err(BridgeError::InvalidArgument(format!("{} is null", what)));
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map(str::to_owned)
        .map_err(|_| BridgeError::InvalidArgument(format!("{} is not UTF-8", what)))
}

unsafe fn plane_bytes<'a>(plane: &XrPlane, name: &'static str) -> Result<&'a [u8]> {
    if plane.data.is_null() {
        return Err(BridgeError::MalformedPlane {
            plane: name,
            reason: "null data".into(),
        });
    }
    Ok(std::slice::from_raw_parts(plane.data, plane.len))
}

fn plane_from_bytes(plane: &XrPlane, data: &[u8]) -> ImagePlane {
    ImagePlane {
        width: plane.width,
        height: plane.height,
        bytes_per_row: plane.bytes_per_row,
        data: data.to_vec(),
    }
}

/// Validate the frame's image planes; copy them only when `copy` is set.
unsafe fn image_from_c(frame: &XrFrame, copy: bool) -> Result<Option<CapturedImage>> {
    if !frame.has_image {
        return Ok(None);
    }
    let pixel_format = match frame.pixel_format {
        0 => PixelFormat::BiPlanarFullRange,
        1 => PixelFormat::BiPlanarVideoRange,
        other => {
            return Err(BridgeError::InvalidArgument(format!(
                "unknown pixel format {}",
                other
            )))
        }
    };
    let luma = plane_bytes(&frame.luma, "luma")?;
    let chroma = plane_bytes(&frame.chroma, "chroma")?;
    if !copy {
        return Ok(None);
    }
    Ok(Some(CapturedImage {
        pixel_format,
        luma: plane_from_bytes(&frame.luma, luma),
        chroma: plane_from_bytes(&frame.chroma, chroma),
    }))
}

/// Everything but the captured image, which `image_from_c` handles.
unsafe fn frame_from_c(frame: &XrFrame) -> Result<RawFrame> {
    let light_estimate = frame.has_light_estimate.then(|| LightEstimate {
        ambient_intensity: frame.ambient_intensity,
        ambient_color_temperature: frame.ambient_color_temperature,
        directional: frame.has_directional_light.then(|| DirectionalLight {
            primary_direction: Vector3::from(frame.primary_light_direction),
            primary_intensity: frame.primary_light_intensity,
        }),
    });

    let mut anchors = Vec::with_capacity(frame.anchor_count);
    if frame.anchor_count > 0 {
        if frame.anchors.is_null() {
            return Err(BridgeError::InvalidArgument("anchors is null".into()));
        }
        for a in std::slice::from_raw_parts(frame.anchors, frame.anchor_count) {
            let kind = match a.kind {
                1 => AnchorKind::Plane,
                2 => AnchorKind::Image,
                3 => AnchorKind::Face,
                _ => AnchorKind::Anchor,
            };
            anchors.push(Anchor {
                identifier: c_str_to_string(a.identifier, "anchor identifier")?,
                transform: Matrix4::from_column_slice(&a.transform),
                kind,
            });
        }
    }

    Ok(RawFrame {
        timestamp: frame.timestamp,
        camera: Camera {
            transform: Matrix4::from_column_slice(&frame.camera_transform),
            intrinsics: Matrix3::from_column_slice(&frame.intrinsics),
            image_resolution: frame.image_resolution,
        },
        light_estimate,
        captured_image: None,
        world_mapping_status: WorldMappingStatus::from_raw(frame.world_mapping_status),
        anchors,
    })
}

/// Copy `json` plus a NUL into `out` when it fits; return the JSON length either way.
unsafe fn write_json(json: Option<String>, out: *mut c_char, capacity: usize) -> isize {
    let Some(json) = json else {
        return 0;
    };
    let len = json.len();
    if !out.is_null() && len < capacity {
        std::ptr::copy_nonoverlapping(json.as_ptr() as *const c_char, out, len);
        out.add(len).write(0);
    }
    len as isize
}

/// Create a bridge configured from `XRBRIDGE_*` environment variables.
#[no_mangle]
pub extern "C" fn xr_bridge_create() -> *mut XrBridge {
    let aggregator = FrameAggregator::new(BridgeConfig::from_env());
    Box::into_raw(Box::new(XrBridge(aggregator)))
}

/// Destroy a bridge and free its resources.
///
/// # Safety
/// `bridge` must be a pointer returned by `xr_bridge_create`, or null.
#[no_mangle]
pub unsafe extern "C" fn xr_bridge_destroy(bridge: *mut XrBridge) {
    if !bridge.is_null() {
        drop(Box::from_raw(bridge));
    }
}

/// Replace the request descriptor. `flags`: bit 0 lighting, bit 1 camera, bit 2 anchors.
///
/// # Safety
/// `bridge` must be a valid bridge pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn xr_bridge_set_request(
    bridge: *const XrBridge,
    flags: u32,
    viewport_width: f32,
    viewport_height: f32,
) -> c_int {
    if bridge.is_null() {
        return -1;
    }
    let viewport = Size::new(viewport_width, viewport_height);
    if !viewport.is_drawable() {
        return fail(BridgeError::InvalidArgument(format!(
            "viewport {}x{}",
            viewport_width, viewport_height
        )));
    }
    let request = RequestDescriptor::new(RequestFlags::from_bits_truncate(flags), viewport);
    (*bridge).0.set_request_descriptor(request);
    0
}

/// Drop the request descriptor; frames are ignored until a new one is set.
///
/// # Safety
/// `bridge` must be a valid bridge pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn xr_bridge_clear_request(bridge: *const XrBridge) {
    if !bridge.is_null() {
        (*bridge).0.clear_request_descriptor();
    }
}

/// Toggle computer-vision data globally.
///
/// # Safety
/// `bridge` must be a valid bridge pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn xr_bridge_enable_cv(bridge: *const XrBridge, enabled: bool) {
    if !bridge.is_null() {
        (*bridge).0.enable_computer_vision(enabled);
    }
}

/// Arm one computer-vision snapshot for the next eligible frame.
///
/// # Safety
/// `bridge` must be a valid bridge pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn xr_bridge_request_cv_frame(bridge: *const XrBridge) {
    if !bridge.is_null() {
        (*bridge).0.request_computer_vision_frame();
    }
}

/// Set the interface orientation (1 portrait, 2 upside down, 3 landscape right, 4 landscape left).
/// Returns 0 on success, -1 on an unknown value.
///
/// # Safety
/// `bridge` must be a valid bridge pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn xr_bridge_set_orientation(bridge: *const XrBridge, orientation: c_int) -> c_int {
    if bridge.is_null() {
        return -1;
    }
    match InterfaceOrientation::from_raw(orientation) {
        Some(o) => {
            (*bridge).0.set_interface_orientation(o);
            0
        }
        None => fail(BridgeError::InvalidArgument(format!(
            "unknown interface orientation {}",
            orientation
        ))),
    }
}

/// Record that an anchor was added.
///
/// # Safety
/// `bridge` must be a valid bridge pointer and `id` a null-terminated string, or null.
#[no_mangle]
pub unsafe extern "C" fn xr_bridge_anchor_added(bridge: *const XrBridge, id: *const c_char) -> c_int {
    if bridge.is_null() {
        return -1;
    }
    match c_str_to_string(id, "anchor id") {
        Ok(id) => {
            (*bridge).0.record_anchor_added(&id);
            0
        }
        Err(e) => fail(e),
    }
}

/// Record that an anchor was removed.
///
/// # Safety
/// `bridge` must be a valid bridge pointer and `id` a null-terminated string, or null.
#[no_mangle]
pub unsafe extern "C" fn xr_bridge_anchor_removed(bridge: *const XrBridge, id: *const c_char) -> c_int {
    if bridge.is_null() {
        return -1;
    }
    match c_str_to_string(id, "anchor id") {
        Ok(id) => {
            (*bridge).0.record_anchor_removed(&id);
            0
        }
        Err(e) => fail(e),
    }
}

/// Aggregate one frame on the calling thread.
///
/// Returns 0 when the frame was aggregated, -1 if the frame description is
/// invalid. A bad image plane is not fatal: the image is dropped, the defect
/// is logged and counted in the stats, and the rest of the frame is still
/// aggregated. Planes are only copied when a computer-vision snapshot is due.
///
/// # Safety
/// `bridge` and `frame` must be valid pointers, or null. Plane and anchor
/// pointers inside `frame` must be valid for the declared lengths.
#[no_mangle]
pub unsafe extern "C" fn xr_bridge_push_frame(bridge: *const XrBridge, frame: *const XrFrame) -> c_int {
    if bridge.is_null() || frame.is_null() {
        return -1;
    }
    let aggregator = &(*bridge).0;
    let frame = &*frame;
    let mut raw = match frame_from_c(frame) {
        Ok(raw) => raw,
        Err(e) => return fail(e),
    };
    raw.captured_image = match image_from_c(frame, aggregator.wants_captured_image()) {
        Ok(image) => image,
        Err(e) => {
            aggregator.report_defect(frame.timestamp, &e);
            None
        }
    };
    aggregator.on_frame(&raw);
    0
}

/// Write the latest snapshot as NUL-terminated JSON into `out`.
///
/// Returns the JSON length in bytes (excluding the NUL), 0 if nothing was
/// published yet, or -1 on error. Nothing is written unless the return
/// value is smaller than `capacity`; retry with a larger buffer otherwise.
///
/// # Safety
/// `bridge` must be a valid bridge pointer, or null. `out` must point to at
/// least `capacity` bytes, or be null.
#[no_mangle]
pub unsafe extern "C" fn xr_bridge_read_latest(bridge: *const XrBridge, out: *mut c_char, capacity: usize) -> isize {
    if bridge.is_null() {
        return -1;
    }
    match (*bridge).0.store().read_latest_json() {
        Ok(json) => write_json(json, out, capacity),
        Err(e) => fail(e) as isize,
    }
}

/// Write the latest computer-vision snapshot as JSON. Same contract as `xr_bridge_read_latest`.
///
/// # Safety
/// See `xr_bridge_read_latest`.
#[no_mangle]
pub unsafe extern "C" fn xr_bridge_read_latest_cv(
    bridge: *const XrBridge,
    out: *mut c_char,
    capacity: usize,
) -> isize {
    if bridge.is_null() {
        return -1;
    }
    match (*bridge).0.store().read_latest_cv_json() {
        Ok(json) => write_json(json, out, capacity),
        Err(e) => fail(e) as isize,
    }
}

/// Copy aggregation counters into `out`. Returns 0 on success.
///
/// # Safety
/// `bridge` and `out` must be valid pointers, or null.
#[no_mangle]
pub unsafe extern "C" fn xr_bridge_stats(bridge: *const XrBridge, out: *mut XrFrameStats) -> c_int {
    if bridge.is_null() || out.is_null() {
        return -1;
    }
    let stats = (*bridge).0.stats();
    out.write(XrFrameStats {
        published: stats.published,
        skipped_unsubscribed: stats.skipped_unsubscribed,
        defects: stats.defects,
        cv_published: stats.cv_published,
    });
    0
}

/// Get the last error message. Returns NULL if no error.
///
/// The message is shared by all threads. Read it on the thread that made the
/// failing call, before making any other xrbridge call; the pointer is
/// invalidated by the next failure on any thread.
#[no_mangle]
pub extern "C" fn xr_last_error() -> *const c_char {
    LAST_ERROR.as_ptr()
}
