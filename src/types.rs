use nalgebra::{Matrix3, Matrix4, Vector3};
use serde::Serialize;

/// Viewport or image size in points/pixels.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// True when both sides are finite and strictly positive.
    pub fn is_drawable(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }
}

bitflags::bitflags! {
    /// Data categories the consumer wants computed for each frame.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    #[repr(C)]
    pub struct RequestFlags: u32 {
        const LIGHTING = 1 << 0;
        const CAMERA   = 1 << 1;
        const ANCHORS  = 1 << 2;
    }
}

/// Consumer-supplied selection, overwritten wholesale by the control layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RequestDescriptor {
    pub flags: RequestFlags,
    pub viewport: Size,
}

impl RequestDescriptor {
    pub fn new(flags: RequestFlags, viewport: Size) -> Self {
        Self { flags, viewport }
    }

    pub fn wants(&self, flag: RequestFlags) -> bool {
        self.flags.contains(flag)
    }
}

/// Interface orientation of the rendering surface.
///
/// Discriminants match the raw values the consumer side already understands
/// (`portrait = 1`, `portraitUpsideDown = 2`, `landscapeRight = 3`, `landscapeLeft = 4`).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceOrientation {
    Portrait = 1,
    PortraitUpsideDown = 2,
    LandscapeRight = 3,
    LandscapeLeft = 4,
}

impl InterfaceOrientation {
    pub fn raw_value(self) -> i32 {
        self as i32
    }

    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            1 => Some(Self::Portrait),
            2 => Some(Self::PortraitUpsideDown),
            3 => Some(Self::LandscapeRight),
            4 => Some(Self::LandscapeLeft),
            _ => None,
        }
    }

    /// Quarter turns (counter-clockwise) from the sensor's native landscape-right frame.
    pub(crate) fn quarter_turns(self) -> u8 {
        match self {
            Self::LandscapeRight => 0,
            Self::Portrait => 1,
            Self::LandscapeLeft => 2,
            Self::PortraitUpsideDown => 3,
        }
    }

    /// True when the displayed image is rotated a quarter turn relative to the sensor.
    pub(crate) fn is_portrait(self) -> bool {
        self.quarter_turns() % 2 == 1
    }
}

impl Default for InterfaceOrientation {
    fn default() -> Self {
        Self::Portrait
    }
}

/// Tracking subsystem's understanding of the environment.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WorldMappingStatus {
    #[serde(rename = "ar_worldmapping_not_available")]
    NotAvailable = 0,
    #[serde(rename = "ar_worldmapping_limited")]
    Limited = 1,
    #[serde(rename = "ar_worldmapping_extending")]
    Extending = 2,
    #[serde(rename = "ar_worldmapping_mapped")]
    Mapped = 3,
}

impl WorldMappingStatus {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            1 => Self::Limited,
            2 => Self::Extending,
            3 => Self::Mapped,
            _ => Self::NotAvailable,
        }
    }
}

/// How the session's world coordinate system is aligned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorldAlignment {
    Gravity,
    GravityAndHeading,
    Camera,
}

/// Camera state for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    /// Camera-to-world transform.
    pub transform: Matrix4<f32>,
    /// Pinhole intrinsics `[fx 0 cx; 0 fy cy; 0 0 1]` in image pixels.
    pub intrinsics: Matrix3<f32>,
    /// Sensor image size in its native landscape orientation.
    pub image_resolution: Size,
}

/// Directional component of a light estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    pub primary_direction: Vector3<f32>,
    pub primary_intensity: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightEstimate {
    /// Ambient intensity in lumens (1000 is neutral).
    pub ambient_intensity: f32,
    /// Ambient color temperature in Kelvin.
    pub ambient_color_temperature: f32,
    pub directional: Option<DirectionalLight>,
}

/// Pixel layout of a bi-planar captured image.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// `420f`: 8-bit Y plane + interleaved CbCr plane, full range.
    BiPlanarFullRange = 0,
    /// `420v`: same layout, video range.
    BiPlanarVideoRange = 1,
}

impl PixelFormat {
    pub fn four_cc(self) -> &'static str {
        match self {
            Self::BiPlanarFullRange => "420f",
            Self::BiPlanarVideoRange => "420v",
        }
    }
}

/// One plane of a captured image as handed over by the tracking subsystem.
#[derive(Debug, Clone, PartialEq)]
pub struct ImagePlane {
    pub width: usize,
    pub height: usize,
    /// Stride in bytes; may exceed `width * bytes_per_pixel` when rows are padded.
    pub bytes_per_row: usize,
    pub data: Vec<u8>,
}

/// Dual-plane captured camera image.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedImage {
    pub pixel_format: PixelFormat,
    /// 8-bit luma plane.
    pub luma: ImagePlane,
    /// 16-bit interleaved chroma plane.
    pub chroma: ImagePlane,
}

/// A spatial anchor currently tracked by the session.
#[derive(Debug, Clone, PartialEq)]
pub struct Anchor {
    pub identifier: String,
    /// Anchor-to-world transform.
    pub transform: Matrix4<f32>,
    pub kind: AnchorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorKind {
    Anchor,
    Plane,
    Image,
    Face,
}

/// Everything the tracking subsystem yields for a single update.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    /// Capture time in seconds.
    pub timestamp: f64,
    pub camera: Camera,
    pub light_estimate: Option<LightEstimate>,
    pub captured_image: Option<CapturedImage>,
    pub world_mapping_status: WorldMappingStatus,
    pub anchors: Vec<Anchor>,
}

impl RawFrame {
    /// Capture time as integer milliseconds, the unit used on the wire.
    pub fn timestamp_ms(&self) -> i64 {
        (self.timestamp * 1000.0) as i64
    }
}
