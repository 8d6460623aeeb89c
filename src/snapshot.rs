//! Published value types and their JSON shape.
//!
//! Optional blocks are `Option`s flattened into the parent object, so a block
//! that was not requested is an absent key rather than `null`.

use crate::image::EncodedPlane;
use crate::types::{AnchorKind, Size, WorldMappingStatus};
use crate::Result;
use serde::Serialize;

/// Point-in-time aggregation of the data the consumer asked for.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    /// Frame capture time in milliseconds.
    pub timestamp: i64,
    #[serde(rename = "worldMappingStatus")]
    pub world_mapping_status: WorldMappingStatus,
    #[serde(flatten)]
    pub lighting: Option<LightingBlock>,
    #[serde(flatten)]
    pub camera: Option<CameraBlock>,
    #[serde(flatten)]
    pub anchors: Option<AnchorsBlock>,
    pub geo_aligned: bool,
    pub video_access: bool,
}

impl Snapshot {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LightingBlock {
    /// Ambient intensity, duplicated at the top level for older consumers.
    pub light_intensity: f32,
    pub light: LightObject,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LightObject {
    pub light_intensity: f32,
    pub ambient_color_temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_light_direction: Option<Direction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_light_intensity: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Direction {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Column-major 4x4 camera matrices.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CameraBlock {
    pub projection_camera: [f32; 16],
    pub camera_view: [f32; 16],
    /// Model matrix, the inverse of `camera_view`.
    pub camera_transform: [f32; 16],
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnchorsBlock {
    pub objects: Vec<AnchorObject>,
    #[serde(rename = "newObjects")]
    pub new_objects: Vec<String>,
    #[serde(rename = "removedObjects")]
    pub removed_objects: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnchorObject {
    pub uuid: String,
    pub transform: [f32; 16],
    #[serde(rename = "type")]
    pub kind: AnchorKind,
}

/// Camera image plus everything needed to reproject it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComputerVisionSnapshot {
    pub frame: CvFrame,
    pub camera: CvCamera,
}

impl ComputerVisionSnapshot {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CvFrame {
    pub timestamp: i64,
    /// Luma first, then chroma.
    pub buffers: [EncodedPlane; 2],
    pub pixel_format_type: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CvCamera {
    pub camera_image_resolution: Size,
    /// Column-major 3x3, already divided by the image scale factor.
    pub camera_intrinsics: [f32; 9],
    pub projection_matrix: [f32; 16],
    pub view_matrix: [f32; 16],
    #[serde(rename = "inverse_viewMatrix")]
    pub inverse_view_matrix: [f32; 16],
    pub interface_orientation: i32,
}
