use crate::anchors::AnchorDeltaTracker;
use crate::config::{BridgeConfig, Z_FAR, Z_NEAR};
use crate::image;
use crate::matrix::{self, CameraMatrices};
use crate::snapshot::{
    AnchorObject, AnchorsBlock, CameraBlock, ComputerVisionSnapshot, CvCamera, CvFrame, Direction,
    LightObject, LightingBlock, Snapshot,
};
use crate::store::SnapshotStore;
use crate::types::{InterfaceOrientation, LightEstimate, RawFrame, RequestDescriptor, RequestFlags};
use crate::{BridgeError, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Consumer-facing control state. Copied once per pass so a pass never sees
/// a half-updated request.
#[derive(Debug, Clone, Copy)]
struct ControlState {
    request: Option<RequestDescriptor>,
    cv_enabled: bool,
    cv_armed: bool,
    orientation: InterfaceOrientation,
}

/// Inputs of one aggregation pass.
#[derive(Debug, Clone, Copy)]
struct Pass {
    request: RequestDescriptor,
    orientation: InterfaceOrientation,
    cv_enabled: bool,
    build_cv: bool,
}

#[derive(Debug, Default)]
struct Counters {
    published: AtomicU64,
    unsubscribed: AtomicU64,
    defects: AtomicU64,
    cv_published: AtomicU64,
}

/// Running totals of aggregation outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Passes that published a snapshot.
    pub published: u64,
    /// Frames skipped because no request descriptor was set.
    pub skipped_unsubscribed: u64,
    /// Computation defects (singular matrices, malformed planes, bad geometry).
    pub defects: u64,
    pub cv_published: u64,
}

/// Turns tracking frames into published snapshots.
///
/// `on_frame` is the only writer of the [`SnapshotStore`]. Control calls and
/// reads may come from any thread; share the aggregator behind an `Arc`.
pub struct FrameAggregator {
    config: BridgeConfig,
    control: Mutex<ControlState>,
    anchors: AnchorDeltaTracker,
    store: SnapshotStore,
    counters: Counters,
}

impl FrameAggregator {
    pub fn new(config: BridgeConfig) -> Self {
        log::info!(
            "Frame aggregator ready: cv_scale={} alignment={:?}",
            config.cv_image_scale_factor,
            config.world_alignment
        );
        Self {
            config,
            control: Mutex::new(ControlState {
                request: None,
                cv_enabled: false,
                cv_armed: false,
                orientation: InterfaceOrientation::default(),
            }),
            anchors: AnchorDeltaTracker::new(),
            store: SnapshotStore::new(),
            counters: Counters::default(),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    // -- Control boundary --

    /// Replace the whole request descriptor.
    pub fn set_request_descriptor(&self, request: RequestDescriptor) {
        log::debug!(
            "Request descriptor: flags={:?} viewport={}x{}",
            request.flags,
            request.viewport.width,
            request.viewport.height
        );
        self.control.lock().request = Some(request);
    }

    /// Drop the request descriptor; subsequent frames are ignored until a new one is set.
    pub fn clear_request_descriptor(&self) {
        log::debug!("Request descriptor cleared");
        self.control.lock().request = None;
    }

    pub fn enable_computer_vision(&self, enabled: bool) {
        let mut control = self.control.lock();
        if control.cv_enabled != enabled {
            log::info!("Computer vision data {}", if enabled { "enabled" } else { "disabled" });
        }
        control.cv_enabled = enabled;
    }

    /// Arm a single computer-vision snapshot for the next eligible pass.
    pub fn request_computer_vision_frame(&self) {
        log::debug!("Computer vision frame requested");
        self.control.lock().cv_armed = true;
    }

    pub fn set_interface_orientation(&self, orientation: InterfaceOrientation) {
        self.control.lock().orientation = orientation;
    }

    pub fn record_anchor_added(&self, id: &str) {
        self.anchors.record_added(id);
    }

    pub fn record_anchor_removed(&self, id: &str) {
        self.anchors.record_removed(id);
    }

    /// True when the next pass would build a computer-vision snapshot, so a
    /// host can skip copying image planes otherwise.
    pub fn wants_captured_image(&self) -> bool {
        let control = self.control.lock();
        control.request.is_some() && control.cv_enabled && control.cv_armed
    }

    /// Log and count a defect the host found while converting a frame.
    pub fn report_defect(&self, timestamp: f64, err: &BridgeError) {
        self.counters.defects.fetch_add(1, Ordering::Relaxed);
        log::error!("Frame defect at t={:.3}: {}", timestamp, err);
    }

    pub fn anchor_tracker(&self) -> &AnchorDeltaTracker {
        &self.anchors
    }

    // -- Output boundary --

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub fn read_latest(&self) -> Option<Arc<Snapshot>> {
        self.store.read_latest()
    }

    pub fn read_latest_cv(&self) -> Option<Arc<ComputerVisionSnapshot>> {
        self.store.read_latest_cv()
    }

    pub fn stats(&self) -> FrameStats {
        FrameStats {
            published: self.counters.published.load(Ordering::Relaxed),
            skipped_unsubscribed: self.counters.unsubscribed.load(Ordering::Relaxed),
            defects: self.counters.defects.load(Ordering::Relaxed),
            cv_published: self.counters.cv_published.load(Ordering::Relaxed),
        }
    }

    // -- Input boundary --

    /// Aggregate one tracking frame and publish the result.
    ///
    /// A no-op until a request descriptor is set. Defects are logged and the
    /// affected snapshot is skipped; the pipeline keeps running.
    pub fn on_frame(&self, frame: &RawFrame) {
        let Some(pass) = self.begin_pass(frame.captured_image.is_some()) else {
            self.counters.unsubscribed.fetch_add(1, Ordering::Relaxed);
            log::trace!("No request descriptor, skipping frame t={:.3}", frame.timestamp);
            return;
        };

        let cv = if pass.build_cv {
            match self.build_cv_snapshot(frame, &pass) {
                Ok(cv) => Some(cv),
                Err(e) => {
                    self.counters.defects.fetch_add(1, Ordering::Relaxed);
                    log::error!("Skipping computer vision snapshot at t={:.3}: {}", frame.timestamp, e);
                    None
                }
            }
        } else {
            None
        };

        match self.build_snapshot(frame, &pass) {
            Ok(snapshot) => {
                self.store.publish(snapshot);
                self.counters.published.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.counters.defects.fetch_add(1, Ordering::Relaxed);
                log::error!("Skipping frame t={:.3}: {}", frame.timestamp, e);
            }
        }

        if let Some(cv) = cv {
            self.store.publish_cv(cv);
            self.counters.cv_published.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Copy the control state for one pass and consume the CV arm if this pass uses it.
    fn begin_pass(&self, has_image: bool) -> Option<Pass> {
        let mut control = self.control.lock();
        let request = control.request?;
        let build_cv = control.cv_enabled && control.cv_armed && has_image;
        if build_cv {
            control.cv_armed = false;
        } else if control.cv_enabled && control.cv_armed {
            log::debug!("Computer vision frame armed but frame has no captured image");
        }
        Some(Pass {
            request,
            orientation: control.orientation,
            cv_enabled: control.cv_enabled,
            build_cv,
        })
    }

    /// Assemble the general snapshot. Anchor deltas are drained last so a
    /// failing block never swallows anchor events.
    fn build_snapshot(&self, frame: &RawFrame, pass: &Pass) -> Result<Snapshot> {
        let request = &pass.request;

        let lighting = request
            .wants(RequestFlags::LIGHTING)
            .then(|| lighting_block(frame.light_estimate.as_ref()));

        let camera = if request.wants(RequestFlags::CAMERA) {
            let m = CameraMatrices::compute(&frame.camera, pass.orientation, request.viewport, Z_NEAR, Z_FAR)?;
            Some(CameraBlock {
                projection_camera: m.projection,
                camera_view: m.view,
                camera_transform: m.model,
            })
        } else {
            None
        };

        let anchors = if request.wants(RequestFlags::ANCHORS) {
            let objects = frame
                .anchors
                .iter()
                .map(|a| AnchorObject {
                    uuid: a.identifier.clone(),
                    transform: matrix::to_column_major(&a.transform),
                    kind: a.kind,
                })
                .collect();
            let delta = self.anchors.drain();
            Some(AnchorsBlock {
                objects,
                new_objects: delta.added,
                removed_objects: delta.removed,
            })
        } else {
            None
        };

        Ok(Snapshot {
            timestamp: frame.timestamp_ms(),
            world_mapping_status: frame.world_mapping_status,
            lighting,
            camera,
            anchors,
            geo_aligned: self.config.is_geo_aligned(),
            video_access: pass.cv_enabled,
        })
    }

    fn build_cv_snapshot(&self, frame: &RawFrame, pass: &Pass) -> Result<ComputerVisionSnapshot> {
        let captured = frame.captured_image.as_ref().ok_or_else(|| {
            BridgeError::InvalidArgument("frame has no captured image".into())
        })?;
        let camera = &frame.camera;

        let intrinsics = image::scale_intrinsics(&camera.intrinsics, self.config.cv_image_scale_factor)?;
        let projection = matrix::projection_matrix(camera, pass.orientation, pass.request.viewport, Z_NEAR, Z_FAR)?;
        let view = matrix::view_matrix(camera, pass.orientation)?;
        let inverse_view = matrix::model_matrix(&view)?;
        let encoded = image::encode_image(captured)?;

        Ok(ComputerVisionSnapshot {
            frame: CvFrame {
                timestamp: frame.timestamp_ms(),
                buffers: [encoded.luma, encoded.chroma],
                pixel_format_type: captured.pixel_format.four_cc(),
            },
            camera: CvCamera {
                camera_image_resolution: camera.image_resolution,
                camera_intrinsics: matrix::to_column_major3(&intrinsics),
                projection_matrix: matrix::to_column_major(&projection),
                view_matrix: matrix::to_column_major(&view),
                inverse_view_matrix: matrix::to_column_major(&inverse_view),
                interface_orientation: pass.orientation.raw_value(),
            },
        })
    }
}

/// Missing estimates report zero intensity and temperature.
fn lighting_block(estimate: Option<&LightEstimate>) -> LightingBlock {
    let intensity = estimate.map_or(0.0, |e| e.ambient_intensity);
    let temperature = estimate.map_or(0.0, |e| e.ambient_color_temperature);
    let directional = estimate.and_then(|e| e.directional);
    LightingBlock {
        light_intensity: intensity,
        light: LightObject {
            light_intensity: intensity,
            ambient_color_temperature: temperature,
            primary_light_direction: directional.map(|d| Direction {
                x: d.primary_direction.x,
                y: d.primary_direction.y,
                z: d.primary_direction.z,
            }),
            primary_light_intensity: directional.map(|d| d.primary_intensity),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        Anchor, AnchorKind, Camera, CapturedImage, DirectionalLight, ImagePlane, PixelFormat, Size,
        WorldAlignment, WorldMappingStatus,
    };
    use nalgebra::{Matrix3, Matrix4, Translation3, Vector3};

    fn camera() -> Camera {
        #[rustfmt::skip]
        let intrinsics = Matrix3::new(
            200.0, 0.0,   200.0,
            0.0,   200.0, 100.0,
            0.0,   0.0,   1.0,
        );
        Camera {
            transform: Translation3::new(1.0, 2.0, 3.0).to_homogeneous(),
            intrinsics,
            image_resolution: Size::new(400.0, 200.0),
        }
    }

    fn captured_image() -> CapturedImage {
        CapturedImage {
            pixel_format: PixelFormat::BiPlanarFullRange,
            luma: ImagePlane {
                width: 4,
                height: 2,
                bytes_per_row: 4,
                data: vec![1, 2, 3, 4, 5, 6, 7, 8],
            },
            chroma: ImagePlane {
                width: 2,
                height: 1,
                bytes_per_row: 4,
                data: vec![9, 10, 11, 12],
            },
        }
    }

    fn frame(timestamp: f64) -> RawFrame {
        RawFrame {
            timestamp,
            camera: camera(),
            light_estimate: Some(LightEstimate {
                ambient_intensity: 850.0,
                ambient_color_temperature: 5200.0,
                directional: None,
            }),
            captured_image: Some(captured_image()),
            world_mapping_status: WorldMappingStatus::Limited,
            anchors: vec![Anchor {
                identifier: "A1".into(),
                transform: Matrix4::identity(),
                kind: AnchorKind::Plane,
            }],
        }
    }

    fn request(flags: RequestFlags) -> RequestDescriptor {
        RequestDescriptor::new(flags, Size::new(100.0, 200.0))
    }

    fn assert_close(actual: &[f32], expected: &[f32]) {
        assert_eq!(actual.len(), expected.len());
        for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
            assert!((a - e).abs() < 1e-5, "element {}: {} != {}", i, a, e);
        }
    }

    #[test]
    fn test_no_descriptor_is_a_noop() {
        let agg = FrameAggregator::new(BridgeConfig::default());
        agg.enable_computer_vision(true);
        agg.request_computer_vision_frame();
        agg.record_anchor_added("A1");

        agg.on_frame(&frame(1.0));

        assert!(agg.read_latest().is_none());
        assert!(agg.read_latest_cv().is_none());
        assert_eq!(agg.stats().skipped_unsubscribed, 1);

        // Neither the anchor event nor the CV arm was consumed.
        agg.set_request_descriptor(request(RequestFlags::ANCHORS));
        agg.on_frame(&frame(2.0));
        let snap = agg.read_latest().unwrap();
        assert_eq!(snap.anchors.as_ref().unwrap().new_objects, vec!["A1"]);
        assert_eq!(agg.read_latest_cv().unwrap().frame.timestamp, 2000);
    }

    #[test]
    fn test_block_presence_matches_flags() {
        for bits in 0..8u32 {
            let flags = RequestFlags::from_bits_truncate(bits);
            let agg = FrameAggregator::new(BridgeConfig::default());
            agg.set_request_descriptor(request(flags));
            agg.on_frame(&frame(1.0));

            let snap = agg.read_latest().unwrap();
            assert_eq!(snap.lighting.is_some(), flags.contains(RequestFlags::LIGHTING), "{:?}", flags);
            assert_eq!(snap.camera.is_some(), flags.contains(RequestFlags::CAMERA), "{:?}", flags);
            assert_eq!(snap.anchors.is_some(), flags.contains(RequestFlags::ANCHORS), "{:?}", flags);

            let json: serde_json::Value = serde_json::from_str(&snap.to_json().unwrap()).unwrap();
            assert_eq!(json.get("light").is_some(), flags.contains(RequestFlags::LIGHTING));
            assert_eq!(json.get("camera_view").is_some(), flags.contains(RequestFlags::CAMERA));
            assert_eq!(json.get("objects").is_some(), flags.contains(RequestFlags::ANCHORS));
            assert!(json.as_object().unwrap().values().all(|v| !v.is_null()));
        }
    }

    #[test]
    fn test_camera_only_request() {
        let agg = FrameAggregator::new(BridgeConfig::default());
        agg.set_interface_orientation(InterfaceOrientation::Portrait);
        agg.set_request_descriptor(request(RequestFlags::CAMERA));
        agg.on_frame(&frame(1.5));

        let snap = agg.read_latest().unwrap();
        assert_eq!(snap.timestamp, 1500);
        assert!(snap.lighting.is_none());
        assert!(snap.anchors.is_none());
        let cam = snap.camera.as_ref().unwrap();

        let a = (Z_FAR + Z_NEAR) / (Z_NEAR - Z_FAR);
        let b = 2.0 * Z_FAR * Z_NEAR / (Z_NEAR - Z_FAR);
        // Portrait 200x400 image exactly fills the 100x200 viewport.
        #[rustfmt::skip]
        let projection = [
            2.0, 0.0, 0.0, 0.0,
            0.0, 1.0, 0.0, 0.0,
            0.0, 0.0, a,   -1.0,
            0.0, 0.0, b,   0.0,
        ];
        #[rustfmt::skip]
        let view = [
            0.0,  1.0, 0.0, 0.0,
            -1.0, 0.0, 0.0, 0.0,
            0.0,  0.0, 1.0, 0.0,
            2.0, -1.0, -3.0, 1.0,
        ];
        #[rustfmt::skip]
        let model = [
            0.0, -1.0, 0.0, 0.0,
            1.0,  0.0, 0.0, 0.0,
            0.0,  0.0, 1.0, 0.0,
            1.0,  2.0, 3.0, 1.0,
        ];
        assert_close(&cam.projection_camera, &projection);
        assert_close(&cam.camera_view, &view);
        assert_close(&cam.camera_transform, &model);
    }

    #[test]
    fn test_cv_frame_is_single_shot() {
        let agg = FrameAggregator::new(BridgeConfig::default());
        agg.set_request_descriptor(request(RequestFlags::empty()));
        agg.enable_computer_vision(true);
        agg.request_computer_vision_frame();

        agg.on_frame(&frame(1.0));
        agg.on_frame(&frame(2.0));

        assert_eq!(agg.stats().cv_published, 1);
        let cv = agg.read_latest_cv().unwrap();
        assert_eq!(cv.frame.timestamp, 1000);
        assert_eq!(agg.read_latest().unwrap().timestamp, 2000);

        agg.request_computer_vision_frame();
        agg.on_frame(&frame(3.0));
        assert_eq!(agg.read_latest_cv().unwrap().frame.timestamp, 3000);
    }

    #[test]
    fn test_anchor_removed_after_drain() {
        let agg = FrameAggregator::new(BridgeConfig::default());
        agg.set_request_descriptor(request(RequestFlags::ANCHORS));

        agg.record_anchor_added("A1");
        agg.on_frame(&frame(1.0));
        let first = agg.read_latest().unwrap();
        let block = first.anchors.as_ref().unwrap();
        assert_eq!(block.new_objects, vec!["A1"]);
        assert!(block.removed_objects.is_empty());
        assert_eq!(block.objects[0].uuid, "A1");

        agg.record_anchor_removed("A1");
        agg.on_frame(&frame(2.0));
        let second = agg.read_latest().unwrap();
        let block = second.anchors.as_ref().unwrap();
        assert!(block.new_objects.is_empty());
        assert_eq!(block.removed_objects, vec!["A1"]);
    }

    #[test]
    fn test_anchors_not_drained_without_flag() {
        let agg = FrameAggregator::new(BridgeConfig::default());
        agg.set_request_descriptor(request(RequestFlags::LIGHTING));
        agg.record_anchor_added("A1");
        agg.on_frame(&frame(1.0));
        assert_eq!(agg.anchor_tracker().drain_added(), vec!["A1"]);
    }

    #[test]
    fn test_idempotent_read() {
        let agg = FrameAggregator::new(BridgeConfig::default());
        agg.set_request_descriptor(request(RequestFlags::all()));
        agg.on_frame(&frame(1.0));
        let a = agg.store().read_latest_json().unwrap().unwrap();
        let b = agg.store().read_latest_json().unwrap().unwrap();
        assert_eq!(a, b);
        assert_eq!(agg.read_latest(), agg.read_latest());
    }

    #[test]
    fn test_defect_skips_frame_and_keeps_anchor_events() {
        let agg = FrameAggregator::new(BridgeConfig::default());
        agg.set_request_descriptor(request(RequestFlags::CAMERA | RequestFlags::ANCHORS));
        agg.on_frame(&frame(1.0));
        agg.record_anchor_added("A2");

        let mut broken = frame(2.0);
        broken.camera.transform = Matrix4::zeros();
        agg.on_frame(&broken);

        assert_eq!(agg.stats().defects, 1);
        assert_eq!(agg.read_latest().unwrap().timestamp, 1000);

        agg.on_frame(&frame(3.0));
        let snap = agg.read_latest().unwrap();
        assert_eq!(snap.anchors.as_ref().unwrap().new_objects, vec!["A2"]);
    }

    #[test]
    fn test_malformed_image_skips_only_cv() {
        let agg = FrameAggregator::new(BridgeConfig::default());
        agg.set_request_descriptor(request(RequestFlags::LIGHTING));
        agg.enable_computer_vision(true);
        agg.request_computer_vision_frame();

        let mut bad = frame(1.0);
        if let Some(image) = bad.captured_image.as_mut() {
            image.chroma.data.clear();
        }
        agg.on_frame(&bad);

        assert!(agg.read_latest_cv().is_none());
        assert_eq!(agg.read_latest().unwrap().timestamp, 1000);
        assert_eq!(agg.stats().defects, 1);
    }

    #[test]
    fn test_cv_arm_waits_for_frame_with_image() {
        let agg = FrameAggregator::new(BridgeConfig::default());
        agg.set_request_descriptor(request(RequestFlags::empty()));
        agg.enable_computer_vision(true);
        agg.request_computer_vision_frame();

        let mut no_image = frame(1.0);
        no_image.captured_image = None;
        agg.on_frame(&no_image);
        assert!(agg.read_latest_cv().is_none());

        agg.on_frame(&frame(2.0));
        assert_eq!(agg.read_latest_cv().unwrap().frame.timestamp, 2000);
    }

    #[test]
    fn test_cv_disabled_keeps_arm() {
        let agg = FrameAggregator::new(BridgeConfig::default());
        agg.set_request_descriptor(request(RequestFlags::empty()));
        agg.request_computer_vision_frame();
        agg.on_frame(&frame(1.0));
        assert!(agg.read_latest_cv().is_none());
        assert!(!agg.read_latest().unwrap().video_access);

        agg.enable_computer_vision(true);
        agg.on_frame(&frame(2.0));
        assert_eq!(agg.read_latest_cv().unwrap().frame.timestamp, 2000);
        assert!(agg.read_latest().unwrap().video_access);
    }

    #[test]
    fn test_cv_snapshot_contents() {
        let config = BridgeConfig {
            cv_image_scale_factor: 4.0,
            ..BridgeConfig::default()
        };
        let agg = FrameAggregator::new(config);
        agg.set_interface_orientation(InterfaceOrientation::LandscapeRight);
        agg.set_request_descriptor(request(RequestFlags::empty()));
        agg.enable_computer_vision(true);
        agg.request_computer_vision_frame();
        agg.on_frame(&frame(1.0));

        let cv = agg.read_latest_cv().unwrap();
        assert_eq!(cv.frame.pixel_format_type, "420f");
        assert_eq!(cv.frame.buffers[0].size.bytes_per_row, 4);
        assert_eq!(cv.frame.buffers[1].size.bytes_per_pixel, 2);
        assert_eq!(cv.camera.interface_orientation, 3);
        assert_eq!(cv.camera.camera_intrinsics, [50.0, 0.0, 0.0, 0.0, 50.0, 0.0, 50.0, 25.0, 1.0]);

        let view = matrix::from_column_major(&cv.camera.view_matrix);
        let inverse = matrix::from_column_major(&cv.camera.inverse_view_matrix);
        assert!(((inverse * view) - Matrix4::identity()).abs().max() < 1e-5);
    }

    #[test]
    fn test_lighting_and_flags() {
        let config = BridgeConfig {
            world_alignment: WorldAlignment::GravityAndHeading,
            ..BridgeConfig::default()
        };
        let agg = FrameAggregator::new(config);
        agg.set_request_descriptor(request(RequestFlags::LIGHTING));

        let mut f = frame(1.0);
        f.light_estimate = Some(LightEstimate {
            ambient_intensity: 900.0,
            ambient_color_temperature: 6000.0,
            directional: Some(DirectionalLight {
                primary_direction: Vector3::new(0.0, -1.0, 0.0),
                primary_intensity: 1200.0,
            }),
        });
        agg.on_frame(&f);

        let snap = agg.read_latest().unwrap();
        assert!(snap.geo_aligned);
        assert_eq!(snap.world_mapping_status, WorldMappingStatus::Limited);
        let light = snap.lighting.as_ref().unwrap();
        assert_eq!(light.light_intensity, 900.0);
        assert_eq!(light.light.primary_light_intensity, Some(1200.0));
        assert_eq!(light.light.primary_light_direction.unwrap().y, -1.0);

        f.light_estimate = None;
        agg.on_frame(&f);
        let snap = agg.read_latest().unwrap();
        let light = snap.lighting.as_ref().unwrap();
        assert_eq!(light.light_intensity, 0.0);
        assert_eq!(light.light.ambient_color_temperature, 0.0);
        assert!(light.light.primary_light_direction.is_none());
    }

    #[test]
    fn test_clear_request_stops_publishing() {
        let agg = FrameAggregator::new(BridgeConfig::default());
        agg.set_request_descriptor(request(RequestFlags::empty()));
        agg.on_frame(&frame(1.0));
        agg.clear_request_descriptor();
        agg.on_frame(&frame(2.0));
        assert_eq!(agg.read_latest().unwrap().timestamp, 1000);
        assert_eq!(
            agg.stats(),
            FrameStats {
                published: 1,
                skipped_unsubscribed: 1,
                defects: 0,
                cv_published: 0,
            }
        );
    }

    #[test]
    fn test_wants_captured_image_follows_arm() {
        let agg = FrameAggregator::new(BridgeConfig::default());
        agg.enable_computer_vision(true);
        agg.request_computer_vision_frame();
        assert!(!agg.wants_captured_image());

        agg.set_request_descriptor(request(RequestFlags::empty()));
        assert!(agg.wants_captured_image());

        agg.on_frame(&frame(1.0));
        assert!(!agg.wants_captured_image());
    }

    #[test]
    fn test_reported_defect_is_counted() {
        let agg = FrameAggregator::new(BridgeConfig::default());
        let err = BridgeError::MalformedPlane {
            plane: "luma",
            reason: "null data".into(),
        };
        agg.report_defect(1.0, &err);
        assert_eq!(agg.stats().defects, 1);
        assert_eq!(agg.stats().published, 0);
    }

    #[test]
    fn test_concurrent_control_and_frames() {
        let agg = Arc::new(FrameAggregator::new(BridgeConfig::default()));
        agg.set_request_descriptor(request(RequestFlags::all()));

        let producer = {
            let agg = agg.clone();
            std::thread::spawn(move || {
                for i in 0..200 {
                    agg.on_frame(&frame(i as f64));
                }
            })
        };
        for i in 0..200 {
            let flags = RequestFlags::from_bits_truncate(i % 8);
            agg.set_request_descriptor(request(flags));
            if let Some(snap) = agg.read_latest() {
                // Each snapshot is internally consistent with some descriptor.
                if let Some(cam) = snap.camera.as_ref() {
                    assert_eq!(cam.camera_transform.len(), 16);
                }
            }
        }
        producer.join().unwrap();
        assert_eq!(agg.stats().published, 200);
    }
}
