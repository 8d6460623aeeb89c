//! Feed synthetic tracking frames through the bridge and print snapshots as JSON lines.
//!
//! A producer thread submits 60 Hz frames of a camera orbiting the origin and
//! adds/removes an anchor now and then; the main thread reads the latest
//! snapshot at ~5 Hz, like a remote consumer would.
//!
//! Usage: cargo run --example stream_json

use nalgebra::{Matrix3, Matrix4, Rotation3, Translation3};
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use xrbridge::{
    Anchor, AnchorKind, BridgeConfig, Camera, FrameAggregator, FramePump, LightEstimate, RawFrame,
    RequestDescriptor, RequestFlags, Size, WorldMappingStatus,
};

fn synthetic_frame(t: f64, anchors: &[Anchor]) -> RawFrame {
    let angle = (t * 0.5) as f32;
    let transform = Rotation3::from_euler_angles(0.0, angle, 0.0).to_homogeneous()
        * Translation3::new(0.0, 1.5, 2.0).to_homogeneous();
    RawFrame {
        timestamp: t,
        camera: Camera {
            transform,
            intrinsics: Matrix3::new(1450.0, 0.0, 960.0, 0.0, 1450.0, 720.0, 0.0, 0.0, 1.0),
            image_resolution: Size::new(1920.0, 1440.0),
        },
        light_estimate: Some(LightEstimate {
            ambient_intensity: 1000.0 + 50.0 * angle.sin(),
            ambient_color_temperature: 6500.0,
            directional: None,
        }),
        captured_image: None,
        world_mapping_status: if t < 2.0 {
            WorldMappingStatus::Limited
        } else {
            WorldMappingStatus::Mapped
        },
        anchors: anchors.to_vec(),
    }
}

fn main() {
    env_logger::init();

    let aggregator = Arc::new(FrameAggregator::new(BridgeConfig::from_env()));
    aggregator.set_request_descriptor(RequestDescriptor::new(
        RequestFlags::all(),
        Size::new(390.0, 844.0),
    ));

    let pump = match FramePump::start(aggregator.clone()) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to start frame pump: {}", e);
            std::process::exit(1);
        }
    };

    let running = Arc::new(AtomicBool::new(true));
    let producer = {
        let aggregator = aggregator.clone();
        let running = running.clone();
        std::thread::spawn(move || {
            let start = Instant::now();
            let mut anchors: Vec<Anchor> = Vec::new();
            let mut frame_index: u64 = 0;
            while running.load(Ordering::Relaxed) {
                let t = start.elapsed().as_secs_f64();
                if frame_index % 90 == 45 {
                    let id = format!("anchor-{}", frame_index);
                    aggregator.record_anchor_added(&id);
                    anchors.push(Anchor {
                        identifier: id,
                        transform: Matrix4::identity(),
                        kind: AnchorKind::Anchor,
                    });
                }
                if frame_index % 240 == 200 && !anchors.is_empty() {
                    let gone = anchors.remove(0);
                    aggregator.record_anchor_removed(&gone.identifier);
                }
                if let Err(e) = pump.submit(synthetic_frame(t, &anchors)) {
                    eprintln!("Error: {}", e);
                    break;
                }
                frame_index += 1;
                std::thread::sleep(Duration::from_millis(16));
            }
            eprintln!("Dropped {} frames", pump.dropped_frames());
            pump.stop();
        })
    };

    eprintln!("Streaming JSON for 10s...");

    let stdout = io::stdout();
    let mut out = io::BufWriter::new(stdout.lock());
    let start = Instant::now();
    while start.elapsed() < Duration::from_secs(10) {
        std::thread::sleep(Duration::from_millis(200));
        match aggregator.store().read_latest_json() {
            Ok(Some(json)) => {
                let _ = writeln!(out, "{}", json);
                let _ = out.flush();
            }
            Ok(None) => eprintln!("No snapshot yet"),
            Err(e) => {
                eprintln!("Error: {}", e);
                break;
            }
        }
    }

    running.store(false, Ordering::Relaxed);
    let _ = producer.join();
    eprintln!("{:?}", aggregator.stats());
}
