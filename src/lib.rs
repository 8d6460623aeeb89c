//! # xrbridge - AR frame aggregation and snapshot handoff
//!
//! Sits between a high-rate tracking session and a request-driven consumer:
//! - Filters each frame by the consumer's current request descriptor
//! - Builds typed snapshots (lighting, camera matrices, anchor deltas) and
//!   optional computer-vision snapshots with base64 image planes
//! - Publishes them last-write-wins for reads from any thread
//! - C FFI for a native host that owns the session and the transport
//!
//! ## Quick Start
//! ```no_run
//! use xrbridge::{BridgeConfig, FrameAggregator, RequestDescriptor, RequestFlags, Size};
//!
//! let aggregator = FrameAggregator::new(BridgeConfig::from_env());
//! aggregator.set_request_descriptor(RequestDescriptor::new(
//!     RequestFlags::CAMERA | RequestFlags::ANCHORS,
//!     Size::new(390.0, 844.0),
//! ));
//!
//! // Producer thread: aggregator.on_frame(&raw_frame) for every tracking update.
//! // Consumer thread:
//! if let Some(snapshot) = aggregator.read_latest() {
//!     println!("{}", snapshot.to_json().unwrap());
//! }
//! ```

pub mod error;
pub mod types;
pub mod config;
pub mod matrix;
pub mod image;
pub mod anchors;
pub mod snapshot;
pub mod store;
pub mod aggregator;
pub mod pump;
pub mod ffi;

pub use error::BridgeError;
pub use types::*;
pub use config::BridgeConfig;
pub use anchors::{AnchorDelta, AnchorDeltaTracker};
pub use snapshot::{ComputerVisionSnapshot, Snapshot};
pub use store::SnapshotStore;
pub use aggregator::{FrameAggregator, FrameStats};
pub use pump::FramePump;

/// Result type alias for xrbridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;
