use std::fmt;

/// Errors produced while turning a tracking frame into published snapshots.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Matrix is singular or not finite, cannot invert")]
    SingularMatrix,

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Malformed {plane} plane: {reason}")]
    MalformedPlane { plane: &'static str, reason: String },

    #[error("Invalid image scale factor: {0} (must be finite and > 0)")]
    InvalidScaleFactor(f32),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Frame pump stopped")]
    PumpStopped,

    #[error("Failed to spawn frame thread: {0}")]
    ThreadSpawn(std::io::Error),
}

/// Thread-safe last-error storage for the C FFI layer.
pub(crate) struct LastError {
    message: parking_lot::Mutex<String>,
}

impl LastError {
    pub const fn new() -> Self {
        Self {
            message: parking_lot::const_mutex(String::new()),
        }
    }

    pub fn set(&self, err: &BridgeError) {
        *self.message.lock() = fmt::format(format_args!("{}\0", err));
    }

    /// Pointer into the stored message; valid until the next `set`.
    pub fn as_ptr(&self) -> *const std::ffi::c_char {
        let msg = self.message.lock();
        if msg.is_empty() {
            std::ptr::null()
        } else {
            msg.as_ptr() as *const std::ffi::c_char
        }
    }
}
