//! Backend requests: capture, upload, marker generation and engraving.

mod client;
mod types;

pub use client::{
    BackendConfig, BackendError, CalibrationBackend, HttpBackend, DEFAULT_MAX_RETRIES,
    DEFAULT_RETRY_DELAY_SECS, DEFAULT_TIMEOUT_SECS,
};
pub use types::{CalibrationData, CalibrationPayload, CaptureAck, GeneratedFile, RequestRoute};
