//! Server-side VIN capture.
//!
//! The browser owns the physical camera and streams frames into a [`FrameFeed`];
//! a [`CaptureEngine`] acquires the feed as its capture device, runs the barcode
//! and OCR [`Detector`]s against the frames and publishes [`ScanSnapshot`]s.
//!
//! [`ScanSnapshot`]: crate::models::scan::ScanSnapshot

pub mod detector;
pub mod device;
pub mod engine;
pub mod session;

pub use detector::{BarcodeDetector, DetectError, Detector, OcrDetector, RegionOfInterest};
pub use device::{CaptureDevice, DeviceErrorKind, Frame, FrameFeed, FrameStream};
pub use engine::{CaptureEngine, ScanSettings};
pub use session::{ScanSession, ScanSessions};

use crate::models::scan::Strategy;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    #[error("camera permission denied")]
    PermissionDenied,

    #[error("capture device not found")]
    DeviceNotFound,

    #[error("capture device is already in use")]
    DeviceInUse,

    #[error("camera does not support the requested constraints")]
    Overconstrained,

    #[error("no capture devices available")]
    NoDevices,

    #[error("timed out waiting for the capture device")]
    AcquireTimeout,

    #[error("capture stream ended")]
    StreamEnded,

    #[error("frame is not a decodable image")]
    InvalidFrame,

    #[error("{0} detection is not available")]
    StrategyUnavailable(Strategy),
}
