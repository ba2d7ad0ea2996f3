use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use strum::{Display, EnumString};

use crate::models::vin::ValidatedVin;

/// Number of OCR passes the rolling latency average covers.
pub const LATENCY_WINDOW: usize = 10;

/// Capture engine lifecycle.
///
/// `Idle -> Requesting -> Scanning -> (Detected | Stopped | Error)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ScanState {
    Idle,
    Requesting,
    Scanning,
    Detected,
    Stopped,
    Error,
}

impl ScanState {
    /// The device is (being) held by a running scan.
    pub fn is_active(self) -> bool {
        matches!(self, ScanState::Requesting | ScanState::Scanning)
    }
}

/// Which detection strategies a scan runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ScanMode {
    /// Barcode from the first frame, OCR joins after a start delay.
    #[default]
    Auto,
    Barcode,
    Ocr,
}

impl ScanMode {
    pub fn uses_barcode(self) -> bool {
        matches!(self, ScanMode::Auto | ScanMode::Barcode)
    }

    pub fn uses_ocr(self) -> bool {
        matches!(self, ScanMode::Auto | ScanMode::Ocr)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Strategy {
    Barcode,
    Ocr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StopReason {
    Cancelled,
    TimedOut,
}

/// A capture device as reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub device_id: String,
    #[serde(default)]
    pub label: String,
}

impl DeviceInfo {
    pub fn is_rear_facing(&self) -> bool {
        let label = self.label.to_lowercase();
        label.contains("back") || label.contains("rear")
    }
}

/// Pick the device a scan uses when the caller did not choose one:
/// a rear-facing camera if any, otherwise the first device.
pub fn select_default_device(devices: &[DeviceInfo]) -> Option<&DeviceInfo> {
    devices
        .iter()
        .find(|d| d.is_rear_facing())
        .or_else(|| devices.first())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Detection {
    pub vin: ValidatedVin,
    pub strategy: Strategy,
    pub detected_at: DateTime<Utc>,
}

/// Scanning statistics shown next to the preview.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanStats {
    pub frames_received: u64,
    pub ocr_attempts: u32,
    pub ocr_successes: u32,
    pub average_latency_ms: Option<f64>,
    #[serde(skip)]
    recent_latencies: VecDeque<Duration>,
}

impl ScanStats {
    /// Record one finished OCR pass, successful or not.
    pub fn record_ocr_pass(&mut self, latency: Duration, produced_vin: bool) {
        self.ocr_attempts += 1;
        if produced_vin {
            self.ocr_successes += 1;
        }
        if self.recent_latencies.len() == LATENCY_WINDOW {
            self.recent_latencies.pop_front();
        }
        self.recent_latencies.push_back(latency);

        let total: Duration = self.recent_latencies.iter().sum();
        self.average_latency_ms =
            Some(total.as_nanos() as f64 / 1_000_000.0 / self.recent_latencies.len() as f64);
    }
}

/// Everything a host UI needs to render the scanner.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSnapshot {
    pub state: ScanState,
    pub mode: ScanMode,
    pub device_id: Option<String>,
    pub detected: Option<Detection>,
    pub stop_reason: Option<StopReason>,
    pub error: Option<String>,
    pub stats: ScanStats,
}

impl ScanSnapshot {
    pub fn idle(mode: ScanMode) -> Self {
        Self {
            state: ScanState::Idle,
            mode,
            device_id: None,
            detected: None,
            stop_reason: None,
            error: None,
            stats: ScanStats::default(),
        }
    }
}
