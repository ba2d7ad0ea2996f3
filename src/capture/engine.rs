use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval_at, sleep, timeout, Instant, MissedTickBehavior};

use super::detector::{DetectError, Detector};
use super::device::{CaptureDevice, Frame};
use super::CaptureError;
use crate::models::scan::{
    select_default_device, Detection, DeviceInfo, ScanMode, ScanSnapshot, ScanState, StopReason,
    Strategy,
};
use crate::models::vin::ValidatedVin;
use crate::services::vin::extract_vin;

#[derive(Debug, Clone)]
pub struct ScanSettings {
    pub mode: ScanMode,
    /// A scan without a detection stops itself after this long.
    pub scan_timeout: Duration,
    pub ocr_interval: Duration,
    /// In `auto` mode OCR only starts after this delay.
    pub ocr_start_delay: Duration,
    pub acquire_timeout: Duration,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            mode: ScanMode::Auto,
            scan_timeout: Duration::from_secs(30),
            ocr_interval: Duration::from_millis(2000),
            ocr_start_delay: Duration::from_millis(3000),
            acquire_timeout: Duration::from_secs(20),
        }
    }
}

struct RunningScan {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Scanner state machine over one capture device.
///
/// `Idle -> Requesting -> Scanning -> (Detected | Stopped | Error)`. The device is
/// held only by the scan task, so it is released on every exit path, including
/// the engine being dropped mid-scan.
pub struct CaptureEngine {
    device: Arc<dyn CaptureDevice>,
    barcode: Option<Arc<dyn Detector>>,
    ocr: Option<Arc<dyn Detector>>,
    settings: ScanSettings,
    state: Arc<watch::Sender<ScanSnapshot>>,
    running: Mutex<Option<RunningScan>>,
}

impl CaptureEngine {
    pub fn new(device: Arc<dyn CaptureDevice>, settings: ScanSettings) -> Self {
        let (state, _) = watch::channel(ScanSnapshot::idle(settings.mode));
        Self {
            device,
            barcode: None,
            ocr: None,
            settings,
            state: Arc::new(state),
            running: Mutex::new(None),
        }
    }

    pub fn with_barcode(mut self, detector: Arc<dyn Detector>) -> Self {
        self.barcode = Some(detector);
        self
    }

    pub fn with_ocr(mut self, detector: Arc<dyn Detector>) -> Self {
        self.ocr = Some(detector);
        self
    }

    pub fn snapshot(&self) -> ScanSnapshot {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ScanSnapshot> {
        self.state.subscribe()
    }

    /// Resolves once no scan is requesting or holding the device.
    pub async fn wait_until_settled(&self) -> ScanSnapshot {
        let mut rx = self.state.subscribe();
        let settled = rx.wait_for(|s| !s.state.is_active()).await.map(|s| s.clone());
        settled.unwrap_or_else(|_| self.snapshot())
    }

    /// Available devices; empty when camera permission was denied.
    pub async fn list_devices(&self) -> Vec<DeviceInfo> {
        match self.device.list_devices().await {
            Ok(devices) => devices,
            Err(e) => {
                tracing::info!(error = %e, "Device enumeration unavailable");
                Vec::new()
            }
        }
    }

    /// Start scanning `device_id`, or the preferred device when `None`.
    ///
    /// Does nothing while a scan is already running. Failures before the scan
    /// task starts are also published as the `Error` state.
    pub async fn start(&self, device_id: Option<&str>) -> Result<(), CaptureError> {
        let mut running = self.running.lock().await;
        if let Some(previous) = running.take() {
            if self.state.borrow().state.is_active() {
                tracing::debug!("Scan already running, start ignored");
                *running = Some(previous);
                return Ok(());
            }
            // The previous scan has settled; make sure its task released the device.
            if let Err(e) = previous.handle.await {
                tracing::error!(error = %e, "Previous scan task did not finish cleanly");
            }
        }

        let mode = self.settings.mode;
        let barcode = self.barcode.clone().filter(|_| mode.uses_barcode());
        let ocr = self.ocr.clone().filter(|_| mode.uses_ocr());
        if barcode.is_none() && ocr.is_none() {
            let strategy = if mode == ScanMode::Barcode {
                Strategy::Barcode
            } else {
                Strategy::Ocr
            };
            return Err(self.fail_start(CaptureError::StrategyUnavailable(strategy)));
        }

        let device_id = match device_id {
            Some(id) => id.to_string(),
            None => {
                let devices = match self.device.list_devices().await {
                    Ok(devices) => devices,
                    Err(e) => return Err(self.fail_start(e)),
                };
                match select_default_device(&devices) {
                    Some(device) => device.device_id.clone(),
                    None => return Err(self.fail_start(CaptureError::NoDevices)),
                }
            }
        };

        tracing::info!(device_id = %device_id, %mode, "Starting scan");
        self.state.send_modify(|s| {
            *s = ScanSnapshot {
                state: ScanState::Requesting,
                device_id: Some(device_id.clone()),
                ..ScanSnapshot::idle(mode)
            };
        });

        let (stop_tx, stop_rx) = oneshot::channel();
        let run = ScanRun {
            device: self.device.clone(),
            device_id,
            barcode,
            ocr,
            settings: self.settings.clone(),
            state: self.state.clone(),
        };
        *running = Some(RunningScan {
            stop: stop_tx,
            handle: tokio::spawn(run.run(stop_rx)),
        });
        Ok(())
    }

    /// Cancel the running scan and wait for the device to be released.
    /// Does nothing when no scan is running.
    pub async fn stop(&self) {
        let Some(RunningScan { stop, handle }) = self.running.lock().await.take() else {
            return;
        };
        // Fails only when the scan already finished on its own.
        let _ = stop.send(());
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Scan task did not finish cleanly");
            self.state.send_modify(|s| {
                s.state = ScanState::Error;
                s.error = Some("scan task failed".to_string());
            });
        }
    }

    fn fail_start(&self, error: CaptureError) -> CaptureError {
        tracing::warn!(error = %error, "Scan could not start");
        let mode = self.settings.mode;
        self.state.send_modify(|s| {
            *s = ScanSnapshot {
                state: ScanState::Error,
                error: Some(error.to_string()),
                ..ScanSnapshot::idle(mode)
            };
        });
        error
    }
}

impl Drop for CaptureEngine {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            running.handle.abort();
        }
    }
}

enum Outcome {
    Detected(ValidatedVin, Strategy),
    Stopped(StopReason),
    Failed(String),
}

type OcrPass = (Duration, Result<Option<String>, DetectError>);

/// Everything one scan needs, owned by the scan task.
struct ScanRun {
    device: Arc<dyn CaptureDevice>,
    device_id: String,
    barcode: Option<Arc<dyn Detector>>,
    ocr: Option<Arc<dyn Detector>>,
    settings: ScanSettings,
    state: Arc<watch::Sender<ScanSnapshot>>,
}

impl ScanRun {
    #[tracing::instrument(name = "scan", skip_all, fields(device_id = %self.device_id))]
    async fn run(self, mut stop: oneshot::Receiver<()>) {
        let acquire = timeout(self.settings.acquire_timeout, self.device.open(&self.device_id));
        let opened = tokio::select! {
            _ = &mut stop => return self.settle(Outcome::Stopped(StopReason::Cancelled)),
            opened = acquire => opened,
        };
        let mut stream = match opened {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return self.settle(Outcome::Failed(e.to_string())),
            Err(_) => return self.settle(Outcome::Failed(CaptureError::AcquireTimeout.to_string())),
        };

        self.state.send_modify(|s| s.state = ScanState::Scanning);
        tracing::info!("Device acquired, scanning");

        let deadline = sleep(self.settings.scan_timeout);
        tokio::pin!(deadline);

        let first_ocr = match self.settings.mode {
            ScanMode::Auto => self.settings.ocr_start_delay,
            _ => self.settings.ocr_interval,
        };
        let mut ocr_ticker = interval_at(Instant::now() + first_ocr, self.settings.ocr_interval);
        ocr_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut ocr_passes: JoinSet<OcrPass> = JoinSet::new();
        let mut latest: Option<Arc<Frame>> = None;

        let outcome = loop {
            tokio::select! {
                _ = &mut stop => break Outcome::Stopped(StopReason::Cancelled),
                _ = &mut deadline => break Outcome::Stopped(StopReason::TimedOut),
                next = stream.next_frame() => {
                    let frame = match next {
                        Ok(Some(frame)) => frame,
                        Ok(None) => break Outcome::Failed(CaptureError::StreamEnded.to_string()),
                        Err(e) => break Outcome::Failed(e.to_string()),
                    };
                    self.state.send_modify(|s| s.stats.frames_received += 1);
                    latest = Some(frame.clone());

                    if let Some(barcode) = &self.barcode {
                        match barcode.detect(frame).await {
                            Ok(Some(text)) => match extract_vin(&text) {
                                Some(vin) => break Outcome::Detected(vin, Strategy::Barcode),
                                None => tracing::debug!("Barcode payload holds no valid VIN"),
                            },
                            Ok(None) => {}
                            Err(e) if e.is_fatal() => break Outcome::Failed(e.to_string()),
                            Err(e) => tracing::warn!(error = %e, "Barcode detection failed"),
                        }
                    }
                }
                _ = ocr_ticker.tick(), if self.ocr.is_some() => {
                    if !ocr_passes.is_empty() {
                        tracing::trace!("OCR pass still running, tick skipped");
                        continue;
                    }
                    if let (Some(ocr), Some(frame)) = (&self.ocr, &latest) {
                        let (ocr, frame) = (ocr.clone(), frame.clone());
                        ocr_passes.spawn(async move {
                            let started = Instant::now();
                            let result = ocr.detect(frame).await;
                            (started.elapsed(), result)
                        });
                    }
                }
                Some(joined) = ocr_passes.join_next() => {
                    let (latency, result) = match joined {
                        Ok(pass) => pass,
                        Err(e) => {
                            tracing::error!(error = %e, "OCR pass aborted");
                            continue;
                        }
                    };
                    metrics::histogram!("vin_ocr_pass_seconds").record(latency.as_secs_f64());

                    let vin = match &result {
                        Ok(Some(text)) => extract_vin(text),
                        _ => None,
                    };
                    self.state
                        .send_modify(|s| s.stats.record_ocr_pass(latency, vin.is_some()));

                    match result {
                        Err(e) if e.is_fatal() => break Outcome::Failed(e.to_string()),
                        Err(e) => tracing::warn!(error = %e, "OCR pass failed"),
                        Ok(_) => {}
                    }
                    if let Some(vin) = vin {
                        break Outcome::Detected(vin, Strategy::Ocr);
                    }
                }
            }
        };

        // Aborts an in-flight OCR pass, then releases the device.
        drop(ocr_passes);
        drop(stream);
        self.settle(outcome);
    }

    fn settle(&self, outcome: Outcome) {
        match outcome {
            Outcome::Detected(vin, strategy) => {
                tracing::info!(vin = %vin, %strategy, "VIN detected");
                metrics::counter!("vin_scan_detections_total", "strategy" => strategy.to_string())
                    .increment(1);
                self.state.send_modify(|s| {
                    s.state = ScanState::Detected;
                    s.detected = Some(Detection {
                        vin,
                        strategy,
                        detected_at: Utc::now(),
                    });
                });
            }
            Outcome::Stopped(reason) => {
                tracing::info!(?reason, "Scan stopped");
                self.state.send_modify(|s| {
                    s.state = ScanState::Stopped;
                    s.stop_reason = Some(reason);
                });
            }
            Outcome::Failed(error) => {
                tracing::warn!(error = %error, "Scan failed");
                self.state.send_modify(|s| {
                    s.state = ScanState::Error;
                    s.error = Some(error);
                });
            }
        }
    }
}
