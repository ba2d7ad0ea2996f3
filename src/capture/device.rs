use async_trait::async_trait;
use image::DynamicImage;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use super::CaptureError;
use crate::models::scan::DeviceInfo;

/// Frames buffered between the uploader and the engine; extras are dropped.
const FEED_CAPACITY: usize = 4;

/// One decoded video frame.
#[derive(Debug)]
pub struct Frame {
    pub image: DynamicImage,
}

impl Frame {
    pub fn new(image: DynamicImage) -> Self {
        Self { image }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CaptureError> {
        let image = image::load_from_memory(bytes).map_err(|e| {
            tracing::debug!(error = %e, "Rejected undecodable frame");
            CaptureError::InvalidFrame
        })?;
        Ok(Self::new(image))
    }
}

/// A source of capture devices.
#[async_trait]
pub trait CaptureDevice: Send + Sync {
    async fn list_devices(&self) -> Result<Vec<DeviceInfo>, CaptureError>;

    /// Acquire `device_id` exclusively. Resolves once the first frame is available;
    /// the device is released when the returned stream is dropped.
    async fn open(&self, device_id: &str) -> Result<Box<dyn FrameStream>, CaptureError>;
}

/// Live frames of an acquired device.
#[async_trait]
pub trait FrameStream: Send {
    /// Next frame, `Ok(None)` once the source is gone. Must be cancel-safe.
    async fn next_frame(&mut self) -> Result<Option<Arc<Frame>>, CaptureError>;
}

/// Device failures as reported by the browser's media APIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeviceErrorKind {
    /// `NotAllowedError`
    PermissionDenied,
    /// `NotFoundError`
    NotFound,
    /// `NotReadableError`
    InUse,
    /// `OverconstrainedError`
    Overconstrained,
}

impl From<DeviceErrorKind> for CaptureError {
    fn from(kind: DeviceErrorKind) -> Self {
        match kind {
            DeviceErrorKind::PermissionDenied => CaptureError::PermissionDenied,
            DeviceErrorKind::NotFound => CaptureError::NoDevices,
            DeviceErrorKind::InUse => CaptureError::DeviceInUse,
            DeviceErrorKind::Overconstrained => CaptureError::Overconstrained,
        }
    }
}

enum FeedMessage {
    Frame(Arc<Frame>),
    Failure(CaptureError),
}

struct FeedChannel {
    tx: mpsc::Sender<FeedMessage>,
    /// `None` while a stream holds the device.
    rx: Option<mpsc::Receiver<FeedMessage>>,
}

impl FeedChannel {
    fn fresh() -> Self {
        let (tx, rx) = mpsc::channel(FEED_CAPACITY);
        Self { tx, rx: Some(rx) }
    }
}

struct FeedShared {
    devices: Vec<DeviceInfo>,
    channel: Mutex<FeedChannel>,
    permission_denied: AtomicBool,
}

/// Capture device backed by frames uploaded from a browser.
///
/// Frames and failures pushed while no stream is open are discarded, so a new
/// stream never sees anything from before it was opened.
#[derive(Clone)]
pub struct FrameFeed {
    shared: Arc<FeedShared>,
}

impl FrameFeed {
    pub fn new(devices: Vec<DeviceInfo>) -> Self {
        Self {
            shared: Arc::new(FeedShared {
                devices,
                channel: Mutex::new(FeedChannel::fresh()),
                permission_denied: AtomicBool::new(false),
            }),
        }
    }

    /// True while an engine holds the device.
    pub fn is_open(&self) -> bool {
        self.shared
            .channel
            .lock()
            .map(|channel| channel.rx.is_none())
            .unwrap_or(false)
    }

    /// Offer a frame to the open stream. Returns `false` when it was dropped.
    pub fn push_frame(&self, frame: Frame) -> bool {
        self.deliver(FeedMessage::Frame(Arc::new(frame)))
    }

    /// Forward a browser-side device failure to the open stream.
    ///
    /// A permission denial also makes every later `list_devices`/`open` fail
    /// until [`FrameFeed::clear_permission_denial`].
    pub fn report_failure(&self, error: CaptureError) -> bool {
        if error == CaptureError::PermissionDenied {
            self.shared.permission_denied.store(true, Ordering::SeqCst);
        }
        self.deliver(FeedMessage::Failure(error))
    }

    /// Forget an earlier permission denial, as when the user retries and the
    /// browser prompts again. Returns whether a denial was recorded.
    pub fn clear_permission_denial(&self) -> bool {
        self.shared.permission_denied.swap(false, Ordering::SeqCst)
    }

    fn deliver(&self, message: FeedMessage) -> bool {
        let Ok(channel) = self.shared.channel.lock() else {
            return false;
        };
        if channel.rx.is_some() {
            return false;
        }
        channel.tx.try_send(message).is_ok()
    }
}

#[async_trait]
impl CaptureDevice for FrameFeed {
    async fn list_devices(&self) -> Result<Vec<DeviceInfo>, CaptureError> {
        if self.shared.permission_denied.load(Ordering::SeqCst) {
            return Err(CaptureError::PermissionDenied);
        }
        Ok(self.shared.devices.clone())
    }

    async fn open(&self, device_id: &str) -> Result<Box<dyn FrameStream>, CaptureError> {
        if self.shared.permission_denied.load(Ordering::SeqCst) {
            return Err(CaptureError::PermissionDenied);
        }
        if !self.shared.devices.iter().any(|d| d.device_id == device_id) {
            tracing::warn!(device_id, "Requested capture device is not offered by the client");
            return Err(CaptureError::DeviceNotFound);
        }

        let rx = {
            let mut channel = self
                .shared
                .channel
                .lock()
                .map_err(|_| CaptureError::DeviceInUse)?;
            channel.rx.take().ok_or(CaptureError::DeviceInUse)?
        };

        // Built before the first await so a cancelled open still releases the device.
        let mut stream = FeedStream {
            shared: self.shared.clone(),
            rx,
            pending: None,
        };

        match stream.rx.recv().await {
            Some(FeedMessage::Frame(frame)) => {
                stream.pending = Some(frame);
                Ok(Box::new(stream))
            }
            Some(FeedMessage::Failure(error)) => Err(error),
            None => Err(CaptureError::StreamEnded),
        }
    }
}

struct FeedStream {
    shared: Arc<FeedShared>,
    rx: mpsc::Receiver<FeedMessage>,
    pending: Option<Arc<Frame>>,
}

#[async_trait]
impl FrameStream for FeedStream {
    async fn next_frame(&mut self) -> Result<Option<Arc<Frame>>, CaptureError> {
        if let Some(frame) = self.pending.take() {
            return Ok(Some(frame));
        }
        match self.rx.recv().await {
            Some(FeedMessage::Frame(frame)) => Ok(Some(frame)),
            Some(FeedMessage::Failure(error)) => Err(error),
            None => Ok(None),
        }
    }
}

impl Drop for FeedStream {
    fn drop(&mut self) {
        if let Ok(mut channel) = self.shared.channel.lock() {
            *channel = FeedChannel::fresh();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn feed() -> FrameFeed {
        FrameFeed::new(vec![DeviceInfo {
            device_id: "cam-1".to_string(),
            label: "Back Camera".to_string(),
        }])
    }

    fn frame() -> Frame {
        Frame::new(DynamicImage::new_luma8(4, 4))
    }

    /// Open `cam-1` while pushing frames until the open resolves.
    async fn open(feed: &FrameFeed) -> Result<Box<dyn FrameStream>, CaptureError> {
        let pusher = {
            let feed = feed.clone();
            tokio::spawn(async move {
                loop {
                    feed.push_frame(frame());
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            })
        };
        let result = feed.open("cam-1").await;
        pusher.abort();
        result
    }

    #[tokio::test]
    async fn test_open_is_exclusive_and_released_on_drop() {
        let feed = feed();
        let mut stream = open(&feed).await.unwrap();
        assert!(feed.is_open());
        assert!(stream.next_frame().await.unwrap().is_some());

        let second = feed.open("cam-1").await;
        assert!(matches!(second, Err(CaptureError::DeviceInUse)));

        drop(stream);
        assert!(!feed.is_open());
        assert!(open(&feed).await.is_ok());
    }

    #[tokio::test]
    async fn test_cancelled_open_releases_device() {
        let feed = feed();
        let attempt = tokio::time::timeout(Duration::from_millis(20), feed.open("cam-1")).await;
        assert!(attempt.is_err());
        assert!(!feed.is_open());
    }

    #[tokio::test]
    async fn test_unknown_device() {
        let result = feed().open("front").await;
        assert!(matches!(result, Err(CaptureError::DeviceNotFound)));
    }

    #[tokio::test]
    async fn test_frames_without_stream_are_dropped() {
        let feed = feed();
        assert!(!feed.push_frame(frame()));
        assert!(!feed.report_failure(CaptureError::DeviceInUse));
    }

    #[tokio::test]
    async fn test_reported_failure_ends_stream() {
        let feed = feed();
        let mut stream = open(&feed).await.unwrap();
        // drain whatever the pusher left behind
        while let Ok(Some(_)) =
            tokio::time::timeout(Duration::from_millis(10), stream.next_frame())
                .await
                .unwrap_or(Ok(None))
        {}

        assert!(feed.report_failure(CaptureError::Overconstrained));
        let err = stream.next_frame().await.unwrap_err();
        assert_eq!(err, CaptureError::Overconstrained);
    }

    #[tokio::test]
    async fn test_permission_denial_holds_until_cleared() {
        let feed = feed();
        feed.report_failure(DeviceErrorKind::PermissionDenied.into());
        assert_eq!(
            feed.list_devices().await.unwrap_err(),
            CaptureError::PermissionDenied
        );
        assert!(matches!(
            feed.open("cam-1").await,
            Err(CaptureError::PermissionDenied)
        ));

        assert!(feed.clear_permission_denial());
        assert!(!feed.clear_permission_denial());
        assert_eq!(feed.list_devices().await.unwrap().len(), 1);
        assert!(open(&feed).await.is_ok());
    }

    #[test]
    fn test_from_bytes_rejects_non_images() {
        assert_eq!(
            Frame::from_bytes(b"not an image").unwrap_err(),
            CaptureError::InvalidFrame
        );
    }
}
