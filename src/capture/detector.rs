use async_trait::async_trait;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use std::sync::Arc;

use super::device::Frame;
use crate::models::scan::Strategy;
use crate::services::ocr::{OcrError, TextRecognizer};

#[derive(Debug, thiserror::Error)]
pub enum DetectError {
    /// The decode engine itself is broken; scanning cannot continue.
    #[error("decode engine failure: {0}")]
    Engine(String),

    #[error("text recognition failed: {0}")]
    Recognition(#[from] OcrError),

    #[error("failed to encode region of interest: {0}")]
    Encode(#[from] image::ImageError),
}

impl DetectError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, DetectError::Engine(_))
    }
}

/// One detection strategy over captured frames.
///
/// Returns raw candidate text; the engine runs it through VIN extraction.
#[async_trait]
pub trait Detector: Send + Sync {
    fn strategy(&self) -> Strategy;

    async fn detect(&self, frame: Arc<Frame>) -> Result<Option<String>, DetectError>;
}

/// Multi-format barcode decoding with `rxing` on the frame's luma plane.
///
/// Covers the 1D symbologies VIN labels carry (Code 39, Code 128) as well as
/// QR and Data Matrix.
#[derive(Debug, Default, Clone, Copy)]
pub struct BarcodeDetector;

#[async_trait]
impl Detector for BarcodeDetector {
    fn strategy(&self) -> Strategy {
        Strategy::Barcode
    }

    async fn detect(&self, frame: Arc<Frame>) -> Result<Option<String>, DetectError> {
        tokio::task::spawn_blocking(move || decode_barcode(&frame.image))
            .await
            .map_err(|e| DetectError::Engine(e.to_string()))
    }
}

fn decode_barcode(image: &DynamicImage) -> Option<String> {
    let luma = image.to_luma8();
    let (width, height) = luma.dimensions();

    match rxing::helpers::detect_in_luma(luma.into_raw(), width, height, None) {
        Ok(result) => {
            tracing::trace!(format = %result.getBarcodeFormat(), "Barcode decoded");
            Some(result.getText().to_string())
        }
        Err(rxing::Exceptions::NotFoundException(_)) => None,
        Err(e) => {
            tracing::trace!(error = %e, "Barcode found but not decodable");
            None
        }
    }
}

/// Horizontal band of the frame expected to hold the printed VIN, as fractions
/// of the frame size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionOfInterest {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Default for RegionOfInterest {
    fn default() -> Self {
        Self {
            x: 0.1,
            y: 0.4,
            width: 0.8,
            height: 0.2,
        }
    }
}

impl RegionOfInterest {
    pub fn crop(&self, image: &DynamicImage) -> DynamicImage {
        let (w, h) = (image.width() as f32, image.height() as f32);
        let x = (w * self.x) as u32;
        let y = (h * self.y) as u32;
        let width = ((w * self.width) as u32).max(1);
        let height = ((h * self.height) as u32).max(1);
        image.crop_imm(x, y, width, height)
    }
}

/// Text recognition on the region of interest.
pub struct OcrDetector {
    recognizer: Arc<dyn TextRecognizer>,
    roi: RegionOfInterest,
}

impl OcrDetector {
    pub fn new(recognizer: Arc<dyn TextRecognizer>) -> Self {
        Self {
            recognizer,
            roi: RegionOfInterest::default(),
        }
    }
}

#[async_trait]
impl Detector for OcrDetector {
    fn strategy(&self) -> Strategy {
        Strategy::Ocr
    }

    async fn detect(&self, frame: Arc<Frame>) -> Result<Option<String>, DetectError> {
        let roi = self.roi;
        let png = tokio::task::spawn_blocking(move || encode_png(&roi.crop(&frame.image)))
            .await
            .map_err(|e| DetectError::Engine(e.to_string()))??;

        let text = self.recognizer.recognize(png).await?;
        let text = text.trim();
        Ok((!text.is_empty()).then(|| text.to_string()))
    }
}

fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Png)?;
    Ok(buffer.into_inner())
}
