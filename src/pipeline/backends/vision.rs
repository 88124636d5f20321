//! Vision/layout backend adapter: wraps the general-purpose layout
//! recognition service.
//!
//! Exposes the robust multi-pass layout call (the service itself merges
//! three recognition passes and clusters nearby fragments — opaque to
//! us), the independent handwriting-region detector, and image metadata.
//! Dimensions are read locally from the image header; no network call.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::super::types::{
    ImageDimensions, LayoutFragment, LayoutRecognizer, Rect,
};
use super::super::RecognitionError;

/// HTTP client for the layout recognition service.
pub struct VisionLayoutClient {
    base_url: String,
    api_key: String,
    client: reqwest::blocking::Client,
}

#[derive(Serialize)]
struct RobustRecognizeRequest {
    image: String,
    cluster_eps: f64,
    cluster_min_pts: u32,
}

#[derive(Deserialize)]
struct RobustRecognizeResponse {
    #[serde(default)]
    fragments: Vec<LayoutFragment>,
}

#[derive(Serialize)]
struct DetectHandwritingRequest {
    image: String,
}

impl VisionLayoutClient {
    pub fn new(
        base_url: &str,
        api_key: &str,
        timeout: Duration,
    ) -> Result<Self, RecognitionError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RecognitionError::BackendUnavailable(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            client,
        })
    }

    fn post_json<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, RecognitionError> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .map_err(|e| RecognitionError::BackendUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!(%status, path, "layout backend returned error status");
            return Err(RecognitionError::BackendUnavailable(format!(
                "layout backend status {status}"
            )));
        }

        response
            .json()
            .map_err(|e| RecognitionError::BackendUnavailable(format!("malformed envelope: {e}")))
    }
}

impl LayoutRecognizer for VisionLayoutClient {
    fn robust_recognize(
        &self,
        image: &[u8],
        cluster_eps: f64,
        cluster_min_pts: u32,
    ) -> Result<Vec<LayoutFragment>, RecognitionError> {
        let body = RobustRecognizeRequest {
            image: base64::engine::general_purpose::STANDARD.encode(image),
            cluster_eps,
            cluster_min_pts,
        };
        let response: RobustRecognizeResponse = self.post_json("/layout/robust", &body)?;
        debug!(fragments = response.fragments.len(), "robust layout response");
        Ok(response.fragments)
    }

    fn detect_handwriting(&self, image: &[u8]) -> Result<Vec<Rect>, RecognitionError> {
        let body = DetectHandwritingRequest {
            image: base64::engine::general_purpose::STANDARD.encode(image),
        };
        let regions: Vec<Rect> = self.post_json("/layout/handwriting", &body)?;
        // Drop malformed regions here rather than letting them reach the
        // correlator.
        Ok(regions.into_iter().filter(Rect::is_valid).collect())
    }

    fn image_dimensions(&self, image: &[u8]) -> Result<ImageDimensions, RecognitionError> {
        let (width, height) = image::ImageReader::new(std::io::Cursor::new(image))
            .with_guessed_format()
            .map_err(|e| RecognitionError::ImageProcessing(e.to_string()))?
            .into_dimensions()
            .map_err(|e| RecognitionError::ImageProcessing(e.to_string()))?;
        Ok(ImageDimensions {
            width: width as f64,
            height: height as f64,
        })
    }
}

// ──────────────────────────────────────────────
// MockLayoutRecognizer (testing)
// ──────────────────────────────────────────────

/// Configurable layout recognizer for tests.
pub struct MockLayoutRecognizer {
    fragments: Result<Vec<LayoutFragment>, String>,
    handwriting: Result<Vec<Rect>, String>,
    dimensions: ImageDimensions,
    robust_calls: Arc<AtomicUsize>,
}

impl MockLayoutRecognizer {
    pub fn new(fragments: Vec<LayoutFragment>, dimensions: ImageDimensions) -> Self {
        Self {
            fragments: Ok(fragments),
            handwriting: Ok(Vec::new()),
            dimensions,
            robust_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A layout recognizer whose robust call always fails.
    pub fn failing(dimensions: ImageDimensions) -> Self {
        Self {
            fragments: Err("layout service unreachable".to_string()),
            handwriting: Err("layout service unreachable".to_string()),
            dimensions,
            robust_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_handwriting(mut self, regions: Vec<Rect>) -> Self {
        self.handwriting = Ok(regions);
        self
    }

    pub fn with_handwriting_failure(mut self) -> Self {
        self.handwriting = Err("handwriting detector down".to_string());
        self
    }

    pub fn robust_call_count(&self) -> usize {
        self.robust_calls.load(Ordering::SeqCst)
    }

    /// Shared handle to the robust-call counter, so a test can keep
    /// observing after the mock is boxed into a pipeline.
    pub fn robust_call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.robust_calls)
    }
}

impl LayoutRecognizer for MockLayoutRecognizer {
    fn robust_recognize(
        &self,
        _image: &[u8],
        _cluster_eps: f64,
        _cluster_min_pts: u32,
    ) -> Result<Vec<LayoutFragment>, RecognitionError> {
        self.robust_calls.fetch_add(1, Ordering::SeqCst);
        self.fragments
            .clone()
            .map_err(RecognitionError::BackendUnavailable)
    }

    fn detect_handwriting(&self, _image: &[u8]) -> Result<Vec<Rect>, RecognitionError> {
        self.handwriting
            .clone()
            .map_err(RecognitionError::BackendUnavailable)
    }

    fn image_dimensions(&self, _image: &[u8]) -> Result<ImageDimensions, RecognitionError> {
        Ok(self.dimensions)
    }
}

/// Fragment constructor for tests across the crate.
pub fn fragment(text: &str, x: f64, y: f64, w: f64, h: f64, confidence: f64) -> LayoutFragment {
    LayoutFragment {
        text: text.to_string(),
        geometry: super::super::types::FragmentGeometry {
            min_x: x,
            min_y: y,
            width: w,
            height: h,
        },
        confidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimensions_read_from_image_header() {
        let img = image::GrayImage::from_pixel(320, 240, image::Luma([255u8]));
        let dynamic = image::DynamicImage::ImageLuma8(img);
        let mut buf = Vec::new();
        dynamic
            .write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();

        let client =
            VisionLayoutClient::new("http://localhost:9999", "key", Duration::from_secs(1))
                .unwrap();
        let dims = client.image_dimensions(&buf).unwrap();
        assert_eq!(dims.width, 320.0);
        assert_eq!(dims.height, 240.0);
    }

    #[test]
    fn dimensions_of_garbage_bytes_fail() {
        let client =
            VisionLayoutClient::new("http://localhost:9999", "key", Duration::from_secs(1))
                .unwrap();
        let result = client.image_dimensions(&[0u8; 64]);
        assert!(matches!(result, Err(RecognitionError::ImageProcessing(_))));
    }

    #[test]
    fn unreachable_backend_is_backend_unavailable() {
        let client =
            VisionLayoutClient::new("http://127.0.0.1:1", "key", Duration::from_millis(200))
                .unwrap();
        let result = client.robust_recognize(b"png", 40.0, 1);
        assert!(matches!(result, Err(RecognitionError::BackendUnavailable(_))));
    }

    #[test]
    fn mock_counts_robust_calls() {
        let mock = MockLayoutRecognizer::new(
            vec![fragment("2 + 2 = 4", 10.0, 10.0, 100.0, 20.0, 0.95)],
            ImageDimensions {
                width: 1000.0,
                height: 1400.0,
            },
        );
        mock.robust_recognize(b"img", 40.0, 1).unwrap();
        mock.robust_recognize(b"img", 40.0, 1).unwrap();
        assert_eq!(mock.robust_call_count(), 2);
    }
}
