//! Math backend adapter: wraps the math-aware recognition service.
//!
//! One endpoint serves both call shapes: the whole-page call (per-line
//! region data) and the cropped-region call (single result, no line
//! data). The response envelope is parsed leniently — line geometry is
//! kept as raw JSON so the bbox normalizer owns shape handling across
//! API versions.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use base64::Engine as _;
use serde::Serialize;
use tracing::{debug, warn};

use super::super::types::{MathRecognition, MathRecognizer, RecognizeOptions};
use super::super::RecognitionError;

/// HTTP client for the math recognition service.
pub struct MathOcrClient {
    base_url: String,
    app_id: String,
    app_key: String,
    client: reqwest::blocking::Client,
}

#[derive(Serialize)]
struct RecognizeRequest<'a> {
    /// Image as a data URI; the service accepts PNG and JPEG.
    src: String,
    include_line_data: bool,
    formats: &'a [String],
    disable_array_detection: bool,
}

impl MathOcrClient {
    /// Create a client with a bounded per-request timeout. A timed-out
    /// call surfaces as `BackendUnavailable`, the same as any other
    /// transport failure.
    pub fn new(
        base_url: &str,
        app_id: &str,
        app_key: &str,
        timeout: Duration,
    ) -> Result<Self, RecognitionError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RecognitionError::BackendUnavailable(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            app_id: app_id.to_string(),
            app_key: app_key.to_string(),
            client,
        })
    }
}

impl MathRecognizer for MathOcrClient {
    fn recognize(
        &self,
        image: &[u8],
        options: &RecognizeOptions,
    ) -> Result<MathRecognition, RecognitionError> {
        let src = format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(image)
        );
        let body = RecognizeRequest {
            src,
            include_line_data: options.include_line_data,
            formats: &options.formats,
            disable_array_detection: options.disable_array_detection,
        };

        let url = format!("{}/v3/text", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("app_id", &self.app_id)
            .header("app_key", &self.app_key)
            .json(&body)
            .send()
            .map_err(|e| RecognitionError::BackendUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!(%status, "math backend returned error status");
            return Err(RecognitionError::BackendUnavailable(format!(
                "math backend status {status}"
            )));
        }

        let recognition: MathRecognition = response
            .json()
            .map_err(|e| RecognitionError::BackendUnavailable(format!("malformed envelope: {e}")))?;

        // The service reports soft failures inside a 200 envelope.
        if let Some(error) = &recognition.error {
            warn!(error, "math backend reported in-envelope error");
            return Err(RecognitionError::BackendUnavailable(error.clone()));
        }

        debug!(lines = recognition.lines.len(), "math recognition response");
        Ok(recognition)
    }
}

// ──────────────────────────────────────────────
// MockMathRecognizer (testing)
// ──────────────────────────────────────────────

/// Scriptable math recognizer for tests.
///
/// Returns the configured responses in order, then repeats the last one.
/// Records how many times it was called.
pub struct MockMathRecognizer {
    responses: Vec<Result<MathRecognition, String>>,
    calls: AtomicUsize,
}

impl MockMathRecognizer {
    pub fn new(responses: Vec<Result<MathRecognition, String>>) -> Self {
        Self {
            responses,
            calls: AtomicUsize::new(0),
        }
    }

    /// A recognizer that always fails, for exercising the fallback path.
    pub fn failing() -> Self {
        Self::new(vec![Err("connection refused".to_string())])
    }

    /// A recognizer that always returns the same envelope, parsed from
    /// raw JSON so tests can exercise real wire shapes.
    pub fn from_json(raw: &str) -> Self {
        let recognition: MathRecognition =
            serde_json::from_str(raw).expect("mock envelope must parse");
        Self::new(vec![Ok(recognition)])
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl MathRecognizer for MockMathRecognizer {
    fn recognize(
        &self,
        _image: &[u8],
        _options: &RecognizeOptions,
    ) -> Result<MathRecognition, RecognitionError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let index = call.min(self.responses.len().saturating_sub(1));

        match &self.responses[index] {
            Ok(recognition) => Ok(recognition.clone()),
            Err(message) => Err(RecognitionError::BackendUnavailable(message.clone())),
        }
    }
}
