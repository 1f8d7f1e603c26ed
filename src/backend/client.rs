//! Requests to the machine's calibration endpoints.

use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::time::sleep;

use super::types::{CalibrationPayload, CaptureAck, GeneratedFile, RequestRoute};

/// Default number of retry attempts for failed requests.
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Default delay between retry attempts in seconds.
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 1;

/// Default per-request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Backend errors.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    #[error("Server rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("Failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("Max retries exceeded after {0} attempts: {1}")]
    MaxRetriesExceeded(u32, String),
}

impl BackendError {
    /// Text to show the operator: the server's own error body when there is
    /// one, the error description otherwise.
    pub fn server_text(&self) -> String {
        match self {
            BackendError::Rejected { body, .. } if !body.trim().is_empty() => body.trim().to_string(),
            other => other.to_string(),
        }
    }

    fn is_retryable(&self) -> bool {
        match self {
            BackendError::RequestFailed(_) => true,
            BackendError::Rejected { status, .. } => matches!(status, 502..=504),
            BackendError::Encode(_) => false,
            BackendError::MaxRetriesExceeded(_, _) => false,
        }
    }

    /// The request never reached the server, so sending it again cannot
    /// store anything twice.
    fn never_delivered(&self) -> bool {
        matches!(self, BackendError::RequestFailed(e) if e.is_connect())
    }
}

/// Operations the calibration workflow needs from the machine.
pub trait CalibrationBackend: Send + Sync + 'static {
    /// Ask the camera for a new lens-corrected picture.
    fn take_undistorted_picture(
        &self,
        route: RequestRoute,
    ) -> impl Future<Output = Result<CaptureAck, BackendError>> + Send;

    /// Store the detected markers and confirmed corners.
    fn send_calibration_markers(
        &self,
        route: RequestRoute,
        payload: &CalibrationPayload,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// Generate the marker design to engrave.
    fn generate_markers_svg(&self) -> impl Future<Output = Result<GeneratedFile, BackendError>> + Send;

    /// Engrave the markers directly with the given laser settings.
    fn engrave_markers(
        &self,
        intensity: u32,
        feedrate: u32,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;
}

/// Connection settings for [`HttpBackend`].
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub base_url: String,
    pub api_key: String,
    /// Maximum number of retry attempts for failed requests.
    pub max_retries: u32,
    /// Delay between retry attempts in seconds.
    pub retry_delay_secs: u64,
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            api_key: String::new(),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_secs: DEFAULT_RETRY_DELAY_SECS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl BackendConfig {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay(mut self, delay_secs: u64) -> Self {
        self.retry_delay_secs = delay_secs;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

/// HTTP implementation of [`CalibrationBackend`].
pub struct HttpBackend {
    config: BackendConfig,
    client: Client,
}

impl HttpBackend {
    pub fn new(config: BackendConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// Authenticated plugin command endpoint.
    fn command_url(&self) -> String {
        self.config.url("/api/plugin/mrbeam")
    }

    fn plugin_url(&self, endpoint: &str) -> String {
        self.config.url(&format!("/plugin/mrbeam/{}", endpoint))
    }

    fn authenticated(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.header("X-Api-Key", &self.config.api_key)
    }

    /// Body of an authenticated plugin command: `{"command": ..., ...data}`.
    fn command_body(command: &str, data: Value) -> Value {
        let mut body = json!({ "command": command });
        if let (Value::Object(map), Value::Object(extra)) = (&mut body, data) {
            map.extend(extra);
        }
        body
    }

    /// Send a request and return the body of a successful response.
    async fn send(&self, builder: RequestBuilder) -> Result<String, BackendError> {
        let response = builder
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(BackendError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }

    /// Run `op` until it succeeds, fails permanently, or retries run out.
    async fn with_retries<T, F, Fut>(
        &self,
        what: &str,
        retryable: fn(&BackendError) -> bool,
        op: F,
    ) -> Result<T, BackendError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
    {
        let max_attempts = self.config.max_retries + 1;
        let mut last_error: Option<BackendError> = None;

        for attempt in 1..=max_attempts {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if !retryable(&e) => return Err(e),
                Err(e) => {
                    if attempt < max_attempts {
                        tracing::warn!(
                            "{} failed (attempt {}/{}): {}; retrying in {}s",
                            what,
                            attempt,
                            max_attempts,
                            e,
                            self.config.retry_delay_secs
                        );
                        sleep(Duration::from_secs(self.config.retry_delay_secs)).await;
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(BackendError::MaxRetriesExceeded(
            max_attempts,
            last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string()),
        ))
    }
}

impl CalibrationBackend for HttpBackend {
    async fn take_undistorted_picture(&self, route: RequestRoute) -> Result<CaptureAck, BackendError> {
        let body = self
            .with_retries("Capture request", BackendError::is_retryable, || async {
                let builder = match route {
                    RequestRoute::FirstRun => {
                        self.client.get(self.plugin_url("take_undistorted_picture"))
                    }
                    RequestRoute::Authenticated => self.authenticated(
                        self.client
                            .post(self.command_url())
                            .json(&Self::command_body("take_undistorted_picture", json!({}))),
                    ),
                };
                self.send(builder).await
            })
            .await?;
        Ok(CaptureAck::from_body(&body))
    }

    async fn send_calibration_markers(
        &self,
        route: RequestRoute,
        payload: &CalibrationPayload,
    ) -> Result<(), BackendError> {
        let data = serde_json::to_value(payload)?;
        // Only resend uploads that never left; a lost response may hide a stored one.
        self.with_retries("Calibration upload", BackendError::never_delivered, || async {
            let builder = match route {
                RequestRoute::FirstRun => self
                    .client
                    .post(self.plugin_url("send_calibration_markers"))
                    .header("Accept", "application/json; charset=utf-8")
                    .json(&data),
                RequestRoute::Authenticated => self.authenticated(
                    self.client
                        .post(self.command_url())
                        .json(&Self::command_body("camera_calibration_markers", data.clone())),
                ),
            };
            self.send(builder).await
        })
        .await?;
        Ok(())
    }

    async fn generate_markers_svg(&self) -> Result<GeneratedFile, BackendError> {
        let body = self
            .with_retries("Marker generation", BackendError::is_retryable, || async {
                self.send(self.client.get(self.plugin_url("generate_calibration_markers_svg")))
                    .await
            })
            .await?;
        Ok(GeneratedFile::calibration_markers(
            Utc::now().timestamp(),
            body.len() as u64,
        ))
    }

    async fn engrave_markers(&self, intensity: u32, feedrate: u32) -> Result<(), BackendError> {
        // Engraving starts the laser; never repeat it automatically.
        let url = self.plugin_url(&format!(
            "engrave_calibration_markers/{}/{}",
            intensity, feedrate
        ));
        self.send(self.client.get(url)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::{CalibrationResultSet, DetectedMarkerSet};

    #[test]
    fn test_backend_config_default() {
        let config = BackendConfig::default();
        assert_eq!(config.base_url, "http://localhost:5000");
        assert_eq!(config.max_retries, DEFAULT_MAX_RETRIES);
    }

    #[test]
    fn test_urls() {
        let backend = HttpBackend::new(BackendConfig::default().with_base_url("http://beam.local/"));
        assert_eq!(backend.command_url(), "http://beam.local/api/plugin/mrbeam");
        assert_eq!(
            backend.plugin_url("take_undistorted_picture"),
            "http://beam.local/plugin/mrbeam/take_undistorted_picture"
        );
    }

    #[test]
    fn test_command_body_merges_data() {
        let body = HttpBackend::command_body(
            "camera_calibration_markers",
            json!({"result": {"newMarkers": {}}}),
        );
        assert_eq!(body["command"], "camera_calibration_markers");
        assert_eq!(body["result"]["newMarkers"], json!({}));
    }

    #[test]
    fn test_server_text_prefers_body() {
        let rejected = BackendError::Rejected {
            status: 403,
            body: "Not allowed outside initial calibration\n".to_string(),
        };
        assert_eq!(rejected.server_text(), "Not allowed outside initial calibration");

        let empty = BackendError::Rejected {
            status: 500,
            body: String::new(),
        };
        assert!(empty.server_text().contains("500"));
    }

    #[test]
    fn test_retryable_errors() {
        let gateway = BackendError::Rejected {
            status: 503,
            body: String::new(),
        };
        let forbidden = BackendError::Rejected {
            status: 403,
            body: String::new(),
        };
        assert!(gateway.is_retryable());
        assert!(!forbidden.is_retryable());
        assert!(!BackendError::MaxRetriesExceeded(3, "x".to_string()).is_retryable());
        assert!(!gateway.never_delivered());
    }

    #[tokio::test]
    async fn test_upload_resent_only_when_never_delivered() {
        // Nothing listens on port 1, so the connection is refused.
        let err = reqwest::Client::new()
            .post("http://127.0.0.1:1/plugin/mrbeam/send_calibration_markers")
            .send()
            .await
            .unwrap_err();
        let refused = BackendError::from(err);
        assert!(refused.never_delivered());
        assert!(refused.is_retryable());
    }

    #[tokio::test]
    async fn test_refused_upload_exhausts_retries() {
        let backend = HttpBackend::new(
            BackendConfig::default()
                .with_base_url("http://127.0.0.1:1")
                .with_max_retries(1)
                .with_retry_delay(0),
        );
        let payload = CalibrationPayload::new(DetectedMarkerSet::new(), CalibrationResultSet::new());
        let err = backend
            .send_calibration_markers(RequestRoute::FirstRun, &payload)
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::MaxRetriesExceeded(2, _)));
    }
}
