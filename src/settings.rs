//! Settings for the calibration tool.
//! Persisted in the platform-specific config directory via `directories::ProjectDirs`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::backend::{
    BackendConfig, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY_SECS, DEFAULT_TIMEOUT_SECS,
};
use crate::calibration::{CameraUrls, SessionConfig, DEFAULT_WORKFLOW_PAGES};
use crate::workspace::zoom_out_factor;

/// Settings that can be saved and loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationSettings {
    /// Machine base URL
    pub base_url: String,
    /// API key for authenticated plugin commands
    pub api_key: String,
    /// Running inside the first-run setup
    pub initial_calibration: bool,
    /// Refuse to start calibration unless the lid is fully open
    pub require_lid_open: bool,
    /// Maximum retries for requests
    pub max_retries: u32,
    /// Retry delay in seconds
    pub retry_delay: u64,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Pages of the surrounding setup workflow
    pub workflow_pages: usize,
    /// Margin ratio of the cropped picture
    pub crop_ratio: f64,
    pub camera_urls: CameraUrls,
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            api_key: String::new(),
            initial_calibration: false,
            require_lid_open: true,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY_SECS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            workflow_pages: DEFAULT_WORKFLOW_PAGES,
            crop_ratio: zoom_out_factor(),
            camera_urls: CameraUrls::default(),
        }
    }
}

/// Parse a boolean flag the way environment variables are usually written.
fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl CalibrationSettings {
    /// Get the config directory path.
    pub fn config_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "mrbeam", "beamcam-calibration")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the settings file path.
    pub fn settings_path() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join("settings.json"))
    }

    /// Load settings from the config file, falling back to defaults.
    pub fn load() -> Self {
        let defaults = Self::default();

        let mut loaded: Self = Self::settings_path()
            .and_then(|path| fs::read_to_string(&path).ok())
            .and_then(|content| serde_json::from_str(&content).ok())
            .unwrap_or_default();

        // Backfill values an older or hand-edited file left empty
        if loaded.base_url.is_empty() {
            loaded.base_url = defaults.base_url;
        }
        if loaded.workflow_pages == 0 {
            loaded.workflow_pages = defaults.workflow_pages;
        }
        if loaded.crop_ratio.is_nan() || loaded.crop_ratio <= 0.0 {
            loaded.crop_ratio = defaults.crop_ratio;
        }

        loaded
    }

    /// Save settings to the config file.
    pub fn save(&self) -> Result<(), String> {
        let dir = Self::config_dir().ok_or("Cannot determine config directory")?;

        fs::create_dir_all(&dir)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;

        let path = dir.join("settings.json");
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize settings: {}", e))?;

        fs::write(&path, content).map_err(|e| format!("Failed to write settings file: {}", e))?;

        Ok(())
    }

    /// Apply `BEAMCAM_*` overrides. Unparseable values are ignored.
    pub fn apply_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("BEAMCAM_BASE_URL").filter(|s| !s.is_empty()) {
            self.base_url = url;
        }
        if let Some(key) = lookup("BEAMCAM_API_KEY") {
            self.api_key = key;
        }
        if let Some(flag) = lookup("BEAMCAM_INITIAL_CALIBRATION").and_then(|s| parse_flag(&s)) {
            self.initial_calibration = flag;
        }
        if let Some(n) = lookup("BEAMCAM_MAX_RETRIES").and_then(|s| s.parse().ok()) {
            self.max_retries = n;
        }
        if let Some(n) = lookup("BEAMCAM_RETRY_DELAY").and_then(|s| s.parse().ok()) {
            self.retry_delay = n;
        }
        self
    }

    pub fn to_session_config(&self) -> SessionConfig {
        SessionConfig::default()
            .with_initial_calibration(self.initial_calibration)
            .with_lid_gating(self.require_lid_open)
            .with_camera_urls(self.camera_urls.clone())
            .with_crop_ratio(self.crop_ratio)
            .with_workflow_pages(self.workflow_pages)
    }

    pub fn to_backend_config(&self) -> BackendConfig {
        let mut config = BackendConfig::default()
            .with_base_url(&self.base_url)
            .with_api_key(&self.api_key)
            .with_max_retries(self.max_retries)
            .with_retry_delay(self.retry_delay);
        config.timeout_secs = self.timeout_secs;
        config
    }
}
