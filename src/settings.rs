use anyhow::Context;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::annotations::HighlightMatching;
use crate::session::{DEFAULT_MAX_UPLOAD_BYTES, SessionConfig};
use crate::viewer::ZoomPolicy;

pub const CURRENT_VERSION: u32 = 1;
pub const CONFIG_ENV_VAR: &str = "MARGINALIA_CONFIG";
const SETTINGS_FILENAME: &str = "config.yaml";
const APP_NAME: &str = "marginalia";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default = "default_backend_url")]
    pub backend_url: String,

    #[serde(default = "default_initial_scale")]
    pub initial_scale: f32,

    #[serde(default = "default_zoom_step")]
    pub zoom_step: f32,

    #[serde(default = "default_min_scale")]
    pub min_scale: f32,

    #[serde(default = "default_max_scale")]
    pub max_scale: f32,

    #[serde(default)]
    pub highlight_matching: HighlightMatching,

    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_version() -> u32 {
    CURRENT_VERSION
}

fn default_backend_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_initial_scale() -> f32 {
    1.5
}

fn default_zoom_step() -> f32 {
    ZoomPolicy::DEFAULT_STEP
}

fn default_min_scale() -> f32 {
    ZoomPolicy::DEFAULT_MIN_SCALE
}

fn default_max_scale() -> f32 {
    ZoomPolicy::DEFAULT_MAX_SCALE
}

fn default_max_upload_bytes() -> u64 {
    DEFAULT_MAX_UPLOAD_BYTES
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            backend_url: default_backend_url(),
            initial_scale: default_initial_scale(),
            zoom_step: default_zoom_step(),
            min_scale: default_min_scale(),
            max_scale: default_max_scale(),
            highlight_matching: HighlightMatching::default(),
            max_upload_bytes: default_max_upload_bytes(),
            request_timeout_secs: default_request_timeout_secs(),
            log_level: default_log_level(),
        }
    }
}

fn preferred_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|config| config.join(APP_NAME).join(SETTINGS_FILENAME))
}

/// Resolve the settings file: explicit path, then `MARGINALIA_CONFIG`, then the
/// platform config directory
pub fn config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Some(path) = std::env::var_os(CONFIG_ENV_VAR).filter(|p| !p.is_empty()) {
        return Some(PathBuf::from(path));
    }
    preferred_config_path()
}

impl Settings {
    /// Load settings from `path`, creating the file with defaults if missing.
    ///
    /// Older files are migrated and written back.
    pub fn load_or_create(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            info!("Settings file not found, creating with defaults at {path:?}");
            let settings = Self::default();
            settings.save_to(path)?;
            return Ok(settings);
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        let mut settings: Settings = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse settings file {}", path.display()))?;
        debug!("Loaded settings from {path:?}");

        if settings.version < CURRENT_VERSION {
            migrate_settings(&mut settings);
            settings.save_to(path)?;
        }

        settings.sanitize();
        Ok(settings)
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create config directory {}", parent.display())
                })?;
            }
        }

        fs::write(path, generate_settings_yaml(self))
            .with_context(|| format!("Failed to save settings to {}", path.display()))?;
        debug!("Saved settings to {path:?}");
        Ok(())
    }

    /// Replace values the viewer cannot work with by their defaults
    fn sanitize(&mut self) {
        if !(self.min_scale.is_finite() && self.min_scale > 0.0) {
            warn!("min_scale {} is invalid, using default", self.min_scale);
            self.min_scale = default_min_scale();
        }
        if !(self.max_scale.is_finite() && self.max_scale >= self.min_scale) {
            warn!("max_scale {} is invalid, using default", self.max_scale);
            self.max_scale = default_max_scale().max(self.min_scale);
        }
        if !(self.zoom_step.is_finite() && self.zoom_step > 1.0) {
            warn!("zoom_step {} must be greater than 1, using default", self.zoom_step);
            self.zoom_step = default_zoom_step();
        }
        if !self.initial_scale.is_finite() {
            self.initial_scale = default_initial_scale();
        }
        self.initial_scale = self.initial_scale.clamp(self.min_scale, self.max_scale);
    }

    #[must_use]
    pub fn zoom_policy(&self) -> ZoomPolicy {
        ZoomPolicy {
            step: self.zoom_step,
            min_scale: self.min_scale,
            max_scale: self.max_scale,
        }
    }

    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            initial_scale: self.initial_scale,
            zoom: self.zoom_policy(),
            highlight_matching: self.highlight_matching,
            max_upload_bytes: self.max_upload_bytes,
        }
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Unknown level names fall back to `info`
    #[must_use]
    pub fn log_level_filter(&self) -> log::LevelFilter {
        self.log_level
            .parse()
            .unwrap_or(log::LevelFilter::Info)
    }
}

fn migrate_settings(settings: &mut Settings) {
    info!(
        "Migrating settings from v{} to v{}",
        settings.version, CURRENT_VERSION
    );

    // Future migrations go here:
    // if settings.version < 2 {
    //     migrate_v1_to_v2(settings);
    // }

    settings.version = CURRENT_VERSION;
}

fn generate_settings_yaml(settings: &Settings) -> String {
    let mut content = String::new();

    content.push_str(&format!("version: {}\n", settings.version));
    content.push('\n');
    content.push_str("# Backend serving /gpt, /upload, /get_pdf and /save_annotation\n");
    content.push_str(&format!("backend_url: \"{}\"\n", settings.backend_url));
    content.push_str(&format!(
        "request_timeout_secs: {}\n",
        settings.request_timeout_secs
    ));
    content.push_str(&format!("max_upload_bytes: {}\n", settings.max_upload_bytes));
    content.push('\n');
    content.push_str("# Viewer zoom (1.0 = page-space units)\n");
    content.push_str(&format!("initial_scale: {}\n", settings.initial_scale));
    content.push_str(&format!("zoom_step: {}\n", settings.zoom_step));
    content.push_str(&format!("min_scale: {}\n", settings.min_scale));
    content.push_str(&format!("max_scale: {}\n", settings.max_scale));
    content.push('\n');
    content.push_str(HIGHLIGHT_MATCHING_TEMPLATE);
    content.push_str(&format!(
        "highlight_matching: {}\n",
        settings.highlight_matching.as_str()
    ));
    content.push('\n');
    content.push_str("# off, error, warn, info, debug or trace\n");
    content.push_str(&format!("log_level: {}\n", settings.log_level));

    content
}

const HIGHLIGHT_MATCHING_TEMPLATE: &str = r#"# Which highlights are stripped when an annotation is deleted:
#   text  - every highlight whose text equals the annotation's text
#   owner - only the highlight created with that annotation
"#;
