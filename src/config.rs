use crate::commands::{MatchPolicy, VoiceCommandPattern};
use crate::defaults;
use crate::error::{Result, VoiceError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub voice: VoiceConfig,
    pub narration: NarrationConfig,
    pub telemetry: TelemetryConfig,
    /// Replaces the built-in command table when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patterns: Option<Vec<VoiceCommandPattern>>,
}

/// Recognition and command service configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VoiceConfig {
    pub enabled: bool,
    pub continuous: bool,
    pub interim_results: bool,
    pub language: String,
    pub max_alternatives: u32,
    pub noise_threshold: f32,
    pub command_timeout_ms: u64,
    pub barge_in_enabled: bool,
    pub auto_hide_delay_ms: u64,
    pub debug_mode: bool,
    pub match_policy: MatchPolicy,
}

/// Initial narration settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NarrationConfig {
    pub volume: f32,
    pub rate: f32,
    pub pitch: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
}

/// Telemetry sink configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TelemetryConfig {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    pub local_storage: bool,
    pub max_events: usize,
    pub debug_mode: bool,
    pub send_interval_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_dir: Option<PathBuf>,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            continuous: true,
            interim_results: false,
            language: defaults::DEFAULT_LANGUAGE.to_string(),
            max_alternatives: defaults::MAX_ALTERNATIVES,
            noise_threshold: defaults::NOISE_THRESHOLD,
            command_timeout_ms: defaults::COMMAND_TIMEOUT_MS,
            barge_in_enabled: true,
            auto_hide_delay_ms: defaults::AUTO_HIDE_DELAY_MS,
            debug_mode: false,
            match_policy: MatchPolicy::FirstMatch,
        }
    }
}

impl Default for NarrationConfig {
    fn default() -> Self {
        Self {
            volume: 1.0,
            rate: 1.0,
            pitch: 1.0,
            voice: None,
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: None,
            local_storage: true,
            max_events: defaults::TELEMETRY_MAX_EVENTS,
            debug_mode: false,
            send_interval_ms: defaults::TELEMETRY_SEND_INTERVAL_MS,
            storage_dir: None,
        }
    }
}

impl TelemetryConfig {
    /// Where file-backed telemetry lives: the configured directory, or the
    /// XDG data directory.
    pub fn resolved_storage_dir(&self) -> PathBuf {
        self.storage_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join(defaults::APP_DIR)
                .join("telemetry")
        })
    }
}

/// Partial update for [`VoiceConfig`]; `None` fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfigUpdate {
    pub enabled: Option<bool>,
    pub continuous: Option<bool>,
    pub interim_results: Option<bool>,
    pub language: Option<String>,
    pub max_alternatives: Option<u32>,
    pub noise_threshold: Option<f32>,
    pub command_timeout_ms: Option<u64>,
    pub barge_in_enabled: Option<bool>,
    pub auto_hide_delay_ms: Option<u64>,
    pub debug_mode: Option<bool>,
    pub match_policy: Option<MatchPolicy>,
}

impl VoiceConfigUpdate {
    pub fn apply_to(&self, config: &mut VoiceConfig) {
        if let Some(v) = self.enabled {
            config.enabled = v;
        }
        if let Some(v) = self.continuous {
            config.continuous = v;
        }
        if let Some(v) = self.interim_results {
            config.interim_results = v;
        }
        if let Some(v) = &self.language {
            config.language = v.clone();
        }
        if let Some(v) = self.max_alternatives {
            config.max_alternatives = v.max(1);
        }
        if let Some(v) = self.noise_threshold {
            config.noise_threshold = v.clamp(0.0, 1.0);
        }
        if let Some(v) = self.command_timeout_ms {
            config.command_timeout_ms = v;
        }
        if let Some(v) = self.barge_in_enabled {
            config.barge_in_enabled = v;
        }
        if let Some(v) = self.auto_hide_delay_ms {
            config.auto_hide_delay_ms = v;
        }
        if let Some(v) = self.debug_mode {
            config.debug_mode = v;
        }
        if let Some(v) = self.match_policy {
            config.match_policy = v;
        }
    }

    /// Whether applying this update changes what the recognizer is told.
    pub fn touches_recognizer(&self) -> bool {
        self.continuous.is_some()
            || self.interim_results.is_some()
            || self.language.is_some()
            || self.max_alternatives.is_some()
    }
}

/// Partial update for [`TelemetryConfig`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfigUpdate {
    pub enabled: Option<bool>,
    pub endpoint: Option<String>,
    pub local_storage: Option<bool>,
    pub max_events: Option<usize>,
    pub debug_mode: Option<bool>,
    pub send_interval_ms: Option<u64>,
}

impl TelemetryConfigUpdate {
    pub fn apply_to(&self, config: &mut TelemetryConfig) {
        if let Some(v) = self.enabled {
            config.enabled = v;
        }
        if let Some(v) = &self.endpoint {
            config.endpoint = if v.is_empty() { None } else { Some(v.clone()) };
        }
        if let Some(v) = self.local_storage {
            config.local_storage = v;
        }
        if let Some(v) = self.max_events {
            config.max_events = v;
        }
        if let Some(v) = self.debug_mode {
            config.debug_mode = v;
        }
        if let Some(v) = self.send_interval_ms {
            config.send_interval_ms = v;
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Missing fields use default values. Out-of-range values are rejected.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if the file doesn't exist
    ///
    /// Invalid TOML is still an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(VoiceError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(Self::default())
            }
            Err(e) => Err(e),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - LESSON_VOICE_LANGUAGE → voice.language
    /// - LESSON_VOICE_TELEMETRY_ENDPOINT → telemetry.endpoint
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(language) = std::env::var("LESSON_VOICE_LANGUAGE")
            && !language.is_empty()
        {
            self.voice.language = language;
        }

        if let Ok(endpoint) = std::env::var("LESSON_VOICE_TELEMETRY_ENDPOINT")
            && !endpoint.is_empty()
        {
            self.telemetry.endpoint = Some(endpoint);
        }

        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.voice.max_alternatives == 0 {
            return Err(invalid("voice.max_alternatives", "must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.voice.noise_threshold) {
            return Err(invalid("voice.noise_threshold", "must be between 0 and 1"));
        }
        if self.voice.command_timeout_ms == 0 {
            return Err(invalid("voice.command_timeout_ms", "must be positive"));
        }
        if self.telemetry.send_interval_ms == 0 {
            return Err(invalid("telemetry.send_interval_ms", "must be positive"));
        }
        if let Some(patterns) = &self.patterns {
            for row in patterns {
                if !(0.0..=1.0).contains(&row.min_confidence) {
                    return Err(invalid(
                        "patterns.min_confidence",
                        &format!("{} must be between 0 and 1", row.command_type),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Command table in effect: configured rows or the built-in table.
    pub fn command_patterns(&self) -> Vec<VoiceCommandPattern> {
        self.patterns
            .clone()
            .unwrap_or_else(crate::commands::default_patterns)
    }

    /// Look up a dotted key such as `voice.language`.
    pub fn get(&self, key: &str) -> Option<String> {
        let mut value = toml::Value::try_from(self).ok()?;
        for part in key.split('.') {
            value = value.get(part)?.clone();
        }
        Some(match value {
            toml::Value::String(s) => s,
            other => other.to_string(),
        })
    }

    /// Default configuration rendered as TOML.
    pub fn dump_template() -> Result<String> {
        toml::to_string_pretty(&Config::default()).map_err(|e| VoiceError::ConfigParse {
            message: e.to_string(),
        })
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/lesson-voice/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(defaults::APP_DIR)
            .join("config.toml")
    }
}

fn invalid(key: &str, message: &str) -> VoiceError {
    VoiceError::ConfigInvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}
