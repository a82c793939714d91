//! Core configuration structures and loading logic

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;

/// Error type for configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
    /// A value parsed but is outside its allowed range
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse config: {}", e),
            ConfigError::Invalid(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// How the encoder targets output quality
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum QualityMode {
    /// Fixed target bitrate (`bitrate_kbps`)
    #[default]
    Bitrate,
    /// Constant quality (`cq`), output size is not predictable
    ConstantQuality,
}

impl std::str::FromStr for QualityMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bitrate" => Ok(QualityMode::Bitrate),
            "constant_quality" | "cq" | "crf" => Ok(QualityMode::ConstantQuality),
            other => Err(format!("unknown quality mode '{}'", other)),
        }
    }
}

/// Encoding settings shared by every job in a run.
///
/// The host owns the live copy; each job receives a snapshot when it is
/// dispatched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EncodingSettings {
    #[serde(default)]
    pub quality_mode: QualityMode,
    /// Target video bitrate in kbps (bitrate mode)
    #[serde(default = "default_bitrate_kbps")]
    pub bitrate_kbps: u32,
    /// Constant-quality value (CRF for software, CQ for NVENC)
    #[serde(default = "default_cq")]
    pub cq: u8,
    /// Encode on the GPU (NVENC) instead of libx264
    #[serde(default)]
    pub gpu_acceleration: bool,
}

fn default_bitrate_kbps() -> u32 {
    4000
}

fn default_cq() -> u8 {
    23
}

impl Default for EncodingSettings {
    fn default() -> Self {
        Self {
            quality_mode: QualityMode::default(),
            bitrate_kbps: default_bitrate_kbps(),
            cq: default_cq(),
            gpu_acceleration: false,
        }
    }
}

/// Partial update for [`EncodingSettings`]; `None` fields are left untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SettingsPatch {
    pub quality_mode: Option<QualityMode>,
    pub bitrate_kbps: Option<u32>,
    pub cq: Option<u8>,
    pub gpu_acceleration: Option<bool>,
}

impl EncodingSettings {
    /// Merge a patch into these settings
    pub fn apply(&mut self, patch: &SettingsPatch) {
        if let Some(mode) = patch.quality_mode {
            self.quality_mode = mode;
        }
        if let Some(kbps) = patch.bitrate_kbps {
            self.bitrate_kbps = kbps;
        }
        if let Some(cq) = patch.cq {
            self.cq = cq;
        }
        if let Some(gpu) = patch.gpu_acceleration {
            self.gpu_acceleration = gpu;
        }
    }
}

/// External tool locations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EncoderConfig {
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,
    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: String,
}

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}

fn default_ffprobe_path() -> String {
    "ffprobe".to_string()
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            ffprobe_path: default_ffprobe_path(),
        }
    }
}

/// Pre-dispatch admission tuning
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdmissionConfig {
    /// Required free space = estimate * safety_margin (must be > 1.0)
    #[serde(default = "default_safety_margin")]
    pub safety_margin: f64,
    /// Output/source size ratio assumed for constant-quality encodes
    #[serde(default = "default_cq_size_multiplier")]
    pub cq_size_multiplier: f64,
}

fn default_safety_margin() -> f64 {
    1.10
}

fn default_cq_size_multiplier() -> f64 {
    1.0
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            safety_margin: default_safety_margin(),
            cq_size_multiplier: default_cq_size_multiplier(),
        }
    }
}

/// Read-only HTTP status endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusServerConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_status_addr")]
    pub bind_addr: String,
}

fn default_status_addr() -> String {
    "127.0.0.1:7879".to_string()
}

impl Default for StatusServerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_addr: default_status_addr(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub encoder: EncoderConfig,
    #[serde(default)]
    pub encoding: EncodingSettings,
    #[serde(default)]
    pub admission: AdmissionConfig,
    #[serde(default)]
    pub status_server: StatusServerConfig,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Parses the config.toml file and handles missing optional fields with defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Overrides the following values if environment variables are set:
    /// - SUBBURN_FFMPEG_PATH -> encoder.ffmpeg_path
    /// - SUBBURN_FFPROBE_PATH -> encoder.ffprobe_path
    /// - SUBBURN_QUALITY_MODE -> encoding.quality_mode
    /// - SUBBURN_BITRATE_KBPS -> encoding.bitrate_kbps
    /// - SUBBURN_CQ -> encoding.cq
    /// - SUBBURN_GPU -> encoding.gpu_acceleration
    /// - SUBBURN_SAFETY_MARGIN -> admission.safety_margin
    /// - SUBBURN_STATUS_ADDR -> status_server.bind_addr
    ///
    /// Unparseable values are ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("SUBBURN_FFMPEG_PATH") {
            if !val.is_empty() {
                self.encoder.ffmpeg_path = val;
            }
        }

        if let Ok(val) = env::var("SUBBURN_FFPROBE_PATH") {
            if !val.is_empty() {
                self.encoder.ffprobe_path = val;
            }
        }

        if let Ok(val) = env::var("SUBBURN_QUALITY_MODE") {
            if let Ok(mode) = val.parse::<QualityMode>() {
                self.encoding.quality_mode = mode;
            }
        }

        if let Ok(val) = env::var("SUBBURN_BITRATE_KBPS") {
            if let Ok(kbps) = val.parse::<u32>() {
                self.encoding.bitrate_kbps = kbps;
            }
        }

        if let Ok(val) = env::var("SUBBURN_CQ") {
            if let Ok(cq) = val.parse::<u8>() {
                self.encoding.cq = cq;
            }
        }

        if let Ok(val) = env::var("SUBBURN_GPU") {
            // Accept "true", "1", "yes" as true; "false", "0", "no" as false
            match val.to_lowercase().as_str() {
                "true" | "1" | "yes" => self.encoding.gpu_acceleration = true,
                "false" | "0" | "no" => self.encoding.gpu_acceleration = false,
                _ => {}
            }
        }

        if let Ok(val) = env::var("SUBBURN_SAFETY_MARGIN") {
            if let Ok(margin) = val.parse::<f64>() {
                self.admission.safety_margin = margin;
            }
        }

        if let Ok(val) = env::var("SUBBURN_STATUS_ADDR") {
            if !val.is_empty() {
                self.status_server.bind_addr = val;
            }
        }
    }

    /// Reject values the engine cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.admission.safety_margin > 1.0) {
            return Err(ConfigError::Invalid(format!(
                "admission.safety_margin must be greater than 1.0, got {}",
                self.admission.safety_margin
            )));
        }
        if !(self.admission.cq_size_multiplier > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "admission.cq_size_multiplier must be positive, got {}",
                self.admission.cq_size_multiplier
            )));
        }
        if self.encoding.bitrate_kbps == 0 {
            return Err(ConfigError::Invalid(
                "encoding.bitrate_kbps must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Load configuration from file, apply environment overrides and validate
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Like [`Config::load`], but a missing file means "defaults plus environment"
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            return Self::load(path);
        }
        let mut config = Config::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Mutex;

    // Mutex to ensure env var tests don't interfere with each other
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Helper to clear all config-related env vars
    fn clear_env_vars() {
        env::remove_var("SUBBURN_FFMPEG_PATH");
        env::remove_var("SUBBURN_FFPROBE_PATH");
        env::remove_var("SUBBURN_QUALITY_MODE");
        env::remove_var("SUBBURN_BITRATE_KBPS");
        env::remove_var("SUBBURN_CQ");
        env::remove_var("SUBBURN_GPU");
        env::remove_var("SUBBURN_SAFETY_MARGIN");
        env::remove_var("SUBBURN_STATUS_ADDR");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_config_parses_all_sections(
            bitrate in 1u32..100_000,
            cq in 0u8..52,
            gpu in proptest::bool::ANY,
            cq_mode in proptest::bool::ANY,
            margin in 1.01f64..3.0,
        ) {
            let toml_str = format!(
                r#"
[encoder]
ffmpeg_path = "/opt/ffmpeg/bin/ffmpeg"

[encoding]
quality_mode = "{}"
bitrate_kbps = {}
cq = {}
gpu_acceleration = {}

[admission]
safety_margin = {}
"#,
                if cq_mode { "constant_quality" } else { "bitrate" },
                bitrate,
                cq,
                gpu,
                margin,
            );

            let config = Config::parse_toml(&toml_str).expect("Valid TOML should parse");

            prop_assert_eq!(config.encoder.ffmpeg_path.as_str(), "/opt/ffmpeg/bin/ffmpeg");
            prop_assert_eq!(config.encoder.ffprobe_path.as_str(), "ffprobe");
            prop_assert_eq!(
                config.encoding.quality_mode,
                if cq_mode { QualityMode::ConstantQuality } else { QualityMode::Bitrate }
            );
            prop_assert_eq!(config.encoding.bitrate_kbps, bitrate);
            prop_assert_eq!(config.encoding.cq, cq);
            prop_assert_eq!(config.encoding.gpu_acceleration, gpu);
            prop_assert!((config.admission.safety_margin - margin).abs() < 1e-9);
            prop_assert!(config.validate().is_ok());
        }

        #[test]
        fn prop_env_overrides_bitrate(
            initial in 1u32..50_000,
            override_kbps in 1u32..50_000,
        ) {
            let _guard = ENV_MUTEX.lock().unwrap();
            clear_env_vars();

            let toml_str = format!("[encoding]\nbitrate_kbps = {}\n", initial);
            let mut config = Config::parse_toml(&toml_str).expect("Valid TOML");

            env::set_var("SUBBURN_BITRATE_KBPS", override_kbps.to_string());
            config.apply_env_overrides();
            clear_env_vars();

            prop_assert_eq!(config.encoding.bitrate_kbps, override_kbps);
        }

        #[test]
        fn prop_settings_patch_only_touches_set_fields(
            bitrate in proptest::option::of(1u32..50_000),
            cq in proptest::option::of(0u8..52),
            gpu in proptest::option::of(proptest::bool::ANY),
        ) {
            let original = EncodingSettings::default();
            let mut settings = original.clone();
            settings.apply(&SettingsPatch {
                quality_mode: None,
                bitrate_kbps: bitrate,
                cq,
                gpu_acceleration: gpu,
            });

            prop_assert_eq!(settings.quality_mode, original.quality_mode);
            prop_assert_eq!(settings.bitrate_kbps, bitrate.unwrap_or(original.bitrate_kbps));
            prop_assert_eq!(settings.cq, cq.unwrap_or(original.cq));
            prop_assert_eq!(settings.gpu_acceleration, gpu.unwrap_or(original.gpu_acceleration));
        }
    }

    #[test]
    fn test_env_overrides_gpu_and_mode() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env_vars();

        let mut config = Config::default();
        env::set_var("SUBBURN_GPU", "yes");
        env::set_var("SUBBURN_QUALITY_MODE", "cq");
        env::set_var("SUBBURN_FFPROBE_PATH", "/usr/local/bin/ffprobe");
        config.apply_env_overrides();
        clear_env_vars();

        assert!(config.encoding.gpu_acceleration);
        assert_eq!(config.encoding.quality_mode, QualityMode::ConstantQuality);
        assert_eq!(config.encoder.ffprobe_path, "/usr/local/bin/ffprobe");
    }

    #[test]
    fn test_invalid_env_values_are_ignored() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env_vars();

        let mut config = Config::default();
        env::set_var("SUBBURN_BITRATE_KBPS", "fast");
        env::set_var("SUBBURN_GPU", "maybe");
        config.apply_env_overrides();
        clear_env_vars();

        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse_toml("").expect("Empty TOML should parse");

        assert_eq!(config.encoder.ffmpeg_path, "ffmpeg");
        assert_eq!(config.encoding.quality_mode, QualityMode::Bitrate);
        assert_eq!(config.encoding.bitrate_kbps, 4000);
        assert_eq!(config.encoding.cq, 23);
        assert!(!config.encoding.gpu_acceleration);
        assert!((config.admission.safety_margin - 1.10).abs() < 1e-9);
        assert!(!config.status_server.enabled);
        assert_eq!(config.status_server.bind_addr, "127.0.0.1:7879");
    }

    #[test]
    fn test_safety_margin_must_exceed_one() {
        let config = Config::parse_toml("[admission]\nsafety_margin = 1.0\n").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config = Config::parse_toml("[admission]\nsafety_margin = 1.25\n").unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_bitrate_rejected() {
        let config = Config::parse_toml("[encoding]\nbitrate_kbps = 0\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_or_default_without_file() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env_vars();

        let config = Config::load_or_default("/nonexistent/subburn/config.toml")
            .expect("missing file falls back to defaults");
        assert_eq!(config, Config::default());
    }
}
