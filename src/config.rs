//! Bot configuration module.
//!
//! Handles loading, validating, and merging `config.toml`. The user file is
//! layered on top of the stock defaults, so it only needs the keys it wants to
//! change. Everything is read once at startup and is immutable afterwards.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [pool]
//! size = 2                  # Transform workers (clamped to CPU cores)
//!
//! [blur]
//! radius = 15.0             # Gaussian sigma of the public preview
//!
//! [watermark]
//! opacity = 150             # Label alpha, 0-255
//! margin = 20               # Distance from the bottom-right corner, px
//! font_size_floor = 20      # Smallest label size, px
//! font_size_divisor = 25    # Label size = max(floor, width / divisor)
//! label_prefix = "ID: "
//! font_paths = ["/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf"]
//!
//! [media]
//! extensions = ["png", "jpg", "jpeg"]
//!
//! [storage]
//! container = "image-store" # Where originals are parked
//!
//! [deadlines]
//! acknowledge_ms = 3000     # Time allowed to acknowledge an activation
//! followup_secs = 900       # Time allowed to deliver after acknowledging
//!
//! [liveness]
//! enabled = true
//! port = 8080               # Overridden by the PORT environment variable
//!
//! [platform]
//! token_env = "DISCORD_TOKEN"
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::imaging::{BlurParams, MediaWhitelist, Opacity, WatermarkParams, known_extensions};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
    #[error("platform credential missing: set the {0} environment variable")]
    MissingCredential(String),
}

/// Longest accepted `storage.container`.
///
/// Platform component ids hold at most 100 chars; the trigger id is
/// `reveal:<container>/<32-char record>/<16-char digest>`.
pub const MAX_CONTAINER_LEN: usize = 100 - "reveal:".len() - 1 - 32 - 1 - 16;

/// Bot configuration loaded from `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BotConfig {
    pub pool: PoolConfig,
    pub blur: BlurConfig,
    pub watermark: WatermarkConfig,
    pub media: MediaConfig,
    pub storage: StorageConfig,
    pub deadlines: DeadlineConfig,
    pub liveness: LivenessConfig,
    pub platform: PlatformConfig,
}

impl BotConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pool.size == 0 {
            return Err(ConfigError::Validation("pool.size must be at least 1".into()));
        }
        if !(self.blur.radius.is_finite() && self.blur.radius > 0.0) {
            return Err(ConfigError::Validation(
                "blur.radius must be a positive number".into(),
            ));
        }
        if self.watermark.opacity > 255 {
            return Err(ConfigError::Validation(
                "watermark.opacity must be 0-255".into(),
            ));
        }
        if self.watermark.font_size_divisor == 0 {
            return Err(ConfigError::Validation(
                "watermark.font_size_divisor must be non-zero".into(),
            ));
        }
        if self.watermark.font_size_floor == 0 {
            return Err(ConfigError::Validation(
                "watermark.font_size_floor must be non-zero".into(),
            ));
        }
        if self.media.extensions.is_empty() {
            return Err(ConfigError::Validation(
                "media.extensions must not be empty".into(),
            ));
        }
        for ext in &self.media.extensions {
            let normalized = ext.trim_start_matches('.').to_ascii_lowercase();
            if !known_extensions().any(|known| known == normalized) {
                return Err(ConfigError::Validation(format!(
                    "media.extensions: unsupported extension {ext:?}"
                )));
            }
        }
        if self.storage.container.is_empty() || self.storage.container.contains('/') {
            return Err(ConfigError::Validation(
                "storage.container must be non-empty and contain no '/'".into(),
            ));
        }
        if self.storage.container.chars().count() > MAX_CONTAINER_LEN {
            return Err(ConfigError::Validation(format!(
                "storage.container must be at most {MAX_CONTAINER_LEN} characters"
            )));
        }
        if self.deadlines.acknowledge_ms == 0 {
            return Err(ConfigError::Validation(
                "deadlines.acknowledge_ms must be non-zero".into(),
            ));
        }
        if self.deadlines.followup_secs == 0 {
            return Err(ConfigError::Validation(
                "deadlines.followup_secs must be non-zero".into(),
            ));
        }
        if self.platform.token_env.is_empty() {
            return Err(ConfigError::Validation(
                "platform.token_env must not be empty".into(),
            ));
        }
        Ok(())
    }

    pub fn blur_params(&self) -> BlurParams {
        BlurParams {
            radius: self.blur.radius,
        }
    }

    pub fn watermark_params(&self) -> WatermarkParams {
        WatermarkParams {
            label_prefix: self.watermark.label_prefix.clone(),
            opacity: Opacity::new(self.watermark.opacity),
            margin: self.watermark.margin,
            font_size_floor: self.watermark.font_size_floor,
            font_size_divisor: self.watermark.font_size_divisor,
        }
    }

    pub fn whitelist(&self) -> MediaWhitelist {
        MediaWhitelist::new(&self.media.extensions)
    }

    /// Read the platform credential from the environment.
    pub fn credential(&self) -> Result<String, ConfigError> {
        self.credential_from(|key| std::env::var(key).ok())
    }

    /// Credential lookup with an injectable environment. Blank values count as
    /// missing.
    pub fn credential_from(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<String, ConfigError> {
        lookup(&self.platform.token_env)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingCredential(self.platform.token_env.clone()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolConfig {
    /// Worker threads for blur/stamp. Clamped to the number of CPU cores.
    pub size: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { size: 2 }
    }
}

/// Resolve the effective pool size.
///
/// The configured value is capped at the number of available cores: the user
/// can constrain down, not up.
pub fn effective_pool_size(config: &PoolConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.size.clamp(1, cores)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BlurConfig {
    pub radius: f32,
}

impl Default for BlurConfig {
    fn default() -> Self {
        Self { radius: 15.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WatermarkConfig {
    pub opacity: u32,
    pub margin: u32,
    pub font_size_floor: u32,
    pub font_size_divisor: u32,
    pub label_prefix: String,
    /// Scalable fonts tried in order; the built-in bitmap font is used when
    /// none loads.
    pub font_paths: Vec<PathBuf>,
}

impl Default for WatermarkConfig {
    fn default() -> Self {
        Self {
            opacity: 150,
            margin: 20,
            font_size_floor: 20,
            font_size_divisor: 25,
            label_prefix: "ID: ".to_string(),
            font_paths: vec![PathBuf::from(
                "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
            )],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MediaConfig {
    pub extensions: Vec<String>,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            extensions: vec!["png".into(), "jpg".into(), "jpeg".into()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    pub container: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            container: "image-store".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeadlineConfig {
    pub acknowledge_ms: u64,
    pub followup_secs: u64,
}

impl Default for DeadlineConfig {
    fn default() -> Self {
        Self {
            acknowledge_ms: 3000,
            followup_secs: 900,
        }
    }
}

impl DeadlineConfig {
    pub fn acknowledge(&self) -> Duration {
        Duration::from_millis(self.acknowledge_ms)
    }

    pub fn followup(&self) -> Duration {
        Duration::from_secs(self.followup_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LivenessConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8080,
        }
    }
}

impl LivenessConfig {
    /// A parseable `PORT` value wins over the configured port.
    pub fn effective_port(&self, env_port: Option<&str>) -> u16 {
        env_port
            .and_then(|p| p.trim().parse().ok())
            .unwrap_or(self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlatformConfig {
    /// Environment variable holding the platform credential.
    pub token_env: String,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            token_env: "DISCORD_TOKEN".to_string(),
        }
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Stock defaults as a TOML value, the base layer for merging.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(BotConfig::default())?)
}

/// Recursively merge `overlay` into `base`. Tables merge key by key; any other
/// value in the overlay replaces the base.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Read a config file as a raw TOML value. A missing file is `Ok(None)`.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto `base`, deserialize, and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<BotConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: BotConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load the configuration from `path`, or stock defaults when `path` is
/// `None` or the file does not exist.
pub fn load_config(path: Option<&Path>) -> Result<BotConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let overlay = match path {
        Some(p) => load_raw_config(p)?,
        None => None,
    };
    resolve_config(base, overlay)
}

/// A documented stock `config.toml` with all keys and explanations.
pub fn stock_config_toml() -> &'static str {
    r##"# Blurmark Configuration
# ======================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Transform workers
# ---------------------------------------------------------------------------
[pool]
# Threads that blur and stamp images. Never more than the CPU core count.
size = 2

# ---------------------------------------------------------------------------
# Public preview
# ---------------------------------------------------------------------------
[blur]
# Gaussian blur sigma. Larger hides more detail.
radius = 15.0

# ---------------------------------------------------------------------------
# Personalized watermark
# ---------------------------------------------------------------------------
[watermark]
# Label alpha (0 = invisible, 255 = opaque).
opacity = 150

# Distance of the label from the bottom-right corner, in pixels.
margin = 20

# Label size in pixels = max(font_size_floor, image width / font_size_divisor).
font_size_floor = 20
font_size_divisor = 25

# Text placed before the requester id.
label_prefix = "ID: "

# Scalable fonts to try, in order. A built-in bitmap font is used if none load.
font_paths = ["/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf"]

# ---------------------------------------------------------------------------
# Accepted attachments
# ---------------------------------------------------------------------------
[media]
# Filename extensions, case-insensitive. Supported: png, jpg, jpeg, webp.
extensions = ["png", "jpg", "jpeg"]

# ---------------------------------------------------------------------------
# Storage of originals
# ---------------------------------------------------------------------------
[storage]
# Container (e.g. a storage channel) the originals are parked in.
# At most 43 characters, so reveal buttons fit the platform's id limit.
container = "image-store"

# ---------------------------------------------------------------------------
# Platform deadlines
# ---------------------------------------------------------------------------
[deadlines]
# Time allowed to acknowledge a reveal request.
acknowledge_ms = 3000

# Time allowed to deliver the result after acknowledging.
followup_secs = 900

# ---------------------------------------------------------------------------
# Liveness endpoint
# ---------------------------------------------------------------------------
[liveness]
enabled = true
# The PORT environment variable, when set, takes precedence.
port = 8080

# ---------------------------------------------------------------------------
# Platform
# ---------------------------------------------------------------------------
[platform]
# Environment variable that holds the bot credential. Required by `serve`.
token_env = "DISCORD_TOKEN"
"##
}
