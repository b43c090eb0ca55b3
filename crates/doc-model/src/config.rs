use serde::{Deserialize, Serialize};

pub const ENV_SIGNER_NAME: &str = "COUNTERSIGN_SIGNER_NAME";
pub const ENV_FIELD_WIDTH: &str = "COUNTERSIGN_FIELD_WIDTH";
pub const ENV_FIELD_HEIGHT: &str = "COUNTERSIGN_FIELD_HEIGHT";
pub const ENV_CAPTURE_SCALE: &str = "COUNTERSIGN_CAPTURE_SCALE";
pub const ENV_RELEASE_MS: &str = "COUNTERSIGN_RELEASE_MS";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{key}={value:?} is not a valid {expected}")]
    InvalidValue { key: &'static str, value: String, expected: &'static str },
}

/// Who is signing. Only `name` is rendered; it pre-fills typed fields.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SignerProfile {
    pub name: String,
    pub title: String,
    pub company: String,
}

/// User-tunable knobs for placement and signing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignerConfig {
    pub profile: SignerProfile,
    /// Size of a newly placed field, in viewport pixels.
    pub field_width: f64,
    pub field_height: f64,
    /// Pixel density of the rasterized fallback capture.
    pub capture_scale: f32,
    /// JPEG quality (1-100) of the rasterized fallback page.
    pub raster_jpeg_quality: u8,
    /// How long a published artifact stays alive after its download starts.
    pub release_delay_ms: u64,
    /// Refuse to sign while any field is still empty.
    pub require_complete: bool,
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            profile: SignerProfile::default(),
            field_width: 200.0,
            field_height: 100.0,
            capture_scale: 2.0,
            raster_jpeg_quality: 95,
            release_delay_ms: 3_000,
            require_complete: true,
        }
    }
}

impl SignerConfig {
    pub fn with_signer_name(mut self, name: impl Into<String>) -> Self {
        self.profile.name = name.into();
        self
    }

    pub fn with_field_size(mut self, width: f64, height: f64) -> Self {
        self.field_width = width;
        self.field_height = height;
        self
    }

    pub fn with_capture_scale(mut self, scale: f32) -> Self {
        self.capture_scale = scale;
        self
    }

    pub fn with_release_delay_ms(mut self, millis: u64) -> Self {
        self.release_delay_ms = millis;
        self
    }

    pub fn with_require_complete(mut self, require: bool) -> Self {
        self.require_complete = require;
        self
    }

    /// Field size with non-positive values replaced by the defaults.
    pub fn field_size(&self) -> (f64, f64) {
        let defaults = Self::default();
        let width = if self.field_width > 0.0 { self.field_width } else { defaults.field_width };
        let height =
            if self.field_height > 0.0 { self.field_height } else { defaults.field_height };
        (width, height)
    }

    pub fn jpeg_quality(&self) -> u8 {
        self.raster_jpeg_quality.clamp(1, 100)
    }

    /// Defaults with the `COUNTERSIGN_*` environment overrides applied.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides()
    }

    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from `lookup`, keyed by the `COUNTERSIGN_*` names.
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(name) = lookup(ENV_SIGNER_NAME) {
            self.profile.name = name;
        }
        if let Some(width) = parse_positive(&lookup, ENV_FIELD_WIDTH)? {
            self.field_width = width;
        }
        if let Some(height) = parse_positive(&lookup, ENV_FIELD_HEIGHT)? {
            self.field_height = height;
        }
        if let Some(scale) = parse_positive(&lookup, ENV_CAPTURE_SCALE)? {
            self.capture_scale = scale as f32;
        }
        if let Some(value) = lookup(ENV_RELEASE_MS) {
            self.release_delay_ms = value.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: ENV_RELEASE_MS,
                value,
                expected: "number of milliseconds",
            })?;
        }
        Ok(self)
    }
}

fn parse_positive(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<f64>, ConfigError> {
    let Some(value) = lookup(key) else {
        return Ok(None);
    };
    match value.trim().parse::<f64>() {
        Ok(parsed) if parsed > 0.0 && parsed.is_finite() => Ok(Some(parsed)),
        _ => Err(ConfigError::InvalidValue { key, value, expected: "positive number" }),
    }
}
