use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono_tz::Tz;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::clock::SystemClock;
use crate::format::DEFAULT_CURRENCY_SYMBOL;

pub const CONFIG_FILE_NAME: &str = "harcama.toml";

const DEFAULT_IDENTITY_URL: &str = "https://identitytoolkit.googleapis.com/v1";
const DEFAULT_FIRESTORE_URL: &str = "https://firestore.googleapis.com/v1";
const DEFAULT_STORAGE_URL: &str = "https://firebasestorage.googleapis.com/v0";
const DEFAULT_AI_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_AI_MODEL: &str = "gemini-2.0-flash";

/// Parse an interval like "15s", "2m" or "1h".
pub fn parse_interval(s: &str) -> Result<Duration> {
    let s = s.trim().to_lowercase();
    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .context("Interval must end with s, m or h")?;
    let (num, unit) = s.split_at(split);
    let num: u64 = num.parse().context("Invalid number in interval")?;
    let secs = match unit {
        "s" => num,
        "m" => num.checked_mul(60).context("Interval is too large")?,
        "h" => num.checked_mul(60 * 60).context("Interval is too large")?,
        _ => anyhow::bail!("Interval must end with s, m or h"),
    };
    if secs == 0 {
        anyhow::bail!("Interval must be positive");
    }
    Ok(Duration::from_secs(secs))
}

fn deserialize_interval<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_interval(&s).map_err(de::Error::custom)
}

fn serialize_interval<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format!("{}s", value.as_secs()))
}

/// Hosted backend (identity, document store, object storage) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub project_id: Option<String>,
    pub storage_bucket: Option<String>,

    /// Environment variable holding the backend web API key. Without it the
    /// app only offers demo mode.
    pub api_key_env: String,

    pub identity_url: String,
    pub firestore_url: String,
    pub storage_url: String,

    /// How often the live transaction view re-queries the document store.
    #[serde(
        deserialize_with = "deserialize_interval",
        serialize_with = "serialize_interval"
    )]
    pub poll_interval: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            storage_bucket: None,
            api_key_env: "FIREBASE_API_KEY".to_string(),
            identity_url: DEFAULT_IDENTITY_URL.to_string(),
            firestore_url: DEFAULT_FIRESTORE_URL.to_string(),
            storage_url: DEFAULT_STORAGE_URL.to_string(),
            poll_interval: Duration::from_secs(15),
        }
    }
}

/// Generative AI extraction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    pub model: String,
    pub base_url: String,
    pub api_key_env: String,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_AI_MODEL.to_string(),
            base_url: DEFAULT_AI_URL.to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
        }
    }
}

/// Receipt image handling before upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiptConfig {
    pub compress: bool,
    /// Images wider than this are scaled down, keeping aspect ratio.
    pub max_width: u32,
    /// JPEG re-encode quality (1-100).
    pub jpeg_quality: u8,
}

impl Default for ReceiptConfig {
    fn default() -> Self {
        Self {
            compress: true,
            max_width: 1024,
            jpeg_quality: 70,
        }
    }
}

/// Display/output formatting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub currency_symbol: String,

    /// IANA zone used for "today" (form defaults, month buckets). Local time
    /// when unset.
    pub timezone: Option<String>,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            currency_symbol: DEFAULT_CURRENCY_SYMBOL.to_string(),
            timezone: None,
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub ai: AiConfig,
    pub receipts: ReceiptConfig,
    pub display: DisplayConfig,
}

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;

        Ok(config)
    }

    /// Load config from a file, or return default config if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    fn validate(&self) -> Result<()> {
        if !(1..=100).contains(&self.receipts.jpeg_quality) {
            anyhow::bail!(
                "receipts.jpeg_quality must be between 1 and 100 (got {})",
                self.receipts.jpeg_quality
            );
        }
        if self.receipts.max_width == 0 {
            anyhow::bail!("receipts.max_width must be positive");
        }
        self.timezone()?;
        Ok(())
    }

    pub fn timezone(&self) -> Result<Option<Tz>> {
        self.display
            .timezone
            .as_deref()
            .map(str::trim)
            .filter(|tz| !tz.is_empty() && !tz.eq_ignore_ascii_case("local"))
            .map(|tz| {
                tz.parse::<Tz>().map_err(|_| {
                    anyhow::anyhow!(
                        "Invalid timezone '{tz}' (expected IANA name, e.g. Europe/Istanbul)"
                    )
                })
            })
            .transpose()
    }

    pub fn clock(&self) -> Result<SystemClock> {
        Ok(match self.timezone()? {
            Some(tz) => SystemClock::in_zone(tz),
            None => SystemClock::local(),
        })
    }
}

/// Returns the default config file path.
///
/// Resolution order:
/// 1. `./harcama.toml` if it exists in current directory
/// 2. `<config dir>/harcama/harcama.toml`
pub fn default_config_path() -> PathBuf {
    let local_config = PathBuf::from(CONFIG_FILE_NAME);
    if local_config.exists() {
        return local_config;
    }

    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("harcama").join(CONFIG_FILE_NAME);
    }

    local_config
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn defaults_are_demo_friendly() {
        let config = Config::default();
        assert_eq!(config.backend.api_key_env, "FIREBASE_API_KEY");
        assert_eq!(config.ai.api_key_env, "GEMINI_API_KEY");
        assert_eq!(config.receipts.max_width, 1024);
        assert_eq!(config.receipts.jpeg_quality, 70);
        assert_eq!(config.display.currency_symbol, "₺");
        assert_eq!(config.backend.poll_interval, Duration::from_secs(15));
    }

    #[test]
    fn load_partial_config_keeps_other_defaults() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join(CONFIG_FILE_NAME);

        let mut file = std::fs::File::create(&path)?;
        writeln!(file, "[backend]")?;
        writeln!(file, "project_id = \"harcama-prod\"")?;
        writeln!(file, "poll_interval = \"2m\"")?;
        writeln!(file, "[display]")?;
        writeln!(file, "timezone = \"Europe/Istanbul\"")?;

        let config = Config::load(&path)?;
        assert_eq!(config.backend.project_id.as_deref(), Some("harcama-prod"));
        assert_eq!(config.backend.poll_interval, Duration::from_secs(120));
        assert_eq!(config.ai.model, "gemini-2.0-flash");
        assert_eq!(config.timezone()?, Some(chrono_tz::Europe::Istanbul));
        Ok(())
    }

    #[test]
    fn load_empty_config() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::File::create(&path)?;

        let config = Config::load(&path)?;
        assert!(config.backend.project_id.is_none());
        assert!(config.receipts.compress);
        Ok(())
    }

    #[test]
    fn missing_file_yields_defaults() -> Result<()> {
        let dir = TempDir::new()?;
        let config = Config::load_or_default(&dir.path().join("absent.toml"))?;
        assert!(config.display.timezone.is_none());
        Ok(())
    }

    #[test]
    fn invalid_values_are_rejected() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join(CONFIG_FILE_NAME);

        std::fs::write(&path, "[receipts]\njpeg_quality = 0\n")?;
        assert!(Config::load(&path).is_err());

        std::fs::write(&path, "[display]\ntimezone = \"Mars/Olympus\"\n")?;
        assert!(Config::load(&path).is_err());

        std::fs::write(&path, "[backend]\npoll_interval = \"soon\"\n")?;
        assert!(Config::load(&path).is_err());
        Ok(())
    }

    #[test]
    fn parse_interval_units() {
        assert_eq!(parse_interval("45s").unwrap(), Duration::from_secs(45));
        assert_eq!(parse_interval("2M").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_interval(" 1h ").unwrap(), Duration::from_secs(3600));
        assert!(parse_interval("0s").is_err());
        assert!(parse_interval("10").is_err());
        assert!(parse_interval("3d").is_err());
    }
}
