use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct FormEngineConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub lookup: LookupConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub coercion: CoercionConfig,
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct ApiConfig {
    /// Prefix for relative request URLs; empty = same origin
    #[serde(default)]
    pub base_url: String,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LookupConfig {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct TransportConfig {
    /// Default request timeout; unset = transport default
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Timeout for multipart (file-bearing) submissions
    #[serde(default = "default_upload_timeout_secs")]
    pub upload_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct CoercionConfig {
    #[serde(default = "default_decimal_places")]
    pub decimal_places: u32,
}

fn default_debounce_ms() -> u64 {
    250
}

fn default_page_size() -> usize {
    25
}

fn default_upload_timeout_secs() -> u64 {
    30
}

fn default_decimal_places() -> u32 {
    6
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            page_size: default_page_size(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout_secs: None,
            upload_timeout_secs: default_upload_timeout_secs(),
        }
    }
}

impl Default for CoercionConfig {
    fn default() -> Self {
        Self {
            decimal_places: default_decimal_places(),
        }
    }
}

impl FormEngineConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.lookup.debounce_ms)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.transport.timeout_secs.map(Duration::from_secs)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.transport.upload_timeout_secs)
    }
}

/// Default configuration embedded in the binary
const DEFAULT_CONFIG: &str = r#"
[api]
base_url = ""

[lookup]
debounce_ms = 250
page_size = 25

[transport]
upload_timeout_secs = 30

[coercion]
decimal_places = 6
"#;

/// Load configuration from a TOML file
///
/// Falls back to the embedded default when the file does not exist.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<FormEngineConfig> {
    if let Some(config_path) = path {
        if config_path.exists() {
            log::info!("Loading form engine config from: {}", config_path.display());
            let contents = std::fs::read_to_string(config_path)?;
            return parse_config(&contents);
        }
        log::warn!("Form engine config not found at: {}", config_path.display());
    }

    log::info!("Using default embedded form engine configuration");
    parse_config(DEFAULT_CONFIG)
}

pub fn parse_config(contents: &str) -> anyhow::Result<FormEngineConfig> {
    let config: FormEngineConfig = toml::from_str(contents)?;
    Ok(config)
}
