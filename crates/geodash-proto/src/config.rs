use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::month::{DateRange, Month};
use super::platform;
use super::protocol::LayerId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default = "default_layers")]
    pub layers: Vec<LayerConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL the endpoint paths are appended to.
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

/// Local control surface (state JSON + action endpoints).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_enabled")]
    pub enabled: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    #[serde(default = "default_month")]
    pub start_month: Month,
    #[serde(default = "default_month")]
    pub end_month: Month,
    /// Fetch the trailing 12-month series alongside min/max stats.  Needs a
    /// backend that serves `/timeseries_{layer}`.
    #[serde(default)]
    pub timeseries: bool,
    /// Fetch the point time series alongside pixel values on click.
    #[serde(default)]
    pub pixel_timeseries: bool,
}

/// One entry of the layer registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerConfig {
    pub id: LayerId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub attribution: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_opacity")]
    pub opacity: f32,
    #[serde(default)]
    pub legend: Legend,
}

/// Static visualisation range, shown until live stats arrive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Legend {
    pub min: f64,
    pub max: f64,
    #[serde(default)]
    pub palette: Vec<String>,
    #[serde(default)]
    pub unit: String,
}

impl Default for Legend {
    fn default() -> Self {
        Self {
            min: 0.0,
            max: 1.0,
            palette: Vec::new(),
            unit: String::new(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: default_http_enabled(),
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            start_month: default_month(),
            end_month: default_month(),
            timeseries: false,
            pixel_timeseries: false,
        }
    }
}

impl QueryConfig {
    /// Initial date range; an inverted pair collapses to the end month.
    pub fn date_range(&self) -> DateRange {
        DateRange::new(self.start_month, self.end_month)
            .unwrap_or_else(|_| DateRange::single(self.end_month))
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:8000/api".to_string()
}

fn default_http_enabled() -> bool {
    true
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8990
}

fn default_month() -> Month {
    Month::new(2025, 1).unwrap_or_else(|_| Month::current())
}

fn default_opacity() -> f32 {
    1.0
}

fn palette(colors: &[&str]) -> Vec<String> {
    colors.iter().map(|c| c.to_string()).collect()
}

fn default_layers() -> Vec<LayerConfig> {
    let mut layers = Vec::new();
    if let Ok(id) = LayerId::new("lst") {
        layers.push(LayerConfig {
            id,
            title: "Land Surface Temperature".to_string(),
            attribution: "MODIS LST".to_string(),
            enabled: true,
            opacity: 1.0,
            legend: Legend {
                min: 0.0,
                max: 40.0,
                palette: palette(&["blue", "green", "yellow", "red"]),
                unit: "°C".to_string(),
            },
        });
    }
    if let Ok(id) = LayerId::new("ndvi") {
        layers.push(LayerConfig {
            id,
            title: "Normalized Difference Vegetation Index".to_string(),
            attribution: "Sentinel-2 NDVI".to_string(),
            enabled: false,
            opacity: 1.0,
            legend: Legend {
                min: -1.0,
                max: 1.0,
                palette: palette(&["red", "white", "green"]),
                unit: String::new(),
            },
        });
    }
    layers
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            let config = Self::default();
            config.save_to(&config_path)?;
            tracing::info!("wrote default config to {}", config_path.display());
            return Ok(config);
        }

        Self::load_from(&config_path)
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }

    /// Registry ids must be unique.
    pub fn validate(&self) -> anyhow::Result<()> {
        let mut seen = std::collections::BTreeSet::new();
        for layer in &self.layers {
            if !seen.insert(&layer.id) {
                anyhow::bail!("layer {:?} is registered twice", layer.id.as_str());
            }
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            http: HttpConfig::default(),
            query: QueryConfig::default(),
            layers: default_layers(),
        }
    }
}
