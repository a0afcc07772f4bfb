use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::layer::ViewSettings;
use crate::models::LatLng;
use crate::source::SourceConfig;
use crate::style::DEFAULT_COLOR;

#[derive(Deserialize, Clone, Debug)]
pub struct Config {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    pub thread_count: Option<usize>,
    /// Load the configured table once at startup.
    #[serde(default)]
    pub autoload: bool,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub view: ViewConfig,
    #[serde(default)]
    pub style: StyleConfig,
    #[serde(default)]
    pub templates: TemplatesConfig,
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ViewConfig {
    /// [lat, lng]
    pub center: (f64, f64),
    pub zoom: u8,
    pub fit_padding: u32,
    pub max_fit_zoom: u8,
    pub width: u32,
    pub height: u32,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            center: (-16.5, -68.15),
            zoom: 13,
            fit_padding: 50,
            max_fit_zoom: 16,
            width: 1024,
            height: 768,
        }
    }
}

impl ViewConfig {
    pub fn home(&self) -> LatLng {
        LatLng::new(self.center.0, self.center.1)
    }

    pub fn settings(&self) -> ViewSettings {
        ViewSettings {
            home: self.home(),
            home_zoom: self.zoom,
            fit_padding: self.fit_padding,
            max_fit_zoom: self.max_fit_zoom,
        }
    }
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct StyleConfig {
    pub default_color: String,
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self {
            default_color: DEFAULT_COLOR.to_string(),
        }
    }
}

#[derive(Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct TemplatesConfig {
    pub dir: Option<PathBuf>,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3001".to_string()
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let path = if Path::new("geovisor.toml").exists() {
            "geovisor.toml"
        } else if Path::new("geovisor.example.toml").exists() {
            "geovisor.example.toml"
        } else {
            return Err(anyhow::anyhow!("Configuration file not found. Please create geovisor.toml or provide geovisor.example.toml."));
        };

        Self::load_from(Path::new(path))
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}
