use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::constants::{CONFIG_ENV_VAR, DEFAULT_CONFIG_FILE, DEFAULT_EXCLUDED_STATES, DEFAULT_OUTPUT_DIR};
use crate::derive::IntensityScale;
use crate::error::ConfigError;
use crate::render::{default_visualizations, ImageFormat, Renderer, VisualizationSpec};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub output_dir: PathBuf,
    pub inputs: InputsConfig,
    pub derive: DeriveConfig,
    pub render: RenderConfig,
    pub logging: LoggingConfig,
    /// Replaces the stock visualisation set when present.
    pub visualizations: Option<Vec<VisualizationSpec>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InputsConfig {
    pub agriculture: PathBuf,
    pub election: PathBuf,
    pub demographics: PathBuf,
    pub geometry: PathBuf,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DeriveConfig {
    pub intensity: IntensityScale,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
    pub excluded_states: Vec<String>,
    pub allocation_charts: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory for JSON log files; console only when unset.
    pub dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            inputs: InputsConfig::default(),
            derive: DeriveConfig::default(),
            render: RenderConfig::default(),
            logging: LoggingConfig::default(),
            visualizations: None,
        }
    }
}

impl Default for InputsConfig {
    fn default() -> Self {
        Self {
            agriculture: PathBuf::from("data/soybean_production.csv"),
            election: PathBuf::from("data/election_results.csv"),
            demographics: PathBuf::from("data/acs_demographics.json"),
            geometry: PathBuf::from("data/counties.geojson"),
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 1600,
            height: 1000,
            format: ImageFormat::default(),
            excluded_states: DEFAULT_EXCLUDED_STATES.iter().map(|s| s.to_string()).collect(),
            allocation_charts: false,
        }
    }
}

impl Config {
    /// Load from `$SOYMAP_CONFIG`, else `soymap.toml` in the working
    /// directory. A missing default file yields the defaults; a missing file
    /// named through the environment is an error.
    pub fn load() -> Result<Self, ConfigError> {
        match env::var(CONFIG_ENV_VAR) {
            Ok(path) if !path.trim().is_empty() => Self::load_from(Path::new(path.trim())),
            _ => {
                let path = Path::new(DEFAULT_CONFIG_FILE);
                if path.exists() {
                    Self::load_from(path)
                } else {
                    debug!("No {} found, using defaults", DEFAULT_CONFIG_FILE);
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|err| ConfigError::Read {
            path: path.to_path_buf(),
            err,
        })?;
        let config = Self::from_toml_str(&content)?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.render.width == 0 || self.render.height == 0 {
            return Err(ConfigError::Invalid("render width and height must be positive".to_string()));
        }
        if let Some(specs) = &self.visualizations {
            if specs.is_empty() {
                return Err(ConfigError::Invalid("visualizations list is empty".to_string()));
            }
            for spec in specs {
                if spec.file.contains(&['/', '\\'][..]) {
                    return Err(ConfigError::Invalid(format!(
                        "visualization file '{}' must be a bare file name",
                        spec.file
                    )));
                }
            }
        }
        Ok(())
    }

    /// Visualisations to render this run.
    pub fn visualizations(&self) -> Vec<VisualizationSpec> {
        match &self.visualizations {
            Some(specs) => specs.clone(),
            None => default_visualizations(self.render.format, self.render.allocation_charts),
        }
    }

    pub fn renderer(&self) -> Renderer {
        Renderer::new(
            self.render.width,
            self.render.height,
            self.render.excluded_states.clone(),
        )
    }
}
