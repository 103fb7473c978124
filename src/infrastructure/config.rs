use crate::domain::{config::ComTermConfig, error::{ComTermError, ComTermResult}};
use std::fs;
use std::path::{Path, PathBuf};

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a manager for the per-user configuration file
    pub fn new() -> ComTermResult<Self> {
        Ok(Self {
            config_path: Self::default_config_path()?,
        })
    }

    /// Create a manager for an explicit configuration file
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: path.into(),
        }
    }

    /// Load configuration, falling back to defaults when the file is missing
    pub fn load_config(&self) -> ComTermResult<ComTermConfig> {
        if !self.config_path.exists() {
            return Ok(ComTermConfig::default());
        }
        self.load_config_from_path(&self.config_path)
    }

    /// Save configuration, creating the directory if needed
    pub fn save_config(&self, config: &ComTermConfig) -> ComTermResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent).map_err(|e| ComTermError::Config {
                message: format!("Failed to create config directory: {}", e),
            })?;
        }
        self.save_config_to_path(&self.config_path, config)
    }

    /// Write a default configuration file. Refuses to overwrite an existing one.
    pub fn init_config(&self) -> ComTermResult<&Path> {
        if self.config_path.exists() {
            return Err(ComTermError::Config {
                message: format!(
                    "Configuration already exists at {}",
                    self.config_path.display()
                ),
            });
        }
        self.save_config(&ComTermConfig::default())?;
        Ok(&self.config_path)
    }

    /// Per-user configuration path
    fn default_config_path() -> ComTermResult<PathBuf> {
        let home = dirs::home_dir().ok_or_else(|| ComTermError::Config {
            message: "Could not determine home directory".to_string(),
        })?;

        Ok(home.join(".config").join("comterm").join("config.toml"))
    }

    /// Load configuration from specific path
    pub fn load_config_from_path(&self, path: &Path) -> ComTermResult<ComTermConfig> {
        let content = fs::read_to_string(path).map_err(|e| ComTermError::Config {
            message: format!("Failed to read config file {}: {}", path.display(), e),
        })?;

        toml::from_str(&content).map_err(|e| ComTermError::Config {
            message: format!("Failed to parse config file {}: {}", path.display(), e),
        })
    }

    /// Save configuration to specific path
    pub fn save_config_to_path(&self, path: &Path, config: &ComTermConfig) -> ComTermResult<()> {
        let content = toml::to_string_pretty(config).map_err(|e| ComTermError::Config {
            message: format!("Failed to serialize config: {}", e),
        })?;

        fs::write(path, content).map_err(|e| ComTermError::Config {
            message: format!("Failed to write config file {}: {}", path.display(), e),
        })
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }
}
