use aries::StageConfig;
use std::{
    fs,
    path::{Path, PathBuf},
};

const ENV_PREFIX: &str = "ARIES";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found at {path}")]
    FileNotFound { path: PathBuf },

    #[error("Failed to load configuration: {source}")]
    LoadError { source: config::ConfigError },

    #[error("Failed to serialize configuration: {source}")]
    SerializeError { source: toml::ser::Error },

    #[error("Failed to write configuration file: {source}")]
    WriteError { source: std::io::Error },

    #[error("Configuration validation failed: {message}")]
    ValidationError { message: String },
}

#[derive(Debug)]
pub struct ConfigOptions {
    pub config_path: PathBuf,
    /// Fail instead of falling back to defaults when the file is absent.
    pub require_file: bool,
}

impl Default for ConfigOptions {
    fn default() -> Self {
        Self {
            config_path: Self::default_config_path(),
            require_file: false,
        }
    }
}

impl ConfigOptions {
    pub fn default_config_path() -> PathBuf {
        std::env::var("CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("aries.toml"))
    }

    pub fn with_path<P: AsRef<Path>>(path: P) -> Self {
        Self {
            config_path: path.as_ref().to_path_buf(),
            ..Default::default()
        }
    }
}

#[derive(Debug)]
pub struct ConfigManager {
    options: ConfigOptions,
}

impl ConfigManager {
    pub fn new() -> Self {
        Self {
            options: ConfigOptions::default(),
        }
    }

    pub fn with_options(options: ConfigOptions) -> Self {
        Self { options }
    }

    pub fn path(&self) -> &Path {
        &self.options.config_path
    }

    /// Reads the TOML file (if present) and applies `ARIES_*` environment
    /// overrides on top of the defaults.
    pub fn load(&self) -> Result<StageConfig, ConfigError> {
        let config_path = &self.options.config_path;

        if self.options.require_file && !config_path.exists() {
            return Err(ConfigError::FileNotFound {
                path: config_path.clone(),
            });
        }
        if !config_path.exists() {
            tracing::debug!(path = %config_path.display(), "No configuration file, using defaults");
        }

        let stage: StageConfig = config::Config::builder()
            .add_source(
                config::File::from(config_path.as_path())
                    .format(config::FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|settings| settings.try_deserialize())
            .map_err(|source| ConfigError::LoadError { source })?;

        stage
            .validate()
            .map_err(|message| ConfigError::ValidationError { message })?;

        Ok(stage)
    }

    pub fn save(&self, config: &StageConfig) -> Result<(), ConfigError> {
        let config_path = &self.options.config_path;

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError { source: e })?;
        }

        let content = toml::to_string_pretty(config)
            .map_err(|e| ConfigError::SerializeError { source: e })?;

        fs::write(config_path, content).map_err(|e| ConfigError::WriteError { source: e })?;

        Ok(())
    }
}

pub fn init_config() -> anyhow::Result<(ConfigManager, StageConfig)> {
    let manager = ConfigManager::new();
    let config = manager.load()?;
    Ok((manager, config))
}

pub fn create_default_config<P: AsRef<Path>>(path: Option<P>) -> anyhow::Result<PathBuf> {
    let config_path = path
        .map(|p| p.as_ref().to_path_buf())
        .unwrap_or_else(ConfigOptions::default_config_path);

    let manager = ConfigManager::with_options(ConfigOptions::with_path(&config_path));
    manager.save(&StageConfig::default())?;

    Ok(config_path)
}
