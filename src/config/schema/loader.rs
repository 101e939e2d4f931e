use super::Config;
use crate::error::ConfigError;
use directories::UserDirs;
use std::fs;
use std::path::{Path, PathBuf};

impl Config {
    /// `~/.hostconverge/config.toml`, or `None` without a home directory.
    pub fn default_path() -> Option<PathBuf> {
        UserDirs::new().map(|u| u.home_dir().join(".hostconverge").join("config.toml"))
    }

    /// Loads `explicit`, else the default path, then applies environment
    /// overrides and validates.
    ///
    /// A missing default file means defaults; a missing explicit file is an
    /// error. Nothing is ever written back.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match explicit {
            Some(path) => Self::read(path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::read(&path)?,
                _ => Self::default(),
            },
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let load_err = |message: String| ConfigError::Load {
            path: path.to_path_buf(),
            message,
        };

        let contents = fs::read_to_string(path).map_err(|e| load_err(e.to_string()))?;
        let mut config: Config = toml::from_str(&contents).map_err(|e| load_err(e.to_string()))?;
        config.config_path = Some(path.to_path_buf());
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }
}
