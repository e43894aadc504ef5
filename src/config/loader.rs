use super::Config;
use crate::error::ConfigError;
use anyhow::{Context, Result};
use directories::UserDirs;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

impl Config {
    pub fn load_or_init() -> Result<Self> {
        let home = UserDirs::new()
            .map(|u| u.home_dir().to_path_buf())
            .context("Could not find home directory")?;
        Self::load_or_init_in(&home.join(".songsmith"))
    }

    /// Load `config.toml` from `root`, creating the directory layout and a
    /// default file on first run.
    pub fn load_or_init_in(root: &Path) -> Result<Self> {
        let config_path = root.join("config.toml");
        let workspace_dir = root.join("workspace");

        if !root.exists() {
            fs::create_dir_all(root).context("Failed to create .songsmith directory")?;
        }
        if !workspace_dir.exists() {
            fs::create_dir_all(&workspace_dir).context("Failed to create workspace directory")?;
        }

        let mut config = if config_path.exists() {
            let contents =
                fs::read_to_string(&config_path).context("Failed to read config file")?;
            let mut config: Config =
                toml::from_str(&contents).context("Failed to parse config file")?;
            config.config_path.clone_from(&config_path);
            config.workspace_dir = workspace_dir;
            config
        } else {
            let config = Self {
                config_path: config_path.clone(),
                workspace_dir,
                ..Self::default()
            };
            config.save()?;
            config
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let toml_str = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&self.config_path, toml_str).context("Failed to write config file")?;
        Ok(())
    }

    /// Reject catalogs that would only fail later at request time.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        let mut model_names = HashSet::new();
        for model in &self.models {
            if !model_names.insert(model.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "duplicate model name: {}",
                    model.name
                )));
            }
            if model.max_tokens == 0 {
                return Err(ConfigError::Validation(format!(
                    "model {} has max_tokens = 0",
                    model.name
                )));
            }
        }

        let mut tokens = HashSet::new();
        for user in &self.users {
            if user.token.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "user {} has an empty token",
                    user.id
                )));
            }
            if !tokens.insert(user.token.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "user {} reuses another user's token",
                    user.id
                )));
            }
        }

        if self.completion.stream_buffer == 0 {
            return Err(ConfigError::Validation(
                "completion.stream_buffer must be at least 1".into(),
            ));
        }

        Ok(())
    }
}
