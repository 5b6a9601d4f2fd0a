use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {config_path}: {source}")]
    ConfigReadError {
        config_path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {config_path}: {source}")]
    ConfigParseError {
        config_path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid value in config file at {config_path}: {message}")]
    InvalidValue {
        config_path: PathBuf,
        message: String,
    },
}

/// Trigger settings of one suggestion plugin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerConfig {
    pub trigger: char,
    #[serde(default)]
    pub start_of_line: bool,
    #[serde(default)]
    pub close_on_empty: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestionConfig {
    #[serde(default = "SuggestionConfig::default_mentions")]
    pub mentions: TriggerConfig,
    #[serde(default = "SuggestionConfig::default_slash")]
    pub slash: TriggerConfig,
}

impl SuggestionConfig {
    fn default_mentions() -> TriggerConfig {
        TriggerConfig {
            trigger: '@',
            start_of_line: false,
            close_on_empty: false,
        }
    }

    fn default_slash() -> TriggerConfig {
        TriggerConfig {
            trigger: '/',
            start_of_line: true,
            close_on_empty: false,
        }
    }
}

impl Default for SuggestionConfig {
    fn default() -> Self {
        Self {
            mentions: Self::default_mentions(),
            slash: Self::default_slash(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResizeConfig {
    pub min_width: u32,
    pub max_width: u32,
}

impl Default for ResizeConfig {
    fn default() -> Self {
        Self {
            min_width: 100,
            max_width: 1000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputRulesConfig {
    pub emoji: bool,
    pub spaghetto: bool,
}

impl Default for InputRulesConfig {
    fn default() -> Self {
        Self {
            emoji: true,
            spaghetto: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEntry {
    pub id: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MentionsConfig {
    /// Replaces the built-in demo users when non-empty
    #[serde(default)]
    pub users: Vec<UserEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub suggestion: SuggestionConfig,
    pub resize: ResizeConfig,
    pub input_rules: InputRulesConfig,
    pub mentions: MentionsConfig,
}

impl Config {
    pub fn load_from_path<P: AsRef<Path>>(config_path: P) -> Result<Option<Self>, ConfigError> {
        let config_path = config_path.as_ref();
        if !config_path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(config_path).map_err(|source| {
            ConfigError::ConfigReadError {
                config_path: config_path.to_path_buf(),
                source,
            }
        })?;

        let config: Config =
            toml::from_str(&content).map_err(|source| ConfigError::ConfigParseError {
                config_path: config_path.to_path_buf(),
                source,
            })?;

        config.validate(config_path)?;
        Ok(Some(config))
    }

    pub fn load() -> Result<Option<Self>, ConfigError> {
        let config_path = Self::config_path();
        Self::load_from_path(&config_path)
    }

    /// Load the user's config, falling back to defaults when there is none
    pub fn load_or_default() -> Result<Self, ConfigError> {
        Ok(Self::load()?.unwrap_or_default())
    }

    pub fn save_to_path<P: AsRef<Path>>(&self, config_path: P) -> anyhow::Result<()> {
        let config_path = config_path.as_ref();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        self.save_to_path(&config_path)
    }

    pub fn config_path() -> PathBuf {
        let config_dir = shellexpand::tilde("~/.config/plume");
        PathBuf::from(config_dir.as_ref()).join("config.toml")
    }

    fn validate(&self, config_path: &Path) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            config_path: config_path.to_path_buf(),
            message,
        };
        if self.resize.min_width > self.resize.max_width {
            return Err(invalid(format!(
                "resize.min_width ({}) is greater than resize.max_width ({})",
                self.resize.min_width, self.resize.max_width
            )));
        }
        let (mentions, slash) = (&self.suggestion.mentions, &self.suggestion.slash);
        if mentions.trigger == slash.trigger {
            return Err(invalid(format!(
                "mentions and slash commands share the trigger '{}'",
                mentions.trigger
            )));
        }
        if [mentions.trigger, slash.trigger]
            .iter()
            .any(|c| c.is_whitespace())
        {
            return Err(invalid("suggestion triggers cannot be whitespace".to_string()));
        }
        Ok(())
    }
}
