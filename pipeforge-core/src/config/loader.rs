use std::{fs, path::Path};

use super::ExecutionConfig;
use crate::{
    config_error,
    core::{ErrorContext, Result},
};

/// Configuration file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML configuration format
    Toml,
    /// JSON configuration format
    Json,
}

impl ConfigFormat {
    /// Determine configuration format from file extension
    pub fn from_extension(path: &Path) -> Self {
        match path.extension().and_then(|s| s.to_str()) {
            Some("json") => ConfigFormat::Json,
            _ => ConfigFormat::Toml, // Default
        }
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<ExecutionConfig> {
    if !path.exists() {
        return Err(config_error!(
            "Configuration file not found: {}",
            path.display()
        ));
    }

    let content = fs::read_to_string(path).with_context(&path.display().to_string())?;
    let config = match ConfigFormat::from_extension(path) {
        ConfigFormat::Toml => load_toml_config(&content),
        ConfigFormat::Json => ExecutionConfig::from_json_str(&content),
    }
    .with_context(&path.display().to_string())?;

    tracing::info!(
        path = %path.display(),
        max_concurrent_generations = config.max_concurrent_generations,
        "Loaded execution configuration"
    );
    Ok(config)
}

#[cfg(feature = "toml-support")]
fn load_toml_config(content: &str) -> Result<ExecutionConfig> {
    ExecutionConfig::from_toml_str(content)
}

#[cfg(not(feature = "toml-support"))]
fn load_toml_config(_content: &str) -> Result<ExecutionConfig> {
    Err(config_error!(
        "TOML support is disabled. Solution: enable the `toml-support` feature"
    ))
}
