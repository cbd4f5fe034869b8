//! Engine configuration loading for the CLI

use anyhow::{Context, Result};
use insight_lib::EngineConfig;
use std::path::{Path, PathBuf};

/// Environment variables with this prefix override file values,
/// e.g. `INSIGHT__ANOMALY__THRESHOLD=2.5`
const ENV_PREFIX: &str = "INSIGHT";

/// Load configuration from an explicit file, or the default file when present,
/// layered under `INSIGHT__` environment variables
pub fn load(path: Option<&Path>) -> Result<EngineConfig> {
    let mut builder = config::Config::builder();

    match path {
        Some(path) => {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        None => {
            if let Some(default) = default_path() {
                builder = builder.add_source(config::File::from(default).required(false));
            }
        }
    }

    let settings = builder
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("Failed to read configuration")?;

    let engine_config: EngineConfig = settings
        .try_deserialize()
        .context("Failed to parse configuration")?;
    engine_config
        .validate()
        .context("Invalid configuration")?;
    Ok(engine_config)
}

/// `~/.config/fleet-insight/config.toml`
pub fn default_path() -> Option<PathBuf> {
    let home = dirs_next::home_dir()?;
    Some(home.join(".config").join("fleet-insight").join("config.toml"))
}
