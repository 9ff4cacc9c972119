mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config = parse_config(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    Ok(config)
}

/// Parse and validate configuration text
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content)?;
    validate_config(&config)?;
    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = ["./reelplay.toml", "~/.config/reelplay/config.toml"];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            tracing::debug!("Using config file {:?}", path);
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Validate configuration
fn validate_config(config: &Config) -> Result<()> {
    if config.export.frame_stride == 0 {
        anyhow::bail!("export.frame_stride cannot be 0");
    }

    if config.decode.max_tree_nodes == 0 {
        anyhow::bail!("decode.max_tree_nodes cannot be 0");
    }

    if config.decode.max_part_size == 0 {
        anyhow::bail!("decode.max_part_size cannot be 0");
    }

    if let Some(end) = config.playback.end_time_ms {
        if end <= config.playback.start_ms {
            tracing::warn!(
                "playback.end_time_ms ({}) is not after start_ms ({}); nothing will play",
                end,
                config.playback.start_ms
            );
        }
    }

    Ok(())
}
