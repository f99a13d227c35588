//! Configuration file discovery.
//!
//! `chatpipe.toml` is searched upward from the starting directory; the
//! first hit wins. A missing file is not an error; defaults apply.

use camino::Utf8Path;
use std::fs;
use tracing::debug;

use crate::model::Config;
use crate::validation::ConfigError;

/// Filename searched for during discovery.
pub const CONFIG_FILE_NAME: &str = "chatpipe.toml";

/// Discover and load configuration starting at `start_dir`.
///
/// The environment is frozen into the returned record
/// ([`Config::freeze_env`]); validation is left to the caller so CLI
/// overrides can be merged first.
///
/// # Errors
///
/// Returns an error if a discovered file cannot be read or parsed.
pub fn discover(start_dir: &Utf8Path) -> Result<Config, ConfigError> {
    let mut config = match find_config_file(start_dir) {
        Some(path) => {
            debug!(config_file = %path, "Loading configuration file");
            let content = fs::read_to_string(path.as_std_path()).map_err(|e| {
                ConfigError::Read {
                    path: path.to_string(),
                    reason: e.to_string(),
                }
            })?;
            Config::from_toml_str(&content)?
        }
        None => Config::default(),
    };
    config.freeze_env();
    Ok(config)
}

fn find_config_file(start_dir: &Utf8Path) -> Option<camino::Utf8PathBuf> {
    let mut dir = Some(start_dir);
    while let Some(current) = dir {
        let candidate = current.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            return Some(candidate);
        }
        dir = current.parent();
    }
    None
}
