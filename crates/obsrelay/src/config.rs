//! CLI config helpers.
//!
//! Re-exports the shared config crate and resolves which file to use.

use std::path::PathBuf;

pub use obsrelay_config::{Config, config_path, load_config_from};

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// `--config` / `OBSRELAY_CONFIG`, else the platform default.
pub fn resolve_path(global: &GlobalOpts) -> PathBuf {
    global.config.clone().unwrap_or_else(config_path)
}

/// Load the config for this invocation, returning the path it came from
/// so tenant updates are written back to the same file.
pub fn load(global: &GlobalOpts) -> Result<(Config, PathBuf), CliError> {
    let path = resolve_path(global);
    let config = load_config_from(&path)?;
    Ok((config, path))
}
