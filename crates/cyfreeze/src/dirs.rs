//! Platform directories used by cyfreeze

use std::path::PathBuf;

use etcetera::{BaseStrategy, choose_base_strategy};

/// Name of both the user-level and the project-level config file
pub const CONFIG_FILE_NAME: &str = "cyfreeze.toml";

/// Location of the user-level config file, if a home directory can be found
///
/// Uses XDG directories on Linux/macOS and `%APPDATA%` on Windows.
pub fn user_config_file() -> Option<PathBuf> {
    let strategy = choose_base_strategy().ok()?;
    Some(strategy.config_dir().join("cyfreeze").join(CONFIG_FILE_NAME))
}
