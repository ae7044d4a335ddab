//! Locations and environment variable names used by callpad.

use std::path::PathBuf;

/// Overrides the state directory entirely.
pub const STATE_DIR_ENV_VAR: &str = "CALLPAD_STATE_DIR";

pub const XDG_DATA_HOME_ENV_VAR: &str = "XDG_DATA_HOME";

/// Sub directory created under `$XDG_DATA_HOME`.
pub const XDG_APP_DIR: &str = "callpad";

/// Fallback when no XDG data home is configured.
pub const DEFAULT_STATE_DIR: &str = "~/.callpad";

pub const LOG_LEVEL_ENV_VAR: &str = "CALLPAD_LOG_LEVEL";

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var_os(name)
        .and_then(|val| val.into_string().ok())
        .filter(|val| !val.is_empty())
}

/// Resolves the directory profiles are kept in: the override variable
/// first, then `$XDG_DATA_HOME/callpad`, then `~/.callpad`.
pub fn get_state_dir() -> PathBuf {
    if let Some(dir) = non_empty_var(STATE_DIR_ENV_VAR) {
        return PathBuf::from(shellexpand::tilde(&dir).to_string());
    }
    if let Some(dir) = non_empty_var(XDG_DATA_HOME_ENV_VAR) {
        return PathBuf::from(dir).join(XDG_APP_DIR);
    }
    PathBuf::from(shellexpand::tilde(DEFAULT_STATE_DIR).to_string())
}
