//! Path resolution for labhost
//!
//! # Environment Variables
//!
//! - `LABHOST_CONFIG_DIR` - Override config directory (e.g., `~/dotfiles/labhost`)
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `LABHOST_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/labhost` (if set)
//! 3. `~/.config/labhost`

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "LABHOST_CONFIG_DIR";

/// Inventory file name inside the config directory
pub const INVENTORY_FILE: &str = "inventory.toml";

/// Get the labhost config directory path
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = expand(&dir);
        log::debug!(
            "Using config dir from {}: {}",
            ENV_CONFIG_DIR,
            path.display()
        );
        return Ok(path);
    }

    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(xdg_config).join("labhost");
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".config").join("labhost");
    log::debug!("Using default config dir: {}", path.display());
    Ok(path)
}

/// Default inventory location
pub fn inventory_file() -> Result<PathBuf> {
    Ok(config_dir()?.join(INVENTORY_FILE))
}

/// Expand ~ and environment variables in a path string.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    /// Run `f` with `key` set to `value`, restoring the previous value after.
    fn with_env_var<F, R>(key: &str, value: &str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let original = env::var(key).ok();
        // SAFETY: Tests run in isolation and don't read env vars concurrently
        unsafe { env::set_var(key, value) };
        let result = f();
        match original {
            // SAFETY: Tests run in isolation
            Some(v) => unsafe { env::set_var(key, v) },
            None => unsafe { env::remove_var(key) },
        }
        result
    }

    #[test]
    fn test_config_dir_env_override() {
        with_env_var(ENV_CONFIG_DIR, "/custom/labhost", || {
            assert_eq!(config_dir().unwrap(), PathBuf::from("/custom/labhost"));
            assert_eq!(
                inventory_file().unwrap(),
                PathBuf::from("/custom/labhost/inventory.toml")
            );
        });
    }

    #[test]
    fn test_config_dir_env_override_with_tilde() {
        let home = dirs::home_dir().unwrap();
        with_env_var(ENV_CONFIG_DIR, "~/dotfiles/labhost-tilde-test", || {
            assert_eq!(
                config_dir().unwrap(),
                home.join("dotfiles").join("labhost-tilde-test")
            );
        });
    }

    #[test]
    fn test_expand_absolute() {
        assert_eq!(expand("/absolute/path"), PathBuf::from("/absolute/path"));
    }

    #[test]
    fn test_expand_unknown_env_var_unchanged() {
        let result = expand("/path/$NONEXISTENT_LABHOST_VAR/file");
        assert_eq!(result, PathBuf::from("/path/$NONEXISTENT_LABHOST_VAR/file"));
    }
}
