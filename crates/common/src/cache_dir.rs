//! Resolves the host CLI's cache directory, which rooted both the plugin
//! store and the plugin catalog.

use anyhow::{anyhow, Result};
use std::path::PathBuf;

/// Environment variable that overrides the cache directory used by the
/// plugin manager, primarily for tests.
pub const CACHE_DIR_ENV: &str = "PLUGIN_CACHE_DIR";

/// Return the default cache directory the host CLI maintains. The plugin
/// manager roots the plugin-binary store and the installed-plugin catalog
/// here, under `plugins/` and `catalog/` respectively.
pub fn cache_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(CACHE_DIR_ENV) {
        return Ok(PathBuf::from(dir));
    }

    let dir = dirs::cache_dir()
        .or_else(|| dirs::home_dir().map(|p| p.join(".cache")))
        .ok_or_else(|| anyhow!("Unable to get local cache directory or home directory"))?;
    Ok(dir.join("plugin-manager"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_override_wins() {
        std::env::set_var(CACHE_DIR_ENV, "/tmp/example-cache");
        assert_eq!(cache_dir().unwrap(), PathBuf::from("/tmp/example-cache"));
        std::env::remove_var(CACHE_DIR_ENV);
    }
}
