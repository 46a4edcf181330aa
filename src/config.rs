//! Crate-wide defaults, config paths and user settings.
//!
//! Paths resolve in this order:
//! 1. CLI `--config-dir`
//! 2. `USDPROXY_CONFIG_DIR` environment variable
//! 3. Platform config directory from dirs-next
//!
//! Platform paths:
//! - Linux: ~/.config/usdproxy/{name}
//! - macOS: ~/Library/Application Support/usdproxy/{name}
//! - Windows: %APPDATA%\usdproxy\{name}

use anyhow::{Context, Result};
use const_format::concatcp;
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::usd::PurposeFilter;

pub const APP_NAME: &str = "usdproxy";
pub const SETTINGS_FILE: &str = concatcp!(APP_NAME, ".json");
pub const LOG_FILE: &str = concatcp!(APP_NAME, ".log");
pub const CONFIG_DIR_ENV: &str = "USDPROXY_CONFIG_DIR";

pub const DEFAULT_COMPLEXITY: i32 = 0;
pub const MAX_COMPLEXITY: i32 = 8;
pub const DEFAULT_TIME: f64 = 0.0;

pub const DEFAULT_DRAW_RENDER_PURPOSE: bool = false;
pub const DEFAULT_DRAW_PROXY_PURPOSE: bool = true;
pub const DEFAULT_DRAW_GUIDE_PURPOSE: bool = false;

/// Overrides for the default config location.
#[derive(Debug, Clone, Default)]
pub struct PathConfig {
    /// Custom config directory (from CLI or ENV)
    pub config_dir: Option<PathBuf>,
}

impl PathConfig {
    /// Priority: CLI args → ENV var → None (platform default)
    pub fn from_env_and_cli(cli_dir: Option<PathBuf>) -> Self {
        let config_dir = cli_dir.or_else(|| std::env::var(CONFIG_DIR_ENV).ok().map(PathBuf::from));
        Self { config_dir }
    }

    pub fn config_dir(&self) -> PathBuf {
        if let Some(dir) = &self.config_dir {
            return dir.clone();
        }
        if let Some(dir) = dirs_next::config_dir() {
            return dir.join(APP_NAME);
        }
        PathBuf::from(".")
    }

    pub fn config_file(&self, name: &str) -> PathBuf {
        self.config_dir().join(name)
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        let dir = self.config_dir();
        if !dir.exists() {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
        }
        Ok(())
    }
}

/// User settings (`usdproxy.json`). Unknown fields are ignored, missing
/// ones take defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub complexity: i32,
    pub draw_render_purpose: bool,
    pub draw_proxy_purpose: bool,
    pub draw_guide_purpose: bool,
    /// env_logger filter used when no -v flag is given, e.g. "usdproxy=debug"
    pub log_filter: Option<String>,
    /// Extra directories searched for relative asset paths.
    pub search_paths: Vec<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            complexity: DEFAULT_COMPLEXITY,
            draw_render_purpose: DEFAULT_DRAW_RENDER_PURPOSE,
            draw_proxy_purpose: DEFAULT_DRAW_PROXY_PURPOSE,
            draw_guide_purpose: DEFAULT_DRAW_GUIDE_PURPOSE,
            log_filter: None,
            search_paths: Vec::new(),
        }
    }
}

impl Settings {
    /// Load from `path`; a missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let mut settings: Settings =
            serde_json::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))?;
        settings.complexity = settings.complexity.clamp(0, MAX_COMPLEXITY);
        Ok(settings)
    }

    pub fn load_default(paths: &PathConfig) -> Result<Self> {
        Self::load(&paths.config_file(SETTINGS_FILE))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))
    }

    pub fn purposes(&self) -> PurposeFilter {
        PurposeFilter {
            render: self.draw_render_purpose,
            proxy: self.draw_proxy_purpose,
            guide: self.draw_guide_purpose,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_file_with_custom_dir() {
        let config = PathConfig {
            config_dir: Some(PathBuf::from("/custom")),
        };
        assert_eq!(config.config_file("test.json"), PathBuf::from("/custom/test.json"));
    }

    #[test]
    fn test_platform_default_mentions_app() {
        let config = PathConfig { config_dir: None };
        let path = config.config_file(SETTINGS_FILE);
        assert!(path.to_string_lossy().contains("usdproxy.json"));
    }

    #[test]
    fn test_settings_missing_file_is_default() {
        let path = std::env::temp_dir().join("usdproxy_no_such_settings.json");
        let _ = std::fs::remove_file(&path);
        assert_eq!(Settings::load(&path).unwrap(), Settings::default());
    }

    #[test]
    fn test_settings_partial_and_clamped() {
        let dir = std::env::temp_dir().join(format!("usdproxy_settings_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(SETTINGS_FILE);
        std::fs::write(&path, r#"{ "complexity": 99, "draw_guide_purpose": true, "unknown": 1 }"#).unwrap();

        let s = Settings::load(&path).unwrap();
        assert_eq!(s.complexity, MAX_COMPLEXITY);
        assert!(s.purposes().guide);
        assert!(s.purposes().proxy);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
