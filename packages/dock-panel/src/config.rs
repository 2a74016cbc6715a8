//! Startup configuration.
//!
//! Read from `$XDG_CONFIG_HOME/dock-panel/config.json`. Every field is
//! optional; command-line flags override the file.

use dock_core::context::DEFAULT_ICON_SIZE;
use dock_core::{DisplayMode, DockPosition};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding the configured bridge command
pub const BRIDGE_ENV: &str = "DOCK_BRIDGE";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct DockConfig {
    /// Bridge program and arguments
    pub bridge: Vec<String>,
    pub display_mode: DisplayMode,
    pub position: DockPosition,
    pub icon_size: u32,
    /// Searched after the default plugin directories
    pub plugin_dirs: Vec<PathBuf>,
    pub builtin_plugins: bool,
    /// Item preferences file; defaults to `settings.json` next to this file
    pub settings: Option<PathBuf>,
    pub emit_interval_ms: u64,
}

impl Default for DockConfig {
    fn default() -> Self {
        Self {
            bridge: vec!["dock-bridge".to_string()],
            display_mode: DisplayMode::Fashion,
            position: DockPosition::Bottom,
            icon_size: DEFAULT_ICON_SIZE,
            plugin_dirs: Vec::new(),
            builtin_plugins: true,
            settings: None,
            emit_interval_ms: 16,
        }
    }
}

impl DockConfig {
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("dock-panel")
            .join("config.json")
    }

    /// Load `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, String> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(format!("Failed to read {}: {}", path.display(), e)),
        };
        Self::parse(&text).map_err(|e| format!("Invalid config {}: {}", path.display(), e))
    }

    pub fn parse(text: &str) -> Result<Self, String> {
        serde_json::from_str(text).map_err(|e| e.to_string())
    }

    /// Apply a `DOCK_BRIDGE`-style override: a whitespace separated command line.
    pub fn override_bridge(&mut self, command: Option<&str>) {
        let Some(command) = command else { return };
        let parts: Vec<String> = command.split_whitespace().map(str::to_string).collect();
        if parts.is_empty() {
            tracing::warn!("ignoring empty bridge override");
            return;
        }
        self.bridge = parts;
    }

    pub fn emit_interval(&self) -> Duration {
        Duration::from_millis(self.emit_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = DockConfig::parse(r#"{"display-mode":"efficient","plugin-dirs":["/opt/dock/plugins"]}"#).unwrap();
        assert_eq!(config.display_mode, DisplayMode::Efficient);
        assert_eq!(config.plugin_dirs, vec![PathBuf::from("/opt/dock/plugins")]);
        assert_eq!(config.position, DockPosition::Bottom);
        assert_eq!(config.icon_size, DEFAULT_ICON_SIZE);
        assert!(config.builtin_plugins);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        assert!(DockConfig::parse(r#"{"position":"middle"}"#).is_err());
        assert!(DockConfig::parse("[").is_err());
    }

    #[test]
    fn test_missing_file_is_default() {
        let config = DockConfig::load(Path::new("/nonexistent/dock-panel/config.json")).unwrap();
        assert_eq!(config, DockConfig::default());
    }

    #[test]
    fn test_bridge_override() {
        let mut config = DockConfig::default();
        config.override_bridge(Some("python3 -m dockbridge --verbose"));
        assert_eq!(config.bridge, vec!["python3", "-m", "dockbridge", "--verbose"]);

        config.override_bridge(Some("   "));
        config.override_bridge(None);
        assert_eq!(config.bridge.len(), 4);
    }
}
