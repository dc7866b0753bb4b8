// SPDX-License-Identifier: GPL-3.0-only

//! The configuration surface the rest of the crate consumes. Parsing the
//! real INI config format is out of scope (an external collaborator's
//! job); this only defines the `Config` struct such a loader assembles,
//! plus a minimal `toml`-based loader for local dev/testing.

use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub vwidth: i32,
    pub vheight: i32,
    pub plugins: Vec<String>,
    pub plugin_path_prefix: String,
    pub shadersrc: String,
    pub close_top_view: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            vwidth: 3,
            vheight: 3,
            plugins: vec!["move".into(), "resize".into(), "switcher".into()],
            plugin_path_prefix: String::new(),
            shadersrc: String::new(),
            close_top_view: "<super> KEY_Q".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct InputConfig {
    pub modifier: String,
    pub natural_scroll: bool,
    pub tap_to_click: bool,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct WorkaroundsConfig {
    pub force_server_side_decoration: bool,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct OutputConfig {
    pub mode: Option<String>,
    pub position: Option<(i32, i32)>,
    pub scale: Option<f64>,
    pub transform: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct InputDeviceConfig {
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub core: CoreConfig,
    pub input: InputConfig,
    pub workarounds: WorkaroundsConfig,
    #[serde(rename = "output")]
    pub outputs: std::collections::HashMap<String, OutputConfig>,
    #[serde(rename = "input-device")]
    pub input_devices: std::collections::HashMap<String, InputDeviceConfig>,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io { path: String, source: std::io::Error },
    #[error("failed to parse config file {path}: {source}")]
    Parse { path: String, source: toml::de::Error },
}

/// Dev-convenience loader layered below the `Config` surface: loads a
/// `.toml` file into the same struct the real INI loader is meant to
/// populate. Not a substitute for that loader's grammar or section
/// semantics — just enough to exercise the rest of the crate without it.
pub fn load_toml(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path_ref = path.as_ref();
    let text = std::fs::read_to_string(path_ref).map_err(|source| ConfigError::Io {
        path: path_ref.display().to_string(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path_ref.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_documented_defaults() {
        let config = Config::default();
        assert_eq!(config.core.vwidth, 3);
        assert_eq!(config.core.vheight, 3);
        assert!(config.core.plugins.contains(&"move".to_string()));
    }

    #[test]
    fn partial_toml_falls_back_to_defaults_for_missing_fields() {
        let parsed: Config = toml::from_str("[core]\nvwidth = 5\n").unwrap();
        assert_eq!(parsed.core.vwidth, 5);
        assert_eq!(parsed.core.vheight, 3, "unspecified field keeps its default");
    }

    #[test]
    fn missing_config_file_surfaces_as_io_error() {
        let err = load_toml("/nonexistent/path/to/tessera.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
