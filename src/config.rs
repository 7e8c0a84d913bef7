use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::format::{DialectPreset, FormatOptions};
use crate::transform::{FixtureInjector, JsonProjectionBuilder};

/// Engine settings, read from `config.toml`.
///
/// ```toml
/// [format]
/// preset = "postgres"
/// quote_identifiers = true
/// pretty = false
///
/// [fixtures]
/// quote_identifiers = false
///
/// [json]
/// use_jsonb = true
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub format: FormatOptions,
    pub fixtures: FixtureConfig,
    pub json: JsonConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixtureConfig {
    pub quote_identifiers: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JsonConfig {
    pub use_jsonb: bool,
    pub limit_single: bool,
}

impl Default for JsonConfig {
    fn default() -> Self {
        Self {
            use_jsonb: true,
            limit_single: true,
        }
    }
}

impl EngineConfig {
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sqlscope")
            .join("config.toml")
    }

    /// Load from `path`, or from the default location when `None`.
    /// A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(Self::default_path);
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Format options with the preset overridden when one is given.
    pub fn format_options(&self, preset: Option<DialectPreset>) -> FormatOptions {
        FormatOptions {
            preset: preset.unwrap_or(self.format.preset),
            ..self.format.clone()
        }
    }

    pub fn fixture_injector(&self) -> FixtureInjector {
        FixtureInjector::new(self.fixtures.quote_identifiers)
    }

    pub fn json_builder(&self) -> JsonProjectionBuilder {
        JsonProjectionBuilder::new()
            .use_jsonb(self.json.use_jsonb)
            .limit_single(self.json.limit_single)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_gives_defaults() {
        let config = EngineConfig::from_toml("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert!(config.format.quote_identifiers);
        assert!(config.json.use_jsonb);
    }

    #[test]
    fn test_partial_sections() {
        let config = EngineConfig::from_toml(
            "[format]\npreset = \"mysql\"\npretty = true\n\n[fixtures]\nquote_identifiers = true\n",
        )
        .unwrap();
        assert_eq!(config.format.preset, DialectPreset::MySql);
        assert!(config.format.pretty);
        assert!(config.format.quote_identifiers);
        assert!(config.fixtures.quote_identifiers);
    }

    #[test]
    fn test_unknown_preset_is_an_error() {
        assert!(EngineConfig::from_toml("[format]\npreset = \"oracle\"\n").is_err());
    }

    #[test]
    fn test_preset_override() {
        let config = EngineConfig::default();
        assert_eq!(
            config.format_options(Some(DialectPreset::Sqlite)).preset,
            DialectPreset::Sqlite
        );
        assert_eq!(config.format_options(None).preset, DialectPreset::Named);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let path = std::env::temp_dir().join("sqlscope-missing-config-test.toml");
        let _ = std::fs::remove_file(&path);
        assert_eq!(
            EngineConfig::load(Some(&path)).unwrap(),
            EngineConfig::default()
        );
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir()
            .join(format!("sqlscope-config-{}", std::process::id()))
            .join("config.toml");
        let mut config = EngineConfig::default();
        config.format.preset = DialectPreset::Postgres;
        config.json.use_jsonb = false;
        config.save(&path).unwrap();
        assert_eq!(EngineConfig::load(Some(&path)).unwrap(), config);
        let _ = std::fs::remove_file(&path);
    }
}
