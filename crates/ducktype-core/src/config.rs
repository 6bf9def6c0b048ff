use crate::error::DuckError;
use anyhow::{Context, Result};
use jsonschema::{validator_for, Validator};
use once_cell::sync::Lazy;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const ENV_CONFIG_PATH: &str = "DUCKTYPE_CONFIG";
pub const ENV_MAX_DEPTH: &str = "DUCKTYPE_MAX_DEPTH";

const DEFAULT_MAX_DEPTH: u32 = 16;

/// Engine options.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Maximum nesting depth followed when matching and adapting nested contracts.
    /// Deeper members are treated as absent.
    #[schemars(range(min = 1, max = 1024))]
    pub max_depth: u32,
    /// Register the text/uuid and int/float conversions.
    pub builtin_conversions: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            builtin_conversions: true,
        }
    }
}

static CONFIG_SCHEMA: Lazy<Result<Validator, String>> = Lazy::new(|| {
    validator_for(&config_schema_json()).map_err(|e| format!("config schema: {e}"))
});

/// Returns the JSON schema describing [`EngineConfig`].
pub fn config_schema_json() -> serde_json::Value {
    let schema = schemars::schema_for!(EngineConfig);
    serde_json::to_value(&schema).unwrap_or(serde_json::Value::Bool(true))
}

pub fn write_schema_file(path: impl AsRef<Path>) -> std::io::Result<()> {
    let schema_json = config_schema_json();
    std::fs::write(path, serde_json::to_string_pretty(&schema_json)?)
}

/// Reads and validates a TOML configuration file.
pub fn load_config(path: impl AsRef<Path>) -> Result<EngineConfig> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let cfg = EngineConfig::from_toml_str(&content)
        .with_context(|| format!("loading {}", path.display()))?;
    Ok(cfg)
}

impl EngineConfig {
    /// Parses TOML, checking it against [`config_schema_json`] first.
    pub fn from_toml_str(content: &str) -> Result<Self, DuckError> {
        let raw: toml::Value =
            toml::from_str(content).map_err(|e| DuckError::Config(e.to_string()))?;
        let json_value =
            serde_json::to_value(&raw).map_err(|e| DuckError::Config(e.to_string()))?;
        let validator = CONFIG_SCHEMA.as_ref().map_err(|e| DuckError::Config(e.clone()))?;
        let validation_errors: Vec<_> = validator
            .iter_errors(&json_value)
            .map(|e| e.to_string())
            .collect();
        if !validation_errors.is_empty() {
            return Err(DuckError::Config(validation_errors.join(", ")));
        }
        let cfg: EngineConfig =
            toml::from_str(content).map_err(|e| DuckError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Loads from the process environment: `DUCKTYPE_CONFIG` names a TOML file and
    /// `DUCKTYPE_MAX_DEPTH` overrides its depth.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`EngineConfig::from_env`] with an explicit variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut cfg = match lookup(ENV_CONFIG_PATH).filter(|p| !p.trim().is_empty()) {
            Some(path) => load_config(path.trim())?,
            None => EngineConfig::default(),
        };
        if let Some(raw) = lookup(ENV_MAX_DEPTH) {
            cfg.max_depth = raw
                .trim()
                .parse::<u32>()
                .with_context(|| format!("{ENV_MAX_DEPTH}={raw:?} is not a depth"))?;
        }
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), DuckError> {
        if self.max_depth == 0 {
            return Err(DuckError::Config("max_depth must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn defaults_apply_to_empty_document() {
        let cfg = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(cfg, EngineConfig::default());
        assert_eq!(cfg.max_depth, 16);
        assert!(cfg.builtin_conversions);
    }

    #[test]
    fn schema_rejects_unknown_and_mistyped_keys() {
        let err = EngineConfig::from_toml_str("max_depth = \"deep\"").unwrap_err();
        assert!(matches!(err, DuckError::Config(_)));
        assert!(EngineConfig::from_toml_str("colour = 1").is_err());
        assert!(EngineConfig::from_toml_str("max_depth = 0").is_err());
    }

    #[test]
    fn schema_lists_fields() {
        let schema = config_schema_json();
        let props = schema["properties"].as_object().unwrap();
        assert!(props.contains_key("max_depth"));
        assert!(props.contains_key("builtin_conversions"));
    }

    #[test]
    fn load_from_file_and_env_overlay() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ducktype.toml");
        std::fs::write(&path, "max_depth = 4\nbuiltin_conversions = false\n").unwrap();

        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.max_depth, 4);
        assert!(!cfg.builtin_conversions);

        let vars: HashMap<&str, String> = HashMap::from([
            (ENV_CONFIG_PATH, path.to_string_lossy().into_owned()),
            (ENV_MAX_DEPTH, " 9 ".to_string()),
        ]);
        let cfg = EngineConfig::from_lookup(|k| vars.get(k).cloned()).unwrap();
        assert_eq!(cfg.max_depth, 9);
        assert!(!cfg.builtin_conversions);
    }

    #[test]
    fn bad_env_values_are_reported() {
        assert!(EngineConfig::from_lookup(|k| (k == ENV_MAX_DEPTH).then(|| "lots".into())).is_err());
        assert!(EngineConfig::from_lookup(|k| (k == ENV_MAX_DEPTH).then(|| "0".into())).is_err());
        assert!(
            EngineConfig::from_lookup(|k| (k == ENV_CONFIG_PATH).then(|| "/nonexistent/ducktype.toml".into()))
                .is_err()
        );
        assert_eq!(EngineConfig::from_lookup(|_| None).unwrap(), EngineConfig::default());
    }

    #[test]
    fn schema_file_is_written() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("schema.json");
        write_schema_file(&path).unwrap();
        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written, config_schema_json());
    }
}
