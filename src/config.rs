//! Runtime configuration
//!
//! Defaults for every tunable, overridden from the environment after loading
//! a `.env` file when one exists.

use crate::agent::{BatchConfig, LoopConfig};
use crate::ai::{DEFAULT_MODEL, DEFAULT_SUBQUERY_MODEL};
use crate::analyzer::AnalyzerConfig;
use crate::vector::MemoryConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: '{value}' ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error(transparent)]
    Rules(#[from] crate::models::RuleSetError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SorterraConfig {
    #[serde(skip_serializing)]
    pub anthropic_api_key: Option<String>,
    pub model: String,
    pub subquery_model: String,
    pub memory_dir: PathBuf,
    pub rules_file: Option<PathBuf>,
    pub bucket: Option<String>,
    pub sharepoint_site_url: Option<String>,
    /// Document library name or server-relative URL for relative destinations
    pub sharepoint_library: Option<String>,
    #[serde(skip_serializing)]
    pub sharepoint_access_token: Option<String>,
    pub memory: MemoryConfig,
    pub analyzer: AnalyzerConfig,
    pub agent: LoopConfig,
    pub batch: BatchConfig,
}

impl Default for SorterraConfig {
    fn default() -> Self {
        Self {
            anthropic_api_key: None,
            model: DEFAULT_MODEL.to_string(),
            subquery_model: DEFAULT_SUBQUERY_MODEL.to_string(),
            memory_dir: default_memory_dir(),
            rules_file: None,
            bucket: None,
            sharepoint_site_url: None,
            sharepoint_library: None,
            sharepoint_access_token: None,
            memory: MemoryConfig::default(),
            analyzer: AnalyzerConfig::default(),
            agent: LoopConfig::default(),
            batch: BatchConfig::default(),
        }
    }
}

/// `<local data dir>/sorterra`, or the temp dir when there is none
pub fn default_memory_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("sorterra")
}

impl SorterraConfig {
    /// Load `.env` (if any), then read the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!("[Config] Loaded {}", path.display());
        }
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        config.anthropic_api_key = get("ANTHROPIC_API_KEY");
        if let Some(model) = get("SORTERRA_MODEL") {
            config.model = model;
        }
        if let Some(model) = get("SORTERRA_SUBQUERY_MODEL") {
            config.subquery_model = model;
        }
        if let Some(dir) = get("SORTERRA_MEMORY_DIR") {
            config.memory_dir = PathBuf::from(dir);
        }
        config.rules_file = get("SORTERRA_RULES_FILE").map(PathBuf::from);
        config.bucket = get("SORTERRA_BUCKET");
        config.sharepoint_site_url = get("SHAREPOINT_SITE_URL");
        config.sharepoint_library = get("SHAREPOINT_LIBRARY");
        config.sharepoint_access_token = get("SHAREPOINT_ACCESS_TOKEN");

        if let Some(value) = parse::<f32>(&get, "SORTERRA_MIN_CONFIDENCE")? {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid {
                    var: "SORTERRA_MIN_CONFIDENCE",
                    value: value.to_string(),
                    reason: "must be between 0 and 1".to_string(),
                });
            }
            config.memory.min_confidence = value;
        }
        if let Some(value) = parse(&get, "SORTERRA_MAX_RESULTS")? {
            config.memory.max_results = value;
        }
        if let Some(value) = parse(&get, "SORTERRA_MAX_STEPS")? {
            config.agent.max_steps = value;
        }
        if let Some(value) = parse(&get, "SORTERRA_ANALYZER_MAX_TURNS")? {
            config.analyzer.max_turns = value;
        }
        if let Some(value) = parse(&get, "SORTERRA_DIRECT_THRESHOLD_CHARS")? {
            config.analyzer.direct_threshold_chars = value;
        }
        if let Some(secs) = parse::<u64>(&get, "SORTERRA_INTER_FILE_DELAY_SECS")? {
            config.batch.inter_file_delay = Duration::from_secs(secs);
        }
        if let Some(secs) = parse::<u64>(&get, "SORTERRA_SESSION_TIMEOUT_SECS")? {
            config.batch.session_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }

        Ok(config)
    }

    /// Rules from `rules_file`, or the built-in default
    pub fn rule_set(&self) -> Result<crate::models::RuleSet, ConfigError> {
        match &self.rules_file {
            Some(path) => Ok(crate::models::RuleSet::from_file(path)?),
            None => Ok(crate::models::RuleSet::default()),
        }
    }
}

fn parse<T>(get: &impl Fn(&str) -> Option<String>, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(var) {
        None => Ok(None),
        Some(value) => value.parse::<T>().map(Some).map_err(|e| ConfigError::Invalid {
            var,
            reason: e.to_string(),
            value,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = SorterraConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.memory.min_confidence, 0.70);
        assert_eq!(config.memory.max_results, 5);
        assert_eq!(config.agent.max_steps, 10);
        assert_eq!(config.analyzer.max_turns, 25);
        assert_eq!(config.batch.inter_file_delay, Duration::from_secs(10));
        assert!(config.batch.session_timeout.is_none());
        assert!(config.memory_dir.ends_with("sorterra"));
        assert_eq!(config.rule_set().unwrap().name, "ACME Corp Enterprise Sort");
    }

    #[test]
    fn test_overrides() {
        let config = SorterraConfig::from_lookup(lookup(&[
            ("ANTHROPIC_API_KEY", " sk-test "),
            ("SORTERRA_MIN_CONFIDENCE", "0.8"),
            ("SORTERRA_MAX_STEPS", "4"),
            ("SORTERRA_INTER_FILE_DELAY_SECS", "0"),
            ("SORTERRA_SESSION_TIMEOUT_SECS", "120"),
            ("SORTERRA_BUCKET", "acme-inbox"),
            ("SORTERRA_MODEL", ""),
            ("SHAREPOINT_LIBRARY", "Contracts"),
        ]))
        .unwrap();

        assert_eq!(config.anthropic_api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.memory.min_confidence, 0.8);
        assert_eq!(config.agent.max_steps, 4);
        assert!(config.batch.inter_file_delay.is_zero());
        assert_eq!(config.batch.session_timeout, Some(Duration::from_secs(120)));
        assert_eq!(config.bucket.as_deref(), Some("acme-inbox"));
        assert_eq!(config.sharepoint_library.as_deref(), Some("Contracts"));
        // Empty values fall back to defaults
        assert_eq!(config.model, DEFAULT_MODEL);
    }

    #[test]
    fn test_invalid_values() {
        let err = SorterraConfig::from_lookup(lookup(&[("SORTERRA_MAX_STEPS", "many")])).unwrap_err();
        assert!(err.to_string().contains("SORTERRA_MAX_STEPS"));

        let err = SorterraConfig::from_lookup(lookup(&[("SORTERRA_MIN_CONFIDENCE", "1.5")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "SORTERRA_MIN_CONFIDENCE", .. }));
    }

    #[test]
    fn test_rules_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("rules.json");
        std::fs::write(&path, r#"{"name": "Legal", "rules": ["Contracts go to Legal/Contracts"]}"#).unwrap();

        let config = SorterraConfig::from_lookup(lookup(&[("SORTERRA_RULES_FILE", path.to_str().unwrap())])).unwrap();
        let rules = config.rule_set().unwrap();
        assert_eq!(rules.name, "Legal");
        assert_eq!(rules.rules.len(), 1);

        let config = SorterraConfig::from_lookup(lookup(&[("SORTERRA_RULES_FILE", "/no/such/rules.json")])).unwrap();
        assert!(matches!(config.rule_set(), Err(ConfigError::Rules(_))));
    }
}
