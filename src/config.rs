//! Configuration surface (§6).
//!
//! This crate only owns the shape of configuration, not how it is loaded.
//! Walking a config file and an environment-variable override chain is the
//! out-of-scope "configuration loading" collaborator (§1); a caller is free
//! to populate [`Config`] from `serde`-compatible sources (file, env,
//! CLI flags) and hand the result to [`crate::engine::Engine::open`].

use serde::{Deserialize, Serialize};

/// Recognized configuration options (§6's configuration table).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Ordered list of language columns materialized per node/region group.
    pub languages: Vec<String>,
    /// Path to write the container to (builder-only).
    pub output: String,
    /// Path to read the container from (server-only).
    pub database: String,
    /// Whether to load the forward index (trie + n-gram, C4+C5).
    pub enable_forward: bool,
    /// Whether to load the reverse index (k-d tree, C6).
    pub enable_reverse: bool,
    /// TCP port the bundled server binds to.
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            languages: Vec::new(),
            output: "places.db".to_string(),
            database: "places.db".to_string(),
            enable_forward: true,
            enable_reverse: true,
            port: 3000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.port, 3000);
        assert!(config.enable_forward);
        assert!(config.enable_reverse);
        assert!(config.languages.is_empty());
    }

    #[test]
    fn round_trips_through_json() {
        let config = Config {
            languages: vec!["en".to_string(), "de".to_string()],
            ..Config::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let restored: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.languages, config.languages);
        assert_eq!(restored.port, config.port);
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let restored: Config = serde_json::from_str(r#"{"port": 8080}"#).unwrap();
        assert_eq!(restored.port, 8080);
        assert!(restored.enable_forward);
    }
}
