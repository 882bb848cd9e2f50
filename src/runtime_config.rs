//! # Runtime Configuration Module
//!
//! Engine behaviour that is decided per deployment rather than per route.
//!
//! ## Environment Variables
//!
//! ### `BRRTFN_DEBUG`
//!
//! When `true`/`1`, server-error responses carry the failure's message
//! instead of a generic `"Internal Server Error"`. Default: `false`.
//!
//! ### `BRRTFN_REQUEST_TIMEOUT_MS`
//!
//! Upper bound, in milliseconds, on dependency resolution plus handler
//! execution for one request. On expiry the in-flight work is dropped, every
//! registered finalizer still runs, and the request fails with a server
//! error. Unset or `0` disables the bound.
//!
//! ### `BRRTFN_SCHEMA_CACHE`
//!
//! `off`/`false`/`0` disables the compiled-schema cache. Default: on.
//!
//! ## File configuration
//!
//! [`EngineConfig::from_yaml_file`] reads the same settings from YAML;
//! environment variables, when set, override the file:
//!
//! ```yaml
//! debug: false
//! request_timeout_ms: 2500
//! schema_cache: true
//! ```

use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub debug: bool,
    pub request_timeout_ms: Option<u64>,
    pub schema_cache: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debug: false,
            request_timeout_ms: None,
            schema_cache: true,
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl EngineConfig {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().apply_overrides(|key| env::var(key).ok())
    }

    /// Load configuration from a YAML file, then apply environment overrides.
    ///
    /// # Errors
    ///
    /// The file cannot be read or is not valid YAML for this structure.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading engine config {}", path.display()))?;
        let config = Self::from_yaml_str(&text)
            .with_context(|| format!("parsing engine config {}", path.display()))?;
        Ok(config.apply_overrides(|key| env::var(key).ok()))
    }

    /// Parse YAML without consulting the environment.
    ///
    /// # Errors
    ///
    /// The text is not valid YAML for this structure.
    pub fn from_yaml_str(text: &str) -> anyhow::Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    /// Apply `BRRTFN_*` overrides read through `lookup`. Unparseable values
    /// are ignored.
    #[must_use]
    pub fn apply_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(debug) = lookup("BRRTFN_DEBUG").as_deref().and_then(parse_flag) {
            self.debug = debug;
        }
        if let Some(ms) = lookup("BRRTFN_REQUEST_TIMEOUT_MS").and_then(|v| v.trim().parse::<u64>().ok()) {
            self.request_timeout_ms = (ms > 0).then_some(ms);
        }
        if let Some(cache) = lookup("BRRTFN_SCHEMA_CACHE").as_deref().and_then(parse_flag) {
            self.schema_cache = cache;
        }
        self
    }

    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout_ms = timeout.map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX));
        self
    }

    #[must_use]
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = EngineConfig::default();
        assert!(!config.debug);
        assert!(config.schema_cache);
        assert_eq!(config.request_timeout(), None);
    }

    #[test]
    fn env_overrides() {
        let config = EngineConfig::default().apply_overrides(lookup(&[
            ("BRRTFN_DEBUG", "true"),
            ("BRRTFN_REQUEST_TIMEOUT_MS", "250"),
            ("BRRTFN_SCHEMA_CACHE", "off"),
        ]));
        assert!(config.debug);
        assert_eq!(config.request_timeout(), Some(Duration::from_millis(250)));
        assert!(!config.schema_cache);
    }

    #[test]
    fn garbage_env_values_are_ignored() {
        let config = EngineConfig::default().apply_overrides(lookup(&[
            ("BRRTFN_DEBUG", "maybe"),
            ("BRRTFN_REQUEST_TIMEOUT_MS", "soon"),
        ]));
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn zero_timeout_disables_the_bound() {
        let config = EngineConfig::default()
            .with_request_timeout(Some(Duration::from_secs(1)))
            .apply_overrides(lookup(&[("BRRTFN_REQUEST_TIMEOUT_MS", "0")]));
        assert_eq!(config.request_timeout(), None);
    }

    #[test]
    fn yaml_file_is_loaded() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "debug: true\nrequest_timeout_ms: 1500").unwrap();
        let text = std::fs::read_to_string(file.path()).unwrap();
        let config = EngineConfig::from_yaml_str(&text).unwrap();
        assert!(config.debug);
        assert_eq!(config.request_timeout_ms, Some(1500));
        assert!(config.schema_cache);
    }

    #[test]
    fn missing_yaml_file_is_an_error() {
        let err = EngineConfig::from_yaml_file("/definitely/not/here.yaml").unwrap_err();
        assert!(format!("{err:#}").contains("reading engine config"));
    }

    #[test]
    fn yaml_rejects_wrong_types() {
        assert!(EngineConfig::from_yaml_str("debug: [1, 2]").is_err());
        assert_eq!(EngineConfig::from_yaml_str("").unwrap(), EngineConfig::default());
    }
}
