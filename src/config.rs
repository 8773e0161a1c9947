use crate::errors::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Process-wide mapper configuration.
///
/// Precedence: defaults < TOML file < environment. The resolved value is handed
/// to [`crate::Odm::new`]; runtime toggles live on the `Odm` handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OdmConfig {
    /// When true, `find` and `find_by` fail with `DocumentNotFound` on a miss.
    /// When false they return `None` or only the documents that matched.
    pub raise_not_found_error: bool,
    /// Initial state of the query cache switch.
    pub query_cache: bool,
    pub query_cache_capacity: usize,
    /// Applied to criteria that don't set their own batch size.
    pub default_batch_size: Option<u32>,
    pub log_level: Option<String>,
}

impl Default for OdmConfig {
    fn default() -> Self {
        Self {
            raise_not_found_error: true,
            query_cache: false,
            query_cache_capacity: 1024,
            default_batch_size: None,
            log_level: None,
        }
    }
}

impl OdmConfig {
    /// # Errors
    /// Returns an error if the text is not valid TOML for this structure.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str::<Self>(s)?)
    }

    /// Loads a TOML file and applies environment overrides on top of it.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = std::fs::read_to_string(path.as_ref())?;
        let mut cfg = Self::from_toml_str(&s)?;
        cfg.apply_env();
        Ok(cfg)
    }

    /// Defaults with environment overrides applied.
    #[must_use]
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.apply_env();
        cfg
    }

    /// Environment overrides:
    /// - NEXUSODM_RAISE_NOT_FOUND
    /// - NEXUSODM_QUERY_CACHE
    /// - NEXUSODM_BATCH_SIZE
    /// - NEXUSODM_LOG_LEVEL
    pub fn apply_env(&mut self) {
        if let Some(b) = env_flag("NEXUSODM_RAISE_NOT_FOUND") {
            self.raise_not_found_error = b;
        }
        if let Some(b) = env_flag("NEXUSODM_QUERY_CACHE") {
            self.query_cache = b;
        }
        if let Some(n) =
            std::env::var("NEXUSODM_BATCH_SIZE").ok().and_then(|s| s.parse::<u32>().ok())
        {
            self.default_batch_size = Some(n);
        }
        if let Ok(s) = std::env::var("NEXUSODM_LOG_LEVEL") {
            self.log_level = Some(s);
        }
    }
}

fn env_flag(name: &str) -> Option<bool> {
    std::env::var(name).ok().map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_overrides_defaults_partially() {
        let cfg = OdmConfig::from_toml_str("raise_not_found_error = false\ndefault_batch_size = 50\n")
            .unwrap();
        assert!(!cfg.raise_not_found_error);
        assert_eq!(cfg.default_batch_size, Some(50));
        assert!(!cfg.query_cache);
        assert_eq!(cfg.query_cache_capacity, 1024);
    }

    #[test]
    fn invalid_toml_is_reported() {
        let err = OdmConfig::from_toml_str("raise_not_found_error = \"maybe\"").unwrap_err();
        assert!(matches!(err, crate::errors::OdmError::Toml(_)));
    }
}
