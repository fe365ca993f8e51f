//! Process-wide settings: where decompositions are cached, when the cache
//! is worth using, and how to reach an external SVD program.
//!
//! ```toml
//! cache_dir = "/var/cache/lsa"
//! cache_threshold = 10000
//!
//! [external_solver]
//! program = "/usr/local/bin/svd"
//! args = ["-o", "{output}", "-d", "{dims}", "{input}"]
//! timeout_ms = 120000
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{
    error::{LsaError, Result},
    space::{semantic::DEFAULT_CACHE_THRESHOLD, solver::ExternalSolverConfig},
};

fn default_cache_threshold() -> usize {
    DEFAULT_CACHE_THRESHOLD
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LsaConfig {
    /// decomposition cache directory, no cache when unset
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    /// passages × terms above which the cache is read and written
    #[serde(default = "default_cache_threshold")]
    pub cache_threshold: usize,
    #[serde(default)]
    pub external_solver: Option<ExternalSolverConfig>,
}

impl Default for LsaConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            cache_threshold: DEFAULT_CACHE_THRESHOLD,
            external_solver: None,
        }
    }
}

impl LsaConfig {
    /// Parse a TOML document
    ///
    /// # Errors
    /// `LsaError::Config` when the document is not valid TOML or has wrong types
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        toml::from_str(toml).map_err(|e| LsaError::Config(e.to_string()))
    }

    /// Read and parse a TOML file
    ///
    /// # Errors
    /// `LsaError::Config` when the file cannot be read or parsed
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| LsaError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml_str(&contents)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| LsaError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        let config = LsaConfig::from_toml_str("").unwrap();
        assert_eq!(config, LsaConfig::default());
        assert_eq!(config.cache_threshold, 10_000);
    }

    #[test]
    fn external_solver_section() {
        let config = LsaConfig::from_toml_str(
            r#"
            cache_dir = "/tmp/lsa-cache"

            [external_solver]
            program = "/usr/bin/svd"
            timeout_ms = 500
            "#,
        )
        .unwrap();
        assert_eq!(config.cache_dir.as_deref(), Some(Path::new("/tmp/lsa-cache")));
        let solver = config.external_solver.unwrap();
        assert_eq!(solver.program, PathBuf::from("/usr/bin/svd"));
        assert_eq!(solver.args, vec!["{input}", "{output}", "{dims}"]);
        assert_eq!(solver.timeout().as_millis(), 500);
    }

    #[test]
    fn bad_types_are_config_errors() {
        let err = LsaConfig::from_toml_str("cache_threshold = \"lots\"").unwrap_err();
        assert!(matches!(err, LsaError::Config(_)));
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lsa.toml");
        let mut config = LsaConfig::default();
        config.cache_threshold = 42;
        config.external_solver = Some(ExternalSolverConfig::new("svd"));
        std::fs::write(&path, config.to_toml_string().unwrap()).unwrap();
        assert_eq!(LsaConfig::from_file(&path).unwrap(), config);
        assert!(matches!(LsaConfig::from_file(dir.path().join("missing.toml")), Err(LsaError::Config(_))));
    }
}
