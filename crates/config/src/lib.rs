//! Layered configuration for bookprint.
//!
//! Values are resolved from, lowest priority first:
//!
//! 1. built-in defaults,
//! 2. a configuration file (TOML, YAML or JSON, by extension), and
//! 3. `BOOKPRINT_` prefixed environment variables, with `__` separating
//!    nested keys (`BOOKPRINT_COMPARE__THRESHOLD=8`).

pub mod error;

use std::path::{Path, PathBuf};

use bookprint_extract::{CompareOptions, HashOptions};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::{ErrorKind, Result};

/// Prefix of environment variables overriding the configuration.
pub const ENV_PREFIX: &str = "BOOKPRINT_";
const FILE_NAME: &str = "config.toml";
/// Perceptual hashes are 64 bits wide.
const MAX_THRESHOLD: u32 = 64;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub hash: HashConfig,
    pub compare: CompareConfig,
    pub log: LogConfig,
}

/// Word histogram and body decoding settings, see [`HashOptions`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HashConfig {
    pub histogram_size: usize,
    pub min_word_length: usize,
    /// Largest decompressed book body, in bytes
    pub max_body_size: u64,
}
impl Default for HashConfig {
    fn default() -> Self {
        let options = HashOptions::default();
        Self {
            histogram_size: options.histogram_size,
            min_word_length: options.min_word_length,
            max_body_size: options.max_body_size,
        }
    }
}
impl From<&HashConfig> for HashOptions {
    fn from(config: &HashConfig) -> Self {
        Self {
            histogram_size: config.histogram_size,
            min_word_length: config.min_word_length,
            max_body_size: config.max_body_size,
        }
    }
}

/// Comparison settings, see [`CompareOptions`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompareConfig {
    /// Largest perceptual distance at which two images still match
    pub threshold: u32,
}
impl Default for CompareConfig {
    fn default() -> Self {
        Self {
            threshold: CompareOptions::default().threshold,
        }
    }
}
impl From<&CompareConfig> for CompareOptions {
    fn from(config: &CompareConfig) -> Self {
        Self {
            threshold: config.threshold,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default `tracing` filter directive; `RUST_LOG` takes precedence
    pub level: String,
}
impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Location of the configuration file when none is given explicitly.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "bookprint").map(|dirs| dirs.config_dir().join(FILE_NAME))
    }

    /// Load the configuration from defaults, a file and the environment.
    ///
    /// An explicit `path` must exist; the default path is optional.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::Load`] if a source cannot be read or parsed and
    /// [`ErrorKind::Invalid`] if a value is out of range.
    #[instrument]
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::layered(path, Env::prefixed(ENV_PREFIX).split("__"))
    }

    fn layered(path: Option<&Path>, env: Env) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        let file = match path {
            Some(path) if !path.is_file() => exn::bail!(ErrorKind::Load(Some(path.to_path_buf()))),
            Some(path) => Some(path.to_path_buf()),
            None => Self::default_path().filter(|path| path.is_file()),
        };
        if let Some(file) = &file {
            tracing::debug!(path = %file.display(), "Reading configuration file");
            figment = match file.extension().and_then(|extension| extension.to_str()) {
                Some("yaml" | "yml") => figment.merge(Yaml::file(file)),
                Some("json") => figment.merge(Json::file(file)),
                _ => figment.merge(Toml::file(file)),
            };
        }
        let config: Self = figment.merge(env).extract().or_raise(|| ErrorKind::Load(file))?;
        config.validate()
    }

    fn validate(self) -> Result<Self> {
        if self.hash.histogram_size == 0 {
            exn::bail!(ErrorKind::Invalid("hash.histogram_size"));
        }
        if self.hash.max_body_size == 0 {
            exn::bail!(ErrorKind::Invalid("hash.max_body_size"));
        }
        if self.compare.threshold > MAX_THRESHOLD {
            exn::bail!(ErrorKind::Invalid("compare.threshold"));
        }
        Ok(self)
    }

    pub fn hash_options(&self) -> HashOptions {
        HashOptions::from(&self.hash)
    }

    pub fn compare_options(&self) -> CompareOptions {
        CompareOptions::from(&self.compare)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::fs;
    use tempfile::TempDir;

    /// An environment provider nothing in the test process sets.
    fn quiet_env() -> Env {
        Env::prefixed("BOOKPRINT_TEST_UNSET_").split("__")
    }

    #[test]
    fn defaults_match_library_defaults() {
        let config = Config::default();
        assert_eq!(config.hash_options(), HashOptions::default());
        assert_eq!(config.compare_options(), CompareOptions::default());
        assert_eq!(config.log.level, "info");
    }

    #[rstest]
    #[case("config.toml", "[compare]\nthreshold = 8\n[hash]\nhistogram_size = 20\n")]
    #[case("config.yaml", "compare:\n  threshold: 8\nhash:\n  histogram_size: 20\n")]
    #[case("config.json", r#"{"compare": {"threshold": 8}, "hash": {"histogram_size": 20}}"#)]
    fn reads_file_by_extension(#[case] name: &str, #[case] contents: &str) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(name);
        fs::write(&path, contents).unwrap();
        let config = Config::layered(Some(&path), quiet_env()).unwrap();
        assert_eq!(config.compare.threshold, 8);
        assert_eq!(config.hash.histogram_size, 20);
        // Unset keys keep their defaults.
        assert_eq!(config.hash.min_word_length, 3);
    }

    #[test]
    fn environment_overrides_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[compare]\nthreshold = 8\n").unwrap();
        // SAFETY: the variable name is unique to this test.
        unsafe { std::env::set_var("BOOKPRINT_TEST_OVERRIDE_COMPARE__THRESHOLD", "4") };
        let config = Config::layered(Some(&path), Env::prefixed("BOOKPRINT_TEST_OVERRIDE_").split("__")).unwrap();
        assert_eq!(config.compare.threshold, 4);
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.toml");
        let err = Config::layered(Some(&path), quiet_env()).unwrap_err();
        assert_eq!(*err, ErrorKind::Load(Some(path)));
    }

    #[test]
    fn wrong_type_is_a_load_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[compare]\nthreshold = \"close\"\n").unwrap();
        let err = Config::layered(Some(&path), quiet_env()).unwrap_err();
        assert!(matches!(*err, ErrorKind::Load(_)));
    }

    #[rstest]
    #[case("[compare]\nthreshold = 65\n", "compare.threshold")]
    #[case("[hash]\nhistogram_size = 0\n", "hash.histogram_size")]
    #[case("[hash]\nmax_body_size = 0\n", "hash.max_body_size")]
    fn out_of_range_values_are_rejected(#[case] contents: &str, #[case] key: &'static str) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, contents).unwrap();
        let err = Config::layered(Some(&path), quiet_env()).unwrap_err();
        assert_eq!(*err, ErrorKind::Invalid(key));
    }
}
