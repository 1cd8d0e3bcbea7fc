//! Configuration types for the pool exerciser.
//!
//! Settings come from an optional YAML file (`exerciser.yml` by default);
//! command-line flags are applied on top by the binary before `validate()`.

use crate::sampling::SampleFraction;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Central manager of the Open Science Pool.
pub const OSPOOL_CENTRAL_MANAGER: &str = "cm-1.ospool.osg-htc.org";

/// Resource-identity attribute advertised by OSPool glideins.
pub const OSPOOL_RESOURCE_ATTRIBUTE: &str = "GLIDEIN_ResourceName";

/// Resource-identity attribute used for any other pool.
pub const DEFAULT_RESOURCE_ATTRIBUTE: &str = "Machine";

/// Top-level configuration for the exerciser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExerciserConfig {
    /// Directory holding one subdirectory per run.
    #[serde(default = "default_working_dir")]
    pub working_dir: PathBuf,

    /// Directory holding one subdirectory per test definition.
    #[serde(default = "default_tests_dir")]
    pub tests_dir: PathBuf,

    /// Address of the pool's central manager.
    #[serde(default = "default_central_manager")]
    pub central_manager: String,

    /// Overrides the resource-identity attribute derived from the central
    /// manager.
    #[serde(default)]
    pub resource_attribute: Option<String>,

    /// Fraction of each resource's instances that receive a job.
    #[serde(default = "default_sample_percent")]
    pub sample_percent: f64,

    /// When the pool should give up on an exerciser job.
    #[serde(default)]
    pub removal: RemovalPolicy,
}

fn default_working_dir() -> PathBuf {
    PathBuf::from("working")
}

fn default_tests_dir() -> PathBuf {
    PathBuf::from("tests")
}

fn default_central_manager() -> String {
    OSPOOL_CENTRAL_MANAGER.to_string()
}

fn default_sample_percent() -> f64 {
    0.05
}

impl Default for ExerciserConfig {
    fn default() -> Self {
        Self {
            working_dir: default_working_dir(),
            tests_dir: default_tests_dir(),
            central_manager: default_central_manager(),
            resource_attribute: None,
            sample_percent: default_sample_percent(),
            removal: RemovalPolicy::default(),
        }
    }
}

/// Thresholds for the periodic-removal predicate attached to every job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovalPolicy {
    /// Remove a job that has sat idle, or kept running, for longer than this.
    #[serde(default = "default_max_status_hours")]
    pub max_status_hours: u32,

    /// Remove a job whose shadow has started more often than this.
    #[serde(default = "default_max_restarts")]
    pub max_restarts: u32,
}

fn default_max_status_hours() -> u32 {
    4
}

fn default_max_restarts() -> u32 {
    10
}

impl Default for RemovalPolicy {
    fn default() -> Self {
        Self {
            max_status_hours: default_max_status_hours(),
            max_restarts: default_max_restarts(),
        }
    }
}

impl RemovalPolicy {
    /// The threshold in seconds, as compared against job ad times.
    pub fn max_status_seconds(&self) -> u64 {
        u64::from(self.max_status_hours) * 60 * 60
    }
}

impl ExerciserConfig {
    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        debug!(path = %path_ref.display(), "Loading configuration from file");
        let content = std::fs::read_to_string(path_ref)?;
        let config: Self = serde_yaml::from_str(&content)?;
        debug!(
            working_dir = %config.working_dir.display(),
            tests_dir = %config.tests_dir.display(),
            central_manager = %config.central_manager,
            "Configuration loaded"
        );
        Ok(config)
    }

    /// The attribute that names a resource in this pool.
    pub fn resource_attribute(&self) -> &str {
        match self.resource_attribute.as_deref() {
            Some(attribute) => attribute,
            None if self.central_manager == OSPOOL_CENTRAL_MANAGER => OSPOOL_RESOURCE_ATTRIBUTE,
            None => DEFAULT_RESOURCE_ATTRIBUTE,
        }
    }

    /// True when the working directory is the built-in default, which the
    /// exerciser may create on first use. Any other working directory must
    /// already exist.
    pub fn uses_default_working_dir(&self) -> bool {
        self.working_dir == default_working_dir()
    }

    /// The validated sample fraction.
    pub fn sample_fraction(&self) -> Result<SampleFraction, ConfigError> {
        SampleFraction::new(self.sample_percent).ok_or_else(|| ConfigError::InvalidValue {
            field: "sample_percent".to_string(),
            message: format!(
                "{} is outside (0.0, 1.0]; resource sample size must be between 0.0 (exclusive) and 1.0 (inclusive)",
                self.sample_percent
            ),
        })
    }

    /// Checks values that serde cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.sample_fraction()?;

        if self.central_manager.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "central_manager".to_string(),
                message: "must not be empty".to_string(),
            });
        }

        if self.resource_attribute().trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "resource_attribute".to_string(),
                message: "must not be empty".to_string(),
            });
        }

        if self.removal.max_status_hours == 0 {
            return Err(ConfigError::InvalidValue {
                field: "removal.max_status_hours".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },

    #[error("{kind} directory {path} does not exist")]
    MissingDirectory { kind: &'static str, path: PathBuf },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ExerciserConfig::default();
        assert_eq!(config.working_dir, PathBuf::from("working"));
        assert_eq!(config.tests_dir, PathBuf::from("tests"));
        assert_eq!(config.central_manager, OSPOOL_CENTRAL_MANAGER);
        assert!((config.sample_percent - 0.05).abs() < f64::EPSILON);
        assert_eq!(config.removal.max_status_hours, 4);
        assert_eq!(config.removal.max_restarts, 10);
        assert!(config.uses_default_working_dir());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
working_dir: "/scratch/exerciser"
tests_dir: "./suite"
central_manager: "cm.example.org"
sample_percent: 0.5
removal:
  max_status_hours: 2
"#;
        let config: ExerciserConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.working_dir, PathBuf::from("/scratch/exerciser"));
        assert_eq!(config.tests_dir, PathBuf::from("./suite"));
        assert!((config.sample_percent - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.removal.max_status_hours, 2);
        assert_eq!(config.removal.max_restarts, 10);
        assert!(!config.uses_default_working_dir());
    }

    #[test]
    fn test_resource_attribute_follows_central_manager() {
        let mut config = ExerciserConfig::default();
        assert_eq!(config.resource_attribute(), "GLIDEIN_ResourceName");

        config.central_manager = "cm.example.org".to_string();
        assert_eq!(config.resource_attribute(), "Machine");

        config.resource_attribute = Some("SiteName".to_string());
        assert_eq!(config.resource_attribute(), "SiteName");
    }

    #[test]
    fn test_sample_percent_bounds() {
        let mut config = ExerciserConfig::default();
        for bad in [0.0, -0.1, 1.01, f64::NAN] {
            config.sample_percent = bad;
            assert!(
                matches!(config.validate(), Err(ConfigError::InvalidValue { ref field, .. }) if field == "sample_percent"),
                "expected {bad} to be rejected"
            );
        }

        config.sample_percent = 1.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_status_hours_rejected() {
        let mut config = ExerciserConfig::default();
        config.removal.max_status_hours = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_removal_seconds() {
        assert_eq!(RemovalPolicy::default().max_status_seconds(), 14_400);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("exerciser.yml");
        std::fs::write(&path, "sample_percent: 0.25\n").unwrap();

        let config = ExerciserConfig::from_file(&path).unwrap();
        assert!((config.sample_percent - 0.25).abs() < f64::EPSILON);

        std::fs::write(&path, "sample_percent: [not, a, number]\n").unwrap();
        assert!(matches!(
            ExerciserConfig::from_file(&path),
            Err(ConfigError::Yaml(_))
        ));
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let result: Result<ExerciserConfig, _> = serde_yaml::from_str("future_feature: true\n");
        assert!(result.is_ok());
    }
}
