//! Processor configuration

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Tunables of a processing session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Year assumed for logcat lines, which carry no year
    pub android_log_year: i32,

    /// Heap name used when a dump does not name its heap
    pub default_heap_name: String,

    /// Heap whose allocator only reports allocations, never frees
    pub art_heap_name: String,

    /// Guess the package of Java frames from the processes that ran them
    pub guess_java_packages: bool,

    /// Apply buffered deobfuscation mappings at end of file
    pub deobfuscate: bool,

    /// Divisor turning an Android uid into an app id
    pub app_uid_modulus: i64,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            android_log_year: std::env::var("TRACERY_ANDROID_LOG_YEAR")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1970),
            default_heap_name: "malloc".to_string(),
            art_heap_name: "com.android.art".to_string(),
            guess_java_packages: std::env::var("TRACERY_GUESS_JAVA_PACKAGES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(true),
            deobfuscate: std::env::var("TRACERY_DEOBFUSCATE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(true),
            app_uid_modulus: 100_000,
        }
    }
}

impl ProcessorConfig {
    /// Layer an optional TOML file and `TRACERY_*` environment variables
    /// over the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults = config::Config::try_from(&Self::default())?;
        let mut builder = config::Config::builder().add_source(defaults);
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let settings = builder
            .add_source(config::Environment::with_prefix("TRACERY"))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    /// Render the effective configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.app_uid_modulus <= 0 {
            anyhow::bail!("app_uid_modulus must be positive");
        }
        if self.default_heap_name.is_empty() {
            anyhow::bail!("default_heap_name must not be empty");
        }
        if !(1970..=9999).contains(&self.android_log_year) {
            anyhow::bail!("Invalid android_log_year: {}", self.android_log_year);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = ProcessorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.default_heap_name, "malloc");
        assert_eq!(config.art_heap_name, "com.android.art");
    }

    #[test]
    fn test_validate_rejects_bad_modulus() {
        let config = ProcessorConfig {
            app_uid_modulus: 0,
            ..ProcessorConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "android_log_year = 2020").unwrap();
        writeln!(file, "deobfuscate = false").unwrap();

        let config = ProcessorConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.android_log_year, 2020);
        assert!(!config.deobfuscate);
        assert_eq!(config.default_heap_name, "malloc");
    }

    #[test]
    fn test_to_toml() {
        let rendered = ProcessorConfig::default().to_toml().unwrap();
        assert!(rendered.contains("art_heap_name = \"com.android.art\""));
    }
}
