use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::rules::loader::DEFAULT_COMPILE_TIMEOUT_SECS;

/// Top-level configuration from `.codesleuth.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub rules: RulesConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub report: ReportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesConfig {
    /// External rule compiler binary.
    #[serde(default = "default_compiler")]
    pub compiler: PathBuf,
    /// Hard deadline for one compiler invocation.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Treat the rules path as already-compiled JSON.
    #[serde(default)]
    pub precompiled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Language tags to analyze; empty means every registered adapter.
    #[serde(default)]
    pub languages: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Detections below this confidence are dropped from the report.
    #[serde(default)]
    pub min_confidence: f64,
    /// Whether any reported detection fails the run.
    #[serde(default = "default_true")]
    pub fail_on_detection: bool,
}

fn default_compiler() -> PathBuf {
    PathBuf::from("sleuth-rulec")
}

fn default_timeout_secs() -> u64 {
    DEFAULT_COMPILE_TIMEOUT_SECS
}

fn default_true() -> bool {
    true
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            compiler: default_compiler(),
            timeout_secs: default_timeout_secs(),
            precompiled: false,
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            languages: Vec::new(),
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.0,
            fail_on_detection: true,
        }
    }
}

impl Config {
    /// Load config from a TOML file. Returns default if file doesn't exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Generate a starter config file.
    pub fn starter_toml() -> &'static str {
        r#"# codesleuth configuration

[rules]
# External rule compiler binary; it receives the rule source path and
# prints compiled JSON IR on stdout.
compiler = "sleuth-rulec"
# Compilation deadline in seconds.
timeout_secs = 30
# Set to true when the rules path already contains compiled JSON.
precompiled = false

[analysis]
# Restrict analyzed languages; empty means all registered adapters.
# languages = ["python", "java"]

[report]
# Drop detections below this confidence.
min_confidence = 0.0
# Any reported detection fails the run (non-zero exit).
fail_on_detection = true
"#
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_yields_defaults() {
        let config = Config::load(Path::new("/nonexistent/.codesleuth.toml")).unwrap();
        assert_eq!(config.rules.timeout_secs, 30);
        assert!(!config.rules.precompiled);
        assert!(config.report.fail_on_detection);
    }

    #[test]
    fn starter_toml_round_trips() {
        let config: Config = toml::from_str(Config::starter_toml()).unwrap();
        assert_eq!(config.rules.compiler, PathBuf::from("sleuth-rulec"));
        assert_eq!(config.report.min_confidence, 0.0);
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[report]\nmin_confidence = 0.85").unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.report.min_confidence, 0.85);
        assert_eq!(config.rules.timeout_secs, 30);
    }
}
