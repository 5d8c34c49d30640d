//! Checker configuration
//!
//! Which command grades which submission kind, with what time budget and score
//! tiers. The default table is compiled in from `files/checkers.toml`; a file
//! given at runtime replaces it.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::classifier::{ClassificationMode, ScoreTiers, SubmissionKind};
use crate::error::{GradeError, Result};
use crate::runner::CommandSpec;

/// Placeholder in checker parameters replaced by the submission path
pub const SUBMISSION_PLACEHOLDER: &str = "{submission}";

const DEFAULT_TIMEOUT_SECS: u64 = 60;

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

/// How to grade one submission kind
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TestSpec {
    /// Executable path or name
    pub command: String,
    #[serde(default)]
    pub parameters: Vec<String>,
    /// Seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    pub correct_points: u32,
    pub attempt_points: u32,
    #[serde(default)]
    pub mode: ClassificationMode,
}

impl TestSpec {
    pub fn tiers(&self) -> ScoreTiers {
        ScoreTiers {
            correct: self.correct_points,
            attempt: self.attempt_points,
        }
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// Checker command line for one submission
    pub fn command_for(&self, submission: &Path) -> CommandSpec {
        let path = submission.to_string_lossy();
        CommandSpec::new(&self.command).with_args(
            self.parameters
                .iter()
                .map(|p| p.replace(SUBMISSION_PLACEHOLDER, &path)),
        )
    }

    pub fn validate(&self) -> Result<()> {
        if self.command.trim().is_empty() {
            return Err(GradeError::InvalidConfig("command must not be empty".into()));
        }
        if self.timeout == 0 {
            return Err(GradeError::InvalidConfig(format!(
                "timeout for `{}` must be at least one second",
                self.command
            )));
        }
        if self.attempt_points >= self.correct_points {
            return Err(GradeError::InvalidConfig(format!(
                "attempt_points ({}) must be lower than correct_points ({}) for `{}`",
                self.attempt_points, self.correct_points, self.command
            )));
        }
        Ok(())
    }
}

/// Remote HTML/CSS validator settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Command-line HTTP client used to reach the validators
    pub http_client: String,
    pub html_endpoint: String,
    pub css_endpoint: String,
    /// Seconds
    pub timeout: u64,
}

impl ValidatorConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn validate(&self) -> Result<()> {
        if self.http_client.trim().is_empty() {
            return Err(GradeError::InvalidConfig(
                "validator http_client must not be empty".into(),
            ));
        }
        if self.timeout == 0 {
            return Err(GradeError::InvalidConfig(
                "validator timeout must be at least one second".into(),
            ));
        }
        Ok(())
    }
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            http_client: "curl".to_string(),
            html_endpoint: "https://teaching.computing.edgehill.ac.uk/validator/html/".to_string(),
            css_endpoint: "https://jigsaw.w3.org/css-validator/validator".to_string(),
            timeout: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Raw TOML layout
#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    checkers: HashMap<String, TestSpec>,
    #[serde(default)]
    validator: ValidatorConfig,
}

/// Full grading configuration
#[derive(Debug, Clone)]
pub struct GraderConfig {
    pub checkers: HashMap<SubmissionKind, TestSpec>,
    pub validator: ValidatorConfig,
}

impl GraderConfig {
    /// Parse and validate a TOML configuration
    pub fn from_toml(content: &str) -> Result<Self> {
        let raw: RawConfig = toml::from_str(content)?;

        let mut checkers = HashMap::new();
        for (name, spec) in raw.checkers {
            let kind: SubmissionKind = name.parse().map_err(GradeError::InvalidConfig)?;
            spec.validate()?;
            if checkers.insert(kind, spec).is_some() {
                return Err(GradeError::InvalidConfig(format!(
                    "more than one checker configured for {}",
                    kind
                )));
            }
        }

        raw.validator.validate()?;

        Ok(Self {
            checkers,
            validator: raw.validator,
        })
    }

    /// The table shipped with the binary
    pub fn embedded() -> Result<Self> {
        Self::from_toml(include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/files/checkers.toml"
        )))
    }

    /// Load from `path`, or fall back to the embedded table
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let content =
                    std::fs::read_to_string(path).map_err(|source| GradeError::ConfigRead {
                        path: path.to_path_buf(),
                        source,
                    })?;
                Self::from_toml(&content)
            }
            None => Self::embedded(),
        }
    }

    pub fn spec_for(&self, kind: SubmissionKind) -> Option<&TestSpec> {
        self.checkers.get(&kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"
[checkers.php]
command = "phpunit"
parameters = ["{submission}"]
correct_points = 4
attempt_points = 2
mode = "simple_pattern"

[checkers.js]
command = "mocha"
parameters = ["--reporter", "spec", "{submission}"]
timeout = 15
correct_points = 2
attempt_points = 1
"#;

    #[test]
    fn test_embedded_config_is_valid() {
        let config = GraderConfig::embedded().unwrap();
        assert_eq!(config.checkers.len(), 3);
        assert_eq!(
            config.spec_for(SubmissionKind::Php).unwrap().mode,
            ClassificationMode::SimplePattern
        );
        assert_eq!(config.validator.http_client, "curl");
    }

    #[test]
    fn test_parse_with_aliases_and_defaults() {
        let config = GraderConfig::from_toml(SAMPLE).unwrap();

        let php = config.spec_for(SubmissionKind::Php).unwrap();
        assert_eq!(php.timeout, DEFAULT_TIMEOUT_SECS);
        assert_eq!(php.tiers(), ScoreTiers { correct: 4, attempt: 2 });

        let js = config.spec_for(SubmissionKind::JavaScript).unwrap();
        assert_eq!(js.mode, ClassificationMode::ExitCode);
        assert_eq!(js.deadline(), Duration::from_secs(15));

        assert!(config.spec_for(SubmissionKind::Generic).is_none());
        assert_eq!(config.validator, ValidatorConfig::default());
    }

    #[test]
    fn test_rejects_inverted_tiers() {
        let content = r#"
[checkers.generic]
command = "python3"
correct_points = 1
attempt_points = 1
"#;
        assert!(matches!(
            GraderConfig::from_toml(content),
            Err(GradeError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_rejects_zero_validator_timeout() {
        let content = r#"
[validator]
timeout = 0
"#;
        assert!(matches!(
            GraderConfig::from_toml(content),
            Err(GradeError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_rejects_unknown_kind() {
        let content = r#"
[checkers.cobol]
command = "cobc"
correct_points = 2
attempt_points = 1
"#;
        assert!(GraderConfig::from_toml(content).is_err());
    }

    #[test]
    fn test_rejects_duplicate_kind() {
        let content = r#"
[checkers.js]
command = "mocha"
correct_points = 2
attempt_points = 1

[checkers.javascript]
command = "mocha"
correct_points = 2
attempt_points = 1
"#;
        assert!(GraderConfig::from_toml(content).is_err());
    }

    #[test]
    fn test_command_substitutes_submission() {
        let config = GraderConfig::from_toml(SAMPLE).unwrap();
        let js = config.spec_for(SubmissionKind::JavaScript).unwrap();
        let cmd = js.command_for(Path::new("/tmp/merge.js"));
        assert_eq!(cmd.to_vec(), vec!["mocha", "--reporter", "spec", "/tmp/merge.js"]);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", SAMPLE).unwrap();

        let config = GraderConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.checkers.len(), 2);

        let missing = GraderConfig::load(Some(Path::new("/nonexistent/checkers.toml")));
        assert!(matches!(missing, Err(GradeError::ConfigRead { .. })));
    }
}
