//! HTML/CSS validation
//!
//! Sends a submission to a remote validation service through a command-line
//! HTTP client, run like any other checker, and renders the service's answer
//! as feedback lines. Validation never assigns a score.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::ValidatorConfig;
use crate::decoder;
use crate::error::{GradeError, Result};
use crate::runner::{CommandSpec, RunStatus, Runner};

pub const VALIDATION_TIMEOUT_MESSAGE: &str = "Validation failed due to timeout";

pub const VALIDATION_FAILED_MESSAGE: &str =
    "Validation failed: the validator could not be reached or returned an unreadable response";

/// Which validation service to use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidatorTarget {
    Html,
    Css,
}

impl ValidatorTarget {
    pub fn supports(self, format: OutputFormat) -> bool {
        match self {
            ValidatorTarget::Html => true,
            ValidatorTarget::Css => matches!(format, OutputFormat::Json | OutputFormat::Text),
        }
    }
}

impl fmt::Display for ValidatorTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidatorTarget::Html => write!(f, "html"),
            ValidatorTarget::Css => write!(f, "css"),
        }
    }
}

impl FromStr for ValidatorTarget {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "html" => Ok(ValidatorTarget::Html),
            "css" => Ok(ValidatorTarget::Css),
            other => Err(format!("unknown validator: {}", other)),
        }
    }
}

/// Response format requested from the validator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Xhtml,
    Xml,
    Gnu,
    Text,
}

impl OutputFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Xhtml => "xhtml",
            OutputFormat::Xml => "xml",
            OutputFormat::Gnu => "gnu",
            OutputFormat::Text => "text",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "xhtml" => Ok(OutputFormat::Xhtml),
            "xml" => Ok(OutputFormat::Xml),
            "gnu" => Ok(OutputFormat::Gnu),
            "text" => Ok(OutputFormat::Text),
            other => Err(format!("unknown output format: {}", other)),
        }
    }
}

/// One finding reported by a validator
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatorMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub sub_type: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub first_line: Option<u32>,
    #[serde(default)]
    pub last_line: Option<u32>,
}

impl ValidatorMessage {
    /// `[Type: error, SubType: fatal, Message: ..., At Line: 3, Until Line: 4]`
    pub fn render(&self) -> String {
        let mut line = format!(
            "[Type: {}, SubType: {}, Message: {}",
            self.kind,
            self.sub_type.as_deref().unwrap_or("none"),
            self.message.trim()
        );
        if let Some(first) = self.first_line {
            line.push_str(&format!(", At Line: {}", first));
        }
        if let Some(last) = self.last_line {
            line.push_str(&format!(", Until Line: {}", last));
        }
        line.push(']');
        line
    }
}

/// W3C CSS validator JSON
#[derive(Debug, Deserialize)]
struct CssResponse {
    cssvalidation: CssValidation,
}

#[derive(Debug, Default, Deserialize)]
struct CssValidation {
    #[serde(default)]
    errors: Vec<CssIssue>,
    #[serde(default)]
    warnings: Vec<CssIssue>,
}

#[derive(Debug, Deserialize)]
struct CssIssue {
    #[serde(default)]
    line: Option<u32>,
    #[serde(default)]
    message: String,
    #[serde(rename = "type", default)]
    kind: Option<String>,
}

/// Nu HTML checker JSON
#[derive(Debug, Deserialize)]
struct NuResponse {
    messages: Vec<ValidatorMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ValidatorResponse {
    Css(CssResponse),
    Nu(NuResponse),
}

/// Parse a JSON validator response from either service
pub fn parse_messages(json: &str) -> Result<Vec<ValidatorMessage>> {
    let response: ValidatorResponse = serde_json::from_str(json)?;
    let messages = match response {
        ValidatorResponse::Nu(nu) => nu.messages,
        ValidatorResponse::Css(css) => {
            let issue = |level: &str, issue: CssIssue| ValidatorMessage {
                kind: level.to_string(),
                sub_type: issue.kind,
                message: issue.message,
                first_line: issue.line,
                last_line: None,
            };
            let validation = css.cssvalidation;
            validation
                .errors
                .into_iter()
                .map(|i| issue("error", i))
                .chain(validation.warnings.into_iter().map(|i| issue("warning", i)))
                .collect()
        }
    };
    Ok(messages)
}

/// Runs remote validations through a [`Runner`]
pub struct ValidatorAdapter<R> {
    runner: R,
    config: ValidatorConfig,
}

impl<R: Runner> ValidatorAdapter<R> {
    pub fn new(runner: R, config: ValidatorConfig) -> Self {
        Self { runner, config }
    }

    fn command(&self, target: ValidatorTarget, format: OutputFormat) -> CommandSpec {
        let mut args = vec!["--silent".to_string(), "--show-error".to_string()];
        let url = match target {
            ValidatorTarget::Html => {
                args.extend([
                    "-H".to_string(),
                    "Content-Type: text/html; charset=utf-8".to_string(),
                ]);
                format!("{}?out={}", self.config.html_endpoint, format)
            }
            ValidatorTarget::Css => {
                args.extend([
                    "-H".to_string(),
                    "Content-Type: application/x-www-form-urlencoded".to_string(),
                ]);
                self.config.css_endpoint.clone()
            }
        };
        args.extend(["--data-binary".to_string(), "@-".to_string(), url]);
        CommandSpec::new(&self.config.http_client).with_args(args)
    }

    fn body(target: ValidatorTarget, format: OutputFormat, content: &[u8]) -> Vec<u8> {
        match target {
            ValidatorTarget::Html => content.to_vec(),
            ValidatorTarget::Css => {
                let text = decoder::decode_bytes(content);
                format!(
                    "text={}&profile=css3&usermedium=all&warning=1&output={}",
                    utf8_percent_encode(&text, NON_ALPHANUMERIC),
                    format
                )
                .into_bytes()
            }
        }
    }

    /// Validate one file and render the findings as feedback lines
    ///
    /// Timeouts and transport failures come back as a single fixed feedback
    /// line. Errors are reserved for an unsupported format or an unreadable file.
    pub async fn validate(
        &self,
        target: ValidatorTarget,
        file_path: &Path,
        format: OutputFormat,
        timeout: Duration,
    ) -> Result<Vec<String>> {
        if !target.supports(format) {
            return Err(GradeError::UnsupportedFormat {
                target: target.to_string(),
                format: format.to_string(),
            });
        }

        let content = tokio::fs::read(file_path)
            .await
            .map_err(|source| GradeError::ReadSubmission {
                path: file_path.to_path_buf(),
                source,
            })?;

        info!("Validating {:?} with the {} validator", file_path, target);

        let cmd = self.command(target, format);
        let body = Self::body(target, format, &content);

        let outcome = match self.runner.run(&cmd, timeout, Some(&body)).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Validator client could not be started: {}", e);
                return Ok(vec![VALIDATION_FAILED_MESSAGE.to_string()]);
            }
        };

        match outcome.status {
            RunStatus::TimedOut => return Ok(vec![VALIDATION_TIMEOUT_MESSAGE.to_string()]),
            RunStatus::Exited(0) => {}
            status => {
                warn!(
                    "Validator request failed ({:?}): {}",
                    status,
                    decoder::decode(&outcome.stderr).trim()
                );
                return Ok(vec![VALIDATION_FAILED_MESSAGE.to_string()]);
            }
        }

        let response = decoder::decode(&outcome.stdout);
        if format != OutputFormat::Json {
            let text = response.trim();
            return Ok(if text.is_empty() {
                Vec::new()
            } else {
                vec![text.to_string()]
            });
        }

        match parse_messages(&response) {
            Ok(messages) => {
                debug!("Validator reported {} message(s)", messages.len());
                Ok(messages.iter().map(ValidatorMessage::render).collect())
            }
            Err(e) => {
                warn!("Unreadable validator response: {}", e);
                Ok(vec![VALIDATION_FAILED_MESSAGE.to_string()])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::RunOutcome;
    use async_trait::async_trait;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    /// Replays a canned outcome and remembers what it was asked to run
    struct CannedRunner {
        outcome: RunOutcome,
        calls: Mutex<Vec<(CommandSpec, Vec<u8>)>>,
    }

    impl CannedRunner {
        fn new(status: RunStatus, stdout: &str) -> Self {
            Self {
                outcome: RunOutcome {
                    status,
                    stdout: stdout.as_bytes().to_vec(),
                    stderr: Vec::new(),
                    elapsed: Duration::from_millis(10),
                },
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Runner for CannedRunner {
        async fn run(
            &self,
            cmd: &CommandSpec,
            _timeout: Duration,
            stdin: Option<&[u8]>,
        ) -> Result<RunOutcome> {
            self.calls
                .lock()
                .unwrap()
                .push((cmd.clone(), stdin.unwrap_or_default().to_vec()));
            Ok(self.outcome.clone())
        }
    }

    fn submission(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    const NU_RESPONSE: &str = r#"{"messages":[
        {"type":"info","subType":"warning","message":"Consider adding a lang attribute."},
        {"type":"error","message":"Unclosed element div.","firstLine":3,"lastLine":4,"firstColumn":1}
    ]}"#;

    #[test]
    fn test_renders_nu_messages() {
        let lines: Vec<String> = parse_messages(NU_RESPONSE)
            .unwrap()
            .iter()
            .map(ValidatorMessage::render)
            .collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            "[Type: info, SubType: warning, Message: Consider adding a lang attribute.]"
        );
        assert!(lines[1].contains("At Line: 3"));
        assert!(lines[1].contains("Until Line: 4"));
        assert!(!lines[0].contains("At Line:"));
    }

    #[test]
    fn test_parses_css_validator_response() {
        let json = r#"{"cssvalidation":{"validity":false,
            "errors":[{"line":2,"message":"Property colr doesn't exist","type":"noexistence"}],
            "warnings":[{"line":5,"message":"Same color for background-color and color","type":"warning"}]}}"#;
        let messages = parse_messages(json).unwrap();

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].kind, "error");
        assert_eq!(messages[0].sub_type.as_deref(), Some("noexistence"));
        assert_eq!(messages[0].first_line, Some(2));
        assert_eq!(messages[1].kind, "warning");
    }

    #[test]
    fn test_css_rejects_html_only_formats() {
        assert!(ValidatorTarget::Css.supports(OutputFormat::Json));
        assert!(!ValidatorTarget::Css.supports(OutputFormat::Gnu));
        assert!(ValidatorTarget::Html.supports(OutputFormat::Xhtml));
    }

    #[tokio::test]
    async fn test_html_validation_posts_raw_body() {
        let file = submission("<!DOCTYPE html><title>t</title><div>");
        let adapter = ValidatorAdapter::new(
            CannedRunner::new(RunStatus::Exited(0), NU_RESPONSE),
            ValidatorConfig::default(),
        );

        let feedback = adapter
            .validate(
                ValidatorTarget::Html,
                file.path(),
                OutputFormat::Json,
                Duration::from_secs(5),
            )
            .await
            .unwrap();
        assert_eq!(feedback.len(), 2);

        let calls = adapter.runner.calls.lock().unwrap();
        let (cmd, body) = &calls[0];
        assert_eq!(cmd.program, "curl");
        assert!(cmd.args.last().unwrap().ends_with("?out=json"));
        assert_eq!(body, b"<!DOCTYPE html><title>t</title><div>");
    }

    #[tokio::test]
    async fn test_css_validation_url_encodes_body() {
        let file = submission("a { colr: red; }");
        let adapter = ValidatorAdapter::new(
            CannedRunner::new(RunStatus::Exited(0), r#"{"cssvalidation":{}}"#),
            ValidatorConfig::default(),
        );

        let feedback = adapter
            .validate(
                ValidatorTarget::Css,
                file.path(),
                OutputFormat::Json,
                Duration::from_secs(5),
            )
            .await
            .unwrap();
        assert!(feedback.is_empty());

        let calls = adapter.runner.calls.lock().unwrap();
        let body = String::from_utf8(calls[0].1.clone()).unwrap();
        assert!(body.starts_with("text=a%20%7B%20colr%3A%20red%3B%20%7D&"));
        assert!(body.ends_with("output=json"));
    }

    #[test]
    fn test_unknown_json_object_is_malformed() {
        for body in [r#"{"error":"rate limited"}"#, "{}"] {
            assert!(matches!(
                parse_messages(body),
                Err(GradeError::MalformedResponse(_))
            ));
        }
        assert!(parse_messages(r#"{"messages":[]}"#).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_error_envelope_is_fixed_feedback() {
        let file = submission("<p>");
        let adapter = ValidatorAdapter::new(
            CannedRunner::new(RunStatus::Exited(0), r#"{"error":"rate limited"}"#),
            ValidatorConfig::default(),
        );
        let feedback = adapter
            .validate(
                ValidatorTarget::Html,
                file.path(),
                OutputFormat::Json,
                Duration::from_secs(1),
            )
            .await
            .unwrap();
        assert_eq!(feedback, vec![VALIDATION_FAILED_MESSAGE]);
    }

    #[tokio::test]
    async fn test_timeout_is_fixed_feedback() {
        let file = submission("<p>");
        let adapter = ValidatorAdapter::new(
            CannedRunner::new(RunStatus::TimedOut, ""),
            ValidatorConfig::default(),
        );
        let feedback = adapter
            .validate(
                ValidatorTarget::Html,
                file.path(),
                OutputFormat::Json,
                Duration::from_secs(1),
            )
            .await
            .unwrap();
        assert_eq!(feedback, vec![VALIDATION_TIMEOUT_MESSAGE]);
    }

    #[tokio::test]
    async fn test_transport_failures_are_fixed_feedback() {
        let file = submission("<p>");
        for runner in [
            CannedRunner::new(RunStatus::Exited(6), ""),
            CannedRunner::new(RunStatus::Exited(0), "<html>502 Bad Gateway</html>"),
        ] {
            let adapter = ValidatorAdapter::new(runner, ValidatorConfig::default());
            let feedback = adapter
                .validate(
                    ValidatorTarget::Html,
                    file.path(),
                    OutputFormat::Json,
                    Duration::from_secs(1),
                )
                .await
                .unwrap();
            assert_eq!(feedback, vec![VALIDATION_FAILED_MESSAGE]);
        }
    }

    #[tokio::test]
    async fn test_text_format_is_passed_through() {
        let file = submission("<p>");
        let adapter = ValidatorAdapter::new(
            CannedRunner::new(RunStatus::Exited(0), "Error: Stray end tag.\n"),
            ValidatorConfig::default(),
        );
        let feedback = adapter
            .validate(
                ValidatorTarget::Html,
                file.path(),
                OutputFormat::Text,
                Duration::from_secs(1),
            )
            .await
            .unwrap();
        assert_eq!(feedback, vec!["Error: Stray end tag."]);
    }

    #[tokio::test]
    async fn test_unsupported_format_is_an_error() {
        let file = submission("a {}");
        let adapter = ValidatorAdapter::new(
            CannedRunner::new(RunStatus::Exited(0), ""),
            ValidatorConfig::default(),
        );
        let result = adapter
            .validate(
                ValidatorTarget::Css,
                file.path(),
                OutputFormat::Xml,
                Duration::from_secs(1),
            )
            .await;
        assert!(matches!(result, Err(GradeError::UnsupportedFormat { .. })));
    }
}
