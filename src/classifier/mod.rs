//! Output classification
//!
//! Turns decoded checker output into a [`ClassificationOutcome`]: a score tier
//! (or none) plus feedback lines. Classification is pure; recording the outcome
//! on a submission is the scorer's job.
//!
//! Checker tools were never meant to be read by a grader, so each tool gets a
//! prioritized rule list ([`PatternSet`]) rather than a grammar. Rule order
//! matters: specific failures are matched before the generic fallbacks.

pub mod mocha;
pub mod phpunit;

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::TestSpec;
use crate::runner::{ExecutionResult, TIMEOUT_MESSAGE};

pub use mocha::MochaPatterns;
pub use phpunit::PhpUnitPatterns;

/// Signature of the merge sort recursion bug from the JavaScript assignment
pub const STACK_OVERFLOW_SIGNATURE: &str = "at reverse (merge";

/// Replaces the stack trace whenever the signature shows up in stdout
pub const STACK_OVERFLOW_EXPLANATION: &str = "RangeError: Maximum call stack size exceeded. \
Your merge function keeps calling reverse without ever reaching a base case, so the \
recursion never stops. Check that every recursive call works on a smaller list and that \
an empty or single-element list is returned directly.";

/// Checker output dialect, selected by the submission's file suffix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionKind {
    Php,
    JavaScript,
    Generic,
}

impl SubmissionKind {
    pub fn from_identifier(identifier: &Path) -> Self {
        let ext = identifier
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());
        match ext.as_deref() {
            Some("php") => SubmissionKind::Php,
            Some("js" | "mjs" | "cjs") => SubmissionKind::JavaScript,
            _ => SubmissionKind::Generic,
        }
    }

    /// Tool-specific rules for simple-pattern mode, if this kind has any
    pub fn pattern_set(self) -> Option<&'static dyn PatternSet> {
        match self {
            SubmissionKind::Php => Some(&PhpUnitPatterns),
            SubmissionKind::JavaScript => Some(&MochaPatterns),
            SubmissionKind::Generic => None,
        }
    }
}

impl fmt::Display for SubmissionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SubmissionKind::Php => "php",
            SubmissionKind::JavaScript => "javascript",
            SubmissionKind::Generic => "generic",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for SubmissionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "php" | "phpunit" => Ok(SubmissionKind::Php),
            "javascript" | "js" | "mocha" | "node" => Ok(SubmissionKind::JavaScript),
            "generic" | "script" => Ok(SubmissionKind::Generic),
            other => Err(format!("unknown submission kind: {}", other)),
        }
    }
}

/// How checker output is turned into a score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationMode {
    /// Tool-specific text patterns
    SimplePattern,
    /// Process exit code only
    #[default]
    ExitCode,
}

impl FromStr for ClassificationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "simple_pattern" | "simple" | "pattern" => Ok(ClassificationMode::SimplePattern),
            "exit_code" | "exit" => Ok(ClassificationMode::ExitCode),
            other => Err(format!("unknown classification mode: {}", other)),
        }
    }
}

/// The two score tiers a rule may award
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreTiers {
    pub correct: u32,
    pub attempt: u32,
}

/// Score and feedback derived from one checker run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClassificationOutcome {
    /// `None` when no rule matched or the rule is informational only
    pub score: Option<u32>,
    pub feedback: Vec<String>,
}

impl ClassificationOutcome {
    pub fn award(score: u32, feedback: Vec<String>) -> Self {
        Self {
            score: Some(score),
            feedback,
        }
    }

    pub fn feedback_only(feedback: Vec<String>) -> Self {
        Self {
            score: None,
            feedback,
        }
    }

    pub fn is_scored(&self) -> bool {
        self.score.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.score.is_none() && self.feedback.is_empty()
    }
}

/// Prioritized rule list for one checker tool
pub trait PatternSet: Send + Sync {
    fn name(&self) -> &'static str;

    /// Classify one output stream. Returns the empty outcome when nothing matched.
    fn classify(&self, text: &str, tiers: ScoreTiers) -> ClassificationOutcome;
}

/// Compile a rule pattern once
pub(crate) fn cached(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("checker output pattern must compile"))
}

/// Replace the known merge sort stack overflow with a readable explanation
pub fn rewrite_stack_overflow(stdout: &str) -> &str {
    if stdout.contains(STACK_OVERFLOW_SIGNATURE) {
        STACK_OVERFLOW_EXPLANATION
    } else {
        stdout
    }
}

/// Classify one checker run
pub fn classify(
    kind: SubmissionKind,
    mode: ClassificationMode,
    result: &ExecutionResult,
    spec: &TestSpec,
) -> ClassificationOutcome {
    if result.timed_out {
        debug!("Checker for {} submission timed out", kind);
        return ClassificationOutcome::feedback_only(vec![TIMEOUT_MESSAGE.to_string()]);
    }

    let tiers = spec.tiers();
    let stdout = result.stdout.as_deref().map(rewrite_stack_overflow);
    let stderr = result.stderr.as_deref();

    let outcome = match (mode, kind.pattern_set()) {
        (ClassificationMode::SimplePattern, Some(rules)) => {
            classify_by_patterns(rules, stderr, stdout, tiers)
        }
        _ => classify_by_exit_code(result.exit_code, stdout, stderr, tiers),
    };

    debug!(
        "Classified {} submission ({:?}): score={:?}, {} feedback line(s)",
        kind,
        mode,
        outcome.score,
        outcome.feedback.len()
    );

    outcome
}

/// Exit code 0 earns the correct tier, anything else the attempt tier
pub fn classify_by_exit_code(
    exit_code: Option<i32>,
    stdout: Option<&str>,
    stderr: Option<&str>,
    tiers: ScoreTiers,
) -> ClassificationOutcome {
    let present = |s: Option<&str>| s.filter(|s| !s.is_empty()).map(str::to_string);

    if exit_code == Some(0) {
        ClassificationOutcome::award(tiers.correct, present(stdout).into_iter().collect())
    } else {
        let feedback = [present(stdout), present(stderr)]
            .into_iter()
            .flatten()
            .collect();
        ClassificationOutcome::award(tiers.attempt, feedback)
    }
}

/// Apply a pattern set to stderr, then stdout
///
/// The first stream producing a score wins. Failing that, the first
/// informational outcome is kept; otherwise nothing is awarded.
pub fn classify_by_patterns(
    rules: &dyn PatternSet,
    stderr: Option<&str>,
    stdout: Option<&str>,
    tiers: ScoreTiers,
) -> ClassificationOutcome {
    let mut informational = None;

    for text in [stderr, stdout].into_iter().flatten() {
        let outcome = rules.classify(text, tiers);
        if outcome.is_scored() {
            return outcome;
        }
        if informational.is_none() && !outcome.feedback.is_empty() {
            informational = Some(outcome);
        }
    }

    if informational.is_none() {
        debug!("No {} rule matched checker output", rules.name());
    }
    informational.unwrap_or_default()
}
