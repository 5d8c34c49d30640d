//! Mocha (and plain node) output rules

use std::sync::OnceLock;

use regex::Regex;

use super::{cached, ClassificationOutcome, PatternSet, ScoreTiers};

pub const PASS_MESSAGE: &str = "Mocha test passed.";

const PASS_GLYPHS: [char; 2] = ['✔', '✓'];

#[derive(Debug, Clone, Copy, Default)]
pub struct MochaPatterns;

fn failing_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached(&RE, r"(?m)^\s*(\d+ failing)\b")
}

/// `TypeError: x is not a function`, `AssertionError [ERR_ASSERTION]: ...`
fn error_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached(&RE, r"(?m)^\s*(\w*Error(?: \[\w+\])?:[^\n]*)$")
}

fn first_error_line(text: &str) -> Option<String> {
    error_line()
        .captures(text)
        .map(|caps| caps[1].trim_end().to_string())
}

impl PatternSet for MochaPatterns {
    fn name(&self) -> &'static str {
        "mocha"
    }

    fn classify(&self, text: &str, tiers: ScoreTiers) -> ClassificationOutcome {
        // A suite with failures also prints the pass glyph for the tests that passed
        if let Some(caps) = failing_line().captures(text) {
            return match first_error_line(text) {
                Some(error) => {
                    ClassificationOutcome::award(tiers.attempt, vec![caps[1].to_string(), error])
                }
                None => ClassificationOutcome::default(),
            };
        }

        if text.contains(PASS_GLYPHS) {
            return ClassificationOutcome::award(tiers.correct, vec![PASS_MESSAGE.to_string()]);
        }

        if text.contains("Error") {
            if let Some(error) = first_error_line(text) {
                return ClassificationOutcome::award(tiers.attempt, vec![error]);
            }
        }

        ClassificationOutcome::default()
    }
}
