//! PHPUnit output rules

use std::sync::OnceLock;

use regex::Regex;

use super::{cached, ClassificationOutcome, PatternSet, ScoreTiers};

pub const PASS_MESSAGE: &str = "All tests passed.";

/// Rules for PHPUnit and the PHP interpreter errors that surface through it
#[derive(Debug, Clone, Copy, Default)]
pub struct PhpUnitPatterns;

/// PHPUnit's `OK (3 tests, 3 assertions)` summary line
fn ok_summary() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached(&RE, r"(?m)^[ \t]*OK\b")
}

fn name_in_use() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached(
        &RE,
        r"(Cannot (?:re)?declare [^\n]*?because the name is already in use)",
    )
}

fn undefined_function() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached(&RE, r"Call to undefined function ([\w\\]+)\(\)")
}

fn syntax_error() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached(
        &RE,
        r"(?m)(syntax error[^\n]*?)(?:\s+in\s+\S+?)?(?:\s+on line (\d+))?[ \t\r]*$",
    )
}

fn summary_header() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached(&RE, r"There (?:was|were) \d+ (?:errors?|failures?):")
}

fn summary_trailer() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached(&RE, r"(?:FAILURES|ERRORS)!")
}

/// `1) question_1Test::testAddition` test headings
fn numbered_scaffold() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached(&RE, r"\b\d+\)[ \t]*[\w\\]+::test\w*")
}

/// Unnumbered test names opening a line or following the summary header
fn leading_scaffold() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached(
        &RE,
        r"(?m)^(There (?:was|were) \d+ (?:errors?|failures?):)?[ \t]*[\w\\]+::test\w*",
    )
}

fn location_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached(&RE, r"(?m)^\s*\S+\.php:\d+\s*$")
}

fn warning_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached(&RE, r"(?m)^\s*(?:PHP )?Warning:[^\n]*$")
}

impl PhpUnitPatterns {
    fn fatal_error(&self, text: &str) -> Option<String> {
        if let Some(caps) = name_in_use().captures(text) {
            return Some(format!("Fatal error: {}", &caps[1]));
        }
        if let Some(caps) = undefined_function().captures(text) {
            return Some(format!(
                "Fatal error: Call to undefined function {}()",
                &caps[1]
            ));
        }
        syntax_error().captures(text).map(|caps| {
            let mut line = format!("Parse error: {}", caps[1].trim_end());
            if let Some(n) = caps.get(2) {
                line.push_str(&format!(" on line {}", n.as_str()));
            }
            line
        })
    }

    /// The "There was N failure:" block without test scaffolding and file locations
    fn failure_summary(&self, text: &str) -> Option<String> {
        let header = summary_header().find(text)?;
        let block = &text[header.start()..];
        let block = match summary_trailer().find(block) {
            Some(trailer) => &block[..trailer.start()],
            None => block,
        };

        let block = numbered_scaffold().replace_all(block, "");
        let block = leading_scaffold().replace_all(&block, "${1} ");
        let block = location_line().replace_all(&block, "");
        let cleaned = block.split_whitespace().collect::<Vec<_>>().join(" ");

        Some(cleaned)
    }
}

impl PatternSet for PhpUnitPatterns {
    fn name(&self) -> &'static str {
        "phpunit"
    }

    fn classify(&self, text: &str, tiers: ScoreTiers) -> ClassificationOutcome {
        // Failure messages may quote "OK"; a failed run never counts as a pass
        if ok_summary().is_match(text) && !summary_trailer().is_match(text) {
            return ClassificationOutcome::award(
                tiers.correct,
                vec![
                    PASS_MESSAGE.to_string(),
                    format!(
                        "Awarded {} for attempt + {} for passing the tests.",
                        tiers.attempt,
                        tiers.correct.saturating_sub(tiers.attempt)
                    ),
                ],
            );
        }

        if let Some(line) = self.fatal_error(text) {
            return ClassificationOutcome::award(tiers.attempt, vec![line]);
        }

        if let Some(summary) = self.failure_summary(text) {
            return ClassificationOutcome::award(tiers.attempt, vec![summary]);
        }

        let warnings: Vec<String> = warning_line()
            .find_iter(text)
            .map(|m| m.as_str().trim().to_string())
            .collect();
        if !warnings.is_empty() {
            return ClassificationOutcome::feedback_only(warnings);
        }

        ClassificationOutcome::default()
    }
}
