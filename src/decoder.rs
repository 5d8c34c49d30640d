//! Checker output decoding
//!
//! Checkers print whatever bytes the student's code produced. Grading must not
//! fail on any of it, so decoding walks a fixed chain of encodings and settles
//! for empty text when nothing fits.

use crate::runner::{ExecutionResult, RunOutcome, RunStatus};

/// Substrings some checker tools inject into their output (banners etc.)
pub const INJECTED_MARKERS: &[&str] = &["#StandWithUkraine"];

/// Text encodings tried, in order, when decoding checker output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    Latin1,
    Ascii,
}

pub const FALLBACK_CHAIN: [TextEncoding; 3] =
    [TextEncoding::Utf8, TextEncoding::Latin1, TextEncoding::Ascii];

impl TextEncoding {
    /// Strict decode, `None` if `raw` is not valid in this encoding
    pub fn decode(self, raw: &[u8]) -> Option<String> {
        match self {
            TextEncoding::Utf8 => std::str::from_utf8(raw).ok().map(str::to_owned),
            // Every byte is a Latin-1 code point
            TextEncoding::Latin1 => Some(raw.iter().map(|&b| char::from(b)).collect()),
            TextEncoding::Ascii => raw
                .is_ascii()
                .then(|| raw.iter().map(|&b| char::from(b)).collect()),
        }
    }
}

/// Decode bytes through the fallback chain without touching the content
pub fn decode_bytes(raw: &[u8]) -> String {
    FALLBACK_CHAIN
        .iter()
        .find_map(|encoding| encoding.decode(raw))
        .unwrap_or_default()
}

/// Remove injected marker substrings
pub fn strip_markers(text: &str) -> String {
    INJECTED_MARKERS
        .iter()
        .fold(text.to_string(), |acc, marker| acc.replace(marker, ""))
}

/// Decode checker output for classification
pub fn decode(raw: &[u8]) -> String {
    strip_markers(&decode_bytes(raw))
}

fn non_empty(text: String) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Turn a raw run outcome into the decoded execution result
pub fn decode_outcome(outcome: &RunOutcome) -> ExecutionResult {
    let exit_code = match outcome.status {
        RunStatus::TimedOut => return ExecutionResult::timed_out(),
        RunStatus::Exited(code) => code,
        // Shell convention for a process killed by a signal
        RunStatus::Signaled(signal) => 128 + signal,
    };

    ExecutionResult {
        stdout: non_empty(decode(&outcome.stdout)),
        stderr: non_empty(decode(&outcome.stderr)),
        exit_code: Some(exit_code),
        timed_out: false,
    }
}
