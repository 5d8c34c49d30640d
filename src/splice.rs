//! Student code regions
//!
//! Assignment templates mark the part students edit with a pair of marker
//! lines. These helpers cut that region out of a submission and drop it into a
//! fresh copy of the template, so tests always run against the official
//! scaffolding.

use crate::decoder;

pub const DEFAULT_START_MARKER: &str = "// StartStudentCode";
pub const DEFAULT_END_MARKER: &str = "// EndStudentCode";

/// Marker lines delimiting the student region, compared after trimming
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Markers<'a> {
    pub start: &'a str,
    pub end: &'a str,
}

impl Default for Markers<'static> {
    fn default() -> Self {
        Self {
            start: DEFAULT_START_MARKER,
            end: DEFAULT_END_MARKER,
        }
    }
}

/// A source file split around its student region. Marker lines belong to none
/// of the parts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeRegions {
    pub pre: String,
    pub code: String,
    pub post: String,
}

#[derive(Clone, Copy, PartialEq)]
enum Region {
    Pre,
    Code,
    Post,
}

pub fn extract_code(source: &str, markers: Markers<'_>) -> CodeRegions {
    let mut regions = CodeRegions::default();
    let mut region = Region::Pre;

    for line in source.split_inclusive('\n') {
        let trimmed = line.trim();
        match region {
            Region::Pre if trimmed == markers.start => region = Region::Code,
            Region::Code if trimmed == markers.end => region = Region::Post,
            Region::Pre => regions.pre.push_str(line),
            Region::Code => regions.code.push_str(line),
            Region::Post => regions.post.push_str(line),
        }
    }

    regions
}

/// Same as [`extract_code`] for undecoded file contents
pub fn extract_code_bytes(raw: &[u8], markers: Markers<'_>) -> CodeRegions {
    extract_code(&decoder::decode_bytes(raw), markers)
}

/// Template `base` with its student region replaced by the one from `overlay`
pub fn merge_code(base: &str, overlay: &str, markers: Markers<'_>) -> String {
    let base = extract_code(base, markers);
    let overlay = extract_code(overlay, markers);

    let mut merged = base.pre;
    ensure_line_break(&mut merged);
    merged.push_str(markers.start);
    merged.push('\n');
    merged.push_str(&overlay.code);
    ensure_line_break(&mut merged);
    merged.push_str(markers.end);
    merged.push('\n');
    merged.push_str(&base.post);
    merged
}

fn ensure_line_break(text: &mut String) {
    if !text.is_empty() && !text.ends_with('\n') {
        text.push('\n');
    }
}
