//! # Scorer Module
//!
//! Records classification outcomes on the submission being graded. This is the
//! only place a submission's score or feedback changes.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::classifier::{ClassificationOutcome, SubmissionKind};

/// One student artifact under grading
///
/// Feedback is append-only. The score is only ever set to one of the tiers a
/// classifier awarded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionFile {
    identifier: PathBuf,
    score: Option<u32>,
    feedback: Vec<String>,
}

impl SubmissionFile {
    pub fn new(identifier: impl Into<PathBuf>) -> Self {
        Self {
            identifier: identifier.into(),
            score: None,
            feedback: Vec::new(),
        }
    }

    pub fn identifier(&self) -> &Path {
        &self.identifier
    }

    /// Output dialect to classify against, from the file suffix
    pub fn kind(&self) -> SubmissionKind {
        SubmissionKind::from_identifier(&self.identifier)
    }

    pub fn score(&self) -> Option<u32> {
        self.score
    }

    pub fn feedback(&self) -> &[String] {
        &self.feedback
    }
}

/// Apply an outcome to a submission
///
/// The score changes only when the outcome carries one; feedback lines are
/// appended in order. Applying the same outcome twice appends its feedback twice.
pub fn apply(outcome: ClassificationOutcome, submission: &mut SubmissionFile) {
    if let Some(score) = outcome.score {
        submission.score = Some(score);
    }
    submission.feedback.extend(outcome.feedback);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_sets_score_and_appends_feedback() {
        let mut submission = SubmissionFile::new("task_01/question_1.php");
        apply(
            ClassificationOutcome::award(2, vec!["All tests passed.".into()]),
            &mut submission,
        );

        assert_eq!(submission.score(), Some(2));
        assert_eq!(submission.feedback(), ["All tests passed."]);
        assert_eq!(submission.kind(), SubmissionKind::Php);
    }

    #[test]
    fn test_unscored_outcome_keeps_prior_score() {
        let mut submission = SubmissionFile::new("index.html");
        apply(ClassificationOutcome::award(1, vec![]), &mut submission);
        apply(
            ClassificationOutcome::feedback_only(vec!["Test failed due to timeout".into()]),
            &mut submission,
        );

        assert_eq!(submission.score(), Some(1));
        assert_eq!(submission.feedback(), ["Test failed due to timeout"]);
    }

    #[test]
    fn test_feedback_only_grows() {
        let mut submission = SubmissionFile::new("merge.js");
        let outcome = ClassificationOutcome::award(1, vec!["1 failing".into(), "TypeError: x".into()]);
        apply(outcome.clone(), &mut submission);
        apply(outcome, &mut submission);

        assert_eq!(submission.feedback().len(), 4);
        assert_eq!(submission.feedback()[2], "1 failing");
    }

    #[test]
    fn test_empty_outcome_changes_nothing() {
        let mut submission = SubmissionFile::new("q.py");
        apply(ClassificationOutcome::default(), &mut submission);
        assert_eq!(submission, SubmissionFile::new("q.py"));
    }
}
