//! Grader module for processing one submission
//!
//! Runs the configured checker for a submission and records the result:
//! run → decode → classify → apply, strictly in sequence. No failure in here
//! aborts a grading batch; every failure ends up as feedback on the submission.

use tracing::{info, warn};

use crate::classifier::{self, ClassificationOutcome};
use crate::config::{GraderConfig, TestSpec};
use crate::decoder;
use crate::runner::Runner;
use crate::scorer::{self, SubmissionFile};
use crate::validator::{OutputFormat, ValidatorAdapter, ValidatorTarget};

pub const CHECKER_UNAVAILABLE_MESSAGE: &str = "Test could not be run: the checker failed to start";

/// Grades submissions with one runner and one configuration
pub struct Grader<R> {
    runner: R,
    config: GraderConfig,
}

impl<R: Runner> Grader<R> {
    pub fn new(runner: R, config: GraderConfig) -> Self {
        Self { runner, config }
    }

    pub fn config(&self) -> &GraderConfig {
        &self.config
    }

    /// Grade a submission with the checker configured for its kind
    pub async fn grade(&self, submission: &mut SubmissionFile) {
        let kind = submission.kind();
        match self.config.spec_for(kind) {
            Some(spec) => self.grade_with(spec, submission).await,
            None => {
                warn!("No checker configured for {} submissions", kind);
                scorer::apply(
                    ClassificationOutcome::feedback_only(vec![format!(
                        "No checker is configured for {} submissions",
                        kind
                    )]),
                    submission,
                );
            }
        }
    }

    /// Grade a submission with an explicit test specification
    pub async fn grade_with(&self, spec: &TestSpec, submission: &mut SubmissionFile) {
        let kind = submission.kind();
        let cmd = spec.command_for(submission.identifier());

        info!(
            "Grading {:?} as {} ({:?} mode)",
            submission.identifier(),
            kind,
            spec.mode
        );

        let outcome = match self.runner.run(&cmd, spec.deadline(), None).await {
            Ok(run) => {
                let result = decoder::decode_outcome(&run);
                classifier::classify(kind, spec.mode, &result, spec)
            }
            Err(e) => {
                warn!("Checker for {:?} failed: {}", submission.identifier(), e);
                ClassificationOutcome::feedback_only(vec![CHECKER_UNAVAILABLE_MESSAGE.to_string()])
            }
        };

        scorer::apply(outcome, submission);

        info!(
            "Graded {:?}: score={:?}",
            submission.identifier(),
            submission.score()
        );
    }

    /// Validate a submission against a remote HTML/CSS validator (feedback only)
    pub async fn validate(
        &self,
        submission: &mut SubmissionFile,
        target: ValidatorTarget,
        format: OutputFormat,
    ) where
        R: Clone,
    {
        let adapter = ValidatorAdapter::new(self.runner.clone(), self.config.validator.clone());
        let feedback = match adapter
            .validate(
                target,
                submission.identifier(),
                format,
                self.config.validator.deadline(),
            )
            .await
        {
            Ok(feedback) => feedback,
            Err(e) => {
                warn!("Validation of {:?} failed: {}", submission.identifier(), e);
                vec![format!("Validation failed: {}", e)]
            }
        };

        scorer::apply(ClassificationOutcome::feedback_only(feedback), submission);
    }
}
