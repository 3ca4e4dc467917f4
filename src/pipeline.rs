//! Submission pipeline: admission control, harness materialization,
//! sandbox invocation, result shaping.
//!
//! Admission is three independent counting semaphores keyed by difficulty;
//! a permit is held for the whole sandbox invocation and released on every
//! exit path by its guard. There is no internal queue beyond the
//! semaphores.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::config::types::{Difficulty, Language};
use crate::config::SandboxSettings;
use crate::harness::{generator_for, HarnessPlan};
use crate::problems::ProblemHandle;
use crate::sandbox::report::{self, CaseResult, ReportError, SuiteSummary};
use crate::sandbox::{RunOutcome, SandboxRunner, SubmissionWorkspace};

/// Diagnostic cap for runtime-error messages sent to clients.
const MESSAGE_CAP: usize = 4096;

/// Judged submission, shaped for the match engine and the
/// `submission_result` frame.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SubmissionResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_results: Option<Vec<CaseResult>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_results: Option<Vec<CaseResult>>,
    pub summary: SuiteSummary,
}

impl SubmissionResult {
    pub fn failure(message: impl Into<String>, total_tests: u32) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            test_results: None,
            sample_results: None,
            summary: SuiteSummary {
                total_tests,
                passed_tests: 0,
            },
        }
    }
}

/// Judging boundary the match engine depends on; the live implementation
/// is [`SubmissionPipeline`], tests script their own.
#[async_trait]
pub trait JudgePipeline: Send + Sync {
    async fn judge(
        &self,
        problem: &ProblemHandle,
        language: Language,
        code: &str,
    ) -> SubmissionResult;
}

pub struct SubmissionPipeline {
    runner: SandboxRunner,
    easy: Arc<Semaphore>,
    medium: Arc<Semaphore>,
    hard: Arc<Semaphore>,
    base_dir: PathBuf,
}

impl SubmissionPipeline {
    pub fn new(settings: SandboxSettings) -> Self {
        let permits = settings.concurrency;
        Self {
            runner: SandboxRunner::new(settings),
            easy: Arc::new(Semaphore::new(permits.easy as usize)),
            medium: Arc::new(Semaphore::new(permits.medium as usize)),
            hard: Arc::new(Semaphore::new(permits.hard as usize)),
            base_dir: SubmissionWorkspace::default_base_dir(),
        }
    }

    pub fn with_base_dir(mut self, base_dir: PathBuf) -> Self {
        self.base_dir = base_dir;
        self
    }

    fn semaphore(&self, difficulty: Difficulty) -> &Arc<Semaphore> {
        match difficulty {
            Difficulty::Easy => &self.easy,
            Difficulty::Medium => &self.medium,
            Difficulty::Hard => &self.hard,
        }
    }

    /// Permits currently available for a difficulty (observability only).
    pub fn available_permits(&self, difficulty: Difficulty) -> usize {
        self.semaphore(difficulty).available_permits()
    }

    async fn judge_inner(
        &self,
        problem: &ProblemHandle,
        language: Language,
        code: &str,
    ) -> SubmissionResult {
        let total_tests = problem.total_tests();
        let difficulty = problem.difficulty();

        // Held until this function returns on any path.
        let _permit = match self.semaphore(difficulty).clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                return SubmissionResult::failure("judging is shutting down", total_tests);
            }
        };

        let generator = generator_for(language);
        let plan = HarnessPlan::from_validation(problem.validation_view(), code, language);
        let harness = match generator.generate(&plan) {
            Ok(harness) => harness,
            Err(e) => {
                log::error!("harness generation failed for {}: {e}", problem.id());
                return SubmissionResult::failure("failed to prepare submission", total_tests);
            }
        };

        let mut workspace = match SubmissionWorkspace::create(&self.base_dir) {
            Ok(workspace) => workspace,
            Err(e) => {
                log::error!("workspace creation failed: {e}");
                return SubmissionResult::failure("failed to prepare submission", total_tests);
            }
        };

        let result = match workspace.write_file(harness.file_name, &harness.source) {
            Ok(source_path) => {
                let outcome = self.runner.run(language, &source_path, difficulty).await;
                shape_outcome(outcome, total_tests)
            }
            Err(e) => {
                log::error!("harness materialization failed: {e}");
                SubmissionResult::failure("failed to prepare submission", total_tests)
            }
        };

        workspace.cleanup();
        result
    }
}

#[async_trait]
impl JudgePipeline for SubmissionPipeline {
    async fn judge(
        &self,
        problem: &ProblemHandle,
        language: Language,
        code: &str,
    ) -> SubmissionResult {
        self.judge_inner(problem, language, code).await
    }
}

/// Map a sandbox outcome to the submission result contract.
fn shape_outcome(outcome: RunOutcome, total_tests: u32) -> SubmissionResult {
    match outcome {
        RunOutcome::Completed {
            exit_status: 0,
            stdout,
            ..
        } => match report::parse_stdout(&stdout) {
            Ok(report) => {
                let mut summary = report.hidden_results.summary;
                // The wrapper is generated code, but its report is still
                // input: never let claimed passes exceed the suite size.
                summary.total_tests = total_tests;
                summary.passed_tests = summary.passed_tests.min(total_tests);
                SubmissionResult {
                    success: true,
                    message: None,
                    test_results: Some(report.hidden_results.test_results),
                    sample_results: Some(report.sample_results.test_results),
                    summary,
                }
            }
            Err(ReportError::Global(detail)) => SubmissionResult::failure(detail, total_tests),
            Err(ReportError::Missing) => {
                SubmissionResult::failure("invalid execution output", total_tests)
            }
            Err(ReportError::Malformed(detail)) => SubmissionResult::failure(detail, total_tests),
        },
        RunOutcome::Completed {
            exit_status,
            stdout,
            stderr,
        } => {
            let diagnostic = if stderr.trim().is_empty() { stdout } else { stderr };
            let mut message = format!("runtime error (exit {exit_status})");
            let diagnostic = diagnostic.trim();
            if !diagnostic.is_empty() {
                message.push_str(": ");
                let truncated: String = diagnostic.chars().take(MESSAGE_CAP).collect();
                message.push_str(&truncated);
            }
            SubmissionResult::failure(message, total_tests)
        }
        RunOutcome::MemoryExceeded => SubmissionResult::failure("memory limit exceeded", total_tests),
        RunOutcome::TimeLimitExceeded => SubmissionResult::failure("time limit exceeded", total_tests),
        RunOutcome::SandboxError(detail) => {
            log::error!("sandbox fault: {detail}");
            SubmissionResult::failure("execution failed, please retry", total_tests)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::report::RESULT_MARKER;

    fn completed(stdout: &str) -> RunOutcome {
        RunOutcome::Completed {
            exit_status: 0,
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }

    #[test]
    fn zero_exit_without_marker_is_invalid_output() {
        let result = shape_outcome(completed("hello\n"), 10);
        assert!(!result.success);
        assert_eq!(result.message.as_deref(), Some("invalid execution output"));
        assert_eq!(result.summary.total_tests, 10);
        assert_eq!(result.summary.passed_tests, 0);
    }

    #[test]
    fn nonzero_exit_carries_diagnostic() {
        let outcome = RunOutcome::Completed {
            exit_status: 1,
            stdout: String::new(),
            stderr: "Traceback: boom".to_string(),
        };
        let result = shape_outcome(outcome, 10);
        assert!(!result.success);
        let message = result.message.unwrap();
        assert!(message.contains("exit 1"));
        assert!(message.contains("Traceback: boom"));
    }

    #[test]
    fn limit_outcomes_map_to_fixed_messages() {
        assert_eq!(
            shape_outcome(RunOutcome::MemoryExceeded, 5).message.as_deref(),
            Some("memory limit exceeded")
        );
        assert_eq!(
            shape_outcome(RunOutcome::TimeLimitExceeded, 5).message.as_deref(),
            Some("time limit exceeded")
        );
    }

    #[test]
    fn claimed_passes_are_clamped_to_suite_size() {
        let stdout = format!(
            "{RESULT_MARKER}{{\"hidden_results\":{{\"test_results\":[],\"summary\":{{\"total_tests\":10,\"passed_tests\":99}}}},\"sample_results\":{{\"test_results\":[],\"summary\":{{\"total_tests\":0,\"passed_tests\":0}}}}}}\n"
        );
        let result = shape_outcome(completed(&stdout), 10);
        assert!(result.success);
        assert_eq!(result.summary.passed_tests, 10);
    }

    #[tokio::test]
    async fn admission_caps_match_settings() {
        let mut settings = SandboxSettings::default();
        settings.concurrency = crate::config::types::PerDifficulty {
            easy: 3,
            medium: 2,
            hard: 1,
        };
        let pipeline = SubmissionPipeline::new(settings);
        assert_eq!(pipeline.available_permits(Difficulty::Easy), 3);
        assert_eq!(pipeline.available_permits(Difficulty::Medium), 2);
        assert_eq!(pipeline.available_permits(Difficulty::Hard), 1);
    }
}
