/// Output Validator - Deciding Correctness of One Run
///
/// The validator is an external executable invoked as
/// `validator <input> <answer> <feedback_dir> [flags...]` with the produced
/// output on stdin. It exits 42 to accept and 43 to reject; any other exit
/// is a fault in the judging pipeline, not in the submission.
///
/// It may leave these files in `feedback_dir`:
/// - `judgemessage.txt` (instructors)
/// - `teammessage.txt` (submitter)
/// - `score.txt` (numeric partial score)

use anyhow::{Context, Result};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::warn;

pub const EXIT_AC: i32 = 42;
pub const EXIT_WA: i32 = 43;

pub const JUDGE_MESSAGE_FILE: &str = "judgemessage.txt";
pub const TEAM_MESSAGE_FILE: &str = "teammessage.txt";
pub const SCORE_FILE: &str = "score.txt";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidatorExit {
    Accepted,
    Rejected,
    /// Crashed, killed, or exited with an unexpected code
    Other(Option<i32>),
}

impl ValidatorExit {
    pub fn from_code(code: Option<i32>) -> Self {
        match code {
            Some(EXIT_AC) => ValidatorExit::Accepted,
            Some(EXIT_WA) => ValidatorExit::Rejected,
            other => ValidatorExit::Other(other),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ValidationRequest<'a> {
    pub input: &'a Path,
    pub answer: &'a Path,
    pub feedback_dir: &'a Path,
    /// Produced output, streamed to the validator's stdin
    pub output: &'a Path,
    pub flags: &'a [String],
}

/// Output-validation collaborator
pub trait OutputValidator {
    fn validate(&self, request: ValidationRequest<'_>) -> impl Future<Output = Result<ValidatorExit>> + Send;
}

/// Runs a validator executable as a child process
#[derive(Debug, Clone)]
pub struct ExternalValidator {
    program: PathBuf,
    timeout: Duration,
}

impl ExternalValidator {
    pub fn new(program: PathBuf, timeout: Duration) -> Self {
        Self { program, timeout }
    }
}

impl OutputValidator for ExternalValidator {
    async fn validate(&self, request: ValidationRequest<'_>) -> Result<ValidatorExit> {
        let stdin = std::fs::File::open(request.output)
            .with_context(|| format!("Failed to open produced output {}", request.output.display()))?;

        let mut child = Command::new(&self.program)
            .arg(request.input)
            .arg(request.answer)
            .arg(request.feedback_dir)
            .args(request.flags)
            .stdin(Stdio::from(stdin))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn validator {}", self.program.display()))?;

        match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(status) => {
                let status = status.context("Failed to wait for validator")?;
                Ok(ValidatorExit::from_code(status.code()))
            }
            Err(_) => {
                warn!(
                    validator = %self.program.display(),
                    timeout_secs = self.timeout.as_secs(),
                    "Validator timed out"
                );
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "Failed to kill timed-out validator");
                }
                Ok(ValidatorExit::Other(None))
            }
        }
    }
}
