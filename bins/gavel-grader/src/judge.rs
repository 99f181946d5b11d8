/// Test Case Evaluator
///
/// **Core Responsibility:**
/// Judge one input/answer pair: run the program, classify the run, hand the
/// output to the validator, and build the outcome with its messages.
///
/// **Classification order:**
/// 1. TLE (killed at deadline or slower than the time limit)
/// 2. RTE (non-zero exit or signal)
/// 3. OLE (output larger than the limit; never validated)
/// 4. Validator exit: accept → AC, reject → WA, anything else → JE
///
/// Failures of the runner or validator themselves are JE outcomes, never
/// errors: leaf failures always fold upward as values.

use crate::engine::{ProgramRunner, RunSpec};
use crate::evaluator::classify_run;
use crate::feedback::{truncate, CaseDetails, JUDGE_ERROR_NOTICE, TEXT_BUDGET, TRUNCATION_MARKER};
use crate::validator::{OutputValidator, ValidationRequest, ValidatorExit, JUDGE_MESSAGE_FILE, SCORE_FILE, TEAM_MESSAGE_FILE};
use anyhow::{Context, Result};
use gavel_common::config::Problem;
use gavel_common::policy::GradingPolicy;
use gavel_common::suite::TestCase;
use gavel_common::types::{Outcome, Verdict};
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;
use tracing::{debug, error, instrument};

/// Per-problem settings every test case evaluation needs
#[derive(Debug, Clone)]
pub struct JudgeSettings {
    /// Seconds
    pub time_limit: f64,
    pub memory_limit_mb: u64,
    pub output_limit_bytes: u64,
    pub validator_flags: Vec<String>,
    /// Parent of every per-case scratch directory
    pub work_dir: PathBuf,
}

impl JudgeSettings {
    pub fn from_problem(problem: &Problem, work_dir: PathBuf) -> Self {
        Self {
            time_limit: problem.time_limit,
            memory_limit_mb: problem.config.limits.memory,
            output_limit_bytes: problem.config.limits.output_bytes(),
            validator_flags: problem.config.validator_flags.clone(),
            work_dir,
        }
    }
}

pub struct CaseJudge<'a, R, V> {
    runner: &'a R,
    validator: &'a V,
    settings: &'a JudgeSettings,
}

impl<'a, R, V> CaseJudge<'a, R, V>
where
    R: ProgramRunner + Sync,
    V: OutputValidator + Sync,
{
    pub fn new(runner: &'a R, validator: &'a V, settings: &'a JudgeSettings) -> Self {
        Self {
            runner,
            validator,
            settings,
        }
    }

    /// Judge one test case. `policy` is the enclosing group's policy.
    #[instrument(skip_all, fields(case = %case.display_path))]
    pub async fn evaluate(&self, case: &TestCase, policy: &GradingPolicy, is_sample: bool) -> Outcome {
        let mut details = CaseDetails::default();
        let outcome = match self.judge(case, policy, &mut details).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = ?e, "Judging infrastructure failed");
                details.judge_message = Some(format!("{:#}", e));
                Outcome::new(Verdict::JudgeError, policy.reject_score, 0.0)
            }
        };

        if outcome.verdict == Verdict::JudgeError {
            details.notice = Some(JUDGE_ERROR_NOTICE.to_string());
        }
        self.attach_case_files(case, &mut details).await;

        debug!(verdict = ?outcome.verdict, score = outcome.score, running_time = outcome.running_time, "Test case judged");
        outcome.with_messages(details.public(is_sample), details.privileged())
    }

    async fn judge(&self, case: &TestCase, policy: &GradingPolicy, details: &mut CaseDetails) -> Result<Outcome> {
        // Private scratch space, removed when this evaluation ends
        let scratch = tempfile::Builder::new()
            .prefix("case")
            .tempdir_in(&self.settings.work_dir)
            .context("Failed to create scratch directory")?;
        let output = scratch.path().join("output");
        let error = scratch.path().join("error");
        let feedback_dir = scratch.path().join("feedback");
        tokio::fs::create_dir(&feedback_dir)
            .await
            .context("Failed to create feedback directory")?;
        // The program's cwd, kept apart from the files the grader reads back
        let run_dir = scratch.path().join("run");
        tokio::fs::create_dir(&run_dir)
            .await
            .context("Failed to create run directory")?;

        let input = case.input();
        let run = self
            .runner
            .run(RunSpec {
                input: &input,
                output: &output,
                error: &error,
                work_dir: &run_dir,
                time_limit: self.settings.time_limit,
                memory_limit_mb: self.settings.memory_limit_mb,
            })
            .await
            .context("Failed to run submission")?;

        let reject = |verdict: Verdict| Outcome::new(verdict, policy.reject_score, run.elapsed);

        if let Some(verdict) = classify_run(&run, self.settings.time_limit) {
            if verdict == Verdict::RuntimeError {
                let stderr = read_excerpt(&error).await.unwrap_or_default();
                details.stderr = Some(format!("Exit status: {}\n{}", run.status, stderr));
            }
            return Ok(reject(verdict));
        }

        details.output = read_excerpt(&output).await;
        let output_size = tokio::fs::metadata(&output).await.map(|m| m.len()).unwrap_or(0);
        if output_size > self.settings.output_limit_bytes {
            debug!(bytes = output_size, limit = self.settings.output_limit_bytes, "Output limit exceeded");
            return Ok(reject(Verdict::OutputLimitExceeded));
        }

        let answer = case.answer();
        let exit = self
            .validator
            .validate(ValidationRequest {
                input: &input,
                answer: &answer,
                feedback_dir: &feedback_dir,
                output: &output,
                flags: &self.settings.validator_flags,
            })
            .await
            .context("Failed to run output validator")?;

        details.judge_message = read_excerpt(&feedback_dir.join(JUDGE_MESSAGE_FILE)).await;
        details.team_message = read_excerpt(&feedback_dir.join(TEAM_MESSAGE_FILE)).await;

        match exit {
            ValidatorExit::Accepted => {
                let score = match read_excerpt(&feedback_dir.join(SCORE_FILE)).await {
                    Some(raw) => parse_score(&raw)?,
                    None => policy.accept_score,
                };
                Ok(Outcome::new(Verdict::Accepted, score, run.elapsed))
            }
            ValidatorExit::Rejected => Ok(reject(Verdict::WrongAnswer)),
            ValidatorExit::Other(code) => {
                error!(exit_code = ?code, "Output validator exited abnormally");
                let note = format!("Validator exited with {:?}", code);
                details.judge_message = Some(match details.judge_message.take() {
                    Some(message) => format!("{}\n{}", note, message),
                    None => note,
                });
                Ok(reject(Verdict::JudgeError))
            }
        }
    }

    async fn attach_case_files(&self, case: &TestCase, details: &mut CaseDetails) {
        details.input = read_excerpt(&case.input()).await;
        details.expected = read_excerpt(&case.answer()).await;
        details.description = read_excerpt(&case.description()).await;
        details.hint = read_excerpt(&case.hint()).await;
    }
}

fn parse_score(raw: &str) -> Result<f64> {
    let score: f64 = raw
        .trim()
        .parse()
        .with_context(|| format!("Validator wrote an unparseable score '{}'", raw.trim()))?;
    anyhow::ensure!(score.is_finite(), "Validator wrote a non-finite score {}", score);
    Ok(score)
}

/// Read the head of a text file, enough to fill the display budget.
/// Missing or unreadable files read as `None`.
async fn read_excerpt(path: &Path) -> Option<String> {
    let file = tokio::fs::File::open(path).await.ok()?;
    // Four bytes per char covers any UTF-8 text; one extra byte detects overflow
    let limit = (TEXT_BUDGET * 4 + 1) as u64;
    let mut bytes = Vec::new();
    file.take(limit).read_to_end(&mut bytes).await.ok()?;

    let overflow = bytes.len() as u64 == limit;
    if overflow {
        bytes.pop();
    }
    let text = String::from_utf8_lossy(&bytes);
    let mut excerpt = truncate(&text, TEXT_BUDGET);
    if overflow && !excerpt.ends_with(TRUNCATION_MARKER) {
        excerpt.push_str(TRUNCATION_MARKER);
    }
    Some(excerpt)
}
