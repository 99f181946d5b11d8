/// Test Collaborators - In-Process Runner and Validator
///
/// **Responsibility:**
/// Stand in for the local engine and the external validator so grading
/// logic can be exercised without spawning processes.

use crate::engine::{CompileResult, ProgramRunner, RunResult, RunSpec, RunStatus};
use crate::validator::{OutputValidator, ValidationRequest, ValidatorExit, JUDGE_MESSAGE_FILE, SCORE_FILE};
use anyhow::{bail, Result};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Fake program whose behaviour is scripted by the test input:
/// - `tle` → killed at the deadline
/// - `rte` → exit code 3 with a message on stderr
/// - `ole <n>` → writes `n` bytes
/// - `slow <secs>` → echoes the input, reporting `secs` elapsed
/// - anything else → echoes the input
///
/// Echoed input takes a detour through `scratch.txt` in the run's working
/// directory, so runs sharing a directory clobber each other.
pub struct FakeRunner {
    compile_ok: bool,
    broken: bool,
    runs: Mutex<Vec<PathBuf>>,
    work_dirs: Mutex<Vec<PathBuf>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self {
            compile_ok: true,
            broken: false,
            runs: Mutex::new(Vec::new()),
            work_dirs: Mutex::new(Vec::new()),
        }
    }

    pub fn not_compiling() -> Self {
        Self {
            compile_ok: false,
            ..Self::new()
        }
    }

    /// Every run fails as an infrastructure error
    pub fn failing() -> Self {
        Self {
            broken: true,
            ..Self::new()
        }
    }

    /// Inputs in the order they were run
    pub fn runs(&self) -> Vec<PathBuf> {
        self.runs.lock().unwrap().clone()
    }

    pub fn run_count(&self) -> usize {
        self.runs.lock().unwrap().len()
    }

    /// Working directories in the order runs started
    pub fn work_dirs(&self) -> Vec<PathBuf> {
        self.work_dirs.lock().unwrap().clone()
    }
}

impl ProgramRunner for FakeRunner {
    async fn compile(&self) -> Result<CompileResult> {
        if self.compile_ok {
            Ok(CompileResult::success(String::new()))
        } else {
            Ok(CompileResult::failure("main.cpp:3:1: error: expected ';' before '}' token"))
        }
    }

    async fn run(&self, spec: RunSpec<'_>) -> Result<RunResult> {
        self.runs.lock().unwrap().push(spec.input.to_path_buf());
        self.work_dirs.lock().unwrap().push(spec.work_dir.to_path_buf());
        if self.broken {
            bail!("sandbox unavailable");
        }

        let input = tokio::fs::read_to_string(spec.input).await?;
        let command = input.trim();
        let mut stdout = input.clone();
        let mut stderr = String::new();
        let mut result = RunResult {
            status: RunStatus::Exited(0),
            elapsed: 0.01,
        };

        if command == "tle" {
            stdout.clear();
            result = RunResult {
                status: RunStatus::TimedOut,
                elapsed: spec.time_limit + 1.0,
            };
        } else if command == "rte" {
            stdout.clear();
            stderr = "segfault in solve()".to_string();
            result.status = RunStatus::Exited(3);
        } else if let Some(size) = command.strip_prefix("ole ") {
            stdout = "x".repeat(size.parse()?);
        } else if let Some(secs) = command.strip_prefix("slow ") {
            result.elapsed = secs.parse()?;
        } else {
            let scratch = spec.work_dir.join("scratch.txt");
            tokio::fs::write(&scratch, &input).await?;
            tokio::task::yield_now().await;
            stdout = tokio::fs::read_to_string(&scratch).await?;
        }

        tokio::fs::write(spec.output, stdout).await?;
        tokio::fs::write(spec.error, stderr).await?;
        Ok(result)
    }
}

/// Token-free diff validator. Answers containing `crash` make it exit abnormally.
pub struct FakeValidator {
    score: Option<String>,
    calls: AtomicUsize,
    flags: Mutex<Vec<String>>,
}

impl FakeValidator {
    pub fn new() -> Self {
        Self {
            score: None,
            calls: AtomicUsize::new(0),
            flags: Mutex::new(Vec::new()),
        }
    }

    /// Writes `score` to the score file on every accept
    pub fn with_score(score: &str) -> Self {
        Self {
            score: Some(score.to_string()),
            ..Self::new()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_flags(&self) -> Vec<String> {
        self.flags.lock().unwrap().clone()
    }
}

impl OutputValidator for FakeValidator {
    async fn validate(&self, request: ValidationRequest<'_>) -> Result<ValidatorExit> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.flags.lock().unwrap() = request.flags.to_vec();

        let answer = tokio::fs::read_to_string(request.answer).await?;
        if answer.contains("crash") {
            return Ok(ValidatorExit::Other(Some(1)));
        }

        let output = tokio::fs::read_to_string(request.output).await?;
        if output.trim() == answer.trim() {
            if let Some(score) = &self.score {
                tokio::fs::write(request.feedback_dir.join(SCORE_FILE), score).await?;
            }
            Ok(ValidatorExit::Accepted)
        } else {
            tokio::fs::write(request.feedback_dir.join(JUDGE_MESSAGE_FILE), "output differs").await?;
            Ok(ValidatorExit::Rejected)
        }
    }
}
