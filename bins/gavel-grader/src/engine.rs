/// Execution Engine - Compiling and Running the Submission
///
/// **Core Responsibility:**
/// Build the submission once, then run it against one input at a time and
/// report how the process ended.
///
/// **Critical Architectural Boundary:**
/// - Engine knows HOW to execute (local processes, limits, deadlines)
/// - Engine does NOT know scoring rules or policies
/// - Engine does NOT look at the produced output
/// - Engine returns a raw status for the test case evaluator to classify
///
/// Timeouts are enforced here; everything above treats "timed out" purely
/// as a status to classify.

use crate::config::{LanguageConfig, LanguageConfigManager};
use anyhow::{Context, Result};
use gavel_common::config::Problem;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Outcome of building the submission
#[derive(Debug, Clone, PartialEq)]
pub struct CompileResult {
    pub ok: bool,
    pub log: String,
}

impl CompileResult {
    pub fn success(log: String) -> Self {
        Self { ok: true, log }
    }

    pub fn failure(log: impl Into<String>) -> Self {
        Self {
            ok: false,
            log: log.into(),
        }
    }
}

/// How a run of the program ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Exited(i32),
    Signaled(i32),
    /// Killed at the wall-clock deadline
    TimedOut,
}

impl RunStatus {
    pub fn is_time_limit(self) -> bool {
        self == RunStatus::TimedOut
    }

    pub fn is_runtime_error(self) -> bool {
        matches!(self, RunStatus::Exited(code) if code != 0) || matches!(self, RunStatus::Signaled(_))
    }

    fn from_exit(status: ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return RunStatus::Exited(code);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return RunStatus::Signaled(signal);
            }
        }
        RunStatus::Exited(-1)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Exited(code) => write!(f, "exit code {}", code),
            RunStatus::Signaled(signal) => write!(f, "killed by signal {}", signal),
            RunStatus::TimedOut => f.write_str("timed out"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunResult {
    pub status: RunStatus,
    /// Wall-clock seconds
    pub elapsed: f64,
}

/// One run of the program: stdin from `input`, stdout/stderr into files
#[derive(Debug, Clone, Copy)]
pub struct RunSpec<'a> {
    pub input: &'a Path,
    pub output: &'a Path,
    pub error: &'a Path,
    /// Working directory of the process, never shared between concurrent runs
    pub work_dir: &'a Path,
    /// The problem's time limit, not the kill deadline
    pub time_limit: f64,
    pub memory_limit_mb: u64,
}

/// Program-execution collaborator
pub trait ProgramRunner {
    fn compile(&self) -> impl Future<Output = Result<CompileResult>> + Send;

    fn run(&self, spec: RunSpec<'_>) -> impl Future<Output = Result<RunResult>> + Send;
}

/// Wall-clock deadline after which a run is killed
pub fn kill_deadline(time_limit: f64) -> Duration {
    Duration::from_secs_f64((time_limit + 1.999).trunc().max(1.0))
}

/// Runs the submission as a local child process
///
/// **Execution Rules:**
/// 1. Submission and `include/` files are copied into a private build dir
/// 2. Language is detected from source file extensions
/// 3. Disallowed language or oversized source is a compile failure
/// 4. Each run gets a virtual memory cap and a hard wall-clock deadline
/// 5. Runs execute in the caller's `work_dir`; the build dir is only read
#[derive(Debug)]
pub struct LocalEngine {
    build_dir: PathBuf,
    language: Option<LanguageConfig>,
    sources: Vec<PathBuf>,
    /// Reason the submission cannot be built at all
    rejection: Option<String>,
    compile_timeout: Duration,
}

impl LocalEngine {
    pub fn prepare(
        submission_dir: &Path,
        languages: &LanguageConfigManager,
        problem: &Problem,
        build_dir: PathBuf,
    ) -> Result<Self> {
        std::fs::create_dir_all(&build_dir)
            .with_context(|| format!("Failed to create build directory {}", build_dir.display()))?;

        let include_dir = problem.include_dir();
        if include_dir.is_dir() {
            for file in list_files(&include_dir)? {
                copy_into(&file, &build_dir)?;
            }
        }

        let mut sources = Vec::new();
        let mut total_bytes = 0u64;
        for file in list_files(submission_dir)? {
            total_bytes += std::fs::metadata(&file)
                .with_context(|| format!("Failed to stat {}", file.display()))?
                .len();
            sources.push(copy_into(&file, &build_dir)?);
        }

        let language = languages.detect(&sources).cloned();
        let rejection = match &language {
            None => Some("Unsupported programming language: no recognised source files".to_string()),
            Some(lang) if !problem.config.language_allowed(&lang.name) => {
                Some(format!("Unsupported programming language {}", lang.name))
            }
            Some(_) if total_bytes > problem.config.limits.code_bytes() => Some(format!(
                "Source code exceeds maximum size of {} bytes",
                problem.config.limits.code_bytes()
            )),
            Some(_) => None,
        };

        let sources = match &language {
            Some(lang) => sources.into_iter().filter(|s| lang.matches(s)).collect(),
            None => sources,
        };

        info!(
            language = language.as_ref().map(|l| l.name.as_str()).unwrap_or("unknown"),
            sources = sources.len(),
            source_bytes = total_bytes,
            "Prepared submission"
        );

        Ok(Self {
            build_dir,
            language,
            sources,
            rejection,
            compile_timeout: Duration::from_secs(problem.config.limits.compilation_time),
        })
    }

    pub fn language(&self) -> Option<&LanguageConfig> {
        self.language.as_ref()
    }

    fn main_source(&self) -> Option<&PathBuf> {
        self.sources
            .iter()
            .find(|s| s.file_stem().is_some_and(|stem| stem.eq_ignore_ascii_case("main")))
            .or_else(|| self.sources.first())
    }

    /// Expand `{main}`, `{files}`, `{binary}` and `{dir}` in an argv template
    fn expand(&self, template: &[String]) -> Vec<String> {
        let dir = self.build_dir.to_string_lossy().into_owned();
        let binary = self.build_dir.join("solution").to_string_lossy().into_owned();
        let main = self
            .main_source()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut argv = Vec::with_capacity(template.len());
        for arg in template {
            if arg == "{files}" {
                argv.extend(self.sources.iter().map(|s| s.to_string_lossy().into_owned()));
            } else {
                argv.push(
                    arg.replace("{main}", &main)
                        .replace("{binary}", &binary)
                        .replace("{dir}", &dir),
                );
            }
        }
        argv
    }
}

impl ProgramRunner for LocalEngine {
    async fn compile(&self) -> Result<CompileResult> {
        if let Some(reason) = &self.rejection {
            warn!(reason = %reason, "Submission rejected before compilation");
            return Ok(CompileResult::failure(reason.clone()));
        }
        let Some(language) = &self.language else {
            return Ok(CompileResult::failure("Unsupported programming language"));
        };
        let Some(template) = &language.compile else {
            return Ok(CompileResult::success(String::new()));
        };

        let argv = self.expand(template);
        let Some((program, args)) = argv.split_first() else {
            return Ok(CompileResult::success(String::new()));
        };
        debug!(command = ?argv, "Compiling submission");

        let mut command = Command::new(program);
        command
            .args(args)
            .current_dir(&self.build_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = command
            .spawn()
            .with_context(|| format!("Failed to spawn compiler '{}'", program))?;

        match tokio::time::timeout(self.compile_timeout, child.wait_with_output()).await {
            Ok(output) => {
                let output = output.context("Failed to wait for compiler")?;
                let mut log = String::from_utf8_lossy(&output.stdout).into_owned();
                log.push_str(&String::from_utf8_lossy(&output.stderr));
                if output.status.success() {
                    Ok(CompileResult::success(log))
                } else {
                    Ok(CompileResult::failure(log))
                }
            }
            Err(_) => Ok(CompileResult::failure(format!(
                "Compilation exceeded {} seconds",
                self.compile_timeout.as_secs()
            ))),
        }
    }

    async fn run(&self, spec: RunSpec<'_>) -> Result<RunResult> {
        let language = self
            .language
            .as_ref()
            .context("No language detected for submission")?;
        let argv = self.expand(&language.run);

        let stdin = std::fs::File::open(spec.input)
            .with_context(|| format!("Failed to open {}", spec.input.display()))?;
        let stdout = std::fs::File::create(spec.output)
            .with_context(|| format!("Failed to create {}", spec.output.display()))?;
        let stderr = std::fs::File::create(spec.error)
            .with_context(|| format!("Failed to create {}", spec.error.display()))?;

        // ulimit takes KiB
        let script = format!("ulimit -v {} 2>/dev/null; exec \"$@\"", spec.memory_limit_mb * 1024);
        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(script)
            .arg("sh")
            .args(&argv)
            .current_dir(spec.work_dir)
            .stdin(Stdio::from(stdin))
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .kill_on_drop(true);

        let start = Instant::now();
        let mut child = command.spawn().context("Failed to spawn submission")?;

        let deadline = kill_deadline(spec.time_limit);
        let status = match tokio::time::timeout(deadline, child.wait()).await {
            Ok(status) => RunStatus::from_exit(status.context("Failed to wait for submission")?),
            Err(_) => {
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "Failed to kill timed-out submission");
                }
                RunStatus::TimedOut
            }
        };

        Ok(RunResult {
            status,
            elapsed: start.elapsed().as_secs_f64(),
        })
    }
}

/// Regular files directly inside `dir`, sorted
fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .collect();
    files.sort();
    Ok(files)
}

fn copy_into(file: &Path, dir: &Path) -> Result<PathBuf> {
    let name = file
        .file_name()
        .with_context(|| format!("{} has no file name", file.display()))?;
    let target = dir.join(name);
    std::fs::copy(file, &target)
        .with_context(|| format!("Failed to copy {} to {}", file.display(), target.display()))?;
    Ok(target)
}
