use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome kind of a test case or test group.
///
/// Variants are declared from least to most severe, so the derived `Ord`
/// is the severity order used when picking the worst outcome.
/// `JudgeError` always dominates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Verdict {
    #[serde(rename = "AC")]
    Accepted,
    #[serde(rename = "WA")]
    WrongAnswer,
    #[serde(rename = "OLE")]
    OutputLimitExceeded,
    #[serde(rename = "TLE")]
    TimeLimitExceeded,
    #[serde(rename = "RTE")]
    RuntimeError,
    #[serde(rename = "CE")]
    CompileError,
    #[serde(rename = "JE")]
    JudgeError,
}

impl Verdict {
    pub fn is_accepted(self) -> bool {
        self == Verdict::Accepted
    }

    pub fn code(self) -> &'static str {
        match self {
            Verdict::Accepted => "AC",
            Verdict::WrongAnswer => "WA",
            Verdict::OutputLimitExceeded => "OLE",
            Verdict::TimeLimitExceeded => "TLE",
            Verdict::RuntimeError => "RTE",
            Verdict::CompileError => "CE",
            Verdict::JudgeError => "JE",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Verdict::Accepted => "Accepted",
            Verdict::WrongAnswer => "Wrong Answer",
            Verdict::OutputLimitExceeded => "Output Limit Exceeded",
            Verdict::TimeLimitExceeded => "Time Limit Exceeded",
            Verdict::RuntimeError => "Run Time Error",
            Verdict::CompileError => "Compile Error",
            Verdict::JudgeError => "Judge Error",
        };
        f.write_str(name)
    }
}

/// Whether a problem awards partial credit or a binary pass/fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProblemKind {
    #[default]
    PassFail,
    Scoring,
}

impl fmt::Display for ProblemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProblemKind::PassFail => f.write_str("pass-fail"),
            ProblemKind::Scoring => f.write_str("scoring"),
        }
    }
}

/// Result of judging a single test case or folding a whole group.
///
/// Outcomes are built bottom-up and never mutated after construction;
/// aggregation always produces a fresh value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub verdict: Verdict,
    pub score: f64,
    /// Seconds. For groups this is the maximum over children.
    pub running_time: f64,
    /// Detail safe to show to the submitter.
    pub public_message: String,
    /// Full detail for instructors only.
    pub privileged_message: String,
}

impl Outcome {
    pub fn new(verdict: Verdict, score: f64, running_time: f64) -> Self {
        Self {
            verdict,
            score,
            running_time,
            public_message: String::new(),
            privileged_message: String::new(),
        }
    }

    /// Same text for both audiences
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        let message = message.into();
        self.public_message = message.clone();
        self.privileged_message = message;
        self
    }

    pub fn with_messages(mut self, public: String, privileged: String) -> Self {
        self.public_message = public;
        self.privileged_message = privileged;
        self
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:.4}s)", self.verdict, self.running_time)?;
        if !self.public_message.is_empty() {
            write!(f, "\n{}", self.public_message)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackStatus {
    Passed,
    Failed,
}

impl From<bool> for FeedbackStatus {
    fn from(passed: bool) -> Self {
        if passed {
            FeedbackStatus::Passed
        } else {
            FeedbackStatus::Failed
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Visible,
    /// Instructors only
    Hidden,
}

/// One named entry of the results file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackEntry {
    pub name: String,
    pub status: FeedbackStatus,
    pub output: String,
    pub visibility: Visibility,
}

impl FeedbackEntry {
    pub fn visible(name: impl Into<String>, status: FeedbackStatus, output: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status,
            output: output.into(),
            visibility: Visibility::Visible,
        }
    }

    pub fn hidden(name: impl Into<String>, status: FeedbackStatus, output: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status,
            output: output.into(),
            visibility: Visibility::Hidden,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub verdict: Verdict,
    pub max_score: f64,
    /// Aggregated score before pass-fail normalization
    pub raw_score: f64,
}

/// Final results file, laid out the way Gradescope expects it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeReport {
    pub score: f64,
    pub execution_time: f64,
    pub output: String,
    pub output_format: String,
    pub test_output_format: String,
    pub test_name_format: String,
    pub visibility: String,
    pub stdout_visibility: String,
    pub extra_data: ReportSummary,
    pub tests: Vec<FeedbackEntry>,
}

impl GradeReport {
    pub fn new(summary: ReportSummary, score: f64, execution_time: f64, output: String, tests: Vec<FeedbackEntry>) -> Self {
        Self {
            score,
            execution_time,
            output,
            output_format: "md".to_string(),
            test_output_format: "md".to_string(),
            test_name_format: "md".to_string(),
            visibility: "visible".to_string(),
            stdout_visibility: "visible".to_string(),
            extra_data: summary,
            tests,
        }
    }
}
