/// Feedback Assembly - Case Messages and Results Log
///
/// **Responsibility:**
/// Render what a student and an instructor see for each test case, and keep
/// report entries in tree order with group headers ahead of their children.

use gavel_common::types::{FeedbackEntry, FeedbackStatus, Outcome};

/// Characters kept per text field
pub const TEXT_BUDGET: usize = 1000;
pub const TRUNCATION_MARKER: &str = "\n... (truncated)";

pub const JUDGE_ERROR_NOTICE: &str =
    "Something went horribly wrong, please contact the instructor regarding this error";

/// Cut `text` to `budget` characters, appending the marker when anything was dropped
pub fn truncate(text: &str, budget: usize) -> String {
    match text.char_indices().nth(budget) {
        Some((cut, _)) => format!("{}{}", &text[..cut], TRUNCATION_MARKER),
        None => text.to_string(),
    }
}

/// Everything known about one judged test case, in display order
#[derive(Debug, Default, Clone)]
pub struct CaseDetails {
    pub notice: Option<String>,
    pub input: Option<String>,
    pub output: Option<String>,
    pub expected: Option<String>,
    /// Exit status and stderr, only for runtime errors
    pub stderr: Option<String>,
    pub judge_message: Option<String>,
    pub description: Option<String>,
    pub team_message: Option<String>,
    pub hint: Option<String>,
}

impl CaseDetails {
    /// Full detail for instructors
    pub fn privileged(&self) -> String {
        self.render(true)
    }

    /// Detail for the submitter. Outside the sample group only the
    /// validator's submitter message and the hint survive.
    pub fn public(&self, is_sample: bool) -> String {
        self.render(is_sample)
    }

    fn render(&self, full: bool) -> String {
        let mut sections: Vec<String> = Vec::new();
        if let Some(notice) = &self.notice {
            sections.push(notice.clone());
        }

        let mut section = |label: &str, text: &Option<String>, shown: bool| {
            if let (true, Some(text)) = (shown, text) {
                sections.push(format!("**{}**\n```\n{}\n```", label, truncate(text.trim_end(), TEXT_BUDGET)));
            }
        };
        section("Input", &self.input, full);
        section("Output", &self.output, full);
        section("Expected", &self.expected, full);
        section("Stderr", &self.stderr, full);
        section("Validator message", &self.judge_message, full);
        section("Description", &self.description, full);
        section("Feedback", &self.team_message, true);
        section("Hint", &self.hint, true);

        sections.join("\n")
    }
}

/// Ordered list of report entries, built while the tree is evaluated
#[derive(Debug, Default)]
pub struct FeedbackLog {
    entries: Vec<FeedbackEntry>,
}

impl FeedbackLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: FeedbackEntry) {
        self.entries.push(entry);
    }

    /// Hold a slot for an entry whose content is only known later
    pub fn reserve(&mut self, name: impl Into<String>) -> usize {
        self.entries.push(FeedbackEntry::visible(name, FeedbackStatus::Failed, ""));
        self.entries.len() - 1
    }

    pub fn fill(&mut self, slot: usize, entry: FeedbackEntry) {
        if let Some(existing) = self.entries.get_mut(slot) {
            *existing = entry;
        }
    }

    /// Public entry for every case; instructor-only entry outside the sample group
    pub fn record_case(&mut self, display_path: &str, outcome: &Outcome, is_sample: bool) {
        let status = FeedbackStatus::from(outcome.verdict.is_accepted());
        let name = format!("### {}", display_path);
        self.entries.push(FeedbackEntry::visible(name.clone(), status, outcome.to_string()));

        if !is_sample {
            let mut privileged = format!("{} ({:.4}s)", outcome.verdict, outcome.running_time);
            if !outcome.privileged_message.is_empty() {
                privileged.push('\n');
                privileged.push_str(&outcome.privileged_message);
            }
            self.entries
                .push(FeedbackEntry::hidden(format!("{} (instructor)", name), status, privileged));
        }
    }

    pub fn entries(&self) -> &[FeedbackEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<FeedbackEntry> {
        self.entries
    }
}
