/// Test Group Evaluator - Recursive Tree Walk
///
/// **Evaluation order for one group:**
/// 1. Header entry reserved (so it precedes the group's children)
/// 2. Case pass: direct test cases in sorted order
/// 3. Subgroup pass: only if the case pass did not break
/// 4. Fold: `aggregate` over everything gathered, in order
///
/// **Break semantics:**
/// With `on_reject: break`, the first rejected test case ends the group's
/// evaluation entirely (subgroups included), and the first rejected
/// subgroup ends the subgroup pass.
///
/// **Concurrency:**
/// Direct test cases of a `continue` group may run `parallel_tests` at a
/// time. Results are consumed in sorted order, so feedback and aggregation
/// are identical to a sequential run. `break` groups and subgroups are
/// always sequential.

use crate::engine::ProgramRunner;
use crate::evaluator::{aggregate, reaches_max};
use crate::feedback::FeedbackLog;
use crate::judge::CaseJudge;
use crate::validator::OutputValidator;
use futures_util::future::BoxFuture;
use futures_util::stream::{self, StreamExt};
use futures_util::FutureExt;
use gavel_common::suite::TestGroup;
use gavel_common::types::{FeedbackEntry, FeedbackStatus, Outcome, Verdict};
use tracing::{debug, error, info, warn};

pub struct GroupEvaluator<'a, R, V> {
    judge: CaseJudge<'a, R, V>,
    parallel_tests: usize,
}

impl<'a, R, V> GroupEvaluator<'a, R, V>
where
    R: ProgramRunner + Sync,
    V: OutputValidator + Sync,
{
    pub fn new(judge: CaseJudge<'a, R, V>, parallel_tests: usize) -> Self {
        Self {
            judge,
            parallel_tests: parallel_tests.max(1),
        }
    }

    /// Evaluate `group` and everything below it, appending feedback to `log`
    pub fn evaluate<'b>(&'b self, group: &'b TestGroup, log: &'b mut FeedbackLog) -> BoxFuture<'b, Outcome> {
        async move {
            let header = format!("## {}", group.display_path);
            let slot = log.reserve(header.clone());

            let mut outcomes = Vec::with_capacity(group.cases.len() + group.subgroups.len());
            let broke = self.evaluate_cases(group, log, &mut outcomes).await;

            if broke {
                debug!(group = %group.display_path, "Test case rejected, skipping subgroups");
            } else {
                for subgroup in &group.subgroups {
                    let outcome = self.evaluate(subgroup, log).await;
                    let rejected = !outcome.verdict.is_accepted();
                    outcomes.push(outcome);
                    if rejected && group.policy.breaks_on_reject() {
                        debug!(group = %group.display_path, subgroup = %subgroup.display_path, "Subgroup rejected, stopping");
                        break;
                    }
                }
            }

            if outcomes.is_empty() {
                error!(group = %group.display_path, "Group has no test cases or subgroups");
            }
            let outcome = aggregate(&group.policy, &outcomes);
            if outcome.verdict != Verdict::JudgeError && outcomes.iter().any(|o| o.verdict == Verdict::JudgeError) {
                warn!(group = %group.display_path, verdict = ?outcome.verdict, "Judge error masked by group policy");
            }

            let max_score = group.max_score();
            let passed = outcome.verdict != Verdict::JudgeError && reaches_max(outcome.score, max_score);
            let status = FeedbackStatus::from(passed);
            log.fill(
                slot,
                FeedbackEntry::visible(header, status, format!("Score: {} / {}\n\n{}", outcome.score, max_score, outcome)),
            );

            info!(
                group = %group.display_path,
                verdict = ?outcome.verdict,
                score = outcome.score,
                max_score,
                "Group evaluated"
            );
            outcome
        }
        .boxed()
    }

    /// Returns true when a rejection stopped the pass early
    async fn evaluate_cases(&self, group: &TestGroup, log: &mut FeedbackLog, outcomes: &mut Vec<Outcome>) -> bool {
        if self.parallel_tests > 1 && !group.policy.breaks_on_reject() {
            let pending: Vec<_> = group
                .cases
                .iter()
                .map(|case| self.judge.evaluate(case, &group.policy, group.is_sample))
                .collect();
            let results: Vec<Outcome> = stream::iter(pending).buffered(self.parallel_tests).collect().await;
            for (case, outcome) in group.cases.iter().zip(results) {
                log.record_case(&case.display_path, &outcome, group.is_sample);
                outcomes.push(outcome);
            }
            return false;
        }

        for case in &group.cases {
            let outcome = self.judge.evaluate(case, &group.policy, group.is_sample).await;
            log.record_case(&case.display_path, &outcome, group.is_sample);
            let rejected = !outcome.verdict.is_accepted();
            outcomes.push(outcome);
            if rejected && group.policy.breaks_on_reject() {
                debug!(group = %group.display_path, case = %case.display_path, "Test case rejected, stopping");
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::judge::JudgeSettings;
    use crate::testing::{FakeRunner, FakeValidator};
    use gavel_common::policy::POLICY_FILE;
    use gavel_common::suite::TestSuite;
    use gavel_common::types::ProblemKind;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn add_case(dir: &Path, name: &str, input: &str, answer: &str) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join(format!("{}.in", name)), input).unwrap();
        fs::write(dir.join(format!("{}.ans", name)), answer).unwrap();
    }

    fn settings(dir: &TempDir) -> JudgeSettings {
        let work_dir = dir.path().join("work");
        fs::create_dir_all(&work_dir).unwrap();
        JudgeSettings {
            time_limit: 1.0,
            memory_limit_mb: 256,
            output_limit_bytes: 1024,
            validator_flags: Vec::new(),
            work_dir,
        }
    }

    fn secret(data: &Path, kind: ProblemKind) -> TestGroup {
        TestSuite::discover(data, kind).unwrap().secret.unwrap()
    }

    #[tokio::test]
    async fn test_break_stops_at_first_rejection() {
        let dir = TempDir::new().unwrap();
        let data = dir.path().join("data");
        add_case(&data.join("secret"), "1", "1", "1");
        add_case(&data.join("secret"), "2", "2", "wrong");
        add_case(&data.join("secret"), "3", "3", "3");
        add_case(&data.join("secret/sub"), "1", "4", "4");
        let group = secret(&data, ProblemKind::PassFail);

        let settings = settings(&dir);
        let runner = FakeRunner::new();
        let validator = FakeValidator::new();
        let evaluator = GroupEvaluator::new(CaseJudge::new(&runner, &validator, &settings), 1);
        let mut log = FeedbackLog::new();

        let outcome = evaluator.evaluate(&group, &mut log).await;
        assert_eq!(outcome.verdict, Verdict::WrongAnswer);
        assert_eq!(runner.run_count(), 2);
        let names: Vec<&str> = log.entries().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "## secret",
                "### secret/1",
                "### secret/1 (instructor)",
                "### secret/2",
                "### secret/2 (instructor)"
            ]
        );
        assert_eq!(log.entries()[0].status, FeedbackStatus::Failed);
    }

    #[tokio::test]
    async fn test_continue_visits_everything_in_order() {
        let dir = TempDir::new().unwrap();
        let data = dir.path().join("data");
        fs::create_dir_all(&data).unwrap();
        fs::write(data.join(POLICY_FILE), "on_reject: continue\nverdict_rule: first_error\n").unwrap();
        add_case(&data.join("secret"), "1", "1", "1");
        add_case(&data.join("secret"), "2", "rte", "2");
        add_case(&data.join("secret/a"), "1", "tle", "x");
        add_case(&data.join("secret/b"), "1", "5", "5");
        let group = secret(&data, ProblemKind::Scoring);

        let settings = settings(&dir);
        let runner = FakeRunner::new();
        let validator = FakeValidator::new();
        let evaluator = GroupEvaluator::new(CaseJudge::new(&runner, &validator, &settings), 1);
        let mut log = FeedbackLog::new();

        let outcome = evaluator.evaluate(&group, &mut log).await;
        assert_eq!(outcome.verdict, Verdict::RuntimeError);
        assert_eq!(runner.run_count(), 4);

        let headers: Vec<&str> = log
            .entries()
            .iter()
            .map(|e| e.name.as_str())
            .filter(|n| n.starts_with("## "))
            .collect();
        assert_eq!(headers, vec!["## secret", "## secret/a", "## secret/b"]);
    }

    #[tokio::test]
    async fn test_subgroup_break_skips_later_subgroups() {
        let dir = TempDir::new().unwrap();
        let data = dir.path().join("data");
        add_case(&data.join("secret/a"), "1", "1", "nope");
        add_case(&data.join("secret/b"), "1", "2", "2");
        let group = secret(&data, ProblemKind::PassFail);

        let settings = settings(&dir);
        let runner = FakeRunner::new();
        let validator = FakeValidator::new();
        let evaluator = GroupEvaluator::new(CaseJudge::new(&runner, &validator, &settings), 1);
        let mut log = FeedbackLog::new();

        let outcome = evaluator.evaluate(&group, &mut log).await;
        assert_eq!(outcome.verdict, Verdict::WrongAnswer);
        assert_eq!(runner.run_count(), 1);
        assert!(log.entries().iter().all(|e| !e.name.contains("secret/b")));
    }

    #[tokio::test]
    async fn test_parallel_matches_sequential() {
        let dir = TempDir::new().unwrap();
        let data = dir.path().join("data");
        fs::create_dir_all(&data).unwrap();
        fs::write(data.join(POLICY_FILE), "on_reject: continue\nverdict_rule: first_error\n").unwrap();
        for i in 0..8 {
            let answer = if i % 3 == 1 { "bad".to_string() } else { i.to_string() };
            add_case(&data.join("secret"), &format!("{:02}", i), &i.to_string(), &answer);
        }
        let group = secret(&data, ProblemKind::Scoring);
        let settings = settings(&dir);
        let validator = FakeValidator::new();

        let mut reports = Vec::new();
        for parallel in [1, 4] {
            let runner = FakeRunner::new();
            let evaluator = GroupEvaluator::new(CaseJudge::new(&runner, &validator, &settings), parallel);
            let mut log = FeedbackLog::new();
            let outcome = evaluator.evaluate(&group, &mut log).await;
            reports.push((outcome, log.into_entries()));
        }
        assert_eq!(reports[0], reports[1]);
        assert_eq!(reports[0].0.verdict, Verdict::WrongAnswer);
        assert_eq!(reports[0].1.len(), 1 + 8 * 2);
    }

    #[tokio::test]
    async fn test_empty_group_is_judge_error() {
        let dir = TempDir::new().unwrap();
        let data = dir.path().join("data");
        fs::create_dir_all(data.join("secret")).unwrap();
        let group = secret(&data, ProblemKind::PassFail);

        let settings = settings(&dir);
        let runner = FakeRunner::new();
        let validator = FakeValidator::new();
        let evaluator = GroupEvaluator::new(CaseJudge::new(&runner, &validator, &settings), 1);
        let mut log = FeedbackLog::new();

        let outcome = evaluator.evaluate(&group, &mut log).await;
        assert_eq!(outcome.verdict, Verdict::JudgeError);
        assert_eq!(log.entries().len(), 1);
    }

    #[tokio::test]
    async fn test_header_reports_score_against_max() {
        let dir = TempDir::new().unwrap();
        let data = dir.path().join("data");
        fs::create_dir_all(data.join("secret")).unwrap();
        fs::write(data.join("secret").join(POLICY_FILE), "accept_score: 2\n").unwrap();
        add_case(&data.join("secret"), "1", "1", "1");
        add_case(&data.join("secret"), "2", "2", "2");
        let group = secret(&data, ProblemKind::Scoring);

        let settings = settings(&dir);
        let runner = FakeRunner::new();
        let validator = FakeValidator::new();
        let evaluator = GroupEvaluator::new(CaseJudge::new(&runner, &validator, &settings), 1);
        let mut log = FeedbackLog::new();

        let outcome = evaluator.evaluate(&group, &mut log).await;
        assert_eq!(outcome.score, 4.0);
        let header = &log.entries()[0];
        assert_eq!(header.name, "## secret");
        assert_eq!(header.status, FeedbackStatus::Passed);
        assert!(header.output.starts_with("Score: 4 / 4"));
    }

    #[tokio::test]
    async fn test_partial_credit_header_is_failed() {
        let dir = TempDir::new().unwrap();
        let data = dir.path().join("data");
        add_case(&data.join("secret"), "1", "1", "1");
        add_case(&data.join("secret"), "2", "2", "2");
        let group = secret(&data, ProblemKind::Scoring);

        let settings = settings(&dir);
        let runner = FakeRunner::new();
        let validator = FakeValidator::with_score("0.5");
        let evaluator = GroupEvaluator::new(CaseJudge::new(&runner, &validator, &settings), 1);
        let mut log = FeedbackLog::new();

        let outcome = evaluator.evaluate(&group, &mut log).await;
        assert_eq!(outcome.verdict, Verdict::Accepted);
        assert_eq!(outcome.score, 1.0);
        let header = &log.entries()[0];
        assert_eq!(header.status, FeedbackStatus::Failed);
        assert!(header.output.starts_with("Score: 1 / 2"));
    }

    #[tokio::test]
    async fn test_judge_error_header_is_failed_at_zero_max() {
        let dir = TempDir::new().unwrap();
        let data = dir.path().join("data");
        fs::create_dir_all(data.join("secret")).unwrap();
        let group = secret(&data, ProblemKind::Scoring);
        assert_eq!(group.max_score(), 0.0);

        let settings = settings(&dir);
        let runner = FakeRunner::new();
        let validator = FakeValidator::new();
        let evaluator = GroupEvaluator::new(CaseJudge::new(&runner, &validator, &settings), 1);
        let mut log = FeedbackLog::new();

        let outcome = evaluator.evaluate(&group, &mut log).await;
        assert_eq!(outcome.verdict, Verdict::JudgeError);
        assert_eq!(outcome.score, 0.0);
        assert_eq!(log.entries()[0].status, FeedbackStatus::Failed);
    }

    #[tokio::test]
    async fn test_concurrent_cases_get_separate_working_directories() {
        let dir = TempDir::new().unwrap();
        let data = dir.path().join("data");
        fs::create_dir_all(&data).unwrap();
        fs::write(data.join(POLICY_FILE), "on_reject: continue\n").unwrap();
        for i in 0..6 {
            add_case(&data.join("secret"), &format!("{:02}", i), &i.to_string(), &i.to_string());
        }
        let group = secret(&data, ProblemKind::PassFail);

        let settings = settings(&dir);
        let runner = FakeRunner::new();
        let validator = FakeValidator::new();
        let evaluator = GroupEvaluator::new(CaseJudge::new(&runner, &validator, &settings), 4);
        let mut log = FeedbackLog::new();

        let outcome = evaluator.evaluate(&group, &mut log).await;
        assert_eq!(outcome.verdict, Verdict::Accepted);
        assert_eq!(validator.calls(), 6);

        let mut work_dirs = runner.work_dirs();
        assert_eq!(work_dirs.len(), 6);
        assert!(work_dirs.iter().all(|d| d.starts_with(&settings.work_dir)));
        work_dirs.sort();
        work_dirs.dedup();
        assert_eq!(work_dirs.len(), 6);
    }
}
