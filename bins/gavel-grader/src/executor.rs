/// Grading Executor - Top-Level Orchestration
///
/// **Responsibility:**
/// Compile once, walk the top-level groups, fold them under the root policy
/// and turn the result into the report.
///
/// **Architecture:**
/// 1. `ProgramRunner::compile` (engine.rs); failure short-circuits to CE
/// 2. `GroupEvaluator` over `sample`, then `secret` (group.rs)
/// 3. `aggregate` with the root policy (evaluator.rs)
/// 4. `GradeReport` with pass-fail or raw scoring (this module)
///
/// This module is the glue layer - it knows nothing about:
/// - How code executes (engine's job)
/// - How a test case is judged (judge's job)
/// - How outcomes combine (evaluator's job)

use crate::engine::ProgramRunner;
use crate::evaluator::aggregate;
use crate::feedback::{truncate, FeedbackLog, JUDGE_ERROR_NOTICE, TEXT_BUDGET};
use crate::group::GroupEvaluator;
use crate::judge::{CaseJudge, JudgeSettings};
use crate::validator::OutputValidator;
use gavel_common::config::Problem;
use gavel_common::suite::TestSuite;
use gavel_common::types::{
    FeedbackEntry, FeedbackStatus, GradeReport, Outcome, ProblemKind, ReportSummary, Verdict,
};
use std::fmt;
use tracing::{error, info, instrument, warn};

/// Reported maximum for pass-fail problems
pub const PASS_FAIL_MAX: f64 = 100.0;

/// Grade a prepared submission against the whole suite
#[instrument(skip_all, fields(problem = %problem.config.name))]
pub async fn grade<R, V>(
    problem: &Problem,
    suite: &TestSuite,
    runner: &R,
    validator: &V,
    settings: &JudgeSettings,
    parallel_tests: usize,
) -> GradeReport
where
    R: ProgramRunner + Sync,
    V: OutputValidator + Sync,
{
    let root = &suite.root_policy;
    let mut log = FeedbackLog::new();
    log.push(FeedbackEntry::visible(
        "## Metadata",
        FeedbackStatus::Passed,
        format!("{}\nTime limit: {}s", problem.config, problem.time_limit),
    ));

    info!(time_limit = problem.time_limit, kind = %problem.config.kind, "Compiling submission");
    match runner.compile().await {
        Ok(build) if build.ok => {
            let message = if build.log.trim().is_empty() {
                "Compilation succeeded".to_string()
            } else {
                truncate(build.log.trim_end(), TEXT_BUDGET)
            };
            log.push(FeedbackEntry::visible("## Compilation", FeedbackStatus::Passed, message));
        }
        Ok(build) => {
            warn!("Compilation failed; no test cases will run");
            let message = truncate(build.log.trim_end(), TEXT_BUDGET);
            log.push(FeedbackEntry::visible("## Compilation", FeedbackStatus::Failed, message.clone()));
            let outcome = Outcome::new(Verdict::CompileError, root.reject_score, 0.0).with_message(message);
            return finish(problem.config.kind, suite, outcome, log);
        }
        Err(e) => {
            error!(error = ?e, "Compiler could not be run");
            log.push(FeedbackEntry::visible("## Compilation", FeedbackStatus::Failed, JUDGE_ERROR_NOTICE));
            log.push(FeedbackEntry::hidden(
                "## Compilation (instructor)",
                FeedbackStatus::Failed,
                format!("{:#}", e),
            ));
            let outcome = Outcome::new(Verdict::JudgeError, root.reject_score, 0.0)
                .with_messages(JUDGE_ERROR_NOTICE.to_string(), format!("{:#}", e));
            return finish(problem.config.kind, suite, outcome, log);
        }
    }

    let evaluator = GroupEvaluator::new(CaseJudge::new(runner, validator, settings), parallel_tests);
    let mut counted = Vec::with_capacity(2);
    let mut run_secret = true;

    if let Some(sample) = &suite.sample {
        let outcome = evaluator.evaluate(sample, &mut log).await;
        let rejected = !outcome.verdict.is_accepted();
        if rejected && root.breaks_on_reject() {
            info!("Sample group rejected, skipping secret group");
            run_secret = false;
        }
        if !root.ignore_sample {
            counted.push(outcome);
        } else if run_secret {
            info!(verdict = ?outcome.verdict, "Sample group excluded from scoring");
        } else {
            // Nothing else will be graded, so the stopping rejection stands
            counted.push(Outcome::new(outcome.verdict, root.reject_score, outcome.running_time));
        }
    }

    if let (true, Some(secret)) = (run_secret, &suite.secret) {
        counted.push(evaluator.evaluate(secret, &mut log).await);
    }

    if counted.is_empty() {
        error!("No counted top-level groups to grade");
    }
    let outcome = aggregate(root, &counted);
    finish(problem.config.kind, suite, outcome, log)
}

fn finish(kind: ProblemKind, suite: &TestSuite, outcome: Outcome, log: FeedbackLog) -> GradeReport {
    let (score, max_score) = match kind {
        ProblemKind::PassFail => {
            let score = if outcome.verdict.is_accepted() { PASS_FAIL_MAX } else { 0.0 };
            (score, PASS_FAIL_MAX)
        }
        ProblemKind::Scoring => (outcome.score, suite.max_score()),
    };

    info!(
        verdict = ?outcome.verdict,
        score,
        max_score,
        running_time = outcome.running_time,
        "Grading finished"
    );

    let summary = ReportSummary {
        verdict: outcome.verdict,
        max_score,
        raw_score: outcome.score,
    };
    GradeReport::new(
        summary,
        score,
        outcome.running_time,
        format!("# {}", outcome),
        log.into_entries(),
    )
}

/// Report for a run that could not grade at all (bad problem setup, missing
/// language table, ...). The submitter sees the generic notice only.
pub fn judge_error_report(err: impl fmt::Display) -> GradeReport {
    let summary = ReportSummary {
        verdict: Verdict::JudgeError,
        max_score: 0.0,
        raw_score: 0.0,
    };
    let tests = vec![FeedbackEntry::hidden(
        "## Judge Error",
        FeedbackStatus::Failed,
        err.to_string(),
    )];
    GradeReport::new(
        summary,
        0.0,
        0.0,
        format!("# {}\n{}", Verdict::JudgeError, JUDGE_ERROR_NOTICE),
        tests,
    )
}
