/// Test Evaluator - Policy-Driven Aggregation
///
/// **Core Responsibility:**
/// Fold a list of child outcomes into one outcome under a group's policy.
///
/// **Critical Properties:**
/// - Knows nothing about processes, files, or validators
/// - Pure function: (policy, outcomes) → outcome
/// - Deterministic for the same input list and policy
///
/// **Verdict Rules (checked in this order):**
/// - `accept_if_any_accepted` and some child accepted → AC
/// - `first_error` → first non-AC verdict in input order, else AC
/// - `worst_error` → most severe verdict
/// - `always_accept` → AC
///
/// **Score Rules:**
/// - Verdict not AC → the policy's `reject_score`
/// - Otherwise `sum`, `min` or `max` over child scores
///
/// Running time is the maximum over children.

use crate::engine::RunResult;
use gavel_common::policy::{GradingPolicy, VerdictRule};
use gavel_common::types::{Outcome, Verdict};

/// Scores within this distance of the maximum count as full marks
pub const SCORE_TOLERANCE: f64 = 1e-9;

pub const NOTHING_TO_AGGREGATE: &str = "Judge error: no results to aggregate";

/// Fold child outcomes into a single outcome.
///
/// An empty list is an internal invariant violation and yields JE with the
/// policy's reject score.
pub fn aggregate(policy: &GradingPolicy, outcomes: &[Outcome]) -> Outcome {
    if outcomes.is_empty() {
        return Outcome::new(Verdict::JudgeError, policy.reject_score, 0.0).with_message(NOTHING_TO_AGGREGATE);
    }

    let any_accepted = outcomes.iter().any(|o| o.verdict.is_accepted());

    // The child whose verdict became the group's verdict, if it was a rejection
    let decider: Option<&Outcome> = if policy.accept_if_any_accepted && any_accepted {
        None
    } else {
        match policy.verdict_rule {
            VerdictRule::FirstError => outcomes.iter().find(|o| !o.verdict.is_accepted()),
            VerdictRule::WorstError => {
                let worst = outcomes.iter().map(|o| o.verdict).max().unwrap_or(Verdict::Accepted);
                outcomes
                    .iter()
                    .find(|o| o.verdict == worst)
                    .filter(|o| !o.verdict.is_accepted())
            }
            VerdictRule::AlwaysAccept => None,
        }
    };

    let running_time = outcomes.iter().map(|o| o.running_time).fold(0.0, f64::max);

    match decider {
        Some(rejected) => Outcome::new(rejected.verdict, policy.reject_score, running_time).with_messages(
            rejected.public_message.clone(),
            rejected.privileged_message.clone(),
        ),
        None => {
            let score = policy.score_rule.combine(outcomes.iter().map(|o| o.score));
            Outcome::new(Verdict::Accepted, score, running_time)
        }
    }
}

/// Classify a finished run before its output is looked at.
///
/// Time limit wins over runtime error: a run killed at the deadline, or one
/// that finished but took longer than `time_limit`, is TLE.
pub fn classify_run(result: &RunResult, time_limit: f64) -> Option<Verdict> {
    if result.status.is_time_limit() || result.elapsed > time_limit {
        Some(Verdict::TimeLimitExceeded)
    } else if result.status.is_runtime_error() {
        Some(Verdict::RuntimeError)
    } else {
        None
    }
}

/// Whether `score` reaches `max_score`, within tolerance
pub fn reaches_max(score: f64, max_score: f64) -> bool {
    score >= max_score - SCORE_TOLERANCE
}
