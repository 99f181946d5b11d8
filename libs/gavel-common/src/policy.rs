/// Grading Policy - Per-Group Scoring Rules
///
/// **Responsibility:**
/// Describe how one test group (and, by inheritance, everything below it)
/// is scored: when to stop early, how verdicts combine, how scores combine.
///
/// **Inheritance Rules:**
/// - A directory with a `testdata.yaml` gets a fresh policy: every key it
///   does not set falls back to the problem-kind default, never to the parent
/// - A directory without one inherits its parent's resolved policy verbatim
/// - The root with no descriptor gets the problem-kind default
///
/// Descriptors are a closed set of keys. Unknown keys are rejected.

use crate::error::ConfigError;
use crate::types::ProblemKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::debug;

/// File name of the per-directory policy descriptor
pub const POLICY_FILE: &str = "testdata.yaml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnReject {
    /// Stop evaluating siblings once one is rejected
    Break,
    Continue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictRule {
    WorstError,
    FirstError,
    AlwaysAccept,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreRule {
    Sum,
    Min,
    Max,
}

impl ScoreRule {
    /// Fold scores with this rule. An empty input combines to 0.
    pub fn combine(self, scores: impl IntoIterator<Item = f64>) -> f64 {
        let mut scores = scores.into_iter();
        match self {
            ScoreRule::Sum => scores.sum(),
            ScoreRule::Min => scores.reduce(f64::min).unwrap_or(0.0),
            ScoreRule::Max => scores.reduce(f64::max).unwrap_or(0.0),
        }
    }
}

/// Declared score bounds. Used for reporting, never enforced as a clamp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreRange {
    pub min: f64,
    pub max: f64,
}

impl ScoreRange {
    pub const UNBOUNDED: ScoreRange = ScoreRange {
        min: f64::NEG_INFINITY,
        max: f64::INFINITY,
    };

    pub const UNIT: ScoreRange = ScoreRange { min: 0.0, max: 1.0 };

    /// Parse `"<min> <max>"`; bounds may be `-inf`, `inf` or `+inf`
    fn parse(raw: &str, path: &Path) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::Range {
            path: path.to_path_buf(),
            range: raw.to_string(),
            reason: reason.to_string(),
        };

        let bounds: Vec<&str> = raw.split_whitespace().collect();
        let [min, max] = bounds.as_slice() else {
            return Err(invalid("expected exactly two bounds"));
        };
        let min: f64 = min.parse().map_err(|_| invalid("lower bound is not a number"))?;
        let max: f64 = max.parse().map_err(|_| invalid("upper bound is not a number"))?;

        if min.is_nan() || max.is_nan() {
            return Err(invalid("bounds must not be NaN"));
        }
        if min > max {
            return Err(invalid("lower bound exceeds upper bound"));
        }
        Ok(ScoreRange { min, max })
    }
}

impl fmt::Display for ScoreRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.min, self.max)
    }
}

/// Resolved, immutable policy of one test group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradingPolicy {
    pub on_reject: OnReject,
    pub verdict_rule: VerdictRule,
    pub score_rule: ScoreRule,
    pub accept_score: f64,
    pub reject_score: f64,
    pub score_range: ScoreRange,
    /// Any accepted child makes the whole group accepted
    pub accept_if_any_accepted: bool,
    /// Only meaningful on the root: keep sample out of the final score
    pub ignore_sample: bool,
}

impl GradingPolicy {
    /// Type-aware default policy.
    ///
    /// Pass-fail problems combine with `Min` over a `0..1` range; scoring
    /// problems sum over an unbounded range.
    pub fn defaults(kind: ProblemKind) -> Self {
        let (score_rule, score_range) = match kind {
            ProblemKind::PassFail => (ScoreRule::Min, ScoreRange::UNIT),
            ProblemKind::Scoring => (ScoreRule::Sum, ScoreRange::UNBOUNDED),
        };
        Self {
            on_reject: OnReject::Break,
            verdict_rule: VerdictRule::WorstError,
            score_rule,
            accept_score: 1.0,
            reject_score: 0.0,
            score_range,
            accept_if_any_accepted: false,
            ignore_sample: false,
        }
    }

    pub fn breaks_on_reject(&self) -> bool {
        self.on_reject == OnReject::Break
    }

    /// Upper bound of the declared range, if it is finite
    pub fn declared_max(&self) -> Option<f64> {
        self.score_range.max.is_finite().then_some(self.score_range.max)
    }

    fn from_descriptor(descriptor: PolicyDescriptor, kind: ProblemKind, path: &Path) -> Result<Self, ConfigError> {
        let defaults = Self::defaults(kind);

        let accept_score = check_score(descriptor.accept_score, defaults.accept_score, "accept_score", kind, path)?;
        let reject_score = check_score(descriptor.reject_score, defaults.reject_score, "reject_score", kind, path)?;
        let score_range = match descriptor.range {
            Some(raw) => ScoreRange::parse(&raw, path)?,
            None => defaults.score_range,
        };

        Ok(Self {
            on_reject: descriptor.on_reject.unwrap_or(defaults.on_reject),
            verdict_rule: descriptor.verdict_rule.unwrap_or(defaults.verdict_rule),
            score_rule: descriptor.score_rule.unwrap_or(defaults.score_rule),
            accept_score,
            reject_score,
            score_range,
            accept_if_any_accepted: descriptor
                .accept_if_any_accepted
                .unwrap_or(defaults.accept_if_any_accepted),
            ignore_sample: descriptor.ignore_sample.unwrap_or(defaults.ignore_sample),
        })
    }
}

impl fmt::Display for GradingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "on_reject={:?} verdict_rule={:?} score_rule={:?} accept={} reject={} range=[{}]",
            self.on_reject,
            self.verdict_rule,
            self.score_rule,
            self.accept_score,
            self.reject_score,
            self.score_range,
        )?;
        if self.accept_if_any_accepted {
            f.write_str(" accept_if_any_accepted")?;
        }
        if self.ignore_sample {
            f.write_str(" ignore_sample")?;
        }
        Ok(())
    }
}

/// On-disk shape of `testdata.yaml`
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct PolicyDescriptor {
    on_reject: Option<OnReject>,
    verdict_rule: Option<VerdictRule>,
    score_rule: Option<ScoreRule>,
    accept_score: Option<f64>,
    reject_score: Option<f64>,
    range: Option<String>,
    accept_if_any_accepted: Option<bool>,
    ignore_sample: Option<bool>,
}

fn check_score(
    value: Option<f64>,
    default: f64,
    field: &'static str,
    kind: ProblemKind,
    path: &Path,
) -> Result<f64, ConfigError> {
    let Some(value) = value else {
        return Ok(default);
    };
    if !value.is_finite() {
        return Err(ConfigError::NonFiniteScore {
            path: path.to_path_buf(),
            field,
            value,
        });
    }
    if kind == ProblemKind::PassFail && value.fract() != 0.0 {
        return Err(ConfigError::NonIntegralScore {
            path: path.to_path_buf(),
            field,
            value,
        });
    }
    Ok(value)
}

fn is_blank_yaml(content: &str) -> bool {
    content.lines().all(|line| {
        let line = line.trim();
        line.is_empty() || line.starts_with('#') || line == "---"
    })
}

/// Parse a policy descriptor file
pub fn load_policy(path: &Path, kind: ProblemKind) -> Result<GradingPolicy, ConfigError> {
    let content = fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;

    let descriptor = if is_blank_yaml(&content) {
        PolicyDescriptor::default()
    } else {
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })?
    };

    GradingPolicy::from_descriptor(descriptor, kind, path)
}

/// Resolve the policy of the group rooted at `node`
///
/// - Descriptor present: parse it over the type-aware defaults
/// - No descriptor, parent given: the parent's policy, unchanged
/// - No descriptor, no parent: the type-aware defaults
pub fn resolve_policy(
    node: &Path,
    parent: Option<&GradingPolicy>,
    kind: ProblemKind,
) -> Result<GradingPolicy, ConfigError> {
    let descriptor = node.join(POLICY_FILE);
    if descriptor.is_file() {
        debug!(path = %descriptor.display(), "Loading policy descriptor");
        return load_policy(&descriptor, kind);
    }

    Ok(match parent {
        Some(parent) => parent.clone(),
        None => GradingPolicy::defaults(kind),
    })
}
