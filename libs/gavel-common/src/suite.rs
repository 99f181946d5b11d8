/// Test Suite Discovery
///
/// Walks the `data/` directory once and builds an in-memory tree of test
/// groups, resolving every group's policy on the way down. Any structural
/// problem (bad descriptor, input without answer) surfaces here, before a
/// single test case runs.
///
/// Children are always sorted by file name so that `break` and
/// `first_error` behave the same on every run.

use crate::error::ConfigError;
use crate::policy::{resolve_policy, GradingPolicy};
use crate::types::ProblemKind;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const SAMPLE_GROUP: &str = "sample";
pub const SECRET_GROUP: &str = "secret";

/// One input/answer pair, identified by its path stem
#[derive(Debug, Clone, PartialEq)]
pub struct TestCase {
    pub stem: PathBuf,
    /// Slash-separated path relative to `data/`, e.g. `secret/group1/03`
    pub display_path: String,
}

impl TestCase {
    pub fn input(&self) -> PathBuf {
        self.stem.with_extension("in")
    }

    pub fn answer(&self) -> PathBuf {
        self.stem.with_extension("ans")
    }

    pub fn hint(&self) -> PathBuf {
        self.stem.with_extension("hint")
    }

    pub fn description(&self) -> PathBuf {
        self.stem.with_extension("desc")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TestGroup {
    pub dir: PathBuf,
    pub display_path: String,
    pub policy: GradingPolicy,
    pub cases: Vec<TestCase>,
    pub subgroups: Vec<TestGroup>,
    /// Inside the sample group: full detail is shown to the submitter
    pub is_sample: bool,
}

impl TestGroup {
    /// Build the group rooted at `dir`.
    ///
    /// Returns `Ok(None)` when the directory does not exist, which is how an
    /// absent top-level group is represented.
    pub fn discover(
        dir: &Path,
        display_path: &str,
        parent: Option<&GradingPolicy>,
        kind: ProblemKind,
        is_sample: bool,
    ) -> Result<Option<Self>, ConfigError> {
        if !dir.is_dir() {
            return Ok(None);
        }

        let policy = resolve_policy(dir, parent, kind)?;
        debug!(group = display_path, policy = %policy, "Resolved group policy");

        let mut entries: Vec<PathBuf> = fs::read_dir(dir)
            .map_err(|e| ConfigError::io(dir, e))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| !is_hidden(path))
            .collect();
        entries.sort();

        let mut cases = Vec::new();
        let mut subgroup_dirs = Vec::new();
        for path in entries {
            if path.is_dir() {
                subgroup_dirs.push(path);
            } else if path.extension().is_some_and(|ext| ext == "in") {
                let stem = path.with_extension("");
                if !stem.with_extension("ans").is_file() {
                    return Err(ConfigError::MissingAnswer { input: path });
                }
                let display = child_display(display_path, &stem);
                cases.push(TestCase {
                    stem,
                    display_path: display,
                });
            }
        }

        let mut subgroups = Vec::new();
        for sub in subgroup_dirs {
            let display = child_display(display_path, &sub);
            if let Some(group) = Self::discover(&sub, &display, Some(&policy), kind, is_sample)? {
                subgroups.push(group);
            }
        }

        Ok(Some(Self {
            dir: dir.to_path_buf(),
            display_path: display_path.to_string(),
            policy,
            cases,
            subgroups,
            is_sample,
        }))
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty() && self.subgroups.is_empty()
    }

    /// Test cases in this group and all of its descendants
    pub fn case_count(&self) -> usize {
        self.cases.len() + self.subgroups.iter().map(TestGroup::case_count).sum::<usize>()
    }

    /// Declared maximum score: the finite upper bound of the policy range,
    /// otherwise the best score the subtree can produce.
    pub fn max_score(&self) -> f64 {
        self.policy
            .declared_max()
            .unwrap_or_else(|| self.achievable_score())
    }

    fn achievable_score(&self) -> f64 {
        let cases = self.cases.iter().map(|_| self.policy.accept_score);
        let subgroups = self.subgroups.iter().map(TestGroup::max_score);
        self.policy.score_rule.combine(cases.chain(subgroups))
    }
}

/// The whole `data/` tree
#[derive(Debug, Clone)]
pub struct TestSuite {
    pub root_policy: GradingPolicy,
    pub sample: Option<TestGroup>,
    pub secret: Option<TestGroup>,
}

impl TestSuite {
    pub fn discover(data_dir: &Path, kind: ProblemKind) -> Result<Self, ConfigError> {
        let root_policy = resolve_policy(data_dir, None, kind)?;
        let sample = TestGroup::discover(
            &data_dir.join(SAMPLE_GROUP),
            SAMPLE_GROUP,
            Some(&root_policy),
            kind,
            true,
        )?;
        let secret = TestGroup::discover(
            &data_dir.join(SECRET_GROUP),
            SECRET_GROUP,
            Some(&root_policy),
            kind,
            false,
        )?;

        Ok(Self {
            root_policy,
            sample,
            secret,
        })
    }

    /// Maximum of the final aggregate, mirroring which groups get counted
    pub fn max_score(&self) -> f64 {
        if let Some(max) = self.root_policy.declared_max() {
            return max;
        }
        let counted = self
            .sample
            .iter()
            .filter(|_| !self.root_policy.ignore_sample)
            .chain(self.secret.iter());
        self.root_policy
            .score_rule
            .combine(counted.map(TestGroup::max_score))
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with('.'))
}

fn child_display(parent: &str, child: &Path) -> String {
    let name = child
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{}/{}", parent, name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{OnReject, ScoreRule, POLICY_FILE};
    use tempfile::TempDir;

    fn add_case(dir: &Path, name: &str) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join(format!("{}.in", name)), "1 2\n").unwrap();
        fs::write(dir.join(format!("{}.ans", name)), "3\n").unwrap();
    }

    #[test]
    fn test_discovery_sorted_and_nested() {
        let dir = TempDir::new().unwrap();
        let data = dir.path();
        add_case(&data.join("sample"), "2");
        add_case(&data.join("sample"), "1");
        add_case(&data.join("secret"), "b");
        add_case(&data.join("secret"), "a");
        add_case(&data.join("secret/group2"), "x");
        add_case(&data.join("secret/group1"), "y");
        add_case(&data.join("secret/group1/deep"), "z");
        fs::write(data.join("secret/.hidden.in"), "").unwrap();
        fs::write(data.join("secret/notes.txt"), "ignored").unwrap();

        let suite = TestSuite::discover(data, ProblemKind::PassFail).unwrap();

        let sample = suite.sample.unwrap();
        assert!(sample.is_sample);
        let names: Vec<_> = sample.cases.iter().map(|c| c.display_path.as_str()).collect();
        assert_eq!(names, vec!["sample/1", "sample/2"]);

        let secret = suite.secret.unwrap();
        assert!(!secret.is_sample);
        let names: Vec<_> = secret.cases.iter().map(|c| c.display_path.as_str()).collect();
        assert_eq!(names, vec!["secret/a", "secret/b"]);
        let groups: Vec<_> = secret.subgroups.iter().map(|g| g.display_path.as_str()).collect();
        assert_eq!(groups, vec!["secret/group1", "secret/group2"]);
        assert_eq!(secret.subgroups[0].subgroups[0].display_path, "secret/group1/deep");
        assert_eq!(secret.case_count(), 5);

        let case = &secret.cases[0];
        assert_eq!(case.input(), data.join("secret/a.in"));
        assert_eq!(case.answer(), data.join("secret/a.ans"));
        assert_eq!(case.hint(), data.join("secret/a.hint"));
    }

    #[test]
    fn test_missing_groups_are_none() {
        let dir = TempDir::new().unwrap();
        add_case(&dir.path().join("sample"), "1");
        let suite = TestSuite::discover(dir.path(), ProblemKind::PassFail).unwrap();
        assert!(suite.sample.is_some());
        assert!(suite.secret.is_none());
    }

    #[test]
    fn test_input_without_answer_is_config_error() {
        let dir = TempDir::new().unwrap();
        let secret = dir.path().join("secret");
        fs::create_dir_all(&secret).unwrap();
        fs::write(secret.join("1.in"), "").unwrap();

        let err = TestSuite::discover(dir.path(), ProblemKind::PassFail).unwrap_err();
        assert!(matches!(err, ConfigError::MissingAnswer { .. }));
    }

    #[test]
    fn test_policies_inherited_down_the_tree() {
        let dir = TempDir::new().unwrap();
        let data = dir.path();
        fs::write(data.join(POLICY_FILE), "on_reject: continue\n").unwrap();
        add_case(&data.join("secret/g1/g2/g3"), "1");
        fs::write(data.join("secret/g1").join(POLICY_FILE), "score_rule: max\n").unwrap();

        let suite = TestSuite::discover(data, ProblemKind::Scoring).unwrap();
        let secret = suite.secret.unwrap();
        assert_eq!(secret.policy, suite.root_policy);
        assert_eq!(secret.policy.on_reject, OnReject::Continue);

        let g1 = &secret.subgroups[0];
        assert_eq!(g1.policy.score_rule, ScoreRule::Max);
        assert_eq!(g1.policy.on_reject, OnReject::Break);

        let g3 = &g1.subgroups[0].subgroups[0];
        assert_eq!(g3.policy, g1.policy);
    }

    #[test]
    fn test_bad_descriptor_deep_in_tree_fails_discovery() {
        let dir = TempDir::new().unwrap();
        add_case(&dir.path().join("secret/g1/g2"), "1");
        fs::write(dir.path().join("secret/g1/g2").join(POLICY_FILE), "range: \"3 2\"\n").unwrap();
        assert!(matches!(
            TestSuite::discover(dir.path(), ProblemKind::Scoring),
            Err(ConfigError::Range { .. })
        ));
    }

    #[test]
    fn test_max_score() {
        let dir = TempDir::new().unwrap();
        let data = dir.path();
        add_case(&data.join("sample"), "1");
        for name in ["1", "2", "3"] {
            add_case(&data.join("secret/g1"), name);
        }
        add_case(&data.join("secret/g2"), "1");
        fs::write(data.join("secret/g2").join(POLICY_FILE), "accept_score: 10\n").unwrap();
        fs::write(data.join(POLICY_FILE), "ignore_sample: true\n").unwrap();

        let suite = TestSuite::discover(data, ProblemKind::Scoring).unwrap();
        let secret = suite.secret.as_ref().unwrap();
        assert_eq!(secret.subgroups[0].max_score(), 3.0);
        assert_eq!(secret.subgroups[1].max_score(), 10.0);
        assert_eq!(secret.max_score(), 13.0);
        assert_eq!(suite.max_score(), 13.0);

        let pass_fail = TestSuite::discover(data, ProblemKind::PassFail).unwrap();
        assert_eq!(pass_fail.max_score(), 1.0);
    }
}
