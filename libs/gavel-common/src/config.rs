// Problem configuration: problem.yaml and .timelimit
use crate::error::ConfigError;
use crate::types::ProblemKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

pub const PROBLEM_FILE: &str = "problem.yaml";
pub const TIME_LIMIT_FILE: &str = ".timelimit";

const MEBIBYTE: u64 = 1024 * 1024;

/// Resource limits from the `limits` section of problem.yaml
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub time_multiplier: f64,
    pub time_safety_margin: f64,
    /// MiB
    pub memory: u64,
    /// MiB
    pub output: u64,
    /// KiB
    pub code: u64,
    /// Seconds
    pub compilation_time: u64,
    pub compilation_memory: u64,
    pub validation_time: u64,
    pub validation_memory: u64,
    pub validation_output: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            time_multiplier: 5.0,
            time_safety_margin: 2.0,
            memory: 1024,
            output: 8,
            code: 128,
            compilation_time: 60,
            compilation_memory: 1024,
            validation_time: 60,
            validation_memory: 1024,
            validation_output: 8,
        }
    }
}

impl Limits {
    pub fn output_bytes(&self) -> u64 {
        self.output * MEBIBYTE
    }

    pub fn code_bytes(&self) -> u64 {
        self.code * 1024
    }
}

#[derive(Debug, Deserialize)]
struct ProblemYaml {
    name: String,
    #[serde(rename = "type")]
    kind: Option<String>,
    validator_flags: Option<String>,
    output_validator_flags: Option<String>,
    languages: Option<String>,
    #[serde(default)]
    limits: Limits,
}

/// Parsed problem.yaml
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProblemConfig {
    pub name: String,
    pub kind: ProblemKind,
    pub validator_flags: Vec<String>,
    /// `None` means every configured language is allowed
    pub languages: Option<Vec<String>>,
    pub limits: Limits,
}

impl ProblemConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
        Self::parse(&content, path)
    }

    fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        let raw: ProblemYaml = serde_yaml::from_str(content).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })?;

        let kind = match raw.kind.as_deref() {
            None | Some("pass-fail") => ProblemKind::PassFail,
            Some("scoring") => ProblemKind::Scoring,
            Some(other) => {
                return Err(ConfigError::UnknownProblemType {
                    path: path.to_path_buf(),
                    kind: other.to_string(),
                })
            }
        };

        let validator_flags = [raw.validator_flags, raw.output_validator_flags]
            .into_iter()
            .flatten()
            .flat_map(|flags| flags.split_whitespace().map(str::to_string).collect::<Vec<_>>())
            .collect();

        let languages = match raw.languages.as_deref().map(str::trim) {
            None | Some("all") | Some("") => None,
            Some(list) => Some(list.split_whitespace().map(str::to_lowercase).collect()),
        };

        Ok(Self {
            name: raw.name,
            kind,
            validator_flags,
            languages,
            limits: raw.limits,
        })
    }

    pub fn language_allowed(&self, language: &str) -> bool {
        match &self.languages {
            None => true,
            Some(allowed) => allowed.iter().any(|l| l.eq_ignore_ascii_case(language)),
        }
    }
}

impl fmt::Display for ProblemConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Problem: {}", self.name)?;
        writeln!(f, "Type: {}", self.kind)?;
        match &self.languages {
            Some(languages) => writeln!(f, "Languages: {}", languages.join(", "))?,
            None => writeln!(f, "Languages: all")?,
        }
        if !self.validator_flags.is_empty() {
            writeln!(f, "Validator flags: {}", self.validator_flags.join(" "))?;
        }
        write!(
            f,
            "Memory limit: {} MiB, output limit: {} MiB",
            self.limits.memory, self.limits.output
        )
    }
}

/// A problem directory with its configuration loaded
#[derive(Debug, Clone)]
pub struct Problem {
    pub root: PathBuf,
    pub config: ProblemConfig,
    /// Seconds
    pub time_limit: f64,
}

impl Problem {
    pub fn load(root: &Path) -> Result<Self, ConfigError> {
        let config = ProblemConfig::load(&root.join(PROBLEM_FILE))?;
        let time_limit = read_time_limit(&root.join(TIME_LIMIT_FILE))?;
        Ok(Self {
            root: root.to_path_buf(),
            config,
            time_limit,
        })
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join("data")
    }

    pub fn include_dir(&self) -> PathBuf {
        self.root.join("include")
    }
}

fn read_time_limit(path: &Path) -> Result<f64, ConfigError> {
    let content = fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
    let invalid = |reason: String| ConfigError::TimeLimit {
        path: path.to_path_buf(),
        reason,
    };

    let first = content.lines().next().unwrap_or("").trim();
    let limit: f64 = first
        .parse()
        .map_err(|_| invalid(format!("'{}' is not a number", first)))?;
    if !limit.is_finite() || limit <= 0.0 {
        return Err(invalid(format!("{} is not a positive duration", limit)));
    }
    Ok(limit)
}

/// First directory (by name) under `root` that holds a problem.yaml
pub fn find_problem(root: &Path) -> Result<PathBuf, ConfigError> {
    let entries = fs::read_dir(root).map_err(|e| ConfigError::io(root, e))?;
    let mut candidates: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_dir() && path.join(PROBLEM_FILE).is_file())
        .collect();
    candidates.sort();

    candidates.into_iter().next().ok_or_else(|| ConfigError::NoProblem {
        root: root.to_path_buf(),
    })
}
