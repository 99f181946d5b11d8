// Grader configuration: environment settings and the language table
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Settings for one grading run, read once at startup
#[derive(Debug, Clone)]
pub struct GraderConfig {
    pub problems_dir: PathBuf,
    pub submission_dir: PathBuf,
    /// `None` prints the results JSON to stdout
    pub results_path: Option<PathBuf>,
    pub languages_path: PathBuf,
    pub validator: PathBuf,
    pub parallel_tests: usize,
    pub work_dir: PathBuf,
}

impl GraderConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let path_or = |key: &str, default: &str| PathBuf::from(lookup(key).unwrap_or_else(|| default.to_string()));

        let parallel_tests = match lookup("GAVEL_PARALLEL_TESTS") {
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .with_context(|| format!("GAVEL_PARALLEL_TESTS must be a positive integer, got '{}'", raw))?,
            None => 1,
        };
        if parallel_tests == 0 {
            bail!("GAVEL_PARALLEL_TESTS must be at least 1");
        }

        Ok(Self {
            problems_dir: path_or("GAVEL_PROBLEMS_DIR", "problems"),
            submission_dir: path_or("GAVEL_SUBMISSION_DIR", "/autograder/submission"),
            results_path: lookup("GAVEL_RESULTS_PATH").map(PathBuf::from),
            languages_path: path_or("GAVEL_LANGUAGES", "config/languages.json"),
            validator: path_or("GAVEL_VALIDATOR", "./default_validator"),
            parallel_tests,
            work_dir: lookup("GAVEL_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(std::env::temp_dir),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageConfig {
    pub name: String,
    pub version: String,
    pub extensions: Vec<String>,
    /// argv template; `None` for interpreted languages
    pub compile: Option<Vec<String>>,
    pub run: Vec<String>,
}

impl LanguageConfig {
    pub fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LanguagesJson {
    languages: Vec<LanguageConfig>,
}

/// Language configuration manager
///
/// Keeps the order of languages.json, which breaks detection ties.
#[derive(Debug, Clone)]
pub struct LanguageConfigManager {
    configs: Vec<LanguageConfig>,
}

impl LanguageConfigManager {
    /// Load language configurations from languages.json
    pub fn load(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            bail!("Language config file not found: {}", config_path.display());
        }

        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;
        Self::parse(&content).with_context(|| format!("Failed to parse {}", config_path.display()))
    }

    fn parse(content: &str) -> Result<Self> {
        let languages_json: LanguagesJson = serde_json::from_str(content)?;
        for lang in &languages_json.languages {
            if lang.run.is_empty() {
                bail!("Language '{}' has an empty run command", lang.name);
            }
        }
        Ok(Self {
            configs: languages_json.languages,
        })
    }

    /// Get configuration for a specific language
    pub fn get_config(&self, name: &str) -> Option<&LanguageConfig> {
        self.configs.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Pick the language whose extensions match the most source files
    pub fn detect(&self, sources: &[PathBuf]) -> Option<&LanguageConfig> {
        let mut best: Option<(&LanguageConfig, usize)> = None;
        for config in &self.configs {
            let hits = sources.iter().filter(|s| config.matches(s)).count();
            if hits > 0 && best.map_or(true, |(_, most)| hits > most) {
                best = Some((config, hits));
            }
        }
        best.map(|(config, _)| config)
    }

    /// List all supported languages
    pub fn list_languages(&self) -> Vec<String> {
        self.configs.iter().map(|c| c.name.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const LANGUAGES: &str = r#"{
        "languages": [
            { "name": "python", "version": "3", "extensions": ["py"],
              "compile": null, "run": ["python3", "{main}"] },
            { "name": "cpp", "version": "17", "extensions": ["cpp", "h"],
              "compile": ["g++", "-o", "{binary}", "{files}"], "run": ["{binary}"] },
            { "name": "c", "version": "11", "extensions": ["c", "h"],
              "compile": ["gcc", "-o", "{binary}", "{files}"], "run": ["{binary}"] }
        ]
    }"#;

    #[test]
    fn test_detect_by_majority_extension() {
        let manager = LanguageConfigManager::parse(LANGUAGES).unwrap();
        let sources = vec![PathBuf::from("main.cpp"), PathBuf::from("util.h"), PathBuf::from("README.md")];
        assert_eq!(manager.detect(&sources).unwrap().name, "cpp");

        let sources = vec![PathBuf::from("sol.PY")];
        assert_eq!(manager.detect(&sources).unwrap().name, "python");

        // Tie on the header alone goes to the first configured language
        let sources = vec![PathBuf::from("only.h")];
        assert_eq!(manager.detect(&sources).unwrap().name, "cpp");

        assert!(manager.detect(&[PathBuf::from("notes.txt")]).is_none());
    }

    #[test]
    fn test_get_config_and_list() {
        let manager = LanguageConfigManager::parse(LANGUAGES).unwrap();
        assert_eq!(manager.get_config("Python").unwrap().run, vec!["python3", "{main}"]);
        assert!(manager.get_config("java").is_none());
        assert_eq!(manager.list_languages(), vec!["python", "cpp", "c"]);
    }

    #[test]
    fn test_empty_run_command_rejected() {
        let json = r#"{ "languages": [ { "name": "x", "version": "1", "extensions": ["x"], "compile": null, "run": [] } ] }"#;
        assert!(LanguageConfigManager::parse(json).is_err());
    }

    #[test]
    fn test_config_from_lookup() {
        let env: HashMap<&str, &str> = [
            ("GAVEL_PROBLEMS_DIR", "/srv/problems"),
            ("GAVEL_PARALLEL_TESTS", "4"),
            ("GAVEL_RESULTS_PATH", "/tmp/results.json"),
        ]
        .into_iter()
        .collect();
        let config = GraderConfig::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.problems_dir, PathBuf::from("/srv/problems"));
        assert_eq!(config.submission_dir, PathBuf::from("/autograder/submission"));
        assert_eq!(config.results_path, Some(PathBuf::from("/tmp/results.json")));
        assert_eq!(config.validator, PathBuf::from("./default_validator"));
        assert_eq!(config.parallel_tests, 4);
    }

    #[test]
    fn test_config_rejects_bad_parallelism() {
        assert!(GraderConfig::from_lookup(|k| (k == "GAVEL_PARALLEL_TESTS").then(|| "0".to_string())).is_err());
        assert!(GraderConfig::from_lookup(|k| (k == "GAVEL_PARALLEL_TESTS").then(|| "many".to_string())).is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let err = LanguageConfigManager::load(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
