// CLI commands for managing the grader's languages and problems
use anyhow::{bail, Context, Result};
use gavel_common::config::{Problem, PROBLEM_FILE, TIME_LIMIT_FILE};
use gavel_common::policy::POLICY_FILE;
use gavel_common::suite::{TestGroup, TestSuite};
use gavel_common::types::ProblemKind;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::fs;
use std::io::{self, Write};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageConfig {
    pub name: String,
    pub version: String,
    pub extensions: Vec<String>,
    pub compile: Option<Vec<String>>,
    pub run: Vec<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct LanguagesJson {
    pub languages: Vec<LanguageConfig>,
}

/// Load languages configuration; a missing file is an empty table
fn load_languages_config(config_path: &Path) -> Result<LanguagesJson> {
    if !config_path.exists() {
        return Ok(LanguagesJson::default());
    }

    let content = fs::read_to_string(config_path)
        .with_context(|| format!("Failed to read {}", config_path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", config_path.display()))
}

/// Save languages configuration
fn save_languages_config(config_path: &Path, config: &LanguagesJson) -> Result<()> {
    if let Some(parent) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let json_content = serde_json::to_string_pretty(config).context("Failed to serialize languages.json")?;
    fs::write(config_path, json_content)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;

    Ok(())
}

fn split_template(template: &str) -> Vec<String> {
    template.split_whitespace().map(str::to_string).collect()
}

/// Add a new language to the language table
pub async fn add_language(
    config_path: &Path,
    name: &str,
    ext: &str,
    version: &str,
    compile: Option<&str>,
    run: &str,
) -> Result<()> {
    println!("🚀 Adding language: {}", name);

    let extensions: Vec<String> = ext
        .split(',')
        .map(|e| e.trim().trim_start_matches('.').to_string())
        .filter(|e| !e.is_empty())
        .collect();
    if name.is_empty() || extensions.is_empty() {
        bail!("Language name and extension cannot be empty");
    }
    let run = split_template(run);
    if run.is_empty() {
        bail!("Run command cannot be empty");
    }

    let mut languages_json = load_languages_config(config_path)?;
    if languages_json.languages.iter().any(|l| l.name.eq_ignore_ascii_case(name)) {
        bail!("Language '{}' already exists in config", name);
    }

    languages_json.languages.push(LanguageConfig {
        name: name.to_string(),
        version: version.to_string(),
        extensions,
        compile: compile.map(split_template).filter(|argv| !argv.is_empty()),
        run,
    });

    println!("📝 Updating {}...", config_path.display());
    save_languages_config(config_path, &languages_json)?;

    println!("✅ Language '{}' added successfully!", name);
    Ok(())
}

/// Remove a language, asking first unless `yes`
pub async fn remove_language(config_path: &Path, name: &str, yes: bool) -> Result<()> {
    println!("🗑️  Removing language: {}", name);

    let mut languages_json = load_languages_config(config_path)?;
    let lang_index = languages_json
        .languages
        .iter()
        .position(|l| l.name.eq_ignore_ascii_case(name))
        .ok_or_else(|| anyhow::anyhow!("Language '{}' not found in config", name))?;

    if !yes {
        print!("⚠️  This will remove '{}' from {}\n", name, config_path.display());
        print!("Submissions in this language will be graded as compile errors.\n");
        print!("\nContinue? (y/N): ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("❌ Aborted");
            return Ok(());
        }
    }

    languages_json.languages.remove(lang_index);
    save_languages_config(config_path, &languages_json)?;

    println!("✅ Language '{}' removed successfully!", name);
    Ok(())
}

/// List all configured languages
pub async fn list_languages(config_path: &Path) -> Result<()> {
    let languages_json = load_languages_config(config_path)?;

    if languages_json.languages.is_empty() {
        println!("No languages configured.");
        println!("\n💡 Add a language with: gavel-cli add-lang --name <name> --ext <ext> --run <command>");
        return Ok(());
    }

    println!("📋 Configured Languages:\n");
    println!("{:<10} {:<10} {:<14} {:<40} {}", "Name", "Version", "Extensions", "Compile", "Run");
    println!("{}", "─".repeat(100));

    for lang in &languages_json.languages {
        let compile = lang.compile.as_ref().map(|argv| argv.join(" ")).unwrap_or_else(|| "-".to_string());
        println!(
            "{:<10} {:<10} {:<14} {:<40} {}",
            lang.name,
            lang.version,
            lang.extensions.join(","),
            compile,
            lang.run.join(" ")
        );
    }

    println!("\n✅ Total: {} language(s)", languages_json.languages.len());
    Ok(())
}

/// Scaffold a problem directory with empty sample and secret groups
pub async fn init_problem(path: &Path, name: Option<&str>, kind: ProblemKind) -> Result<()> {
    println!("🚀 Initializing problem at: {}", path.display());

    if path.join(PROBLEM_FILE).exists() {
        bail!("{} already contains a {}", path.display(), PROBLEM_FILE);
    }

    for dir in ["data/sample", "data/secret", "include"] {
        fs::create_dir_all(path.join(dir)).with_context(|| format!("Failed to create directory: {}", dir))?;
        println!("  ✅ Created: {}", dir);
    }

    let name = match name {
        Some(name) => name.to_string(),
        None => path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "problem".to_string()),
    };

    let files = [
        (PROBLEM_FILE.to_string(), format!("name: {}\ntype: {}\nlanguages: all\n", name, kind)),
        (TIME_LIMIT_FILE.to_string(), "1.0\n".to_string()),
        (format!("data/{}", POLICY_FILE), policy_template(kind)),
    ];
    for (file, content) in &files {
        fs::write(path.join(file), content).with_context(|| format!("Failed to write {}", file))?;
        println!("  ✅ Created: {}", file);
    }

    println!("✅ Problem initialized successfully!");
    println!("\n📋 Next steps:");
    println!("  1. Add test cases: data/sample/1.in + data/sample/1.ans");
    println!("  2. Adjust grading policies in {} files", POLICY_FILE);
    println!("  3. Validate: gavel-cli check --problem {}", path.display());

    Ok(())
}

fn policy_template(kind: ProblemKind) -> String {
    let score_rule = match kind {
        ProblemKind::PassFail => "min",
        ProblemKind::Scoring => "sum",
    };
    format!(
        "# Grading policy for every group below data/ (subgroups inherit it)\n\
         on_reject: break\n\
         verdict_rule: worst_error\n\
         score_rule: {}\n\
         accept_score: 1\n\
         reject_score: 0\n",
        score_rule
    )
}

/// Load the whole problem and print its resolved group tree
pub async fn check_problem(path: &Path) -> Result<()> {
    let problem = Problem::load(path)?;
    let suite = TestSuite::discover(&problem.data_dir(), problem.config.kind)?;

    println!("{}", problem.config);
    println!("Time limit: {}s\n", problem.time_limit);
    print!("{}", describe_suite(&suite));

    let total: usize = suite.sample.iter().chain(suite.secret.iter()).map(TestGroup::case_count).sum();
    if total == 0 {
        bail!("{} has no test cases", problem.data_dir().display());
    }
    println!("\n✅ {} test case(s), max score {}", total, suite.max_score());
    Ok(())
}

fn describe_suite(suite: &TestSuite) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "data  {}", suite.root_policy);
    for group in suite.sample.iter().chain(suite.secret.iter()) {
        describe_group(group, 1, &mut out);
    }
    out
}

fn describe_group(group: &TestGroup, depth: usize, out: &mut String) {
    let _ = writeln!(
        out,
        "{}{}  cases={} max={}  {}",
        "  ".repeat(depth),
        group.display_path,
        group.cases.len(),
        group.max_score(),
        group.policy
    );
    for subgroup in &group.subgroups {
        describe_group(subgroup, depth + 1, out);
    }
}
