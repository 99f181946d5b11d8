mod config;
mod engine;
mod evaluator;
mod executor;
mod feedback;
mod group;
mod judge;
mod validator;

#[cfg(test)]
mod testing;

use anyhow::{Context, Result};
use config::{GraderConfig, LanguageConfigManager};
use engine::LocalEngine;
use gavel_common::config::{find_problem, Problem};
use gavel_common::suite::TestSuite;
use gavel_common::types::GradeReport;
use judge::JudgeSettings;
use std::time::Duration;
use tracing::{error, info};
use validator::ExternalValidator;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("Gavel grader starting...");

    let config = GraderConfig::from_env().map_err(|e| {
        error!("Invalid grader configuration: {:#}", e);
        e
    })?;

    info!(
        problems_dir = %config.problems_dir.display(),
        submission_dir = %config.submission_dir.display(),
        parallel_tests = config.parallel_tests,
        "Grader configured"
    );

    let outcome = run(&config).await;
    let report = match &outcome {
        Ok(report) => report.clone(),
        Err(e) => {
            error!("Grading aborted: {:#}", e);
            executor::judge_error_report(format!("{:#}", e))
        }
    };
    write_report(&config, &report)?;

    info!(score = report.score, verdict = ?report.extra_data.verdict, "Results written");
    outcome.map(|_| ())
}

/// Logs go to stderr; stdout may carry the results JSON.
/// `GAVEL_LOG_FORMAT=json` switches to one JSON object per line.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true);

    if std::env::var("GAVEL_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json")) {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(config: &GraderConfig) -> Result<GradeReport> {
    let languages = LanguageConfigManager::load(&config.languages_path)?;
    info!("Loaded language configurations for: {:?}", languages.list_languages());

    let problem_root = find_problem(&config.problems_dir)?;
    let problem = Problem::load(&problem_root)?;
    info!(problem = %problem.config.name, root = %problem_root.display(), "Loaded problem");

    let suite = TestSuite::discover(&problem.data_dir(), problem.config.kind)?;
    let case_count = suite.sample.iter().chain(suite.secret.iter()).map(|g| g.case_count()).sum::<usize>();
    info!(test_cases = case_count, max_score = suite.max_score(), "Discovered test data");

    let work_dir = tempfile::Builder::new()
        .prefix("gavel")
        .tempdir_in(&config.work_dir)
        .with_context(|| format!("Failed to create work directory in {}", config.work_dir.display()))?;

    let engine = LocalEngine::prepare(
        &config.submission_dir,
        &languages,
        &problem,
        work_dir.path().join("build"),
    )?;
    let validator = ExternalValidator::new(
        config.validator.clone(),
        Duration::from_secs(problem.config.limits.validation_time),
    );
    let settings = JudgeSettings::from_problem(&problem, work_dir.path().to_path_buf());

    Ok(executor::grade(&problem, &suite, &engine, &validator, &settings, config.parallel_tests).await)
}

fn write_report(config: &GraderConfig, report: &GradeReport) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("Failed to serialize results")?;
    match &config.results_path {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
            info!(path = %path.display(), "Wrote results file");
        }
        None => println!("{}", json),
    }
    Ok(())
}
