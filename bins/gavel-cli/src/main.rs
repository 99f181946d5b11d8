mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "gavel-cli")]
#[command(about = "Gavel CLI - Manage languages and problem directories", long_about = None)]
struct Cli {
    /// Language table used by the grader
    #[arg(long, global = true, default_value = "config/languages.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    PassFail,
    Scoring,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a programming language to the language table
    AddLang {
        /// Language name (e.g., python, cpp, go)
        #[arg(short, long)]
        name: String,

        /// Source file extensions, comma separated (e.g., cpp,cc)
        #[arg(short, long)]
        ext: String,

        /// Language version (e.g., 17, 3.12)
        #[arg(short, long, default_value = "latest")]
        version: String,

        /// Compile command template (e.g., "g++ -O2 -o {binary} {files}")
        #[arg(short, long)]
        compile: Option<String>,

        /// Run command template (e.g., "python3 {main}")
        #[arg(short, long)]
        run: String,
    },

    /// Remove a programming language from the language table
    RemoveLang {
        /// Language name
        #[arg(short, long)]
        name: String,

        /// Skip confirmation prompt
        #[arg(short, long, default_value = "false")]
        yes: bool,
    },

    /// List all configured languages
    ListLangs,

    /// Scaffold a new problem directory
    Init {
        /// Problem path
        #[arg(short, long)]
        path: PathBuf,

        /// Problem name (defaults to the directory name)
        #[arg(short, long)]
        name: Option<String>,

        /// Problem type
        #[arg(short, long, value_enum, default_value = "pass-fail")]
        kind: Kind,
    },

    /// Validate a problem directory and print its test group tree
    Check {
        /// Problem path
        #[arg(short, long)]
        problem: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::AddLang {
            name,
            ext,
            version,
            compile,
            run,
        } => {
            commands::add_language(&cli.config, &name, &ext, &version, compile.as_deref(), &run).await?;
        }
        Commands::RemoveLang { name, yes } => {
            commands::remove_language(&cli.config, &name, yes).await?;
        }
        Commands::ListLangs => {
            commands::list_languages(&cli.config).await?;
        }
        Commands::Init { path, name, kind } => {
            let kind = match kind {
                Kind::PassFail => gavel_common::types::ProblemKind::PassFail,
                Kind::Scoring => gavel_common::types::ProblemKind::Scoring,
            };
            commands::init_problem(&path, name.as_deref(), kind).await?;
        }
        Commands::Check { problem } => {
            commands::check_problem(&problem).await?;
        }
    }

    Ok(())
}
