//! Command-line collection runner.
//!
//! Loads a collection from a JSON file, hydrates variables from a data
//! directory, runs every request in order and prints a summary. The exit code
//! is non-zero when a request aborted or a test failed.
//!
//! Logging goes to stderr and is controlled with `RUST_LOG`.

use clap::Parser;
use rest_workbench::config::{load_config, update_config, ClientConfig, SETTINGS_KEY};
use rest_workbench::models::Collection;
use rest_workbench::pipeline::{BatchRunner, Orchestrator, RunStatus, RunSummary, Session};
use rest_workbench::storage::{FileStorage, Storage};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "rest-workbench-run")]
#[command(version)]
#[command(about = "Run a request collection and report test results", long_about = None)]
struct Cli {
    /// Path to the collection JSON file
    collection: PathBuf,

    /// Active environment id
    #[arg(short, long)]
    env: Option<String>,

    /// Directory holding variables, collections and history
    #[arg(short, long, default_value = ".rest-workbench")]
    data_dir: PathBuf,

    /// Request timeout in milliseconds
    #[arg(short, long)]
    timeout: Option<u64>,

    /// Settings JSON file with a "rest-workbench" section
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Do not append runs to the history file
    #[arg(long, default_value = "false")]
    no_history: bool,

    /// Store the collection, with last-execution results, in the data directory
    #[arg(long, default_value = "false")]
    save: bool,

    /// Print the summary as JSON
    #[arg(long, default_value = "false")]
    json: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(summary) if summary.is_success() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::from(1),
        Err(message) => {
            eprintln!("error: {}", message);
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> Result<RunSummary, String> {
    let config = configure(&cli).await?;

    let contents = tokio::fs::read_to_string(&cli.collection)
        .await
        .map_err(|e| format!("Cannot read {}: {}", cli.collection.display(), e))?;
    let mut collection: Collection = serde_json::from_str(&contents)
        .map_err(|e| format!("Invalid collection {}: {}", cli.collection.display(), e))?;

    let storage = Arc::new(FileStorage::new(&cli.data_dir));
    let mut session = Session::load(storage.as_ref(), cli.env.as_deref(), Some(&collection))
        .await
        .map_err(|e| e.to_string())?;

    let orchestrator = Orchestrator::from_config(&config)
        .map_err(|e| e.to_string())?
        .with_storage(storage.clone());
    let summary = BatchRunner::new(orchestrator)
        .run_collection(&mut session, &mut collection)
        .await;

    if cli.save {
        save_collection(storage.as_ref(), collection).await?;
    }

    if cli.json {
        let json = serde_json::to_string_pretty(&summary).map_err(|e| e.to_string())?;
        println!("{}", json);
    } else {
        print_summary(&summary);
    }
    Ok(summary)
}

async fn configure(cli: &Cli) -> Result<ClientConfig, String> {
    let settings = match &cli.settings {
        Some(path) => {
            let text = tokio::fs::read_to_string(path)
                .await
                .map_err(|e| format!("Cannot read {}: {}", path.display(), e))?;
            let value: serde_json::Value = serde_json::from_str(&text)
                .map_err(|e| format!("Invalid settings {}: {}", path.display(), e))?;
            if value.get(SETTINGS_KEY).is_none() {
                log::warn!("{} has no \"{}\" section", path.display(), SETTINGS_KEY);
            }
            Some(value)
        }
        None => None,
    };
    let mut config = load_config(settings)?;

    if cli.timeout.is_some() || cli.no_history {
        update_config(|config| {
            if let Some(timeout) = cli.timeout {
                config.timeout = timeout;
            }
            if cli.no_history {
                config.save_history = false;
            }
        });
        config = rest_workbench::config::get_config();
    }
    Ok(config)
}

async fn save_collection(storage: &dyn Storage, collection: Collection) -> Result<(), String> {
    let mut collections = storage.get_collections().await.map_err(|e| e.to_string())?;
    match collections.iter_mut().find(|c| c.id == collection.id) {
        Some(existing) => *existing = collection,
        None => collections.push(collection),
    }
    storage
        .save_collections(&collections)
        .await
        .map_err(|e| e.to_string())
}

fn print_summary(summary: &RunSummary) {
    for run in &summary.runs {
        match &run.status {
            RunStatus::Completed {
                code,
                duration,
                test_results,
            } => {
                println!("✓ {} [{}] {} ms", run.name, code, duration);
                for result in test_results {
                    match &result.error {
                        None => println!("    ✓ {}", result.name),
                        Some(error) => println!("    ✗ {}: {}", result.name, error),
                    }
                }
            }
            RunStatus::Aborted { error } => println!("✗ {}: {}", run.name, error),
        }
    }

    let tests = summary.tests();
    println!();
    println!(
        "{} requests, {} aborted; {} tests, {} passed, {} failed",
        summary.runs.len(),
        summary.aborted(),
        tests.total(),
        tests.passed,
        tests.failed
    );
}
