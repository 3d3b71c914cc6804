use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::Ordering;

use clap::{Parser, Subcommand};
use log::{info, warn};
use serde_json::json;

use textmill::config::{load_config, Config};
use textmill::error::{TextmillError, WorkerError};
use textmill::job::{JobFilter, JobStatus};
use textmill::worker::JobReport;
use textmill::{logging, Textmill};

#[derive(Parser, Debug)]
#[command(name = "textmill", version, about = "Scramble the inner letters of words in text files")]
struct Cli {
    /// Path to a JSON config file.
    #[arg(short, long, env = "TEXTMILL_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload files and process them in the background worker pool.
    Process {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Print one job as JSON.
    Status { job_id: String },
    /// List jobs, newest first.
    List {
        #[arg(long, value_parser = parse_status)]
        status: Option<JobStatus>,
        #[arg(long, default_value_t = 100)]
        limit: u64,
        #[arg(long, default_value_t = 0)]
        offset: u64,
    },
    /// Print the supported file extensions.
    Extensions,
}

fn parse_status(raw: &str) -> Result<JobStatus, String> {
    raw.parse()
}

fn main() {
    let Err(error) = run() else {
        process::exit(0);
    };

    if tracing::enabled!(tracing::Level::ERROR) {
        tracing::error!(error = %error, "textmill terminated with error");
    } else {
        eprintln!("Error: {}", error);
    }

    process::exit(1);
}

fn run() -> Result<(), TextmillError> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => Config::default_for(default_storage_root()),
    };
    logging::init(&config.logging)?;

    let app = Textmill::new(&config)?;

    match cli.command {
        Command::Process { files } => process_files(&app, &files),
        Command::Status { job_id } => {
            let job = app
                .get_job(&job_id)?
                .ok_or(TextmillError::JobNotFound(job_id))?;
            println!("{}", serde_json::to_string(&job)?);
            Ok(())
        }
        Command::List {
            status,
            limit,
            offset,
        } => {
            let (jobs, total) = app.list_jobs(&JobFilter {
                status,
                limit: Some(limit),
                offset: Some(offset),
            })?;
            println!("{}", serde_json::to_string(&json!({ "total": total, "jobs": jobs }))?);
            Ok(())
        }
        Command::Extensions => {
            for extension in app.registry().supported_extensions() {
                println!("{}", extension);
            }
            Ok(())
        }
    }
}

fn default_storage_root() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".textmill").join("storage"))
        .unwrap_or_else(|| PathBuf::from(".textmill"))
}

fn process_files(app: &Textmill, files: &[PathBuf]) -> Result<(), TextmillError> {
    let pool = app.start_pool();

    let shutdown = pool.shutdown_flag();
    ctrlc::set_handler(move || {
        warn!("Interrupted, finishing running jobs");
        shutdown.store(true, Ordering::Relaxed);
    })
    .map_err(|e| WorkerError::SignalHandler(e.to_string()))?;

    let mut pending = HashSet::new();
    for path in files {
        let job_id = match upload_file(app, path) {
            Ok(job_id) => job_id,
            Err(e) => {
                let line = json!({ "file": path.display().to_string(), "error": e.to_string() });
                println!("{}", line);
                continue;
            }
        };

        if let Err(e) = pool.submit(job_id.clone()) {
            warn!("Could not submit job {}: {}", job_id, e);
            break;
        }
        pending.insert(job_id);

        while let Some(report) = pool.try_recv_result() {
            print_report(&report, &mut pending)?;
        }
    }

    while !pending.is_empty() {
        let Some(report) = pool.recv_result() else {
            break;
        };
        print_report(&report, &mut pending)?;
    }

    if !pending.is_empty() {
        warn!("{} job(s) left pending after shutdown", pending.len());
    }

    pool.shutdown();
    pool.wait();
    Ok(())
}

fn upload_file(app: &Textmill, path: &Path) -> Result<String, TextmillError> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    app.validate_upload(name)?;

    let content = std::fs::read(path).map_err(|e| TextmillError::ReadInput {
        path: path.to_path_buf(),
        source: e,
    })?;
    let job_id = app.upload(name, &content)?;
    info!("Submitted {} as job {}", name, job_id);
    Ok(job_id)
}

fn print_report(report: &JobReport, pending: &mut HashSet<String>) -> Result<(), TextmillError> {
    pending.remove(&report.job_id);
    println!("{}", serde_json::to_string(report)?);
    Ok(())
}
