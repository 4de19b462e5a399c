//! Upload a provider file (or replay a recorded stream) and render the live
//! validation run in the terminal.

mod observability;
mod render;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use atlas_intake::{
    Fold, FoldStep, HttpSource, IngestConfig, ReplaySource, RunId, Session, SessionState,
    SourceConfig, StreamSource, Summary, Upload,
};
use clap::{Args, Parser, Subcommand};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "atlas-intake")]
#[command(about = "Stream provider validation runs from the Atlas backend")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload a file and follow its validation stream
    Validate {
        /// CSV or PDF to validate
        file: PathBuf,

        /// Base URL of the validation backend
        #[arg(long, env = "ATLAS_API_URL")]
        api_url: Option<String>,

        /// Upload endpoint path (e.g. /api/validate-credentials)
        #[arg(long, env = "ATLAS_UPLOAD_PATH")]
        path: Option<String>,

        /// Fail the run after this many seconds without data
        #[arg(long)]
        idle_timeout_secs: Option<u64>,

        #[command(flatten)]
        output: OutputArgs,
    },
    /// Replay a recorded event stream through the same pipeline
    Replay {
        /// Captured `text/event-stream` body
        recording: PathBuf,

        /// Bytes per replayed chunk
        #[arg(long, default_value_t = 64)]
        chunk_size: usize,

        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(Args, Debug)]
struct OutputArgs {
    /// TOML file overriding stage keywords, severity markers and tiers
    #[arg(long, env = "ATLAS_CONFIG")]
    config: Option<PathBuf>,

    /// Print the final report as JSON instead of streaming log lines
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    observability::init_observability("warn");

    match cli.command {
        Command::Validate {
            file,
            api_url,
            path,
            idle_timeout_secs,
            output,
        } => {
            let mut config = load_config(output.config.as_deref())?;
            if idle_timeout_secs.is_some() {
                config.run.idle_timeout_secs = idle_timeout_secs;
            }
            let mut source_config = SourceConfig::from_env()?;
            if let Some(url) = api_url {
                source_config = source_config.base_url(url);
            }
            if let Some(path) = path {
                source_config = source_config.upload_path(path);
            }
            info!(url = %source_config.upload_url(), file = %file.display(), "starting validation");
            let source = HttpSource::new(source_config)?;
            let upload = Upload::from_path(&file)?;
            run(&config, &source, upload, output.json).await
        }
        Command::Replay {
            recording,
            chunk_size,
            output,
        } => {
            let config = load_config(output.config.as_deref())?;
            let source = ReplaySource::from_path(&recording, chunk_size)?;
            let name = recording
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "recording".to_string());
            run(&config, &source, Upload::new(name, Vec::<u8>::new()), output.json).await
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<IngestConfig> {
    match path {
        Some(path) => IngestConfig::from_path(path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => Ok(IngestConfig::default()),
    }
}

async fn run(config: &IngestConfig, source: &dyn StreamSource, upload: Upload, json: bool) -> Result<ExitCode> {
    let session = Session::new(config.aggregator()?, config.run_options());
    let stages = session.aggregator().stages().clone();

    let mut print_log = |_run: RunId, step: &FoldStep, state: &SessionState| {
        if json {
            return;
        }
        if let Fold::Logged { stage, .. } = step.fold
            && let Some(entry) = state.last_log()
        {
            println!("{}", render::log_line(entry, stage.map(|s| stages.label(s))));
        }
    };

    let driver = session.begin_run();
    let abort = driver.abort_handle();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            abort.abort();
        }
    });
    let report = driver.drive_source(source, upload, &mut print_log).await;
    interrupt.abort();

    let summary = Summary::from_state(&report.state, &config.tiers);
    if json {
        println!("{}", serde_json::to_string_pretty(&render::report_json(&report, &summary))?);
    } else {
        print!("{}", render::report(&stages, &report, &summary));
    }

    Ok(if report.outcome.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
