mod output;
mod profile;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use launchlog_launch::{LaunchConsole, PipelineEvent, PipelineHandle, PipelineOutcome};
use launchlog_logs::{LineSplitter, LogBuffer};
use launchlog_types::Severity;

use crate::output::OutputArgs;
use crate::profile::Profile;

/// launchlog - run a multi-step game launch and classify its live log
#[derive(Parser, Debug)]
#[command(name = "launchlog")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run a launch profile and print the classified log when it ends
    Run {
        /// Launch profile (TOML)
        #[arg(value_name = "PROFILE")]
        profile: PathBuf,

        /// Console size in lines (overrides the profile)
        #[arg(long)]
        max_lines: Option<usize>,

        /// Stop logging when the console is full instead of dropping old lines
        #[arg(long, value_name = "BOOL")]
        stop_on_overflow: Option<bool>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Classify a saved game log
    Parse {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Console size in lines
        #[arg(long, default_value = "100000")]
        max_lines: usize,

        #[command(flatten)]
        output: OutputArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Diagnostics go to stderr; stdout is the log itself
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = match args.command {
        Commands::Run {
            profile,
            max_lines,
            stop_on_overflow,
            output,
        } => run_profile(profile, max_lines, stop_on_overflow, output).await,
        Commands::Parse {
            file,
            max_lines,
            output,
        } => parse_file(file, max_lines, output),
    };

    if let Err(e) = &result {
        eprintln!("Error: {:#}", e);
    }

    result
}

async fn run_profile(
    path: PathBuf,
    max_lines: Option<usize>,
    stop_on_overflow: Option<bool>,
    output: OutputArgs,
) -> Result<()> {
    let filter = output.filter()?;
    let profile = Profile::load(&path)?;
    let buffer = profile.console.buffer(max_lines, stop_on_overflow);
    let mut pipeline = profile.build_pipeline(buffer.clone())?;
    tracing::info!(profile = %path.display(), steps = pipeline.step_count(), "profile loaded");

    let (handle, control) = PipelineHandle::channel();
    let mut events = pipeline.subscribe();

    // Ctrl-C asks the pipeline to abort
    let interrupt = handle.clone();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, aborting launch");
            if !interrupt.abort().await {
                eprintln!("The current step cannot be aborted; stopping once it ends.");
            }
        }
    });

    // Report progress, and ask before launching steps that wait for it
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                PipelineEvent::StepChanged { index, name } => {
                    tracing::info!(index, step = %name, "step started");
                }
                PipelineEvent::AwaitingProceed { index } => {
                    eprintln!("Step {} is ready. Press Enter to launch.", index + 1);
                    let confirmed = tokio::task::spawn_blocking(|| {
                        let mut line = String::new();
                        std::io::stdin().read_line(&mut line).is_ok()
                    })
                    .await
                    .unwrap_or(false);
                    if confirmed {
                        handle.proceed().await;
                    } else {
                        handle.abort().await;
                    }
                }
                _ => {}
            }
        }
    });

    let outcome = pipeline.run(control).await;
    output.print(&buffer, &filter)?;

    match outcome {
        PipelineOutcome::Succeeded => Ok(()),
        PipelineOutcome::Failed(reason) => anyhow::bail!("Launch failed: {}", reason),
        PipelineOutcome::Aborted(reason) => anyhow::bail!("Launch aborted: {}", reason),
    }
}

fn parse_file(path: PathBuf, max_lines: usize, output: OutputArgs) -> Result<()> {
    let filter = output.filter()?;
    let content = std::fs::read(&path)
        .with_context(|| format!("Failed to read log {}", path.display()))?;

    let buffer = LogBuffer::new(max_lines);
    let mut console = LaunchConsole::new(buffer.clone());
    let mut splitter = LineSplitter::new();

    let lines = splitter.push(&content);
    console.on_log_lines(&lines, Severity::StdOut);
    if let Some(rest) = splitter.finish() {
        console.on_log_line(&rest, Severity::StdOut);
    }
    console.flush();

    output.print(&buffer, &filter)
}
