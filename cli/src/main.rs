//! # Formation Simulator CLI
//!
//! The `formation-sim` binary runs the coordination core headless.
//!
//! ## Commands
//!
//! - `formation-sim run --config FILE` - Run until quiescent or out of steps
//! - `formation-sim validate --config FILE` - Check a configuration
//! - `formation-sim resume --config FILE --checkpoint FILE` - Continue a saved run
//!
//! Configuration files are JSON documents deserialized into
//! `EnvironmentConfig`; omitted fields take their defaults.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use formation_simulator_core_rs::environment::{
    Environment, EnvironmentConfig, RecordingEnvironment, Steppable,
};
use formation_simulator_core_rs::export;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Cell-based robot formation simulator
#[derive(Parser)]
#[command(name = "formation-sim")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json: bool,

    /// Log level when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a simulation from a configuration file
    Run {
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,

        /// Stop after this many steps even if not quiescent
        #[arg(long)]
        steps: Option<usize>,

        /// Write JSON Lines exports into this directory
        #[arg(long, value_name = "DIR")]
        export_dir: Option<PathBuf>,

        /// Save the final state to this file
        #[arg(long, value_name = "FILE")]
        checkpoint: Option<PathBuf>,

        /// Write one rendered frame per step to this file (JSON Lines)
        #[arg(long, value_name = "FILE")]
        frames: Option<PathBuf>,
    },

    /// Validate a configuration file without running it
    Validate {
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,
    },

    /// Resume from a checkpoint saved with the same configuration
    Resume {
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,

        #[arg(long, value_name = "FILE")]
        checkpoint: PathBuf,

        #[arg(long)]
        steps: Option<usize>,

        #[arg(long, value_name = "DIR")]
        export_dir: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.json)?;

    match cli.command {
        Commands::Run {
            config,
            steps,
            export_dir,
            checkpoint,
            frames,
        } => {
            let config = load_config(&config)?;
            let env = Environment::new(config).context("Failed to build environment")?;
            let mut recording = RecordingEnvironment::new(env);
            let taken = run_steps(&mut recording, steps);

            report(recording.inner(), taken);
            if let Some(path) = frames {
                write_frames(&path, &mut recording)?;
            }
            finish(recording.inner(), export_dir.as_deref(), checkpoint.as_deref())
        }
        Commands::Validate { config } => {
            let config = load_config(&config)?;
            Environment::validate_config(&config).context("Invalid configuration")?;
            println!("configuration ok");
            Ok(())
        }
        Commands::Resume {
            config,
            checkpoint,
            steps,
            export_dir,
        } => {
            let config = load_config(&config)?;
            let state = fs::read_to_string(&checkpoint)
                .with_context(|| format!("Failed to read {}", checkpoint.display()))?;
            let mut env =
                Environment::load_state(config, &state).context("Failed to restore checkpoint")?;
            info!(step = env.step_count(), "resumed from checkpoint");

            let taken = run_steps(&mut env, steps);
            report(&env, taken);
            finish(&env, export_dir.as_deref(), Some(&checkpoint))
        }
    }
}

fn load_config(path: &Path) -> Result<EnvironmentConfig> {
    let text =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Step until the run ends or `limit` steps have been taken
fn run_steps<S: Steppable>(sim: &mut S, limit: Option<usize>) -> usize {
    let mut taken = 0;
    loop {
        if limit.is_some_and(|n| taken >= n) {
            break;
        }
        taken += 1;
        if !sim.step() {
            break;
        }
    }
    taken
}

fn report(env: &Environment, taken: usize) {
    info!(
        steps = taken,
        step = env.step_count(),
        cells = env.n_cells(),
        robots = env.n_robots(),
        free = env.n_free_robots(),
        error = env.last_error(),
        quiescent = env.quiescence(),
        messages = env.total_messages(),
        "run finished"
    );
}

fn write_frames(path: &Path, recording: &mut RecordingEnvironment<Environment>) -> Result<()> {
    let mut out = String::new();
    for frame in recording.take_frames() {
        out.push_str(&serde_json::to_string(&frame)?);
        out.push('\n');
    }
    fs::write(path, out).with_context(|| format!("Failed to write {}", path.display()))?;
    info!(path = %path.display(), "frames written");
    Ok(())
}

fn finish(env: &Environment, export_dir: Option<&Path>, checkpoint: Option<&Path>) -> Result<()> {
    if let Some(dir) = export_dir {
        export::export_all(dir, env).context("Export failed")?;
    }
    if let Some(path) = checkpoint {
        let state = env.save_state().context("Failed to snapshot state")?;
        fs::write(path, state).with_context(|| format!("Failed to write {}", path.display()))?;
        info!(path = %path.display(), step = env.step_count(), "checkpoint saved");
    }
    Ok(())
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.compact().init();
    }

    Ok(())
}
