//! CLI Entry Point for hmi-fixture
//!
//! Provides command-line interface for:
//! - Running the fixture against the HMI (`run`)
//! - Checking a configuration file without touching hardware (`check-config`)
//!
//! # Usage
//!
//! ```bash
//! hmi-fixture run --config config/fixture.toml
//! hmi-fixture run --dry-run
//! hmi-fixture check-config --config config/fixture.toml --print
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hmi_fixture::config::FixtureConfig;
use hmi_fixture::console::run_console;
use hmi_fixture::hardware::{
    DigitalIo, Flasher, LoopbackIo, OpenOcdFlasher, ScriptedFlasher, SysfsGpio,
};
use hmi_fixture::link::SerialLink;
use hmi_fixture::logging;
use hmi_fixture::sequence::Sequencer;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// How long the runtime waits for stragglers (the stdin reader) on exit.
const RUNTIME_SHUTDOWN: Duration = Duration::from_millis(500);

#[derive(Parser)]
#[command(name = "hmi-fixture")]
#[command(about = "Test fixture controller for a serial touch-panel HMI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the fixture
    Run {
        /// Configuration file
        #[arg(long, default_value = "config/fixture.toml")]
        config: PathBuf,

        /// Simulate the flasher and the harness instead of driving hardware
        #[arg(long)]
        dry_run: bool,
    },

    /// Load and validate a configuration file
    CheckConfig {
        /// Configuration file
        #[arg(long, default_value = "config/fixture.toml")]
        config: PathBuf,

        /// Print the effective configuration, environment overrides included
        #[arg(long)]
        print: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let runtime = tokio::runtime::Runtime::new().context("starting tokio runtime")?;
    let result = runtime.block_on(async {
        match cli.command {
            Commands::Run { config, dry_run } => run_fixture(config, dry_run).await,
            Commands::CheckConfig { config, print } => check_config(config, print),
        }
    });
    // tokio's stdin reader blocks a thread until the next line; do not wait for it.
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN);
    result
}

fn load_config(path: &Path) -> Result<FixtureConfig> {
    let config = FixtureConfig::load_from(path)
        .with_context(|| format!("loading configuration from {}", path.display()))?;
    config.validate().context("validating configuration")?;
    Ok(config)
}

fn check_config(path: PathBuf, print: bool) -> Result<()> {
    let config = load_config(&path)?;
    config.check_paths().context("checking configured files")?;
    println!("{}: OK", path.display());
    println!("  HMI on {} at {} baud", config.serial.port, config.serial.baud_rate);
    println!(
        "  images: {} / {}",
        config.flashing.test_program.display(),
        config.flashing.firmware.display()
    );
    if print {
        let effective = toml::to_string_pretty(&config).context("serializing configuration")?;
        println!();
        print!("{}", effective);
    }
    Ok(())
}

async fn run_fixture(path: PathBuf, dry_run: bool) -> Result<()> {
    let config = load_config(&path)?;
    logging::init_from_config(&config).map_err(anyhow::Error::msg)?;
    if !dry_run {
        config.check_paths().context("checking configured files")?;
    }

    let link = Arc::new(
        SerialLink::open(&config.serial)
            .await
            .context("opening HMI serial link")?,
    );

    let (flasher, io): (Arc<dyn Flasher>, Arc<dyn DigitalIo>) = if dry_run {
        warn!("dry run: flashing and harness are simulated");
        (
            Arc::new(ScriptedFlasher::always_ok().with_delay(Duration::from_secs(2))),
            Arc::new(LoopbackIo::new(&config.pins)),
        )
    } else {
        let gpio = SysfsGpio::new();
        gpio.setup(&config.pins).await.context("configuring GPIO")?;
        (
            Arc::new(OpenOcdFlasher::from_config(&config.flashing)),
            Arc::new(gpio),
        )
    };

    let sequencer = Arc::new(Sequencer::new(link.clone(), flasher, io, &config)?);
    sequencer.install_producers()?;

    let cancel = CancellationToken::new();
    let sequence_task = {
        let sequencer = sequencer.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { sequencer.run(cancel).await })
    };
    let console_task = {
        let link = link.clone();
        let sequencer = sequencer.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let stdin = BufReader::new(tokio::io::stdin());
            run_console(stdin, &link, &sequencer, cancel).await
        })
    };

    info!(port = %config.serial.port, "fixture running");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Ctrl-C received"),
        _ = cancel.cancelled() => {}
    }

    info!("shutting down");
    cancel.cancel();
    let sequence_abort = sequence_task.abort_handle();
    match tokio::time::timeout(config.serial.join_timeout(), sequence_task).await {
        Ok(Ok(Err(e))) => error!(error = %e, "test sequence ended with an error"),
        Ok(Err(e)) => error!(error = %e, "test sequence task failed"),
        Err(_) => {
            warn!("test sequence did not stop in time, aborting");
            sequence_abort.abort();
        }
        Ok(Ok(Ok(()))) => {}
    }
    console_task.abort();

    if let Err(e) = sequencer.release_outputs().await {
        error!(error = %e, "could not release fixture outputs");
    }
    link.close().await;
    info!("fixture stopped");
    Ok(())
}
