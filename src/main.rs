//! CLI entry point for scanner-bridge
//!
//! Provides command-line access to the bridge for bring-up on a device:
//! - Checking whether the Datalogic SDK can be found
//! - Streaming scans to stdout
//! - Printing the effective configuration
//!
//! # Usage
//!
//! ```bash
//! scanner-bridge probe
//! scanner-bridge listen --duration 30
//! scanner-bridge listen --mock
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use scanner_bridge::config::{BridgeConfig, DEFAULT_CONFIG_PATH};
use scanner_bridge::{logging, runtime, HostContext, ScannerBridge, VendorRuntime};
use tracing::info;

#[derive(Parser)]
#[command(name = "scanner-bridge")]
#[command(about = "Datalogic scanner bridge diagnostics", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Report whether the SDK is available
    Probe,

    /// Initialize the scanner and print every scan
    Listen {
        /// Stop after this many seconds (default: until Ctrl-C)
        #[arg(long)]
        duration: Option<u64>,

        /// Use the simulated SDK and emit a demo scan every second
        #[arg(long)]
        mock: bool,
    },

    /// Print the effective configuration as TOML
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = BridgeConfig::load_from(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    logging::init_from_config(&config).map_err(anyhow::Error::msg)?;

    match cli.command {
        Commands::Probe => probe(&config),
        Commands::Listen { duration, mock } => listen(&config, duration, mock).await,
        Commands::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

fn probe(config: &BridgeConfig) -> Result<()> {
    let bridge = ScannerBridge::new(
        runtime::discover(&config.sdk),
        HostContext::null(),
        config.sdk.names.clone(),
    );
    println!("runtime:   {}", bridge.runtime_name());
    println!("available: {}", bridge.is_available());
    Ok(())
}

async fn listen(config: &BridgeConfig, duration: Option<u64>, mock: bool) -> Result<()> {
    let (runtime, demo) = select_runtime(config, mock)?;
    let bridge = ScannerBridge::new(runtime, HostContext::null(), config.sdk.names.clone());
    if !bridge.is_available() {
        bail!("Datalogic SDK is not available (runtime: {})", bridge.runtime_name());
    }

    let mut scans = bridge.scan_stream();
    bridge.init_scanner()?;
    info!("Listening for scans");

    let deadline = async {
        match duration {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            Some(barcode) = scans.recv() => println!("{barcode}"),
            _ = tokio::signal::ctrl_c() => break,
            _ = &mut deadline => break,
        }
    }

    if let Some(demo) = demo {
        demo.abort();
    }
    bridge.dispose_scanner()?;
    Ok(())
}

type DemoTask = tokio::task::JoinHandle<()>;

#[cfg(feature = "mock")]
fn select_runtime(
    config: &BridgeConfig,
    mock: bool,
) -> Result<(Arc<dyn VendorRuntime>, Option<DemoTask>)> {
    use scanner_bridge::mock::MockSdk;

    if !mock {
        return Ok((runtime::discover(&config.sdk), None));
    }

    let sdk = MockSdk::present().with_names(config.sdk.names.clone());
    let emitter = sdk.clone();
    let demo = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        let mut sequence = 0u32;
        loop {
            interval.tick().await;
            sequence += 1;
            emitter.emit_decode(&format!("DEMO{sequence:06}"));
        }
    });
    Ok((Arc::new(sdk), Some(demo)))
}

#[cfg(not(feature = "mock"))]
fn select_runtime(
    config: &BridgeConfig,
    mock: bool,
) -> Result<(Arc<dyn VendorRuntime>, Option<DemoTask>)> {
    if mock {
        bail!("built without the `mock` feature");
    }
    Ok((runtime::discover(&config.sdk), None))
}
