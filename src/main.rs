use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use pathfinder_runtime::config::{ConfigError, RobotConfig};
use pathfinder_runtime::RobotId;

/// Turn-and-burst motion runtime
#[derive(Debug, Parser)]
#[command(name = "pathfinder", version)]
struct Args {
    /// JSON config file (missing keys use defaults)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Robot identifier
    #[arg(long)]
    id: Option<u32>,

    /// UDP port to listen on
    #[arg(long)]
    rx_port: Option<u16>,

    /// Serial port of the Firmata bridge
    #[arg(long)]
    serial_port: Option<String>,

    /// Run without hardware
    #[arg(long)]
    simulate: bool,

    /// Override the debug flag
    #[arg(long)]
    debug: Option<bool>,

    /// Skip frames with malformed fields
    #[arg(long)]
    strict: bool,
}

impl Args {
    fn into_config(self) -> Result<RobotConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => RobotConfig::load(path)?,
            None => RobotConfig::default(),
        };

        if let Some(id) = self.id {
            config.id = RobotId(id);
        }
        if let Some(port) = self.rx_port {
            config.rx_port = port;
        }
        if let Some(port) = self.serial_port {
            config.serial_port = port;
        }
        if let Some(debug) = self.debug {
            config.debug = debug;
        }
        if self.simulate {
            config.motors_enabled = false;
        }
        if self.strict {
            config.strict_fields = true;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() {
    let config = match Args::parse().into_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Config error: {}", e);
            std::process::exit(1);
        }
    };

    // Setup logging (RUST_LOG overrides the debug flag)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_directive())),
        )
        .init();

    if let Err(e) = pathfinder_runtime::runtime::run(config).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
