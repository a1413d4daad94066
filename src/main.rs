//! Binary entrypoint for the nextion-bridge CLI.
//!
//! Commands:
//! - `start [--model <path>]` - drive the configured panels; telemetry deltas are read
//!   from stdin as JSON lines (`{"path": "...", "value": ...}`) and button writes are
//!   printed to stdout as `{"put": "...", "value": ...}`
//! - `init` - create a starter `config.toml` and display model
//! - `check` - validate the configuration and display model, then print a summary
//!
//! See the library crate docs for module-level details: `nextion_bridge::`.
use anyhow::Result;
use clap::{Parser, Subcommand};
use log::{info, warn};
use serde_json::json;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use nextion_bridge::bus::{BusError, Delta, MemoryBus, WriteFuture, WriteHandler};
use nextion_bridge::config::Config;
use nextion_bridge::device::Connector;
use nextion_bridge::model::file::ModelFile;
use nextion_bridge::model::Value;
use nextion_bridge::server::BridgeServer;

#[derive(Parser)]
#[command(name = "nextion-bridge")]
#[command(about = "Drives Nextion touch panels from a live telemetry data bus")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the configured panels and run until interrupted
    Start {
        /// Display model file (overrides display.model_file)
        #[arg(short, long)]
        model: Option<String>,
    },
    /// Write a starter configuration and display model
    Init,
    /// Validate the configuration and display model
    Check {
        /// Display model file (overrides display.model_file)
        #[arg(short, long)]
        model: Option<String>,
    },
}

const STARTER_MODEL: &str = r#"# Display model: pages, items and buttons per panel, in [[devices]] order.

[colors]
"Home.textColor" = { day = 0, night = 63488 }

[[devices]]
[devices.pages.0]
items = [
  { objname = "sog", type = "text", path = "navigation.speedOverGround", format = { convert = "ms_to_knots", decimals = 1, suffix = "kn" }, unknown = "--kn" },
  { objname = "cog", type = "text", path = "navigation.courseOverGroundTrue", format = { convert = "rads_to_deg", suffix = "°" }, unknown = "---°" },
  { objname = "windG", type = "gauge", path = "environment.wind.angleApparent", format = { convert = "rads_to_gauge" } },
]

[devices.pages.1]
items = [
  { objname = "s0", type = "wave", path = "environment.wind.speedApparent", format = { convert = "ms_to_knots" }, range_hi = 30, height = 81, id = 2 },
]
"#;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start { model } => {
            let config = Config::load(&cli.config).await?;
            init_logging(&Some(config.clone()), cli.verbose);
            info!("Starting nextion-bridge v{}", env!("CARGO_PKG_VERSION"));
            run(config, model).await?;
        }
        Commands::Init => {
            init_logging(&None, cli.verbose);
            info!("Initializing new bridge configuration");
            let config = Config::default();
            if tokio::fs::try_exists(&cli.config).await? {
                warn!("{} already exists, leaving it untouched", cli.config);
            } else {
                Config::create_default(&cli.config).await?;
                info!("Configuration file created at {}", cli.config);
            }
            let model_path = &config.display.model_file;
            if tokio::fs::try_exists(model_path).await? {
                warn!("{} already exists, leaving it untouched", model_path);
            } else {
                tokio::fs::write(model_path, STARTER_MODEL).await?;
                info!("Display model created at {}", model_path);
            }
        }
        Commands::Check { model } => {
            let config = Config::load(&cli.config).await?;
            init_logging(&Some(config.clone()), cli.verbose);
            config.validate()?;
            let model_path = model.unwrap_or_else(|| config.display.model_file.clone());
            let display = ModelFile::load(&model_path).await?;
            println!("Configuration OK: {}", cli.config);
            for (index, device) in config.devices.iter().enumerate() {
                match display.devices.get(index) {
                    Some(m) => println!(
                        "  panel{}: {} @ {} baud, {} page(s)",
                        index,
                        device.port,
                        device.baud_rate,
                        m.page_count()
                    ),
                    None => println!("  panel{}: {} (no display model)", index, device.port),
                }
            }
            println!("  {} subscribed path(s)", display.subscribed_paths().len());
        }
    }

    Ok(())
}

async fn run(config: Config, model_override: Option<String>) -> Result<()> {
    let model_path = model_override.unwrap_or_else(|| config.display.model_file.clone());
    let display = ModelFile::load(&model_path).await?;
    let sun = Arc::new(config.sun.schedule()?);

    // Button writes are echoed on stdout and applied locally.
    let (put_tx, mut put_rx) = mpsc::unbounded_channel::<(String, Value)>();
    let handler: WriteHandler = Arc::new(move |path: &str, value: &Value| -> WriteFuture {
        let sent = put_tx.send((path.to_string(), value.clone()));
        Box::pin(async move { sent.map_err(|_| BusError::Unavailable) })
    });
    let bus = MemoryBus::with_write_handler(handler);

    let server = BridgeServer::start(&config, display, Arc::new(bus.clone()), sun, connector)?;
    server.log_status_changes();

    let put_bus = bus.clone();
    tokio::spawn(async move {
        while let Some((path, value)) = put_rx.recv().await {
            println!("{}", json!({ "put": path, "value": value }));
            put_bus.set(&path, value);
        }
    });

    let feed_bus = bus.clone();
    let feed = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => match serde_json::from_str::<Delta>(&line) {
                    Ok(delta) => feed_bus.publish(delta),
                    Err(e) => warn!("Ignoring malformed delta: {}", e),
                },
                Ok(None) => {
                    info!("stdin closed, no further telemetry");
                    break;
                }
                Err(e) => {
                    warn!("stdin read failed: {}", e);
                    break;
                }
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Interrupt received, shutting down");
    feed.abort();
    for line in server.status_lines() {
        info!("{}", line);
    }
    server.shutdown().await;
    Ok(())
}

#[cfg(feature = "serial")]
fn connector(device: &nextion_bridge::config::DeviceConfig) -> Arc<dyn Connector> {
    Arc::new(nextion_bridge::device::serial::SerialConnector::new(
        &device.port,
        device.baud_rate,
    ))
}

#[cfg(not(feature = "serial"))]
fn connector(device: &nextion_bridge::config::DeviceConfig) -> Arc<dyn Connector> {
    use nextion_bridge::device::{Link, LinkError};

    struct Unavailable(String);

    impl Connector for Unavailable {
        fn open(&self) -> Result<Link, LinkError> {
            Err(LinkError::Open {
                port: self.0.clone(),
                reason: "built without the 'serial' feature".to_string(),
            })
        }
        fn describe(&self) -> String {
            self.0.clone()
        }
    }

    Arc::new(Unavailable(device.port.clone()))
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // CLI verbosity overrides the configured level
    let configured = config
        .as_ref()
        .and_then(|c| c.logging.level.parse::<log::LevelFilter>().ok())
        .unwrap_or(log::LevelFilter::Info);
    let base_level = match verbosity {
        0 => configured,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);

    let file = config.as_ref().and_then(|c| c.logging.file.clone()).and_then(|path| {
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .ok()
    });
    if let Some(f) = file {
        let write_mutex = std::sync::Arc::new(std::sync::Mutex::new(f));
        // Echo to the console only when attended
        let is_tty = atty::is(atty::Stream::Stderr);
        builder.format(move |fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            let line = format!("{} [{}] {}", ts, record.level(), record.args());
            if let Ok(mut guard) = write_mutex.lock() {
                let _ = writeln!(guard, "{}", line);
            }
            if is_tty {
                writeln!(fmt, "{}", line)
            } else {
                Ok(())
            }
        });
    } else {
        builder.format(|fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            writeln!(fmt, "{} [{}] {}", ts, record.level(), record.args())
        });
    }
    let _ = builder.try_init();
}
