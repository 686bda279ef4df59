//! Binary entrypoint for the meshpong CLI.
//!
//! Commands:
//! - `start [--address <port>]` - connect to the radio and answer trigger messages
//! - `init` - write a starter `config.toml`
//! - `decode <payload>` - decode one RX log payload (hex) and print the route text
//!
//! See the library crate docs for module‑level details: `meshpong::`.
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::{debug, info, warn};

use meshpong::config::Config;
use meshpong::meshcore::{EventKind, MeshCoreClient};
use meshpong::metrics;
use meshpong::path::{decode, format_path, RawPayload};
use meshpong::responder::{run, Responder};

#[derive(Parser)]
#[command(name = "meshpong")]
#[command(about = "Ping responder for MeshCore mesh networks")]
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
    /// Connect to the radio and start answering pings
    Start {
        /// Serial port of the companion radio (overrides the config file)
        #[arg(short, long)]
        address: Option<String>,
    },
    /// Write a default configuration file
    Init,
    /// Decode an RX log payload given as hex and print the route text
    Decode {
        /// Raw packet as hex, e.g. 00023f01
        payload: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_present = tokio::fs::try_exists(&cli.config).await.unwrap_or(false);
    let config = if config_present && !matches!(cli.command, Commands::Init) {
        Config::load(&cli.config).await?
    } else {
        Config::default()
    };
    init_logging(&config, cli.verbose);

    match cli.command {
        Commands::Start { address } => {
            if !config_present {
                warn!("No config file at {}; using built-in defaults", cli.config);
            }
            let mut config = config;
            if let Some(address) = address {
                config.device.address = address;
            }
            info!("Starting meshpong v{}", env!("CARGO_PKG_VERSION"));
            info!("Connecting to radio on {}", config.device.address);

            let client = Arc::new(MeshCoreClient::connect(&config.device).await?);
            let served = serve(&client, &config).await;
            client.disconnect().await;
            info!("Stats: {}", metrics::snapshot());
            served?;
        }
        Commands::Init => {
            if config_present {
                warn!("Overwriting existing configuration at {}", cli.config);
            }
            Config::create_default(&cli.config).await?;
            info!("Configuration file created at {}", cli.config);
        }
        Commands::Decode { payload } => {
            let record = decode(&RawPayload::from(payload.as_str()));
            match &record {
                Some(r) => debug!("hop_count={} nodes={:02x?}", r.hop_count, r.nodes),
                None => debug!("payload not decodable"),
            }
            println!(
                "{}",
                format_path(record.as_ref(), &config.responder.destination_label)
            );
        }
    }

    Ok(())
}

/// Subscribe, answer pings until Ctrl-C or the radio goes away, then release the
/// subscription. The caller disconnects the client on every path.
async fn serve(client: &Arc<MeshCoreClient>, config: &Config) -> Result<()> {
    let mut events = client.subscribe_many(&[EventKind::RoutingTrace, EventKind::ChannelMessage]);

    let outcome = async {
        if config.device.auto_fetch {
            client.start_auto_message_fetching()?;
        }
        let responder = Responder::new(config.responder.clone(), client.clone());
        info!(
            "Listening for '{}' on channel {}",
            config.responder.trigger_keyword, config.responder.trigger_channel
        );
        let shutdown = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Cannot listen for Ctrl-C ({}); stop the process externally", e);
                std::future::pending::<()>().await;
            }
        };
        let reason = run(&responder, &mut events, shutdown).await;
        debug!("Responder stopped: {:?}", reason);
        Ok::<(), anyhow::Error>(())
    }
    .await;

    client.unsubscribe(events.id());
    client.stop_auto_message_fetching();
    outcome
}

fn init_logging(config: &Config, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // CLI verbosity overrides the configured level
    let base_level = match verbosity {
        0 => config.logging.level_filter(),
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);

    let log_file = config.logging.file.as_ref().and_then(|path| {
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .ok()
    });

    if let Some(f) = log_file {
        let file = std::sync::Mutex::new(f);
        // Mirror to the console only when someone is watching
        let is_tty = atty::is(atty::Stream::Stdout);
        builder.format(move |fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            let line = format!("{} [{}] {}", ts, record.level(), record.args());
            if let Ok(mut guard) = file.lock() {
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
