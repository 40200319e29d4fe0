//! meshlink CLI - query and message a mesh-radio daemon through the broker.
//!
//! See the `meshlink` library for the broker itself.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use meshlink::constants::PROBE_TIMEOUT;
use meshlink::{ChannelRole, Config, NodeInfo};

// CLI
#[derive(Parser)]
#[command(name = "meshlink")]
#[command(version)]
#[command(about = "Talk to a single-client mesh-radio daemon")]
struct Cli {
    /// Daemon host (overrides config and MESHLINK_HOST)
    #[arg(long, global = true)]
    host: Option<String>,
    /// Daemon API port (overrides config and MESHLINK_PORT)
    #[arg(long, global = true)]
    port: Option<u16>,
    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check whether the daemon accepts connections (does not claim the slot)
    Probe {
        /// Probe timeout in milliseconds
        #[arg(long, default_value_t = PROBE_TIMEOUT.as_millis() as u64)]
        timeout_ms: u64,
    },
    /// List nodes the radio has heard
    Nodes,
    /// List configured channel slots
    Channels,
    /// Show local radio details
    Info,
    /// Send a text message
    Send {
        /// Message text
        text: String,
        /// Destination: ^all, !hexid or a node number
        #[arg(long, default_value = "^all")]
        dest: String,
        /// Channel slot index
        #[arg(long, default_value_t = 0)]
        channel: u8,
    },
    /// Print the effective configuration
    Config,
}

fn init_logging() -> Result<()> {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    builder.format_timestamp_secs();
    if let Ok(path) = std::env::var("MESHLINK_LOG_FILE") {
        let log_file = std::fs::File::create(&path)
            .with_context(|| format!("Failed to create log file at {path:?}"))?;
        builder.target(env_logger::Target::Pipe(Box::new(log_file)));
    }
    builder.init();
    Ok(())
}

fn format_last_heard(ts: Option<i64>) -> String {
    ts.and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .map_or_else(|| "-".to_string(), |t| t.format("%Y-%m-%d %H:%M:%S").to_string())
}

fn print_nodes(nodes: &[NodeInfo]) {
    println!("{:<10} {:<6} {:<24} {:>6} {:>5}  LAST HEARD (UTC)", "ID", "SHORT", "NAME", "SNR", "BATT");
    for node in nodes {
        println!(
            "{:<10} {:<6} {:<24} {:>6} {:>5}  {}",
            node.id,
            node.short_name,
            node.long_name,
            node.snr.map_or_else(|| "-".to_string(), |s| format!("{s:.1}")),
            node.battery_level.map_or_else(|| "-".to_string(), |b| format!("{b}%")),
            format_last_heard(node.last_heard),
        );
    }
}

fn main() -> Result<()> {
    init_logging()?;

    let cli = Cli::parse();

    let mut config = Config::load()?;
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    let broker = config.broker();
    log::debug!("using broker {broker:?}");

    match cli.command {
        Commands::Probe { timeout_ms } => {
            let up = broker.is_available(Duration::from_millis(timeout_ms));
            if cli.json {
                println!("{}", serde_json::json!({ "endpoint": broker.endpoint().to_string(), "available": up }));
            } else {
                println!("{}: {}", broker.endpoint(), if up { "available" } else { "unreachable" });
            }
            if !up {
                bail!("daemon at {} is not reachable", broker.endpoint());
            }
        }
        Commands::Nodes => {
            let nodes = broker.get_nodes();
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&nodes)?);
            } else if nodes.is_empty() {
                println!("No nodes (daemon unreachable or mesh empty)");
            } else {
                print_nodes(&nodes);
            }
        }
        Commands::Channels => {
            let channels = broker.get_channels();
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&channels)?);
            } else if channels.is_empty() {
                println!("No channels (daemon unreachable)");
            } else {
                for ch in channels.iter().filter(|c| c.role != ChannelRole::Disabled) {
                    let name = if ch.name.is_empty() { "(default)" } else { ch.name.as_str() };
                    println!("{:>2}  {:<10} {}", ch.index, ch.role, name);
                }
            }
        }
        Commands::Info => {
            let info = broker.get_radio_info();
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else if info.is_empty() {
                println!("No radio info (daemon unreachable)");
            } else {
                println!("Node:     !{:08x} ({} / {})", info.node_num, info.long_name, info.short_name);
                println!("Hardware: {}", info.hw_model);
                println!("Firmware: {}", info.firmware_version);
                println!("Region:   {}", info.region);
                println!("Preset:   {}", info.modem_preset);
            }
        }
        Commands::Send { text, dest, channel } => {
            if !broker.send_message_on(&text, &dest, channel) {
                bail!("message to {dest} was not sent (see log for details)");
            }
            println!("Sent to {dest} on channel {channel}");
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
