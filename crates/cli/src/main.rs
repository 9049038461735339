//! Energy Monitor CLI
//!
//! A command-line tool for inspecting devices, readings and alerts
//! in the solar energy monitor, and for submitting readings by hand.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{alerts, devices, readings};

/// Energy Monitor CLI
#[derive(Parser)]
#[command(name = "emon")]
#[command(author, version, about = "CLI for the solar energy monitor", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via EMON_API_URL env var)
    #[arg(long, env = "EMON_API_URL", default_value = "http://localhost:8080")]
    pub api_url: String,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Inspect registered devices
    #[command(subcommand)]
    Devices(DeviceCommands),

    /// List and resolve alerts
    #[command(subcommand)]
    Alerts(AlertCommands),

    /// Inspect and submit meter readings
    #[command(subcommand)]
    Readings(ReadingCommands),
}

#[derive(Subcommand)]
pub enum DeviceCommands {
    /// List registered devices
    List {
        /// Filter by status (active, inactive, maintenance)
        #[arg(long)]
        status: Option<String>,
    },

    /// Show the latest reading for a device
    Status {
        /// Device ID
        id: i64,
    },

    /// Show per-device data quality statistics
    Quality,
}

#[derive(Subcommand)]
pub enum AlertCommands {
    /// List alerts
    List {
        /// Filter by device ID
        #[arg(long)]
        device_id: Option<i64>,

        /// Filter by resolution state (true or false)
        #[arg(long)]
        resolved: Option<bool>,

        /// Lookback window in hours
        #[arg(long, default_value_t = 24)]
        hours: i64,
    },

    /// Mark an alert as resolved
    Resolve {
        /// Alert ID
        id: i64,
    },
}

#[derive(Subcommand)]
pub enum ReadingCommands {
    /// List recent readings for a device
    List {
        /// Device ID
        device_id: i64,

        /// Lookback window in hours
        #[arg(long, default_value_t = 24)]
        hours: i64,

        /// Filter by classification (valid, uncertain, quarantine)
        #[arg(long)]
        classification: Option<String>,
    },

    /// Submit a reading for a device
    Ingest {
        /// Device ID
        device_id: i64,

        /// Cumulative meter value in kWh
        #[arg(long, conflicts_with = "delta", required_unless_present = "delta")]
        value: Option<f64>,

        /// Energy delta in kWh, for meters that report increments
        #[arg(long)]
        delta: Option<f64>,

        /// Reading timestamp (RFC 3339, defaults to now)
        #[arg(long)]
        timestamp: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize client
    let client = client::ApiClient::new(&cli.api_url)?;

    // Execute command
    match cli.command {
        Commands::Devices(device_cmd) => match device_cmd {
            DeviceCommands::List { status } => {
                devices::list_devices(&client, status, cli.format).await?;
            }
            DeviceCommands::Status { id } => {
                devices::show_status(&client, id, cli.format).await?;
            }
            DeviceCommands::Quality => {
                devices::show_quality(&client, cli.format).await?;
            }
        },
        Commands::Alerts(alert_cmd) => match alert_cmd {
            AlertCommands::List {
                device_id,
                resolved,
                hours,
            } => {
                alerts::list_alerts(&client, device_id, resolved, hours, cli.format).await?;
            }
            AlertCommands::Resolve { id } => {
                alerts::resolve_alert(&client, id, cli.format).await?;
            }
        },
        Commands::Readings(reading_cmd) => match reading_cmd {
            ReadingCommands::List {
                device_id,
                hours,
                classification,
            } => {
                readings::list_readings(&client, device_id, hours, classification, cli.format)
                    .await?;
            }
            ReadingCommands::Ingest {
                device_id,
                value,
                delta,
                timestamp,
            } => {
                readings::ingest_reading(&client, device_id, value, delta, timestamp, cli.format)
                    .await?;
            }
        },
    }

    Ok(())
}
