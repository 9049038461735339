//! Device-related CLI commands

use anyhow::Result;
use tabled::Tabled;

use crate::client::{ApiClient, Device, DeviceStatusReport, QualitySummary};
use crate::output::{
    color_classification, color_status, color_validity, format_energy, format_timestamp,
    print_warning, OutputFormat,
};

/// Row for devices table
#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "ID")]
    id: i64,
    #[tabled(rename = "Code")]
    code: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Nominal (kW)")]
    nominal: String,
    #[tabled(rename = "Status")]
    status: String,
}

/// Row for quality statistics table
#[derive(Tabled)]
struct QualityRow {
    #[tabled(rename = "Device")]
    device: String,
    #[tabled(rename = "Valid")]
    valid: i64,
    #[tabled(rename = "Uncertain")]
    uncertain: i64,
    #[tabled(rename = "Quarantine")]
    quarantine: i64,
    #[tabled(rename = "Total")]
    total: i64,
    #[tabled(rename = "Validity")]
    validity: String,
}

/// List registered devices with an optional status filter
pub async fn list_devices(
    client: &ApiClient,
    status: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let path = match &status {
        Some(s) => format!("api/devices?status={}", s),
        None => "api/devices".to_string(),
    };

    let devices: Vec<Device> = client.get(&path).await?;

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&devices)?;
            println!("{}", json);
        }
        OutputFormat::Table => {
            if devices.is_empty() {
                print_warning("No devices found");
                return Ok(());
            }

            let rows: Vec<DeviceRow> = devices
                .iter()
                .map(|d| DeviceRow {
                    id: d.id,
                    code: d.device_code.clone(),
                    name: d.device_name.clone(),
                    nominal: format!("{:.1}", d.nominal_power),
                    status: color_status(&d.status),
                })
                .collect();

            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);
            println!("\nTotal: {} devices", devices.len());
        }
    }

    Ok(())
}

/// Show the latest reading for a device
pub async fn show_status(client: &ApiClient, id: i64, format: OutputFormat) -> Result<()> {
    let report: DeviceStatusReport = client.get(&format!("api/devices/{}/status", id)).await?;

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&report)?;
            println!("{}", json);
        }
        OutputFormat::Table => {
            println!("Device: {} ({})", report.device_code, report.device_name);
            println!("Status: {}", color_status(&report.status));

            match &report.last_reading {
                Some(ts) => {
                    println!("Last reading: {}", format_timestamp(ts));
                    if let Some(value) = report.cumulative_value {
                        println!("Cumulative: {}", format_energy(value));
                    }
                    match report.delta {
                        Some(delta) => println!("Delta: {}", format_energy(delta)),
                        None => println!("Delta: -"),
                    }
                    if let Some(classification) = &report.classification {
                        println!("Classification: {}", color_classification(classification));
                    }
                }
                None => print_warning("No readings recorded for this device"),
            }
        }
    }

    Ok(())
}

/// Show per-device data quality statistics
pub async fn show_quality(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let summaries: Vec<QualitySummary> = client.get("api/statistics/quality").await?;

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&summaries)?;
            println!("{}", json);
        }
        OutputFormat::Table => {
            if summaries.is_empty() {
                print_warning("No devices found");
                return Ok(());
            }

            let rows: Vec<QualityRow> = summaries
                .iter()
                .map(|s| QualityRow {
                    device: s.device_code.clone(),
                    valid: s.valid_count,
                    uncertain: s.uncertain_count,
                    quarantine: s.quarantine_count,
                    total: s.total_count,
                    validity: color_validity(s.validity_percentage),
                })
                .collect();

            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);
        }
    }

    Ok(())
}
