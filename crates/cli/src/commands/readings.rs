//! Reading-related CLI commands

use anyhow::Result;
use tabled::Tabled;

use crate::client::{ApiClient, IngestRequest, IngestResponse, ReadingRecord};
use crate::output::{
    color_classification, format_energy, format_timestamp, print_success, print_warning,
    OutputFormat,
};

/// Row for readings table
#[derive(Tabled)]
struct ReadingRow {
    #[tabled(rename = "Timestamp")]
    timestamp: String,
    #[tabled(rename = "Cumulative (kWh)")]
    cumulative: String,
    #[tabled(rename = "Delta (kWh)")]
    delta: String,
    #[tabled(rename = "Classification")]
    classification: String,
    #[tabled(rename = "Reason")]
    reason: String,
}

/// List recent readings for a device
pub async fn list_readings(
    client: &ApiClient,
    device_id: i64,
    hours: i64,
    classification: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let mut path = format!("api/devices/{}/records?hours={}", device_id, hours);
    if let Some(classification) = &classification {
        path.push_str(&format!("&classification={}", classification));
    }

    let readings: Vec<ReadingRecord> = client.get(&path).await?;

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&readings)?;
            println!("{}", json);
        }
        OutputFormat::Table => {
            if readings.is_empty() {
                print_warning("No readings found");
                return Ok(());
            }

            let rows: Vec<ReadingRow> = readings
                .iter()
                .map(|r| ReadingRow {
                    timestamp: format_timestamp(&r.timestamp),
                    cumulative: format!("{:.2}", r.cumulative_value),
                    delta: match r.delta {
                        Some(delta) => format!("{:.2}", delta),
                        None => "-".to_string(),
                    },
                    classification: color_classification(&r.classification),
                    reason: r.reason.clone(),
                })
                .collect();

            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);
            println!("\nTotal: {} readings", readings.len());
        }
    }

    Ok(())
}

/// Submit a reading for a device
pub async fn ingest_reading(
    client: &ApiClient,
    device_id: i64,
    value: Option<f64>,
    delta: Option<f64>,
    timestamp: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let request = IngestRequest {
        timestamp,
        cumulative_value: value,
        delta_value: delta,
    };

    let response: IngestResponse = client
        .post(&format!("api/devices/{}/ingest", device_id), &request)
        .await?;

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&response)?;
            println!("{}", json);
        }
        OutputFormat::Table => {
            print_success(&format!(
                "Reading accepted as {}",
                color_classification(&response.record.classification)
            ));
            println!(
                "Timestamp: {}",
                format_timestamp(&response.record.timestamp)
            );
            println!(
                "Cumulative: {}",
                format_energy(response.record.cumulative_value)
            );
            match response.record.delta {
                Some(delta) => println!("Delta: {}", format_energy(delta)),
                None => println!("Delta: -"),
            }
            println!("Reason: {}", response.record.reason);

            if response.alerts_triggered > 0 {
                print_warning(&format!(
                    "{} alert(s) triggered",
                    response.alerts_triggered
                ));
            }
        }
    }

    Ok(())
}
