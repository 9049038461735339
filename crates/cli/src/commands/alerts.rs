//! Alert-related CLI commands

use anyhow::Result;
use tabled::Tabled;

use crate::client::{Alert, ApiClient};
use crate::output::{color_severity, format_timestamp, print_success, print_warning, OutputFormat};

/// Row for alerts table
#[derive(Tabled)]
struct AlertRow {
    #[tabled(rename = "ID")]
    id: i64,
    #[tabled(rename = "Device")]
    device: String,
    #[tabled(rename = "Type")]
    alert_type: String,
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Message")]
    message: String,
    #[tabled(rename = "Created")]
    created: String,
    #[tabled(rename = "Resolved")]
    resolved: String,
}

/// List alerts with optional filters
pub async fn list_alerts(
    client: &ApiClient,
    device_id: Option<i64>,
    resolved: Option<bool>,
    hours: i64,
    format: OutputFormat,
) -> Result<()> {
    let mut path = format!("api/alerts?hours={}", hours);
    if let Some(id) = device_id {
        path.push_str(&format!("&device_id={}", id));
    }
    if let Some(resolved) = resolved {
        path.push_str(&format!("&resolved={}", resolved));
    }

    let alerts: Vec<Alert> = client.get(&path).await?;

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&alerts)?;
            println!("{}", json);
        }
        OutputFormat::Table => {
            if alerts.is_empty() {
                print_warning("No alerts found");
                return Ok(());
            }

            let rows: Vec<AlertRow> = alerts
                .iter()
                .map(|a| AlertRow {
                    id: a.id,
                    device: a.device_code.clone(),
                    alert_type: a.alert_type.clone(),
                    severity: color_severity(&a.severity),
                    message: a.message.clone(),
                    created: format_timestamp(&a.created_at),
                    resolved: if a.resolved {
                        "✓".to_string()
                    } else {
                        "".to_string()
                    },
                })
                .collect();

            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);
            println!("\nTotal: {} alerts", alerts.len());
        }
    }

    Ok(())
}

/// Mark an alert as resolved
pub async fn resolve_alert(client: &ApiClient, id: i64, format: OutputFormat) -> Result<()> {
    let alert: Alert = client.put(&format!("api/alerts/{}/resolve", id)).await?;

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&alert)?;
            println!("{}", json);
        }
        OutputFormat::Table => {
            print_success(&format!("Alert {} resolved", alert.id));
            println!("Device: {}", alert.device_code);
            println!("Type: {}", alert.alert_type);
            println!("Message: {}", alert.message);
            if let Some(ts) = &alert.resolved_at {
                println!("Resolved at: {}", format_timestamp(ts));
            }
        }
    }

    Ok(())
}
