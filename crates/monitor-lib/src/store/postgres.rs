//! Postgres-backed reading store
//!
//! All queries go through hand-written SQL with bound parameters; enum
//! columns are stored as text and parsed back through the model `FromStr`
//! impls. The raw and clean series are written in one transaction so they
//! can never diverge.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::str::FromStr;

use super::{AlertFilter, ReadingStore};
use crate::error::{MonitorError, Result};
use crate::models::{
    Alert, AlertSeverity, AlertType, Classification, Device, DeviceStatus, HourlyBaseline,
    NewAlert, NewReading, QualitySummary, Reading,
};

/// Reading store backed by a Postgres connection pool
#[derive(Clone)]
pub struct PgReadingStore {
    pool: PgPool,
}

impl PgReadingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReadingStore for PgReadingStore {
    async fn device(&self, device_id: i64) -> Result<Option<Device>> {
        let row = sqlx::query(
            r#"
            SELECT id, device_code, device_name, nominal_power, status
            FROM devices
            WHERE id = $1
            "#,
        )
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| device_from_row(&r)).transpose()
    }

    async fn devices(&self, status: Option<DeviceStatus>) -> Result<Vec<Device>> {
        let rows = match status {
            Some(status) => {
                sqlx::query(
                    r#"
                    SELECT id, device_code, device_name, nominal_power, status
                    FROM devices
                    WHERE status = $1
                    ORDER BY device_code
                    "#,
                )
                .bind(status.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT id, device_code, device_name, nominal_power, status
                    FROM devices
                    ORDER BY device_code
                    "#,
                )
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter().map(device_from_row).collect()
    }

    async fn insert_reading(&self, reading: &NewReading) -> Result<Reading> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            INSERT INTO readings
                (device_id, timestamp, cumulative_value, delta, classification, reason)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, device_id, timestamp, cumulative_value, delta,
                      classification, reason, created_at
            "#,
        )
        .bind(reading.device_id)
        .bind(reading.timestamp)
        .bind(reading.cumulative_value)
        .bind(reading.delta)
        .bind(reading.classification.as_str())
        .bind(&reading.reason)
        .fetch_one(&mut *tx)
        .await?;

        if reading.classification == Classification::Valid {
            sqlx::query(
                r#"
                INSERT INTO valid_readings (device_id, timestamp, cumulative_value, delta)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(reading.device_id)
            .bind(reading.timestamp)
            .bind(reading.cumulative_value)
            .bind(reading.delta)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        reading_from_row(&row)
    }

    async fn latest_reading(&self, device_id: i64) -> Result<Option<Reading>> {
        let row = sqlx::query(
            r#"
            SELECT id, device_id, timestamp, cumulative_value, delta,
                   classification, reason, created_at
            FROM readings
            WHERE device_id = $1
            ORDER BY timestamp DESC
            LIMIT 1
            "#,
        )
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| reading_from_row(&r)).transpose()
    }

    async fn readings_since(
        &self,
        device_id: i64,
        since: DateTime<Utc>,
        classification: Option<Classification>,
        limit: i64,
    ) -> Result<Vec<Reading>> {
        let mut builder = sqlx::QueryBuilder::new(
            "SELECT id, device_id, timestamp, cumulative_value, delta, \
             classification, reason, created_at FROM readings WHERE device_id = ",
        );
        builder.push_bind(device_id);
        builder.push(" AND timestamp >= ");
        builder.push_bind(since);
        if let Some(classification) = classification {
            builder.push(" AND classification = ");
            builder.push_bind(classification.as_str());
        }
        builder.push(" ORDER BY timestamp DESC LIMIT ");
        builder.push_bind(limit);

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(reading_from_row).collect()
    }

    async fn collect_baselines(
        &self,
        window_start: DateTime<Utc>,
        min_samples: i64,
    ) -> Result<Vec<HourlyBaseline>> {
        let rows = sqlx::query(
            r#"
            SELECT device_id,
                   CAST(EXTRACT(HOUR FROM timestamp) AS INT) AS hour_of_day,
                   AVG(delta)                    AS mean_delta,
                   COALESCE(STDDEV_POP(delta), 0) AS stddev_delta,
                   MIN(delta)                    AS min_delta,
                   MAX(delta)                    AS max_delta,
                   COUNT(*)                      AS sample_count
            FROM valid_readings
            WHERE timestamp >= $1
              AND delta IS NOT NULL
              AND delta > 0
            GROUP BY device_id, EXTRACT(HOUR FROM timestamp)
            HAVING COUNT(*) >= $2
            "#,
        )
        .bind(window_start)
        .bind(min_samples)
        .fetch_all(&self.pool)
        .await?;

        let last_updated = Utc::now();
        rows.iter()
            .map(|row| {
                Ok(HourlyBaseline {
                    device_id: row.try_get("device_id")?,
                    hour_of_day: row.try_get::<i32, _>("hour_of_day")? as u8,
                    mean_delta: row.try_get("mean_delta")?,
                    stddev_delta: row.try_get("stddev_delta")?,
                    min_delta: row.try_get("min_delta")?,
                    max_delta: row.try_get("max_delta")?,
                    sample_count: row.try_get("sample_count")?,
                    last_updated,
                })
            })
            .collect()
    }

    async fn insert_alert(&self, alert: &NewAlert) -> Result<Alert> {
        let row = sqlx::query(
            r#"
            INSERT INTO alerts (device_id, alert_type, severity, message, details)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, created_at
            "#,
        )
        .bind(alert.device_id)
        .bind(alert.alert_type.as_str())
        .bind(alert.severity.as_str())
        .bind(&alert.message)
        .bind(&alert.details)
        .fetch_one(&self.pool)
        .await?;

        Ok(Alert {
            id: row.try_get("id")?,
            device_id: alert.device_id,
            device_code: alert.device_code.clone(),
            alert_type: alert.alert_type,
            severity: alert.severity,
            message: alert.message.clone(),
            details: alert.details.clone(),
            resolved: false,
            created_at: row.try_get("created_at")?,
            resolved_at: None,
        })
    }

    async fn alerts(&self, filter: &AlertFilter) -> Result<Vec<Alert>> {
        let mut builder = sqlx::QueryBuilder::new(
            "SELECT a.id, a.device_id, d.device_code, a.alert_type, a.severity, \
             a.message, a.details, a.resolved, a.created_at, a.resolved_at \
             FROM alerts a JOIN devices d ON d.id = a.device_id \
             WHERE a.created_at >= ",
        );
        builder.push_bind(filter.since);
        if let Some(device_id) = filter.device_id {
            builder.push(" AND a.device_id = ");
            builder.push_bind(device_id);
        }
        if let Some(resolved) = filter.resolved {
            builder.push(" AND a.resolved = ");
            builder.push_bind(resolved);
        }
        builder.push(" ORDER BY a.created_at DESC, a.id DESC");

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(alert_from_row).collect()
    }

    async fn resolve_alert(&self, alert_id: i64) -> Result<Alert> {
        let row = sqlx::query(
            r#"
            WITH updated AS (
                UPDATE alerts
                SET resolved = TRUE,
                    resolved_at = COALESCE(resolved_at, now())
                WHERE id = $1
                RETURNING *
            )
            SELECT u.id, u.device_id, d.device_code, u.alert_type, u.severity,
                   u.message, u.details, u.resolved, u.created_at, u.resolved_at
            FROM updated u
            JOIN devices d ON d.id = u.device_id
            "#,
        )
        .bind(alert_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => alert_from_row(&row),
            None => Err(MonitorError::UnknownAlert(alert_id)),
        }
    }

    async fn quality_summary(&self) -> Result<Vec<QualitySummary>> {
        let rows = sqlx::query(
            r#"
            SELECT d.device_code,
                   COUNT(r.id) FILTER (WHERE r.classification = 'valid')      AS valid_count,
                   COUNT(r.id) FILTER (WHERE r.classification = 'uncertain')  AS uncertain_count,
                   COUNT(r.id) FILTER (WHERE r.classification = 'quarantine') AS quarantine_count,
                   COUNT(r.id)                                                AS total_count
            FROM devices d
            LEFT JOIN readings r ON r.device_id = d.id
            GROUP BY d.device_code
            ORDER BY d.device_code
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let valid_count: i64 = row.try_get("valid_count")?;
                let total_count: i64 = row.try_get("total_count")?;
                let validity_percentage = if total_count > 0 {
                    valid_count as f64 / total_count as f64 * 100.0
                } else {
                    0.0
                };
                Ok(QualitySummary {
                    device_code: row.try_get("device_code")?,
                    valid_count,
                    uncertain_count: row.try_get("uncertain_count")?,
                    quarantine_count: row.try_get("quarantine_count")?,
                    total_count,
                    validity_percentage,
                })
            })
            .collect()
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

fn device_from_row(row: &PgRow) -> Result<Device> {
    let status: String = row.try_get("status")?;
    Ok(Device {
        id: row.try_get("id")?,
        device_code: row.try_get("device_code")?,
        device_name: row.try_get("device_name")?,
        nominal_power: row.try_get("nominal_power")?,
        status: DeviceStatus::from_str(&status).map_err(MonitorError::Internal)?,
    })
}

fn reading_from_row(row: &PgRow) -> Result<Reading> {
    let classification: String = row.try_get("classification")?;
    Ok(Reading {
        id: row.try_get("id")?,
        device_id: row.try_get("device_id")?,
        timestamp: row.try_get("timestamp")?,
        cumulative_value: row.try_get("cumulative_value")?,
        delta: row.try_get("delta")?,
        classification: Classification::from_str(&classification).map_err(MonitorError::Internal)?,
        reason: row.try_get("reason")?,
        created_at: row.try_get("created_at")?,
    })
}

fn alert_from_row(row: &PgRow) -> Result<Alert> {
    let alert_type: String = row.try_get("alert_type")?;
    let severity: String = row.try_get("severity")?;
    Ok(Alert {
        id: row.try_get("id")?,
        device_id: row.try_get("device_id")?,
        device_code: row.try_get("device_code")?,
        alert_type: AlertType::from_str(&alert_type).map_err(MonitorError::Internal)?,
        severity: AlertSeverity::from_str(&severity).map_err(MonitorError::Internal)?,
        message: row.try_get("message")?,
        details: row.try_get("details")?,
        resolved: row.try_get("resolved")?,
        created_at: row.try_get("created_at")?,
        resolved_at: row.try_get("resolved_at")?,
    })
}
