//! Database schema management
//!
//! Ensures required tables and indexes exist before the pipeline starts.
//! Applied once on startup; every statement is idempotent so repeated runs
//! are safe.

use sqlx::PgPool;

use crate::error::Result;

/// Create or update the database schema (idempotent).
///
/// All statements run inside one transaction so a partially applied schema
/// never survives a failed startup.
pub async fn create_schema(pool: &PgPool) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS devices (
            id            BIGSERIAL PRIMARY KEY,
            device_code   TEXT NOT NULL UNIQUE,
            device_name   TEXT NOT NULL,
            nominal_power DOUBLE PRECISION NOT NULL DEFAULT 0,
            status        TEXT NOT NULL DEFAULT 'active'
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Raw series: every accepted reading with its classification verdict.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS readings (
            id               BIGSERIAL PRIMARY KEY,
            device_id        BIGINT NOT NULL REFERENCES devices (id),
            timestamp        TIMESTAMPTZ NOT NULL,
            cumulative_value DOUBLE PRECISION NOT NULL,
            delta            DOUBLE PRECISION,
            classification   TEXT NOT NULL,
            reason           TEXT NOT NULL,
            created_at       TIMESTAMPTZ NOT NULL DEFAULT now(),
            UNIQUE (device_id, timestamp)
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Clean series: shadow copy of valid readings only, feeds the
    // baseline aggregation without rescanning raw rows.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS valid_readings (
            id               BIGSERIAL PRIMARY KEY,
            device_id        BIGINT NOT NULL REFERENCES devices (id),
            timestamp        TIMESTAMPTZ NOT NULL,
            cumulative_value DOUBLE PRECISION NOT NULL,
            delta            DOUBLE PRECISION,
            created_at       TIMESTAMPTZ NOT NULL DEFAULT now(),
            UNIQUE (device_id, timestamp)
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS alerts (
            id          BIGSERIAL PRIMARY KEY,
            device_id   BIGINT NOT NULL REFERENCES devices (id),
            alert_type  TEXT NOT NULL,
            severity    TEXT NOT NULL,
            message     TEXT NOT NULL,
            details     JSONB NOT NULL DEFAULT '{}'::jsonb,
            resolved    BOOLEAN NOT NULL DEFAULT FALSE,
            created_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
            resolved_at TIMESTAMPTZ
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_readings_device_timestamp
            ON readings (device_id, timestamp DESC);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_valid_readings_device_timestamp
            ON valid_readings (device_id, timestamp);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_alerts_device_created
            ON alerts (device_id, created_at DESC);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
