//! `health_state` table access — append-only.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rbt_schemas::{HealthState, HealthStatus};
use sqlx::{Row, SqlitePool};

pub async fn append(pool: &SqlitePool, state: &HealthState) -> Result<()> {
    sqlx::query("INSERT INTO health_state (timestamp, state, reason) VALUES (?, ?, ?)")
        .bind(state.timestamp.to_rfc3339())
        .bind(state.state.as_str())
        .bind(&state.reason)
        .execute(pool)
        .await
        .context("append health state failed")?;
    Ok(())
}

pub async fn latest(pool: &SqlitePool) -> Result<Option<HealthState>> {
    let row = sqlx::query("SELECT * FROM health_state ORDER BY id DESC LIMIT 1")
        .fetch_optional(pool)
        .await
        .context("latest health state failed")?;

    row.map(|r| {
        let state: String = r.try_get("state")?;
        let timestamp: String = r.try_get("timestamp")?;
        Ok::<_, anyhow::Error>(HealthState {
            timestamp: DateTime::parse_from_rfc3339(&timestamp)?.with_timezone(&Utc),
            state: match state.as_str() {
                "GREEN" => HealthStatus::Green,
                "YELLOW" => HealthStatus::Yellow,
                _ => HealthStatus::Red,
            },
            reason: r.try_get("reason")?,
        })
    })
    .transpose()
}
