//! Ignore List: per-symbol quarantine with exponential backoff.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use rbt_schemas::IgnoreEntry;
use sqlx::SqlitePool;

fn backoff_duration(level: u8) -> Duration {
    match level {
        1 => Duration::hours(1),
        2 => Duration::hours(4),
        3 => Duration::days(1),
        _ => Duration::days(7),
    }
}

pub async fn add(pool: &SqlitePool, ticker: &str, reason_code: &str, scope: &str, now: DateTime<Utc>) -> Result<IgnoreEntry> {
    let existing = rbt_db::ignore_list::find(pool, ticker).await?;

    let entry = match existing {
        Some(mut e) => {
            e.backoff_level = (e.backoff_level + 1).min(4);
            e.ttl_utc = now + backoff_duration(e.backoff_level);
            e.reason_code = reason_code.to_string();
            e.scope = scope.to_string();
            e.retry_count += 1;
            e
        }
        None => IgnoreEntry {
            ticker: ticker.to_string(),
            reason_code: reason_code.to_string(),
            scope: scope.to_string(),
            ttl_utc: now + backoff_duration(1),
            retry_count: 1,
            backoff_level: 1,
            first_seen: now,
            notes: None,
        },
    };

    rbt_db::ignore_list::upsert(pool, &entry).await?;
    Ok(entry)
}

pub async fn is_ignored(pool: &SqlitePool, ticker: &str, now: DateTime<Utc>) -> Result<bool> {
    let entry = rbt_db::ignore_list::find(pool, ticker).await?;
    Ok(entry.map(|e| e.ttl_utc > now).unwrap_or(false))
}

pub async fn reset(pool: &SqlitePool, ticker: &str) -> Result<()> {
    rbt_db::ignore_list::reset(pool, ticker).await
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn temp_pool() -> (SqlitePool, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trade.db");
        let pool = rbt_db::connect(path.to_str().unwrap()).await.unwrap();
        rbt_db::migrate(&pool).await.unwrap();
        (pool, dir)
    }

    #[tokio::test]
    async fn backoff_level_is_monotone_non_decreasing() {
        let (pool, _dir) = temp_pool().await;
        let now = Utc::now();

        let e1 = add(&pool, "ACME", "STAGE_A_NAN", "ALL", now).await.unwrap();
        assert_eq!(e1.backoff_level, 1);

        let e2 = add(&pool, "ACME", "STAGE_A_NAN", "ALL", now).await.unwrap();
        assert_eq!(e2.backoff_level, 2);

        let e3 = add(&pool, "ACME", "STAGE_A_NAN", "ALL", now).await.unwrap();
        assert_eq!(e3.backoff_level, 3);

        let e4 = add(&pool, "ACME", "STAGE_A_NAN", "ALL", now).await.unwrap();
        assert_eq!(e4.backoff_level, 4);

        let e5 = add(&pool, "ACME", "STAGE_A_NAN", "ALL", now).await.unwrap();
        assert_eq!(e5.backoff_level, 4, "capped at level 4");
    }

    #[tokio::test]
    async fn reset_clears_entry() {
        let (pool, _dir) = temp_pool().await;
        let now = Utc::now();
        add(&pool, "ACME", "X", "ALL", now).await.unwrap();
        assert!(is_ignored(&pool, "ACME", now).await.unwrap());

        reset(&pool, "ACME").await.unwrap();
        assert!(!is_ignored(&pool, "ACME", now).await.unwrap());
    }
}
