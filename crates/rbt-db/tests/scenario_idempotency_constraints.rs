use chrono::Utc;
use rbt_schemas::{Signal, SignalStatus};
use sqlx::SqlitePool;

async fn temp_pool() -> (SqlitePool, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trade.db");
    let pool = rbt_db::connect(path.to_str().unwrap()).await.unwrap();
    rbt_db::migrate(&pool).await.unwrap();
    (pool, dir)
}

fn sample_signal() -> Signal {
    Signal {
        signal_id: "ACME_RSI_2024010810".to_string(),
        ticker: "ACME".to_string(),
        strategy: "RSI".to_string(),
        trigger_time: Utc::now(),
        trigger_price: 10.0,
        rebound_bottom: 10.0,
        go_in_price: 10.2,
        profit_target: 10.5,
        stop_loss: 9.8,
        confidence: 75.0,
        status: SignalStatus::Kiv,
        cooldown_until: None,
    }
}

#[tokio::test]
async fn duplicate_signal_id_insert_is_a_no_op() {
    let (pool, _dir) = temp_pool().await;
    let signal = sample_signal();

    assert!(rbt_db::signals::insert_kiv(&pool, &signal).await.unwrap());
    assert!(!rbt_db::signals::insert_kiv(&pool, &signal).await.unwrap());

    let active = rbt_db::signals::find_active(&pool, "ACME", "RSI").await.unwrap();
    assert!(active.is_some());
}

#[tokio::test]
async fn only_one_active_position_per_ticker() {
    let (pool, _dir) = temp_pool().await;
    let position = rbt_schemas::Position {
        ticket_id: "TKT-aaaaaaaa".to_string(),
        ticker: "ACME".to_string(),
        strategy: "RSI".to_string(),
        entry_time: Utc::now(),
        entry_price: 10.21,
        quantity: 19,
        current_price: 10.21,
        stop_loss: 9.80,
        status: rbt_schemas::PositionStatus::Open,
        exit_signal: None,
        exit_time: None,
        exit_price: None,
    };
    rbt_db::positions::insert(&pool, &position).await.unwrap();

    let mut second = position.clone();
    second.ticket_id = "TKT-bbbbbbbb".to_string();
    let err = rbt_db::positions::insert(&pool, &second).await;
    assert!(err.is_err());
}
