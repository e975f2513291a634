use sqlx::SqlitePool;

async fn temp_pool() -> (SqlitePool, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trade.db");
    let pool = rbt_db::connect(path.to_str().unwrap()).await.unwrap();
    (pool, dir)
}

#[tokio::test]
async fn migrate_twice_is_a_no_op() {
    let (pool, _dir) = temp_pool().await;
    rbt_db::migrate(&pool).await.unwrap();
    rbt_db::migrate(&pool).await.unwrap();

    let status = rbt_db::status(&pool).await.unwrap();
    assert!(status.connected);
    assert_eq!(status.signal_count, 0);
}
