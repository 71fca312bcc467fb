use keelson_checkpoint_sql::migrations::{run_migrations, run_migrations_in_transaction};
use keelson_checkpoint_sql::ops::{
    delete_thread, list_checkpoints, list_owned_threads, load_latest_checkpoint, save_checkpoint,
    save_checkpoint_in_transaction,
};
use sqlx::Row;

#[test]
#[allow(clippy::let_underscore_future)]
fn ops_api_accepts_postgres_and_sqlite_pools() {
    fn assert_backend_agnostic<DB>(pool: &sqlx::Pool<DB>)
    where
        DB: sqlx::Database,
        for<'q> &'q str: sqlx::Encode<'q, DB> + sqlx::Type<DB>,
        for<'q> i64: sqlx::Encode<'q, DB> + sqlx::Type<DB>,
        for<'q> String: sqlx::Encode<'q, DB> + sqlx::Type<DB>,
        for<'q> Option<String>: sqlx::Encode<'q, DB> + sqlx::Type<DB>,
        for<'q> DB::Arguments<'q>: sqlx::IntoArguments<'q, DB>,
        for<'c> &'c sqlx::Pool<DB>: sqlx::Executor<'c, Database = DB>,
        for<'c> &'c mut DB::Connection: sqlx::Executor<'c, Database = DB>,
        for<'r> String: sqlx::Decode<'r, DB> + sqlx::Type<DB>,
        for<'r> i64: sqlx::Decode<'r, DB> + sqlx::Type<DB>,
        for<'r> Option<String>: sqlx::Decode<'r, DB> + sqlx::Type<DB>,
        for<'r> Option<i64>: sqlx::Decode<'r, DB> + sqlx::Type<DB>,
        &'static str: sqlx::ColumnIndex<DB::Row>,
        usize: sqlx::ColumnIndex<DB::Row>,
    {
        let _ = run_migrations(pool);
        let _ = save_checkpoint(
            pool,
            "thread-a",
            None,
            "plan",
            1,
            "2026-02-06T00:00:00Z",
            &serde_json::json!({"iteration_count": 1}),
        );
        let _ = load_latest_checkpoint(pool, "thread-a");
        let _ = list_checkpoints(pool, "thread-a");
        let _ = list_owned_threads(pool, "user-1");
        let _ = delete_thread(pool, "thread-a");
    }

    let _ = assert_backend_agnostic::<sqlx::Postgres> as fn(&sqlx::Pool<sqlx::Postgres>);
    let _ = assert_backend_agnostic::<sqlx::Sqlite> as fn(&sqlx::Pool<sqlx::Sqlite>);
}

async fn sqlite_pool() -> sqlx::SqlitePool {
    sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("sqlite in-memory pool should connect")
}

const TABLE_COUNT_SQL: &str =
    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'checkpoints'";

#[tokio::test]
async fn ops_sqlite_migration_bootstrap_creates_table() {
    let pool = sqlite_pool().await;

    run_migrations(&pool)
        .await
        .expect("migrations should bootstrap schema");
    run_migrations(&pool)
        .await
        .expect("migrations should be idempotent");

    let table_count: i64 = sqlx::query_scalar(TABLE_COUNT_SQL)
        .fetch_one(&pool)
        .await
        .expect("table count query should run");

    assert_eq!(table_count, 1);
}

#[tokio::test]
async fn ops_sqlite_migrations_roll_back_with_transaction() {
    let pool = sqlite_pool().await;

    let mut tx = pool.begin().await.expect("transaction should begin");
    run_migrations_in_transaction(&mut tx)
        .await
        .expect("migrations should run inside transaction");

    let in_tx: i64 = sqlx::query_scalar(TABLE_COUNT_SQL)
        .fetch_one(tx.as_mut())
        .await
        .expect("table count query should run in transaction");
    assert_eq!(in_tx, 1);

    tx.rollback().await.expect("rollback should succeed");

    let after_rollback: i64 = sqlx::query_scalar(TABLE_COUNT_SQL)
        .fetch_one(&pool)
        .await
        .expect("table count query should run after rollback");
    assert_eq!(after_rollback, 0);
}

#[tokio::test]
async fn ops_sqlite_save_assigns_seq_per_thread() {
    let pool = sqlite_pool().await;
    run_migrations(&pool).await.expect("migrations should run");

    let first = save_checkpoint(
        &pool,
        "thread-a",
        None,
        "input",
        1,
        "2026-02-06T00:00:00Z",
        &serde_json::json!({"iteration_count": 0}),
    )
    .await
    .expect("first checkpoint should save");
    let second = save_checkpoint(
        &pool,
        "thread-a",
        None,
        "plan",
        2,
        "2026-02-06T00:00:01Z",
        &serde_json::json!({"iteration_count": 1}),
    )
    .await
    .expect("second checkpoint should save");
    let other_thread = save_checkpoint(
        &pool,
        "thread-b",
        None,
        "input",
        1,
        "2026-02-06T00:00:02Z",
        &serde_json::json!({"iteration_count": 0}),
    )
    .await
    .expect("checkpoint for another thread should save");

    assert_eq!(first, 1);
    assert_eq!(second, 2);
    assert_eq!(other_thread, 1);

    let seqs: Vec<i64> = sqlx::query("SELECT seq FROM checkpoints WHERE thread_id = ? ORDER BY seq")
        .bind("thread-a")
        .fetch_all(&pool)
        .await
        .expect("seq query should run")
        .iter()
        .map(|row| row.get::<i64, _>("seq"))
        .collect();
    assert_eq!(seqs, vec![1, 2]);
}

#[tokio::test]
async fn ops_sqlite_load_latest_returns_newest_row() {
    let pool = sqlite_pool().await;
    run_migrations(&pool).await.expect("migrations should run");

    assert!(load_latest_checkpoint(&pool, "thread-a")
        .await
        .expect("load should run")
        .is_none());

    for (step, node) in [(1, "input"), (2, "plan"), (3, "query")] {
        save_checkpoint(
            &pool,
            "thread-a",
            None,
            node,
            step,
            "2026-02-06T00:00:00Z",
            &serde_json::json!({"step": step, "node": node}),
        )
        .await
        .expect("checkpoint should save");
    }

    let latest = load_latest_checkpoint(&pool, "thread-a")
        .await
        .expect("load should run")
        .expect("checkpoint should exist");

    assert_eq!(latest.thread_id, "thread-a");
    assert_eq!(latest.seq, 3);
    assert_eq!(latest.node.as_deref(), Some("query"));
    assert_eq!(latest.step, Some(3));
    assert_eq!(latest.state_json, serde_json::json!({"step": 3, "node": "query"}));
}

#[tokio::test]
async fn ops_sqlite_list_checkpoints_is_oldest_first() {
    let pool = sqlite_pool().await;
    run_migrations(&pool).await.expect("migrations should run");

    for (step, node) in [(1, "input"), (2, "plan")] {
        save_checkpoint(
            &pool,
            "thread-a",
            None,
            node,
            step,
            "2026-02-06T00:00:00Z",
            &serde_json::json!({}),
        )
        .await
        .expect("checkpoint should save");
    }

    let rows = list_checkpoints(&pool, "thread-a")
        .await
        .expect("list should run");
    let nodes: Vec<_> = rows.iter().map(|row| row.node.as_deref()).collect();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].seq, 1);
    assert_eq!(nodes, vec![Some("input"), Some("plan")]);
    assert!(list_checkpoints(&pool, "missing")
        .await
        .expect("list should run")
        .is_empty());
}

#[tokio::test]
async fn ops_sqlite_rolled_back_save_leaves_no_row() {
    let pool = sqlite_pool().await;
    run_migrations(&pool).await.expect("migrations should run");

    let mut tx = pool.begin().await.expect("transaction should begin");
    let seq = save_checkpoint_in_transaction(
        &mut tx,
        "thread-a",
        None,
        "plan",
        1,
        "2026-02-06T00:00:00Z",
        &serde_json::json!({"iteration_count": 1}),
    )
    .await
    .expect("save should run in transaction");
    assert_eq!(seq, 1);
    tx.rollback().await.expect("rollback should succeed");

    assert!(load_latest_checkpoint(&pool, "thread-a")
        .await
        .expect("load should run")
        .is_none());
}

#[tokio::test]
async fn ops_sqlite_lists_latest_row_per_owned_thread() {
    let pool = sqlite_pool().await;
    run_migrations(&pool).await.expect("migrations should succeed");

    let saves = [
        ("thread-a", Some("alice"), "input", "2026-02-06T00:00:00Z"),
        ("thread-a", Some("alice"), "plan", "2026-02-06T00:00:03Z"),
        ("thread-b", Some("bob"), "input", "2026-02-06T00:00:01Z"),
        ("thread-c", Some("alice"), "input", "2026-02-06T00:00:02Z"),
        ("thread-d", None, "input", "2026-02-06T00:00:04Z"),
    ];
    for (step, (thread_id, owner, node, created_at)) in saves.into_iter().enumerate() {
        save_checkpoint(
            &pool,
            thread_id,
            owner,
            node,
            step as i64,
            created_at,
            &serde_json::json!({"node": node}),
        )
        .await
        .expect("save should succeed");
    }

    let alice = list_owned_threads(&pool, "alice")
        .await
        .expect("listing should succeed");
    let listed: Vec<_> = alice
        .iter()
        .map(|row| (row.thread_id.as_str(), row.seq, row.node.as_deref()))
        .collect();
    assert_eq!(
        listed,
        vec![("thread-a", 2, Some("plan")), ("thread-c", 1, Some("input"))]
    );
    assert_eq!(alice[0].state_json["node"], "plan");

    assert!(list_owned_threads(&pool, "nobody").await.unwrap().is_empty());
}

#[tokio::test]
async fn ops_sqlite_delete_thread_removes_all_rows() {
    let pool = sqlite_pool().await;
    run_migrations(&pool).await.expect("migrations should succeed");

    for step in 1..=3 {
        save_checkpoint(
            &pool,
            "thread-a",
            Some("alice"),
            "plan",
            step,
            "2026-02-06T00:00:00Z",
            &serde_json::json!({}),
        )
        .await
        .expect("save should succeed");
    }
    save_checkpoint(
        &pool,
        "thread-b",
        Some("alice"),
        "plan",
        1,
        "2026-02-06T00:00:00Z",
        &serde_json::json!({}),
    )
    .await
    .expect("save should succeed");

    assert_eq!(delete_thread(&pool, "thread-a").await.unwrap(), 3);
    assert_eq!(delete_thread(&pool, "thread-a").await.unwrap(), 0);
    assert!(load_latest_checkpoint(&pool, "thread-a").await.unwrap().is_none());
    assert!(load_latest_checkpoint(&pool, "thread-b").await.unwrap().is_some());
}
