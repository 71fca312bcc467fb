use std::time::{SystemTime, UNIX_EPOCH};

use keelson_checkpoint_postgres::PostgresCheckpointer;
use keelson_core::{Checkpoint, Checkpointer, HistoryCheckpointer, StateSchema};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
struct DemoState {
    count: i32,
}

impl StateSchema for DemoState {}

fn postgres_database_url() -> String {
    std::env::var("DATABASE_URL")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .expect("set DATABASE_URL to run postgres integration tests")
}

fn unique_thread_id(prefix: &str) -> String {
    let nonce = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time should move forward")
        .as_nanos();
    format!("{prefix}-{nonce}")
}

#[test]
fn checkpointer_builder_accepts_pool_configuration() {
    let _builder = PostgresCheckpointer::builder("postgres://localhost/keelson")
        .max_connections(5)
        .min_connections(1);
}

#[tokio::test]
async fn checkpointer_build_fails_fast_on_unreachable_database() {
    let result = PostgresCheckpointer::builder("postgres://keelson@127.0.0.1:1/keelson")
        .max_connections(1)
        .build()
        .await;

    assert!(result.is_err());
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn checkpointer_trait_round_trip_save_and_load() {
    let checkpointer = PostgresCheckpointer::builder(postgres_database_url())
        .max_connections(5)
        .min_connections(1)
        .build()
        .await
        .expect("postgres checkpointer should build");
    let thread_id = unique_thread_id("round-trip");

    checkpointer
        .save(&Checkpoint::new(&thread_id, DemoState { count: 7 }, 3, "query"))
        .await
        .expect("checkpoint should save");

    let loaded: Checkpoint<DemoState> = checkpointer
        .load(&thread_id)
        .await
        .expect("checkpoint should load")
        .expect("checkpoint should exist");

    assert_eq!(loaded.thread_id, thread_id);
    assert_eq!(loaded.step, 3);
    assert_eq!(loaded.node, "query");
    assert_eq!(loaded.state.count, 7);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn checkpointer_history_is_ordered_per_thread() {
    let checkpointer = PostgresCheckpointer::builder(postgres_database_url())
        .build()
        .await
        .expect("postgres checkpointer should build");
    let thread_id = unique_thread_id("history");
    let other = unique_thread_id("history-other");

    for (step, node) in [(1, "input"), (2, "plan")] {
        checkpointer
            .save(&Checkpoint::new(&thread_id, DemoState { count: step as i32 }, step, node))
            .await
            .expect("save");
    }
    checkpointer
        .save(&Checkpoint::new(&other, DemoState { count: 99 }, 1, "input"))
        .await
        .expect("save");

    let history = HistoryCheckpointer::<DemoState>::list_checkpoints(&checkpointer, &thread_id)
        .await
        .expect("history should load");
    let seqs: Vec<_> = history.iter().map(|meta| meta.seq).collect();

    assert_eq!(seqs, vec![1, 2]);
    assert_eq!(history[1].node, "plan");
}
