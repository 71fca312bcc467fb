use serde_json::Value;
use sqlx::{ColumnIndex, Database, Decode, Encode, Executor, IntoArguments, Pool, Row, Transaction, Type};

use crate::error::CheckpointSqlError;
use crate::schema::{
    COUNT_THREAD_SQL, DELETE_THREAD_SQL, INSERT_CHECKPOINT_SQL, LIST_CHECKPOINTS_SQL,
    LIST_OWNED_LATEST_SQL, LOAD_LATEST_SQL, NEXT_SEQ_SQL,
};

/// A full checkpoint row with its state decoded from JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredCheckpoint {
    pub thread_id: String,
    pub seq: i64,
    pub created_at: String,
    pub node: Option<String>,
    pub step: Option<i64>,
    pub state_json: Value,
}

/// Metadata of one row, without the state payload.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointRow {
    pub seq: i64,
    pub created_at: String,
    pub node: Option<String>,
    pub step: Option<i64>,
}

/// Inserts a checkpoint under the next per-thread `seq` and returns it.
pub async fn save_checkpoint<DB>(
    pool: &Pool<DB>,
    thread_id: &str,
    owner: Option<&str>,
    node: &str,
    step: i64,
    created_at: &str,
    state_json: &Value,
) -> Result<i64, CheckpointSqlError>
where
    DB: Database,
    for<'q> &'q str: Encode<'q, DB> + Type<DB>,
    for<'q> i64: Encode<'q, DB> + Type<DB>,
    for<'q> String: Encode<'q, DB> + Type<DB>,
    for<'q> Option<String>: Encode<'q, DB> + Type<DB>,
    for<'q> DB::Arguments<'q>: IntoArguments<'q, DB>,
    for<'c> &'c mut DB::Connection: Executor<'c, Database = DB>,
    for<'r> i64: Decode<'r, DB>,
    usize: ColumnIndex<DB::Row>,
{
    let mut tx = pool.begin().await?;
    let seq =
        save_checkpoint_in_transaction(&mut tx, thread_id, owner, node, step, created_at, state_json)
            .await?;
    tx.commit().await?;
    Ok(seq)
}

pub async fn save_checkpoint_in_transaction<DB>(
    tx: &mut Transaction<'_, DB>,
    thread_id: &str,
    owner: Option<&str>,
    node: &str,
    step: i64,
    created_at: &str,
    state_json: &Value,
) -> Result<i64, CheckpointSqlError>
where
    DB: Database,
    for<'q> &'q str: Encode<'q, DB> + Type<DB>,
    for<'q> i64: Encode<'q, DB> + Type<DB>,
    for<'q> String: Encode<'q, DB> + Type<DB>,
    for<'q> Option<String>: Encode<'q, DB> + Type<DB>,
    for<'q> DB::Arguments<'q>: IntoArguments<'q, DB>,
    for<'c> &'c mut DB::Connection: Executor<'c, Database = DB>,
    for<'r> i64: Decode<'r, DB>,
    usize: ColumnIndex<DB::Row>,
{
    let row = sqlx::query::<DB>(NEXT_SEQ_SQL)
        .bind(thread_id)
        .fetch_one(&mut **tx)
        .await?;
    let seq: i64 = row.try_get(0usize)?;

    let state = serde_json::to_string(state_json)?;
    sqlx::query::<DB>(INSERT_CHECKPOINT_SQL)
        .bind(thread_id)
        .bind(seq)
        .bind(created_at)
        .bind(node)
        .bind(step)
        .bind(owner.map(str::to_string))
        .bind(state)
        .execute(&mut **tx)
        .await?;

    Ok(seq)
}

pub async fn load_latest_checkpoint<DB>(
    pool: &Pool<DB>,
    thread_id: &str,
) -> Result<Option<StoredCheckpoint>, CheckpointSqlError>
where
    DB: Database,
    for<'q> &'q str: Encode<'q, DB> + Type<DB>,
    for<'q> DB::Arguments<'q>: IntoArguments<'q, DB>,
    for<'c> &'c Pool<DB>: Executor<'c, Database = DB>,
    for<'r> String: Decode<'r, DB> + Type<DB>,
    for<'r> i64: Decode<'r, DB> + Type<DB>,
    for<'r> Option<String>: Decode<'r, DB> + Type<DB>,
    for<'r> Option<i64>: Decode<'r, DB> + Type<DB>,
    &'static str: ColumnIndex<DB::Row>,
{
    let Some(row) = sqlx::query::<DB>(LOAD_LATEST_SQL)
        .bind(thread_id)
        .fetch_optional(pool)
        .await?
    else {
        return Ok(None);
    };

    decode_stored(&row).map(Some)
}

fn decode_stored<R>(row: &R) -> Result<StoredCheckpoint, CheckpointSqlError>
where
    R: Row,
    for<'r> String: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> i64: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> Option<String>: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> Option<i64>: Decode<'r, R::Database> + Type<R::Database>,
    &'static str: ColumnIndex<R>,
{
    let state_text: String = row.try_get("state_json")?;
    Ok(StoredCheckpoint {
        thread_id: row.try_get("thread_id")?,
        seq: row.try_get("seq")?,
        created_at: row.try_get("created_at")?,
        node: row.try_get("node")?,
        step: row.try_get("step")?,
        state_json: serde_json::from_str(&state_text)?,
    })
}

/// Row metadata for a thread, oldest first.
pub async fn list_checkpoints<DB>(
    pool: &Pool<DB>,
    thread_id: &str,
) -> Result<Vec<CheckpointRow>, CheckpointSqlError>
where
    DB: Database,
    for<'q> &'q str: Encode<'q, DB> + Type<DB>,
    for<'q> DB::Arguments<'q>: IntoArguments<'q, DB>,
    for<'c> &'c Pool<DB>: Executor<'c, Database = DB>,
    for<'r> String: Decode<'r, DB> + Type<DB>,
    for<'r> i64: Decode<'r, DB> + Type<DB>,
    for<'r> Option<String>: Decode<'r, DB> + Type<DB>,
    for<'r> Option<i64>: Decode<'r, DB> + Type<DB>,
    &'static str: ColumnIndex<DB::Row>,
{
    let rows = sqlx::query::<DB>(LIST_CHECKPOINTS_SQL)
        .bind(thread_id)
        .fetch_all(pool)
        .await?;

    rows.iter()
        .map(|row| {
            Ok(CheckpointRow {
                seq: row.try_get("seq")?,
                created_at: row.try_get("created_at")?,
                node: row.try_get("node")?,
                step: row.try_get("step")?,
            })
        })
        .collect()
}

/// Latest row of every thread saved under `owner`, most recently written first.
pub async fn list_owned_threads<DB>(
    pool: &Pool<DB>,
    owner: &str,
) -> Result<Vec<StoredCheckpoint>, CheckpointSqlError>
where
    DB: Database,
    for<'q> &'q str: Encode<'q, DB> + Type<DB>,
    for<'q> DB::Arguments<'q>: IntoArguments<'q, DB>,
    for<'c> &'c Pool<DB>: Executor<'c, Database = DB>,
    for<'r> String: Decode<'r, DB> + Type<DB>,
    for<'r> i64: Decode<'r, DB> + Type<DB>,
    for<'r> Option<String>: Decode<'r, DB> + Type<DB>,
    for<'r> Option<i64>: Decode<'r, DB> + Type<DB>,
    &'static str: ColumnIndex<DB::Row>,
{
    let rows = sqlx::query::<DB>(LIST_OWNED_LATEST_SQL)
        .bind(owner)
        .fetch_all(pool)
        .await?;

    rows.iter().map(decode_stored).collect()
}

/// Removes every row of a thread and returns how many were deleted.
pub async fn delete_thread<DB>(pool: &Pool<DB>, thread_id: &str) -> Result<i64, CheckpointSqlError>
where
    DB: Database,
    for<'q> &'q str: Encode<'q, DB> + Type<DB>,
    for<'q> DB::Arguments<'q>: IntoArguments<'q, DB>,
    for<'c> &'c mut DB::Connection: Executor<'c, Database = DB>,
    for<'r> i64: Decode<'r, DB> + Type<DB>,
    usize: ColumnIndex<DB::Row>,
{
    let mut tx = pool.begin().await?;
    let row = sqlx::query::<DB>(COUNT_THREAD_SQL)
        .bind(thread_id)
        .fetch_one(&mut *tx)
        .await?;
    let removed: i64 = row.try_get(0usize)?;

    sqlx::query::<DB>(DELETE_THREAD_SQL)
        .bind(thread_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(removed)
}
