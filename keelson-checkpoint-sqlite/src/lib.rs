//! SQLite-backed [`Checkpointer`] sharing the relational schema with the
//! Postgres backend. Suited to single-node deployments and local runs.

use keelson_checkpoint_sql::convert::{into_checkpoint, into_metadata, state_to_json, step_to_i64};
use keelson_checkpoint_sql::error::CheckpointSqlError;
use keelson_checkpoint_sql::migrations::run_migrations;
use keelson_checkpoint_sql::ops::{
    delete_thread, list_checkpoints, list_owned_threads, load_latest_checkpoint, save_checkpoint,
};
use keelson_core::{
    Checkpoint, CheckpointMetadata, Checkpointer, HistoryCheckpointer, KeelsonError, StateSchema,
};

#[derive(Debug, Clone)]
pub struct SqliteCheckpointer {
    pool: sqlx::SqlitePool,
}

#[derive(Debug, Clone)]
pub struct SqliteCheckpointerBuilder {
    database_url: String,
    max_connections: u32,
}

impl SqliteCheckpointer {
    /// `database_url` is any sqlx SQLite URL, e.g. `sqlite::memory:` or
    /// `sqlite://keelson.db?mode=rwc`.
    pub fn builder(database_url: impl Into<String>) -> SqliteCheckpointerBuilder {
        SqliteCheckpointerBuilder {
            database_url: database_url.into(),
            max_connections: 1,
        }
    }

    pub fn pool(&self) -> &sqlx::SqlitePool {
        &self.pool
    }
}

impl SqliteCheckpointerBuilder {
    pub fn max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub async fn build(self) -> Result<SqliteCheckpointer, CheckpointSqlError> {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(self.max_connections)
            .connect(&self.database_url)
            .await
            .map_err(CheckpointSqlError::Connection)?;

        run_migrations(&pool).await?;
        tracing::debug!(max_connections = self.max_connections, "sqlite checkpointer ready");

        Ok(SqliteCheckpointer { pool })
    }
}

#[async_trait::async_trait]
impl<S: StateSchema> Checkpointer<S> for SqliteCheckpointer {
    async fn save(&self, checkpoint: &Checkpoint<S>) -> Result<(), KeelsonError> {
        let step = step_to_i64(checkpoint.step)?;
        let state = state_to_json(checkpoint)?;

        save_checkpoint(
            &self.pool,
            &checkpoint.thread_id,
            checkpoint.state.owner(),
            &checkpoint.node,
            step,
            &checkpoint.created_at,
            &state,
        )
        .await?;

        Ok(())
    }

    async fn load(&self, thread_id: &str) -> Result<Option<Checkpoint<S>>, KeelsonError> {
        load_latest_checkpoint(&self.pool, thread_id)
            .await?
            .map(into_checkpoint)
            .transpose()
    }

    async fn list_threads(&self, owner: &str) -> Result<Vec<Checkpoint<S>>, KeelsonError> {
        list_owned_threads(&self.pool, owner)
            .await?
            .into_iter()
            .map(into_checkpoint)
            .collect()
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<bool, KeelsonError> {
        Ok(delete_thread(&self.pool, thread_id).await? > 0)
    }
}

#[async_trait::async_trait]
impl<S: StateSchema> HistoryCheckpointer<S> for SqliteCheckpointer {
    async fn list_checkpoints(
        &self,
        thread_id: &str,
    ) -> Result<Vec<CheckpointMetadata>, KeelsonError> {
        list_checkpoints(&self.pool, thread_id)
            .await?
            .into_iter()
            .map(into_metadata)
            .collect()
    }
}
