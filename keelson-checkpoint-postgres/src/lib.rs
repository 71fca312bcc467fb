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
pub struct PostgresCheckpointer {
    pool: sqlx::PgPool,
}

#[derive(Debug, Clone)]
pub struct PostgresCheckpointerBuilder {
    database_url: String,
    max_connections: u32,
    min_connections: u32,
}

impl PostgresCheckpointer {
    pub fn builder(database_url: impl Into<String>) -> PostgresCheckpointerBuilder {
        PostgresCheckpointerBuilder {
            database_url: database_url.into(),
            max_connections: 5,
            min_connections: 0,
        }
    }

    pub fn pool(&self) -> &sqlx::PgPool {
        &self.pool
    }
}

impl PostgresCheckpointerBuilder {
    pub fn max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn min_connections(mut self, min_connections: u32) -> Self {
        self.min_connections = min_connections;
        self
    }

    /// Connects and creates the checkpoint table if it does not exist.
    pub async fn build(self) -> Result<PostgresCheckpointer, CheckpointSqlError> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .connect(&self.database_url)
            .await
            .map_err(CheckpointSqlError::Connection)?;

        run_migrations(&pool).await?;
        tracing::debug!(
            max_connections = self.max_connections,
            min_connections = self.min_connections,
            "postgres checkpointer ready"
        );

        Ok(PostgresCheckpointer { pool })
    }
}

#[async_trait::async_trait]
impl<S: StateSchema> Checkpointer<S> for PostgresCheckpointer {
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
impl<S: StateSchema> HistoryCheckpointer<S> for PostgresCheckpointer {
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
