use std::convert::TryFrom;

use keelson_core::{Checkpoint, CheckpointMetadata, KeelsonError, StateSchema};

use crate::error::CheckpointSqlError;
use crate::ops::{CheckpointRow, StoredCheckpoint};

pub fn checkpoint_error(message: impl Into<String>) -> KeelsonError {
    KeelsonError::CheckpointFailed(message.into())
}

impl From<CheckpointSqlError> for KeelsonError {
    fn from(error: CheckpointSqlError) -> Self {
        checkpoint_error(error.to_string())
    }
}

pub fn step_to_i64(step: u64) -> Result<i64, KeelsonError> {
    i64::try_from(step).map_err(|_| checkpoint_error("checkpoint step does not fit into i64"))
}

pub fn state_to_json<S: StateSchema>(
    checkpoint: &Checkpoint<S>,
) -> Result<serde_json::Value, KeelsonError> {
    serde_json::to_value(&checkpoint.state)
        .map_err(|error| checkpoint_error(format!("failed to serialize checkpoint state: {error}")))
}

pub fn into_checkpoint<S: StateSchema>(
    stored: StoredCheckpoint,
) -> Result<Checkpoint<S>, KeelsonError> {
    let step = u64::try_from(stored.step.unwrap_or_default())
        .map_err(|_| checkpoint_error("checkpoint step is negative"))?;

    let state: S = serde_json::from_value(stored.state_json).map_err(|error| {
        checkpoint_error(format!("failed to deserialize checkpoint state: {error}"))
    })?;

    Ok(Checkpoint {
        thread_id: stored.thread_id,
        state,
        step,
        node: stored.node.unwrap_or_default(),
        created_at: stored.created_at,
    })
}

pub fn into_metadata(row: CheckpointRow) -> Result<CheckpointMetadata, KeelsonError> {
    let seq = u64::try_from(row.seq).map_err(|_| checkpoint_error("checkpoint seq is negative"))?;
    Ok(CheckpointMetadata {
        seq,
        node: row.node.unwrap_or_default(),
        created_at: row.created_at,
    })
}
