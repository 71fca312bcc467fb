use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::state::StateSchema;
use crate::KeelsonError;

/// A snapshot of a thread's state, written after a stage completes.
///
/// `step` is a per-thread save counter and `node` names the stage that
/// produced the snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(bound = "S: StateSchema")]
pub struct Checkpoint<S: StateSchema> {
    pub thread_id: String,
    pub state: S,
    pub step: u64,
    pub node: String,
    pub created_at: String,
}

impl<S: StateSchema> Checkpoint<S> {
    pub fn new(thread_id: impl Into<String>, state: S, step: u64, node: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            state,
            step,
            node: node.into(),
            created_at: Utc::now().to_rfc3339(),
        }
    }
}

#[async_trait::async_trait]
pub trait Checkpointer<S: StateSchema>: Send + Sync {
    async fn save(&self, checkpoint: &Checkpoint<S>) -> Result<(), KeelsonError>;
    async fn load(&self, thread_id: &str) -> Result<Option<Checkpoint<S>>, KeelsonError>;

    /// Latest checkpoint of every thread whose state reports `owner`,
    /// most recently saved first.
    async fn list_threads(&self, _owner: &str) -> Result<Vec<Checkpoint<S>>, KeelsonError> {
        Err(KeelsonError::InvalidConfig(
            "checkpointer does not support listing threads".to_string(),
        ))
    }

    /// Drops every snapshot of a thread. Returns `false` when none existed.
    async fn delete_thread(&self, _thread_id: &str) -> Result<bool, KeelsonError> {
        Err(KeelsonError::InvalidConfig(
            "checkpointer does not support deleting threads".to_string(),
        ))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointMetadata {
    pub seq: u64,
    pub node: String,
    pub created_at: String,
}

#[async_trait::async_trait]
pub trait HistoryCheckpointer<S: StateSchema>: Send + Sync {
    async fn list_checkpoints(
        &self,
        thread_id: &str,
    ) -> Result<Vec<CheckpointMetadata>, KeelsonError>;
}

/// Process-local store keeping every snapshot per thread.
#[derive(Clone)]
pub struct InMemoryCheckpointer<S: StateSchema> {
    inner: Arc<RwLock<HashMap<String, Vec<Checkpoint<S>>>>>,
}

impl<S: StateSchema> Default for InMemoryCheckpointer<S> {
    fn default() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl<S: StateSchema> InMemoryCheckpointer<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every snapshot recorded for `thread_id`, oldest first.
    pub fn history(&self, thread_id: &str) -> Result<Vec<Checkpoint<S>>, KeelsonError> {
        let guard = self
            .inner
            .read()
            .map_err(|_| KeelsonError::CheckpointFailed("lock".into()))?;
        Ok(guard.get(thread_id).cloned().unwrap_or_default())
    }
}

#[async_trait::async_trait]
impl<S: StateSchema> Checkpointer<S> for InMemoryCheckpointer<S> {
    async fn save(&self, checkpoint: &Checkpoint<S>) -> Result<(), KeelsonError> {
        let mut guard = self
            .inner
            .write()
            .map_err(|_| KeelsonError::CheckpointFailed("lock".into()))?;
        guard
            .entry(checkpoint.thread_id.clone())
            .or_default()
            .push(checkpoint.clone());
        Ok(())
    }

    async fn load(&self, thread_id: &str) -> Result<Option<Checkpoint<S>>, KeelsonError> {
        let guard = self
            .inner
            .read()
            .map_err(|_| KeelsonError::CheckpointFailed("lock".into()))?;
        Ok(guard
            .get(thread_id)
            .and_then(|history| history.last().cloned()))
    }

    async fn list_threads(&self, owner: &str) -> Result<Vec<Checkpoint<S>>, KeelsonError> {
        let guard = self
            .inner
            .read()
            .map_err(|_| KeelsonError::CheckpointFailed("lock".into()))?;
        let mut latest: Vec<Checkpoint<S>> = guard
            .values()
            .filter_map(|history| history.last())
            .filter(|cp| cp.state.owner() == Some(owner))
            .cloned()
            .collect();
        latest.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.thread_id.cmp(&b.thread_id))
        });
        Ok(latest)
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<bool, KeelsonError> {
        let mut guard = self
            .inner
            .write()
            .map_err(|_| KeelsonError::CheckpointFailed("lock".into()))?;
        Ok(guard.remove(thread_id).is_some())
    }
}

#[async_trait::async_trait]
impl<S: StateSchema> HistoryCheckpointer<S> for InMemoryCheckpointer<S> {
    async fn list_checkpoints(
        &self,
        thread_id: &str,
    ) -> Result<Vec<CheckpointMetadata>, KeelsonError> {
        let metadata = self
            .history(thread_id)?
            .into_iter()
            .map(|cp| CheckpointMetadata {
                seq: cp.step,
                node: cp.node,
                created_at: cp.created_at,
            })
            .collect();
        Ok(metadata)
    }
}
