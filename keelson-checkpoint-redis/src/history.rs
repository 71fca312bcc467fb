use fred::interfaces::KeysInterface;
use keelson_core::{Checkpoint, CheckpointMetadata, HistoryCheckpointer, KeelsonError, StateSchema};

use crate::keys::ThreadKeys;
use crate::{checkpoint_error, map_redis_error, RedisCheckpointer};

#[async_trait::async_trait]
impl<S> HistoryCheckpointer<S> for RedisCheckpointer
where
    S: StateSchema,
{
    async fn list_checkpoints(
        &self,
        thread_id: &str,
    ) -> Result<Vec<CheckpointMetadata>, KeelsonError> {
        let keys = ThreadKeys::new(&self.namespace, thread_id);

        let max_seq: Option<i64> = self.client.get(&keys.seq).await.map_err(map_redis_error)?;
        let max_seq = match max_seq {
            Some(seq) if seq > 0 => seq,
            _ => return Ok(Vec::new()),
        };

        let mut out = Vec::new();
        for seq in 1..=max_seq {
            let payload: Option<String> = self
                .client
                .get(keys.history(seq))
                .await
                .map_err(map_redis_error)?;

            // expired entries leave gaps
            let Some(payload) = payload else {
                continue;
            };

            let checkpoint: Checkpoint<S> = serde_json::from_str(&payload).map_err(|error| {
                checkpoint_error(format!("failed to deserialize history checkpoint: {error}"))
            })?;

            out.push(CheckpointMetadata {
                seq: seq as u64,
                node: checkpoint.node,
                created_at: checkpoint.created_at,
            });
        }

        Ok(out)
    }
}
