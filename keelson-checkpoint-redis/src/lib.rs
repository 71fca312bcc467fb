//! Redis-backed checkpoint store.
//!
//! Each save runs a Lua script that increments a per-thread sequence and
//! writes the snapshot under both a `latest` key and a numbered history key.
//! Thread ids are tracked in a per-namespace sorted set so operators can list
//! recently active conversations. With a TTL the index drops threads whose
//! keys have expired.

mod history;
mod keys;
mod script;

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fred::interfaces::{KeysInterface, LuaInterface, SortedSetsInterface};
use fred::prelude::*;
use keelson_core::{Checkpoint, Checkpointer, KeelsonError, StateSchema};
use tokio::sync::RwLock;

use crate::keys::{index_key, ThreadKeys};
use crate::script::LUA_SAVE;

pub use keys::{encode_thread_id, index_key as redis_index_key};

#[derive(Clone)]
pub struct RedisCheckpointer {
    client: RedisClient,
    namespace: String,
    ttl_seconds: Option<u64>,
    script_sha: Arc<RwLock<String>>,
}

impl std::fmt::Debug for RedisCheckpointer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCheckpointer")
            .field("namespace", &self.namespace)
            .field("ttl_seconds", &self.ttl_seconds)
            .finish()
    }
}

pub(crate) fn checkpoint_error(message: impl Into<String>) -> KeelsonError {
    KeelsonError::CheckpointFailed(message.into())
}

pub(crate) fn map_redis_error(error: RedisError) -> KeelsonError {
    checkpoint_error(error.to_string())
}

impl RedisCheckpointer {
    /// Connects and preloads the save script. Fails if the URL is malformed
    /// or the server is unreachable.
    pub async fn new(url: &str, namespace: impl Into<String>) -> Result<Self, KeelsonError> {
        let namespace = namespace.into();
        if namespace.trim().is_empty() {
            return Err(KeelsonError::InvalidConfig(
                "redis namespace must not be empty".to_string(),
            ));
        }

        let config = RedisConfig::from_url(url)
            .map_err(|error| KeelsonError::InvalidConfig(format!("invalid redis url: {error}")))?;
        let client = RedisClient::new(config, None, None, None);
        client.init().await.map_err(map_redis_error)?;

        let script_sha = client
            .script_load::<String, _>(LUA_SAVE)
            .await
            .map_err(map_redis_error)?;

        tracing::debug!(namespace = %namespace, "redis checkpointer connected");

        Ok(Self {
            client,
            namespace,
            ttl_seconds: None,
            script_sha: Arc::new(RwLock::new(script_sha)),
        })
    }

    /// Expires every key written by later saves after `ttl`. Sub-second
    /// durations round up to one second.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl_seconds = Some(ttl.as_secs().max(1));
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_seconds.map(Duration::from_secs)
    }

    /// Most recently saved thread ids, newest first.
    pub async fn recent_threads(&self, limit: usize) -> Result<Vec<String>, KeelsonError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let stop = i64::try_from(limit - 1).unwrap_or(i64::MAX);
        self.index_range(stop).await
    }

    async fn index_range(&self, stop: i64) -> Result<Vec<String>, KeelsonError> {
        self.client
            .zrange::<Vec<String>, _, _, _>(
                index_key(&self.namespace),
                0_i64,
                stop,
                None,
                true,
                None,
                false,
            )
            .await
            .map_err(map_redis_error)
    }

    /// Records a save in the thread index. With a TTL, entries older than
    /// the TTL are trimmed and the index expires with its newest thread.
    async fn touch_index(&self, thread_id: &str) -> Result<(), RedisError> {
        let index = index_key(&self.namespace);
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as f64;

        self.client
            .zadd::<(), _, _>(
                &index,
                None,
                None,
                false,
                false,
                vec![(now_ms, thread_id.to_string())],
            )
            .await?;

        if let Some(ttl) = self.ttl_seconds {
            let cutoff = now_ms - (ttl as f64) * 1000.0;
            self.client
                .zremrangebyscore::<(), _, _, _>(&index, "-inf", cutoff)
                .await?;
            self.client
                .expire::<(), _>(&index, i64::try_from(ttl).unwrap_or(i64::MAX))
                .await?;
        }
        Ok(())
    }

    async fn load_latest<S: StateSchema>(
        &self,
        keys: &ThreadKeys,
    ) -> Result<Option<Checkpoint<S>>, KeelsonError> {
        let payload: Option<String> = self
            .client
            .get(&keys.latest)
            .await
            .map_err(map_redis_error)?;

        let Some(payload) = payload else {
            return Ok(None);
        };

        let checkpoint = serde_json::from_str::<Checkpoint<S>>(&payload).map_err(|error| {
            checkpoint_error(format!("failed to deserialize checkpoint payload: {error}"))
        })?;

        Ok(Some(checkpoint))
    }

    async fn eval_save(&self, keys: Vec<String>, args: Vec<String>) -> Result<u64, KeelsonError> {
        let existing_sha = self.script_sha.read().await.clone();

        match self
            .client
            .evalsha::<u64, _, _, _>(existing_sha, keys.clone(), args.clone())
            .await
        {
            Ok(seq) => Ok(seq),
            Err(error) if error.to_string().to_ascii_uppercase().contains("NOSCRIPT") => {
                tracing::debug!("save script evicted from server cache, reloading");
                let new_sha = self
                    .client
                    .script_load::<String, _>(LUA_SAVE)
                    .await
                    .map_err(map_redis_error)?;
                *self.script_sha.write().await = new_sha.clone();

                self.client
                    .evalsha::<u64, _, _, _>(new_sha, keys, args)
                    .await
                    .map_err(map_redis_error)
            }
            Err(error) => Err(map_redis_error(error)),
        }
    }
}

#[async_trait::async_trait]
impl<S> Checkpointer<S> for RedisCheckpointer
where
    S: StateSchema,
{
    async fn save(&self, checkpoint: &Checkpoint<S>) -> Result<(), KeelsonError> {
        let thread_id = checkpoint.thread_id.as_str();
        let keys = ThreadKeys::new(&self.namespace, thread_id);

        let payload = serde_json::to_string(checkpoint).map_err(|error| {
            checkpoint_error(format!("failed to serialize checkpoint: {error}"))
        })?;
        let ttl = self.ttl_seconds.unwrap_or(0).to_string();

        let seq = self
            .eval_save(
                vec![keys.seq, keys.latest, keys.hist_prefix],
                vec![payload, ttl],
            )
            .await?;

        // the index is advisory; a failed update must not fail the save
        if let Err(error) = self.touch_index(thread_id).await {
            tracing::warn!(thread_id = %thread_id, error = %error, "failed to update thread index");
        }

        tracing::trace!(thread_id = %thread_id, seq, node = %checkpoint.node, "checkpoint saved");
        Ok(())
    }

    async fn load(&self, thread_id: &str) -> Result<Option<Checkpoint<S>>, KeelsonError> {
        self.load_latest(&ThreadKeys::new(&self.namespace, thread_id))
            .await
    }

    /// Walks the thread index, so only threads saved by this namespace and
    /// not yet expired are found.
    async fn list_threads(&self, owner: &str) -> Result<Vec<Checkpoint<S>>, KeelsonError> {
        let mut out = Vec::new();
        for thread_id in self.index_range(-1).await? {
            let keys = ThreadKeys::new(&self.namespace, &thread_id);
            if let Some(checkpoint) = self.load_latest::<S>(&keys).await? {
                if checkpoint.state.owner() == Some(owner) {
                    out.push(checkpoint);
                }
            }
        }
        Ok(out)
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<bool, KeelsonError> {
        let keys = ThreadKeys::new(&self.namespace, thread_id);
        let max_seq: Option<i64> = self.client.get(&keys.seq).await.map_err(map_redis_error)?;

        let mut doomed = vec![keys.seq.clone(), keys.latest.clone()];
        doomed.extend((1..=max_seq.unwrap_or(0)).map(|seq| keys.history(seq)));
        let removed: i64 = self.client.del(doomed).await.map_err(map_redis_error)?;

        self.client
            .zrem::<(), _, _>(index_key(&self.namespace), thread_id.to_string())
            .await
            .map_err(map_redis_error)?;

        tracing::debug!(thread_id = %thread_id, keys = removed, "thread deleted");
        Ok(removed > 0)
    }
}
