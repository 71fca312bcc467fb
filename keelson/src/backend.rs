use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use keelson_agent::AgentState;
use keelson_core::{Checkpointer, InMemoryCheckpointer, KeelsonError};

/// Key namespace used by [`CheckpointBackend::from_kind`] for Redis.
pub const DEFAULT_REDIS_NAMESPACE: &str = "keelson";

/// Default pool size for Postgres.
pub const DEFAULT_POSTGRES_MAX_CONNECTIONS: u32 = 5;

/// Checkpoint store families selectable at start-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Memory,
    Redis,
    Postgres,
    Sqlite,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Memory => "memory",
            BackendKind::Redis => "redis",
            BackendKind::Postgres => "postgres",
            BackendKind::Sqlite => "sqlite",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = KeelsonError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" | "in-memory" => Ok(BackendKind::Memory),
            "redis" => Ok(BackendKind::Redis),
            "postgres" | "postgresql" => Ok(BackendKind::Postgres),
            "sqlite" => Ok(BackendKind::Sqlite),
            other => Err(KeelsonError::InvalidConfig(format!(
                "unknown checkpoint backend '{other}' (expected memory, redis, postgres or sqlite)"
            ))),
        }
    }
}

/// Where agent checkpoints live. Chosen once; [`CheckpointBackend::connect`]
/// validates and connects so misconfiguration surfaces before any request.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum CheckpointBackend {
    #[default]
    Memory,
    Redis {
        url: String,
        namespace: String,
        ttl: Option<Duration>,
    },
    Postgres {
        url: String,
        max_connections: u32,
    },
    Sqlite {
        url: String,
    },
}

impl CheckpointBackend {
    /// Builds a backend of `kind` from a connection URL using default pool,
    /// namespace and expiry settings.
    pub fn from_kind(kind: BackendKind, url: Option<String>) -> Result<Self, KeelsonError> {
        let require_url = |url: Option<String>| {
            url.filter(|value| !value.trim().is_empty()).ok_or_else(|| {
                KeelsonError::InvalidConfig(format!("the {kind} checkpoint backend requires a URL"))
            })
        };

        Ok(match kind {
            BackendKind::Memory => CheckpointBackend::Memory,
            BackendKind::Redis => CheckpointBackend::Redis {
                url: require_url(url)?,
                namespace: DEFAULT_REDIS_NAMESPACE.to_string(),
                ttl: None,
            },
            BackendKind::Postgres => CheckpointBackend::Postgres {
                url: require_url(url)?,
                max_connections: DEFAULT_POSTGRES_MAX_CONNECTIONS,
            },
            BackendKind::Sqlite => CheckpointBackend::Sqlite {
                url: require_url(url)?,
            },
        })
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            CheckpointBackend::Memory => BackendKind::Memory,
            CheckpointBackend::Redis { .. } => BackendKind::Redis,
            CheckpointBackend::Postgres { .. } => BackendKind::Postgres,
            CheckpointBackend::Sqlite { .. } => BackendKind::Sqlite,
        }
    }

    fn validate(&self) -> Result<(), KeelsonError> {
        let (url, schemes): (&str, &[&str]) = match self {
            CheckpointBackend::Memory => return Ok(()),
            CheckpointBackend::Redis { url, namespace, .. } => {
                if namespace.trim().is_empty() {
                    return Err(KeelsonError::InvalidConfig(
                        "redis namespace must not be empty".to_string(),
                    ));
                }
                (url, &["redis://", "rediss://", "redis-sentinel://"])
            }
            CheckpointBackend::Postgres {
                url,
                max_connections,
            } => {
                if *max_connections == 0 {
                    return Err(KeelsonError::InvalidConfig(
                        "postgres max_connections must be at least 1".to_string(),
                    ));
                }
                (url, &["postgres://", "postgresql://"])
            }
            CheckpointBackend::Sqlite { url } => (url, &["sqlite:"]),
        };

        if !schemes.iter().any(|scheme| url.starts_with(scheme)) {
            return Err(KeelsonError::InvalidConfig(format!(
                "{} checkpoint URL must start with one of {}",
                self.kind(),
                schemes.join(", ")
            )));
        }
        Ok(())
    }

    /// Validates the configuration and opens the store.
    ///
    /// Every failure here, including an unreachable server, is reported as
    /// [`KeelsonError::InvalidConfig`].
    pub async fn connect(&self) -> Result<Arc<dyn Checkpointer<AgentState>>, KeelsonError> {
        self.validate()?;
        tracing::info!(backend = %self.kind(), "connecting checkpoint backend");

        let store = self.open().await.map_err(|error| match error {
            KeelsonError::InvalidConfig(_) => error,
            other => KeelsonError::InvalidConfig(format!(
                "failed to initialise {} checkpoint backend: {other}",
                self.kind()
            )),
        })?;
        Ok(store)
    }

    async fn open(&self) -> Result<Arc<dyn Checkpointer<AgentState>>, KeelsonError> {
        match self {
            CheckpointBackend::Memory => Ok(Arc::new(InMemoryCheckpointer::<AgentState>::new())),
            CheckpointBackend::Redis {
                url,
                namespace,
                ttl,
            } => open_redis(url, namespace, *ttl).await,
            CheckpointBackend::Postgres {
                url,
                max_connections,
            } => open_postgres(url, *max_connections).await,
            CheckpointBackend::Sqlite { url } => open_sqlite(url).await,
        }
    }
}

#[allow(dead_code)]
fn not_compiled(feature: &str) -> KeelsonError {
    KeelsonError::InvalidConfig(format!(
        "{feature} checkpoint support is not compiled in; enable the `{feature}` feature"
    ))
}

#[cfg(feature = "redis")]
async fn open_redis(
    url: &str,
    namespace: &str,
    ttl: Option<Duration>,
) -> Result<Arc<dyn Checkpointer<AgentState>>, KeelsonError> {
    let mut store = keelson_checkpoint_redis::RedisCheckpointer::new(url, namespace).await?;
    if let Some(ttl) = ttl {
        store = store.with_ttl(ttl);
    }
    Ok(Arc::new(store))
}

#[cfg(not(feature = "redis"))]
async fn open_redis(
    _url: &str,
    _namespace: &str,
    _ttl: Option<Duration>,
) -> Result<Arc<dyn Checkpointer<AgentState>>, KeelsonError> {
    Err(not_compiled("redis"))
}

#[cfg(feature = "postgres")]
async fn open_postgres(
    url: &str,
    max_connections: u32,
) -> Result<Arc<dyn Checkpointer<AgentState>>, KeelsonError> {
    let store = keelson_checkpoint_postgres::PostgresCheckpointer::builder(url)
        .max_connections(max_connections)
        .build()
        .await
        .map_err(KeelsonError::from)?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "postgres"))]
async fn open_postgres(
    _url: &str,
    _max_connections: u32,
) -> Result<Arc<dyn Checkpointer<AgentState>>, KeelsonError> {
    Err(not_compiled("postgres"))
}

#[cfg(feature = "sqlite")]
async fn open_sqlite(url: &str) -> Result<Arc<dyn Checkpointer<AgentState>>, KeelsonError> {
    let store = keelson_checkpoint_sqlite::SqliteCheckpointer::builder(url)
        .build()
        .await
        .map_err(KeelsonError::from)?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "sqlite"))]
async fn open_sqlite(_url: &str) -> Result<Arc<dyn Checkpointer<AgentState>>, KeelsonError> {
    Err(not_compiled("sqlite"))
}
