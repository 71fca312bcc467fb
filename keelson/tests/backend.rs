use std::time::Duration;

use keelson::{
    AgentLoop, BackendKind, ChatCompletion, CheckpointBackend, ErrorCategory, KeelsonError,
    Message, RunRequest, UserContext, DEFAULT_REDIS_NAMESPACE,
};

#[test]
fn backend_kind_parses_known_names() {
    assert_eq!("memory".parse::<BackendKind>().unwrap(), BackendKind::Memory);
    assert_eq!(" Redis ".parse::<BackendKind>().unwrap(), BackendKind::Redis);
    assert_eq!("postgresql".parse::<BackendKind>().unwrap(), BackendKind::Postgres);
    assert_eq!("sqlite".parse::<BackendKind>().unwrap(), BackendKind::Sqlite);

    let error = "mongo".parse::<BackendKind>().unwrap_err();
    assert_eq!(error.category(), ErrorCategory::Configuration);
}

#[test]
fn from_kind_requires_url_for_remote_backends() {
    assert_eq!(
        CheckpointBackend::from_kind(BackendKind::Memory, None).unwrap(),
        CheckpointBackend::Memory
    );

    for kind in [BackendKind::Redis, BackendKind::Postgres, BackendKind::Sqlite] {
        let error = CheckpointBackend::from_kind(kind, Some("  ".to_string())).unwrap_err();
        assert!(matches!(error, KeelsonError::InvalidConfig(_)), "{kind}");
    }

    let backend =
        CheckpointBackend::from_kind(BackendKind::Postgres, Some("postgres://db/keelson".into()))
            .unwrap();
    assert_eq!(backend.kind(), BackendKind::Postgres);

    let backend =
        CheckpointBackend::from_kind(BackendKind::Redis, Some("redis://cache:6379".into())).unwrap();
    assert_eq!(
        backend,
        CheckpointBackend::Redis {
            url: "redis://cache:6379".to_string(),
            namespace: DEFAULT_REDIS_NAMESPACE.to_string(),
            ttl: None,
        }
    );
}

#[tokio::test]
async fn mismatched_url_scheme_fails_before_connecting() {
    let backend = CheckpointBackend::Postgres {
        url: "mysql://db/keelson".to_string(),
        max_connections: 5,
    };

    let error = backend.connect().await.err().expect("must fail");
    assert_eq!(error.code(), "CONFIG_ERROR");
}

#[tokio::test]
async fn zero_pool_size_is_rejected() {
    let backend = CheckpointBackend::Postgres {
        url: "postgres://db/keelson".to_string(),
        max_connections: 0,
    };

    assert!(matches!(
        backend.connect().await.err(),
        Some(KeelsonError::InvalidConfig(_))
    ));
}

#[tokio::test]
async fn unreachable_redis_is_a_configuration_error() {
    let backend = CheckpointBackend::Redis {
        url: "redis://127.0.0.1:1".to_string(),
        namespace: "test".to_string(),
        ttl: Some(Duration::from_secs(30)),
    };

    let error = backend.connect().await.err().expect("must fail");
    assert_eq!(error.category(), ErrorCategory::Configuration);
}

struct Quiet;

#[async_trait::async_trait]
impl ChatCompletion for Quiet {
    async fn complete(&self, _messages: Vec<Message>) -> Result<String, KeelsonError> {
        Ok(r#"{"tool": "none", "reason": "", "arguments": {}}"#.to_string())
    }
}

#[tokio::test]
async fn memory_backend_drives_an_agent_loop() {
    let store = CheckpointBackend::Memory.connect().await.expect("memory connects");
    let agent = AgentLoop::builder()
        .with_planner(Quiet)
        .with_shared_checkpointer(store.clone())
        .build()
        .expect("agent builds");
    let user = UserContext::new("u-1", "u@example.com", None).unwrap();

    let response = agent
        .run(RunRequest::new("hi", user).with_thread_id("t-1"))
        .await
        .expect("run succeeds");

    let saved = store.load("t-1").await.unwrap().expect("checkpoint saved");
    assert_eq!(saved.state.iteration_count, response.iteration_count);
}

#[cfg(feature = "sqlite")]
#[tokio::test]
async fn sqlite_backend_connects_in_memory() {
    let backend =
        CheckpointBackend::from_kind(BackendKind::Sqlite, Some("sqlite::memory:".into())).unwrap();

    let store = backend.connect().await.expect("sqlite connects");
    assert!(store.load("missing").await.unwrap().is_none());
}
