use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use keelson::llm::{OAuthConfig, OpenAiCompatibleClient, SecretString};
use keelson::{
    BackendKind, CheckpointBackend, LoopConfig, UserContext, DEFAULT_POSTGRES_MAX_CONNECTIONS,
    DEFAULT_REDIS_NAMESPACE,
};

/// HTTP attempts per LLM call, the first one included.
pub const LLM_ATTEMPTS: u32 = 3;

#[derive(Debug, Parser)]
#[command(name = "keelson", about = "Run the Keelson agent loop from a terminal", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[command(flatten)]
    pub checkpoint: CheckpointArgs,

    #[command(flatten)]
    pub llm: LlmArgs,

    #[command(flatten)]
    pub identity: IdentityArgs,

    /// Seconds to wait for each planner or responder call
    #[arg(long, global = true, env = "KEELSON_PLANNER_TIMEOUT_SECS", default_value_t = 30)]
    pub planner_timeout_secs: u64,

    /// Seconds to wait for each tool invocation
    #[arg(long, global = true, env = "KEELSON_TOOL_TIMEOUT_SECS", default_value_t = 30)]
    pub tool_timeout_secs: u64,

    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Send one message through the loop
    Run {
        #[arg(short, long)]
        message: String,

        /// Continue an existing conversation
        #[arg(short, long)]
        thread_id: Option<String>,

        #[arg(long, default_value_t = keelson::DEFAULT_MAX_ITERATIONS)]
        max_iterations: u32,

        /// Print server-sent events instead of the final answer
        #[arg(long)]
        stream: bool,
    },
    /// Finish a run interrupted before reaching `end`
    Resume {
        #[arg(short, long)]
        thread_id: String,
    },
    /// Print the latest persisted state of a thread as JSON
    State {
        #[arg(short, long)]
        thread_id: String,
    },
    /// List the current user's conversations, newest first
    Threads,
    /// Delete one of the current user's conversations
    Delete {
        #[arg(short, long)]
        thread_id: String,
    },
}

impl Command {
    /// Commands that never call the LLM.
    pub fn is_offline(&self) -> bool {
        matches!(self, Command::State { .. } | Command::Threads | Command::Delete { .. })
    }
}

#[derive(Debug, Args)]
pub struct CheckpointArgs {
    /// memory, redis, postgres or sqlite
    #[arg(long = "backend", global = true, env = "KEELSON_CHECKPOINT_BACKEND", default_value = "memory")]
    pub backend: String,

    #[arg(long, global = true, env = "KEELSON_REDIS_URL")]
    pub redis_url: Option<String>,

    #[arg(long, global = true, env = "KEELSON_REDIS_NAMESPACE", default_value = DEFAULT_REDIS_NAMESPACE)]
    pub redis_namespace: String,

    /// Expire Redis checkpoints after this many seconds
    #[arg(long, global = true, env = "KEELSON_REDIS_TTL_SECS")]
    pub redis_ttl_secs: Option<u64>,

    #[arg(long, global = true, env = "KEELSON_POSTGRES_URL")]
    pub postgres_url: Option<String>,

    #[arg(long, global = true, env = "KEELSON_POSTGRES_MAX_CONNECTIONS", default_value_t = DEFAULT_POSTGRES_MAX_CONNECTIONS)]
    pub postgres_max_connections: u32,

    /// e.g. sqlite://keelson.db?mode=rwc
    #[arg(long, global = true, env = "KEELSON_SQLITE_URL")]
    pub sqlite_url: Option<String>,
}

#[derive(Debug, Args)]
pub struct LlmArgs {
    /// Chat completions endpoint
    #[arg(long, global = true, env = "KEELSON_LLM_API_URL")]
    pub llm_api_url: Option<String>,

    #[arg(long, global = true, env = "KEELSON_LLM_MODEL", default_value = "gpt-4")]
    pub llm_model: String,

    #[arg(long, global = true, env = "KEELSON_LLM_API_KEY", hide_env_values = true)]
    pub llm_api_key: Option<String>,

    #[arg(long, global = true, env = "KEELSON_LLM_OAUTH_TOKEN_URL")]
    pub llm_oauth_token_url: Option<String>,

    #[arg(long, global = true, env = "KEELSON_LLM_CLIENT_ID")]
    pub llm_client_id: Option<String>,

    #[arg(long, global = true, env = "KEELSON_LLM_CLIENT_SECRET", hide_env_values = true)]
    pub llm_client_secret: Option<String>,

    /// Seconds per HTTP attempt; defaults to the planner timeout split across retries
    #[arg(long, global = true, env = "KEELSON_LLM_ATTEMPT_TIMEOUT_SECS")]
    pub llm_attempt_timeout_secs: Option<u64>,
}

#[derive(Debug, Args)]
pub struct IdentityArgs {
    #[arg(long, global = true, env = "KEELSON_USER_ID")]
    pub user_id: Option<String>,

    #[arg(long, global = true, env = "KEELSON_USER_EMAIL")]
    pub user_email: Option<String>,

    #[arg(long, global = true, env = "KEELSON_USER_ROLE")]
    pub user_role: Option<String>,
}

impl CheckpointArgs {
    pub fn backend(&self) -> anyhow::Result<CheckpointBackend> {
        let kind: BackendKind = self.backend.parse()?;
        let url = match kind {
            BackendKind::Memory => None,
            BackendKind::Redis => self.redis_url.clone(),
            BackendKind::Postgres => self.postgres_url.clone(),
            BackendKind::Sqlite => self.sqlite_url.clone(),
        };

        let backend = match CheckpointBackend::from_kind(kind, url)? {
            CheckpointBackend::Redis { url, .. } => CheckpointBackend::Redis {
                url,
                namespace: self.redis_namespace.clone(),
                ttl: self.redis_ttl_secs.map(Duration::from_secs),
            },
            CheckpointBackend::Postgres { url, .. } => CheckpointBackend::Postgres {
                url,
                max_connections: self.postgres_max_connections,
            },
            other => other,
        };
        Ok(backend)
    }
}

impl LlmArgs {
    /// Timeout for one HTTP attempt. Every retry fits inside the planner
    /// timeout that bounds the whole call.
    pub fn attempt_timeout(&self, planner_timeout: Duration) -> anyhow::Result<Duration> {
        match self.llm_attempt_timeout_secs {
            Some(0) => bail!("KEELSON_LLM_ATTEMPT_TIMEOUT_SECS must be at least 1"),
            Some(secs) => {
                let timeout = Duration::from_secs(secs);
                if timeout > planner_timeout {
                    bail!(
                        "LLM attempt timeout ({secs}s) exceeds the planner timeout ({}s)",
                        planner_timeout.as_secs()
                    );
                }
                Ok(timeout)
            }
            None => Ok(planner_timeout / LLM_ATTEMPTS),
        }
    }

    pub fn client(&self, planner_timeout: Duration) -> anyhow::Result<OpenAiCompatibleClient> {
        let api_url = self
            .llm_api_url
            .as_deref()
            .context("KEELSON_LLM_API_URL (or --llm-api-url) is required")?;

        let mut builder = OpenAiCompatibleClient::builder()
            .api_url(api_url)
            .model(&self.llm_model)
            .timeout(self.attempt_timeout(planner_timeout)?)
            .max_attempts(LLM_ATTEMPTS);

        match (
            &self.llm_oauth_token_url,
            &self.llm_client_id,
            &self.llm_client_secret,
        ) {
            (Some(token_url), Some(client_id), Some(client_secret)) => {
                builder = builder.oauth(OAuthConfig {
                    token_url: token_url.clone(),
                    client_id: client_id.clone(),
                    client_secret: SecretString::new(client_secret.clone()),
                });
            }
            (None, None, None) => {
                if let Some(key) = &self.llm_api_key {
                    builder = builder.bearer_token(SecretString::new(key.clone()));
                }
            }
            _ => bail!(
                "OAuth needs all of KEELSON_LLM_OAUTH_TOKEN_URL, KEELSON_LLM_CLIENT_ID and KEELSON_LLM_CLIENT_SECRET"
            ),
        }

        Ok(builder.build()?)
    }
}

impl IdentityArgs {
    pub fn user(&self) -> anyhow::Result<UserContext> {
        let user_id = self
            .user_id
            .clone()
            .context("KEELSON_USER_ID (or --user-id) is required")?;
        let email = self
            .user_email
            .clone()
            .context("KEELSON_USER_EMAIL (or --user-email) is required")?;
        Ok(UserContext::new(user_id, email, self.user_role.clone())?)
    }
}

impl Cli {
    pub fn loop_config(&self) -> LoopConfig {
        LoopConfig {
            planner_timeout: Duration::from_secs(self.planner_timeout_secs),
            tool_timeout: Duration::from_secs(self.tool_timeout_secs),
            ..LoopConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("keelson").chain(args.iter().copied()))
            .expect("arguments should parse")
    }

    #[test]
    fn run_command_parses_with_defaults() {
        let cli = parse(&["run", "--message", "hello", "--backend", "memory"]);

        match cli.command {
            Command::Run {
                ref message,
                max_iterations,
                stream,
                ref thread_id,
            } => {
                assert_eq!(message, "hello");
                assert_eq!(max_iterations, 3);
                assert!(!stream);
                assert!(thread_id.is_none());
            }
            ref other => panic!("unexpected command {other:?}"),
        }
        assert_eq!(cli.checkpoint.backend().unwrap(), CheckpointBackend::Memory);
        assert_eq!(cli.loop_config().planner_timeout, Duration::from_secs(30));
    }

    #[test]
    fn redis_backend_picks_up_namespace_and_ttl() {
        let cli = parse(&[
            "state",
            "--thread-id",
            "t-1",
            "--backend",
            "redis",
            "--redis-url",
            "redis://localhost:6379",
            "--redis-namespace",
            "staging",
            "--redis-ttl-secs",
            "600",
        ]);

        assert_eq!(
            cli.checkpoint.backend().unwrap(),
            CheckpointBackend::Redis {
                url: "redis://localhost:6379".to_string(),
                namespace: "staging".to_string(),
                ttl: Some(Duration::from_secs(600)),
            }
        );
    }

    #[test]
    fn relational_backend_without_url_is_rejected() {
        let cli = parse(&["resume", "--thread-id", "t-1", "--backend", "postgres"]);
        assert!(cli.checkpoint.backend().is_err());
    }

    #[test]
    fn partial_oauth_settings_are_rejected() {
        let cli = parse(&[
            "state",
            "--thread-id",
            "t-1",
            "--llm-api-url",
            "https://llm.example.com/v1/chat/completions",
            "--llm-client-id",
            "abc",
        ]);

        assert!(cli.llm.client(Duration::from_secs(5)).is_err());
    }

    #[test]
    fn llm_attempts_fit_inside_the_planner_timeout() {
        let cli = parse(&["run", "--message", "hi"]);
        let planner = cli.loop_config().planner_timeout;
        let attempt = cli.llm.attempt_timeout(planner).unwrap();
        assert_eq!(attempt, Duration::from_secs(10));
        assert!(attempt * LLM_ATTEMPTS <= planner);

        let cli = parse(&["run", "--message", "hi", "--llm-attempt-timeout-secs", "4"]);
        assert_eq!(cli.llm.attempt_timeout(planner).unwrap(), Duration::from_secs(4));

        let cli = parse(&["run", "--message", "hi", "--llm-attempt-timeout-secs", "45"]);
        assert!(cli.llm.attempt_timeout(planner).is_err());

        let cli = parse(&["run", "--message", "hi", "--llm-attempt-timeout-secs", "0"]);
        assert!(cli.llm.attempt_timeout(planner).is_err());
    }

    #[test]
    fn listing_commands_run_without_an_llm() {
        assert!(parse(&["threads"]).command.is_offline());
        assert!(parse(&["delete", "--thread-id", "t-1"]).command.is_offline());
        assert!(parse(&["state", "--thread-id", "t-1"]).command.is_offline());
        assert!(!parse(&["resume", "--thread-id", "t-1"]).command.is_offline());
    }

    #[test]
    fn identity_requires_id_and_email() {
        let cli = parse(&["state", "--thread-id", "t-1", "--user-id", "u-1"]);
        assert!(cli.identity.user().is_err());

        let cli = parse(&[
            "state",
            "--thread-id",
            "t-1",
            "--user-id",
            "u-1",
            "--user-email",
            "u@example.com",
            "--user-role",
            "finance",
        ]);
        let user = cli.identity.user().unwrap();
        assert!(user.can_access_financial_data());
    }
}
