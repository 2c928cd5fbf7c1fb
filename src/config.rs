//! Pipeline configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). Tuning values fall back to defaults
//! when missing or unparsable; structural values (port, listen address,
//! backend names) are rejected with a [`ConfigError`].

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use sqlx::postgres::PgConnectOptions;

use crate::error::ConfigError;
use crate::storage::RetryPolicy;

/// Which record store the pipeline writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// PostgreSQL via `sqlx`.
    Postgres,
    /// In-process maps; nothing survives the process.
    Memory,
}

/// Which queue transport connects producer and consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// In-process tokio channels.
    Memory,
    /// Apache Kafka (requires the `kafka` feature).
    Kafka,
}

/// Durable store settings.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Backend selection.
    pub backend: StoreBackend,
    /// PostgreSQL connection target and credentials.
    pub connect_options: PgConnectOptions,
    /// Maximum number of pooled connections.
    pub max_connections: u32,
    /// Minimum idle connections.
    pub min_connections: u32,
    /// Timeout for acquiring a pooled connection.
    pub acquire_timeout: Duration,
    /// Startup connection retry budget.
    pub retry: RetryPolicy,
}

/// Queue transport settings.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Transport selection.
    pub transport: TransportKind,
    /// Queue (or topic) identifier.
    pub name: String,
    /// Drop any messages left on the queue before seeding.
    pub purge_on_start: bool,
    /// Kafka bootstrap servers.
    pub kafka_brokers: String,
    /// Kafka consumer group.
    pub kafka_group_id: String,
}

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Emit JSON lines instead of human-readable text.
    pub json: bool,
    /// Also append log lines to this file.
    pub file: Option<String>,
}

/// Top-level pipeline configuration.
///
/// Loaded once at startup via [`IngestConfig::from_env`].
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Durable store settings.
    pub store: StoreConfig,
    /// Queue transport settings.
    pub queue: QueueConfig,
    /// Logging settings.
    pub log: LogConfig,
    /// Socket address for the liveness endpoint.
    pub listen_addr: SocketAddr,
    /// Publish the seed batch at startup.
    pub seed_on_start: bool,
    /// Re-publish the first seed record after the consumer starts, to
    /// exercise the duplicate path.
    pub publish_duplicate_probe: bool,
}

impl IngestConfig {
    /// Loads configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `DATABASE_URL`, `DB_PORT`,
    /// `LISTEN_ADDR`, `STORE_BACKEND`, `QUEUE_TRANSPORT` or `LOG_FORMAT` is
    /// set to an unrecognised value.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// See [`IngestConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        // Parts are handed to the driver unencoded, so credentials may
        // contain URL-reserved characters.
        let connect_options = match env.get("DATABASE_URL") {
            Some(url) => PgConnectOptions::from_str(&url)
                .map_err(|_| invalid("DATABASE_URL", "<unparsable url>"))?,
            None => PgConnectOptions::new_without_pgpass()
                .host(&env.get_or("DB_HOST", "localhost"))
                .port(env.parse_strict("DB_PORT", 5432)?)
                .username(&env.get_or("DB_USER", "postgres"))
                .password(&env.get_or("DB_PASSWORD", "postgres"))
                .database(&env.get_or("DB_NAME", "payments")),
        };

        let backend = match env.get("STORE_BACKEND").as_deref() {
            None | Some("postgres") => StoreBackend::Postgres,
            Some("memory") => StoreBackend::Memory,
            Some(other) => return Err(invalid("STORE_BACKEND", other)),
        };

        let store = StoreConfig {
            backend,
            connect_options,
            max_connections: env.parse("DATABASE_MAX_CONNECTIONS", 10),
            min_connections: env.parse("DATABASE_MIN_CONNECTIONS", 1),
            acquire_timeout: Duration::from_secs(env.parse("DATABASE_ACQUIRE_TIMEOUT_SECS", 5)),
            retry: RetryPolicy::new(
                env.parse::<u32>("STORE_CONNECT_MAX_ATTEMPTS", 5).max(1),
                Duration::from_millis(env.parse("STORE_CONNECT_RETRY_DELAY_MS", 2_000)),
            ),
        };

        let transport = match env.get("QUEUE_TRANSPORT").as_deref() {
            None | Some("memory") => TransportKind::Memory,
            Some("kafka") => TransportKind::Kafka,
            Some(other) => return Err(invalid("QUEUE_TRANSPORT", other)),
        };

        let queue = QueueConfig {
            transport,
            name: env.get_or("QUEUE_NAME", "payments"),
            purge_on_start: env.parse_bool("QUEUE_PURGE_ON_START", true),
            kafka_brokers: env.get_or("KAFKA_BROKERS", "localhost:9092"),
            kafka_group_id: env.get_or("KAFKA_GROUP_ID", "payment-ingest"),
        };

        let json = match env.get("LOG_FORMAT").as_deref() {
            None | Some("text") => false,
            Some("json") => true,
            Some(other) => return Err(invalid("LOG_FORMAT", other)),
        };
        let log = LogConfig {
            json,
            file: env.get("LOG_FILE"),
        };

        let listen_addr = env.parse_strict("LISTEN_ADDR", SocketAddr::from(([0, 0, 0, 0], 8080)))?;

        Ok(Self {
            store,
            queue,
            log,
            listen_addr,
            seed_on_start: env.parse_bool("SEED_ON_START", true),
            publish_duplicate_probe: env.parse_bool("PUBLISH_DUPLICATE_PROBE", true),
        })
    }
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Returns the value if set and non-empty.
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.is_empty())
    }

    fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    /// Parses a value as `T`, returning `default` on missing or invalid
    /// values.
    fn parse<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        self.get(key).and_then(|v| v.parse().ok()).unwrap_or(default)
    }

    /// Like [`Env::parse`] but rejects a present, unparsable value.
    fn parse_strict<T: std::str::FromStr>(
        &self,
        key: &'static str,
        default: T,
    ) -> Result<T, ConfigError> {
        match self.get(key) {
            None => Ok(default),
            Some(v) => v.parse().map_err(|_| invalid(key, &v)),
        }
    }

    /// Accepts `"true"`, `"1"`, `"false"`, `"0"` (case-insensitive).
    fn parse_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key).map(|v| v.to_ascii_lowercase()).as_deref() {
            Some("true" | "1") => true,
            Some("false" | "0") => false,
            _ => default,
        }
    }
}

fn invalid(key: &'static str, value: &str) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::collections::HashMap;

    use sqlx::ConnectOptions;

    use super::*;

    fn try_load(vars: &[(&str, &str)]) -> Result<IngestConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        IngestConfig::from_lookup(|key| map.get(key).cloned())
    }

    fn load(vars: &[(&str, &str)]) -> IngestConfig {
        match try_load(vars) {
            Ok(config) => config,
            Err(e) => panic!("config rejected: {e}"),
        }
    }

    #[test]
    fn defaults() {
        let config = load(&[]);
        let target = &config.store.connect_options;
        assert_eq!(target.get_host(), "localhost");
        assert_eq!(target.get_port(), 5432);
        assert_eq!(target.get_username(), "postgres");
        assert_eq!(target.get_database(), Some("payments"));
        assert_eq!(config.store.backend, StoreBackend::Postgres);
        assert_eq!(config.store.retry, RetryPolicy::default());
        assert_eq!(config.queue.transport, TransportKind::Memory);
        assert_eq!(config.queue.name, "payments");
        assert!(config.queue.purge_on_start);
        assert!(config.seed_on_start);
        assert!(config.publish_duplicate_probe);
        assert_eq!(config.listen_addr.port(), 8080);
        assert_eq!(config.log, LogConfig { json: false, file: None });
    }

    #[test]
    fn connection_target_from_parts() {
        let config = load(&[
            ("DB_USER", "ingest"),
            ("DB_PASSWORD", "secret"),
            ("DB_HOST", "db"),
            ("DB_PORT", "6543"),
            ("DB_NAME", "ledger"),
        ]);
        let target = &config.store.connect_options;
        assert_eq!(target.get_host(), "db");
        assert_eq!(target.get_port(), 6543);
        assert_eq!(target.get_username(), "ingest");
        assert_eq!(target.get_database(), Some("ledger"));
    }

    #[test]
    fn reserved_characters_in_password_stay_in_the_password() {
        let config = load(&[("DB_PASSWORD", "p@ss/w#rd"), ("DB_HOST", "db.internal")]);
        let target = &config.store.connect_options;
        assert_eq!(target.get_host(), "db.internal");
        assert_eq!(target.get_port(), 5432);
        assert_eq!(target.get_username(), "postgres");
        assert_eq!(target.get_database(), Some("payments"));

        let url = target.to_url_lossy();
        assert_eq!(url.host_str(), Some("db.internal"));
        assert_eq!(url.password(), Some("p%40ss%2Fw%23rd"));
    }

    #[test]
    fn explicit_database_url_wins() {
        let config = load(&[
            ("DATABASE_URL", "postgres://app:pw@primary:7000/ledger"),
            ("DB_HOST", "ignored"),
        ]);
        let target = &config.store.connect_options;
        assert_eq!(target.get_host(), "primary");
        assert_eq!(target.get_port(), 7000);
        assert_eq!(target.get_username(), "app");
        assert_eq!(target.get_database(), Some("ledger"));
    }

    #[test]
    fn unparsable_database_url_is_rejected_without_echoing_it() {
        let err = try_load(&[("DATABASE_URL", "postgres://user:hunter2@:notaport/db")]);
        let Err(ConfigError::Invalid { key, value }) = err else {
            panic!("malformed DATABASE_URL accepted");
        };
        assert_eq!(key, "DATABASE_URL");
        assert!(!value.contains("hunter2"));
    }

    /// Collects formatted log output in memory.
    #[derive(Clone, Default)]
    struct Captured(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            let Ok(mut lines) = self.0.lock() else {
                return Err(std::io::Error::other("capture lock poisoned"));
            };
            lines.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn loading_from_env_emits_no_log_events() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_writer(move || writer.clone())
            .finish();

        // Loading happens before the subscriber is installed in `main`.
        tracing::subscriber::with_default(subscriber, || {
            let _ = IngestConfig::from_env();
        });

        let Ok(lines) = captured.0.lock() else {
            panic!("capture lock poisoned");
        };
        assert!(
            lines.is_empty(),
            "unexpected output: {}",
            String::from_utf8_lossy(&lines)
        );
    }

    #[test]
    fn invalid_port_is_rejected() {
        let err = try_load(&[("DB_PORT", "not-a-port")]);
        assert!(matches!(
            err,
            Err(ConfigError::Invalid { key: "DB_PORT", .. })
        ));
    }

    #[test]
    fn retry_settings_are_configurable() {
        let config = load(&[
            ("STORE_CONNECT_MAX_ATTEMPTS", "3"),
            ("STORE_CONNECT_RETRY_DELAY_MS", "250"),
        ]);
        assert_eq!(
            config.store.retry,
            RetryPolicy::new(3, Duration::from_millis(250))
        );
    }

    #[test]
    fn zero_attempts_is_clamped() {
        let config = load(&[("STORE_CONNECT_MAX_ATTEMPTS", "0")]);
        assert_eq!(config.store.retry.max_attempts, 1);
    }

    #[test]
    fn unparsable_tuning_falls_back() {
        let config = load(&[("DATABASE_MAX_CONNECTIONS", "lots")]);
        assert_eq!(config.store.max_connections, 10);
    }

    #[test]
    fn backend_and_transport_selection() {
        let config = load(&[
            ("STORE_BACKEND", "memory"),
            ("QUEUE_TRANSPORT", "kafka"),
            ("LOG_FORMAT", "json"),
            ("LOG_FILE", "app.log"),
        ]);
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.queue.transport, TransportKind::Kafka);
        assert!(config.log.json);
        assert_eq!(config.log.file.as_deref(), Some("app.log"));
    }

    #[test]
    fn unknown_transport_is_rejected() {
        assert!(try_load(&[("QUEUE_TRANSPORT", "carrier-pigeon")]).is_err());
    }

    #[test]
    fn booleans_accept_common_spellings() {
        let config = load(&[
            ("SEED_ON_START", "FALSE"),
            ("PUBLISH_DUPLICATE_PROBE", "0"),
            ("QUEUE_PURGE_ON_START", "nope"),
        ]);
        assert!(!config.seed_on_start);
        assert!(!config.publish_duplicate_probe);
        assert!(config.queue.purge_on_start);
    }
}
