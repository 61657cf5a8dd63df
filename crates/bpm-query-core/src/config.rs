// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

/// Database backend, selected by the connection URL scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseBackend {
    /// `sqlite:` URLs.
    Sqlite,
    /// `postgres://` and `postgresql://` URLs.
    Postgres,
}

impl DatabaseBackend {
    /// Detect the backend from a connection URL.
    pub fn from_url(url: &str) -> Option<Self> {
        if url.starts_with("sqlite:") {
            Some(Self::Sqlite)
        } else if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Some(Self::Postgres)
        } else {
            None
        }
    }
}

/// Query projector configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL or SQLite connection URL
    pub database_url: String,
    /// Backend detected from `database_url`
    pub backend: DatabaseBackend,
    /// Maximum pooled database connections
    pub max_connections: u32,
    /// Maximum number of single events grouped into one transaction
    pub batch_size: usize,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `BPM_QUERY_DATABASE_URL`: PostgreSQL or SQLite connection string
    ///
    /// Optional (with defaults):
    /// - `BPM_QUERY_MAX_CONNECTIONS`: Pool size (default: 10)
    /// - `BPM_QUERY_BATCH_SIZE`: Events per transaction (default: 100)
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("BPM_QUERY_DATABASE_URL")
            .map_err(|_| ConfigError::Missing("BPM_QUERY_DATABASE_URL"))?;

        let backend = DatabaseBackend::from_url(&database_url).ok_or(ConfigError::Invalid(
            "BPM_QUERY_DATABASE_URL",
            "must start with sqlite:, postgres:// or postgresql://",
        ))?;

        let max_connections: u32 = std::env::var("BPM_QUERY_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .ok()
            .filter(|n| *n > 0)
            .ok_or(ConfigError::Invalid(
                "BPM_QUERY_MAX_CONNECTIONS",
                "must be a positive integer",
            ))?;

        let batch_size: usize = std::env::var("BPM_QUERY_BATCH_SIZE")
            .unwrap_or_else(|_| "100".to_string())
            .parse()
            .ok()
            .filter(|n| *n > 0)
            .ok_or(ConfigError::Invalid(
                "BPM_QUERY_BATCH_SIZE",
                "must be a positive integer",
            ))?;

        Ok(Self {
            database_url,
            backend,
            max_connections,
            batch_size,
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Serializes tests that modify environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Sets env vars for one test and restores them on drop
    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new() -> Self {
            Self { vars: Vec::new() }
        }

        fn set(&mut self, key: &str, value: &str) {
            let old = env::var(key).ok();
            self.vars.push((key.to_string(), old));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::set_var(key, value) };
        }

        fn remove(&mut self, key: &str) {
            let old = env::var(key).ok();
            self.vars.push((key.to_string(), old));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::remove_var(key) };
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.vars.drain(..).rev() {
                // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
                unsafe {
                    match value {
                        Some(v) => env::set_var(&key, v),
                        None => env::remove_var(&key),
                    }
                }
            }
        }
    }

    #[test]
    fn test_config_from_env_with_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.set("BPM_QUERY_DATABASE_URL", "postgres://localhost/query");
        guard.remove("BPM_QUERY_MAX_CONNECTIONS");
        guard.remove("BPM_QUERY_BATCH_SIZE");

        let config = Config::from_env().unwrap();

        assert_eq!(config.database_url, "postgres://localhost/query");
        assert_eq!(config.backend, DatabaseBackend::Postgres);
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.batch_size, 100);
    }

    #[test]
    fn test_config_sqlite_all_custom() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.set("BPM_QUERY_DATABASE_URL", "sqlite:query.db?mode=rwc");
        guard.set("BPM_QUERY_MAX_CONNECTIONS", "2");
        guard.set("BPM_QUERY_BATCH_SIZE", "25");

        let config = Config::from_env().unwrap();

        assert_eq!(config.backend, DatabaseBackend::Sqlite);
        assert_eq!(config.max_connections, 2);
        assert_eq!(config.batch_size, 25);
    }

    #[test]
    fn test_config_missing_database_url() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.remove("BPM_QUERY_DATABASE_URL");

        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Missing("BPM_QUERY_DATABASE_URL")));
        assert!(err.to_string().contains("BPM_QUERY_DATABASE_URL"));
    }

    #[test]
    fn test_config_unknown_scheme() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.set("BPM_QUERY_DATABASE_URL", "mysql://localhost/query");

        let err = Config::from_env().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid("BPM_QUERY_DATABASE_URL", _)
        ));
    }

    #[test]
    fn test_config_invalid_batch_size() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.set("BPM_QUERY_DATABASE_URL", "sqlite::memory:");
        guard.remove("BPM_QUERY_MAX_CONNECTIONS");

        for value in ["abc", "0", "-5"] {
            guard.set("BPM_QUERY_BATCH_SIZE", value);
            let err = Config::from_env().unwrap_err();
            assert!(matches!(err, ConfigError::Invalid("BPM_QUERY_BATCH_SIZE", _)));
        }
    }

    #[test]
    fn test_config_invalid_max_connections() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.set("BPM_QUERY_DATABASE_URL", "sqlite::memory:");
        guard.set("BPM_QUERY_MAX_CONNECTIONS", "many");
        guard.remove("BPM_QUERY_BATCH_SIZE");

        let err = Config::from_env().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid("BPM_QUERY_MAX_CONNECTIONS", _)
        ));
    }

    #[test]
    fn test_backend_detection() {
        assert_eq!(
            DatabaseBackend::from_url("postgresql://db/query"),
            Some(DatabaseBackend::Postgres)
        );
        assert_eq!(
            DatabaseBackend::from_url("sqlite::memory:"),
            Some(DatabaseBackend::Sqlite)
        );
        assert_eq!(DatabaseBackend::from_url("query.db"), None);
    }

    #[test]
    fn test_config_error_display() {
        let missing = ConfigError::Missing("MY_VAR");
        assert_eq!(
            missing.to_string(),
            "missing required environment variable: MY_VAR"
        );

        let invalid = ConfigError::Invalid("MY_VAR", "must be a number");
        assert_eq!(
            invalid.to_string(),
            "invalid value for MY_VAR: must be a number"
        );
    }
}
