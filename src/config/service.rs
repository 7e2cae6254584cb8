//! Service configuration: queue policy, worker parallelism and ledger location.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::AppResult;

/// Admission queue strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueuePolicy {
    /// One shared bounded FIFO buffer drained by every worker.
    Fifo,
    /// `parallelism` bounded priority buckets, one per worker.
    Priority,
}

/// Built-in configuration profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    /// Small limits, local database file.
    Test,
    /// Production limits, `/database` volume.
    Production,
}

impl Profile {
    /// Map an environment name to a profile. Anything but `prod`/`production`
    /// selects the test profile.
    #[must_use]
    pub fn from_env_name(name: Option<&str>) -> Self {
        match name.map(str::trim) {
            Some(n) if n.eq_ignore_ascii_case("prod") || n.eq_ignore_ascii_case("production") => {
                Self::Production
            }
            _ => Self::Test,
        }
    }
}

/// Service configuration, immutable for the lifetime of a service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service name used in logs.
    pub service: String,
    /// Queue policy.
    pub policy: QueuePolicy,
    /// Number of workers (and of buckets under the priority policy).
    pub parallelism: usize,
    /// Queue capacity (per bucket under the priority policy).
    pub queue_size: usize,
    /// Blocking window for enqueue and dequeue, in milliseconds.
    pub queue_block_timeout_ms: u64,
    /// Directory holding the ledger database.
    pub db_path: PathBuf,
    /// Ledger database name, without extension.
    pub db_name: String,
    /// Ledger table name.
    pub table_name: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::for_profile(Profile::Test)
    }
}

impl ServiceConfig {
    /// Configuration for a built-in profile.
    #[must_use]
    pub fn for_profile(profile: Profile) -> Self {
        match profile {
            Profile::Test => Self {
                service: "calculator".into(),
                policy: QueuePolicy::Fifo,
                parallelism: 1,
                queue_size: 10,
                queue_block_timeout_ms: 2_000,
                db_path: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
                db_name: "calculator_dev".into(),
                table_name: "computation_dev".into(),
            },
            Profile::Production => Self {
                service: "calculator".into(),
                policy: QueuePolicy::Fifo,
                parallelism: 3,
                queue_size: 500,
                queue_block_timeout_ms: 60_000,
                db_path: PathBuf::from("/database"),
                db_name: "calculator".into(),
                table_name: "computation".into(),
            },
        }
    }

    /// Set the queue policy.
    #[must_use]
    pub const fn with_policy(mut self, policy: QueuePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the worker count.
    #[must_use]
    pub const fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    /// Set the queue capacity.
    #[must_use]
    pub const fn with_queue_size(mut self, queue_size: usize) -> Self {
        self.queue_size = queue_size;
        self
    }

    /// Set the enqueue/dequeue blocking window.
    #[must_use]
    pub fn with_queue_block_timeout(mut self, timeout: Duration) -> Self {
        self.queue_block_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the ledger directory.
    #[must_use]
    pub fn with_db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.db_path = path.into();
        self
    }

    /// Set the ledger database name.
    #[must_use]
    pub fn with_db_name(mut self, name: impl Into<String>) -> Self {
        self.db_name = name.into();
        self
    }

    /// Set the ledger table name.
    #[must_use]
    pub fn with_table_name(mut self, name: impl Into<String>) -> Self {
        self.table_name = name.into();
        self
    }

    /// Blocking window as a `Duration`.
    #[must_use]
    pub const fn queue_block_timeout(&self) -> Duration {
        Duration::from_millis(self.queue_block_timeout_ms)
    }

    /// Path of the ledger database file.
    #[must_use]
    pub fn ledger_file(&self) -> PathBuf {
        self.db_path.join(format!("{}.db", self.db_name))
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.parallelism == 0 {
            return Err("parallelism must be greater than 0".into());
        }
        if self.queue_size == 0 {
            return Err("queue_size must be greater than 0".into());
        }
        if self.queue_block_timeout_ms == 0 {
            return Err("queue_block_timeout_ms must be greater than 0".into());
        }
        if self.db_name.trim().is_empty() {
            return Err("db_name must not be empty".into());
        }
        if !is_sql_identifier(&self.table_name) {
            return Err(format!(
                "table_name `{}` must match [A-Za-z_][A-Za-z0-9_]*",
                self.table_name
            ));
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns a parse or validation message.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Build configuration from the process environment.
    ///
    /// Loads `.env` if present, selects the profile from `CALCULATOR_ENV`
    /// and applies `CALCULATOR_*` overrides.
    ///
    /// # Errors
    ///
    /// Fails on an unparsable override or an invalid result.
    pub fn from_env() -> AppResult<Self> {
        let _ = dotenvy::dotenv();
        let profile = Profile::from_env_name(env::var("CALCULATOR_ENV").ok().as_deref());
        let mut cfg = Self::for_profile(profile);

        if let Ok(policy) = env::var("CALCULATOR_POLICY") {
            cfg.policy = match policy.trim().to_ascii_lowercase().as_str() {
                "fifo" => QueuePolicy::Fifo,
                "priority" => QueuePolicy::Priority,
                other => anyhow::bail!("CALCULATOR_POLICY `{other}` is not fifo or priority"),
            };
        }
        match env::var("CALCULATOR_PARALLELISM") {
            Ok(raw) if raw.trim().eq_ignore_ascii_case("auto") => {
                cfg.parallelism = default_parallelism();
            }
            _ => {
                if let Some(v) = parse_env("CALCULATOR_PARALLELISM")? {
                    cfg.parallelism = v;
                }
            }
        }
        if let Some(v) = parse_env("CALCULATOR_QUEUE_SIZE")? {
            cfg.queue_size = v;
        }
        if let Some(v) = parse_env("CALCULATOR_QUEUE_TIMEOUT_MS")? {
            cfg.queue_block_timeout_ms = v;
        }
        if let Ok(v) = env::var("CALCULATOR_DB_PATH") {
            cfg.db_path = PathBuf::from(v);
        }
        if let Ok(v) = env::var("CALCULATOR_DB_NAME") {
            cfg.db_name = v;
        }
        if let Ok(v) = env::var("CALCULATOR_TABLE_NAME") {
            cfg.table_name = v;
        }

        cfg.validate().map_err(anyhow::Error::msg)?;
        Ok(cfg)
    }
}

fn parse_env<T>(key: &str) -> AppResult<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{key}=`{raw}`: {e}")),
        Err(_) => Ok(None),
    }
}

/// Worker count used for `CALCULATOR_PARALLELISM=auto`: one per physical
/// core, at least one.
#[must_use]
pub fn default_parallelism() -> usize {
    num_cpus::get_physical().max(1)
}

/// Whether `name` can be spliced into SQL as a bare identifier.
#[must_use]
pub fn is_sql_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
