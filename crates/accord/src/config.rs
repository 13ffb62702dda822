//! Configuration.
//!
//! Explicit construction is the normal path: build a [`ReconcileOptions`]
//! and hand it to [`crate::Accord::new`] with a connection. [`Config`] adds
//! an environment-driven layer on top for binaries:
//!
//! | variable | default |
//! |---|---|
//! | `DATABASE_URL` | required |
//! | `ACCORD_SCHEMA` | `public` |
//! | `ACCORD_MODE` | `lenient` |
//! | `ACCORD_DRY_RUN` | `false` |
//! | `ACCORD_UPSERT` | `atomic-preferred` |
//! | `ACCORD_POOL_SIZE` | `16` |
//! | `ACCORD_CONNECT_TIMEOUT_SECS` | unset |
//! | `ACCORD_STATEMENT_TIMEOUT_MS` | unset |

use std::str::FromStr;
use std::time::Duration;

use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod, Runtime};
use tokio_postgres::NoTls;

use crate::crud::UpsertStrategy;
use crate::error::Error;
use crate::traced::TracedPool;
use crate::Result;

pub const DEFAULT_SCHEMA: &str = "public";
pub const DEFAULT_POOL_SIZE: usize = 16;

/// What to do when the planner reports conflicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Abort before any DDL.
    Strict,
    /// Log the conflicts and carry on.
    #[default]
    Lenient,
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(Mode::Strict),
            "lenient" => Ok(Mode::Lenient),
            other => Err(format!("unknown mode '{other}' (expected strict or lenient)")),
        }
    }
}

/// Options for one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOptions {
    /// Schema the tables live in.
    pub schema: String,
    pub mode: Mode,
    /// Plan and report, but run no DDL.
    pub dry_run: bool,
    /// Strategy given to every bound handle.
    pub upsert: UpsertStrategy,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            schema: DEFAULT_SCHEMA.to_string(),
            mode: Mode::default(),
            dry_run: false,
            upsert: UpsertStrategy::default(),
        }
    }
}

impl ReconcileOptions {
    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    pub fn strict(mut self) -> Self {
        self.mode = Mode::Strict;
        self
    }

    pub fn lenient(mut self) -> Self {
        self.mode = Mode::Lenient;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn upsert(mut self, upsert: UpsertStrategy) -> Self {
        self.upsert = upsert;
        self
    }
}

/// Settings read from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub options: ReconcileOptions,
    pub pool_size: usize,
    pub connect_timeout: Option<Duration>,
    pub statement_timeout: Option<Duration>,
}

impl Config {
    /// Load from the process environment, reading `.env` first if present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let database_url = lookup("DATABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| Error::Config("DATABASE_URL is not set".to_string()))?;

        let mut options = ReconcileOptions::default();
        if let Some(schema) = lookup("ACCORD_SCHEMA") {
            options.schema = accord_schema::normalize_ident(&schema)
                .map_err(|e| Error::Config(format!("ACCORD_SCHEMA: {e}")))?;
        }
        if let Some(mode) = lookup("ACCORD_MODE") {
            options.mode = parse("ACCORD_MODE", &mode)?;
        }
        if let Some(dry_run) = lookup("ACCORD_DRY_RUN") {
            options.dry_run = parse_bool("ACCORD_DRY_RUN", &dry_run)?;
        }
        if let Some(upsert) = lookup("ACCORD_UPSERT") {
            options.upsert = parse("ACCORD_UPSERT", &upsert)?;
        }

        let pool_size = match lookup("ACCORD_POOL_SIZE") {
            Some(v) => parse::<usize>("ACCORD_POOL_SIZE", &v)?,
            None => DEFAULT_POOL_SIZE,
        };
        if pool_size == 0 {
            return Err(Error::Config("ACCORD_POOL_SIZE must be at least 1".to_string()));
        }

        let connect_timeout = lookup("ACCORD_CONNECT_TIMEOUT_SECS")
            .map(|v| parse::<u64>("ACCORD_CONNECT_TIMEOUT_SECS", &v).map(Duration::from_secs))
            .transpose()?;
        let statement_timeout = lookup("ACCORD_STATEMENT_TIMEOUT_MS")
            .map(|v| parse::<u64>("ACCORD_STATEMENT_TIMEOUT_MS", &v).map(Duration::from_millis))
            .transpose()?;

        Ok(Self {
            database_url,
            options,
            pool_size,
            connect_timeout,
            statement_timeout,
        })
    }

    /// The driver configuration for `database_url`, with timeouts applied.
    pub fn pg_config(&self) -> Result<tokio_postgres::Config> {
        let mut pg_config: tokio_postgres::Config = self
            .database_url
            .parse()
            .map_err(|e| Error::Config(format!("DATABASE_URL: {e}")))?;
        if let Some(timeout) = self.connect_timeout {
            pg_config.connect_timeout(timeout);
        }
        if let Some(timeout) = self.statement_timeout {
            pg_config.options(&format!("-c statement_timeout={}", timeout.as_millis()));
        }
        Ok(pg_config)
    }

    /// Build a connection pool. No connection is opened until first use.
    pub fn build_pool(&self) -> Result<TracedPool> {
        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };
        let mgr = Manager::from_config(self.pg_config()?, NoTls, mgr_config);

        let mut builder = Pool::builder(mgr)
            .max_size(self.pool_size)
            .runtime(Runtime::Tokio1);
        if let Some(timeout) = self.connect_timeout {
            builder = builder
                .wait_timeout(Some(timeout))
                .create_timeout(Some(timeout));
        }
        let pool = builder
            .build()
            .map_err(|e| Error::Config(format!("cannot build pool: {e}")))?;

        tracing::debug!(max_size = self.pool_size, "built connection pool");
        Ok(TracedPool::new(pool))
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| Error::Config(format!("{key}: {e}")))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(Error::Config(format!("{key}: expected a boolean, got '{other}'"))),
    }
}
