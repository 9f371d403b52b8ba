//! Client options.
//!
//! Precedence: explicit file > `SCOOP_CONFIG` file > `SCOOP_*` environment
//! variables > defaults. A value set by a higher layer is never overwritten by a
//! lower one.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::errors::DbError;

pub const DEFAULT_ADDRESS: &str = "localhost";
pub const DEFAULT_PORT: u16 = 27017;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 200;

#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientOptions {
    pub address: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub max_pool_size: Option<u32>,
    pub min_pool_size: Option<u32>,
    pub connect_timeout_ms: Option<u64>,
    /// Default per-operation timeout handed to the driver when a builder sets none.
    pub operation_timeout_ms: Option<u64>,
    /// How long a watch loop blocks per poll.
    pub poll_interval_ms: Option<u64>,
}

impl fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientOptions")
            .field("address", &self.address)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("max_pool_size", &self.max_pool_size)
            .field("min_pool_size", &self.min_pool_size)
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .field("operation_timeout_ms", &self.operation_timeout_ms)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .finish()
    }
}

impl ClientOptions {
    /// Parses options from TOML text.
    ///
    /// # Errors
    /// Returns `DbError::Config` when the text is not valid TOML for these options.
    pub fn from_toml_str(s: &str) -> Result<Self, DbError> {
        Ok(toml::from_str(s)?)
    }

    /// Reads options from a TOML file.
    ///
    /// # Errors
    /// Returns `DbError::Io` when the file cannot be read, `DbError::Config` when it
    /// does not parse.
    pub fn from_file(path: &Path) -> Result<Self, DbError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Layers file and environment sources over the defaults.
    ///
    /// # Errors
    /// Fails when an explicitly given file cannot be read or parsed. A missing or
    /// broken `SCOOP_CONFIG` file is logged and skipped.
    pub fn load(explicit: Option<&Path>) -> Result<Self, DbError> {
        let mut cfg = match explicit {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        if let Ok(p) = std::env::var("SCOOP_CONFIG") {
            let path = PathBuf::from(p);
            match Self::from_file(&path) {
                Ok(file_cfg) => cfg.fill_from(file_cfg),
                Err(e) => log::warn!("ignoring config file {}: {e}", path.display()),
            }
        }
        cfg.fill_from(Self::from_env_with(|k| std::env::var(k).ok()));
        Ok(cfg)
    }

    /// Options from `SCOOP_*` variables looked up through `get`. Unparseable
    /// numbers are logged and left unset.
    pub fn from_env_with(get: impl Fn(&str) -> Option<String>) -> Self {
        fn number<T: std::str::FromStr>(key: &str, raw: Option<String>) -> Option<T> {
            let raw = raw?;
            match raw.trim().parse() {
                Ok(v) => Some(v),
                Err(_) => {
                    log::warn!("ignoring {key}={raw}: not a number");
                    None
                }
            }
        }
        Self {
            address: get("SCOOP_ADDRESS"),
            port: number("SCOOP_PORT", get("SCOOP_PORT")),
            database: get("SCOOP_DATABASE"),
            username: get("SCOOP_USERNAME"),
            password: get("SCOOP_PASSWORD"),
            max_pool_size: number("SCOOP_MAX_POOL_SIZE", get("SCOOP_MAX_POOL_SIZE")),
            min_pool_size: number("SCOOP_MIN_POOL_SIZE", get("SCOOP_MIN_POOL_SIZE")),
            connect_timeout_ms: number("SCOOP_CONNECT_TIMEOUT_MS", get("SCOOP_CONNECT_TIMEOUT_MS")),
            operation_timeout_ms: number("SCOOP_OPERATION_TIMEOUT_MS", get("SCOOP_OPERATION_TIMEOUT_MS")),
            poll_interval_ms: number("SCOOP_POLL_INTERVAL_MS", get("SCOOP_POLL_INTERVAL_MS")),
        }
    }

    /// Fills every unset field from `other`.
    pub fn fill_from(&mut self, other: Self) {
        macro_rules! fill {
            ($($f:ident),*) => { $( if self.$f.is_none() { self.$f = other.$f; } )* };
        }
        fill!(
            address,
            port,
            database,
            username,
            password,
            max_pool_size,
            min_pool_size,
            connect_timeout_ms,
            operation_timeout_ms,
            poll_interval_ms
        );
    }

    #[must_use]
    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS))
    }

    /// Connection string; credentials are included only when a username is set.
    #[must_use]
    pub fn uri(&self) -> String {
        let host = self.address.as_deref().unwrap_or(DEFAULT_ADDRESS);
        let port = self.port.unwrap_or(DEFAULT_PORT);
        let auth = match (&self.username, &self.password) {
            (Some(u), Some(p)) => format!("{u}:{p}@"),
            (Some(u), None) => format!("{u}@"),
            _ => String::new(),
        };
        let db = self.database.as_deref().unwrap_or("");
        let mut params = Vec::new();
        if let Some(n) = self.max_pool_size {
            params.push(format!("maxPoolSize={n}"));
        }
        if let Some(n) = self.min_pool_size {
            params.push(format!("minPoolSize={n}"));
        }
        if let Some(n) = self.connect_timeout_ms {
            params.push(format!("connectTimeoutMS={n}"));
        }
        let query = if params.is_empty() { String::new() } else { format!("?{}", params.join("&")) };
        format!("mongodb://{auth}{host}:{port}/{db}{query}")
    }
}
