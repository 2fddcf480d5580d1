//! Connection configuration for storage backends.
//!
//! A [`ConnectionConfig`] is an explicit value handed to a backend builder. There is no
//! process-wide connection: each [`DocumentStore`](crate::store::DocumentStore) owns the
//! backend it was built with.

use serde::{Deserialize, Serialize};

use crate::error::DocumentStoreResult;

/// Where and as whom to connect.
///
/// # Example
///
/// ```ignore
/// use polydoc::config::ConnectionConfig;
///
/// let config = ConnectionConfig::from_json(r#"{
///     "dsn": "mongodb://localhost:27017",
///     "database": "blog"
/// }"#)?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Backend connection string.
    pub dsn: String,
    /// Name of the database every collection lives in.
    pub database: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl ConnectionConfig {
    /// Connection settings without credentials.
    pub fn new(dsn: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            dsn: dsn.into(),
            database: database.into(),
            username: None,
            password: None,
        }
    }

    /// Adds a username and password.
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Parses a configuration from a JSON document.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the JSON is malformed or misses `dsn`/`database`.
    pub fn from_json(json: &str) -> DocumentStoreResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Returns the credentials only when both a username and a password are set.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.username, &self.password) {
            (Some(username), Some(password)) => Some((username.as_str(), password.as_str())),
            _ => None,
        }
    }
}
