//! vstream-ingest configuration
//!
//! The core recognizes a single tunable: the store connection. Everything
//! else (grace interval, retry policy, missing-sequence cap) is a fixed
//! constant. Bind address is server plumbing, settable per deployment.

/// Ingest service configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Store location: SQLite URL or filesystem path
    pub store_connection: String,
    /// Host address to bind the HTTP server to
    pub host: String,
    /// Port to bind the HTTP server to
    pub port: u16,
}

impl Config {
    /// Resolve configuration from explicit overrides and the environment.
    ///
    /// Precedence for the store connection: CLI argument, then the
    /// `VSTREAM_STORE_CONNECTION` environment variable, then `vstream.db`
    /// in the working directory.
    pub fn resolve(store_connection: Option<String>, host: Option<String>, port: Option<u16>) -> Self {
        let store_connection = store_connection
            .or_else(|| std::env::var("VSTREAM_STORE_CONNECTION").ok())
            .unwrap_or_else(|| "vstream.db".to_string());

        Self {
            store_connection,
            host: host.unwrap_or_else(|| "0.0.0.0".to_string()),
            port: port.unwrap_or(8000),
        }
    }
}
