//! Network configuration types for the domain directory server.

use std::path::PathBuf;
use std::time::Duration;

/// Default mount point of the domain directory.
pub const DEFAULT_DIRECTORY_PATH: &str = "/xend/domain";

/// Top-level network configuration for the server.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Bind address for the server.
    pub host: String,
    /// Port to listen on. 0 means OS-assigned.
    pub port: u16,
    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,
    /// Allowed CORS origins.
    pub cors_origins: Vec<String>,
    /// Maximum time to wait for a request to complete. Kept above the restore
    /// timeout so a slow restore reports its own timeout first.
    pub request_timeout: Duration,
    /// Largest accepted request body, uploads included.
    pub max_body_bytes: usize,
    /// Path the domain directory is served under.
    pub directory_path: String,
}

impl NetworkConfig {
    /// The directory path normalized to a leading slash and no trailing one.
    #[must_use]
    pub fn directory_route(&self) -> String {
        let trimmed = self.directory_path.trim_matches('/');
        if trimmed.is_empty() {
            String::new()
        } else {
            format!("/{trimmed}")
        }
    }

    #[must_use]
    pub fn scheme(&self) -> &'static str {
        if self.tls.is_some() {
            "https"
        } else {
            "http"
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 0,
            tls: None,
            cors_origins: vec!["*".to_string()],
            request_timeout: Duration::from_secs(330),
            max_body_bytes: 4 * 1024 * 1024, // 4 MB
            directory_path: DEFAULT_DIRECTORY_PATH.to_string(),
        }
    }
}

/// TLS certificate configuration.
///
/// No `Default` impl because certificate paths have no sensible defaults.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// Path to the TLS certificate file.
    pub cert_path: PathBuf,
    /// Path to the TLS private key file.
    pub key_path: PathBuf,
}
