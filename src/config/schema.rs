use std::path::PathBuf;

use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Target database node
    pub connection: ConnectionConfig,
    /// HTTP responder (daemon mode only)
    pub http: HttpConfig,
    /// Availability policy knobs
    pub options: OptionsConfig,
}

// ============================================================================
// Connection Configuration
// ============================================================================

/// How to reach and authenticate against the database node
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Hostname or IP
    pub host: String,
    /// Port number
    pub port: u16,
    /// MySQL username
    pub user: Option<String>,
    /// MySQL password
    pub password: Option<String>,
    /// Unix socket path; takes precedence over host/port when set
    pub unix_socket: Option<PathBuf>,
    pub tls: TlsConfig,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    3306
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            user: None,
            password: None,
            unix_socket: None,
            tls: TlsConfig::default(),
        }
    }
}

/// TLS settings for the database connection
///
/// When several are set, the later one in this list wins:
/// `required`, `ca`, `skip-verify`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    /// Require TLS, verified against the bundled Mozilla root store
    pub required: bool,
    /// Require TLS but accept any server certificate
    #[serde(rename = "skip-verify")]
    pub skip_verify: bool,
    /// CA bundle (PEM) to verify the server against
    pub ca: Option<PathBuf>,
    /// Client certificate chain (PEM)
    pub cert: Option<PathBuf>,
    /// Client private key (PEM)
    pub key: Option<PathBuf>,
}

// ============================================================================
// HTTP Configuration
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Listen address
    pub addr: String,
    /// Listen port
    pub port: u16,
    /// Health check URI path
    pub path: String,
}

fn default_http_addr() -> String {
    "::".to_string()
}

fn default_http_port() -> u16 {
    5678
}

fn default_http_path() -> String {
    "/".to_string()
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            addr: default_http_addr(),
            port: default_http_port(),
            path: default_http_path(),
        }
    }
}

impl HttpConfig {
    /// Ensure the health check path starts with a slash
    pub fn normalize_path(&mut self) {
        if self.path.is_empty() {
            self.path = default_http_path();
        } else if !self.path.starts_with('/') {
            self.path.insert(0, '/');
        }
    }
}

// ============================================================================
// Options
// ============================================================================

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct OptionsConfig {
    /// Report a node in Donor state as available
    pub available_when_donor: bool,
    /// Report a read-only node as available
    pub available_when_readonly: bool,
}
