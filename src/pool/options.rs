use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rustls::ClientConfig;
use tracing::{debug, error};

use crate::config::ConnectionConfig;

use super::tls;

/// Dial timeout, covering connect plus handshake
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Where the database node listens
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Tcp { host: String, port: u16 },
    Unix(PathBuf),
}

impl Endpoint {
    /// Name presented for TLS server verification
    pub fn tls_server_name(&self) -> String {
        match self {
            Endpoint::Tcp { host, .. } => host.clone(),
            Endpoint::Unix(_) => "localhost".to_string(),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp { host, port } if host.contains(':') => {
                write!(f, "tcp([{}]:{})", host, port)
            }
            Endpoint::Tcp { host, port } => write!(f, "tcp({}:{})", host, port),
            Endpoint::Unix(path) => write!(f, "unix({})", path.display()),
        }
    }
}

/// Which TLS profile the connection uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsProfile {
    /// Verified against the bundled Mozilla root store
    SystemRoots,
    /// Verified against the configured CA
    Custom,
    /// Certificate not verified
    SkipVerify,
}

impl fmt::Display for TlsProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TlsProfile::SystemRoots => "true",
            TlsProfile::Custom => "custom",
            TlsProfile::SkipVerify => "skip-verify",
        };
        f.write_str(name)
    }
}

#[derive(Clone)]
pub struct TlsSettings {
    pub profile: TlsProfile,
    pub config: Arc<ClientConfig>,
}

impl fmt::Debug for TlsSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsSettings")
            .field("profile", &self.profile)
            .finish_non_exhaustive()
    }
}

/// Everything needed to open a session to the node
#[derive(Clone)]
pub struct ConnectOptions {
    pub endpoint: Endpoint,
    pub user: String,
    pub password: String,
    pub tls: Option<TlsSettings>,
    pub connect_timeout: Duration,
}

impl ConnectOptions {
    /// Build connection options from the `[connection]` config section
    ///
    /// TLS material that fails to load is logged and that profile is
    /// skipped; the connection then proceeds with whatever profile was
    /// already selected.
    pub fn from_config(config: &ConnectionConfig) -> Self {
        let endpoint = match &config.unix_socket {
            Some(path) => Endpoint::Unix(path.clone()),
            None => Endpoint::Tcp {
                host: config.host.clone(),
                port: config.port,
            },
        };

        let mut tls_settings = None;

        if config.tls.required {
            match tls::system_roots_config() {
                Ok(client) => {
                    tls_settings = Some(TlsSettings {
                        profile: TlsProfile::SystemRoots,
                        config: Arc::new(client),
                    })
                }
                Err(e) => error!(error = %e, "Failed to build TLS configuration from bundled roots"),
            }
        }

        if let Some(ca) = &config.tls.ca {
            match tls::custom_config(ca, config.tls.cert.as_deref(), config.tls.key.as_deref()) {
                Ok(client) => {
                    tls_settings = Some(TlsSettings {
                        profile: TlsProfile::Custom,
                        config: Arc::new(client),
                    })
                }
                Err(e) => error!(error = %e, "Failed to register custom TLS configuration"),
            }
        }

        if config.tls.skip_verify {
            match tls::skip_verify_config() {
                Ok(client) => {
                    tls_settings = Some(TlsSettings {
                        profile: TlsProfile::SkipVerify,
                        config: Arc::new(client),
                    })
                }
                Err(e) => error!(error = %e, "Failed to build unverified TLS configuration"),
            }
        }

        let options = Self {
            endpoint,
            user: config.user.clone().unwrap_or_default(),
            password: config.password.clone().unwrap_or_default(),
            tls: tls_settings,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        };

        debug!(options = %options, "Constructed connection options");
        options
    }

    pub fn tls_profile(&self) -> Option<TlsProfile> {
        self.tls.as_ref().map(|t| t.profile)
    }
}

/// DSN-style rendering with the password redacted
impl fmt::Display for ConnectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.user)?;
        if !self.password.is_empty() {
            f.write_str(":<redacted>")?;
        }
        write!(f, "@{}/", self.endpoint)?;
        write!(f, "?timeout={}ms", self.connect_timeout.as_millis())?;
        if let Some(profile) = self.tls_profile() {
            write!(f, "&tls={}", profile)?;
        }
        Ok(())
    }
}

impl fmt::Debug for ConnectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectOptions")
            .field("endpoint", &self.endpoint)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("tls", &self.tls)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}
