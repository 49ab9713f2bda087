//! Daemon control loop
//!
//! Each cycle loads configuration, opens a pool, binds the HTTP listener and
//! serves until a lifecycle event arrives. The server is drained before the
//! pool is closed; a reload then starts the next cycle from scratch.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::{self, Config, ConfigError, HttpConfig};
use crate::health::HealthService;
use crate::pool::{Backend, ConnectionError, ConnectionPool};

use super::http;
use super::signals::{spawn_signal_listener, LifecycleEvent};

/// Upper bound on draining in-flight requests
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

const EVENT_QUEUE_SIZE: usize = 8;

/// Fatal daemon errors
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("Failed to load configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Failed to listen on {addr}: {source}")]
    Bind { addr: String, source: io::Error },
    #[error("Failed to accept HTTP connection: {0}")]
    Accept(io::Error),
    #[error("HTTP server did not drain within {0:?}")]
    ShutdownTimeout(Duration),
    #[error("Failed to close database pool: {0}")]
    Close(ConnectionError),
    #[error("Failed to install signal handler: {0}")]
    Signal(io::Error),
    #[error("Illegal daemon transition {from:?} -> {to:?}")]
    State { from: DaemonState, to: DaemonState },
}

/// Lifecycle phase of the daemon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DaemonState {
    #[default]
    Idle,
    /// Loading config, opening the pool, binding
    Starting,
    Serving,
    /// Draining the server, then closing the pool
    Stopping,
    Terminated,
}

impl DaemonState {
    pub fn can_transition_to(self, next: DaemonState) -> bool {
        use DaemonState::*;
        matches!(
            (self, next),
            (Idle, Starting)
                | (Starting, Serving)
                | (Serving, Stopping)
                | (Stopping, Starting)
                | (Stopping, Terminated)
        )
    }
}

/// Everything one cycle owns: its config and the node handle built from it
pub struct CycleContext {
    pub config: Config,
    pub service: HealthService<ConnectionPool>,
}

impl CycleContext {
    pub fn open(config: Config) -> Self {
        let service = HealthService::open(&config);
        info!(
            dsn = %service.backend().options(),
            available_when_donor = config.options.available_when_donor,
            available_when_readonly = config.options.available_when_readonly,
            "Database pool opened"
        );
        Self { config, service }
    }
}

async fn bind(http: &HttpConfig) -> Result<TcpListener, DaemonError> {
    let addr = match http.addr.parse::<std::net::Ipv6Addr>() {
        Ok(_) => format!("[{}]:{}", http.addr, http.port),
        Err(_) => format!("{}:{}", http.addr, http.port),
    };
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| DaemonError::Bind {
            addr: addr.clone(),
            source,
        })?;
    info!(addr = %addr, path = %http.path, "Health check endpoint listening");
    Ok(listener)
}

pub struct Supervisor {
    config_path: Option<PathBuf>,
    state: DaemonState,
    grace: Duration,
}

impl Supervisor {
    pub fn new(config_path: Option<PathBuf>) -> Self {
        Self {
            config_path,
            state: DaemonState::Idle,
            grace: SHUTDOWN_TIMEOUT,
        }
    }

    #[cfg(test)]
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    #[cfg(test)]
    pub fn state(&self) -> DaemonState {
        self.state
    }

    fn transition(&mut self, next: DaemonState) -> Result<(), DaemonError> {
        if !self.state.can_transition_to(next) {
            return Err(DaemonError::State {
                from: self.state,
                to: next,
            });
        }
        debug!(from = ?self.state, to = ?next, "Daemon state change");
        self.state = next;
        Ok(())
    }

    /// Run cycles until a terminate event arrives
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<LifecycleEvent>,
    ) -> Result<(), DaemonError> {
        loop {
            self.transition(DaemonState::Starting)?;
            let cycle = CycleContext::open(config::load(self.config_path.as_deref())?);
            let listener = bind(&cycle.config.http).await?;

            let event = self
                .serve_cycle(listener, cycle.service, &cycle.config.http.path, &mut events)
                .await?;

            match event {
                LifecycleEvent::Reload => info!("Reloading configuration"),
                LifecycleEvent::Terminate => {
                    self.transition(DaemonState::Terminated)?;
                    info!("Daemon stopped");
                    return Ok(());
                }
            }
        }
    }

    /// Serve one cycle and tear it down once an event arrives
    ///
    /// Returns the event that ended the cycle, or a terminate that queued up
    /// behind it while draining. The backend is closed only after the HTTP
    /// server has fully drained.
    async fn serve_cycle<B: Backend>(
        &mut self,
        listener: TcpListener,
        service: HealthService<B>,
        path: &str,
        events: &mut mpsc::Receiver<LifecycleEvent>,
    ) -> Result<LifecycleEvent, DaemonError> {
        self.transition(DaemonState::Serving)?;

        let shutdown = CancellationToken::new();
        let router = http::build_router(service.clone(), path);
        let server = http::serve(listener, router, shutdown.clone(), self.grace);
        tokio::pin!(server);

        let (finished, event) = tokio::select! {
            result = &mut server => (Some(result), LifecycleEvent::Terminate),
            event = events.recv() => (None, event.unwrap_or(LifecycleEvent::Terminate)),
        };

        self.transition(DaemonState::Stopping)?;
        let served = match finished {
            Some(result) => result,
            None => {
                info!(event = ?event, "Stopping HTTP server");
                shutdown.cancel();
                server.await
            }
        };
        served?;

        service.close().await.map_err(DaemonError::Close)?;
        debug!("Database pool closed");
        Ok(coalesce(event, events))
    }
}

/// Fold events queued during teardown into `event`; terminate wins
fn coalesce(
    mut event: LifecycleEvent,
    events: &mut mpsc::Receiver<LifecycleEvent>,
) -> LifecycleEvent {
    while let Ok(next) = events.try_recv() {
        debug!(event = ?next, "Coalescing queued lifecycle event");
        if next == LifecycleEvent::Terminate {
            event = next;
        }
    }
    event
}

/// Run the daemon with signal handling until SIGINT or SIGTERM
pub async fn run_daemon(config_path: Option<PathBuf>) -> Result<(), DaemonError> {
    let (tx, rx) = mpsc::channel(EVENT_QUEUE_SIZE);
    let _signals = spawn_signal_listener(tx)?;
    Supervisor::new(config_path).run(rx).await
}
