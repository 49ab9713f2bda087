use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::supervisor::DaemonError;

/// What the control loop should do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Re-read configuration and restart serving
    Reload,
    /// Stop serving and exit
    Terminate,
}

/// Install SIGHUP, SIGINT and SIGTERM handlers and forward them as events
///
/// The returned task runs for the rest of the process. It stops on its own
/// once the receiving side is dropped.
pub fn spawn_signal_listener(
    events: mpsc::Sender<LifecycleEvent>,
) -> Result<JoinHandle<()>, DaemonError> {
    let mut hangup = signal(SignalKind::hangup()).map_err(DaemonError::Signal)?;
    let mut interrupt = signal(SignalKind::interrupt()).map_err(DaemonError::Signal)?;
    let mut terminate = signal(SignalKind::terminate()).map_err(DaemonError::Signal)?;

    Ok(tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                _ = hangup.recv() => {
                    info!("Received SIGHUP");
                    LifecycleEvent::Reload
                }
                _ = interrupt.recv() => {
                    info!("Received SIGINT");
                    LifecycleEvent::Terminate
                }
                _ = terminate.recv() => {
                    info!("Received SIGTERM");
                    LifecycleEvent::Terminate
                }
            };

            if events.send(event).await.is_err() {
                debug!("Control loop has exited; signal listener stopping");
                break;
            }
        }
    }))
}
