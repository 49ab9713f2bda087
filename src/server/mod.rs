//! Daemon mode: HTTP responder, signal handling and the reload loop

mod http;
mod signals;
mod supervisor;

pub use supervisor::{run_daemon, CycleContext};
