//! Integration test entry point
//!
//! The `cli` tests drive the built binary and need nothing else. The `node`
//! tests talk to a real Galera node and are skipped unless enabled.
//!
//! Run with: HEALTHCHECK_RUN_INTEGRATION_TESTS=1 cargo test --test integration
//!
//! Environment variables:
//! - HEALTHCHECK_RUN_INTEGRATION_TESTS: Set to "1" to enable node tests
//! - HEALTHCHECK_TEST_MYSQL_HOST: Node host (default: 127.0.0.1)
//! - HEALTHCHECK_TEST_MYSQL_PORT: Node port (default: 3306)
//! - HEALTHCHECK_TEST_MYSQL_USER: Monitoring user (default: root)
//! - HEALTHCHECK_TEST_MYSQL_PASS: Monitoring password (default: empty)

mod cli;
mod node;

use std::env;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output};
use std::thread;
use std::time::{Duration, Instant};

/// Check if integration tests should run
pub fn should_run_integration_tests() -> bool {
    env::var("HEALTHCHECK_RUN_INTEGRATION_TESTS")
        .map(|v| v == "1")
        .unwrap_or(false)
}

/// Skip test if integration tests are not enabled
#[macro_export]
macro_rules! skip_if_not_enabled {
    () => {
        if !crate::should_run_integration_tests() {
            eprintln!("Skipping integration test (set HEALTHCHECK_RUN_INTEGRATION_TESTS=1 to run)");
            return;
        }
    };
}

/// Node connection settings from the environment
#[derive(Debug, Clone)]
pub struct NodeTestConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
}

pub fn get_node_config() -> NodeTestConfig {
    NodeTestConfig {
        host: env::var("HEALTHCHECK_TEST_MYSQL_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
        port: env::var("HEALTHCHECK_TEST_MYSQL_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3306),
        user: env::var("HEALTHCHECK_TEST_MYSQL_USER").unwrap_or_else(|_| "root".to_string()),
        password: env::var("HEALTHCHECK_TEST_MYSQL_PASS").unwrap_or_default(),
    }
}

impl NodeTestConfig {
    /// Render a config file pointing at this node, plus any extra TOML
    pub fn toml(&self, http_port: u16, extra: &str) -> String {
        format!(
            "[connection]\nhost = {:?}\nport = {}\nuser = {:?}\npassword = {:?}\n\n\
             [http]\naddr = \"127.0.0.1\"\nport = {}\npath = \"/\"\n\n{}",
            self.host, self.port, self.user, self.password, http_port, extra
        )
    }
}

/// Settings for a node that refuses connections
pub fn unreachable_node() -> NodeTestConfig {
    NodeTestConfig {
        host: "127.0.0.1".to_string(),
        port: free_port(),
        user: "monitor".to_string(),
        password: String::new(),
    }
}

/// A local port nothing is listening on
pub fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind scratch port");
    listener.local_addr().unwrap().port()
}

pub fn write_config(dir: &Path, contents: &str) -> PathBuf {
    let path = dir.join("mysql-healthcheck.toml");
    std::fs::write(&path, contents).expect("Failed to write config");
    path
}

pub fn binary() -> Command {
    Command::new(env!("CARGO_BIN_EXE_mysql-healthcheck"))
}

/// Run a one-shot check with the given config file
pub fn run_standalone(config: &Path) -> Output {
    binary()
        .arg("-c")
        .arg(config)
        .output()
        .expect("Failed to run mysql-healthcheck")
}

/// Daemon child process, terminated on drop
pub struct Daemon {
    child: Option<Child>,
    pub port: u16,
}

impl Daemon {
    pub fn spawn(config: &Path, port: u16) -> Self {
        let child = binary()
            .arg("-d")
            .arg("-c")
            .arg(config)
            .spawn()
            .expect("Failed to start daemon");
        let daemon = Self {
            child: Some(child),
            port,
        };
        daemon.wait_until_listening();
        daemon
    }

    fn wait_until_listening(&self) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while TcpStream::connect(("127.0.0.1", self.port)).is_err() {
            assert!(Instant::now() < deadline, "Daemon never started listening");
            thread::sleep(Duration::from_millis(50));
        }
    }

    /// Send a signal by name and return once it is delivered
    pub fn signal(&self, name: &str) {
        let pid = self.child.as_ref().expect("Daemon already stopped").id();
        let status = Command::new("kill")
            .arg(format!("-{name}"))
            .arg(pid.to_string())
            .status()
            .expect("Failed to run kill");
        assert!(status.success());
    }

    /// Terminate and wait for exit, returning the exit code
    pub fn stop(mut self) -> Option<i32> {
        self.signal("TERM");
        let mut child = self.child.take().unwrap();
        child.wait().expect("Failed to wait for daemon").code()
    }

    pub fn get(&self, path: &str) -> String {
        http_get(self.port, path)
    }
}

impl Drop for Daemon {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Issue one raw HTTP/1.1 GET and return the whole response
pub fn try_http_get(port: u16, path: &str) -> Option<String> {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).ok()?;
    stream
        .set_read_timeout(Some(Duration::from_secs(10)))
        .ok()?;
    write!(stream, "GET {path} HTTP/1.1\r\nHost: localhost\r\n\r\n").ok()?;
    let mut response = String::new();
    stream.read_to_string(&mut response).ok()?;
    Some(response)
}

pub fn http_get(port: u16, path: &str) -> String {
    try_http_get(port, path).expect("Health check request failed")
}
