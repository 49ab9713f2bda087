//! Binary-level tests that need no database

use std::thread;
use std::time::{Duration, Instant};

use crate::{
    binary, free_port, run_standalone, try_http_get, unreachable_node, write_config, Daemon,
};

#[test]
fn test_version_flag() {
    let output = binary().arg("-V").output().unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.starts_with("mysql-healthcheck version "), "{stdout}");
    assert!(stdout.contains(", compiled for "));
}

#[test]
fn test_standalone_unreachable_exits_1() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), &unreachable_node().toml(free_port(), ""));

    let output = run_standalone(&config);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_standalone_bad_config_fails() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "[connection\nport = ");

    let output = run_standalone(&config);
    assert!(!output.status.success());
}

#[test]
fn test_daemon_serves_and_terminates() {
    let dir = tempfile::tempdir().unwrap();
    let port = free_port();
    let config = write_config(dir.path(), &unreachable_node().toml(port, ""));

    let daemon = Daemon::spawn(&config, port);

    let response = daemon.get("/");
    assert!(response.starts_with("HTTP/1.1 503"), "{response}");
    assert!(response.to_ascii_lowercase().contains("connection: close"));
    assert!(response.ends_with("Could not connect to the MySQL cluster node."));

    let response = daemon.get("/status");
    assert!(response.starts_with("HTTP/1.1 404"), "{response}");
    assert!(response.ends_with("404 page not found\n"));

    assert_eq!(daemon.stop(), Some(0));
}

#[test]
fn test_daemon_reload_applies_new_path() {
    let dir = tempfile::tempdir().unwrap();
    let port = free_port();
    let node = unreachable_node();
    let config = write_config(dir.path(), &node.toml(port, ""));

    let daemon = Daemon::spawn(&config, port);
    assert!(daemon.get("/check").starts_with("HTTP/1.1 404"));

    let reloaded = node.toml(port, "").replace("path = \"/\"", "path = \"/check\"");
    write_config(dir.path(), &reloaded);
    daemon.signal("HUP");

    // Wait for the next cycle to pick up the new path
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let response = try_http_get(port, "/check");
        if matches!(&response, Some(r) if r.starts_with("HTTP/1.1 503")) {
            break;
        }
        assert!(Instant::now() < deadline, "Reload never applied");
        thread::sleep(Duration::from_millis(50));
    }

    assert_eq!(daemon.stop(), Some(0));
}
