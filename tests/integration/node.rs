//! Tests against a real, synced and writable Galera node

use crate::{
    free_port, get_node_config, run_standalone, skip_if_not_enabled, write_config, Daemon,
};

#[test]
fn test_standalone_synced_node_is_available() {
    skip_if_not_enabled!();

    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), &get_node_config().toml(free_port(), ""));

    let output = run_standalone(&config);
    assert_eq!(output.status.code(), Some(0));
}

#[test]
fn test_standalone_wrong_password_is_unavailable() {
    skip_if_not_enabled!();

    let mut node = get_node_config();
    node.password = format!("{}-wrong", node.password);
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), &node.toml(free_port(), ""));

    let output = run_standalone(&config);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_daemon_reports_ready() {
    skip_if_not_enabled!();

    let dir = tempfile::tempdir().unwrap();
    let port = free_port();
    let config = write_config(dir.path(), &get_node_config().toml(port, ""));

    let daemon = Daemon::spawn(&config, port);
    for _ in 0..3 {
        let response = daemon.get("/");
        assert!(response.starts_with("HTTP/1.1 200"), "{response}");
        assert!(response.ends_with("MySQL cluster node is ready."));
    }
    assert_eq!(daemon.stop(), Some(0));
}

#[test]
fn test_daemon_with_required_tls() {
    skip_if_not_enabled!();

    let dir = tempfile::tempdir().unwrap();
    let port = free_port();
    let extra = "[connection.tls]\nrequired = true\nskip-verify = true\n";
    let config = write_config(dir.path(), &get_node_config().toml(port, extra));

    let daemon = Daemon::spawn(&config, port);
    let response = daemon.get("/");
    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    assert_eq!(daemon.stop(), Some(0));
}
