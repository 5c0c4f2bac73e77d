use assert_cmd::Command;
use serde_json::Value;

/// Runs `gatehouse` with a config path that does not exist, so the user's
/// own config never leaks into the test.
fn gatehouse(dir: &tempfile::TempDir) -> Command {
    let mut cmd = Command::cargo_bin("gatehouse").unwrap();
    cmd.arg("--config").arg(dir.path().join("absent.toml"));
    cmd
}

fn simulate_json(args: &[&str]) -> Value {
    let dir = tempfile::tempdir().unwrap();
    let output = gatehouse(&dir).arg("simulate").arg("--json").args(args).output().unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn simulate_connects_over_the_only_allowed_transport() {
    let report = simulate_json(&[
        "--deny-transport",
        "ws",
        "--deny-transport",
        "quic",
        "--deny-transport",
        "quic-v1",
        "--deny-transport",
        "webtransport",
    ]);

    assert_eq!(report["outcome"]["status"], "connected");
    assert_eq!(report["outcome"]["transport"], "tcp");
    let dialed: Vec<&Value> = report["candidates"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|c| c["dialed"] == true)
        .collect();
    assert_eq!(dialed.len(), 1);
    assert_eq!(dialed[0]["transport"], "tcp");
    assert_eq!(report["stats"]["addr_dial_denied"], 4);
}

#[test]
fn simulate_reports_peer_denial() {
    let report = simulate_json(&["--deny-peer"]);
    assert_eq!(report["outcome"]["status"], "policy_denied");
    assert_eq!(report["checkpoints"], serde_json::json!(["peer-dial"]));
    assert!(report["candidates"]
        .as_array()
        .unwrap()
        .iter()
        .all(|c| c["dialed"] == false));
}

#[test]
fn simulate_reports_upgrade_reason() {
    let report = simulate_json(&["--addr", "/ip4/127.0.0.1/tcp/0", "--deny-upgraded", "9"]);
    assert_eq!(report["outcome"]["status"], "policy_denied");
    assert!(report["outcome"]["error"].as_str().unwrap().contains("reason 9"));
    assert_eq!(report["stats"]["upgraded_denied"], 1);
}

#[test]
fn invalid_config_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[dial]\nmax_parallel_dials = 0\n").unwrap();

    let mut cmd = Command::cargo_bin("gatehouse").unwrap();
    cmd.arg("--config").arg(&path).arg("simulate");
    cmd.assert().failure();
}

#[test]
fn transports_lists_every_address() {
    let dir = tempfile::tempdir().unwrap();
    let output = gatehouse(&dir)
        .args(["transports", "--json", "/ip4/1.2.3.4/udp/1/quic-v1/webtransport", "/ip4/1.2.3.4/udp/1"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let rows: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(rows[0]["transport"], "webtransport");
    assert!(rows[1]["transport"].is_null());
}
