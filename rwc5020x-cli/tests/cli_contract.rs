//! Integration tests for core CLI contract behavior.

use {
    predicates::prelude::*,
    std::{
        fs,
        net::UdpSocket,
        path::{Path, PathBuf},
        thread,
        time::Duration,
    },
    tempfile::{TempDir, tempdir},
};

fn cli_cmd() -> assert_cmd::Command {
    assert_cmd::cargo::cargo_bin_cmd!("rwc5020x")
}

/// Command isolated from the caller's environment and config files.
fn isolated_cmd(dir: &Path) -> assert_cmd::Command {
    let config = dir.join("config.toml");
    if !config.exists() {
        fs::write(&config, "").expect("config should be written");
    }
    let mut cmd = cli_cmd();
    cmd.current_dir(dir)
        .env_remove("RWC5020X_SERIAL")
        .env_remove("RWC5020X_UDP")
        .env_remove("RWC5020X_FIRMWARE")
        .env("NO_COLOR", "1")
        .arg("--config")
        .arg(config);
    cmd
}

/// Config with every sequence pause disabled.
fn fast_config(dir: &TempDir) -> PathBuf {
    let path = dir
        .path()
        .join("config.toml");
    fs::write(
        &path,
        "[connection]\ntimeout_ms = 2000\n\n[sequence]\npoll_interval_ms = 0\nsettle_ms = 0\nlink_retry_ms = 0\nmax_polls = 5\n",
    )
    .expect("config should be written");
    path
}

/// Loopback UDP tester stub; `reply` maps each received line (without the
/// newline) to the reply line, `None` stays silent.
fn spawn_stub<F>(mut reply: F) -> String
where
    F: FnMut(&str) -> Option<String> + Send + 'static,
{
    let socket = UdpSocket::bind("127.0.0.1:0").expect("stub should bind");
    socket
        .set_read_timeout(Some(Duration::from_secs(20)))
        .expect("timeout should be set");
    let addr = socket
        .local_addr()
        .expect("stub should have an address")
        .to_string();

    thread::spawn(move || {
        let mut buf = [0u8; 1024];
        while let Ok((n, peer)) = socket.recv_from(&mut buf) {
            let line = String::from_utf8_lossy(&buf[..n])
                .trim_end()
                .to_string();
            if let Some(answer) = reply(&line) {
                let _ = socket.send_to(format!("{answer}\r\n").as_bytes(), peer);
            }
        }
    });
    addr
}

/// Stub that plays a cooperative DUT for the certification scenarios.
fn spawn_dut() -> String {
    let mut command = String::new();
    let mut reads = 0usize;
    spawn_stub(move |line| {
        if let Some(arg) = line.strip_prefix("CONF:LINK:INSTANT_MAC_CMD 1,") {
            command = arg.to_string();
        } else if line == "EXEC:LINK:MSG_RESET" {
            reads = 0;
        } else if line == "READ:LINK:ACTIVATION?" {
            return Some("YES".to_string());
        } else if line == "READ:LINK:MSG?" {
            let (request, response) = match command.as_str() {
                "ACTIVATE_TM" => ("ActivateTM", "DlCounter"),
                "TRIGGER_JOIN_REQ_TM" => ("TriggerJoinReq", "Join-request"),
                _ => ("EchoRequest", "EchoResponse"),
            };
            let tag = if reads == 0 { request } else { response };
            reads += 1;
            let mut fields: Vec<String> = (0..19)
                .map(|i| format!("f{i}"))
                .collect();
            fields[0] = "Up".to_string();
            fields[17] = tag.to_string();
            return Some(fields.join("\t"));
        }
        Some("ACK".to_string())
    })
}

#[test]
fn help_exits_zero_and_writes_stdout_only() {
    let mut cmd = cli_cmd();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("rwc5020x"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn version_exits_zero_and_writes_stdout_only() {
    let mut cmd = cli_cmd();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("rwc5020x"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn completions_write_script_to_stdout() {
    let mut cmd = cli_cmd();
    cmd.args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("rwc5020x"));
}

#[test]
fn unknown_scenario_is_usage_error() {
    let dir = tempdir().expect("tempdir should be created");
    isolated_cmd(dir.path())
        .args(["--udp", "127.0.0.1:9", "run", "eu-9.9"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("eu-5.3"));
}

#[test]
fn missing_channel_is_usage_error() {
    let dir = tempdir().expect("tempdir should be created");
    isolated_cmd(dir.path())
        .arg("status")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("no tester channel"));
}

#[test]
fn both_channels_is_usage_error() {
    let dir = tempdir().expect("tempdir should be created");
    isolated_cmd(dir.path())
        .args(["--serial", "/dev/null", "--udp", "127.0.0.1:9", "send", "*IDN?"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("mutually exclusive"));
}

#[test]
fn send_prints_ack() {
    let addr = spawn_stub(|_| Some("ACK".to_string()));
    let dir = tempdir().expect("tempdir should be created");
    isolated_cmd(dir.path())
        .args(["--udp", &addr, "send", "EXEC:LINK:RUN"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ACK"));
}

#[test]
fn send_json_reports_classification() {
    let addr = spawn_stub(|line| (line == "READ:SYS:VERSION?").then(|| "1.222".to_string()));
    let dir = tempdir().expect("tempdir should be created");
    let output = isolated_cmd(dir.path())
        .args(["--udp", &addr, "send", "READ:SYS:VERSION?", "--json"])
        .output()
        .expect("command should execute");
    assert!(output.status.success());

    let parsed: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be JSON");
    assert_eq!(parsed["kind"], "data");
    assert_eq!(parsed["payload"], "1.222");
}

#[test]
fn send_without_reply_fails_after_timeout() {
    let addr = spawn_stub(|_| None);
    let dir = tempdir().expect("tempdir should be created");
    isolated_cmd(dir.path())
        .args(["--udp", &addr, "--timeout-ms", "200", "send", "*IDN?"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("timed out"));
}

#[test]
fn send_writes_audit_log() {
    let addr = spawn_stub(|_| Some("ACK".to_string()));
    let dir = tempdir().expect("tempdir should be created");
    let audit = dir
        .path()
        .join("logs")
        .join("audit.log");
    isolated_cmd(dir.path())
        .args(["--udp", &addr, "--audit-log"])
        .arg(&audit)
        .args(["send", "EXEC:LINK:CLEAR"])
        .assert()
        .success();

    let text = fs::read_to_string(&audit).expect("audit log should exist");
    assert!(text.contains("Tx Command"));
    assert!(text.contains("EXEC:LINK:CLEAR"));
    assert!(text.contains("Rx Response"));
}

#[test]
fn status_reports_active_link() {
    let addr = spawn_stub(|_| Some("YES".to_string()));
    let dir = tempdir().expect("tempdir should be created");
    isolated_cmd(dir.path())
        .args(["--udp", &addr, "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Active"));
}

#[test]
fn run_fails_with_marker_when_tester_rejects() {
    let addr = spawn_stub(|_| Some("NAK".to_string()));
    let dir = tempdir().expect("tempdir should be created");
    isolated_cmd(dir.path())
        .args(["--udp", &addr, "run", "eu-5.3"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Test Result: FAIL"))
        .stderr(predicate::str::contains("Clear link message"));
}

#[test]
fn run_passes_against_cooperative_dut() {
    let addr = spawn_dut();
    let dir = tempdir().expect("tempdir should be created");
    fast_config(&dir);
    isolated_cmd(dir.path())
        .args(["--udp", &addr, "run", "eu-5.3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Test Result: PASS"));
}

#[test]
fn link_stop_reports_stopped() {
    let addr = spawn_stub(|line| (line == "EXEC:LINK:STOP").then(|| "ACK".to_string()));
    let dir = tempdir().expect("tempdir should be created");
    isolated_cmd(dir.path())
        .args(["--udp", &addr, "link", "stop"])
        .assert()
        .success()
        .stdout(predicate::str::contains("stopped"));
}

#[test]
fn link_stop_rejected_fails() {
    let addr = spawn_stub(|_| Some("NAK".to_string()));
    let dir = tempdir().expect("tempdir should be created");
    isolated_cmd(dir.path())
        .args(["--udp", &addr, "link", "stop"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Link stop"));
}

#[test]
fn configure_sets_mode_and_screen() {
    let addr = spawn_stub(|line| {
        matches!(line, "CONF:SYS:MODE EDT" | "CONF:SYS:SCREEN LINK").then(|| "ACK".to_string())
    });
    let dir = tempdir().expect("tempdir should be created");
    isolated_cmd(dir.path())
        .args(["--udp", &addr, "configure", "--mode", "EDT", "--screen", "LINK"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Test Mode: EDT"))
        .stdout(predicate::str::contains("Sub Screen: LINK"));
}

#[test]
fn configure_without_settings_is_usage_error() {
    let dir = tempdir().expect("tempdir should be created");
    isolated_cmd(dir.path())
        .args(["--udp", "127.0.0.1:9", "configure"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("nothing to configure"));
}
