// CLI behavior that does not need a browser

use std::process::{Command, Stdio};
use std::time::Duration;

use pretty_assertions::assert_eq;
use tempfile::TempDir;

mod common;
use common::{app_dir, error_json, free_port, run_gst_verify};

#[test]
fn test_fixture_command_writes_workbook() {
    let temp_dir = TempDir::new().unwrap();
    let output = run_gst_verify(temp_dir.path(), &["fixture", "--output", "out/data.xlsx"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Fixture written to"));

    let bytes = std::fs::read(temp_dir.path().join("out/data.xlsx")).unwrap();
    assert_eq!(&bytes[..2], b"PK");
}

#[test]
fn test_fixture_command_rejects_bad_json() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(temp_dir.path().join("rows.json"), r#"{"not": "an array"}"#).unwrap();

    let output = run_gst_verify(
        temp_dir.path(),
        &["fixture", "--fixture-json", "rows.json"],
    );

    assert_eq!(output.status.code(), Some(2));
    let json = error_json(&output);
    assert_eq!(json["error"], true);
    assert_eq!(json["exit_code"], 2);
}

#[test]
fn test_run_without_server_cleans_up_fixture() {
    let temp_dir = TempDir::new().unwrap();
    let port = free_port().to_string();

    let output = run_gst_verify(
        temp_dir.path(),
        &[
            "run",
            "--external-server",
            "--port",
            &port,
            "--server-timeout-ms",
            "300",
        ],
    );

    assert_eq!(output.status.code(), Some(3));
    let json = error_json(&output);
    assert!(json["message"].as_str().unwrap().contains("nothing is serving"));
    assert!(!temp_dir.path().join("verification/test_data.xlsx").exists());
}

#[test]
fn test_run_refuses_busy_port() {
    let temp_dir = TempDir::new().unwrap();
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port().to_string();

    let output = run_gst_verify(temp_dir.path(), &["--port", &port]);

    assert_eq!(output.status.code(), Some(3));
    assert!(error_json(&output)["message"]
        .as_str()
        .unwrap()
        .contains("already in use"));
    assert!(!temp_dir.path().join("verification/test_data.xlsx").exists());
}

#[test]
fn test_invalid_viewport_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let output = run_gst_verify(temp_dir.path(), &["run", "--viewport", "wide"]);

    assert_eq!(output.status.code(), Some(1));
    assert!(error_json(&output)["message"]
        .as_str()
        .unwrap()
        .contains("Invalid viewport format"));
}

#[tokio::test]
async fn test_serve_command_serves_root() {
    let app = app_dir();
    let port = free_port();

    let mut child = Command::new(env!("CARGO_BIN_EXE_gst-verify"))
        .args(["serve", "--port", &port.to_string(), "--root"])
        .arg(app.path())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("Failed to start gst-verify serve");

    let url = format!("http://localhost:{}/GST%20Reconciliation.html", port);
    let ready = gst_verify::process::wait_for_http(&url, Duration::from_secs(10)).await;

    let body = if ready {
        reqwest::get(&url).await.unwrap().text().await.unwrap()
    } else {
        String::new()
    };
    let _ = child.kill();
    let _ = child.wait();

    assert!(ready, "serve did not come up on port {}", port);
    assert!(body.contains("fileUploader"));
}

#[tokio::test]
async fn test_serve_exits_when_stdin_closes() {
    let app = app_dir();
    let port = free_port();

    let mut child = Command::new(env!("CARGO_BIN_EXE_gst-verify"))
        .args(["serve", "--watch-stdin", "--port", &port.to_string(), "--root"])
        .arg(app.path())
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("Failed to start gst-verify serve");

    let url = format!("http://127.0.0.1:{}/", port);
    assert!(gst_verify::process::wait_for_http(&url, Duration::from_secs(10)).await);

    // Same as the owning run dying: the write end of the pipe goes away
    drop(child.stdin.take());

    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    let mut status = None;
    while std::time::Instant::now() < deadline {
        status = child.try_wait().unwrap();
        if status.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    if status.is_none() {
        let _ = child.kill();
        let _ = child.wait();
    }

    assert!(status.is_some(), "serve kept running after stdin closed");
    assert!(!gst_verify::process::is_port_in_use(port));
}
