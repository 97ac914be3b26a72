// Full verification runs against the stand-in application page.
// These need chromedriver (or geckodriver with TEST_BROWSER=firefox).

use pretty_assertions::assert_eq;
use serial_test::serial;

mod common;
use common::{
    NO_LOADER_PAGE, STUCK_LOADER_PAGE, UNLINKED_PAGE, app_dir, error_json, free_port,
    get_test_browser, run_gst_verify, webdriver_available,
};

#[test]
#[serial]
fn test_full_run_succeeds_and_cleans_up() {
    if !webdriver_available() {
        return;
    }
    let app = app_dir();
    let port = free_port().to_string();

    let output = run_gst_verify(
        app.path(),
        &["run", "--port", &port, "--browser", get_test_browser()],
    );

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        output.status.success(),
        "run failed: {}\n{}",
        stdout,
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(stdout.contains("Verification script ran successfully."));
    assert!(app.path().join("verification/verification.png").exists());
    assert!(!app.path().join("verification/test_data.xlsx").exists());
}

#[test]
#[serial]
fn test_repeated_runs_report_same_stages() {
    if !webdriver_available() {
        return;
    }
    let app = app_dir();

    let mut stage_names = Vec::new();
    for _ in 0..2 {
        let port = free_port().to_string();
        let output = run_gst_verify(
            app.path(),
            &[
                "run",
                "--port",
                &port,
                "--browser",
                get_test_browser(),
                "--format",
                "json",
            ],
        );
        assert!(output.status.success());

        let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(report["fixture_rows"], 3);
        assert!(
            report["console"]
                .as_array()
                .unwrap()
                .iter()
                .any(|m| m["level"] == "log" && m["text"] == "Rendered 3 supplier rows"),
            "console not captured: {}",
            report["console"]
        );
        let names: Vec<String> = report["stages"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["stage"].as_str().unwrap().to_string())
            .collect();
        stage_names.push(names);
    }

    assert_eq!(stage_names[0], stage_names[1]);
    assert_eq!(
        stage_names[0],
        vec![
            "idle",
            "uploading",
            "processing-done",
            "dashboard-ready",
            "supplier-tab-selected",
            "row-interaction",
            "verified",
        ]
    );
}

#[test]
#[serial]
fn test_unlinked_dropdowns_time_out() {
    if !webdriver_available() {
        return;
    }
    let app = app_dir();
    let port = free_port().to_string();

    let output = run_gst_verify(
        app.path(),
        &[
            "run",
            "--port",
            &port,
            "--browser",
            get_test_browser(),
            "--page",
            UNLINKED_PAGE,
            "--timeout-ms",
            "1000",
        ],
    );

    assert_eq!(output.status.code(), Some(5));
    let message = error_json(&output)["message"].as_str().unwrap().to_string();
    assert!(message.contains("nth=1 to have value \"Admin\""), "{}", message);
    assert!(message.contains("value \"None\""), "{}", message);
    assert!(!app.path().join("verification/test_data.xlsx").exists());
}

#[test]
#[serial]
fn test_smoke_run() {
    if !webdriver_available() {
        return;
    }
    let app = app_dir();
    let port = free_port().to_string();

    let output = run_gst_verify(
        app.path(),
        &["smoke", "--port", &port, "--browser", get_test_browser()],
    );

    assert!(output.status.success());
    assert!(app.path().join("verification/verification.png").exists());
}

#[test]
#[serial]
fn test_missing_page_times_out_on_uploader() {
    if !webdriver_available() {
        return;
    }
    let app = app_dir();
    let port = free_port().to_string();

    let output = run_gst_verify(
        app.path(),
        &[
            "run",
            "--port",
            &port,
            "--browser",
            get_test_browser(),
            "--page",
            "missing.html",
            "--timeout-ms",
            "500",
        ],
    );

    assert_eq!(output.status.code(), Some(5));
    assert!(error_json(&output)["message"]
        .as_str()
        .unwrap()
        .contains("#fileUploader to have count 1"));
}

/// Run the supplier scenario against `page` and return the error message,
/// asserting that it failed as a timeout and left no fixture behind
fn timed_out_message(page: &str, extra: &[&str]) -> String {
    let app = app_dir();
    let port = free_port().to_string();
    let mut args = vec![
        "run",
        "--port",
        port.as_str(),
        "--browser",
        get_test_browser(),
        "--page",
        page,
    ];
    args.extend_from_slice(extra);

    let output = run_gst_verify(app.path(), &args);

    assert_eq!(output.status.code(), Some(5));
    assert!(!app.path().join("verification/test_data.xlsx").exists());
    error_json(&output)["message"].as_str().unwrap().to_string()
}

#[test]
#[serial]
fn test_loader_that_never_shows_times_out() {
    if !webdriver_available() {
        return;
    }
    let message = timed_out_message(NO_LOADER_PAGE, &["--loader-timeout-ms", "1000"]);
    assert!(message.contains("#loader-overlay to be visible"), "{}", message);
    assert!(message.contains("Timed out after 1000ms"), "{}", message);
}

#[test]
#[serial]
fn test_loader_that_never_hides_times_out() {
    if !webdriver_available() {
        return;
    }
    let message = timed_out_message(STUCK_LOADER_PAGE, &["--processing-timeout-ms", "1500"]);
    assert!(message.contains("#loader-overlay to be hidden"), "{}", message);
    assert!(message.contains("last observed: visible"), "{}", message);
}
