// Common test utilities and fixtures

use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

pub const APP_PAGE: &str = "GST Reconciliation.html";
pub const UNLINKED_PAGE: &str = "Unlinked.html";
pub const NO_LOADER_PAGE: &str = "NoLoader.html";
pub const STUCK_LOADER_PAGE: &str = "StuckLoader.html";

const APP_TEMPLATE: &str = include_str!("../fixtures/gst_app.html");

/// Get the browser to use for testing from TEST_BROWSER env var.
/// Defaults to "chrome" if not set.
#[allow(dead_code)]
pub fn get_test_browser() -> &'static str {
    match std::env::var("TEST_BROWSER") {
        Ok(browser) if browser == "firefox" => "firefox",
        _ => "chrome",
    }
}

/// Browser tests need a WebDriver binary on PATH. Without one they are
/// skipped with a warning, unless TEST_BROWSER asks for a browser
/// explicitly, in which case a missing driver is a failure.
#[allow(dead_code)]
pub fn webdriver_available() -> bool {
    let driver = match get_test_browser() {
        "firefox" => "geckodriver",
        _ => "chromedriver",
    };
    if gst_verify::process::command_exists(driver) {
        return true;
    }
    if std::env::var_os("TEST_BROWSER").is_some() {
        panic!("TEST_BROWSER is set but {} is not in PATH", driver);
    }
    eprintln!(
        "WARNING: skipping browser test, {} not found in PATH (set TEST_BROWSER to require it)",
        driver
    );
    false
}

/// Temporary application root holding the stand-in page and its variants:
/// dropdowns not linked, loader never shown, and loader never hidden
#[allow(dead_code)]
pub fn app_dir() -> TempDir {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let variants = [
        (APP_PAGE, APP_TEMPLATE.to_string()),
        (
            UNLINKED_PAGE,
            APP_TEMPLATE.replace(
                "const LINK_DROPDOWNS = true;",
                "const LINK_DROPDOWNS = false;",
            ),
        ),
        (
            NO_LOADER_PAGE,
            APP_TEMPLATE.replace("const SHOW_LOADER = true;", "const SHOW_LOADER = false;"),
        ),
        (
            STUCK_LOADER_PAGE,
            APP_TEMPLATE.replace("const HIDE_LOADER = true;", "const HIDE_LOADER = false;"),
        ),
    ];
    for (name, html) in variants {
        std::fs::write(dir.path().join(name), html).expect("Failed to write app page");
    }
    dir
}

/// Helper to run gst-verify from `cwd`
#[allow(dead_code)]
pub fn run_gst_verify(cwd: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_gst-verify"))
        .current_dir(cwd)
        .args(args)
        .output()
        .expect("Failed to execute gst-verify")
}

/// Parse the JSON error line printed on failure
#[allow(dead_code)]
pub fn error_json(output: &Output) -> serde_json::Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let line = stdout
        .lines()
        .find(|l| l.starts_with('{'))
        .unwrap_or_else(|| panic!("No JSON error in output: {}", stdout));
    serde_json::from_str(line).expect("Invalid JSON error")
}

#[allow(dead_code)]
pub fn free_port() -> u16 {
    gst_verify::process::free_port().expect("No free port")
}
