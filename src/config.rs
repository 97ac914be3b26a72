use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::fixture::HeaderPolicy;
use crate::types::{OutputFormat, ViewportSize};
use crate::webdriver::BrowserType;

pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_PAGE: &str = "GST Reconciliation.html";
pub const DEFAULT_SCRATCH_DIR: &str = "verification";
pub const FIXTURE_FILE_NAME: &str = "test_data.xlsx";
pub const SCREENSHOT_FILE_NAME: &str = "verification.png";

/// Per-stage wait bounds, in the order the UI reaches them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeouts {
    /// Loader overlay must appear this soon after the upload
    pub loader_visible: Duration,
    /// Loader overlay must disappear this soon after appearing
    pub loader_hidden: Duration,
    /// Dashboard must show this soon after the loader hides
    pub dashboard_visible: Duration,
    /// Every other expectation
    pub default: Duration,
    /// Static server must answer HTTP within this bound
    pub server_startup: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            loader_visible: Duration::from_secs(5),
            loader_hidden: Duration::from_secs(10),
            dashboard_visible: Duration::from_secs(5),
            default: Duration::from_secs(5),
            server_startup: Duration::from_secs(10),
        }
    }
}

/// How the application under test is served
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServerMode {
    /// Spawn `gst-verify serve` as a child process for the run
    Spawn,
    /// Something else already serves the root on the port
    External,
}

/// Resolved settings for one verification run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyConfig {
    /// Directory served over HTTP (contains the application page)
    pub root: PathBuf,
    pub port: u16,
    /// Page file name, relative to the root
    pub page: String,
    /// Fixture and screenshot location
    pub scratch_dir: PathBuf,
    /// Optional JSON fixture replacing the built-in dataset
    pub fixture_json: Option<PathBuf>,
    pub header_policy: HeaderPolicy,
    pub browser: BrowserType,
    pub headless: bool,
    pub viewport: Option<ViewportSize>,
    pub server: ServerMode,
    pub timeouts: Timeouts,
    pub format: OutputFormat,
    /// Leave the fixture on disk after the run
    pub keep_fixture: bool,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            port: DEFAULT_PORT,
            page: DEFAULT_PAGE.to_string(),
            scratch_dir: PathBuf::from(DEFAULT_SCRATCH_DIR),
            fixture_json: None,
            header_policy: HeaderPolicy::default(),
            browser: BrowserType::Chrome,
            headless: true,
            viewport: None,
            server: ServerMode::Spawn,
            timeouts: Timeouts::default(),
            format: OutputFormat::default(),
            keep_fixture: false,
        }
    }
}

impl VerifyConfig {
    pub fn base_url(&self) -> String {
        format!("http://localhost:{}/", self.port)
    }

    /// URL of the page under test, with the file name percent-encoded
    pub fn page_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.base_url()).context("Invalid base URL")?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("Base URL cannot hold a path"))?
            .pop_if_empty()
            .extend(self.page.split('/'));
        Ok(url)
    }

    pub fn fixture_path(&self) -> PathBuf {
        self.scratch_dir.join(FIXTURE_FILE_NAME)
    }

    pub fn screenshot_path(&self) -> PathBuf {
        self.scratch_dir.join(SCREENSHOT_FILE_NAME)
    }

    /// Make relative paths absolute against `cwd`
    pub fn absolutize(mut self, cwd: &Path) -> Self {
        let fix = |p: PathBuf| if p.is_absolute() { p } else { cwd.join(p) };
        self.root = fix(self.root);
        self.scratch_dir = fix(self.scratch_dir);
        self.fixture_json = self.fixture_json.map(fix);
        self
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;
