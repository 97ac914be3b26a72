use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use fantoccini::elements::Element;
use fantoccini::{Client, ClientBuilder, Locator};
use serde_json::json;
use tempfile::TempDir;
use tracing::{debug, info};

use crate::types::{ConsoleMessage, ViewportSize};
use crate::webdriver_manager::GLOBAL_WEBDRIVER_MANAGER;

/// Wraps the page's console methods and records every call, plus uncaught
/// errors and rejections, in `window.__gstVerifyConsole`
const CONSOLE_CAPTURE_SCRIPT: &str = r#"
    (function() {
        if (window.__gstVerifyConsoleInstalled) return;
        window.__gstVerifyConsoleInstalled = true;
        window.__gstVerifyConsole = [];

        function record(level, args) {
            const text = Array.from(args).map(arg => {
                if (typeof arg === 'object') {
                    try {
                        return JSON.stringify(arg);
                    } catch (e) {
                        return String(arg);
                    }
                }
                return String(arg);
            }).join(' ');
            window.__gstVerifyConsole.push({ level: level, text: text });
            if (window.__gstVerifyConsole.length > 1000) {
                window.__gstVerifyConsole.shift();
            }
        }

        ['log', 'info', 'warn', 'error', 'debug'].forEach(level => {
            const original = console[level];
            console[level] = function(...args) {
                record(level, args);
                original.apply(console, args);
            };
        });

        window.addEventListener('error', event => {
            record('error', [`Uncaught ${event.error || event.message}`]);
        });
        window.addEventListener('unhandledrejection', event => {
            record('error', [`Unhandled Promise Rejection: ${event.reason}`]);
        });
    })();
"#;

/// Browser session driven over WebDriver, one window, one page
pub struct Browser {
    pub(crate) client: Client,
    // Chrome user-data-dir, removed when the session is dropped
    _profile_dir: TempDir,
}

/// Supported browser types
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum BrowserType {
    /// Mozilla Firefox
    Firefox,
    /// Google Chrome/Chromium
    Chrome,
}

impl std::str::FromStr for BrowserType {
    type Err = anyhow::Error;

    /// Parse browser type from string (case-insensitive)
    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "firefox" => Ok(BrowserType::Firefox),
            "chrome" | "chromium" => Ok(BrowserType::Chrome),
            _ => anyhow::bail!("Unsupported browser: {}", s),
        }
    }
}

impl BrowserType {
    /// WebDriver binary that drives this browser
    pub fn driver_binary(&self) -> &'static str {
        match self {
            BrowserType::Firefox => "geckodriver",
            BrowserType::Chrome => "chromedriver",
        }
    }

    /// Where an externally started driver usually listens
    pub fn default_webdriver_url(&self) -> String {
        match self {
            BrowserType::Firefox => "http://localhost:4444".to_string(),
            BrowserType::Chrome => "http://localhost:9515".to_string(),
        }
    }

    /// WebDriver capabilities for a fresh session
    pub fn capabilities(
        &self,
        headless: bool,
        viewport: Option<ViewportSize>,
        profile_dir: &Path,
    ) -> serde_json::Map<String, serde_json::Value> {
        let mut caps = serde_json::Map::new();

        match self {
            BrowserType::Firefox => {
                let mut args = Vec::new();
                if headless {
                    args.push("--headless".to_string());
                }
                if let Some(vp) = &viewport {
                    args.push(format!("--width={}", vp.width));
                    args.push(format!("--height={}", vp.height));
                }
                args.push("-profile".to_string());
                args.push(profile_dir.display().to_string());
                caps.insert("moz:firefoxOptions".to_string(), json!({ "args": args }));
            }
            BrowserType::Chrome => {
                let mut args = vec!["--no-sandbox".to_string()];
                if headless {
                    args.push("--headless=new".to_string());
                    args.push("--disable-gpu".to_string());
                    args.push("--disable-dev-shm-usage".to_string());
                }
                if let Some(vp) = &viewport {
                    args.push(format!("--window-size={},{}", vp.width, vp.height));
                }
                args.push(format!("--user-data-dir={}", profile_dir.display()));
                caps.insert("goog:chromeOptions".to_string(), json!({ "args": args }));
            }
        }

        caps
    }
}

impl Browser {
    /// Start a browser session, launching the matching WebDriver if needed
    pub async fn new(
        browser_type: BrowserType,
        viewport: Option<ViewportSize>,
        headless: bool,
    ) -> Result<Self> {
        info!("Connecting to {:?} WebDriver", browser_type);

        let webdriver_url = GLOBAL_WEBDRIVER_MANAGER.ensure_driver(browser_type).await?;

        let profile_dir = tempfile::Builder::new()
            .prefix(&format!("gst-verify-{:?}-", browser_type).to_lowercase())
            .tempdir()?;
        let caps = browser_type.capabilities(headless, viewport, profile_dir.path());

        debug!("Connecting to WebDriver at {}", webdriver_url);

        let client = match ClientBuilder::rustls()
            .capabilities(caps.clone())
            .connect(&webdriver_url)
            .await
        {
            Ok(client) => client,
            Err(e) => {
                let error_str = e.to_string();
                if error_str.contains("Session is already started")
                    || error_str.contains("session not created")
                {
                    info!("WebDriver appears to be in a bad state, attempting recovery...");
                    GLOBAL_WEBDRIVER_MANAGER.kill_driver(browser_type);
                    tokio::time::sleep(Duration::from_millis(500)).await;

                    let new_url = GLOBAL_WEBDRIVER_MANAGER
                        .ensure_driver(browser_type)
                        .await
                        .context("Failed to restart WebDriver after recovery")?;

                    ClientBuilder::rustls()
                        .capabilities(caps)
                        .connect(&new_url)
                        .await
                        .context("Failed to connect to WebDriver after restart")?
                } else {
                    return Err(e).context("Failed to connect to WebDriver");
                }
            }
        };

        if let Some(vp) = viewport {
            debug!("Setting viewport to {}x{}", vp.width, vp.height);
            if let Err(e) = client.set_window_size(vp.width, vp.height).await {
                debug!("Note: Could not set window size: {}", e);
            }
        }

        Ok(Browser {
            client,
            _profile_dir: profile_dir,
        })
    }

    /// Navigate and wait (up to 2s) for `document.readyState == "complete"`,
    /// then start capturing the page's console output
    pub async fn goto(&self, url: &str) -> Result<()> {
        info!("Navigating to {}", url);
        self.client
            .goto(url)
            .await
            .context(format!("Failed to navigate to {}", url))?;

        let wait_script = "return document.readyState === 'complete';";
        for _ in 0..20 {
            match self.client.execute(wait_script, vec![]).await {
                Ok(val) if val.as_bool().unwrap_or(false) => break,
                _ => tokio::time::sleep(Duration::from_millis(100)).await,
            }
        }

        // Pages that forbid script injection still work, just without console output
        if let Err(e) = self.client.execute(CONSOLE_CAPTURE_SCRIPT, vec![]).await {
            debug!("Console capture not installed: {}", e);
        }

        Ok(())
    }

    /// Console messages logged since the last call. The buffer lives in the
    /// page, so messages from before the last navigation are gone.
    pub async fn take_console_messages(&self) -> Result<Vec<ConsoleMessage>> {
        let script = r#"
            const logs = window.__gstVerifyConsole || [];
            window.__gstVerifyConsole = [];
            return logs;
        "#;
        let value = self
            .client
            .execute(script, vec![])
            .await
            .context("Failed to read browser console")?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn find_all(&self, selector: &str) -> Result<Vec<Element>> {
        self.client
            .find_all(Locator::Css(selector))
            .await
            .context(format!("Failed to query selector: {}", selector))
    }

    /// Choose `path` in a file input, as a user would through the picker.
    /// The input's change handlers fire as usual.
    pub async fn set_input_files(&self, selector: &str, path: &Path) -> Result<()> {
        let path = path
            .canonicalize()
            .context(format!("Upload file {} does not exist", path.display()))?;

        let input = self
            .client
            .find(Locator::Css(selector))
            .await
            .context(format!("Element not found: {}", selector))?;

        info!("Uploading {} via {}", path.display(), selector);
        input
            .send_keys(&path.display().to_string())
            .await
            .context(format!("Failed to set file on {}", selector))?;

        Ok(())
    }

    pub async fn click(&self, selector: &str) -> Result<()> {
        debug!("Finding element with selector: {}", selector);
        let element = self
            .client
            .find(Locator::Css(selector))
            .await
            .context(format!("Element not found: {}", selector))?;

        info!("Clicking {}", selector);
        element.click().await?;
        Ok(())
    }

    /// Select an `<option>` by value, falling back to its visible label
    pub async fn select_option(&self, select: &Element, option: &str) -> Result<()> {
        info!("Selecting option '{}'", option);
        if select.select_by_value(option).await.is_ok() {
            return Ok(());
        }
        select
            .select_by_label(option)
            .await
            .context(format!("No option '{}' in dropdown", option))?;
        Ok(())
    }

    /// Save a PNG of the current viewport
    pub async fn screenshot(&self, path: &Path) -> Result<usize> {
        let png = self
            .client
            .screenshot()
            .await
            .context("Failed to capture screenshot")?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, &png)
            .await
            .context(format!("Failed to write screenshot to {}", path.display()))?;

        info!("Screenshot saved to {} ({} bytes)", path.display(), png.len());
        Ok(png.len())
    }

    pub async fn close(self) -> Result<()> {
        self.client.close().await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "webdriver_test.rs"]
mod webdriver_test;
