use anyhow::Result;
use std::process::{Command, Stdio};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::process::{self, ManagedChild};
use crate::webdriver::BrowserType;

/// Manages WebDriver processes (geckodriver, chromedriver)
#[derive(Default)]
pub struct WebDriverManager {
    processes: Mutex<Vec<WebDriverProcess>>,
}

struct WebDriverProcess {
    browser_type: BrowserType,
    child: ManagedChild,
    url: String,
}

impl WebDriverManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensure a WebDriver is running for the given browser type.
    /// Returns the URL to connect to.
    pub async fn ensure_driver(&self, browser_type: BrowserType) -> Result<String> {
        let managed_urls: Vec<String> = {
            let processes = self.lock();
            processes
                .iter()
                .filter(|p| p.browser_type == browser_type)
                .map(|p| p.url.clone())
                .collect()
        };

        for url in managed_urls {
            if Self::verify_driver_working(&url).await {
                debug!("Using existing managed WebDriver at {}", url);
                return Ok(url);
            }
        }

        // Externally managed driver on the standard port
        let standard_url = browser_type.default_webdriver_url();
        if Self::verify_driver_working(&standard_url).await {
            debug!("Found external WebDriver at {}", standard_url);
            return Ok(standard_url);
        }

        info!("WebDriver not detected, attempting to start automatically...");
        self.start_driver(browser_type).await
    }

    async fn start_driver(&self, browser_type: BrowserType) -> Result<String> {
        let command = browser_type.driver_binary();
        if !process::command_exists(command) {
            anyhow::bail!(
                "{} not found in PATH. Please install it:\n\
                  macOS: brew install {}\n\
                  Linux: Download from official releases\n\
                  Or see: https://www.selenium.dev/documentation/webdriver/getting_started/install_drivers/",
                command,
                command
            );
        }

        let port = Self::find_free_port_for_browser(browser_type)?;
        info!("Starting {} on port {}", command, port);

        let mut cmd = Command::new(command);
        match browser_type {
            BrowserType::Firefox => cmd.arg("--port").arg(port.to_string()),
            BrowserType::Chrome => cmd.arg(format!("--port={}", port)),
        };
        cmd.stdout(Stdio::null()).stderr(Stdio::null());

        let child = ManagedChild::spawn(command, cmd)?;
        let url = format!("http://localhost:{}", port);

        self.lock().push(WebDriverProcess {
            browser_type,
            child,
            url: url.clone(),
        });

        let max_attempts = 30; // 3 seconds total
        for attempt in 1..=max_attempts {
            if Self::is_driver_running(&url).await {
                info!("WebDriver started successfully on port {}", port);
                return Ok(url);
            }
            if attempt < max_attempts {
                sleep(Duration::from_millis(100)).await;
            }
        }

        self.remove_driver(&url);
        anyhow::bail!("WebDriver failed to start within timeout")
    }

    /// Find a free port, preferring the conventional ones for the driver
    pub fn find_free_port_for_browser(browser_type: BrowserType) -> Result<u16> {
        let preferred_ports: &[u16] = match browser_type {
            BrowserType::Firefox => &[4444, 4445, 4446],
            BrowserType::Chrome => &[9515, 9516, 9517],
        };

        for &port in preferred_ports {
            if !process::is_port_in_use(port) {
                debug!("Found free port {} for {:?}", port, browser_type);
                return Ok(port);
            }
            debug!("Port {} is in use for {:?}", port, browser_type);
        }

        process::free_port()
    }

    /// Check if WebDriver is running at the given URL
    pub async fn is_driver_running(url: &str) -> bool {
        let status_url = format!("{}/status", url);

        match reqwest::Client::new()
            .get(&status_url)
            .timeout(Duration::from_secs(1))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    /// A working driver reports `value.ready == true` on /status
    async fn verify_driver_working(url: &str) -> bool {
        let status_url = format!("{}/status", url);

        match reqwest::Client::new()
            .get(&status_url)
            .timeout(Duration::from_secs(1))
            .send()
            .await
        {
            Ok(response) => match response.json::<serde_json::Value>().await {
                Ok(body) => body
                    .get("value")
                    .and_then(|v| v.get("ready"))
                    .and_then(|r| r.as_bool())
                    .unwrap_or(false),
                Err(_) => false,
            },
            Err(_) => false,
        }
    }

    /// Stop and forget a driver whose session went bad
    pub fn kill_driver(&self, browser_type: BrowserType) {
        let mut processes = self.lock();
        processes.retain(|p| p.browser_type != browser_type);
    }

    fn remove_driver(&self, url: &str) {
        let mut processes = self.lock();
        processes.retain(|p| p.url != url);
    }

    /// Number of drivers this manager started and still owns
    pub fn managed_count(&self) -> usize {
        self.lock().len()
    }

    /// Stop all managed WebDriver processes
    pub fn stop_all(&self) {
        let mut processes = self.lock();
        for process in processes.iter_mut() {
            debug!("Stopping WebDriver at {}", process.url);
            process.child.terminate(Duration::from_millis(100));
        }
        processes.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<WebDriverProcess>> {
        self.processes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for WebDriverManager {
    fn drop(&mut self) {
        self.stop_all();
    }
}

// Global WebDriver manager instance
lazy_static::lazy_static! {
    pub static ref GLOBAL_WEBDRIVER_MANAGER: WebDriverManager = WebDriverManager::new();
}

#[cfg(test)]
#[path = "webdriver_manager_test.rs"]
mod webdriver_manager_test;
