//! One verification run, start to finish.
//!
//! Resources are acquired in order (fixture file, static server, browser)
//! and released in reverse on every exit path, including SIGINT and
//! SIGTERM. A cleanup failure is logged and never replaces the error that
//! ended the run.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Instant;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::{ServerMode, VerifyConfig};
use crate::errors::{VerifyError, VerifyResult};
use crate::fixture::{FixtureDataset, FixtureFile};
use crate::process;
use crate::scenario::{SmokeScenario, StageTracker, SupplierDropdownScenario, SupplierPlan};
use crate::server::{self, StaticServerProcess};
use crate::types::{ConsoleMessage, RunReport, StageRecord};
use crate::webdriver::Browser;

/// Supplier whose dropdowns the default scenario exercises
pub const DEFAULT_SUPPLIER: &str = "Supplier A";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioKind {
    SupplierDropdowns,
    Smoke,
}

impl ScenarioKind {
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioKind::SupplierDropdowns => SupplierDropdownScenario::NAME,
            ScenarioKind::Smoke => SmokeScenario::NAME,
        }
    }
}

pub struct Runner {
    config: VerifyConfig,
    /// Binary launched with `serve` when the run owns the server
    server_program: PathBuf,
}

impl Runner {
    pub fn new(config: VerifyConfig, server_program: PathBuf) -> Self {
        Self {
            config,
            server_program,
        }
    }

    /// Load the configured dataset, or the built-in one
    pub fn dataset(&self) -> VerifyResult<FixtureDataset> {
        let dataset = match &self.config.fixture_json {
            Some(path) => FixtureDataset::from_json_path(path)?,
            None => FixtureDataset::gst_default(),
        };
        Ok(dataset.with_header_policy(self.config.header_policy))
    }

    pub async fn run(&self, kind: ScenarioKind) -> VerifyResult<RunReport> {
        let started_at = chrono::Utc::now();
        let clock = Instant::now();
        let page_url = self.config.page_url()?.to_string();
        let interrupts = Interrupts::install()?;

        info!("Running {} scenario against {}", kind.name(), page_url);

        let (fixture_rows, fixture) = match kind {
            ScenarioKind::SupplierDropdowns => {
                let dataset = self.dataset()?;
                let file = dataset.write_xlsx(&self.config.fixture_path())?;
                (dataset.len(), Some((dataset, file)))
            }
            ScenarioKind::Smoke => (0, None),
        };

        let outcome = self
            .with_server(kind, &page_url, fixture.as_ref(), &interrupts)
            .await;

        if let Some((_, file)) = fixture {
            if self.config.keep_fixture {
                info!("Keeping fixture at {}", file.persist().display());
            } else if let Err(e) = file.remove() {
                warn!("Failed to remove fixture {}: {}", file.path().display(), e);
            }
        }

        let (stages, console) = outcome?;
        Ok(RunReport {
            scenario: kind.name().to_string(),
            success: true,
            started_at,
            duration_ms: clock.elapsed().as_millis() as u64,
            page_url,
            fixture_rows,
            stages,
            console,
            screenshot: Some(self.config.screenshot_path().display().to_string()),
        })
    }

    async fn with_server(
        &self,
        kind: ScenarioKind,
        page_url: &str,
        fixture: Option<&(FixtureDataset, FixtureFile)>,
        interrupts: &Interrupts,
    ) -> VerifyResult<ScenarioOutput> {
        let mut server = match self.config.server {
            ServerMode::Spawn => {
                let root = server::resolve_root(&self.config.root)
                    .map_err(|e| VerifyError::ServerStart(format!("{e:#}")))?;
                let spawn = StaticServerProcess::spawn(
                    &self.server_program,
                    &root,
                    self.config.port,
                    self.config.timeouts.server_startup,
                );
                Some(interrupts.guard(spawn).await?)
            }
            ServerMode::External => {
                let base = self.config.base_url();
                let reachable = async {
                    Ok::<_, VerifyError>(
                        process::wait_for_http(&base, self.config.timeouts.server_startup).await,
                    )
                };
                if !interrupts.guard(reachable).await? {
                    return Err(VerifyError::ServerStart(format!(
                        "nothing is serving {}",
                        base
                    )));
                }
                None
            }
        };

        let outcome = self.with_browser(kind, page_url, fixture, interrupts).await;

        if let Some(server) = server.as_mut() {
            server.stop().await;
        }
        outcome
    }

    async fn with_browser(
        &self,
        kind: ScenarioKind,
        page_url: &str,
        fixture: Option<&(FixtureDataset, FixtureFile)>,
        interrupts: &Interrupts,
    ) -> VerifyResult<ScenarioOutput> {
        let connect = async {
            Browser::new(self.config.browser, self.config.viewport, self.config.headless)
                .await
                .map_err(|e| VerifyError::WebDriver(format!("{e:#}")))
        };
        let browser = interrupts.guard(connect).await?;

        let mut tracker = StageTracker::new();
        let scenario = self.run_scenario(kind, &browser, page_url, fixture, &mut tracker);
        let outcome = interrupts.guard(scenario).await;

        let console = drain_console(&browser).await;

        if let Err(e) = browser.close().await {
            warn!("Failed to close browser session: {}", e);
        }

        outcome.map(|()| (tracker.into_records(), console))
    }

    async fn run_scenario(
        &self,
        kind: ScenarioKind,
        browser: &Browser,
        page_url: &str,
        fixture: Option<&(FixtureDataset, FixtureFile)>,
        tracker: &mut StageTracker,
    ) -> VerifyResult<()> {
        match (kind, fixture) {
            (ScenarioKind::SupplierDropdowns, Some((dataset, file))) => {
                let scenario = SupplierDropdownScenario {
                    plan: SupplierPlan::from_dataset(dataset, DEFAULT_SUPPLIER),
                    timeouts: self.config.timeouts,
                    screenshot: self.config.screenshot_path(),
                };
                scenario.run(browser, page_url, file.path(), tracker).await
            }
            (ScenarioKind::SupplierDropdowns, None) => Err(VerifyError::Other(anyhow::anyhow!(
                "supplier scenario needs a fixture"
            ))),
            (ScenarioKind::Smoke, _) => {
                let scenario = SmokeScenario {
                    timeouts: self.config.timeouts,
                    screenshot: self.config.screenshot_path(),
                };
                scenario.run(browser, page_url, tracker).await
            }
        }
    }
}

/// Stages reached and console output of one scenario
type ScenarioOutput = (Vec<StageRecord>, Vec<ConsoleMessage>);

/// Log whatever the page wrote to its console, errors at `warn`
async fn drain_console(browser: &Browser) -> Vec<ConsoleMessage> {
    match browser.take_console_messages().await {
        Ok(messages) => {
            for message in &messages {
                if message.is_error() {
                    warn!("{}", message);
                } else {
                    info!("{}", message);
                }
            }
            messages
        }
        Err(e) => {
            warn!("Could not read browser console: {:#}", e);
            Vec::new()
        }
    }
}

/// SIGINT/SIGTERM listener for one run. A step wrapped in
/// [`Interrupts::guard`] is abandoned when a signal arrives so the caller's
/// release path runs.
pub struct Interrupts {
    received: watch::Receiver<Option<&'static str>>,
    listener: JoinHandle<()>,
}

impl Interrupts {
    pub fn install() -> VerifyResult<Self> {
        let signal = process::shutdown_signal()
            .map_err(|e| VerifyError::Other(anyhow::anyhow!("cannot listen for signals: {}", e)))?;
        let (tx, received) = watch::channel(None);
        let listener = tokio::spawn(async move {
            let name = signal.await;
            warn!("Received {}, releasing resources", name);
            let _ = tx.send(Some(name));
        });
        Ok(Self { received, listener })
    }

    pub async fn guard<T>(&self, step: impl Future<Output = VerifyResult<T>>) -> VerifyResult<T> {
        let mut received = self.received.clone();
        tokio::select! {
            result = step => result,
            Ok(name) = received.wait_for(Option::is_some) => {
                Err(VerifyError::Interrupted((*name).unwrap_or("signal").to_string()))
            }
        }
    }
}

impl Drop for Interrupts {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

/// Write the configured fixture to `path` and keep it
pub fn write_fixture(config: &VerifyConfig, path: &Path) -> VerifyResult<PathBuf> {
    let runner = Runner::new(config.clone(), PathBuf::new());
    let dataset = runner.dataset()?;
    Ok(dataset.write_xlsx(path)?.persist())
}

#[cfg(test)]
#[path = "runner_test.rs"]
mod runner_test;
