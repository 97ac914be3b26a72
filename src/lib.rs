//! # gst-verify
//!
//! End-to-end verification for the client-side GST Reconciliation tool.
//!
//! A run writes a small spreadsheet fixture, serves the application over
//! local HTTP, drives a headless browser through the upload and supplier
//! pages, asserts on what the page shows and saves a screenshot. The
//! fixture, the server process and the browser session are released on
//! every exit path.
//!
//! ## CLI Usage
//!
//! ```bash
//! # Full run from the directory holding "GST Reconciliation.html"
//! gst-verify
//!
//! # Same, with Firefox and a visible window
//! gst-verify run --browser firefox --no-headless
//!
//! # Only check that the startup screen renders
//! gst-verify smoke
//!
//! # Use rows from a JSON file instead of the built-in fixture
//! gst-verify run --fixture-json rows.json --header-policy union
//!
//! # Write the fixture and keep it
//! gst-verify fixture --output test_data.xlsx
//!
//! # Serve a directory in the foreground
//! gst-verify serve --root . --port 8000
//! ```
//!
//! Logging goes to stderr and is controlled with `RUST_LOG`
//! (default `gst_verify=info`).
//!
//! ## Library Usage
//!
//! ```no_run
//! use gst_verify::{Runner, ScenarioKind, VerifyConfig};
//!
//! # async fn example() -> Result<(), gst_verify::VerifyError> {
//! let runner = Runner::new(VerifyConfig::default(), std::env::current_exe().unwrap());
//! let report = runner.run(ScenarioKind::SupplierDropdowns).await?;
//! println!("{} stages reached", report.stages.len());
//! # Ok(())
//! # }
//! ```

/// Run settings and their defaults
pub mod config;

/// Error taxonomy and exit codes
pub mod errors;

/// Polling expectations over the page
pub mod expect;

/// Spreadsheet fixture generation
pub mod fixture;

/// Child process helpers
pub mod process;

/// Element queries
pub mod query;

/// Orchestration of a full run
pub mod runner;

/// The observed UI lifecycle
pub mod scenario;

/// Static file server
pub mod server;

/// Shared value types and run reports
pub mod types;

/// WebDriver browser control
pub mod webdriver;

/// Automatic WebDriver process management
pub mod webdriver_manager;

pub use config::{ServerMode, Timeouts, VerifyConfig};
pub use errors::{VerifyError, VerifyResult};
pub use fixture::{CellValue, FixtureDataset, FixtureFile, FixtureRow, HeaderPolicy};
pub use query::Query;
pub use runner::{Interrupts, Runner, ScenarioKind};
pub use types::{ConsoleMessage, OutputFormat, RunReport, StageRecord, ViewportSize};
pub use webdriver::{Browser, BrowserType};
