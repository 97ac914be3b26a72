//! The UI lifecycle a verification run observes.
//!
//! The page under test drives every transition; the run only waits for each
//! stage in order, within that stage's bound, and records when it got there.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::info;

use crate::config::Timeouts;
use crate::errors::{VerifyError, VerifyResult};
use crate::expect::expect;
use crate::fixture::FixtureDataset;
use crate::query::Query;
use crate::types::StageRecord;
use crate::webdriver::Browser;

pub const FILE_UPLOADER: &str = "#fileUploader";
pub const LOADER_OVERLAY: &str = "#loader-overlay";
pub const DASHBOARD: &str = "#dashboard";
pub const SUPPLIER_TAB: &str = "#tab3";
pub const SUPPLIER_PAGE: &str = "#page3";
pub const SUPPLIER_ROWS: &str = "#supplier-analysis-body tr";
pub const ASSIGNMENT_DROPDOWN: &str = ".add-to-select";
pub const STARTUP_SCREEN: &str = "#startupScreen";

const SUPPLIER_COLUMN: &str = "Supplier Name";
const TYPE_COLUMN: &str = "Type";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Idle,
    Uploading,
    ProcessingDone,
    DashboardReady,
    SupplierTabSelected,
    RowInteraction,
    Verified,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::Idle,
        Stage::Uploading,
        Stage::ProcessingDone,
        Stage::DashboardReady,
        Stage::SupplierTabSelected,
        Stage::RowInteraction,
        Stage::Verified,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Idle => "idle",
            Stage::Uploading => "uploading",
            Stage::ProcessingDone => "processing-done",
            Stage::DashboardReady => "dashboard-ready",
            Stage::SupplierTabSelected => "supplier-tab-selected",
            Stage::RowInteraction => "row-interaction",
            Stage::Verified => "verified",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Records when each stage was reached, relative to the scenario start
pub struct StageTracker {
    started: Instant,
    records: Vec<StageRecord>,
}

impl Default for StageTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StageTracker {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            records: Vec::new(),
        }
    }

    pub fn reached(&mut self, stage: impl fmt::Display) {
        let elapsed = self.started.elapsed().as_millis() as u64;
        info!("Stage reached: {} (+{}ms)", stage, elapsed);
        self.records.push(StageRecord {
            stage: stage.to_string(),
            reached_after_ms: elapsed,
        });
    }

    pub fn into_records(self) -> Vec<StageRecord> {
        self.records
    }
}

/// What the supplier page must show for a given fixture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupplierPlan {
    /// One table row per distinct (supplier, type) pair
    pub expected_rows: usize,
    /// Supplier whose dropdowns are exercised
    pub supplier: String,
    /// One dropdown per distinct type of that supplier
    pub expected_dropdowns: usize,
    pub assignee: String,
    pub unassigned: String,
}

impl SupplierPlan {
    pub fn from_dataset(dataset: &FixtureDataset, supplier: &str) -> Self {
        Self {
            expected_rows: dataset.distinct_pairs(SUPPLIER_COLUMN, TYPE_COLUMN),
            supplier: supplier.to_string(),
            expected_dropdowns: dataset.distinct_values_for(
                SUPPLIER_COLUMN,
                supplier,
                TYPE_COLUMN,
            ),
            assignee: "Admin".to_string(),
            unassigned: "None".to_string(),
        }
    }

    /// Dropdowns inside the rows belonging to the plan's supplier
    pub fn dropdowns(&self) -> Query {
        Query::css("tr")
            .has_text(&self.supplier)
            .locator(ASSIGNMENT_DROPDOWN)
    }
}

/// Upload a fixture, open the supplier page and check that assignment
/// dropdowns of one supplier stay linked.
pub struct SupplierDropdownScenario {
    pub plan: SupplierPlan,
    pub timeouts: Timeouts,
    pub screenshot: PathBuf,
}

impl SupplierDropdownScenario {
    pub const NAME: &'static str = "supplier-dropdowns";

    pub async fn run(
        &self,
        browser: &Browser,
        page_url: &str,
        fixture: &Path,
        tracker: &mut StageTracker,
    ) -> VerifyResult<()> {
        let t = &self.timeouts;
        let plan = &self.plan;

        browser.goto(page_url).await?;
        expect(browser, Query::css(FILE_UPLOADER))
            .with_timeout(t.default)
            .to_have_count(1)
            .await?;
        tracker.reached(Stage::Idle);

        browser.set_input_files(FILE_UPLOADER, fixture).await?;
        expect(browser, Query::css(LOADER_OVERLAY))
            .with_timeout(t.loader_visible)
            .to_be_visible()
            .await?;
        tracker.reached(Stage::Uploading);

        expect(browser, Query::css(LOADER_OVERLAY))
            .with_timeout(t.loader_hidden)
            .to_be_hidden()
            .await?;
        tracker.reached(Stage::ProcessingDone);

        expect(browser, Query::css(DASHBOARD))
            .with_timeout(t.dashboard_visible)
            .to_be_visible()
            .await?;
        tracker.reached(Stage::DashboardReady);

        browser.click(SUPPLIER_TAB).await?;
        expect(browser, Query::css(SUPPLIER_PAGE))
            .with_timeout(t.default)
            .to_have_class("active")
            .await?;
        expect(browser, Query::css(SUPPLIER_ROWS))
            .with_timeout(t.default)
            .to_have_count(plan.expected_rows)
            .await?;
        tracker.reached(Stage::SupplierTabSelected);

        let dropdowns = plan.dropdowns();
        expect(browser, dropdowns.clone())
            .with_timeout(t.default)
            .to_have_count(plan.expected_dropdowns)
            .await?;
        for index in 0..plan.expected_dropdowns {
            expect(browser, dropdowns.clone().nth(index))
                .with_timeout(t.default)
                .to_have_value(&plan.unassigned)
                .await?;
        }

        self.select(browser, dropdowns.clone().first(), &plan.assignee)
            .await?;
        tracker.reached(Stage::RowInteraction);

        browser.screenshot(&self.screenshot).await?;

        if plan.expected_dropdowns < 2 {
            info!("Only one dropdown for {}, nothing linked to check", plan.supplier);
            tracker.reached(Stage::Verified);
            return Ok(());
        }

        // Linked in both directions: first to second, then second to first
        expect(browser, dropdowns.clone().nth(1))
            .with_timeout(t.default)
            .to_have_value(&plan.assignee)
            .await?;
        self.select(browser, dropdowns.clone().nth(1), &plan.unassigned)
            .await?;
        expect(browser, dropdowns.first())
            .with_timeout(t.default)
            .to_have_value(&plan.unassigned)
            .await?;
        tracker.reached(Stage::Verified);

        Ok(())
    }

    async fn select(&self, browser: &Browser, query: Query, option: &str) -> VerifyResult<()> {
        let what = query.to_string();
        let element = query.element(browser).await?.ok_or_else(|| {
            VerifyError::Assertion {
                expected: format!("{} to exist", what),
                actual: "no matching element".to_string(),
            }
        })?;
        browser.select_option(&element, option).await?;
        Ok(())
    }
}

/// The application renders its startup screen
pub struct SmokeScenario {
    pub timeouts: Timeouts,
    pub screenshot: PathBuf,
}

impl SmokeScenario {
    pub const NAME: &'static str = "smoke";

    pub async fn run(
        &self,
        browser: &Browser,
        page_url: &str,
        tracker: &mut StageTracker,
    ) -> VerifyResult<()> {
        browser.goto(page_url).await?;
        tracker.reached("loaded");

        // Screenshot first so a blank page still leaves an artifact
        browser.screenshot(&self.screenshot).await?;

        for query in [
            Query::css(STARTUP_SCREEN),
            Query::css("h2").has_text("GST Reconciliation Pro"),
            Query::css("label").has_text("Upload New Excel File"),
        ] {
            expect(browser, query)
                .with_timeout(self.timeouts.default)
                .to_be_visible()
                .await?;
        }
        tracker.reached("startup-screen");

        Ok(())
    }
}

#[cfg(test)]
#[path = "scenario_test.rs"]
mod scenario_test;
