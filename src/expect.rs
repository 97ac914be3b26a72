//! Polling expectations over the page.
//!
//! Each expectation re-resolves its [`Query`] every [`POLL_INTERVAL`] until
//! the condition holds or the timeout elapses. A timeout reports the
//! expectation together with the last observed state.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::errors::{VerifyError, VerifyResult};
use crate::query::Query;
use crate::webdriver::Browser;

pub const POLL_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of one check of the page
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub satisfied: bool,
    pub observed: String,
}

impl Observation {
    pub fn new(satisfied: bool, observed: impl Into<String>) -> Self {
        Self {
            satisfied,
            observed: observed.into(),
        }
    }
}

/// Run `check` until it reports the condition satisfied or `timeout`
/// elapses. Check errors count as "not yet" and become the observation.
pub async fn poll_until<F, Fut>(expectation: &str, timeout: Duration, mut check: F) -> VerifyResult<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<Observation>>,
{
    let deadline = Instant::now() + timeout;
    let mut observed = String::from("nothing yet");

    loop {
        match check().await {
            Ok(observation) if observation.satisfied => {
                debug!("Met: {} ({})", expectation, observation.observed);
                return Ok(());
            }
            Ok(observation) => observed = observation.observed,
            Err(e) => observed = format!("error: {e:#}"),
        }

        if Instant::now() >= deadline {
            return Err(VerifyError::Timeout {
                expectation: expectation.to_string(),
                timeout,
                observed,
            });
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Expectations on the elements a query points at
pub struct Expect<'a> {
    browser: &'a Browser,
    query: Query,
    timeout: Duration,
}

pub fn expect(browser: &Browser, query: Query) -> Expect<'_> {
    Expect {
        browser,
        query,
        timeout: DEFAULT_TIMEOUT,
    }
}

impl<'a> Expect<'a> {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn to_be_visible(self) -> VerifyResult<()> {
        let what = format!("{} to be visible", self.query);
        let (browser, query) = (self.browser, &self.query);
        poll_until(&what, self.timeout, || async move {
            match query.element(browser).await? {
                Some(element) => {
                    let shown = element.is_displayed().await?;
                    Ok(Observation::new(shown, if shown { "visible" } else { "hidden" }))
                }
                None => Ok(Observation::new(false, "not attached")),
            }
        })
        .await
    }

    /// A query with no matches counts as hidden
    pub async fn to_be_hidden(self) -> VerifyResult<()> {
        let what = format!("{} to be hidden", self.query);
        let (browser, query) = (self.browser, &self.query);
        poll_until(&what, self.timeout, || async move {
            match query.element(browser).await? {
                Some(element) => {
                    let shown = element.is_displayed().await?;
                    Ok(Observation::new(!shown, if shown { "visible" } else { "hidden" }))
                }
                None => Ok(Observation::new(true, "not attached")),
            }
        })
        .await
    }

    pub async fn to_have_count(self, expected: usize) -> VerifyResult<()> {
        let what = format!("{} to have count {}", self.query, expected);
        let (browser, query) = (self.browser, &self.query);
        poll_until(&what, self.timeout, || async move {
            let count = query.resolve(browser).await?.len();
            Ok(Observation::new(count == expected, format!("count {}", count)))
        })
        .await
    }

    pub async fn to_have_value(self, expected: &str) -> VerifyResult<()> {
        let what = format!("{} to have value \"{}\"", self.query, expected);
        let (browser, query) = (self.browser, &self.query);
        poll_until(&what, self.timeout, || async move {
            match query.element(browser).await? {
                Some(element) => {
                    let value = element.prop("value").await?.unwrap_or_default();
                    Ok(Observation::new(
                        value == expected,
                        format!("value \"{}\"", value),
                    ))
                }
                None => Ok(Observation::new(false, "not attached")),
            }
        })
        .await
    }

    /// The element's class list contains `token`
    pub async fn to_have_class(self, token: &str) -> VerifyResult<()> {
        let what = format!("{} to have class \"{}\"", self.query, token);
        let (browser, query) = (self.browser, &self.query);
        poll_until(&what, self.timeout, || async move {
            match query.element(browser).await? {
                Some(element) => {
                    let classes = element.attr("class").await?.unwrap_or_default();
                    Ok(Observation::new(
                        has_class_token(&classes, token),
                        format!("class \"{}\"", classes),
                    ))
                }
                None => Ok(Observation::new(false, "not attached")),
            }
        })
        .await
    }
}

pub fn has_class_token(classes: &str, token: &str) -> bool {
    classes.split_whitespace().any(|c| c == token)
}

#[cfg(test)]
#[path = "expect_test.rs"]
mod expect_test;
