//! Element queries resolved against the live page.
//!
//! A [`Query`] is a chain of CSS steps, each optionally filtered to elements
//! whose rendered text contains a string, plus an optional index into the
//! final matches. It is re-resolved on every poll so it never holds stale
//! element references.

use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;

use anyhow::Result;
use fantoccini::Locator;
use fantoccini::elements::Element;

use crate::webdriver::Browser;

#[derive(Debug, Clone, PartialEq)]
struct Step {
    css: String,
    has_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    steps: Vec<Step>,
    nth: Option<usize>,
}

impl Query {
    pub fn css(selector: &str) -> Self {
        Self {
            steps: vec![Step {
                css: selector.to_string(),
                has_text: None,
            }],
            nth: None,
        }
    }

    /// Keep only elements of the last step whose text contains `text`
    /// (case-insensitive, whitespace-normalized)
    pub fn has_text(mut self, text: &str) -> Self {
        if let Some(step) = self.steps.last_mut() {
            step.has_text = Some(text.to_string());
        }
        self
    }

    /// Descendants of the current matches
    pub fn locator(mut self, selector: &str) -> Self {
        self.steps.push(Step {
            css: selector.to_string(),
            has_text: None,
        });
        self.nth = None;
        self
    }

    pub fn nth(mut self, index: usize) -> Self {
        self.nth = Some(index);
        self
    }

    pub fn first(self) -> Self {
        self.nth(0)
    }

    /// All elements currently matching the query
    pub async fn resolve(&self, browser: &Browser) -> Result<Vec<Element>> {
        let mut current: Vec<Element> = Vec::new();

        for (depth, step) in self.steps.iter().enumerate() {
            let candidates = if depth == 0 {
                browser.find_all(&step.css).await?
            } else {
                let mut found = Vec::new();
                for parent in &current {
                    found.extend(parent.find_all(Locator::Css(&step.css)).await?);
                }
                // Nested parents reach the same descendants more than once
                unique_by(found, |element| element.element_id().to_string())
            };

            current = match &step.has_text {
                Some(needle) => {
                    let mut kept = Vec::with_capacity(candidates.len());
                    for element in candidates {
                        let text = element.text().await.unwrap_or_default();
                        if text_matches(&text, needle) {
                            kept.push(element);
                        }
                    }
                    kept
                }
                None => candidates,
            };
        }

        Ok(match self.nth {
            Some(index) => current.into_iter().nth(index).into_iter().collect(),
            None => current,
        })
    }

    /// The single element this query points at, if present
    pub async fn element(&self, browser: &Browser) -> Result<Option<Element>> {
        Ok(self.resolve(browser).await?.into_iter().next())
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.steps.iter().enumerate() {
            if i > 0 {
                f.write_str(" >> ")?;
            }
            f.write_str(&step.css)?;
            if let Some(text) = &step.has_text {
                write!(f, ":has-text(\"{}\")", text)?;
            }
        }
        if let Some(index) = self.nth {
            write!(f, " >> nth={}", index)?;
        }
        Ok(())
    }
}

/// Drop later items whose key was already seen, keeping order
pub fn unique_by<T, K, F>(items: Vec<T>, key: F) -> Vec<T>
where
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let mut seen = HashSet::new();
    items.into_iter().filter(|item| seen.insert(key(item))).collect()
}

/// Case-insensitive substring match with runs of whitespace collapsed
pub fn text_matches(haystack: &str, needle: &str) -> bool {
    let normalize = |s: &str| s.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    normalize(haystack).contains(&normalize(needle))
}

#[cfg(test)]
#[path = "query_test.rs"]
mod query_test;
