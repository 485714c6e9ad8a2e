//! Cursor pagination walker.
//!
//! Drives a paged listing operation to completion, feeding the id of the last
//! item of each page back as the `starting_after` cursor of the next request.

use std::future::Future;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StripeServiceError};
use crate::gateway::{Identified, ListParams, MAX_PAGE_SIZE, Page};

const LOG_TARGET: &str = "stripe_service::gateway";

/// When to request another page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopRule {
    /// Continue while the gateway reports `has_more`.
    #[default]
    HasMore,
    /// Continue while the last page was full.
    FullPage,
    /// Continue while the last page held more than one item.
    ///
    /// A single-item page is still collected, then ends the walk, even when
    /// the gateway reports more items after it.
    SingleItem,
}

impl StopRule {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HasMore => "has_more",
            Self::FullPage => "full_page",
            Self::SingleItem => "single_item",
        }
    }

    fn should_continue<T>(&self, page: &Page<T>, limit: u8) -> bool {
        match self {
            Self::HasMore => page.has_more,
            Self::FullPage => page.data.len() >= usize::from(limit),
            Self::SingleItem => page.data.len() > 1,
        }
    }
}

impl FromStr for StopRule {
    type Err = StripeServiceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "has_more" => Ok(Self::HasMore),
            "full_page" => Ok(Self::FullPage),
            "single_item" => Ok(Self::SingleItem),
            other => Err(StripeServiceError::configuration(format!(
                "Invalid pagination stop rule: {}. Must be one of: has_more, full_page, single_item",
                other
            ))),
        }
    }
}

impl std::fmt::Display for StopRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Walks paged listings to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paginator {
    page_size: u8,
    stop_rule: StopRule,
}

impl Default for Paginator {
    fn default() -> Self {
        Self {
            page_size: MAX_PAGE_SIZE,
            stop_rule: StopRule::default(),
        }
    }
}

impl Paginator {
    /// Create a walker. `page_size` is clamped to 1..=100.
    #[must_use]
    pub fn new(page_size: u8, stop_rule: StopRule) -> Self {
        Self {
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
            stop_rule,
        }
    }

    #[must_use]
    pub fn page_size(&self) -> u8 {
        self.page_size
    }

    #[must_use]
    pub fn stop_rule(&self) -> StopRule {
        self.stop_rule
    }

    /// Collect every item of a listing, in listing order.
    ///
    /// `fetch` is called with the parameters of each page in turn. The first
    /// error it returns aborts the walk.
    pub async fn collect_all<T, F, Fut>(&self, listing: &str, fetch: F) -> Result<Vec<T>>
    where
        T: Identified,
        F: FnMut(ListParams) -> Fut,
        Fut: Future<Output = Result<Page<T>>>,
    {
        self.collect_with(listing, fetch, Some).await
    }

    /// Like [`collect_all`](Self::collect_all), but passes each item through
    /// `project` as its page arrives and keeps only the `Some` results.
    pub async fn collect_with<T, U, F, Fut, P>(
        &self,
        listing: &str,
        mut fetch: F,
        mut project: P,
    ) -> Result<Vec<U>>
    where
        T: Identified,
        F: FnMut(ListParams) -> Fut,
        Fut: Future<Output = Result<Page<T>>>,
        P: FnMut(T) -> Option<U>,
    {
        let mut out = Vec::new();
        let mut params = ListParams::first(self.page_size);
        let mut pages = 0usize;
        let mut scanned = 0usize;

        loop {
            let page = fetch(params.clone()).await?;
            pages += 1;

            let Some(cursor) = page.data.last().map(|item| item.id().to_string()) else {
                break;
            };
            // A page ending on the cursor it was requested after repeats the last one.
            if params.starting_after.as_deref() == Some(cursor.as_str()) {
                tracing::warn!(
                    target: LOG_TARGET,
                    listing = listing,
                    cursor = %cursor,
                    "Pagination cursor did not advance, stopping"
                );
                break;
            }
            let more = self.stop_rule.should_continue(&page, params.limit);

            scanned += page.data.len();
            out.extend(page.data.into_iter().filter_map(&mut project));

            if !more {
                break;
            }
            params = params.after(cursor);
        }

        tracing::debug!(
            target: LOG_TARGET,
            listing = listing,
            pages = pages,
            scanned = scanned,
            kept = out.len(),
            stop_rule = %self.stop_rule,
            "Walked listing"
        );

        Ok(out)
    }
}
