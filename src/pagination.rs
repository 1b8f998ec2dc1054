//! Offset pagination: page metadata and the lazy auto-pagination driver.

use std::future::Future;

use async_stream::try_stream;
use futures::Stream;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Result;
use crate::rate_limit::RateLimitInfo;
use crate::serde_helpers::deserialize_with_warnings;
use crate::transport::{RawResponse, ResponseMeta};

/// Page size used by the `stream_*` helpers when the request does not set a limit.
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// `meta` block of a paginated response.
#[non_exhaustive]
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PaginationMeta {
    /// Items matching the query across all pages
    pub total: u64,
    pub limit: u64,
    pub offset: u64,
    /// Per-source breakdown, shape varies by endpoint
    pub sources: Option<Value>,
}

impl PaginationMeta {
    #[must_use]
    pub fn new(total: u64, limit: u64, offset: u64) -> Self {
        Self {
            total,
            limit,
            offset,
            sources: None,
        }
    }

    #[must_use]
    pub fn has_more(&self) -> bool {
        self.offset.saturating_add(self.limit) < self.total
    }

    #[must_use]
    pub fn next_offset(&self) -> Option<u64> {
        self.has_more().then(|| self.offset + self.limit)
    }
}

/// One page of a paginated endpoint.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub meta: PaginationMeta,
    pub rate_limit: Option<RateLimitInfo>,
    pub http: ResponseMeta,
}

impl<T> Page<T> {
    #[must_use]
    pub fn has_more(&self) -> bool {
        self.meta.has_more()
    }

    #[must_use]
    pub fn next_offset(&self) -> Option<u64> {
        self.meta.next_offset()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.data.iter()
    }
}

impl<T> IntoIterator for Page<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.data.into_iter()
    }
}

impl<'page, T> IntoIterator for &'page Page<T> {
    type Item = &'page T;
    type IntoIter = std::slice::Iter<'page, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.data.iter()
    }
}

impl RawResponse {
    /// Converts an `{"data": [...], "meta": {...}}` envelope into a [`Page`].
    pub fn into_page<T: DeserializeOwned>(mut self) -> Result<Page<T>> {
        let data: Vec<T> = self.take_data()?;
        let meta = match self.body.get_mut("meta").map(Value::take) {
            None | Some(Value::Null) => PaginationMeta::default(),
            Some(meta) => deserialize_with_warnings(meta)?,
        };

        Ok(Page {
            data,
            meta,
            rate_limit: self.rate_limit,
            http: self.http,
        })
    }
}

/// Lazily walks every page of a list endpoint, yielding individual items.
///
/// `fetch` receives the offset and page size for each call, starting at offset 0. The stream
/// ends when a page reports no further pages, when a page comes back empty, or once
/// `max_items` items have been produced; in the last case no request beyond the one that
/// filled the cap is issued. The first error ends the stream.
///
/// The next offset is the current one advanced by the larger of the reported `limit` and the
/// number of items received, so a page with a zero `limit` or a stale `offset` still moves
/// the walk forward.
pub fn paginate<T, Call, Fut>(
    page_size: u32,
    max_items: Option<usize>,
    mut fetch: Call,
) -> impl Stream<Item = Result<T>>
where
    Call: FnMut(u64, u32) -> Fut,
    Fut: Future<Output = Result<Page<T>>>,
{
    try_stream! {
        let mut offset = 0_u64;
        let mut yielded = 0_usize;

        'pages: loop {
            if max_items.is_some_and(|max| yielded >= max) {
                break;
            }

            let page = fetch(offset, page_size).await?;
            if page.is_empty() {
                break;
            }

            let has_more = page.has_more();
            let received = u64::try_from(page.len()).unwrap_or(u64::MAX);
            let next_offset = offset.saturating_add(page.meta.limit.max(received));

            for item in page.data {
                yield item;
                yielded += 1;

                if max_items.is_some_and(|max| yielded >= max) {
                    break 'pages;
                }
            }

            if !has_more || next_offset <= offset {
                break;
            }
            offset = next_offset;
        }
    }
}
