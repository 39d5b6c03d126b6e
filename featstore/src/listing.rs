//! Paginated key listing.
//!
//! Listings follow object-store "start-after" semantics: keys come back in
//! ascending lexicographic order and the continuation token of a page is the
//! last key it contained.

use crate::errors::{Result, StoreError};
use async_trait::async_trait;
use futures_util::stream::{self, Stream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    pub keys: Vec<String>,
    pub next_continuation: Option<String>,
}

#[async_trait]
pub trait ObjectLister: Send + Sync {
    /// Returns the page of keys under `prefix` that sort strictly after `continuation`.
    async fn list_page(&self, prefix: &str, continuation: Option<&str>) -> Result<ListPage>;
}

enum Cursor {
    Start,
    After(String),
    Done,
}

/// Lazily walks every key under `prefix`, requesting the next page only when the
/// current one has been consumed.
pub fn key_stream(
    lister: Arc<dyn ObjectLister>,
    prefix: String,
) -> impl Stream<Item = Result<String>> + Send {
    let pages = stream::try_unfold(Cursor::Start, move |cursor| {
        let lister = Arc::clone(&lister);
        let prefix = prefix.clone();
        async move {
            let continuation = match cursor {
                Cursor::Done => return Ok(None),
                Cursor::Start => None,
                Cursor::After(token) => Some(token),
            };
            let page = lister.list_page(&prefix, continuation.as_deref()).await?;
            let next = match page.next_continuation {
                Some(token) => Cursor::After(token),
                None => Cursor::Done,
            };
            let keys = page.keys.into_iter().map(Ok::<String, StoreError>);
            Ok::<_, StoreError>(Some((stream::iter(keys), next)))
        }
    });
    futures_util::TryStreamExt::try_flatten(pages)
}

/// Shared paging helper: slices an already sorted key list.
pub(crate) fn page_from_sorted<'a>(
    sorted_keys: impl Iterator<Item = &'a String>,
    prefix: &str,
    continuation: Option<&str>,
    page_size: usize,
) -> ListPage {
    let mut keys: Vec<String> = sorted_keys
        .filter(|key| key.starts_with(prefix))
        .filter(|key| continuation.is_none_or(|token| key.as_str() > token))
        .take(page_size + 1)
        .cloned()
        .collect();

    let next_continuation = if keys.len() > page_size {
        keys.truncate(page_size);
        keys.last().cloned()
    } else {
        None
    };
    ListPage {
        keys,
        next_continuation,
    }
}

/// In-memory listing source for tests and dry runs.
pub struct MemoryObjectLister {
    keys: Vec<String>,
    page_size: usize,
    pages_served: AtomicUsize,
}

impl MemoryObjectLister {
    pub fn new<I, S>(keys: I, page_size: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        keys.sort();
        keys.dedup();
        Self {
            keys,
            page_size: page_size.max(1),
            pages_served: AtomicUsize::new(0),
        }
    }

    pub fn pages_served(&self) -> usize {
        self.pages_served.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectLister for MemoryObjectLister {
    async fn list_page(&self, prefix: &str, continuation: Option<&str>) -> Result<ListPage> {
        self.pages_served.fetch_add(1, Ordering::SeqCst);
        Ok(page_from_sorted(
            self.keys.iter(),
            prefix,
            continuation,
            self.page_size,
        ))
    }
}
