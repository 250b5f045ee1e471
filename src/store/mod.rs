pub mod local;

use crate::error::FetchError;
use std::path::Path;

pub use local::LocalObjectStore;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectPage {
    pub keys: Vec<String>,
    /// Pass back to `list_page` to get the next page; `None` on the last one.
    pub next_continuation: Option<String>,
}

pub trait ObjectStore {
    fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<&str>,
        max_keys: usize,
    ) -> Result<ObjectPage, FetchError>;

    /// Writes the object to `local_path`, creating parent directories.
    /// Returns the number of bytes written.
    fn download(&self, bucket: &str, key: &str, local_path: &Path) -> Result<u64, FetchError>;
}

/// Lazily pages through every key under `prefix`. Once exhausted (or after
/// the first error) it yields nothing more.
pub fn list_objects<'a, S: ObjectStore + ?Sized>(
    store: &'a S,
    bucket: &'a str,
    prefix: &'a str,
    page_size: usize,
) -> ObjectKeys<'a, S> {
    ObjectKeys {
        store,
        bucket,
        prefix,
        page_size: page_size.max(1),
        buffered: Vec::new().into_iter(),
        continuation: None,
        done: false,
    }
}

pub struct ObjectKeys<'a, S: ObjectStore + ?Sized> {
    store: &'a S,
    bucket: &'a str,
    prefix: &'a str,
    page_size: usize,
    buffered: std::vec::IntoIter<String>,
    continuation: Option<String>,
    done: bool,
}

impl<S: ObjectStore + ?Sized> Iterator for ObjectKeys<'_, S> {
    type Item = Result<String, FetchError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(key) = self.buffered.next() {
                return Some(Ok(key));
            }
            if self.done {
                return None;
            }
            let page = match self.store.list_page(
                self.bucket,
                self.prefix,
                self.continuation.as_deref(),
                self.page_size,
            ) {
                Ok(page) => page,
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            };
            tracing::debug!(
                "listed page of {} keys under {}/{}",
                page.keys.len(),
                self.bucket,
                self.prefix
            );
            // An empty page can't advance the cursor, so it ends the listing.
            self.done = page.next_continuation.is_none() || page.keys.is_empty();
            self.continuation = page.next_continuation;
            self.buffered = page.keys.into_iter();
        }
    }
}
