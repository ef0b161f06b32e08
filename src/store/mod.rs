//! Object storage seam.
//!
//! Everything durable in this system lives in a blob store: raw report files,
//! the master roster, student photos, and the generated registry workbook.
//! Components talk to the [`ObjectStore`] trait so the paginated listing
//! behavior is testable without a live bucket.

pub mod memory;
pub mod s3;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use memory::MemoryStore;
pub use s3::S3Store;

/// Listing entry metadata.
#[derive(Debug, Clone)]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

impl ObjectInfo {
    /// Basename of the key.
    pub fn file_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }
}

/// One page of a listing.
#[derive(Debug, Default)]
pub struct ListPage {
    pub objects: Vec<ObjectInfo>,
    /// Token for the next page; `None` means the listing is exhausted.
    pub next_continuation: Option<String>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Returns one page of objects under `prefix`. Pass the previous page's
    /// continuation token to advance; `None` starts from the beginning.
    async fn list_page(&self, prefix: &str, continuation: Option<&str>) -> Result<ListPage>;

    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()>;

    /// Stable public URL for a stored object.
    fn public_url(&self, key: &str) -> String;
}

/// Drains every page of a listing. Providers cap page sizes (S3 at 1000
/// keys), so a single page must never be assumed sufficient.
pub async fn list_all(store: &dyn ObjectStore, prefix: &str) -> Result<Vec<ObjectInfo>> {
    let mut objects = Vec::new();
    let mut continuation: Option<String> = None;

    loop {
        let page = store.list_page(prefix, continuation.as_deref()).await?;
        objects.extend(page.objects);
        match page.next_continuation {
            Some(token) => continuation = Some(token),
            None => break,
        }
    }

    Ok(objects)
}
