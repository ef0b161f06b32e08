//! In-memory object store used by tests and local dry runs.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Mutex;

use super::{ListPage, ObjectInfo, ObjectStore};

struct StoredObject {
    bytes: Vec<u8>,
    last_modified: DateTime<Utc>,
}

/// Keys are kept sorted so listings are stable; `page_size` forces multi-page
/// listings so continuation handling is actually exercised.
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, StoredObject>>,
    page_size: usize,
}

impl MemoryStore {
    pub fn new(page_size: usize) -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
            page_size,
        }
    }

    pub fn insert(&self, key: &str, bytes: Vec<u8>) {
        self.objects.lock().unwrap().insert(
            key.to_string(),
            StoredObject {
                bytes,
                last_modified: Utc::now(),
            },
        );
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn list_page(&self, prefix: &str, continuation: Option<&str>) -> Result<ListPage> {
        let objects = self.objects.lock().unwrap();
        let matching: Vec<ObjectInfo> = objects
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, obj)| ObjectInfo {
                key: key.clone(),
                size: obj.bytes.len() as u64,
                last_modified: obj.last_modified,
            })
            .collect();

        let offset: usize = match continuation {
            Some(token) => token
                .parse()
                .map_err(|_| anyhow!("bad continuation token `{token}`"))?,
            None => 0,
        };

        let page: Vec<ObjectInfo> = matching
            .iter()
            .skip(offset)
            .take(self.page_size)
            .cloned()
            .collect();

        let next_offset = offset + page.len();
        let next_continuation = (next_offset < matching.len()).then(|| next_offset.to_string());

        Ok(ListPage {
            objects: page,
            next_continuation,
        })
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .map(|obj| obj.bytes.clone())
            .ok_or_else(|| anyhow!("no such key `{key}`"))
    }

    async fn put(&self, key: &str, bytes: Vec<u8>, _content_type: &str) -> Result<()> {
        self.insert(key, bytes);
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("memory://{key}")
    }
}
