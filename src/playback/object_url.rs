// Object URL registry - revocable handles bound to in-memory blobs.
// Each handle has exactly one owner and must be revoked exactly once.

use rand::{thread_rng, Rng};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::db::MediaBlob;

const URL_PREFIX: &str = "blob:purpleplayer/";

/// Shared registry of live object URLs. Cloning shares the same registry.
#[derive(Clone, Default)]
pub struct ObjectUrls {
    entries: Arc<Mutex<HashMap<String, Arc<MediaBlob>>>>,
}

impl ObjectUrls {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Arc<MediaBlob>>> {
        // Map operations cannot be left half-done, so a poisoned map is still valid.
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register `blob` under a fresh random URL.
    pub fn create(&self, blob: MediaBlob) -> String {
        let mut entries = self.entries();
        let mut rng = thread_rng();
        loop {
            let token: String = (0..16).map(|_| format!("{:02x}", rng.gen::<u8>())).collect();
            let url = format!("{}{}", URL_PREFIX, token);
            if !entries.contains_key(&url) {
                entries.insert(url.clone(), Arc::new(blob));
                return url;
            }
        }
    }

    /// Look up the blob behind a live URL.
    pub fn resolve(&self, url: &str) -> Option<Arc<MediaBlob>> {
        self.entries().get(url).cloned()
    }

    /// Release a URL. Returns false if it was not live.
    pub fn revoke(&self, url: &str) -> bool {
        self.entries().remove(url).is_some()
    }

    /// Number of URLs that have been created and not yet revoked.
    pub fn live_count(&self) -> usize {
        self.entries().len()
    }

    /// Register `blob` and tie the URL's lifetime to the returned lease.
    pub fn lease(&self, blob: MediaBlob) -> UrlLease {
        let url = self.create(blob);
        UrlLease {
            urls: self.clone(),
            url,
        }
    }
}

/// An object URL that is revoked when dropped.
pub struct UrlLease {
    urls: ObjectUrls,
    url: String,
}

impl UrlLease {
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Drop for UrlLease {
    fn drop(&mut self) {
        self.urls.revoke(&self.url);
    }
}

impl std::fmt::Debug for UrlLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("UrlLease").field(&self.url).finish()
    }
}
