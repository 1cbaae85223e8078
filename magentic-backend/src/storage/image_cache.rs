//! Time-bounded cache of downloaded images
//!
//! Keyed by blob URL so a stored run can be re-rendered without fetching the
//! same image again. Entries expire after the TTL; when full, the oldest entry
//! is evicted.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// How long a downloaded image is reused
pub const DEFAULT_TTL_SECS: u64 = 3600;
/// Maximum number of images kept at once
pub const DEFAULT_CAPACITY: usize = 128;

#[derive(Debug, Clone)]
struct CachedImage {
    bytes: Vec<u8>,
    fetched_at: Instant,
}

pub struct ImageCache {
    entries: RwLock<HashMap<String, CachedImage>>,
    ttl: Duration,
    capacity: usize,
}

impl ImageCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        ImageCache {
            entries: RwLock::new(HashMap::new()),
            ttl,
            capacity: capacity.max(1),
        }
    }

    /// Return a cached image if it has not expired
    pub fn get(&self, url: &str) -> Option<Vec<u8>> {
        {
            let entries = self.entries.read();
            match entries.get(url) {
                Some(entry) if entry.fetched_at.elapsed() < self.ttl => {
                    log::debug!("[IMAGE_CACHE] Hit for '{}'", url);
                    return Some(entry.bytes.clone());
                }
                Some(_) => {}
                None => return None,
            }
        }

        // Expired: drop it so the next download replaces it
        self.entries.write().remove(url);
        None
    }

    pub fn insert(&self, url: &str, bytes: Vec<u8>) {
        let mut entries = self.entries.write();

        let ttl = self.ttl;
        entries.retain(|_, entry| entry.fetched_at.elapsed() < ttl);

        if entries.len() >= self.capacity && !entries.contains_key(url) {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.fetched_at)
                .map(|(key, _)| key.clone());
            if let Some(key) = oldest {
                entries.remove(&key);
            }
        }

        entries.insert(
            url.to_string(),
            CachedImage {
                bytes,
                fetched_at: Instant::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ImageCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_TTL_SECS), DEFAULT_CAPACITY)
    }
}
