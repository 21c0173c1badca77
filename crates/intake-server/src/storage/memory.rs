use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::{ArtifactStore, LandingSource};

/// In-process landing source and artifact store.
///
/// `fail_next_puts` makes the next N artifact writes fail, for exercising
/// staging failures.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    fail_puts: AtomicUsize,
    puts: AtomicUsize,
    fetches: AtomicUsize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Land a file at `location`, replacing any previous content
    pub fn insert(&self, location: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        if let Ok(mut objects) = self.objects.lock() {
            objects.insert(location.into(), bytes.into());
        }
    }

    pub fn get(&self, location: &str) -> Option<Vec<u8>> {
        self.objects.lock().ok()?.get(location).cloned()
    }

    /// Number of successful artifact writes
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn fail_next_puts(&self, n: usize) {
        self.fail_puts.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl LandingSource for MemoryStorage {
    async fn fetch(&self, location: &str) -> Result<Vec<u8>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.get(location)
            .ok_or_else(|| anyhow!("No object at {}", location))
    }
}

#[async_trait]
impl ArtifactStore for MemoryStorage {
    async fn put(&self, path: &str, bytes: Vec<u8>) -> Result<String> {
        let injected = self
            .fail_puts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            bail!("Injected staging failure for {}", path);
        }

        let mut objects = self
            .objects
            .lock()
            .map_err(|_| anyhow!("Memory storage lock poisoned"))?;
        if objects.contains_key(path) {
            bail!("Object already exists at {}", path);
        }
        objects.insert(path.to_string(), bytes);
        self.puts.fetch_add(1, Ordering::SeqCst);

        Ok(format!("memory://{}", path))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_once_and_injected_failure() {
        let storage = MemoryStorage::new();
        storage.fail_next_puts(1);
        assert!(storage.put("a.parquet", vec![1]).await.is_err());

        assert_eq!(storage.put("a.parquet", vec![1]).await.unwrap(), "memory://a.parquet");
        assert!(storage.put("a.parquet", vec![2]).await.is_err());
        assert_eq!(storage.put_count(), 1);
        assert_eq!(storage.get("a.parquet"), Some(vec![1]));
    }

    #[tokio::test]
    async fn test_fetch_landed_file() {
        let storage = MemoryStorage::new();
        storage.insert("landing/orders/a.csv", "id\n1\n");
        assert_eq!(storage.fetch("landing/orders/a.csv").await.unwrap(), b"id\n1\n");
        assert!(storage.fetch("landing/orders/b.csv").await.is_err());
        assert_eq!(storage.fetch_count(), 2);
    }
}
