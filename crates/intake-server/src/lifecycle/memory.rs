//! In-process lifecycle store for tests and single-node development

use async_trait::async_trait;
use intake_common::FileFingerprint;
use std::collections::HashMap;
use std::sync::Mutex;

use super::record::{Expected, FileLifecycleRecord};
use super::store::{LifecycleStore, PutOutcome, StoreError, StoreResult};

#[derive(Debug, Default)]
pub struct MemoryLifecycleStore {
    records: Mutex<HashMap<FileFingerprint, FileLifecycleRecord>>,
}

impl MemoryLifecycleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, HashMap<FileFingerprint, FileLifecycleRecord>>> {
        self.records
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl LifecycleStore for MemoryLifecycleStore {
    async fn get(&self, fingerprint: &FileFingerprint) -> StoreResult<Option<FileLifecycleRecord>> {
        Ok(self.lock()?.get(fingerprint).cloned())
    }

    async fn put(&self, record: &FileLifecycleRecord, expected: Expected) -> StoreResult<PutOutcome> {
        let mut records = self.lock()?;
        let current = records.get(&record.fingerprint);

        let matches = match (expected, current) {
            (Expected::Absent, None) => true,
            (Expected::Observed { status, version }, Some(stored)) => {
                stored.status == status && stored.version == version
            },
            _ => false,
        };

        if !matches {
            return Ok(PutOutcome::Contended(current.cloned()));
        }

        records.insert(record.fingerprint.clone(), record.clone());
        Ok(PutOutcome::Written(record.clone()))
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
