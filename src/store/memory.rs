//! In-process [`VectorStore`] for tests.
//!
//! Collections keep insertion order. Query ranking is the number of query
//! terms a document shares, ties broken by insertion order. A fault knob
//! makes `add` fail after a set number of calls so partial uploads can be
//! reproduced.

use super::{Metadata, MetadataFilter, QueryHit, StoreRecord, VectorStore};
use crate::error::{Result, ScholarError};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

type Collections = Vec<(String, Vec<StoreRecord>)>;

#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<Collections>,
    fail_adds_after: Option<usize>,
    adds: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Let the first `n` `add` calls succeed and fail every later one.
    pub fn fail_adds_after(mut self, n: usize) -> Self {
        self.fail_adds_after = Some(n);
        self
    }

    /// Seed a collection directly.
    pub fn with_collection(self, name: &str, records: Vec<StoreRecord>) -> Self {
        if let Ok(mut collections) = self.collections.write() {
            collections.push((name.to_string(), records));
        }
        self
    }

    /// Snapshot of one collection's records.
    pub fn records(&self, collection: &str) -> Vec<StoreRecord> {
        self.read()
            .ok()
            .and_then(|c| {
                c.iter()
                    .find(|(name, _)| name == collection)
                    .map(|(_, r)| r.clone())
            })
            .unwrap_or_default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Collections>> {
        self.collections
            .read()
            .map_err(|_| ScholarError::Store("memory store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Collections>> {
        self.collections
            .write()
            .map_err(|_| ScholarError::Store("memory store lock poisoned".to_string()))
    }
}

fn missing(collection: &str) -> ScholarError {
    ScholarError::Store(format!("Collection '{}' does not exist", collection))
}

fn overlap(query_terms: &HashSet<String>, document: &str) -> usize {
    document
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<HashSet<_>>()
        .intersection(query_terms)
        .count()
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn list_collections(&self) -> Result<Vec<String>> {
        Ok(self.read()?.iter().map(|(name, _)| name.clone()).collect())
    }

    async fn create_collection(&self, name: &str) -> Result<()> {
        let mut collections = self.write()?;
        if collections.iter().any(|(n, _)| n == name) {
            return Err(ScholarError::Store(format!(
                "Collection '{}' already exists",
                name
            )));
        }
        collections.push((name.to_string(), Vec::new()));
        Ok(())
    }

    async fn add(&self, collection: &str, records: &[StoreRecord]) -> Result<()> {
        let call = self.adds.fetch_add(1, Ordering::SeqCst);
        if self.fail_adds_after.is_some_and(|limit| call >= limit) {
            return Err(ScholarError::Store(format!(
                "Injected failure on add #{} to '{}'",
                call + 1,
                collection
            )));
        }

        let mut collections = self.write()?;
        let (_, stored) = collections
            .iter_mut()
            .find(|(n, _)| n == collection)
            .ok_or_else(|| missing(collection))?;

        for record in records {
            match stored.iter_mut().find(|r| r.id == record.id) {
                Some(existing) => *existing = record.clone(),
                None => stored.push(record.clone()),
            }
        }
        Ok(())
    }

    async fn get(
        &self,
        collection: &str,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<StoreRecord>> {
        let collections = self.read()?;
        let (_, stored) = collections
            .iter()
            .find(|(n, _)| n == collection)
            .ok_or_else(|| missing(collection))?;

        Ok(stored
            .iter()
            .filter(|r| filter.map_or(true, |f| f.matches(&r.metadata)))
            .cloned()
            .collect())
    }

    async fn update_metadata(&self, collection: &str, id: &str, metadata: &Metadata) -> Result<()> {
        let mut collections = self.write()?;
        let (_, stored) = collections
            .iter_mut()
            .find(|(n, _)| n == collection)
            .ok_or_else(|| missing(collection))?;

        let record = stored
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| ScholarError::Store(format!("No record '{}' in '{}'", id, collection)))?;
        record.metadata = metadata.clone();
        Ok(())
    }

    async fn query(&self, collection: &str, text: &str, n_results: usize) -> Result<Vec<QueryHit>> {
        let collections = self.read()?;
        let (_, stored) = collections
            .iter()
            .find(|(n, _)| n == collection)
            .ok_or_else(|| missing(collection))?;

        let terms: HashSet<String> = text.split_whitespace().map(str::to_lowercase).collect();
        let mut scored: Vec<(usize, &StoreRecord)> = stored
            .iter()
            .map(|r| (overlap(&terms, &r.document), r))
            .collect();
        // stable: equal scores keep insertion order
        scored.sort_by(|a, b| b.0.cmp(&a.0));

        Ok(scored
            .into_iter()
            .take(n_results)
            .map(|(score, r)| QueryHit {
                id: r.id.clone(),
                document: r.document.clone(),
                metadata: r.metadata.clone(),
                distance: Some(1.0 / (1.0 + score as f32)),
            })
            .collect())
    }
}
