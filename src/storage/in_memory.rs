// src/storage/in_memory.rs

//! In-memory storage strategy.
//!
//! Containers are ordinary in-process collections: fast, but memory-unsafe
//! for very large jobs. The annotation factory bounds *stored* rows per
//! annotation with a sampling threshold while keeping counts exact, and
//! caches each row once (by row identity) shared across annotations.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use tracing::debug;

use crate::storage::annotation::{RowAnnotation, RowAnnotationFactory};
use crate::storage::row::{DataRow, RowId, Value};
use crate::storage::{ProvidedList, ProvidedMap, ProvidedSet, Storable};

/// Default maximum number of rows retained per annotation for inspection.
pub const DEFAULT_STORED_ROWS_THRESHOLD: usize = 1000;

/// In-memory implementation of the storage provider strategy.
#[derive(Debug, Clone)]
pub struct InMemoryStorageProvider {
    stored_rows_threshold: usize,
}

impl Default for InMemoryStorageProvider {
    fn default() -> Self {
        Self::new(DEFAULT_STORED_ROWS_THRESHOLD)
    }
}

impl InMemoryStorageProvider {
    pub fn new(stored_rows_threshold: usize) -> Self {
        Self {
            stored_rows_threshold,
        }
    }

    pub fn create_list<T: Storable>(&self) -> Result<Box<dyn ProvidedList<T>>> {
        Ok(Box::new(InMemoryList {
            items: Vec::new(),
            _marker: std::marker::PhantomData,
        }))
    }

    pub fn create_set<T: Storable>(&self) -> Result<Box<dyn ProvidedSet<T>>> {
        Ok(Box::new(InMemorySet {
            items: HashSet::new(),
            _marker: std::marker::PhantomData,
        }))
    }

    pub fn create_map<K: Storable, V: Storable>(&self) -> Result<Box<dyn ProvidedMap<K, V>>> {
        Ok(Box::new(InMemoryMap {
            entries: HashMap::new(),
            _marker: std::marker::PhantomData,
        }))
    }

    pub fn create_row_annotation_factory(&self) -> Result<Arc<dyn RowAnnotationFactory>> {
        Ok(Arc::new(InMemoryRowAnnotationFactory::new(
            self.stored_rows_threshold,
        )))
    }
}

/// Plain `Vec` behind the list contract. Elements are kept as [`Value`]s so
/// the container's shape matches the SQL-backed one.
struct InMemoryList<T> {
    items: Vec<Value>,
    _marker: std::marker::PhantomData<T>,
}

impl<T: Storable> ProvidedList<T> for InMemoryList<T> {
    fn push(&mut self, item: T) -> Result<()> {
        self.items.push(item.to_value());
        Ok(())
    }

    fn get(&self, index: usize) -> Result<Option<T>> {
        Ok(self.items.get(index).and_then(T::from_value))
    }

    fn len(&self) -> usize {
        self.items.len()
    }

    fn items(&self) -> Result<Vec<T>> {
        Ok(self.items.iter().filter_map(T::from_value).collect())
    }
}

struct InMemorySet<T> {
    items: HashSet<Value>,
    _marker: std::marker::PhantomData<T>,
}

impl<T: Storable> ProvidedSet<T> for InMemorySet<T> {
    fn insert(&mut self, item: T) -> Result<bool> {
        Ok(self.items.insert(item.to_value()))
    }

    fn remove(&mut self, item: &T) -> Result<bool> {
        Ok(self.items.remove(&item.to_value()))
    }

    fn contains(&self, item: &T) -> Result<bool> {
        Ok(self.items.contains(&item.to_value()))
    }

    fn len(&self) -> usize {
        self.items.len()
    }

    fn items(&self) -> Result<Vec<T>> {
        Ok(self.items.iter().filter_map(T::from_value).collect())
    }
}

struct InMemoryMap<K, V> {
    entries: HashMap<Value, Value>,
    _marker: std::marker::PhantomData<(K, V)>,
}

impl<K: Storable, V: Storable> ProvidedMap<K, V> for InMemoryMap<K, V> {
    fn put(&mut self, key: K, value: V) -> Result<Option<V>> {
        let previous = self.entries.insert(key.to_value(), value.to_value());
        Ok(previous.as_ref().and_then(V::from_value))
    }

    fn get(&self, key: &K) -> Result<Option<V>> {
        Ok(self.entries.get(&key.to_value()).and_then(V::from_value))
    }

    fn remove(&mut self, key: &K) -> Result<Option<V>> {
        let previous = self.entries.remove(&key.to_value());
        Ok(previous.as_ref().and_then(V::from_value))
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn entries(&self) -> Result<Vec<(K, V)>> {
        Ok(self
            .entries
            .iter()
            .filter_map(|(k, v)| Some((K::from_value(k)?, V::from_value(v)?)))
            .collect())
    }
}

/// Per-annotation membership: insertion-ordered row ids with their
/// distinct-count weights, plus a set for idempotence checks.
#[derive(Debug, Default)]
struct Membership {
    ordered: Vec<(RowId, usize)>,
    seen: HashSet<RowId>,
}

/// In-memory annotation factory.
///
/// Mutable state is one mutex over the whole factory; annotation counters
/// on the handles themselves are atomic, so `row_count()` reads never take
/// the lock.
pub struct InMemoryRowAnnotationFactory {
    stored_rows_threshold: usize,
    next_annotation_id: AtomicUsize,
    state: Mutex<FactoryState>,
}

#[derive(Debug, Default)]
struct FactoryState {
    /// Rows cached once by identity, shared across annotations.
    row_cache: HashMap<RowId, Arc<DataRow>>,
    /// Stored membership per annotation id.
    memberships: HashMap<usize, Membership>,
}

impl InMemoryRowAnnotationFactory {
    pub fn new(stored_rows_threshold: usize) -> Self {
        Self {
            stored_rows_threshold,
            next_annotation_id: AtomicUsize::new(0),
            state: Mutex::new(FactoryState::default()),
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, FactoryState> {
        // A poisoned lock means a panic mid-mutation; storage failures are
        // fatal to the job either way, so propagate the panic.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl RowAnnotationFactory for InMemoryRowAnnotationFactory {
    fn create_annotation(&self) -> RowAnnotation {
        let id = self.next_annotation_id.fetch_add(1, Ordering::SeqCst);
        RowAnnotation::new(id)
    }

    fn annotate(
        &self,
        row: &DataRow,
        distinct_count: usize,
        annotation: &RowAnnotation,
    ) -> Result<()> {
        let mut guard = self.lock_state();
        let state = &mut *guard;

        let membership = state.memberships.entry(annotation.id()).or_default();
        if !membership.seen.insert(row.id()) {
            // Already annotated under this annotation; idempotent.
            return Ok(());
        }

        if membership.ordered.len() < self.stored_rows_threshold {
            membership.ordered.push((row.id(), distinct_count));
            state
                .row_cache
                .entry(row.id())
                .or_insert_with(|| Arc::new(row.clone()));
        } else {
            debug!(
                annotation = annotation.id(),
                row = row.id().0,
                threshold = self.stored_rows_threshold,
                "stored-rows threshold reached; counting row without storing it"
            );
        }

        annotation.increment_row_count(distinct_count);
        Ok(())
    }

    fn rows(&self, annotation: &RowAnnotation) -> Result<Vec<DataRow>> {
        let state = self.lock_state();
        let rows = match state.memberships.get(&annotation.id()) {
            Some(membership) => membership
                .ordered
                .iter()
                .filter_map(|(id, _)| state.row_cache.get(id))
                .map(|row| (**row).clone())
                .collect(),
            None => Vec::new(),
        };
        Ok(rows)
    }

    fn reset(&self, annotation: &RowAnnotation) -> Result<()> {
        let mut state = self.lock_state();
        state.memberships.remove(&annotation.id());
        annotation.reset_row_count();
        Ok(())
    }

    fn value_counts(
        &self,
        annotation: &RowAnnotation,
        column: &str,
    ) -> Result<HashMap<Value, usize>> {
        let state = self.lock_state();
        let mut counts = HashMap::new();
        if let Some(membership) = state.memberships.get(&annotation.id()) {
            for (id, weight) in &membership.ordered {
                if let Some(row) = state.row_cache.get(id) {
                    if let Some(value) = row.value(column) {
                        *counts.entry(value.clone()).or_insert(0) += weight;
                    }
                }
            }
        }
        Ok(counts)
    }
}
