// src/storage/mod.rs

//! Pluggable backing storage for large/unbounded collections and row
//! annotations.
//!
//! - [`row`] holds the row data model shared by all backends.
//! - [`annotation`] defines the annotation handle and factory contract.
//! - [`in_memory`] is the fast, unbounded-memory strategy.
//! - [`sql`] is the disk-resident, bounded-memory strategy (SQLite).
//!
//! A [`StorageProvider`] is created once per job. The `Combined` variant
//! lets plain collections use one strategy while row annotations use
//! another, so the slow/bounded path is only paid for where it matters.

pub mod annotation;
pub mod in_memory;
pub mod row;
pub mod sql;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

pub use annotation::{RowAnnotation, RowAnnotationFactory};
pub use in_memory::InMemoryStorageProvider;
pub use row::{DataRow, RowId, Value};
pub use sql::SqlStorageProvider;

/// Element types that can live in a provided container.
///
/// Conversion goes through [`Value`] so that the SQL-backed containers can
/// persist elements without knowing their Rust type.
pub trait Storable: Clone + Send + 'static {
    fn to_value(&self) -> Value;
    fn from_value(value: &Value) -> Option<Self>;
}

impl Storable for i64 {
    fn to_value(&self) -> Value {
        Value::Int(*self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl Storable for bool {
    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(*b),
            // SQLite stores booleans as integers.
            Value::Int(i) => Some(*i != 0),
            _ => None,
        }
    }
}

impl Storable for f64 {
    fn to_value(&self) -> Value {
        Value::Real(*self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Real(r) => Some(*r),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }
}

impl Storable for String {
    fn to_value(&self) -> Value {
        Value::Text(self.clone())
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Text(s) => Some(s.clone()),
            _ => None,
        }
    }
}

impl Storable for Value {
    fn to_value(&self) -> Value {
        self.clone()
    }

    fn from_value(value: &Value) -> Option<Self> {
        Some(value.clone())
    }
}

/// Append-oriented list container with an opaque backing strategy.
pub trait ProvidedList<T: Storable>: Send {
    fn push(&mut self, item: T) -> Result<()>;
    fn get(&self, index: usize) -> Result<Option<T>>;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Materialize the list contents in insertion order.
    fn items(&self) -> Result<Vec<T>>;
}

/// Set container with an opaque backing strategy.
pub trait ProvidedSet<T: Storable>: Send {
    /// Returns `true` if the element was newly inserted.
    fn insert(&mut self, item: T) -> Result<bool>;
    /// Returns `true` if the element was present.
    fn remove(&mut self, item: &T) -> Result<bool>;
    fn contains(&self, item: &T) -> Result<bool>;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Materialize the set contents (unspecified order).
    fn items(&self) -> Result<Vec<T>>;
}

/// Map container with an opaque backing strategy.
pub trait ProvidedMap<K: Storable, V: Storable>: Send {
    /// Returns the previous value for `key`, if any.
    fn put(&mut self, key: K, value: V) -> Result<Option<V>>;
    fn get(&self, key: &K) -> Result<Option<V>>;
    fn remove(&mut self, key: &K) -> Result<Option<V>>;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Materialize the entries (unspecified order).
    fn entries(&self) -> Result<Vec<(K, V)>>;
}

/// Per-job factory for containers and row-annotation factories.
///
/// A closed set of strategies; execution code matches on capabilities via
/// the constructor used, never on runtime type inspection.
pub enum StorageProvider {
    InMemory(InMemoryStorageProvider),
    SqlDatabase(SqlStorageProvider),
    /// Collections from one strategy, row annotations from another.
    Combined {
        collections: Box<StorageProvider>,
        annotations: Box<StorageProvider>,
    },
}

impl StorageProvider {
    /// Fast, unbounded-memory provider with the default stored-rows
    /// threshold for annotations.
    pub fn in_memory() -> Self {
        StorageProvider::InMemory(InMemoryStorageProvider::default())
    }

    pub fn in_memory_with_threshold(stored_rows_threshold: usize) -> Self {
        StorageProvider::InMemory(InMemoryStorageProvider::new(stored_rows_threshold))
    }

    /// Disk-resident provider backed by a SQLite database at `path`.
    pub fn sql_database(path: impl AsRef<Path>) -> Result<Self> {
        Ok(StorageProvider::SqlDatabase(SqlStorageProvider::open(path)?))
    }

    /// In-process SQLite database, useful for tests and small jobs.
    pub fn sql_database_in_memory() -> Result<Self> {
        Ok(StorageProvider::SqlDatabase(SqlStorageProvider::open_in_memory()?))
    }

    pub fn combined(collections: StorageProvider, annotations: StorageProvider) -> Self {
        StorageProvider::Combined {
            collections: Box::new(collections),
            annotations: Box::new(annotations),
        }
    }

    pub fn create_list<T: Storable>(&self) -> Result<Box<dyn ProvidedList<T>>> {
        match self {
            StorageProvider::InMemory(provider) => provider.create_list(),
            StorageProvider::SqlDatabase(provider) => provider.create_list(),
            StorageProvider::Combined { collections, .. } => collections.create_list(),
        }
    }

    pub fn create_set<T: Storable>(&self) -> Result<Box<dyn ProvidedSet<T>>> {
        match self {
            StorageProvider::InMemory(provider) => provider.create_set(),
            StorageProvider::SqlDatabase(provider) => provider.create_set(),
            StorageProvider::Combined { collections, .. } => collections.create_set(),
        }
    }

    pub fn create_map<K: Storable, V: Storable>(&self) -> Result<Box<dyn ProvidedMap<K, V>>> {
        match self {
            StorageProvider::InMemory(provider) => provider.create_map(),
            StorageProvider::SqlDatabase(provider) => provider.create_map(),
            StorageProvider::Combined { collections, .. } => collections.create_map(),
        }
    }

    /// A row-annotation factory scoped to this job.
    pub fn create_row_annotation_factory(&self) -> Result<Arc<dyn RowAnnotationFactory>> {
        match self {
            StorageProvider::InMemory(provider) => provider.create_row_annotation_factory(),
            StorageProvider::SqlDatabase(provider) => provider.create_row_annotation_factory(),
            StorageProvider::Combined { annotations, .. } => {
                annotations.create_row_annotation_factory()
            }
        }
    }

    /// Release backing resources (drops SQL tables where applicable).
    ///
    /// Tied to job lifecycle; call when the job's results have been read.
    pub fn close(&self) -> Result<()> {
        match self {
            StorageProvider::InMemory(_) => Ok(()),
            StorageProvider::SqlDatabase(provider) => provider.close(),
            StorageProvider::Combined {
                collections,
                annotations,
            } => {
                collections.close()?;
                annotations.close()
            }
        }
    }
}
