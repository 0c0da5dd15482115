// src/storage/sql.rs

//! SQLite-backed storage strategy.
//!
//! Collections and annotations live in tables of a single SQLite database,
//! keeping process memory bounded regardless of row volume. All containers
//! created by one provider share one connection behind a mutex; SQLite
//! serializes writers anyway, so a finer-grained scheme buys nothing.
//!
//! Annotations share one wide table: a row appears once, and each
//! annotation contributes a lazily added flag column. Input columns
//! referenced by annotated rows are likewise added to the table on first
//! sight, so the schema grows with the job instead of being declared up
//! front.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result};
use rusqlite::Connection;
use tracing::{debug, warn};

use crate::storage::annotation::{RowAnnotation, RowAnnotationFactory};
use crate::storage::row::{DataRow, RowId, Value};
use crate::storage::{ProvidedList, ProvidedMap, ProvidedSet, Storable};

/// SQLite-backed implementation of the storage provider strategy.
pub struct SqlStorageProvider {
    conn: Arc<Mutex<Connection>>,
    table_counter: AtomicUsize,
    created_tables: Mutex<Vec<String>>,
}

fn lock_conn(conn: &Arc<Mutex<Connection>>) -> MutexGuard<'_, Connection> {
    conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SqlStorageProvider {
    /// Open (or create) a database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open storage database {}", path.display()))?;
        debug!(path = %path.display(), "opened sqlite storage database");
        Ok(Self::from_connection(conn))
    }

    /// In-process database, useful for tests and small jobs.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            table_counter: AtomicUsize::new(0),
            created_tables: Mutex::new(Vec::new()),
        }
    }

    fn fresh_table(&self, kind: &str) -> String {
        let n = self.table_counter.fetch_add(1, Ordering::SeqCst);
        format!("rowflow_{kind}_{n}")
    }

    fn register_table(&self, name: &str) {
        self.created_tables
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(name.to_string());
    }

    pub fn create_list<T: Storable>(&self) -> Result<Box<dyn ProvidedList<T>>> {
        let table = self.fresh_table("list");
        {
            let conn = lock_conn(&self.conn);
            conn.execute(
                &format!(
                    "CREATE TABLE \"{table}\" (idx INTEGER PRIMARY KEY AUTOINCREMENT, value)"
                ),
                [],
            )
            .with_context(|| format!("failed to create list table {table}"))?;
        }
        self.register_table(&table);
        Ok(Box::new(SqlList {
            conn: Arc::clone(&self.conn),
            table,
            len: AtomicUsize::new(0),
            _marker: std::marker::PhantomData,
        }))
    }

    pub fn create_set<T: Storable>(&self) -> Result<Box<dyn ProvidedSet<T>>> {
        let table = self.fresh_table("set");
        {
            let conn = lock_conn(&self.conn);
            conn.execute(
                &format!("CREATE TABLE \"{table}\" (value UNIQUE)"),
                [],
            )
            .with_context(|| format!("failed to create set table {table}"))?;
        }
        self.register_table(&table);
        Ok(Box::new(SqlSet {
            conn: Arc::clone(&self.conn),
            table,
            len: AtomicUsize::new(0),
            _marker: std::marker::PhantomData,
        }))
    }

    pub fn create_map<K: Storable, V: Storable>(&self) -> Result<Box<dyn ProvidedMap<K, V>>> {
        let table = self.fresh_table("map");
        {
            let conn = lock_conn(&self.conn);
            conn.execute(
                &format!("CREATE TABLE \"{table}\" (key PRIMARY KEY, value)"),
                [],
            )
            .with_context(|| format!("failed to create map table {table}"))?;
        }
        self.register_table(&table);
        Ok(Box::new(SqlMap {
            conn: Arc::clone(&self.conn),
            table,
            len: AtomicUsize::new(0),
            _marker: std::marker::PhantomData,
        }))
    }

    pub fn create_row_annotation_factory(&self) -> Result<Arc<dyn RowAnnotationFactory>> {
        let table = self.fresh_table("annotations");
        {
            let conn = lock_conn(&self.conn);
            conn.execute(
                &format!(
                    "CREATE TABLE \"{table}\" (row_id INTEGER PRIMARY KEY, distinct_count INTEGER NOT NULL)"
                ),
                [],
            )
            .with_context(|| format!("failed to create annotation table {table}"))?;
        }
        self.register_table(&table);
        Ok(Arc::new(SqlRowAnnotationFactory::new(
            Arc::clone(&self.conn),
            table,
        )))
    }

    /// Drop every table this provider created.
    ///
    /// Tied to job lifecycle; call when the job's results have been read.
    pub fn close(&self) -> Result<()> {
        let tables: Vec<String> = std::mem::take(
            &mut *self
                .created_tables
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        );
        let conn = lock_conn(&self.conn);
        for table in tables {
            conn.execute(&format!("DROP TABLE IF EXISTS \"{table}\""), [])
                .with_context(|| format!("failed to drop table {table}"))?;
            debug!(table = %table, "dropped storage table");
        }
        Ok(())
    }
}

impl Drop for SqlStorageProvider {
    fn drop(&mut self) {
        // Best-effort; explicit close() is the supported path.
        if let Err(err) = self.close() {
            warn!(error = %err, "failed to clean up storage tables on drop");
        }
    }
}

struct SqlList<T> {
    conn: Arc<Mutex<Connection>>,
    table: String,
    len: AtomicUsize,
    _marker: std::marker::PhantomData<T>,
}

impl<T: Storable> ProvidedList<T> for SqlList<T> {
    fn push(&mut self, item: T) -> Result<()> {
        let conn = lock_conn(&self.conn);
        conn.execute(
            &format!("INSERT INTO \"{}\" (value) VALUES (?1)", self.table),
            [item.to_value()],
        )
        .context("failed to append to stored list")?;
        self.len.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn get(&self, index: usize) -> Result<Option<T>> {
        let conn = lock_conn(&self.conn);
        let mut stmt = conn.prepare(&format!(
            "SELECT value FROM \"{}\" ORDER BY idx LIMIT 1 OFFSET ?1",
            self.table
        ))?;
        let mut rows = stmt.query([index as i64])?;
        match rows.next()? {
            Some(row) => Ok(T::from_value(&Value::from_sql_ref(row.get_ref(0)?))),
            None => Ok(None),
        }
    }

    fn len(&self) -> usize {
        self.len.load(Ordering::SeqCst)
    }

    fn items(&self) -> Result<Vec<T>> {
        let conn = lock_conn(&self.conn);
        let mut stmt =
            conn.prepare(&format!("SELECT value FROM \"{}\" ORDER BY idx", self.table))?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            if let Some(item) = T::from_value(&Value::from_sql_ref(row.get_ref(0)?)) {
                out.push(item);
            }
        }
        Ok(out)
    }
}

struct SqlSet<T> {
    conn: Arc<Mutex<Connection>>,
    table: String,
    len: AtomicUsize,
    _marker: std::marker::PhantomData<T>,
}

impl<T: Storable> ProvidedSet<T> for SqlSet<T> {
    fn insert(&mut self, item: T) -> Result<bool> {
        let conn = lock_conn(&self.conn);
        let inserted = conn
            .execute(
                &format!("INSERT OR IGNORE INTO \"{}\" (value) VALUES (?1)", self.table),
                [item.to_value()],
            )
            .context("failed to insert into stored set")?;
        if inserted > 0 {
            self.len.fetch_add(1, Ordering::SeqCst);
        }
        Ok(inserted > 0)
    }

    fn remove(&mut self, item: &T) -> Result<bool> {
        let conn = lock_conn(&self.conn);
        let removed = conn
            .execute(
                &format!("DELETE FROM \"{}\" WHERE value = ?1", self.table),
                [item.to_value()],
            )
            .context("failed to remove from stored set")?;
        if removed > 0 {
            self.len.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(removed > 0)
    }

    fn contains(&self, item: &T) -> Result<bool> {
        let conn = lock_conn(&self.conn);
        let mut stmt = conn.prepare(&format!(
            "SELECT 1 FROM \"{}\" WHERE value = ?1",
            self.table
        ))?;
        let mut rows = stmt.query([item.to_value()])?;
        Ok(rows.next()?.is_some())
    }

    fn len(&self) -> usize {
        self.len.load(Ordering::SeqCst)
    }

    fn items(&self) -> Result<Vec<T>> {
        let conn = lock_conn(&self.conn);
        let mut stmt = conn.prepare(&format!("SELECT value FROM \"{}\"", self.table))?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            if let Some(item) = T::from_value(&Value::from_sql_ref(row.get_ref(0)?)) {
                out.push(item);
            }
        }
        Ok(out)
    }
}

struct SqlMap<K, V> {
    conn: Arc<Mutex<Connection>>,
    table: String,
    len: AtomicUsize,
    _marker: std::marker::PhantomData<(K, V)>,
}

impl<K: Storable, V: Storable> ProvidedMap<K, V> for SqlMap<K, V> {
    fn put(&mut self, key: K, value: V) -> Result<Option<V>> {
        let previous = self.get(&key)?;
        let conn = lock_conn(&self.conn);
        conn.execute(
            &format!(
                "INSERT OR REPLACE INTO \"{}\" (key, value) VALUES (?1, ?2)",
                self.table
            ),
            [key.to_value(), value.to_value()],
        )
        .context("failed to put into stored map")?;
        if previous.is_none() {
            self.len.fetch_add(1, Ordering::SeqCst);
        }
        Ok(previous)
    }

    fn get(&self, key: &K) -> Result<Option<V>> {
        let conn = lock_conn(&self.conn);
        let mut stmt = conn.prepare(&format!(
            "SELECT value FROM \"{}\" WHERE key = ?1",
            self.table
        ))?;
        let mut rows = stmt.query([key.to_value()])?;
        match rows.next()? {
            Some(row) => Ok(V::from_value(&Value::from_sql_ref(row.get_ref(0)?))),
            None => Ok(None),
        }
    }

    fn remove(&mut self, key: &K) -> Result<Option<V>> {
        let previous = self.get(key)?;
        if previous.is_some() {
            let conn = lock_conn(&self.conn);
            conn.execute(
                &format!("DELETE FROM \"{}\" WHERE key = ?1", self.table),
                [key.to_value()],
            )
            .context("failed to remove from stored map")?;
            self.len.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(previous)
    }

    fn len(&self) -> usize {
        self.len.load(Ordering::SeqCst)
    }

    fn entries(&self) -> Result<Vec<(K, V)>> {
        let conn = lock_conn(&self.conn);
        let mut stmt = conn.prepare(&format!("SELECT key, value FROM \"{}\"", self.table))?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let key = K::from_value(&Value::from_sql_ref(row.get_ref(0)?));
            let value = V::from_value(&Value::from_sql_ref(row.get_ref(1)?));
            if let (Some(key), Some(value)) = (key, value) {
                out.push((key, value));
            }
        }
        Ok(out)
    }
}

/// SQL-backed annotation factory over one shared, lazily widened table.
pub struct SqlRowAnnotationFactory {
    conn: Arc<Mutex<Connection>>,
    table: String,
    next_annotation_id: AtomicUsize,
    schema: Mutex<SchemaState>,
}

#[derive(Default)]
struct SchemaState {
    /// Annotation ids whose flag column already exists.
    annotation_columns: HashSet<usize>,
    /// Sanitized column name -> source input column name.
    value_columns: HashMap<String, String>,
}

fn flag_column(annotation_id: usize) -> String {
    format!("ann{annotation_id}")
}

/// Map an input column name onto a safe SQL identifier.
fn value_column(column: &str) -> String {
    let sanitized: String = column
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    format!("v_{sanitized}")
}

impl SqlRowAnnotationFactory {
    fn new(conn: Arc<Mutex<Connection>>, table: String) -> Self {
        Self {
            conn,
            table,
            next_annotation_id: AtomicUsize::new(0),
            schema: Mutex::new(SchemaState::default()),
        }
    }

    fn lock_schema(&self) -> MutexGuard<'_, SchemaState> {
        self.schema.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add the annotation's flag column on first use.
    fn ensure_flag_column(&self, conn: &Connection, annotation_id: usize) -> Result<()> {
        let mut schema = self.lock_schema();
        if schema.annotation_columns.insert(annotation_id) {
            let column = flag_column(annotation_id);
            conn.execute(
                &format!(
                    "ALTER TABLE \"{}\" ADD COLUMN \"{column}\" INTEGER NOT NULL DEFAULT 0",
                    self.table
                ),
                [],
            )
            .with_context(|| format!("failed to add annotation column {column}"))?;
            debug!(table = %self.table, column = %column, "added annotation flag column");
        }
        Ok(())
    }

    /// Add a value column for a newly seen input column.
    fn ensure_value_column(&self, conn: &Connection, column: &str) -> Result<()> {
        let name = value_column(column);
        let mut schema = self.lock_schema();
        if !schema.value_columns.contains_key(&name) {
            conn.execute(
                &format!("ALTER TABLE \"{}\" ADD COLUMN \"{name}\"", self.table),
                [],
            )
            .with_context(|| format!("failed to add value column {name} for input column {column}"))?;
            debug!(table = %self.table, column = %name, "added value column");
            schema.value_columns.insert(name, column.to_string());
        }
        Ok(())
    }

    /// `(sanitized, source)` pairs in deterministic order.
    fn known_value_columns(&self) -> Vec<(String, String)> {
        let schema = self.lock_schema();
        let mut columns: Vec<(String, String)> = schema
            .value_columns
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        columns.sort();
        columns
    }
}

impl RowAnnotationFactory for SqlRowAnnotationFactory {
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
        let conn = lock_conn(&self.conn);
        self.ensure_flag_column(&conn, annotation.id())?;
        for column in row.columns() {
            self.ensure_value_column(&conn, column)?;
        }

        let flag = flag_column(annotation.id());

        let existing: Option<i64> = {
            let mut stmt = conn.prepare(&format!(
                "SELECT \"{flag}\" FROM \"{}\" WHERE row_id = ?1",
                self.table
            ))?;
            let mut rows = stmt.query([row.id().0])?;
            match rows.next()? {
                Some(r) => Some(r.get(0)?),
                None => None,
            }
        };

        match existing {
            Some(flagged) if flagged != 0 => {
                // Already annotated under this annotation; idempotent.
                return Ok(());
            }
            Some(_) => {
                conn.execute(
                    &format!(
                        "UPDATE \"{}\" SET \"{flag}\" = 1 WHERE row_id = ?1",
                        self.table
                    ),
                    [row.id().0],
                )
                .context("failed to flag existing annotated row")?;
            }
            None => {
                let mut columns = vec!["row_id".to_string(), "distinct_count".to_string(), format!("\"{flag}\"")];
                let mut params: Vec<Value> =
                    vec![Value::Int(row.id().0), Value::Int(distinct_count as i64), Value::Int(1)];
                for (column, value) in row.values() {
                    columns.push(format!("\"{}\"", value_column(column)));
                    params.push(value.clone());
                }
                let placeholders: Vec<String> =
                    (1..=params.len()).map(|i| format!("?{i}")).collect();
                conn.execute(
                    &format!(
                        "INSERT INTO \"{}\" ({}) VALUES ({})",
                        self.table,
                        columns.join(", "),
                        placeholders.join(", ")
                    ),
                    rusqlite::params_from_iter(params.iter()),
                )
                .context("failed to insert annotated row")?;
            }
        }

        annotation.increment_row_count(distinct_count);
        Ok(())
    }

    fn rows(&self, annotation: &RowAnnotation) -> Result<Vec<DataRow>> {
        let value_columns = self.known_value_columns();
        let flag = flag_column(annotation.id());
        {
            let schema = self.lock_schema();
            if !schema.annotation_columns.contains(&annotation.id()) {
                return Ok(Vec::new());
            }
        }

        let conn = lock_conn(&self.conn);
        let select_list = if value_columns.is_empty() {
            "row_id".to_string()
        } else {
            let quoted: Vec<String> = value_columns
                .iter()
                .map(|(sanitized, _)| format!("\"{sanitized}\""))
                .collect();
            format!("row_id, {}", quoted.join(", "))
        };
        let mut stmt = conn.prepare(&format!(
            "SELECT {select_list} FROM \"{}\" WHERE \"{flag}\" = 1 ORDER BY row_id",
            self.table
        ))?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(r) = rows.next()? {
            let mut data_row = DataRow::new(RowId(r.get(0)?));
            for (i, (_, source)) in value_columns.iter().enumerate() {
                let value = Value::from_sql_ref(r.get_ref(i + 1)?);
                if !matches!(value, Value::Null) {
                    data_row = data_row.with_value(source.clone(), value);
                }
            }
            out.push(data_row);
        }
        Ok(out)
    }

    fn reset(&self, annotation: &RowAnnotation) -> Result<()> {
        let flagged = {
            let schema = self.lock_schema();
            schema.annotation_columns.contains(&annotation.id())
        };
        if flagged {
            let flag = flag_column(annotation.id());
            let conn = lock_conn(&self.conn);
            conn.execute(
                &format!("UPDATE \"{}\" SET \"{flag}\" = 0", self.table),
                [],
            )
            .context("failed to reset annotation flags")?;
        }
        annotation.reset_row_count();
        Ok(())
    }

    fn value_counts(
        &self,
        annotation: &RowAnnotation,
        column: &str,
    ) -> Result<std::collections::HashMap<Value, usize>> {
        let mut counts = std::collections::HashMap::new();
        {
            let schema = self.lock_schema();
            if !schema.annotation_columns.contains(&annotation.id())
                || !schema.value_columns.contains_key(&value_column(column))
            {
                return Ok(counts);
            }
        }

        let flag = flag_column(annotation.id());
        let name = value_column(column);
        let conn = lock_conn(&self.conn);
        let mut stmt = conn.prepare(&format!(
            "SELECT \"{name}\", SUM(distinct_count) FROM \"{}\" WHERE \"{flag}\" = 1 GROUP BY \"{name}\"",
            self.table
        ))?;
        let mut rows = stmt.query([])?;
        while let Some(r) = rows.next()? {
            let value = Value::from_sql_ref(r.get_ref(0)?);
            let count: i64 = r.get(1)?;
            counts.insert(value, count as usize);
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> SqlStorageProvider {
        SqlStorageProvider::open_in_memory().unwrap()
    }

    #[test]
    fn set_insert_remove_reports_membership_changes() {
        let provider = provider();
        let mut set = provider.create_set::<i64>().unwrap();

        assert!(set.insert(1).unwrap());
        assert!(set.insert(2).unwrap());
        assert!(set.insert(3).unwrap());
        assert!(!set.insert(2).unwrap());
        assert!(set.remove(&2).unwrap());

        assert_eq!(set.len(), 2);
        assert!(set.contains(&1).unwrap());
        assert!(!set.contains(&2).unwrap());
        assert!(set.contains(&3).unwrap());
    }

    #[test]
    fn list_preserves_insertion_order() {
        let provider = provider();
        let mut list = provider.create_list::<String>().unwrap();
        list.push("a".to_string()).unwrap();
        list.push("b".to_string()).unwrap();
        list.push("c".to_string()).unwrap();

        assert_eq!(list.len(), 3);
        assert_eq!(list.get(1).unwrap(), Some("b".to_string()));
        assert_eq!(
            list.items().unwrap(),
            vec!["a".to_string(), "b".to_string(), "c".to_string()]
        );
    }

    #[test]
    fn map_put_returns_previous_value() {
        let provider = provider();
        let mut map = provider.create_map::<String, i64>().unwrap();
        assert_eq!(map.put("k".to_string(), 1).unwrap(), None);
        assert_eq!(map.put("k".to_string(), 2).unwrap(), Some(1));
        assert_eq!(map.get(&"k".to_string()).unwrap(), Some(2));
        assert_eq!(map.len(), 1);
        assert_eq!(map.remove(&"k".to_string()).unwrap(), Some(2));
        assert_eq!(map.len(), 0);
    }

    #[test]
    fn annotate_is_idempotent_per_annotation() {
        let provider = provider();
        let factory = provider.create_row_annotation_factory().unwrap();
        let a = factory.create_annotation();
        let b = factory.create_annotation();

        let row = DataRow::new(RowId(7)).with_value("name", Value::Text("alice".into()));
        factory.annotate(&row, 1, &a).unwrap();
        factory.annotate(&row, 1, &a).unwrap();
        factory.annotate(&row, 1, &b).unwrap();

        assert_eq!(a.row_count(), 1);
        assert_eq!(b.row_count(), 1);
        assert_eq!(factory.rows(&a).unwrap().len(), 1);
    }

    #[test]
    fn value_counts_sum_distinct_counts() {
        let provider = provider();
        let factory = provider.create_row_annotation_factory().unwrap();
        let a = factory.create_annotation();

        let r1 = DataRow::new(RowId(1)).with_value("city", Value::Text("oslo".into()));
        let r2 = DataRow::new(RowId(2)).with_value("city", Value::Text("oslo".into()));
        let r3 = DataRow::new(RowId(3)).with_value("city", Value::Text("bergen".into()));
        factory.annotate(&r1, 2, &a).unwrap();
        factory.annotate(&r2, 3, &a).unwrap();
        factory.annotate(&r3, 1, &a).unwrap();

        let counts = factory.value_counts(&a, "city").unwrap();
        assert_eq!(counts.get(&Value::Text("oslo".into())), Some(&5));
        assert_eq!(counts.get(&Value::Text("bergen".into())), Some(&1));
        assert_eq!(a.row_count(), 6);
    }

    #[test]
    fn reset_clears_flags_but_not_other_annotations() {
        let provider = provider();
        let factory = provider.create_row_annotation_factory().unwrap();
        let a = factory.create_annotation();
        let b = factory.create_annotation();

        let row = DataRow::new(RowId(1)).with_value("name", Value::Text("alice".into()));
        factory.annotate(&row, 1, &a).unwrap();
        factory.annotate(&row, 1, &b).unwrap();

        factory.reset(&a).unwrap();

        assert_eq!(a.row_count(), 0);
        assert!(factory.rows(&a).unwrap().is_empty());
        assert_eq!(factory.rows(&b).unwrap().len(), 1);
    }

    #[test]
    fn close_drops_created_tables() {
        let provider = provider();
        {
            let mut list = provider.create_list::<i64>().unwrap();
            list.push(1).unwrap();
        }
        provider.close().unwrap();
        // After close, new containers still work on a fresh table.
        let mut list = provider.create_list::<i64>().unwrap();
        list.push(2).unwrap();
        assert_eq!(list.len(), 1);
    }
}
