// src/storage/annotation.rs

//! Row annotations: named, countable, optionally-sampled subsets of rows.
//!
//! An annotation handle is opaque — callers obtain it from a
//! [`RowAnnotationFactory`] and mutate it only through the factory's
//! `annotate`/`reset` operations. The row *count* is always exact; the
//! stored row *set* may be bounded by the factory's sampling threshold.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;

use crate::storage::row::{DataRow, Value};

/// Opaque handle for "the set of rows that matched some predicate".
///
/// Cloning the handle is cheap and refers to the same annotation.
#[derive(Debug, Clone)]
pub struct RowAnnotation {
    inner: Arc<AnnotationInner>,
}

#[derive(Debug)]
struct AnnotationInner {
    id: usize,
    row_count: AtomicUsize,
}

impl RowAnnotation {
    pub(crate) fn new(id: usize) -> Self {
        Self {
            inner: Arc::new(AnnotationInner {
                id,
                row_count: AtomicUsize::new(0),
            }),
        }
    }

    /// Factory-internal identity; stable for the lifetime of the factory.
    pub(crate) fn id(&self) -> usize {
        self.inner.id
    }

    /// Exact number of (distinct-weighted) rows annotated so far.
    ///
    /// Keeps incrementing past the stored-rows threshold: "how many matched"
    /// is decoupled from "how many we keep for inspection".
    pub fn row_count(&self) -> usize {
        self.inner.row_count.load(Ordering::SeqCst)
    }

    pub(crate) fn increment_row_count(&self, delta: usize) {
        self.inner.row_count.fetch_add(delta, Ordering::SeqCst);
    }

    pub(crate) fn reset_row_count(&self) {
        self.inner.row_count.store(0, Ordering::SeqCst);
    }
}

/// Factory for row annotations, scoped to one job/session.
///
/// Implementations must be safe to call from multiple worker threads.
pub trait RowAnnotationFactory: Send + Sync {
    /// A fresh, empty annotation.
    fn create_annotation(&self) -> RowAnnotation;

    /// Record that `row` matched `annotation`, weighted by `distinct_count`.
    ///
    /// Idempotent per (row identity, annotation): annotating the same row
    /// twice for the same annotation does not double-count, but the same row
    /// can be independently annotated under a different annotation.
    fn annotate(&self, row: &DataRow, distinct_count: usize, annotation: &RowAnnotation)
        -> Result<()>;

    /// The stored (possibly thresholded) rows, for inspection.
    fn rows(&self, annotation: &RowAnnotation) -> Result<Vec<DataRow>>;

    /// Clear all stored membership for `annotation`, leaving others intact.
    fn reset(&self, annotation: &RowAnnotation) -> Result<()>;

    /// Counts of each observed value of `column` across the annotation's
    /// stored rows, weighted by each row's distinct count.
    fn value_counts(&self, annotation: &RowAnnotation, column: &str)
        -> Result<HashMap<Value, usize>>;

    /// Move the row *count* from one annotation to another.
    ///
    /// Deliberately asymmetric: stored rows are not copied. Used when
    /// consolidating statistics without re-materializing row data.
    fn transfer_annotations(&self, from: &RowAnnotation, to: &RowAnnotation) -> Result<()> {
        let increment = from.row_count();
        to.increment_row_count(increment);
        Ok(())
    }
}
