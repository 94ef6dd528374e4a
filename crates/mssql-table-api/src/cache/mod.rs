//! Process-lifetime memoization of catalog lookups.
//!
//! Concurrent misses on one key share a single computation: the first caller
//! runs it while the rest wait on the same cell. Failed computations leave
//! the cell empty so the next caller retries.

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::core::{ForeignKeyMapping, TableSchema};
use crate::error::Result;
use crate::introspect::Introspector;

/// Keyed get-or-compute map with single-flight semantics.
pub struct SingleFlight<V> {
    cells: DashMap<String, Arc<OnceCell<Arc<V>>>>,
}

impl<V> Default for SingleFlight<V> {
    fn default() -> Self {
        Self {
            cells: DashMap::new(),
        }
    }
}

impl<V> SingleFlight<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached value for `key`, computing it with `init` on a miss.
    pub async fn get_or_try_init<F, Fut>(&self, key: &str, init: F) -> Result<Arc<V>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        let cell = self.cells.entry(key.to_string()).or_default().clone();

        if let Some(value) = cell.get() {
            debug!("Cache hit for {}", key);
            return Ok(value.clone());
        }

        match cell
            .get_or_try_init(|| async { init().await.map(Arc::new) })
            .await
        {
            Ok(value) => Ok(value.clone()),
            Err(e) => {
                // Drop the empty slot unless a retry has already replaced or filled it
                self.cells
                    .remove_if(key, |_, slot| Arc::ptr_eq(slot, &cell) && !slot.initialized());
                Err(e)
            }
        }
    }

    /// Number of populated entries.
    pub fn len(&self) -> usize {
        self.cells.iter().filter(|slot| slot.value().initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Table name to [`TableSchema`].
pub struct SchemaCache {
    introspector: Introspector,
    entries: SingleFlight<TableSchema>,
}

impl SchemaCache {
    pub fn new(introspector: Introspector) -> Self {
        Self {
            introspector,
            entries: SingleFlight::new(),
        }
    }

    /// Get a table's schema, introspecting it on first access.
    pub async fn get(&self, table: &str) -> Result<Arc<TableSchema>> {
        self.entries
            .get_or_try_init(table, || self.introspector.introspect(table))
            .await
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Foreign key constraint name to [`ForeignKeyMapping`].
pub struct ForeignKeyCache {
    introspector: Introspector,
    entries: SingleFlight<ForeignKeyMapping>,
}

impl ForeignKeyCache {
    pub fn new(introspector: Introspector) -> Self {
        Self {
            introspector,
            entries: SingleFlight::new(),
        }
    }

    pub async fn get(&self, constraint: &str) -> Result<Arc<ForeignKeyMapping>> {
        self.entries
            .get_or_try_init(constraint, || self.introspector.resolve_foreign_key(constraint))
            .await
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
