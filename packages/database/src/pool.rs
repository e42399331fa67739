//! Round-robin pool of `DuckDB` connections.

use std::{
    path::Path,
    sync::{
        Mutex, MutexGuard,
        atomic::{AtomicUsize, Ordering},
    },
};

use duckdb::Connection;

use crate::{DbError, open_read_only};

/// A pool of `DuckDB` connections handed out round-robin.
///
/// `DuckDB` connections are `Send` but not `Sync`, so each one sits behind
/// its own `Mutex`. A request holds the guard for the life of its cursor.
pub struct DuckDbPool {
    connections: Vec<Mutex<Connection>>,
    next: AtomicUsize,
}

impl DuckDbPool {
    /// Opens `size` read-only connections to the `DuckDB` file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if any connection fails to open.
    pub fn open(path: &Path, size: usize) -> Result<Self, DbError> {
        let connections = (0..size.max(1))
            .map(|_| open_read_only(path).map(Mutex::new))
            .collect::<Result<Vec<_>, _>>()?;

        log::info!(
            "Opened {} DuckDB connection(s) to {}",
            connections.len(),
            path.display()
        );

        Ok(Self {
            connections,
            next: AtomicUsize::new(0),
        })
    }

    /// Builds a pool of `size` connections from `conn` and clones of it,
    /// all sharing its database.
    ///
    /// This is how in-memory stores are pooled.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a clone cannot be made.
    pub fn from_connection(conn: Connection, size: usize) -> Result<Self, DbError> {
        let mut connections = Vec::with_capacity(size.max(1));
        for _ in 1..size.max(1) {
            connections.push(Mutex::new(conn.try_clone()?));
        }
        connections.insert(0, Mutex::new(conn));

        Ok(Self {
            connections,
            next: AtomicUsize::new(0),
        })
    }

    /// Runs `f` on every connection in the pool, e.g. to load an extension.
    ///
    /// # Errors
    ///
    /// Returns the first error `f` produces.
    pub fn for_each<F>(&self, mut f: F) -> Result<(), DbError>
    where
        F: FnMut(&Connection) -> Result<(), DbError>,
    {
        for conn in &self.connections {
            let guard = conn.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            f(&*guard)?;
        }
        Ok(())
    }

    /// Number of connections in the pool.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Always `false`: a pool holds at least one connection.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Acquires the next connection from the pool (round-robin).
    ///
    /// A poisoned mutex is recovered: a panic mid-query leaves the
    /// connection itself usable.
    pub fn acquire(&self) -> MutexGuard<'_, Connection> {
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.connections.len();
        self.connections[idx]
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_same_database() {
        let conn = crate::open_in_memory().unwrap();
        conn.execute("INSERT INTO geo_type (name) VALUES ('LAD')", [])
            .unwrap();

        let pool = DuckDbPool::from_connection(conn, 3).unwrap();
        assert_eq!(pool.len(), 3);

        for _ in 0..3 {
            let guard = pool.acquire();
            let count: i64 = guard
                .query_row("SELECT COUNT(*) FROM geo_type", [], |row| row.get(0))
                .unwrap();
            assert_eq!(count, 1);
        }
    }

    #[test]
    fn zero_size_still_yields_one_connection() {
        let conn = crate::open_in_memory().unwrap();
        let pool = DuckDbPool::from_connection(conn, 0).unwrap();
        assert_eq!(pool.len(), 1);
        assert!(!pool.is_empty());
    }
}
