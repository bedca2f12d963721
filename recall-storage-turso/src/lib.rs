#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::module_name_repetitions)]

//! # Recall Storage - Turso
//!
//! Turso/libSQL backend for the recall knowledge graph: node and edge
//! tables, in-adapter vector ranking over JSON embeddings, FTS5 fulltext
//! mirrors, and the relational job/space stores.
//!
//! One [`TursoGraphStore`] implements all three storage seams
//! (`GraphStore`, `JobStore`, `SpaceStore`). Every call opens a connection,
//! runs, and drops it; connections never cross component boundaries.
//!
//! ## Example
//!
//! ```no_run
//! use recall_storage_turso::TursoGraphStore;
//!
//! # async fn example() -> recall_core::Result<()> {
//! let store = TursoGraphStore::new("libsql://localhost:8080", "token").await?;
//! store.initialize_schema().await;
//! # Ok(())
//! # }
//! ```

use libsql::{Builder, Connection, Database};
use recall_core::{Error, Result};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{error, info};

mod clusters;
mod jobs;
mod nodes;
mod rows;
pub mod schema;
mod search;
mod spaces;
mod trait_impls;

/// Turso-backed graph, job, and space store
pub struct TursoGraphStore {
    db: Arc<Database>,
    /// Process-local schema bootstrap latch
    schema_latch: OnceCell<bool>,
}

impl TursoGraphStore {
    /// Open a store.
    ///
    /// `url` accepts `libsql://…` (remote, token required), `file:…` paths,
    /// or `:memory:`.
    pub async fn new(url: &str, token: &str) -> Result<Self> {
        let db = if url == ":memory:" {
            Builder::new_local(":memory:")
                .build()
                .await
                .map_err(|e| Error::Storage(format!("failed to open in-memory db: {e}")))?
        } else if let Some(path) = url.strip_prefix("file:") {
            Builder::new_local(path)
                .build()
                .await
                .map_err(|e| Error::Storage(format!("failed to open local db {path}: {e}")))?
        } else if url.starts_with("libsql://") {
            Builder::new_remote(url.to_string(), token.to_string())
                .build()
                .await
                .map_err(|e| Error::Storage(format!("failed to connect to {url}: {e}")))?
        } else {
            return Err(Error::Configuration(format!(
                "unsupported graph url (expected libsql://, file:, or :memory:): {url}"
            )));
        };

        Ok(Self {
            db: Arc::new(db),
            schema_latch: OnceCell::new(),
        })
    }

    /// In-memory store, for tests and local development
    pub async fn in_memory() -> Result<Self> {
        Self::new(":memory:", "").await
    }

    pub(crate) fn connect(&self) -> Result<Connection> {
        self.db
            .connect()
            .map_err(|e| Error::Storage(format!("failed to open connection: {e}")))
    }

    /// Run schema bootstrap once per process.
    ///
    /// Idempotent DDL behind a latch; a failure logs and returns `false`,
    /// letting the caller proceed when the schema already exists.
    pub async fn initialize_schema(&self) -> bool {
        *self
            .schema_latch
            .get_or_init(|| async {
                match self.run_schema().await {
                    Ok(()) => {
                        info!("Graph schema initialized");
                        true
                    }
                    Err(e) => {
                        error!(error = %e, "Graph schema initialization failed");
                        false
                    }
                }
            })
            .await
    }

    async fn run_schema(&self) -> Result<()> {
        let conn = self.connect()?;
        for statement in schema::all_statements() {
            conn.execute(statement, ())
                .await
                .map_err(|e| Error::SchemaInit(format!("DDL failed: {e}")))?;
        }
        Ok(())
    }

    /// Raw query escape hatch for operational tooling.
    ///
    /// The typed `GraphStore` surface is the supported API; this exists for
    /// ad-hoc inspection and migrations.
    pub async fn run(
        &self,
        query: &str,
        params: Vec<libsql::Value>,
    ) -> Result<Vec<Vec<libsql::Value>>> {
        let conn = self.connect()?;
        let mut rows = conn
            .query(query, params)
            .await
            .map_err(|e| Error::Storage(format!("query failed: {e}")))?;
        let mut collected = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| Error::Storage(e.to_string()))?
        {
            let width = row.column_count();
            let mut values = Vec::with_capacity(width as usize);
            for index in 0..width {
                values.push(
                    row.get_value(index)
                        .map_err(|e| Error::Storage(e.to_string()))?,
                );
            }
            collected.push(values);
        }
        Ok(collected)
    }
}
