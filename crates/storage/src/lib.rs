//! Postgres-backed storage gateway: CRUD per entity plus the specialized
//! operations the orchestrator needs (session+agent join fetch, recent
//! message window, job-queue claim/complete/fail, api key lookup).
//!
//! Grounded on the teacher pack's `metadata_db.rs` (`bochaco-formicaio`):
//! a `db_conn()`-style pool constructor that runs migrations on first
//! connect, and narrow `db_get_*`/`db_store_*` free functions per entity —
//! generalized here to Postgres (`ON CONFLICT DO UPDATE` instead of
//! `INSERT OR REPLACE`, `$n` placeholders instead of `?`) and gathered as
//! methods on one `StorageGateway` handle instead of free functions, since
//! every caller already carries the pool around.

pub mod agents;
pub mod api_keys;
pub mod error;
pub mod jobs;
pub mod json_map;
pub mod memory;
pub mod messages;
pub mod models;
pub mod sessions;
pub mod tools;
pub mod vector;

pub use agents::NewAgent;
pub use api_keys::{IssuedApiKey, NewApiKey};
pub use error::StorageError;
pub use jobs::NewJob;
pub use json_map::JsonMap;
pub use memory::NewMemoryChunk;
pub use messages::NewMessage;
pub use models::*;
pub use tools::NewTool;

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

#[derive(Clone)]
pub struct StorageGateway {
    pool: PgPool,
}

impl StorageGateway {
    pub async fn connect(
        database_url: &str,
        max_open_conns: u32,
        max_idle_conns: u32,
        conn_max_lifetime_secs: u64,
    ) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_open_conns)
            .min_connections(max_idle_conns)
            .max_lifetime(Duration::from_secs(conn_max_lifetime_secs))
            .connect(database_url)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    /// For tests/tools that already hold a pool (e.g. shared with a
    /// migrated test database).
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
