// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! SQLite-backed storage for the trellis schema catalog.
//!
//! Three concerns share one database file: the TTL-gated, hash-versioned
//! schema cache (`cache_items`), the refresh job audit trail
//! (`refresh_jobs`), and the advisory refresh locks (`refresh_locks`). All
//! operations are safe to call from multiple processes against the same
//! file; the pool runs in WAL mode.

pub mod cache;
pub mod error;
pub mod job;
pub mod lock;
pub mod pool;
pub mod schema;
pub mod store;
pub mod testing;

pub use cache::{CacheEntry, PutOutcome, SchemaCacheRepository, DEFAULT_BATCH_CHUNK_SIZE};
pub use error::{CatalogDbError, Result};
pub use job::{RefreshJob, RefreshJobRepository, RefreshJobStatus};
pub use lock::{refresh_lock_key, RefreshLockRepository};
pub use pool::create_pool;
pub use schema::run_migrations;
pub use store::CatalogStore;
