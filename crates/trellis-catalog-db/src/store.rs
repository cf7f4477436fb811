// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use sqlx::SqlitePool;

use crate::cache::SchemaCacheRepository;
use crate::error::Result;
use crate::job::RefreshJobRepository;
use crate::lock::RefreshLockRepository;
use crate::pool::create_pool;
use crate::schema::run_migrations;

/// The catalog store: cache, job trail, and locks composed over one pool.
///
/// Everything the refresh orchestrator and read-path callers need hangs off
/// this one type as first-class methods; nothing is attached to the pool
/// dynamically.
#[derive(Clone)]
pub struct CatalogStore {
	cache: SchemaCacheRepository,
	jobs: RefreshJobRepository,
	locks: RefreshLockRepository,
}

impl CatalogStore {
	pub fn new(pool: SqlitePool) -> Self {
		Self {
			cache: SchemaCacheRepository::new(pool.clone()),
			jobs: RefreshJobRepository::new(pool.clone()),
			locks: RefreshLockRepository::new(pool),
		}
	}

	/// Open (or create) the database at `database_url` and run migrations.
	#[tracing::instrument(skip(database_url))]
	pub async fn connect(database_url: &str) -> Result<Self> {
		let pool = create_pool(database_url).await?;
		run_migrations(&pool).await?;
		Ok(Self::new(pool))
	}

	pub fn cache(&self) -> &SchemaCacheRepository {
		&self.cache
	}

	pub fn jobs(&self) -> &RefreshJobRepository {
		&self.jobs
	}

	pub fn locks(&self) -> &RefreshLockRepository {
		&self.locks
	}
}
