// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Advisory refresh locks.
//!
//! SQLite has no connection-scoped advisory locks, so the primitive is a
//! dedicated table keyed by an integer derived from `(source, scope)`.
//! Acquisition is a single atomic `INSERT OR IGNORE`; whichever process
//! inserts the row holds the lock until it deletes it. No domain table ever
//! references `refresh_locks`.

use chrono::Utc;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;

use trellis_catalog_core::RefreshScope;

use crate::error::Result;

/// Deterministic lock key for a `(source, scope)` pair: the first 8 bytes of
/// SHA-256 over `source 0x1F scope`, as a big-endian i64.
pub fn refresh_lock_key(source: &str, scope: RefreshScope) -> i64 {
	let mut hasher = Sha256::new();
	hasher.update(source.as_bytes());
	hasher.update([0x1f]);
	hasher.update(scope.as_str().as_bytes());
	let digest = hasher.finalize();
	let mut bytes = [0u8; 8];
	bytes.copy_from_slice(&digest[..8]);
	i64::from_be_bytes(bytes)
}

/// Repository over the `refresh_locks` table.
#[derive(Clone)]
pub struct RefreshLockRepository {
	pool: SqlitePool,
}

impl RefreshLockRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	/// Non-blocking acquire. Returns false immediately if the lock is held.
	#[tracing::instrument(skip(self))]
	pub async fn try_acquire(&self, source: &str, scope: RefreshScope) -> Result<bool> {
		let result = sqlx::query(
			r#"
			INSERT OR IGNORE INTO refresh_locks (lock_key, source, scope, acquired_at)
			VALUES (?, ?, ?, ?)
			"#,
		)
		.bind(refresh_lock_key(source, scope))
		.bind(source)
		.bind(scope.as_str())
		.bind(Utc::now())
		.execute(&self.pool)
		.await?;

		let acquired = result.rows_affected() == 1;
		tracing::debug!(acquired, scope = scope.as_str(), "refresh lock attempt");
		Ok(acquired)
	}

	/// Release. Returns false if the lock was not held.
	#[tracing::instrument(skip(self))]
	pub async fn release(&self, source: &str, scope: RefreshScope) -> Result<bool> {
		let result = sqlx::query("DELETE FROM refresh_locks WHERE lock_key = ?")
			.bind(refresh_lock_key(source, scope))
			.execute(&self.pool)
			.await?;

		Ok(result.rows_affected() == 1)
	}
}
