// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use sqlx::SqlitePool;

use crate::error::Result;

/// Create the catalog tables if they do not exist.
///
/// Idempotent; every process sharing the database file runs this at startup.
#[tracing::instrument(skip(pool))]
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
	sqlx::query(
		r#"
		CREATE TABLE IF NOT EXISTS cache_items (
			source        TEXT NOT NULL,
			kind          TEXT NOT NULL,
			key           TEXT NOT NULL,
			content_hash  TEXT NOT NULL,
			fetched_at    TEXT NOT NULL,
			ttl_seconds   INTEGER NOT NULL,
			document      TEXT NOT NULL,
			PRIMARY KEY (source, kind, key)
		)
		"#,
	)
	.execute(pool)
	.await?;

	sqlx::query(
		r#"
		CREATE TABLE IF NOT EXISTS refresh_jobs (
			id          TEXT PRIMARY KEY,
			source      TEXT NOT NULL,
			scope       TEXT NOT NULL,
			status      TEXT NOT NULL,
			started_at  TEXT NOT NULL,
			ended_at    TEXT,
			summary     TEXT NOT NULL
		)
		"#,
	)
	.execute(pool)
	.await?;

	sqlx::query(
		"CREATE INDEX IF NOT EXISTS idx_refresh_jobs_source_scope ON refresh_jobs(source, scope, status)",
	)
	.execute(pool)
	.await?;

	sqlx::query(
		r#"
		CREATE TABLE IF NOT EXISTS refresh_locks (
			lock_key    INTEGER PRIMARY KEY,
			source      TEXT NOT NULL,
			scope       TEXT NOT NULL,
			acquired_at TEXT NOT NULL
		)
		"#,
	)
	.execute(pool)
	.await?;

	tracing::debug!("catalog schema ready");
	Ok(())
}
