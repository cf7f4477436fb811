// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use sqlx::SqlitePool;

use trellis_catalog_core::{content_hash, scrub_credential_document, SchemaKind};

use crate::error::{CatalogDbError, Result};

/// Default number of entries written per batch transaction.
pub const DEFAULT_BATCH_CHUNK_SIZE: usize = 50;

/// One cached schema document.
#[derive(Debug, Clone)]
pub struct CacheEntry {
	pub source: String,
	pub kind: SchemaKind,
	pub key: String,
	pub content_hash: String,
	pub fetched_at: DateTime<Utc>,
	pub ttl_seconds: i64,
	pub document: Value,
}

impl CacheEntry {
	pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
		self.fetched_at + Duration::seconds(self.ttl_seconds) <= now
	}
}

/// Result of a single `put`: the key and the hash of what was persisted, so
/// callers can detect whether an externally-fetched copy actually changed.
#[derive(Debug, Clone)]
pub struct PutOutcome {
	pub key: String,
	pub content_hash: String,
}

/// Repository over the `cache_items` table.
#[derive(Clone)]
pub struct SchemaCacheRepository {
	pool: SqlitePool,
}

struct PreparedEntry {
	key: String,
	content_hash: String,
	document: String,
}

impl SchemaCacheRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	/// TTL-gated read. An expired-but-present row behaves identically to an
	/// absent one; it is not deleted.
	#[tracing::instrument(skip(self))]
	pub async fn get(&self, source: &str, kind: SchemaKind, key: &str) -> Result<Option<CacheEntry>> {
		let row = sqlx::query_as::<_, CacheItemRow>(
			r#"
			SELECT source, kind, key, content_hash, fetched_at, ttl_seconds, document
			FROM cache_items
			WHERE source = ? AND kind = ? AND key = ?
			"#,
		)
		.bind(source)
		.bind(kind.as_str())
		.bind(key)
		.fetch_optional(&self.pool)
		.await?;

		let Some(row) = row else {
			return Ok(None);
		};
		let entry = CacheEntry::try_from(row)?;
		if entry.is_expired(Utc::now()) {
			return Ok(None);
		}
		Ok(Some(entry))
	}

	/// Scrub-if-credential, hash, upsert. `fetched_at` always advances.
	#[tracing::instrument(skip(self, document))]
	pub async fn put(
		&self,
		source: &str,
		kind: SchemaKind,
		key: &str,
		document: Value,
		ttl_seconds: i64,
	) -> Result<PutOutcome> {
		let prepared = prepare_entry(kind, key.to_string(), document)?;
		let outcome = PutOutcome {
			key: prepared.key.clone(),
			content_hash: prepared.content_hash.clone(),
		};
		self
			.write_chunk(source, kind, &[prepared], ttl_seconds, Utc::now())
			.await?;
		Ok(outcome)
	}

	/// Batch upsert in fixed-size chunks, one transaction per chunk.
	///
	/// Unbounded batching risks long-held transactions; per-entry round-trips
	/// are too slow for thousands of items. Returns the number of entries
	/// written.
	#[tracing::instrument(skip(self, entries), fields(total = entries.len()))]
	pub async fn put_batch(
		&self,
		source: &str,
		kind: SchemaKind,
		entries: Vec<(String, Value)>,
		ttl_seconds: i64,
		chunk_size: usize,
	) -> Result<usize> {
		let chunk_size = chunk_size.max(1);
		let mut prepared = Vec::with_capacity(entries.len());
		for (key, document) in entries {
			prepared.push(prepare_entry(kind, key, document)?);
		}

		let fetched_at = Utc::now();
		let sizes = chunk_sizes(prepared.len(), chunk_size);
		let mut written = 0;
		for &size in &sizes {
			let chunk = &prepared[written..written + size];
			self
				.write_chunk(source, kind, chunk, ttl_seconds, fetched_at)
				.await?;
			written += size;
		}

		tracing::debug!(
			written,
			chunks = sizes.len(),
			kind = kind.as_str(),
			"cache batch written"
		);
		Ok(written)
	}

	async fn write_chunk(
		&self,
		source: &str,
		kind: SchemaKind,
		chunk: &[PreparedEntry],
		ttl_seconds: i64,
		fetched_at: DateTime<Utc>,
	) -> Result<()> {
		let mut tx = self.pool.begin().await?;
		for entry in chunk {
			sqlx::query(
				r#"
				INSERT INTO cache_items (source, kind, key, content_hash, fetched_at, ttl_seconds, document)
				VALUES (?, ?, ?, ?, ?, ?, ?)
				ON CONFLICT(source, kind, key) DO UPDATE SET
					content_hash = excluded.content_hash,
					fetched_at = excluded.fetched_at,
					ttl_seconds = excluded.ttl_seconds,
					document = excluded.document
				"#,
			)
			.bind(source)
			.bind(kind.as_str())
			.bind(&entry.key)
			.bind(&entry.content_hash)
			.bind(fetched_at)
			.bind(ttl_seconds)
			.bind(&entry.document)
			.execute(&mut *tx)
			.await?;
		}
		tx.commit().await?;
		Ok(())
	}

	/// Number of entries present for `(source, kind)`, expired rows included.
	#[tracing::instrument(skip(self))]
	pub async fn count(&self, source: &str, kind: SchemaKind) -> Result<i64> {
		let row = sqlx::query_as::<_, (i64,)>(
			"SELECT COUNT(*) FROM cache_items WHERE source = ? AND kind = ?",
		)
		.bind(source)
		.bind(kind.as_str())
		.fetch_one(&self.pool)
		.await?;

		Ok(row.0)
	}

	/// Readiness probe: whether the cache holds at least `min_count` entries,
	/// so callers can skip an empty cache instead of trusting zero results.
	#[tracing::instrument(skip(self))]
	pub async fn is_populated(&self, source: &str, kind: SchemaKind, min_count: i64) -> Result<bool> {
		Ok(self.count(source, kind).await? >= min_count)
	}

	/// Hard delete of every entry for `(source, kind)`. Returns the number
	/// deleted.
	#[tracing::instrument(skip(self))]
	pub async fn invalidate(&self, source: &str, kind: SchemaKind) -> Result<u64> {
		let result = sqlx::query("DELETE FROM cache_items WHERE source = ? AND kind = ?")
			.bind(source)
			.bind(kind.as_str())
			.execute(&self.pool)
			.await?;

		tracing::info!(
			deleted = result.rows_affected(),
			kind = kind.as_str(),
			"cache invalidated"
		);
		Ok(result.rows_affected())
	}

	/// Keys whose TTL has lapsed, for targeted re-fetch policies.
	#[tracing::instrument(skip(self))]
	pub async fn stale_keys(&self, source: &str, kind: SchemaKind) -> Result<Vec<String>> {
		let rows = sqlx::query_as::<_, (String, DateTime<Utc>, i64)>(
			"SELECT key, fetched_at, ttl_seconds FROM cache_items WHERE source = ? AND kind = ?",
		)
		.bind(source)
		.bind(kind.as_str())
		.fetch_all(&self.pool)
		.await?;

		let now = Utc::now();
		Ok(
			rows
				.into_iter()
				.filter(|(_, fetched_at, ttl_seconds)| {
					*fetched_at + Duration::seconds(*ttl_seconds) <= now
				})
				.map(|(key, _, _)| key)
				.collect(),
		)
	}
}

/// How a batch of `total` entries splits into write transactions.
fn chunk_sizes(total: usize, chunk_size: usize) -> Vec<usize> {
	let mut sizes = Vec::new();
	let mut remaining = total;
	while remaining > 0 {
		let take = remaining.min(chunk_size);
		sizes.push(take);
		remaining -= take;
	}
	sizes
}

fn prepare_entry(kind: SchemaKind, key: String, document: Value) -> Result<PreparedEntry> {
	let document = if kind == SchemaKind::Credential {
		let outcome = scrub_credential_document(document);
		if !outcome.dropped.is_empty() {
			// Field names only; the values must never reach the log stream.
			tracing::warn!(
				key = %key,
				dropped = ?outcome.dropped,
				"stripped disallowed credential fields before persisting"
			);
		}
		outcome.document
	} else {
		document
	};

	let content_hash = content_hash(&document);
	let document = serde_json::to_string(&document)?;
	Ok(PreparedEntry {
		key,
		content_hash,
		document,
	})
}

#[derive(sqlx::FromRow)]
struct CacheItemRow {
	source: String,
	kind: String,
	key: String,
	content_hash: String,
	fetched_at: DateTime<Utc>,
	ttl_seconds: i64,
	document: String,
}

impl TryFrom<CacheItemRow> for CacheEntry {
	type Error = CatalogDbError;

	fn try_from(row: CacheItemRow) -> Result<Self> {
		Ok(CacheEntry {
			kind: row
				.kind
				.parse()
				.map_err(CatalogDbError::Internal)?,
			source: row.source,
			key: row.key,
			content_hash: row.content_hash,
			fetched_at: row.fetched_at,
			ttl_seconds: row.ttl_seconds,
			document: serde_json::from_str(&row.document)?,
		})
	}
}
