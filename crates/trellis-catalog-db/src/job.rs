// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use trellis_catalog_core::{RefreshScope, RefreshSummary};

use crate::error::{CatalogDbError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshJobStatus {
	Running,
	Success,
	Failed,
}

impl RefreshJobStatus {
	pub fn as_str(&self) -> &'static str {
		match self {
			RefreshJobStatus::Running => "running",
			RefreshJobStatus::Success => "success",
			RefreshJobStatus::Failed => "failed",
		}
	}
}

impl std::str::FromStr for RefreshJobStatus {
	type Err = String;

	fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
		match s {
			"running" => Ok(RefreshJobStatus::Running),
			"success" => Ok(RefreshJobStatus::Success),
			"failed" => Ok(RefreshJobStatus::Failed),
			_ => Err(format!("unknown refresh job status: {s}")),
		}
	}
}

/// One attempt to refresh some scope against one source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshJob {
	pub id: String,
	pub source: String,
	pub scope: RefreshScope,
	pub status: RefreshJobStatus,
	pub started_at: DateTime<Utc>,
	pub ended_at: Option<DateTime<Utc>>,
	pub summary: RefreshSummary,
}

/// Repository over the `refresh_jobs` table.
#[derive(Clone)]
pub struct RefreshJobRepository {
	pool: SqlitePool,
}

impl RefreshJobRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	#[tracing::instrument(skip(self, summary), fields(job_id = %id))]
	pub async fn create(
		&self,
		id: &str,
		source: &str,
		scope: RefreshScope,
		summary: &RefreshSummary,
	) -> Result<()> {
		let summary_json = serde_json::to_string(summary)?;
		sqlx::query(
			r#"
			INSERT INTO refresh_jobs (id, source, scope, status, started_at, ended_at, summary)
			VALUES (?, ?, ?, ?, ?, NULL, ?)
			"#,
		)
		.bind(id)
		.bind(source)
		.bind(scope.as_str())
		.bind(RefreshJobStatus::Running.as_str())
		.bind(Utc::now())
		.bind(summary_json)
		.execute(&self.pool)
		.await?;

		Ok(())
	}

	#[tracing::instrument(skip(self), fields(job_id = %id))]
	pub async fn get(&self, id: &str) -> Result<Option<RefreshJob>> {
		let row = sqlx::query_as::<_, RefreshJobRow>(
			r#"
			SELECT id, source, scope, status, started_at, ended_at, summary
			FROM refresh_jobs
			WHERE id = ?
			"#,
		)
		.bind(id)
		.fetch_optional(&self.pool)
		.await?;

		row.map(RefreshJob::try_from).transpose()
	}

	/// Mutate a job in place. `set_ended` stamps `ended_at`; progress updates
	/// leave it null so a poller can tell live jobs from finished ones.
	#[tracing::instrument(skip(self, summary), fields(job_id = %id))]
	pub async fn update(
		&self,
		id: &str,
		status: RefreshJobStatus,
		summary: &RefreshSummary,
		set_ended: bool,
	) -> Result<()> {
		let summary_json = serde_json::to_string(summary)?;
		let result = if set_ended {
			sqlx::query("UPDATE refresh_jobs SET status = ?, summary = ?, ended_at = ? WHERE id = ?")
				.bind(status.as_str())
				.bind(summary_json)
				.bind(Utc::now())
				.bind(id)
				.execute(&self.pool)
				.await?
		} else {
			sqlx::query("UPDATE refresh_jobs SET status = ?, summary = ? WHERE id = ?")
				.bind(status.as_str())
				.bind(summary_json)
				.bind(id)
				.execute(&self.pool)
				.await?
		};

		if result.rows_affected() == 0 {
			return Err(CatalogDbError::NotFound(id.to_string()));
		}
		Ok(())
	}

	/// Newest job still marked running for `(source, scope)`.
	///
	/// No uniqueness constraint backs this up; a crash can leave several
	/// running rows, and the newest is the one callers should be told about.
	#[tracing::instrument(skip(self))]
	pub async fn latest_running(&self, source: &str, scope: RefreshScope) -> Result<Option<RefreshJob>> {
		let row = sqlx::query_as::<_, RefreshJobRow>(
			r#"
			SELECT id, source, scope, status, started_at, ended_at, summary
			FROM refresh_jobs
			WHERE source = ? AND scope = ? AND status = ?
			ORDER BY started_at DESC
			LIMIT 1
			"#,
		)
		.bind(source)
		.bind(scope.as_str())
		.bind(RefreshJobStatus::Running.as_str())
		.fetch_optional(&self.pool)
		.await?;

		row.map(RefreshJob::try_from).transpose()
	}
}

#[derive(sqlx::FromRow)]
struct RefreshJobRow {
	id: String,
	source: String,
	scope: String,
	status: String,
	started_at: DateTime<Utc>,
	ended_at: Option<DateTime<Utc>>,
	summary: String,
}

impl TryFrom<RefreshJobRow> for RefreshJob {
	type Error = CatalogDbError;

	fn try_from(row: RefreshJobRow) -> Result<Self> {
		Ok(RefreshJob {
			scope: row.scope.parse().map_err(CatalogDbError::Internal)?,
			status: row.status.parse().map_err(CatalogDbError::Internal)?,
			summary: serde_json::from_str(&row.summary)?,
			id: row.id,
			source: row.source,
			started_at: row.started_at,
			ended_at: row.ended_at,
		})
	}
}
