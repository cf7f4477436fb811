// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use trellis_catalog_core::{RefreshScope, RefreshSummary, SchemaKind};
use trellis_catalog_db::{CatalogStore, RefreshJob, RefreshJobStatus};

use crate::config::RefreshConfig;
use crate::error::{RefreshError, Result};
use crate::source::{SchemaSource, SourceError};

/// How a `start_refresh` call resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StartStatus {
	Running,
	/// A refresh for this `(source, scope)` was already in flight; the
	/// returned job id is the running one's. Not an error.
	AlreadyRunning,
}

/// Caller-visible handle for a refresh attempt.
#[derive(Debug, Clone, Serialize)]
pub struct StartedRefresh {
	pub job_id: String,
	pub status: StartStatus,
}

/// Drives one coordinated bulk refresh per `(source, scope)`.
///
/// `start_refresh` returns as soon as the job row exists; the fetch/write
/// work runs on a detached task whose only observable effects are job-row
/// updates and cache writes. Poll [`RefreshOrchestrator::job_status`] to see
/// it finish.
#[derive(Clone)]
pub struct RefreshOrchestrator {
	store: Arc<CatalogStore>,
	upstream: Arc<dyn SchemaSource>,
	config: RefreshConfig,
}

impl RefreshOrchestrator {
	pub fn new(
		store: Arc<CatalogStore>,
		upstream: Arc<dyn SchemaSource>,
		config: RefreshConfig,
	) -> Self {
		Self {
			store,
			upstream,
			config,
		}
	}

	#[tracing::instrument(skip(self), fields(scope = scope.as_str()))]
	pub async fn start_refresh(
		&self,
		source: &str,
		scope: RefreshScope,
		force: bool,
	) -> Result<StartedRefresh> {
		if !self.store.locks().try_acquire(source, scope).await? {
			if let Some(job) = self.store.jobs().latest_running(source, scope).await? {
				info!(job_id = %job.id, "refresh already running, joining");
				return Ok(StartedRefresh {
					job_id: job.id,
					status: StartStatus::AlreadyRunning,
				});
			}
			// Held lock with no running job: the holder died between
			// acquiring and bookkeeping. Proceed rather than block every
			// future refresh; our release will clear the stale row.
			warn!(scope = scope.as_str(), "stale refresh lock, proceeding");
		}

		let job_id = Uuid::new_v4().to_string();
		if let Err(e) = self
			.store
			.jobs()
			.create(&job_id, source, scope, &RefreshSummary::default())
			.await
		{
			if let Err(release_err) = self.store.locks().release(source, scope).await {
				warn!(error = %release_err, "failed to release lock after job create error");
			}
			return Err(e.into());
		}
		info!(job_id = %job_id, force, "refresh started");

		let task = self.clone();
		let task_source = source.to_string();
		let task_job_id = job_id.clone();
		tokio::spawn(async move {
			task.execute(&task_job_id, &task_source, scope, force).await;
		});

		Ok(StartedRefresh {
			job_id,
			status: StartStatus::Running,
		})
	}

	/// Pure read for pollers.
	#[tracing::instrument(skip(self))]
	pub async fn job_status(&self, job_id: &str) -> Result<Option<RefreshJob>> {
		Ok(self.store.jobs().get(job_id).await?)
	}

	/// Supervised boundary for the background task: whatever happens inside,
	/// the job row is finalized and the lock is released before this returns.
	async fn execute(&self, job_id: &str, source: &str, scope: RefreshScope, force: bool) {
		let mut summary = RefreshSummary::default();
		let status = match self
			.run_scope(job_id, source, scope, force, &mut summary)
			.await
		{
			Ok(()) => RefreshJobStatus::Success,
			Err(e) => {
				summary.push_error(&e.to_string());
				warn!(job_id = %job_id, error = %e, "refresh failed");
				RefreshJobStatus::Failed
			}
		};

		if let Err(e) = self.store.jobs().update(job_id, status, &summary, true).await {
			error!(job_id = %job_id, error = %e, "failed to finalize refresh job");
		}
		if let Err(e) = self.store.locks().release(source, scope).await {
			warn!(job_id = %job_id, error = %e, "failed to release refresh lock");
		}

		info!(
			job_id = %job_id,
			status = status.as_str(),
			errors = summary.errors.len(),
			"refresh finished"
		);
	}

	async fn run_scope(
		&self,
		job_id: &str,
		source: &str,
		scope: RefreshScope,
		force: bool,
		summary: &mut RefreshSummary,
	) -> Result<()> {
		match scope {
			RefreshScope::Nodes => self.refresh_nodes(job_id, source, force, summary).await,
			RefreshScope::Credentials => {
				self
					.refresh_listed_kind(source, SchemaKind::Credential, force, summary)
					.await
			}
			RefreshScope::Marketplace => {
				self
					.refresh_listed_kind(source, SchemaKind::Template, force, summary)
					.await
			}
			RefreshScope::All => {
				// Sub-steps are independent failure domains: one failed
				// listing is recorded, the siblings still run.
				if let Err(e) = self.refresh_nodes(job_id, source, force, summary).await {
					summary.push_error(&e.to_string());
				}
				if let Err(e) = self
					.refresh_listed_kind(source, SchemaKind::Credential, force, summary)
					.await
				{
					summary.push_error(&e.to_string());
				}
				if let Err(e) = self
					.refresh_listed_kind(source, SchemaKind::Template, force, summary)
					.await
				{
					summary.push_error(&e.to_string());
				}
				Ok(())
			}
		}
	}

	/// Node refresh: the fan-out sub-step. Item fetches run concurrently
	/// under the gate; one failed item never aborts the loop.
	async fn refresh_nodes(
		&self,
		job_id: &str,
		source: &str,
		force: bool,
		summary: &mut RefreshSummary,
	) -> Result<()> {
		let names = self
			.upstream
			.list_items(SchemaKind::Node)
			.await
			.map_err(|e| RefreshError::List {
				kind: SchemaKind::Node.as_str(),
				source: e,
			})?;
		summary.record_listed(SchemaKind::Node, names.len() as u64);
		debug!(total = names.len(), "listed node types");

		if force {
			self.store.cache().invalidate(source, SchemaKind::Node).await?;
		}

		let gate = Arc::new(Semaphore::new(self.config.fetch_concurrency));
		let mut tasks = JoinSet::new();
		for name in names {
			let gate = Arc::clone(&gate);
			let upstream = Arc::clone(&self.upstream);
			tasks.spawn(async move {
				let _permit = match gate.acquire_owned().await {
					Ok(permit) => permit,
					Err(_) => {
						return (
							name,
							Err(SourceError::Transport("fetch gate closed".to_string())),
						)
					}
				};
				let result = upstream.fetch_item(SchemaKind::Node, &name).await;
				(name, result)
			});
		}

		let mut fetched: Vec<(String, Value)> = Vec::new();
		let mut completed = 0usize;
		while let Some(joined) = tasks.join_next().await {
			completed += 1;
			match joined {
				Ok((name, Ok(document))) => match normalize_document(&name, document) {
					Ok(document) => {
						summary.record_fetched(SchemaKind::Node);
						fetched.push((name, document));
					}
					Err(reason) => {
						summary.record_failure(SchemaKind::Node, &format!("node {name}: {reason}"));
					}
				},
				Ok((name, Err(e))) => {
					summary.record_failure(SchemaKind::Node, &format!("node {name}: {e}"));
				}
				Err(join_error) => {
					summary.record_failure(
						SchemaKind::Node,
						&format!("node fetch task failed: {join_error}"),
					);
				}
			}

			// Sampled, not per-item: enough for a poller to see live counters.
			if completed % self.config.progress_every == 0 {
				if let Err(e) = self
					.store
					.jobs()
					.update(job_id, RefreshJobStatus::Running, summary, false)
					.await
				{
					warn!(job_id = %job_id, error = %e, "failed to persist refresh progress");
				}
			}
		}

		let written = self
			.store
			.cache()
			.put_batch(
				source,
				SchemaKind::Node,
				fetched,
				self.config.node_ttl_seconds,
				self.config.batch_chunk_size,
			)
			.await?;
		debug!(written, "node refresh written");
		Ok(())
	}

	/// Credential and template refresh: list once, fetch sequentially,
	/// batch-write the lot. Item counts are small enough that the fan-out
	/// machinery would be overhead.
	async fn refresh_listed_kind(
		&self,
		source: &str,
		kind: SchemaKind,
		force: bool,
		summary: &mut RefreshSummary,
	) -> Result<()> {
		let names = self
			.upstream
			.list_items(kind)
			.await
			.map_err(|e| RefreshError::List {
				kind: kind.as_str(),
				source: e,
			})?;
		summary.record_listed(kind, names.len() as u64);
		debug!(total = names.len(), kind = kind.as_str(), "listed schema items");

		if force {
			self.store.cache().invalidate(source, kind).await?;
		}

		let mut fetched: Vec<(String, Value)> = Vec::with_capacity(names.len());
		for name in names {
			match self.upstream.fetch_item(kind, &name).await {
				Ok(document) => match normalize_document(&name, document) {
					Ok(document) => {
						summary.record_fetched(kind);
						fetched.push((name, document));
					}
					Err(reason) => {
						summary.record_failure(kind, &format!("{} {name}: {reason}", kind.as_str()));
					}
				},
				Err(e) => {
					summary.record_failure(kind, &format!("{} {name}: {e}", kind.as_str()));
				}
			}
		}

		let written = self
			.store
			.cache()
			.put_batch(
				source,
				kind,
				fetched,
				self.config.ttl_for(kind),
				self.config.batch_chunk_size,
			)
			.await?;
		debug!(written, kind = kind.as_str(), "schema refresh written");
		Ok(())
	}
}

/// A fetched document must be an object and must not carry the upstream's
/// error indicator. The listing is the naming authority, so the canonical
/// item name is stamped onto the document.
fn normalize_document(name: &str, document: Value) -> std::result::Result<Value, String> {
	let Value::Object(mut map) = document else {
		return Err("malformed response (not an object)".to_string());
	};
	if let Some(indicator) = map.get("error") {
		return Err(format!("upstream error: {indicator}"));
	}
	map.insert("name".to_string(), Value::String(name.to_string()));
	Ok(Value::Object(map))
}

#[cfg(test)]
mod tests {
	use super::*;
	use async_trait::async_trait;
	use serde_json::json;
	use std::collections::HashSet;
	use std::sync::atomic::{AtomicUsize, Ordering};
	use std::time::Duration;
	use trellis_catalog_core::content_hash;
	use trellis_catalog_db::testing::create_catalog_test_pool;

	const SOURCE: &str = "https://flow.example.com";

	/// Configurable fake upstream with call accounting.
	struct MockSource {
		nodes: Vec<String>,
		credentials: Vec<String>,
		templates: Vec<String>,
		failing: HashSet<String>,
		error_indicator: HashSet<String>,
		fail_node_listing: bool,
		fetch_delay_ms: u64,
		gate: Option<Arc<Semaphore>>,
		node_list_calls: AtomicUsize,
		node_fetch_calls: AtomicUsize,
		in_flight: AtomicUsize,
		max_in_flight: AtomicUsize,
	}

	impl MockSource {
		fn new() -> Self {
			Self {
				nodes: Vec::new(),
				credentials: Vec::new(),
				templates: Vec::new(),
				failing: HashSet::new(),
				error_indicator: HashSet::new(),
				fail_node_listing: false,
				fetch_delay_ms: 0,
				gate: None,
				node_list_calls: AtomicUsize::new(0),
				node_fetch_calls: AtomicUsize::new(0),
				in_flight: AtomicUsize::new(0),
				max_in_flight: AtomicUsize::new(0),
			}
		}

		fn with_nodes(names: &[&str]) -> Self {
			let mut mock = Self::new();
			mock.nodes = names.iter().map(|n| n.to_string()).collect();
			mock
		}

		fn document_for(kind: SchemaKind, name: &str) -> Value {
			match kind {
				SchemaKind::Credential => json!({
					"name": name,
					"displayName": name.to_uppercase(),
					"apiKey": "live-secret",
				}),
				_ => json!({
					"name": name,
					"displayName": name.to_uppercase(),
					"group": kind.as_str(),
				}),
			}
		}
	}

	#[async_trait]
	impl SchemaSource for MockSource {
		async fn list_items(&self, kind: SchemaKind) -> std::result::Result<Vec<String>, SourceError> {
			match kind {
				SchemaKind::Node => {
					self.node_list_calls.fetch_add(1, Ordering::SeqCst);
					if self.fail_node_listing {
						return Err(SourceError::Transport("listing endpoint down".to_string()));
					}
					Ok(self.nodes.clone())
				}
				SchemaKind::Credential => Ok(self.credentials.clone()),
				SchemaKind::Template => Ok(self.templates.clone()),
			}
		}

		async fn fetch_item(
			&self,
			kind: SchemaKind,
			name: &str,
		) -> std::result::Result<Value, SourceError> {
			if kind == SchemaKind::Node {
				self.node_fetch_calls.fetch_add(1, Ordering::SeqCst);
			}
			let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
			self.max_in_flight.fetch_max(current, Ordering::SeqCst);

			if let Some(gate) = &self.gate {
				let _permit = gate.acquire().await;
			}
			if self.fetch_delay_ms > 0 {
				tokio::time::sleep(Duration::from_millis(self.fetch_delay_ms)).await;
			}

			self.in_flight.fetch_sub(1, Ordering::SeqCst);

			if self.failing.contains(name) {
				return Err(SourceError::Transport(format!(
					"connection reset fetching {name}"
				)));
			}
			if self.error_indicator.contains(name) {
				return Ok(json!({"error": "item unavailable"}));
			}
			Ok(Self::document_for(kind, name))
		}
	}

	async fn orchestrator_with(
		mock: MockSource,
		config: RefreshConfig,
	) -> (
		RefreshOrchestrator,
		Arc<CatalogStore>,
		sqlx::SqlitePool,
		Arc<MockSource>,
	) {
		let pool = create_catalog_test_pool().await;
		let store = Arc::new(CatalogStore::new(pool.clone()));
		let mock = Arc::new(mock);
		let upstream: Arc<dyn SchemaSource> = Arc::clone(&mock) as Arc<dyn SchemaSource>;
		let orchestrator = RefreshOrchestrator::new(Arc::clone(&store), upstream, config);
		(orchestrator, store, pool, mock)
	}

	async fn wait_for_completion(orchestrator: &RefreshOrchestrator, job_id: &str) -> RefreshJob {
		for _ in 0..500 {
			let job = orchestrator.job_status(job_id).await.unwrap().unwrap();
			if job.status != RefreshJobStatus::Running {
				return job;
			}
			tokio::time::sleep(Duration::from_millis(10)).await;
		}
		panic!("refresh did not finish in time");
	}

	#[tokio::test]
	async fn test_nodes_refresh_end_to_end() {
		let mock = MockSource::with_nodes(&["slack", "webhook", "httpRequest"]);
		let (orchestrator, store, _pool, _mock) =
			orchestrator_with(mock, RefreshConfig::default()).await;

		let started = orchestrator
			.start_refresh(SOURCE, RefreshScope::Nodes, false)
			.await
			.unwrap();
		assert_eq!(started.status, StartStatus::Running);

		let job = wait_for_completion(&orchestrator, &started.job_id).await;
		assert_eq!(job.status, RefreshJobStatus::Success);
		assert!(job.ended_at.is_some());
		assert_eq!(job.summary.nodes_total, 3);
		assert_eq!(job.summary.nodes_fetched, 3);
		assert_eq!(job.summary.nodes_failed, 0);
		assert!(job.summary.errors.is_empty());

		assert_eq!(store.cache().count(SOURCE, SchemaKind::Node).await.unwrap(), 3);

		let entry = store
			.cache()
			.get(SOURCE, SchemaKind::Node, "slack")
			.await
			.unwrap()
			.unwrap();
		// Independently recompute the hash of what should have been stored.
		let expected = MockSource::document_for(SchemaKind::Node, "slack");
		assert_eq!(entry.content_hash, content_hash(&expected));
		assert_eq!(entry.document, expected);
		assert_eq!(entry.ttl_seconds, 86_400);
	}

	#[tokio::test]
	async fn test_second_start_joins_running_refresh() {
		let gate = Arc::new(Semaphore::new(0));
		let mut mock = MockSource::with_nodes(&["slack"]);
		mock.gate = Some(Arc::clone(&gate));
		let (orchestrator, store, _pool, _mock) =
			orchestrator_with(mock, RefreshConfig::default()).await;

		let first = orchestrator
			.start_refresh(SOURCE, RefreshScope::Nodes, false)
			.await
			.unwrap();
		assert_eq!(first.status, StartStatus::Running);

		// The lock is observably held while the fetch is parked on the gate.
		assert!(
			!store
				.locks()
				.try_acquire(SOURCE, RefreshScope::Nodes)
				.await
				.unwrap()
		);

		let second = orchestrator
			.start_refresh(SOURCE, RefreshScope::Nodes, false)
			.await
			.unwrap();
		assert_eq!(second.status, StartStatus::AlreadyRunning);
		assert_eq!(second.job_id, first.job_id);

		gate.add_permits(1);
		let job = wait_for_completion(&orchestrator, &first.job_id).await;
		assert_eq!(job.status, RefreshJobStatus::Success);

		// Once finished, a new refresh starts fresh under a new job id.
		let third = orchestrator
			.start_refresh(SOURCE, RefreshScope::Nodes, false)
			.await
			.unwrap();
		assert_eq!(third.status, StartStatus::Running);
		assert_ne!(third.job_id, first.job_id);
		wait_for_completion(&orchestrator, &third.job_id).await;
	}

	#[tokio::test]
	async fn test_fetch_fan_out_is_bounded() {
		let names: Vec<String> = (0..20).map(|i| format!("node-{i}")).collect();
		let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
		let mut mock = MockSource::with_nodes(&name_refs);
		mock.fetch_delay_ms = 20;
		let (orchestrator, _store, _pool, mock) =
			orchestrator_with(mock, RefreshConfig::default()).await;

		let started = orchestrator
			.start_refresh(SOURCE, RefreshScope::Nodes, false)
			.await
			.unwrap();
		let job = wait_for_completion(&orchestrator, &started.job_id).await;
		assert_eq!(job.summary.nodes_fetched, 20);

		let max = mock.max_in_flight.load(Ordering::SeqCst);
		assert!(max <= 5, "observed {max} concurrent fetches, gate allows 5");
		assert!(max >= 2, "fetches never overlapped; gate is over-serializing");
	}

	#[tokio::test]
	async fn test_partial_item_failures_still_succeed() {
		let names: Vec<String> = (0..10).map(|i| format!("node-{i}")).collect();
		let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
		let mut mock = MockSource::with_nodes(&name_refs);
		mock.failing.insert("node-2".to_string());
		let (orchestrator, store, _pool, _mock) =
			orchestrator_with(mock, RefreshConfig::default()).await;

		let started = orchestrator
			.start_refresh(SOURCE, RefreshScope::Nodes, false)
			.await
			.unwrap();
		let job = wait_for_completion(&orchestrator, &started.job_id).await;

		assert_eq!(job.status, RefreshJobStatus::Success);
		assert_eq!(job.summary.nodes_total, 10);
		assert_eq!(job.summary.nodes_fetched, 9);
		assert_eq!(job.summary.nodes_failed, 1);
		assert_eq!(job.summary.errors.len(), 1);
		assert!(job.summary.errors[0].contains("node-2"));

		assert_eq!(store.cache().count(SOURCE, SchemaKind::Node).await.unwrap(), 9);
		assert!(
			store
				.cache()
				.get(SOURCE, SchemaKind::Node, "node-2")
				.await
				.unwrap()
				.is_none()
		);
	}

	#[tokio::test]
	async fn test_error_indicator_document_is_an_item_failure() {
		let mut mock = MockSource::with_nodes(&["slack", "ghost"]);
		mock.error_indicator.insert("ghost".to_string());
		let (orchestrator, store, _pool, _mock) =
			orchestrator_with(mock, RefreshConfig::default()).await;

		let started = orchestrator
			.start_refresh(SOURCE, RefreshScope::Nodes, false)
			.await
			.unwrap();
		let job = wait_for_completion(&orchestrator, &started.job_id).await;

		assert_eq!(job.status, RefreshJobStatus::Success);
		assert_eq!(job.summary.nodes_fetched, 1);
		assert_eq!(job.summary.nodes_failed, 1);
		assert!(job.summary.errors[0].contains("ghost"));
		assert_eq!(store.cache().count(SOURCE, SchemaKind::Node).await.unwrap(), 1);
	}

	#[tokio::test]
	async fn test_credentials_scope_never_touches_node_endpoints() {
		let mut mock = MockSource::with_nodes(&["slack"]);
		mock.credentials = vec!["slackApi".to_string(), "githubApi".to_string()];
		let (orchestrator, store, _pool, mock) =
			orchestrator_with(mock, RefreshConfig::default()).await;

		let started = orchestrator
			.start_refresh(SOURCE, RefreshScope::Credentials, false)
			.await
			.unwrap();
		let job = wait_for_completion(&orchestrator, &started.job_id).await;

		assert_eq!(job.status, RefreshJobStatus::Success);
		assert_eq!(job.summary.credentials_fetched, 2);
		assert_eq!(job.summary.nodes_total, 0);
		assert_eq!(mock.node_list_calls.load(Ordering::SeqCst), 0);
		assert_eq!(mock.node_fetch_calls.load(Ordering::SeqCst), 0);

		assert_eq!(
			store.cache().count(SOURCE, SchemaKind::Credential).await.unwrap(),
			2
		);
		assert_eq!(store.cache().count(SOURCE, SchemaKind::Node).await.unwrap(), 0);

		let entry = store
			.cache()
			.get(SOURCE, SchemaKind::Credential, "slackApi")
			.await
			.unwrap()
			.unwrap();
		assert_eq!(entry.ttl_seconds, 3_600);
	}

	#[tokio::test]
	async fn test_credential_refresh_scrubs_before_persisting() {
		let mut mock = MockSource::new();
		mock.credentials = vec!["slackApi".to_string()];
		let (orchestrator, _store, pool, _mock) =
			orchestrator_with(mock, RefreshConfig::default()).await;

		let started = orchestrator
			.start_refresh(SOURCE, RefreshScope::Credentials, false)
			.await
			.unwrap();
		wait_for_completion(&orchestrator, &started.job_id).await;

		let (raw,) = sqlx::query_as::<_, (String,)>(
			"SELECT document FROM cache_items WHERE kind = 'credential' AND key = 'slackApi'",
		)
		.fetch_one(&pool)
		.await
		.unwrap();
		assert!(!raw.contains("apiKey"));
		assert!(!raw.contains("live-secret"));
		assert!(raw.contains("displayName"));
	}

	#[tokio::test]
	async fn test_all_scope_runs_siblings_despite_list_failure() {
		let mut mock = MockSource::new();
		mock.fail_node_listing = true;
		mock.credentials = vec!["slackApi".to_string(), "githubApi".to_string()];
		mock.templates = vec!["starter".to_string()];
		let (orchestrator, store, _pool, _mock) =
			orchestrator_with(mock, RefreshConfig::default()).await;

		let started = orchestrator
			.start_refresh(SOURCE, RefreshScope::All, false)
			.await
			.unwrap();
		let job = wait_for_completion(&orchestrator, &started.job_id).await;

		// The node sub-step aborted; its siblings completed, so the job did.
		assert_eq!(job.status, RefreshJobStatus::Success);
		assert!(job.summary.errors.iter().any(|e| e.contains("node")));
		assert_eq!(job.summary.credentials_fetched, 2);
		assert_eq!(job.summary.templates_fetched, 1);
		assert_eq!(store.cache().count(SOURCE, SchemaKind::Node).await.unwrap(), 0);
		assert_eq!(
			store.cache().count(SOURCE, SchemaKind::Template).await.unwrap(),
			1
		);
	}

	#[tokio::test]
	async fn test_single_scope_list_failure_fails_the_job() {
		let mut mock = MockSource::new();
		mock.fail_node_listing = true;
		let (orchestrator, store, _pool, _mock) =
			orchestrator_with(mock, RefreshConfig::default()).await;

		let started = orchestrator
			.start_refresh(SOURCE, RefreshScope::Nodes, false)
			.await
			.unwrap();
		let job = wait_for_completion(&orchestrator, &started.job_id).await;

		assert_eq!(job.status, RefreshJobStatus::Failed);
		assert!(job.ended_at.is_some());
		assert!(job.summary.errors.iter().any(|e| e.contains("node")));

		// The lock was released on the failure path.
		assert!(
			store
				.locks()
				.try_acquire(SOURCE, RefreshScope::Nodes)
				.await
				.unwrap()
		);
	}

	#[tokio::test]
	async fn test_stale_lock_does_not_block_a_new_refresh() {
		let mock = MockSource::with_nodes(&["slack"]);
		let (orchestrator, store, _pool, _mock) =
			orchestrator_with(mock, RefreshConfig::default()).await;

		// A crashed holder left the lock behind without a running job.
		assert!(
			store
				.locks()
				.try_acquire(SOURCE, RefreshScope::Nodes)
				.await
				.unwrap()
		);

		let started = orchestrator
			.start_refresh(SOURCE, RefreshScope::Nodes, false)
			.await
			.unwrap();
		assert_eq!(started.status, StartStatus::Running);

		let job = wait_for_completion(&orchestrator, &started.job_id).await;
		assert_eq!(job.status, RefreshJobStatus::Success);

		// The finalize path cleared the stale row.
		assert!(
			store
				.locks()
				.try_acquire(SOURCE, RefreshScope::Nodes)
				.await
				.unwrap()
		);
	}

	#[tokio::test]
	async fn test_force_refresh_clears_superseded_entries() {
		let mock = MockSource::with_nodes(&["slack"]);
		let (orchestrator, store, _pool, _mock) =
			orchestrator_with(mock, RefreshConfig::default()).await;

		// An entry the upstream no longer lists.
		store
			.cache()
			.put(SOURCE, SchemaKind::Node, "ghost", json!({"name": "ghost"}), 86_400)
			.await
			.unwrap();

		let started = orchestrator
			.start_refresh(SOURCE, RefreshScope::Nodes, true)
			.await
			.unwrap();
		let job = wait_for_completion(&orchestrator, &started.job_id).await;
		assert_eq!(job.status, RefreshJobStatus::Success);

		assert_eq!(store.cache().count(SOURCE, SchemaKind::Node).await.unwrap(), 1);
		assert!(
			store
				.cache()
				.get(SOURCE, SchemaKind::Node, "ghost")
				.await
				.unwrap()
				.is_none()
		);
		assert!(
			store
				.cache()
				.get(SOURCE, SchemaKind::Node, "slack")
				.await
				.unwrap()
				.is_some()
		);
	}

	#[tokio::test]
	async fn test_plain_refresh_does_not_delete() {
		let mock = MockSource::with_nodes(&["slack"]);
		let (orchestrator, store, _pool, _mock) =
			orchestrator_with(mock, RefreshConfig::default()).await;

		store
			.cache()
			.put(SOURCE, SchemaKind::Node, "ghost", json!({"name": "ghost"}), 86_400)
			.await
			.unwrap();

		let started = orchestrator
			.start_refresh(SOURCE, RefreshScope::Nodes, false)
			.await
			.unwrap();
		wait_for_completion(&orchestrator, &started.job_id).await;

		assert_eq!(store.cache().count(SOURCE, SchemaKind::Node).await.unwrap(), 2);
	}

	#[tokio::test]
	async fn test_progress_is_persisted_while_running() {
		let names: Vec<String> = (0..10).map(|i| format!("node-{i}")).collect();
		let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
		let mut mock = MockSource::with_nodes(&name_refs);
		mock.fetch_delay_ms = 30;
		let config = RefreshConfig {
			fetch_concurrency: 1,
			progress_every: 1,
			..RefreshConfig::default()
		};
		let (orchestrator, _store, _pool, _mock) = orchestrator_with(mock, config).await;

		let started = orchestrator
			.start_refresh(SOURCE, RefreshScope::Nodes, false)
			.await
			.unwrap();

		let mut observed_live_progress = false;
		for _ in 0..200 {
			let job = orchestrator.job_status(&started.job_id).await.unwrap().unwrap();
			if job.status == RefreshJobStatus::Running && job.summary.nodes_fetched > 0 {
				observed_live_progress = true;
				break;
			}
			if job.status != RefreshJobStatus::Running {
				break;
			}
			tokio::time::sleep(Duration::from_millis(5)).await;
		}
		assert!(observed_live_progress, "no live counters seen while running");

		let job = wait_for_completion(&orchestrator, &started.job_id).await;
		assert_eq!(job.summary.nodes_fetched, 10);
	}

	#[tokio::test]
	async fn test_job_status_for_unknown_id() {
		let (orchestrator, _store, _pool, _mock) =
			orchestrator_with(MockSource::new(), RefreshConfig::default()).await;
		assert!(orchestrator.job_status("no-such-job").await.unwrap().is_none());
	}

	#[test]
	fn test_normalize_rejects_non_objects() {
		let result = normalize_document("slack", json!(["not", "an", "object"]));
		assert!(result.is_err());
	}

	#[test]
	fn test_normalize_rejects_error_indicator() {
		let result = normalize_document("slack", json!({"error": "boom"}));
		assert!(result.unwrap_err().contains("boom"));
	}

	#[test]
	fn test_normalize_stamps_listing_name() {
		let normalized = normalize_document("slack", json!({"displayName": "Slack"})).unwrap();
		assert_eq!(normalized.get("name"), Some(&json!("slack")));
	}
}
