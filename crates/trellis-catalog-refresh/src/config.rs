// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use trellis_catalog_core::SchemaKind;
use trellis_catalog_db::DEFAULT_BATCH_CHUNK_SIZE;

/// Simultaneous in-flight item fetches against the upstream platform.
pub const DEFAULT_FETCH_CONCURRENCY: usize = 5;

/// Persist job progress every N completed fetches.
pub const DEFAULT_PROGRESS_EVERY: usize = 10;

pub const DEFAULT_NODE_TTL_SECONDS: i64 = 86_400;
pub const DEFAULT_CREDENTIAL_TTL_SECONDS: i64 = 3_600;
pub const DEFAULT_TEMPLATE_TTL_SECONDS: i64 = 86_400;

/// Tuning for one orchestrator instance. Tests override per-instance.
#[derive(Debug, Clone)]
pub struct RefreshConfig {
	pub fetch_concurrency: usize,
	pub batch_chunk_size: usize,
	pub progress_every: usize,
	pub node_ttl_seconds: i64,
	pub credential_ttl_seconds: i64,
	pub template_ttl_seconds: i64,
}

impl Default for RefreshConfig {
	fn default() -> Self {
		Self {
			fetch_concurrency: DEFAULT_FETCH_CONCURRENCY,
			batch_chunk_size: DEFAULT_BATCH_CHUNK_SIZE,
			progress_every: DEFAULT_PROGRESS_EVERY,
			node_ttl_seconds: DEFAULT_NODE_TTL_SECONDS,
			// Credentials change more often and are more sensitive.
			credential_ttl_seconds: DEFAULT_CREDENTIAL_TTL_SECONDS,
			template_ttl_seconds: DEFAULT_TEMPLATE_TTL_SECONDS,
		}
	}
}

impl RefreshConfig {
	pub fn ttl_for(&self, kind: SchemaKind) -> i64 {
		match kind {
			SchemaKind::Node => self.node_ttl_seconds,
			SchemaKind::Credential => self.credential_ttl_seconds,
			SchemaKind::Template => self.template_ttl_seconds,
		}
	}
}
