// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use serde::{Deserialize, Serialize};

use crate::kind::SchemaKind;

/// Maximum number of error strings retained in a summary.
pub const MAX_SUMMARY_ERRORS: usize = 20;

/// Maximum length of a single retained error string, in characters.
pub const MAX_ERROR_LEN: usize = 200;

/// Structured progress counters for one refresh job.
///
/// Counters only ever increase while a job is running; the error list is
/// bounded so a pathological upstream cannot bloat the job row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RefreshSummary {
	#[serde(default)]
	pub nodes_total: u64,
	#[serde(default)]
	pub nodes_fetched: u64,
	#[serde(default)]
	pub nodes_failed: u64,

	#[serde(default)]
	pub credentials_total: u64,
	#[serde(default)]
	pub credentials_fetched: u64,
	#[serde(default)]
	pub credentials_failed: u64,

	#[serde(default)]
	pub templates_total: u64,
	#[serde(default)]
	pub templates_fetched: u64,
	#[serde(default)]
	pub templates_failed: u64,

	#[serde(default)]
	pub errors: Vec<String>,
}

impl RefreshSummary {
	/// Record how many items a sub-step's listing returned.
	pub fn record_listed(&mut self, kind: SchemaKind, total: u64) {
		match kind {
			SchemaKind::Node => self.nodes_total = total,
			SchemaKind::Credential => self.credentials_total = total,
			SchemaKind::Template => self.templates_total = total,
		}
	}

	pub fn record_fetched(&mut self, kind: SchemaKind) {
		match kind {
			SchemaKind::Node => self.nodes_fetched += 1,
			SchemaKind::Credential => self.credentials_fetched += 1,
			SchemaKind::Template => self.templates_fetched += 1,
		}
	}

	pub fn record_failure(&mut self, kind: SchemaKind, error: &str) {
		match kind {
			SchemaKind::Node => self.nodes_failed += 1,
			SchemaKind::Credential => self.credentials_failed += 1,
			SchemaKind::Template => self.templates_failed += 1,
		}
		self.push_error(error);
	}

	/// Append an error string, truncated and capped.
	pub fn push_error(&mut self, error: &str) {
		if self.errors.len() >= MAX_SUMMARY_ERRORS {
			return;
		}
		let truncated = if error.chars().count() > MAX_ERROR_LEN {
			error.chars().take(MAX_ERROR_LEN).collect()
		} else {
			error.to_string()
		};
		self.errors.push(truncated);
	}

	pub fn fetched(&self, kind: SchemaKind) -> u64 {
		match kind {
			SchemaKind::Node => self.nodes_fetched,
			SchemaKind::Credential => self.credentials_fetched,
			SchemaKind::Template => self.templates_fetched,
		}
	}

	pub fn failed(&self, kind: SchemaKind) -> u64 {
		match kind {
			SchemaKind::Node => self.nodes_failed,
			SchemaKind::Credential => self.credentials_failed,
			SchemaKind::Template => self.templates_failed,
		}
	}
}
