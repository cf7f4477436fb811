// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use serde_json::Value;

use trellis_catalog_core::SchemaKind;

/// Failure talking to the upstream platform.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
	#[error("transport error: {0}")]
	Transport(String),

	#[error("unexpected status {status} from {url}")]
	Status { status: u16, url: String },

	#[error("decode error: {0}")]
	Decode(String),
}

/// The upstream platform's schema endpoints, as this crate consumes them.
///
/// Implementations enumerate item names per kind and fetch one item's full
/// schema document. A document that arrives with an explicit error member is
/// returned as-is; classifying it is the orchestrator's concern.
#[async_trait]
pub trait SchemaSource: Send + Sync {
	async fn list_items(&self, kind: SchemaKind) -> std::result::Result<Vec<String>, SourceError>;

	async fn fetch_item(
		&self,
		kind: SchemaKind,
		name: &str,
	) -> std::result::Result<Value, SourceError>;
}
