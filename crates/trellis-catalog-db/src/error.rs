// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

/// Errors from catalog store operations.
///
/// A miss is always `Ok(None)`, never an error; the `Sqlx` variant is the
/// store-unreachable case callers treat as fatal to the current operation.
#[derive(Debug, thiserror::Error)]
pub enum CatalogDbError {
	#[error("database error: {0}")]
	Sqlx(#[from] sqlx::Error),

	#[error("not found: {0}")]
	NotFound(String),

	#[error("serialization error: {0}")]
	Serialization(#[from] serde_json::Error),

	#[error("internal: {0}")]
	Internal(String),
}

pub type Result<T> = std::result::Result<T, CatalogDbError>;
