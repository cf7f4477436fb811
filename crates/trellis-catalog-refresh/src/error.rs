// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use crate::source::SourceError;
use trellis_catalog_db::CatalogDbError;

/// Errors that abort a refresh sub-step or the attempt as a whole.
///
/// Per-item fetch failures are not errors; they are folded into the job
/// summary and never surface here.
#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
	#[error("store error: {0}")]
	Store(#[from] CatalogDbError),

	#[error("could not list {kind} items: {source}")]
	List {
		kind: &'static str,
		source: SourceError,
	},
}

pub type Result<T> = std::result::Result<T, RefreshError>;
