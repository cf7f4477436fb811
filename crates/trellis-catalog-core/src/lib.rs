// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core types for the trellis schema catalog.
//!
//! Pure domain logic shared by the store and refresh crates: schema kinds and
//! refresh scopes, canonical content hashing for change detection, credential
//! document scrubbing, and refresh summary bookkeeping.

pub mod hash;
pub mod kind;
pub mod scrub;
pub mod summary;

pub use hash::{canonical_json, content_hash};
pub use kind::{RefreshScope, SchemaKind};
pub use scrub::{
	scrub_credential_document, ScrubOutcome, CREDENTIAL_BANNED_FIELDS, CREDENTIAL_FIELD_ALLOWLIST,
};
pub use summary::{RefreshSummary, MAX_ERROR_LEN, MAX_SUMMARY_ERRORS};
