// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Credential document scrubbing.
//!
//! Credential-kind schema documents may arrive from upstream carrying secret
//! material alongside the type description. Only allowlisted descriptive
//! fields survive persistence; everything else is dropped before the document
//! reaches the store. Dropped field *names* are returned so the write path
//! can log them for audit. Values are never returned or logged.

use serde_json::Value;

/// Fields of a credential-kind document that may be persisted.
pub const CREDENTIAL_FIELD_ALLOWLIST: &[&str] = &[
	"name",
	"displayName",
	"documentationUrl",
	"properties",
	"extends",
	"icon",
	"iconUrl",
	"supportedNodes",
	"httpRequestNode",
	"authenticate",
];

/// Fields that carry secret material. Stripped unconditionally, even if a
/// future allowlist revision were to mention one of them.
pub const CREDENTIAL_BANNED_FIELDS: &[&str] = &[
	"data",
	"accessToken",
	"refreshToken",
	"apiKey",
	"password",
	"secret",
	"token",
	"clientSecret",
	"privateKey",
	"oauthTokenData",
	"sessionToken",
];

/// Result of scrubbing a credential document.
#[derive(Debug, Clone)]
pub struct ScrubOutcome {
	pub document: Value,
	/// Names of fields that were removed, for audit logging.
	pub dropped: Vec<String>,
}

/// Strips non-allowlisted fields from a credential document.
///
/// Non-object documents pass through unchanged; the write path treats those
/// as malformed separately.
pub fn scrub_credential_document(document: Value) -> ScrubOutcome {
	let Value::Object(map) = document else {
		return ScrubOutcome {
			document,
			dropped: Vec::new(),
		};
	};

	let mut kept = serde_json::Map::new();
	let mut dropped = Vec::new();
	for (key, value) in map {
		let allowed = CREDENTIAL_FIELD_ALLOWLIST.contains(&key.as_str())
			&& !CREDENTIAL_BANNED_FIELDS.contains(&key.as_str());
		if allowed {
			kept.insert(key, value);
		} else {
			dropped.push(key);
		}
	}

	ScrubOutcome {
		document: Value::Object(kept),
		dropped,
	}
}
