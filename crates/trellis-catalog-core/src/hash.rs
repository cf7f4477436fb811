// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Content hashing for schema documents.
//!
//! The digest is computed over a canonical serialization (object keys sorted
//! recursively, no whitespace) so that two fetches of the same document hash
//! identically regardless of the key order the upstream API happened to emit.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// SHA-256 hex digest over the canonical serialization of `document`.
pub fn content_hash(document: &Value) -> String {
	let mut hasher = Sha256::new();
	hasher.update(canonical_json(document).as_bytes());
	hex::encode(hasher.finalize())
}

/// Canonical, whitespace-free JSON with recursively sorted object keys.
///
/// Explicit rather than relying on `serde_json`'s map ordering, which flips
/// to insertion order when the `preserve_order` feature is enabled anywhere
/// in the dependency graph.
pub fn canonical_json(value: &Value) -> String {
	let mut out = String::new();
	write_canonical(value, &mut out);
	out
}

fn write_canonical(value: &Value, out: &mut String) {
	match value {
		Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => {
			// Value's Display is already compact for scalars.
			out.push_str(&value.to_string());
		}
		Value::Array(items) => {
			out.push('[');
			for (i, item) in items.iter().enumerate() {
				if i > 0 {
					out.push(',');
				}
				write_canonical(item, out);
			}
			out.push(']');
		}
		Value::Object(map) => {
			let entries: std::collections::BTreeMap<&String, &Value> = map.iter().collect();
			out.push('{');
			for (i, (key, item)) in entries.into_iter().enumerate() {
				if i > 0 {
					out.push(',');
				}
				out.push_str(&Value::String((*key).clone()).to_string());
				out.push(':');
				write_canonical(item, out);
			}
			out.push('}');
		}
	}
}
