// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! HTTP implementation of [`SchemaSource`] against a platform instance.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use trellis_catalog_core::SchemaKind;

use crate::source::{SchemaSource, SourceError};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Fetches schema metadata from a platform instance over HTTP.
///
/// Listings come from `{base}/schemas/{kind}`, item detail from
/// `{base}/schemas/{kind}/{name}`. The API key, when configured, travels in
/// the `X-API-KEY` header.
pub struct HttpSchemaSource {
	client: reqwest::Client,
	base_url: String,
	api_key: Option<String>,
}

impl HttpSchemaSource {
	pub fn new(
		base_url: impl Into<String>,
		api_key: Option<String>,
	) -> std::result::Result<Self, SourceError> {
		let client = reqwest::Client::builder()
			.user_agent(user_agent())
			.timeout(DEFAULT_TIMEOUT)
			.build()
			.map_err(|e| SourceError::Transport(e.to_string()))?;

		Ok(Self {
			client,
			base_url: base_url.into().trim_end_matches('/').to_string(),
			api_key,
		})
	}

	fn list_url(&self, kind: SchemaKind) -> String {
		format!("{}/schemas/{}", self.base_url, kind_segment(kind))
	}

	fn item_url(&self, kind: SchemaKind, name: &str) -> String {
		format!("{}/schemas/{}/{}", self.base_url, kind_segment(kind), name)
	}

	async fn get_json(&self, url: &str) -> std::result::Result<Value, SourceError> {
		let mut request = self.client.get(url);
		if let Some(key) = &self.api_key {
			request = request.header("X-API-KEY", key);
		}

		let response = request
			.send()
			.await
			.map_err(|e| SourceError::Transport(e.to_string()))?;
		let status = response.status();
		if !status.is_success() {
			return Err(SourceError::Status {
				status: status.as_u16(),
				url: url.to_string(),
			});
		}

		response
			.json()
			.await
			.map_err(|e| SourceError::Decode(e.to_string()))
	}
}

#[async_trait]
impl SchemaSource for HttpSchemaSource {
	#[tracing::instrument(skip(self))]
	async fn list_items(&self, kind: SchemaKind) -> std::result::Result<Vec<String>, SourceError> {
		let url = self.list_url(kind);
		let body = self.get_json(&url).await?;
		parse_name_list(&body)
			.ok_or_else(|| SourceError::Decode(format!("unrecognized listing shape from {url}")))
	}

	#[tracing::instrument(skip(self))]
	async fn fetch_item(
		&self,
		kind: SchemaKind,
		name: &str,
	) -> std::result::Result<Value, SourceError> {
		self.get_json(&self.item_url(kind, name)).await
	}
}

fn kind_segment(kind: SchemaKind) -> &'static str {
	match kind {
		SchemaKind::Node => "nodes",
		SchemaKind::Credential => "credentials",
		SchemaKind::Template => "templates",
	}
}

fn user_agent() -> String {
	format!("trellis/{}", env!("CARGO_PKG_VERSION"))
}

/// Listings arrive either as a bare array of names or as `{"items": [...]}`,
/// where each element is a name string or an object with a `name` member.
fn parse_name_list(body: &Value) -> Option<Vec<String>> {
	let items = body
		.as_array()
		.or_else(|| body.get("items")?.as_array())?;

	items
		.iter()
		.map(|item| {
			item
				.as_str()
				.map(String::from)
				.or_else(|| item.get("name")?.as_str().map(String::from))
		})
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn test_parse_bare_name_array() {
		let body = json!(["slack", "webhook"]);
		assert_eq!(
			parse_name_list(&body),
			Some(vec!["slack".to_string(), "webhook".to_string()])
		);
	}

	#[test]
	fn test_parse_items_envelope_with_objects() {
		let body = json!({"items": [{"name": "slack"}, {"name": "webhook"}]});
		assert_eq!(
			parse_name_list(&body),
			Some(vec!["slack".to_string(), "webhook".to_string()])
		);
	}

	#[test]
	fn test_parse_rejects_unnamed_items() {
		let body = json!({"items": [{"id": 7}]});
		assert_eq!(parse_name_list(&body), None);
	}

	#[test]
	fn test_parse_rejects_non_list_body() {
		assert_eq!(parse_name_list(&json!({"error": "nope"})), None);
	}

	#[test]
	fn test_urls_strip_trailing_slash() {
		let source = HttpSchemaSource::new("https://flow.example.com/", None).unwrap();
		assert_eq!(
			source.list_url(SchemaKind::Node),
			"https://flow.example.com/schemas/nodes"
		);
		assert_eq!(
			source.item_url(SchemaKind::Credential, "slackApi"),
			"https://flow.example.com/schemas/credentials/slackApi"
		);
	}

	#[test]
	fn test_user_agent_format() {
		let ua = user_agent();
		assert!(ua.starts_with("trellis/"));
	}
}
