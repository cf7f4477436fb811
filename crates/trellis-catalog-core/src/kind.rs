// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use serde::{Deserialize, Serialize};

/// Category tag on a cached schema entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaKind {
	Node,
	Credential,
	Template,
}

impl SchemaKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			SchemaKind::Node => "node",
			SchemaKind::Credential => "credential",
			SchemaKind::Template => "template",
		}
	}
}

impl std::str::FromStr for SchemaKind {
	type Err = String;

	fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
		match s {
			"node" => Ok(SchemaKind::Node),
			"credential" => Ok(SchemaKind::Credential),
			"template" => Ok(SchemaKind::Template),
			_ => Err(format!("unknown schema kind: {s}")),
		}
	}
}

/// Which category of items a refresh targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshScope {
	Nodes,
	Credentials,
	Marketplace,
	All,
}

impl RefreshScope {
	pub fn as_str(&self) -> &'static str {
		match self {
			RefreshScope::Nodes => "nodes",
			RefreshScope::Credentials => "credentials",
			RefreshScope::Marketplace => "marketplace",
			RefreshScope::All => "all",
		}
	}

	/// The entry kinds a refresh of this scope touches.
	pub fn kinds(&self) -> &'static [SchemaKind] {
		match self {
			RefreshScope::Nodes => &[SchemaKind::Node],
			RefreshScope::Credentials => &[SchemaKind::Credential],
			RefreshScope::Marketplace => &[SchemaKind::Template],
			RefreshScope::All => &[SchemaKind::Node, SchemaKind::Credential, SchemaKind::Template],
		}
	}
}

impl std::str::FromStr for RefreshScope {
	type Err = String;

	fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
		match s {
			"nodes" => Ok(RefreshScope::Nodes),
			"credentials" => Ok(RefreshScope::Credentials),
			"marketplace" => Ok(RefreshScope::Marketplace),
			"all" => Ok(RefreshScope::All),
			_ => Err(format!("unknown refresh scope: {s}")),
		}
	}
}
