// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Bulk refresh orchestration for the trellis schema catalog.
//!
//! One coordinated refresh per `(source, scope)` at a time: the orchestrator
//! takes the advisory lock, records a job row, fans out fetches against the
//! upstream platform under a bounded concurrency gate, batches results into
//! the cache, and finalizes the job with structured counters. Callers poll
//! the job row; the background task has no other channel back.

pub mod client;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod source;

pub use client::HttpSchemaSource;
pub use config::RefreshConfig;
pub use error::{RefreshError, Result};
pub use orchestrator::{RefreshOrchestrator, StartStatus, StartedRefresh};
pub use source::{SchemaSource, SourceError};
