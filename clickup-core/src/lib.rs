//! ClickUp export core library
//!
//! This library downloads ClickUp account data (teams, members, spaces, folders,
//! lists, tasks, time entries) through the REST API and stores it in SQLite. It
//! provides the configuration context, the API client with bounded retry, the
//! record models, the SQLite sink and the pipeline that ties them together.

pub mod client;
pub mod constants;
pub mod context;
pub mod error;
pub mod fetchers;
pub mod models;
pub mod pipeline;
pub mod retry;
pub mod sink;

// Re-export commonly used items
pub use client::{ApiClient, Pagination};
pub use context::Context;
pub use error::{ClickUpError, Result};
pub use fetchers::DateRange;
pub use models::{Record, Resource, Row};
pub use pipeline::{FetchSummary, Pipeline, Stage};
pub use retry::{RetryPolicy, RetryState};
pub use sink::SqliteSink;
