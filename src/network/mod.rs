//! Network access for the coordinator.
//!
//! Everything the strategies and the install step fetch goes through the
//! [`Network`] trait. [`HttpNetwork`] is the production implementation: it
//! forwards same-origin requests to the configured upstream server and sends
//! cross-origin requests where they were addressed.
//!
//! Author: kelexine (<https://github.com/kelexine>)

mod client;

pub use client::HttpNetwork;

use crate::error::Result;
use crate::models::{RequestDescriptor, Response};
use async_trait::async_trait;

/// Something that can turn a request into a response.
///
/// Implementations return `Err(CoordinatorError::NetworkUnavailable)` when no
/// response could be obtained at all. Any HTTP status, including 4xx/5xx,
/// counts as a response.
#[async_trait]
pub trait Network: Send + Sync {
    async fn fetch(&self, request: &RequestDescriptor) -> Result<Response>;
}
