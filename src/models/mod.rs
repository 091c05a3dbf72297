//! Data models for intercepted traffic.
//!
//! This module contains the type definitions shared across the coordinator:
//! - Request descriptors and fetch destinations (`request`)
//! - Buffered responses as stored in and served from the cache (`response`)

// Author: kelexine (https://github.com/kelexine)

pub mod request;
pub mod response;

pub use request::{Destination, RequestDescriptor};
pub use response::Response;
