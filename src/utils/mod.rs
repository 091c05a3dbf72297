//! Utility functions and helpers for shellcache.
//!
//! # Submodules
//!
//! - `logging`: Tracing subscriber initialization.
//! - `retry`: Exponential backoff for install-time fetches.
//!
//! Author: kelexine (<https://github.com/kelexine>)

pub mod logging;
pub mod retry;
