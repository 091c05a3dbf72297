//! Axum-based HTTP front of the coordinator.
//!
//! The client application points at this server as if it were its origin.
//! A few control endpoints live under `/__shellcache`; every other request
//! falls through to the interceptor, which hands it to the active
//! coordinator (or straight to the network when none is active).
//!
//! # Components
//!
//! - `handlers`: health, metrics, client messages and the interceptor.
//! - `middleware`: request ID tracking.
//! - `routes`: the router tying them together.
//!
//! Author: kelexine (<https://github.com/kelexine>)

mod handlers;
mod middleware;
mod routes;

pub use handlers::{HealthCheck, HealthResponse, HealthStatus};
pub use routes::{create_router, AppState, CONTROL_PREFIX};
