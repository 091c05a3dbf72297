// shellcache - offline-first caching proxy for a single-page web app
// Author: kelexine (https://github.com/kelexine)

pub mod cache;
pub mod classifier;
pub mod cli;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod messaging;
pub mod metrics;
pub mod models;
pub mod network;
pub mod registration;
pub mod server;
pub mod strategy;
pub mod utils;
