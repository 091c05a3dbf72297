// Cache store module
// Author: kelexine (https://github.com/kelexine)

pub mod models;
pub mod store;

pub use models::{BucketKind, BucketName, CacheStats};
pub use store::CacheStore;
