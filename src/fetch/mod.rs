//! Resilient data-access layer: TTL request cache with in-flight
//! de-duplication, per-dependency circuit breakers, and post-fetch
//! consistency validation.

pub mod breaker;
pub mod cache;
pub mod consistency;
pub mod error;

pub use breaker::{BreakerConfig, BreakerState, CircuitBreaker};
pub use cache::{CacheStats, RequestCache};
pub use consistency::{DataConsistencyManager, ValidatedBatch, ValidationRule};
pub use error::{AppResult, FetchError};
