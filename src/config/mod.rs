//! Engine settings and the current-sprint configuration store.

pub mod settings;
pub mod store;

pub use settings::{BreakerSettings, CacheSettings, EngineSettings};
pub use store::{SprintSnapshot, SprintStore};
