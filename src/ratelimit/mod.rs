//! Rate limiting logic and counter storage.

mod identity;
mod limiter;
mod memory;
mod policy;
mod redis_store;
mod store;

pub use identity::{Identity, IdentityKind};
pub use limiter::{Decision, RateLimiter};
pub use memory::MemoryStore;
pub use policy::{Policy, PolicySet};
pub use redis_store::{RedisStore, RedisStoreConfig};
pub use store::{CounterStore, StoreError};
