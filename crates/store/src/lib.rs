//! Durable state for the executor: plans, task attempts, tool call
//! records, conversation tables, and rate-limit usage checkpoints.

pub mod ratelimit;
pub mod store;

pub use ratelimit::{RateLimitUsage, UsageWindow};
pub use store::Store;
