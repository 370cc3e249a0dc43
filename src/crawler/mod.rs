//! Upstream access with rate limiting and pacing
//!
//! This module implements the network side of a sync run: a sliding-window
//! limiter, rotating client identities, randomized pacing and the resilient
//! fetcher that combines them with the response cache.

pub mod delay;
pub mod fetcher;
pub mod identity;
pub mod limiter;

pub use delay::{DelayPolicy, NoDelay, RandomDelay};
pub use fetcher::{FetchRequest, FetchResponse, HttpMethod, ResilientFetcher};
pub use identity::{FixedIdentity, IdentityPolicy, RequestIdentity, RequestIdentityPool};
pub use limiter::SlidingWindowLimiter;
