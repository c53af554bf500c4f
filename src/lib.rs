//! Ratekeeper - Per-Client Request Admission Control
//!
//! This crate decides, for every request identified by a client key, whether
//! it is admitted or rejected. Five interchangeable algorithms (fixed window,
//! token bucket, leaky bucket, sliding window log and sliding window counter)
//! share one [`ratelimit::RateLimiter`] contract and keep their per-client
//! state in a [`ratelimit::KeyedStateStore`] with atomic per-key updates.
//! A small HTTP front door in [`server`] exposes the active limiter.

pub mod config;
pub mod error;
pub mod ratelimit;
pub mod server;
