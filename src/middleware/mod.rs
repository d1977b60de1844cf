//! HTTP middleware components.
//!
//! Gateway requests pass through, outermost first:
//!
//! - [`preflight`]: bare `OPTIONS` answered with an empty 200
//! - [`auth`]: API key → `RequestContext`
//! - [`usage`]: one usage record per authenticated request
//! - [`rate_limit`]: hourly ceiling and `X-RateLimit-*` headers

pub mod auth;
pub mod preflight;
pub mod rate_limit;
pub mod usage;
