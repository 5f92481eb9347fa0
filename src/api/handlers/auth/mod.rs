//! Sessions, anti-forgery tokens, rate limiting and route guards.
//!
//! ## Sessions
//!
//! The `zeek-session` cookie carries a random 256-bit token. Only its SHA-256
//! hash is used as the store key. Sessions expire a fixed TTL after creation.
//!
//! ## CSRF
//!
//! `GET /api/csrf-token` lazily assigns the session token. Every state-changing
//! request must present it; a match rotates it and the replacement is returned
//! in the `x-csrf-token` response header.
//!
//! ## Rate Limiting
//!
//! A fixed window per client (peer address, or proxy headers when trusted),
//! 100 requests per 15 minutes by default. Counters live in memory, so each
//! instance enforces its own ceiling.

pub mod csrf;
pub mod guards;
pub mod login;
pub mod rate_limit;
pub mod session;
pub mod signup;
mod state;
pub mod types;
pub(crate) mod utils;

pub use rate_limit::{FixedWindowRateLimiter, NoopRateLimiter, RateLimitDecision, RateLimiter};
pub use session::{MemorySessionStore, Session, SessionContext, SessionStore, StoreError};
pub use state::{AuthConfig, AuthState};
