//! # Zeek (storefront with guarded forms)
//!
//! `zeek` serves a small storefront: static pages, a hardcoded product
//! catalog and four form endpoints (login, signup, contact, newsletter)
//! backed by record files instead of a database.
//!
//! ## Request pipeline
//!
//! Every request passes through a fixed sequence of guard stages before a
//! handler runs:
//!
//! 1. **Rate limit**: per-client fixed window (100 requests / 15 minutes by
//!    default). Denied requests never reach the later stages.
//! 2. **Session resolution**: the `zeek-session` cookie is resolved against
//!    the session store. Store failures degrade to an anonymous session.
//! 3. **CSRF**: every method except `GET`, `HEAD`, `OPTIONS` and `TRACE` must
//!    present the session's current token (`_csrf` body field or
//!    `x-csrf-token` header). A match rotates the token; a mismatch leaves it
//!    untouched.
//! 4. **Auth guards**: `/dashboard` requires a logged-in user, `/admin`
//!    requires the configured admin identity.
//!
//! ## Sessions
//!
//! Sessions live for a fixed TTL from creation (24 hours by default) and are
//! never extended. The cookie carries a random 256-bit token; the server only
//! keeps its SHA-256 hash.
//!
//! ## Scaling
//!
//! Sessions and rate-limit windows are held in process memory. Running more
//! than one instance requires shared implementations of the `SessionStore`
//! and `RateLimiter` traits, otherwise each instance enforces its own ceiling.

pub mod api;
pub mod cli;
pub mod records;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
