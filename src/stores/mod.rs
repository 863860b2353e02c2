//! Stateful stores behind a chat session.
//!
//! - [`ttl_cache`]: in-memory values with per-entry expiry.
//! - [`rate_limit`]: fixed-window request counters, persisted.
//! - [`conversation`]: per-persona message history, persisted.
//! - [`logger`]: append-only conversation log with retention and export.
//!
//! Persisted stores write JSON through a [`crate::storage::KeyValueStore`]
//! and never surface storage errors to callers.

pub mod conversation;
pub mod logger;
pub mod rate_limit;
pub mod ttl_cache;

pub use conversation::ConversationStore;
pub use logger::{ConversationLog, ConversationLogger, LogSettings};
pub use rate_limit::{RateLimitConfig, RateLimiter};
pub use ttl_cache::{CacheOptions, TtlCache};
