//! Shared constants used across the application

use std::time::Duration;

/// Storage key for per-persona conversation history.
pub const CONVERSATIONS_KEY: &str = "super_okai_conversations";

/// Storage key for the archived conversation log list.
pub const LOGS_KEY: &str = "super_okai_logs";

/// Storage key for the rate limiter's per-identifier counters.
pub const RATE_LIMITS_KEY: &str = "super_okai_rate_limits";

/// How often the TTL cache drops expired entries.
pub const CACHE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// How often the rate limiter re-persists its full map.
pub const RATE_LIMIT_FLUSH_INTERVAL: Duration = Duration::from_secs(30);

/// How often the rate limiter drops elapsed windows.
pub const RATE_LIMIT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

pub const DEFAULT_MAX_REQUESTS: u32 = 50;
pub const DEFAULT_TIME_WINDOW: Duration = Duration::from_secs(3600);

pub const DEFAULT_MAX_LOGS: usize = 1000;
pub const DEFAULT_LOG_RETENTION_DAYS: u32 = 30;

/// Label used for user turns in exported transcripts.
pub const USER_LABEL: &str = "USER";

/// Width of the rule line separating exported conversations.
pub const EXPORT_RULE_WIDTH: usize = 80;

/// Chance that the formatter prepends a signature expression.
pub const EXPRESSION_PROBABILITY: f64 = 0.3;

/// How long a formatted reply stays memoized for the same persona and prompt.
pub const RESPONSE_CACHE_MAX_AGE: Duration = Duration::from_secs(5 * 60);

/// Assistant content used when the model returns nothing.
pub const FALLBACK_REPLY: &str = "Sorry, I could not generate a response.";

/// Rate limit identifier used when the caller does not supply one.
pub const DEFAULT_IDENTIFIER: &str = "local";
