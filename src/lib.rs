//! super-okai is the persistence and throttling core of a persona chat.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`storage`] provides the string-keyed storage space (files or memory)
//!   every persistent store writes JSON records into.
//! - [`stores`] holds the stateful pieces: the TTL cache, the fixed-window
//!   rate limiter, per-persona conversation history and the conversation log.
//! - [`formatter`] reshapes raw model replies into a persona's voice.
//! - [`core`] owns configuration, personas, messages and the [`crate::core::session`]
//!   controller that wires the stores together for one exchange.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`].

pub mod cli;
pub mod core;
pub mod formatter;
pub mod storage;
pub mod stores;
pub mod utils;
