//! One chat session wired over a storage space.
//!
//! A [`Session`] owns exactly one instance of every store and shares the
//! ones with background timers through `Arc`. An exchange runs the same
//! sequence every time: rate-limit check, memoized reply formatting,
//! conversation save and log append.

use std::error::Error;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::core::config::Config;
use crate::core::constants::{FALLBACK_REPLY, RESPONSE_CACHE_MAX_AGE};
use crate::core::message::Message;
use crate::core::persona::{Persona, PersonaRoster};
use crate::formatter::{PersonaFormatter, StyleBook};
use crate::storage::{FileStore, KeyValueStore};
use crate::stores::{
    CacheOptions, ConversationLogger, ConversationStore, RateLimiter, TtlCache,
};
use crate::utils::clock::{Clock, SystemClock};
use crate::utils::random::{OsRandom, RandomSource};

#[derive(Debug, Clone, PartialEq)]
pub enum ExchangeOutcome {
    Replied {
        reply: Message,
        /// Id of the log entry, `None` if the log append failed.
        log_id: Option<String>,
        /// The reply came from the response cache.
        cached: bool,
    },
    RateLimited {
        reset_time: Option<DateTime<Utc>>,
    },
}

pub struct Session {
    roster: PersonaRoster,
    cache: Arc<TtlCache<String>>,
    limiter: Arc<RateLimiter>,
    conversations: ConversationStore,
    logger: ConversationLogger,
    formatter: PersonaFormatter,
}

impl Session {
    pub fn new(
        config: &Config,
        storage: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        rng: Box<dyn RandomSource>,
    ) -> Result<Self, regex::Error> {
        let formatter = PersonaFormatter::new(StyleBook::builtin()?, rng);
        Ok(Self {
            roster: PersonaRoster::new(&config.personas),
            cache: Arc::new(TtlCache::new(clock.clone())),
            limiter: Arc::new(RateLimiter::new(
                config.rate_limit_config(),
                storage.clone(),
                clock.clone(),
            )),
            conversations: ConversationStore::new(storage.clone()),
            logger: ConversationLogger::new(storage, clock, config.log_settings()),
            formatter,
        })
    }

    /// Opens a session over the configured storage directory using the
    /// system clock and OS randomness.
    pub fn open(config: &Config) -> Result<Self, Box<dyn Error>> {
        let dir = config.resolved_storage_dir();
        let mut store = FileStore::new(&dir);
        if let Some(quota) = config.storage_quota_bytes {
            store = store.with_quota(quota);
        }
        debug!(dir = %dir.display(), "Opening session storage");
        let session = Self::new(
            config,
            Arc::new(store),
            Arc::new(SystemClock),
            Box::new(OsRandom),
        )?;
        Ok(session)
    }

    pub fn roster(&self) -> &PersonaRoster {
        &self.roster
    }

    pub fn cache(&self) -> &TtlCache<String> {
        &self.cache
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn conversations(&self) -> &ConversationStore {
        &self.conversations
    }

    pub fn logger(&self) -> &ConversationLogger {
        &self.logger
    }

    pub fn formatter_mut(&mut self) -> &mut PersonaFormatter {
        &mut self.formatter
    }

    /// Starts the cache sweeper and limiter maintenance on the current runtime.
    pub fn start_background(&self) {
        self.cache.spawn_sweeper();
        self.limiter.spawn_maintenance();
    }

    /// Stops every background task and writes the limiter state one last time.
    pub fn shutdown(&self) {
        self.cache.destroy();
        self.limiter.shutdown();
        self.limiter.flush();
    }

    fn cache_key(persona: &Persona, user_text: &str) -> String {
        format!("{}\u{1f}{}", persona.style_key(), user_text)
    }

    /// Runs one user turn for `persona_name`.
    ///
    /// `fetch_reply` receives the history including the new user message and
    /// is only called when no memoized reply exists for the same persona and
    /// prompt.
    pub fn exchange<F>(
        &mut self,
        persona_name: &str,
        identifier: &str,
        user_text: &str,
        fetch_reply: F,
    ) -> ExchangeOutcome
    where
        F: FnOnce(&[Message], &Persona) -> String,
    {
        let persona = self.roster.resolve(persona_name);

        if !self.limiter.check_limit(identifier) {
            info!(identifier, persona = %persona.name, "Exchange rate limited");
            return ExchangeOutcome::RateLimited {
                reset_time: self.limiter.reset_time(identifier),
            };
        }

        let mut messages = self.conversations.get_conversation(&persona.name);
        messages.push(Message::user(user_text));

        let key = Self::cache_key(&persona, user_text);
        let (content, cached) = match self.cache.get(&key) {
            Some(content) => (content, true),
            None => {
                let raw = fetch_reply(&messages, &persona);
                if raw.trim().is_empty() {
                    (FALLBACK_REPLY.to_string(), false)
                } else {
                    let formatted = self.formatter.format_persona_response(&raw, &persona);
                    self.cache.set(
                        key,
                        formatted.clone(),
                        CacheOptions::max_age(RESPONSE_CACHE_MAX_AGE),
                    );
                    (formatted, false)
                }
            }
        };

        let reply = Message::assistant(content);
        messages.push(reply.clone());
        self.conversations.save_conversation(&persona.name, &messages);
        let log_id = self.logger.log_conversation(&messages, &persona.name);

        ExchangeOutcome::Replied {
            reply,
            log_id,
            cached,
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::data::RateLimitSection;
    use crate::core::message::Role;
    use crate::core::persona::ChatLength;
    use crate::storage::MemoryStore;
    use crate::utils::clock::{from_millis, ManualClock};
    use crate::utils::random::ScriptedRandom;
    use std::cell::Cell;
    use std::time::Duration;

    fn plain_config() -> Config {
        Config {
            personas: vec![
                Persona::new("Plain"),
                Persona::new("Terse").with_chat_length(ChatLength::Short),
                Persona::new("Okai"),
            ],
            ..Config::default()
        }
    }

    fn session_with(
        config: &Config,
        rolls: Vec<f64>,
    ) -> (Arc<MemoryStore>, Arc<ManualClock>, Session) {
        let storage = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(from_millis(1_714_564_800_000)));
        let session = Session::new(
            config,
            storage.clone(),
            clock.clone(),
            Box::new(ScriptedRandom::new(rolls)),
        )
        .expect("builtin styles compile");
        (storage, clock, session)
    }

    fn replied(outcome: ExchangeOutcome) -> (Message, Option<String>, bool) {
        match outcome {
            ExchangeOutcome::Replied {
                reply,
                log_id,
                cached,
            } => (reply, log_id, cached),
            other => panic!("expected a reply, got {other:?}"),
        }
    }

    #[test]
    fn exchange_saves_history_and_logs_snapshot() {
        let (_storage, _clock, mut session) = session_with(&plain_config(), Vec::new());

        let outcome = session.exchange("plain", "tester", "Hello?", |history, persona| {
            assert_eq!(persona.name, "Plain");
            assert_eq!(history.len(), 1);
            assert_eq!(history[0].content, "Hello?");
            "Hi there.".to_string()
        });
        let (reply, log_id, cached) = replied(outcome);
        assert_eq!(reply.role, Role::Assistant);
        assert_eq!(reply.content, "Hi there.");
        assert!(!cached);

        let history = session.conversations().get_conversation("Plain");
        assert_eq!(history.len(), 2);
        assert_eq!(history[1], reply);

        let logs = session.logger().logs();
        assert_eq!(logs.len(), 1);
        assert_eq!(Some(logs[0].id.clone()), log_id);
        assert_eq!(logs[0].persona, "Plain");
        assert_eq!(logs[0].messages, history);
    }

    #[test]
    fn history_is_passed_to_the_next_turn() {
        let (_storage, _clock, mut session) = session_with(&plain_config(), Vec::new());
        session.exchange("Plain", "tester", "First", |_, _| "One.".to_string());

        let seen = Cell::new(0);
        session.exchange("Plain", "tester", "Second", |history, _| {
            seen.set(history.len());
            "Two.".to_string()
        });
        assert_eq!(seen.get(), 3);
        assert_eq!(session.conversations().get_conversation("Plain").len(), 4);
        assert_eq!(session.logger().logs().len(), 2);
    }

    #[test]
    fn repeated_prompt_is_served_from_cache_until_expiry() {
        let (_storage, clock, mut session) = session_with(&plain_config(), Vec::new());
        let calls = Cell::new(0);
        let fetch = |_: &[Message], _: &Persona| {
            calls.set(calls.get() + 1);
            "Cached answer.".to_string()
        };

        replied(session.exchange("Plain", "tester", "Same", fetch));
        let (reply, _, cached) = replied(session.exchange("Plain", "tester", "Same", fetch));
        assert!(cached);
        assert_eq!(reply.content, "Cached answer.");
        assert_eq!(calls.get(), 1);

        clock.advance(chrono::Duration::minutes(6));
        let (_, _, cached) = replied(session.exchange("Plain", "tester", "Same", fetch));
        assert!(!cached);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn rate_limited_exchange_touches_nothing() {
        let config = Config {
            rate_limit: RateLimitSection {
                max_requests: 1,
                time_window_secs: 60,
            },
            ..plain_config()
        };
        let (_storage, clock, mut session) = session_with(&config, Vec::new());
        replied(session.exchange("Plain", "tester", "Hi", |_, _| "Hello.".to_string()));

        let outcome = session.exchange("Plain", "tester", "Again", |_, _| {
            panic!("reply must not be fetched when rate limited")
        });
        let expected_reset = clock.now() + chrono::Duration::seconds(60);
        assert_eq!(
            outcome,
            ExchangeOutcome::RateLimited {
                reset_time: Some(expected_reset)
            }
        );
        assert_eq!(session.conversations().get_conversation("Plain").len(), 2);
        assert_eq!(session.logger().logs().len(), 1);

        // Other identifiers have their own window.
        replied(session.exchange("Plain", "someone-else", "Hi", |_, _| "Yo.".to_string()));
    }

    #[test]
    fn empty_reply_falls_back_and_is_not_cached() {
        let (_storage, _clock, mut session) = session_with(&plain_config(), Vec::new());
        let (reply, _, _) = replied(session.exchange("Plain", "tester", "Hi", |_, _| {
            "   ".to_string()
        }));
        assert_eq!(reply.content, FALLBACK_REPLY);
        assert_eq!(session.cache().stats().size, 0);
    }

    #[test]
    fn persona_length_and_style_are_applied() {
        let (_storage, _clock, mut session) = session_with(&plain_config(), vec![0.0, 0.9, 0.0]);

        let (reply, _, _) = replied(session.exchange("Terse", "tester", "Talk", |_, _| {
            "One. Two. Three.".to_string()
        }));
        assert_eq!(reply.content, "One. Two.");

        let (reply, _, _) = replied(session.exchange("Okai", "tester", "Hi", |_, _| {
            "Hello".to_string()
        }));
        assert_eq!(reply.content, "Hello (｀・ω・´)~");
    }

    #[test]
    fn unknown_persona_gets_its_own_history() {
        let (_storage, _clock, mut session) = session_with(&plain_config(), Vec::new());
        replied(session.exchange("Stranger", "tester", "Who?", |_, _| "Me.".to_string()));
        assert_eq!(session.conversations().personas(), vec!["Stranger".to_string()]);
    }

    #[test]
    fn limiter_state_is_shared_with_reopened_session() {
        let config = Config {
            rate_limit: RateLimitSection {
                max_requests: 1,
                time_window_secs: 60,
            },
            ..plain_config()
        };
        let (storage, clock, mut session) = session_with(&config, Vec::new());
        replied(session.exchange("Plain", "tester", "Hi", |_, _| "Hello.".to_string()));
        drop(session);

        let mut reopened = Session::new(
            &config,
            storage,
            clock,
            Box::new(ScriptedRandom::new(Vec::new())),
        )
        .unwrap();
        assert!(matches!(
            reopened.exchange("Plain", "tester", "Hi", |_, _| "Hello.".to_string()),
            ExchangeOutcome::RateLimited { .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn background_tasks_start_and_stop() {
        let (_storage, clock, session) = session_with(&plain_config(), Vec::new());
        session.start_background();
        session.cache().set(
            "stale",
            "value".to_string(),
            CacheOptions::max_age(Duration::from_secs(1)),
        );
        clock.advance(chrono::Duration::seconds(2));

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(session.cache().stats().size, 0);

        session.shutdown();
        session.cache().set(
            "stale",
            "value".to_string(),
            CacheOptions::max_age(Duration::from_secs(1)),
        );
        clock.advance(chrono::Duration::seconds(2));
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(session.cache().stats().size, 1);
    }
}
