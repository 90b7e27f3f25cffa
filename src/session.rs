//! Time-windowed session identity cache
//!
//! Upstream prompt caching keys off a stable per-session identity, so the
//! gateway hands out the same identity for every request inside one time
//! window (`now / window_secs`) and mints a fresh one when the window index
//! changes. The cache holds a single slot; regeneration overwrites it.

use std::sync::Mutex;

use crate::logger;

/// How identities are minted. Implementations may keep private state (a
/// counter, for example) which lives under the cache's lock.
pub trait IdentityScheme: Send {
    type Identity: Clone + Send;

    /// `window` is the window index the identity is minted for.
    fn generate(&mut self, window: i64) -> Self::Identity;

    /// Called by [`SessionIdentityCache::clear`].
    fn reset(&mut self) {}
}

struct Cached<I> {
    window: i64,
    identity: I,
    created_at: i64,
}

struct State<S: IdentityScheme> {
    entry: Option<Cached<S::Identity>>,
    scheme: S,
}

pub struct SessionIdentityCache<S: IdentityScheme> {
    window_secs: i64,
    state: Mutex<State<S>>,
}

impl<S: IdentityScheme> SessionIdentityCache<S> {
    pub fn new(window_secs: i64, scheme: S) -> Self {
        Self {
            window_secs,
            state: Mutex::new(State {
                entry: None,
                scheme,
            }),
        }
    }

    pub fn window_secs(&self) -> i64 {
        self.window_secs
    }

    pub fn get(&self) -> S::Identity {
        self.get_at(chrono::Utc::now().timestamp())
    }

    /// Identity for a request arriving at `now_secs`.
    ///
    /// The whole lookup, including generation, runs under one lock so
    /// concurrent callers in the same window all observe one identity.
    pub fn get_at(&self, now_secs: i64) -> S::Identity {
        let window = now_secs.div_euclid(self.window_secs);
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(cached) = &state.entry {
            if cached.window == window && now_secs - cached.created_at < self.window_secs {
                return cached.identity.clone();
            }
        }

        let identity = state.scheme.generate(window);
        state.entry = Some(Cached {
            window,
            identity: identity.clone(),
            created_at: now_secs,
        });
        logger::debug(
            "session",
            &format!(
                "Generated new session identity (window={} length={}s)",
                window, self.window_secs
            ),
        );
        identity
    }

    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.entry = None;
        state.scheme.reset();
    }
}

// ============================================
// Claude-side identity: counter based user id
// ============================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaudeSession {
    pub user_id: String,
}

#[derive(Debug, Default)]
pub struct ClaudeSessionScheme {
    counter: u64,
}

impl IdentityScheme for ClaudeSessionScheme {
    type Identity = ClaudeSession;

    fn generate(&mut self, window: i64) -> ClaudeSession {
        self.counter += 1;
        ClaudeSession {
            user_id: format!("user_proxy_account__session_{}-{}", window, self.counter),
        }
    }

    fn reset(&mut self) {
        self.counter = 0;
    }
}

// ============================================
// Codex-side identity: one uuid reused three ways
// ============================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodexSession {
    pub conversation_id: String,
    pub session_id: String,
    pub prompt_cache_key: String,
}

#[derive(Debug, Default)]
pub struct CodexSessionScheme;

impl IdentityScheme for CodexSessionScheme {
    type Identity = CodexSession;

    fn generate(&mut self, _window: i64) -> CodexSession {
        let id = uuid::Uuid::new_v4().to_string();
        CodexSession {
            conversation_id: id.clone(),
            session_id: id.clone(),
            prompt_cache_key: id,
        }
    }
}

pub type ClaudeSessionCache = SessionIdentityCache<ClaudeSessionScheme>;
pub type CodexSessionCache = SessionIdentityCache<CodexSessionScheme>;

impl ClaudeSessionCache {
    pub fn claude(window_secs: i64) -> Self {
        Self::new(window_secs, ClaudeSessionScheme::default())
    }
}

impl CodexSessionCache {
    pub fn codex(window_secs: i64) -> Self {
        Self::new(window_secs, CodexSessionScheme)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    const HOUR: i64 = 3600;

    #[test]
    fn same_window_returns_same_identity() {
        let cache = ClaudeSessionCache::claude(12 * HOUR);
        let first = cache.get_at(1_000);
        let second = cache.get_at(11 * HOUR);
        assert_eq!(first, second);
        assert_eq!(first.user_id, "user_proxy_account__session_0-1");
    }

    #[test]
    fn user_id_carries_window_index() {
        let cache = ClaudeSessionCache::claude(12 * HOUR);
        let session = cache.get_at(1_760_000_000);
        assert_eq!(session.user_id, "user_proxy_account__session_40740-1");
    }

    #[test]
    fn new_window_replaces_young_identity() {
        let cache = ClaudeSessionCache::claude(12 * HOUR);
        let late = cache.get_at(11 * HOUR);
        let next_window = cache.get_at(13 * HOUR);

        assert_ne!(late, next_window);
        assert_eq!(next_window.user_id, "user_proxy_account__session_1-2");
        assert_eq!(cache.get_at(23 * HOUR), next_window);
    }

    #[test]
    fn rolls_over_at_window_boundary() {
        let cache = ClaudeSessionCache::claude(12 * HOUR);
        let first = cache.get_at(0);
        let edge = cache.get_at(12 * HOUR - 1);
        let next = cache.get_at(12 * HOUR);

        assert_eq!(first, edge);
        assert_ne!(first, next);
        assert_eq!(next.user_id, "user_proxy_account__session_1-2");
        assert_eq!(cache.get_at(12 * HOUR + 5), next);
    }

    #[test]
    fn clear_forces_regeneration_and_resets_counter() {
        let cache = ClaudeSessionCache::claude(12 * HOUR);
        cache.get_at(10);
        cache.get_at(10 + 12 * HOUR);
        cache.clear();

        let after = cache.get_at(20 + 12 * HOUR);
        assert_eq!(after.user_id, "user_proxy_account__session_1-1");
    }

    #[test]
    fn codex_identity_rotates_per_day() {
        let cache = CodexSessionCache::codex(24 * HOUR);
        let morning = cache.get_at(23 * HOUR);
        let next_day = cache.get_at(25 * HOUR);
        assert_ne!(morning.conversation_id, next_day.conversation_id);
    }

    #[test]
    fn codex_identity_uses_one_uuid_everywhere() {
        let cache = CodexSessionCache::codex(24 * HOUR);
        let session = cache.get_at(0);
        assert_eq!(session.conversation_id, session.session_id);
        assert_eq!(session.session_id, session.prompt_cache_key);
        assert!(uuid::Uuid::parse_str(&session.conversation_id).is_ok());

        let later = cache.get_at(24 * HOUR);
        assert_ne!(later.conversation_id, session.conversation_id);
    }

    #[test]
    fn concurrent_callers_share_one_identity() {
        let cache = Arc::new(CodexSessionCache::codex(24 * HOUR));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || cache.get_at(500).conversation_id)
            })
            .collect();

        let ids: HashSet<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(ids.len(), 1);
    }
}
