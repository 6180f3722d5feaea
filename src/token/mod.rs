//! Short-lived opaque tokens for size-limited callback payloads.
//!
//! The callback transport caps payloads well under 64 bytes, so selection
//! state (paths, folder names) is parked here and referenced by a random
//! handle instead. Entries silently age out after the TTL; a stale token
//! simply reads back as not-found.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// What a stored selection refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    NavigateUp,
    OpenDirectory,
    SelectFile,
    SelectFolder,
    SelectRemoteFolder,
}

impl TokenKind {
    /// Short wire prefix the callback surface prepends to the token.
    pub fn prefix(&self) -> &'static str {
        match self {
            TokenKind::NavigateUp => "up",
            TokenKind::OpenDirectory => "dir",
            TokenKind::SelectFile => "file",
            TokenKind::SelectFolder => "fold",
            TokenKind::SelectRemoteFolder => "rdir",
        }
    }
}

struct TokenEntry {
    kind: TokenKind,
    payload: String,
    created_at: Instant,
}

/// TTL-bounded map from opaque token to selection state.
pub struct TokenStore {
    entries: Mutex<HashMap<String, TokenEntry>>,
    ttl: Duration,
}

impl TokenStore {
    /// Default lifetime for a parked selection.
    pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

    pub fn new() -> Self {
        Self::with_ttl(Self::DEFAULT_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Park a selection and return its handle.
    ///
    /// Tokens come from the v4 UUID random source in simple form: 32 URL-safe
    /// characters, leaving prefix headroom under the transport's payload cap.
    pub fn put(&self, kind: TokenKind, payload: &str) -> String {
        let token = uuid::Uuid::new_v4().simple().to_string();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());

        Self::evict_expired(&mut entries, self.ttl);
        entries.insert(
            token.clone(),
            TokenEntry {
                kind,
                payload: payload.to_string(),
                created_at: Instant::now(),
            },
        );

        token
    }

    /// Read a selection back. Unknown and expired tokens are both `None`.
    ///
    /// Reading does not consume the entry; a menu can be tapped twice.
    pub fn get(&self, token: &str) -> Option<(TokenKind, String)> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());

        Self::evict_expired(&mut entries, self.ttl);
        entries
            .get(token)
            .map(|entry| (entry.kind, entry.payload.clone()))
    }

    /// Number of live (unexpired) entries.
    pub fn len(&self) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Self::evict_expired(&mut entries, self.ttl);
        entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn evict_expired(entries: &mut HashMap<String, TokenEntry>, ttl: Duration) {
        entries.retain(|_, entry| entry.created_at.elapsed() < ttl);
    }
}

impl Default for TokenStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let store = TokenStore::new();
        let token = store.put(TokenKind::SelectFile, "a/b.mp4");

        assert_eq!(
            store.get(&token),
            Some((TokenKind::SelectFile, "a/b.mp4".to_string()))
        );
        // Reads do not consume
        assert!(store.get(&token).is_some());
    }

    #[test]
    fn test_unknown_token_is_not_found() {
        let store = TokenStore::new();
        assert_eq!(store.get("deadbeef"), None);
    }

    #[test]
    fn test_expired_token_is_not_found() {
        let store = TokenStore::with_ttl(Duration::ZERO);
        let token = store.put(TokenKind::OpenDirectory, "downloads/live");

        assert_eq!(store.get(&token), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_token_fits_callback_budget() {
        let store = TokenStore::new();
        let token = store.put(TokenKind::SelectRemoteFolder, "archive/2024");

        assert!(token.len() <= 40);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
        // prefix + separator + token stays under the 64-byte payload ceiling
        let payload = format!("{}:{}", TokenKind::SelectRemoteFolder.prefix(), token);
        assert!(payload.len() < 64);
    }

    #[test]
    fn test_put_evicts_stale_entries() {
        let store = TokenStore::with_ttl(Duration::ZERO);
        store.put(TokenKind::SelectFile, "one");
        store.put(TokenKind::SelectFile, "two");

        assert!(store.is_empty());
    }
}
