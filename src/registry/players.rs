use std::collections::HashMap;

use indexmap::IndexMap;

use crate::privileges::Privileges;
use crate::session::{make_safe_name, Session};

/// The authoritative set of logged-in users, indexed by id, safe name and
/// session token.
///
/// Lookups never touch the database; the fallback for offline users is the
/// caller's business.
#[derive(Default)]
pub struct PlayerRegistry {
    sessions: HashMap<i32, Session>,
    token_to_id: HashMap<String, i32>,
    safe_name_to_id: HashMap<String, i32>,
}

impl PlayerRegistry {
    pub fn init() -> Self {
        PlayerRegistry::default()
    }

    pub fn get(&self, id: i32) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub fn get_mut(&mut self, id: i32) -> Option<&mut Session> {
        self.sessions.get_mut(&id)
    }

    pub fn get_by_token(&self, token: &str) -> Option<&Session> {
        self.token_to_id
            .get(token)
            .and_then(|id| self.sessions.get(id))
    }

    pub fn id_by_token(&self, token: &str) -> Option<i32> {
        self.token_to_id.get(token).copied()
    }

    /// Look up by display name (any casing/spacing).
    pub fn get_by_name(&self, name: &str) -> Option<&Session> {
        self.safe_name_to_id
            .get(&make_safe_name(name))
            .and_then(|id| self.sessions.get(id))
    }

    pub fn id_by_name(&self, name: &str) -> Option<i32> {
        self.safe_name_to_id.get(&make_safe_name(name)).copied()
    }

    pub fn contains(&self, id: i32) -> bool {
        self.sessions.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Session> {
        self.sessions.values_mut()
    }

    pub fn ids(&self) -> Vec<i32> {
        self.sessions.keys().copied().collect()
    }

    pub fn unrestricted_ids(&self) -> Vec<i32> {
        self.sessions
            .values()
            .filter(|s| !s.restricted())
            .map(|s| s.id)
            .collect()
    }

    pub fn staff_ids(&self) -> Vec<i32> {
        self.sessions
            .values()
            .filter(|s| s.privileges.intersects(Privileges::STAFF))
            .map(|s| s.id)
            .collect()
    }

    /// Add a session. A session for the same user id must have been removed
    /// first; double-adds are logged and ignored.
    pub fn insert(&mut self, session: Session) {
        if self.sessions.contains_key(&session.id) {
            log::warn!("{} ({}) double-added to session registry", session.name, session.id);
            return;
        }
        self.token_to_id.insert(session.token.clone(), session.id);
        self.safe_name_to_id
            .insert(session.safe_name.clone(), session.id);
        self.sessions.insert(session.id, session);
    }

    /// Remove and return a session, dropping its indexes.
    pub fn remove(&mut self, id: i32) -> Option<Session> {
        let session = self.sessions.remove(&id)?;
        self.token_to_id.remove(&session.token);
        self.safe_name_to_id.remove(&session.safe_name);
        Some(session)
    }

    /// Enqueue `data` to every session except the listed ids.
    pub fn enqueue_all(&mut self, data: &[u8], except: &[i32]) {
        for session in self.sessions.values_mut() {
            if !except.contains(&session.id) {
                session.enqueue(data);
            }
        }
    }
}

/// Remembers the last plaintext that verified against each bcrypt hash, so
/// reconnecting clients skip the ~200ms verification. Bounded; the least
/// recently used entry is evicted at capacity.
pub struct BcryptCache {
    entries: IndexMap<String, String>,
    capacity: usize,
}

impl BcryptCache {
    pub fn new(capacity: usize) -> Self {
        BcryptCache {
            entries: IndexMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Check a plaintext against the cached known-good value for `hash`.
    /// `None` means the hash isn't cached and bcrypt must run.
    pub fn check(&mut self, hash: &str, password_md5: &str) -> Option<bool> {
        let known = self.entries.shift_remove(hash)?;
        let matches = known == password_md5;
        // refresh recency
        self.entries.insert(hash.to_string(), known);
        Some(matches)
    }

    pub fn store(&mut self, hash: &str, password_md5: &str) {
        self.entries.shift_remove(hash);
        if self.entries.len() >= self.capacity {
            self.entries.shift_remove_index(0);
        }
        self.entries
            .insert(hash.to_string(), password_md5.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(id: i32, name: &str) -> Session {
        Session::new(id, name, Privileges::UNRESTRICTED)
    }

    #[test]
    fn lookup_by_all_keys() {
        let mut registry = PlayerRegistry::init();
        let s = session(3, "Some Player");
        let token = s.token.clone();
        registry.insert(s);

        assert_eq!(registry.get(3).unwrap().name, "Some Player");
        assert_eq!(registry.get_by_name("some player").unwrap().id, 3);
        assert_eq!(registry.get_by_token(&token).unwrap().id, 3);

        registry.remove(3);
        assert!(registry.get_by_token(&token).is_none());
        assert!(registry.get_by_name("Some Player").is_none());
    }

    #[test]
    fn enqueue_all_respects_exceptions() {
        let mut registry = PlayerRegistry::init();
        registry.insert(session(3, "a"));
        registry.insert(session(4, "b"));

        registry.enqueue_all(b"xy", &[4]);
        assert!(registry.get(3).unwrap().has_pending());
        assert!(!registry.get(4).unwrap().has_pending());
    }

    #[test]
    fn bcrypt_cache_evicts_lru() {
        let mut cache = BcryptCache::new(2);
        cache.store("h1", "p1");
        cache.store("h2", "p2");
        assert_eq!(cache.check("h1", "p1"), Some(true));
        assert_eq!(cache.check("h1", "wrong"), Some(false));

        // h2 is now least recently used; storing h3 evicts it
        cache.store("h3", "p3");
        assert_eq!(cache.check("h2", "p2"), None);
        assert_eq!(cache.check("h1", "p1"), Some(true));
    }
}
