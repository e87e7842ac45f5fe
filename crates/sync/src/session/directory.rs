//! Session lookup used by offline and simulator setups, keyed by join code.
//! Always injected into whatever needs it; never a process-wide static.

use std::collections::HashMap;

use crate::net::wire::SessionState;

pub trait SessionDirectory: Send {
    fn store(&mut self, session: SessionState);
    fn find(&self, code: &str) -> Option<SessionState>;
    fn remove(&mut self, code: &str);
}

#[derive(Debug, Default)]
pub struct MemoryDirectory {
    sessions: HashMap<String, SessionState>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl SessionDirectory for MemoryDirectory {
    fn store(&mut self, session: SessionState) {
        self.sessions.insert(session.code.clone(), session);
    }

    fn find(&self, code: &str) -> Option<SessionState> {
        self.sessions.get(code).cloned()
    }

    fn remove(&mut self, code: &str) {
        self.sessions.remove(code);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn state(code: &str) -> SessionState {
        SessionState {
            id: Uuid::new_v4(),
            code: code.to_string(),
            name: "drill".to_string(),
            host_id: Uuid::new_v4(),
            created_at_ms: 0,
            players: Vec::new(),
            teams: Vec::new(),
            pins: Vec::new(),
            messages: Vec::new(),
        }
    }

    #[test]
    fn store_find_remove_by_code() {
        let mut directory = MemoryDirectory::new();
        directory.store(state("ABC123"));

        assert!(directory.find("ABC123").is_some());
        assert!(directory.find("ZZZZZZ").is_none());

        directory.remove("ABC123");
        assert!(directory.is_empty());
    }
}
