//! Online-set store, fed by full snapshots from the server.

use std::collections::HashSet;

/// The set of identities currently online, replaced wholesale on every
/// `getOnlineUsers` broadcast.
#[derive(Debug, Default)]
pub struct OnlineUsers {
    online: HashSet<String>,
}

impl OnlineUsers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&mut self, users: Vec<String>) {
        self.online = users.into_iter().collect();
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.online.contains(user_id)
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.online.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replace_is_a_full_snapshot() {
        let mut store = OnlineUsers::new();
        store.replace(vec!["u1".to_string(), "u2".to_string()]);
        assert!(store.is_online("u1"));

        store.replace(vec!["u2".to_string()]);
        assert!(!store.is_online("u1"));
        assert!(store.is_online("u2"));
    }
}
