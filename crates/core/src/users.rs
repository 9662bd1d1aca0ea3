//! User store abstraction and the shipped static implementation

use std::collections::HashMap;

use async_trait::async_trait;

use crate::config::UserEntry;

/// Credential verification and home-directory lookup.
///
/// Deployments with an external identity source (LDAP, a database)
/// implement this trait; the engine only ever calls these two methods.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Verify a username/password pair
    async fn login(&self, username: &str, password: &str) -> bool;

    /// The user's virtual home directory, if one is configured
    fn home_dir(&self, _username: &str) -> Option<String> {
        None
    }
}

struct UserRecord {
    password: String,
    home: Option<String>,
}

/// In-memory user store loaded from configuration
pub struct StaticUserStore {
    users: HashMap<String, UserRecord>,
}

impl StaticUserStore {
    pub fn new(entries: &[UserEntry]) -> Self {
        let users = entries
            .iter()
            .map(|entry| {
                (
                    entry.name.clone(),
                    UserRecord {
                        password: entry.password.clone(),
                        home: entry.home.clone(),
                    },
                )
            })
            .collect();
        Self { users }
    }

    /// A store with no accounts. Guest logins bypass the store entirely.
    pub fn empty() -> Self {
        Self {
            users: HashMap::new(),
        }
    }
}

#[async_trait]
impl UserStore for StaticUserStore {
    async fn login(&self, username: &str, password: &str) -> bool {
        self.users
            .get(username)
            .map(|record| record.password == password)
            .unwrap_or(false)
    }

    fn home_dir(&self, username: &str) -> Option<String> {
        self.users.get(username).and_then(|record| record.home.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> StaticUserStore {
        StaticUserStore::new(&[
            UserEntry {
                name: "alice".to_string(),
                password: "secret".to_string(),
                home: Some("/alice".to_string()),
            },
            UserEntry {
                name: "bob".to_string(),
                password: "hunter2".to_string(),
                home: None,
            },
        ])
    }

    #[tokio::test]
    async fn test_login_accepts_correct_password() {
        let store = store();
        assert!(store.login("alice", "secret").await);
        assert!(!store.login("alice", "wrong").await);
        assert!(!store.login("mallory", "secret").await);
    }

    #[tokio::test]
    async fn test_home_dir_lookup() {
        let store = store();
        assert_eq!(store.home_dir("alice").as_deref(), Some("/alice"));
        assert_eq!(store.home_dir("bob"), None);
        assert_eq!(store.home_dir("mallory"), None);
    }

    #[tokio::test]
    async fn test_empty_store_rejects_everyone() {
        let store = StaticUserStore::empty();
        assert!(!store.login("anyone", "anything").await);
    }
}
