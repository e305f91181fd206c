use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{NewUser, ProfileUpdate, User};
use crate::store::CredentialStore;

/// Process-local credential store.
///
/// Every operation runs under one mutex, which makes the conditional swap
/// trivially atomic. Used by the test suites and for running without Postgres.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    users: Mutex<HashMap<Uuid, User>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn users(&self) -> Result<MutexGuard<'_, HashMap<Uuid, User>>, AppError> {
        self.users
            .lock()
            .map_err(|_| AppError::Internal("credential store lock poisoned".to_string()))
    }
}

fn email_taken(users: &HashMap<Uuid, User>, email: &str, except: Option<Uuid>) -> bool {
    users
        .values()
        .any(|u| u.email == email && Some(u.id) != except)
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn create_user(&self, new_user: NewUser) -> Result<User, AppError> {
        let mut users = self.users()?;

        if users.values().any(|u| u.username == new_user.username)
            || email_taken(&users, &new_user.email, None)
        {
            return Err(AppError::conflict("Username or email already registered"));
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            username: new_user.username,
            email: new_user.email,
            full_name: new_user.full_name,
            avatar: new_user.avatar,
            cover_image: new_user.cover_image,
            password_hash: new_user.password_hash,
            session_value: None,
            created_at: now,
            updated_at: now,
        };
        users.insert(user.id, user.clone());

        Ok(user)
    }

    async fn find_user_by_handle_or_email(
        &self,
        identifier: &str,
    ) -> Result<Option<User>, AppError> {
        let needle = identifier.trim().to_lowercase();
        let users = self.users()?;

        Ok(users
            .values()
            .find(|u| u.username == needle || u.email == needle)
            .cloned())
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, AppError> {
        Ok(self.users()?.get(&user_id).cloned())
    }

    async fn update_session_value(
        &self,
        user_id: Uuid,
        value: Option<&str>,
    ) -> Result<bool, AppError> {
        let mut users = self.users()?;

        match users.get_mut(&user_id) {
            Some(user) => {
                user.session_value = value.map(str::to_string);
                user.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn swap_session_value(
        &self,
        user_id: Uuid,
        expected: &str,
        replacement: &str,
    ) -> Result<bool, AppError> {
        let mut users = self.users()?;

        match users.get_mut(&user_id) {
            Some(user) if user.session_value.as_deref() == Some(expected) => {
                user.session_value = Some(replacement.to_string());
                user.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn update_secret(
        &self,
        user_id: Uuid,
        digest: &str,
        clear_session: bool,
    ) -> Result<bool, AppError> {
        let mut users = self.users()?;

        match users.get_mut(&user_id) {
            Some(user) => {
                user.password_hash = digest.to_string();
                if clear_session {
                    user.session_value = None;
                }
                user.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn update_profile(
        &self,
        user_id: Uuid,
        update: ProfileUpdate,
    ) -> Result<Option<User>, AppError> {
        let mut users = self.users()?;

        if let Some(email) = &update.email {
            if email_taken(&users, email, Some(user_id)) {
                return Err(AppError::conflict("Email already registered"));
            }
        }

        let Some(user) = users.get_mut(&user_id) else {
            return Ok(None);
        };

        if let Some(full_name) = update.full_name {
            user.full_name = full_name;
        }
        if let Some(email) = update.email {
            user.email = email;
        }
        if let Some(avatar) = update.avatar {
            user.avatar = avatar;
        }
        if let Some(cover_image) = update.cover_image {
            user.cover_image = Some(cover_image);
        }
        user.updated_at = Utc::now();

        Ok(Some(user.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(username: &str, email: &str) -> NewUser {
        NewUser {
            username: username.to_string(),
            email: email.to_string(),
            full_name: "Test User".to_string(),
            avatar: "https://cdn.example.com/a.png".to_string(),
            cover_image: None,
            password_hash: "digest".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_and_find() {
        let store = InMemoryCredentialStore::new();
        let user = store.create_user(new_user("alice", "alice@example.com")).await.unwrap();

        assert!(user.session_value.is_none());
        let by_handle = store.find_user_by_handle_or_email("ALICE").await.unwrap().unwrap();
        let by_email = store
            .find_user_by_handle_or_email("Alice@Example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_handle.id, user.id);
        assert_eq!(by_email.id, user.id);
        assert!(store.find_user_by_id(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_handle_or_email_conflicts() {
        let store = InMemoryCredentialStore::new();
        store.create_user(new_user("alice", "alice@example.com")).await.unwrap();

        let dup_handle = store.create_user(new_user("alice", "other@example.com")).await;
        let dup_email = store.create_user(new_user("other", "alice@example.com")).await;

        assert!(matches!(dup_handle, Err(AppError::Database(_))));
        assert!(matches!(dup_email, Err(AppError::Database(_))));
    }

    #[tokio::test]
    async fn test_swap_only_from_expected_value() {
        let store = InMemoryCredentialStore::new();
        let user = store.create_user(new_user("alice", "alice@example.com")).await.unwrap();

        assert!(!store.swap_session_value(user.id, "r1", "r2").await.unwrap());
        assert!(store.update_session_value(user.id, Some("r1")).await.unwrap());
        assert!(store.swap_session_value(user.id, "r1", "r2").await.unwrap());
        assert!(!store.swap_session_value(user.id, "r1", "r3").await.unwrap());

        let stored = store.find_user_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(stored.session_value.as_deref(), Some("r2"));
    }

    #[tokio::test]
    async fn test_update_secret_can_clear_session() {
        let store = InMemoryCredentialStore::new();
        let user = store.create_user(new_user("alice", "alice@example.com")).await.unwrap();
        store.update_session_value(user.id, Some("r1")).await.unwrap();

        store.update_secret(user.id, "digest-2", false).await.unwrap();
        let kept = store.find_user_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(kept.session_value.as_deref(), Some("r1"));

        store.update_secret(user.id, "digest-3", true).await.unwrap();
        let cleared = store.find_user_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(cleared.password_hash, "digest-3");
        assert!(cleared.session_value.is_none());
    }

    #[tokio::test]
    async fn test_profile_email_must_stay_unique() {
        let store = InMemoryCredentialStore::new();
        store.create_user(new_user("alice", "alice@example.com")).await.unwrap();
        let bob = store.create_user(new_user("bob", "bob@example.com")).await.unwrap();

        let update = ProfileUpdate {
            email: Some("alice@example.com".to_string()),
            ..Default::default()
        };
        assert!(store.update_profile(bob.id, update).await.is_err());
    }
}
