use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::types::{NewUser, UserId, UserRecord, normalize_email};

/// Consumer-provided user record persistence.
///
/// The store owns uniqueness of the email key: `create` must fail with
/// [`StoreError::Conflict`] when a record with the same (normalized) email
/// already exists, so that concurrent provisioning can recover.
///
/// # Example
///
/// ```rust,ignore
/// impl UserStore for MyDb {
///     async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
///         self.users().filter_mail(email).first().await.map_err(StoreError::backend)
///     }
///     // ...
/// }
/// ```
pub trait UserStore: Send + Sync + 'static {
    fn find_by_email(
        &self,
        email: &str,
    ) -> impl Future<Output = Result<Option<UserRecord>, StoreError>> + Send;

    fn find_by_id(
        &self,
        id: &UserId,
    ) -> impl Future<Output = Result<Option<UserRecord>, StoreError>> + Send;

    /// Persist a new record and return it with its assigned id.
    fn create(&self, user: NewUser) -> impl Future<Output = Result<UserRecord, StoreError>> + Send;

    /// Overwrite an existing record.
    fn save(&self, user: &UserRecord) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// In-memory [`UserStore`] with sequential numeric ids and a unique email index.
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    inner: RwLock<Users>,
    next_id: AtomicU64,
}

#[derive(Debug, Default)]
struct Users {
    by_id: HashMap<UserId, UserRecord>,
    by_email: HashMap<String, UserId>,
}

impl MemoryUserStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.by_id.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Inserts a record as-is, e.g. an account that predates the bridge.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] if the id or the email is taken.
    pub async fn insert(&self, user: UserRecord) -> Result<(), StoreError> {
        let mut users = self.inner.write().await;
        if users.by_id.contains_key(&user.id) {
            return Err(StoreError::Conflict(user.id.to_string()));
        }
        let key = normalize_email(&user.email);
        if users.by_email.contains_key(&key) {
            return Err(StoreError::Conflict(user.email));
        }
        // Generated ids continue after the largest numeric one inserted.
        if let Ok(n) = user.id.0.parse::<u64>() {
            self.next_id.fetch_max(n, Ordering::SeqCst);
        }
        users.by_email.insert(key, user.id.clone());
        users.by_id.insert(user.id.clone(), user);
        Ok(())
    }
}

impl UserStore for MemoryUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        let users = self.inner.read().await;
        Ok(users
            .by_email
            .get(&normalize_email(email))
            .and_then(|id| users.by_id.get(id))
            .cloned())
    }

    async fn find_by_id(&self, id: &UserId) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.inner.read().await.by_id.get(id).cloned())
    }

    async fn create(&self, user: NewUser) -> Result<UserRecord, StoreError> {
        let mut users = self.inner.write().await;
        let key = normalize_email(&user.email);
        if users.by_email.contains_key(&key) {
            return Err(StoreError::Conflict(user.email));
        }

        let id = loop {
            let candidate = UserId((self.next_id.fetch_add(1, Ordering::SeqCst) + 1).to_string());
            if !users.by_id.contains_key(&candidate) {
                break candidate;
            }
        };
        let record = UserRecord {
            id: id.clone(),
            email: user.email,
            username: user.username,
            roles: user.roles,
            password_hash: None,
            locale: user.locale,
        };
        users.by_email.insert(key, id.clone());
        users.by_id.insert(id, record.clone());
        Ok(record)
    }

    async fn save(&self, user: &UserRecord) -> Result<(), StoreError> {
        let mut users = self.inner.write().await;
        match users.by_id.get_mut(&user.id) {
            Some(existing) => {
                *existing = user.clone();
                Ok(())
            }
            None => Err(StoreError::backend(format!("no user with id {}", user.id))),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            email: email.into(),
            username: "abuser".into(),
            roles: BTreeSet::from(["authenticated".to_string()]),
            locale: "en".into(),
        }
    }

    #[tokio::test]
    async fn create_assigns_sequential_ids() {
        let store = MemoryUserStore::new();
        let a = store.create(new_user("a@b.com")).await.unwrap();
        let b = store.create(new_user("c@d.com")).await.unwrap();

        assert_eq!(a.id, UserId("1".into()));
        assert_eq!(b.id, UserId("2".into()));
        assert_eq!(a.password_hash, None);
    }

    #[tokio::test]
    async fn email_is_unique_modulo_domain_case() {
        let store = MemoryUserStore::new();
        store.create(new_user("a@b.com")).await.unwrap();

        let err = store.create(new_user("a@B.COM")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn local_part_stays_case_sensitive() {
        let store = MemoryUserStore::new();
        store.create(new_user("a@b.com")).await.unwrap();
        assert!(store.find_by_email("A@b.com").await.unwrap().is_none());
        assert!(store.find_by_email("a@B.com").await.unwrap().is_some());
    }

    fn existing(id: &str, email: &str) -> UserRecord {
        UserRecord {
            id: UserId(id.into()),
            email: email.into(),
            username: "victim".into(),
            roles: BTreeSet::new(),
            password_hash: Some("$argon2id$...".into()),
            locale: "en".into(),
        }
    }

    #[tokio::test]
    async fn create_skips_ids_taken_by_insert() {
        let store = MemoryUserStore::new();
        store.insert(existing("1", "victim@x.com")).await.unwrap();

        let created = store.create(new_user("attacker@x.com")).await.unwrap();

        assert_ne!(created.id, UserId("1".into()));
        assert_eq!(store.len().await, 2);
        let victim = store.find_by_email("victim@x.com").await.unwrap().unwrap();
        assert_eq!(victim.id, UserId("1".into()));
        assert_eq!(victim.email, "victim@x.com");
        assert_eq!(victim.password_hash.as_deref(), Some("$argon2id$..."));
        assert_eq!(
            store.find_by_id(&created.id).await.unwrap().unwrap().email,
            "attacker@x.com"
        );
    }

    #[tokio::test]
    async fn create_skips_ids_inserted_after_the_counter() {
        let store = MemoryUserStore::new();
        store.create(new_user("a@b.com")).await.unwrap();
        // Non-numeric ids leave the counter alone; "2" is taken directly.
        store.insert(existing("legacy-7", "l@x.com")).await.unwrap();
        store.insert(existing("2", "victim@x.com")).await.unwrap();

        let created = store.create(new_user("c@d.com")).await.unwrap();

        assert_eq!(created.id, UserId("3".into()));
        assert_eq!(
            store.find_by_id(&UserId("2".into())).await.unwrap().unwrap().email,
            "victim@x.com"
        );
    }

    #[tokio::test]
    async fn insert_rejects_a_taken_id() {
        let store = MemoryUserStore::new();
        let first = store.create(new_user("a@b.com")).await.unwrap();

        let err = store
            .insert(existing(first.id.as_str(), "other@x.com"))
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(store.find_by_id(&first.id).await.unwrap().unwrap().email, "a@b.com");
        assert!(store.find_by_email("other@x.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_overwrites_existing_only() {
        let store = MemoryUserStore::new();
        let mut user = store.create(new_user("a@b.com")).await.unwrap();
        user.password_hash = Some("hash".into());
        store.save(&user).await.unwrap();
        assert_eq!(
            store.find_by_id(&user.id).await.unwrap().unwrap().password_hash.as_deref(),
            Some("hash")
        );

        user.id = UserId("999".into());
        assert!(matches!(store.save(&user).await, Err(StoreError::Backend(_))));
    }
}
