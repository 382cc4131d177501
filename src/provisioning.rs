use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::audit::{AuditEvent, AuditKind, AuditLog};
use crate::clock::{Clock, SystemClock};
use crate::error::{ProvisioningError, StoreError};
use crate::store::UserStore;
use crate::types::{NewUser, UserId, UserProfile, UserRecord, normalize_email};

pub const DEFAULT_LOCALE: &str = "en";

/// Finds or creates the local account for a bridged identity.
///
/// Bridged accounts are passwordless: every successful call leaves the record
/// with `password_hash == None`. Existing records keep their username, roles
/// and email; only the password is cleared.
pub struct UserProvisioningService<U> {
    users: Arc<U>,
    audit: Arc<dyn AuditLog>,
    clock: Arc<dyn Clock>,
    default_locale: String,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl<U: UserStore> UserProvisioningService<U> {
    #[must_use]
    pub fn new(users: Arc<U>, audit: Arc<dyn AuditLog>) -> Self {
        Self {
            users,
            audit,
            clock: Arc::new(SystemClock),
            default_locale: DEFAULT_LOCALE.into(),
            locks: DashMap::new(),
        }
    }

    #[must_use]
    pub fn with_default_locale(mut self, locale: impl Into<String>) -> Self {
        self.default_locale = locale.into();
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn users(&self) -> &Arc<U> {
        &self.users
    }

    /// Provisions `profile` and returns the local user id.
    ///
    /// Calls for the same email are serialized; calls for different emails run
    /// concurrently.
    ///
    /// # Errors
    ///
    /// - [`ProvisioningError::MissingField`] if `email` or `username` is blank
    /// - [`ProvisioningError::Conflict`] if a concurrent create won and its
    ///   record still cannot be read back
    /// - [`ProvisioningError::Store`] on backend failure
    pub async fn provision(&self, profile: &UserProfile) -> Result<UserId, ProvisioningError> {
        if profile.email.trim().is_empty() {
            return Err(self.missing("email"));
        }
        if profile.username.trim().is_empty() {
            return Err(self.missing("username"));
        }

        let key = normalize_email(&profile.email);
        let lock = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let result = {
            let _guard = lock.lock().await;
            self.find_or_create(profile).await
        };

        drop(lock);
        // Only the map still holds the mutex when nobody else is waiting on it.
        self.locks.remove_if(&key, |_, m| Arc::strong_count(m) == 1);

        result
    }

    async fn find_or_create(&self, profile: &UserProfile) -> Result<UserId, ProvisioningError> {
        if let Some(existing) = self.users.find_by_email(&profile.email).await? {
            return self.clear_password(existing).await;
        }

        let new_user = NewUser {
            email: profile.email.clone(),
            username: profile.username.clone(),
            roles: profile.roles.clone(),
            locale: self.default_locale.clone(),
        };

        match self.users.create(new_user).await {
            Ok(record) => {
                tracing::info!(user_id = %record.id, "Provisioned bridged account");
                Ok(record.id)
            }
            Err(StoreError::Conflict(_)) => {
                // Another writer (possibly another process) created it first.
                tracing::warn!("User create conflicted, re-fetching by email");
                match self.users.find_by_email(&profile.email).await? {
                    Some(existing) => self.clear_password(existing).await,
                    None => {
                        self.audit.record(
                            AuditEvent::new(AuditKind::ProvisioningConflict, self.clock.now())
                                .with_subject(&profile.email),
                        );
                        Err(ProvisioningError::Conflict(profile.email.clone()))
                    }
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn clear_password(&self, mut record: UserRecord) -> Result<UserId, ProvisioningError> {
        record.password_hash = None;
        self.users.save(&record).await?;
        tracing::debug!(user_id = %record.id, "Existing account kept passwordless");
        Ok(record.id)
    }

    fn missing(&self, field: &'static str) -> ProvisioningError {
        self.audit
            .record(AuditEvent::new(AuditKind::MissingField, self.clock.now()));
        ProvisioningError::MissingField(field)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeSet, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::audit::RecordingAuditLog;
    use crate::store::MemoryUserStore;

    type Fixture = (
        UserProvisioningService<MemoryUserStore>,
        Arc<MemoryUserStore>,
        Arc<RecordingAuditLog>,
    );

    fn service() -> Fixture {
        let store = Arc::new(MemoryUserStore::new());
        let audit = Arc::new(RecordingAuditLog::new());
        (UserProvisioningService::new(store.clone(), audit.clone()), store, audit)
    }

    fn profile() -> UserProfile {
        UserProfile::new("a@b.com", "abuser").with_role("authenticated")
    }

    #[tokio::test]
    async fn creates_passwordless_user_with_roles_and_locale() {
        let (service, store, _) = service();
        let id = service.provision(&profile()).await.unwrap();

        let user = store.find_by_id(&id).await.unwrap().unwrap();
        assert_eq!(user.email, "a@b.com");
        assert_eq!(user.username, "abuser");
        assert_eq!(user.roles, BTreeSet::from(["authenticated".to_string()]));
        assert_eq!(user.locale, "en");
        assert_eq!(user.password_hash, None);
    }

    #[tokio::test]
    async fn repeat_provisioning_returns_same_id() {
        let (service, store, _) = service();
        let first = service.provision(&profile()).await.unwrap();
        let second = service.provision(&profile()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn existing_account_is_made_passwordless_but_not_renamed() {
        let (service, store, _) = service();
        store
            .insert(UserRecord {
                id: UserId("7".into()),
                email: "a@b.com".into(),
                username: "original".into(),
                roles: BTreeSet::new(),
                password_hash: Some("$argon2id$...".into()),
                locale: "fr".into(),
            })
            .await
            .unwrap();

        let id = service.provision(&profile()).await.unwrap();
        assert_eq!(id, UserId("7".into()));

        let user = store.find_by_id(&id).await.unwrap().unwrap();
        assert_eq!(user.password_hash, None);
        assert_eq!(user.username, "original");
        assert!(user.roles.is_empty());
        assert_eq!(user.locale, "fr");
    }

    #[tokio::test]
    async fn domain_case_does_not_fork_accounts() {
        let (service, store, _) = service();
        let a = service.provision(&profile()).await.unwrap();
        let b = service
            .provision(&UserProfile::new("a@B.Com", "abuser"))
            .await
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn blank_fields_are_rejected_and_audited() {
        let (service, store, audit) = service();

        let err = service.provision(&UserProfile::new("", "abuser")).await.unwrap_err();
        assert!(matches!(err, ProvisioningError::MissingField("email")));

        let err = service.provision(&UserProfile::new("a@b.com", "  ")).await.unwrap_err();
        assert!(matches!(err, ProvisioningError::MissingField("username")));

        assert!(store.is_empty().await);
        assert_eq!(audit.kinds(), vec![AuditKind::MissingField, AuditKind::MissingField]);
    }

    #[tokio::test]
    async fn configured_locale_is_applied() {
        let (service, store, _) = service();
        let service = service.with_default_locale("de");
        let id = service.provision(&profile()).await.unwrap();
        assert_eq!(store.find_by_id(&id).await.unwrap().unwrap().locale, "de");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_provisioning_creates_one_record() {
        let (service, store, _) = service();
        let service = Arc::new(service);

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let service = service.clone();
                tokio::spawn(async move { service.provision(&profile()).await })
            })
            .collect();

        let mut ids = HashSet::new();
        for task in tasks {
            ids.insert(task.await.unwrap().unwrap());
        }

        assert_eq!(ids.len(), 1);
        assert_eq!(store.len().await, 1);
        assert!(service.locks.is_empty());
    }

    /// Store whose first lookup misses even though the record exists, as when
    /// another process wins the create between our read and write.
    struct RacingStore {
        inner: MemoryUserStore,
        lookups: AtomicUsize,
    }

    impl UserStore for RacingStore {
        async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
            if self.lookups.fetch_add(1, Ordering::SeqCst) == 0 {
                return Ok(None);
            }
            self.inner.find_by_email(email).await
        }

        async fn find_by_id(&self, id: &UserId) -> Result<Option<UserRecord>, StoreError> {
            self.inner.find_by_id(id).await
        }

        async fn create(&self, user: NewUser) -> Result<UserRecord, StoreError> {
            self.inner.create(user).await
        }

        async fn save(&self, user: &UserRecord) -> Result<(), StoreError> {
            self.inner.save(user).await
        }
    }

    #[tokio::test]
    async fn create_conflict_is_retried_by_refetch() {
        let inner = MemoryUserStore::new();
        let winner = inner
            .create(NewUser {
                email: "a@b.com".into(),
                username: "abuser".into(),
                roles: BTreeSet::new(),
                locale: "en".into(),
            })
            .await
            .unwrap();

        let store = Arc::new(RacingStore {
            inner,
            lookups: AtomicUsize::new(0),
        });
        let service = UserProvisioningService::new(store.clone(), Arc::new(RecordingAuditLog::new()));

        let id = service.provision(&profile()).await.unwrap();
        assert_eq!(id, winner.id);
        assert_eq!(store.lookups.load(Ordering::SeqCst), 2);
    }

    /// Store that reports every create as a duplicate but never finds the
    /// winner, as when the conflicting row is deleted before the re-fetch.
    struct VanishingStore {
        creates: AtomicUsize,
        lookups: AtomicUsize,
    }

    impl UserStore for VanishingStore {
        async fn find_by_email(&self, _email: &str) -> Result<Option<UserRecord>, StoreError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        }

        async fn find_by_id(&self, _id: &UserId) -> Result<Option<UserRecord>, StoreError> {
            Ok(None)
        }

        async fn create(&self, user: NewUser) -> Result<UserRecord, StoreError> {
            self.creates.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Conflict(user.email))
        }

        async fn save(&self, _user: &UserRecord) -> Result<(), StoreError> {
            Err(StoreError::backend("save on an empty store"))
        }
    }

    #[tokio::test]
    async fn conflict_with_empty_refetch_is_reported_and_audited() {
        let store = Arc::new(VanishingStore {
            creates: AtomicUsize::new(0),
            lookups: AtomicUsize::new(0),
        });
        let audit = Arc::new(RecordingAuditLog::new());
        let service = UserProvisioningService::new(store.clone(), audit.clone());

        let err = service.provision(&profile()).await.unwrap_err();

        assert!(matches!(&err, ProvisioningError::Conflict(email) if email == "a@b.com"));
        assert_eq!(audit.kinds(), vec![AuditKind::ProvisioningConflict]);
        assert_eq!(store.creates.load(Ordering::SeqCst), 1);
        assert_eq!(store.lookups.load(Ordering::SeqCst), 2);
        assert!(service.locks.is_empty());
    }
}
