//! # kf-auth-memory
//!
//! Argon2-based, in-process implementation of `AuthProvider`.
//! Holds email/password accounts, the current identity, and the identity
//! watchers that the hosted auth service would notify.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use async_trait::async_trait;
use kf_core::{
    AuthError, AuthProfileUpdate, AuthProvider, AuthUser, SnapshotSender, Subscription, UserId,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Failed sign-ins per account before further attempts are refused.
pub const MAX_FAILED_ATTEMPTS: u32 = 5;

/// Shortest password the service accepts.
pub const MIN_PASSWORD_LEN: usize = 6;

struct Account {
    user: AuthUser,
    password_hash: String,
    failed_attempts: u32,
}

#[derive(Default)]
struct Inner {
    /// Keyed by lowercased email.
    accounts: HashMap<String, Account>,
    current: Option<String>,
    watchers: Vec<(u64, SnapshotSender<Option<AuthUser>>)>,
    next_watcher: u64,
}

impl Inner {
    fn current_user(&self) -> Option<AuthUser> {
        self.current
            .as_ref()
            .and_then(|email| self.accounts.get(email))
            .map(|a| a.user.clone())
    }

    fn set_current(&mut self, email: Option<String>) {
        self.current = email;
        let user = self.current_user();
        self.watchers.retain(|(_, tx)| tx.send(Ok(user.clone())).is_ok());
    }
}

pub struct MemoryAuth {
    inner: Arc<Mutex<Inner>>,
    hasher: Argon2<'static>,
}

impl Default for MemoryAuth {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAuth {
    /// Uses light Argon2id parameters; accounts live only as long as the process.
    pub fn new() -> Self {
        let params = Params::new(4096, 1, 1, None).unwrap_or_default();
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            hasher: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Signs the current identity out from the service side (revoked session).
    pub fn force_sign_out(&self) {
        info!("session revoked by auth service");
        self.lock().set_current(None);
    }

    fn hash(&self, password: &str) -> Result<String, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        self.hasher
            .hash_password(password.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| AuthError::Other(e.to_string()))
    }

    fn verify(&self, password: &str, hash: &str) -> bool {
        let parsed = match PasswordHash::new(hash) {
            Ok(p) => p,
            Err(_) => return false,
        };
        self.hasher
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    }
}

fn normalize_email(email: &str) -> Result<String, AuthError> {
    let email = email.trim().to_ascii_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(AuthError::InvalidEmail),
    }
}

#[async_trait]
impl AuthProvider for MemoryAuth {
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser, AuthError> {
        let email = normalize_email(email)?;
        if password.is_empty() {
            return Err(AuthError::MissingPassword);
        }
        let mut inner = self.lock();
        let account = inner
            .accounts
            .get_mut(&email)
            .ok_or(AuthError::InvalidCredential)?;
        if account.failed_attempts >= MAX_FAILED_ATTEMPTS {
            warn!(uid = %account.user.uid, "sign-in throttled");
            return Err(AuthError::TooManyRequests);
        }
        if !self.verify(password, &account.password_hash) {
            account.failed_attempts += 1;
            return Err(AuthError::InvalidCredential);
        }
        account.failed_attempts = 0;
        let user = account.user.clone();
        inner.set_current(Some(email));
        debug!(uid = %user.uid, "signed in");
        Ok(user)
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthUser, AuthError> {
        let email = normalize_email(email)?;
        if password.is_empty() {
            return Err(AuthError::MissingPassword);
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::WeakPassword);
        }
        if self.lock().accounts.contains_key(&email) {
            return Err(AuthError::EmailInUse);
        }
        let password_hash = self.hash(password)?;

        let mut inner = self.lock();
        if inner.accounts.contains_key(&email) {
            return Err(AuthError::EmailInUse);
        }
        let user = AuthUser {
            uid: UserId::new(Uuid::new_v4().simple().to_string()),
            email: Some(email.clone()),
            display_name: None,
            photo_url: None,
        };
        inner.accounts.insert(
            email.clone(),
            Account {
                user: user.clone(),
                password_hash,
                failed_attempts: 0,
            },
        );
        inner.set_current(Some(email));
        info!(uid = %user.uid, "account created");
        Ok(user)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.lock().set_current(None);
        Ok(())
    }

    async fn update_profile(&self, update: AuthProfileUpdate) -> Result<AuthUser, AuthError> {
        let mut inner = self.lock();
        let email = inner
            .current
            .clone()
            .ok_or_else(|| AuthError::Other("no signed-in user".into()))?;
        let account = inner
            .accounts
            .get_mut(&email)
            .ok_or_else(|| AuthError::Other("account disappeared".into()))?;
        if let Some(name) = update.display_name {
            account.user.display_name = Some(name);
        }
        if let Some(photo) = update.photo_url {
            account.user.photo_url = photo;
        }
        Ok(account.user.clone())
    }

    fn current_user(&self) -> Option<AuthUser> {
        self.lock().current_user()
    }

    fn watch_identity(&self) -> Subscription<Option<AuthUser>> {
        let mut inner = self.lock();
        inner.next_watcher += 1;
        let id = inner.next_watcher;
        let registry = Arc::clone(&self.inner);
        let (tx, sub) = Subscription::channel("identity", move || {
            let mut inner = registry.lock().unwrap_or_else(PoisonError::into_inner);
            inner.watchers.retain(|(w, _)| *w != id);
        });
        if tx.send(Ok(inner.current_user())).is_ok() {
            inner.watchers.push((id, tx));
        }
        sub
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sign_up_then_sign_in() {
        let auth = MemoryAuth::new();
        let created = auth.sign_up("Neo@Matrix.io", "redpill").await.unwrap();
        assert_eq!(created.display_name, None);
        auth.sign_out().await.unwrap();
        assert!(auth.current_user().is_none());

        let signed = auth.sign_in("neo@matrix.io", "redpill").await.unwrap();
        assert_eq!(signed.uid, created.uid);
        assert_eq!(auth.current_user().map(|u| u.uid), Some(created.uid));
    }

    #[tokio::test]
    async fn credential_errors_map_to_fixed_variants() {
        let auth = MemoryAuth::new();
        assert_eq!(auth.sign_up("nope", "redpill").await, Err(AuthError::InvalidEmail));
        assert_eq!(auth.sign_up("a@b.io", "").await, Err(AuthError::MissingPassword));
        assert_eq!(auth.sign_up("a@b.io", "abc").await, Err(AuthError::WeakPassword));
        auth.sign_up("a@b.io", "abcdef").await.unwrap();
        assert_eq!(auth.sign_up("A@B.io", "abcdef").await, Err(AuthError::EmailInUse));
        assert_eq!(auth.sign_in("x@b.io", "abcdef").await, Err(AuthError::InvalidCredential));
    }

    #[tokio::test]
    async fn repeated_failures_are_throttled() {
        let auth = MemoryAuth::new();
        auth.sign_up("a@b.io", "abcdef").await.unwrap();
        for _ in 0..MAX_FAILED_ATTEMPTS {
            assert_eq!(auth.sign_in("a@b.io", "wrong!").await, Err(AuthError::InvalidCredential));
        }
        assert_eq!(auth.sign_in("a@b.io", "abcdef").await, Err(AuthError::TooManyRequests));
    }

    #[tokio::test]
    async fn identity_watch_fires_immediately_and_on_change() {
        let auth = MemoryAuth::new();
        let mut watch = auth.watch_identity();
        assert_eq!(watch.latest(), Some(Ok(None)));

        let user = auth.sign_up("a@b.io", "abcdef").await.unwrap();
        assert_eq!(watch.latest(), Some(Ok(Some(user))));

        auth.force_sign_out();
        assert_eq!(watch.latest(), Some(Ok(None)));
    }

    #[tokio::test]
    async fn update_profile_needs_identity() {
        let auth = MemoryAuth::new();
        assert!(auth
            .update_profile(AuthProfileUpdate {
                display_name: Some("x".into()),
                photo_url: None,
            })
            .await
            .is_err());
        auth.sign_up("a@b.io", "abcdef").await.unwrap();
        let updated = auth
            .update_profile(AuthProfileUpdate {
                display_name: Some("Anonymous".into()),
                photo_url: Some(Some("https://cdn/x.png".into())),
            })
            .await
            .unwrap();
        assert_eq!(updated.display_name.as_deref(), Some("Anonymous"));
        assert_eq!(updated.photo_url.as_deref(), Some("https://cdn/x.png"));
    }
}
