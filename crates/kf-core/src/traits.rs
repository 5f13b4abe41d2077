//! # Core Traits (Ports)
//!
//! The forum talks to three external collaborators. Any backend must
//! implement these traits to be plugged into the client.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{AuthError, StoreError, UploadError};
use crate::models::{
    AuthProfileUpdate, AuthUser, ModerationLogEntry, NewModerationLogEntry, NewReply,
    NewSiteUpdate, NewThread, ProfilePatch, ProfileRecord, Reply, SiteUpdate, Thread, ThreadEdit,
    UploadFile, UploadedMedia, UserId,
};
use crate::subscription::Subscription;

/// Document database contract: single-shot reads/writes plus live queries.
///
/// Server-side fields (ids, timestamps, the initial reply count) are assigned
/// by the backend, never by the caller.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ForumStore: Send + Sync {
    // Profiles (`users/{uid}`)
    async fn get_profile(&self, uid: &UserId) -> Result<Option<ProfileRecord>, StoreError>;
    async fn merge_profile(&self, uid: &UserId, patch: ProfilePatch) -> Result<(), StoreError>;

    // Threads
    async fn add_thread(&self, thread: NewThread) -> Result<Uuid, StoreError>;
    async fn update_thread(&self, id: Uuid, edit: ThreadEdit) -> Result<(), StoreError>;
    async fn delete_thread(&self, id: Uuid) -> Result<(), StoreError>;
    /// Atomic add to the denormalized reply counter; also refreshes `updated`.
    async fn increment_reply_count(&self, id: Uuid, delta: i64) -> Result<(), StoreError>;

    // Replies (`threads/{id}/replies`)
    async fn add_reply(&self, thread_id: Uuid, reply: NewReply) -> Result<Uuid, StoreError>;
    async fn update_reply(&self, thread_id: Uuid, reply_id: Uuid, text: String) -> Result<(), StoreError>;
    async fn delete_reply(&self, thread_id: Uuid, reply_id: Uuid) -> Result<(), StoreError>;

    // Site updates
    async fn add_site_update(&self, update: NewSiteUpdate) -> Result<Uuid, StoreError>;
    async fn delete_site_update(&self, id: Uuid) -> Result<(), StoreError>;

    // Moderation log, append-only
    async fn append_moderation_log(&self, entry: NewModerationLogEntry) -> Result<Uuid, StoreError>;

    // Live queries. Each delivers the current snapshot immediately, then one per change.
    /// All threads, newest first.
    fn watch_threads(&self) -> Subscription<Vec<Thread>>;
    /// One thread document; `None` once it no longer exists.
    fn watch_thread(&self, id: Uuid) -> Subscription<Option<Thread>>;
    /// Replies of a thread, oldest first.
    fn watch_replies(&self, thread_id: Uuid) -> Subscription<Vec<Reply>>;
    /// Site updates, newest first.
    fn watch_site_updates(&self) -> Subscription<Vec<SiteUpdate>>;
    /// Moderation log, newest first.
    fn watch_moderation_logs(&self) -> Subscription<Vec<ModerationLogEntry>>;
}

/// Identity contract.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser, AuthError>;
    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthUser, AuthError>;
    async fn sign_out(&self) -> Result<(), AuthError>;
    /// Updates the signed-in identity's auth-side name/avatar.
    async fn update_profile(&self, update: AuthProfileUpdate) -> Result<AuthUser, AuthError>;

    fn current_user(&self) -> Option<AuthUser>;
    /// Fires with the current identity right away, then on every change.
    fn watch_identity(&self) -> Subscription<Option<AuthUser>>;
}

/// Media hosting contract for attachments and avatars.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait MediaHost: Send + Sync {
    /// One network call per file; pipeline chosen from the MIME type.
    async fn upload(&self, file: &UploadFile) -> Result<UploadedMedia, UploadError>;
    /// Best-effort removal of a file uploaded by this client.
    async fn discard(&self, media: &UploadedMedia) -> Result<(), UploadError>;
}
