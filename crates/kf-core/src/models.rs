//! # Domain Models
//!
//! Client-side projections of the documents owned by the forum database.
//! Nothing here is durable: every live snapshot replaces the previous copy.

use std::collections::BTreeSet;
use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use mime::Mime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Placeholder name for users who never set one. Suppresses avatars wherever shown.
pub const ANONYMOUS_NAME: &str = "Anonymous";

/// Shown in place of a blank thread title.
pub const UNTITLED: &str = "(no title)";

/// Returns true when `name` is the sentinel anonymous name.
pub fn is_anonymous_name(name: &str) -> bool {
    name.trim() == ANONYMOUS_NAME
}

/// Opaque identity issued by the auth collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

/// Staff role stored on the profile record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    None,
    Moderator,
    Admin,
}

impl Role {
    /// Lenient parse of the stored role string; anything unknown is `None`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "admin" => Role::Admin,
            "moderator" => Role::Moderator,
            _ => Role::None,
        }
    }

    pub fn is_staff(self) -> bool {
        matches!(self, Role::Moderator | Role::Admin)
    }

    pub fn is_admin(self) -> bool {
        self == Role::Admin
    }
}

/// The `users/{uid}` document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRecord {
    pub display_name: Option<String>,
    /// Legacy field written by older registrations.
    pub username: Option<String>,
    pub bio: Option<String>,
    pub photo_url: Option<String>,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub banned: bool,
    pub muted_until: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ProfileRecord {
    /// A mute that ended in the past is the same as no mute.
    pub fn is_muted_at(&self, now: DateTime<Utc>) -> bool {
        self.muted_until.is_some_and(|until| until > now)
    }

    /// Display name → legacy username → sentinel.
    pub fn resolved_name(&self) -> String {
        non_blank(self.display_name.as_deref())
            .or_else(|| non_blank(self.username.as_deref()))
            .unwrap_or(ANONYMOUS_NAME)
            .to_string()
    }

    /// Stored avatar, trimmed; empty strings count as absent.
    pub fn photo(&self) -> Option<&str> {
        non_blank(self.photo_url.as_deref())
    }

    /// Applies a merge-write the way the database does: only present fields change.
    pub fn merge(&mut self, patch: &ProfilePatch, now: DateTime<Utc>) {
        if let Some(name) = &patch.display_name {
            self.display_name = Some(name.clone());
        }
        if let Some(username) = &patch.username {
            self.username = Some(username.clone());
        }
        if let Some(bio) = &patch.bio {
            self.bio = Some(bio.clone());
        }
        if let Some(photo) = &patch.photo_url {
            self.photo_url = photo.clone();
        }
        if let Some(role) = patch.role {
            self.role = role;
        }
        if let Some(banned) = patch.banned {
            self.banned = banned;
        }
        if let Some(until) = patch.muted_until {
            self.muted_until = until;
        }
        if patch.stamp_created && self.created_at.is_none() {
            self.created_at = Some(now);
        }
        if patch.stamp_updated {
            self.updated_at = Some(now);
        }
    }
}

/// Merge-write payload for a profile record. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfilePatch {
    pub display_name: Option<String>,
    pub username: Option<String>,
    pub bio: Option<String>,
    pub photo_url: Option<Option<String>>,
    pub role: Option<Role>,
    pub banned: Option<bool>,
    pub muted_until: Option<Option<DateTime<Utc>>>,
    pub stamp_created: bool,
    pub stamp_updated: bool,
}

fn non_blank(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|s| !s.is_empty())
}

/// The fixed tag vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Tag {
    Question,
    Art,
    Meme,
    #[serde(rename = "Site Recommendation")]
    SiteRecommendation,
    Other,
}

pub type TagSet = BTreeSet<Tag>;

impl Tag {
    pub const ALL: [Tag; 5] = [
        Tag::Question,
        Tag::Art,
        Tag::Meme,
        Tag::SiteRecommendation,
        Tag::Other,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Tag::Question => "Question",
            Tag::Art => "Art",
            Tag::Meme => "Meme",
            Tag::SiteRecommendation => "Site Recommendation",
            Tag::Other => "Other",
        }
    }

    /// Case-insensitive lookup by label.
    pub fn from_label(raw: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|tag| tag.label().eq_ignore_ascii_case(raw.trim()))
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Which pipeline of the media host stored a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Image,
    Video,
    Raw,
}

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Image => "image",
            ResourceKind::Video => "video",
            ResourceKind::Raw => "raw",
        }
    }
}

/// Media host metadata stored on a thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub url: String,
    pub public_id: Option<String>,
    pub resource_kind: ResourceKind,
    pub format: Option<String>,
    pub bytes: u64,
    pub original_filename: Option<String>,
}

/// A `threads/{id}` document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thread {
    pub id: Uuid,
    pub title: String,
    pub body: String,
    /// Author name at the time of writing; hydrated later from the profile directory.
    pub author: String,
    pub author_photo_url: Option<String>,
    pub uid: UserId,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    /// Denormalized; maintained by increments, never by recount.
    pub reply_count: i64,
    #[serde(default)]
    pub tags: TagSet,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewThread {
    pub title: String,
    pub body: String,
    pub author: String,
    pub author_photo_url: Option<String>,
    pub uid: UserId,
    pub tags: TagSet,
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThreadEdit {
    pub title: String,
    pub body: String,
}

/// A `threads/{id}/replies/{id}` document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    pub id: Uuid,
    pub thread_id: Uuid,
    pub text: String,
    pub author: String,
    pub author_photo_url: Option<String>,
    pub uid: UserId,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewReply {
    pub text: String,
    pub author: String,
    pub author_photo_url: Option<String>,
    pub uid: UserId,
}

/// Admin news item in `site_updates`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteUpdate {
    pub id: Uuid,
    pub body: String,
    pub author: String,
    pub uid: UserId,
    pub created: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewSiteUpdate {
    pub body: String,
    pub author: String,
    pub uid: UserId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ModerationKind {
    Ban,
    Timeout,
    DeleteThread,
    DeleteReply,
}

impl ModerationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ModerationKind::Ban => "ban",
            ModerationKind::Timeout => "timeout",
            ModerationKind::DeleteThread => "deleteThread",
            ModerationKind::DeleteReply => "deleteReply",
        }
    }
}

impl fmt::Display for ModerationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a moderation action was launched from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModerationSource {
    Thread,
    Reply,
}

/// Action-specific metadata on a log entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModerationDetails {
    pub thread_id: Option<Uuid>,
    pub reply_id: Option<Uuid>,
    pub source: Option<ModerationSource>,
    pub duration_label: Option<String>,
    pub minutes: Option<u32>,
    pub muted_until: Option<DateTime<Utc>>,
}

/// Append-only `moderationLogs` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModerationLogEntry {
    pub id: Uuid,
    pub action: ModerationKind,
    pub actor_uid: UserId,
    pub actor_display_name: String,
    pub target_uid: Option<UserId>,
    #[serde(default)]
    pub details: ModerationDetails,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewModerationLogEntry {
    pub action: ModerationKind,
    pub actor_uid: UserId,
    pub actor_display_name: String,
    pub target_uid: Option<UserId>,
    pub details: ModerationDetails,
}

/// The identity as the auth collaborator reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub uid: UserId,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
}

/// Update of the auth-side profile (not the `users` document).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthProfileUpdate {
    pub display_name: Option<String>,
    pub photo_url: Option<Option<String>>,
}

/// A file picked by the user, not yet uploaded.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadFile {
    pub name: String,
    pub mime: Mime,
    pub bytes: Bytes,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, mime: Mime, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            mime,
            bytes: bytes.into(),
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// What the media host returned for one upload.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedMedia {
    pub url: String,
    pub public_id: Option<String>,
    pub resource_kind: ResourceKind,
    pub format: Option<String>,
    pub bytes: u64,
    pub original_filename: Option<String>,
    /// Short-lived token allowing the uploader to discard the file.
    pub delete_token: Option<String>,
}

impl UploadedMedia {
    pub fn to_attachment(&self) -> Attachment {
        Attachment {
            url: self.url.clone(),
            public_id: self.public_id.clone(),
            resource_kind: self.resource_kind,
            format: self.format.clone(),
            bytes: self.bytes,
            original_filename: self.original_filename.clone(),
        }
    }
}
