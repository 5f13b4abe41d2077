//! # Profile Directory
//!
//! Read-through cache from a user id to the public name/avatar pair shown on
//! cards and headers. Each id is fetched at most once per process: callers
//! that arrive while a lookup is in flight await the same shared future, and
//! completed lookups are never invalidated.

use std::sync::Arc;

use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use kf_core::{is_anonymous_name, AuthUser, ForumStore, ProfileRecord, UserId, ANONYMOUS_NAME};
use tracing::{debug, warn};

/// Public projection of a profile record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicProfile {
    pub display_name: String,
    photo_url: Option<String>,
}

impl PublicProfile {
    pub fn new(display_name: impl Into<String>, photo_url: Option<String>) -> Self {
        Self {
            display_name: display_name.into(),
            photo_url: photo_url.filter(|url| !url.trim().is_empty()),
        }
    }

    /// A missing document reads as an anonymous user without avatar.
    pub fn from_record(record: Option<&ProfileRecord>) -> Self {
        match record {
            Some(record) => Self::new(record.resolved_name(), record.photo().map(str::to_string)),
            None => Self::new(ANONYMOUS_NAME, None),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        is_anonymous_name(&self.display_name)
    }

    /// The avatar to display. Anonymity suppresses a stored avatar.
    pub fn avatar(&self) -> Option<&str> {
        if self.is_anonymous() {
            return None;
        }
        self.photo_url.as_deref()
    }
}

/// Avatar rule for raw snapshot fields (author name + photo stored on a document).
pub fn visible_avatar<'a>(name: &str, photo_url: Option<&'a str>) -> Option<&'a str> {
    if is_anonymous_name(name) {
        return None;
    }
    photo_url.map(str::trim).filter(|url| !url.is_empty())
}

type Lookup = Shared<BoxFuture<'static, Option<PublicProfile>>>;

#[derive(Clone)]
pub struct ProfileDirectory {
    store: Arc<dyn ForumStore>,
    entries: Arc<DashMap<UserId, Lookup>>,
}

impl ProfileDirectory {
    pub fn new(store: Arc<dyn ForumStore>) -> Self {
        Self {
            store,
            entries: Arc::new(DashMap::new()),
        }
    }

    /// Resolves `uid`, sharing any lookup already in flight.
    ///
    /// `None` means the read failed; the failure is cached like a success.
    pub async fn resolve(&self, uid: &UserId) -> Option<PublicProfile> {
        let lookup = self
            .entries
            .entry(uid.clone())
            .or_insert_with(|| self.fetch(uid.clone()))
            .value()
            .clone();
        lookup.await
    }

    fn fetch(&self, uid: UserId) -> Lookup {
        let store = Arc::clone(&self.store);
        async move {
            debug!(%uid, "fetching public profile");
            match store.get_profile(&uid).await {
                Ok(record) => Some(PublicProfile::from_record(record.as_ref())),
                Err(e) => {
                    warn!(%uid, error = %e, "profile fetch failed");
                    None
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Completed result for `uid`, if one is cached.
    pub fn peek(&self, uid: &UserId) -> Option<PublicProfile> {
        self.entries.get(uid).and_then(|lookup| lookup.peek().cloned().flatten())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Name written onto new content: stored username or display name, then the
/// auth-side display name, then the sentinel. Always a fresh read, since the
/// directory never sees the author's own renames.
pub async fn resolve_author_name(store: &dyn ForumStore, user: &AuthUser) -> String {
    let stored = match store.get_profile(&user.uid).await {
        Ok(record) => record.and_then(|r| {
            r.username
                .or(r.display_name)
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty())
        }),
        Err(e) => {
            warn!(uid = %user.uid, error = %e, "author profile read failed");
            None
        }
    };
    stored
        .or_else(|| {
            user.display_name
                .as_deref()
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
        })
        .unwrap_or_else(|| ANONYMOUS_NAME.to_string())
}
