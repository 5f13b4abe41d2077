//! # Session State
//!
//! The signed-in identity plus the authorization flags loaded from its
//! profile record. Every affordance elsewhere in the client is a pure
//! function of `Capabilities`, which is derived from this state and a clock.

use chrono::{DateTime, Utc};
use kf_core::{
    AuthProfileUpdate, AuthProvider, AuthUser, ForumStore, Role, UserId, ANONYMOUS_NAME,
};
use tracing::{debug, error, info, warn};

/// Timestamp format used for every user-visible date.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

pub fn format_time(ts: DateTime<Utc>) -> String {
    ts.format(TIME_FORMAT).to_string()
}

#[derive(Debug, Clone, Default)]
pub struct Session {
    user: Option<AuthUser>,
    role: Role,
    banned: bool,
    muted_until: Option<DateTime<Utc>>,
}

impl Session {
    pub fn signed_out() -> Self {
        Self::default()
    }

    /// Handles an identity change (sign-in, sign-out, or revocation).
    ///
    /// Flags are reset before anything is awaited, so a signed-out or
    /// half-loaded session never carries the previous user's role.
    pub async fn apply_identity(
        &mut self,
        auth: &dyn AuthProvider,
        store: &dyn ForumStore,
        user: Option<AuthUser>,
    ) {
        self.role = Role::None;
        self.banned = false;
        self.muted_until = None;
        self.user = user;

        let Some(user) = self.user.as_mut() else {
            debug!("session cleared");
            return;
        };

        // The event may predate a rename made right after sign-up.
        if user.display_name.is_none() {
            if let Some(fresh) = auth.current_user().filter(|c| c.uid == user.uid) {
                *user = fresh;
            }
        }
        if user.display_name.is_none() {
            let update = AuthProfileUpdate {
                display_name: Some(ANONYMOUS_NAME.to_string()),
                photo_url: None,
            };
            match auth.update_profile(update).await {
                Ok(updated) => user.display_name = updated.display_name,
                Err(e) => warn!(uid = %user.uid, error = %e, "could not bootstrap display name"),
            }
        }

        match store.get_profile(&user.uid).await {
            Ok(record) => {
                let record = record.unwrap_or_default();
                self.role = record.role;
                self.banned = record.banned;
                self.muted_until = record.muted_until;
            }
            Err(e) => error!(uid = %user.uid, error = %e, "failed to load profile flags"),
        }
        info!(uid = %user.uid, role = ?self.role, banned = self.banned, "session ready");
    }

    pub fn user(&self) -> Option<&AuthUser> {
        self.user.as_ref()
    }

    pub fn uid(&self) -> Option<&UserId> {
        self.user.as_ref().map(|u| &u.uid)
    }

    pub fn is_signed_in(&self) -> bool {
        self.user.is_some()
    }

    /// True when `uid` is the signed-in identity.
    pub fn is_self(&self, uid: &UserId) -> bool {
        self.uid() == Some(uid)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_moderator(&self) -> bool {
        self.role.is_staff()
    }

    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    pub fn is_banned(&self) -> bool {
        self.banned
    }

    pub fn muted_until(&self) -> Option<DateTime<Utc>> {
        self.muted_until
    }

    pub fn is_muted_at(&self, now: DateTime<Utc>) -> bool {
        self.muted_until.is_some_and(|until| until > now)
    }

    pub fn is_muted(&self) -> bool {
        self.is_muted_at(Utc::now())
    }

    /// Auth-side display name, or the sentinel.
    pub fn display_name(&self) -> &str {
        self.user
            .as_ref()
            .and_then(|u| u.display_name.as_deref())
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(ANONYMOUS_NAME)
    }

    pub fn capabilities_at(&self, now: DateTime<Utc>) -> Capabilities {
        let signed_in = self.is_signed_in();
        let can_post = signed_in && !self.banned && !self.is_muted_at(now);
        Capabilities {
            show_auth_box: !signed_in,
            show_logout: signed_in,
            show_profile: signed_in,
            can_create_thread: can_post,
            can_reply: can_post,
            can_moderate: signed_in && self.is_moderator(),
            can_administer: signed_in && self.is_admin(),
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities_at(Utc::now())
    }

    /// The one-line account status shown under the header.
    pub fn status_line_at(&self, now: DateTime<Utc>) -> String {
        if !self.is_signed_in() {
            "Not logged in".to_string()
        } else if self.banned {
            "You are banned and cannot create threads or replies.".to_string()
        } else if let Some(until) = self.muted_until.filter(|until| *until > now) {
            format!(
                "You are temporarily timed out and cannot post until {}",
                format_time(until)
            )
        } else {
            format!("Logged in as: {}", self.display_name())
        }
    }
}

/// What the current session may see and do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub show_auth_box: bool,
    pub show_logout: bool,
    pub show_profile: bool,
    pub can_create_thread: bool,
    pub can_reply: bool,
    pub can_moderate: bool,
    pub can_administer: bool,
}
