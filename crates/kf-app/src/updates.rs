//! Site updates: an admin-authored announcement feed shown above the thread list.

use chrono::{DateTime, Utc};
use kf_core::{ForumError, NewSiteUpdate, Result, SiteUpdate, SnapshotEvent, StreamSlot};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::dialog::{DialogChoice, DialogDescriptor};
use crate::profiles::resolve_author_name;
use crate::session::Session;
use crate::AppState;

pub const EMPTY_UPDATES_MESSAGE: &str = "No updates yet.";

/// Shown when an update carries no author name.
pub const FALLBACK_AUTHOR: &str = "Admin";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateCard {
    pub id: Uuid,
    pub author: String,
    pub created: DateTime<Utc>,
    pub body: String,
    pub can_delete: bool,
}

/// A delete awaiting confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingUpdateDelete {
    id: Uuid,
}

impl PendingUpdateDelete {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn descriptor(&self) -> DialogDescriptor {
        DialogDescriptor::confirm(
            "Delete update",
            "Are you sure you want to delete this update?",
            "Delete",
        )
    }
}

#[derive(Default)]
pub struct SiteUpdatesView {
    stream: StreamSlot<Vec<SiteUpdate>>,
    updates: Option<Vec<SiteUpdate>>,
    pub draft: String,
    pub error: Option<String>,
}

impl SiteUpdatesView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self, app: &AppState) {
        self.stream.replace(app.store.watch_site_updates());
    }

    pub fn stop(&mut self) {
        self.stream.clear();
    }

    pub fn is_live(&self) -> bool {
        self.stream.is_active()
    }

    fn apply(&mut self, event: SnapshotEvent<Vec<SiteUpdate>>) -> bool {
        match event {
            Ok(updates) => {
                self.updates = Some(updates);
                true
            }
            Err(e) => {
                warn!(error = %e, "site updates feed error");
                false
            }
        }
    }

    pub fn sync(&mut self) -> bool {
        match self.stream.latest() {
            Some(event) => self.apply(event),
            None => false,
        }
    }

    pub async fn next(&mut self) -> Option<bool> {
        let event = self.stream.next().await?;
        Some(self.apply(event))
    }

    pub fn empty_message(&self) -> Option<&'static str> {
        match &self.updates {
            Some(updates) if updates.is_empty() => Some(EMPTY_UPDATES_MESSAGE),
            _ => None,
        }
    }

    pub fn cards(&self, session: &Session) -> Vec<UpdateCard> {
        let can_delete = session.is_signed_in() && session.is_admin();
        self.updates
            .iter()
            .flatten()
            .map(|u| UpdateCard {
                id: u.id,
                author: match u.author.trim() {
                    "" => FALLBACK_AUTHOR.to_string(),
                    name => name.to_string(),
                },
                created: u.created,
                body: u.body.clone(),
                can_delete,
            })
            .collect()
    }

    /// Publishes the draft. Admins only; the draft is cleared on success.
    pub async fn post(&mut self, app: &AppState, session: &Session) -> Result<Uuid> {
        self.error = None;
        let outcome = self.try_post(app, session).await;
        match &outcome {
            Ok(_) => self.draft.clear(),
            Err(e) => self.error = Some(e.inline_message()),
        }
        outcome
    }

    async fn try_post(&self, app: &AppState, session: &Session) -> Result<Uuid> {
        let user = match session.user() {
            Some(user) if session.is_admin() => user,
            _ => return Err(ForumError::unauthorized("Only admins can post updates.")),
        };
        let body = self.draft.trim();
        if body.is_empty() {
            return Err(ForumError::validation("Update cannot be empty."));
        }
        let author = resolve_author_name(app.store.as_ref(), user).await;
        let id = app
            .store
            .add_site_update(NewSiteUpdate {
                body: body.to_string(),
                author,
                uid: user.uid.clone(),
            })
            .await
            .map_err(|e| {
                error!(uid = %user.uid, error = %e, "site update failed");
                ForumError::from(e)
            })?;
        info!(update_id = %id, "site update posted");
        Ok(id)
    }

    pub fn request_delete(&mut self, session: &Session, id: Uuid) -> Result<PendingUpdateDelete> {
        if session.is_signed_in() && session.is_admin() {
            Ok(PendingUpdateDelete { id })
        } else {
            let e = ForumError::unauthorized("Only admins can delete updates.");
            self.error = Some(e.inline_message());
            Err(e)
        }
    }

    /// Deletes when the dialog was confirmed. Returns whether anything was written.
    pub async fn commit_delete(
        &mut self,
        app: &AppState,
        pending: PendingUpdateDelete,
        choice: DialogChoice,
    ) -> Result<bool> {
        if choice != DialogChoice::Confirm {
            return Ok(false);
        }
        match app.store.delete_site_update(pending.id).await {
            Ok(()) => {
                info!(update_id = %pending.id, "site update deleted");
                Ok(true)
            }
            Err(e) => {
                error!(update_id = %pending.id, error = %e, "site update delete failed");
                let e = ForumError::from(e);
                self.error = Some(e.inline_message());
                Err(e)
            }
        }
    }
}
