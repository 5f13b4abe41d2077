//! kino-forum/crates/kf-app/src/lib.rs
//!
//! View-models for the Kino Forum client. Each screen section owns its live
//! subscriptions and derives what it shows from the latest snapshot plus the
//! session; `ForumApp` wires them to one identity stream and one dialog host.

pub mod account;
pub mod dialog;
pub mod moderation;
pub mod modlog;
pub mod profiles;
pub mod render;
pub mod session;
pub mod thread_detail;
pub mod thread_list;
pub mod updates;

use std::sync::Arc;

use kf_core::{
    AuthProvider, AuthUser, ForumStore, MediaHost, Result, SnapshotEvent, StreamSlot,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::account::{AuthForm, ProfileEditor};
use crate::dialog::DialogHost;
use crate::moderation::PendingAction;
use crate::modlog::ModerationLogView;
use crate::profiles::ProfileDirectory;
use crate::session::{Capabilities, Session};
use crate::thread_detail::{SyncOutcome, ThreadDetailViewModel};
use crate::thread_list::ThreadListViewModel;
use crate::updates::SiteUpdatesView;

/// The collaborators plus the process-wide profile cache.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ForumStore>,
    pub auth: Arc<dyn AuthProvider>,
    pub media: Arc<dyn MediaHost>,
    pub profiles: ProfileDirectory,
}

impl AppState {
    pub fn new(
        store: Arc<dyn ForumStore>,
        auth: Arc<dyn AuthProvider>,
        media: Arc<dyn MediaHost>,
    ) -> Self {
        let profiles = ProfileDirectory::new(Arc::clone(&store));
        Self {
            store,
            auth,
            media,
            profiles,
        }
    }
}

/// Which main section is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum View {
    #[default]
    List,
    Thread(Uuid),
}

/// What one `next_event` call applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEvent {
    Identity,
    Threads,
    Detail(SyncOutcome),
    SiteUpdates,
    ModerationLog,
}

enum Delivery {
    Identity(SnapshotEvent<Option<AuthUser>>),
    Threads(bool),
    Detail(SyncOutcome),
    SiteUpdates(bool),
    ModerationLog(bool),
}

pub struct ForumApp {
    state: AppState,
    session: Session,
    identity: StreamSlot<Option<AuthUser>>,
    dialogs: DialogHost,
    view: View,
    pub list: ThreadListViewModel,
    pub detail: ThreadDetailViewModel,
    pub modlog: ModerationLogView,
    pub updates: SiteUpdatesView,
    pub auth_form: AuthForm,
    pub profile_editor: ProfileEditor,
}

impl ForumApp {
    pub fn new(state: AppState) -> Self {
        Self {
            state,
            session: Session::signed_out(),
            identity: StreamSlot::default(),
            dialogs: DialogHost::new(),
            view: View::List,
            list: ThreadListViewModel::new(),
            detail: ThreadDetailViewModel::new(),
            modlog: ModerationLogView::new(),
            updates: SiteUpdatesView::new(),
            auth_form: AuthForm::default(),
            profile_editor: ProfileEditor::new(),
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Shared with whatever presents the dialogs.
    pub fn dialogs(&self) -> &DialogHost {
        &self.dialogs
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn capabilities(&self) -> Capabilities {
        self.session.capabilities()
    }

    pub fn status_line(&self) -> String {
        self.session.status_line_at(chrono::Utc::now())
    }

    /// Opens the always-on subscriptions and applies whatever they already hold.
    pub async fn boot(&mut self) {
        self.identity.replace(self.state.auth.watch_identity());
        self.list.start(&self.state);
        self.updates.start(&self.state);
        self.pump().await;
        info!("forum client started");
    }

    /// Tears every subscription down.
    pub fn shutdown(&mut self) {
        self.identity.clear();
        self.list.stop();
        self.detail.close();
        self.updates.stop();
        self.modlog.stop();
        self.dialogs.close_all();
        self.view = View::List;
    }

    /// Applies everything delivered so far without waiting, then hydrates authors.
    pub async fn pump(&mut self) {
        match self.identity.latest() {
            Some(Ok(user)) => self.apply_identity(user).await,
            Some(Err(e)) => warn!(error = %e, "identity listener error"),
            None => {}
        }
        self.list.sync();
        if self.detail.sync().closed {
            self.view = View::List;
        }
        self.updates.sync();
        self.modlog.sync();
        self.list.hydrate(&self.state).await;
        self.detail.hydrate(&self.state).await;
    }

    /// Waits for the next delivery on any live subscription and applies it.
    /// `None` once every subscription is gone.
    pub async fn next_event(&mut self) -> Option<AppEvent> {
        let delivery = tokio::select! {
            Some(event) = self.identity.next() => Delivery::Identity(event),
            Some(changed) = self.list.next() => Delivery::Threads(changed),
            Some(outcome) = self.detail.next() => Delivery::Detail(outcome),
            Some(changed) = self.updates.next() => Delivery::SiteUpdates(changed),
            Some(changed) = self.modlog.next() => Delivery::ModerationLog(changed),
            else => return None,
        };
        let event = match delivery {
            Delivery::Identity(Ok(user)) => {
                self.apply_identity(user).await;
                AppEvent::Identity
            }
            Delivery::Identity(Err(e)) => {
                warn!(error = %e, "identity listener error");
                AppEvent::Identity
            }
            Delivery::Threads(changed) => {
                if changed {
                    self.list.hydrate(&self.state).await;
                }
                AppEvent::Threads
            }
            Delivery::Detail(outcome) => {
                if outcome.closed {
                    self.view = View::List;
                } else {
                    self.detail.hydrate(&self.state).await;
                }
                AppEvent::Detail(outcome)
            }
            Delivery::SiteUpdates(_) => AppEvent::SiteUpdates,
            Delivery::ModerationLog(_) => AppEvent::ModerationLog,
        };
        Some(event)
    }

    async fn apply_identity(&mut self, user: Option<AuthUser>) {
        let signed_out = user.is_none();
        self.session
            .apply_identity(self.state.auth.as_ref(), self.state.store.as_ref(), user)
            .await;
        if signed_out {
            self.dialogs.close_all();
            self.profile_editor = ProfileEditor::new();
        }
        let staff = self.modlog.refresh_for(&self.state, &self.session);
        debug!(signed_in = !signed_out, staff, "identity applied");
    }

    /// Re-reads the current identity after an own-profile change.
    async fn refresh_session(&mut self) {
        let user = self.state.auth.current_user();
        self.apply_identity(user).await;
    }

    pub fn open_thread(&mut self, id: Uuid) {
        self.detail.open(&self.state, id);
        self.view = View::Thread(id);
    }

    pub fn close_thread(&mut self) {
        self.detail.close();
        self.view = View::List;
    }

    /// Creates a thread from the compose form and switches to it.
    pub async fn create_thread(&mut self) -> Result<Uuid> {
        let id = self.list.create_thread(&self.state, &self.session).await?;
        self.open_thread(id);
        Ok(id)
    }

    pub async fn post_reply(&mut self) -> Result<Uuid> {
        self.detail.post_reply(&self.state, &self.session).await
    }

    pub async fn edit_thread(&mut self, title: &str, body: &str) -> Result<()> {
        self.detail
            .edit_thread(&self.state, &self.session, title, body)
            .await
    }

    pub async fn edit_reply(&mut self, reply_id: Uuid, text: &str) -> Result<()> {
        self.detail
            .edit_reply(&self.state, &self.session, reply_id, text)
            .await
    }

    /// Shows the action's dialog, waits for a choice, then commits it.
    async fn confirm(&mut self, pending: PendingAction) -> Result<bool> {
        let choice = self.dialogs.open(pending.descriptor()).choice().await;
        let executed = self.detail.commit(&self.state, pending, choice).await?;
        if !self.detail.is_open() {
            self.view = View::List;
        }
        Ok(executed)
    }

    pub async fn delete_thread(&mut self) -> Result<bool> {
        let pending = self.detail.request_delete_thread(&self.session)?;
        self.confirm(pending).await
    }

    pub async fn delete_reply(&mut self, reply_id: Uuid) -> Result<bool> {
        let pending = self.detail.request_delete_reply(&self.session, reply_id)?;
        self.confirm(pending).await
    }

    /// Times out the author of the open thread, or of `reply_id` when given.
    pub async fn timeout_user(&mut self, reply_id: Option<Uuid>) -> Result<bool> {
        let pending = self.detail.request_timeout(&self.session, reply_id)?;
        self.confirm(pending).await
    }

    pub async fn ban_user(&mut self, reply_id: Option<Uuid>) -> Result<bool> {
        let pending = self.detail.request_ban(&self.session, reply_id)?;
        self.confirm(pending).await
    }

    pub async fn post_site_update(&mut self) -> Result<Uuid> {
        self.updates.post(&self.state, &self.session).await
    }

    pub async fn delete_site_update(&mut self, id: Uuid) -> Result<bool> {
        let pending = self.updates.request_delete(&self.session, id)?;
        let choice = self.dialogs.open(pending.descriptor()).choice().await;
        self.updates.commit_delete(&self.state, pending, choice).await
    }

    pub async fn login(&mut self) -> Result<AuthUser> {
        let user = self.auth_form.login(&self.state).await?;
        self.pump().await;
        Ok(user)
    }

    pub async fn register(&mut self) -> Result<AuthUser> {
        let user = self.auth_form.register(&self.state).await?;
        self.pump().await;
        Ok(user)
    }

    pub async fn logout(&mut self) {
        account::logout(&self.state).await;
        self.pump().await;
    }

    pub async fn load_profile(&mut self) -> Result<()> {
        self.profile_editor.load(&self.state, &self.session).await
    }

    pub async fn save_profile(&mut self) -> Result<()> {
        self.profile_editor.save(&self.state, &self.session).await?;
        self.refresh_session().await;
        Ok(())
    }

    pub async fn upload_profile_photo(&mut self) -> Result<()> {
        self.profile_editor
            .upload_photo(&self.state, &self.session)
            .await?;
        self.refresh_session().await;
        Ok(())
    }
}
