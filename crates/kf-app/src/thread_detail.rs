//! # Thread Detail View-Model
//!
//! One open thread and its replies, each fed by its own live subscription.
//! The two sections are updated independently; the thread header may show a
//! reply count that briefly disagrees with the reply list.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use kf_core::{
    ForumError, NewReply, Reply, Result, SnapshotEvent, StreamSlot, Tag, Thread, ThreadEdit,
    UserId, ANONYMOUS_NAME, UNTITLED,
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::dialog::DialogChoice;
use crate::moderation::{self, ActionContext, ItemActions, ModerationAction, PendingAction};
use crate::profiles::{resolve_author_name, visible_avatar, PublicProfile};
use crate::render::{attachment_views, display_title, AttachmentView};
use crate::session::Session;
use crate::AppState;

/// Shown when a reply landed but its thread's counter did not move.
pub const REPLY_COUNT_STALE: &str = "Reply posted, but the reply count could not be updated.";

#[derive(Debug, Clone, Default, PartialEq)]
pub enum DetailState {
    #[default]
    Closed,
    Open {
        thread_id: Uuid,
        /// `None` until the first thread snapshot arrives.
        thread: Option<Thread>,
        replies: Vec<Reply>,
    },
}

/// What one `sync` or `next` changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    pub thread: bool,
    pub replies: bool,
    /// The thread no longer exists and the view was closed.
    pub closed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThreadHeader {
    pub id: Uuid,
    pub title: String,
    pub body: String,
    pub author: String,
    pub avatar: Option<String>,
    pub created: DateTime<Utc>,
    pub reply_count: i64,
    pub tags: Vec<Tag>,
    pub attachments: Vec<AttachmentView>,
    pub actions: ItemActions,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReplyView {
    pub id: Uuid,
    pub text: String,
    pub author: String,
    pub avatar: Option<String>,
    pub created: DateTime<Utc>,
    pub edited: bool,
    pub actions: ItemActions,
}

#[derive(Default)]
pub struct ThreadDetailViewModel {
    state: DetailState,
    thread_stream: StreamSlot<Option<Thread>>,
    reply_stream: StreamSlot<Vec<Reply>>,
    profiles: HashMap<UserId, PublicProfile>,
    pub reply_draft: String,
    /// Inline error slot for the last failed action.
    pub error: Option<String>,
}

enum Incoming {
    Thread(SnapshotEvent<Option<Thread>>),
    Replies(SnapshotEvent<Vec<Reply>>),
}

impl ThreadDetailViewModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens `thread_id`, replacing both subscriptions of any previous thread.
    pub fn open(&mut self, app: &AppState, thread_id: Uuid) {
        self.thread_stream.replace(app.store.watch_thread(thread_id));
        self.reply_stream.replace(app.store.watch_replies(thread_id));
        self.state = DetailState::Open {
            thread_id,
            thread: None,
            replies: Vec::new(),
        };
        self.reply_draft.clear();
        self.error = None;
        debug!(%thread_id, "thread opened");
    }

    pub fn close(&mut self) {
        self.thread_stream.clear();
        self.reply_stream.clear();
        self.state = DetailState::Closed;
        self.reply_draft.clear();
        self.error = None;
    }

    pub fn state(&self) -> &DetailState {
        &self.state
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, DetailState::Open { .. })
    }

    pub fn thread_id(&self) -> Option<Uuid> {
        match &self.state {
            DetailState::Open { thread_id, .. } => Some(*thread_id),
            DetailState::Closed => None,
        }
    }

    pub fn thread(&self) -> Option<&Thread> {
        match &self.state {
            DetailState::Open { thread, .. } => thread.as_ref(),
            DetailState::Closed => None,
        }
    }

    pub fn replies(&self) -> &[Reply] {
        match &self.state {
            DetailState::Open { replies, .. } => replies,
            DetailState::Closed => &[],
        }
    }

    fn reply(&self, reply_id: Uuid) -> Option<&Reply> {
        self.replies().iter().find(|r| r.id == reply_id)
    }

    fn apply(&mut self, incoming: Incoming) -> SyncOutcome {
        let mut outcome = SyncOutcome::default();
        let DetailState::Open {
            thread_id,
            thread,
            replies,
        } = &mut self.state
        else {
            return outcome;
        };
        match incoming {
            Incoming::Thread(Ok(Some(doc))) => {
                *thread = Some(doc);
                outcome.thread = true;
            }
            Incoming::Thread(Ok(None)) => {
                info!(thread_id = %thread_id, "thread no longer exists, closing");
                outcome.closed = true;
            }
            Incoming::Replies(Ok(list)) => {
                *replies = list;
                outcome.replies = true;
            }
            Incoming::Thread(Err(e)) => warn!(thread_id = %thread_id, error = %e, "thread listener error"),
            Incoming::Replies(Err(e)) => warn!(thread_id = %thread_id, error = %e, "replies listener error"),
        }
        if outcome.closed {
            self.close();
        }
        outcome
    }

    /// Applies whatever both subscriptions have delivered so far.
    pub fn sync(&mut self) -> SyncOutcome {
        let mut outcome = SyncOutcome::default();
        if let Some(event) = self.thread_stream.latest() {
            outcome = self.apply(Incoming::Thread(event));
        }
        if outcome.closed {
            return outcome;
        }
        if let Some(event) = self.reply_stream.latest() {
            outcome.replies = self.apply(Incoming::Replies(event)).replies;
        }
        outcome
    }

    /// Waits for the next delivery on either subscription.
    pub async fn next(&mut self) -> Option<SyncOutcome> {
        let incoming = tokio::select! {
            Some(event) = self.thread_stream.next() => Incoming::Thread(event),
            Some(event) = self.reply_stream.next() => Incoming::Replies(event),
            else => return None,
        };
        Some(self.apply(incoming))
    }

    /// Resolves the thread and reply authors through the profile directory.
    pub async fn hydrate(&mut self, app: &AppState) {
        let mut uids: HashSet<UserId> = self.replies().iter().map(|r| r.uid.clone()).collect();
        if let Some(thread) = self.thread() {
            uids.insert(thread.uid.clone());
        }
        uids.retain(|uid| !self.profiles.contains_key(uid));
        let resolved = join_all(uids.into_iter().map(|uid| {
            let directory = app.profiles.clone();
            async move {
                let profile = directory.resolve(&uid).await;
                (uid, profile)
            }
        }))
        .await;
        for (uid, profile) in resolved {
            if let Some(profile) = profile {
                self.profiles.insert(uid, profile);
            }
        }
    }

    fn author_of(&self, uid: &UserId, snapshot_name: &str, snapshot_photo: Option<&str>) -> (String, Option<String>) {
        if let Some(profile) = self.profiles.get(uid) {
            return (
                profile.display_name.clone(),
                profile.avatar().map(str::to_string),
            );
        }
        let name = if snapshot_name.trim().is_empty() {
            ANONYMOUS_NAME
        } else {
            snapshot_name
        };
        (
            name.to_string(),
            visible_avatar(name, snapshot_photo).map(str::to_string),
        )
    }

    pub fn header(&self, session: &Session) -> Option<ThreadHeader> {
        let thread = self.thread()?;
        let (author, avatar) = self.author_of(&thread.uid, &thread.author, thread.author_photo_url.as_deref());
        Some(ThreadHeader {
            id: thread.id,
            title: display_title(&thread.title).to_string(),
            body: thread.body.clone(),
            author,
            avatar,
            created: thread.created,
            reply_count: thread.reply_count,
            tags: thread.tags.iter().copied().collect(),
            attachments: attachment_views(&thread.attachments),
            actions: ItemActions::for_owner(session, &thread.uid),
        })
    }

    /// Replies in creation order.
    pub fn reply_views(&self, session: &Session) -> Vec<ReplyView> {
        self.replies()
            .iter()
            .map(|reply| {
                let (author, avatar) =
                    self.author_of(&reply.uid, &reply.author, reply.author_photo_url.as_deref());
                ReplyView {
                    id: reply.id,
                    text: reply.text.clone(),
                    author,
                    avatar,
                    created: reply.created,
                    edited: reply.updated > reply.created,
                    actions: ItemActions::for_owner(session, &reply.uid),
                }
            })
            .collect()
    }

    fn record<T>(&mut self, outcome: Result<T>) -> Result<T> {
        if let Err(e) = &outcome {
            self.error = Some(e.inline_message());
        }
        outcome
    }

    fn open_thread(&self) -> Result<&Thread> {
        self.thread()
            .ok_or_else(|| ForumError::NotFound("Thread".into(), self.thread_id().map(|id| id.to_string()).unwrap_or_default()))
    }

    /// Posts `reply_draft` and bumps the reply counter.
    ///
    /// Once the reply is written the draft is cleared, even if the counter
    /// update then fails; that failure only leaves the count stale.
    pub async fn post_reply(&mut self, app: &AppState, session: &Session) -> Result<Uuid> {
        self.error = None;
        let (thread_id, reply_id) = match self.try_post_reply(app, session).await {
            Ok(ids) => ids,
            Err(e) => return self.record(Err(e)),
        };
        self.reply_draft.clear();
        if let Err(e) = app.store.increment_reply_count(thread_id, 1).await {
            error!(%thread_id, %reply_id, error = %e, "reply counter increment failed");
            self.error = Some(REPLY_COUNT_STALE.to_string());
        }
        Ok(reply_id)
    }

    async fn try_post_reply(&self, app: &AppState, session: &Session) -> Result<(Uuid, Uuid)> {
        let user = session
            .user()
            .ok_or_else(|| ForumError::unauthorized("Log in to reply."))?;
        if !session.capabilities().can_reply {
            return Err(ForumError::unauthorized("You cannot reply right now."));
        }
        let thread_id = self.open_thread()?.id;
        let text = self.reply_draft.trim();
        if text.is_empty() {
            return Err(ForumError::validation("Reply cannot be empty."));
        }

        let author = resolve_author_name(app.store.as_ref(), user).await;
        let author_photo_url = visible_avatar(&author, user.photo_url.as_deref()).map(str::to_string);
        let reply = NewReply {
            text: text.to_string(),
            author,
            author_photo_url,
            uid: user.uid.clone(),
        };
        let reply_id = app.store.add_reply(thread_id, reply).await.map_err(|e| {
            error!(%thread_id, error = %e, "reply failed");
            ForumError::from(e)
        })?;
        Ok((thread_id, reply_id))
    }

    /// Author-only edit. A blank title becomes the placeholder.
    pub async fn edit_thread(&mut self, app: &AppState, session: &Session, title: &str, body: &str) -> Result<()> {
        self.error = None;
        let outcome = self.try_edit_thread(app, session, title, body).await;
        self.record(outcome)
    }

    async fn try_edit_thread(&self, app: &AppState, session: &Session, title: &str, body: &str) -> Result<()> {
        let thread = self.open_thread()?;
        if !ItemActions::for_owner(session, &thread.uid).edit {
            return Err(ForumError::unauthorized("You can only edit your own threads."));
        }
        let body = body.trim();
        if body.is_empty() {
            return Err(ForumError::validation("Body cannot be empty."));
        }
        let title = match title.trim() {
            "" => UNTITLED,
            t => t,
        };
        let edit = ThreadEdit {
            title: title.to_string(),
            body: body.to_string(),
        };
        app.store.update_thread(thread.id, edit).await.map_err(|e| {
            error!(thread_id = %thread.id, error = %e, "edit thread failed");
            ForumError::from(e)
        })
    }

    pub async fn edit_reply(&mut self, app: &AppState, session: &Session, reply_id: Uuid, text: &str) -> Result<()> {
        self.error = None;
        let outcome = self.try_edit_reply(app, session, reply_id, text).await;
        self.record(outcome)
    }

    async fn try_edit_reply(&self, app: &AppState, session: &Session, reply_id: Uuid, text: &str) -> Result<()> {
        let reply = self
            .reply(reply_id)
            .ok_or_else(|| ForumError::NotFound("Reply".into(), reply_id.to_string()))?;
        if !ItemActions::for_owner(session, &reply.uid).edit {
            return Err(ForumError::unauthorized("You can only edit your own replies."));
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(ForumError::validation("Reply cannot be empty."));
        }
        app.store
            .update_reply(reply.thread_id, reply_id, text.to_string())
            .await
            .map_err(|e| {
                error!(%reply_id, error = %e, "edit reply failed");
                ForumError::from(e)
            })
    }

    pub fn request_delete_thread(&mut self, session: &Session) -> Result<PendingAction> {
        let outcome = self
            .open_thread()
            .and_then(|t| moderation::request_delete_thread(session, t.id, &t.uid));
        self.record(outcome)
    }

    pub fn request_delete_reply(&mut self, session: &Session, reply_id: Uuid) -> Result<PendingAction> {
        let outcome = self
            .reply(reply_id)
            .ok_or_else(|| ForumError::NotFound("Reply".into(), reply_id.to_string()))
            .and_then(|r| moderation::request_delete_reply(session, r.thread_id, r.id, &r.uid));
        self.record(outcome)
    }

    /// Owner and context of the thread, or of one of its replies.
    fn target(&self, reply_id: Option<Uuid>) -> Result<(UserId, ActionContext)> {
        let thread = self.open_thread()?;
        match reply_id {
            None => Ok((thread.uid.clone(), ActionContext::thread(thread.id))),
            Some(id) => {
                let reply = self
                    .reply(id)
                    .ok_or_else(|| ForumError::NotFound("Reply".into(), id.to_string()))?;
                Ok((reply.uid.clone(), ActionContext::reply(thread.id, id)))
            }
        }
    }

    pub fn request_timeout(&mut self, session: &Session, reply_id: Option<Uuid>) -> Result<PendingAction> {
        let outcome = self
            .target(reply_id)
            .and_then(|(uid, ctx)| moderation::request_timeout(session, &uid, ctx));
        self.record(outcome)
    }

    pub fn request_ban(&mut self, session: &Session, reply_id: Option<Uuid>) -> Result<PendingAction> {
        let outcome = self
            .target(reply_id)
            .and_then(|(uid, ctx)| moderation::request_ban(session, &uid, ctx));
        self.record(outcome)
    }

    /// Executes a pending action once its dialog resolved. Returns false when
    /// the user declined. Failures land in the inline error slot.
    pub async fn commit(&mut self, app: &AppState, pending: PendingAction, choice: DialogChoice) -> Result<bool> {
        let actor = pending.actor().clone();
        let Some(action) = pending.resolve(choice) else {
            return Ok(false);
        };
        self.error = None;
        let outcome = moderation::execute(app.store.as_ref(), &actor, &action).await;
        self.record(outcome)?;
        if let ModerationAction::DeleteThread { thread_id, .. } = action {
            if self.thread_id() == Some(thread_id) {
                self.close();
            }
        }
        Ok(true)
    }
}
