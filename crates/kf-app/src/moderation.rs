//! # Moderation actions
//!
//! Every destructive or punitive action is built as a `PendingAction`, shown
//! to the user through a dialog, and only executed once the dialog resolves
//! with a confirming choice. Staff actions against someone else's content
//! write their log entry before the destructive write.

use chrono::{Duration, Utc};
use kf_core::{
    ForumError, ForumStore, ModerationDetails, ModerationKind, ModerationSource,
    NewModerationLogEntry, ProfilePatch, Result, UserId,
};
use tracing::{error, info};
use uuid::Uuid;

use crate::dialog::{DialogChoice, DialogDescriptor};
use crate::session::Session;

/// One entry of the fixed timeout menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutDuration {
    pub label: &'static str,
    pub minutes: u32,
}

impl TimeoutDuration {
    pub const MENU: [TimeoutDuration; 8] = [
        TimeoutDuration { label: "30 minutes", minutes: 30 },
        TimeoutDuration { label: "1 hour", minutes: 60 },
        TimeoutDuration { label: "12 hours", minutes: 12 * 60 },
        TimeoutDuration { label: "24 hours", minutes: 24 * 60 },
        TimeoutDuration { label: "2 days", minutes: 2 * 24 * 60 },
        TimeoutDuration { label: "7 days", minutes: 7 * 24 * 60 },
        TimeoutDuration { label: "14 days", minutes: 14 * 24 * 60 },
        TimeoutDuration { label: "30 days", minutes: 30 * 24 * 60 },
    ];

    pub fn duration(self) -> Duration {
        Duration::minutes(i64::from(self.minutes))
    }
}

/// Where an action was launched from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionContext {
    pub thread_id: Uuid,
    pub reply_id: Option<Uuid>,
}

impl ActionContext {
    pub fn thread(thread_id: Uuid) -> Self {
        Self {
            thread_id,
            reply_id: None,
        }
    }

    pub fn reply(thread_id: Uuid, reply_id: Uuid) -> Self {
        Self {
            thread_id,
            reply_id: Some(reply_id),
        }
    }

    fn source(self) -> ModerationSource {
        match self.reply_id {
            Some(_) => ModerationSource::Reply,
            None => ModerationSource::Thread,
        }
    }

    fn details(self) -> ModerationDetails {
        ModerationDetails {
            thread_id: Some(self.thread_id),
            reply_id: self.reply_id,
            source: Some(self.source()),
            ..Default::default()
        }
    }
}

/// A confirmed, executable action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModerationAction {
    DeleteThread {
        thread_id: Uuid,
        owner: UserId,
    },
    DeleteReply {
        thread_id: Uuid,
        reply_id: Uuid,
        owner: UserId,
    },
    Timeout {
        target: UserId,
        duration: TimeoutDuration,
        context: ActionContext,
    },
    Ban {
        target: UserId,
        context: ActionContext,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PendingKind {
    DeleteThread { thread_id: Uuid, owner: UserId },
    DeleteReply { thread_id: Uuid, reply_id: Uuid, owner: UserId },
    Timeout { target: UserId, context: ActionContext },
    Ban { target: UserId, context: ActionContext },
}

/// The acting user, captured when the action was requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub uid: UserId,
    pub display_name: String,
}

/// An action awaiting its confirm step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAction {
    actor: Actor,
    kind: PendingKind,
}

impl PendingAction {
    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    pub fn descriptor(&self) -> DialogDescriptor {
        match &self.kind {
            PendingKind::DeleteThread { .. } => DialogDescriptor::confirm(
                "Delete thread",
                "Are you sure you want to delete this thread?",
                "Delete",
            ),
            PendingKind::DeleteReply { .. } => DialogDescriptor::confirm(
                "Delete reply",
                "Are you sure you want to delete this reply?",
                "Delete",
            ),
            PendingKind::Timeout { .. } => DialogDescriptor::menu(
                "Timeout user",
                "Choose how long this user should be unable to post.",
                TimeoutDuration::MENU.iter().map(|d| d.label),
            ),
            PendingKind::Ban { .. } => DialogDescriptor::confirm(
                "Ban user",
                "Ban this user?\nThey will no longer be able to create threads or replies.",
                "Ban",
            ),
        }
    }

    /// Turns the dialog's answer into an executable action; `None` if declined.
    pub fn resolve(self, choice: DialogChoice) -> Option<ModerationAction> {
        match (self.kind, choice) {
            (PendingKind::DeleteThread { thread_id, owner }, DialogChoice::Confirm) => {
                Some(ModerationAction::DeleteThread { thread_id, owner })
            }
            (
                PendingKind::DeleteReply {
                    thread_id,
                    reply_id,
                    owner,
                },
                DialogChoice::Confirm,
            ) => Some(ModerationAction::DeleteReply {
                thread_id,
                reply_id,
                owner,
            }),
            (PendingKind::Timeout { target, context }, DialogChoice::Pick(i)) => {
                let duration = *TimeoutDuration::MENU.get(i)?;
                Some(ModerationAction::Timeout {
                    target,
                    duration,
                    context,
                })
            }
            (PendingKind::Ban { target, context }, DialogChoice::Confirm) => {
                Some(ModerationAction::Ban { target, context })
            }
            _ => None,
        }
    }
}

/// Which controls to show on one piece of content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ItemActions {
    pub edit: bool,
    pub delete: bool,
    pub timeout: bool,
    pub ban: bool,
}

impl ItemActions {
    pub fn for_owner(session: &Session, owner: &UserId) -> Self {
        if !session.is_signed_in() {
            return Self::default();
        }
        let is_owner = session.is_self(owner);
        let staff_on_other = session.is_moderator() && !is_owner;
        Self {
            edit: is_owner,
            delete: is_owner || session.is_moderator(),
            timeout: staff_on_other,
            ban: staff_on_other && session.is_admin(),
        }
    }

    pub fn any(self) -> bool {
        self.edit || self.delete || self.timeout || self.ban
    }
}

fn actor(session: &Session) -> Result<Actor> {
    let user = session
        .user()
        .ok_or_else(|| ForumError::unauthorized("You must be logged in."))?;
    Ok(Actor {
        uid: user.uid.clone(),
        display_name: session.display_name().to_string(),
    })
}

pub fn request_delete_thread(session: &Session, thread_id: Uuid, owner: &UserId) -> Result<PendingAction> {
    let actor = actor(session)?;
    if !ItemActions::for_owner(session, owner).delete {
        return Err(ForumError::unauthorized("You can only delete your own threads."));
    }
    Ok(PendingAction {
        actor,
        kind: PendingKind::DeleteThread {
            thread_id,
            owner: owner.clone(),
        },
    })
}

pub fn request_delete_reply(
    session: &Session,
    thread_id: Uuid,
    reply_id: Uuid,
    owner: &UserId,
) -> Result<PendingAction> {
    let actor = actor(session)?;
    if !ItemActions::for_owner(session, owner).delete {
        return Err(ForumError::unauthorized("You can only delete your own replies."));
    }
    Ok(PendingAction {
        actor,
        kind: PendingKind::DeleteReply {
            thread_id,
            reply_id,
            owner: owner.clone(),
        },
    })
}

pub fn request_timeout(session: &Session, target: &UserId, context: ActionContext) -> Result<PendingAction> {
    let actor = actor(session)?;
    if !session.is_moderator() {
        return Err(ForumError::unauthorized("Only moderators can time out users."));
    }
    if session.is_self(target) {
        return Err(ForumError::unauthorized("You cannot time out yourself."));
    }
    Ok(PendingAction {
        actor,
        kind: PendingKind::Timeout {
            target: target.clone(),
            context,
        },
    })
}

pub fn request_ban(session: &Session, target: &UserId, context: ActionContext) -> Result<PendingAction> {
    let actor = actor(session)?;
    if !session.is_admin() {
        return Err(ForumError::unauthorized("Only admins can ban users."));
    }
    if session.is_self(target) {
        return Err(ForumError::unauthorized("You cannot ban yourself."));
    }
    Ok(PendingAction {
        actor,
        kind: PendingKind::Ban {
            target: target.clone(),
            context,
        },
    })
}

async fn append_log(
    store: &dyn ForumStore,
    actor: &Actor,
    action: ModerationKind,
    target: &UserId,
    details: ModerationDetails,
) -> Result<()> {
    store
        .append_moderation_log(NewModerationLogEntry {
            action,
            actor_uid: actor.uid.clone(),
            actor_display_name: actor.display_name.clone(),
            target_uid: Some(target.clone()),
            details,
        })
        .await?;
    Ok(())
}

/// Executes a confirmed action. No retry; the first failed write aborts.
pub async fn execute(store: &dyn ForumStore, actor: &Actor, action: &ModerationAction) -> Result<()> {
    let outcome = run(store, actor, action).await;
    match &outcome {
        Ok(()) => info!(actor = %actor.uid, ?action, "moderation action applied"),
        Err(e) => error!(actor = %actor.uid, ?action, error = %e, "moderation action failed"),
    }
    outcome
}

async fn run(store: &dyn ForumStore, actor: &Actor, action: &ModerationAction) -> Result<()> {
    match action {
        ModerationAction::DeleteThread { thread_id, owner } => {
            if actor.uid != *owner {
                let details = ModerationDetails {
                    thread_id: Some(*thread_id),
                    ..Default::default()
                };
                append_log(store, actor, ModerationKind::DeleteThread, owner, details).await?;
            }
            store.delete_thread(*thread_id).await?;
        }
        ModerationAction::DeleteReply {
            thread_id,
            reply_id,
            owner,
        } => {
            if actor.uid != *owner {
                let details = ModerationDetails {
                    thread_id: Some(*thread_id),
                    reply_id: Some(*reply_id),
                    ..Default::default()
                };
                append_log(store, actor, ModerationKind::DeleteReply, owner, details).await?;
            }
            store.delete_reply(*thread_id, *reply_id).await?;
            store.increment_reply_count(*thread_id, -1).await?;
        }
        ModerationAction::Timeout {
            target,
            duration,
            context,
        } => {
            let until = Utc::now() + duration.duration();
            let patch = ProfilePatch {
                muted_until: Some(Some(until)),
                ..Default::default()
            };
            store.merge_profile(target, patch).await?;
            let details = ModerationDetails {
                duration_label: Some(duration.label.to_string()),
                minutes: Some(duration.minutes),
                muted_until: Some(until),
                ..context.details()
            };
            append_log(store, actor, ModerationKind::Timeout, target, details).await?;
        }
        ModerationAction::Ban { target, context } => {
            let patch = ProfilePatch {
                banned: Some(true),
                ..Default::default()
            };
            store.merge_profile(target, patch).await?;
            append_log(store, actor, ModerationKind::Ban, target, context.details()).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kf_auth_memory::MemoryAuth;
    use kf_core::{AuthProvider, MockForumStore, ProfileRecord, Role, StoreError};
    use kf_db_memory::MemoryForumStore;
    use mockall::Sequence;

    async fn session_with(role: Role) -> Session {
        let auth = MemoryAuth::new();
        let store = MemoryForumStore::new();
        let user = auth.sign_up("staff@zion.io", "abcdef").await.unwrap();
        store.put_profile(
            &user.uid,
            ProfileRecord {
                display_name: Some("Staff".into()),
                role,
                ..Default::default()
            },
        );
        let mut session = Session::signed_out();
        session.apply_identity(&auth, &store, Some(user)).await;
        session
    }

    #[test]
    fn menu_has_eight_durations() {
        let labels: Vec<_> = TimeoutDuration::MENU.iter().map(|d| d.label).collect();
        assert_eq!(
            labels,
            ["30 minutes", "1 hour", "12 hours", "24 hours", "2 days", "7 days", "14 days", "30 days"]
        );
        assert_eq!(TimeoutDuration::MENU[4].duration(), Duration::days(2));
    }

    #[tokio::test]
    async fn item_actions_follow_role_and_ownership() {
        let other = UserId::from("someone-else");
        let plain = session_with(Role::None).await;
        assert_eq!(ItemActions::for_owner(&plain, &other), ItemActions::default());
        let own = plain.uid().cloned().unwrap();
        assert_eq!(
            ItemActions::for_owner(&plain, &own),
            ItemActions { edit: true, delete: true, timeout: false, ban: false }
        );

        let moderator = session_with(Role::Moderator).await;
        assert_eq!(
            ItemActions::for_owner(&moderator, &other),
            ItemActions { edit: false, delete: true, timeout: true, ban: false }
        );

        let admin = session_with(Role::Admin).await;
        assert!(ItemActions::for_owner(&admin, &other).ban);
        let me = admin.uid().cloned().unwrap();
        assert!(!ItemActions::for_owner(&admin, &me).timeout);
        assert!(!ItemActions::for_owner(&Session::signed_out(), &other).any());
    }

    #[tokio::test]
    async fn staff_never_target_themselves() {
        let admin = session_with(Role::Admin).await;
        let me = admin.uid().cloned().unwrap();
        let ctx = ActionContext::thread(Uuid::new_v4());
        assert!(matches!(request_timeout(&admin, &me, ctx), Err(ForumError::Unauthorized(_))));
        assert!(matches!(request_ban(&admin, &me, ctx), Err(ForumError::Unauthorized(_))));

        let moderator = session_with(Role::Moderator).await;
        let other = UserId::from("x");
        assert!(request_timeout(&moderator, &other, ctx).is_ok());
        assert!(request_ban(&moderator, &other, ctx).is_err());
    }

    #[tokio::test]
    async fn declined_or_unknown_choices_do_nothing() {
        let admin = session_with(Role::Admin).await;
        let ctx = ActionContext::thread(Uuid::new_v4());
        let pending = request_timeout(&admin, &UserId::from("x"), ctx).unwrap();
        assert_eq!(pending.clone().resolve(DialogChoice::Cancel), None);
        assert_eq!(pending.clone().resolve(DialogChoice::Pick(99)), None);
        assert!(matches!(
            pending.resolve(DialogChoice::Pick(1)),
            Some(ModerationAction::Timeout { duration, .. }) if duration.minutes == 60
        ));
    }

    #[tokio::test]
    async fn non_owner_delete_logs_before_deleting() {
        let mut store = MockForumStore::new();
        let mut seq = Sequence::new();
        let thread_id = Uuid::new_v4();
        let reply_id = Uuid::new_v4();
        store
            .expect_append_moderation_log()
            .withf(|e| e.action == ModerationKind::DeleteReply && e.target_uid == Some(UserId::from("author")))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(Uuid::new_v4()));
        store
            .expect_delete_reply()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        store
            .expect_increment_reply_count()
            .withf(move |id, delta| *id == thread_id && *delta == -1)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));

        let actor = Actor { uid: UserId::from("mod"), display_name: "Mod".into() };
        let action = ModerationAction::DeleteReply {
            thread_id,
            reply_id,
            owner: UserId::from("author"),
        };
        execute(&store, &actor, &action).await.unwrap();
    }

    #[tokio::test]
    async fn failed_log_write_prevents_delete() {
        let mut store = MockForumStore::new();
        store
            .expect_append_moderation_log()
            .returning(|_| Err(StoreError::PermissionDenied("rules".into())));
        store.expect_delete_thread().never();

        let actor = Actor { uid: UserId::from("mod"), display_name: "Mod".into() };
        let action = ModerationAction::DeleteThread {
            thread_id: Uuid::new_v4(),
            owner: UserId::from("author"),
        };
        let err = execute(&store, &actor, &action).await.unwrap_err();
        assert_eq!(err.inline_message(), "Could not save your change. Please try again.");
    }

    #[tokio::test]
    async fn owner_delete_skips_the_log() {
        let store = MemoryForumStore::new();
        let mut logs = store.watch_moderation_logs();
        let actor = Actor { uid: UserId::from("me"), display_name: "Me".into() };
        let action = ModerationAction::DeleteThread {
            thread_id: Uuid::new_v4(),
            owner: UserId::from("me"),
        };
        execute(&store, &actor, &action).await.unwrap();
        assert_eq!(logs.latest(), Some(Ok(vec![])));
    }

    #[tokio::test]
    async fn timeout_and_ban_write_profile_then_log() {
        let store = MemoryForumStore::new();
        let actor = Actor { uid: UserId::from("admin"), display_name: "Admin".into() };
        let target = UserId::from("spammer");
        let thread_id = Uuid::new_v4();
        let reply_id = Uuid::new_v4();

        let timeout = ModerationAction::Timeout {
            target: target.clone(),
            duration: TimeoutDuration::MENU[0],
            context: ActionContext::reply(thread_id, reply_id),
        };
        execute(&store, &actor, &timeout).await.unwrap();
        let ban = ModerationAction::Ban {
            target: target.clone(),
            context: ActionContext::thread(thread_id),
        };
        execute(&store, &actor, &ban).await.unwrap();

        let profile = store.get_profile(&target).await.unwrap().unwrap();
        assert!(profile.banned);
        assert!(profile.is_muted_at(Utc::now()));

        let mut logs = store.watch_moderation_logs();
        let entries = logs.latest().unwrap().unwrap();
        assert_eq!(entries[0].action, ModerationKind::Ban);
        assert_eq!(entries[1].action, ModerationKind::Timeout);
        assert_eq!(entries[1].details.duration_label.as_deref(), Some("30 minutes"));
        assert_eq!(entries[1].details.source, Some(ModerationSource::Reply));
        assert_eq!(entries[1].details.reply_id, Some(reply_id));
    }
}
