//! # kf-db-memory
//!
//! In-process implementation of `ForumStore` with the same observable
//! contract as the hosted document database: server-assigned ids and
//! timestamps, merge writes, atomic increments, and live queries that push a
//! full ordered snapshot to every watcher after each committed write.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kf_core::{
    ForumStore, ModerationLogEntry, NewModerationLogEntry, NewReply, NewSiteUpdate, NewThread,
    ProfilePatch, ProfileRecord, Reply, SiteUpdate, SnapshotSender, StoreError, Subscription,
    Thread, ThreadEdit, UserId,
};
use tracing::{debug, warn};
use uuid::Uuid;

/// Write operations that can be made to fail, for exercising error paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteKind {
    MergeProfile,
    AddThread,
    UpdateThread,
    DeleteThread,
    IncrementReplyCount,
    AddReply,
    UpdateReply,
    DeleteReply,
    AddSiteUpdate,
    DeleteSiteUpdate,
    AppendModerationLog,
}

enum WatchQuery {
    Threads(SnapshotSender<Vec<Thread>>),
    Thread(Uuid, SnapshotSender<Option<Thread>>),
    Replies(Uuid, SnapshotSender<Vec<Reply>>),
    SiteUpdates(SnapshotSender<Vec<SiteUpdate>>),
    ModerationLogs(SnapshotSender<Vec<ModerationLogEntry>>),
}

struct Watcher {
    id: u64,
    query: WatchQuery,
}

/// A stored document plus its insertion sequence, used to break timestamp ties.
struct Row<T> {
    seq: u64,
    doc: T,
}

#[derive(Default)]
struct Inner {
    users: HashMap<UserId, ProfileRecord>,
    threads: HashMap<Uuid, Row<Thread>>,
    replies: HashMap<Uuid, Vec<Row<Reply>>>,
    site_updates: Vec<Row<SiteUpdate>>,
    moderation_logs: Vec<Row<ModerationLogEntry>>,
    watchers: Vec<Watcher>,
    next_seq: u64,
    next_watcher: u64,
    last_timestamp: Option<DateTime<Utc>>,
    failing: HashSet<WriteKind>,
}

impl Inner {
    fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    /// Server timestamp; strictly increasing so ordering queries are total.
    fn server_time(&mut self) -> DateTime<Utc> {
        let mut now = Utc::now();
        if let Some(last) = self.last_timestamp {
            if now <= last {
                now = last + chrono::Duration::microseconds(1);
            }
        }
        self.last_timestamp = Some(now);
        now
    }

    fn check(&self, kind: WriteKind) -> Result<(), StoreError> {
        if self.failing.contains(&kind) {
            return Err(StoreError::PermissionDenied(format!("{kind:?} rejected")));
        }
        Ok(())
    }

    fn threads_snapshot(&self) -> Vec<Thread> {
        let mut rows: Vec<&Row<Thread>> = self.threads.values().collect();
        rows.sort_by(|a, b| b.doc.created.cmp(&a.doc.created).then(b.seq.cmp(&a.seq)));
        rows.into_iter().map(|r| r.doc.clone()).collect()
    }

    fn thread_snapshot(&self, id: Uuid) -> Option<Thread> {
        self.threads.get(&id).map(|r| r.doc.clone())
    }

    fn replies_snapshot(&self, thread_id: Uuid) -> Vec<Reply> {
        let mut rows: Vec<&Row<Reply>> = self
            .replies
            .get(&thread_id)
            .map(|rows| rows.iter().collect())
            .unwrap_or_default();
        rows.sort_by(|a, b| a.doc.created.cmp(&b.doc.created).then(a.seq.cmp(&b.seq)));
        rows.into_iter().map(|r| r.doc.clone()).collect()
    }

    fn site_updates_snapshot(&self) -> Vec<SiteUpdate> {
        newest_first(&self.site_updates, |u| u.created)
    }

    fn moderation_logs_snapshot(&self) -> Vec<ModerationLogEntry> {
        newest_first(&self.moderation_logs, |e| e.created_at)
    }

    /// Pushes a fresh snapshot to every watcher; drops watchers whose handle is gone.
    fn notify(&mut self) {
        let mut watchers = std::mem::take(&mut self.watchers);
        watchers.retain(|w| self.deliver(&w.query));
        self.watchers = watchers;
    }

    fn deliver(&self, query: &WatchQuery) -> bool {
        match query {
            WatchQuery::Threads(tx) => tx.send(Ok(self.threads_snapshot())).is_ok(),
            WatchQuery::Thread(id, tx) => tx.send(Ok(self.thread_snapshot(*id))).is_ok(),
            WatchQuery::Replies(id, tx) => tx.send(Ok(self.replies_snapshot(*id))).is_ok(),
            WatchQuery::SiteUpdates(tx) => tx.send(Ok(self.site_updates_snapshot())).is_ok(),
            WatchQuery::ModerationLogs(tx) => tx.send(Ok(self.moderation_logs_snapshot())).is_ok(),
        }
    }

    fn broadcast_error(&mut self, error: StoreError) {
        self.watchers.retain(|w| match &w.query {
            WatchQuery::Threads(tx) => tx.send(Err(error.clone())).is_ok(),
            WatchQuery::Thread(_, tx) => tx.send(Err(error.clone())).is_ok(),
            WatchQuery::Replies(_, tx) => tx.send(Err(error.clone())).is_ok(),
            WatchQuery::SiteUpdates(tx) => tx.send(Err(error.clone())).is_ok(),
            WatchQuery::ModerationLogs(tx) => tx.send(Err(error.clone())).is_ok(),
        });
    }
}

fn newest_first<T: Clone>(rows: &[Row<T>], created: impl Fn(&T) -> DateTime<Utc>) -> Vec<T> {
    let mut sorted: Vec<&Row<T>> = rows.iter().collect();
    sorted.sort_by(|a, b| created(&b.doc).cmp(&created(&a.doc)).then(b.seq.cmp(&a.seq)));
    sorted.into_iter().map(|r| r.doc.clone()).collect()
}

/// Shared, cloneable handle to one in-memory database.
#[derive(Clone, Default)]
pub struct MemoryForumStore {
    inner: Arc<Mutex<Inner>>,
    profile_reads: Arc<AtomicUsize>,
    read_delay: Arc<Mutex<Option<Duration>>>,
}

impl MemoryForumStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes every write of `kind` fail with a permission error until cleared.
    pub fn fail_writes(&self, kind: WriteKind) {
        self.lock().failing.insert(kind);
    }

    pub fn clear_failures(&self) {
        self.lock().failing.clear();
    }

    /// Number of profile document reads served so far.
    pub fn profile_reads(&self) -> usize {
        self.profile_reads.load(Ordering::SeqCst)
    }

    /// Delays every profile read, widening the window for concurrent lookups.
    pub fn set_read_delay(&self, delay: Option<Duration>) {
        *self.read_delay.lock().unwrap_or_else(PoisonError::into_inner) = delay;
    }

    /// Seeds or replaces a profile document directly (staff tooling, fixtures).
    pub fn put_profile(&self, uid: &UserId, profile: ProfileRecord) {
        self.lock().users.insert(uid.clone(), profile);
    }

    /// Pushes an error on every live query's error channel.
    pub fn break_subscriptions(&self, error: StoreError) {
        self.lock().broadcast_error(error);
    }

    pub fn active_watchers(&self) -> usize {
        self.lock().watchers.len()
    }

    fn unwatcher(&self, id: u64) -> impl FnOnce() + Send + Sync + 'static {
        let inner = Arc::clone(&self.inner);
        move || {
            let mut inner = inner.lock().unwrap_or_else(PoisonError::into_inner);
            inner.watchers.retain(|w| w.id != id);
        }
    }

    fn subscribe<T>(
        &self,
        label: &'static str,
        query: impl FnOnce(SnapshotSender<T>) -> WatchQuery,
    ) -> Subscription<T> {
        let id = {
            let mut inner = self.lock();
            inner.next_watcher += 1;
            inner.next_watcher
        };
        let (tx, sub) = Subscription::channel(label, self.unwatcher(id));
        let query = query(tx);
        let mut inner = self.lock();
        if inner.deliver(&query) {
            inner.watchers.push(Watcher { id, query });
        }
        debug!(subscription = label, watcher = id, "live query opened");
        sub
    }

    /// Runs a write under the lock, then fans out snapshots.
    fn write<R>(
        &self,
        kind: WriteKind,
        op: impl FnOnce(&mut Inner) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        let mut inner = self.lock();
        if let Err(e) = inner.check(kind) {
            warn!(write = ?kind, error = %e, "write rejected");
            return Err(e);
        }
        let out = op(&mut inner)?;
        inner.notify();
        Ok(out)
    }
}

#[async_trait]
impl ForumStore for MemoryForumStore {
    async fn get_profile(&self, uid: &UserId) -> Result<Option<ProfileRecord>, StoreError> {
        self.profile_reads.fetch_add(1, Ordering::SeqCst);
        let delay = *self.read_delay.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.lock().users.get(uid).cloned())
    }

    async fn merge_profile(&self, uid: &UserId, patch: ProfilePatch) -> Result<(), StoreError> {
        self.write(WriteKind::MergeProfile, |inner| {
            let now = inner.server_time();
            inner.users.entry(uid.clone()).or_default().merge(&patch, now);
            Ok(())
        })
    }

    async fn add_thread(&self, thread: NewThread) -> Result<Uuid, StoreError> {
        self.write(WriteKind::AddThread, |inner| {
            let now = inner.server_time();
            let seq = inner.next_seq();
            let id = Uuid::now_v7();
            let doc = Thread {
                id,
                title: thread.title,
                body: thread.body,
                author: thread.author,
                author_photo_url: thread.author_photo_url,
                uid: thread.uid,
                created: now,
                updated: now,
                reply_count: 0,
                tags: thread.tags,
                attachments: thread.attachments,
            };
            inner.threads.insert(id, Row { seq, doc });
            debug!(thread_id = %id, "thread added");
            Ok(id)
        })
    }

    async fn update_thread(&self, id: Uuid, edit: ThreadEdit) -> Result<(), StoreError> {
        self.write(WriteKind::UpdateThread, |inner| {
            let now = inner.server_time();
            let row = inner
                .threads
                .get_mut(&id)
                .ok_or_else(|| StoreError::NotFound(format!("threads/{id}")))?;
            row.doc.title = edit.title;
            row.doc.body = edit.body;
            row.doc.updated = now;
            Ok(())
        })
    }

    async fn delete_thread(&self, id: Uuid) -> Result<(), StoreError> {
        self.write(WriteKind::DeleteThread, |inner| {
            inner.threads.remove(&id);
            inner.replies.remove(&id);
            debug!(thread_id = %id, "thread deleted");
            Ok(())
        })
    }

    async fn increment_reply_count(&self, id: Uuid, delta: i64) -> Result<(), StoreError> {
        self.write(WriteKind::IncrementReplyCount, |inner| {
            let now = inner.server_time();
            let row = inner
                .threads
                .get_mut(&id)
                .ok_or_else(|| StoreError::NotFound(format!("threads/{id}")))?;
            row.doc.reply_count += delta;
            row.doc.updated = now;
            Ok(())
        })
    }

    async fn add_reply(&self, thread_id: Uuid, reply: NewReply) -> Result<Uuid, StoreError> {
        self.write(WriteKind::AddReply, |inner| {
            let now = inner.server_time();
            let seq = inner.next_seq();
            let id = Uuid::now_v7();
            let doc = Reply {
                id,
                thread_id,
                text: reply.text,
                author: reply.author,
                author_photo_url: reply.author_photo_url,
                uid: reply.uid,
                created: now,
                updated: now,
            };
            inner.replies.entry(thread_id).or_default().push(Row { seq, doc });
            Ok(id)
        })
    }

    async fn update_reply(&self, thread_id: Uuid, reply_id: Uuid, text: String) -> Result<(), StoreError> {
        self.write(WriteKind::UpdateReply, |inner| {
            let now = inner.server_time();
            let row = inner
                .replies
                .get_mut(&thread_id)
                .and_then(|rows| rows.iter_mut().find(|r| r.doc.id == reply_id))
                .ok_or_else(|| StoreError::NotFound(format!("threads/{thread_id}/replies/{reply_id}")))?;
            row.doc.text = text;
            row.doc.updated = now;
            Ok(())
        })
    }

    async fn delete_reply(&self, thread_id: Uuid, reply_id: Uuid) -> Result<(), StoreError> {
        self.write(WriteKind::DeleteReply, |inner| {
            if let Some(rows) = inner.replies.get_mut(&thread_id) {
                rows.retain(|r| r.doc.id != reply_id);
            }
            Ok(())
        })
    }

    async fn add_site_update(&self, update: NewSiteUpdate) -> Result<Uuid, StoreError> {
        self.write(WriteKind::AddSiteUpdate, |inner| {
            let created = inner.server_time();
            let seq = inner.next_seq();
            let id = Uuid::now_v7();
            inner.site_updates.push(Row {
                seq,
                doc: SiteUpdate {
                    id,
                    body: update.body,
                    author: update.author,
                    uid: update.uid,
                    created,
                },
            });
            Ok(id)
        })
    }

    async fn delete_site_update(&self, id: Uuid) -> Result<(), StoreError> {
        self.write(WriteKind::DeleteSiteUpdate, |inner| {
            inner.site_updates.retain(|r| r.doc.id != id);
            Ok(())
        })
    }

    async fn append_moderation_log(&self, entry: NewModerationLogEntry) -> Result<Uuid, StoreError> {
        self.write(WriteKind::AppendModerationLog, |inner| {
            let created_at = inner.server_time();
            let seq = inner.next_seq();
            let id = Uuid::now_v7();
            inner.moderation_logs.push(Row {
                seq,
                doc: ModerationLogEntry {
                    id,
                    action: entry.action,
                    actor_uid: entry.actor_uid,
                    actor_display_name: entry.actor_display_name,
                    target_uid: entry.target_uid,
                    details: entry.details,
                    created_at,
                },
            });
            debug!(log_id = %id, action = %entry.action, "moderation log appended");
            Ok(id)
        })
    }

    fn watch_threads(&self) -> Subscription<Vec<Thread>> {
        self.subscribe("threads", WatchQuery::Threads)
    }

    fn watch_thread(&self, id: Uuid) -> Subscription<Option<Thread>> {
        self.subscribe("thread", move |tx| WatchQuery::Thread(id, tx))
    }

    fn watch_replies(&self, thread_id: Uuid) -> Subscription<Vec<Reply>> {
        self.subscribe("replies", move |tx| WatchQuery::Replies(thread_id, tx))
    }

    fn watch_site_updates(&self) -> Subscription<Vec<SiteUpdate>> {
        self.subscribe("site_updates", WatchQuery::SiteUpdates)
    }

    fn watch_moderation_logs(&self) -> Subscription<Vec<ModerationLogEntry>> {
        self.subscribe("moderationLogs", WatchQuery::ModerationLogs)
    }
}
