//! # Thread List View-Model
//!
//! Holds the latest thread-list snapshot, the client-side filter, and the
//! compose form. The visible list is re-derived from scratch by `render`
//! whenever the snapshot, the filter, or the hydrated author profiles change.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use kf_core::policy::{validate_attachment, MAX_ATTACHMENTS};
use kf_core::{
    ForumError, NewThread, Result, StreamSlot, Tag, TagSet, Thread, UploadFile,
    UploadedMedia, UserId, ANONYMOUS_NAME,
};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::profiles::{resolve_author_name, visible_avatar, PublicProfile};
use crate::render::{attachment_views, display_title, preview, AttachmentView};
use crate::session::Session;
use crate::AppState;

pub const EMPTY_LIST_MESSAGE: &str = "No threads found.";

/// Client-side filter over the thread snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadFilter {
    pub query: String,
    pub tags: TagSet,
}

impl ThreadFilter {
    /// Case-insensitive substring over title, body and author; then an
    /// inclusive-OR tag match when any tag is selected.
    pub fn matches(&self, thread: &Thread) -> bool {
        let needle = self.query.trim().to_lowercase();
        if !needle.is_empty() {
            let haystack =
                format!("{} {} {}", thread.title, thread.body, thread.author).to_lowercase();
            if !haystack.contains(&needle) {
                return false;
            }
        }
        self.tags.is_empty() || thread.tags.iter().any(|tag| self.tags.contains(tag))
    }

    /// Label of the filter button.
    pub fn label(&self) -> String {
        if self.tags.is_empty() {
            return "Tags".to_string();
        }
        let names: Vec<&str> = self.tags.iter().map(|t| t.label()).collect();
        format!("Tags: {}", names.join(", "))
    }
}

/// One rendered card in the list.
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadCard {
    pub id: Uuid,
    pub title: String,
    pub preview: String,
    pub author: String,
    pub avatar: Option<String>,
    pub uid: UserId,
    pub created: DateTime<Utc>,
    pub reply_count: i64,
    pub tags: Vec<Tag>,
    pub attachments: Vec<AttachmentView>,
}

impl ThreadCard {
    fn build(thread: &Thread, hydrated: Option<&PublicProfile>) -> Self {
        let (author, avatar) = match hydrated {
            Some(profile) => (
                profile.display_name.clone(),
                profile.avatar().map(str::to_string),
            ),
            None => {
                let author = if thread.author.trim().is_empty() {
                    ANONYMOUS_NAME.to_string()
                } else {
                    thread.author.clone()
                };
                let avatar = visible_avatar(&author, thread.author_photo_url.as_deref())
                    .map(str::to_string);
                (author, avatar)
            }
        };
        Self {
            id: thread.id,
            title: display_title(&thread.title).to_string(),
            preview: preview(&thread.body),
            author,
            avatar,
            uid: thread.uid.clone(),
            created: thread.created,
            reply_count: thread.reply_count,
            tags: thread.tags.iter().copied().collect(),
            attachments: attachment_views(&thread.attachments),
        }
    }
}

/// Pure projection of a snapshot under a filter. Snapshot order is kept.
pub fn render(
    snapshot: &[Thread],
    filter: &ThreadFilter,
    hydrated: &HashMap<UserId, PublicProfile>,
) -> Vec<ThreadCard> {
    snapshot
        .iter()
        .filter(|t| filter.matches(t))
        .map(|t| ThreadCard::build(t, hydrated.get(&t.uid)))
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum ListState {
    #[default]
    Empty,
    Populated(Vec<Thread>),
}

/// The new-thread form.
#[derive(Debug, Clone, Default)]
pub struct ComposeState {
    pub title: String,
    pub body: String,
    pub tags: TagSet,
    attachments: Vec<UploadFile>,
    pub error: Option<String>,
}

impl ComposeState {
    /// Adds picked files. Oversized or wrong-type files are skipped with an
    /// inline error; duplicates (same name and size) are ignored; the list is
    /// capped at `MAX_ATTACHMENTS`.
    pub fn pick_files(&mut self, files: impl IntoIterator<Item = UploadFile>) {
        self.error = None;
        for file in files {
            if let Err(e) = validate_attachment(&file) {
                self.error = Some(e.inline_message());
                continue;
            }
            let duplicate = self
                .attachments
                .iter()
                .any(|f| f.name == file.name && f.size() == file.size());
            if !duplicate {
                self.attachments.push(file);
            }
        }
        self.attachments.truncate(MAX_ATTACHMENTS);
    }

    pub fn remove_attachment(&mut self, index: usize) -> Option<UploadFile> {
        (index < self.attachments.len()).then(|| self.attachments.remove(index))
    }

    pub fn attachments(&self) -> &[UploadFile] {
        &self.attachments
    }

    pub fn attachment_summary(&self) -> String {
        match self.attachments.as_slice() {
            [] => String::new(),
            [only] => only.name.clone(),
            many => format!("{} files selected (max {MAX_ATTACHMENTS})", many.len()),
        }
    }

    pub fn toggle_tag(&mut self, tag: Tag) {
        if !self.tags.remove(&tag) {
            self.tags.insert(tag);
        }
    }

    /// Label of the compose tag button.
    pub fn tag_label(&self) -> String {
        match self.tags.len() {
            0 => "Tags".to_string(),
            n => format!("Tags ({n})"),
        }
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[derive(Default)]
pub struct ThreadListViewModel {
    state: ListState,
    filter: ThreadFilter,
    hydrated: HashMap<UserId, PublicProfile>,
    visible: Vec<ThreadCard>,
    stream: StreamSlot<Vec<Thread>>,
    pub compose: ComposeState,
}

impl ThreadListViewModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// (Re)opens the thread-list subscription, cancelling any previous one.
    pub fn start(&mut self, app: &AppState) {
        self.stream.replace(app.store.watch_threads());
    }

    pub fn stop(&mut self) {
        self.stream.clear();
    }

    pub fn is_live(&self) -> bool {
        self.stream.is_active()
    }

    pub fn state(&self) -> &ListState {
        &self.state
    }

    pub fn filter(&self) -> &ThreadFilter {
        &self.filter
    }

    pub fn visible(&self) -> &[ThreadCard] {
        &self.visible
    }

    /// Empty-state text, once a snapshot has arrived and nothing matches.
    pub fn empty_message(&self) -> Option<&'static str> {
        match &self.state {
            ListState::Populated(_) if self.visible.is_empty() => Some(EMPTY_LIST_MESSAGE),
            _ => None,
        }
    }

    fn recompute(&mut self) {
        self.visible = match &self.state {
            ListState::Empty => Vec::new(),
            ListState::Populated(snapshot) => render(snapshot, &self.filter, &self.hydrated),
        };
    }

    fn apply(&mut self, event: kf_core::SnapshotEvent<Vec<Thread>>) -> bool {
        match event {
            Ok(snapshot) => {
                self.state = ListState::Populated(snapshot);
                self.recompute();
                true
            }
            Err(e) => {
                warn!(error = %e, "threads feed error");
                false
            }
        }
    }

    /// Applies the newest delivered snapshot, if any. Returns true on change.
    pub fn sync(&mut self) -> bool {
        match self.stream.latest() {
            Some(event) => self.apply(event),
            None => false,
        }
    }

    /// Waits for the next delivery. `None` once the stream is gone.
    pub async fn next(&mut self) -> Option<bool> {
        let event = self.stream.next().await?;
        Some(self.apply(event))
    }

    pub fn set_query(&mut self, query: impl Into<String>) {
        self.filter.query = query.into();
        self.recompute();
    }

    pub fn set_filter_tags(&mut self, tags: TagSet) {
        self.filter.tags = tags;
        self.recompute();
    }

    pub fn toggle_filter_tag(&mut self, tag: Tag) {
        if !self.filter.tags.remove(&tag) {
            self.filter.tags.insert(tag);
        }
        self.recompute();
    }

    /// Resolves authors not yet hydrated, then re-renders. Cards are already
    /// visible with their snapshot names while this runs.
    pub async fn hydrate(&mut self, app: &AppState) {
        let ListState::Populated(snapshot) = &self.state else {
            return;
        };
        let pending: HashSet<UserId> = snapshot
            .iter()
            .map(|t| t.uid.clone())
            .filter(|uid| !self.hydrated.contains_key(uid))
            .collect();
        if pending.is_empty() {
            return;
        }
        let resolved = join_all(pending.into_iter().map(|uid| {
            let directory = app.profiles.clone();
            async move {
                let profile = directory.resolve(&uid).await;
                (uid, profile)
            }
        }))
        .await;
        for (uid, profile) in resolved {
            if let Some(profile) = profile {
                self.hydrated.insert(uid, profile);
            }
        }
        self.recompute();
    }

    /// Validates, uploads, and writes a new thread from the compose form.
    ///
    /// On success the form is cleared and the new id returned so the caller
    /// can switch to its detail view. On failure the form is left intact and
    /// its inline error set.
    pub async fn create_thread(&mut self, app: &AppState, session: &Session) -> Result<Uuid> {
        self.compose.error = None;
        match self.try_create(app, session).await {
            Ok(id) => {
                self.compose.clear();
                Ok(id)
            }
            Err(e) => {
                self.compose.error = Some(e.inline_message());
                Err(e)
            }
        }
    }

    async fn try_create(&self, app: &AppState, session: &Session) -> Result<Uuid> {
        let user = session
            .user()
            .ok_or_else(|| ForumError::unauthorized("Log in to create a thread."))?;
        if session.is_banned() {
            return Err(ForumError::unauthorized(
                "You are banned and cannot create threads or replies.",
            ));
        }
        if session.is_muted() {
            return Err(ForumError::unauthorized(
                "You are temporarily timed out and cannot post.",
            ));
        }

        let title = self.compose.title.trim();
        let body = self.compose.body.trim();
        if title.is_empty() || body.is_empty() {
            return Err(ForumError::validation("Title and body are required."));
        }
        for file in &self.compose.attachments {
            validate_attachment(file)?;
        }

        let author = resolve_author_name(app.store.as_ref(), user).await;
        let author_photo_url = visible_avatar(&author, user.photo_url.as_deref()).map(str::to_string);
        let uploaded = upload_all(app, &self.compose.attachments).await?;

        let thread = NewThread {
            title: title.to_string(),
            body: body.to_string(),
            author,
            author_photo_url,
            uid: user.uid.clone(),
            tags: self.compose.tags.clone(),
            attachments: uploaded.iter().map(UploadedMedia::to_attachment).collect(),
        };
        match app.store.add_thread(thread).await {
            Ok(id) => {
                info!(thread_id = %id, uid = %user.uid, attachments = uploaded.len(), "thread created");
                Ok(id)
            }
            Err(e) => {
                error!(uid = %user.uid, error = %e, "create thread failed");
                discard_all(app, &uploaded).await;
                Err(e.into())
            }
        }
    }
}

/// Uploads every file concurrently. If any fails, the ones that succeeded
/// are discarded and the first failure (in pick order) is returned.
pub async fn upload_all(app: &AppState, files: &[UploadFile]) -> Result<Vec<UploadedMedia>> {
    let results = join_all(files.iter().map(|f| app.media.upload(f))).await;
    let mut uploaded = Vec::with_capacity(results.len());
    let mut first_error = None;
    for result in results {
        match result {
            Ok(media) => uploaded.push(media),
            Err(e) => {
                error!(file = ?e.file_name, error = %e, "attachment upload failed");
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
    }
    match first_error {
        None => Ok(uploaded),
        Some(e) => {
            discard_all(app, &uploaded).await;
            Err(e.into())
        }
    }
}

async fn discard_all(app: &AppState, uploaded: &[UploadedMedia]) {
    let outcomes = join_all(uploaded.iter().map(|m| app.media.discard(m))).await;
    for (media, outcome) in uploaded.iter().zip(outcomes) {
        if let Err(e) = outcome {
            warn!(url = %media.url, error = %e, "orphaned upload could not be discarded");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kf_core::policy::SizeTier;
    use kf_core::{ForumStore, MockMediaHost, ResourceKind, UploadError};
    use kf_db_memory::MemoryForumStore;
    use std::sync::Arc;

    fn thread(title: &str, body: &str, author: &str, tags: &[Tag]) -> Thread {
        let now = Utc::now();
        Thread {
            id: Uuid::new_v4(),
            title: title.into(),
            body: body.into(),
            author: author.into(),
            author_photo_url: Some("https://cdn/p.png".into()),
            uid: UserId::from(author),
            created: now,
            updated: now,
            reply_count: 0,
            tags: tags.iter().copied().collect(),
            attachments: vec![],
        }
    }

    fn filter(query: &str, tags: &[Tag]) -> ThreadFilter {
        ThreadFilter {
            query: query.into(),
            tags: tags.iter().copied().collect(),
        }
    }

    fn file(name: &str, mime: &str, len: usize) -> UploadFile {
        UploadFile::new(name, mime.parse().unwrap(), vec![0u8; len])
    }

    #[test]
    fn render_is_pure_and_keeps_snapshot_order() {
        let snapshot = vec![
            thread("b", "second", "neo", &[Tag::Art]),
            thread("a", "first", "trinity", &[]),
        ];
        let f = filter("", &[]);
        let hydrated = HashMap::new();
        let once = render(&snapshot, &f, &hydrated);
        assert_eq!(once, render(&snapshot, &f, &hydrated));
        assert_eq!(once.iter().map(|c| c.title.as_str()).collect::<Vec<_>>(), ["b", "a"]);
    }

    #[test]
    fn tag_filter_is_inclusive_or() {
        let tagged = vec![thread("t", "x", "neo", &[Tag::Art, Tag::Meme])];
        let none = HashMap::new();
        assert_eq!(render(&tagged, &filter("", &[Tag::Meme, Tag::Other]), &none).len(), 1);
        assert_eq!(render(&tagged, &filter("", &[]), &none).len(), 1);
        assert!(render(&tagged, &filter("", &[Tag::Question, Tag::Other]), &none).is_empty());

        let untagged = vec![thread("u", "x", "neo", &[])];
        assert!(render(&untagged, &filter("", &[Tag::Other]), &none).is_empty());
    }

    #[test]
    fn text_query_covers_title_body_author() {
        let snapshot = vec![
            thread("Kino", "plain", "neo", &[]),
            thread("x", "Has KINO inside", "neo", &[]),
            thread("x", "y", "kinofan", &[]),
            thread("x", "y", "neo", &[]),
        ];
        assert_eq!(render(&snapshot, &filter("  kino ", &[]), &HashMap::new()).len(), 3);
    }

    #[test]
    fn cards_fall_back_and_hide_anonymous_avatars() {
        let mut t = thread("", &"x".repeat(200), "Anonymous", &[]);
        t.author_photo_url = Some("https://cdn/secret.png".into());
        let card = &render(&[t.clone()], &ThreadFilter::default(), &HashMap::new())[0];
        assert_eq!(card.title, "(no title)");
        assert!(card.preview.ends_with("..."));
        assert_eq!(card.avatar, None);

        let mut hydrated = HashMap::new();
        hydrated.insert(t.uid.clone(), PublicProfile::new("Neo", Some("https://cdn/n.png".into())));
        let card = &render(&[t], &ThreadFilter::default(), &hydrated)[0];
        assert_eq!(card.author, "Neo");
        assert_eq!(card.avatar.as_deref(), Some("https://cdn/n.png"));
    }

    #[test]
    fn filter_labels() {
        assert_eq!(filter("", &[]).label(), "Tags");
        assert_eq!(filter("", &[Tag::Meme, Tag::Question]).label(), "Tags: Question, Meme");
        let mut compose = ComposeState::default();
        assert_eq!(compose.tag_label(), "Tags");
        compose.toggle_tag(Tag::Art);
        compose.toggle_tag(Tag::Other);
        compose.toggle_tag(Tag::Other);
        assert_eq!(compose.tag_label(), "Tags (1)");
    }

    #[test]
    fn picking_files_validates_dedupes_and_caps() {
        let mut compose = ComposeState::default();
        compose.pick_files([file("a.png", "image/png", 10), file("a.png", "image/png", 10)]);
        assert_eq!(compose.attachment_summary(), "a.png");

        let too_big = SizeTier::ATTACHMENT.max_bytes() as usize + 1;
        compose.pick_files([file("huge.png", "image/png", too_big)]);
        assert_eq!(compose.error.as_deref(), Some("\"huge.png\" exceeds size limit (20MB)."));
        assert_eq!(compose.attachments().len(), 1);

        compose.pick_files((0..6).map(|i| file(&format!("{i}.mp4"), "video/mp4", 5)));
        assert_eq!(compose.attachments().len(), MAX_ATTACHMENTS);
        assert_eq!(compose.attachment_summary(), "5 files selected (max 5)");
        assert!(compose.error.is_none());

        assert_eq!(compose.remove_attachment(0).map(|f| f.name), Some("a.png".into()));
        assert!(compose.remove_attachment(10).is_none());
    }

    #[tokio::test]
    async fn empty_then_populated_and_empty_message() {
        let store = MemoryForumStore::new();
        let app = AppState::new(Arc::new(store.clone()), Arc::new(kf_auth_memory::MemoryAuth::new()), Arc::new(MockMediaHost::new()));
        let mut list = ThreadListViewModel::new();
        assert_eq!(list.state(), &ListState::Empty);
        assert_eq!(list.empty_message(), None);

        list.start(&app);
        assert!(list.sync());
        assert_eq!(list.state(), &ListState::Populated(vec![]));
        assert_eq!(list.empty_message(), Some(EMPTY_LIST_MESSAGE));

        list.start(&app);
        assert_eq!(store.active_watchers(), 1);
        list.stop();
        assert_eq!(store.active_watchers(), 0);
    }

    #[tokio::test]
    async fn snapshot_survives_a_trailing_feed_error() {
        let store = MemoryForumStore::new();
        let app = AppState::new(Arc::new(store.clone()), Arc::new(kf_auth_memory::MemoryAuth::new()), Arc::new(MockMediaHost::new()));
        let mut list = ThreadListViewModel::new();
        list.start(&app);
        list.sync();

        store
            .add_thread(NewThread {
                title: "Hello".into(),
                body: "World".into(),
                author: "Neo".into(),
                author_photo_url: None,
                uid: "neo".into(),
                tags: TagSet::new(),
                attachments: vec![],
            })
            .await
            .unwrap();
        store.break_subscriptions(kf_core::StoreError::Unavailable("offline".into()));

        assert!(list.sync());
        assert_eq!(list.visible().len(), 1);
        assert_eq!(list.visible()[0].title, "Hello");
    }

    fn uploaded(name: &str) -> UploadedMedia {
        UploadedMedia {
            url: format!("https://cdn/{name}"),
            public_id: Some(name.into()),
            resource_kind: ResourceKind::Image,
            format: Some("png".into()),
            bytes: 3,
            original_filename: Some(name.into()),
            delete_token: Some(format!("tok-{name}")),
        }
    }

    #[tokio::test]
    async fn upload_failure_discards_successful_uploads() {
        let mut media = MockMediaHost::new();
        media.expect_upload().returning(|f| {
            if f.name == "bad.png" {
                Err(UploadError::new("Invalid image file").for_file("bad.png"))
            } else {
                Ok(uploaded(&f.name))
            }
        });
        media
            .expect_discard()
            .withf(|m| m.url == "https://cdn/good.png")
            .times(1)
            .returning(|_| Ok(()));

        let app = AppState::new(
            Arc::new(MemoryForumStore::new()),
            Arc::new(kf_auth_memory::MemoryAuth::new()),
            Arc::new(media),
        );
        let files = [file("good.png", "image/png", 3), file("bad.png", "image/png", 3)];
        let err = upload_all(&app, &files).await.unwrap_err();
        assert_eq!(err.inline_message(), "Invalid image file");
    }
}
