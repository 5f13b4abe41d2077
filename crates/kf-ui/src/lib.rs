//! kino-forum/crates/kf-ui/src/lib.rs
//!
//! Server-side HTML for the forum sections, rendered with askama from the
//! view-models in `kf-app`. Everything user-authored is escaped; multi-line
//! bodies keep their line breaks.

use askama::Template;
use kf_app::modlog::ModerationLogView;
use kf_app::render::AttachmentView;
use kf_app::session::{format_time, Session};
use kf_app::thread_detail::{ReplyView, ThreadHeader};
use kf_app::thread_list::{ComposeState, ThreadCard};
use kf_app::updates::UpdateCard;
use kf_app::ForumApp;
use kf_core::policy::MAX_ATTACHMENTS;
use kf_core::Tag;

/// Escapes `text` and turns each line break into `<br>`.
pub fn format_multiline(text: &str) -> String {
    let normalized = text.replace("\r\n", "\n");
    html_escape::encode_text(&normalized).replace('\n', "<br>")
}

fn tag_labels<'a>(tags: impl IntoIterator<Item = &'a Tag>) -> Vec<&'static str> {
    tags.into_iter().map(|t| t.label()).collect()
}

pub struct MediaHtml {
    pub kind: &'static str,
    pub url: String,
    pub label: String,
}

impl From<&AttachmentView> for MediaHtml {
    fn from(view: &AttachmentView) -> Self {
        let (kind, label) = match view {
            AttachmentView::Image { .. } => ("image", String::new()),
            AttachmentView::Video { .. } => ("video", String::new()),
            AttachmentView::Audio { .. } => ("audio", String::new()),
            AttachmentView::Download { label, .. } => ("download", label.clone()),
        };
        Self {
            kind,
            url: view.url().to_string(),
            label,
        }
    }
}

fn media(views: &[AttachmentView]) -> Vec<MediaHtml> {
    views.iter().map(MediaHtml::from).collect()
}

pub struct CardHtml {
    pub id: String,
    pub title: String,
    pub preview: String,
    pub author: String,
    /// Empty when no avatar is shown.
    pub avatar: String,
    pub created: String,
    pub reply_count: i64,
    pub tags: Vec<&'static str>,
    pub media: Vec<MediaHtml>,
}

impl From<&ThreadCard> for CardHtml {
    fn from(card: &ThreadCard) -> Self {
        Self {
            id: card.id.to_string(),
            title: card.title.clone(),
            preview: card.preview.clone(),
            author: card.author.clone(),
            avatar: card.avatar.clone().unwrap_or_default(),
            created: format_time(card.created),
            reply_count: card.reply_count,
            tags: tag_labels(&card.tags),
            media: media(&card.attachments),
        }
    }
}

pub struct TagOption {
    pub label: &'static str,
    pub checked: bool,
}

/// The new-thread form as last edited.
#[derive(Default)]
pub struct ComposeHtml {
    pub title: String,
    pub body: String,
    pub tag_label: String,
    pub tags: Vec<TagOption>,
    pub attachment_summary: String,
    pub max_attachments: usize,
    pub error: String,
}

impl From<&ComposeState> for ComposeHtml {
    fn from(compose: &ComposeState) -> Self {
        Self {
            title: compose.title.clone(),
            body: compose.body.clone(),
            tag_label: compose.tag_label(),
            tags: Tag::ALL
                .into_iter()
                .map(|tag| TagOption {
                    label: tag.label(),
                    checked: compose.tags.contains(&tag),
                })
                .collect(),
            attachment_summary: compose.attachment_summary(),
            max_attachments: MAX_ATTACHMENTS,
            error: compose.error.clone().unwrap_or_default(),
        }
    }
}

#[derive(Template)]
#[template(path = "thread_list.html")]
pub struct ThreadListPage {
    pub status_line: String,
    pub filter_label: String,
    pub empty_message: String,
    pub can_create_thread: bool,
    pub compose: ComposeHtml,
    pub cards: Vec<CardHtml>,
}

impl ThreadListPage {
    pub fn new(
        status_line: impl Into<String>,
        filter_label: impl Into<String>,
        cards: &[ThreadCard],
        empty_message: Option<&str>,
    ) -> Self {
        Self {
            status_line: status_line.into(),
            filter_label: filter_label.into(),
            empty_message: empty_message.unwrap_or_default().to_string(),
            can_create_thread: false,
            compose: ComposeHtml::default(),
            cards: cards.iter().map(CardHtml::from).collect(),
        }
    }

    /// Shows the compose form when `can_create_thread` holds.
    pub fn with_compose(mut self, compose: &ComposeState, can_create_thread: bool) -> Self {
        self.can_create_thread = can_create_thread;
        self.compose = ComposeHtml::from(compose);
        self
    }

    pub fn from_app(app: &ForumApp) -> Self {
        Self::new(
            app.status_line(),
            app.list.filter().label(),
            app.list.visible(),
            app.list.empty_message(),
        )
        .with_compose(&app.list.compose, app.capabilities().can_create_thread)
    }
}

pub struct ReplyHtml {
    pub id: String,
    pub author: String,
    pub avatar: String,
    pub created: String,
    pub edited: bool,
    pub text_html: String,
    pub can_edit: bool,
    pub can_delete: bool,
    pub can_timeout: bool,
    pub can_ban: bool,
}

impl From<&ReplyView> for ReplyHtml {
    fn from(reply: &ReplyView) -> Self {
        Self {
            id: reply.id.to_string(),
            author: reply.author.clone(),
            avatar: reply.avatar.clone().unwrap_or_default(),
            created: format_time(reply.created),
            edited: reply.edited,
            text_html: format_multiline(&reply.text),
            can_edit: reply.actions.edit,
            can_delete: reply.actions.delete,
            can_timeout: reply.actions.timeout,
            can_ban: reply.actions.ban,
        }
    }
}

#[derive(Template)]
#[template(path = "thread.html")]
pub struct ThreadPage {
    pub id: String,
    pub title: String,
    pub author: String,
    pub avatar: String,
    pub created: String,
    pub reply_count: i64,
    pub tags: Vec<&'static str>,
    pub body_html: String,
    pub media: Vec<MediaHtml>,
    pub can_edit: bool,
    pub can_delete: bool,
    pub can_timeout: bool,
    pub can_ban: bool,
    pub can_reply: bool,
    pub error: String,
    pub replies: Vec<ReplyHtml>,
}

impl ThreadPage {
    pub fn new(header: &ThreadHeader, replies: &[ReplyView], can_reply: bool, error: Option<&str>) -> Self {
        Self {
            id: header.id.to_string(),
            title: header.title.clone(),
            author: header.author.clone(),
            avatar: header.avatar.clone().unwrap_or_default(),
            created: format_time(header.created),
            reply_count: header.reply_count,
            tags: tag_labels(&header.tags),
            body_html: format_multiline(&header.body),
            media: media(&header.attachments),
            can_edit: header.actions.edit,
            can_delete: header.actions.delete,
            can_timeout: header.actions.timeout,
            can_ban: header.actions.ban,
            can_reply,
            error: error.unwrap_or_default().to_string(),
            replies: replies.iter().map(ReplyHtml::from).collect(),
        }
    }

    /// `None` while no thread is open or its first snapshot is pending.
    pub fn from_app(app: &ForumApp) -> Option<Self> {
        let session = app.session();
        let header = app.detail.header(session)?;
        Some(Self::new(
            &header,
            &app.detail.reply_views(session),
            app.capabilities().can_reply,
            app.detail.error.as_deref(),
        ))
    }
}

#[derive(Template)]
#[template(path = "modlog.html")]
pub struct ModerationLogPage {
    pub lines: Vec<String>,
}

impl ModerationLogPage {
    pub fn new(view: &ModerationLogView) -> Self {
        Self { lines: view.lines() }
    }
}

pub struct UpdateHtml {
    pub id: String,
    pub author: String,
    pub created: String,
    pub body_html: String,
    pub can_delete: bool,
}

impl From<&UpdateCard> for UpdateHtml {
    fn from(card: &UpdateCard) -> Self {
        Self {
            id: card.id.to_string(),
            author: card.author.clone(),
            created: format_time(card.created),
            body_html: format_multiline(&card.body),
            can_delete: card.can_delete,
        }
    }
}

#[derive(Template)]
#[template(path = "updates.html")]
pub struct SiteUpdatesPage {
    pub can_post: bool,
    pub empty_message: String,
    pub updates: Vec<UpdateHtml>,
}

impl SiteUpdatesPage {
    pub fn new(cards: &[UpdateCard], session: &Session, empty_message: Option<&str>) -> Self {
        Self {
            can_post: session.is_signed_in() && session.is_admin(),
            empty_message: empty_message.unwrap_or_default().to_string(),
            updates: cards.iter().map(UpdateHtml::from).collect(),
        }
    }

    pub fn from_app(app: &ForumApp) -> Self {
        Self::new(
            &app.updates.cards(app.session()),
            app.session(),
            app.updates.empty_message(),
        )
    }
}
