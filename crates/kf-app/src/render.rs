//! Text-level presentation helpers shared by the list and detail views.

use kf_core::{Attachment, ResourceKind, UNTITLED};

/// Characters of body shown on a list card.
pub const PREVIEW_CHARS: usize = 140;

/// Blank titles read as the placeholder.
pub fn display_title(title: &str) -> &str {
    if title.trim().is_empty() {
        UNTITLED
    } else {
        title
    }
}

/// First `PREVIEW_CHARS` characters of `body`, with "..." when cut.
pub fn preview(body: &str) -> String {
    match body.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &body[..cut]),
        None => body.to_string(),
    }
}

const AUDIO_FORMATS: &[&str] = &["mp3", "wav", "ogg", "oga", "m4a", "aac", "flac", "weba"];

/// How one stored attachment is presented.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentView {
    Image { url: String },
    Video { url: String },
    Audio { url: String },
    Download { url: String, label: String },
}

impl AttachmentView {
    /// Audio is stored through the video pipeline, so the format decides.
    pub fn from_attachment(att: &Attachment) -> Self {
        let url = att.url.clone();
        let format = att.format.as_deref().unwrap_or_default().to_ascii_lowercase();
        match att.resource_kind {
            ResourceKind::Image => AttachmentView::Image { url },
            ResourceKind::Video if AUDIO_FORMATS.contains(&format.as_str()) => {
                AttachmentView::Audio { url }
            }
            ResourceKind::Video => AttachmentView::Video { url },
            ResourceKind::Raw => AttachmentView::Download {
                url,
                label: att
                    .original_filename
                    .clone()
                    .unwrap_or_else(|| "Download attachment".to_string()),
            },
        }
    }

    pub fn url(&self) -> &str {
        match self {
            AttachmentView::Image { url }
            | AttachmentView::Video { url }
            | AttachmentView::Audio { url }
            | AttachmentView::Download { url, .. } => url,
        }
    }
}

pub fn attachment_views(attachments: &[Attachment]) -> Vec<AttachmentView> {
    attachments.iter().map(AttachmentView::from_attachment).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn att(kind: ResourceKind, format: Option<&str>) -> Attachment {
        Attachment {
            url: "https://cdn/x".into(),
            public_id: None,
            resource_kind: kind,
            format: format.map(str::to_string),
            bytes: 1,
            original_filename: Some("x".into()),
        }
    }

    #[test]
    fn preview_cuts_at_140_chars() {
        let short = "a".repeat(PREVIEW_CHARS);
        assert_eq!(preview(&short), short);
        let long = "é".repeat(PREVIEW_CHARS + 1);
        assert_eq!(preview(&long), format!("{}...", "é".repeat(PREVIEW_CHARS)));
    }

    #[test]
    fn blank_title_uses_placeholder() {
        assert_eq!(display_title("   "), "(no title)");
        assert_eq!(display_title("Hello"), "Hello");
    }

    #[test]
    fn attachments_render_by_kind() {
        assert!(matches!(
            AttachmentView::from_attachment(&att(ResourceKind::Video, Some("MP3"))),
            AttachmentView::Audio { .. }
        ));
        assert!(matches!(
            AttachmentView::from_attachment(&att(ResourceKind::Video, Some("mp4"))),
            AttachmentView::Video { .. }
        ));
        assert_eq!(
            AttachmentView::from_attachment(&att(ResourceKind::Raw, None)),
            AttachmentView::Download { url: "https://cdn/x".into(), label: "x".into() }
        );
    }
}
