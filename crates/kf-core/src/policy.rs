//! Upload policy: which files may be attached, how large they may be, and
//! which media-host pipeline receives them. Checked before any network call.

use mime::Mime;

use crate::error::{ForumError, Result};
use crate::models::{ResourceKind, UploadFile};

/// Attachments per thread.
pub const MAX_ATTACHMENTS: usize = 5;

const MB: u64 = 1024 * 1024;

/// A size ceiling and the label shown when it is exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeTier {
    pub max_mb: u64,
    pub label: &'static str,
}

impl SizeTier {
    pub const AVATAR: SizeTier = SizeTier { max_mb: 2, label: "2MB" };
    pub const ATTACHMENT: SizeTier = SizeTier { max_mb: 20, label: "20MB" };
    pub const GIF: SizeTier = SizeTier { max_mb: 50, label: "50MB (GIF)" };
    pub const AUDIO_VIDEO: SizeTier = SizeTier { max_mb: 50, label: "50MB (video/audio)" };

    pub fn max_bytes(self) -> u64 {
        self.max_mb * MB
    }

    /// Exactly at the ceiling is allowed.
    pub fn admits(self, size: u64) -> bool {
        size <= self.max_bytes()
    }
}

fn is_audio_or_video(mime: &Mime) -> bool {
    mime.type_() == mime::VIDEO || mime.type_() == mime::AUDIO
}

/// Tier for a thread attachment of the given type.
pub fn attachment_tier(mime: &Mime) -> SizeTier {
    if mime.type_() == mime::IMAGE && mime.subtype() == mime::GIF {
        SizeTier::GIF
    } else if is_audio_or_video(mime) {
        SizeTier::AUDIO_VIDEO
    } else {
        SizeTier::ATTACHMENT
    }
}

/// Media-host pipeline for a type. Audio rides the video pipeline.
pub fn resource_kind_for(mime: &Mime) -> ResourceKind {
    if is_audio_or_video(mime) {
        ResourceKind::Video
    } else if mime.type_() == mime::IMAGE {
        ResourceKind::Image
    } else {
        ResourceKind::Raw
    }
}

/// Attachments must be image, video or audio and fit their tier.
pub fn validate_attachment(file: &UploadFile) -> Result<()> {
    let kind = file.mime.type_();
    if kind != mime::IMAGE && !is_audio_or_video(&file.mime) {
        return Err(ForumError::validation(format!(
            "\"{}\" is not an image, video or audio file.",
            file.name
        )));
    }
    let tier = attachment_tier(&file.mime);
    if !tier.admits(file.size()) {
        return Err(ForumError::validation(format!(
            "\"{}\" exceeds size limit ({}).",
            file.name, tier.label
        )));
    }
    Ok(())
}

/// Avatars must be images of at most 2MB.
pub fn validate_avatar(file: &UploadFile) -> Result<()> {
    if file.mime.type_() != mime::IMAGE {
        return Err(ForumError::validation("Please select a valid image file."));
    }
    if !SizeTier::AVATAR.admits(file.size()) {
        return Err(ForumError::validation(format!(
            "Image size must be under {}.",
            SizeTier::AVATAR.label
        )));
    }
    Ok(())
}
