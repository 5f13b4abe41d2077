//! # Moderation Log View
//!
//! Read-only audit feed, newest first. The subscription only runs while the
//! session holds a staff role.

use kf_core::{ModerationLogEntry, SnapshotEvent, StreamSlot};
use tracing::{debug, warn};

use crate::session::{format_time, Session};
use crate::AppState;

/// `[timestamp] actor: action → user target`, target part omitted when absent.
pub fn format_line(entry: &ModerationLogEntry) -> String {
    let actor = match entry.actor_display_name.trim() {
        "" => entry.actor_uid.as_str(),
        name => name,
    };
    let target = entry
        .target_uid
        .as_ref()
        .map(|uid| format!(" → user {uid}"))
        .unwrap_or_default();
    format!(
        "[{}] {actor}: {}{target}",
        format_time(entry.created_at),
        entry.action
    )
}

#[derive(Default)]
pub struct ModerationLogView {
    stream: StreamSlot<Vec<ModerationLogEntry>>,
    entries: Vec<ModerationLogEntry>,
}

impl ModerationLogView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts the feed for staff; anyone else gets it stopped. Returns whether it runs.
    pub fn refresh_for(&mut self, app: &AppState, session: &Session) -> bool {
        if session.is_signed_in() && session.is_moderator() {
            if !self.stream.is_active() {
                self.stream.replace(app.store.watch_moderation_logs());
                debug!("moderation log feed started");
            }
            true
        } else {
            self.stop();
            false
        }
    }

    pub fn stop(&mut self) {
        self.stream.clear();
        self.entries.clear();
    }

    pub fn is_live(&self) -> bool {
        self.stream.is_active()
    }

    fn apply(&mut self, event: SnapshotEvent<Vec<ModerationLogEntry>>) -> bool {
        match event {
            Ok(entries) => {
                self.entries = entries;
                true
            }
            Err(e) => {
                warn!(error = %e, "moderation log listener error");
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

    pub fn entries(&self) -> &[ModerationLogEntry] {
        &self.entries
    }

    pub fn lines(&self) -> Vec<String> {
        self.entries.iter().map(format_line).collect()
    }
}
