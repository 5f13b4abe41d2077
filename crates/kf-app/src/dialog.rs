//! Modal dialog host. One reusable modal, parameterized by a descriptor; the
//! caller awaits the user's choice. Closing the host (sign-out) resolves every
//! open dialog as cancelled.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{oneshot, Notify};
use tracing::debug;

/// What the user clicked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogChoice {
    Confirm,
    Cancel,
    /// Index into a menu of options.
    Pick(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogButton {
    pub label: String,
    pub choice: DialogChoice,
}

impl DialogButton {
    pub fn new(label: impl Into<String>, choice: DialogChoice) -> Self {
        Self {
            label: label.into(),
            choice,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogDescriptor {
    pub title: String,
    pub body: String,
    pub buttons: Vec<DialogButton>,
}

impl DialogDescriptor {
    /// The standard confirm/cancel pair.
    pub fn confirm(title: impl Into<String>, body: impl Into<String>, confirm_label: &str) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            buttons: vec![
                DialogButton::new(confirm_label, DialogChoice::Confirm),
                DialogButton::new("Cancel", DialogChoice::Cancel),
            ],
        }
    }

    /// One button per option, followed by Cancel.
    pub fn menu<'a>(
        title: impl Into<String>,
        body: impl Into<String>,
        options: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        let mut buttons: Vec<DialogButton> = options
            .into_iter()
            .enumerate()
            .map(|(i, label)| DialogButton::new(label, DialogChoice::Pick(i)))
            .collect();
        buttons.push(DialogButton::new("Cancel", DialogChoice::Cancel));
        Self {
            title: title.into(),
            body: body.into(),
            buttons,
        }
    }
}

struct OpenDialog {
    id: u64,
    descriptor: DialogDescriptor,
    reply: oneshot::Sender<DialogChoice>,
}

#[derive(Default)]
struct HostInner {
    open: Vec<OpenDialog>,
    next_id: u64,
}

/// Awaitable result of one dialog.
#[derive(Debug)]
pub struct DialogHandle {
    pub id: u64,
    rx: oneshot::Receiver<DialogChoice>,
}

impl DialogHandle {
    /// A dialog closed without an answer counts as cancelled.
    pub async fn choice(self) -> DialogChoice {
        self.rx.await.unwrap_or(DialogChoice::Cancel)
    }
}

#[derive(Clone, Default)]
pub struct DialogHost {
    inner: Arc<Mutex<HostInner>>,
    opened: Arc<Notify>,
}

impl DialogHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HostInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn open(&self, descriptor: DialogDescriptor) -> DialogHandle {
        let (reply, rx) = oneshot::channel();
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        debug!(dialog = id, title = %descriptor.title, "dialog opened");
        inner.open.push(OpenDialog {
            id,
            descriptor,
            reply,
        });
        drop(inner);
        self.opened.notify_one();
        DialogHandle { id, rx }
    }

    /// The topmost open dialog.
    pub fn current(&self) -> Option<(u64, DialogDescriptor)> {
        self.lock()
            .open
            .last()
            .map(|d| (d.id, d.descriptor.clone()))
    }

    /// Waits until a dialog is open and returns the topmost one.
    pub async fn wait_for_dialog(&self) -> (u64, DialogDescriptor) {
        loop {
            if let Some(top) = self.current() {
                return top;
            }
            self.opened.notified().await;
        }
    }

    /// Answers dialog `id`. Returns false when it is no longer open.
    pub fn resolve(&self, id: u64, choice: DialogChoice) -> bool {
        let mut inner = self.lock();
        let Some(pos) = inner.open.iter().position(|d| d.id == id) else {
            return false;
        };
        let dialog = inner.open.remove(pos);
        dialog.reply.send(choice).is_ok()
    }

    /// Closes every open dialog as cancelled.
    pub fn close_all(&self) {
        let closed = std::mem::take(&mut self.lock().open);
        if !closed.is_empty() {
            debug!(count = closed.len(), "dialogs closed");
        }
    }

    pub fn open_count(&self) -> usize {
        self.lock().open.len()
    }
}
