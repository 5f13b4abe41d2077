//! Shared fixtures: one `Client` per signed-in person, all on one store.

#![allow(dead_code)]

use std::sync::Arc;

use kf_app::account::AuthForm;
use kf_app::dialog::{DialogChoice, DialogDescriptor, DialogHost};
use kf_app::{AppState, ForumApp};
use kf_auth_memory::MemoryAuth;
use kf_core::{ForumStore, MediaHost, MockMediaHost, ProfilePatch, Role, UserId};
use kf_db_memory::MemoryForumStore;
use tokio::task::JoinHandle;

pub const PASSWORD: &str = "redpill";

pub struct Client {
    pub app: ForumApp,
    pub auth: Arc<MemoryAuth>,
    pub email: String,
}

impl Client {
    pub async fn boot(store: &MemoryForumStore, media: Arc<dyn MediaHost>) -> Self {
        kf_config::telemetry::init_for_tests();
        let auth = Arc::new(MemoryAuth::new());
        let state = AppState::new(Arc::new(store.clone()), auth.clone(), media);
        let mut app = ForumApp::new(state);
        app.boot().await;
        Self {
            app,
            auth,
            email: String::new(),
        }
    }

    pub async fn guest(store: &MemoryForumStore) -> Self {
        Self::boot(store, Arc::new(MockMediaHost::new())).await
    }

    /// Registers through the account form and applies the new identity.
    pub async fn member(store: &MemoryForumStore, email: &str, username: &str) -> Self {
        let mut client = Self::guest(store).await;
        client.register(email, username).await;
        client
    }

    /// A member whose profile carries `role`, signed in again so the session sees it.
    pub async fn staff(store: &MemoryForumStore, email: &str, username: &str, role: Role) -> Self {
        let mut client = Self::member(store, email, username).await;
        store
            .merge_profile(
                &client.uid(),
                ProfilePatch {
                    role: Some(role),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        client.relogin().await;
        client
    }

    pub async fn register(&mut self, email: &str, username: &str) {
        self.email = email.to_string();
        self.app.auth_form = AuthForm {
            email: email.into(),
            password: PASSWORD.into(),
            username: username.into(),
            error: None,
        };
        self.app.register().await.unwrap();
    }

    pub async fn relogin(&mut self) {
        self.app.logout().await;
        self.app.auth_form.email = self.email.clone();
        self.app.auth_form.password = PASSWORD.into();
        self.app.login().await.unwrap();
    }

    pub fn uid(&self) -> UserId {
        self.app.session().uid().cloned().unwrap()
    }

    pub fn dialogs(&self) -> DialogHost {
        self.app.dialogs().clone()
    }
}

/// Answers the next dialog `host` shows with `choice`, yielding its descriptor.
pub fn answer_next(host: DialogHost, choice: DialogChoice) -> JoinHandle<DialogDescriptor> {
    tokio::spawn(async move {
        let (id, descriptor) = host.wait_for_dialog().await;
        assert!(host.resolve(id, choice));
        descriptor
    })
}
