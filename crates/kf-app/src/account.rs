//! # Account actions
//!
//! Sign-in, registration, sign-out and the own-profile editor. Identity
//! changes themselves reach the session through the auth watcher, not from
//! here.

use kf_core::policy::validate_avatar;
use kf_core::{
    AuthProfileUpdate, AuthUser, ForumError, ProfilePatch, Result, UploadFile, ANONYMOUS_NAME,
};
use tracing::{error, info, warn};

use crate::profiles::visible_avatar;
use crate::session::Session;
use crate::AppState;

/// The login / register form.
#[derive(Debug, Clone, Default)]
pub struct AuthForm {
    pub email: String,
    pub password: String,
    pub username: String,
    pub error: Option<String>,
}

impl AuthForm {
    fn credentials(&self) -> Result<(String, String)> {
        let email = self.email.trim();
        if email.is_empty() || self.password.is_empty() {
            return Err(ForumError::validation("Please enter email and password."));
        }
        Ok((email.to_string(), self.password.clone()))
    }

    fn finish<T>(&mut self, outcome: Result<T>) -> Result<T> {
        match &outcome {
            Ok(_) => {
                self.password.clear();
                self.error = None;
            }
            Err(e) => self.error = Some(e.inline_message()),
        }
        outcome
    }

    pub async fn login(&mut self, app: &AppState) -> Result<AuthUser> {
        let outcome = self.try_login(app).await;
        if let Err(e) = &outcome {
            warn!(error = %e, "login failed");
        }
        self.finish(outcome)
    }

    async fn try_login(&self, app: &AppState) -> Result<AuthUser> {
        let (email, password) = self.credentials()?;
        let user = app.auth.sign_in(&email, &password).await?;
        info!(uid = %user.uid, "logged in");
        Ok(user)
    }

    /// Creates the account, then seeds both the auth-side name and the profile record.
    pub async fn register(&mut self, app: &AppState) -> Result<AuthUser> {
        let outcome = self.try_register(app).await;
        if let Err(e) = &outcome {
            warn!(error = %e, "registration failed");
        }
        let outcome = self.finish(outcome);
        if outcome.is_ok() {
            self.username.clear();
        }
        outcome
    }

    async fn try_register(&self, app: &AppState) -> Result<AuthUser> {
        let (email, password) = self.credentials()?;
        let username = match self.username.trim() {
            "" => ANONYMOUS_NAME.to_string(),
            name => name.to_string(),
        };
        app.auth.sign_up(&email, &password).await?;
        let user = app
            .auth
            .update_profile(AuthProfileUpdate {
                display_name: Some(username.clone()),
                photo_url: None,
            })
            .await?;
        app.store
            .merge_profile(
                &user.uid,
                ProfilePatch {
                    username: Some(username.clone()),
                    display_name: Some(username),
                    bio: Some(String::new()),
                    photo_url: Some(None),
                    stamp_created: true,
                    stamp_updated: true,
                    ..Default::default()
                },
            )
            .await?;
        info!(uid = %user.uid, "registered");
        Ok(user)
    }
}

/// Sign-out failures are logged only; the watcher reports the real state.
pub async fn logout(app: &AppState) {
    match app.auth.sign_out().await {
        Ok(()) => info!("logged out"),
        Err(e) => error!(error = %e, "logout failed"),
    }
}

pub const PROFILE_SAVED: &str = "Profile saved successfully.";
pub const PHOTO_UPDATED: &str = "Photo updated!";

/// The own-profile editor.
///
/// The name field is left blank while the stored name is the anonymous
/// sentinel, and so is the avatar preview.
#[derive(Debug, Clone, Default)]
pub struct ProfileEditor {
    pub name: String,
    pub bio: String,
    avatar: Option<String>,
    pub photo: Option<UploadFile>,
    pub error: Option<String>,
    pub success: Option<String>,
}

impl ProfileEditor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn avatar(&self) -> Option<&str> {
        self.avatar.as_deref()
    }

    /// Fills the form from the signed-in user's profile record.
    pub async fn load(&mut self, app: &AppState, session: &Session) -> Result<()> {
        self.error = None;
        self.success = None;
        let Some(user) = session.user() else {
            let e = ForumError::unauthorized("Please log in to edit your profile.");
            *self = Self {
                error: Some(e.inline_message()),
                ..Self::default()
            };
            return Err(e);
        };
        let record = match app.store.get_profile(&user.uid).await {
            Ok(record) => record.unwrap_or_default(),
            Err(e) => {
                error!(uid = %user.uid, error = %e, "profile load failed");
                let e = ForumError::from(e);
                self.error = Some(e.inline_message());
                return Err(e);
            }
        };
        let name = record
            .display_name
            .clone()
            .or_else(|| user.display_name.clone())
            .unwrap_or_else(|| ANONYMOUS_NAME.to_string());
        let photo = record.photo_url.clone().or_else(|| user.photo_url.clone());
        self.avatar = visible_avatar(&name, photo.as_deref()).map(str::to_string);
        self.name = if name.trim() == ANONYMOUS_NAME { String::new() } else { name };
        self.bio = record.bio.unwrap_or_default();
        self.photo = None;
        Ok(())
    }

    /// Saves name, bio and (when picked) a new avatar.
    pub async fn save(&mut self, app: &AppState, session: &Session) -> Result<()> {
        self.error = None;
        self.success = None;
        match self.try_save(app, session).await {
            Ok(photo_url) => {
                self.photo = None;
                self.avatar = visible_avatar(&self.name, photo_url.as_deref()).map(str::to_string);
                self.success = Some(PROFILE_SAVED.to_string());
                Ok(())
            }
            Err(e) => {
                self.error = Some(e.inline_message());
                Err(e)
            }
        }
    }

    async fn try_save(&self, app: &AppState, session: &Session) -> Result<Option<String>> {
        let user = session
            .user()
            .ok_or_else(|| ForumError::unauthorized("You must be logged in."))?;
        let display_name = match self.name.trim() {
            "" => ANONYMOUS_NAME.to_string(),
            name => name.to_string(),
        };
        if let Some(file) = &self.photo {
            validate_avatar(file)?;
        }

        let mut photo_url = user.photo_url.clone();
        if let Some(file) = &self.photo {
            photo_url = Some(app.media.upload(file).await?.url);
        }
        app.auth
            .update_profile(AuthProfileUpdate {
                display_name: Some(display_name.clone()),
                photo_url: Some(photo_url.clone()),
            })
            .await?;
        app.store
            .merge_profile(
                &user.uid,
                ProfilePatch {
                    username: Some(display_name.clone()),
                    display_name: Some(display_name),
                    bio: Some(self.bio.trim().to_string()),
                    photo_url: Some(photo_url.clone()),
                    stamp_updated: true,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| {
                error!(uid = %user.uid, error = %e, "profile save failed");
                ForumError::from(e)
            })?;
        info!(uid = %user.uid, "profile saved");
        Ok(photo_url)
    }

    /// Replaces only the avatar with the picked file.
    pub async fn upload_photo(&mut self, app: &AppState, session: &Session) -> Result<()> {
        self.error = None;
        self.success = None;
        match self.try_upload_photo(app, session).await {
            Ok(url) => {
                self.photo = None;
                self.avatar = Some(url);
                self.success = Some(PHOTO_UPDATED.to_string());
                Ok(())
            }
            Err(e) => {
                self.error = Some(match &e {
                    ForumError::Upload(u) => format!("Upload failed: {}", u.message),
                    other => other.inline_message(),
                });
                Err(e)
            }
        }
    }

    async fn try_upload_photo(&self, app: &AppState, session: &Session) -> Result<String> {
        let user = session
            .user()
            .ok_or_else(|| ForumError::unauthorized("You must be logged in."))?;
        let file = self
            .photo
            .as_ref()
            .ok_or_else(|| ForumError::validation("Choose an image first."))?;
        validate_avatar(file)?;
        let url = app.media.upload(file).await?.url;
        app.auth
            .update_profile(AuthProfileUpdate {
                display_name: None,
                photo_url: Some(Some(url.clone())),
            })
            .await?;
        app.store
            .merge_profile(
                &user.uid,
                ProfilePatch {
                    photo_url: Some(Some(url.clone())),
                    stamp_updated: true,
                    ..Default::default()
                },
            )
            .await?;
        info!(uid = %user.uid, "avatar replaced");
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kf_auth_memory::MemoryAuth;
    use kf_core::{AuthError, AuthProvider, ForumStore, MockMediaHost, ResourceKind, UploadError, UploadedMedia};
    use kf_db_memory::MemoryForumStore;
    use std::sync::Arc;

    fn app_with(media: MockMediaHost) -> (AppState, MemoryForumStore, Arc<MemoryAuth>) {
        let store = MemoryForumStore::new();
        let auth = Arc::new(MemoryAuth::new());
        let app = AppState::new(Arc::new(store.clone()), auth.clone(), Arc::new(media));
        (app, store, auth)
    }

    fn png(len: usize) -> UploadFile {
        UploadFile::new("me.png", mime::IMAGE_PNG, vec![1u8; len])
    }

    fn hosted(url: &str) -> UploadedMedia {
        UploadedMedia {
            url: url.into(),
            public_id: None,
            resource_kind: ResourceKind::Image,
            format: Some("png".into()),
            bytes: 4,
            original_filename: Some("me.png".into()),
            delete_token: None,
        }
    }

    async fn session_for(app: &AppState, store: &MemoryForumStore) -> Session {
        let mut session = Session::signed_out();
        session
            .apply_identity(app.auth.as_ref(), store, app.auth.current_user())
            .await;
        session
    }

    #[tokio::test]
    async fn empty_credentials_never_reach_auth() {
        let (app, _, auth) = app_with(MockMediaHost::new());
        let mut form = AuthForm {
            email: "neo@zion.io".into(),
            ..Default::default()
        };
        assert!(form.login(&app).await.is_err());
        assert_eq!(form.error.as_deref(), Some("Please enter email and password."));
        assert!(auth.current_user().is_none());
    }

    #[tokio::test]
    async fn register_seeds_profile_and_auth_name() {
        let (app, store, auth) = app_with(MockMediaHost::new());
        let mut form = AuthForm {
            email: "neo@zion.io".into(),
            password: "abcdef".into(),
            ..Default::default()
        };
        let user = form.register(&app).await.unwrap();
        assert_eq!(user.display_name.as_deref(), Some(ANONYMOUS_NAME));
        assert_eq!(auth.current_user().unwrap().display_name.as_deref(), Some(ANONYMOUS_NAME));
        let record = store.get_profile(&user.uid).await.unwrap().unwrap();
        assert_eq!(record.username.as_deref(), Some(ANONYMOUS_NAME));
        assert_eq!(record.bio.as_deref(), Some(""));
        assert!(record.created_at.is_some());
        assert!(form.password.is_empty());

        auth.sign_out().await.unwrap();
        let mut again = AuthForm {
            email: "neo@zion.io".into(),
            password: "abcdef".into(),
            username: "Neo".into(),
            ..Default::default()
        };
        assert_eq!(
            again.register(&app).await.unwrap_err(),
            ForumError::Auth(AuthError::EmailInUse)
        );
        assert_eq!(again.error.as_deref(), Some("That email is already registered. Try logging in."));
    }

    #[tokio::test]
    async fn load_hides_anonymous_name_and_photo() {
        let (app, store, _) = app_with(MockMediaHost::new());
        let mut form = AuthForm {
            email: "a@zion.io".into(),
            password: "abcdef".into(),
            ..Default::default()
        };
        let user = form.register(&app).await.unwrap();
        store
            .merge_profile(
                &user.uid,
                ProfilePatch {
                    photo_url: Some(Some("https://cdn/a.png".into())),
                    bio: Some("hello".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let session = session_for(&app, &store).await;

        let mut editor = ProfileEditor::new();
        editor.load(&app, &session).await.unwrap();
        assert_eq!(editor.name, "");
        assert_eq!(editor.bio, "hello");
        assert_eq!(editor.avatar(), None);

        assert!(editor.load(&app, &Session::signed_out()).await.is_err());
        assert_eq!(editor.error.as_deref(), Some("Please log in to edit your profile."));
    }

    #[tokio::test]
    async fn save_uploads_avatar_then_merges() {
        let mut media = MockMediaHost::new();
        media
            .expect_upload()
            .times(1)
            .returning(|_| Ok(hosted("https://cdn/me.png")));
        let (app, store, auth) = app_with(media);
        auth.sign_up("neo@zion.io", "abcdef").await.unwrap();
        let session = session_for(&app, &store).await;

        let mut editor = ProfileEditor::new();
        editor.name = " Neo ".into();
        editor.bio = "The One".into();
        editor.photo = Some(png(4));
        editor.save(&app, &session).await.unwrap();
        assert_eq!(editor.success.as_deref(), Some(PROFILE_SAVED));
        assert_eq!(editor.avatar(), Some("https://cdn/me.png"));

        let uid = session.uid().cloned().unwrap();
        let record = store.get_profile(&uid).await.unwrap().unwrap();
        assert_eq!(record.display_name.as_deref(), Some("Neo"));
        assert_eq!(record.photo_url.as_deref(), Some("https://cdn/me.png"));
        assert_eq!(auth.current_user().unwrap().display_name.as_deref(), Some("Neo"));
    }

    #[tokio::test]
    async fn oversized_avatar_is_rejected_before_upload() {
        let (app, store, auth) = app_with(MockMediaHost::new());
        auth.sign_up("neo@zion.io", "abcdef").await.unwrap();
        let session = session_for(&app, &store).await;

        let mut editor = ProfileEditor::new();
        editor.photo = Some(png(2 * 1024 * 1024 + 1));
        assert!(editor.save(&app, &session).await.is_err());
        assert_eq!(editor.error.as_deref(), Some("Image size must be under 2MB."));
    }

    #[tokio::test]
    async fn photo_only_upload_messages() {
        let mut media = MockMediaHost::new();
        media
            .expect_upload()
            .times(1)
            .returning(|_| Err(UploadError::new("Invalid image file")));
        let (app, store, auth) = app_with(media);
        auth.sign_up("neo@zion.io", "abcdef").await.unwrap();
        let session = session_for(&app, &store).await;

        let mut editor = ProfileEditor::new();
        assert!(editor.upload_photo(&app, &session).await.is_err());
        assert_eq!(editor.error.as_deref(), Some("Choose an image first."));

        editor.photo = Some(png(4));
        assert!(editor.upload_photo(&app, &session).await.is_err());
        assert_eq!(editor.error.as_deref(), Some("Upload failed: Invalid image file"));
        assert!(editor.photo.is_some());
    }
}
