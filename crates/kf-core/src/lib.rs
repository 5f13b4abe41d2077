//! kino-forum/crates/kf-core/src/lib.rs
//!
//! Domain models, collaborator ports and error types for the Kino Forum client.

pub mod error;
pub mod models;
pub mod policy;
pub mod subscription;
pub mod traits;

// Re-exporting for easier access in other crates
pub use error::*;
pub use models::*;
pub use subscription::*;
pub use traits::*;

#[cfg(test)]
mod tests {
    use super::models::*;
    use chrono::{Duration, Utc};

    #[test]
    fn mute_is_a_function_of_wall_clock() {
        let t = Utc::now();
        let profile = ProfileRecord {
            muted_until: Some(t + Duration::milliseconds(1000)),
            ..Default::default()
        };
        assert!(profile.is_muted_at(t));
        assert!(!profile.is_muted_at(t + Duration::milliseconds(2000)));
        assert!(!ProfileRecord::default().is_muted_at(t));
    }

    #[test]
    fn resolved_name_falls_back_through_username() {
        let mut profile = ProfileRecord {
            display_name: Some("  ".into()),
            username: Some(" neo ".into()),
            ..Default::default()
        };
        assert_eq!(profile.resolved_name(), "neo");
        profile.username = None;
        assert_eq!(profile.resolved_name(), ANONYMOUS_NAME);
    }

    #[test]
    fn merge_only_touches_present_fields() {
        let now = Utc::now();
        let mut profile = ProfileRecord {
            display_name: Some("trinity".into()),
            bio: Some("hi".into()),
            ..Default::default()
        };
        profile.merge(
            &ProfilePatch {
                banned: Some(true),
                photo_url: Some(None),
                ..Default::default()
            },
            now,
        );
        assert!(profile.banned);
        assert_eq!(profile.display_name.as_deref(), Some("trinity"));
        assert_eq!(profile.bio.as_deref(), Some("hi"));
        assert_eq!(profile.updated_at, None);
    }

    #[test]
    fn role_parse_is_lenient() {
        assert_eq!(Role::parse("ADMIN"), Role::Admin);
        assert_eq!(Role::parse("moderator "), Role::Moderator);
        assert_eq!(Role::parse("owner"), Role::None);
        assert!(Role::Admin.is_staff());
        assert!(!Role::Moderator.is_admin());
    }

    #[test]
    fn tags_serialize_with_labels() {
        let json = serde_json::to_string(&Tag::SiteRecommendation).unwrap();
        assert_eq!(json, "\"Site Recommendation\"");
        assert_eq!(Tag::from_label("meme"), Some(Tag::Meme));
        assert_eq!(ModerationKind::DeleteReply.to_string(), "deleteReply");
    }
}
