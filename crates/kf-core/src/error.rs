//! # ForumError
//!
//! Centralized error handling for the Kino Forum client.
//! Each variant maps to one class of failure and to where it gets shown.

use thiserror::Error;

/// Failures reported by the auth collaborator, each with a fixed sentence.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Incorrect email or password.")]
    InvalidCredential,

    #[error("Please enter a valid email address.")]
    InvalidEmail,

    #[error("Please enter a password.")]
    MissingPassword,

    #[error("Password is too weak (use at least 6 characters).")]
    WeakPassword,

    #[error("That email is already registered. Try logging in.")]
    EmailInUse,

    #[error("Too many attempts. Please try again later.")]
    TooManyRequests,

    #[error("Error: {0}")]
    Other(String),
}

/// Failures reported by the database collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("document not found: {0}")]
    NotFound(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// The media host rejected a file or the transport failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct UploadError {
    pub message: String,
    /// Name of the file that failed, when known.
    pub file_name: Option<String>,
}

impl UploadError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            file_name: None,
        }
    }

    pub fn for_file(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }
}

/// The primary error type for all client operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ForumError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Empty required field, oversized or wrong-type file. Never reaches the network.
    #[error("{0}")]
    Validation(String),

    #[error("upload failed: {0}")]
    Upload(#[from] UploadError),

    /// Database write rejected.
    #[error("write rejected: {0}")]
    Write(#[from] StoreError),

    /// A subscribed document vanished.
    #[error("{0} not found with ID {1}")]
    NotFound(String, String),

    /// Actor lacks the identity or role the action needs.
    #[error("{0}")]
    Unauthorized(String),
}

impl ForumError {
    pub fn validation(msg: impl Into<String>) -> Self {
        ForumError::Validation(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        ForumError::Unauthorized(msg.into())
    }

    /// The sentence shown in the inline error slot next to the triggering control.
    pub fn inline_message(&self) -> String {
        match self {
            ForumError::Auth(e) => e.to_string(),
            ForumError::Validation(msg) | ForumError::Unauthorized(msg) => msg.clone(),
            ForumError::Upload(e) => e.message.clone(),
            ForumError::Write(_) => "Could not save your change. Please try again.".to_string(),
            ForumError::NotFound(..) => "This content no longer exists.".to_string(),
        }
    }
}

/// A specialized Result type for Kino Forum logic.
pub type Result<T> = std::result::Result<T, ForumError>;
