//! Glue to the real-time collaboration provider.
//!
//! The provider owns the shared buffer and merges remote edits; this module
//! only describes how to join a room, who the local user is, and what the
//! provider reports back. Autosave never depends on connection health.

mod buffer;

pub use buffer::{EditorBuffer, TextBuffer};

use crate::util::alphanumeric_only;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollabError {
    #[error("Collaboration URL is not configured")]
    MissingUrl,

    #[error("Collaboration transport failed: {0}")]
    Transport(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    Connected,
    Disconnected,
    Error(String),
}

impl TransportEvent {
    pub fn notice_text(&self) -> &'static str {
        match self {
            TransportEvent::Connected => "Connected to collaboration server",
            TransportEvent::Disconnected => "Disconnected from server",
            TransportEvent::Error(_) => "Error connecting to collaboration server",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Idle,
    Connected,
    Disconnected,
    Failed,
}

impl ConnectionState {
    pub fn apply(self, event: &TransportEvent) -> Self {
        match event {
            TransportEvent::Connected => ConnectionState::Connected,
            TransportEvent::Disconnected => ConnectionState::Disconnected,
            TransportEvent::Error(_) => ConnectionState::Failed,
        }
    }
}

/// Room name shared by everyone editing the same document:
/// `{document id}-{title, alphanumerics only}-{user id}`.
pub fn session_name(document_id: &str, title: &str, user_id: &str) -> String {
    format!("{document_id}-{}-{user_id}", alphanumeric_only(title))
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CollabParams {
    pub url: String,
    pub session_name: String,
    pub token: String,
}

impl CollabParams {
    pub fn new(url: &str, session_name: String, token: Option<&str>) -> Result<Self, CollabError> {
        if url.trim().is_empty() {
            return Err(CollabError::MissingUrl);
        }
        Ok(Self {
            url: url.to_string(),
            session_name,
            token: token.unwrap_or_default().to_string(),
        })
    }
}

/// Presence info rendered next to the local user's cursor.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CollabUser {
    pub name: String,
    pub color: String,
}

impl CollabUser {
    pub fn from_email(email: Option<&str>) -> Self {
        let name = email
            .and_then(|e| e.split('@').next())
            .filter(|n| !n.trim().is_empty())
            .unwrap_or("Anonymous")
            .to_string();
        Self {
            name,
            color: random_color(),
        }
    }
}

fn random_color() -> String {
    let mut buf = [0u8; 3];
    if let Err(e) = getrandom::getrandom(&mut buf) {
        tracing::debug!(error = %e, "no randomness for cursor color");
    }
    format!("#{:02x}{:02x}{:02x}", buf[0], buf[1], buf[2])
}

/// Connection to a collaboration provider.
pub trait CollabTransport {
    fn connect(&mut self, params: &CollabParams) -> Result<(), CollabError>;

    /// Leave the room and release the shared buffer.
    fn destroy(&mut self);
}

/// Join the room for `document_id`. A failed connection is reported but the
/// editing session carries on without live collaboration.
pub fn join<T: CollabTransport>(
    transport: &mut T,
    url: &str,
    document_id: &str,
    title: &str,
    user_id: &str,
    token: Option<&str>,
) -> Result<CollabParams, CollabError> {
    let params = CollabParams::new(url, session_name(document_id, title, user_id), token)?;
    match transport.connect(&params) {
        Ok(()) => {
            tracing::info!(room = %params.session_name, "joined collaboration room");
            Ok(params)
        }
        Err(e) => {
            tracing::warn!(room = %params.session_name, error = %e, "could not join collaboration room");
            Err(e)
        }
    }
}
