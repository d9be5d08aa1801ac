//! Chat-platform and storage collaborators.
//!
//! The core never talks to a chat service directly. It goes through two
//! traits:
//!
//! - [`Platform`]: public posts, the deadline-bound acknowledgment of a
//!   trigger activation, and private (requester-only) replies.
//! - [`BatchStorage`]: an out-of-process place to park original bytes
//!   (e.g. a dedicated storage channel) and fetch them back by location.
//!
//! Two adapters ship with the crate:
//!
//! | Adapter | Backing | Used by |
//! |---|---|---|
//! | [`MemoryPlatform`] | in-process maps, records every call | tests, embedding |
//! | [`LocalPlatform`] | a directory tree + JSON-lines events on stdin | `blurmark serve` |

pub mod local;
pub mod memory;

pub use local::LocalPlatform;
pub use memory::MemoryPlatform;

use crate::handle::{Handle, HandleError, LocationRef};
use crate::types::{BatchId, ChannelId, OutgoingFile, RequesterIdentity, UserId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;

#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Interactive component attached to a public preview.
///
/// The component id carries the batch [`Handle`], so an activation can be
/// matched back to its originals without any lookup table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    pub handle: Handle,
    pub label: String,
}

impl Trigger {
    const PREFIX: &'static str = "reveal:";

    pub fn new(handle: Handle, label: impl Into<String>) -> Self {
        Self {
            handle,
            label: label.into(),
        }
    }

    /// Component id sent to the platform.
    pub fn custom_id(&self) -> String {
        format!("{}{}", Self::PREFIX, self.handle)
    }

    /// Recover the handle from an activated component id.
    pub fn parse_custom_id(custom_id: &str) -> Result<Handle, HandleError> {
        let encoded = custom_id
            .strip_prefix(Self::PREFIX)
            .ok_or_else(|| HandleError::Malformed(custom_id.to_string()))?;
        encoded.parse()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicMessage {
    pub content: String,
    pub files: Vec<OutgoingFile>,
    pub trigger: Option<Trigger>,
}

impl PublicMessage {
    /// Text-only message, used for failure notices.
    pub fn notice(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            files: Vec::new(),
            trigger: None,
        }
    }
}

/// Reply visible only to the requester of an activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivateMessage {
    pub content: String,
    pub files: Vec<OutgoingFile>,
}

impl PrivateMessage {
    pub fn notice(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            files: Vec::new(),
        }
    }
}

/// A user pressed a trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activation {
    pub id: String,
    pub channel: ChannelId,
    pub custom_id: String,
    pub requester: UserId,
    /// When the platform delivered the event; the acknowledgment deadline
    /// counts from here.
    pub received_at: Instant,
}

impl Activation {
    pub fn requester_identity(&self) -> RequesterIdentity {
        RequesterIdentity::from(&self.requester)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    Acknowledged,
    /// The platform already considers the activation dead.
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredFile {
    pub filename: String,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

/// Originals parked in storage, in submission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBatch {
    pub batch: BatchId,
    pub files: Vec<StoredFile>,
}

#[async_trait]
pub trait Platform: Send + Sync {
    /// The bot's own account; its messages are never ingested.
    fn bot_user(&self) -> &UserId;

    /// Whether private results can replace the acknowledgment in place. When
    /// false, results go out as a fresh private message.
    fn supports_ack_updates(&self) -> bool {
        true
    }

    async fn send_public(
        &self,
        channel: &ChannelId,
        message: PublicMessage,
    ) -> Result<(), PlatformError>;

    async fn send_private(
        &self,
        activation: &Activation,
        message: PrivateMessage,
    ) -> Result<(), PlatformError>;

    /// Send the "processing" acknowledgment for an activation.
    async fn acknowledge(&self, activation: &Activation) -> Result<AckOutcome, PlatformError>;

    async fn update_acknowledgment(
        &self,
        activation: &Activation,
        message: PrivateMessage,
    ) -> Result<(), PlatformError>;
}

#[async_trait]
pub trait BatchStorage: Send + Sync {
    /// Park files under `container` and return the new record id.
    async fn store_batch(
        &self,
        container: &str,
        batch: &BatchId,
        files: Vec<StoredFile>,
    ) -> Result<String, PlatformError>;

    /// `Ok(None)` when the record no longer exists.
    async fn fetch_stored_batch(
        &self,
        location: &LocationRef,
    ) -> Result<Option<StoredBatch>, PlatformError>;
}
