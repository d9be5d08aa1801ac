//! Shared types passed between the platform adapters and the orchestrators.

use crate::imaging::MediaType;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Platform user id. Used for the bot's own identity and for requesters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

/// Channel a submission arrived on and where its preview is published.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub String);

/// Id of the submission event a batch came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(pub String);

/// Whoever pressed the reveal trigger. Only ever used as watermark text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequesterIdentity(pub String);

macro_rules! display_inner {
    ($($t:ty),*) => {$(
        impl fmt::Display for $t {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    )*};
}

display_inner!(UserId, ChannelId, BatchId, RequesterIdentity);

impl From<&UserId> for RequesterIdentity {
    fn from(user: &UserId) -> Self {
        RequesterIdentity(user.0.clone())
    }
}

/// One whitelisted image from a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAsset {
    pub filename: String,
    pub media_type: MediaType,
    pub bytes: Vec<u8>,
    pub batch: BatchId,
}

/// Images submitted together, in submission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub id: BatchId,
    pub assets: Vec<ImageAsset>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}

/// An attachment as the platform delivers it, before whitelisting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// A message carrying attachments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub id: BatchId,
    pub channel: ChannelId,
    pub author: UserId,
    pub attachments: Vec<Attachment>,
}

/// A file in an outgoing message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingFile {
    pub filename: String,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

/// Stem of a filename without its extension, for naming derived files.
pub fn file_stem(filename: &str) -> &str {
    std::path::Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("image")
}
