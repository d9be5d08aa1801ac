//! Handle store: compact references to originals held elsewhere.
//!
//! Between ingest and reveal there may be minutes or days, so the process
//! never keeps submitted bytes around. [`HandleStore::register`] forwards a
//! batch to the [`BatchStorage`] collaborator and returns a [`Handle`];
//! [`HandleStore::resolve`] fetches the bytes back on demand.
//!
//! ## Handle format
//!
//! ```text
//! <container>/<record>/<digest>
//! image-store/0f8fad5bd9cb469fa16570867728950e/9b74c9897bac770f
//! ```
//!
//! - **container / record**: where the storage collaborator parked the batch.
//! - **digest**: first 16 hex chars of a SHA-256 over the stored filenames and
//!   bytes. `resolve` recomputes it, so a handle either yields exactly the
//!   batch that was registered or fails with [`HandleError::Corrupted`].
//!
//! The handle *is* the location reference, so the store keeps no map of its
//! own and handles stay valid across restarts as long as the record exists.

use crate::imaging::MediaType;
use crate::platform::{BatchStorage, PlatformError, StoredFile};
use crate::types::{Batch, BatchId, ImageAsset};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// Hex characters of the content digest kept in a handle.
const DIGEST_LEN: usize = 16;

#[derive(Error, Debug)]
pub enum HandleError {
    #[error("original not found for handle {0}")]
    NotFound(Handle),
    #[error("malformed handle: {0}")]
    Malformed(String),
    #[error("stored batch for handle {0} no longer matches its digest")]
    Corrupted(Handle),
    #[error("storage unreachable: {0}")]
    Transport(#[from] PlatformError),
}

/// Where a batch lives in the storage collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocationRef {
    pub container: String,
    pub record: String,
}

impl LocationRef {
    pub fn new(container: impl Into<String>, record: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            record: record.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Handle {
    location: LocationRef,
    digest: String,
}

impl Handle {
    pub fn new(location: LocationRef, digest: String) -> Self {
        Self { location, digest }
    }

    pub fn location(&self) -> &LocationRef {
        &self.location
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.location.container, self.location.record, self.digest
        )
    }
}

impl FromStr for Handle {
    type Err = HandleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || HandleError::Malformed(s.to_string());
        let mut parts = s.split('/');
        let (Some(container), Some(record), Some(digest), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(malformed());
        };
        if container.is_empty()
            || record.is_empty()
            || digest.len() != DIGEST_LEN
            || !digest.chars().all(|c| c.is_ascii_hexdigit())
        {
            return Err(malformed());
        }
        Ok(Handle::new(
            LocationRef::new(container, record),
            digest.to_ascii_lowercase(),
        ))
    }
}

impl TryFrom<String> for Handle {
    type Error = HandleError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Handle> for String {
    fn from(handle: Handle) -> Self {
        handle.to_string()
    }
}

/// SHA-256 over filenames and bytes, truncated to [`DIGEST_LEN`] hex chars.
///
/// Lengths are hashed before each field so `("ab", "c")` and `("a", "bc")`
/// cannot collide.
pub fn batch_digest(files: &[StoredFile]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"batch\0");
    for file in files {
        hasher.update((file.filename.len() as u64).to_le_bytes());
        hasher.update(file.filename.as_bytes());
        hasher.update((file.bytes.len() as u64).to_le_bytes());
        hasher.update(&file.bytes);
    }
    let mut hex = format!("{:x}", hasher.finalize());
    hex.truncate(DIGEST_LEN);
    hex
}

pub struct HandleStore {
    storage: Arc<dyn BatchStorage>,
    container: String,
}

impl HandleStore {
    pub fn new(storage: Arc<dyn BatchStorage>, container: impl Into<String>) -> Self {
        Self {
            storage,
            container: container.into(),
        }
    }

    /// Park the batch's originals and return a handle to them.
    ///
    /// Takes the batch by value: after this call the process no longer holds
    /// the bytes.
    pub async fn register(&self, batch: Batch) -> Result<Handle, HandleError> {
        let files: Vec<StoredFile> = batch
            .assets
            .into_iter()
            .map(|asset| StoredFile {
                filename: asset.filename,
                bytes: asset.bytes,
            })
            .collect();
        let digest = batch_digest(&files);
        let record = self
            .storage
            .store_batch(&self.container, &batch.id, files)
            .await?;
        Ok(Handle::new(LocationRef::new(&self.container, record), digest))
    }

    /// Fetch the originals behind a handle.
    pub async fn resolve(&self, handle: &Handle) -> Result<Batch, HandleError> {
        let stored = self
            .storage
            .fetch_stored_batch(handle.location())
            .await?
            .ok_or_else(|| HandleError::NotFound(handle.clone()))?;

        if batch_digest(&stored.files) != handle.digest() {
            return Err(HandleError::Corrupted(handle.clone()));
        }

        let batch_id = stored.batch;
        let assets = stored
            .files
            .into_iter()
            .filter_map(|file| {
                let media_type = Path::new(&file.filename)
                    .extension()
                    .and_then(|e| e.to_str())
                    .and_then(MediaType::from_extension)?;
                Some(ImageAsset {
                    filename: file.filename,
                    media_type,
                    bytes: file.bytes,
                    batch: batch_id.clone(),
                })
            })
            .collect();

        Ok(Batch {
            id: batch_id,
            assets,
        })
    }
}
