//! Ingest orchestrator: submission in, public blurred preview out.
//!
//! ```text
//! Submission ─► whitelist ─► Pool(blur × N) ─► HandleStore::register ─► send_public
//!                   │               │                    │                    │
//!                nothing         per-asset           transport            transport
//!                 left           decode skip        ─► notice            ─► notice
//!                   ▼               ▼
//!                Ignored      all failed ─► notice
//! ```
//!
//! Only assets whose blur succeeded are registered, so the count in the
//! caption is exactly the number of images a reveal will stamp. The bytes
//! leave the process at `register`; nothing of the batch is kept afterwards.

use crate::bot::BotState;
use crate::handle::{Handle, HandleError};
use crate::imaging::TransformError;
use crate::output;
use crate::platform::{PlatformError, PublicMessage, Trigger};
use crate::pool::PoolError;
use crate::types::{Batch, ChannelId, ImageAsset, OutgoingFile, Submission};
use futures::future::join_all;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("none of {attempted} images could be blurred")]
    AllFailed { attempted: usize },
    #[error("storing originals failed: {0}")]
    Storage(#[from] HandleError),
    #[error("publishing preview failed: {0}")]
    Publish(#[from] PlatformError),
}

/// Why a submission produced no work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    OwnMessage,
    NoAttachments,
    NothingWhitelisted,
}

#[derive(Debug)]
pub enum IngestOutcome {
    Ignored(IgnoreReason),
    Published {
        handle: Handle,
        previews: usize,
        /// Filenames dropped because they could not be blurred.
        skipped: Vec<String>,
    },
    Failed(IngestError),
}

/// Whitelisted attachments of a submission, in order.
pub fn select_assets(state: &BotState, submission: Submission) -> Batch {
    let id = submission.id;
    let assets = submission
        .attachments
        .into_iter()
        .filter_map(|attachment| {
            let media_type = state.whitelist.classify(&attachment.filename)?;
            Some(ImageAsset {
                filename: attachment.filename,
                media_type,
                bytes: attachment.bytes,
                batch: id.clone(),
            })
        })
        .collect();
    Batch { id, assets }
}

/// Blur every asset through the pool. Results come back in asset order.
async fn blur_all(state: &BotState, batch: &Batch) -> Vec<Result<Vec<u8>, BlurFailure>> {
    let pending: Vec<_> = batch
        .assets
        .iter()
        .map(|asset| {
            let engine = Arc::clone(&state.engine);
            let bytes = asset.bytes.clone();
            state.pool.submit(move || engine.blur(&bytes))
        })
        .collect();

    join_all(pending)
        .await
        .into_iter()
        .map(|joined| match joined {
            Ok(Ok(bytes)) => Ok(bytes),
            Ok(Err(e)) => Err(BlurFailure::Transform(e)),
            Err(e) => Err(BlurFailure::Pool(e)),
        })
        .collect()
}

#[derive(Debug, Error)]
enum BlurFailure {
    #[error(transparent)]
    Transform(TransformError),
    #[error(transparent)]
    Pool(PoolError),
}

/// Post a failure notice; a failure to do so is only logged.
async fn notify(state: &BotState, channel: &ChannelId, text: String) {
    if let Err(e) = state
        .platform
        .send_public(channel, PublicMessage::notice(text))
        .await
    {
        tracing::error!(channel = %channel, error = %e, "failure notice could not be sent");
    }
}

pub async fn ingest(state: &BotState, submission: Submission) -> IngestOutcome {
    if &submission.author == state.platform.bot_user() {
        return IngestOutcome::Ignored(IgnoreReason::OwnMessage);
    }
    if submission.attachments.is_empty() {
        return IngestOutcome::Ignored(IgnoreReason::NoAttachments);
    }

    let channel = submission.channel.clone();
    let batch = select_assets(state, submission);
    if batch.is_empty() {
        return IngestOutcome::Ignored(IgnoreReason::NothingWhitelisted);
    }
    let attempted = batch.len();
    tracing::debug!(batch = %batch.id, images = attempted, "blurring");

    let results = blur_all(state, &batch).await;

    let mut kept = Vec::with_capacity(attempted);
    let mut previews = Vec::with_capacity(attempted);
    let mut skipped = Vec::new();
    for (asset, result) in batch.assets.into_iter().zip(results) {
        match result {
            Ok(bytes) => {
                previews.push(OutgoingFile {
                    filename: output::preview_filename(&asset.filename),
                    bytes,
                });
                kept.push(asset);
            }
            Err(e) => {
                tracing::warn!(batch = %batch.id, file = %asset.filename, error = %e, "skipping image");
                skipped.push(asset.filename);
            }
        }
    }

    if kept.is_empty() {
        notify(state, &channel, output::ingest_all_failed_notice(attempted)).await;
        return IngestOutcome::Failed(IngestError::AllFailed { attempted });
    }

    let count = kept.len();
    let handle = match state
        .handles
        .register(Batch {
            id: batch.id.clone(),
            assets: kept,
        })
        .await
    {
        Ok(handle) => handle,
        Err(e) => {
            tracing::error!(batch = %batch.id, error = %e, "storing originals failed");
            notify(state, &channel, output::ingest_transport_notice()).await;
            return IngestOutcome::Failed(e.into());
        }
    };

    let message = PublicMessage {
        content: output::preview_caption(count),
        files: previews,
        trigger: Some(Trigger::new(handle.clone(), output::TRIGGER_LABEL)),
    };
    if let Err(e) = state.platform.send_public(&channel, message).await {
        tracing::error!(batch = %batch.id, error = %e, "publishing preview failed");
        notify(state, &channel, output::ingest_transport_notice()).await;
        return IngestOutcome::Failed(e.into());
    }

    IngestOutcome::Published {
        handle,
        previews: count,
        skipped,
    }
}
