//! Reveal orchestrator: a trigger activation in, privately delivered
//! watermarked originals out.
//!
//! ## States
//!
//! ```text
//! Start ──ack in time──► Acknowledged ──► Resolving ──► Processing ──► Delivered
//!   │                                        │              │
//!   │ deadline passed / platform expired     │ not found,   │ nothing stamped,
//!   ▼                                        │ transport    │ transport
//! Abandoned ◄── follow-up window elapsed ────┴──────────────┴──► Failed
//! ```
//!
//! - The acknowledgment must reach the platform within
//!   [`Deadlines::acknowledge`](crate::bot::Deadlines) of the activation's
//!   arrival. If that moment already passed, nothing is sent at all. Expiry is
//!   never retried: an abandoned activation gets no private message.
//! - Everything after the acknowledgment runs inside the follow-up window. When
//!   it elapses the run is abandoned; stamps still queued or running on the
//!   pool finish and their results are dropped.
//! - Every failure after acknowledgment produces exactly one private notice.

use crate::bot::BotState;
use crate::handle::HandleError;
use crate::imaging::TransformError;
use crate::output;
use crate::platform::{AckOutcome, Activation, PrivateMessage, Trigger};
use crate::pool::PoolError;
use crate::types::{Batch, OutgoingFile, RequesterIdentity};
use futures::future::join_all;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::time::{Instant, timeout_at};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealState {
    Start,
    Acknowledged,
    Resolving,
    Processing,
    Delivered,
    Failed,
    Abandoned,
}

impl fmt::Display for RevealState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RevealState::Start => "start",
            RevealState::Acknowledged => "acknowledged",
            RevealState::Resolving => "resolving",
            RevealState::Processing => "processing",
            RevealState::Delivered => "delivered",
            RevealState::Failed => "failed",
            RevealState::Abandoned => "abandoned",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbandonReason {
    /// The acknowledgment deadline had passed before it could be sent.
    DeadlinePassed,
    /// The platform rejected the acknowledgment as expired.
    AckExpired,
    /// Processing outlived the follow-up window.
    FollowupElapsed,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RevealFailure {
    #[error("original not found")]
    NotFound,
    #[error("stored originals no longer match the handle")]
    Corrupted,
    #[error("no image could be stamped")]
    NothingStamped,
    #[error("transport error: {0}")]
    Transport(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevealOutcome {
    Delivered {
        requester: RequesterIdentity,
        delivered: usize,
        skipped: usize,
    },
    Failed(RevealFailure),
    Abandoned(AbandonReason),
}

impl From<HandleError> for RevealFailure {
    fn from(err: HandleError) -> Self {
        match err {
            HandleError::NotFound(_) | HandleError::Malformed(_) => RevealFailure::NotFound,
            HandleError::Corrupted(_) => RevealFailure::Corrupted,
            HandleError::Transport(e) => RevealFailure::Transport(e.to_string()),
        }
    }
}

/// One activation moving through the state machine.
struct RevealRun<'a> {
    state: &'a BotState,
    activation: Activation,
    identity: RequesterIdentity,
    current: RevealState,
}

impl<'a> RevealRun<'a> {
    fn new(state: &'a BotState, activation: Activation) -> Self {
        let identity = activation.requester_identity();
        Self {
            state,
            activation,
            identity,
            current: RevealState::Start,
        }
    }

    fn advance(&mut self, next: RevealState) {
        tracing::debug!(
            activation = %self.activation.id,
            from = %self.current,
            to = %next,
            "reveal transition"
        );
        self.current = next;
    }

    fn abandon(&mut self, reason: AbandonReason) -> RevealOutcome {
        self.advance(RevealState::Abandoned);
        tracing::info!(activation = %self.activation.id, ?reason, "reveal abandoned");
        RevealOutcome::Abandoned(reason)
    }

    /// Start → Acknowledged, or an early exit.
    async fn acknowledge(&mut self) -> Result<(), RevealOutcome> {
        let deadline = self.activation.received_at + self.state.deadlines.acknowledge;
        if Instant::now() >= deadline {
            return Err(self.abandon(AbandonReason::DeadlinePassed));
        }
        let acked = timeout_at(deadline, self.state.platform.acknowledge(&self.activation)).await;
        match acked {
            Err(_) => Err(self.abandon(AbandonReason::DeadlinePassed)),
            Ok(Ok(AckOutcome::Expired)) => Err(self.abandon(AbandonReason::AckExpired)),
            Ok(Ok(AckOutcome::Acknowledged)) => {
                self.advance(RevealState::Acknowledged);
                Ok(())
            }
            Ok(Err(e)) => {
                // No acknowledgment means no channel to the requester.
                tracing::error!(activation = %self.activation.id, error = %e, "acknowledgment failed");
                self.advance(RevealState::Failed);
                Err(RevealOutcome::Failed(RevealFailure::Transport(e.to_string())))
            }
        }
    }

    /// Send the private result, replacing the acknowledgment when supported.
    async fn deliver(&self, message: PrivateMessage) -> Result<(), RevealFailure> {
        let platform = &self.state.platform;
        let sent = if platform.supports_ack_updates() {
            platform
                .update_acknowledgment(&self.activation, message)
                .await
        } else {
            platform.send_private(&self.activation, message).await
        };
        sent.map_err(|e| RevealFailure::Transport(e.to_string()))
    }

    /// Terminal failure with its single private notice.
    async fn fail(&mut self, failure: RevealFailure) -> RevealOutcome {
        self.advance(RevealState::Failed);
        match &failure {
            RevealFailure::Transport(e) => {
                tracing::error!(activation = %self.activation.id, error = %e, "reveal failed")
            }
            other => {
                tracing::warn!(activation = %self.activation.id, failure = %other, "reveal failed")
            }
        }
        let notice = PrivateMessage::notice(output::reveal_failure_notice(&failure));
        if let Err(e) = self.deliver(notice).await {
            tracing::error!(activation = %self.activation.id, error = %e, "failure notice could not be sent");
        }
        RevealOutcome::Failed(failure)
    }

    async fn resolve(&mut self) -> Result<Batch, RevealFailure> {
        self.advance(RevealState::Resolving);
        let handle = Trigger::parse_custom_id(&self.activation.custom_id)?;
        Ok(self.state.handles.resolve(&handle).await?)
    }

    /// Stamp every asset through the pool, keeping asset order.
    async fn stamp_all(&mut self, batch: Batch) -> (Vec<OutgoingFile>, usize) {
        self.advance(RevealState::Processing);
        let pending: Vec<_> = batch
            .assets
            .iter()
            .map(|asset| {
                let engine = Arc::clone(&self.state.engine);
                let bytes = asset.bytes.clone();
                let identity = self.identity.0.clone();
                self.state
                    .pool
                    .submit(move || engine.stamp(&bytes, &identity))
            })
            .collect();

        let mut files = Vec::with_capacity(pending.len());
        let mut skipped = 0;
        for (asset, result) in batch.assets.iter().zip(join_all(pending).await) {
            match flatten(result) {
                Ok(bytes) => files.push(OutgoingFile {
                    filename: output::stamped_filename(&asset.filename),
                    bytes,
                }),
                Err(e) => {
                    skipped += 1;
                    tracing::warn!(
                        activation = %self.activation.id,
                        file = %asset.filename,
                        error = %e,
                        "skipping image"
                    );
                }
            }
        }
        (files, skipped)
    }

    /// Acknowledged → Delivered | Failed.
    async fn process(&mut self) -> RevealOutcome {
        let batch = match self.resolve().await {
            Ok(batch) => batch,
            Err(failure) => return self.fail(failure).await,
        };

        let (files, skipped) = self.stamp_all(batch).await;
        if files.is_empty() {
            return self.fail(RevealFailure::NothingStamped).await;
        }

        let delivered = files.len();
        let message = PrivateMessage {
            content: output::delivered_text(&self.identity, delivered),
            files,
        };
        if let Err(failure) = self.deliver(message).await {
            return self.fail(failure).await;
        }
        self.advance(RevealState::Delivered);
        RevealOutcome::Delivered {
            requester: self.identity.clone(),
            delivered,
            skipped,
        }
    }
}

fn flatten(
    result: Result<Result<Vec<u8>, TransformError>, PoolError>,
) -> Result<Vec<u8>, String> {
    match result {
        Ok(Ok(bytes)) => Ok(bytes),
        Ok(Err(e)) => Err(e.to_string()),
        Err(e) => Err(e.to_string()),
    }
}

/// Run one activation to completion.
pub async fn reveal(state: &BotState, activation: Activation) -> RevealOutcome {
    let mut run = RevealRun::new(state, activation);
    if let Err(outcome) = run.acknowledge().await {
        return outcome;
    }

    let followup = Instant::now() + state.deadlines.followup;
    let finished = timeout_at(followup, run.process()).await;
    match finished {
        Ok(outcome) => outcome,
        Err(_) => run.abandon(AbandonReason::FollowupElapsed),
    }
}
