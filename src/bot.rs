//! Process-wide state and the single-threaded event loop.
//!
//! [`BotState`] is built once at startup and shared by `Arc` with every event
//! task. It holds the immutable configuration and the three collaborators the
//! orchestrators need: the [`WorkerPool`], the [`TransformEngine`] it runs,
//! and the [`HandleStore`] in front of the storage collaborator.
//!
//! [`run`] drains an event channel on the current runtime thread. Each event
//! becomes its own task, so a slow reveal never holds up the next
//! submission; only the pool does CPU work.

use crate::config::{BotConfig, DeadlineConfig, effective_pool_size};
use crate::handle::HandleStore;
use crate::imaging::{MediaWhitelist, TransformEngine};
use crate::ingest::{IngestOutcome, ingest};
use crate::output;
use crate::platform::{Activation, BatchStorage, Platform};
use crate::pool::{PoolError, WorkerPool};
use crate::reveal::{RevealOutcome, reveal};
use crate::types::{BatchId, Submission};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

/// Something the platform delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Submission(Submission),
    Activation(Activation),
}

/// Result of handling one event, for logging and tests.
#[derive(Debug)]
pub enum EventOutcome {
    Ingest {
        batch: BatchId,
        outcome: IngestOutcome,
    },
    Reveal {
        activation: String,
        outcome: RevealOutcome,
    },
}

/// Time limits the platform imposes on a reveal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadlines {
    /// From activation delivery to acknowledgment.
    pub acknowledge: Duration,
    /// From acknowledgment to the final private update.
    pub followup: Duration,
}

impl From<&DeadlineConfig> for Deadlines {
    fn from(config: &DeadlineConfig) -> Self {
        Self {
            acknowledge: config.acknowledge(),
            followup: config.followup(),
        }
    }
}

pub struct BotState {
    pub config: BotConfig,
    pub deadlines: Deadlines,
    pub whitelist: MediaWhitelist,
    pub pool: WorkerPool,
    pub engine: Arc<dyn TransformEngine>,
    pub handles: HandleStore,
    pub platform: Arc<dyn Platform>,
}

impl BotState {
    pub fn new(
        config: BotConfig,
        engine: Arc<dyn TransformEngine>,
        platform: Arc<dyn Platform>,
        storage: Arc<dyn BatchStorage>,
    ) -> Result<Self, PoolError> {
        let pool = WorkerPool::new(effective_pool_size(&config.pool))?;
        Ok(Self {
            deadlines: Deadlines::from(&config.deadlines),
            whitelist: config.whitelist(),
            handles: HandleStore::new(storage, config.storage.container.clone()),
            pool,
            engine,
            platform,
            config,
        })
    }
}

/// Route one event to its orchestrator.
pub async fn dispatch(state: Arc<BotState>, event: Event) -> EventOutcome {
    match event {
        Event::Submission(submission) => {
            let batch = submission.id.clone();
            let outcome = ingest(&state, submission).await;
            EventOutcome::Ingest { batch, outcome }
        }
        Event::Activation(activation) => {
            let id = activation.id.clone();
            let outcome = reveal(&state, activation).await;
            EventOutcome::Reveal {
                activation: id,
                outcome,
            }
        }
    }
}

fn log_outcome(outcome: &EventOutcome) {
    match outcome {
        EventOutcome::Ingest { batch, outcome } => {
            tracing::info!(batch = %batch, "{}", output::format_ingest_outcome(&batch.0, outcome));
        }
        EventOutcome::Reveal {
            activation,
            outcome,
        } => {
            tracing::info!(
                activation = %activation,
                "{}",
                output::format_reveal_outcome(activation, outcome)
            );
        }
    }
}

/// Handle events until the channel closes, then wait for in-flight tasks.
///
/// Returns the number of events handled.
pub async fn run(state: Arc<BotState>, mut events: mpsc::Receiver<Event>) -> usize {
    let mut tasks = JoinSet::new();
    let mut handled = 0;
    let mut open = true;

    while open || !tasks.is_empty() {
        tokio::select! {
            event = events.recv(), if open => match event {
                Some(event) => {
                    tasks.spawn(dispatch(Arc::clone(&state), event));
                }
                None => {
                    tracing::debug!(pending = tasks.len(), "event source closed, draining");
                    open = false;
                }
            },
            Some(joined) = tasks.join_next() => {
                handled += 1;
                match joined {
                    Ok(outcome) => log_outcome(&outcome),
                    Err(e) => tracing::error!(error = %e, "event task ended abnormally"),
                }
            }
        }
    }
    handled
}
