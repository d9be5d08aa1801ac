//! In-process platform that records every call.
//!
//! Backs the test-suite and lets the orchestrators run without a network.
//! Each failure mode the core must handle can be switched on independently:
//! acknowledgment expiry, storage outage, send failure, and deletion of a
//! stored record.

use super::{
    AckOutcome, Activation, BatchStorage, Platform, PlatformError, PrivateMessage, PublicMessage,
    StoredBatch, StoredFile,
};
use crate::handle::LocationRef;
use crate::types::{BatchId, ChannelId, UserId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Everything the platform was asked to do, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformCall {
    Public {
        channel: ChannelId,
        message: PublicMessage,
    },
    Acknowledge {
        activation: String,
    },
    UpdateAcknowledgment {
        activation: String,
        requester: UserId,
        message: PrivateMessage,
    },
    Private {
        activation: String,
        requester: UserId,
        message: PrivateMessage,
    },
    Store {
        container: String,
        record: String,
        files: usize,
    },
}

pub struct MemoryPlatform {
    bot: UserId,
    calls: Mutex<Vec<PlatformCall>>,
    records: Mutex<HashMap<LocationRef, StoredBatch>>,
    expire_acks: AtomicBool,
    fail_storage: AtomicBool,
    fail_sends: AtomicBool,
    ack_updates: AtomicBool,
}

impl Default for MemoryPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPlatform {
    pub fn new() -> Self {
        Self::with_bot_user(UserId("bot".into()))
    }

    pub fn with_bot_user(bot: UserId) -> Self {
        Self {
            bot,
            calls: Mutex::new(Vec::new()),
            records: Mutex::new(HashMap::new()),
            expire_acks: AtomicBool::new(false),
            fail_storage: AtomicBool::new(false),
            fail_sends: AtomicBool::new(false),
            ack_updates: AtomicBool::new(true),
        }
    }

    /// Make `acknowledge` report [`AckOutcome::Expired`].
    pub fn expire_acknowledgments(&self, on: bool) {
        self.expire_acks.store(on, Ordering::SeqCst);
    }

    /// Make both storage operations fail with a transport error.
    pub fn fail_storage(&self, on: bool) {
        self.fail_storage.store(on, Ordering::SeqCst);
    }

    /// Make every outgoing message fail with a transport error.
    pub fn fail_sends(&self, on: bool) {
        self.fail_sends.store(on, Ordering::SeqCst);
    }

    /// Toggle in-place acknowledgment updates.
    pub fn set_ack_updates(&self, on: bool) {
        self.ack_updates.store(on, Ordering::SeqCst);
    }

    /// Simulate the storage record vanishing.
    pub fn delete_record(&self, location: &LocationRef) {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).remove(location);
    }

    pub fn calls(&self) -> Vec<PlatformCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn public_messages(&self) -> Vec<(ChannelId, PublicMessage)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                PlatformCall::Public { channel, message } => Some((channel, message)),
                _ => None,
            })
            .collect()
    }

    /// Private deliveries to `requester`, whether sent fresh or as an update
    /// of the acknowledgment.
    pub fn private_messages_for(&self, requester: &UserId) -> Vec<PrivateMessage> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                PlatformCall::Private {
                    requester: r,
                    message,
                    ..
                }
                | PlatformCall::UpdateAcknowledgment {
                    requester: r,
                    message,
                    ..
                } if &r == requester => Some(message),
                _ => None,
            })
            .collect()
    }

    pub fn private_message_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| {
                matches!(
                    c,
                    PlatformCall::Private { .. } | PlatformCall::UpdateAcknowledgment { .. }
                )
            })
            .count()
    }

    pub fn stored_record_count(&self) -> usize {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn record(&self, call: PlatformCall) {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(call);
    }

    fn check_send(&self) -> Result<(), PlatformError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(PlatformError::Transport("send rejected".into()));
        }
        Ok(())
    }

    fn check_storage(&self) -> Result<(), PlatformError> {
        if self.fail_storage.load(Ordering::SeqCst) {
            return Err(PlatformError::Transport("storage unreachable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl Platform for MemoryPlatform {
    fn bot_user(&self) -> &UserId {
        &self.bot
    }

    fn supports_ack_updates(&self) -> bool {
        self.ack_updates.load(Ordering::SeqCst)
    }

    async fn send_public(
        &self,
        channel: &ChannelId,
        message: PublicMessage,
    ) -> Result<(), PlatformError> {
        self.check_send()?;
        self.record(PlatformCall::Public {
            channel: channel.clone(),
            message,
        });
        Ok(())
    }

    async fn send_private(
        &self,
        activation: &Activation,
        message: PrivateMessage,
    ) -> Result<(), PlatformError> {
        self.check_send()?;
        self.record(PlatformCall::Private {
            activation: activation.id.clone(),
            requester: activation.requester.clone(),
            message,
        });
        Ok(())
    }

    async fn acknowledge(&self, activation: &Activation) -> Result<AckOutcome, PlatformError> {
        self.check_send()?;
        if self.expire_acks.load(Ordering::SeqCst) {
            return Ok(AckOutcome::Expired);
        }
        self.record(PlatformCall::Acknowledge {
            activation: activation.id.clone(),
        });
        Ok(AckOutcome::Acknowledged)
    }

    async fn update_acknowledgment(
        &self,
        activation: &Activation,
        message: PrivateMessage,
    ) -> Result<(), PlatformError> {
        self.check_send()?;
        self.record(PlatformCall::UpdateAcknowledgment {
            activation: activation.id.clone(),
            requester: activation.requester.clone(),
            message,
        });
        Ok(())
    }
}

#[async_trait]
impl BatchStorage for MemoryPlatform {
    async fn store_batch(
        &self,
        container: &str,
        batch: &BatchId,
        files: Vec<StoredFile>,
    ) -> Result<String, PlatformError> {
        self.check_storage()?;
        let record = uuid::Uuid::new_v4().simple().to_string();
        self.record(PlatformCall::Store {
            container: container.to_string(),
            record: record.clone(),
            files: files.len(),
        });
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(
                LocationRef::new(container, record.clone()),
                StoredBatch {
                    batch: batch.clone(),
                    files,
                },
            );
        Ok(record)
    }

    async fn fetch_stored_batch(
        &self,
        location: &LocationRef,
    ) -> Result<Option<StoredBatch>, PlatformError> {
        self.check_storage()?;
        Ok(self
            .records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(location)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    fn activation(requester: &str) -> Activation {
        Activation {
            id: format!("act-{requester}"),
            channel: ChannelId("general".into()),
            custom_id: "reveal:x".into(),
            requester: UserId(requester.into()),
            received_at: Instant::now(),
        }
    }

    #[tokio::test]
    async fn records_calls_in_order() {
        let platform = MemoryPlatform::new();
        let act = activation("u1");
        platform
            .send_public(&ChannelId("c".into()), PublicMessage::notice("hi"))
            .await
            .unwrap();
        platform.acknowledge(&act).await.unwrap();
        platform
            .update_acknowledgment(&act, PrivateMessage::notice("done"))
            .await
            .unwrap();

        let calls = platform.calls();
        assert_eq!(calls.len(), 3);
        assert!(matches!(calls[0], PlatformCall::Public { .. }));
        assert!(matches!(calls[1], PlatformCall::Acknowledge { .. }));
        assert_eq!(platform.private_messages_for(&UserId("u1".into())).len(), 1);
        assert!(platform.private_messages_for(&UserId("u2".into())).is_empty());
    }

    #[tokio::test]
    async fn expired_ack_is_not_recorded() {
        let platform = MemoryPlatform::new();
        platform.expire_acknowledgments(true);
        assert_eq!(
            platform.acknowledge(&activation("u")).await.unwrap(),
            AckOutcome::Expired
        );
        assert!(platform.calls().is_empty());
    }

    #[tokio::test]
    async fn failing_sends_surface_transport_errors() {
        let platform = MemoryPlatform::new();
        platform.fail_sends(true);
        let result = platform
            .send_public(&ChannelId("c".into()), PublicMessage::notice("x"))
            .await;
        assert!(matches!(result, Err(PlatformError::Transport(_))));
    }

    #[tokio::test]
    async fn store_and_fetch_records() {
        let platform = MemoryPlatform::new();
        let files = vec![StoredFile {
            filename: "a.png".into(),
            bytes: vec![1, 2, 3],
        }];
        let record = platform
            .store_batch("box", &BatchId("m".into()), files.clone())
            .await
            .unwrap();
        let location = LocationRef::new("box", record);

        let fetched = platform.fetch_stored_batch(&location).await.unwrap().unwrap();
        assert_eq!(fetched.files, files);
        assert_eq!(fetched.files[0].bytes, vec![1, 2, 3]);

        platform.delete_record(&location);
        assert!(platform.fetch_stored_batch(&location).await.unwrap().is_none());
    }
}
