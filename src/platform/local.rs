//! Filesystem-backed platform for running the bot without a chat service.
//!
//! ## Layout
//!
//! ```text
//! <root>/
//! ├── storage/<container>/<record>/
//! │   ├── manifest.json            # batch id + filenames in order
//! │   └── 000-<filename> ...       # original bytes
//! └── outbox/
//!     ├── public/<channel>/<message>/
//!     │   ├── message.json         # content, files, trigger
//!     │   └── 000-<filename> ...
//!     └── private/<requester>/<activation>/
//!         ├── ack.json
//!         ├── message.json         # result or notice
//!         └── 000-<filename> ...
//! ```
//!
//! Every file on disk carries its position as a prefix, so attachments whose
//! names sanitize to the same component (two `image.png`, or names made only
//! of non-ASCII characters) never overwrite each other.
//!
//! Deleting a record directory under `storage/` makes its handle resolve to
//! not-found, exactly like a deleted storage message.
//!
//! ## Events
//!
//! Incoming events are JSON lines (see [`LocalPlatform::parse_event`]):
//!
//! ```text
//! {"type":"submission","id":"m1","channel":"general","author":"u1","attachments":["cat.png"]}
//! {"type":"activation","id":"a1","channel":"general","custom_id":"reveal:...","requester":"u2"}
//! ```

use super::{
    AckOutcome, Activation, BatchStorage, Platform, PlatformError, PrivateMessage, PublicMessage,
    StoredBatch, StoredFile,
};
use crate::bot::Event;
use crate::handle::LocationRef;
use crate::output;
use crate::types::{Attachment, BatchId, ChannelId, OutgoingFile, Submission, UserId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;

const MANIFEST: &str = "manifest.json";

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    batch: BatchId,
    files: Vec<String>,
}

#[derive(Debug, Serialize)]
struct MessageRecord<'a> {
    content: &'a str,
    files: Vec<FileRecord<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    trigger: Option<TriggerRecord<'a>>,
}

/// Declared filename and the name it was written under.
#[derive(Debug, Serialize)]
struct FileRecord<'a> {
    filename: &'a str,
    path: String,
}

#[derive(Debug, Serialize)]
struct TriggerRecord<'a> {
    custom_id: String,
    label: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireEvent {
    Submission {
        id: String,
        channel: String,
        author: String,
        #[serde(default)]
        attachments: Vec<PathBuf>,
    },
    Activation {
        id: String,
        channel: String,
        custom_id: String,
        requester: String,
    },
}

pub struct LocalPlatform {
    root: PathBuf,
    bot: UserId,
    acknowledge_within: Duration,
}

impl LocalPlatform {
    /// `credential` identifies the bot; its own id is derived from it so the
    /// raw secret never lands on disk or in logs.
    pub fn new(root: impl Into<PathBuf>, credential: &str, acknowledge_within: Duration) -> Self {
        Self {
            root: root.into(),
            bot: bot_user_for(credential),
            acknowledge_within,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_dir(&self, location: &LocationRef) -> PathBuf {
        self.root
            .join("storage")
            .join(safe_component(&location.container))
            .join(safe_component(&location.record))
    }

    fn private_dir(&self, activation: &Activation) -> PathBuf {
        self.root
            .join("outbox")
            .join("private")
            .join(safe_component(&activation.requester.0))
            .join(safe_component(&activation.id))
    }

    /// Parse one JSON line into an [`Event`].
    ///
    /// Attachment paths are read eagerly; relative paths resolve against the
    /// current directory. The event's `received_at` is stamped now.
    pub async fn parse_event(&self, line: &str) -> Result<Event, PlatformError> {
        let wire: WireEvent = serde_json::from_str(line)?;
        Ok(match wire {
            WireEvent::Submission {
                id,
                channel,
                author,
                attachments,
            } => {
                let mut loaded = Vec::with_capacity(attachments.len());
                for path in attachments {
                    let bytes = tokio::fs::read(&path).await?;
                    let filename = path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .unwrap_or("attachment")
                        .to_string();
                    loaded.push(Attachment { filename, bytes });
                }
                Event::Submission(Submission {
                    id: BatchId(id),
                    channel: ChannelId(channel),
                    author: UserId(author),
                    attachments: loaded,
                })
            }
            WireEvent::Activation {
                id,
                channel,
                custom_id,
                requester,
            } => Event::Activation(Activation {
                id,
                channel: ChannelId(channel),
                custom_id,
                requester: UserId(requester),
                received_at: Instant::now(),
            }),
        })
    }
}

/// Stable, non-secret bot id derived from the credential.
fn bot_user_for(credential: &str) -> UserId {
    let digest = format!("{:x}", Sha256::digest(credential.as_bytes()));
    UserId(format!("bot-{}", &digest[..12]))
}

/// Replace anything that could escape a directory component.
fn safe_component(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => cleaned,
    }
}

/// On-disk name of the `index`-th file of a record or message.
fn indexed_name(index: usize, filename: &str) -> String {
    format!("{index:03}-{}", safe_component(filename))
}

/// Write a message record and its files into `dir`.
async fn write_message(
    dir: &Path,
    name: &str,
    content: &str,
    files: &[OutgoingFile],
    trigger: Option<TriggerRecord<'_>>,
) -> Result<(), PlatformError> {
    tokio::fs::create_dir_all(dir).await?;
    let mut written = Vec::with_capacity(files.len());
    for (index, file) in files.iter().enumerate() {
        let path = indexed_name(index, &file.filename);
        tokio::fs::write(dir.join(&path), &file.bytes).await?;
        written.push(FileRecord {
            filename: &file.filename,
            path,
        });
    }
    let record = MessageRecord {
        content,
        files: written,
        trigger,
    };
    tokio::fs::write(dir.join(name), serde_json::to_vec_pretty(&record)?).await?;
    Ok(())
}

#[async_trait]
impl Platform for LocalPlatform {
    fn bot_user(&self) -> &UserId {
        &self.bot
    }

    async fn send_public(
        &self,
        channel: &ChannelId,
        message: PublicMessage,
    ) -> Result<(), PlatformError> {
        let dir = self
            .root
            .join("outbox")
            .join("public")
            .join(safe_component(&channel.0))
            .join(uuid::Uuid::new_v4().simple().to_string());
        let trigger = message.trigger.as_ref().map(|t| TriggerRecord {
            custom_id: t.custom_id(),
            label: &t.label,
        });
        write_message(&dir, "message.json", &message.content, &message.files, trigger).await
    }

    async fn send_private(
        &self,
        activation: &Activation,
        message: PrivateMessage,
    ) -> Result<(), PlatformError> {
        write_message(
            &self.private_dir(activation),
            "message.json",
            &message.content,
            &message.files,
            None,
        )
        .await
    }

    async fn acknowledge(&self, activation: &Activation) -> Result<AckOutcome, PlatformError> {
        if activation.received_at.elapsed() > self.acknowledge_within {
            return Ok(AckOutcome::Expired);
        }
        write_message(
            &self.private_dir(activation),
            "ack.json",
            output::PROCESSING,
            &[],
            None,
        )
        .await?;
        Ok(AckOutcome::Acknowledged)
    }

    async fn update_acknowledgment(
        &self,
        activation: &Activation,
        message: PrivateMessage,
    ) -> Result<(), PlatformError> {
        let dir = self.private_dir(activation);
        if !tokio::fs::try_exists(dir.join("ack.json")).await? {
            return Err(PlatformError::Transport(format!(
                "no acknowledgment to update for activation {}",
                activation.id
            )));
        }
        write_message(&dir, "message.json", &message.content, &message.files, None).await
    }
}

#[async_trait]
impl BatchStorage for LocalPlatform {
    async fn store_batch(
        &self,
        container: &str,
        batch: &BatchId,
        files: Vec<StoredFile>,
    ) -> Result<String, PlatformError> {
        let record = uuid::Uuid::new_v4().simple().to_string();
        let dir = self.record_dir(&LocationRef::new(container, record.clone()));
        tokio::fs::create_dir_all(&dir).await?;

        for (index, file) in files.iter().enumerate() {
            tokio::fs::write(dir.join(indexed_name(index, &file.filename)), &file.bytes).await?;
        }
        let manifest = Manifest {
            batch: batch.clone(),
            files: files.into_iter().map(|f| f.filename).collect(),
        };
        tokio::fs::write(dir.join(MANIFEST), serde_json::to_vec_pretty(&manifest)?).await?;
        Ok(record)
    }

    async fn fetch_stored_batch(
        &self,
        location: &LocationRef,
    ) -> Result<Option<StoredBatch>, PlatformError> {
        let dir = self.record_dir(location);
        let manifest = match tokio::fs::read(dir.join(MANIFEST)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let manifest: Manifest = serde_json::from_slice(&manifest)?;

        let mut files = Vec::with_capacity(manifest.files.len());
        for (index, filename) in manifest.files.into_iter().enumerate() {
            let path = dir.join(indexed_name(index, &filename));
            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
                Err(e) => return Err(e.into()),
            };
            files.push(StoredFile { filename, bytes });
        }
        Ok(Some(StoredBatch {
            batch: manifest.batch,
            files,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::Handle;
    use crate::platform::Trigger;
    use tempfile::TempDir;

    fn platform(tmp: &TempDir) -> LocalPlatform {
        LocalPlatform::new(tmp.path(), "secret-token", Duration::from_secs(3))
    }

    fn activation(received_at: Instant) -> Activation {
        Activation {
            id: "act-1".into(),
            channel: ChannelId("general".into()),
            custom_id: "reveal:x".into(),
            requester: UserId("u-9".into()),
            received_at,
        }
    }

    // =========================================================================
    // Identity and paths
    // =========================================================================

    #[test]
    fn bot_user_is_derived_not_leaked() {
        let bot = bot_user_for("secret-token");
        assert!(bot.0.starts_with("bot-"));
        assert!(!bot.0.contains("secret"));
        assert_eq!(bot, bot_user_for("secret-token"));
        assert_ne!(bot, bot_user_for("other"));
    }

    #[test]
    fn safe_component_blocks_traversal() {
        assert_eq!(safe_component("../etc"), ".._etc");
        assert_eq!(safe_component(".."), "_");
        assert_eq!(safe_component(""), "_");
        assert_eq!(safe_component("a/b\\c"), "a_b_c");
        assert_eq!(safe_component("cat-1.png"), "cat-1.png");
    }

    // =========================================================================
    // Storage
    // =========================================================================

    #[tokio::test]
    async fn stored_batch_roundtrips_in_order() {
        let tmp = TempDir::new().unwrap();
        let platform = platform(&tmp);
        let files = vec![
            StoredFile {
                filename: "b.png".into(),
                bytes: vec![2],
            },
            StoredFile {
                filename: "a.png".into(),
                bytes: vec![1],
            },
        ];
        let record = platform
            .store_batch("image-store", &BatchId("m1".into()), files.clone())
            .await
            .unwrap();
        let location = LocationRef::new("image-store", record);

        let fetched = platform.fetch_stored_batch(&location).await.unwrap().unwrap();
        assert_eq!(fetched.batch, BatchId("m1".into()));
        assert_eq!(fetched.files, files);
    }

    #[tokio::test]
    async fn deleted_record_is_none() {
        let tmp = TempDir::new().unwrap();
        let platform = platform(&tmp);
        let record = platform
            .store_batch("c", &BatchId("m".into()), vec![])
            .await
            .unwrap();
        let location = LocationRef::new("c", record);

        std::fs::remove_dir_all(platform.record_dir(&location)).unwrap();
        assert!(platform.fetch_stored_batch(&location).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unknown_record_is_none() {
        let tmp = TempDir::new().unwrap();
        let platform = platform(&tmp);
        let location = LocationRef::new("c", "missing");
        assert!(platform.fetch_stored_batch(&location).await.unwrap().is_none());
    }

    // =========================================================================
    // Outbox
    // =========================================================================

    #[tokio::test]
    async fn public_message_writes_files_and_trigger() {
        let tmp = TempDir::new().unwrap();
        let platform = platform(&tmp);
        let handle: Handle = "c/r/0123456789abcdef".parse().unwrap();
        let message = PublicMessage {
            content: "1 image".into(),
            files: vec![OutgoingFile {
                filename: "blurred_cat.png".into(),
                bytes: vec![7, 7],
            }],
            trigger: Some(Trigger::new(handle, "Reveal with my ID")),
        };
        platform
            .send_public(&ChannelId("general".into()), message)
            .await
            .unwrap();

        let channel_dir = tmp.path().join("outbox/public/general");
        let entries: Vec<_> = std::fs::read_dir(&channel_dir).unwrap().collect();
        assert_eq!(entries.len(), 1);
        let dir = entries[0].as_ref().unwrap().path();
        assert_eq!(std::fs::read(dir.join("000-blurred_cat.png")).unwrap(), vec![7, 7]);
        let json = std::fs::read_to_string(dir.join("message.json")).unwrap();
        assert!(json.contains("reveal:c/r/0123456789abcdef"));
    }

    fn colliding_files() -> Vec<OutgoingFile> {
        // Both sanitize to `blurred__.png`.
        vec![
            OutgoingFile {
                filename: "blurred_猫.png".into(),
                bytes: vec![1],
            },
            OutgoingFile {
                filename: "blurred_犬.png".into(),
                bytes: vec![2],
            },
        ]
    }

    fn sorted_entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn public_files_with_colliding_names_are_all_kept() {
        let tmp = TempDir::new().unwrap();
        let platform = platform(&tmp);
        let message = PublicMessage {
            content: "2 images".into(),
            files: colliding_files(),
            trigger: None,
        };
        platform
            .send_public(&ChannelId("general".into()), message)
            .await
            .unwrap();

        let channel_dir = tmp.path().join("outbox/public/general");
        let dir = std::fs::read_dir(&channel_dir)
            .unwrap()
            .next()
            .unwrap()
            .unwrap()
            .path();
        assert_eq!(
            sorted_entries(&dir),
            ["000-blurred__.png", "001-blurred__.png", "message.json"]
        );
        assert_eq!(std::fs::read(dir.join("000-blurred__.png")).unwrap(), vec![1]);
        assert_eq!(std::fs::read(dir.join("001-blurred__.png")).unwrap(), vec![2]);

        let json: serde_json::Value =
            serde_json::from_slice(&std::fs::read(dir.join("message.json")).unwrap()).unwrap();
        assert_eq!(json["files"][0]["filename"], "blurred_猫.png");
        assert_eq!(json["files"][1]["path"], "001-blurred__.png");
    }

    #[tokio::test]
    async fn private_files_with_colliding_names_are_all_kept() {
        let tmp = TempDir::new().unwrap();
        let platform = platform(&tmp);
        let act = activation(Instant::now());
        platform.acknowledge(&act).await.unwrap();
        let message = PrivateMessage {
            content: "2 images".into(),
            files: colliding_files(),
        };
        platform.update_acknowledgment(&act, message).await.unwrap();

        let dir = tmp.path().join("outbox/private/u-9/act-1");
        assert_eq!(
            sorted_entries(&dir),
            ["000-blurred__.png", "001-blurred__.png", "ack.json", "message.json"]
        );
    }

    #[tokio::test]
    async fn acknowledge_then_update() {
        let tmp = TempDir::new().unwrap();
        let platform = platform(&tmp);
        let act = activation(Instant::now());

        assert_eq!(
            platform.acknowledge(&act).await.unwrap(),
            AckOutcome::Acknowledged
        );
        platform
            .update_acknowledgment(&act, PrivateMessage::notice("done"))
            .await
            .unwrap();

        let dir = tmp.path().join("outbox/private/u-9/act-1");
        let ack = std::fs::read_to_string(dir.join("ack.json")).unwrap();
        assert!(ack.contains(output::PROCESSING));
        let json = std::fs::read_to_string(dir.join("message.json")).unwrap();
        assert!(json.contains("done"));
    }

    #[tokio::test]
    async fn update_without_ack_is_transport_error() {
        let tmp = TempDir::new().unwrap();
        let platform = platform(&tmp);
        let result = platform
            .update_acknowledgment(&activation(Instant::now()), PrivateMessage::notice("x"))
            .await;
        assert!(matches!(result, Err(PlatformError::Transport(_))));
    }

    #[tokio::test]
    async fn late_acknowledge_expires() {
        let tmp = TempDir::new().unwrap();
        let platform = LocalPlatform::new(tmp.path(), "t", Duration::from_millis(10));
        let act = activation(Instant::now());
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(platform.acknowledge(&act).await.unwrap(), AckOutcome::Expired);
        assert!(!tmp.path().join("outbox/private/u-9/act-1/ack.json").exists());
    }

    // =========================================================================
    // Event parsing
    // =========================================================================

    #[tokio::test]
    async fn parses_submission_and_reads_attachments() {
        let tmp = TempDir::new().unwrap();
        let platform = platform(&tmp);
        let path = tmp.path().join("cat.png");
        std::fs::write(&path, b"bytes").unwrap();

        let line = serde_json::json!({
            "type": "submission",
            "id": "m1",
            "channel": "general",
            "author": "u1",
            "attachments": [path],
        })
        .to_string();

        let Event::Submission(submission) = platform.parse_event(&line).await.unwrap() else {
            panic!("expected submission");
        };
        assert_eq!(submission.id, BatchId("m1".into()));
        assert_eq!(submission.attachments.len(), 1);
        assert_eq!(submission.attachments[0].filename, "cat.png");
        assert_eq!(submission.attachments[0].bytes, b"bytes");
    }

    #[tokio::test]
    async fn parses_activation() {
        let tmp = TempDir::new().unwrap();
        let platform = platform(&tmp);
        let line = r#"{"type":"activation","id":"a1","channel":"g","custom_id":"reveal:c/r/0123456789abcdef","requester":"u2"}"#;

        let Event::Activation(activation) = platform.parse_event(line).await.unwrap() else {
            panic!("expected activation");
        };
        assert_eq!(activation.requester, UserId("u2".into()));
        assert_eq!(activation.custom_id, "reveal:c/r/0123456789abcdef");
    }

    #[tokio::test]
    async fn rejects_unknown_event_type() {
        let tmp = TempDir::new().unwrap();
        let platform = platform(&tmp);
        let result = platform.parse_event(r#"{"type":"reaction","id":"x"}"#).await;
        assert!(matches!(result, Err(PlatformError::Json(_))));
    }

    #[tokio::test]
    async fn missing_attachment_is_io_error() {
        let tmp = TempDir::new().unwrap();
        let platform = platform(&tmp);
        let line = r#"{"type":"submission","id":"m","channel":"c","author":"u","attachments":["/nonexistent/x.png"]}"#;
        assert!(matches!(
            platform.parse_event(line).await,
            Err(PlatformError::Io(_))
        ));
    }
}
