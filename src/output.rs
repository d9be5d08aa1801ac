//! User-facing text: chat messages and CLI status lines.
//!
//! # Chat messages
//!
//! Every string the bot posts lives here so wording stays consistent between
//! ingest and reveal, and so tests can assert on it without duplicating
//! literals:
//!
//! ```text
//! 3 images processed. Press the button to reveal them with your ID.   (public)
//! [Reveal with my ID]                                                  (trigger)
//! Processing your images...                                            (ack)
//! Stamped your ID (42) onto 3 images.                                  (private)
//! ```
//!
//! # CLI output
//!
//! ```text
//! serve: pool 2 workers, font DejaVuSans.ttf, liveness :8080
//! ingest m1: published 3 previews (skipped: broken.png) -> image-store/…/9b74c9897bac770f
//! reveal a1: delivered 3 images to 42
//! reveal a2: abandoned (acknowledgment deadline passed)
//! ```
//!
//! # Architecture
//!
//! Each output has a `format_*` function for testability and, where the CLI
//! prints it, a `print_*` wrapper that writes to stdout. Format functions are
//! pure, with no I/O.

use crate::config::BotConfig;
use crate::ingest::{IgnoreReason, IngestError, IngestOutcome};
use crate::reveal::{AbandonReason, RevealFailure, RevealOutcome};
use crate::types::{RequesterIdentity, file_stem};

/// Label on the reveal trigger.
pub const TRIGGER_LABEL: &str = "Reveal with my ID";

/// Acknowledgment shown while a reveal is processed.
pub const PROCESSING: &str = "Processing your images...";

fn images(count: usize) -> String {
    if count == 1 {
        "1 image".to_string()
    } else {
        format!("{count} images")
    }
}

// ============================================================================
// Chat messages
// ============================================================================

/// Caption of the public preview.
pub fn preview_caption(count: usize) -> String {
    format!(
        "{} processed. Press the button to reveal them with your ID.",
        images(count)
    )
}

/// Private text accompanying stamped images.
pub fn delivered_text(identity: &RequesterIdentity, count: usize) -> String {
    format!("Stamped your ID ({identity}) onto {}.", images(count))
}

/// Public notice when no attachment of a submission could be blurred.
pub fn ingest_all_failed_notice(attempted: usize) -> String {
    format!("Could not process any of the {} you sent.", images(attempted))
}

/// Public notice when storing or publishing failed.
pub fn ingest_transport_notice() -> String {
    "Could not publish a preview of your images, please try again.".to_string()
}

/// Private notice for a failed reveal.
pub fn reveal_failure_notice(failure: &RevealFailure) -> String {
    match failure {
        RevealFailure::NotFound => "The original images could not be found.".to_string(),
        RevealFailure::Corrupted => {
            "The original images changed since they were posted.".to_string()
        }
        RevealFailure::NothingStamped => "None of the images could be stamped.".to_string(),
        RevealFailure::Transport(_) => {
            "Something went wrong delivering your images, please try again.".to_string()
        }
    }
}

/// `blurred_<stem>.png`
pub fn preview_filename(original: &str) -> String {
    format!("blurred_{}.png", file_stem(original))
}

/// `stamped_<stem>.png`
pub fn stamped_filename(original: &str) -> String {
    format!("stamped_{}.png", file_stem(original))
}

// ============================================================================
// CLI status lines
// ============================================================================

/// One line summarizing what `serve` started with.
pub fn format_startup(pool_size: usize, font: Option<&str>, port: Option<u16>) -> String {
    let font = font.unwrap_or("built-in bitmap");
    let liveness = match port {
        Some(p) => format!(":{p}"),
        None => "disabled".to_string(),
    };
    format!(
        "serve: pool {} worker{}, font {font}, liveness {liveness}",
        pool_size,
        if pool_size == 1 { "" } else { "s" }
    )
}

pub fn print_startup(pool_size: usize, font: Option<&str>, port: Option<u16>) {
    println!("{}", format_startup(pool_size, font, port));
}

fn ignore_reason(reason: IgnoreReason) -> &'static str {
    match reason {
        IgnoreReason::OwnMessage => "own message",
        IgnoreReason::NoAttachments => "no attachments",
        IgnoreReason::NothingWhitelisted => "no supported images",
    }
}

fn abandon_reason(reason: AbandonReason) -> &'static str {
    match reason {
        AbandonReason::DeadlinePassed => "acknowledgment deadline passed",
        AbandonReason::AckExpired => "platform expired the acknowledgment",
        AbandonReason::FollowupElapsed => "follow-up window elapsed",
    }
}

pub fn format_ingest_outcome(batch: &str, outcome: &IngestOutcome) -> String {
    match outcome {
        IngestOutcome::Ignored(reason) => {
            format!("ingest {batch}: ignored ({})", ignore_reason(*reason))
        }
        IngestOutcome::Published {
            handle,
            previews,
            skipped,
        } => {
            let skipped = if skipped.is_empty() {
                String::new()
            } else {
                format!(" (skipped: {})", skipped.join(", "))
            };
            format!(
                "ingest {batch}: published {previews} preview{}{skipped} -> {handle}",
                if *previews == 1 { "" } else { "s" }
            )
        }
        IngestOutcome::Failed(err) => match err {
            IngestError::AllFailed { attempted } => {
                format!("ingest {batch}: failed, none of {} decoded", images(*attempted))
            }
            other => format!("ingest {batch}: failed ({other})"),
        },
    }
}

pub fn format_reveal_outcome(activation: &str, outcome: &RevealOutcome) -> String {
    match outcome {
        RevealOutcome::Delivered {
            requester,
            delivered,
            skipped,
        } => {
            let skipped = if *skipped == 0 {
                String::new()
            } else {
                format!(", skipped {skipped}")
            };
            format!(
                "reveal {activation}: delivered {} to {requester}{skipped}",
                images(*delivered)
            )
        }
        RevealOutcome::Failed(failure) => format!("reveal {activation}: failed ({failure})"),
        RevealOutcome::Abandoned(reason) => {
            format!("reveal {activation}: abandoned ({})", abandon_reason(*reason))
        }
    }
}

/// Summary printed by `check-config`.
pub fn format_config_check(config: &BotConfig, font: Option<&str>) -> Vec<String> {
    vec![
        "Config OK".to_string(),
        format!("    pool: {} workers", config.pool.size),
        format!(
            "    blur: radius {}, watermark: opacity {}/255, margin {}px",
            config.blur.radius, config.watermark.opacity, config.watermark.margin
        ),
        format!("    font: {}", font.unwrap_or("built-in bitmap")),
        format!("    media: {}", config.media.extensions.join(", ")),
        format!("    storage: {}", config.storage.container),
        format!(
            "    deadlines: ack {}ms, follow-up {}s",
            config.deadlines.acknowledge_ms, config.deadlines.followup_secs
        ),
    ]
}

pub fn print_config_check(config: &BotConfig, font: Option<&str>) {
    for line in format_config_check(config, font) {
        println!("{line}");
    }
}

/// Result line for the `blur` / `stamp` subcommands.
pub fn format_transform_result(op: &str, input: &str, output: &str, bytes: usize) -> String {
    format!("{op}: {input} -> {output} ({bytes} bytes)")
}

pub fn print_transform_result(op: &str, input: &str, output: &str, bytes: usize) {
    println!("{}", format_transform_result(op, input, output, bytes));
}
