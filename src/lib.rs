//! # Blurmark
//!
//! A chat bot that hides shared images behind a blur and reveals them only to
//! whoever asks, with that person's ID stamped into each image.
//!
//! # Architecture: Two Pipelines, One Loop
//!
//! ```text
//! Ingest   submission ─► Pool(blur) ─► HandleStore::register ─► public preview + trigger
//! Reveal   trigger ─► acknowledge ─► HandleStore::resolve ─► Pool(stamp) ─► private reply
//! ```
//!
//! All events are handled on one cooperative, single-threaded loop. CPU work
//! never runs there: blur and stamp go to a small bounded [`pool`] of worker
//! threads and the loop only awaits their results.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`imaging`] | Blur and stamp transforms on encoded bytes (`image` + `ab_glyph`) |
//! | [`pool`] | Bounded FIFO worker pool with awaitable results |
//! | [`handle`] | Compact, verifiable references to originals held in storage |
//! | [`ingest`] | Submission → blurred public preview with a reveal trigger |
//! | [`reveal`] | Deadline-bound activation → privately delivered stamped originals |
//! | [`bot`] | `BotState` and the event loop |
//! | [`platform`] | Chat-platform and storage traits, memory and filesystem adapters |
//! | [`liveness`] | `GET /` health endpoint |
//! | [`config`] | `config.toml` loading, merging, and validation |
//! | [`types`] | Ids, assets, batches, and submissions shared across modules |
//! | [`output`] | Chat message wording and CLI status lines |
//!
//! # Design Decisions
//!
//! ## No Bytes Between Events
//!
//! Reveals can come days after a submission. Instead of keeping originals in
//! memory, ingest parks them with the storage collaborator and embeds a
//! [`handle::Handle`] in the trigger. The handle carries the location and a
//! content digest, so any process that can reach storage can serve a reveal
//! and a handle can never silently resolve to different images.
//!
//! ## Deadlines Are Part of the Protocol
//!
//! Platforms drop activations that are not acknowledged within seconds, and
//! drop the follow-up after a longer window. [`reveal`] checks the first
//! deadline before sending anything, bounds the rest by the second, and
//! abandons rather than retries.
//!
//! ## Pure-Rust Imaging
//!
//! Decoding, blurring, compositing, and PNG encoding use the `image` crate;
//! labels are rasterized with `ab_glyph`. When no font file is available a
//! compiled-in bitmap font keeps stamping working.

pub mod bot;
pub mod config;
pub mod handle;
pub mod imaging;
pub mod ingest;
pub mod liveness;
pub mod output;
pub mod platform;
pub mod pool;
pub mod reveal;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
