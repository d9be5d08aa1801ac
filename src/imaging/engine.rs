//! Transform engine trait and shared error type.
//!
//! The [`TransformEngine`] trait defines the two operations the pipeline
//! needs: `blur` for public previews and `stamp` for personalized reveals.
//! Both take encoded bytes and return encoded bytes, so callers never touch
//! pixel buffers and the orchestrators stay testable with a mock.
//!
//! The production implementation is
//! [`RustEngine`](super::rust_engine::RustEngine).

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransformError {
    #[error("cannot decode image: {0}")]
    Decode(String),
    #[error("cannot encode image: {0}")]
    Encode(String),
}

/// CPU-bound image transforms.
///
/// Implementations must be free of shared mutable state: the worker pool calls
/// them from several threads at once on independent inputs.
pub trait TransformEngine: Send + Sync {
    /// Low-fidelity public preview. Deterministic for a given input.
    fn blur(&self, bytes: &[u8]) -> Result<Vec<u8>, TransformError>;

    /// Copy of the image with `identity` rendered into the bottom-right corner.
    /// The input is never modified.
    fn stamp(&self, bytes: &[u8], identity: &str) -> Result<Vec<u8>, TransformError>;
}
