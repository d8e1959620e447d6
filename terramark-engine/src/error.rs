//! Error taxonomy exposed by the segmentation façade

use terramark_core::Error as CoreError;
use thiserror::Error;

/// The only failures visible to external collaborators of the engine.
///
/// Cache misses are normal control flow, never errors; `Timeout` means the
/// model work exceeded its bound but may still complete in the background
/// and silently populate the cache for later callers.
#[derive(Error, Debug)]
pub enum SegmentError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Resource unavailable: {0}")]
    ResourceUnavailable(String),

    #[error("Invalid result: {0}")]
    InvalidResult(String),

    #[error("Segmentation timed out")]
    Timeout,
}

impl From<CoreError> for SegmentError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidMask(msg) => SegmentError::InvalidResult(msg),
            other => SegmentError::ResourceUnavailable(other.to_string()),
        }
    }
}
