//! terramark-engine: segmentation cache, façade and notifier
//!
//! The stateful layer between the session registry and the underlying
//! point-prompt segmentation model: memoizes per-image embedding contexts
//! and per-point masks, serializes all model access behind one exclusive
//! lock, converts masks to boundary polygons, and notifies sessions when
//! background precomputes finish.

pub mod cache;
pub mod error;
pub mod notify;
pub mod polygon;
pub mod segmentation;

pub use cache::ModelContextCache;
pub use error::SegmentError;
pub use notify::NotificationHub;
pub use segmentation::{ManualAnnotation, SegmentOutcome, SegmentationService};
