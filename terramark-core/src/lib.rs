//! terramark-core: shared primitives for the Terramark annotation backend
//!
//! Holds the pieces every other crate depends on: the internal error type,
//! storage/engine configuration, mask and polygon primitives, the opaque
//! segmentation-model capability, and the storage-path resolution rule.

pub mod config;
pub mod error;
pub mod mask;
pub mod model;
pub mod paths;

pub use config::{DeploymentMode, EngineConfig, StorageConfig};
pub use error::{Error, Result};
pub use mask::{Mask, PixelPoint, Polygon, ScoredMask};
pub use model::SegmentationModel;
pub use paths::resolve_storage_path;
