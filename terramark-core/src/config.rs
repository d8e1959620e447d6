//! Configuration for the Terramark storage layout and segmentation engine

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Deployment mode deciding how relative storage paths are anchored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeploymentMode {
    /// Running inside a container; paths anchor at a fixed application root
    Container,
    /// Running from a local checkout; paths anchor at the project root
    Local,
}

/// On-disk layout for uploaded images and annotation artifacts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub mode: DeploymentMode,
    /// Root that relative `uploads/...` paths are joined against
    pub base_dir: PathBuf,
    /// Directory holding uploaded image files
    pub upload_dir: PathBuf,
    /// Directory holding polygon artifacts
    pub annotation_dir: PathBuf,
}

impl StorageConfig {
    /// Layout used when running inside a container
    pub fn container() -> Self {
        let base = PathBuf::from("/app");
        Self {
            mode: DeploymentMode::Container,
            upload_dir: base.join("uploads"),
            annotation_dir: base.join("annotations"),
            base_dir: base,
        }
    }

    /// Layout anchored at a local project root
    pub fn local(root: impl Into<PathBuf>) -> Self {
        let base = root.into();
        Self {
            mode: DeploymentMode::Local,
            upload_dir: base.join("uploads"),
            annotation_dir: base.join("annotations"),
            base_dir: base,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.base_dir.as_os_str().is_empty() {
            return Err(Error::Config("Base directory must not be empty".to_string()));
        }
        if self.upload_dir.as_os_str().is_empty() {
            return Err(Error::Config("Upload directory must not be empty".to_string()));
        }
        if self.annotation_dir.as_os_str().is_empty() {
            return Err(Error::Config(
                "Annotation directory must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Segmentation engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Score above which a mask pixel counts as foreground
    pub mask_threshold: f32,
    /// Express polygons in [0,1] coordinates relative to image dimensions
    pub normalize_polygons: bool,
    /// Grid step for point-mask cache keys; 1 means exact pixel
    pub point_quantization: u32,
    /// Upper bound on one segmentation request's model work
    pub segment_timeout: Duration,
    /// Number of images whose context metadata is retained before eviction
    pub max_cached_images: usize,
    /// Per-session cap on queued notifications while no listener is attached
    pub pending_backlog: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mask_threshold: 0.5,
            normalize_polygons: true,
            point_quantization: 1,
            segment_timeout: Duration::from_secs(30),
            max_cached_images: 16,
            pending_backlog: 32,
        }
    }
}

impl EngineConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !self.mask_threshold.is_finite() || !(0.0..=1.0).contains(&self.mask_threshold) {
            return Err(Error::Config(
                "Mask threshold must be within [0, 1]".to_string(),
            ));
        }
        if self.point_quantization == 0 {
            return Err(Error::Config(
                "Point quantization step must be at least 1".to_string(),
            ));
        }
        if self.segment_timeout.is_zero() {
            return Err(Error::Config("Segment timeout must be non-zero".to_string()));
        }
        if self.max_cached_images == 0 {
            return Err(Error::Config(
                "Image cache bound must be at least 1".to_string(),
            ));
        }
        if self.pending_backlog == 0 {
            return Err(Error::Config(
                "Pending notification backlog must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
