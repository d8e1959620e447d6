//! The opaque segmentation-model capability consumed by the engine

use crate::error::Result;
use crate::mask::{PixelPoint, ScoredMask};
use image::RgbImage;

/// Point-prompt segmentation model.
///
/// The model holds a single live context: `set_context` runs the expensive
/// per-image embedding computation and replaces whatever image was loaded
/// before. `predict` answers point queries against that context only.
///
/// Both calls may take seconds and are not assumed safe under concurrent
/// context switches; the engine serializes all access behind one exclusive
/// lock and drives the calls through `spawn_blocking`.
pub trait SegmentationModel: Send + Sync {
    /// Load an image into the model context, computing its embedding
    fn set_context(&self, image: &RgbImage) -> Result<()>;

    /// Predict candidate masks for a foreground point on the loaded context
    fn predict(&self, point: PixelPoint) -> Result<Vec<ScoredMask>>;
}
