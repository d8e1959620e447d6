//! Model context cache
//!
//! Memoizes the expensive per-image embedding computation and the per-point
//! mask results, and tracks which image is resident in the single shared
//! model context. Cache membership and residency are separate axes: an
//! entry records that an image was embedded once (dimensions plus point
//! masks stay valid), while the residency marker names the one image whose
//! embedding is actually loaded into the model right now.
//!
//! All model calls and every mutation of residency or cache structure run
//! under one exclusive lock; the model is a de facto single concurrent
//! worker. A lock-free pre-check short-circuits pure hits, and every slow
//! path re-checks the cache after acquiring the lock because another caller
//! may have populated it first.

use crate::polygon;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use terramark_core::{EngineConfig, Error, Mask, PixelPoint, Polygon, Result, ScoredMask, SegmentationModel};
use tracing::{debug, info, warn};

struct ContextEntry {
    /// Image pixel dimensions as (height, width)
    dimensions: (u32, u32),
    /// Point-mask cache keyed by (quantized) pixel coordinate
    masks: HashMap<PixelPoint, Mask>,
    last_used: Instant,
}

/// Process-wide cache in front of the shared segmentation model.
///
/// Keyed by resolved image path, deliberately not session-scoped:
/// embeddings are a function of image bytes, so cross-session sharing is a
/// correctness-preserving optimization.
pub struct ModelContextCache {
    model: Arc<dyn SegmentationModel>,
    config: EngineConfig,
    entries: DashMap<PathBuf, ContextEntry>,
    /// Which image's embedding the model context currently holds
    current: RwLock<Option<PathBuf>>,
    /// Exclusive critical section spanning set-context and predict calls
    model_lock: tokio::sync::Mutex<()>,
}

impl ModelContextCache {
    pub fn new(model: Arc<dyn SegmentationModel>, config: EngineConfig) -> Self {
        Self {
            model,
            config,
            entries: DashMap::new(),
            current: RwLock::new(None),
            model_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Whether `path` is the image loaded into the live model context
    pub fn is_resident(&self, path: &Path) -> bool {
        self.current.read().as_deref() == Some(path)
    }

    /// Cached dimensions as (height, width), regardless of residency
    pub fn dimensions(&self, path: &Path) -> Option<(u32, u32)> {
        self.entries.get(path).map(|entry| entry.dimensions)
    }

    /// Whether a mask for this point is already cached, without touching
    /// the model or residency
    pub fn has_cached_point(&self, path: &Path, point: PixelPoint) -> bool {
        let key = point.quantize(self.config.point_quantization);
        self.cached_mask(path, key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Make `path` resident in the model context, computing its embedding if
    /// it was never seen. Returns the image dimensions as (height, width).
    ///
    /// A cached entry whose embedding was displaced by another image is
    /// reloaded without discarding its point-mask cache. Read or decode
    /// failures leave cache and residency state unchanged.
    pub async fn ensure_loaded(&self, path: &Path) -> Result<(u32, u32)> {
        // Fast pre-check: resident and cached means no I/O and no model work.
        if self.is_resident(path) {
            if let Some(dims) = self.touch(path) {
                return Ok(dims);
            }
        }

        let _guard = self.model_lock.lock().await;

        // Re-check under the lock: another caller may have loaded it first.
        if self.is_resident(path) {
            if let Some(dims) = self.touch(path) {
                debug!("Context already resident for {:?}", path);
                return Ok(dims);
            }
        }

        if let Some(dims) = self.touch(path) {
            // Cached but evicted from the live context: reload the
            // embedding; dimensions and point masks stay valid.
            debug!("Re-loading cached image into model context: {:?}", path);
            self.load_context(path).await?;
            *self.current.write() = Some(path.to_path_buf());
            return Ok(dims);
        }

        info!("Loading and processing new image: {:?}", path);
        let dims = self.load_context(path).await?;
        self.install_entry(path, dims);
        Ok(dims)
    }

    /// Predict a mask for a pixel point on an image made resident by
    /// `ensure_loaded`. Returns the mask and whether it was a cache hit.
    pub async fn predict_point(&self, path: &Path, point: PixelPoint) -> Result<(Mask, bool)> {
        let key = point.quantize(self.config.point_quantization);

        // Fast pre-check without the lock
        if self.is_resident(path) {
            if let Some(mask) = self.cached_mask(path, key) {
                debug!("Cached mask hit for point ({}, {})", key.x, key.y);
                return Ok((mask, true));
            }
        }

        let _guard = self.model_lock.lock().await;

        if !self.entries.contains_key(path) {
            return Err(Error::Context(format!(
                "image {} not loaded; call ensure_loaded first",
                path.display()
            )));
        }

        // Double-check: another caller may have populated this point while
        // we waited on the lock.
        if let Some(mask) = self.cached_mask(path, key) {
            debug!(
                "Using cached mask for point ({}, {}) added by another caller",
                key.x, key.y
            );
            self.touch(path);
            return Ok((mask, true));
        }

        // Another request may have switched the live context between the
        // caller's ensure_loaded and this call; restore residency first.
        if !self.is_resident(path) {
            debug!("Restoring model context residency for {:?}", path);
            self.load_context(path).await?;
            *self.current.write() = Some(path.to_path_buf());
        }

        debug!("Generating new mask for point ({}, {})", key.x, key.y);
        let model = Arc::clone(&self.model);
        let candidates = tokio::task::spawn_blocking(move || model.predict(key))
            .await
            .map_err(|e| Error::Model(format!("prediction task failed: {}", e)))??;

        let best = select_best(&candidates).ok_or_else(|| {
            Error::InvalidMask(format!(
                "model returned no mask candidates for point ({}, {})",
                key.x, key.y
            ))
        })?;
        debug!("Mask generated (confidence: {:.3})", best.confidence);

        let mask = best.binarize(self.config.mask_threshold);
        if let Some(mut entry) = self.entries.get_mut(path) {
            entry.masks.insert(key, mask.clone());
            entry.last_used = Instant::now();
        }
        Ok((mask, false))
    }

    /// Warm the cache for an image ahead of user interaction. Returns true
    /// when an embedding was computed, false when the image was already
    /// cached (idempotent; residency is not required for the short-circuit).
    pub async fn preprocess(&self, path: &Path) -> Result<bool> {
        if self.entries.contains_key(path) {
            return Ok(false);
        }

        let _guard = self.model_lock.lock().await;
        if self.entries.contains_key(path) {
            debug!("Image {:?} already has a cached embedding", path);
            return Ok(false);
        }

        info!("Pre-processing image for faster segmentation: {:?}", path);
        let dims = self.load_context(path).await?;
        self.install_entry(path, dims);
        Ok(true)
    }

    /// Drop one image's cache entry, or everything when no path is given.
    /// Clears the residency marker when it pointed at a dropped entry.
    pub fn invalidate(&self, path: Option<&Path>) {
        match path {
            Some(path) => {
                self.entries.remove(path);
                let mut current = self.current.write();
                if current.as_deref() == Some(path) {
                    *current = None;
                }
                debug!("Cache invalidated for {:?}", path);
            }
            None => {
                self.entries.clear();
                *self.current.write() = None;
                debug!("Cache cleared");
            }
        }
    }

    /// Convert a binary mask into a boundary polygon, normalized to [0,1]
    /// coordinates when the engine is configured for it. Returns `None` for
    /// an all-background mask.
    pub fn mask_to_polygon(&self, mask: &Mask) -> Option<Polygon> {
        let ring = polygon::trace_outline(mask)?;
        if self.config.normalize_polygons {
            Some(polygon::normalize(ring, mask.width(), mask.height()))
        } else {
            Some(ring)
        }
    }

    /// Read bytes, decode, and push the image through the model's
    /// set-context capability. Must be called while holding `model_lock`.
    async fn load_context(&self, path: &Path) -> Result<(u32, u32)> {
        let bytes = tokio::fs::read(path).await?;
        let model = Arc::clone(&self.model);
        let display = path.display().to_string();
        tokio::task::spawn_blocking(move || -> Result<(u32, u32)> {
            let decoded = image::load_from_memory(&bytes)
                .map_err(|e| Error::Image(format!("could not decode image {}: {}", display, e)))?
                .to_rgb8();
            let dims = (decoded.height(), decoded.width());
            model.set_context(&decoded)?;
            Ok(dims)
        })
        .await
        .map_err(|e| Error::Model(format!("context load task failed: {}", e)))?
    }

    fn install_entry(&self, path: &Path, dimensions: (u32, u32)) {
        self.evict_if_full();
        self.entries.insert(
            path.to_path_buf(),
            ContextEntry {
                dimensions,
                masks: HashMap::new(),
                last_used: Instant::now(),
            },
        );
        *self.current.write() = Some(path.to_path_buf());
    }

    /// Evict least-recently-used non-resident entries until within bounds
    fn evict_if_full(&self) {
        while self.entries.len() >= self.config.max_cached_images {
            let resident = self.current.read().clone();
            let victim = self
                .entries
                .iter()
                .filter(|entry| Some(entry.key()) != resident.as_ref())
                .min_by_key(|entry| entry.last_used)
                .map(|entry| entry.key().clone());
            match victim {
                Some(victim) => {
                    warn!("Image cache full; evicting {:?}", victim);
                    self.entries.remove(&victim);
                }
                None => break,
            }
        }
    }

    fn touch(&self, path: &Path) -> Option<(u32, u32)> {
        self.entries.get_mut(path).map(|mut entry| {
            entry.last_used = Instant::now();
            entry.dimensions
        })
    }

    fn cached_mask(&self, path: &Path, key: PixelPoint) -> Option<Mask> {
        self.entries.get(path)?.masks.get(&key).cloned()
    }
}

/// Highest-confidence candidate; ties keep the first occurrence
fn select_best(candidates: &[ScoredMask]) -> Option<&ScoredMask> {
    let mut best: Option<&ScoredMask> = None;
    for candidate in candidates {
        match best {
            Some(current) if candidate.confidence > current.confidence => best = Some(candidate),
            None => best = Some(candidate),
            _ => {}
        }
    }
    best
}
