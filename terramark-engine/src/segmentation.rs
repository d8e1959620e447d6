//! Segmentation façade
//!
//! Orchestrates a point-segmentation request end to end: resolve the image
//! through the session store, make it resident in the model context, predict
//! a mask for the clicked point, convert it to a polygon, persist the
//! polygon artifact and record an annotation. Also owns the background
//! warmup path that makes freshly uploaded images interactive.

use crate::cache::ModelContextCache;
use crate::error::SegmentError;
use crate::notify::NotificationHub;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use terramark_core::{resolve_storage_path, EngineConfig, PixelPoint, Polygon, StorageConfig};
use terramark_storage::{AnnotationRecord, SessionStore};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Model identifier recorded on auto-generated annotations
const MODEL_REF: &str = "point-prompt-v1";

/// Result of a successful point segmentation
#[derive(Debug, Clone)]
pub struct SegmentOutcome {
    pub polygon: Polygon,
    pub cache_hit: bool,
    pub annotation_id: String,
    pub elapsed: Duration,
}

/// A manually authored polygon to be stored as an annotation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualAnnotation {
    pub polygon: Polygon,
    pub label: String,
    /// Re-saving with the same id replaces the previous record
    pub annotation_id: Option<String>,
}

pub struct SegmentationService {
    cache: Arc<ModelContextCache>,
    store: Arc<SessionStore>,
    hub: Arc<NotificationHub>,
    storage: StorageConfig,
    config: EngineConfig,
}

impl SegmentationService {
    pub fn new(
        cache: Arc<ModelContextCache>,
        store: Arc<SessionStore>,
        hub: Arc<NotificationHub>,
        storage: StorageConfig,
        config: EngineConfig,
    ) -> Self {
        Self {
            cache,
            store,
            hub,
            storage,
            config,
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn hub(&self) -> &NotificationHub {
        &self.hub
    }

    pub fn cache(&self) -> &ModelContextCache {
        &self.cache
    }

    /// Segment the object under a click, given in normalized [0,1] image
    /// coordinates. The model-calling portion runs under a timeout; a timed
    /// out computation keeps running and may still populate the cache for
    /// later callers.
    pub async fn segment_at_point(
        &self,
        session_id: &str,
        image_id: &str,
        norm_x: f64,
        norm_y: f64,
    ) -> Result<SegmentOutcome, SegmentError> {
        let image = self
            .store
            .get_image(session_id, image_id)
            .ok_or_else(|| SegmentError::NotFound(format!("image {} in session {}", image_id, session_id)))?;

        let path = self.resolve_existing(&image.file_path)?;
        let started = Instant::now();

        let cache = Arc::clone(&self.cache);
        let task_path = path.clone();
        let handle = tokio::spawn(async move {
            let (height, width) = cache.ensure_loaded(&task_path).await?;
            let point = PixelPoint::new(
                ((norm_x * width as f64) as u32).min(width.saturating_sub(1)),
                ((norm_y * height as f64) as u32).min(height.saturating_sub(1)),
            );
            debug!(
                "Normalized click ({:.3}, {:.3}) -> pixel ({}, {})",
                norm_x, norm_y, point.x, point.y
            );
            let (mask, cache_hit) = cache.predict_point(&task_path, point).await?;
            Ok::<_, terramark_core::Error>((cache.mask_to_polygon(&mask), cache_hit))
        });

        let (polygon, cache_hit) = match tokio::time::timeout(self.config.segment_timeout, handle).await {
            Ok(Ok(result)) => result?,
            Ok(Err(join_err)) => {
                return Err(SegmentError::ResourceUnavailable(format!(
                    "segmentation task failed: {}",
                    join_err
                )))
            }
            Err(_) => {
                warn!(
                    "Segmentation timed out after {:?} for {:?}; computation continues in background",
                    self.config.segment_timeout, path
                );
                return Err(SegmentError::Timeout);
            }
        };

        let polygon = polygon.ok_or_else(|| {
            SegmentError::InvalidResult("mask has no foreground region".to_string())
        })?;

        let annotation_id = Uuid::new_v4().to_string();
        let artifact = self
            .write_feature_artifact(image_id, &annotation_id, &polygon)
            .await?;
        let annotation = self
            .store
            .add_annotation(
                session_id,
                image_id,
                &artifact.to_string_lossy(),
                true,
                Some(MODEL_REF.to_string()),
                Some(annotation_id),
            )
            .ok_or_else(|| {
                SegmentError::NotFound(format!("image {} vanished during segmentation", image_id))
            })?;

        let elapsed = started.elapsed();
        info!(
            "Segmented point on image {} in {:?} (cache hit: {})",
            image_id, elapsed, cache_hit
        );
        Ok(SegmentOutcome {
            polygon,
            cache_hit,
            annotation_id: annotation.annotation_id,
            elapsed,
        })
    }

    /// Warm the embedding cache for an image without predicting anything.
    /// Returns true when new model work was done.
    pub async fn preprocess_image(
        &self,
        session_id: &str,
        image_id: &str,
    ) -> Result<bool, SegmentError> {
        let image = self
            .store
            .get_image(session_id, image_id)
            .ok_or_else(|| SegmentError::NotFound(format!("image {}", image_id)))?;
        let path = self.resolve_existing(&image.file_path)?;
        Ok(self.cache.preprocess(&path).await?)
    }

    /// Store a hand-drawn polygon as a FeatureCollection artifact plus an
    /// annotation record. A caller-supplied annotation id makes re-saves
    /// replace the earlier version.
    pub async fn save_manual_annotation(
        &self,
        session_id: &str,
        image_id: &str,
        manual: ManualAnnotation,
    ) -> Result<AnnotationRecord, SegmentError> {
        if self.store.get_image(session_id, image_id).is_none() {
            return Err(SegmentError::NotFound(format!("image {}", image_id)));
        }

        let annotation_id = manual
            .annotation_id
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let artifact = self.artifact_path(image_id, &annotation_id);
        let document = json!({
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [closed_ring(&manual.polygon)],
                },
                "properties": {
                    "label": manual.label,
                    "type": "manual",
                    "source": "user",
                },
            }],
        });
        self.write_artifact(&artifact, &document).await?;

        self.store
            .add_annotation(
                session_id,
                image_id,
                &artifact.to_string_lossy(),
                false,
                None,
                Some(annotation_id),
            )
            .ok_or_else(|| SegmentError::NotFound(format!("image {}", image_id)))
    }

    /// Remove an annotation record and, best effort, its artifact file
    pub async fn delete_annotation(
        &self,
        session_id: &str,
        annotation_id: &str,
    ) -> Result<(), SegmentError> {
        let annotation = self
            .store
            .get_annotation(session_id, annotation_id)
            .ok_or_else(|| SegmentError::NotFound(format!("annotation {}", annotation_id)))?;

        if let Err(err) = tokio::fs::remove_file(&annotation.file_path).await {
            warn!(
                "Could not remove annotation artifact {}: {}",
                annotation.file_path, err
            );
        }
        self.store.remove_annotation(session_id, annotation_id);
        Ok(())
    }

    /// Remove an image: its cache entry, its on-disk file and annotation
    /// artifacts (best effort), then the store records (cascading).
    pub async fn delete_image(&self, session_id: &str, image_id: &str) -> Result<(), SegmentError> {
        let image = self
            .store
            .get_image(session_id, image_id)
            .ok_or_else(|| SegmentError::NotFound(format!("image {}", image_id)))?;

        let path = resolve_storage_path(Path::new(&image.file_path), &self.storage);
        self.cache.invalidate(Some(&path));

        if let Err(err) = tokio::fs::remove_file(&path).await {
            warn!("Could not remove image file {:?}: {}", path, err);
        }
        for annotation in self.store.get_annotations(session_id, Some(image_id)) {
            if let Err(err) = tokio::fs::remove_file(&annotation.file_path).await {
                warn!(
                    "Could not remove annotation artifact {}: {}",
                    annotation.file_path, err
                );
            }
        }

        self.store.remove_image(session_id, image_id);
        info!("Deleted image {} from session {}", image_id, session_id);
        Ok(())
    }

    /// Drop the cache entry for one image, forcing the next request to
    /// recompute its embedding
    pub fn clear_image_cache(&self, session_id: &str, image_id: &str) -> Result<(), SegmentError> {
        let image = self
            .store
            .get_image(session_id, image_id)
            .ok_or_else(|| SegmentError::NotFound(format!("image {}", image_id)))?;
        let path = resolve_storage_path(Path::new(&image.file_path), &self.storage);
        self.cache.invalidate(Some(&path));
        Ok(())
    }

    /// Detached post-upload warmup: embed the image, segment its center
    /// point, store the result as an auto-generated annotation, and notify
    /// the session. Failures are logged, never propagated.
    pub fn spawn_warmup(self: &Arc<Self>, session_id: &str, image_id: &str) {
        let service = Arc::clone(self);
        let session_id = session_id.to_string();
        let image_id = image_id.to_string();
        tokio::spawn(async move {
            if let Err(err) = service.warmup(&session_id, &image_id).await {
                error!(
                    "Background warmup failed for image {} in session {}: {}",
                    image_id, session_id, err
                );
            }
        });
    }

    async fn warmup(&self, session_id: &str, image_id: &str) -> Result<(), SegmentError> {
        let image = self
            .store
            .get_image(session_id, image_id)
            .ok_or_else(|| SegmentError::NotFound(format!("image {}", image_id)))?;
        let path = self.resolve_existing(&image.file_path)?;

        info!("Warming up image {} for session {}", image_id, session_id);
        let (height, width) = self.cache.ensure_loaded(&path).await?;
        let center = PixelPoint::new(width / 2, height / 2);
        let (mask, _) = self.cache.predict_point(&path, center).await?;
        let polygon = self.cache.mask_to_polygon(&mask).ok_or_else(|| {
            SegmentError::InvalidResult("default mask has no foreground region".to_string())
        })?;

        let annotation_id = Uuid::new_v4().to_string();
        let artifact = self
            .write_feature_artifact(image_id, &annotation_id, &polygon)
            .await?;
        self.store.add_annotation(
            session_id,
            image_id,
            &artifact.to_string_lossy(),
            true,
            Some(MODEL_REF.to_string()),
            Some(annotation_id.clone()),
        );

        let message = json!({
            "type": "image_ready",
            "image_id": image_id,
            "annotation_id": annotation_id,
        })
        .to_string();
        self.hub.notify(session_id, message);
        Ok(())
    }

    /// Resolve a stored path and require the file to exist on disk
    fn resolve_existing(&self, stored: &str) -> Result<PathBuf, SegmentError> {
        let path = resolve_storage_path(Path::new(stored), &self.storage);
        if !path.exists() {
            return Err(SegmentError::ResourceUnavailable(format!(
                "image file not found on disk: {}",
                path.display()
            )));
        }
        Ok(path)
    }

    fn artifact_path(&self, image_id: &str, annotation_id: &str) -> PathBuf {
        self.storage
            .annotation_dir
            .join(format!("{}_{}.geojson", image_id, annotation_id))
    }

    async fn write_feature_artifact(
        &self,
        image_id: &str,
        annotation_id: &str,
        polygon: &Polygon,
    ) -> Result<PathBuf, SegmentError> {
        let artifact = self.artifact_path(image_id, annotation_id);
        let document = json!({
            "type": "Feature",
            "geometry": {
                "type": "Polygon",
                "coordinates": [closed_ring(polygon)],
            },
            "properties": {
                "image_id": image_id,
                "model": MODEL_REF,
            },
        });
        self.write_artifact(&artifact, &document).await?;
        Ok(artifact)
    }

    async fn write_artifact(
        &self,
        path: &Path,
        document: &serde_json::Value,
    ) -> Result<(), SegmentError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(terramark_core::Error::from)?;
        }
        let bytes = serde_json::to_vec(document).map_err(|e| {
            SegmentError::InvalidResult(format!("could not serialize artifact: {}", e))
        })?;
        tokio::fs::write(path, bytes)
            .await
            .map_err(terramark_core::Error::from)?;
        Ok(())
    }
}

/// GeoJSON rings repeat the first point at the end
fn closed_ring(polygon: &Polygon) -> Vec<[f64; 2]> {
    let mut ring = polygon.clone();
    if let (Some(&first), Some(&last)) = (ring.first(), ring.last()) {
        if first != last {
            ring.push(first);
        }
    }
    ring
}
