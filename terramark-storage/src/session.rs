//! Session-scoped image and annotation registry
//!
//! Lookups for unknown sessions, images or annotations return empty
//! sequences or `None`; callers branch on presence instead of catching
//! errors.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

/// Image metadata owned by exactly one session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRecord {
    pub image_id: String,
    pub file_name: String,
    /// Deployment-independent storage path, resolved via `resolve_storage_path`
    pub file_path: String,
    pub resolution: Option<String>,
    pub source: Option<String>,
    pub capture_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Polygon artifact metadata referencing an image in the same session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotationRecord {
    pub annotation_id: String,
    pub image_id: String,
    pub file_path: String,
    pub auto_generated: bool,
    pub model_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Lightweight session overview
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub images_count: usize,
    pub annotations_count: usize,
    pub created_at: DateTime<Utc>,
}

/// Full session dump for backup or debugging
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionExport {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub images: Vec<ImageRecord>,
    pub annotations: Vec<AnnotationRecord>,
}

#[derive(Debug)]
struct SessionData {
    created_at: DateTime<Utc>,
    images: Vec<ImageRecord>,
    annotations: Vec<AnnotationRecord>,
}

impl SessionData {
    fn new() -> Self {
        Self {
            created_at: Utc::now(),
            images: Vec::new(),
            annotations: Vec::new(),
        }
    }
}

/// In-memory multi-tenant registry of sessions, images and annotations
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: DashMap<String, SessionData>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Create a session if it does not exist; idempotent
    pub fn create_session(&self, session_id: &str) {
        self.sessions
            .entry(session_id.to_string())
            .or_insert_with(SessionData::new);
    }

    pub fn session_exists(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    /// Register an image, auto-creating the session. Returns the new record.
    pub fn add_image(
        &self,
        session_id: &str,
        file_name: &str,
        file_path: &str,
        resolution: Option<String>,
        source: Option<String>,
    ) -> ImageRecord {
        let now = Utc::now();
        let image = ImageRecord {
            image_id: Uuid::new_v4().to_string(),
            file_name: file_name.to_string(),
            file_path: file_path.to_string(),
            resolution,
            source: source.or_else(|| Some("user_upload".to_string())),
            capture_date: now,
            created_at: now,
        };

        let mut session = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(SessionData::new);
        session.images.push(image.clone());
        debug!(
            "Added image {} ({}) to session {}",
            image.image_id, image.file_name, session_id
        );
        image
    }

    /// Page of images in insertion order; empty for unknown sessions
    pub fn get_images(&self, session_id: &str, skip: usize, limit: usize) -> Vec<ImageRecord> {
        match self.sessions.get(session_id) {
            Some(session) => session.images.iter().skip(skip).take(limit).cloned().collect(),
            None => Vec::new(),
        }
    }

    pub fn get_image(&self, session_id: &str, image_id: &str) -> Option<ImageRecord> {
        self.sessions
            .get(session_id)?
            .images
            .iter()
            .find(|img| img.image_id == image_id)
            .cloned()
    }

    /// Remove an image and every annotation referencing it
    pub fn remove_image(&self, session_id: &str, image_id: &str) -> bool {
        let mut session = match self.sessions.get_mut(session_id) {
            Some(session) => session,
            None => return false,
        };

        let before = session.images.len();
        session.images.retain(|img| img.image_id != image_id);
        if session.images.len() == before {
            return false;
        }

        session.annotations.retain(|ann| ann.image_id != image_id);
        debug!("Removed image {} from session {}", image_id, session_id);
        true
    }

    /// Record an annotation. Returns `None` when the session or the
    /// referenced image does not exist. A caller-supplied id takes
    /// precedence over a generated one, so manual edits re-save idempotently.
    pub fn add_annotation(
        &self,
        session_id: &str,
        image_id: &str,
        file_path: &str,
        auto_generated: bool,
        model_id: Option<String>,
        annotation_id: Option<String>,
    ) -> Option<AnnotationRecord> {
        let mut session = self.sessions.get_mut(session_id)?;
        if !session.images.iter().any(|img| img.image_id == image_id) {
            return None;
        }

        let annotation_id = annotation_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        // Re-saving under an existing id replaces the previous record
        session
            .annotations
            .retain(|ann| ann.annotation_id != annotation_id);

        let annotation = AnnotationRecord {
            annotation_id,
            image_id: image_id.to_string(),
            file_path: file_path.to_string(),
            auto_generated,
            model_id,
            created_at: Utc::now(),
        };
        session.annotations.push(annotation.clone());
        Some(annotation)
    }

    /// Annotations in insertion order, optionally filtered by image
    pub fn get_annotations(&self, session_id: &str, image_id: Option<&str>) -> Vec<AnnotationRecord> {
        match self.sessions.get(session_id) {
            Some(session) => session
                .annotations
                .iter()
                .filter(|ann| image_id.map_or(true, |id| ann.image_id == id))
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn get_annotation(&self, session_id: &str, annotation_id: &str) -> Option<AnnotationRecord> {
        self.sessions
            .get(session_id)?
            .annotations
            .iter()
            .find(|ann| ann.annotation_id == annotation_id)
            .cloned()
    }

    pub fn remove_annotation(&self, session_id: &str, annotation_id: &str) -> bool {
        let mut session = match self.sessions.get_mut(session_id) {
            Some(session) => session,
            None => return false,
        };
        let before = session.annotations.len();
        session
            .annotations
            .retain(|ann| ann.annotation_id != annotation_id);
        session.annotations.len() != before
    }

    pub fn get_session(&self, session_id: &str) -> Option<SessionSummary> {
        self.sessions.get(session_id).map(|session| SessionSummary {
            session_id: session_id.to_string(),
            images_count: session.images.len(),
            annotations_count: session.annotations.len(),
            created_at: session.created_at,
        })
    }

    /// Delete a session, cascading to all owned images and annotations
    pub fn delete_session(&self, session_id: &str) -> bool {
        self.sessions.remove(session_id).is_some()
    }

    /// Full dump of a session for backup or debugging
    pub fn export_session(&self, session_id: &str) -> Option<SessionExport> {
        self.sessions.get(session_id).map(|session| SessionExport {
            session_id: session_id.to_string(),
            created_at: session.created_at,
            images: session.images.clone(),
            annotations: session.annotations.clone(),
        })
    }

    /// Replace a session's contents with a previously exported dump
    pub fn import_session(&self, session_id: &str, export: SessionExport) -> bool {
        self.sessions.insert(
            session_id.to_string(),
            SessionData {
                created_at: export.created_at,
                images: export.images,
                annotations: export.annotations,
            },
        );
        true
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}
