//! terramark-storage: ephemeral multi-tenant session registry
//!
//! In-memory store mapping a session identifier to the images and
//! annotations it owns. Sessions live for the process lifetime only; there
//! is no persistence layer behind this crate.

pub mod session;

pub use session::{AnnotationRecord, ImageRecord, SessionExport, SessionStore, SessionSummary};
