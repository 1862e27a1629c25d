//! Content-addressed artifact storage: glob selection, optional
//! compression, and a manifest-backed filesystem store.

mod compression;
mod engine;
mod error;
mod manifest;
mod selection;

pub use engine::FsArtifactEngine;
pub use error::ArtifactError;
pub use selection::{resolve_base, select_files};
