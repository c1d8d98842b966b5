//! Error types for resource loading.

use std::path::PathBuf;
use thiserror::Error;

/// Error type for resource loading operations.
#[derive(Error, Debug)]
pub enum ResourceError {
    /// The OBJ parser rejected the file.
    #[error("Failed to load OBJ file '{path}': {source}")]
    ObjLoad {
        path: PathBuf,
        #[source]
        source: tobj::LoadError,
    },

    /// The model has no faces to draw.
    #[error("Model '{0}' contains no triangles")]
    NoGeometry(PathBuf),

    /// A face references a position or normal that does not exist.
    #[error("Face index {index} out of range for {what} array of {len}")]
    IndexOutOfRange {
        what: &'static str,
        index: u32,
        len: usize,
    },

    /// A polygon with fewer than three vertices.
    #[error("Face with {0} vertices cannot be triangulated")]
    DegenerateFace(u32),

    /// File not found.
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),
}

/// Result type alias for resource operations.
pub type ResourceResult<T> = Result<T, ResourceError>;
