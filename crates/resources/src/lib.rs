//! Asset loading.
//!
//! OBJ models are parsed with `tobj` and expanded into flat triangle lists
//! ready for upload.

pub mod error;
pub mod model;

pub use error::{ResourceError, ResourceResult};
pub use model::{MeshData, Model, ModelVertex};
