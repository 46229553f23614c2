//! 3D model decoding: glTF 2.0 JSON and GLB containers into CPU-side meshes.

pub mod glb;
pub mod gltf;
pub mod model;

pub use glb::*;
pub use model::*;

#[derive(Debug, thiserror::Error)]
pub enum ModelFormatError {
    #[error("file is empty")]
    Empty,
    #[error("not a GLB container (bad magic)")]
    BadMagic,
    #[error("unsupported GLB version {0}")]
    UnsupportedVersion(u32),
    #[error("truncated {0}")]
    Truncated(&'static str),
    #[error("GLB has no JSON chunk")]
    MissingJsonChunk,
    #[error("invalid glTF JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("external buffer references are not supported: {0}")]
    ExternalBuffer(String),
    #[error("buffer {0} has no data")]
    MissingBuffer(usize),
    #[error("malformed data URI")]
    InvalidDataUri,
    #[error("invalid base64 buffer: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("{kind} index {index} out of range")]
    BadIndex { kind: &'static str, index: usize },
    #[error("accessor {0} reads past the end of its buffer")]
    OutOfBounds(usize),
    #[error("bufferView {0} reaches past the end of its buffer")]
    ViewOutOfBounds(usize),
    #[error("could not decode texture {texture}: {source}")]
    Image {
        texture: usize,
        source: image::ImageError,
    },
    #[error("accessor {accessor}: unsupported layout {detail}")]
    UnsupportedAccessor { accessor: usize, detail: String },
    #[error("model contains no triangle geometry")]
    NoGeometry,
}
