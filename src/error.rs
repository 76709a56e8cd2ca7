use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("input not found or unreadable: {}", path.display())]
    InputNotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no array matching '{pattern}' with at least 9 elements in affine container")]
    MissingTransform { pattern: String },

    #[error("malformed affine container: {0}")]
    MalformedContainer(String),

    #[error("malformed gradient data: {0}")]
    MalformedGradientData(String),

    #[error("expected {expected} rotations (one per diffusion-weighted volume), found {found}")]
    RotationCountMismatch { expected: usize, found: usize },

    #[error("rotation must be a 3x3 matrix, got {rows}x{cols}")]
    InvalidRotationShape { rows: usize, cols: usize },

    #[error("affine linear block is singular and cannot be orthogonalized")]
    DegenerateTransform,

    #[error("failed to write output: {}", path.display())]
    OutputWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("root directory not found: {}", .0.display())]
    RootNotFound(PathBuf),

    #[error("io error at {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid parameters: {0}")]
    InvalidParams(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io { path: path.into(), source }
    }
}
