//! Crate-wide error type and `Result` alias.
//!
//! Every fallible operation in the core returns [`Result`]; there is no
//! local recovery. A failed append or rebuild leaves the pipeline in an
//! unspecified state and the caller is expected to discard it.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Scratch or output file-system failure.
    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Image decode/encode failure.
    #[error("image error on {}: {source}", path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// The tile store cannot satisfy a request even after evicting every
    /// evictable tile.
    #[error("tile store out of budget: {resident} resident tiles, cap {cap}")]
    OutOfBudget { resident: usize, cap: usize },

    /// A tile was acquired while already checked out.
    #[error("tile {id} is already acquired")]
    TileAcquired { id: u64 },

    /// Mismatched image/region shapes.
    #[error("dimension mismatch: {context}")]
    DimensionMismatch { context: String },

    /// A region's vertical range clamps to nothing.
    #[error("region out of bounds: {context}")]
    OutOfBounds { context: String },

    /// Invalid panorama/store configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfiguration { reason: String },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn image(path: impl Into<PathBuf>, source: image::ImageError) -> Self {
        Self::Image {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn dims(context: impl Into<String>) -> Self {
        Self::DimensionMismatch {
            context: context.into(),
        }
    }

    pub(crate) fn bounds(context: impl Into<String>) -> Self {
        Self::OutOfBounds {
            context: context.into(),
        }
    }

    pub(crate) fn config(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
