//! Error types shared by the vision pipeline.

use std::time::Duration;

use super::identity::Identity;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Identity has no entry in a per-identity table
    #[error("Unknown identity: {0}")]
    UnknownIdentity(Identity),

    /// Camera driver error
    #[error("Camera error: {0}")]
    Camera(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decode or encode error
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Tag finder failure
    #[error("Detector error: {0}")]
    Detector(String),

    /// Pose estimation failure for one tag
    #[error("Pose error for tag {id}: {reason}")]
    Pose { id: u32, reason: String },

    /// Transport did not drain within the flush deadline
    #[error("Flush timed out after {0:?}")]
    FlushTimeout(Duration),

    /// Transport consumer went away
    #[error("Network closed")]
    NetworkClosed,

    /// Config error
    #[error("Config error: {0}")]
    Config(String),
}

impl Error {
    /// Whether the error only spoils the frame being analyzed.
    ///
    /// The pipeline drops such frames and carries on with the next request.
    pub fn is_frame_fault(&self) -> bool {
        matches!(self, Self::Detector(_) | Self::Pose { .. })
    }
}

impl From<rscam::Error> for Error {
    fn from(err: rscam::Error) -> Self {
        Self::Camera(format!("{err:?}"))
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Self::Config(err.to_string())
    }
}
