use std::path::PathBuf;

use thiserror::Error;

/// Failures opening or decoding the input video.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("failed to open video: {0}")]
    Open(#[source] ffmpeg_next::Error),
    #[error("no video stream in input")]
    NoVideoStream,
    #[error("video duration is unknown")]
    UnknownDuration,
    #[error("decode failed: {0}")]
    Decode(#[source] ffmpeg_next::Error),
    #[error("decoded frame could not be converted to an image")]
    BadFrame,
    #[error("failed to encode frame as JPEG: {0}")]
    Encode(#[source] image::ImageError),
    #[error("no frames could be decoded")]
    NoFrames,
}

/// Failures of the external captioning capability.
#[derive(Debug, Error)]
pub enum CaptionError {
    #[error("captioning service unavailable: {0}")]
    Unavailable(String),
    #[error("captioning request rejected: {0}")]
    Rejected(String),
    #[error("captioning call timed out after {0}s")]
    Timeout(u64),
    #[error("captioning response contained no text")]
    EmptyResponse,
}

/// Failures of the external text-generation capability.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation service unavailable: {0}")]
    Unavailable(String),
    #[error("generation request rejected: {0}")]
    Rejected(String),
    #[error("generation call timed out after {0}s")]
    Timeout(u64),
    #[error("generation response contained no text")]
    EmptyResponse,
}

/// Failures writing or reading pipeline artifacts.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Terminal pipeline error. Every failure identifies the step and,
/// where applicable, the frame or scene that caused it.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Media(#[from] MediaError),
    #[error("describing frame {index} of {total} (t={timestamp:.0}s) failed: {source}")]
    Describe {
        index: usize,
        total: usize,
        timestamp: f64,
        #[source]
        source: CaptionError,
    },
    #[error("narrating scene {scene} of {total} failed: {source}")]
    Narrate {
        scene: usize,
        total: usize,
        #[source]
        source: GenerationError,
    },
    #[error("final polish failed: {source}")]
    Polish {
        #[source]
        source: GenerationError,
    },
    #[error(transparent)]
    Persist(#[from] PersistenceError),
    #[error("run cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, Error>;
