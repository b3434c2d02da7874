use std::io;

use thiserror::Error;

/// Failures surfaced by the capture back-ends and the facade.
///
/// Every operation reports its failure as a value; no back-end ever
/// terminates the host process.
#[derive(Debug, Error)]
pub enum Error {
    /// The device node is missing, is not a character device, cannot be
    /// opened, or the device index is out of range.
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    /// The device lacks a required capability, I/O method or format.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// An operation was issued in the wrong lifecycle state.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    /// A kernel or library call failed with an error other than
    /// EAGAIN/EIO/EINTR.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// The readiness wait elapsed without a frame becoming available.
    #[error("timed out waiting for a frame")]
    Timeout,

    /// The media stream ended.
    #[error("end of stream")]
    Eos,

    /// Malformed pipeline description, missing sink element or missing
    /// plugin.
    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
