//! Error types for wire encoding and decoding.

use std::io;

use thiserror::Error;

/// Errors surfaced while encoding or decoding frames and documents.
///
/// Every variant other than [`WireError::Io`] and [`WireError::Timeout`]
/// indicates a protocol violation by the peer and classifies as a client
/// error. `Timeout` is split out from `Io` because the read deadline has its
/// own status code downstream.
#[derive(Debug, Error)]
pub enum WireError {
    /// Underlying IO failure during a read or write.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The read deadline elapsed before a full frame arrived.
    #[error("timed out waiting for request data")]
    Timeout,

    /// The peer closed the connection mid-frame.
    #[error("connection closed mid-frame while reading {context}: expected {expected} bytes, got {got}")]
    ShortRead {
        /// Which part of the frame was being read.
        context: &'static str,
        /// Bytes the frame layout required.
        expected: usize,
        /// Bytes actually received before EOF.
        got: usize,
    },

    /// The frame carried an unsupported protocol version byte.
    #[error("unsupported protocol version {found}, expected {expected}")]
    VersionMismatch {
        /// Version this codec speaks.
        expected: u8,
        /// Version byte found on the wire.
        found: u8,
    },

    /// The declared body size exceeds the decoder's limit.
    #[error("frame too large: {size} bytes exceeds {max} byte limit")]
    FrameTooLarge {
        /// Declared body size.
        size: usize,
        /// Decoder limit.
        max: usize,
    },

    /// The document body could not be decoded.
    #[error("malformed document: {message}")]
    Malformed {
        /// Parse failure detail.
        message: String,
    },

    /// A document could not be represented in the wire format.
    #[error("unencodable document: {message}")]
    Unencodable {
        /// Encoding failure detail.
        message: String,
    },

    /// A request body is missing a required field or carries a null one.
    #[error("malformed request: missing field '{field}'")]
    MissingField {
        /// Name of the absent field.
        field: &'static str,
    },
}

impl WireError {
    /// Creates a malformed-document error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    /// Creates an unencodable-document error.
    pub fn unencodable(message: impl Into<String>) -> Self {
        Self::Unencodable {
            message: message.into(),
        }
    }

    /// Creates a short-read error.
    pub fn short_read(context: &'static str, expected: usize, got: usize) -> Self {
        Self::ShortRead {
            context,
            expected,
            got,
        }
    }
}
