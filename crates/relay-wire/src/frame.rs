//! Frame layer: size prefix, version byte, document body.
//!
//! Reading a frame performs three sequential bounded reads (size, version,
//! body); each failure mode is a distinct [`WireError`] so the caller can
//! classify it. Exactly one frame is read per call; the reader never buffers
//! ahead of the frame it was asked for, matching the one-request-per-
//! connection protocol.

use std::io::{self, Read};

use crate::codec;
use crate::errors::WireError;
use crate::value::Value;
use crate::{MAX_FRAME_BYTES, PROTOCOL_VERSION};

/// Encodes a document body into a complete frame.
///
/// Top-level map keys holding `Null` are stripped before encoding as a wire
/// optimisation; nested nulls are preserved untouched.
///
/// # Errors
///
/// Returns an error when the document cannot be encoded or the encoded body
/// exceeds [`MAX_FRAME_BYTES`].
pub fn encode(body: &Value) -> Result<Vec<u8>, WireError> {
    let stripped = strip_top_level_nulls(body);
    let encoded = codec::encode(&stripped)?;
    if encoded.len() > MAX_FRAME_BYTES {
        return Err(WireError::FrameTooLarge {
            size: encoded.len(),
            max: MAX_FRAME_BYTES,
        });
    }
    let size = u32::try_from(encoded.len()).map_err(|_| WireError::FrameTooLarge {
        size: encoded.len(),
        max: MAX_FRAME_BYTES,
    })?;

    let mut frame = Vec::with_capacity(encoded.len() + 5);
    frame.extend_from_slice(&size.to_be_bytes());
    frame.push(PROTOCOL_VERSION);
    frame.extend_from_slice(&encoded);
    Ok(frame)
}

/// Reads one frame and decodes its document body.
///
/// Returns `Ok(None)` when the peer closes the connection before sending any
/// bytes; the caller decides whether that is a keep-alive probe or an error.
/// EOF anywhere after the first byte is a [`WireError::ShortRead`].
///
/// # Errors
///
/// Returns [`WireError::Timeout`] when the stream's read deadline elapses,
/// [`WireError::VersionMismatch`] for an unexpected version byte,
/// [`WireError::FrameTooLarge`] for a hostile size prefix, and
/// [`WireError::Malformed`] when the body does not decode.
pub fn read(reader: &mut impl Read) -> Result<Option<Value>, WireError> {
    let mut size_bytes = [0_u8; 4];
    if !read_full(reader, &mut size_bytes, "frame size", true)? {
        return Ok(None);
    }
    let size = u32::from_be_bytes(size_bytes) as usize;
    if size > MAX_FRAME_BYTES {
        return Err(WireError::FrameTooLarge {
            size,
            max: MAX_FRAME_BYTES,
        });
    }

    let mut version = [0_u8; 1];
    read_full(reader, &mut version, "protocol version", false)?;
    let [found] = version;
    if found != PROTOCOL_VERSION {
        return Err(WireError::VersionMismatch {
            expected: PROTOCOL_VERSION,
            found,
        });
    }

    let mut body = vec![0_u8; size];
    read_full(reader, &mut body, "frame body", false)?;
    codec::decode(&body).map(Some)
}

/// Fills `buf` from the reader, retrying interrupted reads.
///
/// Returns `Ok(false)` when `allow_empty_eof` is set and the stream ends
/// before the first byte. EOF after a partial fill is always a short read.
fn read_full(
    reader: &mut impl Read,
    buf: &mut [u8],
    context: &'static str,
    allow_empty_eof: bool,
) -> Result<bool, WireError> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => {
                if filled == 0 && allow_empty_eof {
                    return Ok(false);
                }
                return Err(WireError::short_read(context, buf.len(), filled));
            }
            Ok(read) => filled += read,
            Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
            Err(error)
                if error.kind() == io::ErrorKind::WouldBlock
                    || error.kind() == io::ErrorKind::TimedOut =>
            {
                return Err(WireError::Timeout);
            }
            Err(error) => return Err(WireError::Io(error)),
        }
    }
    Ok(true)
}

/// Removes top-level map entries whose value is `Null`.
///
/// Non-map documents and nested maps pass through unchanged. Returns a
/// clone only when stripping is needed.
fn strip_top_level_nulls(body: &Value) -> Value {
    match body {
        Value::Map(entries) if entries.iter().any(|(_, value)| value.is_null()) => Value::Map(
            entries
                .iter()
                .filter(|(_, value)| !value.is_null())
                .cloned()
                .collect(),
        ),
        other => other.clone(),
    }
}
