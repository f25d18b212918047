//! Self-describing binary document codec.
//!
//! Each value is encoded as a one-byte tag followed by a fixed or
//! length-prefixed payload. All multi-byte integers are big-endian. Map keys
//! are encoded as bare length-prefixed UTF-8 (no tag) since they are always
//! strings.
//!
//! The decoder is strict: trailing bytes after the root value, unknown tags,
//! truncated payloads, and invalid UTF-8 are all malformed-document errors
//! rather than partial results. Nesting depth is bounded to keep hostile
//! documents from exhausting the stack.

use crate::errors::WireError;
use crate::value::Value;

const TAG_NULL: u8 = 0x00;
const TAG_BOOL: u8 = 0x01;
const TAG_INT: u8 = 0x02;
const TAG_FLOAT: u8 = 0x03;
const TAG_STR: u8 = 0x04;
const TAG_LIST: u8 = 0x05;
const TAG_MAP: u8 = 0x06;

/// Maximum nesting depth the decoder will follow.
const MAX_DEPTH: usize = 64;

/// Encodes a document into its binary representation.
///
/// # Errors
///
/// Returns [`WireError::Unencodable`] when a string, list, or map exceeds the
/// wire format's `u32` length space.
pub fn encode(value: &Value) -> Result<Vec<u8>, WireError> {
    let mut buffer = Vec::new();
    encode_into(value, &mut buffer)?;
    Ok(buffer)
}

/// Decodes a complete document from a byte slice.
///
/// # Errors
///
/// Returns [`WireError::Malformed`] when the bytes are not exactly one
/// well-formed document.
pub fn decode(bytes: &[u8]) -> Result<Value, WireError> {
    let mut reader = SliceReader::new(bytes);
    let value = decode_value(&mut reader, 0)?;
    if !reader.is_empty() {
        return Err(WireError::malformed(format!(
            "{} trailing bytes after document",
            reader.remaining()
        )));
    }
    Ok(value)
}

fn encode_into(value: &Value, buffer: &mut Vec<u8>) -> Result<(), WireError> {
    match value {
        Value::Null => buffer.push(TAG_NULL),
        Value::Bool(flag) => {
            buffer.push(TAG_BOOL);
            buffer.push(u8::from(*flag));
        }
        Value::Int(number) => {
            buffer.push(TAG_INT);
            buffer.extend_from_slice(&number.to_be_bytes());
        }
        Value::Float(number) => {
            buffer.push(TAG_FLOAT);
            buffer.extend_from_slice(&number.to_bits().to_be_bytes());
        }
        Value::Str(text) => {
            buffer.push(TAG_STR);
            encode_str(text, buffer)?;
        }
        Value::List(items) => {
            buffer.push(TAG_LIST);
            buffer.extend_from_slice(&encode_len(items.len(), "list")?);
            for item in items {
                encode_into(item, buffer)?;
            }
        }
        Value::Map(entries) => {
            buffer.push(TAG_MAP);
            buffer.extend_from_slice(&encode_len(entries.len(), "map")?);
            for (key, entry) in entries {
                encode_str(key, buffer)?;
                encode_into(entry, buffer)?;
            }
        }
    }
    Ok(())
}

fn encode_str(text: &str, buffer: &mut Vec<u8>) -> Result<(), WireError> {
    buffer.extend_from_slice(&encode_len(text.len(), "string")?);
    buffer.extend_from_slice(text.as_bytes());
    Ok(())
}

fn encode_len(len: usize, what: &str) -> Result<[u8; 4], WireError> {
    u32::try_from(len)
        .map(u32::to_be_bytes)
        .map_err(|_| WireError::unencodable(format!("{what} length {len} exceeds u32")))
}

fn decode_value(reader: &mut SliceReader<'_>, depth: usize) -> Result<Value, WireError> {
    if depth > MAX_DEPTH {
        return Err(WireError::malformed(format!(
            "nesting deeper than {MAX_DEPTH} levels"
        )));
    }
    let tag = reader.take_byte("value tag")?;
    match tag {
        TAG_NULL => Ok(Value::Null),
        TAG_BOOL => match reader.take_byte("bool payload")? {
            0 => Ok(Value::Bool(false)),
            1 => Ok(Value::Bool(true)),
            other => Err(WireError::malformed(format!("invalid bool byte {other:#04x}"))),
        },
        TAG_INT => {
            let bytes = reader.take_array::<8>("int payload")?;
            Ok(Value::Int(i64::from_be_bytes(bytes)))
        }
        TAG_FLOAT => {
            let bytes = reader.take_array::<8>("float payload")?;
            Ok(Value::Float(f64::from_bits(u64::from_be_bytes(bytes))))
        }
        TAG_STR => Ok(Value::Str(decode_str(reader)?)),
        TAG_LIST => {
            let count = decode_len(reader, "list length")?;
            let mut items = Vec::new();
            for _ in 0..count {
                items.push(decode_value(reader, depth + 1)?);
            }
            Ok(Value::List(items))
        }
        TAG_MAP => {
            let count = decode_len(reader, "map length")?;
            let mut entries = Vec::new();
            for _ in 0..count {
                let key = decode_str(reader)?;
                let entry = decode_value(reader, depth + 1)?;
                entries.push((key, entry));
            }
            Ok(Value::Map(entries))
        }
        other => Err(WireError::malformed(format!("unknown tag {other:#04x}"))),
    }
}

fn decode_str(reader: &mut SliceReader<'_>) -> Result<String, WireError> {
    let len = decode_len(reader, "string length")?;
    let bytes = reader.take(len, "string payload")?;
    String::from_utf8(bytes.to_vec())
        .map_err(|error| WireError::malformed(format!("invalid UTF-8 string: {error}")))
}

fn decode_len(reader: &mut SliceReader<'_>, context: &'static str) -> Result<usize, WireError> {
    let bytes = reader.take_array::<4>(context)?;
    Ok(u32::from_be_bytes(bytes) as usize)
}

/// Cursor over an in-memory document body.
struct SliceReader<'a> {
    bytes: &'a [u8],
}

impl<'a> SliceReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    fn remaining(&self) -> usize {
        self.bytes.len()
    }

    fn take(&mut self, len: usize, context: &'static str) -> Result<&'a [u8], WireError> {
        if self.bytes.len() < len {
            return Err(WireError::malformed(format!(
                "truncated {context}: need {len} bytes, {} remain",
                self.bytes.len()
            )));
        }
        let (taken, rest) = self.bytes.split_at(len);
        self.bytes = rest;
        Ok(taken)
    }

    fn take_byte(&mut self, context: &'static str) -> Result<u8, WireError> {
        let bytes = self.take(1, context)?;
        Ok(bytes.first().copied().unwrap_or_default())
    }

    fn take_array<const N: usize>(&mut self, context: &'static str) -> Result<[u8; N], WireError> {
        let bytes = self.take(N, context)?;
        let mut array = [0_u8; N];
        array.copy_from_slice(bytes);
        Ok(array)
    }
}
