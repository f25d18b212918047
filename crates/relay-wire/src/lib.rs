//! Wire protocol for the relay RPC framework.
//!
//! A relay connection carries exactly one framed request and one framed
//! response. Each frame is `[u32 big-endian size][u8 protocol version][size
//! bytes of document body]`. The body is a self-describing tagged binary
//! document (see [`codec`]) built from the schema-flexible [`Value`] type.
//!
//! This crate owns the data model (`Value`, [`Request`], [`Response`],
//! [`Status`]), the document codec, and the frame reader/writer. It performs
//! no socket management; callers hand it any [`std::io::Read`] /
//! [`std::io::Write`].

pub mod codec;
mod errors;
pub mod frame;
mod message;
mod value;

pub use errors::WireError;
pub use message::{Request, Response, Status};
pub use value::Value;

/// Protocol version byte both peers must agree on.
///
/// A frame carrying any other version byte is rejected before its body is
/// read and classified as a client error.
pub const PROTOCOL_VERSION: u8 = 1;

/// Upper bound on the declared body size of a single frame.
///
/// Guards the decoder against hostile or corrupt length prefixes; a frame
/// declaring a larger body is rejected without allocating.
pub const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;
