//! Wire-format parsing and building for CCIEFB and its SLMP auxiliary protocol.
//!
//! No field is ever read through a `#[repr(C, packed)]` struct: every frame
//! is a plain `&[u8]`/`&mut [u8]` and every field access goes through the
//! offset helpers in [`bytes`], so the endianness of each field (most are
//! little-endian; three header `reserved1` fields are big-endian) is visible
//! at the call site.

pub mod bytes;
pub mod cciefb;
pub mod endcode;
pub mod slmp;

pub use endcode::EndCode;
