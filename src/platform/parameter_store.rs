//! Persistence of the master's parameter-id number across restarts (I8).
//!
//! The wire format mirrors the reference implementation's generic
//! `cl_file_header` (an 8-octet `magic` + `version` prefix used for every
//! persisted file in that stack): `magic(u32 LE) | version(u32 LE) |
//! parameter_no(u16 LE)`. This crate owns the byte layout; the host owns the
//! actual file I/O behind this trait.

use crate::codec::bytes::{read_u16_le, read_u32_le, write_u16_le, write_u32_le};
use thiserror::Error;

const MAGIC: u32 = 0x4249_4643; // "CFIB" read little-endian
const VERSION: u32 = 1;
const RECORD_LEN: usize = 4 + 4 + 2;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParameterStoreError {
    #[error("stored record is {0} octets, expected {RECORD_LEN}")]
    BadLength(usize),
    #[error("stored record has magic 0x{0:08X}, expected 0x{MAGIC:08X}")]
    BadMagic(u32),
    #[error("stored record has version {0}, expected {VERSION}")]
    BadVersion(u32),
}

/// Encode a parameter-update number into its persisted byte record.
pub fn encode(parameter_no: u16) -> [u8; RECORD_LEN] {
    let mut buf = [0u8; RECORD_LEN];
    write_u32_le(&mut buf, 0, MAGIC);
    write_u32_le(&mut buf, 4, VERSION);
    write_u16_le(&mut buf, 8, parameter_no);
    buf
}

/// Decode a previously persisted parameter-update number.
pub fn decode(buf: &[u8]) -> Result<u16, ParameterStoreError> {
    if buf.len() != RECORD_LEN {
        return Err(ParameterStoreError::BadLength(buf.len()));
    }
    let magic = read_u32_le(buf, 0);
    if magic != MAGIC {
        return Err(ParameterStoreError::BadMagic(magic));
    }
    let version = read_u32_le(buf, 4);
    if version != VERSION {
        return Err(ParameterStoreError::BadVersion(version));
    }
    Ok(read_u16_le(buf, 8))
}

/// Host-provided persistence of the master's parameter-id number (I8).
///
/// Implementations back this with a file, flash page, or any other durable
/// store; this crate never touches a filesystem directly.
pub trait ParameterStore {
    type Error: core::fmt::Debug;

    /// Load the last persisted parameter-id number, or `None` if none has
    /// ever been stored.
    fn load(&mut self) -> Result<Option<u16>, Self::Error>;

    /// Persist a new parameter-id number, overwriting any previous value.
    fn store(&mut self, parameter_no: u16) -> Result<(), Self::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let buf = encode(42);
        assert_eq!(decode(&buf), Ok(42));
    }

    #[test]
    fn rejects_bad_magic() {
        let mut buf = encode(1);
        buf[0] ^= 0xFF;
        assert!(matches!(decode(&buf), Err(ParameterStoreError::BadMagic(_))));
    }

    #[test]
    fn rejects_wrong_length() {
        assert_eq!(decode(&[0u8; 4]), Err(ParameterStoreError::BadLength(4)));
    }
}
