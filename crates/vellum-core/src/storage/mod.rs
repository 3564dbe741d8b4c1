//! On-disk format
//!
//! A store is a fixed 40-byte header followed by a journal of
//! length-prefixed, checksummed records. Opening a session replays the
//! journal into memory; checkpoints append; a rebuild rewrites the
//! whole file compacted. All integers are little-endian.
//!
//! Header layout:
//!
//! ```text
//! offset  size  field
//!      0     8  magic "VLMSTORE"
//!      8     2  format version (currently 1)
//!     10     2  flags (unused, zero)
//!     12     4  user version (PRAGMA USER_VERSION)
//!     16     1  collation code (0 = binary, 1 = nocase)
//!     17    19  reserved, zero
//!     36     4  crc32 of bytes 0..36
//! ```

use byteorder::{ByteOrder, LittleEndian};

use crate::document::Collation;
use crate::errors::{Result, VellumError};

pub mod codec;
pub mod file;
pub mod record;

/// File magic, first eight bytes of every store.
pub const MAGIC: [u8; 8] = *b"VLMSTORE";

/// Current format version.
pub const FORMAT_VERSION: u16 = 1;

/// Total header size in bytes.
pub const HEADER_LEN: usize = 40;

/// Upper bound on a single journal record body. Anything larger is
/// treated as corruption rather than allocated.
pub const MAX_RECORD_LEN: usize = 32 * 1024 * 1024;

const CRC_OFFSET: usize = 36;

/// Parsed store header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    pub user_version: u32,
    pub collation: Collation,
}

impl Header {
    pub fn new(collation: Collation) -> Self {
        Header { user_version: 0, collation }
    }

    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0..8].copy_from_slice(&MAGIC);
        LittleEndian::write_u16(&mut buf[8..10], FORMAT_VERSION);
        LittleEndian::write_u16(&mut buf[10..12], 0);
        LittleEndian::write_u32(&mut buf[12..16], self.user_version);
        buf[16] = collation_code(self.collation);
        let crc = crc32fast::hash(&buf[..CRC_OFFSET]);
        LittleEndian::write_u32(&mut buf[CRC_OFFSET..HEADER_LEN], crc);
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Header> {
        if buf.len() < HEADER_LEN {
            return Err(VellumError::format(format!(
                "store is {} bytes, shorter than the {HEADER_LEN}-byte header",
                buf.len()
            )));
        }
        if buf[0..8] != MAGIC {
            return Err(VellumError::format("bad magic, not a vellum store"));
        }
        let expected = LittleEndian::read_u32(&buf[CRC_OFFSET..HEADER_LEN]);
        let actual = crc32fast::hash(&buf[..CRC_OFFSET]);
        if expected != actual {
            return Err(VellumError::format(format!(
                "header checksum mismatch (stored {expected:08x}, computed {actual:08x})"
            )));
        }
        let version = LittleEndian::read_u16(&buf[8..10]);
        if version != FORMAT_VERSION {
            return Err(VellumError::UnsupportedVersion(version));
        }
        let user_version = LittleEndian::read_u32(&buf[12..16]);
        let collation = collation_from_code(buf[16])?;
        Ok(Header { user_version, collation })
    }
}

fn collation_code(collation: Collation) -> u8 {
    match collation {
        Collation::Binary => 0,
        Collation::NoCase => 1,
    }
}

fn collation_from_code(code: u8) -> Result<Collation> {
    match code {
        0 => Ok(Collation::Binary),
        1 => Ok(Collation::NoCase),
        other => Err(VellumError::format(format!(
            "unknown collation code {other}"
        ))),
    }
}

/// Quick magic check without full validation.
pub fn is_vellum_header(buf: &[u8]) -> bool {
    buf.len() >= 8 && buf[0..8] == MAGIC
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_round_trip() {
        let mut header = Header::new(Collation::NoCase);
        header.user_version = 42;
        let bytes = header.encode();
        assert_eq!(bytes.len(), HEADER_LEN);
        assert_eq!(Header::decode(&bytes).unwrap(), header);
    }

    #[test]
    fn test_rejects_bad_magic() {
        let mut bytes = Header::new(Collation::Binary).encode();
        bytes[0] = b'X';
        let err = Header::decode(&bytes).unwrap_err();
        assert!(err.to_string().contains("magic"), "got: {err}");
    }

    #[test]
    fn test_rejects_checksum_damage() {
        let mut bytes = Header::new(Collation::Binary).encode();
        bytes[12] ^= 0xFF; // flip a user_version byte, crc no longer matches
        let err = Header::decode(&bytes).unwrap_err();
        assert!(err.to_string().contains("checksum"), "got: {err}");
    }

    #[test]
    fn test_rejects_future_version() {
        let mut bytes = Header::new(Collation::Binary).encode();
        LittleEndian::write_u16(&mut bytes[8..10], 9);
        let crc = crc32fast::hash(&bytes[..CRC_OFFSET]);
        LittleEndian::write_u32(&mut bytes[CRC_OFFSET..HEADER_LEN], crc);
        match Header::decode(&bytes) {
            Err(VellumError::UnsupportedVersion(9)) => {}
            other => panic!("expected UnsupportedVersion, got {other:?}"),
        }
    }

    #[test]
    fn test_rejects_short_input() {
        assert!(Header::decode(&[0u8; 10]).is_err());
        assert!(!is_vellum_header(&[0u8; 4]));
        assert!(is_vellum_header(&Header::new(Collation::Binary).encode()));
    }
}
