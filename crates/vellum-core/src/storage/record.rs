//! Journal records
//!
//! Every mutation appends one record to the store:
//!
//! ```text
//! u32 body length | body | u32 crc32(body)
//! ```
//!
//! The body is a one-byte operation tag followed by its payload.
//! Replay applies records in order; a record whose checksum does not
//! match, or that ends past the file, makes the whole store invalid.

use std::io::{Cursor, Read, Write};

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::document::{Document, Value};
use crate::errors::{Result, VellumError};
use crate::storage::codec;
use crate::storage::MAX_RECORD_LEN;

const TAG_CREATE_COLLECTION: u8 = 0x01;
const TAG_DROP_COLLECTION: u8 = 0x02;
const TAG_RENAME_COLLECTION: u8 = 0x03;
const TAG_INSERT: u8 = 0x04;
const TAG_DELETE: u8 = 0x05;
const TAG_UPDATE: u8 = 0x06;

/// One logged mutation.
#[derive(Clone, Debug, PartialEq)]
pub enum Record {
    CreateCollection { name: String },
    DropCollection { name: String },
    RenameCollection { from: String, to: String },
    Insert { collection: String, document: Document },
    Delete { collection: String, id: Value },
    Update { collection: String, document: Document },
}

impl Record {
    pub fn encode_body(&self) -> Result<Vec<u8>> {
        let mut body = Vec::new();
        match self {
            Record::CreateCollection { name } => {
                body.write_u8(TAG_CREATE_COLLECTION)?;
                codec::write_string(&mut body, name)?;
            }
            Record::DropCollection { name } => {
                body.write_u8(TAG_DROP_COLLECTION)?;
                codec::write_string(&mut body, name)?;
            }
            Record::RenameCollection { from, to } => {
                body.write_u8(TAG_RENAME_COLLECTION)?;
                codec::write_string(&mut body, from)?;
                codec::write_string(&mut body, to)?;
            }
            Record::Insert { collection, document } => {
                body.write_u8(TAG_INSERT)?;
                codec::write_string(&mut body, collection)?;
                codec::write_document(&mut body, document)?;
            }
            Record::Delete { collection, id } => {
                body.write_u8(TAG_DELETE)?;
                codec::write_string(&mut body, collection)?;
                codec::write_value(&mut body, id)?;
            }
            Record::Update { collection, document } => {
                body.write_u8(TAG_UPDATE)?;
                codec::write_string(&mut body, collection)?;
                codec::write_document(&mut body, document)?;
            }
        }
        Ok(body)
    }

    pub fn decode_body(body: &[u8]) -> Result<Record> {
        let mut cursor = Cursor::new(body);
        let tag = cursor.read_u8()?;
        let record = match tag {
            TAG_CREATE_COLLECTION => Record::CreateCollection {
                name: codec::read_string(&mut cursor)?,
            },
            TAG_DROP_COLLECTION => Record::DropCollection {
                name: codec::read_string(&mut cursor)?,
            },
            TAG_RENAME_COLLECTION => Record::RenameCollection {
                from: codec::read_string(&mut cursor)?,
                to: codec::read_string(&mut cursor)?,
            },
            TAG_INSERT => Record::Insert {
                collection: codec::read_string(&mut cursor)?,
                document: codec::read_document(&mut cursor)?,
            },
            TAG_DELETE => Record::Delete {
                collection: codec::read_string(&mut cursor)?,
                id: codec::read_value(&mut cursor)?,
            },
            TAG_UPDATE => Record::Update {
                collection: codec::read_string(&mut cursor)?,
                document: codec::read_document(&mut cursor)?,
            },
            other => {
                return Err(VellumError::format(format!(
                    "unknown record tag 0x{other:02x}"
                )))
            }
        };
        if cursor.position() as usize != body.len() {
            return Err(VellumError::format("trailing bytes in record body"));
        }
        Ok(record)
    }

    /// Name of the collection this record touches.
    pub fn collection(&self) -> &str {
        match self {
            Record::CreateCollection { name } | Record::DropCollection { name } => name,
            Record::RenameCollection { from, .. } => from,
            Record::Insert { collection, .. }
            | Record::Delete { collection, .. }
            | Record::Update { collection, .. } => collection,
        }
    }
}

/// Append one framed record.
pub fn write_record<W: Write>(w: &mut W, record: &Record) -> Result<u64> {
    let body = record.encode_body()?;
    if body.len() > MAX_RECORD_LEN {
        return Err(VellumError::format(format!(
            "record of {} bytes exceeds the {MAX_RECORD_LEN}-byte limit",
            body.len()
        )));
    }
    w.write_u32::<LittleEndian>(body.len() as u32)?;
    w.write_all(&body)?;
    w.write_u32::<LittleEndian>(crc32fast::hash(&body))?;
    Ok(8 + body.len() as u64)
}

/// Read the next framed record.
///
/// Returns `Ok(None)` at a clean end of file. A file that ends in the
/// middle of a record, or a record whose checksum does not match, is a
/// format error.
pub fn read_record<R: Read>(r: &mut R) -> Result<Option<Record>> {
    let mut len_buf = [0u8; 4];
    let mut filled = 0;
    while filled < len_buf.len() {
        let n = r.read(&mut len_buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    if filled == 0 {
        return Ok(None);
    }
    if filled < len_buf.len() {
        return Err(VellumError::format("store ends mid record length"));
    }

    let len = LittleEndian::read_u32(&len_buf) as usize;
    if len == 0 || len > MAX_RECORD_LEN {
        return Err(VellumError::format(format!(
            "record length {len} is outside the valid range"
        )));
    }

    let mut body = vec![0u8; len];
    read_fully(r, &mut body, "record body")?;
    let mut crc_buf = [0u8; 4];
    read_fully(r, &mut crc_buf, "record checksum")?;
    let expected = u32::from_le_bytes(crc_buf);
    let actual = crc32fast::hash(&body);
    if expected != actual {
        return Err(VellumError::format(format!(
            "record checksum mismatch (stored {expected:08x}, computed {actual:08x})"
        )));
    }

    Record::decode_body(&body).map(Some)
}

fn read_fully<R: Read>(r: &mut R, buf: &mut [u8], what: &str) -> Result<()> {
    r.read_exact(buf).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            VellumError::format(format!("store ends mid {what}"))
        } else {
            VellumError::Io(e)
        }
    })
}
