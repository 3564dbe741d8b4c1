//! Binary value codec
//!
//! One byte of type tag, then a fixed or length-prefixed payload.
//! Strings are u32-length UTF-8; document field names are u16-length
//! (field names are short). Datetimes are stored as milliseconds since
//! the Unix epoch, UTC.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use chrono::TimeZone;

use crate::document::{Document, Value};
use crate::errors::{Result, VellumError};
use crate::storage::MAX_RECORD_LEN;

const TAG_NULL: u8 = 0x00;
const TAG_BOOL: u8 = 0x01;
const TAG_INT: u8 = 0x02;
const TAG_DOUBLE: u8 = 0x03;
const TAG_STRING: u8 = 0x04;
const TAG_DATETIME: u8 = 0x05;
const TAG_ARRAY: u8 = 0x06;
const TAG_DOCUMENT: u8 = 0x07;

/// Nesting limit while decoding, so corrupt input cannot blow the stack.
const MAX_DEPTH: u32 = 128;

pub fn write_value<W: Write>(w: &mut W, value: &Value) -> Result<()> {
    match value {
        Value::Null => w.write_u8(TAG_NULL)?,
        Value::Bool(b) => {
            w.write_u8(TAG_BOOL)?;
            w.write_u8(u8::from(*b))?;
        }
        Value::Int(n) => {
            w.write_u8(TAG_INT)?;
            w.write_i64::<LittleEndian>(*n)?;
        }
        Value::Double(n) => {
            w.write_u8(TAG_DOUBLE)?;
            w.write_f64::<LittleEndian>(*n)?;
        }
        Value::String(s) => {
            w.write_u8(TAG_STRING)?;
            write_string(w, s)?;
        }
        Value::DateTime(dt) => {
            w.write_u8(TAG_DATETIME)?;
            w.write_i64::<LittleEndian>(dt.timestamp_millis())?;
        }
        Value::Array(items) => {
            w.write_u8(TAG_ARRAY)?;
            w.write_u32::<LittleEndian>(items.len() as u32)?;
            for item in items {
                write_value(w, item)?;
            }
        }
        Value::Document(doc) => {
            w.write_u8(TAG_DOCUMENT)?;
            write_document(w, doc)?;
        }
    }
    Ok(())
}

pub fn write_document<W: Write>(w: &mut W, doc: &Document) -> Result<()> {
    w.write_u32::<LittleEndian>(doc.len() as u32)?;
    for (name, value) in doc.iter() {
        let bytes = name.as_bytes();
        if bytes.len() > u16::MAX as usize {
            return Err(VellumError::format(format!(
                "field name longer than {} bytes",
                u16::MAX
            )));
        }
        w.write_u16::<LittleEndian>(bytes.len() as u16)?;
        w.write_all(bytes)?;
        write_value(w, value)?;
    }
    Ok(())
}

pub fn write_string<W: Write>(w: &mut W, s: &str) -> Result<()> {
    w.write_u32::<LittleEndian>(s.len() as u32)?;
    w.write_all(s.as_bytes())?;
    Ok(())
}

pub fn read_value<R: Read>(r: &mut R) -> Result<Value> {
    read_value_at(r, 0)
}

fn read_value_at<R: Read>(r: &mut R, depth: u32) -> Result<Value> {
    if depth > MAX_DEPTH {
        return Err(VellumError::format("value nesting exceeds limit"));
    }
    let tag = r.read_u8()?;
    let value = match tag {
        TAG_NULL => Value::Null,
        TAG_BOOL => Value::Bool(r.read_u8()? != 0),
        TAG_INT => Value::Int(r.read_i64::<LittleEndian>()?),
        TAG_DOUBLE => Value::Double(r.read_f64::<LittleEndian>()?),
        TAG_STRING => Value::String(read_string(r)?),
        TAG_DATETIME => {
            let millis = r.read_i64::<LittleEndian>()?;
            match chrono::Utc.timestamp_millis_opt(millis).single() {
                Some(dt) => Value::DateTime(dt),
                None => {
                    return Err(VellumError::format(format!(
                        "datetime {millis} ms is out of range"
                    )))
                }
            }
        }
        TAG_ARRAY => {
            let count = r.read_u32::<LittleEndian>()? as usize;
            check_count(count)?;
            let mut items = Vec::with_capacity(count.min(1024));
            for _ in 0..count {
                items.push(read_value_at(r, depth + 1)?);
            }
            Value::Array(items)
        }
        TAG_DOCUMENT => Value::Document(read_document_at(r, depth + 1)?),
        other => {
            return Err(VellumError::format(format!(
                "unknown value tag 0x{other:02x}"
            )))
        }
    };
    Ok(value)
}

pub fn read_document<R: Read>(r: &mut R) -> Result<Document> {
    read_document_at(r, 0)
}

fn read_document_at<R: Read>(r: &mut R, depth: u32) -> Result<Document> {
    let count = r.read_u32::<LittleEndian>()? as usize;
    check_count(count)?;
    let mut doc = Document::new();
    for _ in 0..count {
        let name_len = r.read_u16::<LittleEndian>()? as usize;
        let mut name = vec![0u8; name_len];
        r.read_exact(&mut name)?;
        let name = String::from_utf8(name)
            .map_err(|_| VellumError::format("field name is not valid UTF-8"))?;
        let value = read_value_at(r, depth)?;
        doc.insert(name, value);
    }
    Ok(doc)
}

pub fn read_string<R: Read>(r: &mut R) -> Result<String> {
    let len = r.read_u32::<LittleEndian>()? as usize;
    if len > MAX_RECORD_LEN {
        return Err(VellumError::format(format!(
            "string length {len} exceeds record limit"
        )));
    }
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|_| VellumError::format("string is not valid UTF-8"))
}

/// A count field cannot honestly exceed the record size, since every
/// element takes at least one byte.
fn check_count(count: usize) -> Result<()> {
    if count > MAX_RECORD_LEN {
        return Err(VellumError::format(format!(
            "element count {count} exceeds record limit"
        )));
    }
    Ok(())
}
