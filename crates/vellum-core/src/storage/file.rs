//! Backing storage abstraction
//!
//! A session works against anything that can read, write, seek,
//! truncate and report its length. Real stores use [`std::fs::File`];
//! tests and in-memory stores use `Cursor<Vec<u8>>`.

use std::fs::File;
use std::io::{Cursor, Read, Seek, Write};

use crate::errors::Result;

pub trait StoreFile: Read + Write + Seek {
    /// Current total length in bytes.
    fn len(&self) -> Result<u64>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Cut the file to exactly `len` bytes.
    fn truncate(&mut self, len: u64) -> Result<()>;

    /// Push buffered writes down to durable storage where the backing
    /// supports it.
    fn sync(&mut self) -> Result<()>;
}

impl StoreFile for File {
    fn len(&self) -> Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn truncate(&mut self, len: u64) -> Result<()> {
        self.set_len(len)?;
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        self.sync_all()?;
        Ok(())
    }
}

impl StoreFile for Cursor<Vec<u8>> {
    fn len(&self) -> Result<u64> {
        Ok(self.get_ref().len() as u64)
    }

    fn truncate(&mut self, len: u64) -> Result<()> {
        self.get_mut().truncate(len as usize);
        if self.position() > len {
            self.set_position(len);
        }
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        Ok(())
    }
}
