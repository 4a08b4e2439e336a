//! In-memory handoff buffer between two consecutive stages.
//!
//! The producing stage writes the buffer end to end, the orchestrator moves it
//! to the consuming stage and rewinds it, and the consumer reads it. A buffer
//! is only ever owned by one stage at a time.

use std::borrow::Cow;
use std::io::{self, Cursor, Read, Write};

#[derive(Debug, Default)]
pub struct Buffer {
    cursor: Cursor<Vec<u8>>,
}

impl Buffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the read/write position back to the first byte.
    pub fn rewind_to_start(&mut self) {
        self.cursor.set_position(0);
    }

    /// Everything written so far, independent of the current position.
    pub fn contents(&self) -> &[u8] {
        self.cursor.get_ref()
    }

    pub fn contents_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.contents())
    }

    pub fn len(&self) -> usize {
        self.contents().len()
    }

    pub fn is_empty(&self) -> bool {
        self.contents().is_empty()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.cursor.into_inner()
    }
}

impl Read for Buffer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.cursor.read(buf)
    }
}

impl Write for Buffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.cursor.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
