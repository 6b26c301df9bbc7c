//! Little-endian payload encoding over fixed slices.
//!
//! [`Writer`] appends into a caller-provided slice and reports
//! [`OutOfSpace`] instead of growing, which is what lets packet encoders
//! drive the commit-and-retry discipline of the buffer pool. [`Reader`] is
//! the inverse, for inbound payloads and tests.
//!
//! Strings are framed as a u32 count of UTF-8 bytes, no terminator, with
//! the tail padded to 4-byte alignment.

use crate::error::{Error, Result};

/// The output slice cannot hold the next value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OutOfSpace;

/// Cursor writing little-endian values into a byte slice.
pub struct Writer<'a> {
    out: &'a mut [u8],
    pos: usize,
}

impl<'a> Writer<'a> {
    pub fn new(out: &'a mut [u8]) -> Writer<'a> {
        Writer { out, pos: 0 }
    }

    /// Bytes written so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), OutOfSpace> {
        let end = self.pos.checked_add(bytes.len()).ok_or(OutOfSpace)?;
        if end > self.out.len() {
            return Err(OutOfSpace);
        }
        self.out[self.pos..end].copy_from_slice(bytes);
        self.pos = end;
        Ok(())
    }

    pub fn write_u8(&mut self, v: u8) -> Result<(), OutOfSpace> {
        self.write_bytes(&[v])
    }

    pub fn write_u16(&mut self, v: u16) -> Result<(), OutOfSpace> {
        self.write_bytes(&v.to_le_bytes())
    }

    pub fn write_u32(&mut self, v: u32) -> Result<(), OutOfSpace> {
        self.write_bytes(&v.to_le_bytes())
    }

    pub fn write_u64(&mut self, v: u64) -> Result<(), OutOfSpace> {
        self.write_bytes(&v.to_le_bytes())
    }

    pub fn write_f64(&mut self, v: f64) -> Result<(), OutOfSpace> {
        self.write_bytes(&v.to_le_bytes())
    }

    /// Length-prefixed UTF-8, padded to 4-byte alignment.
    pub fn write_string(&mut self, s: &str) -> Result<(), OutOfSpace> {
        self.write_u32(s.len() as u32)?;
        self.write_bytes(s.as_bytes())?;
        let pad = (4 - s.len() % 4) % 4;
        self.write_bytes(&[0u8; 3][..pad])
    }

    /// `Some` encodes as a set presence flag followed by the value.
    pub fn write_optional_u16(&mut self, v: Option<u16>) -> Result<(), OutOfSpace> {
        match v {
            Some(v) => {
                self.write_u8(1)?;
                self.write_u16(v)
            }
            None => {
                self.write_u8(0)?;
                self.write_u16(0)
            }
        }
    }
}

/// Size of a string as framed by [`Writer::write_string`].
pub fn string_len(s: &str) -> usize {
    4 + s.len() + (4 - s.len() % 4) % 4
}

/// Cursor reading little-endian values out of a byte slice.
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Reader<'a> {
        Reader { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| Error::InvalidArgument("truncated packet payload".into()))?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let b = self.take(8)?;
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_bits(self.read_u64()?))
    }

    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_u32()? as usize;
        let bytes = self.take(len)?;
        let pad = (4 - len % 4) % 4;
        self.take(pad)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| Error::InvalidArgument("packet string is not UTF-8".into()))
    }

    pub fn read_optional_u16(&mut self) -> Result<Option<u16>> {
        let present = self.read_u8()?;
        let value = self.read_u16()?;
        Ok((present != 0).then_some(value))
    }
}
