//! A bounds-checked little-endian byte reader.
//!
//! Every multi-byte read goes through `byteorder`, but first checks the
//! remaining length explicitly so a short read always surfaces as the
//! taxonomy's `OutOfRange` rather than a generic I/O error — the decoder
//! invariant in `spec.md` §4.5 ("never reads past the declared length; any
//! short read produces `OutOfRange`").

use byteorder::{LittleEndian, ReadBytesExt};
use rt_core::{ErrorBuilder, ErrorKind, Result};

pub struct ByteReader<'a> {
    remaining: &'a [u8],
    consumed: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(bytes: &'a [u8]) -> ByteReader<'a> {
        ByteReader { remaining: bytes, consumed: 0 }
    }

    /// Byte offset already consumed, used as the instruction's address for
    /// `BlockOffset` targets and source-map lookups.
    pub fn position(&self) -> usize {
        self.consumed
    }

    pub fn is_empty(&self) -> bool {
        self.remaining.is_empty()
    }

    fn require(&self, n: usize) -> Result<()> {
        if self.remaining.len() < n {
            return Err(ErrorBuilder::new(ErrorKind::OutOfRange)
                .with(format!(
                    "bytecode underrun at offset {}: need {n} bytes, {} remain",
                    self.consumed,
                    self.remaining.len()
                ))
                .build());
        }
        Ok(())
    }

    fn advance(&mut self, n: usize) {
        self.remaining = &self.remaining[n..];
        self.consumed += n;
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.require(1)?;
        let v = self.remaining.read_u8().expect("length checked above");
        self.consumed += 1;
        Ok(v)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        self.require(2)?;
        let v = self.remaining.read_u16::<LittleEndian>().expect("length checked above");
        self.consumed += 2;
        Ok(v)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.require(4)?;
        let v = self.remaining.read_u32::<LittleEndian>().expect("length checked above");
        self.consumed += 4;
        Ok(v)
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        self.require(4)?;
        let v = self.remaining.read_i32::<LittleEndian>().expect("length checked above");
        self.consumed += 4;
        Ok(v)
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        self.require(8)?;
        let v = self.remaining.read_i64::<LittleEndian>().expect("length checked above");
        self.consumed += 8;
        Ok(v)
    }

    /// Reads a length-prefixed UTF-8 string (`u32` byte length, then bytes).
    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_u32()? as usize;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|e| {
            ErrorBuilder::new(ErrorKind::InvalidArgument)
                .with(format!("string field at offset {} is not valid UTF-8: {e}", self.consumed))
                .build()
        })
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        self.require(n)?;
        let (head, tail) = self.remaining.split_at(n);
        self.remaining = tail;
        self.consumed += n;
        Ok(head)
    }

    /// Seeks to an absolute offset from the start of the original buffer,
    /// used to resume decoding at a `BlockOffset` branch target.
    pub fn seek_absolute(&mut self, offset: usize, original: &'a [u8]) -> Result<()> {
        if offset > original.len() {
            return Err(ErrorBuilder::new(ErrorKind::OutOfRange)
                .with(format!("branch target {offset} is past end of bytecode ({} bytes)", original.len()))
                .build());
        }
        self.remaining = &original[offset..];
        self.consumed = offset;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_little_endian_scalars() {
        let bytes = [0x01, 0x02, 0x03, 0x04];
        let mut r = ByteReader::new(&bytes);
        assert_eq!(r.read_u8().unwrap(), 0x01);
        assert_eq!(r.read_u8().unwrap(), 0x02);
        let mut r2 = ByteReader::new(&bytes);
        assert_eq!(r2.read_u32().unwrap(), 0x0403_0201);
    }

    #[test]
    fn short_read_is_out_of_range() {
        let bytes = [0x01];
        let mut r = ByteReader::new(&bytes);
        let err = r.read_u32().unwrap_err();
        assert_eq!(err.kind(), rt_core::ErrorKind::OutOfRange);
    }

    #[test]
    fn every_truncated_prefix_fails_to_decode_u32() {
        let full = [1u8, 2, 3, 4];
        for len in 0..4 {
            let mut r = ByteReader::new(&full[..len]);
            assert!(r.read_u32().is_err());
        }
    }
}
