//! Bit sink and source for the compressed stream.
//!
//! Fields are packed most significant bit first, frames follow each other
//! without alignment. Only [`BitWriter::insert_terminator`] pads to a byte
//! boundary.

use bitvec::prelude::*;

use crate::errors::{Error, Result};

#[derive(Clone, Debug, Default)]
pub struct BitWriter {
    bits: BitVec<u8, Msb0>,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the `nbits` low bits of `value`.
    pub fn write(&mut self, value: u32, nbits: u32) {
        debug_assert!(nbits <= 32);
        if nbits == 0 {
            return;
        }
        let start = self.bits.len();
        self.bits.resize(start + nbits as usize, false);
        self.bits[start..].store_be::<u32>(value);
    }

    pub fn write_u64(&mut self, value: u64, nbits: u32) {
        debug_assert!(nbits <= 64);
        if nbits == 0 {
            return;
        }
        let start = self.bits.len();
        self.bits.resize(start + nbits as usize, false);
        self.bits[start..].store_be::<u64>(value);
    }

    /// Number of bits written so far.
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Drop everything written after bit `len`.
    pub fn truncate(&mut self, len: usize) {
        self.bits.truncate(len);
    }

    /// Pad to a byte boundary with a 0 followed by 1s, which reads back as a
    /// terminator (or as too few bits for another frame).
    pub fn insert_terminator(&mut self) {
        if self.bits.len() % 8 != 0 {
            self.write(0, 1);
            while self.bits.len() % 8 != 0 {
                self.write(1, 1);
            }
        }
    }

    pub fn as_bitslice(&self) -> &BitSlice<u8, Msb0> {
        self.bits.as_bitslice()
    }

    /// Bytes of the stream, trailing bits of a partial byte are zero.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bits = self.bits.clone();
        bits.set_uninitialized(false);
        bits.into_vec()
    }

    pub fn into_bytes(mut self) -> Vec<u8> {
        self.bits.set_uninitialized(false);
        self.bits.into_vec()
    }
}

#[derive(Clone, Debug)]
pub struct BitReader<'a> {
    bits: &'a BitSlice<u8, Msb0>,
    pos: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            bits: data.view_bits::<Msb0>(),
            pos: 0,
        }
    }

    pub fn from_bits(bits: &'a BitSlice<u8, Msb0>) -> Self {
        Self { bits, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.bits.len() - self.pos
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    fn field(&self, nbits: usize) -> Result<&'a BitSlice<u8, Msb0>> {
        if nbits > self.remaining() {
            return Err(Error::CorruptedPayload("Unexpected end of frame"));
        }
        Ok(&self.bits[self.pos..self.pos + nbits])
    }

    pub fn peek(&self, nbits: u32) -> Result<u32> {
        debug_assert!(nbits <= 32);
        if nbits == 0 {
            return Ok(0);
        }
        Ok(self.field(nbits as usize)?.load_be::<u32>())
    }

    pub fn read(&mut self, nbits: u32) -> Result<u32> {
        let value = self.peek(nbits)?;
        self.pos += nbits as usize;
        Ok(value)
    }

    pub fn read_u64(&mut self, nbits: u32) -> Result<u64> {
        debug_assert!(nbits <= 64);
        if nbits == 0 {
            return Ok(0);
        }
        let value = self.field(nbits as usize)?.load_be::<u64>();
        self.pos += nbits as usize;
        Ok(value)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn fields_are_msb_first() {
        let mut w = BitWriter::new();
        w.write(0, 1);
        w.write(5, 4);
        w.write(0b101, 3);
        assert_eq!(w.len(), 8);
        assert_eq!(w.to_bytes(), vec![0b0010_1101]);

        let bytes = w.into_bytes();
        let mut r = BitReader::new(&bytes);
        assert_eq!(r.read(1).unwrap(), 0);
        assert_eq!(r.peek(4).unwrap(), 5);
        assert_eq!(r.read(4).unwrap(), 5);
        assert_eq!(r.read(3).unwrap(), 0b101);
        assert_eq!(r.remaining(), 0);
        assert!(matches!(r.read(1), Err(Error::CorruptedPayload(_))));
    }

    #[test]
    fn terminator_pads_to_byte() {
        let mut w = BitWriter::new();
        w.write(0b10, 2);
        w.insert_terminator();
        assert_eq!(w.len(), 8);
        assert_eq!(w.to_bytes(), vec![0b1001_1111]);

        // Already aligned streams are left alone
        w.insert_terminator();
        assert_eq!(w.len(), 8);
    }

    #[test]
    fn truncate_discards_partial_frame() {
        let mut w = BitWriter::new();
        w.write(0xabc, 12);
        let mark = w.len();
        w.write(0x7f, 7);
        w.truncate(mark);
        w.write(0, 4);
        assert_eq!(w.to_bytes(), vec![0xab, 0xc0]);
    }

    #[test]
    fn wide_payloads() {
        let mut w = BitWriter::new();
        w.write_u64(0x0123_4567_89ab_cdef, 64);
        let mut r = BitReader::from_bits(w.as_bitslice());
        assert_eq!(r.read_u64(64).unwrap(), 0x0123_4567_89ab_cdef);
        assert!(r.read(1).is_err());
    }
}
