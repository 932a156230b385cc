// MSB-first bit reader for RPU payloads.
//
// Thin layer over `bitstream_io::BitReader` that keeps its own bit position
// (needed for extension-block length accounting and the "bits left" check
// that detects the optional v2 extension list) and adds the Exp-Golomb and
// EMDF variable-length codes the RPU syntax uses.

use std::io::Cursor;

use bitstream_io::{BigEndian, BitRead, BitReader};

use crate::error::RpuError;

/// Longest Exp-Golomb prefix accepted (values up to 2^33 - 2).
const MAX_GOLOMB_PREFIX: u32 = 32;

pub struct RpuReader<'a> {
    inner: BitReader<Cursor<&'a [u8]>, BigEndian>,
    pos: u64,
    len: u64,
}

impl<'a> RpuReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            inner: BitReader::endian(Cursor::new(data), BigEndian),
            pos: 0,
            len: data.len() as u64 * 8,
        }
    }

    /// Number of bits consumed so far.
    #[inline]
    pub fn bits_read(&self) -> u64 {
        self.pos
    }

    /// Number of bits remaining in the payload.
    #[inline]
    pub fn bits_left(&self) -> u64 {
        self.len.saturating_sub(self.pos)
    }

    pub fn bit(&mut self) -> Result<bool, RpuError> {
        let b = self.inner.read_bit()?;
        self.pos += 1;
        Ok(b)
    }

    /// Read an unsigned field of `n` bits (`n <= 32`).
    pub fn bits(&mut self, n: u32) -> Result<u32, RpuError> {
        debug_assert!(n <= 32);
        if n == 0 {
            return Ok(0);
        }
        let v = self.inner.read::<u32>(n)?;
        self.pos += u64::from(n);
        Ok(v)
    }

    /// Read an unsigned field of `n` bits (`n <= 64`).
    pub fn bits64(&mut self, n: u32) -> Result<u64, RpuError> {
        debug_assert!(n <= 64);
        if n == 0 {
            return Ok(0);
        }
        let v = self.inner.read::<u64>(n)?;
        self.pos += u64::from(n);
        Ok(v)
    }

    /// Read a two's complement field of `n` bits (`1 <= n <= 32`).
    pub fn sbits(&mut self, n: u32) -> Result<i32, RpuError> {
        debug_assert!((1..=32).contains(&n));
        let v = self.inner.read_signed::<i32>(n)?;
        self.pos += u64::from(n);
        Ok(v)
    }

    pub fn skip(&mut self, mut n: u64) -> Result<(), RpuError> {
        if n > self.bits_left() {
            return Err(RpuError::invalid(format!(
                "attempt to skip {n} bits with only {} left",
                self.bits_left()
            )));
        }
        while n > 0 {
            let chunk = n.min(u64::from(u32::MAX)) as u32;
            self.inner.skip(chunk)?;
            self.pos += u64::from(chunk);
            n -= u64::from(chunk);
        }
        Ok(())
    }

    /// Discard bits up to the next byte boundary.
    pub fn align(&mut self) {
        self.inner.byte_align();
        self.pos = self.pos.div_ceil(8) * 8;
    }

    /// Unsigned Exp-Golomb code, ue(v).
    pub fn ue(&mut self) -> Result<u64, RpuError> {
        let mut zeros = 0u32;
        while !self.bit()? {
            zeros += 1;
            if zeros > MAX_GOLOMB_PREFIX {
                return Err(RpuError::invalid("Exp-Golomb code too long"));
            }
        }
        let suffix = self.bits64(zeros)?;
        Ok((1u64 << zeros) - 1 + suffix)
    }

    /// ue(v) narrowed to `u32`.
    pub fn ue32(&mut self) -> Result<u32, RpuError> {
        let v = self.ue()?;
        u32::try_from(v).map_err(|_| RpuError::invalid(format!("Exp-Golomb value {v} overflows")))
    }

    /// Signed Exp-Golomb code, se(v).
    pub fn se(&mut self) -> Result<i64, RpuError> {
        let k = self.ue()? as i64;
        Ok(if k & 1 == 1 { (k + 1) / 2 } else { -(k / 2) })
    }

    /// EMDF `variable_bits(n)`: groups of `n` bits chained by a read_more flag.
    pub fn variable_bits(&mut self, n: u32) -> Result<u32, RpuError> {
        let mut value = self.bits(n)?;
        while self.bit()? {
            let high = value
                .checked_add(1)
                .filter(|v| v.leading_zeros() >= n)
                .ok_or_else(|| RpuError::invalid("variable_bits overflow"))?;
            value = (high << n) | self.bits(n)?;
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_fixed_width_fields() {
        let data = [0b1010_1100, 0xFF, 0x00];
        let mut r = RpuReader::new(&data);
        assert!(r.bit().unwrap());
        assert_eq!(r.bits(3).unwrap(), 0b010);
        assert_eq!(r.bits(12).unwrap(), 0b1100_1111_1111);
        assert_eq!(r.bits_read(), 16);
        assert_eq!(r.bits_left(), 8);
    }

    #[test]
    fn reads_exp_golomb() {
        // ue: 1 -> 0, 010 -> 1, 011 -> 2, 00100 -> 3
        let data = [0b1010_0110, 0b0100_0000];
        let mut r = RpuReader::new(&data);
        assert_eq!(r.ue().unwrap(), 0);
        assert_eq!(r.ue().unwrap(), 1);
        assert_eq!(r.ue().unwrap(), 2);
        assert_eq!(r.ue().unwrap(), 3);
    }

    #[test]
    fn reads_signed_exp_golomb() {
        // se: 010 -> 1, 011 -> -1, 00100 -> 2
        let data = [0b0100_1100, 0b1000_0000];
        let mut r = RpuReader::new(&data);
        assert_eq!(r.se().unwrap(), 1);
        assert_eq!(r.se().unwrap(), -1);
        assert_eq!(r.se().unwrap(), 2);
    }

    #[test]
    fn align_moves_to_byte_boundary() {
        let data = [0xFF, 0xAB];
        let mut r = RpuReader::new(&data);
        r.bits(3).unwrap();
        r.align();
        assert_eq!(r.bits_read(), 8);
        assert_eq!(r.bits(8).unwrap(), 0xAB);
    }

    #[test]
    fn underrun_is_an_error() {
        let data = [0x00];
        let mut r = RpuReader::new(&data);
        assert!(r.bits(9).is_err());
    }

    #[test]
    fn skip_past_end_rejected() {
        let data = [0x00, 0x00];
        let mut r = RpuReader::new(&data);
        assert!(r.skip(17).is_err());
        r.skip(16).unwrap();
        assert_eq!(r.bits_left(), 0);
    }

    #[test]
    fn variable_bits_chain() {
        // value0 = 1 (8 bits), read_more = 1, value1 = 0x05, read_more = 0
        // -> ((1 + 1) << 8) | 5 = 0x205
        let mut w = crate::bitstream::RpuWriter::new();
        w.put_bits(8, 1).unwrap();
        w.put_bit(true).unwrap();
        w.put_bits(8, 5).unwrap();
        w.put_bit(false).unwrap();
        w.align_zero().unwrap();
        let data = w.finish().unwrap();
        let mut r = RpuReader::new(&data);
        assert_eq!(r.variable_bits(8).unwrap(), 0x205);
    }
}
