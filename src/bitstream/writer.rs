// MSB-first bit writer for RPU payloads.

use bitstream_io::{BigEndian, BitWrite, BitWriter};

use crate::error::RpuError;

/// Largest ue(v) value with a prefix the reader accepts.
const MAX_UE: u64 = (1 << 33) - 2;

pub struct RpuWriter {
    inner: BitWriter<Vec<u8>, BigEndian>,
    pos: u64,
}

impl Default for RpuWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl RpuWriter {
    pub fn new() -> Self {
        Self::with_buffer(Vec::new())
    }

    /// Write into `buf`, discarding its previous contents but keeping the
    /// allocation.
    pub fn with_buffer(mut buf: Vec<u8>) -> Self {
        buf.clear();
        Self {
            inner: BitWriter::endian(buf, BigEndian),
            pos: 0,
        }
    }

    #[inline]
    pub fn bits_written(&self) -> u64 {
        self.pos
    }

    pub fn put_bit(&mut self, b: bool) -> Result<(), RpuError> {
        self.inner.write_bit(b)?;
        self.pos += 1;
        Ok(())
    }

    /// Write the low `n` bits of `value` (`n <= 32`). Values that do not
    /// fit are rejected rather than truncated.
    pub fn put_bits(&mut self, n: u32, value: u32) -> Result<(), RpuError> {
        debug_assert!(n <= 32);
        if n == 0 {
            return Ok(());
        }
        if n < 32 && value >> n != 0 {
            return Err(RpuError::InvalidArgument(format!(
                "value {value} does not fit in {n} bits"
            )));
        }
        self.inner.write::<u32>(n, value)?;
        self.pos += u64::from(n);
        Ok(())
    }

    pub fn put_bits64(&mut self, n: u32, value: u64) -> Result<(), RpuError> {
        debug_assert!(n <= 64);
        if n == 0 {
            return Ok(());
        }
        if n < 64 && value >> n != 0 {
            return Err(RpuError::InvalidArgument(format!(
                "value {value} does not fit in {n} bits"
            )));
        }
        self.inner.write::<u64>(n, value)?;
        self.pos += u64::from(n);
        Ok(())
    }

    /// Two's complement field of `n` bits (`1 <= n <= 32`).
    pub fn put_sbits(&mut self, n: u32, value: i32) -> Result<(), RpuError> {
        debug_assert!((1..=32).contains(&n));
        let min = -(1i64 << (n - 1));
        let max = (1i64 << (n - 1)) - 1;
        if i64::from(value) < min || i64::from(value) > max {
            return Err(RpuError::InvalidArgument(format!(
                "value {value} does not fit in {n} signed bits"
            )));
        }
        let mask = if n == 32 { u32::MAX } else { (1u32 << n) - 1 };
        self.put_bits(n, value as u32 & mask)
    }

    /// Unsigned Exp-Golomb code, ue(v).
    pub fn put_ue(&mut self, value: u64) -> Result<(), RpuError> {
        if value > MAX_UE {
            return Err(RpuError::InvalidArgument(format!(
                "value {value} too large for ue(v)"
            )));
        }
        let v = value + 1;
        let len = 64 - v.leading_zeros();
        let zeros = len - 1;
        for _ in 0..zeros {
            self.put_bit(false)?;
        }
        self.put_bits64(len, v)
    }

    /// Signed Exp-Golomb code, se(v).
    pub fn put_se(&mut self, value: i64) -> Result<(), RpuError> {
        let mapped = if value > 0 {
            (value as u64) * 2 - 1
        } else {
            value.unsigned_abs().saturating_mul(2)
        };
        self.put_ue(mapped)
    }

    /// Zero-fill to the next byte boundary.
    pub fn align_zero(&mut self) -> Result<(), RpuError> {
        let pad = (8 - (self.pos % 8) as u32) % 8;
        self.put_bits(pad, 0)
    }

    /// One-fill to the next byte boundary.
    pub fn pad_ones(&mut self) -> Result<(), RpuError> {
        let pad = (8 - (self.pos % 8) as u32) % 8;
        if pad == 0 {
            return Ok(());
        }
        self.put_bits(pad, (1u32 << pad) - 1)
    }

    /// Write whole bytes at the current (possibly unaligned) position.
    pub fn put_bytes(&mut self, bytes: &[u8]) -> Result<(), RpuError> {
        if self.pos % 8 == 0 {
            self.inner.write_bytes(bytes)?;
            self.pos += bytes.len() as u64 * 8;
            return Ok(());
        }
        for &b in bytes {
            self.put_bits(8, u32::from(b))?;
        }
        Ok(())
    }

    /// Return the written bytes. The writer must be byte aligned.
    pub fn finish(self) -> Result<Vec<u8>, RpuError> {
        if self.pos % 8 != 0 {
            return Err(RpuError::InvalidArgument(format!(
                "writer not byte aligned ({} bits)",
                self.pos
            )));
        }
        Ok(self.inner.into_writer())
    }
}
