// Dolby Vision decoder configuration record (`dvcC` / `dvvC` box payload).

use crate::bitstream::{RpuReader, RpuWriter};
use crate::error::RpuError;

/// Serialised size of the configuration record.
pub const DECODER_CONFIG_SIZE: usize = 24;

/// Metadata compression mode of a stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Compression {
    #[default]
    None,
    /// Only mapping slot 0 may be referenced.
    Limited,
    Reserved,
    /// Any mapping slot may be referenced.
    Extended,
}

impl Compression {
    pub fn from_bits(v: u32) -> Self {
        match v & 3 {
            0 => Self::None,
            1 => Self::Limited,
            2 => Self::Reserved,
            _ => Self::Extended,
        }
    }

    pub fn bits(self) -> u32 {
        match self {
            Self::None => 0,
            Self::Limited => 1,
            Self::Reserved => 2,
            Self::Extended => 3,
        }
    }
}

/// Stream-wide configuration: profile, level and compatibility.
///
/// The individual fields are stable; the in-memory layout is not.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DecoderConfig {
    pub dv_version_major: u8,
    pub dv_version_minor: u8,
    /// 0 when unknown.
    pub dv_profile: u8,
    pub dv_level: u8,
    pub rpu_present_flag: bool,
    pub el_present_flag: bool,
    pub bl_present_flag: bool,
    pub dv_bl_signal_compatibility_id: u8,
    pub dv_md_compression: Compression,
}

impl DecoderConfig {
    /// Serialise to the 24-byte box payload.
    pub fn to_bytes(&self) -> Result<[u8; DECODER_CONFIG_SIZE], RpuError> {
        let mut w = RpuWriter::new();
        w.put_bits(8, u32::from(self.dv_version_major))?;
        w.put_bits(8, u32::from(self.dv_version_minor))?;
        w.put_bits(7, u32::from(self.dv_profile))?;
        w.put_bits(6, u32::from(self.dv_level))?;
        w.put_bit(self.rpu_present_flag)?;
        w.put_bit(self.el_present_flag)?;
        w.put_bit(self.bl_present_flag)?;
        w.put_bits(4, u32::from(self.dv_bl_signal_compatibility_id))?;
        w.put_bits(2, self.dv_md_compression.bits())?;
        w.put_bits(26, 0)?;
        for _ in 0..4 {
            w.put_bits(32, 0)?;
        }
        let bytes = w.finish()?;
        let mut out = [0u8; DECODER_CONFIG_SIZE];
        out.copy_from_slice(&bytes);
        Ok(out)
    }

    /// Parse a box payload. Trailing reserved bytes may be truncated.
    pub fn from_bytes(data: &[u8]) -> Result<Self, RpuError> {
        if data.len() < 8 {
            return Err(RpuError::invalid(format!(
                "decoder configuration record too short: {} bytes",
                data.len()
            )));
        }
        let mut r = RpuReader::new(data);
        Ok(Self {
            dv_version_major: r.bits(8)? as u8,
            dv_version_minor: r.bits(8)? as u8,
            dv_profile: r.bits(7)? as u8,
            dv_level: r.bits(6)? as u8,
            rpu_present_flag: r.bit()?,
            el_present_flag: r.bit()?,
            bl_present_flag: r.bit()?,
            dv_bl_signal_compatibility_id: r.bits(4)? as u8,
            dv_md_compression: Compression::from_bits(r.bits(2)?),
        })
    }
}
