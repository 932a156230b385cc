// Byte-level encapsulation of RPU payloads.
//
// HEVC/H.264 streams carry the RPU in an UNSPEC62 NAL unit with emulation
// prevention; AV1 streams carry it in an ITU-T T.35 metadata OBU wrapped in a
// fixed EMDF container.

use bitflags::bitflags;

use crate::bitstream::{RpuReader, RpuWriter};
use crate::error::{RpuError, validate};

bitflags! {
    /// Output options for `RpuContext::generate`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct WrapFlags: u32 {
        /// Prepend the UNSPEC62 NAL header and apply emulation prevention.
        const NAL      = 1 << 0;
        /// Wrap in T.35 + EMDF (AV1). Takes precedence over `NAL`.
        const T35      = 1 << 1;
        /// Enable metadata compression if the stream is configured for it.
        const COMPRESS = 1 << 2;
    }
}

/// HEVC NAL unit header for type 62, layer 0, temporal id 0.
pub const HEVC_UNSPEC62_HEADER: [u8; 2] = [0x7C, 0x01];

pub const T35_COUNTRY_CODE_US: u8 = 0xB5;
pub const T35_PROVIDER_CODE_DOLBY: u16 = 0x003B;
pub const T35_PROVIDER_ORIENTED_CODE: u32 = 0x800;
const T35_HEADER_LEN: usize = 7;

/// emdf_version, key_id, payload_id and payload_size prefix bits of the only
/// EMDF layout Dolby Vision uses.
const EMDF_MAGIC: u32 = 0x01be6841;
const EMDF_MAGIC_BITS: u32 = 27;
/// emdf_payload_id terminator plus protection bits.
const EMDF_FOOTER: u32 = 0x400;
const EMDF_FOOTER_BITS: u32 = 17;
const EMDF_MIN_PAYLOAD: u32 = 6;
const EMDF_MAX_PAYLOAD: u32 = 512;

// ---------------------------------------------------------------------------
// Emulation prevention
// ---------------------------------------------------------------------------

/// Insert `0x03` after every two zero bytes that precede a byte <= 3.
pub fn add_emulation_prevention(src: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(src.len() + src.len() / 64 + 1);
    let mut zero_run = 0;
    for &b in src {
        if zero_run < 2 {
            zero_run = if b == 0 { zero_run + 1 } else { 0 };
        } else {
            if b & !3 == 0 {
                out.push(3);
            }
            zero_run = usize::from(b == 0);
        }
        out.push(b);
    }
    out
}

/// Drop the `0x03` byte of every `00 00 03` sequence.
pub fn remove_emulation_prevention(src: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(src.len());
    let mut zero_run = 0;
    for &b in src {
        if zero_run >= 2 && b == 3 {
            zero_run = 0;
            continue;
        }
        zero_run = if b == 0 { zero_run + 1 } else { 0 };
        out.push(b);
    }
    out
}

// ---------------------------------------------------------------------------
// NAL
// ---------------------------------------------------------------------------

/// Wrap an RPU (starting with the `0x19` prefix) into an UNSPEC62 NAL unit.
pub fn wrap_nal(rpu: &[u8]) -> Vec<u8> {
    let escaped = add_emulation_prevention(rpu);
    let mut out = Vec::with_capacity(escaped.len() + HEVC_UNSPEC62_HEADER.len());
    out.extend_from_slice(&HEVC_UNSPEC62_HEADER);
    out.extend_from_slice(&escaped);
    out
}

/// Recover the RPU from a NAL unit. The UNSPEC62 header is stripped when
/// present; input that already starts at the RPU prefix is only unescaped.
pub fn unwrap_nal(nal: &[u8]) -> Result<Vec<u8>, RpuError> {
    let body = match nal {
        [b0, _, rest @ ..] if (b0 >> 1) & 0x3F == 62 => rest,
        [0x19, ..] => nal,
        [] => return Err(RpuError::invalid("empty NAL unit")),
        [b0, ..] => {
            return Err(RpuError::invalid(format!(
                "not a Dolby Vision RPU NAL unit (first byte {b0:#04x})"
            )));
        }
    };
    Ok(remove_emulation_prevention(body))
}

// ---------------------------------------------------------------------------
// T.35 + EMDF
// ---------------------------------------------------------------------------

/// Wrap an RPU payload (without the `0x19` prefix) into a T.35 message
/// carrying an EMDF container. The result is padded to a byte boundary with
/// one bits.
pub fn wrap_t35(payload: &[u8]) -> Result<Vec<u8>, RpuError> {
    let size = validate(
        "emdf_payload_size",
        u32::try_from(payload.len()).unwrap_or(u32::MAX),
        EMDF_MIN_PAYLOAD,
        EMDF_MAX_PAYLOAD,
    )?;

    let mut w = RpuWriter::with_buffer(Vec::with_capacity(payload.len() + 16));
    w.put_bits(8, u32::from(T35_COUNTRY_CODE_US))?;
    w.put_bits(16, u32::from(T35_PROVIDER_CODE_DOLBY))?;
    w.put_bits(32, T35_PROVIDER_ORIENTED_CODE)?;
    w.put_bits(EMDF_MAGIC_BITS, EMDF_MAGIC)?;
    if size > 0xFF {
        w.put_bits(8, (size >> 8) - 1)?;
        w.put_bit(true)?;
        w.put_bits(8, size & 0xFF)?;
        w.put_bit(false)?;
    } else {
        w.put_bits(8, size)?;
        w.put_bit(false)?;
    }
    w.put_bytes(payload)?;
    w.put_bits(EMDF_FOOTER_BITS, EMDF_FOOTER)?;
    w.pad_ones()?;
    w.finish()
}

/// Strip the T.35 header, returning the EMDF container.
pub fn unwrap_t35(data: &[u8]) -> Result<&[u8], RpuError> {
    if data.len() < T35_HEADER_LEN {
        return Err(RpuError::invalid(format!(
            "T.35 message too short: {} bytes",
            data.len()
        )));
    }
    let country = data[0];
    let provider = u16::from_be_bytes([data[1], data[2]]);
    let oriented = u32::from_be_bytes([data[3], data[4], data[5], data[6]]);
    if country != T35_COUNTRY_CODE_US
        || provider != T35_PROVIDER_CODE_DOLBY
        || oriented != T35_PROVIDER_ORIENTED_CODE
    {
        return Err(RpuError::invalid(format!(
            "not a Dolby Vision T.35 message ({country:#04x}/{provider:#06x}/{oriented:#x})"
        )));
    }
    Ok(&data[T35_HEADER_LEN..])
}

/// Extract the RPU payload from an EMDF container into `out`. The payload is
/// not byte aligned in the container, so it is copied.
pub fn read_emdf(data: &[u8], out: &mut Vec<u8>) -> Result<(), RpuError> {
    let mut r = RpuReader::new(data);
    let magic = r.bits(EMDF_MAGIC_BITS)?;
    if magic != EMDF_MAGIC {
        return Err(RpuError::invalid(format!(
            "unexpected EMDF header {magic:#x}"
        )));
    }
    let size = validate(
        "emdf_payload_size",
        r.variable_bits(8)?,
        EMDF_MIN_PAYLOAD,
        EMDF_MAX_PAYLOAD,
    )?;
    if u64::from(size) * 8 > r.bits_left() {
        return Err(RpuError::invalid(format!(
            "EMDF payload size {size} exceeds container"
        )));
    }
    out.clear();
    out.reserve(size as usize);
    for _ in 0..size {
        out.push(r.bits(8)? as u8);
    }
    let footer = r.bits(EMDF_FOOTER_BITS)?;
    if footer != EMDF_FOOTER {
        return Err(RpuError::invalid(format!(
            "unexpected EMDF protection bits {footer:#x}"
        )));
    }
    Ok(())
}
