// Display management extension blocks.
//
// Each block is tagged by a level. Levels 6, 10, 32, 254 and 255 describe
// the mastering/target setup and are static for a stream; every other level
// is dynamic (scene scoped). Version 1 blocks (levels 1, 2, 4, 5, 6, 255) and
// version 2 blocks (levels 3, 8, 9, 10, 11, 254) travel in separate lists.

use super::{DisplayPrimaries, Rational};
use crate::bitstream::{RpuReader, RpuWriter};
use crate::error::RpuError;

const PRIMARY_DEN: i32 = 1 << 15;
/// Primary index meaning "coordinates follow".
const CUSTOM_PRIMARIES: u8 = 255;

/// Whether blocks of this level are stream-invariant.
pub fn is_static_level(level: u8) -> bool {
    matches!(level, 6 | 10 | 32 | 254 | 255)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtVersion {
    V1,
    V2,
}

impl ExtVersion {
    pub fn of_level(level: u8) -> Option<Self> {
        match level {
            1 | 2 | 4 | 5 | 6 | 255 => Some(Self::V1),
            3 | 8 | 9 | 10 | 11 | 254 => Some(Self::V2),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Per-level payloads
// ---------------------------------------------------------------------------

/// Per-frame PQ statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Level1 {
    pub min_pq: u16,
    pub max_pq: u16,
    pub avg_pq: u16,
}

/// Trims for one target display (v1 form).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Level2 {
    pub target_max_pq: u16,
    pub trim_slope: u16,
    pub trim_offset: u16,
    pub trim_power: u16,
    pub trim_chroma_weight: u16,
    pub trim_saturation_gain: u16,
    pub ms_weight: i16,
}

/// Offsets applied to the level 1 statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Level3 {
    pub min_pq_offset: u16,
    pub max_pq_offset: u16,
    pub avg_pq_offset: u16,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Level4 {
    pub anchor_pq: u16,
    pub anchor_power: u16,
}

/// Active area offsets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Level5 {
    pub left_offset: u16,
    pub right_offset: u16,
    pub top_offset: u16,
    pub bottom_offset: u16,
}

/// Mastering display luminance and content light levels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Level6 {
    pub max_luminance: u16,
    pub min_luminance: u16,
    pub max_cll: u16,
    pub max_fall: u16,
}

/// Trims for one target display (v2 form).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Level8 {
    pub target_display_index: u8,
    pub trim_slope: u16,
    pub trim_offset: u16,
    pub trim_power: u16,
    pub trim_chroma_weight: u16,
    pub trim_saturation_gain: u16,
    pub ms_weight: u16,
    pub target_mid_contrast: u16,
    pub clip_trim: u16,
    pub saturation_vector_field: [u8; 6],
    pub hue_vector_field: [u8; 6],
}

/// Source (mastering) display primaries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Level9 {
    pub source_primary_index: u8,
    pub source_display_primaries: DisplayPrimaries,
}

/// Target display description.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Level10 {
    pub target_display_index: u8,
    pub target_max_pq: u16,
    pub target_min_pq: u16,
    pub target_primary_index: u8,
    pub target_display_primaries: DisplayPrimaries,
}

/// Content type and intended viewing adjustments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Level11 {
    pub content_type: u8,
    pub whitepoint: u8,
    pub reference_mode_flag: bool,
    pub sharpness: u8,
    pub noise_reduction: u8,
    pub mpeg_noise_reduction: u8,
    pub frame_rate_conversion: u8,
    pub brightness: u8,
    pub color: u8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Level254 {
    pub dm_mode: u8,
    pub dm_version_index: u8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Level255 {
    pub dm_run_mode: u8,
    pub dm_run_version: u8,
    pub dm_debug: [u8; 4],
}

// ---------------------------------------------------------------------------
// Block enum
// ---------------------------------------------------------------------------

/// One extension block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DmData {
    Level1(Level1),
    Level2(Level2),
    Level3(Level3),
    Level4(Level4),
    Level5(Level5),
    Level6(Level6),
    Level8(Level8),
    Level9(Level9),
    Level10(Level10),
    Level11(Level11),
    Level254(Level254),
    Level255(Level255),
    /// A level this crate does not decode; the payload was skipped.
    Unknown(u8),
}

impl DmData {
    pub fn level(&self) -> u8 {
        match self {
            Self::Level1(_) => 1,
            Self::Level2(_) => 2,
            Self::Level3(_) => 3,
            Self::Level4(_) => 4,
            Self::Level5(_) => 5,
            Self::Level6(_) => 6,
            Self::Level8(_) => 8,
            Self::Level9(_) => 9,
            Self::Level10(_) => 10,
            Self::Level11(_) => 11,
            Self::Level254(_) => 254,
            Self::Level255(_) => 255,
            Self::Unknown(level) => *level,
        }
    }

    pub fn is_static(&self) -> bool {
        is_static_level(self.level())
    }

    /// Extension list this block is carried in, `None` for unknown levels.
    pub fn version(&self) -> Option<ExtVersion> {
        match self {
            Self::Unknown(_) => None,
            other => ExtVersion::of_level(other.level()),
        }
    }

    /// Payload size in bytes as written by `write_payload`.
    pub(crate) fn payload_len(&self) -> u64 {
        match self {
            Self::Level1(_) => 5,
            Self::Level2(_) => 11,
            Self::Level3(_) => 5,
            Self::Level4(_) => 3,
            Self::Level5(_) => 7,
            Self::Level6(_) => 8,
            Self::Level8(l8) => {
                if l8.hue_vector_field.iter().any(|&v| v != 0) {
                    25
                } else if l8.saturation_vector_field.iter().any(|&v| v != 0) {
                    19
                } else if l8.clip_trim != 0 {
                    13
                } else if l8.target_mid_contrast != 0 {
                    12
                } else {
                    10
                }
            }
            Self::Level9(l9) => {
                if has_primaries(l9.source_primary_index, &l9.source_display_primaries) {
                    17
                } else {
                    1
                }
            }
            Self::Level10(l10) => {
                if has_primaries(l10.target_primary_index, &l10.target_display_primaries) {
                    21
                } else {
                    5
                }
            }
            Self::Level11(_) => 4,
            Self::Level254(_) => 2,
            Self::Level255(_) => 6,
            Self::Unknown(_) => 0,
        }
    }

    /// Decode the payload of a `level` block declared `len` bytes long in
    /// extension list `version`. Levels not defined for that list decode to
    /// `Unknown` without consuming bits.
    pub(crate) fn read_payload(
        r: &mut RpuReader<'_>,
        version: ExtVersion,
        level: u8,
        len: u64,
    ) -> Result<Self, RpuError> {
        if ExtVersion::of_level(level) != Some(version) {
            return Ok(Self::Unknown(level));
        }
        let block = match level {
            1 => Self::Level1(Level1 {
                min_pq: b12(r)?,
                max_pq: b12(r)?,
                avg_pq: b12(r)?,
            }),
            2 => Self::Level2(Level2 {
                target_max_pq: b12(r)?,
                trim_slope: b12(r)?,
                trim_offset: b12(r)?,
                trim_power: b12(r)?,
                trim_chroma_weight: b12(r)?,
                trim_saturation_gain: b12(r)?,
                ms_weight: r.sbits(13)? as i16,
            }),
            3 => Self::Level3(Level3 {
                min_pq_offset: b12(r)?,
                max_pq_offset: b12(r)?,
                avg_pq_offset: b12(r)?,
            }),
            4 => Self::Level4(Level4 {
                anchor_pq: b12(r)?,
                anchor_power: b12(r)?,
            }),
            5 => {
                let mut o = [0u16; 4];
                for v in &mut o {
                    *v = r.bits(13)? as u16;
                }
                Self::Level5(Level5 {
                    left_offset: o[0],
                    right_offset: o[1],
                    top_offset: o[2],
                    bottom_offset: o[3],
                })
            }
            6 => Self::Level6(Level6 {
                max_luminance: r.bits(16)? as u16,
                min_luminance: r.bits(16)? as u16,
                max_cll: r.bits(16)? as u16,
                max_fall: r.bits(16)? as u16,
            }),
            8 => {
                let mut l8 = Level8 {
                    target_display_index: b8(r)?,
                    trim_slope: b12(r)?,
                    trim_offset: b12(r)?,
                    trim_power: b12(r)?,
                    trim_chroma_weight: b12(r)?,
                    trim_saturation_gain: b12(r)?,
                    ms_weight: b12(r)?,
                    ..Default::default()
                };
                if len >= 12 {
                    l8.target_mid_contrast = b12(r)?;
                }
                if len >= 13 {
                    l8.clip_trim = b12(r)?;
                }
                if len >= 19 {
                    for v in &mut l8.saturation_vector_field {
                        *v = b8(r)?;
                    }
                }
                if len >= 25 {
                    for v in &mut l8.hue_vector_field {
                        *v = b8(r)?;
                    }
                }
                Self::Level8(l8)
            }
            9 => {
                let mut l9 = Level9 {
                    source_primary_index: b8(r)?,
                    ..Default::default()
                };
                if len >= 17 {
                    l9.source_display_primaries = read_primaries(r)?;
                }
                Self::Level9(l9)
            }
            10 => {
                let mut l10 = Level10 {
                    target_display_index: b8(r)?,
                    target_max_pq: b12(r)?,
                    target_min_pq: b12(r)?,
                    target_primary_index: b8(r)?,
                    ..Default::default()
                };
                if len >= 21 {
                    l10.target_display_primaries = read_primaries(r)?;
                }
                Self::Level10(l10)
            }
            11 => {
                let content_type = b8(r)?;
                let whitepoint = r.bits(4)? as u8;
                let reference_mode_flag = r.bit()?;
                r.skip(3)?;
                let mut f = [0u8; 6];
                for v in &mut f {
                    *v = r.bits(2)? as u8;
                }
                Self::Level11(Level11 {
                    content_type,
                    whitepoint,
                    reference_mode_flag,
                    sharpness: f[0],
                    noise_reduction: f[1],
                    mpeg_noise_reduction: f[2],
                    frame_rate_conversion: f[3],
                    brightness: f[4],
                    color: f[5],
                })
            }
            254 => Self::Level254(Level254 {
                dm_mode: b8(r)?,
                dm_version_index: b8(r)?,
            }),
            255 => {
                let dm_run_mode = b8(r)?;
                let dm_run_version = b8(r)?;
                let mut dm_debug = [0u8; 4];
                for v in &mut dm_debug {
                    *v = b8(r)?;
                }
                Self::Level255(Level255 {
                    dm_run_mode,
                    dm_run_version,
                    dm_debug,
                })
            }
            _ => Self::Unknown(level),
        };
        Ok(block)
    }

    /// Encode the payload (without the length and level prefix). Writes
    /// exactly `payload_len()` bytes minus trailing zero fill.
    pub(crate) fn write_payload(&self, w: &mut RpuWriter) -> Result<(), RpuError> {
        match self {
            Self::Level1(l1) => {
                p12(w, l1.min_pq)?;
                p12(w, l1.max_pq)?;
                p12(w, l1.avg_pq)?;
            }
            Self::Level2(l2) => {
                p12(w, l2.target_max_pq)?;
                p12(w, l2.trim_slope)?;
                p12(w, l2.trim_offset)?;
                p12(w, l2.trim_power)?;
                p12(w, l2.trim_chroma_weight)?;
                p12(w, l2.trim_saturation_gain)?;
                w.put_sbits(13, i32::from(l2.ms_weight))?;
            }
            Self::Level3(l3) => {
                p12(w, l3.min_pq_offset)?;
                p12(w, l3.max_pq_offset)?;
                p12(w, l3.avg_pq_offset)?;
            }
            Self::Level4(l4) => {
                p12(w, l4.anchor_pq)?;
                p12(w, l4.anchor_power)?;
            }
            Self::Level5(l5) => {
                for v in [l5.left_offset, l5.right_offset, l5.top_offset, l5.bottom_offset] {
                    w.put_bits(13, u32::from(v))?;
                }
            }
            Self::Level6(l6) => {
                for v in [l6.max_luminance, l6.min_luminance, l6.max_cll, l6.max_fall] {
                    w.put_bits(16, u32::from(v))?;
                }
            }
            Self::Level8(l8) => {
                let len = self.payload_len();
                p8(w, l8.target_display_index)?;
                p12(w, l8.trim_slope)?;
                p12(w, l8.trim_offset)?;
                p12(w, l8.trim_power)?;
                p12(w, l8.trim_chroma_weight)?;
                p12(w, l8.trim_saturation_gain)?;
                p12(w, l8.ms_weight)?;
                if len >= 12 {
                    p12(w, l8.target_mid_contrast)?;
                }
                if len >= 13 {
                    p12(w, l8.clip_trim)?;
                }
                if len >= 19 {
                    for &v in &l8.saturation_vector_field {
                        p8(w, v)?;
                    }
                }
                if len >= 25 {
                    for &v in &l8.hue_vector_field {
                        p8(w, v)?;
                    }
                }
            }
            Self::Level9(l9) => {
                p8(w, l9.source_primary_index)?;
                if self.payload_len() >= 17 {
                    write_primaries(w, &l9.source_display_primaries)?;
                }
            }
            Self::Level10(l10) => {
                p8(w, l10.target_display_index)?;
                p12(w, l10.target_max_pq)?;
                p12(w, l10.target_min_pq)?;
                p8(w, l10.target_primary_index)?;
                if self.payload_len() >= 21 {
                    write_primaries(w, &l10.target_display_primaries)?;
                }
            }
            Self::Level11(l11) => {
                p8(w, l11.content_type)?;
                w.put_bits(4, u32::from(l11.whitepoint))?;
                w.put_bit(l11.reference_mode_flag)?;
                w.put_bits(3, 0)?;
                for v in [
                    l11.sharpness,
                    l11.noise_reduction,
                    l11.mpeg_noise_reduction,
                    l11.frame_rate_conversion,
                    l11.brightness,
                    l11.color,
                ] {
                    w.put_bits(2, u32::from(v))?;
                }
            }
            Self::Level254(l254) => {
                p8(w, l254.dm_mode)?;
                p8(w, l254.dm_version_index)?;
            }
            Self::Level255(l255) => {
                p8(w, l255.dm_run_mode)?;
                p8(w, l255.dm_run_version)?;
                for &v in &l255.dm_debug {
                    p8(w, v)?;
                }
            }
            Self::Unknown(level) => {
                return Err(RpuError::InvalidArgument(format!(
                    "cannot encode extension block of unknown level {level}"
                )));
            }
        }
        Ok(())
    }
}

fn b12(r: &mut RpuReader<'_>) -> Result<u16, RpuError> {
    Ok(r.bits(12)? as u16)
}

fn b8(r: &mut RpuReader<'_>) -> Result<u8, RpuError> {
    Ok(r.bits(8)? as u8)
}

fn p12(w: &mut RpuWriter, v: u16) -> Result<(), RpuError> {
    w.put_bits(12, u32::from(v))
}

fn p8(w: &mut RpuWriter, v: u8) -> Result<(), RpuError> {
    w.put_bits(8, u32::from(v))
}

/// Index 255 selects explicitly coded primaries. Non-zero coordinates with a
/// preset index are kept as well rather than dropped.
fn has_primaries(index: u8, p: &DisplayPrimaries) -> bool {
    index == CUSTOM_PRIMARIES || p.coords().iter().any(|c| c.num != 0)
}

fn read_primaries(r: &mut RpuReader<'_>) -> Result<DisplayPrimaries, RpuError> {
    let mut c = [Rational::default(); 8];
    for v in &mut c {
        *v = Rational::new(r.sbits(16)?, PRIMARY_DEN);
    }
    Ok(DisplayPrimaries::from_coords(c))
}

fn write_primaries(w: &mut RpuWriter, p: &DisplayPrimaries) -> Result<(), RpuError> {
    for c in p.coords() {
        let v = i32::try_from(c.rescale(PRIMARY_DEN))
            .map_err(|_| RpuError::InvalidArgument(format!("chromaticity {c:?} out of range")))?;
        w.put_sbits(16, v)?;
    }
    Ok(())
}
