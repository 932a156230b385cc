// RPU data header.

/// Coefficient representation used by the data mapping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CoefDataType {
    /// Fixed point with `coef_log2_denom` fractional bits.
    #[default]
    Fixed,
    /// IEEE-754 single precision.
    Float,
}

impl CoefDataType {
    pub fn from_bits(v: u32) -> Option<Self> {
        match v {
            0 => Some(Self::Fixed),
            1 => Some(Self::Float),
            _ => None,
        }
    }

    pub fn bits(self) -> u32 {
        match self {
            Self::Fixed => 0,
            Self::Float => 1,
        }
    }
}

/// Scalar header fields of an RPU. Replaced wholesale on every parse or
/// generate.
///
/// Bit depths are stored as actual depths (8..=16), not as the `_minus8`
/// values of the bitstream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RpuHeader {
    pub rpu_type: u8,
    pub rpu_format: u16,
    pub vdr_rpu_profile: u8,
    pub vdr_rpu_level: u8,
    pub chroma_resampling_explicit_filter_flag: bool,
    pub coef_data_type: CoefDataType,
    pub coef_log2_denom: u8,
    pub vdr_rpu_normalized_idc: u8,
    pub bl_video_full_range_flag: bool,
    pub bl_bit_depth: u8,
    pub el_bit_depth: u8,
    pub vdr_bit_depth: u8,
    pub spatial_resampling_filter_flag: bool,
    pub el_spatial_resampling_filter_flag: bool,
    pub disable_residual_flag: bool,
    pub ext_mapping_idc_0_4: u8,
    pub ext_mapping_idc_5_7: u8,
}

impl RpuHeader {
    /// Whether the non-linear quantisation (enhancement layer) parameters
    /// are carried by the data mapping.
    pub fn uses_nlq(&self) -> bool {
        self.rpu_format & 0x700 == 0 && !self.disable_residual_flag
    }

    pub(crate) fn ext_mapping_idc(&self) -> u32 {
        (u32::from(self.ext_mapping_idc_5_7) << 5) | u32::from(self.ext_mapping_idc_0_4)
    }
}

/// Infer the Dolby Vision profile of an HEVC stream from its RPU header.
/// Returns 0 when the profile cannot be determined.
pub fn guess_profile_hevc(hdr: &RpuHeader) -> u8 {
    match hdr.vdr_rpu_profile {
        0 if hdr.bl_video_full_range_flag => 5,
        1 => {
            if hdr.el_spatial_resampling_filter_flag && !hdr.disable_residual_flag {
                if hdr.vdr_bit_depth == 12 { 7 } else { 4 }
            } else {
                8
            }
        }
        _ => 0,
    }
}
