// Level 0 colour metadata.

use super::Rational;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ColorMetadata {
    pub dm_metadata_id: u8,
    pub scene_refresh_flag: u8,
    pub ycc_to_rgb_matrix: [Rational; 9],
    pub ycc_to_rgb_offset: [Rational; 3],
    pub rgb_to_lms_matrix: [Rational; 9],
    pub signal_eotf: u16,
    pub signal_eotf_param0: u16,
    pub signal_eotf_param1: u16,
    pub signal_eotf_param2: u32,
    pub signal_bit_depth: u8,
    pub signal_color_space: u8,
    pub signal_chroma_format: u8,
    pub signal_full_range_flag: u8,
    pub source_min_pq: u16,
    pub source_max_pq: u16,
    pub source_diagonal: u16,
}

const fn q(num: i32, den: i32) -> Rational {
    Rational::new(num, den)
}

/// Colour metadata implied when an RPU carries no DM block.
pub const COLOR_DEFAULT: ColorMetadata = ColorMetadata {
    dm_metadata_id: 0,
    scene_refresh_flag: 0,
    ycc_to_rgb_matrix: [
        q(9575, 8192),
        q(0, 1),
        q(14742, 8192),
        q(9575, 8192),
        q(1754, 8192),
        q(-4383, 8192),
        q(9575, 8192),
        q(17372, 8192),
        q(0, 1),
    ],
    ycc_to_rgb_offset: [q(1, 4), q(2, 1), q(2, 1)],
    rgb_to_lms_matrix: [
        q(7222, 16384),
        q(8771, 16384),
        q(390, 16384),
        q(2654, 16384),
        q(12430, 16384),
        q(1300, 16384),
        q(0, 1),
        q(422, 16384),
        q(15962, 16384),
    ],
    signal_eotf: 65535,
    signal_eotf_param0: 0,
    signal_eotf_param1: 0,
    signal_eotf_param2: 0,
    signal_bit_depth: 12,
    signal_color_space: 0,
    signal_chroma_format: 0,
    signal_full_range_flag: 1,
    source_min_pq: 62,
    source_max_pq: 3696,
    source_diagonal: 42,
};

impl Default for ColorMetadata {
    fn default() -> Self {
        COLOR_DEFAULT
    }
}

impl ColorMetadata {
    /// Compare only the fields carried in the level 0 block, ignoring the
    /// DM id and scene refresh flag that are sent with every DM header.
    pub fn level0_eq(&self, other: &Self) -> bool {
        let strip = |c: &Self| Self {
            dm_metadata_id: 0,
            scene_refresh_flag: 0,
            ..*c
        };
        strip(self) == strip(other)
    }

    /// Denominator of `ycc_to_rgb_offset` for the given profile.
    pub(crate) fn offset_denom(profile: u8) -> i64 {
        if profile == 4 { 1 << 30 } else { 1 << 28 }
    }
}
