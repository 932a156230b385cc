// Structured Dolby Vision metadata: the value types parsed from and
// synthesised into RPU payloads.

pub mod color;
pub mod config;
pub mod ext;
pub mod header;
pub mod mapping;

pub use color::{COLOR_DEFAULT, ColorMetadata};
pub use config::{Compression, DecoderConfig};
pub use ext::{
    DmData, ExtVersion, Level1, Level2, Level3, Level4, Level5, Level6, Level8, Level9, Level10, Level11,
    Level254, Level255, is_static_level,
};
pub use header::{CoefDataType, RpuHeader, guess_profile_hevc};
pub use mapping::{DataMapping, MAX_PIECES, MappingMethod, NlqMethod, NlqParams, ReshapingCurve};

// ---------------------------------------------------------------------------
// Rational
// ---------------------------------------------------------------------------

/// Fraction used for matrix coefficients, offsets and chromaticities.
///
/// Equality compares values by cross-multiplication, so `1/4 == 2/8`. A zero
/// denominator only equals the identical fraction.
#[derive(Debug, Clone, Copy, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Rational {
    pub num: i32,
    pub den: i32,
}

impl Rational {
    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /// Numerator of this value expressed over `den`, truncated toward zero.
    pub fn rescale(self, den: i32) -> i64 {
        if self.den == 0 {
            return 0;
        }
        if self.den == den {
            return i64::from(self.num);
        }
        i64::from(self.num) * i64::from(den) / i64::from(self.den)
    }
}

impl Default for Rational {
    fn default() -> Self {
        Self { num: 0, den: 1 }
    }
}

impl PartialEq for Rational {
    fn eq(&self, other: &Self) -> bool {
        match (self.den, other.den) {
            // Not a value: only identical fields compare equal.
            (0, _) | (_, 0) => self.num == other.num && self.den == other.den,
            _ => {
                i64::from(self.num) * i64::from(other.den)
                    == i64::from(other.num) * i64::from(self.den)
            }
        }
    }
}

/// CIE 1931 xy chromaticity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CieXy {
    pub x: Rational,
    pub y: Rational,
}

/// Display primaries and white point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DisplayPrimaries {
    pub r: CieXy,
    pub g: CieXy,
    pub b: CieXy,
    pub wp: CieXy,
}

impl DisplayPrimaries {
    pub(crate) fn coords(&self) -> [Rational; 8] {
        [
            self.r.x, self.r.y, self.g.x, self.g.y, self.b.x, self.b.y, self.wp.x, self.wp.y,
        ]
    }

    pub(crate) fn from_coords(c: [Rational; 8]) -> Self {
        Self {
            r: CieXy { x: c[0], y: c[1] },
            g: CieXy { x: c[2], y: c[3] },
            b: CieXy { x: c[4], y: c[5] },
            wp: CieXy { x: c[6], y: c[7] },
        }
    }
}

// ---------------------------------------------------------------------------
// Combined metadata
// ---------------------------------------------------------------------------

/// Self-contained snapshot of one RPU: what `RpuContext::get_metadata`
/// returns and what `RpuContext::generate` consumes.
///
/// Extension blocks are listed static blocks first, then dynamic blocks, each
/// group in bitstream order.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Metadata {
    pub header: RpuHeader,
    pub mapping: DataMapping,
    pub color: ColorMetadata,
    pub ext_blocks: Vec<DmData>,
}

impl Metadata {
    pub fn ext_block(&self, level: u8) -> Option<&DmData> {
        self.ext_blocks.iter().find(|b| b.level() == level)
    }
}
