// Data mapping: per-component reshaping curves and NLQ parameters.
//
// Coefficients are fixed point with `RpuHeader::coef_log2_denom` fractional
// bits regardless of the bitstream coefficient type.

/// Maximum number of pieces in one reshaping curve (pivots = pieces + 1).
pub const MAX_PIECES: usize = 8;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MappingMethod {
    #[default]
    Polynomial,
    Mmr,
}

impl MappingMethod {
    pub fn from_idc(v: u32) -> Option<Self> {
        match v {
            0 => Some(Self::Polynomial),
            1 => Some(Self::Mmr),
            _ => None,
        }
    }

    pub fn idc(self) -> u32 {
        match self {
            Self::Polynomial => 0,
            Self::Mmr => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum NlqMethod {
    /// No enhancement layer quantiser.
    #[default]
    None,
    LinearDeadzone,
}

/// One reshaping curve (luma or one chroma component).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReshapingCurve {
    /// 2..=9
    pub num_pivots: u8,
    /// Absolute pivot positions, strictly accumulated.
    pub pivots: [u16; MAX_PIECES + 1],
    pub mapping_idc: [MappingMethod; MAX_PIECES],
    /// 1..=2
    pub poly_order: [u8; MAX_PIECES],
    pub poly_coef: [[i64; 3]; MAX_PIECES],
    /// 1..=3
    pub mmr_order: [u8; MAX_PIECES],
    pub mmr_constant: [i64; MAX_PIECES],
    pub mmr_coef: [[[i64; 7]; 3]; MAX_PIECES],
}

impl ReshapingCurve {
    /// Number of curve pieces.
    pub fn pieces(&self) -> usize {
        usize::from(self.num_pivots).saturating_sub(1)
    }

    /// Identity-style linear curve over a `bit_depth`-bit signal.
    pub fn linear(bit_depth: u8, log2_denom: u8) -> Self {
        let mut curve = Self {
            num_pivots: 2,
            ..Default::default()
        };
        curve.pivots[1] = ((1u32 << bit_depth.min(16)) - 1) as u16;
        curve.poly_order[0] = 1;
        curve.poly_coef[0][1] = 1i64 << log2_denom;
        curve
    }
}

/// Enhancement layer linear dead-zone quantiser parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NlqParams {
    pub nlq_offset: u16,
    pub vdr_in_max: u64,
    pub linear_deadzone_slope: u64,
    pub linear_deadzone_threshold: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DataMapping {
    /// Cache slot this mapping occupies (0..=15).
    pub vdr_rpu_id: u8,
    pub mapping_color_space: u8,
    pub mapping_chroma_format_idc: u8,
    pub curves: [ReshapingCurve; 3],
    pub nlq_method: NlqMethod,
    pub nlq_pivots: [u16; 2],
    pub num_x_partitions: u32,
    pub num_y_partitions: u32,
    pub nlq: [NlqParams; 3],
}

impl DataMapping {
    /// Pass-through mapping: one linear piece per component, no NLQ.
    pub fn identity(bl_bit_depth: u8, log2_denom: u8) -> Self {
        let curve = ReshapingCurve::linear(bl_bit_depth, log2_denom);
        Self {
            curves: [curve; 3],
            num_x_partitions: 1,
            num_y_partitions: 1,
            ..Default::default()
        }
    }
}
