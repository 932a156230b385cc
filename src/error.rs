// Error type and error-recognition flags for the RPU engine.
//
// Every operation returns `Result<_, RpuError>`. Recoverable bitstream
// violations are gated by `ErrorRecognition`: they are logged and tolerated
// unless the caller asks for `EXPLODE` (or `AGGRESSIVE` where noted).

use bitflags::bitflags;

// ---------------------------------------------------------------------------
// Error recognition
// ---------------------------------------------------------------------------

bitflags! {
    /// Strictness of bitstream validation during `RpuContext::parse`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ErrorRecognition: u32 {
        /// Verify the RPU CRC-32.
        const CRCCHECK   = 1 << 0;
        /// Detect deviations from the bitstream syntax, such as extension
        /// levels not defined for their list. Fatal together with `EXPLODE`.
        const BITSTREAM  = 1 << 1;
        /// Detect improper bitstream length.
        const BUFFER     = 1 << 2;
        /// Abort on minor error detection.
        const EXPLODE    = 1 << 3;
        /// Consider things that violate the standard and have not been seen in
        /// the wild as errors.
        const CAREFUL    = 1 << 16;
        /// Consider all standard non-compliances as errors.
        const COMPLIANT  = 1 << 17;
        /// Consider things that a sane encoder should not do as an error.
        const AGGRESSIVE = 1 << 18;
    }
}

impl ErrorRecognition {
    /// Whether recoverable violations must abort the current call.
    #[inline]
    pub fn explode(self) -> bool {
        self.contains(Self::EXPLODE)
    }

    /// Whether profile/compression compliance should be enforced.
    #[inline]
    pub fn compliance_checks(self) -> bool {
        self.intersects(Self::CAREFUL | Self::COMPLIANT)
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Which extension block table overflowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Static,
    Dynamic,
}

impl std::fmt::Display for BlockKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Static => write!(f, "static"),
            Self::Dynamic => write!(f, "dynamic"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RpuError {
    /// Malformed RPU payload.
    #[error("invalid RPU: {0}")]
    InvalidData(String),

    /// A bitstream field holds a value outside its legal range.
    #[error("{field} out of range: {value} not in [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },

    /// More extension blocks than the table can hold.
    #[error("too many {kind} extension blocks (max {max})")]
    CapacityExceeded { kind: BlockKind, max: usize },

    /// `use_prev_vdr_rpu` referenced an empty cache slot.
    #[error("unknown previous RPU ID: {0}")]
    UnknownMappingId(u8),

    /// CRC-32 over the payload did not verify.
    #[error("RPU CRC mismatch: {0:#010X}")]
    CrcMismatch(u32),

    /// Syntax that is legal but not implemented.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Caller-supplied metadata or configuration is invalid.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Bit reader ran past the end of the payload.
    #[error("bitstream I/O: {0}")]
    Io(#[from] std::io::Error),
}

impl RpuError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidData(msg.into())
    }
}

/// Check that `value` lies in `[min, max]`, mirroring the bitstream
/// validation macro used throughout the parser.
pub(crate) fn validate<T>(field: &'static str, value: T, min: T, max: T) -> Result<T, RpuError>
where
    T: Copy + PartialOrd + Into<i64>,
{
    if value < min || value > max {
        return Err(RpuError::OutOfRange {
            field,
            value: value.into(),
            min: min.into(),
            max: max.into(),
        });
    }
    Ok(value)
}
