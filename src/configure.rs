// Stream configuration for encoding: profile, level and compatibility
// inference from codec parameters.

use crate::context::{Enable, RpuContext};
use crate::error::RpuError;
use crate::metadata::{Compression, DecoderConfig, Metadata, Rational, guess_profile_hevc};

// ---------------------------------------------------------------------------
// Codec parameters
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecId {
    Hevc,
    H264,
    Av1,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    #[default]
    Yuv420p,
    Yuv420p10,
    Yuv420p12,
    Yuv422p10,
    Yuv444p10,
    Other,
}

/// Matrix coefficients tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ColorSpace {
    #[default]
    Unspecified,
    Bt709,
    Bt2020Ncl,
    /// ICtCp with the proprietary IPT-PQ-c2 transform.
    IptC2,
    Other,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ColorPrimaries {
    #[default]
    Unspecified,
    Bt709,
    Bt2020,
    Other,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ColorTransfer {
    #[default]
    Unspecified,
    Bt709,
    /// PQ
    Smpte2084,
    /// HLG
    AribStdB67,
    Other,
}

/// How strictly to follow the standard, from least to most strict.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Compliance {
    Experimental,
    Unofficial,
    #[default]
    Normal,
    Strict,
    VeryStrict,
}

/// The encoder-side view of a stream that `configure` needs.
#[derive(Debug, Clone, PartialEq)]
pub struct CodecParameters {
    pub codec_id: CodecId,
    pub pixel_format: PixelFormat,
    pub width: u32,
    pub height: u32,
    /// Frames per second; 25 is assumed when absent.
    pub frame_rate: Option<Rational>,
    /// Target bit rate in bits per second, when known.
    pub bit_rate: Option<u64>,
    pub color_space: ColorSpace,
    pub color_primaries: ColorPrimaries,
    pub color_trc: ColorTransfer,
    /// Receives the configuration record for the container.
    pub coded_side_data: Option<DecoderConfig>,
}

impl CodecParameters {
    pub fn new(codec_id: CodecId, width: u32, height: u32) -> Self {
        Self {
            codec_id,
            pixel_format: PixelFormat::Yuv420p10,
            width,
            height,
            frame_rate: None,
            bit_rate: None,
            color_space: ColorSpace::Unspecified,
            color_primaries: ColorPrimaries::Unspecified,
            color_trc: ColorTransfer::Unspecified,
            coded_side_data: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Levels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelLimits {
    /// Maximum luma samples per second.
    pub pps: u64,
    pub max_width: u32,
    /// Maximum main tier bit rate in Mbit/s.
    pub bitrate_main: u32,
    /// Maximum high tier bit rate in Mbit/s.
    pub bitrate_high: u32,
}

const fn level(w: u64, h: u64, fps: u64, max_width: u32, main: u32, high: u32) -> LevelLimits {
    LevelLimits {
        pps: w * h * fps,
        max_width,
        bitrate_main: main,
        bitrate_high: high,
    }
}

/// Limits for levels 1 through 13.
pub const LEVELS: [LevelLimits; 13] = [
    level(1280, 720, 24, 1280, 20, 50),
    level(1280, 720, 30, 1280, 20, 50),
    level(1920, 1080, 24, 1920, 20, 70),
    level(1920, 1080, 30, 2560, 20, 70),
    level(1920, 1080, 60, 3840, 20, 70),
    level(3840, 2160, 24, 3840, 25, 130),
    level(3840, 2160, 30, 3840, 25, 130),
    level(3840, 2160, 48, 3840, 40, 130),
    level(3840, 2160, 60, 3840, 40, 130),
    level(3840, 2160, 120, 3840, 60, 240),
    level(3840, 2160, 120, 7680, 60, 240),
    level(7680, 4320, 60, 7680, 120, 450),
    level(7680, 4320, 120, 7680, 240, 800),
];

/// Limits of `level` (1..=13).
pub fn level_limits(level: u8) -> Option<&'static LevelLimits> {
    LEVELS.get(usize::from(level).checked_sub(1)?)
}

/// Samples per second of the stream, assuming 25 fps when untagged.
fn samples_per_second(par: &CodecParameters) -> u64 {
    let area = u64::from(par.width) * u64::from(par.height);
    match par.frame_rate {
        Some(fr) if fr.num > 0 && fr.den > 0 => {
            area.saturating_mul(fr.num as u64) / fr.den as u64
        }
        _ => area.saturating_mul(25),
    }
}

// ---------------------------------------------------------------------------
// configure
// ---------------------------------------------------------------------------

impl RpuContext {
    /// Determine the stream configuration for encoding and store it both in
    /// the context and in `par.coded_side_data`.
    ///
    /// `metadata` is the first frame's metadata when available; without it
    /// the profile is inferred from the colour tags alone, which cannot
    /// detect enhancement layer profiles. When Dolby Vision is disabled, or
    /// automatic without metadata, or the stream cannot be mapped to a
    /// profile in automatic mode, the configuration is cleared and `Ok` is
    /// returned.
    pub fn configure(
        &mut self,
        par: &mut CodecParameters,
        metadata: Option<&Metadata>,
        compression: Compression,
        compliance: Compliance,
    ) -> Result<(), RpuError> {
        match self.enable {
            Enable::Disabled => {
                self.skip_configuration();
                return Ok(());
            }
            Enable::Automatic if metadata.is_none() => {
                self.skip_configuration();
                return Ok(());
            }
            _ => {}
        }
        if compression == Compression::Reserved {
            return Err(RpuError::InvalidArgument(
                "reserved metadata compression mode".to_string(),
            ));
        }

        let hdr = metadata.map(|m| &m.header);
        let mut dv_profile = match par.codec_id {
            CodecId::Av1 => 10,
            CodecId::H264 => 9,
            CodecId::Hevc => match hdr {
                Some(hdr) => guess_profile_hevc(hdr),
                None => {
                    // Most likely IPT-PQ-c2
                    if par.color_space == ColorSpace::IptC2
                        || (par.color_space == ColorSpace::Unspecified
                            && par.color_trc == ColorTransfer::Unspecified)
                    {
                        5
                    } else {
                        8
                    }
                }
            },
        };

        if compliance > Compliance::Experimental {
            let expected = if dv_profile == 9 {
                PixelFormat::Yuv420p
            } else {
                PixelFormat::Yuv420p10
            };
            if par.pixel_format != expected {
                log::debug!(
                    "[{}] pixel format {:?} not allowed for profile {dv_profile}",
                    self.name,
                    par.pixel_format
                );
                dv_profile = 0;
            }
        }

        let bl_compat_id = match dv_profile {
            4 | 7 => {
                if self.enable == Enable::Enabled {
                    return Err(RpuError::Unsupported(
                        "coding of Dolby Vision enhancement layers".to_string(),
                    ));
                }
                self.skip_configuration();
                return Ok(());
            }
            5 => Some(0),
            10 if hdr.is_some_and(|h| h.bl_video_full_range_flag) => Some(0),
            8..=10 => compat_id_from_tags(par),
            _ => None,
        };

        let Some(bl_compat_id) = bl_compat_id.filter(|_| dv_profile != 0) else {
            if self.enable == Enable::Enabled {
                return Err(RpuError::InvalidArgument(
                    "Dolby Vision enabled, but could not determine profile and compatibility \
                     mode; check colorspace and format settings"
                        .to_string(),
                ));
            }
            self.skip_configuration();
            return Ok(());
        };

        if compression != Compression::None {
            if dv_profile < 8 && compliance > Compliance::Unofficial {
                return Err(RpuError::InvalidArgument(format!(
                    "metadata compression is not permitted for profile {dv_profile}"
                )));
            }
            if compression == Compression::Extended && compliance > Compliance::Experimental {
                return Err(RpuError::InvalidArgument(
                    "extended metadata compression is experimental".to_string(),
                ));
            }
            if dv_profile == 8 {
                log::warn!(
                    "[{}] metadata compression with profile 8 is not supported by all devices",
                    self.name
                );
            }
        }

        let dv_level = self.select_level(par, compliance)?;

        let cfg = DecoderConfig {
            dv_version_major: 1,
            dv_version_minor: 0,
            dv_profile,
            dv_level,
            rpu_present_flag: true,
            el_present_flag: false,
            bl_present_flag: true,
            dv_bl_signal_compatibility_id: bl_compat_id,
            dv_md_compression: compression,
        };
        log::debug!(
            "[{}] configured profile {dv_profile} level {dv_level} compat {bl_compat_id}",
            self.name
        );
        par.coded_side_data = Some(cfg);
        self.cfg = cfg;
        Ok(())
    }

    fn skip_configuration(&mut self) {
        self.cfg = DecoderConfig::default();
    }

    fn select_level(&self, par: &CodecParameters, compliance: Compliance) -> Result<u8, RpuError> {
        let pps = samples_per_second(par);
        let mbps = par.bit_rate.map(|b| b.div_ceil(1_000_000));
        let found = LEVELS.iter().position(|l| {
            pps <= l.pps
                && par.width <= l.max_width
                && mbps.is_none_or(|r| r <= u64::from(l.bitrate_high))
        });
        match found {
            Some(idx) => Ok(idx as u8 + 1),
            None if compliance >= Compliance::Strict => Err(RpuError::InvalidArgument(format!(
                "coded PPS ({pps}) and width ({}) exceed maximum allowed",
                par.width
            ))),
            None => {
                log::warn!(
                    "[{}] coded PPS ({pps}) and width ({}) exceed maximum allowed, using level {}",
                    self.name,
                    par.width,
                    LEVELS.len()
                );
                Ok(LEVELS.len() as u8)
            }
        }
    }
}

fn compat_id_from_tags(par: &CodecParameters) -> Option<u8> {
    match (par.color_space, par.color_primaries, par.color_trc) {
        (ColorSpace::Bt2020Ncl, ColorPrimaries::Bt2020, ColorTransfer::Smpte2084) => Some(1),
        (ColorSpace::Bt2020Ncl, ColorPrimaries::Bt2020, ColorTransfer::AribStdB67) => Some(4),
        (ColorSpace::Bt709, ColorPrimaries::Bt709, ColorTransfer::Bt709) => Some(2),
        _ => None,
    }
}
