// Integration tests for encoder configuration.
//
// Profile inference per codec, compatibility id from colour tags, level
// selection, compression compliance and the enable modes.

use dovi_rpu::configure::{LEVELS, level_limits};
use dovi_rpu::metadata::{COLOR_DEFAULT, Rational};
use dovi_rpu::{
    CodecId, CodecParameters, ColorPrimaries, ColorSpace, ColorTransfer, Compliance, Compression,
    DataMapping, DecoderConfig, Enable, Metadata, PixelFormat, RpuContext, RpuError, RpuHeader,
};

fn enabled() -> RpuContext {
    let mut ctx = RpuContext::new("cfg");
    ctx.set_enable(Enable::Enabled);
    ctx
}

fn hevc_pq(width: u32, height: u32, fps: i32) -> CodecParameters {
    CodecParameters {
        frame_rate: Some(Rational::new(fps, 1)),
        color_space: ColorSpace::Bt2020Ncl,
        color_primaries: ColorPrimaries::Bt2020,
        color_trc: ColorTransfer::Smpte2084,
        ..CodecParameters::new(CodecId::Hevc, width, height)
    }
}

fn metadata_with(header: RpuHeader) -> Metadata {
    Metadata {
        header,
        mapping: DataMapping::identity(10, 23),
        color: COLOR_DEFAULT,
        ext_blocks: Vec::new(),
    }
}

fn profile8_header() -> RpuHeader {
    RpuHeader {
        rpu_type: 2,
        rpu_format: 18,
        vdr_rpu_profile: 1,
        coef_log2_denom: 23,
        bl_bit_depth: 10,
        el_bit_depth: 10,
        vdr_bit_depth: 12,
        disable_residual_flag: true,
        ..Default::default()
    }
}

fn configure(
    ctx: &mut RpuContext,
    par: &mut CodecParameters,
    metadata: Option<&Metadata>,
    compression: Compression,
) -> Result<(), RpuError> {
    ctx.configure(par, metadata, compression, Compliance::Normal)
}

#[test]
fn hevc_pq_is_profile8_compat1() {
    let mut ctx = enabled();
    let mut par = hevc_pq(3840, 2160, 24);
    configure(&mut ctx, &mut par, None, Compression::None).unwrap();

    let cfg = *ctx.config();
    assert_eq!(cfg.dv_version_major, 1);
    assert_eq!(cfg.dv_version_minor, 0);
    assert_eq!(cfg.dv_profile, 8);
    assert_eq!(cfg.dv_level, 6);
    assert_eq!(cfg.dv_bl_signal_compatibility_id, 1);
    assert!(cfg.rpu_present_flag);
    assert!(cfg.bl_present_flag);
    assert!(!cfg.el_present_flag);
    assert_eq!(par.coded_side_data, Some(cfg));
}

#[test]
fn hlg_and_sdr_compat_ids() {
    let mut ctx = enabled();
    let mut par = hevc_pq(1920, 1080, 50);
    par.color_trc = ColorTransfer::AribStdB67;
    configure(&mut ctx, &mut par, None, Compression::None).unwrap();
    assert_eq!(ctx.config().dv_bl_signal_compatibility_id, 4);

    let mut par = CodecParameters {
        color_space: ColorSpace::Bt709,
        color_primaries: ColorPrimaries::Bt709,
        color_trc: ColorTransfer::Bt709,
        ..CodecParameters::new(CodecId::Hevc, 1920, 1080)
    };
    configure(&mut ctx, &mut par, None, Compression::None).unwrap();
    assert_eq!(ctx.config().dv_bl_signal_compatibility_id, 2);
}

#[test]
fn untagged_hevc_is_profile5() {
    let mut ctx = enabled();
    let mut par = CodecParameters::new(CodecId::Hevc, 1920, 1080);
    configure(&mut ctx, &mut par, None, Compression::None).unwrap();
    assert_eq!(ctx.config().dv_profile, 5);
    assert_eq!(ctx.config().dv_bl_signal_compatibility_id, 0);

    let mut par = CodecParameters {
        color_space: ColorSpace::IptC2,
        color_trc: ColorTransfer::Smpte2084,
        ..CodecParameters::new(CodecId::Hevc, 1920, 1080)
    };
    configure(&mut ctx, &mut par, None, Compression::None).unwrap();
    assert_eq!(ctx.config().dv_profile, 5);
}

#[test]
fn profile_from_metadata_header() {
    let mut ctx = enabled();
    let mut par = hevc_pq(3840, 2160, 24);
    let md = metadata_with(RpuHeader {
        vdr_rpu_profile: 0,
        bl_video_full_range_flag: true,
        ..profile8_header()
    });
    configure(&mut ctx, &mut par, Some(&md), Compression::None).unwrap();
    assert_eq!(ctx.config().dv_profile, 5);
}

#[test]
fn enhancement_layer_profiles() {
    let md = metadata_with(RpuHeader {
        disable_residual_flag: false,
        el_spatial_resampling_filter_flag: true,
        ..profile8_header()
    });
    let mut par = hevc_pq(3840, 2160, 24);

    let mut ctx = enabled();
    assert!(matches!(
        configure(&mut ctx, &mut par, Some(&md), Compression::None),
        Err(RpuError::Unsupported(_))
    ));

    let mut auto = RpuContext::new("auto");
    auto.set_enable(Enable::Automatic);
    configure(&mut auto, &mut par, Some(&md), Compression::None).unwrap();
    assert_eq!(*auto.config(), DecoderConfig::default());
}

#[test]
fn h264_and_av1_profiles() {
    let mut ctx = enabled();
    let mut par = CodecParameters {
        pixel_format: PixelFormat::Yuv420p,
        color_space: ColorSpace::Bt709,
        color_primaries: ColorPrimaries::Bt709,
        color_trc: ColorTransfer::Bt709,
        ..CodecParameters::new(CodecId::H264, 1920, 1080)
    };
    configure(&mut ctx, &mut par, None, Compression::None).unwrap();
    assert_eq!(ctx.config().dv_profile, 9);
    assert_eq!(ctx.config().dv_bl_signal_compatibility_id, 2);

    let mut par = hevc_pq(3840, 2160, 60);
    par.codec_id = CodecId::Av1;
    configure(&mut ctx, &mut par, None, Compression::None).unwrap();
    assert_eq!(ctx.config().dv_profile, 10);
    assert_eq!(ctx.config().dv_bl_signal_compatibility_id, 1);
    assert_eq!(ctx.config().dv_level, 9);
}

#[test]
fn av1_full_range_header_is_ipt() {
    let mut ctx = enabled();
    let mut par = CodecParameters::new(CodecId::Av1, 3840, 2160);
    let md = metadata_with(RpuHeader {
        bl_video_full_range_flag: true,
        ..profile8_header()
    });
    configure(&mut ctx, &mut par, Some(&md), Compression::None).unwrap();
    assert_eq!(ctx.config().dv_profile, 10);
    assert_eq!(ctx.config().dv_bl_signal_compatibility_id, 0);
}

#[test]
fn pixel_format_compliance() {
    let mut ctx = enabled();
    let mut par = hevc_pq(1920, 1080, 24);
    par.pixel_format = PixelFormat::Yuv420p12;
    assert!(matches!(
        ctx.configure(&mut par, None, Compression::None, Compliance::Normal),
        Err(RpuError::InvalidArgument(_))
    ));
    ctx.configure(&mut par, None, Compression::None, Compliance::Experimental)
        .unwrap();
    assert_eq!(ctx.config().dv_profile, 8);
}

#[test]
fn unmappable_tags() {
    let mut par = hevc_pq(1920, 1080, 24);
    par.color_primaries = ColorPrimaries::Bt709;

    let mut ctx = enabled();
    assert!(configure(&mut ctx, &mut par, None, Compression::None).is_err());

    let mut auto = RpuContext::new("auto");
    auto.set_enable(Enable::Automatic);
    let md = metadata_with(profile8_header());
    configure(&mut auto, &mut par, Some(&md), Compression::None).unwrap();
    assert_eq!(auto.config().dv_profile, 0);
    assert!(par.coded_side_data.is_none());
}

#[test]
fn disabled_and_automatic_without_metadata_skip() {
    let mut par = hevc_pq(1920, 1080, 24);

    let mut ctx = RpuContext::new("off");
    ctx.set_config(DecoderConfig {
        dv_profile: 8,
        ..Default::default()
    });
    configure(&mut ctx, &mut par, None, Compression::None).unwrap();
    assert_eq!(*ctx.config(), DecoderConfig::default());

    let mut auto = RpuContext::new("auto");
    auto.set_enable(Enable::Automatic);
    configure(&mut auto, &mut par, None, Compression::None).unwrap();
    assert_eq!(auto.config().dv_profile, 0);
    assert!(par.coded_side_data.is_none());
}

#[test]
fn compression_rules() {
    let mut ctx = enabled();
    let mut par = hevc_pq(1920, 1080, 24);

    assert!(configure(&mut ctx, &mut par, None, Compression::Reserved).is_err());

    configure(&mut ctx, &mut par, None, Compression::Limited).unwrap();
    assert_eq!(ctx.config().dv_md_compression, Compression::Limited);

    assert!(configure(&mut ctx, &mut par, None, Compression::Extended).is_err());
    ctx.configure(
        &mut par,
        None,
        Compression::Extended,
        Compliance::Experimental,
    )
    .unwrap();
    assert_eq!(ctx.config().dv_md_compression, Compression::Extended);

    // profile 5
    let mut untagged = CodecParameters::new(CodecId::Hevc, 1920, 1080);
    assert!(configure(&mut ctx, &mut untagged, None, Compression::Limited).is_err());
    ctx.configure(
        &mut untagged,
        None,
        Compression::Limited,
        Compliance::Unofficial,
    )
    .unwrap();
    assert_eq!(ctx.config().dv_profile, 5);
}

#[test]
fn level_selection() {
    let cases = [
        (1280, 720, 24, 1),
        (1280, 720, 30, 2),
        (1920, 1080, 24, 3),
        (1920, 1080, 60, 5),
        (3840, 2160, 30, 7),
        (3840, 2160, 60, 9),
        (3840, 2160, 120, 10),
        (7680, 4320, 60, 12),
        (7680, 4320, 120, 13),
    ];
    for (w, h, fps, level) in cases {
        let mut ctx = enabled();
        let mut par = hevc_pq(w, h, fps);
        configure(&mut ctx, &mut par, None, Compression::None).unwrap();
        assert_eq!(ctx.config().dv_level, level, "{w}x{h}@{fps}");
    }
}

#[test]
fn wide_frame_needs_higher_level() {
    // 2560 wide fits level 4 by width even though level 3 has the throughput
    let mut ctx = enabled();
    let mut par = hevc_pq(2560, 800, 24);
    configure(&mut ctx, &mut par, None, Compression::None).unwrap();
    assert_eq!(ctx.config().dv_level, 4);
}

#[test]
fn level_overflow_depends_on_compliance() {
    let mut par = hevc_pq(7680, 4320, 240);

    let mut ctx = enabled();
    configure(&mut ctx, &mut par, None, Compression::None).unwrap();
    assert_eq!(ctx.config().dv_level, 13);

    let mut strict = enabled();
    assert!(
        strict
            .configure(&mut par, None, Compression::None, Compliance::Strict)
            .is_err()
    );
}

#[test]
fn extreme_parameters_do_not_overflow() {
    let mut par = hevc_pq(u32::MAX, u32::MAX, i32::MAX);
    let mut ctx = enabled();
    configure(&mut ctx, &mut par, None, Compression::None).unwrap();
    assert_eq!(ctx.config().dv_level, 13);

    par.frame_rate = None;
    let mut strict = enabled();
    let err = strict
        .configure(&mut par, None, Compression::None, Compliance::Strict)
        .unwrap_err();
    assert!(matches!(err, RpuError::InvalidArgument(_)), "{err}");
    assert_eq!(*strict.config(), DecoderConfig::default());
}

#[test]
fn configured_record_serialises() {
    let mut ctx = enabled();
    let mut par = hevc_pq(3840, 2160, 24);
    configure(&mut ctx, &mut par, None, Compression::None).unwrap();
    let bytes = par.coded_side_data.unwrap().to_bytes().unwrap();
    assert_eq!(DecoderConfig::from_bytes(&bytes).unwrap(), *ctx.config());
}

#[test]
fn level_table_is_monotonic() {
    assert_eq!(LEVELS.len(), 13);
    for pair in LEVELS.windows(2) {
        assert!(pair[0].pps <= pair[1].pps);
        assert!(pair[0].max_width <= pair[1].max_width);
    }
    assert_eq!(level_limits(6).unwrap().max_width, 3840);
}
