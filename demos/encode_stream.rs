use dovi_rpu::metadata::{COLOR_DEFAULT, Level1, Level2, Level6, Rational};
use dovi_rpu::{
    CodecId, CodecParameters, ColorPrimaries, ColorSpace, ColorTransfer, Compliance, Compression,
    DataMapping, DmData, Enable, Metadata, RpuContext, RpuHeader, WrapFlags,
};

fn frame_metadata(scene: u16) -> Metadata {
    let mut color = COLOR_DEFAULT;
    color.scene_refresh_flag = 1;
    color.source_max_pq = 3079;
    Metadata {
        header: RpuHeader {
            rpu_type: 2,
            rpu_format: 18,
            vdr_rpu_profile: 1,
            coef_log2_denom: 23,
            bl_bit_depth: 10,
            el_bit_depth: 10,
            vdr_bit_depth: 12,
            disable_residual_flag: true,
            ..Default::default()
        },
        mapping: DataMapping::identity(10, 23),
        color,
        ext_blocks: vec![
            DmData::Level6(Level6 {
                max_luminance: 1000,
                min_luminance: 1,
                max_cll: 1000,
                max_fall: 400,
            }),
            DmData::Level1(Level1 {
                min_pq: 0,
                max_pq: 2800 + scene * 40,
                avg_pq: 900 + scene * 25,
            }),
            DmData::Level2(Level2 {
                target_max_pq: 2081,
                trim_slope: 2048,
                trim_offset: 2048,
                trim_power: 2048,
                ..Default::default()
            }),
        ],
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut par = CodecParameters {
        frame_rate: Some(Rational::new(24000, 1001)),
        color_space: ColorSpace::Bt2020Ncl,
        color_primaries: ColorPrimaries::Bt2020,
        color_trc: ColorTransfer::Smpte2084,
        ..CodecParameters::new(CodecId::Hevc, 3840, 2160)
    };

    let mut ctx = RpuContext::new("hevc_encoder");
    ctx.set_enable(Enable::Automatic);
    let first = frame_metadata(0);
    ctx.configure(&mut par, Some(&first), Compression::Limited, Compliance::Normal)?;
    let cfg = par.coded_side_data.ok_or("Dolby Vision not configured")?;
    println!(
        "dvcC profile {}.{:02} compat {} -> {:02x?}",
        cfg.dv_profile,
        cfg.dv_level,
        cfg.dv_bl_signal_compatibility_id,
        &cfg.to_bytes()?[..5]
    );

    let mut total = 0;
    for frame in 0..48u16 {
        let md = frame_metadata(frame / 12);
        let nal = ctx.generate(Some(&md), WrapFlags::NAL | WrapFlags::COMPRESS)?;
        total += nal.len();
        if frame % 12 == 0 || frame % 12 == 1 {
            println!("frame {frame:>2}: {:>3} bytes", nal.len());
        }
    }
    println!("48 frames, {total} bytes of RPU NAL units");

    #[cfg(feature = "serde")]
    if let Some(md) = ctx.get_metadata() {
        println!("{}", serde_json::to_string_pretty(&md)?);
    }
    Ok(())
}
