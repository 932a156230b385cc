#![no_main]
use dovi_rpu::metadata::{COLOR_DEFAULT, Level1, Level2};
use dovi_rpu::{
    Compression, DataMapping, DecoderConfig, DmData, ErrorRecognition, Metadata, RpuContext,
    RpuHeader, WrapFlags,
};
use libfuzzer_sys::fuzz_target;

fn context(compression: Compression) -> RpuContext {
    let mut ctx = RpuContext::new("fuzz");
    ctx.set_config(DecoderConfig {
        dv_profile: 8,
        dv_md_compression: compression,
        ..Default::default()
    });
    ctx
}

fn u12(data: &[u8], i: usize) -> u16 {
    let hi = data.get(i).copied().unwrap_or(0);
    let lo = data.get(i + 1).copied().unwrap_or(0);
    u16::from_be_bytes([hi, lo]) & 0xFFF
}

fuzz_target!(|data: &[u8]| {
    // Each 6-byte chunk is one frame: mapping id, coefficient, and two
    // 12-bit PQ values for the dynamic blocks.
    let mut enc = context(Compression::Extended);
    let mut dec = context(Compression::Extended);
    for chunk in data.chunks(6).take(16) {
        let mut mapping = DataMapping::identity(10, 23);
        mapping.vdr_rpu_id = chunk[0] & 0x0F;
        mapping.curves[2].poly_coef[0][0] = i64::from(*chunk.get(1).unwrap_or(&0) as i8) << 16;
        let mut color = COLOR_DEFAULT;
        color.dm_metadata_id = mapping.vdr_rpu_id;
        let md = Metadata {
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
            mapping,
            color,
            ext_blocks: vec![
                DmData::Level1(Level1 {
                    min_pq: 0,
                    max_pq: u12(chunk, 2),
                    avg_pq: u12(chunk, 4),
                }),
                DmData::Level2(Level2 {
                    target_max_pq: u12(chunk, 2),
                    ..Default::default()
                }),
            ],
        };
        let rpu = enc.generate(Some(&md), WrapFlags::COMPRESS).unwrap();
        dec.parse(&rpu, ErrorRecognition::CRCCHECK | ErrorRecognition::EXPLODE)
            .unwrap();
        assert_eq!(dec.get_metadata().as_ref(), Some(&md));
    }
});
