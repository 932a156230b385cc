use dovi_rpu::metadata::{COLOR_DEFAULT, Level1, Level6};
use dovi_rpu::wrap;
use dovi_rpu::{
    DataMapping, DecoderConfig, DmData, Enable, ErrorRecognition, FrameSideData, Metadata,
    RpuContext, RpuError, RpuHeader, WrapFlags,
};

#[derive(Default)]
struct Frame {
    dovi: Option<Metadata>,
}

impl FrameSideData for Frame {
    fn attach_dovi_metadata(&mut self, metadata: Metadata) -> Result<(), RpuError> {
        self.dovi = Some(metadata);
        Ok(())
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Profile 8.1, as found in a dvcC box.
    let dvcc = [0x01, 0x00, 0x10, 0x35, 0x10, 0, 0, 0];
    let cfg = DecoderConfig::from_bytes(&dvcc)?;

    // Produce one NAL unit to decode.
    let mut color = COLOR_DEFAULT;
    color.source_max_pq = 3079;
    let source = Metadata {
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
                max_pq: 3079,
                avg_pq: 1229,
            }),
        ],
    };
    let mut encoder = RpuContext::new("encoder");
    encoder.set_config(cfg);
    let nal = encoder.generate(Some(&source), WrapFlags::NAL)?;

    let mut decoder = RpuContext::new("decoder");
    decoder.set_enable(Enable::Automatic);
    decoder.set_config(cfg);
    let rpu = wrap::unwrap_nal(&nal)?;
    decoder.parse(&rpu, ErrorRecognition::CRCCHECK | ErrorRecognition::EXPLODE)?;

    let mut frame = Frame::default();
    decoder.attach_side_data(&mut frame)?;
    let md = frame.dovi.as_ref().ok_or("no Dolby Vision metadata")?;
    assert_eq!(md, &source);

    println!(
        "profile {} level {}, {} byte NAL",
        decoder.profile(),
        decoder.config().dv_level,
        nal.len()
    );
    for block in &md.ext_blocks {
        println!("  L{:<3} {:?}", block.level(), block);
    }
    Ok(())
}
