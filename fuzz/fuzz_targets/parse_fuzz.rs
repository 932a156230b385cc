#![no_main]
use dovi_rpu::{Compression, DecoderConfig, ErrorRecognition, RpuContext};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // The first byte selects profile, compression and strictness; the rest
    // is fed to the parser twice so the second call sees cached state.
    let Some((&sel, rpu)) = data.split_first() else {
        return;
    };
    let mut ctx = RpuContext::new("fuzz");
    ctx.set_config(DecoderConfig {
        dv_profile: [0, 5, 7, 8, 10][usize::from(sel & 7) % 5],
        dv_md_compression: Compression::from_bits(u32::from(sel >> 3) & 3),
        ..Default::default()
    });
    let err = ErrorRecognition::from_bits_truncate(u32::from(sel >> 5) | (1 << 3));
    for _ in 0..2 {
        let before = ctx.get_metadata();
        if ctx.parse(rpu, err).is_err() {
            assert_eq!(ctx.get_metadata(), before);
        }
    }
});
