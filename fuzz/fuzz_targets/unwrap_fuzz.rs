#![no_main]
use dovi_rpu::wrap;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = wrap::unwrap_nal(data);

    let mut out = Vec::new();
    if let Ok(emdf) = wrap::unwrap_t35(data) {
        let _ = wrap::read_emdf(emdf, &mut out);
    }

    let escaped = wrap::add_emulation_prevention(data);
    assert_eq!(wrap::remove_emulation_prevention(&escaped), data);
});
