use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use dovi_rpu::metadata::{COLOR_DEFAULT, Level1, Level2, Level6, Level255, MappingMethod};
use dovi_rpu::wrap;
use dovi_rpu::{
    Compression, DataMapping, DecoderConfig, DmData, ErrorRecognition, Metadata, RpuContext,
    RpuHeader, WrapFlags,
};
use std::fs;
use std::path::Path;

fn context(profile: u8, compression: Compression) -> RpuContext {
    let mut ctx = RpuContext::new("bench");
    ctx.set_config(DecoderConfig {
        dv_version_major: 1,
        dv_profile: profile,
        dv_level: 6,
        dv_bl_signal_compatibility_id: 1,
        dv_md_compression: compression,
        ..Default::default()
    });
    ctx
}

/// Scene metadata with `pieces` polynomial or MMR pieces on every curve.
fn gen_metadata(pieces: u8, mmr: bool, seed: u16) -> Metadata {
    let mut mapping = DataMapping::identity(10, 23);
    for curve in &mut mapping.curves {
        curve.num_pivots = pieces + 1;
        for p in 0..=usize::from(pieces) {
            curve.pivots[p] = (p as u32 * 1023 / u32::from(pieces)) as u16;
        }
        for i in 0..usize::from(pieces) {
            if mmr {
                curve.mapping_idc[i] = MappingMethod::Mmr;
                curve.mmr_order[i] = 3;
                curve.mmr_constant[i] = i64::from(seed) << 8;
                for (j, row) in curve.mmr_coef[i].iter_mut().enumerate() {
                    for (k, v) in row.iter_mut().enumerate() {
                        *v = (j as i64 * 7 + k as i64 - 10) << 16;
                    }
                }
            } else {
                curve.poly_order[i] = 2;
                curve.poly_coef[i] = [i64::from(seed), 1 << 23, -(1 << 18)];
            }
        }
    }
    let mut color = COLOR_DEFAULT;
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
        mapping,
        color,
        ext_blocks: vec![
            DmData::Level6(Level6 {
                max_luminance: 1000,
                min_luminance: 1,
                max_cll: 1000,
                max_fall: 400,
            }),
            DmData::Level255(Level255::default()),
            DmData::Level1(Level1 {
                min_pq: 0,
                max_pq: 3079,
                avg_pq: seed % 4096,
            }),
            DmData::Level2(Level2 {
                target_max_pq: 2081,
                ..Default::default()
            }),
        ],
    }
}

fn generate(md: &Metadata, flags: WrapFlags) -> Vec<u8> {
    context(8, Compression::None).generate(Some(md), flags).unwrap()
}

fn write_size_snapshot() {
    let mut csv = String::from("mapping,pieces,full_bytes,compressed_bytes,nal_bytes\n");
    for mmr in [false, true] {
        for pieces in [1u8, 4, 8] {
            let md = gen_metadata(pieces, mmr, 7);
            let mut enc = context(8, Compression::Limited);
            let full = enc.generate(Some(&md), WrapFlags::COMPRESS).unwrap();
            let compressed = enc.generate(Some(&md), WrapFlags::COMPRESS).unwrap();
            let nal = generate(&md, WrapFlags::NAL);
            csv.push_str(&format!(
                "{},{pieces},{},{},{}\n",
                if mmr { "mmr" } else { "poly" },
                full.len(),
                compressed.len(),
                nal.len()
            ));
        }
    }
    let out_dir = Path::new("target/criterion/custom_reports");
    let _ = fs::create_dir_all(out_dir);
    let _ = fs::write(out_dir.join("rpu_sizes.csv"), csv);
}

fn bench_parse(c: &mut Criterion) {
    let mut g = c.benchmark_group("parse");
    for pieces in [1u8, 4, 8] {
        let rpu = generate(&gen_metadata(pieces, true, 1), WrapFlags::empty());
        g.throughput(Throughput::Bytes(rpu.len() as u64));
        g.bench_with_input(BenchmarkId::from_parameter(pieces), &pieces, |b, _| {
            let mut ctx = context(8, Compression::None);
            b.iter(|| {
                ctx.parse(black_box(&rpu), ErrorRecognition::CRCCHECK).unwrap();
                black_box(ctx.color());
            });
        });
    }
    g.finish();
}

fn bench_parse_compressed(c: &mut Criterion) {
    let mut g = c.benchmark_group("parse_compressed");
    let md = gen_metadata(8, true, 2);
    let mut enc = context(8, Compression::Limited);
    let full = enc.generate(Some(&md), WrapFlags::COMPRESS).unwrap();
    let reference = enc.generate(Some(&md), WrapFlags::COMPRESS).unwrap();
    g.throughput(Throughput::Bytes(reference.len() as u64));
    g.bench_function("reference_only", |b| {
        let mut ctx = context(8, Compression::Limited);
        ctx.parse(&full, ErrorRecognition::CRCCHECK).unwrap();
        b.iter(|| {
            ctx.parse(black_box(&reference), ErrorRecognition::CRCCHECK)
                .unwrap();
        });
    });
    g.finish();
}

fn bench_generate(c: &mut Criterion) {
    write_size_snapshot();
    let mut g = c.benchmark_group("generate");
    for (name, flags) in [
        ("raw", WrapFlags::empty()),
        ("nal", WrapFlags::NAL),
        ("compress", WrapFlags::COMPRESS | WrapFlags::NAL),
    ] {
        let md = gen_metadata(8, true, 3);
        g.bench_with_input(BenchmarkId::from_parameter(name), &flags, |b, flags| {
            let mut ctx = context(8, Compression::Limited);
            b.iter(|| {
                let out = ctx.generate(Some(black_box(&md)), *flags).unwrap();
                black_box(out);
            });
        });
    }
    g.finish();
}

fn bench_get_metadata(c: &mut Criterion) {
    let rpu = generate(&gen_metadata(4, false, 4), WrapFlags::empty());
    let mut ctx = context(8, Compression::None);
    ctx.parse(&rpu, ErrorRecognition::empty()).unwrap();
    c.bench_function("get_metadata", |b| {
        b.iter(|| black_box(ctx.get_metadata()));
    });
}

fn bench_emulation_prevention(c: &mut Criterion) {
    let mut g = c.benchmark_group("emulation_prevention");
    let mut data = vec![0u8; 64 * 1024];
    for (i, b) in data.iter_mut().enumerate() {
        if i % 5 == 4 {
            *b = (i % 4) as u8;
        }
    }
    g.throughput(Throughput::Bytes(data.len() as u64));
    g.bench_function("add", |b| {
        b.iter(|| black_box(wrap::add_emulation_prevention(black_box(&data))));
    });
    let escaped = wrap::add_emulation_prevention(&data);
    g.bench_function("remove", |b| {
        b.iter(|| black_box(wrap::remove_emulation_prevention(black_box(&escaped))));
    });
    g.finish();
}

criterion_group!(
    benches,
    bench_parse,
    bench_parse_compressed,
    bench_generate,
    bench_get_metadata,
    bench_emulation_prevention
);
criterion_main!(benches);
