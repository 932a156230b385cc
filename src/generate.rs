// RPU synthesis.
//
// `RpuContext::generate` serialises target metadata against what the context
// has already transmitted: under metadata compression a mapping identical to
// a cached slot is sent as a reference, and the level 0 colour block and
// static extension blocks that go with it are elided. The context state after
// a successful call is exactly what `parse` produces for the emitted payload.

use crate::bitstream::{RpuWriter, crc32_mpeg2};
use crate::context::{MAX_DM_ID, RpuContext};
use crate::error::{RpuError, validate};
use crate::ext_table::ExtBlockTable;
use crate::metadata::ext::ExtVersion;
use crate::metadata::{
    COLOR_DEFAULT, CoefDataType, ColorMetadata, Compression, DataMapping, DmData, MAX_PIECES,
    MappingMethod, Metadata, NlqMethod, RpuHeader,
};
use crate::parse::{MappingUpdate, Parsed, RPU_NAL_PREFIX, RPU_TERMINATOR};
use crate::wrap::{self, WrapFlags};

impl RpuContext {
    /// Synthesise the RPU for `metadata` and record it as transmitted.
    ///
    /// Returns an empty buffer when `metadata` is `None`. The output is the
    /// raw RPU (`0x19` prefix included) unless `flags` requests NAL or T.35
    /// wrapping. On error the context is left exactly as it was.
    pub fn generate(
        &mut self,
        metadata: Option<&Metadata>,
        flags: WrapFlags,
    ) -> Result<Vec<u8>, RpuError> {
        let Some(metadata) = metadata else {
            return Ok(Vec::new());
        };
        let mut buf = std::mem::take(&mut self.rpu_buf);
        let result = self.generate_with_buffer(metadata, flags, &mut buf);
        self.rpu_buf = buf;
        if let Err(e) = &result {
            log::error!("[{}] failed generating RPU: {e}", self.name);
        }
        result
    }

    fn generate_with_buffer(
        &mut self,
        metadata: &Metadata,
        flags: WrapFlags,
        buf: &mut Vec<u8>,
    ) -> Result<Vec<u8>, RpuError> {
        let hdr = &metadata.header;
        let mapping = &metadata.mapping;
        let color = &metadata.color;
        let profile = self.cfg.dv_profile;

        if profile == 0 {
            return Err(RpuError::InvalidArgument(
                "Dolby Vision configuration not set".to_string(),
            ));
        }
        validate_header(hdr)?;
        let use_nlq = hdr.uses_nlq();
        if use_nlq != (mapping.nlq_method != NlqMethod::None) {
            return Err(RpuError::InvalidArgument(format!(
                "NLQ method {:?} inconsistent with RPU header",
                mapping.nlq_method
            )));
        }
        if profile == 5 && use_nlq {
            return Err(RpuError::InvalidArgument(
                "profile 5 RPUs cannot carry NLQ parameters".to_string(),
            ));
        }
        let vdr_rpu_id = validate("vdr_rpu_id", mapping.vdr_rpu_id, 0, MAX_DM_ID)?;
        validate("dm_metadata_id", color.dm_metadata_id, 0, MAX_DM_ID)?;

        let table = build_ext_table(&metadata.ext_blocks)?;
        let dm_present = *color != COLOR_DEFAULT || !table.is_empty();

        let compression = flags.contains(WrapFlags::COMPRESS)
            && self.cfg.dv_md_compression != Compression::None;
        let mut use_prev_vdr_rpu = false;
        if compression {
            let eligible = match self.cfg.dv_md_compression {
                Compression::Limited => vdr_rpu_id == 0,
                Compression::Extended => true,
                Compression::Reserved => {
                    return Err(RpuError::InvalidArgument(
                        "reserved metadata compression mode".to_string(),
                    ));
                }
                Compression::None => false,
            };
            use_prev_vdr_rpu = eligible
                && self.vdr[usize::from(vdr_rpu_id)].as_deref() == Some(mapping)
                && (!dm_present || self.dm_elidable(color, &table));
        }
        let dm_compression = compression && use_prev_vdr_rpu;

        let mut w = RpuWriter::with_buffer(std::mem::take(buf));
        w.put_bits(8, u32::from(RPU_NAL_PREFIX))?;
        write_header(&mut w, hdr)?;
        w.put_bit(dm_present)?;
        w.put_bit(use_prev_vdr_rpu)?;
        w.put_ue(u64::from(vdr_rpu_id))?;
        if !use_prev_vdr_rpu {
            write_mapping(&mut w, hdr, mapping, use_nlq)?;
        }

        if dm_present {
            w.put_ue(u64::from(color.dm_metadata_id))?; // affected_dm_metadata_id
            w.put_ue(u64::from(color.dm_metadata_id))?; // current_dm_metadata_id
            w.put_ue(u64::from(color.scene_refresh_flag))?;
            if !dm_compression {
                write_level0(&mut w, color, profile)?;
            }
            let sent: Vec<&DmData> = table
                .iter()
                .filter(|b| !(dm_compression && b.is_static()))
                .collect();
            let v1: Vec<&DmData> = sent
                .iter()
                .copied()
                .filter(|b| b.version() == Some(ExtVersion::V1))
                .collect();
            let v2: Vec<&DmData> = sent
                .iter()
                .copied()
                .filter(|b| b.version() == Some(ExtVersion::V2))
                .collect();

            w.put_ue(v1.len() as u64)?;
            w.align_zero()?;
            for block in v1 {
                write_ext_block(&mut w, block)?;
            }
            if !v2.is_empty() {
                w.put_ue(v2.len() as u64)?;
                w.align_zero()?;
                for block in v2 {
                    write_ext_block(&mut w, block)?;
                }
            }
        }
        w.align_zero()?;

        let mut rpu = w.finish()?;
        let crc = crc32_mpeg2(&rpu[1..]);
        rpu.extend_from_slice(&crc.to_be_bytes());
        rpu.push(RPU_TERMINATOR);

        let out = if flags.contains(WrapFlags::T35) {
            wrap::wrap_t35(&rpu[1..])?
        } else if flags.contains(WrapFlags::NAL) {
            wrap::wrap_nal(&rpu)
        } else {
            rpu.clone()
        };
        let rpu_len = rpu.len();
        *buf = rpu;

        let mapping_update = if use_prev_vdr_rpu {
            MappingUpdate::Reuse(self.vdr[usize::from(vdr_rpu_id)].clone())
        } else {
            MappingUpdate::New(*mapping)
        };
        self.commit(Parsed {
            header: *hdr,
            mapping: mapping_update,
            color: dm_present.then_some(*color),
            ext: dm_present.then_some(table),
        });
        if self.cfg.dv_md_compression != Compression::Extended {
            for (id, slot) in self.vdr.iter_mut().enumerate() {
                if id != usize::from(vdr_rpu_id) {
                    *slot = None;
                }
            }
        }

        log::debug!(
            "[{}] generated {rpu_len}-byte RPU: mapping #{vdr_rpu_id}{}, dm {}{}",
            self.name,
            if use_prev_vdr_rpu { " (reused)" } else { "" },
            dm_present,
            if dm_compression { " (compressed)" } else { "" },
        );
        Ok(out)
    }

    /// Whether the cached level 0 block and static extension blocks match
    /// the target, so a compressed RPU may omit them.
    fn dm_elidable(&self, color: &ColorMetadata, table: &ExtBlockTable) -> bool {
        let cached_statics = self
            .ext_blocks
            .as_deref()
            .map_or(&[][..], ExtBlockTable::static_blocks);
        self.dm.as_deref().is_some_and(|dm| dm.level0_eq(color))
            && cached_statics == table.static_blocks()
    }
}

/// Collect blocks in the order `parse` stores them: version 1 list first,
/// then version 2, each split into static and dynamic groups.
fn build_ext_table(blocks: &[DmData]) -> Result<ExtBlockTable, RpuError> {
    if let Some(bad) = blocks.iter().find(|b| b.version().is_none()) {
        return Err(RpuError::InvalidArgument(format!(
            "extension block level {} cannot be encoded",
            bad.level()
        )));
    }
    let mut table = ExtBlockTable::new();
    for version in [ExtVersion::V1, ExtVersion::V2] {
        for block in blocks.iter().filter(|b| b.version() == Some(version)) {
            table.push(*block)?;
        }
    }
    Ok(table)
}

fn validate_header(hdr: &RpuHeader) -> Result<(), RpuError> {
    if hdr.rpu_type != 2 {
        return Err(RpuError::InvalidArgument(format!(
            "RPU type {} cannot be encoded",
            hdr.rpu_type
        )));
    }
    if hdr.rpu_format & 0x700 != 0 {
        return Err(RpuError::Unsupported(format!(
            "RPU format {:#x}",
            hdr.rpu_format
        )));
    }
    match hdr.coef_data_type {
        CoefDataType::Fixed => {
            validate("coef_log2_denom", hdr.coef_log2_denom, 13, 32)?;
        }
        CoefDataType::Float => {
            validate("coef_log2_denom", hdr.coef_log2_denom, 32, 32)?;
        }
    }
    validate("bl_bit_depth", hdr.bl_bit_depth, 8, 16)?;
    validate("el_bit_depth", hdr.el_bit_depth, 8, 16)?;
    validate("vdr_bit_depth", hdr.vdr_bit_depth, 8, 16)?;
    validate("ext_mapping_idc_0_4", hdr.ext_mapping_idc_0_4, 0, 0x1f)?;
    validate("ext_mapping_idc_5_7", hdr.ext_mapping_idc_5_7, 0, 7)?;
    Ok(())
}

fn write_header(w: &mut RpuWriter, hdr: &RpuHeader) -> Result<(), RpuError> {
    w.put_bits(6, u32::from(hdr.rpu_type))?;
    w.put_bits(11, u32::from(hdr.rpu_format))?;
    w.put_bits(4, u32::from(hdr.vdr_rpu_profile))?;
    w.put_bits(4, u32::from(hdr.vdr_rpu_level))?;
    w.put_bit(true)?; // vdr_seq_info_present_flag
    w.put_bit(hdr.chroma_resampling_explicit_filter_flag)?;
    w.put_bits(2, hdr.coef_data_type.bits())?;
    if hdr.coef_data_type == CoefDataType::Fixed {
        w.put_ue(u64::from(hdr.coef_log2_denom))?;
    }
    w.put_bits(2, u32::from(hdr.vdr_rpu_normalized_idc))?;
    w.put_bit(hdr.bl_video_full_range_flag)?;
    w.put_ue(u64::from(hdr.bl_bit_depth - 8))?;
    w.put_ue(u64::from((hdr.ext_mapping_idc() << 8) | u32::from(hdr.el_bit_depth - 8)))?;
    w.put_ue(u64::from(hdr.vdr_bit_depth - 8))?;
    w.put_bit(hdr.spatial_resampling_filter_flag)?;
    w.put_bits(3, 0)?; // reserved_zero_3bits
    w.put_bit(hdr.el_spatial_resampling_filter_flag)?;
    w.put_bit(hdr.disable_residual_flag)
}

fn write_mapping(
    w: &mut RpuWriter,
    hdr: &RpuHeader,
    m: &DataMapping,
    use_nlq: bool,
) -> Result<(), RpuError> {
    let bl_depth = u32::from(hdr.bl_bit_depth);
    w.put_ue(u64::from(m.mapping_color_space))?;
    w.put_ue(u64::from(m.mapping_chroma_format_idc))?;

    for curve in &m.curves {
        let num_pivots = validate("num_pivots", curve.num_pivots, 2, MAX_PIECES as u8 + 1)?;
        w.put_ue(u64::from(num_pivots - 2))?;
        write_pivots(w, bl_depth, &curve.pivots[..usize::from(num_pivots)])?;
    }

    if use_nlq {
        w.put_bits(3, 0)?; // linear dead zone
        write_pivots(w, bl_depth, &m.nlq_pivots)?;
    }

    validate("num_x_partitions", m.num_x_partitions, 1, u32::MAX)?;
    validate("num_y_partitions", m.num_y_partitions, 1, u32::MAX)?;
    w.put_ue(u64::from(m.num_x_partitions - 1))?;
    w.put_ue(u64::from(m.num_y_partitions - 1))?;

    for curve in &m.curves {
        for i in 0..curve.pieces() {
            w.put_ue(u64::from(curve.mapping_idc[i].idc()))?;
            match curve.mapping_idc[i] {
                MappingMethod::Polynomial => {
                    let order = validate("poly_order", curve.poly_order[i], 1, 2)?;
                    w.put_ue(u64::from(order - 1))?;
                    if order == 1 {
                        w.put_bit(false)?; // linear_interp_flag
                    }
                    for k in 0..=usize::from(order) {
                        put_se_coef(w, hdr, curve.poly_coef[i][k])?;
                    }
                }
                MappingMethod::Mmr => {
                    let order = validate("mmr_order", curve.mmr_order[i], 1, 3)?;
                    w.put_bits(2, u32::from(order - 1))?;
                    put_se_coef(w, hdr, curve.mmr_constant[i])?;
                    for j in 0..usize::from(order) {
                        for k in 0..7 {
                            put_se_coef(w, hdr, curve.mmr_coef[i][j][k])?;
                        }
                    }
                }
            }
        }
    }

    if use_nlq {
        for nlq in &m.nlq {
            w.put_bits(u32::from(hdr.el_bit_depth), u32::from(nlq.nlq_offset))?;
            put_ue_coef(w, hdr, nlq.vdr_in_max)?;
            put_ue_coef(w, hdr, nlq.linear_deadzone_slope)?;
            put_ue_coef(w, hdr, nlq.linear_deadzone_threshold)?;
        }
    }
    Ok(())
}

/// Pivots are transmitted as deltas from the previous pivot.
fn write_pivots(w: &mut RpuWriter, depth: u32, pivots: &[u16]) -> Result<(), RpuError> {
    let mut prev = 0u16;
    for &pivot in pivots {
        let delta = pivot.checked_sub(prev).ok_or_else(|| {
            RpuError::InvalidArgument(format!("pivot {pivot} below previous pivot {prev}"))
        })?;
        w.put_bits(depth, u32::from(delta))?;
        prev = pivot;
    }
    Ok(())
}

fn write_level0(w: &mut RpuWriter, color: &ColorMetadata, profile: u8) -> Result<(), RpuError> {
    for q in &color.ycc_to_rgb_matrix {
        put_matrix_coef(w, q.rescale(1 << 13))?;
    }
    let denom = ColorMetadata::offset_denom(profile);
    for q in &color.ycc_to_rgb_offset {
        let v = if q.den == 0 {
            0
        } else {
            i64::from(q.num) * denom / i64::from(q.den)
        };
        let v = u32::try_from(v)
            .map_err(|_| RpuError::InvalidArgument(format!("YCC offset {q:?} out of range")))?;
        w.put_bits(32, v)?;
    }
    for q in &color.rgb_to_lms_matrix {
        put_matrix_coef(w, q.rescale(1 << 14))?;
    }
    w.put_bits(16, u32::from(color.signal_eotf))?;
    w.put_bits(16, u32::from(color.signal_eotf_param0))?;
    w.put_bits(16, u32::from(color.signal_eotf_param1))?;
    w.put_bits(32, color.signal_eotf_param2)?;
    let depth = validate("signal_bit_depth", color.signal_bit_depth, 8, 16)?;
    w.put_bits(5, u32::from(depth))?;
    w.put_bits(2, u32::from(color.signal_color_space))?;
    w.put_bits(2, u32::from(color.signal_chroma_format))?;
    w.put_bits(2, u32::from(color.signal_full_range_flag))?;
    w.put_bits(12, u32::from(color.source_min_pq))?;
    w.put_bits(12, u32::from(color.source_max_pq))?;
    w.put_bits(10, u32::from(color.source_diagonal))
}

fn put_matrix_coef(w: &mut RpuWriter, v: i64) -> Result<(), RpuError> {
    let v = i32::try_from(v)
        .map_err(|_| RpuError::InvalidArgument(format!("matrix coefficient {v} out of range")))?;
    w.put_sbits(16, v)
}

fn write_ext_block(w: &mut RpuWriter, block: &DmData) -> Result<(), RpuError> {
    let len = block.payload_len();
    w.put_ue(len)?;
    w.put_bits(8, u32::from(block.level()))?;
    let start = w.bits_written();
    block.write_payload(w)?;
    let written = w.bits_written() - start;
    let mut pad = len * 8 - written;
    while pad > 0 {
        let n = pad.min(32) as u32;
        w.put_bits(n, 0)?;
        pad -= u64::from(n);
    }
    Ok(())
}

fn put_se_coef(w: &mut RpuWriter, hdr: &RpuHeader, coef: i64) -> Result<(), RpuError> {
    let denom = u32::from(hdr.coef_log2_denom);
    match hdr.coef_data_type {
        CoefDataType::Fixed => {
            let ipart = coef >> denom;
            let fpart = coef & ((1i64 << denom) - 1);
            w.put_se(ipart)?;
            w.put_bits(denom, fpart as u32)
        }
        CoefDataType::Float => {
            let scale = (1u64 << denom) as f64;
            let f = (coef as f64 / scale) as f32;
            if (f64::from(f) * scale) as i64 != coef {
                return Err(float_coef_inexact(coef, denom));
            }
            w.put_bits(32, f.to_bits())
        }
    }
}

fn put_ue_coef(w: &mut RpuWriter, hdr: &RpuHeader, coef: u64) -> Result<(), RpuError> {
    let denom = u32::from(hdr.coef_log2_denom);
    match hdr.coef_data_type {
        CoefDataType::Fixed => {
            let ipart = coef >> denom;
            let fpart = coef & ((1u64 << denom) - 1);
            w.put_ue(ipart)?;
            w.put_bits(denom, fpart as u32)
        }
        CoefDataType::Float => {
            let scale = (1u64 << denom) as f64;
            let f = (coef as f64 / scale) as f32;
            if (f64::from(f) * scale) as u64 != coef {
                return Err(float_coef_inexact(coef, denom));
            }
            w.put_bits(32, f.to_bits())
        }
    }
}

fn float_coef_inexact(coef: impl std::fmt::Display, denom: u32) -> RpuError {
    RpuError::InvalidArgument(format!(
        "coefficient {coef}/2^{denom} has no exact single precision representation"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{Level1, Level6, Level9, Level255};

    #[test]
    fn ext_table_orders_like_parser() {
        let blocks = [
            DmData::Level9(Level9::default()),
            DmData::Level6(Level6::default()),
            DmData::Level1(Level1::default()),
            DmData::Level255(Level255::default()),
        ];
        let table = build_ext_table(&blocks).unwrap();
        let levels: Vec<u8> = table.iter().map(DmData::level).collect();
        assert_eq!(levels, vec![6, 255, 1, 9]);
    }

    #[test]
    fn ext_table_rejects_unknown_levels() {
        let blocks = [DmData::Unknown(42)];
        assert!(matches!(
            build_ext_table(&blocks),
            Err(RpuError::InvalidArgument(_))
        ));
    }

    #[test]
    fn header_validation() {
        let mut hdr = RpuHeader {
            rpu_type: 2,
            rpu_format: 18,
            coef_log2_denom: 23,
            bl_bit_depth: 10,
            el_bit_depth: 10,
            vdr_bit_depth: 12,
            ..Default::default()
        };
        validate_header(&hdr).unwrap();
        hdr.coef_data_type = CoefDataType::Float;
        assert!(validate_header(&hdr).is_err());
        hdr.coef_log2_denom = 32;
        validate_header(&hdr).unwrap();
        hdr.rpu_format = 0x100;
        assert!(matches!(validate_header(&hdr), Err(RpuError::Unsupported(_))));
    }

    #[test]
    fn fixed_coefficients_split_at_denominator() {
        let hdr = RpuHeader {
            coef_log2_denom: 23,
            ..Default::default()
        };
        let mut w = RpuWriter::new();
        put_se_coef(&mut w, &hdr, -(1 << 22)).unwrap();
        w.align_zero().unwrap();
        let data = w.finish().unwrap();
        let mut r = crate::bitstream::RpuReader::new(&data);
        // floor(-0.5) = -1, fraction 0.5
        assert_eq!(r.se().unwrap(), -1);
        assert_eq!(r.bits(23).unwrap(), 1 << 22);
    }

    #[test]
    fn decreasing_pivots_rejected() {
        let mut w = RpuWriter::new();
        assert!(write_pivots(&mut w, 10, &[0, 512, 256]).is_err());
    }
}
