// RPU decoding.
//
// `RpuContext::parse` unwraps the payload container, verifies the trailer and
// CRC, then decodes header, data mapping, level 0 colour block and extension
// blocks into locals. State is only committed once the whole payload decoded.

use std::sync::Arc;

use crate::bitstream::{RpuReader, crc32_mpeg2};
use crate::context::{DEFAULT_COLOR, MAX_DM_ID, RpuContext};
use crate::error::{ErrorRecognition, RpuError, validate};
use crate::ext_table::ExtBlockTable;
use crate::metadata::ext::ExtVersion;
use crate::metadata::{
    COLOR_DEFAULT, CoefDataType, ColorMetadata, Compression, DataMapping, DmData, MAX_PIECES,
    MappingMethod, NlqMethod, Rational, RpuHeader, guess_profile_hevc,
};
use crate::wrap;

/// First byte of every non-AV1 RPU.
pub(crate) const RPU_NAL_PREFIX: u8 = 0x19;
/// Last byte of every RPU.
pub(crate) const RPU_TERMINATOR: u8 = 0x80;
/// CRC-32 plus terminator byte.
const TRAILER_BITS: u64 = 40;

pub(crate) enum MappingUpdate {
    /// Point the active view at an existing slot (or nothing).
    Reuse(Option<Arc<DataMapping>>),
    /// Store a freshly decoded mapping in its slot.
    New(DataMapping),
}

/// Fully decoded RPU, applied to the context in one step.
pub(crate) struct Parsed {
    pub(crate) header: RpuHeader,
    pub(crate) mapping: MappingUpdate,
    /// `None` when the RPU carries no DM block.
    pub(crate) color: Option<ColorMetadata>,
    pub(crate) ext: Option<ExtBlockTable>,
}

impl RpuContext {
    /// Decode one RPU and make it the active metadata.
    ///
    /// `rpu` is the payload after NAL/T.35 unwrapping: starting with the
    /// `0x19` prefix, or with the EMDF container for profile 10 streams. On
    /// error the context is left exactly as it was.
    pub fn parse(&mut self, rpu: &[u8], err_recognition: ErrorRecognition) -> Result<(), RpuError> {
        let mut buf = std::mem::take(&mut self.rpu_buf);
        let result = self.parse_with_buffer(rpu, err_recognition, &mut buf);
        self.rpu_buf = buf;
        if let Err(e) = &result {
            log::error!("[{}] failed parsing RPU: {e}", self.name);
        }
        result
    }

    fn parse_with_buffer(
        &mut self,
        rpu: &[u8],
        err: ErrorRecognition,
        buf: &mut Vec<u8>,
    ) -> Result<(), RpuError> {
        let payload: &[u8] = if self.cfg.dv_profile == 10 {
            wrap::read_emdf(rpu, buf)?;
            &buf[..]
        } else {
            if rpu.len() < 5 {
                return Err(RpuError::invalid(format!("RPU too short: {} bytes", rpu.len())));
            }
            if rpu[0] != RPU_NAL_PREFIX {
                return Err(RpuError::invalid(format!(
                    "unexpected RPU prefix {:#04x}",
                    rpu[0]
                )));
            }
            let end = rpu.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
            &rpu[1..end.max(1)]
        };

        if payload.len() < 5 {
            return Err(RpuError::invalid(format!(
                "RPU payload too short: {} bytes",
                payload.len()
            )));
        }
        let last = payload[payload.len() - 1];
        if last != RPU_TERMINATOR {
            return Err(RpuError::invalid(format!(
                "unexpected RPU terminator {last:#04x}"
            )));
        }

        if err.contains(ErrorRecognition::CRCCHECK) {
            let crc = crc32_mpeg2(&payload[..payload.len() - 1]);
            if crc != 0 {
                if err.explode() {
                    return Err(RpuError::CrcMismatch(crc));
                }
                log::warn!("[{}] RPU CRC mismatch: {crc:#010X}", self.name);
            }
        }

        let Some(parsed) = self.decode_payload(payload, err)? else {
            return Ok(());
        };
        self.commit(parsed);
        Ok(())
    }

    pub(crate) fn commit(&mut self, p: Parsed) {
        self.header = p.header;
        self.mapping = match p.mapping {
            MappingUpdate::Reuse(m) => m,
            MappingUpdate::New(m) => {
                let arc = Arc::new(m);
                self.vdr[usize::from(m.vdr_rpu_id)] = Some(Arc::clone(&arc));
                Some(arc)
            }
        };
        match p.color {
            Some(c) => {
                if self.dm.as_deref() != Some(&c) {
                    self.dm = Some(Arc::new(c));
                }
                self.color = self.dm.clone();
            }
            None => self.color = Some(Arc::clone(&DEFAULT_COLOR)),
        }
        self.ext_blocks = match p.ext {
            Some(t) if self.ext_blocks.as_deref() == Some(&t) => self.ext_blocks.take(),
            Some(t) => Some(Arc::new(t)),
            None => None,
        };
    }

    /// Decode everything between the prefix and the CRC. Returns `None` for
    /// RPU types that are skipped.
    fn decode_payload(&self, payload: &[u8], err: ErrorRecognition) -> Result<Option<Parsed>, RpuError> {
        let mut r = RpuReader::new(payload);

        let rpu_type = r.bits(6)? as u8;
        if rpu_type != 2 {
            log::warn!("[{}] unrecognized RPU type {rpu_type}, ignoring", self.name);
            return Ok(None);
        }
        let header = read_header(&mut r, rpu_type)?;

        let vdr_dm_metadata_present = r.bit()?;
        let use_prev_vdr_rpu = r.bit()?;
        let use_nlq = header.uses_nlq();
        let compression = self.cfg.dv_md_compression != Compression::None;

        let profile = match self.cfg.dv_profile {
            0 => guess_profile_hevc(&header),
            p => p,
        };
        if profile == 5 && use_nlq {
            return Err(RpuError::invalid("profile 5 RPUs should not use NLQ"));
        }
        if err.compliance_checks() && profile < 8 && compression {
            return Err(RpuError::invalid(format!(
                "profile {profile} RPUs should not use metadata compression"
            )));
        }
        let dm_compression = compression && use_prev_vdr_rpu;

        let mapping = if use_prev_vdr_rpu {
            let id = validate("prev_vdr_rpu_id", r.ue32()?, 0, u32::from(MAX_DM_ID))? as u8;
            match &self.vdr[usize::from(id)] {
                Some(m) => MappingUpdate::Reuse(Some(Arc::clone(m))),
                None if err.explode() => return Err(RpuError::UnknownMappingId(id)),
                None => {
                    log::warn!("[{}] unknown previous RPU ID {id}", self.name);
                    MappingUpdate::Reuse(None)
                }
            }
        } else {
            let id = validate("vdr_rpu_id", r.ue32()?, 0, u32::from(MAX_DM_ID))? as u8;
            MappingUpdate::New(read_mapping(&mut r, &header, id, use_nlq)?)
        };

        let (color, ext) = if vdr_dm_metadata_present {
            let color = self.read_color(&mut r, profile, dm_compression)?;
            let ext = self.read_ext_lists(&mut r, err, dm_compression)?;
            (Some(color), Some(ext))
        } else {
            (None, None)
        };

        if err.contains(ErrorRecognition::BUFFER) {
            r.align();
            let left = r.bits_left();
            if left != TRAILER_BITS {
                if err.explode() {
                    return Err(RpuError::invalid(format!(
                        "{} unexpected bits before RPU trailer",
                        left as i64 - TRAILER_BITS as i64
                    )));
                }
                log::warn!("[{}] {left} bits left before RPU trailer", self.name);
            }
        }

        log::debug!(
            "[{}] parsed RPU: profile {profile}, mapping {}, dm {}, {} ext blocks",
            self.name,
            match &mapping {
                MappingUpdate::New(m) => format!("new #{}", m.vdr_rpu_id),
                MappingUpdate::Reuse(Some(m)) => format!("reused #{}", m.vdr_rpu_id),
                MappingUpdate::Reuse(None) => "none".to_string(),
            },
            vdr_dm_metadata_present,
            ext.as_ref().map_or(0, ExtBlockTable::len),
        );

        Ok(Some(Parsed {
            header,
            mapping,
            color,
            ext,
        }))
    }

    fn read_color(
        &self,
        r: &mut RpuReader<'_>,
        profile: u8,
        dm_compression: bool,
    ) -> Result<ColorMetadata, RpuError> {
        let affected_dm_id = validate("affected_dm_metadata_id", r.ue32()?, 0, u32::from(MAX_DM_ID))?;
        let current_dm_id = validate("current_dm_metadata_id", r.ue32()?, 0, u32::from(MAX_DM_ID))?;
        if affected_dm_id != current_dm_id {
            return Err(RpuError::Unsupported(format!(
                "affected/current DM id mismatch ({affected_dm_id} != {current_dm_id})"
            )));
        }
        let scene_refresh_flag = r.ue32()?;

        let mut color = if dm_compression {
            match self.dm.as_deref() {
                Some(prev) => *prev,
                None => {
                    log::warn!("[{}] compressed RPU without previous colour metadata", self.name);
                    COLOR_DEFAULT
                }
            }
        } else {
            read_level0(r, profile)?
        };
        color.dm_metadata_id = affected_dm_id as u8;
        color.scene_refresh_flag = scene_refresh_flag.min(u32::from(u8::MAX)) as u8;
        Ok(color)
    }

    fn read_ext_lists(
        &self,
        r: &mut RpuReader<'_>,
        err: ErrorRecognition,
        dm_compression: bool,
    ) -> Result<ExtBlockTable, RpuError> {
        let mut table = ExtBlockTable::new();
        if dm_compression {
            for block in self.ext_blocks.iter().flat_map(|t| t.static_blocks()) {
                table.push(*block)?;
            }
        }

        let num_v1 = r.ue()?;
        r.align();
        for _ in 0..num_v1 {
            self.read_ext_block(r, ExtVersion::V1, &mut table, err, dm_compression)?;
        }

        // padding + CRC32 + terminator
        if r.bits_left() > 48 {
            let num_v2 = r.ue()?;
            r.align();
            for _ in 0..num_v2 {
                self.read_ext_block(r, ExtVersion::V2, &mut table, err, dm_compression)?;
            }
        }
        Ok(table)
    }

    fn read_ext_block(
        &self,
        r: &mut RpuReader<'_>,
        version: ExtVersion,
        table: &mut ExtBlockTable,
        err: ErrorRecognition,
        dm_compression: bool,
    ) -> Result<(), RpuError> {
        let len = r.ue()?;
        let level = r.bits(8)? as u8;
        let len_bits = len
            .checked_mul(8)
            .filter(|&bits| bits <= r.bits_left())
            .ok_or_else(|| {
                RpuError::invalid(format!("extension block length {len} exceeds payload"))
            })?;

        if dm_compression && crate::metadata::is_static_level(level) {
            log::warn!(
                "[{}] compressed DM RPU contains static extension block level {level}",
                self.name
            );
            if err.intersects(ErrorRecognition::AGGRESSIVE | ErrorRecognition::EXPLODE) {
                return Err(RpuError::invalid(format!(
                    "static extension block level {level} in compressed RPU"
                )));
            }
            return r.skip(len_bits);
        }

        let start = r.bits_read();
        let block = DmData::read_payload(r, version, level, len)?;
        if let DmData::Unknown(level) = block {
            if err.contains(ErrorRecognition::BITSTREAM | ErrorRecognition::EXPLODE) {
                return Err(RpuError::invalid(format!(
                    "unknown Dolby Vision DM {version:?} level {level}"
                )));
            }
            log::warn!(
                "[{}] unknown Dolby Vision DM {version:?} level {level}",
                self.name
            );
        }
        table.push(block)?;

        let parsed = r.bits_read() - start;
        if parsed > len_bits {
            return Err(RpuError::invalid(format!(
                "parsed {parsed} bits of extension block level {level}, declared {len_bits}"
            )));
        }
        r.skip(len_bits - parsed)
    }
}

fn read_header(r: &mut RpuReader<'_>, rpu_type: u8) -> Result<RpuHeader, RpuError> {
    let mut hdr = RpuHeader {
        rpu_type,
        rpu_format: r.bits(11)? as u16,
        vdr_rpu_profile: r.bits(4)? as u8,
        vdr_rpu_level: r.bits(4)? as u8,
        ..Default::default()
    };

    if !r.bit()? {
        return Err(RpuError::Unsupported(
            "RPU without sequence info".to_string(),
        ));
    }
    hdr.chroma_resampling_explicit_filter_flag = r.bit()?;
    let coef_data_type = validate("coef_data_type", r.bits(2)?, 0, 1)?;
    hdr.coef_data_type = CoefDataType::from_bits(coef_data_type).unwrap_or_default();
    hdr.coef_log2_denom = match hdr.coef_data_type {
        CoefDataType::Fixed => validate("coef_log2_denom", r.ue32()?, 13, 32)? as u8,
        CoefDataType::Float => 32,
    };
    hdr.vdr_rpu_normalized_idc = r.bits(2)? as u8;
    hdr.bl_video_full_range_flag = r.bit()?;

    if hdr.rpu_format & 0x700 != 0 {
        return Err(RpuError::Unsupported(format!(
            "RPU format {:#x}",
            hdr.rpu_format
        )));
    }

    let bl_bit_depth_minus8 = validate("bl_bit_depth_minus8", r.ue32()?, 0, 8)?;
    let el = r.ue32()?;
    let ext_mapping_idc = validate("ext_mapping_idc", el >> 8, 0, 0xFF)?;
    let el_bit_depth_minus8 = validate("el_bit_depth_minus8", el & 0xFF, 0, 8)?;
    let vdr_bit_depth_minus8 = validate("vdr_bit_depth_minus8", r.ue32()?, 0, 8)?;
    hdr.bl_bit_depth = bl_bit_depth_minus8 as u8 + 8;
    hdr.el_bit_depth = el_bit_depth_minus8 as u8 + 8;
    hdr.vdr_bit_depth = vdr_bit_depth_minus8 as u8 + 8;
    hdr.ext_mapping_idc_0_4 = (ext_mapping_idc & 0x1f) as u8;
    hdr.ext_mapping_idc_5_7 = (ext_mapping_idc >> 5) as u8;

    hdr.spatial_resampling_filter_flag = r.bit()?;
    validate("reserved_zero_3bits", r.bits(3)?, 0, 0)?;
    hdr.el_spatial_resampling_filter_flag = r.bit()?;
    hdr.disable_residual_flag = r.bit()?;
    Ok(hdr)
}

fn read_mapping(
    r: &mut RpuReader<'_>,
    hdr: &RpuHeader,
    vdr_rpu_id: u8,
    use_nlq: bool,
) -> Result<DataMapping, RpuError> {
    let bl_depth = u32::from(hdr.bl_bit_depth);
    let mut m = DataMapping {
        vdr_rpu_id,
        mapping_color_space: r.ue32()?.min(u32::from(u8::MAX)) as u8,
        mapping_chroma_format_idc: r.ue32()?.min(u32::from(u8::MAX)) as u8,
        ..Default::default()
    };

    for curve in &mut m.curves {
        let num_pivots_minus2 =
            validate("num_pivots_minus2", r.ue32()?, 0, MAX_PIECES as u32 - 1)?;
        curve.num_pivots = num_pivots_minus2 as u8 + 2;
        let mut pivot = 0u32;
        for p in curve.pivots.iter_mut().take(usize::from(curve.num_pivots)) {
            pivot = pivot.saturating_add(r.bits(bl_depth)?);
            *p = pivot.min(u32::from(u16::MAX)) as u16;
        }
    }

    if use_nlq {
        validate("nlq_method_idc", r.bits(3)?, 0, 0)?;
        m.nlq_method = NlqMethod::LinearDeadzone;
        let mut pivot = 0u32;
        for p in &mut m.nlq_pivots {
            pivot = pivot.saturating_add(r.bits(bl_depth)?);
            *p = pivot.min(u32::from(u16::MAX)) as u16;
        }
    }

    m.num_x_partitions = r.ue32()?.saturating_add(1);
    m.num_y_partitions = r.ue32()?.saturating_add(1);

    for curve in &mut m.curves {
        for i in 0..curve.pieces() {
            let idc = validate("mapping_idc", r.ue32()?, 0, 1)?;
            curve.mapping_idc[i] = MappingMethod::from_idc(idc).unwrap_or_default();
            match curve.mapping_idc[i] {
                MappingMethod::Polynomial => {
                    let order_minus1 = validate("poly_order_minus1", r.ue32()?, 0, 1)?;
                    curve.poly_order[i] = order_minus1 as u8 + 1;
                    if order_minus1 == 0 && r.bit()? {
                        return Err(RpuError::Unsupported(
                            "polynomial linear interpolation".to_string(),
                        ));
                    }
                    for k in 0..=usize::from(curve.poly_order[i]) {
                        curve.poly_coef[i][k] = read_se_coef(r, hdr)?;
                    }
                }
                MappingMethod::Mmr => {
                    let order_minus1 = validate("mmr_order_minus1", r.bits(2)?, 0, 2)?;
                    curve.mmr_order[i] = order_minus1 as u8 + 1;
                    curve.mmr_constant[i] = read_se_coef(r, hdr)?;
                    for j in 0..usize::from(curve.mmr_order[i]) {
                        for k in 0..7 {
                            curve.mmr_coef[i][j][k] = read_se_coef(r, hdr)?;
                        }
                    }
                }
            }
        }
    }

    if use_nlq {
        for nlq in &mut m.nlq {
            nlq.nlq_offset = r.bits(u32::from(hdr.el_bit_depth))? as u16;
            nlq.vdr_in_max = read_ue_coef(r, hdr)?;
            nlq.linear_deadzone_slope = read_ue_coef(r, hdr)?;
            nlq.linear_deadzone_threshold = read_ue_coef(r, hdr)?;
        }
    }
    Ok(m)
}

fn read_level0(r: &mut RpuReader<'_>, profile: u8) -> Result<ColorMetadata, RpuError> {
    let mut color = COLOR_DEFAULT;
    for v in &mut color.ycc_to_rgb_matrix {
        *v = Rational::new(r.sbits(16)?, 1 << 13);
    }
    let denom = ColorMetadata::offset_denom(profile);
    for v in &mut color.ycc_to_rgb_offset {
        let mut offset = i64::from(r.bits(32)?);
        let mut den = denom;
        if offset > i64::from(i32::MAX) {
            offset >>= 1;
            den >>= 1;
        }
        *v = Rational::new(offset as i32, den as i32);
    }
    for v in &mut color.rgb_to_lms_matrix {
        *v = Rational::new(r.sbits(16)?, 1 << 14);
    }
    color.signal_eotf = r.bits(16)? as u16;
    color.signal_eotf_param0 = r.bits(16)? as u16;
    color.signal_eotf_param1 = r.bits(16)? as u16;
    color.signal_eotf_param2 = r.bits(32)?;
    color.signal_bit_depth = validate("signal_bit_depth", r.bits(5)?, 8, 16)? as u8;
    color.signal_color_space = r.bits(2)? as u8;
    color.signal_chroma_format = r.bits(2)? as u8;
    color.signal_full_range_flag = r.bits(2)? as u8;
    color.source_min_pq = r.bits(12)? as u16;
    color.source_max_pq = r.bits(12)? as u16;
    color.source_diagonal = r.bits(10)? as u16;
    Ok(color)
}

fn coef_overflow() -> RpuError {
    RpuError::invalid("mapping coefficient overflows")
}

fn read_se_coef(r: &mut RpuReader<'_>, hdr: &RpuHeader) -> Result<i64, RpuError> {
    let denom = u32::from(hdr.coef_log2_denom);
    match hdr.coef_data_type {
        CoefDataType::Fixed => {
            let ipart = r.se()?;
            let fpart = i64::from(r.bits(denom)?);
            ipart
                .checked_mul(1i64 << denom)
                .and_then(|v| v.checked_add(fpart))
                .ok_or_else(coef_overflow)
        }
        CoefDataType::Float => {
            let f = f32::from_bits(r.bits(32)?);
            Ok((f64::from(f) * (1u64 << denom) as f64) as i64)
        }
    }
}

fn read_ue_coef(r: &mut RpuReader<'_>, hdr: &RpuHeader) -> Result<u64, RpuError> {
    let denom = u32::from(hdr.coef_log2_denom);
    match hdr.coef_data_type {
        CoefDataType::Fixed => {
            let ipart = r.ue()?;
            let fpart = u64::from(r.bits(denom)?);
            ipart
                .checked_mul(1u64 << denom)
                .and_then(|v| v.checked_add(fpart))
                .ok_or_else(coef_overflow)
        }
        CoefDataType::Float => {
            let f = f32::from_bits(r.bits(32)?);
            Ok((f64::from(f) * (1u64 << denom) as f64) as u64)
        }
    }
}
