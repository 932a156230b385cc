// Per-stream Dolby Vision RPU state.
//
// The context owns a cache of up to 16 data mappings (one per `vdr_rpu_id`),
// the last transmitted level 0 colour block and the current extension block
// table. All three are shared through `Arc` and never mutated once published:
// a parse or generate builds replacements locally and swaps them in only on
// success, so views handed out before a call stay valid and a failed call
// leaves the context untouched.

use std::sync::{Arc, LazyLock};

use crate::error::RpuError;
use crate::ext_table::ExtBlockTable;
use crate::metadata::{
    COLOR_DEFAULT, ColorMetadata, DataMapping, DecoderConfig, Metadata, RpuHeader, guess_profile_hevc,
};

/// Highest mapping cache slot / DM metadata id.
pub const MAX_DM_ID: u8 = 15;

pub(crate) const NUM_SLOTS: usize = MAX_DM_ID as usize + 1;

pub(crate) static DEFAULT_COLOR: LazyLock<Arc<ColorMetadata>> =
    LazyLock::new(|| Arc::new(COLOR_DEFAULT));

/// Whether Dolby Vision metadata should be produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Enable {
    #[default]
    Disabled,
    Enabled,
    /// Enable when the input carries Dolby Vision metadata.
    Automatic,
}

/// Per-frame side data container the decoded metadata is attached to.
pub trait FrameSideData {
    fn attach_dovi_metadata(&mut self, metadata: Metadata) -> Result<(), RpuError>;
}

pub struct RpuContext {
    pub(crate) name: String,
    pub(crate) enable: Enable,
    pub(crate) cfg: DecoderConfig,
    pub(crate) header: RpuHeader,
    /// Active mapping, always one of the `vdr` slots.
    pub(crate) mapping: Option<Arc<DataMapping>>,
    /// Active colour block, either `dm` or the default.
    pub(crate) color: Option<Arc<ColorMetadata>>,
    pub(crate) ext_blocks: Option<Arc<ExtBlockTable>>,
    pub(crate) vdr: [Option<Arc<DataMapping>>; NUM_SLOTS],
    pub(crate) dm: Option<Arc<ColorMetadata>>,
    pub(crate) rpu_buf: Vec<u8>,
}

impl std::fmt::Debug for RpuContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpuContext")
            .field("name", &self.name)
            .field("enable", &self.enable)
            .field("cfg", &self.cfg)
            .field("header", &self.header)
            .field("cached_slots", &self.vdr.iter().filter(|s| s.is_some()).count())
            .field("has_metadata", &(self.mapping.is_some() && self.color.is_some()))
            .finish()
    }
}

impl Default for RpuContext {
    fn default() -> Self {
        Self::new("dovi")
    }
}

impl RpuContext {
    /// Create an empty context. `name` prefixes every log message.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enable: Enable::Disabled,
            cfg: DecoderConfig::default(),
            header: RpuHeader::default(),
            mapping: None,
            color: None,
            ext_blocks: None,
            vdr: Default::default(),
            dm: None,
            rpu_buf: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn enable(&self) -> Enable {
        self.enable
    }

    pub fn set_enable(&mut self, enable: Enable) {
        self.enable = enable;
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.cfg
    }

    /// Set the stream configuration, typically from a container's `dvcC`
    /// box before the first `parse`.
    pub fn set_config(&mut self, cfg: DecoderConfig) {
        self.cfg = cfg;
    }

    /// Configured profile, or the profile inferred from the active header
    /// of an HEVC stream. 0 when unknown.
    pub fn profile(&self) -> u8 {
        match self.cfg.dv_profile {
            0 => guess_profile_hevc(&self.header),
            p => p,
        }
    }

    pub fn header(&self) -> &RpuHeader {
        &self.header
    }

    pub fn mapping(&self) -> Option<&DataMapping> {
        self.mapping.as_deref()
    }

    pub fn color(&self) -> Option<&ColorMetadata> {
        self.color.as_deref()
    }

    pub fn ext_blocks(&self) -> Option<&ExtBlockTable> {
        self.ext_blocks.as_deref()
    }

    /// Cached mapping in slot `id`, if any.
    pub fn cached_mapping(&self, id: u8) -> Option<&DataMapping> {
        self.vdr.get(usize::from(id))?.as_deref()
    }

    /// Drop per-frame and cached state after a discontinuity. The stream
    /// configuration is kept.
    pub fn flush(&mut self) {
        self.header = RpuHeader::default();
        self.mapping = None;
        self.color = None;
        self.ext_blocks = None;
        self.vdr = Default::default();
        self.dm = None;
        log::trace!("[{}] flushed RPU state", self.name);
    }

    /// Reset everything except the log name.
    pub fn unref(&mut self) {
        self.flush();
        self.enable = Enable::Disabled;
        self.cfg = DecoderConfig::default();
        self.rpu_buf = Vec::new();
    }

    /// Share `other`'s state. Cached structures are reference counted, not
    /// copied.
    pub fn replace_from(&mut self, other: &Self) {
        self.enable = other.enable;
        self.cfg = other.cfg;
        self.header = other.header;
        self.mapping = other.mapping.clone();
        self.color = other.color.clone();
        self.ext_blocks = other.ext_blocks.clone();
        self.vdr = other.vdr.clone();
        self.dm = other.dm.clone();
    }

    /// Independent copy of the active metadata, or `None` when no complete
    /// RPU (mapping plus colour) is active.
    pub fn get_metadata(&self) -> Option<Metadata> {
        let mapping = self.mapping.as_deref()?;
        let color = self.color.as_deref()?;
        let ext_blocks = self
            .ext_blocks
            .as_deref()
            .map(|t| t.iter().copied().collect())
            .unwrap_or_default();
        Some(Metadata {
            header: self.header,
            mapping: *mapping,
            color: *color,
            ext_blocks,
        })
    }

    /// Attach the active metadata to `frame`. Returns `Ok(false)` without
    /// touching the frame when there is nothing to attach.
    pub fn attach_side_data<F: FrameSideData + ?Sized>(
        &self,
        frame: &mut F,
    ) -> Result<bool, RpuError> {
        match self.get_metadata() {
            Some(metadata) => {
                frame.attach_dovi_metadata(metadata)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{DmData, Level1};

    struct Frame(Vec<Metadata>);

    impl FrameSideData for Frame {
        fn attach_dovi_metadata(&mut self, metadata: Metadata) -> Result<(), RpuError> {
            self.0.push(metadata);
            Ok(())
        }
    }

    fn populated() -> RpuContext {
        let mut ctx = RpuContext::new("test");
        ctx.enable = Enable::Enabled;
        ctx.cfg.dv_profile = 8;
        ctx.cfg.dv_level = 6;
        ctx.header.rpu_type = 2;
        let mapping = Arc::new(DataMapping::identity(10, 23));
        ctx.vdr[0] = Some(mapping.clone());
        ctx.mapping = Some(mapping);
        ctx.dm = Some(Arc::new(COLOR_DEFAULT));
        ctx.color = ctx.dm.clone();
        let mut table = ExtBlockTable::new();
        table
            .push(DmData::Level1(Level1 {
                min_pq: 0,
                max_pq: 2000,
                avg_pq: 1000,
            }))
            .unwrap();
        ctx.ext_blocks = Some(Arc::new(table));
        ctx.rpu_buf = vec![0; 64];
        ctx
    }

    #[test]
    fn empty_context_has_no_metadata() {
        let ctx = RpuContext::new("empty");
        assert!(ctx.get_metadata().is_none());
        let mut frame = Frame(Vec::new());
        assert!(!ctx.attach_side_data(&mut frame).unwrap());
        assert!(frame.0.is_empty());
    }

    #[test]
    fn metadata_is_independent_copy() {
        let mut ctx = populated();
        let md = ctx.get_metadata().unwrap();
        ctx.flush();
        assert_eq!(md.mapping, DataMapping::identity(10, 23));
        assert_eq!(md.ext_blocks.len(), 1);
    }

    #[test]
    fn flush_keeps_configuration() {
        let mut ctx = populated();
        ctx.flush();
        assert_eq!(ctx.profile(), 8);
        assert_eq!(ctx.config().dv_level, 6);
        assert_eq!(ctx.enable(), Enable::Enabled);
        assert_eq!(*ctx.header(), RpuHeader::default());
        assert!(ctx.mapping().is_none());
        assert!(ctx.color().is_none());
        assert!(ctx.ext_blocks().is_none());
        assert!(ctx.cached_mapping(0).is_none());
    }

    #[test]
    fn unref_keeps_only_name() {
        let mut ctx = populated();
        ctx.unref();
        assert_eq!(ctx.name(), "test");
        assert_eq!(*ctx.config(), DecoderConfig::default());
        assert_eq!(ctx.enable(), Enable::Disabled);
        assert!(ctx.rpu_buf.capacity() == 0);
        assert!(ctx.get_metadata().is_none());
    }

    #[test]
    fn replace_shares_cached_state() {
        let src = populated();
        let mut dst = RpuContext::new("other");
        dst.replace_from(&src);
        assert_eq!(dst.name(), "other");
        assert_eq!(dst.profile(), 8);
        assert!(Arc::ptr_eq(
            dst.mapping.as_ref().unwrap(),
            src.mapping.as_ref().unwrap()
        ));
        assert!(Arc::ptr_eq(
            dst.ext_blocks.as_ref().unwrap(),
            src.ext_blocks.as_ref().unwrap()
        ));
        assert_eq!(dst.get_metadata(), src.get_metadata());
    }

    #[test]
    fn attach_delivers_metadata() {
        let ctx = populated();
        let mut frame = Frame(Vec::new());
        assert!(ctx.attach_side_data(&mut frame).unwrap());
        assert_eq!(frame.0.len(), 1);
        assert_eq!(frame.0[0].header.rpu_type, 2);
    }
}
