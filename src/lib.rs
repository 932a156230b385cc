//! dovi-rpu: Dolby Vision RPU (reference processing unit) metadata.
//!
//! The crate provides:
//! - A stateful per-stream context (`RpuContext`) that parses RPUs, keeps the
//!   cross-frame caches the bitstream relies on, and generates RPUs back
//! - The metadata model (`metadata`) and the extension block table (`ext_table`)
//! - Container helpers for NAL units and ITU-T T.35 / EMDF (`wrap`)
//! - Encoder configuration from codec parameters (`configure`)
//!
//! # Quick Start
//!
//! ```no_run
//! use dovi_rpu::{ErrorRecognition, RpuContext, WrapFlags, wrap};
//!
//! # fn nal_unit() -> Vec<u8> { Vec::new() }
//! let mut ctx = RpuContext::new("stream0");
//! let rpu = wrap::unwrap_nal(&nal_unit()).unwrap();
//! ctx.parse(&rpu, ErrorRecognition::CRCCHECK).unwrap();
//!
//! if let Some(metadata) = ctx.get_metadata() {
//!     let mut encoder = RpuContext::new("out");
//!     encoder.set_config(*ctx.config());
//!     let nal = encoder.generate(Some(&metadata), WrapFlags::NAL).unwrap();
//!     assert!(!nal.is_empty());
//! }
//! ```

pub mod bitstream;
pub mod configure;
pub mod context;
pub mod error;
pub mod ext_table;
pub mod metadata;
pub mod wrap;

mod generate;
mod parse;

pub use configure::{
    CodecId, CodecParameters, ColorPrimaries, ColorSpace, ColorTransfer, Compliance, PixelFormat,
};
pub use context::{Enable, FrameSideData, MAX_DM_ID, RpuContext};
pub use error::{BlockKind, ErrorRecognition, RpuError};
pub use ext_table::ExtBlockTable;
pub use metadata::{ColorMetadata, Compression, DataMapping, DecoderConfig, DmData, Metadata, RpuHeader};
pub use wrap::WrapFlags;
