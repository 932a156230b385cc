// Bit-level access to RPU payloads.
//
// - `reader`: MSB-first bit reader with Exp-Golomb and position tracking
// - `writer`: MSB-first bit writer with Exp-Golomb and alignment helpers
// - `crc`: CRC-32/MPEG-2 used to protect every RPU

pub mod crc;
pub mod reader;
pub mod writer;

pub use crc::crc32_mpeg2;
pub use reader::RpuReader;
pub use writer::RpuWriter;
