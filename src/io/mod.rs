mod endian;
mod offset_writer;

pub use endian::{
    read_u16_be, read_u16_le, read_u32_be, read_u32_le, read_u64_be, read_u64_le, ByteOrder,
};
pub use offset_writer::{OffsetId, OffsetWriter};
