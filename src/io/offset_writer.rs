//! Deferred offset patching.
//!
//! Some offsets in a serialized tree (the pointer to the next IFD, strip and
//! thumbnail offsets) are only known once everything after them has been laid
//! out. The writer reserves the slot, records its position here, and the final
//! value is patched in after the main serialization pass.

use std::collections::BTreeMap;

use tracing::warn;

use super::endian::ByteOrder;

/// Identifies one deferred offset slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OffsetId {
    /// "Pointer to next IFD" field of the directory written at the given position
    NextIfd(usize),
    /// One element of a strip/tile/thumbnail offset array
    Strip { entry: usize, index: usize },
}

#[derive(Debug, Clone, Copy)]
struct OffsetSlot {
    origin: usize,
    target: Option<u32>,
    byte_order: ByteOrder,
}

/// Collects `(position, final value)` pairs and applies them to a buffer.
#[derive(Debug, Default)]
pub struct OffsetWriter {
    slots: BTreeMap<OffsetId, OffsetSlot>,
}

impl OffsetWriter {
    /// Create an empty offset writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the byte position of a 4-byte slot to patch later.
    pub fn set_origin(&mut self, id: OffsetId, origin: usize, byte_order: ByteOrder) {
        self.slots.insert(
            id,
            OffsetSlot {
                origin,
                target: None,
                byte_order,
            },
        );
    }

    /// Record the final value for a previously registered slot.
    ///
    /// Targets for unknown ids are ignored.
    pub fn set_target(&mut self, id: OffsetId, target: u32) {
        if let Some(slot) = self.slots.get_mut(&id) {
            slot.target = Some(target);
        }
    }

    /// Number of registered slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no slots are registered.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// The resolved `(position, value)` pairs, in slot order.
    pub fn resolved(&self) -> Vec<(usize, u32)> {
        self.slots
            .values()
            .filter_map(|slot| slot.target.map(|t| (slot.origin, t)))
            .collect()
    }

    /// Patch every resolved slot into `buf`.
    ///
    /// Slots without a target keep their placeholder bytes.
    pub fn write_offsets(&self, buf: &mut [u8]) {
        for (id, slot) in &self.slots {
            match slot.target {
                Some(target) => {
                    if !slot.byte_order.put_u32(buf, slot.origin, target) {
                        warn!(?id, origin = slot.origin, "Offset slot lies outside the output buffer");
                    }
                }
                None => warn!(?id, "Offset slot was never resolved"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_resolved_slots() {
        let mut buf = vec![0u8; 12];
        let mut writer = OffsetWriter::new();
        writer.set_origin(OffsetId::NextIfd(0), 2, ByteOrder::BigEndian);
        writer.set_origin(
            OffsetId::Strip { entry: 4, index: 0 },
            8,
            ByteOrder::LittleEndian,
        );
        writer.set_target(OffsetId::NextIfd(0), 0x0102_0304);
        writer.set_target(OffsetId::Strip { entry: 4, index: 0 }, 0x10);
        writer.write_offsets(&mut buf);

        assert_eq!(&buf[2..6], &[1, 2, 3, 4]);
        assert_eq!(&buf[8..12], &[0x10, 0, 0, 0]);
        assert_eq!(writer.len(), 2);
    }

    #[test]
    fn test_unresolved_slot_keeps_placeholder() {
        let mut buf = vec![0xAA; 4];
        let mut writer = OffsetWriter::new();
        writer.set_origin(OffsetId::NextIfd(0), 0, ByteOrder::BigEndian);
        writer.write_offsets(&mut buf);
        assert_eq!(buf, vec![0xAA; 4]);
        assert!(writer.resolved().is_empty());
    }

    #[test]
    fn test_unknown_target_ignored() {
        let mut writer = OffsetWriter::new();
        writer.set_target(OffsetId::NextIfd(7), 1);
        assert!(writer.is_empty());
    }
}
