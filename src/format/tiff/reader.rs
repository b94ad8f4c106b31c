//! Building the component tree from a TIFF buffer.
//!
//! The reader walks IFD chains, sub-IFD pointers and makernotes, turning
//! every 12-byte entry into the node kind the schema designates for it.
//! Binary arrays are exploded in a second pass once the whole tree exists,
//! because their selectors and ciphers may look at tags parsed later.
//!
//! # Error policy
//!
//! - A bad header or root offset aborts the parse
//! - A value outside the buffer, or one that overlaps its own entry record,
//!   aborts the parse when `strict_offsets` is set and skips the entry otherwise
//! - Anything else (loops, depth, malformed makernotes or arrays) only
//!   degrades the affected branch and is logged

use std::collections::HashSet;

use bytes::Bytes;
use tracing::{debug, warn};

use super::component::{Component, Node};
use super::makernote::{Makernote, MakernoteKind};
use super::parser::{TiffHeader, TIFF_HEADER_SIZE};
use super::schema;
use super::tags::{tag, ExtTag, FieldType, Group};
use crate::config::EngineConfig;
use crate::error::TiffError;
use crate::io::ByteOrder;

/// Size of one directory entry record.
pub const ENTRY_SIZE: usize = 12;

/// Most entries accepted in a single directory.
pub const MAX_DIRECTORY_ENTRIES: usize = 256;

/// Parse the header and the complete tree of `data`.
pub fn read_tree(data: &Bytes, config: &EngineConfig) -> Result<(TiffHeader, Component), TiffError> {
    let header = TiffHeader::parse(data)?;
    let root = TreeReader::new(data, config).read(&header)?;
    Ok((header, root))
}

// =============================================================================
// TreeReader
// =============================================================================

/// Position context of the structure being read.
#[derive(Debug, Clone, Copy)]
struct Frame {
    byte_order: ByteOrder,
    /// Absolute position offsets are relative to
    base: usize,
    depth: usize,
}

/// One pass over a buffer. Not reusable.
pub struct TreeReader<'a> {
    data: &'a Bytes,
    config: &'a EngineConfig,
    visited: HashSet<usize>,
    make: Option<String>,
}

impl<'a> TreeReader<'a> {
    pub fn new(data: &'a Bytes, config: &'a EngineConfig) -> Self {
        Self {
            data,
            config,
            visited: HashSet::new(),
            make: None,
        }
    }

    /// Read the tree whose first IFD `header` points to.
    pub fn read(mut self, header: &TiffHeader) -> Result<Component, TiffError> {
        let ifd0 = header.ifd0_offset as usize;
        if ifd0 < TIFF_HEADER_SIZE || ifd0.saturating_add(2) > self.data.len() {
            return Err(TiffError::InvalidIfdOffset(u64::from(header.ifd0_offset)));
        }

        let mut root = schema::create(ExtTag::Root, Group::None);
        let frame = Frame {
            byte_order: header.byte_order,
            base: 0,
            depth: 0,
        };
        self.read_directory(&mut root, ifd0, frame)?;
        explode_arrays(&mut root);
        Ok(root)
    }

    // =========================================================================
    // Directories
    // =========================================================================

    fn read_directory(
        &mut self,
        dir: &mut Component,
        pos: usize,
        frame: Frame,
    ) -> Result<(), TiffError> {
        if frame.depth >= self.config.max_depth {
            return Err(TiffError::Corrupted(format!(
                "directory {} nested deeper than {}",
                dir.group, self.config.max_depth
            )));
        }
        if !self.visited.insert(pos) {
            return Err(TiffError::Corrupted(format!(
                "directory {} at {pos} already visited",
                dir.group
            )));
        }

        let bo = frame.byte_order;
        let count = bo.get_u16(self.data, pos).ok_or_else(|| {
            TiffError::Corrupted(format!("directory {} at {pos} outside buffer", dir.group))
        })? as usize;
        if count > MAX_DIRECTORY_ENTRIES {
            return Err(TiffError::Corrupted(format!(
                "directory {} claims {count} entries",
                dir.group
            )));
        }
        debug!(group = %dir.group, pos, count, "Reading directory");

        let group = dir.group;
        let mut children = Vec::with_capacity(count);
        for i in 0..count {
            let record_pos = pos + 2 + i * ENTRY_SIZE;
            if record_pos + ENTRY_SIZE > self.data.len() {
                warn!(group = %group, entry = i, "Directory truncated");
                break;
            }
            if let Some(child) = self.read_entry(group, record_pos, frame)? {
                children.push(child);
            }
        }
        self.load_strips(&mut children, frame);

        let next_pos = pos + 2 + count * ENTRY_SIZE;
        let Node::Directory(d) = &mut dir.node else {
            return Err(TiffError::NotSupported("expected a directory"));
        };
        d.children = children;
        if !d.has_next {
            return Ok(());
        }

        let next_offset = bo.get_u32(self.data, next_pos).unwrap_or(0);
        if next_offset == 0 {
            return Ok(());
        }
        let Some(next_group) = schema::next_group(group) else {
            debug!(group = %group, next_offset, "Ignoring next directory link");
            return Ok(());
        };

        let mut next = Component::directory(0, next_group, true);
        let next_abs = frame.base.saturating_add(next_offset as usize);
        match self.read_directory(&mut next, next_abs, frame) {
            Ok(()) => {
                d.next = Some(Box::new(next));
                Ok(())
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!(group = %next_group, error = %e, "Skipping next directory");
                Ok(())
            }
        }
    }

    // =========================================================================
    // Entries
    // =========================================================================

    fn read_entry(
        &mut self,
        group: Group,
        record_pos: usize,
        frame: Frame,
    ) -> Result<Option<Component>, TiffError> {
        let bo = frame.byte_order;
        let record = &self.data[record_pos..record_pos + ENTRY_SIZE];
        let tag = bo.read_u16(&record[0..2]);
        let type_id = bo.read_u16(&record[2..4]);
        let count = bo.read_u32(&record[4..8]);

        let Some(field_type) = FieldType::from_u16(type_id) else {
            warn!(group = %group, tag, type_id, "Skipping entry of unknown type");
            return Ok(None);
        };
        let Some(size) = (count as usize).checked_mul(field_type.size_in_bytes()) else {
            return self.reject(group, tag, u64::from(count), "count overflows");
        };

        let value_pos = if size <= FieldType::INLINE_THRESHOLD {
            record_pos + 8
        } else {
            let offset = bo.read_u32(&record[8..12]) as usize;
            let abs = frame.base.saturating_add(offset);
            if abs.checked_add(size).map_or(true, |end| end > self.data.len()) {
                return self.reject(group, tag, abs as u64, "value outside buffer");
            }
            if abs < record_pos + ENTRY_SIZE && abs + size > record_pos {
                return self.reject(group, tag, abs as u64, "value overlaps its entry");
            }
            abs
        };

        let mut component = schema::create(ExtTag::Tag(tag), group);
        if let Some(base) = component.base_mut() {
            base.type_id = type_id;
            base.count = count;
            base.data = self.data.slice(value_pos..value_pos + size);
            base.record_pos = Some(record_pos);
            base.value_pos = Some(value_pos);
            base.byte_order = bo;
        }

        if tag == tag::MAKE && group == Group::Ifd0 {
            self.make = component.value().and_then(|v| v.as_str().map(str::to_string));
        }

        if matches!(component.node, Node::SubIfd(_)) {
            self.read_sub_ifds(&mut component, frame)?;
        } else if matches!(component.node, Node::MakerNote(_)) {
            self.read_makernote(&mut component, frame);
        }
        Ok(Some(component))
    }

    /// Out-of-range value: fatal in strict mode, skipped otherwise.
    fn reject(
        &self,
        group: Group,
        tag: u16,
        offset: u64,
        reason: &'static str,
    ) -> Result<Option<Component>, TiffError> {
        if self.config.strict_offsets {
            return Err(TiffError::OffsetOutOfRange {
                offset,
                size: self.data.len() as u64,
                reason,
            });
        }
        warn!(group = %group, tag, offset, reason, "Skipping entry");
        Ok(None)
    }

    fn read_sub_ifds(&mut self, component: &mut Component, frame: Frame) -> Result<(), TiffError> {
        let tag = component.tag;
        let Node::SubIfd(sub) = &mut component.node else {
            return Ok(());
        };
        let bo = sub.base.byte_order;
        let offsets: Vec<u32> = sub
            .base
            .data
            .chunks_exact(4)
            .map(|c| bo.read_u32(c))
            .take(self.config.max_sub_ifds)
            .collect();

        let child_frame = Frame {
            depth: frame.depth + 1,
            ..frame
        };
        for (i, offset) in offsets.into_iter().enumerate() {
            let Some(group) = sub.group_for(i) else {
                break;
            };
            let mut dir = Component::directory(tag, group, true);
            let abs = frame.base.saturating_add(offset as usize);
            match self.read_directory(&mut dir, abs, child_frame) {
                Ok(()) => sub.ifds.push(dir),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => warn!(group = %group, error = %e, "Skipping sub-IFD"),
            }
        }
        Ok(())
    }

    /// Parse the makernote if the camera make is known. Any failure keeps
    /// the value opaque.
    fn read_makernote(&mut self, component: &mut Component, frame: Frame) {
        let tag = component.tag;
        let Node::MakerNote(entry) = &mut component.node else {
            return;
        };
        let Some(kind) = self.make.as_deref().and_then(MakernoteKind::from_make) else {
            debug!(make = ?self.make, "No makernote parser for this make");
            return;
        };
        let (Some(value_pos), size) = (entry.base.value_pos, entry.base.data.len()) else {
            return;
        };

        let layout = match Makernote::locate(
            kind,
            self.data,
            value_pos,
            size,
            frame.byte_order,
            frame.base,
        ) {
            Ok(layout) => layout,
            Err(e) => {
                warn!(?kind, error = %e, "Keeping makernote raw");
                return;
            }
        };

        let mut mn = Makernote {
            kind,
            header: layout.header,
            byte_order: layout.byte_order,
            ifd: Component::directory(tag, kind.group(), kind.has_next()),
        };
        let mn_frame = Frame {
            byte_order: layout.byte_order,
            base: layout.base,
            depth: frame.depth + 1,
        };
        match self.read_directory(&mut mn.ifd, layout.ifd_pos, mn_frame) {
            Ok(()) => {
                entry.mn_group = Some(kind.group());
                entry.mn = Some(Box::new(mn));
            }
            Err(e) => warn!(?kind, error = %e, "Keeping makernote raw"),
        }
    }

    // =========================================================================
    // Image data
    // =========================================================================

    /// Attach the referenced data to every data entry of one directory.
    fn load_strips(&self, children: &mut [Component], frame: Frame) {
        let sizes: Vec<(u16, Vec<u32>)> = children
            .iter()
            .filter_map(|c| match &c.node {
                Node::Size(s) => Some((s.data_tag, integers(c))),
                _ => None,
            })
            .collect();

        for component in children.iter_mut() {
            let offsets = integers(component);
            let tag = component.tag;
            let group = component.group;
            let Node::Data(entry) = &mut component.node else {
                continue;
            };
            let Some((_, lengths)) = sizes.iter().find(|(data_tag, _)| *data_tag == tag) else {
                debug!(group = %group, tag, "Data entry without byte counts");
                continue;
            };
            if lengths.len() != offsets.len() {
                warn!(group = %group, tag, "Offset and byte count lists differ in length");
                continue;
            }

            let mut strips = Vec::with_capacity(offsets.len());
            for (offset, len) in offsets.iter().zip(lengths) {
                let start = frame.base.saturating_add(*offset as usize);
                let end = start.saturating_add(*len as usize);
                if end > self.data.len() {
                    warn!(group = %group, tag, start, end, "Image data outside buffer");
                    strips.clear();
                    break;
                }
                strips.push(self.data.slice(start..end));
            }
            entry.strips = strips;
        }
    }
}

fn integers(component: &Component) -> Vec<u32> {
    let Some(value) = component.value() else {
        return Vec::new();
    };
    (0..value.count()).map_while(|i| value.to_u32(i)).collect()
}

// =============================================================================
// Binary arrays
// =============================================================================

/// Explode every binary array of the tree.
///
/// Layouts and ciphers are resolved against the complete, unmodified tree
/// first; the results are applied in a second traversal in the same order.
pub fn explode_arrays(root: &mut Component) {
    let mut plans = Vec::new();
    {
        let tree: &Component = root;
        tree.visit(&mut |c| {
            if let Node::Array(arr) = &c.node {
                plans.push((c.tag, arr.prepare(c.tag, tree)));
            }
        });
    }

    let mut plans = plans.into_iter();
    root.visit_mut(&mut |c| {
        let Node::Array(arr) = &mut c.node else {
            return;
        };
        match plans.next() {
            Some((_, Ok((cfg, plain)))) => arr.explode(cfg, plain),
            Some((tag, Err(e))) => warn!(tag, group = %c.group, error = %e, "Keeping binary array raw"),
            None => {}
        }
    });
}

// =============================================================================
// Tests
// =============================================================================
