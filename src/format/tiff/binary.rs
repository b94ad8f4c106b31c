//! Binary arrays: opaque vendor blobs exploded into synthetic sub-tags.
//!
//! An [`ArrayCfg`] declares how a blob is laid out: the group its elements
//! live in, an optional byte order override, an optional cipher, whether the
//! first element holds the array size, and what to do with bytes no
//! [`ArrayDef`] covers. An [`ArraySet`] bundles alternative layouts for the
//! same tag together with a selector that picks one using context from the
//! already parsed tree.
//!
//! Decoding keeps the deciphered blob. Encoding overlays the elements onto
//! that blob, so bytes not covered by any element survive a round trip.

use std::fmt;

use bytes::Bytes;
use tracing::{debug, warn};

use super::component::{Component, EntryBase, Node};
use super::schema;
use super::tags::{ExtTag, FieldType, Group};
use crate::error::TiffError;
use crate::io::ByteOrder;

// =============================================================================
// Layout descriptions
// =============================================================================

/// One named field inside a binary array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayDef {
    /// Byte offset of the field from the start of the array
    pub idx: usize,
    pub field_type: FieldType,
    pub count: usize,
}

impl ArrayDef {
    pub const fn new(idx: usize, field_type: FieldType, count: usize) -> Self {
        Self {
            idx,
            field_type,
            count,
        }
    }

    /// Size of the field in bytes.
    pub const fn size(&self) -> usize {
        self.field_type.size_in_bytes() * self.count
    }
}

/// Reversible transformation of an array blob.
///
/// The whole tree is passed in so that keys can be derived from other tags.
pub trait ArrayCipher: Sync + fmt::Debug {
    fn decrypt(&self, tag: u16, data: &[u8], root: &Component) -> Option<Vec<u8>>;
    fn encrypt(&self, tag: u16, data: &[u8], root: &Component) -> Option<Vec<u8>>;
}

/// Layout of one binary array.
#[derive(Debug)]
pub struct ArrayCfg {
    /// Group of the decoded elements
    pub group: Group,
    /// Byte order of the elements, `None` inherits the parent's
    pub byte_order: Option<ByteOrder>,
    /// Element type, its size is the step between element tags
    pub el_type: FieldType,
    pub cipher: Option<&'static dyn ArrayCipher>,
    /// Whether the first element holds the size of the array in bytes
    pub has_size: bool,
    /// Whether bytes not covered by `defs` become elements
    pub emit_gaps: bool,
    /// Whether each run of uncovered bytes becomes a single element
    pub concat_gaps: bool,
    /// Layout of an uncovered element
    pub default_def: ArrayDef,
    /// Known fields, sorted by `idx`
    pub defs: &'static [ArrayDef],
}

impl ArrayCfg {
    /// Byte distance between two consecutive element tags.
    pub fn tag_step(&self) -> usize {
        self.el_type.size_in_bytes()
    }

    fn def_at(&self, idx: usize) -> Option<&ArrayDef> {
        self.defs.iter().find(|d| d.idx == idx)
    }

    /// Start of the next known field after `idx`, or `size`.
    fn next_def_after(&self, idx: usize, size: usize) -> usize {
        self.defs
            .iter()
            .map(|d| d.idx)
            .filter(|i| *i > idx)
            .min()
            .unwrap_or(size)
            .min(size)
    }
}

/// Picks an alternative of an [`ArraySet`] from the raw blob and the tree.
pub type Selector = fn(tag: u16, data: &[u8], root: &Component) -> Option<usize>;

/// Alternative layouts for one tag.
pub struct ArraySet {
    pub cfgs: &'static [&'static ArrayCfg],
    pub selector: Selector,
}

impl fmt::Debug for ArraySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArraySet")
            .field("groups", &self.cfgs.iter().map(|c| c.group).collect::<Vec<_>>())
            .finish()
    }
}

impl ArraySet {
    /// Index of the layout to use. The same input always gives the same answer.
    pub fn select(&self, tag: u16, data: &[u8], root: &Component) -> Option<usize> {
        (self.selector)(tag, data, root).filter(|i| *i < self.cfgs.len())
    }
}

/// Either one fixed layout or a set with a selector.
#[derive(Debug, Clone, Copy)]
pub enum ArrayLayout {
    Single(&'static ArrayCfg),
    Set(&'static ArraySet),
}

// =============================================================================
// BinaryElement
// =============================================================================

/// One field of a decoded binary array.
#[derive(Debug, Clone)]
pub struct BinaryElement {
    pub base: EntryBase,
    /// Byte offset inside the array
    pub idx: usize,
    pub def: ArrayDef,
}

impl BinaryElement {
    pub fn new(base: EntryBase) -> Self {
        Self {
            base,
            idx: 0,
            def: ArrayDef::new(0, FieldType::Undefined, 1),
        }
    }
}

// =============================================================================
// BinaryArray
// =============================================================================

/// An entry whose value is exploded into elements.
#[derive(Debug, Clone)]
pub struct BinaryArray {
    pub base: EntryBase,
    pub layout: ArrayLayout,
    /// The layout in use, fixed once chosen
    pub cfg: Option<&'static ArrayCfg>,
    /// Deciphered blob the elements were cut from
    pub plain: Option<Bytes>,
    pub elements: Vec<Component>,
    /// Whether `elements` replaces the raw value
    pub decoded: bool,
}

impl BinaryArray {
    pub fn new(base: EntryBase, layout: ArrayLayout) -> Self {
        let cfg = match layout {
            ArrayLayout::Single(cfg) => Some(cfg),
            ArrayLayout::Set(_) => None,
        };
        Self {
            base,
            layout,
            cfg,
            plain: None,
            elements: Vec::new(),
            decoded: false,
        }
    }

    /// Choose the layout whose elements belong to `group`.
    ///
    /// Used when elements are added without a parsed blob. A layout chosen
    /// earlier is kept.
    pub fn initialize(&mut self, group: Group) -> bool {
        if self.cfg.is_none() {
            if let ArrayLayout::Set(set) = self.layout {
                self.cfg = set.cfgs.iter().copied().find(|c| c.group == group);
            }
        }
        self.cfg.is_some_and(|c| c.group == group)
    }

    /// Pick the layout and decipher the raw value, without modifying the node.
    pub fn prepare(
        &self,
        tag: u16,
        root: &Component,
    ) -> Result<(&'static ArrayCfg, Vec<u8>), TiffError> {
        let data = &self.base.data;
        let cfg = match self.layout {
            ArrayLayout::Single(cfg) => cfg,
            ArrayLayout::Set(set) => {
                let index = set.select(tag, data, root).ok_or_else(|| {
                    TiffError::Corrupted(format!("no layout matches array 0x{tag:04x}"))
                })?;
                set.cfgs[index]
            }
        };
        if data.len() < cfg.tag_step().max(1) {
            return Err(TiffError::Corrupted(format!(
                "array 0x{tag:04x} too small: {} bytes",
                data.len()
            )));
        }
        let plain = match cfg.cipher {
            Some(cipher) => cipher.decrypt(tag, data, root).ok_or_else(|| {
                TiffError::Corrupted(format!("array 0x{tag:04x} could not be deciphered"))
            })?,
            None => data.to_vec(),
        };
        Ok((cfg, plain))
    }

    /// Cut `plain` into elements according to `cfg`.
    ///
    /// An array with more elements than tags can address is left raw.
    pub fn explode(&mut self, cfg: &'static ArrayCfg, plain: Vec<u8>) {
        let plain = Bytes::from(plain);
        let bo = cfg.byte_order.unwrap_or(self.base.byte_order);
        let size = plain.len();
        let step = cfg.tag_step().max(1);

        if cfg.has_size {
            if let Some(declared) = read_size_field(cfg, &plain, bo) {
                if declared != size {
                    debug!(declared, size, group = %cfg.group, "Array size field mismatch");
                }
            }
        }

        let mut elements = Vec::new();
        let mut idx = 0;
        while idx < size {
            let def = match cfg.def_at(idx) {
                Some(def) => *def,
                None if !cfg.emit_gaps => {
                    idx = cfg.next_def_after(idx, size);
                    continue;
                }
                None if cfg.concat_gaps => {
                    let gap = cfg.next_def_after(idx, size) - idx;
                    let unit = cfg.default_def.field_type.size_in_bytes();
                    if gap % unit == 0 {
                        ArrayDef::new(idx, cfg.default_def.field_type, gap / unit)
                    } else {
                        ArrayDef::new(idx, FieldType::Undefined, gap)
                    }
                }
                None => ArrayDef { idx, ..cfg.default_def },
            };

            let wanted = def.size().max(1);
            let available = size - idx;
            let (field_type, len) = if wanted <= available {
                (def.field_type, wanted)
            } else {
                warn!(
                    group = %cfg.group,
                    idx,
                    wanted,
                    available,
                    "Binary array element truncated, keeping raw bytes"
                );
                (FieldType::Undefined, available)
            };

            let Ok(tag) = u16::try_from(idx / step) else {
                warn!(group = %cfg.group, idx, "Binary array too large for element tags, keeping raw bytes");
                return;
            };
            let mut base = EntryBase::new(field_type.as_u16(), bo);
            base.count = (len / field_type.size_in_bytes()) as u32;
            base.data = plain.slice(idx..idx + len);
            elements.push(Component::new(
                tag,
                cfg.group,
                Node::Element(BinaryElement { base, idx, def }),
            ));
            idx += len;
        }

        self.cfg = Some(cfg);
        self.base.count = elements.len() as u32;
        self.elements = elements;
        self.plain = Some(plain);
        self.decoded = true;
    }

    /// A new element for `tag` laid out per the chosen layout.
    pub fn create_element(&self, tag: u16) -> Option<Component> {
        let cfg = self.cfg?;
        let idx = tag as usize * cfg.tag_step();
        let def = cfg
            .def_at(idx)
            .copied()
            .unwrap_or(ArrayDef { idx, ..cfg.default_def });
        let mut component = schema::create(ExtTag::Tag(tag), cfg.group);
        if let Node::Element(element) = &mut component.node {
            element.idx = idx;
            element.def = def;
            element.base.type_id = def.field_type.as_u16();
            element.base.count = def.count as u32;
            element.base.byte_order = cfg.byte_order.unwrap_or(self.base.byte_order);
        }
        Some(component)
    }

    /// Serialized value of the array.
    ///
    /// Elements are written over the blob they were decoded from, the size
    /// field is recomputed and the result enciphered again.
    pub fn encode(&self, tag: u16, byte_order: ByteOrder, root: &Component) -> Vec<u8> {
        let Some(cfg) = self.cfg.filter(|_| self.decoded) else {
            return self.base.bytes_in(byte_order);
        };
        let bo = cfg.byte_order.unwrap_or(byte_order);
        let mut buf = self.plain.as_ref().map(|p| p.to_vec()).unwrap_or_default();

        for component in &self.elements {
            let Node::Element(element) = &component.node else {
                continue;
            };
            let bytes = element.base.bytes_in(bo);
            let end = element.idx + bytes.len();
            if buf.len() < end {
                buf.resize(end, 0);
            }
            buf[element.idx..end].copy_from_slice(&bytes);
        }

        if cfg.has_size {
            write_size_field(cfg, &mut buf, bo);
        }

        match cfg.cipher {
            Some(cipher) => match cipher.encrypt(tag, &buf, root) {
                Some(encrypted) => encrypted,
                None => {
                    warn!(tag, "Binary array could not be enciphered, keeping original bytes");
                    self.base.data.to_vec()
                }
            },
            None => buf,
        }
    }
}

fn read_size_field(cfg: &ArrayCfg, data: &[u8], bo: ByteOrder) -> Option<usize> {
    match cfg.el_type.size_in_bytes() {
        2 => bo.get_u16(data, 0).map(usize::from),
        4 => bo.get_u32(data, 0).map(|v| v as usize),
        _ => data.first().map(|b| *b as usize),
    }
}

fn write_size_field(cfg: &ArrayCfg, buf: &mut [u8], bo: ByteOrder) {
    let len = buf.len();
    match cfg.el_type.size_in_bytes() {
        2 => {
            bo.put_u16(buf, 0, len.min(u16::MAX as usize) as u16);
        }
        4 => {
            bo.put_u32(buf, 0, len.min(u32::MAX as usize) as u32);
        }
        _ => {
            if let Some(first) = buf.first_mut() {
                *first = len.min(u8::MAX as usize) as u8;
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
