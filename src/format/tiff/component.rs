//! The TIFF component tree.
//!
//! Every directory entry of a parsed TIFF structure becomes a [`Component`].
//! The set of node kinds is closed, so behavior is dispatched with a `match`
//! over [`Node`] rather than through trait objects:
//!
//! - [`Directory`] owns its entries and, optionally, the next IFD in a chain
//! - [`EntryBase`] is a plain tag with a value
//! - [`DataEntry`] / [`SizeEntry`] pair offsets to image data with their byte counts
//! - [`SubIfd`] points to one or more child directories
//! - [`MnEntry`] holds a vendor makernote
//! - [`BinaryArray`] / [`BinaryElement`] explode an opaque blob into sub-fields
//!
//! Value bytes are zero-copy [`Bytes`] views into the input buffer. A value
//! assigned after parsing is kept separately in [`EntryBase::edited`].

use bytes::Bytes;

use super::binary::{BinaryArray, BinaryElement};
use super::makernote::Makernote;
use super::schema::{self, TiffPath};
use super::tags::{ExtTag, FieldType, Group};
use crate::error::TiffError;
use crate::io::ByteOrder;
use crate::metadata::Value;

// =============================================================================
// EntryBase
// =============================================================================

/// State shared by every node that carries a value.
#[derive(Debug, Clone)]
pub struct EntryBase {
    /// TIFF type id as found on disk (may be unknown to us)
    pub type_id: u16,

    /// Number of values of `type_id`
    pub count: u32,

    /// Value bytes as parsed, a view into the input buffer
    pub data: Bytes,

    /// Value assigned after parsing, takes precedence over `data`
    pub edited: Option<Value>,

    /// Absolute position of the 12-byte entry record in the input buffer
    pub record_pos: Option<usize>,

    /// Absolute position of the value bytes in the input buffer
    pub value_pos: Option<usize>,

    /// Byte order the value bytes are encoded in
    pub byte_order: ByteOrder,
}

impl EntryBase {
    pub fn new(type_id: u16, byte_order: ByteOrder) -> Self {
        Self {
            type_id,
            count: 0,
            data: Bytes::new(),
            edited: None,
            record_pos: None,
            value_pos: None,
            byte_order,
        }
    }

    /// Field type of the value, unknown ids are treated as opaque bytes.
    pub fn field_type(&self) -> FieldType {
        match &self.edited {
            Some(value) => value.field_type(),
            None => FieldType::from_u16(self.type_id).unwrap_or(FieldType::Undefined),
        }
    }

    /// The current value, decoded from the raw bytes unless it was edited.
    pub fn value(&self) -> Value {
        match &self.edited {
            Some(value) => value.clone(),
            None => Value::from_bytes(self.field_type(), &self.data, self.byte_order),
        }
    }

    /// Assign a new value. Type and count follow the value.
    pub fn set_value(&mut self, value: Value) {
        self.type_id = value.field_type().as_u16();
        self.count = value.count() as u32;
        self.edited = Some(value);
    }

    /// Size of the value in bytes.
    pub fn size(&self) -> usize {
        match &self.edited {
            Some(value) => value.size(),
            None => self.data.len(),
        }
    }

    /// Value bytes encoded in `byte_order`.
    ///
    /// Unedited bytes are returned as parsed when the byte order matches and
    /// are re-encoded otherwise.
    pub fn bytes_in(&self, byte_order: ByteOrder) -> Vec<u8> {
        match &self.edited {
            Some(value) => value.to_bytes(byte_order),
            None if byte_order == self.byte_order => self.data.to_vec(),
            None => Value::from_bytes(self.field_type(), &self.data, self.byte_order)
                .to_bytes(byte_order),
        }
    }
}

// =============================================================================
// Node kinds
// =============================================================================

/// An IFD: entries plus an optional link to the next directory.
#[derive(Debug, Clone)]
pub struct Directory {
    pub children: Vec<Component>,
    pub next: Option<Box<Component>>,
    /// Whether the on-disk form carries a next-IFD pointer
    pub has_next: bool,
}

/// Offsets to image data (strips, tiles or an embedded JPEG).
#[derive(Debug, Clone)]
pub struct DataEntry {
    pub base: EntryBase,
    /// Tag of the sibling entry holding the byte counts
    pub size_tag: u16,
    /// The referenced data, one slice per offset
    pub strips: Vec<Bytes>,
}

impl DataEntry {
    /// All strips concatenated.
    pub fn data_area(&self) -> Vec<u8> {
        self.strips.iter().flat_map(|s| s.iter().copied()).collect()
    }
}

/// Byte counts belonging to a [`DataEntry`].
#[derive(Debug, Clone)]
pub struct SizeEntry {
    pub base: EntryBase,
    /// Tag of the sibling entry holding the offsets
    pub data_tag: u16,
}

/// An entry whose value is a list of offsets to child directories.
#[derive(Debug, Clone)]
pub struct SubIfd {
    pub base: EntryBase,
    /// Group of the first child directory
    pub new_group: Group,
    pub ifds: Vec<Component>,
}

impl SubIfd {
    /// Group of the child directory at `index`.
    ///
    /// Image sub-IFDs get consecutive groups, other pointers have exactly one.
    pub fn group_for(&self, index: usize) -> Option<Group> {
        if self.new_group == Group::SubImage1 {
            Group::sub_image(index + 1)
        } else if index == 0 {
            Some(self.new_group)
        } else {
            None
        }
    }
}

/// The makernote entry of the Exif IFD.
#[derive(Debug, Clone)]
pub struct MnEntry {
    pub base: EntryBase,
    /// Group of the vendor directory, once known
    pub mn_group: Option<Group>,
    /// Parsed makernote, `None` keeps the value opaque
    pub mn: Option<Box<Makernote>>,
}

/// Closed set of node kinds.
#[derive(Debug, Clone)]
pub enum Node {
    Directory(Directory),
    Entry(EntryBase),
    Data(DataEntry),
    Size(SizeEntry),
    SubIfd(SubIfd),
    MakerNote(MnEntry),
    Array(BinaryArray),
    Element(BinaryElement),
}

// =============================================================================
// Component
// =============================================================================

/// One node of the tree, identified by `(tag, group)`.
#[derive(Debug, Clone)]
pub struct Component {
    pub tag: u16,
    pub group: Group,
    pub node: Node,
}

impl Component {
    pub fn new(tag: u16, group: Group, node: Node) -> Self {
        Self { tag, group, node }
    }

    /// An empty directory.
    pub fn directory(tag: u16, group: Group, has_next: bool) -> Self {
        Self::new(
            tag,
            group,
            Node::Directory(Directory {
                children: Vec::new(),
                next: None,
                has_next,
            }),
        )
    }

    /// A plain entry holding `value`.
    pub fn entry(tag: u16, group: Group, value: Value, byte_order: ByteOrder) -> Self {
        let mut base = EntryBase::new(value.field_type().as_u16(), byte_order);
        base.set_value(value);
        Self::new(tag, group, Node::Entry(base))
    }

    pub fn is_directory(&self) -> bool {
        matches!(self.node, Node::Directory(_))
    }

    /// Entry state of value-carrying nodes.
    pub fn base(&self) -> Option<&EntryBase> {
        match &self.node {
            Node::Directory(_) => None,
            Node::Entry(base) => Some(base),
            Node::Data(d) => Some(&d.base),
            Node::Size(s) => Some(&s.base),
            Node::SubIfd(s) => Some(&s.base),
            Node::MakerNote(m) => Some(&m.base),
            Node::Array(a) => Some(&a.base),
            Node::Element(e) => Some(&e.base),
        }
    }

    pub fn base_mut(&mut self) -> Option<&mut EntryBase> {
        match &mut self.node {
            Node::Directory(_) => None,
            Node::Entry(base) => Some(base),
            Node::Data(d) => Some(&mut d.base),
            Node::Size(s) => Some(&mut s.base),
            Node::SubIfd(s) => Some(&mut s.base),
            Node::MakerNote(m) => Some(&mut m.base),
            Node::Array(a) => Some(&mut a.base),
            Node::Element(e) => Some(&mut e.base),
        }
    }

    /// Current value of a value-carrying node.
    pub fn value(&self) -> Option<Value> {
        self.base().map(EntryBase::value)
    }

    /// Direct descendants in traversal order.
    pub fn children(&self) -> Vec<&Component> {
        match &self.node {
            Node::Directory(dir) => dir
                .children
                .iter()
                .chain(dir.next.as_deref())
                .collect(),
            Node::SubIfd(sub) => sub.ifds.iter().collect(),
            Node::MakerNote(mn) => mn.mn.iter().map(|m| &m.ifd).collect(),
            Node::Array(arr) => arr.elements.iter().collect(),
            _ => Vec::new(),
        }
    }

    /// Direct descendants in the same order as [`Component::children`].
    pub fn children_mut(&mut self) -> Vec<&mut Component> {
        match &mut self.node {
            Node::Directory(dir) => dir
                .children
                .iter_mut()
                .chain(dir.next.as_deref_mut())
                .collect(),
            Node::SubIfd(sub) => sub.ifds.iter_mut().collect(),
            Node::MakerNote(mn) => mn.mn.iter_mut().map(|m| &mut m.ifd).collect(),
            Node::Array(arr) => arr.elements.iter_mut().collect(),
            _ => Vec::new(),
        }
    }

    /// Pre-order traversal.
    pub fn visit<'a>(&'a self, f: &mut dyn FnMut(&'a Component)) {
        f(self);
        for child in self.children() {
            child.visit(f);
        }
    }

    /// Pre-order traversal in the same order as [`Component::visit`].
    pub fn visit_mut(&mut self, f: &mut dyn FnMut(&mut Component)) {
        f(self);
        for child in self.children_mut() {
            child.visit_mut(f);
        }
    }

    /// Depth-first search for the first entry with `(tag, group)`.
    ///
    /// Directories are containers, not entries, and never match.
    pub fn find(&self, tag: u16, group: Group) -> Option<&Component> {
        if !self.is_directory() && self.tag == tag && self.group == group {
            return Some(self);
        }
        self.children()
            .into_iter()
            .find_map(|child| child.find(tag, group))
    }

    pub fn find_mut(&mut self, tag: u16, group: Group) -> Option<&mut Component> {
        if !self.is_directory() && self.tag == tag && self.group == group {
            return Some(self);
        }
        self.children_mut()
            .into_iter()
            .find_map(|child| child.find_mut(tag, group))
    }

    /// Append a child to a container node.
    pub fn add_child(&mut self, child: Component) -> Result<&mut Component, TiffError> {
        let list = match &mut self.node {
            Node::Directory(dir) => &mut dir.children,
            Node::SubIfd(sub) => {
                sub.base.count = sub.ifds.len() as u32 + 1;
                &mut sub.ifds
            }
            Node::Array(arr) => {
                arr.base.count = arr.elements.len() as u32 + 1;
                &mut arr.elements
            }
            _ => return Err(TiffError::NotSupported("add_child on a leaf entry")),
        };
        list.push(child);
        list.last_mut()
            .ok_or(TiffError::NotSupported("add_child on a leaf entry"))
    }

    /// Set the next directory of a directory that has a next-IFD link.
    pub fn add_next(&mut self, next: Component) -> Result<&mut Component, TiffError> {
        match &mut self.node {
            Node::Directory(dir) if dir.has_next => Ok(dir.next.insert(Box::new(next)).as_mut()),
            _ => Err(TiffError::NotSupported("add_next on a node without next link")),
        }
    }

    /// Whether this node is a container left without any content.
    pub fn is_prunable(&self) -> bool {
        match &self.node {
            Node::Directory(dir) => dir.children.is_empty() && dir.next.is_none(),
            Node::SubIfd(sub) => sub.ifds.is_empty(),
            Node::MakerNote(mn) => mn.mn.as_ref().is_some_and(|m| m.ifd.is_prunable()),
            Node::Array(arr) => arr.decoded && arr.elements.is_empty(),
            _ => false,
        }
    }

    // =========================================================================
    // Adding by path
    // =========================================================================

    /// Find or create the node at the end of `path`, creating missing
    /// intermediate directories on the way.
    ///
    /// The top of `path` must describe this node. `object`, if given, is used
    /// as the final node when it has to be created. Returns `None` when the
    /// final node would be a sub-IFD pointer without any directory below it.
    pub fn add_path(
        &mut self,
        tag: u16,
        path: &mut TiffPath,
        object: Option<Component>,
    ) -> Result<Option<&mut Component>, TiffError> {
        match self.node {
            Node::Directory(_) => self.add_path_directory(tag, path, object),
            Node::SubIfd(_) => self.add_path_sub_ifd(tag, path, object),
            Node::MakerNote(_) => self.add_path_makernote(tag, path, object),
            Node::Array(_) => self.add_path_array(tag, path, object),
            _ => {
                if path.len() > 1 {
                    return Err(TiffError::NotSupported("path continues below a leaf entry"));
                }
                Ok(Some(self))
            }
        }
    }

    fn add_path_directory(
        &mut self,
        tag: u16,
        path: &mut TiffPath,
        mut object: Option<Component>,
    ) -> Result<Option<&mut Component>, TiffError> {
        path.pop();
        let Some(item) = path.top() else {
            return Ok(Some(self));
        };
        let last = path.len() == 1;
        let Node::Directory(dir) = &mut self.node else {
            return Err(TiffError::NotSupported("expected a directory"));
        };

        if item.ext == ExtTag::Next {
            let next = dir
                .next
                .get_or_insert_with(|| Box::new(schema::create(ExtTag::Next, item.group)));
            return next.add_path(tag, path, object);
        }

        let ExtTag::Tag(item_tag) = item.ext else {
            return Err(TiffError::NotSupported("sentinel inside a path"));
        };
        let idx = match dir
            .children
            .iter()
            .position(|c| c.tag == item_tag && c.group == item.group)
        {
            Some(idx) => idx,
            None => {
                let child = match (last, object.take()) {
                    (true, Some(obj)) => obj,
                    (_, rest) => {
                        object = rest;
                        schema::create(item.ext, item.group)
                    }
                };
                if last && matches!(child.node, Node::SubIfd(_)) {
                    return Ok(None);
                }
                dir.children.push(child);
                dir.children.len() - 1
            }
        };
        dir.children[idx].add_path(tag, path, object)
    }

    fn add_path_sub_ifd(
        &mut self,
        tag: u16,
        path: &mut TiffPath,
        object: Option<Component>,
    ) -> Result<Option<&mut Component>, TiffError> {
        let Some(own) = path.pop() else {
            return Ok(Some(self));
        };
        let Some(below) = path.top() else {
            return Ok(Some(self));
        };
        path.push(own);
        let own_tag = own.ext.tag().unwrap_or(self.tag);
        let Node::SubIfd(sub) = &mut self.node else {
            return Err(TiffError::NotSupported("expected a sub-IFD entry"));
        };
        let idx = match sub.ifds.iter().position(|d| d.group == below.group) {
            Some(idx) => idx,
            None => {
                sub.ifds
                    .push(Component::directory(own_tag, below.group, true));
                sub.base.count = sub.ifds.len() as u32;
                sub.ifds.len() - 1
            }
        };
        sub.ifds[idx].add_path(tag, path, object)
    }

    fn add_path_makernote(
        &mut self,
        tag: u16,
        path: &mut TiffPath,
        object: Option<Component>,
    ) -> Result<Option<&mut Component>, TiffError> {
        let Some(own) = path.pop() else {
            return Ok(Some(self));
        };
        let Some(below) = path.top() else {
            path.push(own);
            return Ok(Some(self));
        };
        path.push(own);
        let Node::MakerNote(entry) = &mut self.node else {
            return Err(TiffError::NotSupported("expected a makernote entry"));
        };
        if entry.mn.is_none() {
            entry.mn_group = Some(below.group);
            entry.mn = Makernote::create(self.tag, below.group, entry.base.byte_order).map(Box::new);
        }
        match entry.mn.as_deref_mut() {
            Some(mn) => mn.ifd.add_path(tag, path, object),
            None => Err(TiffError::NotSupported("no makernote for this group")),
        }
    }

    fn add_path_array(
        &mut self,
        tag: u16,
        path: &mut TiffPath,
        mut object: Option<Component>,
    ) -> Result<Option<&mut Component>, TiffError> {
        if path.len() <= 1 {
            return Ok(Some(self));
        }
        path.pop();
        let Some(item) = path.top() else {
            return Ok(Some(self));
        };
        let last = path.len() == 1;
        let Node::Array(arr) = &mut self.node else {
            return Err(TiffError::NotSupported("expected a binary array"));
        };
        arr.initialize(item.group);
        let ExtTag::Tag(item_tag) = item.ext else {
            return Err(TiffError::NotSupported("sentinel inside a path"));
        };
        let idx = match arr
            .elements
            .iter()
            .position(|e| e.tag == item_tag && e.group == item.group)
        {
            Some(idx) => idx,
            None => {
                let element = match (last, object.take()) {
                    (true, Some(obj)) => obj,
                    (_, rest) => {
                        object = rest;
                        arr.create_element(item_tag)
                            .ok_or(TiffError::NotSupported("binary array has no layout"))?
                    }
                };
                arr.elements.push(element);
                arr.base.count = arr.elements.len() as u32;
                arr.decoded = true;
                arr.elements.len() - 1
            }
        };
        arr.elements[idx].add_path(tag, path, object)
    }

    // =========================================================================
    // Removing by path
    // =========================================================================

    /// Remove the entry `(tag, group)` below this root.
    ///
    /// Directories left empty by the removal are removed as well, up to but
    /// not including this node.
    pub fn remove(&mut self, tag: u16, group: Group) -> bool {
        let mut path = schema::tiff_path(tag, group);
        self.remove_path(&mut path)
    }

    /// Remove the node at the end of `path`. The top of `path` describes this
    /// node. Returns whether anything was removed.
    pub fn remove_path(&mut self, path: &mut TiffPath) -> bool {
        match &mut self.node {
            Node::Directory(dir) => {
                path.pop();
                let Some(item) = path.top() else {
                    return false;
                };
                if item.ext == ExtTag::Next {
                    let Some(next) = dir.next.as_deref_mut() else {
                        return false;
                    };
                    let removed = next.remove_path(path);
                    if removed && next.is_prunable() {
                        dir.next = None;
                    }
                    return removed;
                }
                let Some(idx) = dir
                    .children
                    .iter()
                    .position(|c| Some(c.tag) == item.ext.tag() && c.group == item.group)
                else {
                    return false;
                };
                if path.len() == 1 {
                    dir.children.remove(idx);
                    return true;
                }
                let removed = dir.children[idx].remove_path(path);
                if removed && dir.children[idx].is_prunable() {
                    dir.children.remove(idx);
                }
                removed
            }
            Node::SubIfd(sub) => {
                let Some(own) = path.pop() else {
                    return false;
                };
                let Some(below) = path.top() else {
                    return false;
                };
                path.push(own);
                let Some(idx) = sub.ifds.iter().position(|d| d.group == below.group) else {
                    return false;
                };
                let removed = sub.ifds[idx].remove_path(path);
                if removed && sub.ifds[idx].is_prunable() {
                    sub.ifds.remove(idx);
                    sub.base.count = sub.ifds.len() as u32;
                }
                removed
            }
            Node::MakerNote(entry) => {
                let Some(own) = path.pop() else {
                    return false;
                };
                if path.is_empty() {
                    return false;
                }
                path.push(own);
                match entry.mn.as_deref_mut() {
                    Some(mn) => mn.ifd.remove_path(path),
                    None => false,
                }
            }
            Node::Array(arr) => {
                path.pop();
                let Some(item) = path.top() else {
                    return false;
                };
                let Some(idx) = arr
                    .elements
                    .iter()
                    .position(|e| Some(e.tag) == item.ext.tag() && e.group == item.group)
                else {
                    return false;
                };
                arr.elements.remove(idx);
                arr.base.count = arr.elements.len() as u32;
                true
            }
            _ => false,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
