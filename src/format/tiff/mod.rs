//! TIFF-style metadata trees: Exif, makernotes and vendor binary arrays.
//!
//! # Key Concepts
//!
//! - **Byte order**: the header declares the endianness (II = little-endian,
//!   MM = big-endian). A Nikon makernote may declare its own.
//!
//! - **Component tree**: every IFD entry becomes a node identified by
//!   `(tag, group)`. Static schema tables decide which kind of node a tag
//!   becomes and where in the tree its group lives.
//!
//! - **Inline vs offset values**: values of up to four bytes are stored in the
//!   entry itself, larger values at an offset relative to the structure's base.
//!
//! - **Binary arrays**: opaque vendor blobs exploded into synthetic tags of
//!   their own group, possibly after deciphering.
//!
//! - **Write strategies**: changes are patched into the original buffer when
//!   they fit, otherwise the tree is rebuilt and serialized from scratch.

mod binary;
mod codec;
mod component;
mod decoder;
mod encoder;
mod makernote;
mod parser;
mod reader;
pub mod schema;
mod tags;
mod vendor;
mod writer;

pub use binary::{ArrayCfg, ArrayCipher, ArrayDef, ArrayLayout, ArraySet, BinaryArray, BinaryElement};
pub use codec::{EncodeOutcome, TiffParser, WriteStrategy};
pub use component::{Component, DataEntry, Directory, EntryBase, MnEntry, Node, SizeEntry, SubIfd};
pub use decoder::{decode_tree, find_rule, DecodeRule};
pub use encoder::{build_tree, encode_in_place, primary_groups, Copier, PatchOutcome};
pub use makernote::{Makernote, MakernoteKind};
pub use parser::{TiffHeader, TIFF_HEADER_SIZE, TIFF_MAGIC};
pub use reader::{explode_arrays, read_tree, ENTRY_SIZE, MAX_DIRECTORY_ENTRIES};
pub use tags::{tag, tag_by_name, tag_name, ExtTag, FieldType, Group};
pub use vendor::{nikon_ld_selector, sony_misc3_selector, NikonCipher, SonyCipher};
pub use writer::write_tree;
