//! Metadata structures of camera image files.
//!
//! Two container families are supported:
//!
//! - **TIFF**: Exif, sub-IFDs, vendor makernotes and binary arrays. Used by
//!   Exif blocks and most raw formats.
//! - **CRW**: Canon's CIFF heap format.
//!
//! Both expose the same pipeline: parse bytes into a tree, decode the tree
//! into a [`MetadataBundle`](crate::metadata::MetadataBundle), and encode a
//! bundle back into bytes.

pub mod crw;
pub mod tiff;

pub use crw::CrwParser;
pub use tiff::{EncodeOutcome, TiffParser, WriteStrategy};
