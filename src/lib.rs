//! # rawmeta
//!
//! Reads and rewrites the metadata trees embedded in TIFF-based camera files
//! and Canon CRW files.
//!
//! A file is parsed into a tree of directories and entries, the tree is
//! decoded into generic Exif, IPTC and XMP collections, and an edited
//! collection is encoded back. Encoding patches the original bytes when every
//! change fits and rebuilds the structure otherwise.
//!
//! ## Architecture
//!
//! - [`io`] - byte order helpers and the offset writer
//! - [`mod@format`] - the TIFF and CRW tree engines
//! - [`metadata`] - keys, typed values and the metadata collections
//! - [`config`] - engine limits and the CLI
//! - [`error`] - error types of each layer
//!
//! ## Example
//!
//! ```rust,no_run
//! use rawmeta::{ExifKey, TiffParser, Value};
//!
//! let original = std::fs::read("photo.dng").unwrap();
//! let parser = TiffParser::default();
//!
//! let mut bundle = parser.decode(&original).unwrap();
//! let key: ExifKey = "Exif.Image.Artist".parse().unwrap();
//! bundle.exif.set(key, Value::Ascii("Jane Doe".into()));
//!
//! let outcome = parser.encode(Some(&original), &bundle).unwrap();
//! println!("{:?}, {} bytes", outcome.strategy, outcome.bytes.len());
//! ```

pub mod config;
pub mod error;
pub mod format;
pub mod io;
pub mod metadata;

// Re-export commonly used types
pub use config::{Cli, Command, EngineConfig};
pub use error::{CrwError, MetadataError, TiffError, ValueError};
pub use format::crw::{CiffComponent, CiffHeader, CrwParser};
pub use format::tiff::{
    Component, EncodeOutcome, FieldType, Group, Node, TiffHeader, TiffParser, WriteStrategy,
};
pub use io::ByteOrder;
pub use metadata::{ExifData, ExifKey, Exifdatum, IptcData, MetadataBundle, Value, XmpData};
