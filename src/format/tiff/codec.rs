//! Entry points for TIFF metadata: parse, decode and encode.
//!
//! ```text
//! parse(bytes)  -> tree
//! decode(bytes) -> MetadataBundle
//! encode(original?, MetadataBundle) -> bytes
//! ```
//!
//! Encoding first tries to patch the original buffer in place and falls back
//! to a full rebuild when any change does not fit.

use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, info};

use super::component::Component;
use super::decoder::decode_tree;
use super::encoder::{build_tree, encode_in_place, PatchOutcome};
use super::parser::TiffHeader;
use super::reader::read_tree;
use super::writer::write_tree;
use crate::config::EngineConfig;
use crate::error::TiffError;
use crate::io::ByteOrder;
use crate::metadata::MetadataBundle;

/// How an encode produced its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WriteStrategy {
    /// Values patched into a copy of the original layout
    NonIntrusive,
    /// Tree rebuilt and serialized from scratch
    Intrusive,
}

/// Output of an encode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeOutcome {
    pub bytes: Vec<u8>,
    pub strategy: WriteStrategy,
}

/// Reads and writes TIFF metadata structures.
#[derive(Debug, Clone, Default)]
pub struct TiffParser {
    config: EngineConfig,
}

impl TiffParser {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Parse the header and component tree of `data`.
    pub fn parse(&self, data: &[u8]) -> Result<(TiffHeader, Component), TiffError> {
        read_tree(&Bytes::copy_from_slice(data), &self.config)
    }

    /// Decode the metadata of `data`.
    pub fn decode(&self, data: &[u8]) -> Result<MetadataBundle, TiffError> {
        let (_, root) = self.parse(data)?;
        let mut bundle = MetadataBundle::default();
        decode_tree(&root, &mut bundle);
        debug!(
            exif = bundle.exif.len(),
            iptc = bundle.iptc.len(),
            xmp = !bundle.xmp.is_empty(),
            "Decoded TIFF metadata"
        );
        Ok(bundle)
    }

    /// Encode `bundle`, updating `original` if given.
    ///
    /// The result of an update keeps the original's byte order. A new
    /// structure is written little-endian.
    pub fn encode(
        &self,
        original: Option<&[u8]>,
        bundle: &MetadataBundle,
    ) -> Result<EncodeOutcome, TiffError> {
        let Some(original) = original else {
            let root = build_tree(None, bundle, ByteOrder::LittleEndian)?;
            return Ok(EncodeOutcome {
                bytes: write_tree(&root, ByteOrder::LittleEndian)?,
                strategy: WriteStrategy::Intrusive,
            });
        };

        let (header, mut tree) = self.parse(original)?;
        if let PatchOutcome::Patched(bytes) = encode_in_place(original, &mut tree, bundle) {
            return Ok(EncodeOutcome {
                bytes,
                strategy: WriteStrategy::NonIntrusive,
            });
        }

        let root = build_tree(Some(&tree), bundle, header.byte_order)?;
        let bytes = write_tree(&root, header.byte_order)?;
        info!(before = original.len(), after = bytes.len(), "Rewrote TIFF structure");
        Ok(EncodeOutcome {
            bytes,
            strategy: WriteStrategy::Intrusive,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
