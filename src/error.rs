use thiserror::Error;

/// Errors that can occur while parsing or writing TIFF-style metadata trees
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TiffError {
    /// Invalid TIFF magic bytes (not II or MM)
    #[error("Invalid TIFF magic bytes: expected 0x4949 (II) or 0x4D4D (MM), got 0x{0:04X}")]
    InvalidMagic(u16),

    /// Invalid TIFF version number
    #[error("Invalid TIFF version: expected 0x{expected:04X}, got 0x{actual:04X}")]
    InvalidVersion { expected: u16, actual: u16 },

    /// Buffer is too small to contain the requested structure
    #[error("File too small: need at least {required} bytes, got {actual}")]
    FileTooSmall { required: u64, actual: u64 },

    /// Invalid IFD offset (points outside the buffer)
    #[error("Invalid IFD offset: {0}")]
    InvalidIfdOffset(u64),

    /// A value region lies outside the buffer or overlaps its own entry record
    #[error("Offset out of range: {size} bytes at offset {offset} ({reason})")]
    OffsetOutOfRange {
        offset: u64,
        size: u64,
        reason: &'static str,
    },

    /// A sub-structure is malformed; the affected node stays undecoded
    #[error("Corrupted metadata: {0}")]
    Corrupted(String),

    /// Operation is not defined for this kind of component
    #[error("Operation not supported: {0}")]
    NotSupported(&'static str),

    /// Serialized tree would not fit 32-bit TIFF offsets
    #[error("Value too large for a TIFF offset: {0}")]
    ValueTooLarge(u64),
}

impl TiffError {
    /// Whether this error aborts the whole parse rather than one branch.
    ///
    /// Signature problems and out-of-range offsets indicate a hostile or
    /// irrecoverably malformed input. Corruption inside a single directory or
    /// vendor blob only degrades that node.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, TiffError::Corrupted(_))
    }
}

/// Errors that can occur when parsing or writing Canon CRW (CIFF) structures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CrwError {
    /// The buffer does not start with a CIFF header
    #[error("Invalid CRW signature")]
    InvalidSignature,

    /// Buffer is too small to contain the requested structure
    #[error("File too small: need at least {required} bytes, got {actual}")]
    FileTooSmall { required: u64, actual: u64 },

    /// A value region lies outside its heap or overlaps its own entry record
    #[error("Offset out of range: {size} bytes at offset {offset} ({reason})")]
    OffsetOutOfRange {
        offset: u64,
        size: u64,
        reason: &'static str,
    },

    /// A directory is malformed
    #[error("Corrupted CRW directory: {0}")]
    Corrupted(String),

    /// Operation is not defined for this kind of component
    #[error("Operation not supported: {0}")]
    NotSupported(&'static str),
}

/// Errors raised by the generic metadata containers
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    /// Key string could not be parsed into a group and tag
    #[error("Invalid metadata key: {0}")]
    InvalidKey(String),

    /// Value text could not be converted to the requested type
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Top-level error returned by the public decode/encode entry points
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetadataError {
    /// TIFF structure error
    #[error("TIFF error: {0}")]
    Tiff(#[from] TiffError),

    /// CRW structure error
    #[error("CRW error: {0}")]
    Crw(#[from] CrwError),

    /// Metadata key or value error
    #[error("Value error: {0}")]
    Value(#[from] ValueError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(TiffError::InvalidMagic(0).is_fatal());
        assert!(TiffError::OffsetOutOfRange {
            offset: 8,
            size: 4,
            reason: "overlaps entry"
        }
        .is_fatal());
        assert!(!TiffError::Corrupted("short".into()).is_fatal());
    }

    #[test]
    fn test_error_messages() {
        let err = TiffError::FileTooSmall {
            required: 8,
            actual: 4,
        };
        assert_eq!(err.to_string(), "File too small: need at least 8 bytes, got 4");

        let err: MetadataError = CrwError::InvalidSignature.into();
        assert_eq!(err.to_string(), "CRW error: Invalid CRW signature");
    }
}
