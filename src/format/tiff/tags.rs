//! TIFF tag, field type and group definitions.
//!
//! This module defines the vocabulary of the tree engine:
//! - Field types that determine how values are encoded
//! - Groups, the namespaces a tag is resolved against
//! - Extended tags, which add the sentinels used by the schema tables
//! - Well-known tag ids and their names

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

// =============================================================================
// TIFF Field Types
// =============================================================================

/// TIFF field types that determine how values are encoded.
///
/// Each field type has a fixed size per element, which decides whether a value
/// fits inline in a 12-byte directory entry and how arrays are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum FieldType {
    /// Unsigned 8-bit integer
    Byte = 1,
    /// 8-bit ASCII character, NUL terminated
    Ascii = 2,
    /// Unsigned 16-bit integer
    Short = 3,
    /// Unsigned 32-bit integer
    Long = 4,
    /// Two Longs: numerator, denominator
    Rational = 5,
    /// Signed 8-bit integer
    SByte = 6,
    /// Opaque byte data
    Undefined = 7,
    /// Signed 16-bit integer
    SShort = 8,
    /// Signed 32-bit integer
    SLong = 9,
    /// Two SLongs: numerator, denominator
    SRational = 10,
    /// IEEE single precision float
    Float = 11,
    /// IEEE double precision float
    Double = 12,
    /// 32-bit offset of a sub-IFD
    Ifd = 13,
}

impl FieldType {
    /// Size of a single value of this type in bytes.
    #[inline]
    pub const fn size_in_bytes(self) -> usize {
        match self {
            FieldType::Byte | FieldType::Ascii | FieldType::SByte | FieldType::Undefined => 1,
            FieldType::Short | FieldType::SShort => 2,
            FieldType::Long | FieldType::SLong | FieldType::Float | FieldType::Ifd => 4,
            FieldType::Rational | FieldType::SRational | FieldType::Double => 8,
        }
    }

    /// Create a FieldType from its numeric value.
    ///
    /// Returns `None` for unknown type values.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(FieldType::Byte),
            2 => Some(FieldType::Ascii),
            3 => Some(FieldType::Short),
            4 => Some(FieldType::Long),
            5 => Some(FieldType::Rational),
            6 => Some(FieldType::SByte),
            7 => Some(FieldType::Undefined),
            8 => Some(FieldType::SShort),
            9 => Some(FieldType::SLong),
            10 => Some(FieldType::SRational),
            11 => Some(FieldType::Float),
            12 => Some(FieldType::Double),
            13 => Some(FieldType::Ifd),
            _ => None,
        }
    }

    /// Get the numeric type id.
    #[inline]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Byte size of a raw type id, 0 for unknown types.
    pub fn size_of_raw(type_id: u16) -> usize {
        Self::from_u16(type_id).map_or(0, FieldType::size_in_bytes)
    }

    /// Maximum bytes stored inline in a classic TIFF IFD entry.
    pub const INLINE_THRESHOLD: usize = 4;

    /// Check if `count` values of this type fit inline in an entry.
    #[inline]
    pub fn fits_inline(self, count: u64) -> bool {
        self.size_in_bytes() as u64 * count <= Self::INLINE_THRESHOLD as u64
    }

    /// Short name used in dumps.
    pub const fn name(self) -> &'static str {
        match self {
            FieldType::Byte => "Byte",
            FieldType::Ascii => "Ascii",
            FieldType::Short => "Short",
            FieldType::Long => "Long",
            FieldType::Rational => "Rational",
            FieldType::SByte => "SByte",
            FieldType::Undefined => "Undefined",
            FieldType::SShort => "SShort",
            FieldType::SLong => "SLong",
            FieldType::SRational => "SRational",
            FieldType::Float => "Float",
            FieldType::Double => "Double",
            FieldType::Ifd => "Ifd",
        }
    }
}

// =============================================================================
// Groups
// =============================================================================

/// Namespace a tag is resolved against.
///
/// The same numeric tag means different things in different directories, so
/// every node carries the group it was found in. Vendor groups cover both
/// makernote directories and the synthetic groups of decoded binary arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Group {
    /// No group: parent of the tree root
    None,
    Ifd0,
    Ifd1,
    Ifd2,
    Ifd3,
    Exif,
    Gps,
    Iop,
    SubImage1,
    SubImage2,
    SubImage3,
    SubImage4,
    Canon,
    CanonCs,
    CanonSi,
    CanonFi,
    CanonCf,
    CanonPi,
    Nikon3,
    NikonPv,
    NikonVr,
    NikonLd1,
    NikonLd2,
    NikonLd3,
    NikonLd4,
    Sony2,
    SonyMisc3a,
    SonyMisc3b,
    Sony2Fp,
}

const ALL_GROUPS: [Group; 29] = [
    Group::None,
    Group::Ifd0,
    Group::Ifd1,
    Group::Ifd2,
    Group::Ifd3,
    Group::Exif,
    Group::Gps,
    Group::Iop,
    Group::SubImage1,
    Group::SubImage2,
    Group::SubImage3,
    Group::SubImage4,
    Group::Canon,
    Group::CanonCs,
    Group::CanonSi,
    Group::CanonFi,
    Group::CanonCf,
    Group::CanonPi,
    Group::Nikon3,
    Group::NikonPv,
    Group::NikonVr,
    Group::NikonLd1,
    Group::NikonLd2,
    Group::NikonLd3,
    Group::NikonLd4,
    Group::Sony2,
    Group::SonyMisc3a,
    Group::SonyMisc3b,
    Group::Sony2Fp,
];

impl Group {
    /// Group name as used in metadata keys (`Exif.<name>.<tag>`).
    pub const fn name(self) -> &'static str {
        match self {
            Group::None => "",
            Group::Ifd0 => "Image",
            Group::Ifd1 => "Thumbnail",
            Group::Ifd2 => "Image2",
            Group::Ifd3 => "Image3",
            Group::Exif => "Photo",
            Group::Gps => "GPSInfo",
            Group::Iop => "Iop",
            Group::SubImage1 => "SubImage1",
            Group::SubImage2 => "SubImage2",
            Group::SubImage3 => "SubImage3",
            Group::SubImage4 => "SubImage4",
            Group::Canon => "Canon",
            Group::CanonCs => "CanonCs",
            Group::CanonSi => "CanonSi",
            Group::CanonFi => "CanonFi",
            Group::CanonCf => "CanonCf",
            Group::CanonPi => "CanonPi",
            Group::Nikon3 => "Nikon3",
            Group::NikonPv => "NikonPreview",
            Group::NikonVr => "NikonVr",
            Group::NikonLd1 => "NikonLd1",
            Group::NikonLd2 => "NikonLd2",
            Group::NikonLd3 => "NikonLd3",
            Group::NikonLd4 => "NikonLd4",
            Group::Sony2 => "Sony2",
            Group::SonyMisc3a => "SonyMisc3a",
            Group::SonyMisc3b => "SonyMisc3b",
            Group::Sony2Fp => "Sony2Fp",
        }
    }

    /// Look up a group by its key name.
    pub fn from_name(name: &str) -> Option<Self> {
        ALL_GROUPS
            .iter()
            .copied()
            .find(|g| *g != Group::None && g.name() == name)
    }

    /// The n-th sub-image group (0-based), if one exists.
    pub fn sub_image(index: usize) -> Option<Self> {
        [
            Group::SubImage1,
            Group::SubImage2,
            Group::SubImage3,
            Group::SubImage4,
        ]
        .get(index)
        .copied()
    }

    /// Whether tags in this group follow the standard TIFF/Exif namespace.
    pub const fn is_standard(self) -> bool {
        matches!(
            self,
            Group::Ifd0
                | Group::Ifd1
                | Group::Ifd2
                | Group::Ifd3
                | Group::Exif
                | Group::Gps
                | Group::Iop
                | Group::SubImage1
                | Group::SubImage2
                | Group::SubImage3
                | Group::SubImage4
        )
    }

    /// Whether this group is an image directory that may hold a primary image.
    pub const fn is_image_group(self) -> bool {
        matches!(
            self,
            Group::Ifd0
                | Group::Ifd1
                | Group::Ifd2
                | Group::Ifd3
                | Group::SubImage1
                | Group::SubImage2
                | Group::SubImage3
                | Group::SubImage4
        )
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Group {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Group::from_name(s).ok_or_else(|| format!("unknown group '{}'", s))
    }
}

impl Serialize for Group {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

// =============================================================================
// Extended Tags
// =============================================================================

/// A tag as used by the schema tables: a real 16-bit tag or a sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtTag {
    /// A real tag value
    Tag(u16),
    /// The synthetic top of a tree
    Root,
    /// The "next IFD" link of a directory
    Next,
    /// Wildcard matching any tag of a group
    All,
}

impl ExtTag {
    /// The real tag, if this is not a sentinel.
    pub const fn tag(self) -> Option<u16> {
        match self {
            ExtTag::Tag(tag) => Some(tag),
            _ => None,
        }
    }
}

impl From<u16> for ExtTag {
    fn from(tag: u16) -> Self {
        ExtTag::Tag(tag)
    }
}

// =============================================================================
// Well-known Tags
// =============================================================================

/// Numeric ids of the tags the engine treats specially.
pub mod tag {
    pub const NEW_SUBFILE_TYPE: u16 = 0x00fe;
    pub const IMAGE_WIDTH: u16 = 0x0100;
    pub const IMAGE_LENGTH: u16 = 0x0101;
    pub const BITS_PER_SAMPLE: u16 = 0x0102;
    pub const COMPRESSION: u16 = 0x0103;
    pub const PHOTOMETRIC_INTERPRETATION: u16 = 0x0106;
    pub const MAKE: u16 = 0x010f;
    pub const MODEL: u16 = 0x0110;
    pub const STRIP_OFFSETS: u16 = 0x0111;
    pub const ORIENTATION: u16 = 0x0112;
    pub const SAMPLES_PER_PIXEL: u16 = 0x0115;
    pub const ROWS_PER_STRIP: u16 = 0x0116;
    pub const STRIP_BYTE_COUNTS: u16 = 0x0117;
    pub const PLANAR_CONFIGURATION: u16 = 0x011c;
    pub const TILE_WIDTH: u16 = 0x0142;
    pub const TILE_LENGTH: u16 = 0x0143;
    pub const TILE_OFFSETS: u16 = 0x0144;
    pub const TILE_BYTE_COUNTS: u16 = 0x0145;
    pub const SUB_IFDS: u16 = 0x014a;
    pub const JPEG_INTERCHANGE_FORMAT: u16 = 0x0201;
    pub const JPEG_INTERCHANGE_FORMAT_LENGTH: u16 = 0x0202;
    pub const XMP_PACKET: u16 = 0x02bc;
    pub const IPTC_NAA: u16 = 0x83bb;
    pub const EXIF_IFD_POINTER: u16 = 0x8769;
    pub const GPS_IFD_POINTER: u16 = 0x8825;
    pub const DATE_TIME_ORIGINAL: u16 = 0x9003;
    pub const MAKER_NOTE: u16 = 0x927c;
    pub const USER_COMMENT: u16 = 0x9286;
    pub const PIXEL_X_DIMENSION: u16 = 0xa002;
    pub const PIXEL_Y_DIMENSION: u16 = 0xa003;
    pub const INTEROPERABILITY_IFD_POINTER: u16 = 0xa005;
}

/// Names of standard TIFF/Exif tags, shared by all standard groups.
const STANDARD_TAG_NAMES: &[(u16, &str)] = &[
    (0x0000, "GPSVersionID"),
    (0x0001, "InteroperabilityIndex"),
    (0x00fe, "NewSubfileType"),
    (0x0100, "ImageWidth"),
    (0x0101, "ImageLength"),
    (0x0102, "BitsPerSample"),
    (0x0103, "Compression"),
    (0x0106, "PhotometricInterpretation"),
    (0x010e, "ImageDescription"),
    (0x010f, "Make"),
    (0x0110, "Model"),
    (0x0111, "StripOffsets"),
    (0x0112, "Orientation"),
    (0x0115, "SamplesPerPixel"),
    (0x0116, "RowsPerStrip"),
    (0x0117, "StripByteCounts"),
    (0x011a, "XResolution"),
    (0x011b, "YResolution"),
    (0x011c, "PlanarConfiguration"),
    (0x0128, "ResolutionUnit"),
    (0x0131, "Software"),
    (0x0132, "DateTime"),
    (0x013b, "Artist"),
    (0x0142, "TileWidth"),
    (0x0143, "TileLength"),
    (0x0144, "TileOffsets"),
    (0x0145, "TileByteCounts"),
    (0x014a, "SubIFDs"),
    (0x0201, "JPEGInterchangeFormat"),
    (0x0202, "JPEGInterchangeFormatLength"),
    (0x0213, "YCbCrPositioning"),
    (0x02bc, "XMLPacket"),
    (0x8298, "Copyright"),
    (0x829a, "ExposureTime"),
    (0x829d, "FNumber"),
    (0x83bb, "IPTCNAA"),
    (0x8649, "ImageResources"),
    (0x8769, "ExifTag"),
    (0x8822, "ExposureProgram"),
    (0x8825, "GPSTag"),
    (0x8827, "ISOSpeedRatings"),
    (0x9000, "ExifVersion"),
    (0x9003, "DateTimeOriginal"),
    (0x9004, "DateTimeDigitized"),
    (0x9201, "ShutterSpeedValue"),
    (0x9202, "ApertureValue"),
    (0x920a, "FocalLength"),
    (0x927c, "MakerNote"),
    (0x9286, "UserComment"),
    (0xa000, "FlashpixVersion"),
    (0xa001, "ColorSpace"),
    (0xa002, "PixelXDimension"),
    (0xa003, "PixelYDimension"),
    (0xa005, "InteroperabilityTag"),
];

/// Names of the Canon makernote directory tags.
const CANON_TAG_NAMES: &[(u16, &str)] = &[
    (0x0001, "CameraSettings"),
    (0x0002, "FocalLength"),
    (0x0004, "ShotInfo"),
    (0x0006, "ImageType"),
    (0x0007, "FirmwareVersion"),
    (0x0008, "FileNumber"),
    (0x0009, "OwnerName"),
    (0x000c, "SerialNumber"),
    (0x000f, "CustomFunctions"),
    (0x0010, "ModelID"),
    (0x0012, "PictureInfo"),
    (0x0093, "FileInfo"),
];

const NIKON_TAG_NAMES: &[(u16, &str)] = &[
    (0x0001, "Version"),
    (0x0002, "ISOSpeed"),
    (0x0011, "Preview"),
    (0x001d, "SerialNumber"),
    (0x001f, "VRInfo"),
    (0x0098, "LensData"),
    (0x00a7, "ShutterCount"),
];

const SONY_TAG_NAMES: &[(u16, &str)] = &[
    (0x0102, "Quality"),
    (0x9400, "Tag9400"),
    (0x9402, "Tag9402"),
    (0xb001, "SonyModelID"),
];

fn names_for(group: Group) -> &'static [(u16, &'static str)] {
    match group {
        g if g.is_standard() => STANDARD_TAG_NAMES,
        Group::Canon => CANON_TAG_NAMES,
        Group::Nikon3 => NIKON_TAG_NAMES,
        Group::Sony2 => SONY_TAG_NAMES,
        _ => &[],
    }
}

/// Name of a tag within a group, if known.
pub fn tag_name(tag: u16, group: Group) -> Option<&'static str> {
    names_for(group)
        .iter()
        .find(|(id, _)| *id == tag)
        .map(|(_, name)| *name)
}

/// Tag id for a name within a group, if known.
pub fn tag_by_name(name: &str, group: Group) -> Option<u16> {
    names_for(group)
        .iter()
        .find(|(_, n)| *n == name)
        .map(|(id, _)| *id)
}

// =============================================================================
// Tests
// =============================================================================
