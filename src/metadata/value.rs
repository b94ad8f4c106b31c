//! Typed metadata values.
//!
//! A [`Value`] is the decoded form of a directory entry or binary array
//! element. It converts to and from raw bytes in either byte order so the
//! engine can move values between the tree and the metadata containers.

use std::fmt;

use serde::{Serialize, Serializer};

use crate::format::tiff::FieldType;
use crate::io::ByteOrder;

/// A typed value with one variant per TIFF field type.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Byte(Vec<u8>),
    Ascii(String),
    /// Ascii entry whose bytes are not valid UTF-8, kept as read
    AsciiBytes(Vec<u8>),
    Short(Vec<u16>),
    Long(Vec<u32>),
    Rational(Vec<(u32, u32)>),
    SByte(Vec<i8>),
    Undefined(Vec<u8>),
    SShort(Vec<i16>),
    SLong(Vec<i32>),
    SRational(Vec<(i32, i32)>),
    Float(Vec<f32>),
    Double(Vec<f64>),
    Ifd(Vec<u32>),
}

impl Value {
    /// Decode raw bytes of the given type.
    ///
    /// The element count is derived from the byte length; trailing bytes that
    /// do not form a whole element are ignored.
    pub fn from_bytes(field_type: FieldType, data: &[u8], byte_order: ByteOrder) -> Self {
        let bo = byte_order;
        match field_type {
            FieldType::Byte => Value::Byte(data.to_vec()),
            FieldType::Undefined => Value::Undefined(data.to_vec()),
            FieldType::SByte => Value::SByte(data.iter().map(|b| *b as i8).collect()),
            FieldType::Ascii => {
                let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
                match std::str::from_utf8(&data[..end]) {
                    Ok(text) => Value::Ascii(text.to_string()),
                    Err(_) => Value::AsciiBytes(data[..end].to_vec()),
                }
            }
            FieldType::Short => Value::Short(data.chunks_exact(2).map(|c| bo.read_u16(c)).collect()),
            FieldType::SShort => Value::SShort(
                data.chunks_exact(2)
                    .map(|c| bo.read_u16(c) as i16)
                    .collect(),
            ),
            FieldType::Long => Value::Long(data.chunks_exact(4).map(|c| bo.read_u32(c)).collect()),
            FieldType::Ifd => Value::Ifd(data.chunks_exact(4).map(|c| bo.read_u32(c)).collect()),
            FieldType::SLong => Value::SLong(
                data.chunks_exact(4)
                    .map(|c| bo.read_u32(c) as i32)
                    .collect(),
            ),
            FieldType::Rational => Value::Rational(
                data.chunks_exact(8)
                    .map(|c| (bo.read_u32(&c[..4]), bo.read_u32(&c[4..])))
                    .collect(),
            ),
            FieldType::SRational => Value::SRational(
                data.chunks_exact(8)
                    .map(|c| (bo.read_u32(&c[..4]) as i32, bo.read_u32(&c[4..]) as i32))
                    .collect(),
            ),
            FieldType::Float => Value::Float(
                data.chunks_exact(4)
                    .map(|c| f32::from_bits(bo.read_u32(c)))
                    .collect(),
            ),
            FieldType::Double => Value::Double(
                data.chunks_exact(8)
                    .map(|c| f64::from_bits(bo.read_u64(c)))
                    .collect(),
            ),
        }
    }

    /// Encode the value in the given byte order.
    pub fn to_bytes(&self, byte_order: ByteOrder) -> Vec<u8> {
        let bo = byte_order;
        match self {
            Value::Byte(v) | Value::Undefined(v) => v.clone(),
            Value::SByte(v) => v.iter().map(|b| *b as u8).collect(),
            Value::Ascii(s) => {
                let mut out = s.as_bytes().to_vec();
                out.push(0);
                out
            }
            Value::AsciiBytes(v) => {
                let mut out = v.clone();
                out.push(0);
                out
            }
            Value::Short(v) => v.iter().flat_map(|x| bo.u16_bytes(*x)).collect(),
            Value::SShort(v) => v.iter().flat_map(|x| bo.u16_bytes(*x as u16)).collect(),
            Value::Long(v) | Value::Ifd(v) => v.iter().flat_map(|x| bo.u32_bytes(*x)).collect(),
            Value::SLong(v) => v.iter().flat_map(|x| bo.u32_bytes(*x as u32)).collect(),
            Value::Rational(v) => v
                .iter()
                .flat_map(|(n, d)| bo.u32_bytes(*n).into_iter().chain(bo.u32_bytes(*d)))
                .collect(),
            Value::SRational(v) => v
                .iter()
                .flat_map(|(n, d)| {
                    bo.u32_bytes(*n as u32)
                        .into_iter()
                        .chain(bo.u32_bytes(*d as u32))
                })
                .collect(),
            Value::Float(v) => v.iter().flat_map(|x| bo.u32_bytes(x.to_bits())).collect(),
            Value::Double(v) => v.iter().flat_map(|x| bo.u64_bytes(x.to_bits())).collect(),
        }
    }

    /// The TIFF field type this value is written as.
    pub fn field_type(&self) -> FieldType {
        match self {
            Value::Byte(_) => FieldType::Byte,
            Value::Ascii(_) | Value::AsciiBytes(_) => FieldType::Ascii,
            Value::Short(_) => FieldType::Short,
            Value::Long(_) => FieldType::Long,
            Value::Rational(_) => FieldType::Rational,
            Value::SByte(_) => FieldType::SByte,
            Value::Undefined(_) => FieldType::Undefined,
            Value::SShort(_) => FieldType::SShort,
            Value::SLong(_) => FieldType::SLong,
            Value::SRational(_) => FieldType::SRational,
            Value::Float(_) => FieldType::Float,
            Value::Double(_) => FieldType::Double,
            Value::Ifd(_) => FieldType::Ifd,
        }
    }

    /// Number of elements, as written in the entry's count field.
    pub fn count(&self) -> usize {
        match self {
            Value::Byte(v) | Value::Undefined(v) => v.len(),
            Value::Ascii(s) => s.len() + 1,
            Value::AsciiBytes(v) => v.len() + 1,
            Value::Short(v) => v.len(),
            Value::Long(v) | Value::Ifd(v) => v.len(),
            Value::Rational(v) => v.len(),
            Value::SByte(v) => v.len(),
            Value::SShort(v) => v.len(),
            Value::SLong(v) => v.len(),
            Value::SRational(v) => v.len(),
            Value::Float(v) => v.len(),
            Value::Double(v) => v.len(),
        }
    }

    /// Encoded size in bytes.
    pub fn size(&self) -> usize {
        self.count() * self.field_type().size_in_bytes()
    }

    /// Element `idx` as an unsigned integer, for integer types.
    pub fn to_u32(&self, idx: usize) -> Option<u32> {
        match self {
            Value::Byte(v) | Value::Undefined(v) => v.get(idx).map(|x| *x as u32),
            Value::Short(v) => v.get(idx).map(|x| *x as u32),
            Value::Long(v) | Value::Ifd(v) => v.get(idx).copied(),
            Value::SByte(v) => v.get(idx).and_then(|x| u32::try_from(*x).ok()),
            Value::SShort(v) => v.get(idx).and_then(|x| u32::try_from(*x).ok()),
            Value::SLong(v) => v.get(idx).and_then(|x| u32::try_from(*x).ok()),
            _ => None,
        }
    }

    /// The string content of an Ascii value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Ascii(s) => Some(s),
            _ => None,
        }
    }

    /// Parse a textual value as produced by `Display` into the given type.
    pub fn parse(field_type: FieldType, text: &str) -> Result<Self, String> {
        fn nums<T: std::str::FromStr>(text: &str) -> Result<Vec<T>, String> {
            text.split_whitespace()
                .map(|t| t.parse::<T>().map_err(|_| format!("'{}' is not a number", t)))
                .collect()
        }
        fn ratio<T: std::str::FromStr>(text: &str) -> Result<Vec<(T, T)>, String> {
            text.split_whitespace()
                .map(|t| {
                    let (n, d) = t
                        .split_once('/')
                        .ok_or_else(|| format!("'{}' is not a rational", t))?;
                    let n = n.parse().map_err(|_| format!("bad numerator in '{}'", t))?;
                    let d = d.parse().map_err(|_| format!("bad denominator in '{}'", t))?;
                    Ok((n, d))
                })
                .collect()
        }
        Ok(match field_type {
            FieldType::Ascii => Value::Ascii(text.to_string()),
            FieldType::Byte => Value::Byte(nums(text)?),
            FieldType::Undefined => {
                Value::Undefined(hex::decode(text.trim()).map_err(|e| e.to_string())?)
            }
            FieldType::SByte => Value::SByte(nums(text)?),
            FieldType::Short => Value::Short(nums(text)?),
            FieldType::SShort => Value::SShort(nums(text)?),
            FieldType::Long => Value::Long(nums(text)?),
            FieldType::Ifd => Value::Ifd(nums(text)?),
            FieldType::SLong => Value::SLong(nums(text)?),
            FieldType::Rational => Value::Rational(ratio(text)?),
            FieldType::SRational => Value::SRational(ratio(text)?),
            FieldType::Float => Value::Float(nums(text)?),
            FieldType::Double => Value::Double(nums(text)?),
        })
    }
}

fn join<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(" ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Ascii(s) => f.write_str(s),
            Value::AsciiBytes(v) => f.write_str(&String::from_utf8_lossy(v)),
            Value::Undefined(v) => f.write_str(&hex::encode(v)),
            Value::Byte(v) => join(f, v),
            Value::SByte(v) => join(f, v),
            Value::Short(v) => join(f, v),
            Value::SShort(v) => join(f, v),
            Value::Long(v) | Value::Ifd(v) => join(f, v),
            Value::SLong(v) => join(f, v),
            Value::Float(v) => join(f, v),
            Value::Double(v) => join(f, v),
            Value::Rational(v) => {
                let parts: Vec<String> = v.iter().map(|(n, d)| format!("{}/{}", n, d)).collect();
                join(f, &parts)
            }
            Value::SRational(v) => {
                let parts: Vec<String> = v.iter().map(|(n, d)| format!("{}/{}", n, d)).collect();
                join(f, &parts)
            }
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}
