//! Outgoing payload forms and their byte conversion.

use super::format::FormatSpec;
use super::value::Value;
use crate::error::{Error, Result};

/// Homogeneous numeric array, written as little-endian element bytes.
#[derive(Debug, Clone, PartialEq)]
pub enum NumericArray {
    U8(Vec<u8>),
    I8(Vec<i8>),
    U16(Vec<u16>),
    I16(Vec<i16>),
    U32(Vec<u32>),
    I32(Vec<i32>),
    U64(Vec<u64>),
    I64(Vec<i64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

macro_rules! le_bytes {
    ($items:expr) => {
        $items.iter().flat_map(|v| v.to_le_bytes()).collect()
    };
}

impl NumericArray {
    pub fn to_le_bytes(&self) -> Vec<u8> {
        match self {
            Self::U8(v) => v.clone(),
            Self::I8(v) => le_bytes!(v),
            Self::U16(v) => le_bytes!(v),
            Self::I16(v) => le_bytes!(v),
            Self::U32(v) => le_bytes!(v),
            Self::I32(v) => le_bytes!(v),
            Self::U64(v) => le_bytes!(v),
            Self::I64(v) => le_bytes!(v),
            Self::F32(v) => le_bytes!(v),
            Self::F64(v) => le_bytes!(v),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::U8(v) => v.len(),
            Self::I8(v) => v.len(),
            Self::U16(v) => v.len(),
            Self::I16(v) => v.len(),
            Self::U32(v) => v.len(),
            Self::I32(v) => v.len(),
            Self::U64(v) => v.len(),
            Self::I64(v) => v.len(),
            Self::F32(v) => v.len(),
            Self::F64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

macro_rules! numeric_array_from {
    ($($t:ty => $variant:ident),*) => {
        $(impl From<Vec<$t>> for NumericArray {
            fn from(v: Vec<$t>) -> Self {
                Self::$variant(v)
            }
        })*
    };
}

numeric_array_from!(
    u8 => U8, i8 => I8, u16 => U16, i16 => I16, u32 => U32,
    i32 => I32, u64 => U64, i64 => I64, f32 => F32, f64 => F64
);

/// Everything `write` accepts.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Passed through unchanged.
    Bytes(Vec<u8>),
    /// UTF-8 encoded.
    Text(String),
    /// A single byte; must lie in `0..=255`.
    Integer(i64),
    Array(NumericArray),
    /// Concatenation of each element's bytes.
    Sequence(Vec<Payload>),
    /// Values laid out by a format spec.
    Packed { values: Vec<Value>, format: FormatSpec },
}

impl Payload {
    /// Packed record payload.
    pub fn packed(values: impl IntoIterator<Item = impl Into<Value>>, format: FormatSpec) -> Self {
        Self::Packed {
            values: values.into_iter().map(Into::into).collect(),
            format,
        }
    }

    /// Byte encoding of this payload.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        match self {
            Self::Packed { values, format } => Ok(format.pack(values)?),
            raw => {
                let mut out = Vec::new();
                raw.append_raw(&mut out)?;
                Ok(out)
            }
        }
    }

    fn append_raw(&self, out: &mut Vec<u8>) -> Result<()> {
        match self {
            Self::Bytes(b) => out.extend_from_slice(b),
            Self::Text(s) => out.extend_from_slice(s.as_bytes()),
            Self::Integer(v) => {
                let byte = u8::try_from(*v).map_err(|_| {
                    Error::UnsupportedPayload(format!(
                        "integer {v} does not fit in a single byte"
                    ))
                })?;
                out.push(byte);
            }
            Self::Array(a) => out.extend(a.to_le_bytes()),
            Self::Sequence(items) => {
                for item in items {
                    item.append_raw(out)?;
                }
            }
            Self::Packed { format, .. } => {
                return Err(Error::UnsupportedPayload(format!(
                    "packed record ({format}) nested inside a sequence"
                )));
            }
        }
        Ok(())
    }
}

impl From<Vec<u8>> for Payload {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<&[u8]> for Payload {
    fn from(v: &[u8]) -> Self {
        Self::Bytes(v.to_vec())
    }
}

impl<const N: usize> From<&[u8; N]> for Payload {
    fn from(v: &[u8; N]) -> Self {
        Self::Bytes(v.to_vec())
    }
}

impl From<&str> for Payload {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Payload {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<i64> for Payload {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<NumericArray> for Payload {
    fn from(v: NumericArray) -> Self {
        Self::Array(v)
    }
}

impl From<Vec<Payload>> for Payload {
    fn from(v: Vec<Payload>) -> Self {
        Self::Sequence(v)
    }
}

impl From<(Vec<Value>, FormatSpec)> for Payload {
    fn from((values, format): (Vec<Value>, FormatSpec)) -> Self {
        Self::Packed { values, format }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_pass_through() {
        assert_eq!(Payload::from(b"\x00\xff").to_bytes().unwrap(), [0x00, 0xff]);
    }

    #[test]
    fn test_text_is_utf8() {
        assert_eq!(Payload::from("µA").to_bytes().unwrap(), "µA".as_bytes());
    }

    #[test]
    fn test_integer_single_byte() {
        assert_eq!(Payload::Integer(0).to_bytes().unwrap(), [0]);
        assert_eq!(Payload::Integer(255).to_bytes().unwrap(), [255]);
        assert!(matches!(
            Payload::Integer(256).to_bytes(),
            Err(Error::UnsupportedPayload(_))
        ));
        assert!(matches!(
            Payload::Integer(-1).to_bytes(),
            Err(Error::UnsupportedPayload(_))
        ));
    }

    #[test]
    fn test_numeric_array_little_endian() {
        let payload = Payload::from(NumericArray::from(vec![0x0102u16, 0x0304]));
        assert_eq!(payload.to_bytes().unwrap(), [0x02, 0x01, 0x04, 0x03]);

        let floats = Payload::from(NumericArray::from(vec![1.0f32]));
        assert_eq!(floats.to_bytes().unwrap(), 1.0f32.to_le_bytes());
    }

    #[test]
    fn test_sequence_concatenates() {
        let payload = Payload::Sequence(vec![
            Payload::from("AT"),
            Payload::Integer(0x0d),
            Payload::Sequence(vec![Payload::from(vec![0x0au8])]),
        ]);
        assert_eq!(payload.to_bytes().unwrap(), b"AT\r\n");
    }

    #[test]
    fn test_packed_payload() {
        let payload = Payload::packed([1u8, 2, 3], FormatSpec::new("<3B").unwrap());
        assert_eq!(payload.to_bytes().unwrap(), [1, 2, 3]);
    }

    #[test]
    fn test_packed_mismatch() {
        let payload = Payload::packed([1u8, 2], FormatSpec::new("<3B").unwrap());
        assert!(matches!(payload.to_bytes(), Err(Error::FormatMismatch(_))));
    }

    #[test]
    fn test_packed_inside_sequence_is_unsupported() {
        let nested = Payload::Sequence(vec![Payload::packed(
            [1u8],
            FormatSpec::new("<B").unwrap(),
        )]);
        assert!(matches!(nested.to_bytes(), Err(Error::UnsupportedPayload(_))));
    }

    #[test]
    fn test_array_len() {
        let array = NumericArray::from(vec![1i32, 2, 3]);
        assert_eq!(array.len(), 3);
        assert!(!array.is_empty());
        assert_eq!(array.to_le_bytes().len(), 12);
    }
}
