//! Typed values packed into and unpacked from binary records.

use std::fmt;

/// One field value of a packed record.
///
/// Integers of every width share one variant so that a value packed with `B`
/// compares equal to the value unpacked with `B`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i128),
    Float(f64),
    Bool(bool),
    /// Raw bytes for `s`, `p` and `c` fields.
    Bytes(Vec<u8>),
}

impl Value {
    pub fn as_int(&self) -> Option<i128> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(v) => Some(v),
            _ => None,
        }
    }

    /// Short type name used in mismatch messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Bool(_) => "bool",
            Self::Bytes(_) => "bytes",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Bytes(v) => {
                f.write_str("b\"")?;
                for b in v {
                    if b.is_ascii_graphic() || *b == b' ' {
                        write!(f, "{}", *b as char)?;
                    } else {
                        write!(f, "\\x{b:02x}")?;
                    }
                }
                f.write_str("\"")
            }
        }
    }
}

macro_rules! int_value {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Self::Int(v as i128)
            }
        })*
    };
}

int_value!(i8, u8, i16, u16, i32, u32, i64, u64, isize, usize);

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::Float(v as f64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Self::Bytes(v.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_widths_compare_equal() {
        assert_eq!(Value::from(7u8), Value::from(7i64));
        assert_eq!(Value::from(u64::MAX).as_int(), Some(u64::MAX as i128));
    }

    #[test]
    fn test_accessors() {
        assert_eq!(Value::from(2u8).as_float(), Some(2.0));
        assert_eq!(Value::from(true).as_bool(), Some(true));
        assert_eq!(Value::from(b"ab".as_slice()).as_bytes(), Some(&b"ab"[..]));
        assert_eq!(Value::from(1.5).as_int(), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Bytes(vec![b'O', b'K', 0x0d]).to_string(), "b\"OK\\x0d\"");
        assert_eq!(Value::Int(-3).to_string(), "-3");
    }
}
