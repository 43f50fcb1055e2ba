//! Fixed-layout binary record formats.
//!
//! A format string is an optional byte-order prefix followed by field codes,
//! each optionally preceded by a repeat count:
//!
//! | Prefix | Byte order | Sizes and alignment |
//! |--------|------------|---------------------|
//! | `@` (default) | native | native sizes, fields aligned |
//! | `=` | native | standard sizes, packed |
//! | `<` | little-endian | standard sizes, packed |
//! | `>` / `!` | big-endian | standard sizes, packed |
//!
//! | Code | Field | Standard size |
//! |------|-------|---------------|
//! | `x` | pad byte (no value) | 1 |
//! | `c` | single byte (`Value::Bytes` of length 1) | 1 |
//! | `b` / `B` | i8 / u8 | 1 |
//! | `?` | bool | 1 |
//! | `h` / `H` | i16 / u16 | 2 |
//! | `i` / `I` | i32 / u32 | 4 |
//! | `l` / `L` | C long / unsigned long | 4 |
//! | `q` / `Q` | i64 / u64 | 8 |
//! | `n` / `N` | isize / usize (native `@` only) | pointer width |
//! | `f` / `d` | f32 / f64 | 4 / 8 |
//! | `s` | fixed-length bytes; the count is the length | count |
//! | `p` | length-prefixed bytes; the count includes the prefix | count |
//!
//! Whitespace between fields is ignored.

use super::value::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors from parsing a format string or fitting values to it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormatError {
    #[error("bad char {code:?} in format at position {position}")]
    UnknownCode { code: char, position: usize },

    #[error("repeat count without a field code at position {position}")]
    DanglingCount { position: usize },

    #[error("byte order {code:?} must come first (found at position {position})")]
    MisplacedByteOrder { code: char, position: usize },

    #[error("repeat count too large at position {position}")]
    CountOverflow { position: usize },

    #[error("code {code:?} is only available in native ('@') mode")]
    NativeOnly { code: char },

    #[error("format expects {expected} values, got {got}")]
    Arity { expected: usize, got: usize },

    #[error("value {index} for code {code:?} must be {wanted}, got {found}")]
    Type {
        index: usize,
        code: char,
        wanted: &'static str,
        found: String,
    },

    #[error("value {index} ({value}) is out of range for code {code:?}")]
    Range {
        index: usize,
        code: char,
        value: String,
    },

    #[error("format requires a buffer of {expected} bytes, got {got}")]
    Length { expected: usize, got: usize },

    #[error("cannot read {input:?} as value {index} for code {code:?}")]
    ValueParse {
        index: usize,
        code: char,
        input: String,
    },
}

impl FormatError {
    /// Whether the error comes from the format string itself rather than
    /// from the values or bytes applied to it.
    pub fn is_parse_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownCode { .. }
                | Self::DanglingCount { .. }
                | Self::MisplacedByteOrder { .. }
                | Self::CountOverflow { .. }
                | Self::NativeOnly { .. }
        )
    }
}

/// Byte order selected by the format prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Native,
    Little,
    Big,
}

impl ByteOrder {
    fn is_little(self) -> bool {
        match self {
            Self::Native => cfg!(target_endian = "little"),
            Self::Little => true,
            Self::Big => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Code {
    Pad,
    Char,
    I8,
    U8,
    Bool,
    I16,
    U16,
    I32,
    U32,
    Long,
    ULong,
    I64,
    U64,
    ISize,
    USize,
    F32,
    F64,
    Str,
    Pascal,
}

impl Code {
    fn from_char(c: char) -> Option<Self> {
        Some(match c {
            'x' => Self::Pad,
            'c' => Self::Char,
            'b' => Self::I8,
            'B' => Self::U8,
            '?' => Self::Bool,
            'h' => Self::I16,
            'H' => Self::U16,
            'i' => Self::I32,
            'I' => Self::U32,
            'l' => Self::Long,
            'L' => Self::ULong,
            'q' => Self::I64,
            'Q' => Self::U64,
            'n' => Self::ISize,
            'N' => Self::USize,
            'f' => Self::F32,
            'd' => Self::F64,
            's' => Self::Str,
            'p' => Self::Pascal,
            _ => return None,
        })
    }

    fn as_char(self) -> char {
        match self {
            Self::Pad => 'x',
            Self::Char => 'c',
            Self::I8 => 'b',
            Self::U8 => 'B',
            Self::Bool => '?',
            Self::I16 => 'h',
            Self::U16 => 'H',
            Self::I32 => 'i',
            Self::U32 => 'I',
            Self::Long => 'l',
            Self::ULong => 'L',
            Self::I64 => 'q',
            Self::U64 => 'Q',
            Self::ISize => 'n',
            Self::USize => 'N',
            Self::F32 => 'f',
            Self::F64 => 'd',
            Self::Str => 's',
            Self::Pascal => 'p',
        }
    }

    /// Size of one item.
    fn size(self, native: bool) -> usize {
        match self {
            Self::Pad | Self::Char | Self::I8 | Self::U8 | Self::Bool | Self::Str | Self::Pascal => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::Long | Self::ULong if native => std::mem::size_of::<std::os::raw::c_long>(),
            Self::Long | Self::ULong => 4,
            Self::I64 | Self::U64 | Self::F64 => 8,
            Self::ISize | Self::USize => std::mem::size_of::<usize>(),
        }
    }

    /// `(signed, width)` for integer codes.
    fn integer(self, native: bool) -> Option<(bool, usize)> {
        let signed = match self {
            Self::I8 | Self::I16 | Self::I32 | Self::Long | Self::I64 | Self::ISize => true,
            Self::U8 | Self::U16 | Self::U32 | Self::ULong | Self::U64 | Self::USize => false,
            _ => return None,
        };
        Some((signed, self.size(native)))
    }

    fn takes_values(self, count: usize) -> usize {
        match self {
            Self::Pad => 0,
            Self::Str | Self::Pascal => 1,
            _ => count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Field {
    code: Code,
    count: usize,
    offset: usize,
}

/// A parsed, size-checked record layout.
///
/// ```
/// use serial_registry::framing::{FormatSpec, Value};
///
/// let spec: FormatSpec = "<3B".parse()?;
/// assert_eq!(spec.size(), 3);
/// let bytes = spec.pack(&[1u8.into(), 2u8.into(), 3u8.into()])?;
/// assert_eq!(bytes, [1, 2, 3]);
/// assert_eq!(spec.unpack(&bytes)?, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
/// # Ok::<(), serial_registry::framing::FormatError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatSpec {
    source: String,
    order: ByteOrder,
    native: bool,
    fields: Vec<Field>,
    size: usize,
}

impl FormatSpec {
    pub fn new(format: &str) -> Result<Self, FormatError> {
        format.parse()
    }

    /// Number of bytes a record occupies.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of values a record packs or unpacks.
    pub fn value_count(&self) -> usize {
        self.fields.iter().map(|f| f.code.takes_values(f.count)).sum()
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.order
    }

    /// The format string this spec was parsed from.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Pack `values` into a buffer of exactly [`size`](Self::size) bytes.
    pub fn pack(&self, values: &[Value]) -> Result<Vec<u8>, FormatError> {
        let expected = self.value_count();
        if values.len() != expected {
            return Err(FormatError::Arity {
                expected,
                got: values.len(),
            });
        }

        let little = self.order.is_little();
        let mut buf = vec![0u8; self.size];
        let mut index = 0;

        for field in &self.fields {
            let code = field.code;
            let c = code.as_char();
            match code {
                Code::Pad => {}
                Code::Str | Code::Pascal => {
                    let data = expect_bytes(&values[index], index, c)?;
                    let out = &mut buf[field.offset..field.offset + field.count];
                    if code == Code::Str {
                        let n = data.len().min(field.count);
                        out[..n].copy_from_slice(&data[..n]);
                    } else if field.count > 0 {
                        let n = data.len().min(field.count - 1).min(255);
                        out[0] = n as u8;
                        out[1..=n].copy_from_slice(&data[..n]);
                    }
                    index += 1;
                }
                _ => {
                    let width = code.size(self.native);
                    for item in 0..field.count {
                        let at = field.offset + item * width;
                        let out = &mut buf[at..at + width];
                        pack_scalar(code, self.native, little, &values[index], index, out)?;
                        index += 1;
                    }
                }
            }
        }

        Ok(buf)
    }

    /// Unpack a buffer of exactly [`size`](Self::size) bytes.
    pub fn unpack(&self, data: &[u8]) -> Result<Vec<Value>, FormatError> {
        if data.len() != self.size {
            return Err(FormatError::Length {
                expected: self.size,
                got: data.len(),
            });
        }

        let little = self.order.is_little();
        let mut values = Vec::with_capacity(self.value_count());

        for field in &self.fields {
            let code = field.code;
            match code {
                Code::Pad => {}
                Code::Str => {
                    values.push(Value::Bytes(
                        data[field.offset..field.offset + field.count].to_vec(),
                    ));
                }
                Code::Pascal => {
                    if field.count == 0 {
                        values.push(Value::Bytes(Vec::new()));
                    } else {
                        let raw = &data[field.offset..field.offset + field.count];
                        let n = (raw[0] as usize).min(field.count - 1);
                        values.push(Value::Bytes(raw[1..=n].to_vec()));
                    }
                }
                _ => {
                    let width = code.size(self.native);
                    for item in 0..field.count {
                        let at = field.offset + item * width;
                        values.push(unpack_scalar(code, self.native, little, &data[at..at + width]));
                    }
                }
            }
        }

        Ok(values)
    }

    /// Parse textual inputs into values, one per value slot of the format.
    ///
    /// Integers accept decimal or `0x` hex; bools accept `true`/`false`/`1`/`0`;
    /// byte fields take the text's UTF-8 bytes.
    pub fn parse_values<S: AsRef<str>>(&self, inputs: &[S]) -> Result<Vec<Value>, FormatError> {
        let expected = self.value_count();
        if inputs.len() != expected {
            return Err(FormatError::Arity {
                expected,
                got: inputs.len(),
            });
        }

        let slots = self
            .fields
            .iter()
            .flat_map(|f| std::iter::repeat(f.code).take(f.code.takes_values(f.count)));

        slots
            .zip(inputs)
            .enumerate()
            .map(|(index, (code, input))| {
                let input = input.as_ref().trim();
                let bad = || FormatError::ValueParse {
                    index,
                    code: code.as_char(),
                    input: input.to_string(),
                };
                match code {
                    Code::Char | Code::Str | Code::Pascal => Ok(Value::Bytes(input.as_bytes().to_vec())),
                    Code::Bool => match input {
                        "true" | "1" => Ok(Value::Bool(true)),
                        "false" | "0" => Ok(Value::Bool(false)),
                        _ => Err(bad()),
                    },
                    Code::F32 | Code::F64 => input.parse().map(Value::Float).map_err(|_| bad()),
                    _ => parse_int(input).map(Value::Int).ok_or_else(bad),
                }
            })
            .collect()
    }
}

impl FromStr for FormatSpec {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.char_indices().peekable();
        let mut order = ByteOrder::Native;
        let mut native = true;

        while let Some(&(_, c)) = chars.peek() {
            if c.is_whitespace() {
                chars.next();
                continue;
            }
            let prefix = match c {
                '@' => Some((ByteOrder::Native, true)),
                '=' => Some((ByteOrder::Native, false)),
                '<' => Some((ByteOrder::Little, false)),
                '>' | '!' => Some((ByteOrder::Big, false)),
                _ => None,
            };
            if let Some((o, n)) = prefix {
                order = o;
                native = n;
                chars.next();
            }
            break;
        }

        let mut fields = Vec::new();
        let mut offset = 0usize;
        let mut count: Option<usize> = None;
        let mut count_start = 0;

        for (position, c) in chars {
            if let Some(digit) = c.to_digit(10) {
                if count.is_none() {
                    count_start = position;
                }
                let next = count
                    .unwrap_or(0)
                    .checked_mul(10)
                    .and_then(|n| n.checked_add(digit as usize))
                    .ok_or(FormatError::CountOverflow { position })?;
                count = Some(next);
                continue;
            }
            if c.is_whitespace() {
                if count.is_some() {
                    return Err(FormatError::DanglingCount {
                        position: count_start,
                    });
                }
                continue;
            }
            if matches!(c, '@' | '=' | '<' | '>' | '!') {
                return Err(FormatError::MisplacedByteOrder { code: c, position });
            }

            let code = Code::from_char(c).ok_or(FormatError::UnknownCode { code: c, position })?;
            if matches!(code, Code::ISize | Code::USize) && !native {
                return Err(FormatError::NativeOnly { code: c });
            }

            let n = count.take().unwrap_or(1);
            let width = code.size(native);
            if native && width > 1 {
                offset = offset.div_ceil(width) * width;
            }
            fields.push(Field {
                code,
                count: n,
                offset,
            });
            offset = n
                .checked_mul(width)
                .and_then(|len| offset.checked_add(len))
                .ok_or(FormatError::CountOverflow { position })?;
        }

        if count.is_some() {
            return Err(FormatError::DanglingCount {
                position: count_start,
            });
        }

        Ok(Self {
            source: s.to_string(),
            order,
            native,
            fields,
            size: offset,
        })
    }
}

impl TryFrom<&str> for FormatSpec {
    type Error = FormatError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl fmt::Display for FormatSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn expect_bytes(value: &Value, index: usize, code: char) -> Result<&[u8], FormatError> {
    value.as_bytes().ok_or_else(|| FormatError::Type {
        index,
        code,
        wanted: "bytes",
        found: value.type_name().to_string(),
    })
}

fn pack_scalar(
    code: Code,
    native: bool,
    little: bool,
    value: &Value,
    index: usize,
    out: &mut [u8],
) -> Result<(), FormatError> {
    let c = code.as_char();
    let type_error = |wanted: &'static str| FormatError::Type {
        index,
        code: c,
        wanted,
        found: value.type_name().to_string(),
    };

    match code {
        Code::Char => {
            let data = expect_bytes(value, index, c)?;
            if data.len() != 1 {
                return Err(FormatError::Type {
                    index,
                    code: c,
                    wanted: "bytes of length 1",
                    found: format!("bytes of length {}", data.len()),
                });
            }
            out[0] = data[0];
        }
        Code::Bool => {
            out[0] = match value {
                Value::Bool(b) => *b as u8,
                Value::Int(v) => (*v != 0) as u8,
                _ => return Err(type_error("bool")),
            };
        }
        Code::F32 => {
            let v = value.as_float().ok_or_else(|| type_error("float"))?;
            if v.is_finite() && v.abs() > f32::MAX as f64 {
                return Err(FormatError::Range {
                    index,
                    code: c,
                    value: v.to_string(),
                });
            }
            let bytes = if little {
                (v as f32).to_le_bytes()
            } else {
                (v as f32).to_be_bytes()
            };
            out.copy_from_slice(&bytes);
        }
        Code::F64 => {
            let v = value.as_float().ok_or_else(|| type_error("float"))?;
            let bytes = if little { v.to_le_bytes() } else { v.to_be_bytes() };
            out.copy_from_slice(&bytes);
        }
        _ => {
            let Some((signed, width)) = code.integer(native) else {
                return Err(type_error("a packable value"));
            };
            let v = value.as_int().ok_or_else(|| type_error("int"))?;
            let bits = (width * 8) as u32;
            let (min, max) = if signed {
                (-(1i128 << (bits - 1)), (1i128 << (bits - 1)) - 1)
            } else {
                (0, (1i128 << bits) - 1)
            };
            if v < min || v > max {
                return Err(FormatError::Range {
                    index,
                    code: c,
                    value: v.to_string(),
                });
            }
            let le = (v as u128).to_le_bytes();
            if little {
                out.copy_from_slice(&le[..width]);
            } else {
                for (dst, src) in out.iter_mut().zip(le[..width].iter().rev()) {
                    *dst = *src;
                }
            }
        }
    }
    Ok(())
}

fn unpack_scalar(code: Code, native: bool, little: bool, raw: &[u8]) -> Value {
    match code {
        Code::Char => Value::Bytes(vec![raw[0]]),
        Code::Bool => Value::Bool(raw[0] != 0),
        Code::F32 => {
            let mut b = [0u8; 4];
            b.copy_from_slice(raw);
            let v = if little {
                f32::from_le_bytes(b)
            } else {
                f32::from_be_bytes(b)
            };
            Value::Float(v as f64)
        }
        Code::F64 => {
            let mut b = [0u8; 8];
            b.copy_from_slice(raw);
            Value::Float(if little {
                f64::from_le_bytes(b)
            } else {
                f64::from_be_bytes(b)
            })
        }
        _ => {
            let (signed, width) = code.integer(native).unwrap_or((false, raw.len()));
            let mut le = [0u8; 16];
            if little {
                le[..width].copy_from_slice(raw);
            } else {
                for (dst, src) in le[..width].iter_mut().zip(raw.iter().rev()) {
                    *dst = *src;
                }
            }
            let unsigned = u128::from_le_bytes(le);
            let shift = 128 - (width as u32 * 8);
            let v = if signed {
                ((unsigned << shift) as i128) >> shift
            } else {
                unsigned as i128
            };
            Value::Int(v)
        }
    }
}

fn parse_int(input: &str) -> Option<i128> {
    let (negative, digits) = match input.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, input),
    };
    let magnitude = match digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        Some(hex) => i128::from_str_radix(hex, 16).ok()?,
        None => digits.parse::<i128>().ok()?,
    };
    Some(if negative { -magnitude } else { magnitude })
}
