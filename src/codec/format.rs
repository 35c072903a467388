use std::fmt::Display;

use log::trace;

use super::Field;
use crate::{
    calculate_offsets,
    storage::{CursorError, Result},
};

/// Layout of a single field inside a packed key or value.
///
/// Integers are stored big-endian at their fixed width. Signed formats flip the sign bit so that
/// byte order and numeric order agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldFormat {
    /// `b`
    Int8,
    /// `B`
    UInt8,
    /// `h`
    Int16,
    /// `H`
    UInt16,
    /// `i` or `l`
    Int32,
    /// `I` or `L`
    UInt32,
    /// `q`
    Int64,
    /// `Q`
    UInt64,
    /// `r`; only valid as the whole key of a table
    RecordNumber,
    /// `S`; NUL terminated unless it is the last field
    String,
    /// `Ns`; exactly N bytes, NUL padded
    FixedString(usize),
    /// `u`; length prefixed unless it is the last field
    Bytes,
}

const LEN_PREFIX_SIZE: usize = std::mem::size_of::<u32>();

/// Largest repeat count or fixed string width a format string may carry
pub const MAX_FORMAT_COUNT: usize = u16::MAX as usize;

impl FieldFormat {
    /// Parses a format string such as `S`, `r`, `5sii` or `3Q` into its field layouts.
    pub fn parse_all(fmt: &str) -> Result<Vec<FieldFormat>> {
        if fmt.is_empty() {
            return Err(CursorError::config("empty format string"));
        }

        let mut out = Vec::new();
        let mut count: Option<usize> = None;

        for c in fmt.chars() {
            if let Some(digit) = c.to_digit(10) {
                let n = count
                    .unwrap_or(0)
                    .checked_mul(10)
                    .and_then(|n| n.checked_add(digit as usize))
                    .filter(|n| *n <= MAX_FORMAT_COUNT)
                    .ok_or_else(|| {
                        CursorError::config(format!(
                            "count in `{fmt}` exceeds {MAX_FORMAT_COUNT}"
                        ))
                    })?;
                count = Some(n);
                continue;
            }

            let single = match c {
                'b' => Self::Int8,
                'B' => Self::UInt8,
                'h' => Self::Int16,
                'H' => Self::UInt16,
                'i' | 'l' => Self::Int32,
                'I' | 'L' => Self::UInt32,
                'q' => Self::Int64,
                'Q' => Self::UInt64,
                'r' => Self::RecordNumber,
                'S' => Self::String,
                'u' => Self::Bytes,
                's' => {
                    let width = count.take().unwrap_or(1);
                    if width == 0 {
                        return Err(CursorError::config(format!(
                            "zero width string in `{fmt}`"
                        )));
                    }
                    out.push(Self::FixedString(width));
                    continue;
                }
                other => {
                    return Err(CursorError::config(format!(
                        "unknown format character `{other}` in `{fmt}`"
                    )))
                }
            };

            let repeat = count.take().unwrap_or(1);
            if repeat == 0 {
                return Err(CursorError::config(format!("zero repeat count in `{fmt}`")));
            }
            out.extend(std::iter::repeat(single).take(repeat));
        }

        if count.is_some() {
            return Err(CursorError::config(format!(
                "format `{fmt}` ends with a dangling count"
            )));
        }

        Ok(out)
    }

    /// Width in bytes of fixed-size formats
    pub fn fixed_width(&self) -> Option<usize> {
        match self {
            Self::Int8 | Self::UInt8 => Some(1),
            Self::Int16 | Self::UInt16 => Some(2),
            Self::Int32 | Self::UInt32 => Some(4),
            Self::Int64 | Self::UInt64 | Self::RecordNumber => Some(8),
            Self::FixedString(n) => Some(*n),
            Self::String | Self::Bytes => None,
        }
    }

    /// Zero value used for columns a projected cursor did not write
    pub fn default_field(&self) -> Field {
        match self {
            Self::Int8 | Self::Int16 | Self::Int32 | Self::Int64 => Field::Int(0),
            Self::UInt8 | Self::UInt16 | Self::UInt32 | Self::UInt64 => Field::UInt(0),
            Self::RecordNumber => Field::UInt(1),
            Self::String | Self::FixedString(_) => Field::Str(String::new()),
            Self::Bytes => Field::Bytes(Vec::new()),
        }
    }

    fn is_signed(&self) -> bool {
        matches!(self, Self::Int8 | Self::Int16 | Self::Int32 | Self::Int64)
    }

    /// Appends the encoding of `field` to `out`.
    ///
    /// `last` marks the final field of a tuple, which is stored without a terminator or length.
    pub fn encode_into(&self, field: &Field, last: bool, out: &mut Vec<u8>) -> Result<()> {
        match self {
            Self::Int8 | Self::Int16 | Self::Int32 | Self::Int64 => {
                let v = field.as_i64().ok_or_else(|| self.mismatch(field))?;
                let width = self.fixed_width().unwrap_or(8);
                let bits = width * 8;
                let (min, max) = if bits == 64 {
                    (i64::MIN, i64::MAX)
                } else {
                    (-(1_i64 << (bits - 1)), (1_i64 << (bits - 1)) - 1)
                };
                if v < min || v > max {
                    return Err(CursorError::format(format!(
                        "{v} out of range for `{self}`"
                    )));
                }

                let encoded = (v as u64) ^ (1_u64 << (bits - 1));
                out.extend_from_slice(&encoded.to_be_bytes()[8 - width..]);
            }
            Self::UInt8 | Self::UInt16 | Self::UInt32 | Self::UInt64 | Self::RecordNumber => {
                let v = field.as_u64().ok_or_else(|| self.mismatch(field))?;
                let width = self.fixed_width().unwrap_or(8);
                if width < 8 && v >> (width * 8) != 0 {
                    return Err(CursorError::format(format!(
                        "{v} out of range for `{self}`"
                    )));
                }
                if *self == Self::RecordNumber && v == 0 {
                    return Err(CursorError::format("record numbers start at 1"));
                }
                out.extend_from_slice(&v.to_be_bytes()[8 - width..]);
            }
            Self::String => {
                let s = field.as_str().ok_or_else(|| self.mismatch(field))?;
                if s.as_bytes().contains(&0) {
                    return Err(CursorError::format("string field contains a NUL byte"));
                }
                out.extend_from_slice(s.as_bytes());
                if !last {
                    out.push(0);
                }
            }
            Self::FixedString(width) => {
                let s = field.as_str().ok_or_else(|| self.mismatch(field))?;
                let mut end = s.len().min(*width);
                while !s.is_char_boundary(end) {
                    end -= 1;
                }
                out.extend_from_slice(&s.as_bytes()[..end]);
                out.extend(std::iter::repeat(0).take(width - end));
            }
            Self::Bytes => {
                let b = field.as_bytes().ok_or_else(|| self.mismatch(field))?;
                if !last {
                    let len = u32::try_from(b.len())
                        .map_err(|_| CursorError::format("byte field longer than 4GiB"))?;
                    out.extend_from_slice(&len.to_be_bytes());
                }
                out.extend_from_slice(b);
            }
        }

        Ok(())
    }

    /// Decodes one field starting at `pos`, returning the field and the position after it.
    pub fn decode_at(&self, bytes: &[u8], pos: usize, last: bool) -> Result<(Field, usize)> {
        let remaining = bytes.len().saturating_sub(pos);

        match self {
            Self::String => {
                let (raw, next) = if last {
                    (&bytes[pos..], bytes.len())
                } else {
                    let nul = bytes[pos..]
                        .iter()
                        .position(|b| *b == 0)
                        .ok_or_else(|| CursorError::format("unterminated string field"))?;
                    (&bytes[pos..pos + nul], pos + nul + 1)
                };
                Ok((Field::Str(utf8(raw)?), next))
            }
            Self::Bytes => {
                if last {
                    return Ok((Field::Bytes(bytes[pos..].to_vec()), bytes.len()));
                }

                let (start, end) = calculate_offsets!(pos, LEN_PREFIX_SIZE);
                let prefix = bytes
                    .get(start..end)
                    .ok_or_else(|| truncated(self, LEN_PREFIX_SIZE, remaining))?;
                let len = u32::from_be_bytes(
                    prefix
                        .try_into()
                        .map_err(|_| truncated(self, LEN_PREFIX_SIZE, remaining))?,
                ) as usize;

                let (start, end) = calculate_offsets!(end, len);
                let raw = bytes
                    .get(start..end)
                    .ok_or_else(|| truncated(self, LEN_PREFIX_SIZE + len, remaining))?;
                Ok((Field::Bytes(raw.to_vec()), end))
            }
            fixed => {
                let width = fixed.fixed_width().unwrap_or(0);
                let (start, end) = calculate_offsets!(pos, width);
                let raw = bytes
                    .get(start..end)
                    .ok_or_else(|| truncated(self, width, remaining))?;

                let field = match fixed {
                    Self::FixedString(_) => {
                        let trimmed = raw.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
                        Field::Str(utf8(&raw[..trimmed])?)
                    }
                    _ => {
                        let mut buf = [0_u8; 8];
                        buf[8 - width..].copy_from_slice(raw);
                        let v = u64::from_be_bytes(buf);

                        if fixed.is_signed() {
                            let bits = width * 8;
                            let flipped = v ^ (1_u64 << (bits - 1));
                            let shift = 64 - bits;
                            Field::Int(((flipped << shift) as i64) >> shift)
                        } else {
                            if *fixed == Self::RecordNumber && v == 0 {
                                return Err(CursorError::format("record number 0 is invalid"));
                            }
                            Field::UInt(v)
                        }
                    }
                };
                trace!("decoded `{fixed}` field at {pos}");
                Ok((field, end))
            }
        }
    }

    /// Parses a field from its textual form, as typed at the REPL
    pub fn parse_text(&self, text: &str) -> Result<Field> {
        let field = match self {
            Self::Int8 | Self::Int16 | Self::Int32 | Self::Int64 => Field::Int(
                text.parse()
                    .map_err(|e| CursorError::format(format!("`{text}` for `{self}`; {e}")))?,
            ),
            Self::UInt8 | Self::UInt16 | Self::UInt32 | Self::UInt64 | Self::RecordNumber => {
                Field::UInt(
                    text.parse()
                        .map_err(|e| CursorError::format(format!("`{text}` for `{self}`; {e}")))?,
                )
            }
            Self::String | Self::FixedString(_) => Field::Str(text.to_string()),
            Self::Bytes => Field::Bytes(text.as_bytes().to_vec()),
        };

        Ok(field)
    }

    fn mismatch(&self, field: &Field) -> CursorError {
        CursorError::format(format!("cannot store {} as `{self}`", field.kind()))
    }
}

impl Display for FieldFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int8 => write!(f, "b"),
            Self::UInt8 => write!(f, "B"),
            Self::Int16 => write!(f, "h"),
            Self::UInt16 => write!(f, "H"),
            Self::Int32 => write!(f, "i"),
            Self::UInt32 => write!(f, "I"),
            Self::Int64 => write!(f, "q"),
            Self::UInt64 => write!(f, "Q"),
            Self::RecordNumber => write!(f, "r"),
            Self::String => write!(f, "S"),
            Self::FixedString(n) => write!(f, "{n}s"),
            Self::Bytes => write!(f, "u"),
        }
    }
}

fn utf8(raw: &[u8]) -> Result<String> {
    String::from_utf8(raw.to_vec()).map_err(|e| CursorError::format(format!("invalid utf-8; {e}")))
}

fn truncated(format: &FieldFormat, needed: usize, available: usize) -> CursorError {
    CursorError::format(format!(
        "truncated `{format}` field; needed {needed} bytes, {available} available"
    ))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_repeat_counts_and_widths() {
        assert_eq!(
            FieldFormat::parse_all("5sii").unwrap(),
            vec![
                FieldFormat::FixedString(5),
                FieldFormat::Int32,
                FieldFormat::Int32
            ]
        );
        assert_eq!(
            FieldFormat::parse_all("3Q").unwrap(),
            vec![FieldFormat::UInt64; 3]
        );
        assert_eq!(
            FieldFormat::parse_all("s").unwrap(),
            vec![FieldFormat::FixedString(1)]
        );
    }

    #[test]
    fn rejects_bad_formats() {
        assert!(FieldFormat::parse_all("").is_err());
        assert!(FieldFormat::parse_all("Sz").is_err());
        assert!(FieldFormat::parse_all("i3").is_err());
        assert!(FieldFormat::parse_all("0s").is_err());
    }

    #[test]
    fn caps_counts_and_widths() {
        assert_eq!(
            FieldFormat::parse_all("65535s").unwrap(),
            vec![FieldFormat::FixedString(MAX_FORMAT_COUNT)]
        );
        assert_eq!(FieldFormat::parse_all("65535b").unwrap().len(), MAX_FORMAT_COUNT);

        for fmt in ["65536Q", "99999999999Q", "70000s", "184467440737095516160i"] {
            assert!(matches!(
                FieldFormat::parse_all(fmt),
                Err(CursorError::Config(_))
            ));
        }
    }

    #[test]
    fn signed_encoding_flips_sign_bit() {
        let mut out = Vec::new();
        FieldFormat::Int8
            .encode_into(&Field::Int(-1), true, &mut out)
            .unwrap();
        FieldFormat::Int8
            .encode_into(&Field::Int(0), true, &mut out)
            .unwrap();
        assert_eq!(out, vec![0x7f, 0x80]);

        let (field, next) = FieldFormat::Int8.decode_at(&out, 0, false).unwrap();
        assert_eq!(field, Field::Int(-1));
        assert_eq!(next, 1);
    }

    #[test]
    fn range_checks() {
        let mut out = Vec::new();
        assert!(FieldFormat::Int8
            .encode_into(&Field::Int(128), true, &mut out)
            .is_err());
        assert!(FieldFormat::UInt16
            .encode_into(&Field::UInt(70_000), true, &mut out)
            .is_err());
        assert!(FieldFormat::RecordNumber
            .encode_into(&Field::UInt(0), true, &mut out)
            .is_err());
        assert!(out.is_empty());
    }

    #[test]
    fn fixed_strings_pad_and_truncate() {
        let mut out = Vec::new();
        FieldFormat::FixedString(5)
            .encode_into(&"UK".into(), false, &mut out)
            .unwrap();
        assert_eq!(out, b"UK\0\0\0");
        out.clear();
        FieldFormat::FixedString(3)
            .encode_into(&"Canada".into(), false, &mut out)
            .unwrap();
        assert_eq!(out, b"Can");

        let (field, _) = FieldFormat::FixedString(3).decode_at(&out, 0, true).unwrap();
        assert_eq!(field, Field::from("Can"));
    }

    #[test]
    fn truncated_input() {
        let err = FieldFormat::UInt32.decode_at(&[0, 1], 0, true).unwrap_err();
        assert!(matches!(err, CursorError::Format(_)));
        let err = FieldFormat::String.decode_at(b"abc", 0, false).unwrap_err();
        assert!(matches!(err, CursorError::Format(_)));
    }
}
