use std::fmt::Display;

/// A typed application value exchanged with a cursor.
///
/// Keys and values are sequences of fields; the codec for a table decides how each field is laid
/// out in the ordered byte representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    /// Signed integer; narrower signed formats are range checked on encode
    Int(i64),
    /// Unsigned integer or record number
    UInt(u64),
    /// UTF-8 string
    Str(String),
    /// Opaque byte string
    Bytes(Vec<u8>),
}

impl Field {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::UInt(v) => Some(*v),
            Self::Int(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::UInt(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            Self::Str(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    /// Short name of the variant, used in format errors
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Int(_) => "signed integer",
            Self::UInt(_) => "unsigned integer",
            Self::Str(_) => "string",
            Self::Bytes(_) => "byte string",
        }
    }
}

impl Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::UInt(v) => write!(f, "{v}"),
            Self::Str(s) => write!(f, "{s}"),
            Self::Bytes(b) => match std::str::from_utf8(b) {
                Ok(s) => write!(f, "{s}"),
                Err(_) => {
                    write!(f, "0x")?;
                    for byte in b {
                        write!(f, "{byte:02x}")?;
                    }
                    Ok(())
                }
            },
        }
    }
}

impl From<&str> for Field {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for Field {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for Field {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Field {
    fn from(value: i32) -> Self {
        Self::Int(value.into())
    }
}

impl From<u64> for Field {
    fn from(value: u64) -> Self {
        Self::UInt(value)
    }
}

impl From<u32> for Field {
    fn from(value: u32) -> Self {
        Self::UInt(value.into())
    }
}

impl From<Vec<u8>> for Field {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

/// Joins fields with a single space, the way the REPL prints keys and values
pub fn display_fields(fields: &[Field]) -> String {
    fields
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn conversions() {
        assert_eq!(Field::from("foo").as_str(), Some("foo"));
        assert_eq!(Field::from(7_u32).as_u64(), Some(7));
        assert_eq!(Field::from(-3).as_u64(), None);
        assert_eq!(Field::from(-3).as_i64(), Some(-3));
        assert_eq!(Field::UInt(u64::MAX).as_i64(), None);
    }

    #[test]
    fn display() {
        assert_eq!(Field::Bytes(vec![0xff, 0x01]).to_string(), "0xff01");
        assert_eq!(Field::Bytes(b"abc".to_vec()).to_string(), "abc");
        assert_eq!(
            display_fields(&["Canada".into(), Field::Int(37), Field::UInt(9)]),
            "Canada 37 9"
        );
    }
}
