pub mod field;
pub mod format;

pub use field::{display_fields, Field};
pub use format::FieldFormat;

use log::trace;

use crate::storage::{CursorError, Result};

const RECORD_NUMBER: [FieldFormat; 1] = [FieldFormat::RecordNumber];

/// Translates between typed fields and the ordered bytes kept by the store.
///
/// A codec is resolved once from a format string when a table is created or a cursor is opened
/// and is then carried by value; encoding and decoding never re-parse the format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Codec {
    /// Auto-assigned record number keys (`r`)
    RecordNumber,
    /// Any other single-field format
    Single(FieldFormat),
    /// Packed multi-field tuple, fields concatenated in order
    Tuple(Vec<FieldFormat>),
}

impl Codec {
    /// Resolves a key codec; `r` is only accepted as the entire key.
    pub fn key(fmt: &str) -> Result<Self> {
        let formats = FieldFormat::parse_all(fmt)?;
        if formats.len() > 1 && formats.contains(&FieldFormat::RecordNumber) {
            return Err(CursorError::config(format!(
                "record number must be the whole key, got `{fmt}`"
            )));
        }
        Ok(Self::from_formats(formats))
    }

    /// Resolves a value codec; record numbers are not valid value fields.
    pub fn value(fmt: &str) -> Result<Self> {
        let formats = FieldFormat::parse_all(fmt)?;
        if formats.contains(&FieldFormat::RecordNumber) {
            return Err(CursorError::config(format!(
                "record number is not a value format, got `{fmt}`"
            )));
        }
        Ok(Self::from_formats(formats))
    }

    pub fn from_formats(mut formats: Vec<FieldFormat>) -> Self {
        match formats.len() {
            1 => match formats.remove(0) {
                FieldFormat::RecordNumber => Self::RecordNumber,
                single => Self::Single(single),
            },
            _ => Self::Tuple(formats),
        }
    }

    pub fn formats(&self) -> &[FieldFormat] {
        match self {
            Self::RecordNumber => &RECORD_NUMBER,
            Self::Single(format) => std::slice::from_ref(format),
            Self::Tuple(formats) => formats,
        }
    }

    pub fn num_fields(&self) -> usize {
        self.formats().len()
    }

    pub fn is_record_number(&self) -> bool {
        matches!(self, Self::RecordNumber)
    }

    /// The canonical format string for this codec
    pub fn format_string(&self) -> String {
        self.formats().iter().map(|f| f.to_string()).collect()
    }

    /// Packs `fields` into a fresh buffer.
    ///
    /// Fails without producing partial output when the field count or any field type is wrong.
    pub fn encode(&self, fields: &[Field]) -> Result<Vec<u8>> {
        let formats = self.formats();
        if fields.len() != formats.len() {
            return Err(CursorError::format(format!(
                "format `{}` expects {} fields, got {}",
                self.format_string(),
                formats.len(),
                fields.len()
            )));
        }

        let mut out = Vec::new();
        for (i, (format, field)) in formats.iter().zip(fields).enumerate() {
            format.encode_into(field, i + 1 == formats.len(), &mut out)?;
        }
        trace!("encoded {} fields into {} bytes", fields.len(), out.len());

        Ok(out)
    }

    /// Unpacks a buffer produced by [encode](Codec::encode).
    pub fn decode(&self, bytes: &[u8]) -> Result<Vec<Field>> {
        let formats = self.formats();
        let mut fields = Vec::with_capacity(formats.len());
        let mut pos = 0;

        for (i, format) in formats.iter().enumerate() {
            let (field, next) = format.decode_at(bytes, pos, i + 1 == formats.len())?;
            fields.push(field);
            pos = next;
        }

        if pos != bytes.len() {
            return Err(CursorError::format(format!(
                "inexact decode; {} extra bytes remaining",
                bytes.len() - pos
            )));
        }

        Ok(fields)
    }

    /// Parses whitespace separated text into fields.
    ///
    /// When the last field is a string or byte string, any surplus words are joined back into it
    /// so values such as `hello world!` need no quoting.
    pub fn parse_text(&self, input: &str) -> Result<Vec<Field>> {
        let formats = self.formats();
        let mut words: Vec<&str> = input.split_whitespace().collect();

        let last_takes_rest = matches!(
            formats.last(),
            Some(FieldFormat::String | FieldFormat::FixedString(_) | FieldFormat::Bytes)
        );
        let mut tail = None;
        if last_takes_rest && words.len() > formats.len() {
            let rest = words.split_off(formats.len() - 1);
            tail = Some(rest.join(" "));
        }

        let expected = formats.len() - usize::from(tail.is_some());
        if words.len() != expected {
            return Err(CursorError::format(format!(
                "format `{}` expects {} fields, got {}",
                self.format_string(),
                formats.len(),
                words.len() + usize::from(tail.is_some())
            )));
        }

        let mut fields = formats
            .iter()
            .zip(&words)
            .map(|(format, word)| format.parse_text(word))
            .collect::<Result<Vec<_>>>()?;

        if let (Some(rest), Some(format)) = (tail, formats.last()) {
            fields.push(format.parse_text(&rest)?);
        }

        Ok(fields)
    }
}
