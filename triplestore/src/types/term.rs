//! RDF term types and their canonical byte encoding.
//!
//! The encoding is what the interner stores and hashes, so two terms are
//! equal iff their encodings are equal.
//!
//! # Encoding
//!
//! ```text
//! +------+-----------------------------------------------+
//! | 0    | term kind (1 byte)                            |
//! | 1-4  | value length (u32 LE) followed by value bytes |
//! | ...  | literal only: flags (1 byte)                  |
//! | ...  | literal only: language (u32 LE len + bytes)   |
//! | ...  | literal only: datatype (u32 LE len + bytes)   |
//! +------+-----------------------------------------------+
//! ```

use std::fmt;

/// Term kind discriminants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TermKind {
    Iri = 0x01,
    BlankNode = 0x02,
    Literal = 0x03,
}

impl TryFrom<u8> for TermKind {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Self::Iri),
            0x02 => Ok(Self::BlankNode),
            0x03 => Ok(Self::Literal),
            _ => Err(value),
        }
    }
}

const LITERAL_HAS_LANGUAGE: u8 = 0x01;
const LITERAL_HAS_DATATYPE: u8 = 0x02;

/// A literal value with optional language tag and datatype IRI.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Literal {
    pub value: String,
    pub language: Option<String>,
    pub datatype: Option<String>,
}

/// An RDF term.
///
/// Terms are immutable values with structural equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Term {
    Iri(String),
    BlankNode(String),
    Literal(Literal),
}

impl Term {
    #[must_use]
    pub fn iri(iri: impl Into<String>) -> Self {
        Self::Iri(iri.into())
    }

    #[must_use]
    pub fn blank(label: impl Into<String>) -> Self {
        Self::BlankNode(label.into())
    }

    /// A plain literal with neither language tag nor datatype.
    #[must_use]
    pub fn literal(value: impl Into<String>) -> Self {
        Self::Literal(Literal {
            value: value.into(),
            language: None,
            datatype: None,
        })
    }

    #[must_use]
    pub fn lang_literal(value: impl Into<String>, language: impl Into<String>) -> Self {
        Self::Literal(Literal {
            value: value.into(),
            language: Some(language.into()),
            datatype: None,
        })
    }

    #[must_use]
    pub fn typed_literal(value: impl Into<String>, datatype: impl Into<String>) -> Self {
        Self::Literal(Literal {
            value: value.into(),
            language: None,
            datatype: Some(datatype.into()),
        })
    }

    #[must_use]
    pub const fn kind(&self) -> TermKind {
        match self {
            Self::Iri(_) => TermKind::Iri,
            Self::BlankNode(_) => TermKind::BlankNode,
            Self::Literal(_) => TermKind::Literal,
        }
    }

    /// Whether this term may appear as a subject, predicate or graph name.
    #[must_use]
    pub const fn is_resource(&self) -> bool {
        matches!(self, Self::Iri(_) | Self::BlankNode(_))
    }

    /// Size of the canonical encoding in bytes.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        match self {
            Self::Iri(s) | Self::BlankNode(s) => 1 + 4 + s.len(),
            Self::Literal(lit) => {
                1 + 4
                    + lit.value.len()
                    + 1
                    + lit.language.as_ref().map_or(0, |l| 4 + l.len())
                    + lit.datatype.as_ref().map_or(0, |d| 4 + d.len())
            }
        }
    }

    /// Serialize to the canonical encoding.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.encoded_len());
        bytes.push(self.kind() as u8);

        match self {
            Self::Iri(s) | Self::BlankNode(s) => put_str(&mut bytes, s),
            Self::Literal(lit) => {
                put_str(&mut bytes, &lit.value);
                let mut flags = 0u8;
                if lit.language.is_some() {
                    flags |= LITERAL_HAS_LANGUAGE;
                }
                if lit.datatype.is_some() {
                    flags |= LITERAL_HAS_DATATYPE;
                }
                bytes.push(flags);
                if let Some(language) = &lit.language {
                    put_str(&mut bytes, language);
                }
                if let Some(datatype) = &lit.datatype {
                    put_str(&mut bytes, datatype);
                }
            }
        }

        bytes
    }

    /// Deserialize from the canonical encoding.
    ///
    /// The whole slice must be consumed.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TermError> {
        let mut reader = Reader { bytes, offset: 0 };
        let kind = TermKind::try_from(reader.u8()?).map_err(TermError::InvalidKind)?;

        let term = match kind {
            TermKind::Iri => Self::Iri(reader.string()?),
            TermKind::BlankNode => Self::BlankNode(reader.string()?),
            TermKind::Literal => {
                let value = reader.string()?;
                let flags = reader.u8()?;
                if flags & !(LITERAL_HAS_LANGUAGE | LITERAL_HAS_DATATYPE) != 0 {
                    return Err(TermError::InvalidFlags(flags));
                }
                let language = if flags & LITERAL_HAS_LANGUAGE == 0 {
                    None
                } else {
                    Some(reader.string()?)
                };
                let datatype = if flags & LITERAL_HAS_DATATYPE == 0 {
                    None
                } else {
                    Some(reader.string()?)
                };
                Self::Literal(Literal {
                    value,
                    language,
                    datatype,
                })
            }
        };

        if reader.offset != bytes.len() {
            return Err(TermError::TrailingBytes(bytes.len() - reader.offset));
        }

        Ok(term)
    }
}

#[allow(clippy::cast_possible_truncation)] // term strings are far below 4GB
fn put_str(bytes: &mut Vec<u8>, s: &str) {
    bytes.extend_from_slice(&(s.len() as u32).to_le_bytes());
    bytes.extend_from_slice(s.as_bytes());
}

struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl Reader<'_> {
    fn take(&mut self, len: usize) -> Result<&[u8], TermError> {
        let end = self
            .offset
            .checked_add(len)
            .filter(|&end| end <= self.bytes.len())
            .ok_or(TermError::Truncated)?;
        let slice = &self.bytes[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, TermError> {
        Ok(self.take(1)?[0])
    }

    fn string(&mut self) -> Result<String, TermError> {
        let len_bytes = self.take(4)?;
        let len = u32::from_le_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]]);
        let data = self.take(len as usize)?;
        String::from_utf8(data.to_vec()).map_err(|_| TermError::InvalidUtf8)
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Iri(iri) => write!(f, "<{iri}>"),
            Self::BlankNode(label) => write!(f, "_:{label}"),
            Self::Literal(lit) => {
                write!(f, "{:?}", lit.value)?;
                if let Some(language) = &lit.language {
                    write!(f, "@{language}")?;
                }
                if let Some(datatype) = &lit.datatype {
                    write!(f, "^^<{datatype}>")?;
                }
                Ok(())
            }
        }
    }
}

/// Errors decoding a stored term.
#[derive(Debug, PartialEq, Eq)]
pub enum TermError {
    /// Unknown term kind byte.
    InvalidKind(u8),
    /// Unknown literal flag bits.
    InvalidFlags(u8),
    /// Encoding ended early.
    Truncated,
    /// Bytes left over after the term.
    TrailingBytes(usize),
    /// String data is not UTF-8.
    InvalidUtf8,
}

impl fmt::Display for TermError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidKind(v) => write!(f, "invalid term kind: 0x{v:02x}"),
            Self::InvalidFlags(v) => write!(f, "invalid literal flags: 0x{v:02x}"),
            Self::Truncated => write!(f, "term encoding truncated"),
            Self::TrailingBytes(n) => write!(f, "{n} trailing bytes after term"),
            Self::InvalidUtf8 => write!(f, "term string is not valid UTF-8"),
        }
    }
}

impl std::error::Error for TermError {}
