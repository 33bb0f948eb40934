//! Core identifier model: file ids, composite symbol ids, locations.

use crate::encoding::{self, SEPARATOR};
use crate::error::EncodeError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::num::NonZeroU32;

/// Opaque 32-bit file identifier, assigned on first registration of a path
/// and stable for the lifetime of that path within a running daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileId(NonZeroU32);

impl FileId {
    pub fn new(value: u32) -> Option<Self> {
        NonZeroU32::new(value).map(Self)
    }

    pub fn value(&self) -> u32 {
        self.0.get()
    }
}

/// Global identity of a symbol: the file it was declared in plus a local id
/// assigned monotonically per file starting at 1.
///
/// A local part of zero is allowed and marks a file-level symbol slot. The
/// all-zero composite is the invalid sentinel; in this codebase it is
/// rendered as `Option::<CompositeSymbolId>::None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CompositeSymbolId {
    pub file: FileId,
    pub local: u32,
}

impl CompositeSymbolId {
    pub fn new(file: FileId, local: u32) -> Self {
        Self { file, local }
    }

    /// Compact textual form: base-63 file id, then a separator and the
    /// base-63 local id when the local part is nonzero.
    pub fn compact(&self) -> String {
        let mut out = encoding::encode(u64::from(self.file.value()));
        if self.local != 0 {
            out.push(SEPARATOR);
            out.push_str(&encoding::encode(u64::from(self.local)));
        }
        out
    }

    /// Parse the compact textual form back into an id.
    ///
    /// Returns `Ok(None)` for the zero sentinel (`"A"`), the textual form
    /// of the invalid id.
    pub fn parse_compact(input: &str) -> Result<Option<Self>, EncodeError> {
        let (file_part, local_part) = match input.split_once(SEPARATOR) {
            Some((f, l)) => (f, Some(l)),
            None => (input, None),
        };

        let file_raw = decode_u32(file_part)?;
        let local = match local_part {
            Some(l) => decode_u32(l)?,
            None => 0,
        };

        match FileId::new(file_raw) {
            Some(file) => Ok(Some(Self { file, local })),
            None if local == 0 => Ok(None),
            // A zero file id with a nonzero local never round-trips from
            // compact(); reject it rather than invent an identity.
            None => Err(EncodeError::MalformedEncoding {
                byte: b'A',
                position: 0,
            }),
        }
    }
}

fn decode_u32(input: &str) -> Result<u32, EncodeError> {
    let value = encoding::decode(input)?;
    u32::try_from(value).map_err(|_| EncodeError::Overflow)
}

impl fmt::Display for CompositeSymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.compact())
    }
}

/// A position within a registered file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file_id: FileId,
    pub line: u32,
    pub column: u16,
}

impl SourceLocation {
    pub fn new(file_id: FileId, line: u32, column: u16) -> Self {
        Self {
            file_id,
            line,
            column,
        }
    }
}

/// What a symbol declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SymbolKind {
    Package,
    Import,
    Type,
    Interface,
    Struct,
    Class,
    Function,
    Method,
    Variable,
    Constant,
    Field,
    Property,
    Parameter,
    Label,
    Module,
    Namespace,
    Enum,
    EnumMember,
    Unknown,
}

impl SymbolKind {
    /// Kinds that answer `/definition` queries: declaration sites of
    /// callable or type-introducing symbols.
    pub fn is_definition(&self) -> bool {
        matches!(
            self,
            Self::Function
                | Self::Class
                | Self::Struct
                | Self::Interface
                | Self::Type
                | Self::Method
        )
    }

    /// Kinds that can root or appear in a call tree.
    pub fn is_callable(&self) -> bool {
        matches!(self, Self::Function | Self::Method)
    }
}

/// The lexical scope a symbol was declared in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScopeKind {
    Global,
    Module,
    Package,
    Class,
    Function,
    Method,
    Block,
    Namespace,
}

/// Compact owned string used throughout the index.
pub type CompactString = Box<str>;

/// Freeform key/value pairs extracted from comments near a declaration.
pub type AnnotationSet = BTreeMap<CompactString, CompactString>;

/// A symbol as stored in the per-file symbol table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolRecord {
    pub id: CompositeSymbolId,
    pub name: CompactString,
    pub kind: SymbolKind,
    pub scope: ScopeKind,
    pub location: SourceLocation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<CompactString>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc: Option<CompactString>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<AnnotationSet>,
}

/// A use of a symbol at some location.
///
/// External references are resolved through an import; they may dangle
/// (`symbol: None`) until the target file is indexed. Dangling is not an
/// error, it is surfaced on the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    /// Resolved target, or `None` while the target is unknown.
    pub symbol: Option<CompositeSymbolId>,
    /// Name the reference was made with.
    pub name: CompactString,
    pub location: SourceLocation,
    pub is_external: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub import_path: Option<CompactString>,
}

/// Exactly three Unicode scalar values, the unit of the trigram index.
pub type Shingle = [char; 3];
