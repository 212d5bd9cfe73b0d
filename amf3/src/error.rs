use std::io;

use thiserror::Error;

/// Broad failure category shared by [`DecodeError`] and [`EncodeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Io,
    MalformedWire,
    TypeMismatch,
    UnsupportedFeature,
    KeyNotFound,
    UnsupportedType,
}

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("IO error reading {wanted} bytes at offset {offset}: {source}")]
    Io {
        offset: u64,
        wanted: usize,
        #[source]
        source: io::Error,
    },

    #[error("Unknown marker: {0:#04x}")]
    UnknownMarker(u8),

    #[error("Unsupported AMF3 type: {name} (marker {marker:#04x})")]
    UnsupportedMarker { marker: u8, name: &'static str },

    #[error("Typed objects are not supported (trait header {0:#x})")]
    TypedObject(u32),

    #[error("Externalizable objects are not supported (trait header {0:#x})")]
    ExternalizableObject(u32),

    #[error("Named classes are not supported (class name header {0:#04x})")]
    NamedClass(u8),

    #[error("Associative array part is not supported (found {0:#04x})")]
    AssociativeArray(u8),

    #[error("Invalid UTF-8 string")]
    InvalidUtf8,

    #[error("String reference {index} out of bounds ({len} strings cached)")]
    StringReferenceOutOfBounds { index: usize, len: usize },

    #[error("Object reference {index} out of bounds ({len} objects cached)")]
    ObjectReferenceOutOfBounds { index: usize, len: usize },

    #[error("Object reference {index} points at {type_name} which is still being decoded")]
    UnsharedCycle {
        index: usize,
        type_name: &'static str,
    },

    #[error("Nesting deeper than {0} levels")]
    NestingTooDeep(usize),

    #[error("{table} table exceeded {limit} entries")]
    CacheLimitExceeded { table: &'static str, limit: usize },

    #[error("Cannot decode {found} into {expected}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("Cannot parse {value:?} as {expected}")]
    InvalidNumber {
        value: String,
        expected: &'static str,
    },

    #[error("Key {key:?} not found in record {record}")]
    KeyNotFound { key: String, record: &'static str },
}

impl DecodeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io { .. } => ErrorKind::Io,
            Self::UnknownMarker(_)
            | Self::InvalidUtf8
            | Self::StringReferenceOutOfBounds { .. }
            | Self::ObjectReferenceOutOfBounds { .. }
            | Self::NestingTooDeep(_)
            | Self::CacheLimitExceeded { .. } => ErrorKind::MalformedWire,
            Self::UnsupportedMarker { .. }
            | Self::TypedObject(_)
            | Self::ExternalizableObject(_)
            | Self::NamedClass(_)
            | Self::AssociativeArray(_) => ErrorKind::UnsupportedFeature,
            Self::TypeMismatch { .. } | Self::InvalidNumber { .. } | Self::UnsharedCycle { .. } => {
                ErrorKind::TypeMismatch
            }
            Self::KeyNotFound { .. } => ErrorKind::KeyNotFound,
        }
    }
}

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Value {0:#x} does not fit in U29")]
    OutOfRangeU29(u32),

    #[error("String too long: {0} bytes (max {max})", max = crate::u29::U28_MAX)]
    StringTooLong(usize),

    #[error("Array too long: {0} elements (max {max})", max = crate::u29::U28_MAX)]
    ArrayTooLong(usize),

    #[error("Empty member name in {owner}")]
    EmptyMemberName { owner: &'static str },

    #[error("{type_name} is mutably borrowed")]
    Borrowed { type_name: &'static str },
}

impl EncodeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) => ErrorKind::Io,
            Self::OutOfRangeU29(_) => ErrorKind::MalformedWire,
            Self::StringTooLong(_)
            | Self::ArrayTooLong(_)
            | Self::EmptyMemberName { .. }
            | Self::Borrowed { .. } => ErrorKind::UnsupportedType,
        }
    }
}

impl DecodeError {
    /// Type mismatch between the wire value `found` and destination `T`.
    pub fn mismatch<T: ?Sized>(found: crate::Marker) -> Self {
        Self::TypeMismatch {
            expected: std::any::type_name::<T>(),
            found: found.type_name(),
        }
    }
}
