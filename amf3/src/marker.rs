use crate::DecodeError;

pub(crate) const UNDEFINED: u8 = 0x00;
pub(crate) const NULL: u8 = 0x01;
pub(crate) const FALSE: u8 = 0x02;
pub(crate) const TRUE: u8 = 0x03;
pub(crate) const INTEGER: u8 = 0x04;
pub(crate) const DOUBLE: u8 = 0x05;
pub(crate) const STRING: u8 = 0x06;
pub(crate) const XML_DOC: u8 = 0x07;
pub(crate) const DATE: u8 = 0x08;
pub(crate) const ARRAY: u8 = 0x09;
pub(crate) const OBJECT: u8 = 0x0A;
pub(crate) const XML: u8 = 0x0B;
pub(crate) const BYTE_ARRAY: u8 = 0x0C;
pub(crate) const VECTOR_INT: u8 = 0x0D;
pub(crate) const VECTOR_UINT: u8 = 0x0E;
pub(crate) const VECTOR_DOUBLE: u8 = 0x0F;
pub(crate) const VECTOR_OBJECT: u8 = 0x10;
pub(crate) const DICTIONARY: u8 = 0x11;

// https://github.com/q191201771/doc/blob/master/spec-amf-file-format-spec.pdf
// Section 3.12: U29O with inline traits, not externalizable, dynamic, no sealed members.
pub(crate) const DYNAMIC_ANONYMOUS_TRAIT: u32 = 0x0B;

/// U29S header of the empty string. Terminates dynamic members, marks an
/// empty associative array part and an anonymous class name.
pub(crate) const EMPTY_STRING: u8 = 0x01;

/// Value markers handled by the codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    Null,
    False,
    True,
    Integer,
    Double,
    String,
    Array,
    Object,
}

impl Marker {
    pub(crate) fn from_byte(byte: u8) -> Result<Self, DecodeError> {
        let marker = match byte {
            NULL => Self::Null,
            FALSE => Self::False,
            TRUE => Self::True,
            INTEGER => Self::Integer,
            DOUBLE => Self::Double,
            STRING => Self::String,
            ARRAY => Self::Array,
            OBJECT => Self::Object,
            _ => return Err(unsupported(byte)),
        };
        Ok(marker)
    }

    pub fn byte(self) -> u8 {
        match self {
            Self::Null => NULL,
            Self::False => FALSE,
            Self::True => TRUE,
            Self::Integer => INTEGER,
            Self::Double => DOUBLE,
            Self::String => STRING,
            Self::Array => ARRAY,
            Self::Object => OBJECT,
        }
    }

    /// Wire type name used in error messages.
    pub fn type_name(self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::False | Self::True => "boolean",
            Self::Integer => "integer",
            Self::Double => "double",
            Self::String => "string",
            Self::Array => "array",
            Self::Object => "object",
        }
    }
}

fn unsupported(byte: u8) -> DecodeError {
    let name = match byte {
        UNDEFINED => "undefined",
        XML_DOC => "xml document",
        DATE => "date",
        XML => "xml",
        BYTE_ARRAY => "byte array",
        VECTOR_INT => "int vector",
        VECTOR_UINT => "uint vector",
        VECTOR_DOUBLE => "double vector",
        VECTOR_OBJECT => "object vector",
        DICTIONARY => "dictionary",
        _ => return DecodeError::UnknownMarker(byte),
    };
    DecodeError::UnsupportedMarker { marker: byte, name }
}
