use std::borrow::Cow;

/// Limits applied while decoding untrusted input.
///
/// The tables grow for the whole session otherwise, and nesting is bounded
/// only by the call stack.
#[derive(Debug, Clone)]
pub struct DecoderConfig {
    /// Maximum nesting of arrays and objects.
    pub max_depth: Option<usize>,
    /// Maximum number of strings in the string table.
    pub max_strings: Option<usize>,
    /// Maximum number of arrays and objects in the object table.
    pub max_objects: Option<usize>,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            max_depth: Some(256),
            max_strings: None,
            max_objects: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EncoderConfig {
    pub field_naming: FieldNaming,
}

/// How record fields without an explicit wire name are named on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FieldNaming {
    /// `message_id` is written as `messageId`.
    #[default]
    CamelCase,
    /// Field identifiers are written as declared.
    Declared,
}

impl FieldNaming {
    pub fn apply(self, ident: &str) -> Cow<'_, str> {
        match self {
            Self::Declared => Cow::Borrowed(ident),
            Self::CamelCase if !ident.contains('_') => Cow::Borrowed(ident),
            Self::CamelCase => Cow::Owned(to_camel_case(ident)),
        }
    }
}

pub(crate) fn to_camel_case(ident: &str) -> String {
    let mut camel = String::with_capacity(ident.len());
    let mut upper_next = false;
    for c in ident.chars() {
        if c == '_' {
            upper_next = !camel.is_empty();
        } else if upper_next {
            camel.extend(c.to_uppercase());
            upper_next = false;
        } else {
            camel.push(c);
        }
    }
    camel
}
