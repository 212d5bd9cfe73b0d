use std::{
    any::type_name,
    cell::RefCell,
    collections::HashMap,
    fmt,
    io::{Read, Write},
    rc::Rc,
};

use crate::{
    Decode, DecodeError, Decoder, Encode, EncodeError, Encoder, Identity, ObjectSlot, Reference,
    Scalar, Shared,
    decoding::decode_members,
    encoding::encode_entries,
    u29::{I29_MAX, I29_MIN, U29_MAX, i29_from_u29, u29_from_i29},
};

/// Dynamically typed AMF3 value.
///
/// Arrays and objects are held behind [`Shared`] handles, so aliased and
/// cyclic graphs survive a decode and encode round trip. `PartialEq` and
/// `Debug` follow every handle and do not terminate on a cyclic value;
/// `Display` numbers each composite and prints repeats as `<ref #n>`.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
    #[default]
    Null,
    Boolean(bool),
    /// Raw U29 as read from the wire. Use [`Value::as_i64`] for the signed
    /// interpretation.
    Integer(u32),
    Double(f64),
    String(String),
    Array(Shared<Vec<Value>>),
    Object(Shared<Object>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(u29) => Some(i29_from_u29(*u29) as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Double(double) => Some(*double),
            Self::Integer(u29) => Some(i29_from_u29(*u29) as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(string) => Some(string),
            _ => None,
        }
    }

    pub fn array(&self) -> Option<&Shared<Vec<Value>>> {
        match self {
            Self::Array(array) => Some(array),
            _ => None,
        }
    }

    pub fn object(&self) -> Option<&Shared<Object>> {
        match self {
            Self::Object(object) => Some(object),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(boolean: bool) -> Self {
        Self::Boolean(boolean)
    }
}

impl From<i32> for Value {
    fn from(int: i32) -> Self {
        if (I29_MIN..=I29_MAX).contains(&(int as i64)) {
            Self::Integer(u29_from_i29(int))
        } else {
            Self::Double(int as f64)
        }
    }
}

impl From<u32> for Value {
    fn from(uint: u32) -> Self {
        if uint <= U29_MAX {
            Self::Integer(uint)
        } else {
            Self::Double(uint as f64)
        }
    }
}

impl From<f64> for Value {
    fn from(double: f64) -> Self {
        Self::Double(double)
    }
}

impl From<&str> for Value {
    fn from(string: &str) -> Self {
        Self::String(string.to_owned())
    }
}

impl From<String> for Value {
    fn from(string: String) -> Self {
        Self::String(string)
    }
}

impl From<Vec<Value>> for Value {
    fn from(values: Vec<Value>) -> Self {
        Self::Array(Rc::new(RefCell::new(values)))
    }
}

impl From<Object> for Value {
    fn from(object: Object) -> Self {
        Self::Object(Rc::new(RefCell::new(object)))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_value(self, f, &mut HashMap::new())
    }
}

fn handle_addr<T>(handle: &Shared<T>) -> usize {
    Rc::as_ptr(handle) as *const () as usize
}

/// Returns the composite number, or `None` after printing a repeat.
fn visit(
    addr: usize,
    f: &mut fmt::Formatter<'_>,
    seen: &mut HashMap<usize, usize>,
) -> Result<Option<usize>, fmt::Error> {
    if let Some(id) = seen.get(&addr) {
        write!(f, "<ref #{id}>")?;
        return Ok(None);
    }
    let id = seen.len();
    seen.insert(addr, id);
    Ok(Some(id))
}

fn write_value(
    value: &Value,
    f: &mut fmt::Formatter<'_>,
    seen: &mut HashMap<usize, usize>,
) -> fmt::Result {
    match value {
        Value::Null => f.write_str("null"),
        Value::Boolean(boolean) => write!(f, "{boolean}"),
        Value::Integer(u29) => write!(f, "{}", i29_from_u29(*u29)),
        Value::Double(double) => write!(f, "{double}"),
        Value::String(string) => write!(f, "{string:?}"),
        Value::Array(array) => {
            let Some(id) = visit(handle_addr(array), f, seen)? else {
                return Ok(());
            };
            let Ok(items) = array.try_borrow() else {
                return write!(f, "#{id} <borrowed>");
            };
            write!(f, "#{id} [")?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write_value(item, f, seen)?;
            }
            f.write_str("]")
        }
        Value::Object(object) => {
            let Some(id) = visit(handle_addr(object), f, seen)? else {
                return Ok(());
            };
            let Ok(object) = object.try_borrow() else {
                return write!(f, "#{id} <borrowed>");
            };
            write!(f, "#{id} {{")?;
            for (i, (key, member)) in object.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{key:?}: ")?;
                write_value(member, f, seen)?;
            }
            f.write_str("}")
        }
    }
}

impl Decode for Value {
    const SHARES_COMPOSITES: bool = true;

    fn decode_null(&mut self) -> Result<(), DecodeError> {
        *self = Self::Null;
        Ok(())
    }

    fn decode_scalar(&mut self, scalar: Scalar) -> Result<(), DecodeError> {
        *self = match scalar {
            Scalar::Boolean(boolean) => Self::Boolean(boolean),
            Scalar::Integer(u29) => Self::Integer(u29),
            Scalar::Double(double) => Self::Double(double),
            Scalar::String(string) => Self::String(string),
        };
        Ok(())
    }

    fn decode_array<R: Read>(
        &mut self,
        len: usize,
        slot: ObjectSlot,
        decoder: &mut Decoder<R>,
    ) -> Result<(), DecodeError> {
        let mut array = Shared::<Vec<Value>>::default();
        let result = array.decode_array(len, slot, decoder);
        *self = Self::Array(array);
        result
    }

    fn decode_object<R: Read>(
        &mut self,
        slot: ObjectSlot,
        decoder: &mut Decoder<R>,
    ) -> Result<(), DecodeError> {
        let mut object = Shared::<Object>::default();
        let result = object.decode_object(slot, decoder);
        *self = Self::Object(object);
        result
    }

    fn decode_reference(&mut self, reference: Reference) -> Result<(), DecodeError> {
        *self = if let Some(array) = reference.handle::<Vec<Value>>() {
            Self::Array(array)
        } else if let Some(object) = reference.handle::<Object>() {
            Self::Object(object)
        } else {
            reference.snapshot()?
        };
        Ok(())
    }
}

impl Encode for Value {
    fn encode<W: Write>(&self, encoder: &mut Encoder<W>) -> Result<(), EncodeError> {
        match self {
            Self::Null => encoder.write_null(),
            Self::Boolean(boolean) => encoder.write_bool(*boolean),
            Self::Integer(u29) => encoder.write_uint(*u29 as u64),
            Self::Double(double) => encoder.write_double(*double),
            Self::String(string) => encoder.write_string(string),
            Self::Array(array) => array.encode(encoder),
            Self::Object(object) => object.encode(encoder),
        }
    }
}

/// Members of an anonymous dynamic object in wire order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Object {
    members: Vec<(String, Value)>,
}

impl Object {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.members
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value)
    }

    /// Inserts a member, replacing the value of an existing key in place.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        let existing = self.members.iter_mut().find(|(name, _)| *name == key);
        match existing {
            Some((_, existing)) => Some(std::mem::replace(existing, value)),
            None => {
                self.members.push((key, value));
                None
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.members
            .iter()
            .map(|(key, value)| (key.as_str(), value))
    }

    pub fn clear(&mut self) {
        self.members.clear();
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Object {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut object = Self::new();
        for (key, value) in iter {
            object.insert(key, value);
        }
        object
    }
}

impl Decode for Object {
    fn decode_null(&mut self) -> Result<(), DecodeError> {
        self.clear();
        Ok(())
    }

    fn decode_object<R: Read>(
        &mut self,
        slot: ObjectSlot,
        decoder: &mut Decoder<R>,
    ) -> Result<(), DecodeError> {
        decode_members(decoder, |key, value: Value| {
            self.insert(key, value);
        })?;
        decoder.snapshot(slot, &*self);
        Ok(())
    }
}

impl Encode for Object {
    fn encode<W: Write>(&self, encoder: &mut Encoder<W>) -> Result<(), EncodeError> {
        let members = self.members.iter().map(|(key, value)| (key, value));
        encode_entries(encoder, None, type_name::<Self>(), members)
    }

    fn encode_shared<W: Write>(
        &self,
        encoder: &mut Encoder<W>,
        identity: Identity,
    ) -> Result<(), EncodeError> {
        let members = self.members.iter().map(|(key, value)| (key, value));
        encode_entries(encoder, Some(identity), type_name::<Self>(), members)
    }
}
