use std::{
    any::{Any, type_name},
    cell::RefCell,
    collections::{BTreeMap, HashMap},
    io::{self, Read},
    rc::Rc,
    str::FromStr,
};

use bytes::Buf;
use tracing::{debug, trace, warn};

use crate::{
    DecodeError, DecoderConfig, Marker, Shared,
    marker::{DYNAMIC_ANONYMOUS_TRAIT, EMPTY_STRING},
    tables::{Entry, ObjectTable, StringTable},
    u29::{decode_u29, i29_from_u29},
};

/// Payload of a non-composite value.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Boolean(bool),
    /// Raw U29, see [`Value::Integer`](crate::Value::Integer).
    Integer(u32),
    Double(f64),
    String(String),
}

impl Scalar {
    pub fn marker(&self) -> Marker {
        match self {
            Self::Boolean(false) => Marker::False,
            Self::Boolean(true) => Marker::True,
            Self::Integer(_) => Marker::Integer,
            Self::Double(_) => Marker::Double,
            Self::String(_) => Marker::String,
        }
    }
}

/// Object table entry reserved for a composite being decoded.
///
/// Shared destinations register their handle through [`Decoder::share`]
/// before decoding members. Owned destinations register a copy of
/// themselves through [`Decoder::snapshot`] once they are complete.
#[derive(Debug)]
#[must_use]
pub struct ObjectSlot {
    index: Option<usize>,
}

impl ObjectSlot {
    pub(crate) fn reserved(index: usize) -> Self {
        Self { index: Some(index) }
    }

    /// Slot of a composite whose entry was already registered by a wrapper.
    pub fn claimed() -> Self {
        Self { index: None }
    }

    pub fn index(&self) -> Option<usize> {
        self.index
    }
}

/// Back-reference to a previously decoded array or object.
pub struct Reference {
    marker: Marker,
    index: usize,
    entry: Rc<dyn Any>,
}

impl Reference {
    pub fn marker(&self) -> Marker {
        self.marker
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Handle of the referenced value if it was decoded into a `Shared<T>`.
    pub fn handle<T: 'static>(&self) -> Option<Shared<T>> {
        self.entry.clone().downcast::<RefCell<T>>().ok()
    }

    /// Copy of the referenced value.
    pub fn snapshot<T: Clone + 'static>(&self) -> Result<T, DecodeError> {
        if let Some(value) = self.entry.downcast_ref::<T>() {
            return Ok(value.clone());
        }
        if let Some(cell) = self.entry.downcast_ref::<RefCell<T>>() {
            return cell
                .try_borrow()
                .map(|value| T::clone(&value))
                .map_err(|_| DecodeError::UnsharedCycle {
                    index: self.index,
                    type_name: type_name::<T>(),
                });
        }
        Err(DecodeError::mismatch::<T>(self.marker))
    }
}

/// Destination of a decoded value.
///
/// Every method defaults to a type mismatch, so an implementation only
/// overrides the wire shapes it accepts. Composite methods receive the
/// already validated header; the object table entry is reserved before
/// they are called.
pub trait Decode: Default + Clone + 'static {
    /// Set by types whose composite methods register their own shared
    /// handle in the object table. [`Shared`] then hands them the slot
    /// instead of registering itself.
    const SHARES_COMPOSITES: bool = false;

    fn decode_null(&mut self) -> Result<(), DecodeError> {
        Err(DecodeError::mismatch::<Self>(Marker::Null))
    }

    fn decode_scalar(&mut self, scalar: Scalar) -> Result<(), DecodeError> {
        Err(DecodeError::mismatch::<Self>(scalar.marker()))
    }

    fn decode_array<R: Read>(
        &mut self,
        _len: usize,
        _slot: ObjectSlot,
        _decoder: &mut Decoder<R>,
    ) -> Result<(), DecodeError> {
        Err(DecodeError::mismatch::<Self>(Marker::Array))
    }

    fn decode_object<R: Read>(
        &mut self,
        _slot: ObjectSlot,
        _decoder: &mut Decoder<R>,
    ) -> Result<(), DecodeError> {
        Err(DecodeError::mismatch::<Self>(Marker::Object))
    }

    fn decode_reference(&mut self, reference: Reference) -> Result<(), DecodeError> {
        *self = reference.snapshot()?;
        Ok(())
    }
}

/// Reads AMF3 values from a blocking byte stream.
///
/// String and object tables live for the whole session and are shared by
/// consecutive [`decode`](Self::decode) calls until [`reset`](Self::reset).
pub struct Decoder<R> {
    reader: R,
    config: DecoderConfig,
    offset: u64,
    depth: usize,
    strings: StringTable,
    objects: ObjectTable,
}

impl<R: Read> Decoder<R> {
    pub fn new(reader: R) -> Self {
        Self::with_config(reader, DecoderConfig::default())
    }

    pub fn with_config(reader: R, config: DecoderConfig) -> Self {
        Self {
            reader,
            strings: StringTable::new(config.max_strings),
            objects: ObjectTable::new(config.max_objects),
            config,
            offset: 0,
            depth: 0,
        }
    }

    pub fn get_ref(&self) -> &R {
        &self.reader
    }

    /// Number of bytes consumed so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Forget every string and object seen so far.
    pub fn reset(&mut self) {
        debug!(
            offset = self.offset,
            objects = self.objects.len(),
            "Resetting AMF3 decoder tables"
        );
        self.strings.clear();
        self.objects.clear();
    }

    /// Decode the next value into `dest`.
    ///
    /// On error the stream position and `dest` are unspecified.
    pub fn decode<T: Decode>(&mut self, dest: &mut T) -> Result<(), DecodeError> {
        let marker = Marker::from_byte(self.read_u8()?)?;

        self.depth += 1;
        let result = match self.config.max_depth {
            Some(max_depth) if self.depth > max_depth => {
                warn!(max_depth, "AMF3 value nested too deep");
                Err(DecodeError::NestingTooDeep(max_depth))
            }
            _ => self.decode_marker(marker, dest),
        };
        self.depth -= 1;
        result
    }

    fn decode_marker<T: Decode>(
        &mut self,
        marker: Marker,
        dest: &mut T,
    ) -> Result<(), DecodeError> {
        match marker {
            Marker::Null => dest.decode_null(),
            Marker::False => dest.decode_scalar(Scalar::Boolean(false)),
            Marker::True => dest.decode_scalar(Scalar::Boolean(true)),
            Marker::Integer => {
                let u29 = self.read_u29()?;
                dest.decode_scalar(Scalar::Integer(u29))
            }
            Marker::Double => {
                let double = self.read_f64()?;
                dest.decode_scalar(Scalar::Double(double))
            }
            Marker::String => {
                let string = self.read_string()?;
                dest.decode_scalar(Scalar::String(string))
            }
            Marker::Array => self.decode_array(dest),
            Marker::Object => self.decode_object(dest),
        }
    }

    fn decode_array<T: Decode>(&mut self, dest: &mut T) -> Result<(), DecodeError> {
        let u29 = self.read_u29()?;
        if u29 & 0b1 == 0 {
            let reference = self.reference(Marker::Array, (u29 >> 1) as usize)?;
            return dest.decode_reference(reference);
        }

        let len = (u29 >> 1) as usize;
        let associative = self.read_u8()?;
        if associative != EMPTY_STRING {
            return Err(DecodeError::AssociativeArray(associative));
        }

        let slot = self.objects.reserve(type_name::<T>())?;
        trace!(len, index = ?slot.index(), "Decoding AMF3 array");
        dest.decode_array(len, slot, self)
    }

    fn decode_object<T: Decode>(&mut self, dest: &mut T) -> Result<(), DecodeError> {
        // https://github.com/q191201771/doc/blob/master/spec-amf-file-format-spec.pdf
        // Flags explained in section 3.12
        const TRAIT_EXTERNALIZABLE_FLAGS: u32 = 0b111;

        let u29 = self.read_u29()?;
        if u29 & 0b1 == 0 {
            let reference = self.reference(Marker::Object, (u29 >> 1) as usize)?;
            return dest.decode_reference(reference);
        }

        if u29 & TRAIT_EXTERNALIZABLE_FLAGS == TRAIT_EXTERNALIZABLE_FLAGS {
            return Err(DecodeError::ExternalizableObject(u29));
        }
        if u29 != DYNAMIC_ANONYMOUS_TRAIT {
            return Err(DecodeError::TypedObject(u29));
        }
        let class_name = self.read_u8()?;
        if class_name != EMPTY_STRING {
            return Err(DecodeError::NamedClass(class_name));
        }

        let slot = self.objects.reserve(type_name::<T>())?;
        trace!(index = ?slot.index(), "Decoding AMF3 object");
        dest.decode_object(slot, self)
    }

    fn reference(&self, marker: Marker, index: usize) -> Result<Reference, DecodeError> {
        match self.objects.get(index)? {
            Entry::Pending(type_name) => Err(DecodeError::UnsharedCycle { index, type_name }),
            Entry::Ready(entry) => {
                trace!(index, ?marker, "Resolving AMF3 reference");
                Ok(Reference {
                    marker,
                    index,
                    entry: entry.clone(),
                })
            }
        }
    }

    /// Read the next dynamic member name. Returns `None` on the empty name
    /// that closes an object.
    pub fn read_key(&mut self) -> Result<Option<String>, DecodeError> {
        let key = self.read_string()?;
        Ok((!key.is_empty()).then_some(key))
    }

    /// Register `handle` as the value of `slot`.
    pub fn share<T: 'static>(&mut self, slot: ObjectSlot, handle: &Shared<T>) {
        if let Some(index) = slot.index {
            self.objects.fill(index, handle.clone());
        }
    }

    /// Register a copy of `value` as the value of `slot`.
    pub fn snapshot<T: Clone + 'static>(&mut self, slot: ObjectSlot, value: &T) {
        if let Some(index) = slot.index {
            self.objects.fill(index, Rc::new(value.clone()));
        }
    }

    fn read_string(&mut self) -> Result<String, DecodeError> {
        let u29 = self.read_u29()?;
        if u29 & 0b1 == 0 {
            return Ok(self.strings.get((u29 >> 1) as usize)?.to_owned());
        }

        let len = (u29 >> 1) as usize;
        if len == 0 {
            return Ok(String::new());
        }

        let utf8 = self.read_bytes(len)?;
        let string = String::from_utf8(utf8).map_err(|_| DecodeError::InvalidUtf8)?;
        self.strings.push(&string)?;
        Ok(string)
    }

    fn read_u29(&mut self) -> Result<u32, DecodeError> {
        decode_u29(|| self.read_u8())
    }

    fn read_u8(&mut self) -> Result<u8, DecodeError> {
        let mut byte = [0; 1];
        self.read_exact(&mut byte)?;
        Ok(byte[0])
    }

    fn read_f64(&mut self) -> Result<f64, DecodeError> {
        let mut bytes = [0; 8];
        self.read_exact(&mut bytes)?;
        Ok((&bytes[..]).get_f64())
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), DecodeError> {
        match self.reader.read_exact(buf) {
            Ok(()) => {
                self.offset += buf.len() as u64;
                Ok(())
            }
            Err(source) => Err(DecodeError::Io {
                offset: self.offset,
                wanted: buf.len(),
                source,
            }),
        }
    }

    // Lengths come from the wire, so the buffer grows with the data actually
    // read instead of being allocated up front.
    fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>, DecodeError> {
        let mut bytes = Vec::with_capacity(len.min(4096));
        let result = (&mut self.reader)
            .take(len as u64)
            .read_to_end(&mut bytes);

        let error = match result {
            Ok(read) if read == len => None,
            Ok(_) => Some(io::Error::from(io::ErrorKind::UnexpectedEof)),
            Err(source) => Some(source),
        };
        if let Some(source) = error {
            return Err(DecodeError::Io {
                offset: self.offset,
                wanted: len,
                source,
            });
        }

        self.offset += len as u64;
        Ok(bytes)
    }
}

fn parse_number<T: FromStr>(string: &str) -> Result<T, DecodeError> {
    string.parse().map_err(|_| DecodeError::InvalidNumber {
        value: string.to_owned(),
        expected: type_name::<T>(),
    })
}

macro_rules! impl_decode_signed {
    ($($ty:ty),*) => {$(
        impl Decode for $ty {
            fn decode_scalar(&mut self, scalar: Scalar) -> Result<(), DecodeError> {
                *self = match scalar {
                    Scalar::Integer(u29) => i29_from_u29(u29) as $ty,
                    Scalar::Double(double) => double as $ty,
                    Scalar::String(string) => parse_number(&string)?,
                    other => return Err(DecodeError::mismatch::<Self>(other.marker())),
                };
                Ok(())
            }
        }
    )*};
}

macro_rules! impl_decode_unsigned {
    ($($ty:ty),*) => {$(
        impl Decode for $ty {
            fn decode_scalar(&mut self, scalar: Scalar) -> Result<(), DecodeError> {
                *self = match scalar {
                    Scalar::Integer(u29) => u29 as $ty,
                    Scalar::Double(double) => double as $ty,
                    Scalar::String(string) => parse_number(&string)?,
                    other => return Err(DecodeError::mismatch::<Self>(other.marker())),
                };
                Ok(())
            }
        }
    )*};
}

macro_rules! impl_decode_float {
    ($($ty:ty),*) => {$(
        impl Decode for $ty {
            fn decode_scalar(&mut self, scalar: Scalar) -> Result<(), DecodeError> {
                match scalar {
                    Scalar::Double(double) => *self = double as $ty,
                    other => return Err(DecodeError::mismatch::<Self>(other.marker())),
                }
                Ok(())
            }
        }
    )*};
}

impl_decode_signed!(i8, i16, i32, i64, i128, isize);
impl_decode_unsigned!(u8, u16, u32, u64, u128, usize);
impl_decode_float!(f32, f64);

impl Decode for bool {
    fn decode_scalar(&mut self, scalar: Scalar) -> Result<(), DecodeError> {
        match scalar {
            Scalar::Boolean(boolean) => *self = boolean,
            other => return Err(DecodeError::mismatch::<Self>(other.marker())),
        }
        Ok(())
    }
}

impl Decode for String {
    fn decode_scalar(&mut self, scalar: Scalar) -> Result<(), DecodeError> {
        match scalar {
            Scalar::String(string) => *self = string,
            other => return Err(DecodeError::mismatch::<Self>(other.marker())),
        }
        Ok(())
    }
}

impl<T: Decode> Decode for Option<T> {
    fn decode_null(&mut self) -> Result<(), DecodeError> {
        *self = None;
        Ok(())
    }

    fn decode_scalar(&mut self, scalar: Scalar) -> Result<(), DecodeError> {
        self.get_or_insert_with(T::default).decode_scalar(scalar)
    }

    fn decode_array<R: Read>(
        &mut self,
        len: usize,
        slot: ObjectSlot,
        decoder: &mut Decoder<R>,
    ) -> Result<(), DecodeError> {
        self.get_or_insert_with(T::default)
            .decode_array(len, slot, decoder)
    }

    fn decode_object<R: Read>(
        &mut self,
        slot: ObjectSlot,
        decoder: &mut Decoder<R>,
    ) -> Result<(), DecodeError> {
        self.get_or_insert_with(T::default)
            .decode_object(slot, decoder)
    }

    fn decode_reference(&mut self, reference: Reference) -> Result<(), DecodeError> {
        self.get_or_insert_with(T::default)
            .decode_reference(reference)
    }
}

/// Literal values always land in a fresh allocation, so decoding never
/// writes through a handle that may be aliased elsewhere. Back-references
/// resolve to the handle registered for them.
impl<T: Decode> Decode for Shared<T> {
    fn decode_null(&mut self) -> Result<(), DecodeError> {
        let mut value = T::default();
        value.decode_null()?;
        *self = Rc::new(RefCell::new(value));
        Ok(())
    }

    fn decode_scalar(&mut self, scalar: Scalar) -> Result<(), DecodeError> {
        let mut value = T::default();
        value.decode_scalar(scalar)?;
        *self = Rc::new(RefCell::new(value));
        Ok(())
    }

    fn decode_array<R: Read>(
        &mut self,
        len: usize,
        slot: ObjectSlot,
        decoder: &mut Decoder<R>,
    ) -> Result<(), DecodeError> {
        if T::SHARES_COMPOSITES {
            let mut value = T::default();
            let result = value.decode_array(len, slot, decoder);
            *self = Rc::new(RefCell::new(value));
            return result;
        }
        let handle = Shared::<T>::default();
        decoder.share(slot, &handle);
        *self = handle.clone();
        handle.borrow_mut().decode_array(len, ObjectSlot::claimed(), decoder)
    }

    fn decode_object<R: Read>(
        &mut self,
        slot: ObjectSlot,
        decoder: &mut Decoder<R>,
    ) -> Result<(), DecodeError> {
        if T::SHARES_COMPOSITES {
            let mut value = T::default();
            let result = value.decode_object(slot, decoder);
            *self = Rc::new(RefCell::new(value));
            return result;
        }
        let handle = Shared::<T>::default();
        decoder.share(slot, &handle);
        *self = handle.clone();
        handle.borrow_mut().decode_object(ObjectSlot::claimed(), decoder)
    }

    fn decode_reference(&mut self, reference: Reference) -> Result<(), DecodeError> {
        *self = match reference.handle::<T>() {
            Some(handle) => handle,
            None => {
                let mut value = T::default();
                value.decode_reference(reference)?;
                Rc::new(RefCell::new(value))
            }
        };
        Ok(())
    }
}

impl<T: Decode> Decode for Vec<T> {
    fn decode_null(&mut self) -> Result<(), DecodeError> {
        self.clear();
        Ok(())
    }

    fn decode_array<R: Read>(
        &mut self,
        len: usize,
        slot: ObjectSlot,
        decoder: &mut Decoder<R>,
    ) -> Result<(), DecodeError> {
        self.clear();
        self.reserve(len.min(1024));
        for _ in 0..len {
            let mut item = T::default();
            decoder.decode(&mut item)?;
            self.push(item);
        }
        decoder.snapshot(slot, &*self);
        Ok(())
    }
}

/// Decodes dynamic members until the closing empty name.
pub(crate) fn decode_members<T: Decode, R: Read>(
    decoder: &mut Decoder<R>,
    mut insert: impl FnMut(String, T),
) -> Result<(), DecodeError> {
    while let Some(key) = decoder.read_key()? {
        let mut value = T::default();
        decoder.decode(&mut value)?;
        insert(key, value);
    }
    Ok(())
}

impl<T: Decode> Decode for HashMap<String, T> {
    fn decode_null(&mut self) -> Result<(), DecodeError> {
        self.clear();
        Ok(())
    }

    fn decode_object<R: Read>(
        &mut self,
        slot: ObjectSlot,
        decoder: &mut Decoder<R>,
    ) -> Result<(), DecodeError> {
        decode_members(decoder, |key, value| {
            self.insert(key, value);
        })?;
        decoder.snapshot(slot, &*self);
        Ok(())
    }
}

impl<T: Decode> Decode for BTreeMap<String, T> {
    fn decode_null(&mut self) -> Result<(), DecodeError> {
        self.clear();
        Ok(())
    }

    fn decode_object<R: Read>(
        &mut self,
        slot: ObjectSlot,
        decoder: &mut Decoder<R>,
    ) -> Result<(), DecodeError> {
        decode_members(decoder, |key, value| {
            self.insert(key, value);
        })?;
        decoder.snapshot(slot, &*self);
        Ok(())
    }
}
