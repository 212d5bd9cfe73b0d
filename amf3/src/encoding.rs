use std::{
    any::{Any, type_name},
    collections::{BTreeMap, HashMap},
    io::Write,
    rc::Rc,
};

use bytes::{BufMut, BytesMut};
use tracing::{debug, trace};

use crate::{
    EncodeError, EncoderConfig, Field, Shared,
    marker::{ARRAY, DOUBLE, DYNAMIC_ANONYMOUS_TRAIT, FALSE, INTEGER, NULL, OBJECT, STRING, TRUE},
    tables::{IdentityIndex, StringIndex},
    u29::{F64_SAFE_MAX, I29_MAX, I29_MIN, U28_MAX, U29_MAX, put_u29, u29_from_i29},
};

/// Allocation identity of a [`Shared`] handle.
pub struct Identity {
    addr: usize,
    handle: Rc<dyn Any>,
}

impl Identity {
    pub fn of<T: 'static>(shared: &Shared<T>) -> Self {
        Self {
            addr: Rc::as_ptr(shared) as *const () as usize,
            handle: shared.clone(),
        }
    }
}

/// Source of an encoded value.
pub trait Encode {
    fn encode<W: Write>(&self, encoder: &mut Encoder<W>) -> Result<(), EncodeError>;

    /// Encode `self` as the value behind a shared handle. Composites pass
    /// `identity` on so repeated handles become back-references.
    fn encode_shared<W: Write>(
        &self,
        encoder: &mut Encoder<W>,
        _identity: Identity,
    ) -> Result<(), EncodeError> {
        self.encode(encoder)
    }
}

/// Writes AMF3 values to a blocking byte stream.
///
/// Each primitive is assembled in an internal buffer and handed to the
/// writer with a single `write_all`.
pub struct Encoder<W> {
    writer: W,
    config: EncoderConfig,
    buf: BytesMut,
    strings: StringIndex,
    objects: IdentityIndex,
}

impl<W: Write> Encoder<W> {
    pub fn new(writer: W) -> Self {
        Self::with_config(writer, EncoderConfig::default())
    }

    pub fn with_config(writer: W, config: EncoderConfig) -> Self {
        Self {
            writer,
            config,
            buf: BytesMut::with_capacity(64),
            strings: StringIndex::default(),
            objects: IdentityIndex::default(),
        }
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    /// Forget every string and object written so far.
    pub fn reset(&mut self) {
        debug!("Resetting AMF3 encoder tables");
        self.buf.clear();
        self.strings.clear();
        self.objects.clear();
    }

    pub fn encode<T: Encode + ?Sized>(&mut self, value: &T) -> Result<(), EncodeError> {
        value.encode(self)
    }

    pub fn write_null(&mut self) -> Result<(), EncodeError> {
        self.buf.put_u8(NULL);
        self.flush()
    }

    pub fn write_bool(&mut self, boolean: bool) -> Result<(), EncodeError> {
        self.buf.put_u8(if boolean { TRUE } else { FALSE });
        self.flush()
    }

    /// Integer marker inside the 29-bit range, then a double while the value
    /// is exact, then a base-10 string.
    pub fn write_int(&mut self, int: i64) -> Result<(), EncodeError> {
        if (I29_MIN..=I29_MAX).contains(&int) {
            self.buf.put_u8(INTEGER);
            put_u29(&mut self.buf, u29_from_i29(int as i32))?;
            self.flush()
        } else if (-F64_SAFE_MAX..=F64_SAFE_MAX).contains(&int) {
            self.write_double(int as f64)
        } else {
            self.write_string(&int.to_string())
        }
    }

    pub fn write_uint(&mut self, uint: u64) -> Result<(), EncodeError> {
        if uint <= U29_MAX as u64 {
            self.buf.put_u8(INTEGER);
            put_u29(&mut self.buf, uint as u32)?;
            self.flush()
        } else if uint <= u32::MAX as u64 {
            self.write_double(uint as f64)
        } else {
            self.write_string(&uint.to_string())
        }
    }

    pub fn write_double(&mut self, double: f64) -> Result<(), EncodeError> {
        self.buf.put_u8(DOUBLE);
        self.buf.put_f64(double);
        self.flush()
    }

    pub fn write_string(&mut self, string: &str) -> Result<(), EncodeError> {
        self.buf.put_u8(STRING);
        self.put_string_raw(string)?;
        self.flush()
    }

    pub fn write_array<'a, T, I>(
        &mut self,
        identity: Option<Identity>,
        items: I,
    ) -> Result<(), EncodeError>
    where
        T: Encode + ?Sized + 'a,
        I: IntoIterator<Item = &'a T>,
        I::IntoIter: ExactSizeIterator,
    {
        let items = items.into_iter();
        if items.len() > U28_MAX as usize {
            return Err(EncodeError::ArrayTooLong(items.len()));
        }

        self.buf.put_u8(ARRAY);
        if self.put_reference_or_register(identity)? {
            return self.flush();
        }
        put_u29(&mut self.buf, ((items.len() as u32) << 1) | 0b1)?;
        // No associative part
        self.put_string_raw("")?;
        self.flush()?;

        for item in items {
            item.encode(self)?;
        }
        Ok(())
    }

    /// Write an anonymous dynamic object. `members` is expected to call
    /// [`write_member`](Self::write_member) or [`write_field`](Self::write_field)
    /// for each member.
    pub fn write_object<F>(
        &mut self,
        identity: Option<Identity>,
        members: F,
    ) -> Result<(), EncodeError>
    where
        F: FnOnce(&mut Self) -> Result<(), EncodeError>,
    {
        self.buf.put_u8(OBJECT);
        if self.put_reference_or_register(identity)? {
            return self.flush();
        }
        put_u29(&mut self.buf, DYNAMIC_ANONYMOUS_TRAIT)?;
        // Anonymous class name
        self.put_string_raw("")?;
        self.flush()?;

        members(self)?;

        self.put_string_raw("")?;
        self.flush()
    }

    pub fn write_member<T: Encode + ?Sized>(
        &mut self,
        owner: &'static str,
        key: &str,
        value: &T,
    ) -> Result<(), EncodeError> {
        if key.is_empty() {
            return Err(EncodeError::EmptyMemberName { owner });
        }
        self.put_string_raw(key)?;
        self.flush()?;
        value.encode(self)
    }

    /// Write a record field under its wire name.
    pub fn write_field<T: Encode + ?Sized>(
        &mut self,
        owner: &'static str,
        field: &Field,
        value: &T,
    ) -> Result<(), EncodeError> {
        let name = field.wire_name(self.config.field_naming);
        self.write_member(owner, &name, value)
    }

    /// Returns `true` if a back-reference was written.
    fn put_reference_or_register(
        &mut self,
        identity: Option<Identity>,
    ) -> Result<bool, EncodeError> {
        let known = identity
            .as_ref()
            .and_then(|identity| self.objects.get(identity.addr));
        if let Some(index) = known {
            trace!(index, "Writing AMF3 reference");
            put_u29(&mut self.buf, index << 1)?;
            return Ok(true);
        }

        let index = self
            .objects
            .register(identity.map(|identity| (identity.addr, identity.handle)));
        trace!(index, "Writing AMF3 composite");
        Ok(false)
    }

    fn put_string_raw(&mut self, string: &str) -> Result<(), EncodeError> {
        if let Some(index) = self.strings.get(string) {
            put_u29(&mut self.buf, index << 1)?;
            return Ok(());
        }
        if string.len() > U28_MAX as usize {
            return Err(EncodeError::StringTooLong(string.len()));
        }

        put_u29(&mut self.buf, ((string.len() as u32) << 1) | 0b1)?;
        self.buf.put_slice(string.as_bytes());
        self.strings.insert(string);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), EncodeError> {
        let result = self.writer.write_all(&self.buf);
        self.buf.clear();
        Ok(result?)
    }
}

macro_rules! impl_encode_signed {
    ($($ty:ty),*) => {$(
        impl Encode for $ty {
            fn encode<W: Write>(&self, encoder: &mut Encoder<W>) -> Result<(), EncodeError> {
                encoder.write_int(*self as i64)
            }
        }
    )*};
}

macro_rules! impl_encode_unsigned {
    ($($ty:ty),*) => {$(
        impl Encode for $ty {
            fn encode<W: Write>(&self, encoder: &mut Encoder<W>) -> Result<(), EncodeError> {
                encoder.write_uint(*self as u64)
            }
        }
    )*};
}

impl_encode_signed!(i8, i16, i32, i64, isize);
impl_encode_unsigned!(u8, u16, u32, u64, usize);

impl Encode for i128 {
    fn encode<W: Write>(&self, encoder: &mut Encoder<W>) -> Result<(), EncodeError> {
        match i64::try_from(*self) {
            Ok(int) => encoder.write_int(int),
            Err(_) => encoder.write_string(&self.to_string()),
        }
    }
}

impl Encode for u128 {
    fn encode<W: Write>(&self, encoder: &mut Encoder<W>) -> Result<(), EncodeError> {
        match u64::try_from(*self) {
            Ok(uint) => encoder.write_uint(uint),
            Err(_) => encoder.write_string(&self.to_string()),
        }
    }
}

impl Encode for f32 {
    fn encode<W: Write>(&self, encoder: &mut Encoder<W>) -> Result<(), EncodeError> {
        encoder.write_double(*self as f64)
    }
}

impl Encode for f64 {
    fn encode<W: Write>(&self, encoder: &mut Encoder<W>) -> Result<(), EncodeError> {
        encoder.write_double(*self)
    }
}

impl Encode for bool {
    fn encode<W: Write>(&self, encoder: &mut Encoder<W>) -> Result<(), EncodeError> {
        encoder.write_bool(*self)
    }
}

impl Encode for str {
    fn encode<W: Write>(&self, encoder: &mut Encoder<W>) -> Result<(), EncodeError> {
        encoder.write_string(self)
    }
}

impl Encode for String {
    fn encode<W: Write>(&self, encoder: &mut Encoder<W>) -> Result<(), EncodeError> {
        encoder.write_string(self)
    }
}

impl<T: Encode + ?Sized> Encode for &T {
    fn encode<W: Write>(&self, encoder: &mut Encoder<W>) -> Result<(), EncodeError> {
        (**self).encode(encoder)
    }

    fn encode_shared<W: Write>(
        &self,
        encoder: &mut Encoder<W>,
        identity: Identity,
    ) -> Result<(), EncodeError> {
        (**self).encode_shared(encoder, identity)
    }
}

impl<T: Encode> Encode for Option<T> {
    fn encode<W: Write>(&self, encoder: &mut Encoder<W>) -> Result<(), EncodeError> {
        match self {
            Some(value) => value.encode(encoder),
            None => encoder.write_null(),
        }
    }

    fn encode_shared<W: Write>(
        &self,
        encoder: &mut Encoder<W>,
        identity: Identity,
    ) -> Result<(), EncodeError> {
        match self {
            Some(value) => value.encode_shared(encoder, identity),
            None => encoder.write_null(),
        }
    }
}

impl<T: Encode + 'static> Encode for Shared<T> {
    fn encode<W: Write>(&self, encoder: &mut Encoder<W>) -> Result<(), EncodeError> {
        let value = self.try_borrow().map_err(|_| EncodeError::Borrowed {
            type_name: type_name::<T>(),
        })?;
        value.encode_shared(encoder, Identity::of(self))
    }
}

impl<T: Encode> Encode for [T] {
    fn encode<W: Write>(&self, encoder: &mut Encoder<W>) -> Result<(), EncodeError> {
        encoder.write_array(None, self)
    }

    fn encode_shared<W: Write>(
        &self,
        encoder: &mut Encoder<W>,
        identity: Identity,
    ) -> Result<(), EncodeError> {
        encoder.write_array(Some(identity), self)
    }
}

impl<T: Encode, const N: usize> Encode for [T; N] {
    fn encode<W: Write>(&self, encoder: &mut Encoder<W>) -> Result<(), EncodeError> {
        self.as_slice().encode(encoder)
    }

    fn encode_shared<W: Write>(
        &self,
        encoder: &mut Encoder<W>,
        identity: Identity,
    ) -> Result<(), EncodeError> {
        self.as_slice().encode_shared(encoder, identity)
    }
}

impl<T: Encode> Encode for Vec<T> {
    fn encode<W: Write>(&self, encoder: &mut Encoder<W>) -> Result<(), EncodeError> {
        self.as_slice().encode(encoder)
    }

    fn encode_shared<W: Write>(
        &self,
        encoder: &mut Encoder<W>,
        identity: Identity,
    ) -> Result<(), EncodeError> {
        self.as_slice().encode_shared(encoder, identity)
    }
}

/// Writes string-keyed entries as an anonymous dynamic object.
pub(crate) fn encode_entries<'a, W, V, I>(
    encoder: &mut Encoder<W>,
    identity: Option<Identity>,
    owner: &'static str,
    entries: I,
) -> Result<(), EncodeError>
where
    W: Write,
    V: Encode + 'a,
    I: IntoIterator<Item = (&'a String, &'a V)>,
{
    encoder.write_object(identity, |encoder| {
        for (key, value) in entries {
            encoder.write_member(owner, key, value)?;
        }
        Ok(())
    })
}

impl<V: Encode> Encode for HashMap<String, V> {
    fn encode<W: Write>(&self, encoder: &mut Encoder<W>) -> Result<(), EncodeError> {
        encode_entries(encoder, None, type_name::<Self>(), self)
    }

    fn encode_shared<W: Write>(
        &self,
        encoder: &mut Encoder<W>,
        identity: Identity,
    ) -> Result<(), EncodeError> {
        encode_entries(encoder, Some(identity), type_name::<Self>(), self)
    }
}

impl<V: Encode> Encode for BTreeMap<String, V> {
    fn encode<W: Write>(&self, encoder: &mut Encoder<W>) -> Result<(), EncodeError> {
        encode_entries(encoder, None, type_name::<Self>(), self)
    }

    fn encode_shared<W: Write>(
        &self,
        encoder: &mut Encoder<W>,
        identity: Identity,
    ) -> Result<(), EncodeError> {
        encode_entries(encoder, Some(identity), type_name::<Self>(), self)
    }
}

#[cfg(test)]
mod encode_test {
    use std::{cell::RefCell, io};

    use bytes::{BufMut, Bytes, BytesMut, buf::Writer};

    use super::*;
    use crate::{ErrorKind, marker::EMPTY_STRING};

    fn encoder() -> Encoder<Writer<BytesMut>> {
        Encoder::new(BytesMut::new().writer())
    }

    fn written(encoder: Encoder<Writer<BytesMut>>) -> Bytes {
        encoder.into_inner().into_inner().freeze()
    }

    fn encode<T: Encode + ?Sized>(value: &T) -> Bytes {
        let mut encoder = encoder();
        encoder.encode(value).unwrap();
        written(encoder)
    }

    #[test]
    fn encode_integer_test() {
        assert_eq!(encode(&105), Bytes::from_iter([INTEGER, 0b01101001]));
        assert_eq!(
            encode(&-2137),
            Bytes::from_iter([INTEGER, 0b11111111, 0b11111111, 0b11110111, 0b10100111])
        );
        assert_eq!(
            encode(&(I29_MAX as i32)),
            Bytes::from_iter([INTEGER, 0xBF, 0xFF, 0xFF, 0xFF])
        );
    }

    #[test]
    fn encode_integer_fallback_test() {
        let mut expected = BytesMut::new();
        expected.put_u8(DOUBLE);
        expected.put_f64(268_435_456.0);
        assert_eq!(encode(&0x1000_0000_i64), expected);

        let mut expected = BytesMut::new();
        expected.put_u8(DOUBLE);
        expected.put_f64(-268_435_456.0);
        assert_eq!(encode(&-(1_i32 << 28)), expected);

        let mut expected = BytesMut::new();
        expected.put_slice(&[STRING, 0x21]);
        expected.put_slice(b"9007199254740992");
        assert_eq!(encode(&(1_i64 << 53)), expected);
    }

    #[test]
    fn encode_unsigned_fallback_test() {
        assert_eq!(
            encode(&0x1FFF_FFFF_u32),
            Bytes::from_iter([INTEGER, 0xFF, 0xFF, 0xFF, 0xFF])
        );

        let mut expected = BytesMut::new();
        expected.put_u8(DOUBLE);
        expected.put_f64(u32::MAX as f64);
        assert_eq!(encode(&u32::MAX), expected);

        let mut expected = BytesMut::new();
        expected.put_slice(&[STRING, 0x29]);
        expected.put_slice(b"18446744073709551615");
        assert_eq!(encode(&u64::MAX), expected);
    }

    #[test]
    fn encode_double_test() {
        assert_eq!(
            encode(&std::f64::consts::PI),
            Bytes::from_iter([DOUBLE, 0x40, 0x09, 0x21, 0xFB, 0x54, 0x44, 0x2D, 0x18])
        );
    }

    #[test]
    fn encode_bool_and_null_test() {
        assert_eq!(encode(&true), Bytes::from_iter([TRUE]));
        assert_eq!(encode(&false), Bytes::from_iter([FALSE]));
        assert_eq!(encode(&None::<i32>), Bytes::from_iter([NULL]));
    }

    #[test]
    fn encode_string_reference_test() {
        let mut encoder = encoder();
        encoder.encode("abc").unwrap();
        encoder.encode("abc").unwrap();
        encoder.encode("").unwrap();
        encoder.encode("").unwrap();
        assert_eq!(
            written(encoder),
            Bytes::from_iter([
                STRING, 0x07, b'a', b'b', b'c', // literal
                STRING, 0x00, // reference
                STRING, EMPTY_STRING, STRING, EMPTY_STRING,
            ])
        );
    }

    #[test]
    fn encode_array_test() {
        assert_eq!(
            encode(&vec![1_u8, 2]),
            Bytes::from_iter([ARRAY, 0x05, EMPTY_STRING, INTEGER, 0x01, INTEGER, 0x02])
        );
        assert_eq!(
            encode::<[i32]>(&[]),
            Bytes::from_iter([ARRAY, 0x01, EMPTY_STRING])
        );
    }

    #[test]
    fn encode_object_test() {
        let map = BTreeMap::from([("a".to_string(), 1), ("b".to_string(), 2)]);
        assert_eq!(
            encode(&map),
            Bytes::from_iter([
                OBJECT, 0x0B, EMPTY_STRING, // header
                0x03, b'a', INTEGER, 0x01, // a: 1
                0x03, b'b', INTEGER, 0x02, // b: 2
                EMPTY_STRING,
            ])
        );

        let empty = HashMap::<String, i32>::new();
        assert_eq!(
            encode(&empty),
            Bytes::from_iter([OBJECT, 0x0B, EMPTY_STRING, EMPTY_STRING])
        );
    }

    #[test]
    fn encode_shared_reference_test() {
        let shared = Rc::new(RefCell::new(vec![7_i32]));
        let pair = vec![shared.clone(), shared];
        assert_eq!(
            encode(&pair),
            Bytes::from_iter([
                ARRAY, 0x05, EMPTY_STRING, // outer, index 0
                ARRAY, 0x03, EMPTY_STRING, INTEGER, 0x07, // shared, index 1
                ARRAY, 0x02, // reference to index 1
            ])
        );
    }

    #[test]
    fn encode_owned_values_are_not_referenced() {
        let value = vec![7_i32];
        let mut encoder = encoder();
        encoder.encode(&value).unwrap();
        encoder.encode(&value).unwrap();
        let bytes = written(encoder);
        assert_eq!(&bytes[..5], &bytes[5..]);
    }

    #[test]
    fn encode_shared_member_reference_test() {
        let map: Shared<BTreeMap<String, Shared<BTreeMap<String, i32>>>> = Default::default();
        let inner: Shared<BTreeMap<String, i32>> = Default::default();
        map.borrow_mut().insert("x".to_string(), inner.clone());
        map.borrow_mut().insert("y".to_string(), inner);
        let bytes = encode(&map);
        assert_eq!(
            bytes,
            Bytes::from_iter([
                OBJECT, 0x0B, EMPTY_STRING, // map, index 0
                0x03, b'x', OBJECT, 0x0B, EMPTY_STRING, EMPTY_STRING, // inner, index 1
                0x03, b'y', OBJECT, 0x02, // reference to index 1
                EMPTY_STRING,
            ])
        );
    }

    #[test]
    fn encode_empty_member_name_test() {
        let map = HashMap::from([(String::new(), 1)]);
        let error = encoder().encode(&map).unwrap_err();
        assert!(matches!(error, EncodeError::EmptyMemberName { .. }));
        assert_eq!(error.kind(), ErrorKind::UnsupportedType);
    }

    #[test]
    fn encode_borrowed_test() {
        let shared = Rc::new(RefCell::new(1_i32));
        let _guard = shared.borrow_mut();
        assert!(matches!(
            encoder().encode(&shared),
            Err(EncodeError::Borrowed { type_name: "i32" })
        ));
    }

    struct ShortWriter {
        capacity: usize,
    }

    impl Write for ShortWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let written = buf.len().min(self.capacity);
            self.capacity -= written;
            Ok(written)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn encode_short_write_test() {
        let mut encoder = Encoder::new(ShortWriter { capacity: 3 });
        let error = encoder.encode("abcdef").unwrap_err();
        assert!(matches!(
            &error,
            EncodeError::Io(io_error) if io_error.kind() == io::ErrorKind::WriteZero
        ));
        assert_eq!(error.kind(), ErrorKind::Io);
    }

    #[test]
    fn encode_reset_test() {
        let mut encoder = encoder();
        encoder.encode("abc").unwrap();
        encoder.reset();
        encoder.encode("abc").unwrap();
        let bytes = written(encoder);
        assert_eq!(&bytes[..5], &bytes[5..]);
    }
}
