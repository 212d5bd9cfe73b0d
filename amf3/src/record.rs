use std::{
    borrow::Cow,
    io::{Read, Write},
};

use crate::{
    Decode, DecodeError, Decoder, EncodeError, Encoder, FieldNaming, ObjectSlot,
    config::to_camel_case,
};

/// Wire binding of one record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub ident: &'static str,
    /// Wire name overriding the one derived from `ident`.
    pub rename: Option<&'static str>,
}

impl Field {
    pub const fn new(ident: &'static str, rename: Option<&'static str>) -> Self {
        Self { ident, rename }
    }

    /// Whether a decoded member name belongs to this field.
    ///
    /// A renamed field matches its wire name exactly. Otherwise the
    /// identifier and its camelCase form match with either case of the
    /// first letter.
    pub fn matches(&self, key: &str) -> bool {
        if let Some(rename) = self.rename {
            return key == rename;
        }
        if eq_ignoring_first_case(key, self.ident) {
            return true;
        }
        self.ident.contains('_') && eq_ignoring_first_case(key, &to_camel_case(self.ident))
    }

    pub fn wire_name(&self, naming: FieldNaming) -> Cow<'static, str> {
        match self.rename {
            Some(rename) => Cow::Borrowed(rename),
            None => naming.apply(self.ident),
        }
    }
}

fn eq_ignoring_first_case(key: &str, name: &str) -> bool {
    let mut key_chars = key.chars();
    let mut name_chars = name.chars();
    match (key_chars.next(), name_chars.next()) {
        (Some(key_first), Some(name_first)) => {
            key_first.to_lowercase().eq(name_first.to_lowercase())
                && key_chars.as_str() == name_chars.as_str()
        }
        (None, None) => true,
        _ => false,
    }
}

/// Host type bound to an anonymous dynamic object with a fixed member set.
///
/// Implemented through [`amf3_record!`](crate::amf3_record), which also
/// implements [`Decode`] and [`Encode`](crate::Encode). Fields not listed in
/// the macro are neither written nor accepted.
pub trait Record: Decode {
    const NAME: &'static str;
    const FIELDS: &'static [Field];

    /// Decode the next value into the field declared as `ident`.
    fn decode_field<R: Read>(
        &mut self,
        ident: &str,
        decoder: &mut Decoder<R>,
    ) -> Result<(), DecodeError>;

    fn encode_fields<W: Write>(&self, encoder: &mut Encoder<W>) -> Result<(), EncodeError>;
}

/// Decodes object members into the matching fields of `record`.
///
/// Fields absent from the wire keep their current value; a member without a
/// matching field fails with [`DecodeError::KeyNotFound`].
pub fn decode_record<T: Record, R: Read>(
    record: &mut T,
    slot: ObjectSlot,
    decoder: &mut Decoder<R>,
) -> Result<(), DecodeError> {
    while let Some(key) = decoder.read_key()? {
        let Some(field) = T::FIELDS.iter().find(|field| field.matches(&key)) else {
            return Err(DecodeError::KeyNotFound {
                key,
                record: T::NAME,
            });
        };
        record.decode_field(field.ident, decoder)?;
    }
    decoder.snapshot(slot, &*record);
    Ok(())
}

/// Binds a struct to AMF3 anonymous dynamic objects.
///
/// Every listed field must implement [`Decode`] and
/// [`Encode`](crate::Encode), and the struct itself `Default + Clone`.
/// A field may carry an explicit wire name with `as "name"`.
///
/// ```
/// use amf3::{amf3_record, decode_amf3, encode_amf3_value};
///
/// #[derive(Debug, Default, Clone, PartialEq)]
/// struct Message {
///     message_id: String,
///     body: Vec<i32>,
///     ttl: Option<f64>,
///     local_only: bool,
/// }
///
/// amf3_record!(Message {
///     message_id,
///     body,
///     ttl as "timeToLive",
/// });
///
/// let message = Message {
///     message_id: "1".into(),
///     body: vec![1, 2],
///     ttl: Some(30.0),
///     local_only: true,
/// };
/// let bytes = encode_amf3_value(&message).unwrap();
/// let decoded: Message = decode_amf3(bytes).unwrap();
/// assert_eq!(decoded, Message { local_only: false, ..message });
/// ```
#[macro_export]
macro_rules! amf3_record {
    ($ty:ty { $($field:ident $(as $rename:literal)?),* $(,)? }) => {
        impl $crate::Record for $ty {
            const NAME: &'static str = stringify!($ty);
            const FIELDS: &'static [$crate::Field] = &[
                $($crate::Field::new(stringify!($field), $crate::__amf3_rename!($($rename)?)),)*
            ];

            fn decode_field<R: ::std::io::Read>(
                &mut self,
                ident: &str,
                decoder: &mut $crate::Decoder<R>,
            ) -> ::std::result::Result<(), $crate::DecodeError> {
                $(
                    if ident == stringify!($field) {
                        return decoder.decode(&mut self.$field);
                    }
                )*
                ::std::result::Result::Err($crate::DecodeError::KeyNotFound {
                    key: ident.to_owned(),
                    record: <Self as $crate::Record>::NAME,
                })
            }

            fn encode_fields<W: ::std::io::Write>(
                &self,
                encoder: &mut $crate::Encoder<W>,
            ) -> ::std::result::Result<(), $crate::EncodeError> {
                $(
                    encoder.write_field(
                        <Self as $crate::Record>::NAME,
                        &$crate::Field::new(stringify!($field), $crate::__amf3_rename!($($rename)?)),
                        &self.$field,
                    )?;
                )*
                ::std::result::Result::Ok(())
            }
        }

        impl $crate::Decode for $ty {
            fn decode_object<R: ::std::io::Read>(
                &mut self,
                slot: $crate::ObjectSlot,
                decoder: &mut $crate::Decoder<R>,
            ) -> ::std::result::Result<(), $crate::DecodeError> {
                $crate::decode_record(self, slot, decoder)
            }
        }

        impl $crate::Encode for $ty {
            fn encode<W: ::std::io::Write>(
                &self,
                encoder: &mut $crate::Encoder<W>,
            ) -> ::std::result::Result<(), $crate::EncodeError> {
                encoder.write_object(::std::option::Option::None, |encoder| {
                    $crate::Record::encode_fields(self, encoder)
                })
            }

            fn encode_shared<W: ::std::io::Write>(
                &self,
                encoder: &mut $crate::Encoder<W>,
                identity: $crate::Identity,
            ) -> ::std::result::Result<(), $crate::EncodeError> {
                encoder.write_object(::std::option::Option::Some(identity), |encoder| {
                    $crate::Record::encode_fields(self, encoder)
                })
            }
        }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __amf3_rename {
    () => {
        ::std::option::Option::None
    };
    ($rename:literal) => {
        ::std::option::Option::Some($rename)
    };
}

#[cfg(test)]
mod record_test {
    use bytes::Bytes;

    use crate::{
        DecodeError, ErrorKind, FieldNaming, Shared, amf3_record, decode_amf3, encode_amf3_value,
        record::Field,
    };

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Point {
        x: i32,
        y: i32,
    }

    amf3_record!(Point { x, y });

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Header {
        message_id: String,
        client: Option<String>,
        hidden: u8,
    }

    amf3_record!(Header {
        message_id,
        client as "DSId",
    });

    #[test]
    fn test_field_matches() {
        let field = Field::new("message_id", None);
        assert!(field.matches("message_id"));
        assert!(field.matches("Message_id"));
        assert!(field.matches("messageId"));
        assert!(field.matches("MessageId"));
        assert!(!field.matches("messageid"));
        assert!(!field.matches(""));

        let field = Field::new("client", Some("DSId"));
        assert!(field.matches("DSId"));
        assert!(!field.matches("client"));
        assert!(!field.matches("dSId"));
    }

    #[test]
    fn test_wire_name() {
        let field = Field::new("message_id", None);
        assert_eq!(field.wire_name(FieldNaming::CamelCase), "messageId");
        assert_eq!(field.wire_name(FieldNaming::Declared), "message_id");
        assert_eq!(
            Field::new("client", Some("DSId")).wire_name(FieldNaming::CamelCase),
            "DSId"
        );
    }

    #[test]
    fn test_encode_record() {
        let point = Point { x: 1, y: -1 };
        assert_eq!(
            encode_amf3_value(&point).unwrap(),
            Bytes::from_static(&[
                0x0A, 0x0B, 0x01, // header
                0x03, b'x', 0x04, 0x01, // x: 1
                0x03, b'y', 0x04, 0xFF, 0xFF, 0xFF, 0xFF, // y: -1
                0x01,
            ])
        );
    }

    #[test]
    fn test_decode_record_case_insensitive_first_letter() {
        let bytes = Bytes::from_static(&[
            0x0A, 0x0B, 0x01, // header
            0x03, b'X', 0x04, 0x05, // X: 5
            0x01,
        ]);
        let point: Point = decode_amf3(bytes).unwrap();
        assert_eq!(point, Point { x: 5, y: 0 });
    }

    #[test]
    fn test_hidden_and_renamed_fields() {
        let header = Header {
            message_id: "id".to_string(),
            client: Some("c".to_string()),
            hidden: 7,
        };
        let bytes = encode_amf3_value(&header).unwrap();
        let mut expected = vec![0x0A, 0x0B, 0x01, 0x13];
        expected.extend_from_slice(b"messageId");
        expected.extend_from_slice(&[0x06, 0x05, b'i', b'd', 0x09]);
        expected.extend_from_slice(b"DSId");
        expected.extend_from_slice(&[0x06, 0x03, b'c', 0x01]);
        assert_eq!(bytes, expected);

        let decoded: Header = decode_amf3(bytes).unwrap();
        assert_eq!(decoded, Header { hidden: 0, ..header });
    }

    #[test]
    fn test_decode_record_unknown_key() {
        let bytes = Bytes::from_static(&[
            0x0A, 0x0B, 0x01, // header
            0x03, b'z', 0x04, 0x05, // z: 5
            0x01,
        ]);
        let error = decode_amf3::<Point>(bytes).unwrap_err();
        assert!(matches!(
            &error,
            DecodeError::KeyNotFound { key, record: "Point" } if key == "z"
        ));
        assert_eq!(error.kind(), ErrorKind::KeyNotFound);
    }

    #[test]
    fn test_decode_record_rejects_null() {
        let error = decode_amf3::<Point>(Bytes::from_static(&[0x01])).unwrap_err();
        assert!(matches!(error, DecodeError::TypeMismatch { found: "null", .. }));
        assert_eq!(decode_amf3::<Option<Point>>(Bytes::from_static(&[0x01])).unwrap(), None);
    }

    #[test]
    fn test_shared_record_round_trip() {
        let point: Shared<Point> = Default::default();
        point.borrow_mut().x = 3;
        let pair = vec![point.clone(), point];
        let bytes = encode_amf3_value(&pair).unwrap();

        let decoded: Vec<Shared<Point>> = decode_amf3(bytes).unwrap();
        assert!(std::rc::Rc::ptr_eq(&decoded[0], &decoded[1]));
        assert_eq!(decoded[0].borrow().x, 3);
    }
}
