//! AMF3 encoder and decoder.
//!
//! Values travel between host types and the wire through two traits:
//! [`Decode`] describes what a destination slot accepts and [`Encode`]
//! describes how a value is written. Both sides keep per-session string and
//! object tables, so repeated strings and shared or cyclic composites are
//! written once and back-referenced afterwards.
//!
//! Only the dense subset of AMF3 is supported: null, booleans, integers,
//! doubles, strings, arrays without an associative part and anonymous
//! dynamic objects.
//!
//! ```
//! use amf3::{Value, decode_amf3_values, encode_amf3_value};
//!
//! let list = Value::from(vec![Value::from("kremówki"), Value::from(2137_i32)]);
//! let bytes = encode_amf3_value(&list).unwrap();
//! let decoded = decode_amf3_values(bytes).unwrap();
//! assert_eq!(decoded, vec![list]);
//! ```

use std::{cell::RefCell, rc::Rc};

use bytes::{Buf, BufMut, Bytes, BytesMut};

mod config;
mod decoding;
mod encoding;
mod error;
mod marker;
mod record;
mod tables;
mod u29;
mod value;


pub use config::{DecoderConfig, EncoderConfig, FieldNaming};
pub use decoding::{Decode, Decoder, ObjectSlot, Reference, Scalar};
pub use encoding::{Encode, Encoder, Identity};
pub use error::{DecodeError, EncodeError, ErrorKind};
pub use marker::Marker;
pub use record::{Field, Record, decode_record};
pub use value::{Object, Value};

/// Reference-counted handle used for composites that may be aliased or cyclic.
///
/// Two `Shared` handles pointing at the same allocation are written as one
/// literal and one back-reference, and decode back into a single allocation.
pub type Shared<T> = Rc<RefCell<T>>;

/// Decode every AMF3 value in `amf_bytes` as dynamic [`Value`]s.
///
/// All values share one session, so later values may back-reference strings
/// and objects introduced by earlier ones.
pub fn decode_amf3_values(amf_bytes: Bytes) -> Result<Vec<Value>, DecodeError> {
    let mut decoder = Decoder::new(amf_bytes.reader());
    let mut values = vec![];
    while decoder.get_ref().get_ref().has_remaining() {
        let mut value = Value::Null;
        decoder.decode(&mut value)?;
        values.push(value);
    }
    Ok(values)
}

/// Decode a single value of type `T` from the start of `amf_bytes`.
pub fn decode_amf3<T: Decode>(amf_bytes: Bytes) -> Result<T, DecodeError> {
    let mut decoder = Decoder::new(amf_bytes.reader());
    let mut value = T::default();
    decoder.decode(&mut value)?;
    Ok(value)
}

/// Encode a single value into a fresh buffer.
pub fn encode_amf3_value<T: Encode + ?Sized>(value: &T) -> Result<Bytes, EncodeError> {
    let mut encoder = Encoder::new(BytesMut::new().writer());
    encoder.encode(value)?;
    Ok(encoder.into_inner().into_inner().freeze())
}
