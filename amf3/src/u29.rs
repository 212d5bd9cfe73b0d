// https://github.com/q191201771/doc/blob/master/spec-amf-file-format-spec.pdf
// See sections 1.3.1 and 3.6 of the AMF3 format document for how this serialization works

use bytes::BufMut;

use crate::EncodeError;

pub(crate) const U29_MAX: u32 = (1 << 29) - 1;
pub(crate) const U28_MAX: u32 = (1 << 28) - 1;

/// Largest magnitude written with the integer marker. The range is kept
/// symmetric, so `-(1 << 28)` is written as a double.
pub(crate) const I29_MAX: i64 = (1 << 28) - 1;
pub(crate) const I29_MIN: i64 = -I29_MAX;

/// Largest integer a double holds exactly.
pub(crate) const F64_SAFE_MAX: i64 = (1 << 53) - 1;

/// Reads one U29 using `next_byte` as the byte source.
pub(crate) fn decode_u29<E>(mut next_byte: impl FnMut() -> Result<u8, E>) -> Result<u32, E> {
    let mut result: u32 = 0;

    for bytes_used in 1..=4 {
        let byte = next_byte()?;
        if bytes_used == 4 {
            result = (result << 8) | byte as u32;
            break;
        }

        result = (result << 7) | (byte & 0x7F) as u32;
        if byte & 0x80 == 0 {
            break;
        }
    }

    Ok(result)
}

/// Writes the shortest encoding of `u29`, returning the number of bytes used.
pub(crate) fn put_u29(buf: &mut impl BufMut, u29: u32) -> Result<usize, EncodeError> {
    const ONE_BYTE_MAX: u32 = (1 << 7) - 1;
    const TWO_BYTE_MAX: u32 = (1 << 14) - 1;
    const THREE_BYTE_MAX: u32 = (1 << 21) - 1;

    match u29 {
        n if n <= ONE_BYTE_MAX => {
            buf.put_u8(n as u8);
            Ok(1)
        }
        n if n <= TWO_BYTE_MAX => {
            buf.put_slice(&[0x80 | (n >> 7) as u8, (n & 0x7F) as u8]);
            Ok(2)
        }
        n if n <= THREE_BYTE_MAX => {
            buf.put_slice(&[
                0x80 | (n >> 14) as u8,
                0x80 | ((n >> 7) & 0x7F) as u8,
                (n & 0x7F) as u8,
            ]);
            Ok(3)
        }
        n if n <= U29_MAX => {
            buf.put_slice(&[
                0x80 | (n >> 22) as u8,
                0x80 | ((n >> 15) & 0x7F) as u8,
                0x80 | ((n >> 8) & 0x7F) as u8,
                (n & 0xFF) as u8,
            ]);
            Ok(4)
        }
        n => Err(EncodeError::OutOfRangeU29(n)),
    }
}

/// Interprets a U29 as a 29-bit two's complement integer.
pub(crate) fn i29_from_u29(u29: u32) -> i32 {
    if u29 > U28_MAX {
        (u29 as i32) - (1 << 29)
    } else {
        u29 as i32
    }
}

/// Biases a negative integer into its unsigned 29-bit wire form.
pub(crate) fn u29_from_i29(i29: i32) -> u32 {
    if i29 < 0 {
        (i29 + (1 << 29)) as u32
    } else {
        i29 as u32
    }
}

#[cfg(test)]
mod u29_test {
    use bytes::BytesMut;

    use super::*;

    fn decode(bytes: &[u8]) -> Result<u32, &'static str> {
        let mut bytes = bytes.iter();
        decode_u29(|| bytes.next().copied().ok_or("eof"))
    }

    fn encode(u29: u32) -> Vec<u8> {
        let mut buf = BytesMut::new();
        let written = put_u29(&mut buf, u29).unwrap();
        assert_eq!(written, buf.len());
        buf.to_vec()
    }

    #[test]
    fn test_decode_u29() {
        assert_eq!(decode(&[0b01101001]), Ok(105));
        assert_eq!(decode(&[0b10010000, 0b01011001]), Ok(2137));
        assert_eq!(decode(&[0b10111101, 0b10010101, 0b00011001]), Ok(1_002_137));
        assert_eq!(
            decode(&[0b10000101, 0b10001100, 0b10011100, 0b11101001]),
            Ok(21_372_137)
        );
    }

    #[test]
    fn test_decode_u29_fourth_byte_is_final() {
        // The fourth byte contributes all 8 bits, its high bit does not continue.
        assert_eq!(decode(&[0xFF, 0xFF, 0xFF, 0xFF, 0x42]), Ok(U29_MAX));
    }

    #[test]
    fn test_decode_u29_short_read() {
        assert_eq!(decode(&[0x80, 0x80]), Err("eof"));
        assert_eq!(decode(&[]), Err("eof"));
    }

    #[test]
    fn test_encode_u29() {
        assert_eq!(encode(105), [0b01101001]);
        assert_eq!(encode(2137), [0b10010000, 0b01011001]);
        assert_eq!(encode(1_002_137), [0b10111101, 0b10010101, 0b00011001]);
        assert_eq!(
            encode(21_372_137),
            [0b10000101, 0b10001100, 0b10011100, 0b11101001]
        );
    }

    #[test]
    fn test_u29_boundaries() {
        let cases = [
            (0, 1),
            (0x7F, 1),
            (0x80, 2),
            (0x3FFF, 2),
            (0x4000, 3),
            (0x1F_FFFF, 3),
            (0x20_0000, 4),
            (0x1FFF_FFFF, 4),
        ];
        for (value, len) in cases {
            let bytes = encode(value);
            assert_eq!(bytes.len(), len, "length of {value:#x}");
            assert_eq!(decode(&bytes), Ok(value));
        }
    }

    #[test]
    #[should_panic(expected = "OutOfRangeU29")]
    fn test_encode_u29_out_of_range() {
        encode(0x2000_0000);
    }

    #[test]
    fn test_i29() {
        assert_eq!(u29_from_i29(-2137), 0x1FFF_F7A7);
        assert_eq!(i29_from_u29(0x1FFF_F7A7), -2137);
        assert_eq!(i29_from_u29(u29_from_i29(-(1 << 28))), -(1 << 28));
        assert_eq!(i29_from_u29(U28_MAX), U28_MAX as i32);
    }
}
