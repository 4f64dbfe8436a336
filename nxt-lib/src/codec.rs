//! Fixed-width ASCII name fields as the brick stores them.
//!
//! Names travel in null-padded fields of a fixed on-wire width. Fields read
//! back from flash may be padded with `?` or spaces instead of nulls, so the
//! trim set on the read side is `\0`, `?` and trailing spaces.

use bytes::{BufMut, BytesMut};

use crate::error::NxtError;

/// Write `name` into a field of `width` bytes, null-padded.
///
/// The caller must have validated the name; a name longer than `width - 1`
/// bytes is a programmer error here.
pub(crate) fn put_name(buf: &mut BytesMut, name: &str, width: usize) {
    debug_assert!(name.len() < width);
    buf.put_slice(name.as_bytes());
    buf.put_bytes(0, width - name.len());
}

/// Read a name back out of a fixed-width field.
pub(crate) fn parse_name(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end])
        .trim_end_matches(['\0', '?', ' '])
        .to_string()
}

/// Reject names that do not fit their on-wire field or are not ASCII.
pub(crate) fn validate_name(name: &str, max: usize) -> Result<(), NxtError> {
    if name.len() > max || !name.is_ascii() {
        return Err(NxtError::InvalidName {
            name: name.to_string(),
            max,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Buf;

    #[test]
    fn name_roundtrip_strips_padding() {
        let mut buf = BytesMut::new();
        put_name(&mut buf, "Demo.rxe", 20);
        assert_eq!(buf.len(), 20);
        assert_eq!(&buf[..8], b"Demo.rxe");
        assert_eq!(parse_name(&buf), "Demo.rxe");
    }

    #[test]
    fn parse_name_trims_flash_padding_characters() {
        assert_eq!(parse_name(b"NXT\0\0\0\0\0"), "NXT");
        assert_eq!(parse_name(b"NXT?????"), "NXT");
        assert_eq!(parse_name(b"NXT     "), "NXT");
        assert_eq!(parse_name(b"NXT ? \0\0"), "NXT");
    }

    #[test]
    fn parse_name_without_terminator_uses_whole_field() {
        assert_eq!(parse_name(b"abcd"), "abcd");
    }

    #[test]
    fn validate_name_rejects_oversized_and_non_ascii() {
        assert!(validate_name("a-valid-name.rxe", 19).is_ok());
        assert!(validate_name("this-name-is-way-too-long.rxe", 19).is_err());
        assert!(validate_name("nxt\u{e9}", 19).is_err());
    }

    #[test]
    fn integer_fields_roundtrip_little_endian() {
        let mut buf = BytesMut::new();
        buf.put_u16_le(0x1234);
        buf.put_u32_le(0xDEAD_BEEF);
        buf.put_i16_le(-2);
        buf.put_i32_le(i32::MIN);
        assert_eq!(&buf[..2], &[0x34, 0x12]);

        let mut rd = buf.freeze();
        assert_eq!(rd.get_u16_le(), 0x1234);
        assert_eq!(rd.get_u32_le(), 0xDEAD_BEEF);
        assert_eq!(rd.get_i16_le(), -2);
        assert_eq!(rd.get_i32_le(), i32::MIN);
    }
}
