use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fmt;
use std::io::{self, Cursor, Read};

/// Length cap for length-prefixed strings. Anything longer is treated as a
/// corrupt frame rather than an allocation request.
pub const MAX_STRING_LEN: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// The buffer ended before the value could be read.
    ShortBuffer,
    /// The leading magic constant did not match the protocol.
    BadMagic(u16),
    /// A string length prefix exceeded `MAX_STRING_LEN`.
    BadStringLength(u32),
    /// String bytes were not valid UTF-8.
    BadUtf8,
    /// The opcode byte does not name a known message.
    UnknownOpcode(u8),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DecodeError::ShortBuffer => write!(f, "buffer too short"),
            DecodeError::BadMagic(magic) => write!(f, "bad magic 0x{:04X}", magic),
            DecodeError::BadStringLength(len) => write!(f, "bad string length {}", len),
            DecodeError::BadUtf8 => write!(f, "string bytes are not valid utf-8"),
            DecodeError::UnknownOpcode(op) => write!(f, "unknown opcode 0x{:02X}", op),
        }
    }
}

impl std::error::Error for DecodeError {}

impl From<io::Error> for DecodeError {
    #[inline]
    fn from(_: io::Error) -> Self {
        // The only io failure on an in-memory cursor is running out of bytes.
        DecodeError::ShortBuffer
    }
}

/// Appends little-endian primitives and length-prefixed strings to an owned
/// byte vector. Writes into a `Vec` cannot fail.
pub struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    #[inline]
    pub fn new() -> Encoder {
        Encoder { buf: Vec::new() }
    }

    #[inline]
    pub fn with_capacity(capacity: usize) -> Encoder {
        Encoder {
            buf: Vec::with_capacity(capacity),
        }
    }

    #[inline]
    pub fn write_u8(&mut self, value: u8) {
        self.buf.write_u8(value).expect("vec write");
    }

    #[inline]
    pub fn write_u16(&mut self, value: u16) {
        self.buf.write_u16::<LittleEndian>(value).expect("vec write");
    }

    #[inline]
    pub fn write_u32(&mut self, value: u32) {
        self.buf.write_u32::<LittleEndian>(value).expect("vec write");
    }

    #[inline]
    pub fn write_i32(&mut self, value: i32) {
        self.buf.write_i32::<LittleEndian>(value).expect("vec write");
    }

    #[inline]
    pub fn write_f32(&mut self, value: f32) {
        self.buf.write_f32::<LittleEndian>(value).expect("vec write");
    }

    #[inline]
    pub fn write_bool(&mut self, value: bool) {
        self.write_u8(value as u8);
    }

    /// `u32` byte length followed by the UTF-8 bytes.
    #[inline]
    pub fn write_string(&mut self, value: &str) {
        self.write_u32(value.len() as u32);
        self.buf.extend_from_slice(value.as_bytes());
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Fallible little-endian reader over a borrowed frame. Every read either
/// yields a value or a `DecodeError`; a failed read has no partial effect
/// observable by the caller.
pub struct Decoder<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl<'a> Decoder<'a> {
    #[inline]
    pub fn new(buf: &'a [u8]) -> Decoder<'a> {
        Decoder {
            cursor: Cursor::new(buf),
        }
    }

    #[inline]
    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.cursor.read_u8()?)
    }

    #[inline]
    pub fn read_u16(&mut self) -> Result<u16, DecodeError> {
        Ok(self.cursor.read_u16::<LittleEndian>()?)
    }

    #[inline]
    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        Ok(self.cursor.read_u32::<LittleEndian>()?)
    }

    #[inline]
    pub fn read_i32(&mut self) -> Result<i32, DecodeError> {
        Ok(self.cursor.read_i32::<LittleEndian>()?)
    }

    #[inline]
    pub fn read_f32(&mut self) -> Result<f32, DecodeError> {
        Ok(self.cursor.read_f32::<LittleEndian>()?)
    }

    #[inline]
    pub fn read_bool(&mut self) -> Result<bool, DecodeError> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_string(&mut self) -> Result<String, DecodeError> {
        let len = self.read_u32()?;
        if len as usize > MAX_STRING_LEN {
            return Err(DecodeError::BadStringLength(len));
        }

        let mut bytes = vec![0u8; len as usize];
        self.cursor.read_exact(&mut bytes)?;

        String::from_utf8(bytes).map_err(|_| DecodeError::BadUtf8)
    }

    /// Bytes left unread in the frame.
    #[inline]
    pub fn remaining(&self) -> usize {
        let total = self.cursor.get_ref().len() as u64;
        (total - self.cursor.position()) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_roundtrip() {
        let mut enc = Encoder::new();
        enc.write_u8(0xAB);
        enc.write_u16(0xB542);
        enc.write_u32(123_456_789);
        enc.write_i32(-77);
        enc.write_f32(3.25);
        enc.write_bool(true);
        enc.write_bool(false);

        let bytes = enc.into_bytes();
        let mut dec = Decoder::new(&bytes);

        assert_eq!(dec.read_u8().unwrap(), 0xAB);
        assert_eq!(dec.read_u16().unwrap(), 0xB542);
        assert_eq!(dec.read_u32().unwrap(), 123_456_789);
        assert_eq!(dec.read_i32().unwrap(), -77);
        assert_eq!(dec.read_f32().unwrap(), 3.25);
        assert_eq!(dec.read_bool().unwrap(), true);
        assert_eq!(dec.read_bool().unwrap(), false);
        assert_eq!(dec.remaining(), 0);
    }

    #[test]
    fn test_string_roundtrip() {
        let mut enc = Encoder::new();
        enc.write_string("alice");
        enc.write_string("");
        enc.write_string("héllo wörld");

        let bytes = enc.into_bytes();
        let mut dec = Decoder::new(&bytes);

        assert_eq!(dec.read_string().unwrap(), "alice");
        assert_eq!(dec.read_string().unwrap(), "");
        assert_eq!(dec.read_string().unwrap(), "héllo wörld");
    }

    #[test]
    fn test_little_endian_layout() {
        let mut enc = Encoder::new();
        enc.write_u16(0xB542);

        assert_eq!(enc.into_bytes(), vec![0x42, 0xB5]);
    }

    #[test]
    fn test_read_err_short_buffer() {
        let mut dec = Decoder::new(&[0x01, 0x02]);

        assert_eq!(dec.read_u32().unwrap_err(), DecodeError::ShortBuffer);
    }

    #[test]
    fn test_read_string_err_length() {
        let mut enc = Encoder::new();
        enc.write_u32((MAX_STRING_LEN + 1) as u32);

        let bytes = enc.into_bytes();
        let mut dec = Decoder::new(&bytes);

        assert_eq!(
            dec.read_string().unwrap_err(),
            DecodeError::BadStringLength((MAX_STRING_LEN + 1) as u32)
        );
    }

    #[test]
    fn test_read_string_err_truncated() {
        let mut enc = Encoder::new();
        enc.write_u32(10);
        enc.write_u8(b'a');

        let bytes = enc.into_bytes();
        let mut dec = Decoder::new(&bytes);

        assert_eq!(dec.read_string().unwrap_err(), DecodeError::ShortBuffer);
    }

    #[test]
    fn test_read_string_err_utf8() {
        let mut enc = Encoder::new();
        enc.write_u32(2);
        enc.write_u8(0xFF);
        enc.write_u8(0xFE);

        let bytes = enc.into_bytes();
        let mut dec = Decoder::new(&bytes);

        assert_eq!(dec.read_string().unwrap_err(), DecodeError::BadUtf8);
    }
}
