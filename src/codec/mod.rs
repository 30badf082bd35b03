// Codec - Encodage binaire exact du journal
//
// Everything stored in the log goes through this encoding: two engines at the
// same verification version produce the same bytes for the same history, and
// storage gas is charged on the encoded size.
mod responses;
mod updates;
mod values;

use num_bigint::BigInt;
use num_traits::ToPrimitive;

pub use updates::selectors;

/// Verification versions this codec can produce and read
pub const SUPPORTED_VERIFICATION_VERSIONS: [u8; 1] = [0];

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Unexpected end of input")]
    UnexpectedEof,

    #[error("Unknown {what} selector: {selector}")]
    UnknownSelector { what: &'static str, selector: u8 },

    #[error("Invalid UTF-8 string")]
    InvalidUtf8,

    #[error("Unsupported verification version: {0}")]
    UnsupportedVersion(u8),

    #[error("{0} trailing bytes after value")]
    TrailingBytes(usize),

    #[error("Invalid length: {0}")]
    InvalidLength(u64),
}

/// Values with a binary encoding
pub trait Marshal {
    fn marshal(&self, out: &mut Marshaller);
}

/// Values that can be read back from their binary encoding
pub trait Unmarshal: Sized {
    fn unmarshal(input: &mut Unmarshaller<'_>) -> Result<Self, CodecError>;
}

pub fn check_version(verification_version: u8) -> Result<(), CodecError> {
    if SUPPORTED_VERIFICATION_VERSIONS.contains(&verification_version) {
        Ok(())
    } else {
        Err(CodecError::UnsupportedVersion(verification_version))
    }
}

/// Encodes a value under the given verification version
pub fn encode<T: Marshal>(value: &T, verification_version: u8) -> Result<Vec<u8>, CodecError> {
    check_version(verification_version)?;
    let mut out = Marshaller::new();
    value.marshal(&mut out);
    Ok(out.into_bytes())
}

/// Decodes a value, requiring the whole input to be consumed
pub fn decode<T: Unmarshal>(bytes: &[u8], verification_version: u8) -> Result<T, CodecError> {
    check_version(verification_version)?;
    let mut input = Unmarshaller::new(bytes);
    let value = T::unmarshal(&mut input)?;
    match input.remaining() {
        0 => Ok(value),
        n => Err(CodecError::TrailingBytes(n)),
    }
}

/// Size in bytes of the encoding of a value
pub fn size_of<T: Marshal>(value: &T) -> u64 {
    let mut out = Marshaller::new();
    value.marshal(&mut out);
    out.len() as u64
}

// =============================================================================
// Writer
// =============================================================================

/// Big-endian writer
#[derive(Debug, Default)]
pub struct Marshaller {
    bytes: Vec<u8>,
}

impl Marshaller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn write_u8(&mut self, value: u8) {
        self.bytes.push(value);
    }

    pub fn write_bool(&mut self, value: bool) {
        self.write_u8(value as u8);
    }

    pub fn write_i8(&mut self, value: i8) {
        self.bytes.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_u16(&mut self, value: u16) {
        self.bytes.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_i16(&mut self, value: i16) {
        self.bytes.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_i32(&mut self, value: i32) {
        self.bytes.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_i64(&mut self, value: i64) {
        self.bytes.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_f32(&mut self, value: f32) {
        self.bytes.extend_from_slice(&value.to_bits().to_be_bytes());
    }

    pub fn write_f64(&mut self, value: f64) {
        self.bytes.extend_from_slice(&value.to_bits().to_be_bytes());
    }

    /// One byte below 255, otherwise 255 followed by eight bytes
    pub fn write_compact_u64(&mut self, value: u64) {
        if value < 255 {
            self.write_u8(value as u8);
        } else {
            self.write_u8(255);
            self.bytes.extend_from_slice(&value.to_be_bytes());
        }
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.write_compact_u64(bytes.len() as u64);
        self.bytes.extend_from_slice(bytes);
    }

    pub fn write_utf(&mut self, value: &str) {
        self.write_bytes(value.as_bytes());
    }

    /// Narrowest of 2, 4, 8 bytes or a length-prefixed two's complement
    pub fn write_big_integer(&mut self, value: &BigInt) {
        if let Some(small) = value.to_i16() {
            self.write_u8(0);
            self.write_i16(small);
        } else if let Some(int) = value.to_i32() {
            self.write_u8(1);
            self.write_i32(int);
        } else if let Some(long) = value.to_i64() {
            self.write_u8(2);
            self.write_i64(long);
        } else {
            self.write_u8(3);
            self.write_bytes(&value.to_signed_bytes_be());
        }
    }

    pub fn write_all<T: Marshal>(&mut self, values: &[T]) {
        self.write_compact_u64(values.len() as u64);
        for value in values {
            value.marshal(self);
        }
    }
}

// =============================================================================
// Reader
// =============================================================================

pub struct Unmarshaller<'a> {
    bytes: &'a [u8],
    cursor: usize,
}

impl<'a> Unmarshaller<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, cursor: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.cursor
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < n {
            return Err(CodecError::UnexpectedEof);
        }
        let slice = &self.bytes[self.cursor..self.cursor + n];
        self.cursor += n;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut array = [0u8; N];
        array.copy_from_slice(self.take(N)?);
        Ok(array)
    }

    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_bool(&mut self) -> Result<bool, CodecError> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            selector => Err(CodecError::UnknownSelector {
                what: "boolean",
                selector,
            }),
        }
    }

    pub fn read_i8(&mut self) -> Result<i8, CodecError> {
        Ok(i8::from_be_bytes(self.take_array()?))
    }

    pub fn read_u16(&mut self) -> Result<u16, CodecError> {
        Ok(u16::from_be_bytes(self.take_array()?))
    }

    pub fn read_i16(&mut self) -> Result<i16, CodecError> {
        Ok(i16::from_be_bytes(self.take_array()?))
    }

    pub fn read_i32(&mut self) -> Result<i32, CodecError> {
        Ok(i32::from_be_bytes(self.take_array()?))
    }

    pub fn read_i64(&mut self) -> Result<i64, CodecError> {
        Ok(i64::from_be_bytes(self.take_array()?))
    }

    pub fn read_f32(&mut self) -> Result<f32, CodecError> {
        Ok(f32::from_bits(u32::from_be_bytes(self.take_array()?)))
    }

    pub fn read_f64(&mut self) -> Result<f64, CodecError> {
        Ok(f64::from_bits(u64::from_be_bytes(self.take_array()?)))
    }

    pub fn read_compact_u64(&mut self) -> Result<u64, CodecError> {
        match self.read_u8()? {
            255 => Ok(u64::from_be_bytes(self.take_array()?)),
            small => Ok(small as u64),
        }
    }

    fn read_length(&mut self) -> Result<usize, CodecError> {
        let length = self.read_compact_u64()?;
        if length > self.remaining() as u64 {
            return Err(CodecError::InvalidLength(length));
        }
        Ok(length as usize)
    }

    pub fn read_bytes(&mut self) -> Result<Vec<u8>, CodecError> {
        let length = self.read_length()?;
        Ok(self.take(length)?.to_vec())
    }

    pub fn read_utf(&mut self) -> Result<String, CodecError> {
        String::from_utf8(self.read_bytes()?).map_err(|_| CodecError::InvalidUtf8)
    }

    pub fn read_big_integer(&mut self) -> Result<BigInt, CodecError> {
        match self.read_u8()? {
            0 => Ok(BigInt::from(self.read_i16()?)),
            1 => Ok(BigInt::from(self.read_i32()?)),
            2 => Ok(BigInt::from(self.read_i64()?)),
            3 => Ok(BigInt::from_signed_bytes_be(&self.read_bytes()?)),
            selector => Err(CodecError::UnknownSelector {
                what: "big integer",
                selector,
            }),
        }
    }

    pub fn read_all<T: Unmarshal>(&mut self) -> Result<Vec<T>, CodecError> {
        // each element takes at least one byte
        let count = self.read_length()?;
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            values.push(T::unmarshal(self)?);
        }
        Ok(values)
    }
}
