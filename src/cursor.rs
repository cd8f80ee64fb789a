//! Seekable, endian-aware reader over an in-memory container
//!
//! The decoders jump around a lot (header, then string table, then back to the entry list), so
//! rather than threading a nom input slice through every parser the cursor owns the buffer and an
//! absolute position, and runs the individual nom number parsers against whatever is left.

use std::str::FromStr;

use bytes::Bytes;
use nom::{
    bytes::complete::{tag, take_till},
    number::{complete as num, Endianness},
    IResult,
};
use serde::Serialize;
use uuid::Uuid;

use crate::{error::DecodeError, file_parsers::shared::Sha1};

type NomResult<'a, T> = IResult<&'a [u8], T, nom::error::Error<&'a [u8]>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Endian {
    Little,
    #[default]
    Big,
}

impl From<Endian> for Endianness {
    fn from(value: Endian) -> Self {
        match value {
            Endian::Little => Endianness::Little,
            Endian::Big => Endianness::Big,
        }
    }
}

impl FromStr for Endian {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "little" | "le" => Ok(Endian::Little),
            "big" | "be" => Ok(Endian::Big),
            _ => Err(format!("Invalid endianness: {s:?}, expected little or big")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ByteCursor {
    data: Bytes,
    pos: usize,
}

impl ByteCursor {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            pos: 0,
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    /// Positions past the end are allowed, the next read will fail instead
    pub fn set_position(&mut self, pos: usize) {
        self.pos = pos;
    }

    /// Move relative to the current position. Seeking before the start is an error.
    pub fn seek_relative(&mut self, offset: i64) -> Result<(), DecodeError> {
        let target = i64::try_from(self.pos)
            .ok()
            .and_then(|pos| pos.checked_add(offset))
            .and_then(|pos| usize::try_from(pos).ok())
            .ok_or_else(|| {
                DecodeError::MalformedHeader(format!(
                    "Seek by {offset} from {:#x} leaves the buffer",
                    self.pos
                ))
            })?;

        self.pos = target;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_eof(&self) -> bool {
        self.pos >= self.data.len()
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// Upper bound for preallocating `count` records of `record_size` bytes, so a corrupt count
    /// can't trigger a huge allocation before the reads fail
    pub fn capacity_for(&self, count: usize, record_size: usize) -> usize {
        count.min(self.remaining() / record_size.max(1))
    }

    fn eof(&self, wanted: usize) -> DecodeError {
        DecodeError::UnexpectedEndOfStream {
            position: self.pos,
            wanted,
            available: self.remaining(),
        }
    }

    /// Run a parser against the rest of the buffer and advance past whatever it consumed
    fn read_with<T, F>(&mut self, wanted: usize, parser: F) -> Result<T, DecodeError>
    where
        F: for<'a> FnOnce(&'a [u8]) -> NomResult<'a, T>,
    {
        let start = self.pos.min(self.data.len());
        let input = &self.data[start..];

        match parser(input) {
            Ok((rest, value)) => {
                let consumed = input.len() - rest.len();
                self.pos = start + consumed;
                Ok(value)
            }
            Err(_) => Err(self.eof(wanted)),
        }
    }

    pub fn skip(&mut self, count: usize) -> Result<(), DecodeError> {
        if count > self.remaining() {
            return Err(self.eof(count));
        }
        self.pos += count;
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        self.read_with(1, |input| num::u8(input))
    }

    pub fn read_i8(&mut self) -> Result<i8, DecodeError> {
        self.read_with(1, |input| num::i8(input))
    }

    /// Any non-zero byte is true
    pub fn read_bool(&mut self) -> Result<bool, DecodeError> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u16(&mut self, endian: Endian) -> Result<u16, DecodeError> {
        self.read_with(2, |input| num::u16(endian.into())(input))
    }

    pub fn read_i16(&mut self, endian: Endian) -> Result<i16, DecodeError> {
        self.read_with(2, |input| num::i16(endian.into())(input))
    }

    pub fn read_u32(&mut self, endian: Endian) -> Result<u32, DecodeError> {
        self.read_with(4, |input| num::u32(endian.into())(input))
    }

    pub fn read_i32(&mut self, endian: Endian) -> Result<i32, DecodeError> {
        self.read_with(4, |input| num::i32(endian.into())(input))
    }

    pub fn read_u64(&mut self, endian: Endian) -> Result<u64, DecodeError> {
        self.read_with(8, |input| num::u64(endian.into())(input))
    }

    pub fn read_i64(&mut self, endian: Endian) -> Result<i64, DecodeError> {
        self.read_with(8, |input| num::i64(endian.into())(input))
    }

    pub fn read_f32(&mut self, endian: Endian) -> Result<f32, DecodeError> {
        self.read_with(4, |input| num::f32(endian.into())(input))
    }

    pub fn read_f64(&mut self, endian: Endian) -> Result<f64, DecodeError> {
        self.read_with(8, |input| num::f64(endian.into())(input))
    }

    /// Zero-copy view of the next `count` bytes
    pub fn read_bytes(&mut self, count: usize) -> Result<Bytes, DecodeError> {
        if count > self.remaining() {
            return Err(self.eof(count));
        }
        let bytes = self.data.slice(self.pos..self.pos + count);
        self.pos += count;
        Ok(bytes)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let bytes = self.read_bytes(N)?;
        let mut array = [0; N];
        array.copy_from_slice(&bytes);
        Ok(array)
    }

    pub fn read_to_end(&mut self) -> Bytes {
        let start = self.pos.min(self.data.len());
        self.pos = self.data.len();
        self.data.slice(start..)
    }

    pub fn read_sha1(&mut self) -> Result<Sha1, DecodeError> {
        Ok(Sha1(self.read_array()?))
    }

    /// Little endian GUIDs are in the mixed-endian Windows layout, big endian ones are plain
    /// RFC 4122 byte order
    pub fn read_guid(&mut self, endian: Endian) -> Result<Uuid, DecodeError> {
        let bytes = self.read_array::<16>()?;
        Ok(match endian {
            Endian::Little => Uuid::from_bytes_le(bytes),
            Endian::Big => Uuid::from_bytes(bytes),
        })
    }

    /// TOC files store GUIDs with all 16 bytes reversed
    pub fn read_guid_reversed(&mut self) -> Result<Uuid, DecodeError> {
        let mut bytes = self.read_array::<16>()?;
        bytes.reverse();
        Ok(Uuid::from_bytes_le(bytes))
    }

    /// Bytes up to the next NUL. The NUL is consumed but not returned.
    pub fn read_null_terminated_bytes(&mut self) -> Result<Bytes, DecodeError> {
        let start = self.pos;
        let len = self.read_with(1, |input| {
            let (input, raw) = take_till::<_, &[u8], nom::error::Error<&[u8]>>(|b| b == 0)(input)?;
            let (input, _) = tag::<_, &[u8], nom::error::Error<&[u8]>>(&[0u8][..])(input)?;
            Ok((input, raw.len()))
        })?;
        Ok(self.data.slice(start..start + len))
    }

    pub fn read_null_terminated_string(&mut self) -> Result<String, DecodeError> {
        Ok(latin1(&self.read_null_terminated_bytes()?))
    }

    /// Variable-length integer, 7 bits per byte with the high bit flagging a continuation
    pub fn read_7bit_encoded(&mut self) -> Result<u64, DecodeError> {
        let mut value = 0u64;
        let mut shift = 0;
        loop {
            let byte = self.read_u8()?;
            if shift < 64 {
                value |= u64::from(byte & 0x7f) << shift;
            }
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
        }
    }
}

/// Stored strings are one char per byte, so every byte survives decoding
pub fn latin1(raw: &[u8]) -> String {
    raw.iter().map(|&b| char::from(b)).collect()
}
