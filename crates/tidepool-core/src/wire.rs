//! Fixed binary schema for the two message kinds that cross the queues.
//!
//! Every message starts with a single header byte: the high three bits carry
//! the schema version and the low five bits the message kind. The body layout
//! is fixed per kind and uses little-endian integers and IEEE-754 doubles:
//!
//! ```text
//! action:      header | has_coordinate:u8 | x:f64 | y:f64 | is_reset:u8
//! observation: header | length:u32 | image[length]
//! ```

use bytes::Bytes;

use crate::message::{Action, Coordinate, Observation};

pub const SCHEMA_VERSION: u8 = 1;

const VERSION_BITS: u8 = 3;
const VERSION_MASK: u8 = 0b1110_0000;
const KIND_MASK: u8 = 0b0001_1111;

pub const KIND_ACTION: u8 = 0;
pub const KIND_OBSERVATION: u8 = 1;

const ACTION_LEN: usize = 1 + 1 + 8 + 8 + 1;
const OBSERVATION_HEADER_LEN: usize = 1 + 4;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WireError {
    #[error("invalid schema version: {0}")]
    InvalidVersion(u8),
    #[error("unexpected message kind {found}, expected {expected}")]
    UnexpectedKind { expected: u8, found: u8 },
    #[error("unexpected end of input")]
    UnexpectedEof,
    #[error("{0} trailing bytes after message")]
    TrailingBytes(usize),
    #[error("payload of {0} bytes exceeds the u32 length prefix")]
    PayloadTooLarge(usize),
    #[error("invalid data: {0}")]
    InvalidData(&'static str),
}

/// A value with a fixed wire schema.
pub trait WireMessage: Sized + Send + Sync + 'static {
    const KIND: u8;
    const LABEL: &'static str;

    fn encode(&self) -> Result<Vec<u8>, WireError>;
    fn decode(bytes: &[u8]) -> Result<Self, WireError>;
}

impl WireMessage for Action {
    const KIND: u8 = KIND_ACTION;
    const LABEL: &'static str = "action";

    fn encode(&self) -> Result<Vec<u8>, WireError> {
        if self.coordinate().is_some_and(|c| !c.is_finite()) {
            return Err(WireError::InvalidData("non-finite coordinate"));
        }
        Ok(encode_action(self))
    }

    fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        decode_action(bytes)
    }
}

impl WireMessage for Observation {
    const KIND: u8 = KIND_OBSERVATION;
    const LABEL: &'static str = "observation";

    fn encode(&self) -> Result<Vec<u8>, WireError> {
        encode_observation(self)
    }

    fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        decode_observation(bytes)
    }
}

pub fn encode_action(action: &Action) -> Vec<u8> {
    let mut buf = Vec::with_capacity(ACTION_LEN);
    write_header(&mut buf, KIND_ACTION);
    let (has_coordinate, coordinate) = match action {
        Action::Touch(coordinate) => (true, *coordinate),
        Action::Reset => (false, Coordinate::new(0.0, 0.0)),
    };
    buf.push(has_coordinate as u8);
    buf.extend_from_slice(&coordinate.x.to_le_bytes());
    buf.extend_from_slice(&coordinate.y.to_le_bytes());
    buf.push(action.is_reset() as u8);
    buf
}

pub fn decode_action(bytes: &[u8]) -> Result<Action, WireError> {
    let mut cursor = Cursor::new(bytes);
    read_header(&mut cursor, KIND_ACTION)?;
    let has_coordinate = cursor.read_bool()?;
    let x = cursor.read_f64()?;
    let y = cursor.read_f64()?;
    let is_reset = cursor.read_bool()?;
    cursor.finish()?;

    if is_reset {
        return Ok(Action::Reset);
    }
    if !has_coordinate {
        return Err(WireError::InvalidData(
            "action carries neither coordinate nor reset",
        ));
    }
    let coordinate = Coordinate::new(x, y);
    if !coordinate.is_finite() {
        return Err(WireError::InvalidData("non-finite coordinate"));
    }
    Ok(Action::Touch(coordinate))
}

pub fn encode_observation(observation: &Observation) -> Result<Vec<u8>, WireError> {
    let image = observation.image();
    let len = u32::try_from(image.len()).map_err(|_| WireError::PayloadTooLarge(image.len()))?;
    let mut buf = Vec::with_capacity(OBSERVATION_HEADER_LEN + image.len());
    write_header(&mut buf, KIND_OBSERVATION);
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(image);
    Ok(buf)
}

pub fn decode_observation(bytes: &[u8]) -> Result<Observation, WireError> {
    let mut cursor = Cursor::new(bytes);
    read_header(&mut cursor, KIND_OBSERVATION)?;
    let len = cursor.read_u32()? as usize;
    let image = cursor.read_bytes(len)?;
    cursor.finish()?;
    Ok(Observation::new(Bytes::copy_from_slice(image)))
}

fn write_header(buf: &mut Vec<u8>, kind: u8) {
    let version = SCHEMA_VERSION & ((1 << VERSION_BITS) - 1);
    buf.push((version << 5) | (kind & KIND_MASK));
}

fn read_header(cursor: &mut Cursor<'_>, expected: u8) -> Result<(), WireError> {
    let byte = cursor.read_u8()?;
    check_version(byte)?;
    let kind = byte & KIND_MASK;
    if kind != expected {
        return Err(WireError::UnexpectedKind {
            expected,
            found: kind,
        });
    }
    Ok(())
}

fn check_version(byte: u8) -> Result<(), WireError> {
    let version = (byte & VERSION_MASK) >> 5;
    if version != (SCHEMA_VERSION & ((1 << VERSION_BITS) - 1)) {
        return Err(WireError::InvalidVersion(version));
    }
    Ok(())
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn read_u8(&mut self) -> Result<u8, WireError> {
        let byte = *self.bytes.get(self.pos).ok_or(WireError::UnexpectedEof)?;
        self.pos += 1;
        Ok(byte)
    }

    fn read_bool(&mut self) -> Result<bool, WireError> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(WireError::InvalidData("invalid boolean")),
        }
    }

    fn read_u32(&mut self) -> Result<u32, WireError> {
        let raw = self.read_array::<4>()?;
        Ok(u32::from_le_bytes(raw))
    }

    fn read_f64(&mut self) -> Result<f64, WireError> {
        let raw = self.read_array::<8>()?;
        Ok(f64::from_le_bytes(raw))
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], WireError> {
        let slice = self.read_bytes(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], WireError> {
        if len > self.remaining() {
            return Err(WireError::UnexpectedEof);
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.pos)
    }

    fn finish(&self) -> Result<(), WireError> {
        match self.remaining() {
            0 => Ok(()),
            extra => Err(WireError::TrailingBytes(extra)),
        }
    }
}
