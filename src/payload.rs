//! Typed payload codec.
//!
//! [`Value`] is the tagged union carried in command payload maps; the tag
//! mirrors [`ParameterType`] so a read or write can never silently coerce
//! the wrong shape. [`PayloadWriter`] and [`PayloadReader`] move values to
//! and from the raw payload bytes, little-endian throughout, with the
//! extended address kept as 8 raw bytes to preserve exact wire order.
//!
//! Variable-length types need a [`ReadContext`]: the element count is not
//! on the wire next to the data, it lives in a previously decoded sibling
//! field, and the associated-device list additionally pairs a start index
//! with that count. Resolving the context is the object builder's job
//! ([`crate::object`]); this module only consumes it.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Result, ZnpError};
use crate::framing::MAX_PAYLOAD_SIZE;
use crate::schema::{Parameter, ParameterType};

/// Associated-device lists carry at most 70 bytes (35 short addresses).
const ASSOC_DEV_LIST_CAP: usize = 35;

/// Status of one routing-table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteStatus {
    Active,
    DiscoveryUnderway,
    DiscoveryFailed,
    Inactive,
}

impl RouteStatus {
    fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(Self::Active),
            1 => Some(Self::DiscoveryUnderway),
            2 => Some(Self::DiscoveryFailed),
            3 => Some(Self::Inactive),
            _ => None,
        }
    }
}

/// One entry of a routing-table list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingEntry {
    pub destination: u16,
    pub status: Option<RouteStatus>,
    pub next_hop: u16,
}

/// One entry of a network-descriptor list. The two packed octets on the
/// wire are unpacked into their nibble fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkDescriptor {
    pub pan_id: u16,
    pub channel: u8,
    pub stack_profile: u8,
    pub zigbee_version: u8,
    pub beacon_order: u8,
    pub superframe_order: u8,
    pub permit_joining: u8,
}

/// A single decoded parameter value, tagged by its wire encoding.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    U8(u8),
    I8(i8),
    U16(u16),
    U32(u32),
    IeeeAddr([u8; 8]),
    Bytes(Bytes),
    ListU8(Vec<u8>),
    ListU16(Vec<u16>),
    Networks(Vec<NetworkDescriptor>),
    Routes(Vec<RoutingEntry>),
    AssocDevices(Vec<u16>),
}

impl Value {
    pub fn as_u8(&self) -> Option<u8> {
        match self {
            Value::U8(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u16(&self) -> Option<u16> {
        match self {
            Value::U16(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric view used when this value serves as a sibling count field.
    pub fn as_usize(&self) -> Option<usize> {
        match self {
            Value::U8(v) => Some(usize::from(*v)),
            Value::U16(v) => Some(usize::from(*v)),
            Value::U32(v) => Some(*v as usize),
            _ => None,
        }
    }
}

impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Value::U8(v)
    }
}

impl From<i8> for Value {
    fn from(v: i8) -> Self {
        Value::I8(v)
    }
}

impl From<u16> for Value {
    fn from(v: u16) -> Self {
        Value::U16(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::U32(v)
    }
}

impl From<[u8; 8]> for Value {
    fn from(v: [u8; 8]) -> Self {
        Value::IeeeAddr(v)
    }
}

impl From<Bytes> for Value {
    fn from(v: Bytes) -> Self {
        Value::Bytes(v)
    }
}

/// Ordered name-to-value map for one command payload.
///
/// Kept in declaration order (parameter lists are short, linear lookup is
/// fine) so logs read in wire order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Payload {
    entries: Vec<(String, Value)>,
}

impl Payload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn u8(&self, name: &str) -> Result<u8> {
        match self.get(name) {
            Some(Value::U8(v)) => Ok(*v),
            Some(_) => Err(wrong_type(name, ParameterType::Uint8)),
            None => Err(missing(name)),
        }
    }

    pub fn u16(&self, name: &str) -> Result<u16> {
        match self.get(name) {
            Some(Value::U16(v)) => Ok(*v),
            Some(_) => Err(wrong_type(name, ParameterType::Uint16)),
            None => Err(missing(name)),
        }
    }

    pub fn u32(&self, name: &str) -> Result<u32> {
        match self.get(name) {
            Some(Value::U32(v)) => Ok(*v),
            Some(_) => Err(wrong_type(name, ParameterType::Uint32)),
            None => Err(missing(name)),
        }
    }

    pub fn ieee_addr(&self, name: &str) -> Result<[u8; 8]> {
        match self.get(name) {
            Some(Value::IeeeAddr(v)) => Ok(*v),
            Some(_) => Err(wrong_type(name, ParameterType::IeeeAddr)),
            None => Err(missing(name)),
        }
    }

    pub fn bytes(&self, name: &str) -> Result<&Bytes> {
        match self.get(name) {
            Some(Value::Bytes(v)) => Ok(v),
            Some(_) => Err(wrong_type(name, ParameterType::Buffer)),
            None => Err(missing(name)),
        }
    }
}

fn missing(name: &str) -> ZnpError {
    ZnpError::MissingParameter {
        parameter: name.to_owned(),
    }
}

fn wrong_type(name: &str, expected: ParameterType) -> ZnpError {
    ZnpError::WrongValueType {
        parameter: name.to_owned(),
        expected,
    }
}

impl std::fmt::Display for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (index, (name, value)) in self.entries.iter().enumerate() {
            if index > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}: {value:?}")?;
        }
        write!(f, "}}")
    }
}

/// Context for reading a variable-length parameter, resolved from sibling
/// fields by the caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadContext {
    /// Element (or byte) count.
    pub length: Option<usize>,
    /// Start index paired with the count; associated-device lists only.
    pub start_index: Option<usize>,
}

/// Serializes parameter values into a payload buffer in declared order.
pub struct PayloadWriter {
    buf: BytesMut,
}

impl PayloadWriter {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(MAX_PAYLOAD_SIZE),
        }
    }

    /// Consume the writer, returning exactly the bytes written.
    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }

    pub fn write(&mut self, parameter: &Parameter, value: &Value) -> Result<()> {
        match (parameter.ty, value) {
            (ParameterType::Uint8, Value::U8(v)) => self.buf.put_u8(*v),
            (ParameterType::Int8, Value::I8(v)) => self.buf.put_i8(*v),
            (ParameterType::Uint16, Value::U16(v)) => self.buf.put_u16_le(*v),
            (ParameterType::Uint32, Value::U32(v)) => self.buf.put_u32_le(*v),
            (ParameterType::IeeeAddr, Value::IeeeAddr(v)) => self.buf.put_slice(v),
            (ParameterType::Buffer, Value::Bytes(v)) => self.buf.put_slice(v),
            (
                ParameterType::Buffer8
                | ParameterType::Buffer16
                | ParameterType::Buffer18
                | ParameterType::Buffer32
                | ParameterType::Buffer42
                | ParameterType::Buffer100,
                Value::Bytes(v),
            ) => {
                // Fixed tags fail loudly on a length mismatch, the wire
                // carries no length to recover from.
                let expected = parameter
                    .ty
                    .fixed_buffer_len()
                    .unwrap_or_default();
                if v.len() != expected {
                    return Err(ZnpError::BufferSizeMismatch {
                        parameter: parameter.name.to_owned(),
                        expected,
                        actual: v.len(),
                    });
                }
                self.buf.put_slice(v);
            }
            (ParameterType::ListU8, Value::ListU8(list)) => {
                for item in list {
                    self.buf.put_u8(*item);
                }
            }
            (ParameterType::ListU16, Value::ListU16(list)) => {
                for item in list {
                    self.buf.put_u16_le(*item);
                }
            }
            (
                ParameterType::ListNetwork
                | ParameterType::ListRouting
                | ParameterType::ListAssocDev,
                _,
            ) => return Err(ZnpError::UnwritableType(parameter.ty)),
            _ => {
                return Err(ZnpError::WrongValueType {
                    parameter: parameter.name.to_owned(),
                    expected: parameter.ty,
                })
            }
        }
        Ok(())
    }
}

impl Default for PayloadWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Deserializes parameter values from a payload buffer.
pub struct PayloadReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> PayloadReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(ZnpError::PayloadTruncated {
                needed: n - self.remaining(),
                remaining: self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn read_u16(&mut self) -> Result<u16> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn length_of(parameter: &Parameter, context: ReadContext) -> Result<usize> {
        context.length.ok_or_else(|| ZnpError::MissingLengthField {
            parameter: parameter.name.to_owned(),
        })
    }

    pub fn read(&mut self, parameter: &Parameter, context: ReadContext) -> Result<Value> {
        Ok(match parameter.ty {
            ParameterType::Uint8 => Value::U8(self.read_u8()?),
            ParameterType::Int8 => Value::I8(self.read_u8()? as i8),
            ParameterType::Uint16 => Value::U16(self.read_u16()?),
            ParameterType::Uint32 => Value::U32(self.read_u32()?),
            ParameterType::IeeeAddr => {
                let bytes = self.take(8)?;
                let mut addr = [0u8; 8];
                addr.copy_from_slice(bytes);
                Value::IeeeAddr(addr)
            }
            ParameterType::Buffer => {
                let length = Self::length_of(parameter, context)?;
                Value::Bytes(Bytes::copy_from_slice(self.take(length)?))
            }
            ParameterType::Buffer8
            | ParameterType::Buffer16
            | ParameterType::Buffer18
            | ParameterType::Buffer32
            | ParameterType::Buffer42
            | ParameterType::Buffer100 => {
                let length = parameter.ty.fixed_buffer_len().unwrap_or_default();
                Value::Bytes(Bytes::copy_from_slice(self.take(length)?))
            }
            ParameterType::ListU8 => {
                let length = Self::length_of(parameter, context)?;
                Value::ListU8(self.take(length)?.to_vec())
            }
            ParameterType::ListU16 => {
                let length = Self::length_of(parameter, context)?;
                let mut list = Vec::with_capacity(length);
                for _ in 0..length {
                    list.push(self.read_u16()?);
                }
                Value::ListU16(list)
            }
            ParameterType::ListNetwork => {
                let length = Self::length_of(parameter, context)?;
                let mut list = Vec::with_capacity(length);
                for _ in 0..length {
                    let pan_id = self.read_u16()?;
                    let channel = self.read_u8()?;
                    let packed_profile = self.read_u8()?;
                    let packed_order = self.read_u8()?;
                    let permit_joining = self.read_u8()?;
                    list.push(NetworkDescriptor {
                        pan_id,
                        channel,
                        stack_profile: packed_profile & 0x0f,
                        zigbee_version: (packed_profile & 0xf0) >> 4,
                        beacon_order: packed_order & 0x0f,
                        superframe_order: (packed_order & 0xf0) >> 4,
                        permit_joining,
                    });
                }
                Value::Networks(list)
            }
            ParameterType::ListRouting => {
                let length = Self::length_of(parameter, context)?;
                let mut list = Vec::with_capacity(length);
                for _ in 0..length {
                    let destination = self.read_u16()?;
                    let status = RouteStatus::from_bits(self.read_u8()?);
                    let next_hop = self.read_u16()?;
                    list.push(RoutingEntry {
                        destination,
                        status,
                        next_hop,
                    });
                }
                Value::Routes(list)
            }
            ParameterType::ListAssocDev => {
                // The wire pairs a start index with the total count; only
                // the tail from the start index is present in this frame.
                let length = Self::length_of(parameter, context)?;
                let start_index =
                    context
                        .start_index
                        .ok_or_else(|| ZnpError::MissingLengthField {
                            parameter: parameter.name.to_owned(),
                        })?;
                let count = length
                    .saturating_sub(start_index)
                    .min(ASSOC_DEV_LIST_CAP);
                let mut list = Vec::with_capacity(count);
                for _ in 0..count {
                    list.push(self.read_u16()?);
                }
                Value::AssocDevices(list)
            }
        })
    }
}
