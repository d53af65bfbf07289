use std::collections::BTreeMap;
use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::Serialize;
use thiserror::Error;

/// Typed value of a message property.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Int(i32),
    Long(i64),
    Double(f64),
    String(String),
}

impl PropertyValue {
    const TAG_BOOL: u8 = 0;
    const TAG_INT: u8 = 1;
    const TAG_LONG: u8 = 2;
    const TAG_DOUBLE: u8 = 3;
    const TAG_STRING: u8 = 4;

    /// Numeric view used by filter comparisons.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Int(v) => Some(f64::from(*v)),
            PropertyValue::Long(v) => Some(*v as f64),
            PropertyValue::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// Exact integer view, so large longs compare without float rounding.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PropertyValue::Int(v) => Some(i64::from(*v)),
            PropertyValue::Long(v) => Some(*v),
            _ => None,
        }
    }

    fn encoded_len(&self) -> usize {
        1 + match self {
            PropertyValue::Bool(_) => 1,
            PropertyValue::Int(_) => 4,
            PropertyValue::Long(_) | PropertyValue::Double(_) => 8,
            PropertyValue::String(s) => 4 + s.len(),
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Bool(v) => write!(f, "{v}"),
            PropertyValue::Int(v) => write!(f, "{v}"),
            PropertyValue::Long(v) => write!(f, "{v}"),
            PropertyValue::Double(v) => write!(f, "{v}"),
            PropertyValue::String(v) => write!(f, "'{v}'"),
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        PropertyValue::Bool(v)
    }
}

impl From<i32> for PropertyValue {
    fn from(v: i32) -> Self {
        PropertyValue::Int(v)
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        PropertyValue::Long(v)
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        PropertyValue::Double(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        PropertyValue::String(v.to_owned())
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        PropertyValue::String(v)
    }
}

/// Property name → value, iterated in name order.
pub type Properties = BTreeMap<String, PropertyValue>;

#[derive(Debug, Error)]
#[error("malformed message record: {0}")]
pub struct CodecError(String);

/// A queued message. The sequence id is zero until a queue accepts it.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    sequence: u64,
    durable: bool,
    body: Bytes,
    properties: Properties,
}

impl Message {
    pub fn new(durable: bool) -> Self {
        Self {
            sequence: 0,
            durable,
            body: Bytes::new(),
            properties: Properties::new(),
        }
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.put_property(name, value);
        self
    }

    pub fn put_property(&mut self, name: impl Into<String>, value: impl Into<PropertyValue>) {
        self.properties.insert(name.into(), value.into());
    }

    pub fn put_long_property(&mut self, name: impl Into<String>, value: i64) {
        self.put_property(name, PropertyValue::Long(value));
    }

    pub fn put_int_property(&mut self, name: impl Into<String>, value: i32) {
        self.put_property(name, PropertyValue::Int(value));
    }

    pub fn put_string_property(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.put_property(name, PropertyValue::String(value.into()));
    }

    pub fn put_bool_property(&mut self, name: impl Into<String>, value: bool) {
        self.put_property(name, PropertyValue::Bool(value));
    }

    pub fn put_double_property(&mut self, name: impl Into<String>, value: f64) {
        self.put_property(name, PropertyValue::Double(value));
    }

    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn body_size(&self) -> usize {
        self.body.len()
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn is_durable(&self) -> bool {
        self.durable
    }

    pub(crate) fn set_sequence(&mut self, sequence: u64) {
        self.sequence = sequence;
    }

    /// Size of the encoded record; this is what the address monitor accounts for.
    pub fn encoded_len(&self) -> usize {
        let props: usize = self
            .properties
            .iter()
            .map(|(name, value)| 2 + name.len() + value.encoded_len())
            .sum();
        8 + 1 + 2 + props + 4 + self.body.len()
    }

    pub fn encode(&self) -> Result<Bytes, CodecError> {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut buf)?;
        Ok(buf.freeze())
    }

    pub fn encode_into(&self, buf: &mut BytesMut) -> Result<(), CodecError> {
        buf.reserve(self.encoded_len());
        buf.put_u64(self.sequence);
        buf.put_u8(u8::from(self.durable));

        let count = u16::try_from(self.properties.len())
            .map_err(|_| CodecError("too many properties".to_string()))?;
        buf.put_u16(count);
        for (name, value) in &self.properties {
            let name_len = u16::try_from(name.len())
                .map_err(|_| CodecError(format!("property name too long: {name}")))?;
            buf.put_u16(name_len);
            buf.put_slice(name.as_bytes());
            match value {
                PropertyValue::Bool(v) => {
                    buf.put_u8(PropertyValue::TAG_BOOL);
                    buf.put_u8(u8::from(*v));
                }
                PropertyValue::Int(v) => {
                    buf.put_u8(PropertyValue::TAG_INT);
                    buf.put_i32(*v);
                }
                PropertyValue::Long(v) => {
                    buf.put_u8(PropertyValue::TAG_LONG);
                    buf.put_i64(*v);
                }
                PropertyValue::Double(v) => {
                    buf.put_u8(PropertyValue::TAG_DOUBLE);
                    buf.put_f64(*v);
                }
                PropertyValue::String(v) => {
                    let len = u32::try_from(v.len())
                        .map_err(|_| CodecError("string property too long".to_string()))?;
                    buf.put_u8(PropertyValue::TAG_STRING);
                    buf.put_u32(len);
                    buf.put_slice(v.as_bytes());
                }
            }
        }

        let body_len = u32::try_from(self.body.len())
            .map_err(|_| CodecError("body too large".to_string()))?;
        buf.put_u32(body_len);
        buf.put_slice(&self.body);
        Ok(())
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut slice = bytes;
        need(&slice, 8 + 1 + 2, "header")?;
        let sequence = slice.get_u64();
        let durable = slice.get_u8() != 0;
        let count = slice.get_u16();

        let mut properties = Properties::new();
        for _ in 0..count {
            need(&slice, 2, "property name length")?;
            let name_len = slice.get_u16() as usize;
            need(&slice, name_len + 1, "property name")?;
            let name = utf8(slice.copy_to_bytes(name_len))?;
            let tag = slice.get_u8();
            let value = match tag {
                PropertyValue::TAG_BOOL => {
                    need(&slice, 1, "bool property")?;
                    PropertyValue::Bool(slice.get_u8() != 0)
                }
                PropertyValue::TAG_INT => {
                    need(&slice, 4, "int property")?;
                    PropertyValue::Int(slice.get_i32())
                }
                PropertyValue::TAG_LONG => {
                    need(&slice, 8, "long property")?;
                    PropertyValue::Long(slice.get_i64())
                }
                PropertyValue::TAG_DOUBLE => {
                    need(&slice, 8, "double property")?;
                    PropertyValue::Double(slice.get_f64())
                }
                PropertyValue::TAG_STRING => {
                    need(&slice, 4, "string property length")?;
                    let len = slice.get_u32() as usize;
                    need(&slice, len, "string property")?;
                    PropertyValue::String(utf8(slice.copy_to_bytes(len))?)
                }
                other => return Err(CodecError(format!("unknown property tag {other}"))),
            };
            properties.insert(name, value);
        }

        need(&slice, 4, "body length")?;
        let body_len = slice.get_u32() as usize;
        need(&slice, body_len, "body")?;
        let body = slice.copy_to_bytes(body_len);

        Ok(Self {
            sequence,
            durable,
            body,
            properties,
        })
    }
}

fn need(slice: &&[u8], len: usize, what: &str) -> Result<(), CodecError> {
    if slice.remaining() < len {
        return Err(CodecError(format!("record truncated while reading {what}")));
    }
    Ok(())
}

fn utf8(bytes: Bytes) -> Result<String, CodecError> {
    String::from_utf8(bytes.to_vec()).map_err(|_| CodecError("invalid UTF-8 text".to_string()))
}
