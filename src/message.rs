//! Messages flowing through the pipeline.
use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::nmea::NmeaSentence;
use crate::ubx::UbxMessage;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
/// Wire protocol a message was framed with
pub enum ProtocolTag {
    /// No protocol, used before classification
    None,
    /// u-blox binary protocol
    Ubx,
    /// NMEA-0183 ASCII sentences
    Nmea,
}

impl Display for ProtocolTag {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            ProtocolTag::None => write!(f, "NONE"),
            ProtocolTag::Ubx => write!(f, "UBX"),
            ProtocolTag::Nmea => write!(f, "NMEA"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
/// Decoded content of a frame
pub enum ParsedPayload {
    /// An NMEA sentence with named fields
    Nmea(NmeaSentence),
    /// A UBX message with a schema of named fields
    Ubx(UbxMessage),
}

impl ParsedPayload {
    /// Protocol the payload belongs to
    pub fn protocol(&self) -> ProtocolTag {
        match self {
            ParsedPayload::Nmea(_) => ProtocolTag::Nmea,
            ParsedPayload::Ubx(_) => ProtocolTag::Ubx,
        }
    }

    /// Whether the payload has a field called `name`
    pub fn has_field(&self, name: &str) -> bool {
        match self {
            ParsedPayload::Nmea(sentence) => sentence.has_field(name),
            ParsedPayload::Ubx(message) => message.has_field(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
/// A message travelling through the pipeline.
///
/// The `message_id` is assigned when the frame is parsed and never changes.
pub struct Message {
    message_id: Uuid,
    /// Protocol the header bytes were classified as
    pub proto: ProtocolTag,
    /// Decoded content
    pub payload: ParsedPayload,
}

impl Message {
    /// Wrap a freshly parsed payload, assigning a new random id
    pub fn new(proto: ProtocolTag, payload: ParsedPayload) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            proto,
            payload,
        }
    }

    /// Unique id assigned on ingress
    pub fn message_id(&self) -> Uuid {
        self.message_id
    }
}

#[derive(Debug, Clone, PartialEq)]
/// Value written into a message field by the editor
pub enum FieldValue {
    /// Text field of an NMEA sentence
    Text(String),
    /// Integer field of a UBX message
    Int(i64),
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Int(value as i64)
    }
}
