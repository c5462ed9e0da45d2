//! Parser and serializer lookup by protocol.
use std::collections::HashMap;

use crate::{
    error::GnssError,
    message::{Message, ParsedPayload, ProtocolTag},
    nmea::NmeaSentence,
    ubx::UbxMessage,
};

/// Decodes a complete frame
pub trait MessageParser: Send + Sync {
    /// Decode `frame`, header and trailer included
    fn parse(&self, frame: &[u8]) -> Result<ParsedPayload, GnssError>;
}

/// Encodes a message back to wire bytes
pub trait MessageSerializer: Send + Sync {
    /// Wire form of `message`
    fn serialize(&self, message: &Message) -> Result<Vec<u8>, GnssError>;
}

#[derive(Debug, Default, Clone, Copy)]
/// NMEA sentence codec
pub struct NmeaCodec;

impl MessageParser for NmeaCodec {
    fn parse(&self, frame: &[u8]) -> Result<ParsedPayload, GnssError> {
        NmeaSentence::parse(frame)
            .map(ParsedPayload::Nmea)
            .map_err(|e| GnssError::Parse {
                protocol: ProtocolTag::Nmea,
                message_id: None,
                reason: e.to_string(),
            })
    }
}

impl MessageSerializer for NmeaCodec {
    fn serialize(&self, message: &Message) -> Result<Vec<u8>, GnssError> {
        match &message.payload {
            ParsedPayload::Nmea(sentence) => Ok(sentence.render()),
            other => Err(GnssError::Serialize {
                protocol: ProtocolTag::Nmea,
                message_id: message.message_id(),
                reason: format!("payload is {}", other.protocol()),
            }),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
/// UBX message codec
pub struct UbxCodec;

impl MessageParser for UbxCodec {
    fn parse(&self, frame: &[u8]) -> Result<ParsedPayload, GnssError> {
        UbxMessage::parse(frame)
            .map(ParsedPayload::Ubx)
            .map_err(|e| GnssError::Parse {
                protocol: ProtocolTag::Ubx,
                message_id: None,
                reason: e.to_string(),
            })
    }
}

impl MessageSerializer for UbxCodec {
    fn serialize(&self, message: &Message) -> Result<Vec<u8>, GnssError> {
        match &message.payload {
            ParsedPayload::Ubx(msg) => Ok(msg.serialize()),
            other => Err(GnssError::Serialize {
                protocol: ProtocolTag::Ubx,
                message_id: message.message_id(),
                reason: format!("payload is {}", other.protocol()),
            }),
        }
    }
}

/// Lookup of parsers by protocol
pub struct ParserProvider {
    parsers: HashMap<ProtocolTag, Box<dyn MessageParser>>,
}

impl Default for ParserProvider {
    fn default() -> Self {
        let mut parsers: HashMap<ProtocolTag, Box<dyn MessageParser>> = HashMap::new();
        parsers.insert(ProtocolTag::Nmea, Box::new(NmeaCodec));
        parsers.insert(ProtocolTag::Ubx, Box::new(UbxCodec));
        Self { parsers }
    }
}

impl ParserProvider {
    /// Provider with the given parsers
    pub fn new(parsers: HashMap<ProtocolTag, Box<dyn MessageParser>>) -> Self {
        Self { parsers }
    }

    /// Parser for `protocol`
    pub fn get(&self, protocol: ProtocolTag) -> Result<&dyn MessageParser, GnssError> {
        self.parsers
            .get(&protocol)
            .map(|parser| parser.as_ref())
            .ok_or(GnssError::UnsupportedProtocol(protocol))
    }
}

/// Lookup of serializers by protocol
pub struct SerializerProvider {
    serializers: HashMap<ProtocolTag, Box<dyn MessageSerializer>>,
}

impl Default for SerializerProvider {
    fn default() -> Self {
        let mut serializers: HashMap<ProtocolTag, Box<dyn MessageSerializer>> = HashMap::new();
        serializers.insert(ProtocolTag::Nmea, Box::new(NmeaCodec));
        serializers.insert(ProtocolTag::Ubx, Box::new(UbxCodec));
        Self { serializers }
    }
}

impl SerializerProvider {
    /// Provider with the given serializers
    pub fn new(serializers: HashMap<ProtocolTag, Box<dyn MessageSerializer>>) -> Self {
        Self { serializers }
    }

    /// Serializer for `protocol`
    pub fn get(&self, protocol: ProtocolTag) -> Result<&dyn MessageSerializer, GnssError> {
        self.serializers
            .get(&protocol)
            .map(|serializer| serializer.as_ref())
            .ok_or(GnssError::UnsupportedProtocol(protocol))
    }
}
