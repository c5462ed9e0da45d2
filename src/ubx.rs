//! UBX binary message codec.
//!
//! Messages keep their raw payload. Known class/id pairs have a schema that
//! maps field names to little-endian integers at fixed offsets, so edits
//! patch the payload in place and serialization regenerates the length and
//! the checksum.
use thiserror::Error;

use crate::classifier::UBX_HEADER;

const FRAME_OVERHEAD: usize = 8;

#[derive(Error, Clone, Debug, PartialEq, Eq)]
/// Failures of the UBX codec
pub enum UbxError {
    /// Fewer bytes than an empty frame
    #[error("Frame of {0} bytes is too short")]
    TooShort(usize),
    /// Sync characters missing
    #[error("Frame does not start with the UBX sync characters")]
    Header,
    /// Length field disagrees with the frame size
    #[error("Declared payload length {declared} does not match the {actual} bytes present")]
    LengthMismatch {
        /// Length field value
        declared: usize,
        /// Payload bytes present
        actual: usize,
    },
    /// Fletcher checksum mismatch
    #[error("Checksum mismatch: expected {expected:02X?}, computed {computed:02X?}")]
    Checksum {
        /// Checksum carried by the frame
        expected: (u8, u8),
        /// Checksum of the frame content
        computed: (u8, u8),
    },
    /// Payload size does not match the message schema
    #[error("{identity} payload must be {expected} bytes, got {actual}")]
    SchemaLength {
        /// Message name
        identity: String,
        /// Schema payload size
        expected: usize,
        /// Payload size received
        actual: usize,
    },
    /// Field name not in the message schema
    #[error("{identity} has no field '{field}'")]
    UnknownField {
        /// Message name
        identity: String,
        /// Requested field
        field: String,
    },
    /// Value outside the range of the field type
    #[error("Value {value} does not fit field '{field}' ({kind:?})")]
    OutOfRange {
        /// Field name
        field: String,
        /// Rejected value
        value: i64,
        /// Field type
        kind: FieldKind,
    },
    /// Payload longer than a `u16` length
    #[error("Payload of {0} bytes exceeds the UBX length field")]
    PayloadTooLong(usize),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
/// Little-endian integer types used in UBX payloads
pub enum FieldKind {
    /// `u8`
    U1,
    /// `i8`
    I1,
    /// `u16`
    U2,
    /// `i16`
    I2,
    /// `u32`
    U4,
    /// `i32`
    I4,
}

impl FieldKind {
    /// Width in bytes
    pub fn size(self) -> usize {
        match self {
            FieldKind::U1 | FieldKind::I1 => 1,
            FieldKind::U2 | FieldKind::I2 => 2,
            FieldKind::U4 | FieldKind::I4 => 4,
        }
    }

    fn bounds(self) -> (i64, i64) {
        match self {
            FieldKind::U1 => (0, u8::MAX as i64),
            FieldKind::I1 => (i8::MIN as i64, i8::MAX as i64),
            FieldKind::U2 => (0, u16::MAX as i64),
            FieldKind::I2 => (i16::MIN as i64, i16::MAX as i64),
            FieldKind::U4 => (0, u32::MAX as i64),
            FieldKind::I4 => (i32::MIN as i64, i32::MAX as i64),
        }
    }

    fn read(self, bytes: &[u8]) -> i64 {
        match self {
            FieldKind::U1 => bytes[0] as i64,
            FieldKind::I1 => bytes[0] as i8 as i64,
            FieldKind::U2 => u16::from_le_bytes([bytes[0], bytes[1]]) as i64,
            FieldKind::I2 => i16::from_le_bytes([bytes[0], bytes[1]]) as i64,
            FieldKind::U4 => u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as i64,
            FieldKind::I4 => i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as i64,
        }
    }

    /// `value` must already be within bounds
    fn write(self, value: i64, bytes: &mut [u8]) {
        let le = value.to_le_bytes();
        bytes[..self.size()].copy_from_slice(&le[..self.size()]);
    }
}

#[derive(Debug, PartialEq, Eq)]
/// Fixed payload layout of a UBX message
pub struct UbxSchema {
    /// Message class
    pub class: u8,
    /// Message id
    pub id: u8,
    /// Name such as `NAV-PVT`
    pub identity: &'static str,
    /// Payload size in bytes
    pub length: usize,
    /// Name, payload offset and type of each field
    pub fields: &'static [(&'static str, usize, FieldKind)],
}

use FieldKind::*;

static SCHEMAS: &[UbxSchema] = &[
    UbxSchema {
        class: 0x01,
        id: 0x01,
        identity: "NAV-POSECEF",
        length: 20,
        fields: &[
            ("iTOW", 0, U4),
            ("ecefX", 4, I4),
            ("ecefY", 8, I4),
            ("ecefZ", 12, I4),
            ("pAcc", 16, U4),
        ],
    },
    UbxSchema {
        class: 0x01,
        id: 0x02,
        identity: "NAV-POSLLH",
        length: 28,
        fields: &[
            ("iTOW", 0, U4),
            ("lon", 4, I4),
            ("lat", 8, I4),
            ("height", 12, I4),
            ("hMSL", 16, I4),
            ("hAcc", 20, U4),
            ("vAcc", 24, U4),
        ],
    },
    UbxSchema {
        class: 0x01,
        id: 0x07,
        identity: "NAV-PVT",
        length: 92,
        fields: &[
            ("iTOW", 0, U4),
            ("year", 4, U2),
            ("month", 6, U1),
            ("day", 7, U1),
            ("hour", 8, U1),
            ("min", 9, U1),
            ("sec", 10, U1),
            ("valid", 11, U1),
            ("tAcc", 12, U4),
            ("nano", 16, I4),
            ("fixType", 20, U1),
            ("flags", 21, U1),
            ("flags2", 22, U1),
            ("numSV", 23, U1),
            ("lon", 24, I4),
            ("lat", 28, I4),
            ("height", 32, I4),
            ("hMSL", 36, I4),
            ("hAcc", 40, U4),
            ("vAcc", 44, U4),
            ("velN", 48, I4),
            ("velE", 52, I4),
            ("velD", 56, I4),
            ("gSpeed", 60, I4),
            ("headMot", 64, I4),
            ("sAcc", 68, U4),
            ("headAcc", 72, U4),
            ("pDOP", 76, U2),
            ("flags3", 78, U2),
            ("headVeh", 84, I4),
            ("magDec", 88, I2),
            ("magAcc", 90, U2),
        ],
    },
    UbxSchema {
        class: 0x01,
        id: 0x12,
        identity: "NAV-VELNED",
        length: 36,
        fields: &[
            ("iTOW", 0, U4),
            ("velN", 4, I4),
            ("velE", 8, I4),
            ("velD", 12, I4),
            ("speed", 16, U4),
            ("gSpeed", 20, U4),
            ("heading", 24, I4),
            ("sAcc", 28, U4),
            ("cAcc", 32, U4),
        ],
    },
    UbxSchema {
        class: 0x01,
        id: 0x13,
        identity: "NAV-HPPOSECEF",
        length: 28,
        fields: &[
            ("version", 0, U1),
            ("iTOW", 4, U4),
            ("ecefX", 8, I4),
            ("ecefY", 12, I4),
            ("ecefZ", 16, I4),
            ("ecefXHp", 20, I1),
            ("ecefYHp", 21, I1),
            ("ecefZHp", 22, I1),
            ("flags", 23, U1),
            ("pAcc", 24, U4),
        ],
    },
    UbxSchema {
        class: 0x01,
        id: 0x14,
        identity: "NAV-HPPOSLLH",
        length: 36,
        fields: &[
            ("version", 0, U1),
            ("flags", 3, U1),
            ("iTOW", 4, U4),
            ("lon", 8, I4),
            ("lat", 12, I4),
            ("height", 16, I4),
            ("hMSL", 20, I4),
            ("lonHp", 24, I1),
            ("latHp", 25, I1),
            ("heightHp", 26, I1),
            ("hMSLHp", 27, I1),
            ("hAcc", 28, U4),
            ("vAcc", 32, U4),
        ],
    },
];

fn schema_for(class: u8, id: u8) -> Option<&'static UbxSchema> {
    SCHEMAS.iter().find(|s| s.class == class && s.id == id)
}

/// 8-bit Fletcher checksum over class, id, length and payload
pub fn checksum(data: &[u8]) -> (u8, u8) {
    let mut ck_a: u8 = 0;
    let mut ck_b: u8 = 0;
    for &byte in data {
        ck_a = ck_a.wrapping_add(byte);
        ck_b = ck_b.wrapping_add(ck_a);
    }
    (ck_a, ck_b)
}

#[derive(Debug, Clone, PartialEq)]
/// A parsed UBX message
pub struct UbxMessage {
    msg_cls: u8,
    msg_id: u8,
    payload: Vec<u8>,
    schema: Option<&'static UbxSchema>,
}

impl UbxMessage {
    /// Message from class, id and raw payload
    pub fn new(msg_cls: u8, msg_id: u8, payload: Vec<u8>) -> Result<Self, UbxError> {
        let schema = schema_for(msg_cls, msg_id);
        if let Some(schema) = schema {
            if payload.len() != schema.length {
                return Err(UbxError::SchemaLength {
                    identity: schema.identity.to_string(),
                    expected: schema.length,
                    actual: payload.len(),
                });
            }
        }
        if payload.len() > u16::MAX as usize {
            return Err(UbxError::PayloadTooLong(payload.len()));
        }
        Ok(Self {
            msg_cls,
            msg_id,
            payload,
            schema,
        })
    }

    /// Parse a complete frame, sync characters and checksum included
    pub fn parse(frame: &[u8]) -> Result<Self, UbxError> {
        if frame.len() < FRAME_OVERHEAD {
            return Err(UbxError::TooShort(frame.len()));
        }
        if frame[..2] != UBX_HEADER {
            return Err(UbxError::Header);
        }
        let declared = u16::from_le_bytes([frame[4], frame[5]]) as usize;
        let actual = frame.len() - FRAME_OVERHEAD;
        if declared != actual {
            return Err(UbxError::LengthMismatch { declared, actual });
        }
        let expected = (frame[frame.len() - 2], frame[frame.len() - 1]);
        let computed = checksum(&frame[2..frame.len() - 2]);
        if expected != computed {
            return Err(UbxError::Checksum { expected, computed });
        }
        Self::new(frame[2], frame[3], frame[6..6 + declared].to_vec())
    }

    /// Message class
    pub fn msg_cls(&self) -> u8 {
        self.msg_cls
    }

    /// Message id within the class
    pub fn msg_id(&self) -> u8 {
        self.msg_id
    }

    /// Human readable name such as `NAV-PVT`
    pub fn identity(&self) -> String {
        match self.schema {
            Some(schema) => schema.identity.to_string(),
            None => format!("UBX-{:02X}-{:02X}", self.msg_cls, self.msg_id),
        }
    }

    /// Payload length in bytes
    pub fn length(&self) -> usize {
        self.payload.len()
    }

    /// Raw payload
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    fn field(&self, name: &str) -> Option<(usize, FieldKind)> {
        self.schema?
            .fields
            .iter()
            .find(|(n, _, _)| *n == name)
            .map(|&(_, offset, kind)| (offset, kind))
    }

    /// Names of all schema fields
    pub fn field_names(&self) -> Vec<&'static str> {
        self.schema
            .map(|s| s.fields.iter().map(|(n, _, _)| *n).collect())
            .unwrap_or_default()
    }

    /// Whether the message has a field called `name`
    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Whether the coordinates carry the 1e-9 degree refinement fields
    pub fn is_high_precision(&self) -> bool {
        self.has_field("latHp") && self.has_field("lonHp")
    }

    /// Value of the field called `name`
    pub fn get(&self, name: &str) -> Option<i64> {
        self.field(name)
            .map(|(offset, kind)| kind.read(&self.payload[offset..offset + kind.size()]))
    }

    /// Overwrite the field called `name`
    pub fn set(&mut self, name: &str, value: i64) -> Result<(), UbxError> {
        let (offset, kind) = self.field(name).ok_or_else(|| UbxError::UnknownField {
            identity: self.identity(),
            field: name.to_string(),
        })?;
        let (min, max) = kind.bounds();
        if value < min || value > max {
            return Err(UbxError::OutOfRange {
                field: name.to_string(),
                value,
                kind,
            });
        }
        kind.write(value, &mut self.payload[offset..offset + kind.size()]);
        Ok(())
    }

    /// Wire form with length and checksum computed from the current payload
    pub fn serialize(&self) -> Vec<u8> {
        let mut frame = Vec::with_capacity(self.payload.len() + FRAME_OVERHEAD);
        frame.extend_from_slice(&UBX_HEADER);
        frame.push(self.msg_cls);
        frame.push(self.msg_id);
        frame.extend_from_slice(&(self.payload.len() as u16).to_le_bytes());
        frame.extend_from_slice(&self.payload);
        let (ck_a, ck_b) = checksum(&frame[2..]);
        frame.push(ck_a);
        frame.push(ck_b);
        frame
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const HPPOSLLH: [u8; 44] = [
        0xB5, 0x62, 0x01, 0x14, 0x24, 0x00, 0x00, 0x00, 0x00, 0x00, 0xB0, 0x19, 0xB9, 0x1D, 0xA5,
        0x4D, 0xE3, 0xCE, 0x34, 0x07, 0xAB, 0x11, 0x42, 0x4D, 0x00, 0x00, 0xA8, 0xC3, 0x00, 0x00,
        0xE5, 0x18, 0xFB, 0x03, 0xB2, 0x9A, 0x01, 0x00, 0x35, 0x72, 0x02, 0x00, 0x5D, 0xEC,
    ];

    const POSECEF: [u8; 28] = [
        0xB5, 0x62, 0x01, 0x01, 0x14, 0x00, 0x40, 0x9E, 0x9F, 0x1D, 0xB5, 0x54, 0x2E, 0x07, 0x7F,
        0xBC, 0x8F, 0xE4, 0xB3, 0xF4, 0xD5, 0x19, 0xF0, 0x05, 0x00, 0x00, 0x26, 0x07,
    ];

    #[test]
    fn checksum_of_poll_request() {
        assert_eq!(checksum(&[0x0A, 0x04, 0x00, 0x00]), (0x0E, 0x34));
    }

    #[test]
    fn high_precision_fields() {
        let msg = UbxMessage::parse(&HPPOSLLH).unwrap();
        assert_eq!(msg.identity(), "NAV-HPPOSLLH");
        assert_eq!(msg.length(), 36);
        assert!(msg.is_high_precision());
        assert_eq!(msg.get("lon"), Some(-823964251));
        assert_eq!(msg.get("lat"), Some(296421172));
        assert_eq!(msg.get("height"), Some(19778));
        assert_eq!(msg.get("hMSL"), Some(50088));
        assert_eq!(msg.get("lonHp"), Some(-27));
        assert_eq!(msg.get("latHp"), Some(24));
        assert_eq!(msg.get("heightHp"), Some(-5));
        assert_eq!(msg.get("hMSLHp"), Some(3));
        assert_eq!(msg.serialize(), HPPOSLLH.to_vec());
    }

    #[test]
    fn ecef_message_has_no_coordinates() {
        let msg = UbxMessage::parse(&POSECEF).unwrap();
        assert_eq!(msg.identity(), "NAV-POSECEF");
        assert!(!msg.has_field("lat"));
        assert!(!msg.is_high_precision());
        assert_eq!(msg.serialize(), POSECEF.to_vec());
    }

    #[test]
    fn edit_regenerates_checksum() {
        let mut msg = UbxMessage::parse(&HPPOSLLH).unwrap();
        msg.set("lat", 296421173).unwrap();
        let frame = msg.serialize();
        assert_ne!(frame, HPPOSLLH.to_vec());
        let reparsed = UbxMessage::parse(&frame).unwrap();
        assert_eq!(reparsed.get("lat"), Some(296421173));
        assert_eq!(frame[..12], HPPOSLLH[..12]);
    }

    #[test]
    fn edit_checks_field_and_range() {
        let mut msg = UbxMessage::parse(&HPPOSLLH).unwrap();
        assert!(matches!(
            msg.set("velN", 1),
            Err(UbxError::UnknownField { .. })
        ));
        assert!(matches!(
            msg.set("latHp", 128),
            Err(UbxError::OutOfRange { .. })
        ));
        assert!(matches!(
            msg.set("lat", i32::MAX as i64 + 1),
            Err(UbxError::OutOfRange { .. })
        ));
        msg.set("latHp", -128).unwrap();
        assert_eq!(msg.get("latHp"), Some(-128));
    }

    #[test]
    fn corrupt_frames() {
        let mut bad = HPPOSLLH;
        bad[43] ^= 0xFF;
        assert!(matches!(
            UbxMessage::parse(&bad),
            Err(UbxError::Checksum { .. })
        ));
        assert_eq!(
            UbxMessage::parse(&HPPOSLLH[..40]),
            Err(UbxError::LengthMismatch {
                declared: 36,
                actual: 32
            })
        );
        assert_eq!(UbxMessage::parse(&[0xB5, 0x62]), Err(UbxError::TooShort(2)));
    }

    #[test]
    fn schema_length_is_enforced() {
        assert!(matches!(
            UbxMessage::new(0x01, 0x14, vec![0; 20]),
            Err(UbxError::SchemaLength { .. })
        ));
    }

    #[test]
    fn unknown_messages_are_opaque() {
        let msg = UbxMessage::new(0x05, 0x01, vec![0x06, 0x8A]).unwrap();
        assert_eq!(msg.identity(), "UBX-05-01");
        assert!(msg.field_names().is_empty());
        assert_eq!(
            msg.serialize(),
            vec![0xB5, 0x62, 0x05, 0x01, 0x02, 0x00, 0x06, 0x8A, 0x98, 0xC1]
        );
    }
}
