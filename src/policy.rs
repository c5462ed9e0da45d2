//! Eligibility policies.
use std::collections::{HashMap, HashSet};

use crate::{
    error::GnssError,
    message::{Message, ParsedPayload, ProtocolTag},
};

/// Decides whether a message should be transformed
pub trait Policy: Send + Sync {
    /// Whether `message` qualifies
    fn qualifies(&self, message: &Message) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
/// Every message qualifies
pub struct AlwaysQualifies;

impl Policy for AlwaysQualifies {
    fn qualifies(&self, _message: &Message) -> bool {
        true
    }
}

/// Sentence types whose position fields are not absolute positions
pub const DEFAULT_EXCLUDED_SENTENCES: &[&str] = &["DTM"];

#[derive(Debug, Clone)]
/// Messages that carry an absolute position.
///
/// The payload must expose both `lat` and `lon`. Standard NMEA sentences whose
/// type is in the exclusion set never qualify; proprietary sentences are not
/// subject to the exclusion set.
pub struct HasLocation {
    excluded: HashSet<String>,
}

impl HasLocation {
    /// Policy excluding the given NMEA sentence types
    pub fn new<I, S>(excluded: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            excluded: excluded.into_iter().map(Into::into).collect(),
        }
    }
}

impl Default for HasLocation {
    fn default() -> Self {
        Self::new(DEFAULT_EXCLUDED_SENTENCES.iter().copied())
    }
}

impl Policy for HasLocation {
    fn qualifies(&self, message: &Message) -> bool {
        if !(message.payload.has_field("lat") && message.payload.has_field("lon")) {
            return false;
        }
        match &message.payload {
            ParsedPayload::Nmea(sentence) => {
                sentence.is_proprietary() || !self.excluded.contains(sentence.sentence_type())
            }
            ParsedPayload::Ubx(_) => true,
        }
    }
}

/// Picks the policy that applies to a message
pub trait PolicyProvider: Send + Sync {
    /// Policy for `message`
    fn get_policy(&self, message: &Message) -> Result<&dyn Policy, GnssError>;
}

/// Same policy for every message
pub struct ConstPolicyProvider {
    policy: Box<dyn Policy>,
}

impl ConstPolicyProvider {
    /// Provider always returning `policy`
    pub fn new(policy: impl Policy + 'static) -> Self {
        Self {
            policy: Box::new(policy),
        }
    }
}

impl PolicyProvider for ConstPolicyProvider {
    fn get_policy(&self, _message: &Message) -> Result<&dyn Policy, GnssError> {
        Ok(self.policy.as_ref())
    }
}

#[derive(Default)]
/// Policy chosen by the message's protocol tag
pub struct ProtocolPolicyProvider {
    policies: HashMap<ProtocolTag, Box<dyn Policy>>,
}

impl ProtocolPolicyProvider {
    /// Provider without any policy
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `policy` for messages tagged `protocol`
    pub fn with(mut self, protocol: ProtocolTag, policy: impl Policy + 'static) -> Self {
        self.policies.insert(protocol, Box::new(policy));
        self
    }
}

impl PolicyProvider for ProtocolPolicyProvider {
    fn get_policy(&self, message: &Message) -> Result<&dyn Policy, GnssError> {
        self.policies
            .get(&message.proto)
            .map(|policy| policy.as_ref())
            .ok_or(GnssError::UnsupportedProtocol(message.proto))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{nmea::NmeaSentence, ubx::UbxMessage};

    fn nmea(frame: &[u8]) -> Message {
        Message::new(
            ProtocolTag::Nmea,
            ParsedPayload::Nmea(NmeaSentence::parse(frame).unwrap()),
        )
    }

    fn ubx(cls: u8, id: u8, len: usize) -> Message {
        Message::new(
            ProtocolTag::Ubx,
            ParsedPayload::Ubx(UbxMessage::new(cls, id, vec![0; len]).unwrap()),
        )
    }

    #[test]
    fn positions_qualify() {
        let policy = HasLocation::default();
        assert!(policy.qualifies(&nmea(
            b"$GNGLL,4238.96342,N,07118.97943,W,221515.00,A,D*68\r\n"
        )));
        assert!(policy.qualifies(&ubx(0x01, 0x02, 28)));
        assert!(policy.qualifies(&ubx(0x01, 0x14, 36)));
    }

    #[test]
    fn non_positions_do_not_qualify() {
        let policy = HasLocation::default();
        assert!(!policy.qualifies(&nmea(b"$GNVTG,,T,,M,0.046,N,0.086,K,D*34\r\n")));
        assert!(!policy.qualifies(&nmea(
            b"$GPGSV,3,1,10,03,26,248,42,04,48,306,17,16,68,221,41,26,72,052,18,1*61\r\n"
        )));
        assert!(!policy.qualifies(&ubx(0x01, 0x01, 20)));
    }

    #[test]
    fn datum_offsets_are_excluded() {
        let dtm = nmea(b"$GNDTM,W84,,0.0,N,0.0,E,0.0,W84*71\r\n");
        assert!(!HasLocation::default().qualifies(&dtm));
        assert!(HasLocation::new(Vec::<String>::new()).qualifies(&dtm));
    }

    #[test]
    fn proprietary_ignores_exclusions() {
        let pubx = nmea(b"$PUBX,00,221515.00,4238.96342,N,07118.97943,W,36.700,G3,2.1,2.0,0.085,0.00,0.000,,1.04,1.51,0.95,12,0,0*7B\r\n");
        assert!(HasLocation::new(["00", "PUBX", "UBX"]).qualifies(&pubx));
    }

    #[test]
    fn protocol_provider_dispatch() {
        let provider = ProtocolPolicyProvider::new().with(ProtocolTag::Ubx, AlwaysQualifies);
        let gll = nmea(b"$GNGLL,4238.96342,N,07118.97943,W,221515.00,A,D*68\r\n");
        assert!(matches!(
            provider.get_policy(&gll),
            Err(GnssError::UnsupportedProtocol(ProtocolTag::Nmea))
        ));
        let vel = ubx(0x01, 0x12, 36);
        assert!(provider.get_policy(&vel).unwrap().qualifies(&vel));
        assert!(ConstPolicyProvider::new(AlwaysQualifies)
            .get_policy(&gll)
            .unwrap()
            .qualifies(&gll));
    }
}
