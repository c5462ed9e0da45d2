//! Header based protocol detection.
use std::collections::HashMap;

use lazy_static::lazy_static;

use crate::{client::GnssClient, error::GnssError, message::ProtocolTag};

/// First byte of an NMEA sentence
pub const NMEA_HEADER: u8 = 0x24;
/// First byte of an NMEA encapsulation sentence
pub const NMEA_ENCAPSULATION_HEADER: u8 = 0x21;
/// UBX sync characters
pub const UBX_HEADER: [u8; 2] = [0xB5, 0x62];

lazy_static! {
    /// Headers recognised on the GNSS stream
    pub static ref DEFAULT_HEADERS: Vec<(Vec<u8>, ProtocolTag)> = vec![
        (vec![NMEA_HEADER], ProtocolTag::Nmea),
        (UBX_HEADER.to_vec(), ProtocolTag::Ubx),
    ];
}

#[derive(Debug, Default)]
struct TrieNode {
    children: HashMap<u8, usize>,
    tag: Option<ProtocolTag>,
}

#[derive(Debug)]
/// Prefix trie over the configured header byte strings
pub struct ProtocolClassifier {
    nodes: Vec<TrieNode>,
    max_len: usize,
    mapping: String,
}

impl Default for ProtocolClassifier {
    fn default() -> Self {
        Self::build(DEFAULT_HEADERS.iter().cloned())
    }
}

impl ProtocolClassifier {
    /// Build a classifier from `(header bytes, protocol)` pairs.
    ///
    /// Every header must be at least one byte long and at least one header
    /// must be given, otherwise classification could never consume a byte.
    pub fn new(
        headers: impl IntoIterator<Item = (Vec<u8>, ProtocolTag)>,
    ) -> Result<Self, GnssError> {
        let headers: Vec<_> = headers.into_iter().collect();
        if headers.is_empty() {
            return Err(GnssError::Setup("no protocol header configured".into()));
        }
        if let Some((_, tag)) = headers.iter().find(|(header, _)| header.is_empty()) {
            return Err(GnssError::Setup(format!("empty header for {tag}")));
        }
        Ok(Self::build(headers))
    }

    fn build(headers: impl IntoIterator<Item = (Vec<u8>, ProtocolTag)>) -> Self {
        let mut nodes = vec![TrieNode::default()];
        let mut max_len = 0;
        let mut mapping = Vec::new();
        for (header, tag) in headers {
            max_len = max_len.max(header.len());
            mapping.push(format!("{header:02X?}: {tag}"));
            let mut node = 0;
            for byte in header {
                node = match nodes[node].children.get(&byte) {
                    Some(&next) => next,
                    None => {
                        nodes.push(TrieNode::default());
                        let next = nodes.len() - 1;
                        nodes[node].children.insert(byte, next);
                        next
                    }
                };
            }
            nodes[node].tag = Some(tag);
        }
        Self {
            nodes,
            max_len,
            mapping: mapping.join(", "),
        }
    }

    /// Longest configured header
    pub fn max_header_len(&self) -> usize {
        self.max_len
    }

    /// Consume header bytes from `client` one at a time.
    ///
    /// Returns the matched header and its protocol. On failure every byte
    /// read, including the one that broke the match, is reported back.
    pub async fn classify<C: GnssClient + ?Sized>(
        &self,
        client: &C,
    ) -> Result<(Vec<u8>, ProtocolTag), GnssError> {
        let mut read_bytes = Vec::with_capacity(self.max_len);
        let mut node = 0;
        while read_bytes.len() < self.max_len {
            let byte = match client.read(1).await?.first() {
                Some(&byte) => byte,
                None => break,
            };
            read_bytes.push(byte);
            match self.nodes[node].children.get(&byte) {
                Some(&next) => node = next,
                None => break,
            }
            if let Some(tag) = self.nodes[node].tag {
                return Ok((read_bytes, tag));
            }
        }
        Err(GnssError::Classification {
            read_bytes,
            mapping: self.mapping.clone(),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{client::TransportClient, serial::StubTransport};
    use std::io::Cursor;

    fn client(bytes: &[u8]) -> TransportClient<StubTransport<Cursor<Vec<u8>>, Vec<u8>>> {
        TransportClient::new(StubTransport::new(Cursor::new(bytes.to_vec()), Vec::new()).unwrap())
    }

    #[tokio::test]
    async fn classifies_nmea_with_one_byte() {
        let client = client(b"$GPGGA");
        let classifier = ProtocolClassifier::default();
        let (header, tag) = classifier.classify(&client).await.unwrap();
        assert_eq!(header, vec![0x24]);
        assert_eq!(tag, ProtocolTag::Nmea);
        assert_eq!(client.read(1).await.unwrap(), b"G");
    }

    #[tokio::test]
    async fn classifies_ubx_with_two_bytes() {
        let client = client(&[0xB5, 0x62, 0x01, 0x07]);
        let classifier = ProtocolClassifier::default();
        let (header, tag) = classifier.classify(&client).await.unwrap();
        assert_eq!(header, UBX_HEADER.to_vec());
        assert_eq!(tag, ProtocolTag::Ubx);
        assert_eq!(client.read(1).await.unwrap(), vec![0x01]);
    }

    #[tokio::test]
    async fn failure_consumes_one_more_byte_than_the_matched_prefix() {
        let client = client(&[0xB5, 0x00, 0x24]);
        let classifier = ProtocolClassifier::default();
        match classifier.classify(&client).await {
            Err(GnssError::Classification { read_bytes, .. }) => {
                assert_eq!(read_bytes, vec![0xB5, 0x00])
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(client.read(1).await.unwrap(), vec![0x24]);
    }

    #[tokio::test]
    async fn unknown_byte_fails_immediately() {
        let client = client(&[0x0A, 0x24]);
        let classifier = ProtocolClassifier::default();
        let err = classifier.classify(&client).await.unwrap_err();
        assert_eq!(
            err,
            GnssError::Classification {
                read_bytes: vec![0x0A],
                mapping: "[24]: NMEA, [B5, 62]: UBX".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn custom_mapping() {
        let client = client(b"!AIVDM");
        let classifier = ProtocolClassifier::new(vec![
            (vec![NMEA_HEADER], ProtocolTag::Nmea),
            (vec![NMEA_ENCAPSULATION_HEADER], ProtocolTag::Nmea),
        ])
        .unwrap();
        assert_eq!(classifier.max_header_len(), 1);
        let (header, tag) = classifier.classify(&client).await.unwrap();
        assert_eq!((header, tag), (b"!".to_vec(), ProtocolTag::Nmea));
    }

    #[test]
    fn empty_mappings_are_rejected() {
        assert!(matches!(
            ProtocolClassifier::new(Vec::new()),
            Err(GnssError::Setup(_))
        ));
        assert!(matches!(
            ProtocolClassifier::new(vec![
                (vec![NMEA_HEADER], ProtocolTag::Nmea),
                (Vec::new(), ProtocolTag::Ubx),
            ]),
            Err(GnssError::Setup(_))
        ));
    }
}
