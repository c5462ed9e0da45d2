//! Frame readers.
//!
//! A reader runs after the classifier consumed the header bytes and pulls the
//! rest of one frame off the client. The returned frame always starts with
//! the original header.
use std::collections::HashMap;

use futures::future::BoxFuture;

use crate::{
    classifier::{NMEA_ENCAPSULATION_HEADER, NMEA_HEADER, UBX_HEADER},
    client::GnssClient,
    error::{FramePhase, GnssError},
    message::ProtocolTag,
};

/// Longest standard NMEA sentence, delimiters included
pub const NMEA_MAX_LEN: usize = 82;
const UBX_PREAMBLE_LEN: usize = 4;
const UBX_CHECKSUM_LEN: usize = 2;

/// Reads the remainder of a frame whose header was already consumed
pub trait FrameReader: Send + Sync {
    /// Read one complete frame starting with `header`
    fn read_frame<'a>(
        &'a self,
        header: &'a [u8],
        client: &'a dyn GnssClient,
    ) -> BoxFuture<'a, Result<Vec<u8>, GnssError>>;
}

/// Read until `size` bytes arrived or the client ran dry
async fn read_up_to(client: &dyn GnssClient, size: usize) -> Result<Vec<u8>, GnssError> {
    let mut buf = Vec::with_capacity(size);
    while buf.len() < size {
        let chunk = client.read(size - buf.len()).await?;
        if chunk.is_empty() {
            break;
        }
        buf.extend(chunk);
    }
    Ok(buf)
}

#[derive(Debug, Default, Clone, Copy)]
/// Reader for `B5 62 | class | id | len | payload | ck_a ck_b` frames
pub struct UbxFrameReader;

impl UbxFrameReader {
    async fn read_section(
        client: &dyn GnssClient,
        frame: &mut Vec<u8>,
        size: usize,
        phase: FramePhase,
    ) -> Result<(), GnssError> {
        let bytes = read_up_to(client, size).await?;
        let bytes_read = bytes.len();
        frame.extend(bytes);
        if bytes_read < size {
            return Err(GnssError::MalformedFrame {
                protocol: ProtocolTag::Ubx,
                phase,
                bytes_read,
                bytes_expected: size,
                partial_bytes: frame.clone(),
            });
        }
        Ok(())
    }
}

impl FrameReader for UbxFrameReader {
    fn read_frame<'a>(
        &'a self,
        header: &'a [u8],
        client: &'a dyn GnssClient,
    ) -> BoxFuture<'a, Result<Vec<u8>, GnssError>> {
        Box::pin(async move {
            if header != UBX_HEADER.as_slice() {
                return Err(GnssError::HeaderMismatch {
                    protocol: ProtocolTag::Ubx,
                    header: header.to_vec(),
                });
            }
            let mut frame = header.to_vec();
            Self::read_section(client, &mut frame, UBX_PREAMBLE_LEN, FramePhase::Preamble).await?;
            let len = u16::from_le_bytes([frame[4], frame[5]]) as usize;
            Self::read_section(client, &mut frame, len, FramePhase::Body).await?;
            Self::read_section(client, &mut frame, UBX_CHECKSUM_LEN, FramePhase::Checksum).await?;
            Ok(frame)
        })
    }
}

#[derive(Debug, Default, Clone, Copy)]
/// Reader for `\r\n` terminated NMEA sentences.
///
/// Standard sentences are capped at [`NMEA_MAX_LEN`] bytes; proprietary
/// (`$P...`) and encapsulation (`!...`) sentences are read until the
/// terminator whatever their length.
pub struct NmeaFrameReader;

impl FrameReader for NmeaFrameReader {
    fn read_frame<'a>(
        &'a self,
        header: &'a [u8],
        client: &'a dyn GnssClient,
    ) -> BoxFuture<'a, Result<Vec<u8>, GnssError>> {
        Box::pin(async move {
            let mut unbounded = match header {
                [NMEA_HEADER] => false,
                [NMEA_ENCAPSULATION_HEADER] => true,
                _ => {
                    return Err(GnssError::HeaderMismatch {
                        protocol: ProtocolTag::Nmea,
                        header: header.to_vec(),
                    })
                }
            };
            let mut frame = header.to_vec();
            loop {
                let byte = match client.read(1).await?.first() {
                    Some(&byte) => byte,
                    None => {
                        return Err(GnssError::MalformedFrame {
                            protocol: ProtocolTag::Nmea,
                            phase: FramePhase::EndMarker,
                            bytes_read: frame.len(),
                            bytes_expected: NMEA_MAX_LEN,
                            partial_bytes: frame,
                        })
                    }
                };
                frame.push(byte);
                if frame.len() == 2 && byte == b'P' {
                    unbounded = true;
                }
                if frame.ends_with(b"\r\n") {
                    return Ok(frame);
                }
                if !unbounded && frame.len() >= NMEA_MAX_LEN {
                    return Err(GnssError::MalformedFrame {
                        protocol: ProtocolTag::Nmea,
                        phase: FramePhase::EndMarker,
                        bytes_read: frame.len(),
                        bytes_expected: NMEA_MAX_LEN,
                        partial_bytes: frame,
                    });
                }
            }
        })
    }
}

/// Lookup of frame readers by protocol
pub struct ReaderProvider {
    readers: HashMap<ProtocolTag, Box<dyn FrameReader>>,
}

impl Default for ReaderProvider {
    fn default() -> Self {
        let mut readers: HashMap<ProtocolTag, Box<dyn FrameReader>> = HashMap::new();
        readers.insert(ProtocolTag::Nmea, Box::new(NmeaFrameReader));
        readers.insert(ProtocolTag::Ubx, Box::new(UbxFrameReader));
        Self { readers }
    }
}

impl ReaderProvider {
    /// Provider with the given readers
    pub fn new(readers: HashMap<ProtocolTag, Box<dyn FrameReader>>) -> Self {
        Self { readers }
    }

    /// Reader for `protocol`
    pub fn get(&self, protocol: ProtocolTag) -> Result<&dyn FrameReader, GnssError> {
        self.readers
            .get(&protocol)
            .map(|reader| reader.as_ref())
            .ok_or(GnssError::UnsupportedProtocol(protocol))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{client::TransportClient, serial::StubTransport};
    use std::{collections::VecDeque, sync::Mutex};

    /// Client over a finite byte string, reads past the end come back empty
    struct FiniteClient(Mutex<VecDeque<u8>>);

    impl FiniteClient {
        fn new(bytes: &[u8]) -> Self {
            Self(Mutex::new(bytes.iter().copied().collect()))
        }
    }

    impl GnssClient for FiniteClient {
        fn read(&self, size: usize) -> BoxFuture<'_, Result<Vec<u8>, GnssError>> {
            Box::pin(async move {
                let mut bytes = self.0.lock().unwrap();
                let n = size.min(bytes.len());
                Ok(bytes.drain(..n).collect())
            })
        }

        fn write<'a>(&'a self, data: &'a [u8]) -> BoxFuture<'a, Result<usize, GnssError>> {
            Box::pin(async move { Ok(data.len()) })
        }
    }

    #[tokio::test]
    async fn reads_complete_ubx_frame() {
        let client = FiniteClient::new(&[0x05, 0x01, 0x02, 0x00, 0x06, 0x8A, 0x98, 0xC1, 0xFF]);
        let frame = UbxFrameReader.read_frame(&UBX_HEADER, &client).await.unwrap();
        assert_eq!(
            frame,
            vec![0xB5, 0x62, 0x05, 0x01, 0x02, 0x00, 0x06, 0x8A, 0x98, 0xC1]
        );
    }

    #[tokio::test]
    async fn ubx_eof_in_each_phase() {
        let cases: [(&[u8], FramePhase, usize, usize); 3] = [
            (&[0x05, 0x01], FramePhase::Preamble, 2, 4),
            (&[0x05, 0x01, 0x04, 0x00, 0xAA], FramePhase::Body, 1, 4),
            (&[0x05, 0x01, 0x01, 0x00, 0xAA, 0x01], FramePhase::Checksum, 1, 2),
        ];
        for (bytes, expected_phase, read, expected) in cases {
            let client = FiniteClient::new(bytes);
            match UbxFrameReader.read_frame(&UBX_HEADER, &client).await {
                Err(GnssError::MalformedFrame {
                    protocol,
                    phase,
                    bytes_read,
                    bytes_expected,
                    partial_bytes,
                }) => {
                    assert_eq!(protocol, ProtocolTag::Ubx);
                    assert_eq!(phase, expected_phase);
                    assert_eq!(bytes_read, read);
                    assert_eq!(bytes_expected, expected);
                    assert_eq!(&partial_bytes[2..], bytes);
                }
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn reads_nmea_sentence_until_crlf() {
        let client = FiniteClient::new(b"GNGLL,4238.96342,N,07118.97943,W,221515.00,A,D*68\r\n$GN");
        let frame = NmeaFrameReader.read_frame(b"$", &client).await.unwrap();
        assert_eq!(
            frame,
            b"$GNGLL,4238.96342,N,07118.97943,W,221515.00,A,D*68\r\n".to_vec()
        );
    }

    #[tokio::test]
    async fn standard_sentence_longer_than_82_bytes_fails() {
        let body = vec![b'A'; 100];
        let client = FiniteClient::new(&body);
        match NmeaFrameReader.read_frame(b"$", &client).await {
            Err(GnssError::MalformedFrame {
                phase, bytes_read, ..
            }) => {
                assert_eq!(phase, FramePhase::EndMarker);
                assert_eq!(bytes_read, NMEA_MAX_LEN);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn proprietary_sentence_has_no_ceiling() {
        let mut body = b"PUBX,41".to_vec();
        body.extend(vec![b','; 90]);
        body.extend(b"*00\r\n");
        let client = FiniteClient::new(&body);
        let frame = NmeaFrameReader.read_frame(b"$", &client).await.unwrap();
        assert_eq!(frame.len(), body.len() + 1);

        let mut body = b"AIVDM".to_vec();
        body.extend(vec![b'0'; 90]);
        body.extend(b"\r\n");
        let client = FiniteClient::new(&body);
        let frame = NmeaFrameReader.read_frame(b"!", &client).await.unwrap();
        assert_eq!(frame[0], b'!');
    }

    #[tokio::test]
    async fn nmea_header_mismatch() {
        let client = FiniteClient::new(b"GPGGA\r\n");
        let err = NmeaFrameReader.read_frame(&[0xB5], &client).await.unwrap_err();
        assert!(matches!(err, GnssError::HeaderMismatch { .. }));
    }

    #[tokio::test]
    async fn circular_stub_never_runs_dry() {
        let stub = StubTransport::new(std::io::Cursor::new(b"GPTXT*00\r\n".to_vec()), Vec::new())
            .unwrap();
        let client = TransportClient::new(stub);
        let frame = NmeaFrameReader.read_frame(b"$", &client).await.unwrap();
        assert_eq!(frame, b"$GPTXT*00\r\n".to_vec());
    }

    #[test]
    fn provider_rejects_unknown_protocol() {
        let provider = ReaderProvider::default();
        assert!(provider.get(ProtocolTag::Nmea).is_ok());
        assert!(matches!(
            provider.get(ProtocolTag::None),
            Err(GnssError::UnsupportedProtocol(ProtocolTag::None))
        ));
    }
}
