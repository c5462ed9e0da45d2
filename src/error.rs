//! Error types shared by every stage of the pipeline.
use std::fmt::{self, Display, Formatter};

use serde::Serialize;
use thiserror::Error;

use crate::message::ProtocolTag;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
/// Stage of framing at which a reader ran out of bytes or hit a bad boundary
pub enum FramePhase {
    /// UBX class, id and length
    Preamble,
    /// UBX payload
    Body,
    /// UBX checksum
    Checksum,
    /// NMEA `\r\n` terminator
    EndMarker,
}

impl Display for FramePhase {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            FramePhase::Preamble => write!(f, "preamble"),
            FramePhase::Body => write!(f, "body"),
            FramePhase::Checksum => write!(f, "checksum"),
            FramePhase::EndMarker => write!(f, "end_marker"),
        }
    }
}

#[derive(Error, Clone, Debug, PartialEq, Eq)]
/// Decimal arithmetic traps and precision assertions
pub enum OperationError {
    /// Result does not fit a decimal
    #[error("Decimal overflow")]
    Overflow,
    /// Divisor was zero
    #[error("Division by zero")]
    DivByZero,
    /// Operation undefined for its operands
    #[error("Invalid decimal operation: {0}")]
    InvalidOperation(String),
    /// Rounding dropped digits outside of an inexact scope
    #[error("Inexact result outside of an allow_inexact scope")]
    Inexact,
    /// Value does not fit its digit window
    #[error("Precision violation: {0}")]
    Precision(String),
}

#[derive(Error, Clone, Debug, PartialEq)]
/// Every failure the pipeline can report for a single message
pub enum GnssError {
    /// A frame reader was handed a header of another protocol
    #[error("Unexpected header bytes {header:02X?} for {protocol}")]
    HeaderMismatch {
        /// Protocol of the reader
        protocol: ProtocolTag,
        /// Header it received
        header: Vec<u8>,
    },
    /// The consumed bytes match no known header
    #[error("No protocol header matched {read_bytes:02X?} (known headers: {mapping})")]
    Classification {
        /// Bytes consumed while classifying
        read_bytes: Vec<u8>,
        /// Known headers, for diagnostics
        mapping: String,
    },
    /// A frame ended early or overran its bounds
    #[error(
        "Malformed {protocol} frame in {phase}: read {bytes_read} of {bytes_expected} bytes"
    )]
    MalformedFrame {
        /// Protocol of the frame
        protocol: ProtocolTag,
        /// Framing stage that failed
        phase: FramePhase,
        /// Bytes received in that stage
        bytes_read: usize,
        /// Bytes the stage needed
        bytes_expected: usize,
        /// Everything read for the frame so far
        partial_bytes: Vec<u8>,
    },
    /// A complete frame could not be decoded
    #[error("Failed to parse {protocol} frame: {reason}")]
    Parse {
        /// Protocol of the frame
        protocol: ProtocolTag,
        /// Message id, when one was assigned
        message_id: Option<uuid::Uuid>,
        /// Codec failure
        reason: String,
    },
    /// A message could not be encoded
    #[error("Failed to serialize {protocol} message {message_id}: {reason}")]
    Serialize {
        /// Protocol requested
        protocol: ProtocolTag,
        /// Message that failed
        message_id: uuid::Uuid,
        /// Codec failure
        reason: String,
    },
    /// A field update was rejected
    #[error("Cannot edit field '{field}' of {message}: {reason}")]
    Edit {
        /// Identity of the edited message
        message: String,
        /// Field that was rejected
        field: String,
        /// Codec failure
        reason: String,
    },
    /// No handler is registered for the protocol
    #[error("Unsupported protocol {0}")]
    UnsupportedProtocol(ProtocolTag),
    /// Decimal arithmetic failed
    #[error("Operation failed: {0}")]
    Operation(#[from] OperationError),
    /// A latency measurement was started twice or never started
    #[error("Stopwatch misuse: {0}")]
    Time(String),
    /// Transport failure
    #[error("I/O error: {0}")]
    Io(String),
    /// The queue has no sender or receiver left
    #[error("Queue closed")]
    QueueClosed,
    /// A pipeline component was built with unusable settings
    #[error("Invalid setup: {0}")]
    Setup(String),
}

impl From<std::io::Error> for GnssError {
    fn from(err: std::io::Error) -> Self {
        GnssError::Io(err.to_string())
    }
}

impl GnssError {
    /// Short machine friendly name of the error kind, used in metrics and events
    pub fn kind(&self) -> &'static str {
        match self {
            GnssError::HeaderMismatch { .. } => "HeaderMismatch",
            GnssError::Classification { .. } => "ClassificationError",
            GnssError::MalformedFrame { .. } => "MalformedFrame",
            GnssError::Parse { .. } => "ParseError",
            GnssError::Serialize { .. } => "SerializeError",
            GnssError::Edit { .. } => "EditError",
            GnssError::UnsupportedProtocol(_) => "UnsupportedProtocol",
            GnssError::Operation(_) => "OperationError",
            GnssError::Time(_) => "TimeError",
            GnssError::Io(_) => "IoError",
            GnssError::QueueClosed => "QueueClosed",
            GnssError::Setup(_) => "SetupError",
        }
    }
}
