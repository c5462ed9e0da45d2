#![deny(missing_docs)]
//! # xHoundPi
//! Message processing pipeline sitting between a u-blox GNSS receiver and its
//! consumers.
//!
//! Bytes read off the serial line are classified as NMEA or UBX, framed,
//! parsed into messages with named fields and passed through a chain of
//! processors that apply a coordinate offset to every message carrying a
//! position. The processed messages are serialized with fresh checksums and
//! written back out.
//!
//! The stages are:
//! 1. [`service::GnssService`]: classify, frame and parse incoming bytes, or
//!    serialize and write outgoing messages.
//! 2. [`processor::Processor`]: decide with a [`policy::Policy`] whether a
//!    message qualifies and transform it with an [`operator::Operator`].
//! 3. [`queue`] and [`runner`]: bounded queues and the tasks moving messages
//!    between the stages.
pub mod classifier;
pub mod client;
pub mod codec;
pub mod config;
pub mod editor;
pub mod error;
pub mod events;
pub mod formats;
pub mod geo;
pub mod math;
pub mod message;
pub mod metrics;
pub mod nmea;
pub mod offset;
pub mod operator;
pub mod policy;
pub mod processor;
pub mod queue;
pub mod reader;
pub mod runner;
pub mod serial;
pub mod service;
pub mod status;
pub mod ubx;

pub use error::{FramePhase, GnssError, OperationError};
pub use message::{Message, ParsedPayload, ProtocolTag};
pub use status::Status;
