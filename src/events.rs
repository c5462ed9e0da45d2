//! Structured event records.
//!
//! Events are serialized to one JSON object per line and handed to the `log`
//! facade under the [`EVENTS_TARGET`] target, so the logger configuration
//! decides where they end up.
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::Level;
use serde::Serialize;
use tokio::sync::watch;
use uuid::Uuid;

use crate::{
    message::{Message, ProtocolTag},
    metrics::MetricsCollection,
    status::Status,
};

/// Log target every event is written to
pub const EVENTS_TARGET: &str = "xhoundpi::events";

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
/// Phase of a traced operation
pub enum Opcode {
    /// Operation started
    Begin,
    /// Operation finished
    End,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
/// GNSS service operation an event refers to
pub enum ServiceOperation {
    /// Reading one message off the receiver
    ReadMessage,
    /// Writing one message out
    WriteMessage,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
/// Begin or end of a GNSS service call
pub struct GnssServiceAction {
    /// Begin or end
    pub opcode: Opcode,
    /// Traced call
    pub operation: ServiceOperation,
    /// Outcome, only set on end
    pub success: Option<bool>,
    /// Shared by the begin and end of one call
    pub activity_id: Uuid,
    /// Error text of a failed call
    pub details: Option<String>,
    /// Message involved, if any
    pub message_id: Option<Uuid>,
    /// Protocol of that message
    pub protocol: Option<ProtocolTag>,
    /// When the event was created
    pub timestamp: DateTime<Utc>,
    /// Layout version of this record
    pub schema_ver: u32,
}

impl GnssServiceAction {
    /// Current layout version
    pub const SCHEMA_VER: u32 = 1;

    /// Event opening `operation`
    pub fn begin(operation: ServiceOperation, activity_id: Uuid, message: Option<&Message>) -> Self {
        Self {
            opcode: Opcode::Begin,
            operation,
            success: None,
            activity_id,
            details: None,
            message_id: message.map(Message::message_id),
            protocol: message.map(|m| m.proto),
            timestamp: Utc::now(),
            schema_ver: Self::SCHEMA_VER,
        }
    }

    /// Event closing `operation` with its outcome
    pub fn end(
        operation: ServiceOperation,
        activity_id: Uuid,
        status: &Status,
        message: Option<&Message>,
    ) -> Self {
        Self {
            opcode: Opcode::End,
            success: Some(status.is_ok()),
            details: status.error.as_ref().map(ToString::to_string),
            ..Self::begin(operation, activity_id, message)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
/// Begin or end of one processor run on one message
pub struct ProcessorAction {
    /// Begin or end
    pub opcode: Opcode,
    /// Outcome, only set on end
    pub success: Option<bool>,
    /// Name of the processor
    pub processor_id: String,
    /// Shared by the begin and end of one run
    pub activity_id: Uuid,
    /// Processed message
    pub message_id: Uuid,
    /// Protocol of the message
    pub protocol: ProtocolTag,
    /// Error text of a failed run
    pub details: Option<String>,
    /// When the event was created
    pub timestamp: DateTime<Utc>,
    /// Layout version of this record
    pub schema_ver: u32,
}

impl ProcessorAction {
    /// Current layout version
    pub const SCHEMA_VER: u32 = 1;

    /// Event opening a processor run
    pub fn begin(processor_id: &str, activity_id: Uuid, message: &Message) -> Self {
        Self {
            opcode: Opcode::Begin,
            success: None,
            processor_id: processor_id.to_string(),
            activity_id,
            message_id: message.message_id(),
            protocol: message.proto,
            details: None,
            timestamp: Utc::now(),
            schema_ver: Self::SCHEMA_VER,
        }
    }

    /// Event closing a processor run
    pub fn end(processor_id: &str, activity_id: Uuid, status: &Status, message: &Message) -> Self {
        Self {
            opcode: Opcode::End,
            success: Some(status.is_ok()),
            details: status.error.as_ref().map(ToString::to_string),
            ..Self::begin(processor_id, activity_id, message)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
/// Free form application lifecycle event
pub struct AppEvent {
    /// What happened
    pub message: String,
    /// When the event was created
    pub timestamp: DateTime<Utc>,
    /// Layout version of this record
    pub schema_ver: u32,
}

impl AppEvent {
    /// Current layout version
    pub const SCHEMA_VER: u32 = 1;

    /// Event stamped with the current time
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timestamp: Utc::now(),
            schema_ver: Self::SCHEMA_VER,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
/// Snapshot of every registered metric
pub struct MetricsReport {
    /// Value of every dimension
    pub metrics_map: std::collections::BTreeMap<String, f64>,
    /// Unique id of this report
    pub report_id: Uuid,
    /// Seconds between reports
    pub frequency: u64,
    /// When the snapshot was taken
    pub timestamp: DateTime<Utc>,
    /// Layout version of this record
    pub schema_ver: u32,
}

impl MetricsReport {
    /// Current layout version
    pub const SCHEMA_VER: u32 = 1;

    /// Snapshot of `metrics`
    pub fn new(metrics: &MetricsCollection, frequency: u64) -> Self {
        Self {
            metrics_map: metrics.mappify(),
            report_id: Uuid::new_v4(),
            frequency,
            timestamp: Utc::now(),
            schema_ver: Self::SCHEMA_VER,
        }
    }
}

/// Write `event` as a JSON line tagged with `kind`
pub fn emit<E: Serialize>(level: Level, kind: &str, event: &E) {
    if !log::log_enabled!(target: EVENTS_TARGET, level) {
        return;
    }
    match serde_json::to_string(event) {
        Ok(json) => log::log!(target: EVENTS_TARGET, level, "{kind} {json}"),
        Err(e) => log::warn!("Failed to serialize {kind} event: {e}"),
    }
}

/// Level for the end event of an operation
pub fn outcome_level(status: &Status) -> Level {
    if status.is_ok() {
        Level::Debug
    } else {
        Level::Error
    }
}

/// Emit a [`MetricsReport`] every `frequency` seconds until `shutdown` flips.
///
/// A frequency of zero disables reporting.
pub async fn report_metrics(
    metrics: MetricsCollection,
    frequency: u64,
    mut shutdown: watch::Receiver<bool>,
) {
    if frequency == 0 {
        log::debug!("Metrics reporting disabled");
        return;
    }
    let mut interval = tokio::time::interval(Duration::from_secs(frequency));
    // the first tick completes immediately
    interval.tick().await;
    loop {
        tokio::select! {
            _ = interval.tick() => {
                emit(Level::Info, "MetricsReport", &MetricsReport::new(&metrics, frequency));
            }
            _ = shutdown.changed() => break,
        }
        if *shutdown.borrow() {
            break;
        }
    }
}
