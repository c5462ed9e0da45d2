//! GNSS service: framed message I/O over a GNSS client.
//!
//! Reading runs classify, frame and parse; writing runs serialize and write.
//! Both report failures through [`Status`] instead of returning errors, so a
//! bad frame never stops the caller's loop.
use std::sync::Arc;

use futures::future::BoxFuture;
use log::Level;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    classifier::ProtocolClassifier,
    client::GnssClient,
    codec::{ParserProvider, SerializerProvider},
    error::GnssError,
    events::{self, GnssServiceAction, ServiceOperation},
    message::Message,
    metrics::{LatencyMetric, MetricsCollection, SuccessCounterMetric},
    reader::ReaderProvider,
    status::Status,
};

/// Message level access to the receiver
pub trait GnssService: Send + Sync {
    /// Read the next message off the stream
    fn read_message(&self) -> BoxFuture<'_, (Status, Option<Message>)>;
    /// Serialize and write `message`, returning the bytes written
    fn write_message<'a>(&'a self, message: &'a Message) -> BoxFuture<'a, (Status, usize)>;
}

impl<S: GnssService + ?Sized> GnssService for Arc<S> {
    fn read_message(&self) -> BoxFuture<'_, (Status, Option<Message>)> {
        (**self).read_message()
    }

    fn write_message<'a>(&'a self, message: &'a Message) -> BoxFuture<'a, (Status, usize)> {
        (**self).write_message(message)
    }
}

/// Service built from a client and the protocol lookups.
///
/// Reads and writes are serialized separately, so one read and one write can
/// be in flight at the same time.
pub struct StandardGnssService<C> {
    client: C,
    classifier: ProtocolClassifier,
    readers: ReaderProvider,
    parsers: ParserProvider,
    serializers: SerializerProvider,
    read_lock: Mutex<()>,
    write_lock: Mutex<()>,
}

impl<C: GnssClient> StandardGnssService<C> {
    /// Service built from its parts
    pub fn new(
        client: C,
        classifier: ProtocolClassifier,
        readers: ReaderProvider,
        parsers: ParserProvider,
        serializers: SerializerProvider,
    ) -> Self {
        Self {
            client,
            classifier,
            readers,
            parsers,
            serializers,
            read_lock: Mutex::new(()),
            write_lock: Mutex::new(()),
        }
    }

    /// Service with the default NMEA and UBX mappings
    pub fn with_defaults(client: C) -> Self {
        Self::new(
            client,
            ProtocolClassifier::default(),
            ReaderProvider::default(),
            ParserProvider::default(),
            SerializerProvider::default(),
        )
    }

    async fn read_inner(&self) -> Result<Message, GnssError> {
        let (header, protocol) = self.classifier.classify(&self.client).await?;
        let frame = self
            .readers
            .get(protocol)?
            .read_frame(&header, &self.client)
            .await?;
        let payload = self.parsers.get(protocol)?.parse(&frame)?;
        Ok(Message::new(protocol, payload))
    }

    async fn write_inner(&self, message: &Message) -> Result<usize, GnssError> {
        let bytes = self.serializers.get(message.proto)?.serialize(message)?;
        self.client.write(&bytes).await
    }
}

impl<C: GnssClient> GnssService for StandardGnssService<C> {
    fn read_message(&self) -> BoxFuture<'_, (Status, Option<Message>)> {
        Box::pin(async move {
            let _guard = self.read_lock.lock().await;
            match self.read_inner().await {
                Ok(message) => (Status::ok(), Some(message)),
                Err(e) => (Status::err(e), None),
            }
        })
    }

    fn write_message<'a>(&'a self, message: &'a Message) -> BoxFuture<'a, (Status, usize)> {
        Box::pin(async move {
            let _guard = self.write_lock.lock().await;
            match self.write_inner(message).await {
                Ok(written) => (Status::ok(), written),
                Err(e) => (Status::err(e), 0),
            }
        })
    }
}

/// Emits begin and end events around every call
pub struct EventLoggingGnssService<S> {
    inner: S,
}

impl<S: GnssService> EventLoggingGnssService<S> {
    /// Wrap `inner`
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

impl<S: GnssService> GnssService for EventLoggingGnssService<S> {
    fn read_message(&self) -> BoxFuture<'_, (Status, Option<Message>)> {
        Box::pin(async move {
            let activity_id = Uuid::new_v4();
            let operation = ServiceOperation::ReadMessage;
            events::emit(
                Level::Trace,
                "GnssServiceAction",
                &GnssServiceAction::begin(operation, activity_id, None),
            );
            let (status, message) = self.inner.read_message().await;
            events::emit(
                events::outcome_level(&status),
                "GnssServiceAction",
                &GnssServiceAction::end(operation, activity_id, &status, message.as_ref()),
            );
            (status, message)
        })
    }

    fn write_message<'a>(&'a self, message: &'a Message) -> BoxFuture<'a, (Status, usize)> {
        Box::pin(async move {
            let activity_id = Uuid::new_v4();
            let operation = ServiceOperation::WriteMessage;
            events::emit(
                Level::Trace,
                "GnssServiceAction",
                &GnssServiceAction::begin(operation, activity_id, Some(message)),
            );
            let (status, written) = self.inner.write_message(message).await;
            events::emit(
                events::outcome_level(&status),
                "GnssServiceAction",
                &GnssServiceAction::end(operation, activity_id, &status, Some(message)),
            );
            (status, written)
        })
    }
}

/// Counts successes and failures and times every call
pub struct MetricsGnssService<S> {
    inner: S,
    reads: Arc<SuccessCounterMetric>,
    writes: Arc<SuccessCounterMetric>,
    read_latency: Arc<LatencyMetric>,
    write_latency: Arc<LatencyMetric>,
}

impl<S: GnssService> MetricsGnssService<S> {
    /// Wrap `inner`, registering its metrics in `metrics`
    pub fn new(inner: S, metrics: &mut MetricsCollection) -> Self {
        Self {
            inner,
            reads: metrics.add(SuccessCounterMetric::new("GnssService_Read", Vec::new())),
            writes: metrics.add(SuccessCounterMetric::new("GnssService_Write", Vec::new())),
            read_latency: metrics.add(LatencyMetric::new("GnssService_ReadLatency", Vec::new())),
            write_latency: metrics.add(LatencyMetric::new("GnssService_WriteLatency", Vec::new())),
        }
    }
}

impl<S: GnssService> GnssService for MetricsGnssService<S> {
    fn read_message(&self) -> BoxFuture<'_, (Status, Option<Message>)> {
        Box::pin(async move {
            let (status, message) = {
                let _timer = self.read_latency.time_or_warn();
                self.inner.read_message().await
            };
            self.reads.record(status.is_ok());
            (status, message)
        })
    }

    fn write_message<'a>(&'a self, message: &'a Message) -> BoxFuture<'a, (Status, usize)> {
        Box::pin(async move {
            let (status, written) = {
                let _timer = self.write_latency.time_or_warn();
                self.inner.write_message(message).await
            };
            self.writes.record(status.is_ok());
            (status, written)
        })
    }
}
