//! Byte level access to the receiver.
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::{
    error::GnssError,
    metrics::{CounterMetric, MetricsCollection},
    serial::Transport,
};

/// Size bounded byte access to the GNSS receiver
pub trait GnssClient: Send + Sync {
    /// Read at most `size` bytes, an empty result means the stream ran dry
    fn read(&self, size: usize) -> BoxFuture<'_, Result<Vec<u8>, GnssError>>;
    /// Write a complete buffer
    fn write<'a>(&'a self, data: &'a [u8]) -> BoxFuture<'a, Result<usize, GnssError>>;
}

impl<C: GnssClient + ?Sized> GnssClient for Arc<C> {
    fn read(&self, size: usize) -> BoxFuture<'_, Result<Vec<u8>, GnssError>> {
        (**self).read(size)
    }

    fn write<'a>(&'a self, data: &'a [u8]) -> BoxFuture<'a, Result<usize, GnssError>> {
        (**self).write(data)
    }
}

/// Client talking directly to a transport
pub struct TransportClient<T> {
    transport: T,
}

impl<T: Transport> TransportClient<T> {
    /// Wrap a transport
    pub fn new(transport: T) -> Self {
        Self { transport }
    }
}

impl<T: Transport> GnssClient for TransportClient<T> {
    fn read(&self, size: usize) -> BoxFuture<'_, Result<Vec<u8>, GnssError>> {
        Box::pin(async move { Ok(self.transport.read(size).await?) })
    }

    fn write<'a>(&'a self, data: &'a [u8]) -> BoxFuture<'a, Result<usize, GnssError>> {
        Box::pin(async move { Ok(self.transport.write(data).await?) })
    }
}

/// Client wrapper counting the bytes that actually went through
pub struct CountingClient<C> {
    inner: C,
    bytes_read: Arc<CounterMetric>,
    bytes_written: Arc<CounterMetric>,
}

impl<C: GnssClient> CountingClient<C> {
    /// Wrap `inner`, registering the byte counters in `metrics`
    pub fn new(inner: C, metrics: &mut MetricsCollection) -> Self {
        Self {
            inner,
            bytes_read: metrics.add(CounterMetric::new("GnssClient_BytesRead", Vec::new())),
            bytes_written: metrics.add(CounterMetric::new("GnssClient_BytesWritten", Vec::new())),
        }
    }

    /// Bytes read so far
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read.value()
    }

    /// Bytes written so far
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.value()
    }
}

impl<C: GnssClient> GnssClient for CountingClient<C> {
    fn read(&self, size: usize) -> BoxFuture<'_, Result<Vec<u8>, GnssError>> {
        Box::pin(async move {
            let data = self.inner.read(size).await?;
            self.bytes_read.increase(data.len() as u64);
            Ok(data)
        })
    }

    fn write<'a>(&'a self, data: &'a [u8]) -> BoxFuture<'a, Result<usize, GnssError>> {
        Box::pin(async move {
            let written = self.inner.write(data).await?;
            self.bytes_written.increase(written as u64);
            Ok(written)
        })
    }
}
