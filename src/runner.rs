//! Supervision of the tasks moving messages between the service and queues.
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::{sync::watch, task::JoinSet};

use crate::{
    error::GnssError,
    message::Message,
    processor::Processor,
    queue::{stopped, AsyncPump, AsyncQueue, BoundedQueue, Transform, TransformQueue},
    service::GnssService,
};

/// Runs the inbound and outbound loops of a [`GnssService`].
///
/// Inbound reads messages and puts them on the inbound queue. Outbound takes
/// messages off the outbound queue and writes them. Read failures are logged
/// and the loop carries on. Shutdown interrupts pending reads and queue waits,
/// but a write that already started is allowed to finish.
pub struct GnssServiceRunner<S> {
    service: Arc<S>,
    inbound: Arc<dyn AsyncQueue<Message>>,
    outbound: Arc<dyn AsyncQueue<Message>>,
}

impl<S: GnssService + 'static> GnssServiceRunner<S> {
    /// Runner moving messages between `service` and the two queues
    pub fn new(
        service: Arc<S>,
        inbound: Arc<dyn AsyncQueue<Message>>,
        outbound: Arc<dyn AsyncQueue<Message>>,
    ) -> Self {
        Self {
            service,
            inbound,
            outbound,
        }
    }

    async fn inbound_loop(
        service: Arc<S>,
        queue: Arc<dyn AsyncQueue<Message>>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), GnssError> {
        loop {
            let (status, message) = tokio::select! {
                biased;
                _ = stopped(&mut shutdown) => return Ok(()),
                read = service.read_message() => read,
            };
            let message = match (status.error, message) {
                (None, Some(message)) => message,
                (Some(e), _) => {
                    log::warn!("Dropped inbound data: {e}");
                    continue;
                }
                (None, None) => continue,
            };
            tokio::select! {
                biased;
                _ = stopped(&mut shutdown) => return Ok(()),
                result = queue.put(message) => result?,
            }
        }
    }

    async fn outbound_loop(
        service: Arc<S>,
        queue: Arc<dyn AsyncQueue<Message>>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), GnssError> {
        loop {
            let message = tokio::select! {
                biased;
                _ = stopped(&mut shutdown) => return Ok(()),
                message = queue.get() => message?,
            };
            let (status, _) = service.write_message(&message).await;
            if let Some(e) = status.error {
                log::error!("Failed to write {}: {e}", message.message_id());
            }
        }
    }

    /// Spawn both loops and wait until they finish.
    ///
    /// Returns the first error a loop ended with; the other loop is stopped
    /// when that happens.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<(), GnssError> {
        let mut tasks = JoinSet::new();
        tasks.spawn(Self::inbound_loop(
            self.service.clone(),
            self.inbound.clone(),
            shutdown.clone(),
        ));
        tasks.spawn(Self::outbound_loop(
            self.service.clone(),
            self.outbound.clone(),
            shutdown,
        ));
        log::info!("GNSS service runner started");
        let mut outcome = Ok(());
        while let Some(joined) = tasks.join_next().await {
            let result = match joined {
                Ok(result) => result,
                Err(e) if e.is_cancelled() => continue,
                Err(e) => Err(GnssError::Io(format!("runner task failed: {e}"))),
            };
            if let Err(e) = result {
                log::error!("Runner loop stopped: {e}");
                if outcome.is_ok() {
                    outcome = Err(e);
                }
                tasks.abort_all();
            }
        }
        log::info!("GNSS service runner stopped");
        outcome
    }
}

/// Transformation running every dequeued message through `processor`
pub fn processing(processor: Arc<dyn Processor>) -> Transform<Message> {
    Arc::new(move |message: Message| -> BoxFuture<'static, Message> {
        let processor = processor.clone();
        Box::pin(async move {
            let (status, message) = processor.process(message).await;
            if let Some(e) = &status.error {
                log::warn!(
                    "{} failed on {} message {}: {e}",
                    processor.name(),
                    message.proto,
                    message.message_id()
                );
            }
            message
        })
    })
}

type ProcessedQueue = TransformQueue<Message, Arc<BoundedQueue<Message>>>;

/// Service runner plus the processing pump between its two queues
pub struct GnssPipeline<S> {
    runner: GnssServiceRunner<S>,
    pump: AsyncPump<Message, ProcessedQueue, Arc<BoundedQueue<Message>>>,
}

impl<S: GnssService + 'static> GnssPipeline<S> {
    /// Wire `service` and `processor` through two queues of `capacity` items
    pub fn new(service: Arc<S>, processor: Arc<dyn Processor>, capacity: usize) -> Self {
        let inbound = Arc::new(BoundedQueue::new(capacity));
        let outbound = Arc::new(BoundedQueue::new(capacity));
        let processed = TransformQueue::new(inbound.clone(), processing(processor));
        Self {
            runner: GnssServiceRunner::new(service, inbound, outbound.clone()),
            pump: AsyncPump::new(processed, outbound),
        }
    }

    /// Run until `shutdown` flips or a stage fails
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<(), GnssError> {
        tokio::try_join!(self.runner.run(shutdown.clone()), self.pump.run(shutdown))?;
        Ok(())
    }
}
