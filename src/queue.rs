//! Bounded message queues and the pump moving items between them.
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::{mpsc, watch, Mutex};

use crate::error::GnssError;

/// Default number of items a queue holds before `put` waits
pub const DEFAULT_CAPACITY: usize = 1000;

/// FIFO queue with asynchronous access on both ends
pub trait AsyncQueue<T>: Send + Sync {
    /// Append `item`, waiting while the queue is full
    fn put(&self, item: T) -> BoxFuture<'_, Result<(), GnssError>>;
    /// Remove the oldest item, waiting while the queue is empty
    fn get(&self) -> BoxFuture<'_, Result<T, GnssError>>;
}

impl<T, Q: AsyncQueue<T> + ?Sized> AsyncQueue<T> for Arc<Q> {
    fn put(&self, item: T) -> BoxFuture<'_, Result<(), GnssError>> {
        (**self).put(item)
    }

    fn get(&self) -> BoxFuture<'_, Result<T, GnssError>> {
        (**self).get()
    }
}

/// Queue of fixed capacity backed by a tokio channel
pub struct BoundedQueue<T> {
    sender: mpsc::Sender<T>,
    receiver: Mutex<mpsc::Receiver<T>>,
}

impl<T: Send> BoundedQueue<T> {
    /// Queue holding at most `capacity` items
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        Self {
            sender,
            receiver: Mutex::new(receiver),
        }
    }

    /// Most items the queue holds
    pub fn capacity(&self) -> usize {
        self.sender.max_capacity()
    }

    /// Items currently waiting
    pub fn len(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    /// Whether no item is waiting
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Refuse further puts; items already queued can still be taken
    pub async fn close(&self) {
        self.receiver.lock().await.close();
    }
}

impl<T: Send> Default for BoundedQueue<T> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl<T: Send> AsyncQueue<T> for BoundedQueue<T> {
    fn put(&self, item: T) -> BoxFuture<'_, Result<(), GnssError>> {
        Box::pin(async move {
            self.sender
                .send(item)
                .await
                .map_err(|_| GnssError::QueueClosed)
        })
    }

    fn get(&self) -> BoxFuture<'_, Result<T, GnssError>> {
        Box::pin(async move {
            self.receiver
                .lock()
                .await
                .recv()
                .await
                .ok_or(GnssError::QueueClosed)
        })
    }
}

/// Boxed asynchronous item transformation
pub type Transform<T> = Arc<dyn Fn(T) -> BoxFuture<'static, T> + Send + Sync>;

/// Applies a transformation to every item taken from the inner queue
pub struct TransformQueue<T, Q> {
    inner: Q,
    transform: Transform<T>,
}

impl<T: Send + 'static, Q: AsyncQueue<T>> TransformQueue<T, Q> {
    /// Apply `transform` to every item taken from `inner`
    pub fn new(inner: Q, transform: Transform<T>) -> Self {
        Self { inner, transform }
    }
}

impl<T: Send + 'static, Q: AsyncQueue<T>> AsyncQueue<T> for TransformQueue<T, Q> {
    fn put(&self, item: T) -> BoxFuture<'_, Result<(), GnssError>> {
        self.inner.put(item)
    }

    fn get(&self) -> BoxFuture<'_, Result<T, GnssError>> {
        Box::pin(async move {
            let item = self.inner.get().await?;
            Ok((self.transform)(item).await)
        })
    }
}

/// Calls a side effect for every item taken from the inner queue
pub struct CallbackQueue<T, Q> {
    inner: Q,
    callback: Arc<dyn Fn(&T) + Send + Sync>,
}

impl<T: Send, Q: AsyncQueue<T>> CallbackQueue<T, Q> {
    /// Call `callback` on every item put into `inner`
    pub fn new(inner: Q, callback: impl Fn(&T) + Send + Sync + 'static) -> Self {
        Self {
            inner,
            callback: Arc::new(callback),
        }
    }
}

impl<T: Send, Q: AsyncQueue<T>> AsyncQueue<T> for CallbackQueue<T, Q> {
    fn put(&self, item: T) -> BoxFuture<'_, Result<(), GnssError>> {
        self.inner.put(item)
    }

    fn get(&self) -> BoxFuture<'_, Result<T, GnssError>> {
        Box::pin(async move {
            let item = self.inner.get().await?;
            (self.callback)(&item);
            Ok(item)
        })
    }
}

/// Resolve once `shutdown` reads `true` or its sender is gone
pub async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            break;
        }
    }
}

/// Moves items from one queue into another until stopped
pub struct AsyncPump<T, I, O> {
    input: I,
    output: O,
    _item: std::marker::PhantomData<fn() -> T>,
}

impl<T: Send, I: AsyncQueue<T>, O: AsyncQueue<T>> AsyncPump<T, I, O> {
    /// Pump from `input` to `output`
    pub fn new(input: I, output: O) -> Self {
        Self {
            input,
            output,
            _item: std::marker::PhantomData,
        }
    }

    /// Pump until `shutdown` flips; a closed queue ends the pump with an error
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), GnssError> {
        loop {
            let item = tokio::select! {
                biased;
                _ = stopped(&mut shutdown) => return Ok(()),
                item = self.input.get() => item?,
            };
            tokio::select! {
                biased;
                _ = stopped(&mut shutdown) => return Ok(()),
                result = self.output.put(item) => result?,
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn fifo_order() {
        let queue = BoundedQueue::new(4);
        for i in 0..4 {
            queue.put(i).await.unwrap();
        }
        assert_eq!(queue.len(), 4);
        for i in 0..4 {
            assert_eq!(queue.get().await.unwrap(), i);
        }
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn put_waits_when_full() {
        let queue = BoundedQueue::new(1);
        queue.put(1).await.unwrap();
        assert!(timeout(Duration::from_millis(20), queue.put(2)).await.is_err());
        assert_eq!(queue.get().await.unwrap(), 1);
        queue.put(3).await.unwrap();
        assert_eq!(queue.get().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn get_waits_when_empty() {
        let queue: BoundedQueue<u8> = BoundedQueue::default();
        assert_eq!(queue.capacity(), DEFAULT_CAPACITY);
        assert!(timeout(Duration::from_millis(20), queue.get()).await.is_err());
    }

    #[tokio::test]
    async fn closed_queue_drains_then_fails() {
        let queue = BoundedQueue::new(2);
        queue.put(7).await.unwrap();
        queue.close().await;
        assert_eq!(queue.put(8).await, Err(GnssError::QueueClosed));
        assert_eq!(queue.get().await, Ok(7));
        assert_eq!(queue.get().await, Err(GnssError::QueueClosed));
    }

    #[tokio::test]
    async fn transform_applies_on_get() {
        let double: Transform<u32> =
            Arc::new(|x: u32| -> BoxFuture<'static, u32> { Box::pin(async move { x * 2 }) });
        let queue = TransformQueue::new(BoundedQueue::new(2), double);
        queue.put(21).await.unwrap();
        assert_eq!(queue.get().await.unwrap(), 42);
    }

    #[tokio::test]
    async fn callback_sees_every_item() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let queue = CallbackQueue::new(BoundedQueue::new(4), move |x: &usize| {
            counter.fetch_add(*x, Ordering::SeqCst);
        });
        for i in 1..=3 {
            queue.put(i).await.unwrap();
        }
        for _ in 0..3 {
            queue.get().await.unwrap();
        }
        assert_eq!(seen.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn pump_moves_items_until_stopped() {
        let input = Arc::new(BoundedQueue::new(4));
        let output = Arc::new(BoundedQueue::new(4));
        let (stop, shutdown) = watch::channel(false);
        let pump = AsyncPump::new(input.clone(), output.clone());
        let task = tokio::spawn(async move { pump.run(shutdown).await });
        for i in 0..3 {
            input.put(i).await.unwrap();
        }
        for i in 0..3 {
            assert_eq!(output.get().await.unwrap(), i);
        }
        stop.send(true).unwrap();
        assert_eq!(task.await.unwrap(), Ok(()));
    }
}
