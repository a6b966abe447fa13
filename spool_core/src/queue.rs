//! Fixed capacity FIFO shared by the reader and the delivery workers.
//!
//! Enqueueing waits while the queue is full, which is what throttles the
//! reader when the sink is slow. Any number of workers may dequeue
//! concurrently and every item is handed to exactly one of them.
use std::sync::Arc;

use tokio::{
    sync::{Mutex, mpsc},
    time::Instant,
};

/// Creates a queue that holds at most `capacity` items.
///
/// # Panics
///
/// Panics if `capacity` is zero.
pub fn bounded<T>(capacity: usize) -> (QueueSender<T>, QueueReceiver<T>) {
    let (tx, rx) = mpsc::channel(capacity);
    (
        QueueSender { tx },
        QueueReceiver {
            rx: Arc::new(Mutex::new(rx)),
        },
    )
}

/// Producer half of the queue.
#[derive(Debug)]
pub struct QueueSender<T> {
    tx: mpsc::Sender<T>,
}

/// Consumer half of the queue. Clones compete for the same items.
#[derive(Debug)]
pub struct QueueReceiver<T> {
    rx: Arc<Mutex<mpsc::Receiver<T>>>,
}

/// Every receiver was dropped. Carries back the rejected item.
#[derive(Debug)]
pub struct QueueClosed<T>(pub T);

/// Outcome of waiting on the queue with a deadline.
#[derive(Debug)]
pub enum Dequeued<T> {
    Item(T),
    /// The deadline elapsed before an item became ready.
    TimedOut,
    /// The queue is empty and every sender was dropped.
    Closed,
}

impl<T> QueueSender<T> {
    /// Appends an item, waiting for a free slot if the queue is full.
    pub async fn enqueue(&self, item: T) -> Result<(), QueueClosed<T>> {
        self.tx.send(item).await.map_err(|err| QueueClosed(err.0))
    }

    /// Number of items currently waiting in the queue.
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }
}

impl<T> QueueReceiver<T> {
    /// Takes an item if one is ready right now, without waiting.
    ///
    /// Returns `None` when the queue is empty or another consumer is
    /// currently dequeueing.
    pub fn try_dequeue(&self) -> Option<T> {
        let mut rx = self.rx.try_lock().ok()?;
        rx.try_recv().ok()
    }

    /// Waits for the next item. Returns `None` once the queue is empty and
    /// every sender was dropped.
    pub async fn dequeue(&self) -> Option<T> {
        self.rx.lock().await.recv().await
    }

    /// Waits for the next item until `deadline`.
    ///
    /// The consumer lock is held for the whole wait, so other receivers
    /// that need it can be held up until `deadline`.
    pub async fn dequeue_until(&self, deadline: Instant) -> Dequeued<T> {
        let wait = async { self.rx.lock().await.recv().await };

        match tokio::time::timeout_at(deadline, wait).await {
            Ok(Some(item)) => Dequeued::Item(item),
            Ok(None) => Dequeued::Closed,
            Err(_) => Dequeued::TimedOut,
        }
    }

    /// Moves up to `max` ready items into `out` without waiting for new ones.
    ///
    /// Items are appended in queue order. Returns how many were moved.
    pub async fn drain_into(&self, max: usize, out: &mut Vec<T>) -> usize {
        if max == 0 {
            return 0;
        }

        let mut rx = self.rx.lock().await;
        move_ready(&mut rx, max, out)
    }

    /// Like [`drain_into`](Self::drain_into), but gives up immediately when
    /// another consumer holds the queue.
    pub fn try_drain_into(&self, max: usize, out: &mut Vec<T>) -> usize {
        if max == 0 {
            return 0;
        }

        match self.rx.try_lock() {
            Ok(mut rx) => move_ready(&mut rx, max, out),
            Err(_) => 0,
        }
    }

    /// Number of items currently waiting in the queue.
    pub async fn len(&self) -> usize {
        self.rx.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn move_ready<T>(rx: &mut mpsc::Receiver<T>, max: usize, out: &mut Vec<T>) -> usize {
    let mut moved = 0;
    while moved < max {
        match rx.try_recv() {
            Ok(item) => {
                out.push(item);
                moved += 1;
            }
            Err(_) => break,
        }
    }
    moved
}

impl<T> Clone for QueueSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> Clone for QueueReceiver<T> {
    fn clone(&self) -> Self {
        Self {
            rx: self.rx.clone(),
        }
    }
}
