//! Bounded FIFO channels with occupancy tracking.
//!
//! Both the request and the result side of the pipeline go through these.
//! `put` waits while the channel is full, `get` waits while it is empty.
//! Every handle is cloneable, so any number of workers can share one end.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::AppError;

/// Occupancy gauge shared by all handles of one channel.
#[derive(Debug)]
struct Gauge {
    name: &'static str,
    capacity: usize,
    peak: AtomicUsize,
}

impl Gauge {
    fn observe(&self, len: usize) {
        self.peak.fetch_max(len, Ordering::Relaxed);
    }
}

/// Create a bounded channel holding at most `capacity` items.
///
/// `name` only shows up in logs and errors.
///
/// # Panics
///
/// Panics if `capacity` is zero.
pub fn bounded<T>(name: &'static str, capacity: usize) -> (Sender<T>, Receiver<T>) {
    let (tx, rx) = async_channel::bounded(capacity);
    let gauge = Arc::new(Gauge {
        name,
        capacity,
        peak: AtomicUsize::new(0),
    });
    (
        Sender {
            inner: tx,
            gauge: gauge.clone(),
        },
        Receiver { inner: rx, gauge },
    )
}

/// Producer handle.
#[derive(Debug)]
pub struct Sender<T> {
    inner: async_channel::Sender<T>,
    gauge: Arc<Gauge>,
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            gauge: self.gauge.clone(),
        }
    }
}

impl<T> Sender<T> {
    /// Enqueue `item`, waiting while the channel is full.
    ///
    /// Fails only when every receiver has been dropped.
    pub async fn put(&self, item: T) -> Result<(), AppError> {
        self.inner
            .send(item)
            .await
            .map_err(|_| AppError::ChannelClosed(self.gauge.name))?;
        self.gauge.observe(self.inner.len());
        Ok(())
    }

    pub fn capacity(&self) -> usize {
        self.gauge.capacity
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Highest occupancy observed right after a `put`.
    pub fn peak(&self) -> usize {
        self.gauge.peak.load(Ordering::Relaxed)
    }
}

/// Consumer handle.
#[derive(Debug)]
pub struct Receiver<T> {
    inner: async_channel::Receiver<T>,
    gauge: Arc<Gauge>,
}

impl<T> Clone for Receiver<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            gauge: self.gauge.clone(),
        }
    }
}

impl<T> Receiver<T> {
    /// Dequeue the next item, waiting while the channel is empty.
    ///
    /// Returns `None` once every sender is gone and the buffer is drained.
    pub async fn get(&self) -> Option<T> {
        self.inner.recv().await.ok()
    }

    /// Dequeue without waiting. `None` if nothing is buffered right now.
    pub fn try_get(&self) -> Option<T> {
        self.inner.try_recv().ok()
    }

    pub fn capacity(&self) -> usize {
        self.gauge.capacity
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn peak(&self) -> usize {
        self.gauge.peak.load(Ordering::Relaxed)
    }

    /// Stop accepting items; pending `put`s fail, buffered items stay readable.
    pub fn close(&self) -> bool {
        self.inner.close()
    }
}
