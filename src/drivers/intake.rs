//! Bounded hand-off between the ingest worker and the frame scheduler.
//!
//! When the queue is full the producer evicts the oldest entry before pushing,
//! so a stalled consumer costs stale data, never memory. Evictions are counted.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError, TrySendError};

use crate::drivers::{Datagram, DatagramSource, MonitorError};

/// Producer half. Holds a receiver clone so it can evict from the front.
pub struct DropOldestSender<T> {
    tx: Sender<T>,
    evict: Receiver<T>,
    dropped: Arc<AtomicU64>,
}

impl<T> DropOldestSender<T> {
    /// Never blocks. The eviction handle keeps the channel open, so the
    /// `Err` arm only fires if the channel itself has been torn down.
    pub fn push(&self, value: T) -> Result<(), T> {
        let mut value = value;
        loop {
            match self.tx.try_send(value) {
                Ok(()) => return Ok(()),
                Err(TrySendError::Full(back)) => {
                    if self.evict.try_recv().is_ok() {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                    }
                    value = back;
                }
                Err(TrySendError::Disconnected(back)) => return Err(back),
            }
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Consumer half.
pub struct DropOldestReceiver<T> {
    rx: Receiver<T>,
    dropped: Arc<AtomicU64>,
}

impl<T> DropOldestReceiver<T> {
    pub fn try_recv(&self) -> Result<T, TryRecvError> {
        self.rx.try_recv()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Entries evicted by the producer so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

pub fn drop_oldest_channel<T>(capacity: usize) -> (DropOldestSender<T>, DropOldestReceiver<T>) {
    let (tx, rx) = bounded(capacity.max(1));
    let dropped = Arc::new(AtomicU64::new(0));
    (
        DropOldestSender {
            tx,
            evict: rx.clone(),
            dropped: Arc::clone(&dropped),
        },
        DropOldestReceiver { rx, dropped },
    )
}

pub type IntakeSender = DropOldestSender<Datagram>;
pub type IntakeReceiver = DropOldestReceiver<Datagram>;

pub fn intake_queue(capacity: usize) -> (IntakeSender, IntakeReceiver) {
    drop_oldest_channel(capacity)
}

impl DatagramSource for IntakeReceiver {
    fn try_next(&mut self) -> Result<Option<Datagram>, MonitorError> {
        match self.rx.try_recv() {
            Ok(datagram) => Ok(Some(datagram)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(MonitorError::IntakeClosed),
        }
    }

    fn dropped(&self) -> u64 {
        DropOldestReceiver::dropped(self)
    }
}
