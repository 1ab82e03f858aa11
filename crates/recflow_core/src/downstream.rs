//! The delivery half shared by every stream.

use crate::serial::SerialContext;
use crate::stream::{Demand, Emission, Subscriber};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{trace, warn};

/// Owns the subscriber of one stream instance and enforces terminal
/// exclusivity and silence after cancellation.
pub(crate) struct Downstream<K, T> {
    serial: SerialContext,
    subscriber: Mutex<Option<Box<dyn Subscriber<K, T>>>>,
    cancelled: AtomicBool,
    terminated: AtomicBool,
}

impl<K, T> Downstream<K, T>
where
    K: Send + 'static,
    T: Send + 'static,
{
    pub(crate) fn new(subscriber: impl Subscriber<K, T> + 'static) -> Arc<Self> {
        Arc::new(Self {
            serial: SerialContext::new(),
            subscriber: Mutex::new(Some(Box::new(subscriber))),
            cancelled: AtomicBool::new(false),
            terminated: AtomicBool::new(false),
        })
    }

    /// Runs `task` on this stream's serial context.
    pub(crate) fn execute(&self, task: impl FnOnce() + Send + 'static) {
        self.serial.execute(task);
    }

    /// Delivers one emission to the subscriber.
    ///
    /// Must run on the serial context. Returns the demand the subscriber
    /// signalled, or `None` when the emission was suppressed.
    pub(crate) fn deliver(&self, emission: Emission<K, T>) -> Option<Demand> {
        if self.cancelled.load(Ordering::SeqCst) {
            trace!("suppressing emission after cancellation");
            return None;
        }
        let terminal = emission.is_terminal();
        if terminal {
            if self.terminated.swap(true, Ordering::SeqCst) {
                warn!("dropping second terminal emission");
                return None;
            }
        } else if self.terminated.load(Ordering::SeqCst) {
            warn!("dropping emission after terminal emission");
            return None;
        }

        let mut slot = self.subscriber.lock();
        let subscriber = slot.as_mut()?;
        let demand = subscriber.receive(emission);
        if terminal {
            slot.take();
        }
        Some(demand)
    }

    /// Delivers `emission` from the serial context.
    #[cfg(test)]
    pub(crate) fn send(self: &Arc<Self>, emission: Emission<K, T>) {
        let this = Arc::clone(self);
        self.serial.execute(move || {
            this.deliver(emission);
        });
    }

    /// Marks the stream cancelled and releases the subscriber.
    ///
    /// Returns true only for the first call.
    pub(crate) fn cancel(self: &Arc<Self>) -> bool {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return false;
        }
        let this = Arc::clone(self);
        self.serial.execute(move || {
            this.subscriber.lock().take();
        });
        true
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub(crate) fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    /// Returns true while emissions can still reach the subscriber.
    pub(crate) fn is_active(&self) -> bool {
        !self.is_cancelled() && !self.is_terminated()
    }
}
