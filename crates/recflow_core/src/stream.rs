//! The consumer-side stream contract.
//!
//! A [`Publisher`] hands every subscriber a fresh remote call (cold
//! semantics) and returns a [`Subscription`] through which the consumer
//! signals [`Demand`] and cancellation. Everything the stream produces
//! arrives at the [`Subscriber`] as an [`Emission`].
//!
//! ## Invariants
//!
//! - At most one terminal emission (`BatchComplete` or `BatchFailed`)
//! - Nothing is delivered after a terminal emission
//! - Nothing is delivered after the consumer cancels

use crate::error::FlowError;
use crate::progress::Progress;
use std::fmt;
use std::ops::{Add, AddAssign};
use std::sync::Arc;

/// Outstanding consumer demand.
///
/// A saturating counter with a distinguished unlimited value that never
/// decrements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Demand(Option<u64>);

impl Demand {
    /// No demand.
    pub const fn none() -> Self {
        Self(Some(0))
    }

    /// Demand for at most `n` items.
    pub const fn max(n: u64) -> Self {
        Self(Some(n))
    }

    /// Unlimited demand.
    pub const fn unlimited() -> Self {
        Self(None)
    }

    /// Returns true for unlimited demand.
    pub fn is_unlimited(&self) -> bool {
        self.0.is_none()
    }

    /// Returns true if at least one more item may be delivered.
    pub fn is_positive(&self) -> bool {
        self.0 != Some(0)
    }

    /// Returns the bounded count, or `None` when unlimited.
    pub fn count(&self) -> Option<u64> {
        self.0
    }

    /// Returns the demand left after one delivery.
    ///
    /// Unlimited demand stays unlimited; bounded demand floors at zero.
    #[must_use]
    pub fn decremented(self) -> Self {
        match self.0 {
            Some(n) => Self(Some(n.saturating_sub(1))),
            None => self,
        }
    }

    /// Returns the results limit for the next page operation.
    ///
    /// `min(demand, maximum)` when bounded, `maximum` when unlimited.
    pub fn page_limit(&self, maximum: usize) -> usize {
        match self.0 {
            Some(n) => usize::try_from(n).map_or(maximum, |n| n.min(maximum)),
            None => maximum,
        }
    }
}

impl Default for Demand {
    fn default() -> Self {
        Self::none()
    }
}

impl Add for Demand {
    type Output = Demand;

    fn add(self, rhs: Demand) -> Demand {
        match (self.0, rhs.0) {
            (Some(a), Some(b)) => Demand(Some(a.saturating_add(b))),
            _ => Demand::unlimited(),
        }
    }
}

impl AddAssign for Demand {
    fn add_assign(&mut self, rhs: Demand) {
        *self = *self + rhs;
    }
}

impl fmt::Display for Demand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(n) => write!(f, "{n}"),
            None => write!(f, "unlimited"),
        }
    }
}

/// One signal produced by a stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Emission<K, T> {
    /// Progress of one item.
    ProgressUpdate(K, Progress),
    /// One produced item.
    ItemResult(T),
    /// One item failed; siblings are unaffected.
    ItemError(K, FlowError),
    /// The stream finished successfully.
    BatchComplete,
    /// The stream failed.
    BatchFailed(FlowError),
}

impl<K, T> Emission<K, T> {
    /// Returns true for `BatchComplete` and `BatchFailed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Emission::BatchComplete | Emission::BatchFailed(_))
    }

    /// Returns the item, if this is an `ItemResult`.
    pub fn item(&self) -> Option<&T> {
        match self {
            Emission::ItemResult(item) => Some(item),
            _ => None,
        }
    }

    /// Consumes the emission and returns the item, if any.
    pub fn into_item(self) -> Option<T> {
        match self {
            Emission::ItemResult(item) => Some(item),
            _ => None,
        }
    }
}

/// Receives emissions from a stream.
pub trait Subscriber<K, T>: Send {
    /// Receives one emission.
    ///
    /// Returns additional demand signalled in response. Paginated streams
    /// fold it into their outstanding demand; other streams ignore it.
    fn receive(&mut self, emission: Emission<K, T>) -> Demand;
}

impl<K, T, F> Subscriber<K, T> for F
where
    F: FnMut(Emission<K, T>) -> Demand + Send,
{
    fn receive(&mut self, emission: Emission<K, T>) -> Demand {
        self(emission)
    }
}

/// A source of emissions.
pub trait Publisher {
    /// Key identifying items in progress and error emissions.
    type Key: Send + 'static;
    /// Produced item.
    type Item: Send + 'static;

    /// Issues the underlying remote call for a new subscriber.
    fn subscribe<S>(&self, subscriber: S) -> Subscription
    where
        S: Subscriber<Self::Key, Self::Item> + 'static;
}

/// Control surface a stream exposes through its [`Subscription`].
pub(crate) trait Control: Send + Sync {
    fn request(&self, demand: Demand);
    fn cancel(&self);
    fn is_cancelled(&self) -> bool;
}

/// Handle through which a consumer drives one stream.
///
/// Cloning shares the same stream. Dropping the handle does not cancel.
#[derive(Clone)]
pub struct Subscription {
    control: Arc<dyn Control>,
}

impl Subscription {
    pub(crate) fn new(control: Arc<dyn Control>) -> Self {
        Self { control }
    }

    /// Signals additional demand.
    ///
    /// Only paginated streams act on demand; the others deliver everything
    /// their remote call produces.
    pub fn request(&self, demand: Demand) {
        self.control.request(demand);
    }

    /// Cancels the stream.
    ///
    /// Idempotent. No emission reaches the subscriber once this returns,
    /// except one already being delivered on another thread.
    pub fn cancel(&self) {
        self.control.cancel();
    }

    /// Returns true once the consumer has cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.control.is_cancelled()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
