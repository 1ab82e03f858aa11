//! Ready-made subscribers.

use crate::error::{FlowError, FlowResult};
use crate::progress::Progress;
use crate::stream::{Demand, Emission, Publisher, Subscriber, Subscription};
use parking_lot::Mutex;
use std::sync::mpsc;
use std::sync::Arc;
use tracing::trace;

/// A subscriber that records every emission.
///
/// Clones share the same log, so a test keeps one clone and subscribes
/// another.
pub struct Recorder<K, T> {
    log: Arc<Mutex<Vec<Emission<K, T>>>>,
    reply: Demand,
}

impl<K, T> Clone for Recorder<K, T> {
    fn clone(&self) -> Self {
        Self {
            log: Arc::clone(&self.log),
            reply: self.reply,
        }
    }
}

impl<K, T> Default for Recorder<K, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, T> Recorder<K, T> {
    /// Creates a recorder that signals no demand of its own.
    pub fn new() -> Self {
        Self::replying(Demand::none())
    }

    /// Creates a recorder that answers every delivered item with `demand`.
    pub fn replying(demand: Demand) -> Self {
        Self {
            log: Arc::new(Mutex::new(Vec::new())),
            reply: demand,
        }
    }

    /// Returns the number of terminal emissions received.
    pub fn terminal_count(&self) -> usize {
        self.log.lock().iter().filter(|e| e.is_terminal()).count()
    }

    /// Returns true once `BatchComplete` arrived.
    pub fn is_complete(&self) -> bool {
        self.log
            .lock()
            .iter()
            .any(|e| matches!(e, Emission::BatchComplete))
    }

    /// Returns the number of emissions received.
    pub fn len(&self) -> usize {
        self.log.lock().len()
    }

    /// Returns true if nothing was received.
    pub fn is_empty(&self) -> bool {
        self.log.lock().is_empty()
    }
}

impl<K: Clone + PartialEq, T: Clone> Recorder<K, T> {
    /// Returns every emission received, in order.
    pub fn emissions(&self) -> Vec<Emission<K, T>> {
        self.log.lock().clone()
    }

    /// Returns every item received, in order.
    pub fn items(&self) -> Vec<T> {
        self.log
            .lock()
            .iter()
            .filter_map(|e| e.item().cloned())
            .collect()
    }

    /// Returns the error of `BatchFailed`, if it arrived.
    pub fn failure(&self) -> Option<FlowError> {
        self.log.lock().iter().find_map(|e| match e {
            Emission::BatchFailed(error) => Some(error.clone()),
            _ => None,
        })
    }

    /// Returns the per-item errors received.
    pub fn item_errors(&self) -> Vec<(K, FlowError)> {
        self.log
            .lock()
            .iter()
            .filter_map(|e| match e {
                Emission::ItemError(key, error) => Some((key.clone(), error.clone())),
                _ => None,
            })
            .collect()
    }

    /// Returns the progress values received for `key`, in order.
    pub fn progress_for(&self, key: &K) -> Vec<Progress> {
        self.log
            .lock()
            .iter()
            .filter_map(|e| match e {
                Emission::ProgressUpdate(k, progress) if k == key => Some(*progress),
                _ => None,
            })
            .collect()
    }

    /// Returns the progress of `key` as the consumer observes it.
    ///
    /// `Complete` once the item has errored or the stream completed,
    /// otherwise the last progress update (or the default).
    pub fn final_progress(&self, key: &K) -> Progress {
        let log = self.log.lock();
        let finished = log.iter().any(|e| match e {
            Emission::ItemError(k, _) => k == key,
            Emission::BatchComplete => true,
            _ => false,
        });
        if finished {
            return Progress::Complete;
        }
        log.iter()
            .rev()
            .find_map(|e| match e {
                Emission::ProgressUpdate(k, progress) if k == key => Some(*progress),
                _ => None,
            })
            .unwrap_or_default()
    }
}

impl<K: Send, T: Send> Subscriber<K, T> for Recorder<K, T> {
    fn receive(&mut self, emission: Emission<K, T>) -> Demand {
        let item = emission.item().is_some();
        self.log.lock().push(emission);
        if item {
            self.reply
        } else {
            Demand::none()
        }
    }
}

/// A pull-based iterator over a stream.
///
/// Each `next()` asks for one more item when nothing is buffered, then
/// blocks until an emission arrives. Iteration ends after the terminal
/// emission. Dropping the iterator early cancels the stream.
pub struct BlockingStream<K, T> {
    receiver: mpsc::Receiver<Emission<K, T>>,
    subscription: Subscription,
    outstanding: u64,
    done: bool,
}

impl<K: Send + 'static, T: Send + 'static> BlockingStream<K, T> {
    /// Subscribes to `publisher`.
    pub fn new<P>(publisher: &P) -> Self
    where
        P: Publisher<Key = K, Item = T>,
    {
        let (sender, receiver) = mpsc::channel();
        let subscription = publisher.subscribe(move |emission: Emission<K, T>| {
            // The receiver is gone once the iterator is dropped.
            let _ = sender.send(emission);
            Demand::none()
        });
        Self {
            receiver,
            subscription,
            outstanding: 0,
            done: false,
        }
    }

    /// Drains the stream into its items.
    ///
    /// Per-item errors are skipped; `BatchFailed` becomes the error.
    pub fn collect_items(self) -> FlowResult<Vec<T>> {
        let mut items = Vec::new();
        for emission in self {
            match emission {
                Emission::ItemResult(item) => items.push(item),
                Emission::BatchFailed(error) => return Err(error),
                _ => {}
            }
        }
        Ok(items)
    }
}

impl<K, T> Iterator for BlockingStream<K, T> {
    type Item = Emission<K, T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let emission = match self.receiver.try_recv() {
            Ok(emission) => emission,
            Err(mpsc::TryRecvError::Empty) => {
                if self.outstanding == 0 {
                    trace!("requesting one more item");
                    self.outstanding = 1;
                    self.subscription.request(Demand::max(1));
                }
                match self.receiver.recv() {
                    Ok(emission) => emission,
                    Err(_) => {
                        self.done = true;
                        return None;
                    }
                }
            }
            Err(mpsc::TryRecvError::Disconnected) => {
                self.done = true;
                return None;
            }
        };
        if emission.item().is_some() {
            self.outstanding = self.outstanding.saturating_sub(1);
        }
        if emission.is_terminal() {
            self.done = true;
        }
        Some(emission)
    }
}

impl<K, T> Drop for BlockingStream<K, T> {
    fn drop(&mut self) {
        if !self.done {
            self.subscription.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recorder_helpers() {
        let mut recorder: Recorder<u8, &str> = Recorder::replying(Demand::max(2));
        assert_eq!(recorder.receive(Emission::ProgressUpdate(1, Progress::from_percent(40.0))), Demand::none());
        assert_eq!(recorder.receive(Emission::ItemResult("a")), Demand::max(2));
        recorder.receive(Emission::ItemError(2, FlowError::not_found(2)));
        recorder.receive(Emission::BatchComplete);

        assert_eq!(recorder.items(), vec!["a"]);
        assert_eq!(recorder.item_errors(), vec![(2, FlowError::not_found(2))]);
        assert_eq!(recorder.progress_for(&1), vec![Progress::from_percent(40.0)]);
        assert_eq!(recorder.final_progress(&1), Progress::Complete);
        assert_eq!(recorder.terminal_count(), 1);
        assert!(recorder.is_complete());
        assert_eq!(recorder.len(), 4);
    }

    #[test]
    fn final_progress_before_completion() {
        let mut recorder: Recorder<u8, ()> = Recorder::new();
        assert_eq!(recorder.final_progress(&1), Progress::default());
        recorder.receive(Emission::ProgressUpdate(1, Progress::from_percent(30.0)));
        recorder.receive(Emission::ProgressUpdate(1, Progress::from_percent(70.0)));
        assert_eq!(recorder.final_progress(&1), Progress::from_percent(70.0));
        recorder.receive(Emission::ItemError(1, FlowError::MissingResult));
        assert_eq!(recorder.final_progress(&1), Progress::Complete);
    }
}
