//! Exhaustive enumeration of binary decisions.
//!
//! Code under test asks a shared [`DecisionSpace`] whether to take each
//! optional branch (usually "inject a fault here"). Running that code
//! repeatedly, advancing the space after every run, visits every
//! combination of decisions exactly once, without knowing up front how many
//! decisions a run makes.

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::trace;

/// A lazily growing binary counter over the decisions of one run.
#[derive(Debug, Default, Clone)]
pub struct DecisionSpace {
    path: Vec<bool>,
    cursor: usize,
}

impl DecisionSpace {
    /// Creates an empty space.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next decision of the current run.
    ///
    /// Replays the recorded path; past its end, records and returns `false`.
    pub fn decide(&mut self) -> bool {
        if self.cursor == self.path.len() {
            self.path.push(false);
        }
        let decision = self.path[self.cursor];
        self.cursor += 1;
        decision
    }

    /// Returns true if the current run has made any decision.
    pub fn has_decided(&self) -> bool {
        self.cursor > 0
    }

    /// Returns true if any recorded decision is `true`.
    pub fn has_decided_affirmatively(&self) -> bool {
        self.path.contains(&true)
    }

    /// Moves to the next combination.
    ///
    /// Flips the last `false` to `true` and drops everything after it.
    /// Returns `false`, with the path cleared, once every combination has
    /// been visited.
    pub fn advance(&mut self) -> bool {
        self.cursor = 0;
        match self.path.iter().rposition(|decision| !decision) {
            Some(last) => {
                self.path.truncate(last + 1);
                self.path[last] = true;
                true
            }
            None => {
                self.path.clear();
                false
            }
        }
    }

    /// Returns the decisions recorded so far.
    pub fn path(&self) -> &[bool] {
        &self.path
    }
}

/// Repeats `run` until every path through `space` has been visited.
///
/// Returns the number of runs. `run` must not hold the lock on `space`
/// while calling into code that decides.
pub fn explore(space: &Arc<Mutex<DecisionSpace>>, mut run: impl FnMut()) -> usize {
    let mut runs = 0;
    loop {
        run();
        runs += 1;
        let mut space = space.lock();
        trace!(run = runs, path = ?space.path(), "decision path explored");
        if !space.advance() {
            return runs;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn fixed_depth_visits_every_combination_once() {
        let space = Arc::new(Mutex::new(DecisionSpace::new()));
        let mut seen = HashSet::new();
        let runs = explore(&space, || {
            let mut space = space.lock();
            let combination: Vec<bool> = (0..3).map(|_| space.decide()).collect();
            assert!(seen.insert(combination));
        });

        assert_eq!(runs, 8);
        assert_eq!(seen.len(), 8);
        assert!(space.lock().path().is_empty());
    }

    #[test]
    fn binary_counter_order() {
        let mut space = DecisionSpace::new();
        let mut order = Vec::new();
        loop {
            order.push((space.decide(), space.decide()));
            if !space.advance() {
                break;
            }
        }
        assert_eq!(
            order,
            vec![(false, false), (false, true), (true, false), (true, true)]
        );
    }

    #[test]
    fn depth_may_depend_on_earlier_decisions() {
        // The second decision is only made when the first is false.
        let space = Arc::new(Mutex::new(DecisionSpace::new()));
        let mut leaves = Vec::new();
        let runs = explore(&space, || {
            let mut space = space.lock();
            let leaf = if space.decide() {
                vec![true]
            } else {
                vec![false, space.decide()]
            };
            leaves.push(leaf);
        });

        assert_eq!(runs, 3);
        assert_eq!(
            leaves,
            vec![vec![false, false], vec![false, true], vec![true]]
        );
    }

    #[test]
    fn no_decisions_means_one_run() {
        let space = Arc::new(Mutex::new(DecisionSpace::new()));
        let runs = explore(&space, || {});
        assert_eq!(runs, 1);
    }

    #[test]
    fn decision_flags() {
        let mut space = DecisionSpace::new();
        assert!(!space.has_decided());
        assert!(!space.decide());
        assert!(space.has_decided());
        assert!(!space.has_decided_affirmatively());

        assert!(space.advance());
        assert!(!space.has_decided());
        assert!(space.has_decided_affirmatively());
        assert!(space.decide());
        assert!(!space.advance());
    }

    #[test]
    fn replay_is_exact() {
        let mut space = DecisionSpace::new();
        space.decide();
        space.decide();
        space.decide();
        assert!(space.advance());
        assert_eq!(space.path(), &[false, false, true]);
        assert_eq!(
            (space.decide(), space.decide(), space.decide()),
            (false, false, true)
        );
        // Decisions past the recorded path extend it.
        assert!(!space.decide());
        assert_eq!(space.path().len(), 4);
    }
}
