//! Configuration for remote operations.

use crate::error::{FlowError, FlowResult};
use serde::{Deserialize, Serialize};

/// Scheduling priority of a remote operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Priority {
    /// The caller is waiting on the result. Cancellation reaches the remote call.
    #[default]
    UserInitiated,
    /// The operation should finish regardless of the caller's lifetime.
    ///
    /// Cancellation is accepted and stops emissions, but is never forwarded
    /// to the in-flight remote call.
    Background,
}

impl Priority {
    /// Returns true if consumer cancellation should reach the remote call.
    pub fn forwards_cancellation(&self) -> bool {
        matches!(self, Priority::UserInitiated)
    }
}

/// Configuration passed alongside a remote operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationConfig {
    /// Scheduling priority.
    pub priority: Priority,
    /// Whether a modify batch is all-or-nothing.
    pub atomic: bool,
    /// Maximum number of results a single page operation may return.
    pub results_limit: usize,
}

impl OperationConfig {
    /// Default per-page results limit.
    pub const DEFAULT_RESULTS_LIMIT: usize = 100;

    /// Creates a configuration with default settings.
    pub fn new() -> Self {
        Self {
            priority: Priority::UserInitiated,
            atomic: false,
            results_limit: Self::DEFAULT_RESULTS_LIMIT,
        }
    }

    /// Creates a background-priority configuration.
    pub fn background() -> Self {
        Self::new().with_priority(Priority::Background)
    }

    /// Sets the priority.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Sets whether the batch is atomic.
    pub fn with_atomic(mut self, atomic: bool) -> Self {
        self.atomic = atomic;
        self
    }

    /// Sets the per-page results limit.
    pub fn with_results_limit(mut self, limit: usize) -> Self {
        self.results_limit = limit;
        self
    }

    /// Checks that the configuration can drive an operation.
    pub fn validate(&self) -> FlowResult<()> {
        if self.results_limit == 0 {
            return Err(FlowError::InvalidConfig(
                "results limit must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

impl Default for OperationConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_builder() {
        let config = OperationConfig::new()
            .with_atomic(true)
            .with_results_limit(25)
            .with_priority(Priority::Background);

        assert!(config.atomic);
        assert_eq!(config.results_limit, 25);
        assert_eq!(config.priority, Priority::Background);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn defaults() {
        let config = OperationConfig::default();
        assert!(!config.atomic);
        assert_eq!(config.results_limit, OperationConfig::DEFAULT_RESULTS_LIMIT);
        assert!(config.priority.forwards_cancellation());
        assert!(!OperationConfig::background().priority.forwards_cancellation());
    }

    #[test]
    fn zero_results_limit_is_invalid() {
        let config = OperationConfig::new().with_results_limit(0);
        assert!(matches!(
            config.validate(),
            Err(FlowError::InvalidConfig(_))
        ));
    }
}
