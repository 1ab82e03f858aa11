//! CLI command implementations.

pub mod explore;
pub mod query;

use recflow_core::Emission;
use serde::Serialize;
use std::fmt::Display;

/// One emission, flattened for output.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct TraceEntry {
    /// Emission kind.
    pub event: &'static str,
    /// Item key, for progress and item errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Progress, item summary or error message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl TraceEntry {
    /// Flattens an emission, summarizing items with `describe`.
    pub fn from_emission<K: Display, T>(
        emission: &Emission<K, T>,
        describe: impl Fn(&T) -> String,
    ) -> Self {
        let (event, key, detail) = match emission {
            Emission::ProgressUpdate(key, progress) => {
                ("progress", Some(key.to_string()), Some(progress.to_string()))
            }
            Emission::ItemResult(item) => ("item", None, Some(describe(item))),
            Emission::ItemError(key, error) => {
                ("item-error", Some(key.to_string()), Some(error.to_string()))
            }
            Emission::BatchComplete => ("complete", None, None),
            Emission::BatchFailed(error) => ("failed", None, Some(error.to_string())),
        };
        Self { event, key, detail }
    }
}

impl std::fmt::Display for TraceEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:<10}", self.event)?;
        if let Some(key) = &self.key {
            write!(f, " {key}")?;
        }
        if let Some(detail) = &self.detail {
            write!(f, " {detail}")?;
        }
        Ok(())
    }
}
