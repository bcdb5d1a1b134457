use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::FetchConfig;

/// Criterion for deciding that a navigation has settled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadStrategy {
    /// Wait for the load event and lifecycle completion (near network idle)
    DynamicWait,
    /// Wait only for initial DOM construction
    StaticWait,
}

impl LoadStrategy {
    /// Strategy to retry with after this one fails. `StaticWait` is terminal.
    #[must_use]
    pub fn next(self) -> Option<Self> {
        match self {
            LoadStrategy::DynamicWait => Some(LoadStrategy::StaticWait),
            LoadStrategy::StaticWait => None,
        }
    }

    /// Navigation bound for this strategy on the scraping path
    #[must_use]
    pub fn timeout(self, config: &FetchConfig) -> Duration {
        match self {
            LoadStrategy::DynamicWait => Duration::from_millis(config.dynamic_timeout_ms),
            LoadStrategy::StaticWait => Duration::from_millis(config.static_timeout_ms),
        }
    }
}

impl fmt::Display for LoadStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LoadStrategy::DynamicWait => "dynamic",
            LoadStrategy::StaticWait => "static",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_runs_once() {
        assert_eq!(LoadStrategy::DynamicWait.next(), Some(LoadStrategy::StaticWait));
        assert_eq!(LoadStrategy::StaticWait.next(), None);
    }

    #[test]
    fn static_wait_is_shorter_by_default() {
        let config = FetchConfig::default();
        assert!(
            LoadStrategy::StaticWait.timeout(&config) < LoadStrategy::DynamicWait.timeout(&config)
        );
    }
}
