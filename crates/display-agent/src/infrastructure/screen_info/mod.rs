//! Display topology providers.
//!
//! Implementations of [`TopologyProvider`]:
//!
//! | Type                      | Source                                       |
//! |---------------------------|----------------------------------------------|
//! | `RandrTopologyProvider`   | X RandR `XRRGetMonitors` (Linux only)        |
//! | [`StaticTopologyProvider`] | `[[displays]]` entries in the config file   |
//! | [`MockTopology`]          | In-memory, changeable at runtime (tests)     |
//!
//! `main.rs` uses the static provider when the config lists displays, and
//! RandR otherwise.  Fixed lists are useful on machines where the window
//! manager's idea of monitor geometry differs from RandR's, or on platforms
//! without X11.

#[cfg(target_os = "linux")]
pub mod randr;

use std::sync::Mutex;

use display_core::{Display, DisplayTopology};

use crate::application::topology::{TopologyError, TopologyProvider};

#[cfg(target_os = "linux")]
pub use randr::RandrTopologyProvider;

/// Returns a fixed topology.
#[derive(Debug, Clone)]
pub struct StaticTopologyProvider {
    topology: DisplayTopology,
}

impl StaticTopologyProvider {
    pub fn new(displays: impl IntoIterator<Item = Display>) -> Self {
        Self {
            topology: DisplayTopology::new(displays),
        }
    }
}

impl TopologyProvider for StaticTopologyProvider {
    fn current_topology(&self) -> Result<DisplayTopology, TopologyError> {
        Ok(self.topology.clone())
    }
}

/// A topology that tests can change between queries, or make fail.
#[derive(Default)]
pub struct MockTopology {
    current: Mutex<Option<DisplayTopology>>,
    queries: Mutex<usize>,
}

impl MockTopology {
    pub fn new(displays: impl IntoIterator<Item = Display>) -> Self {
        Self {
            current: Mutex::new(Some(DisplayTopology::new(displays))),
            queries: Mutex::new(0),
        }
    }

    /// Replaces the topology returned by later queries.
    pub fn set(&self, displays: impl IntoIterator<Item = Display>) {
        *self.current.lock().unwrap() = Some(DisplayTopology::new(displays));
    }

    /// Makes later queries fail.
    pub fn fail(&self) {
        *self.current.lock().unwrap() = None;
    }

    /// Number of times the topology was queried.
    pub fn query_count(&self) -> usize {
        *self.queries.lock().unwrap()
    }
}

impl TopologyProvider for MockTopology {
    fn current_topology(&self) -> Result<DisplayTopology, TopologyError> {
        *self.queries.lock().unwrap() += 1;
        self.current
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| TopologyError::Enumeration("mock failure".to_string()))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use display_core::{Bounds, DisplayId};

    #[test]
    fn test_static_provider_returns_configured_displays() {
        // Arrange
        let provider = StaticTopologyProvider::new(vec![
            Display::new(1, Bounds::new(0, 0, 1920, 1080)),
            Display::new(2, Bounds::new(1920, 0, 1920, 1080)),
        ]);

        // Act
        let topology = provider.current_topology().expect("topology");

        // Assert
        assert_eq!(topology.len(), 2);
        assert!(topology.contains(DisplayId(2)));
    }

    #[test]
    fn test_mock_topology_reflects_changes_and_counts_queries() {
        let mock = MockTopology::new(vec![Display::new(1, Bounds::new(0, 0, 10, 10))]);
        assert_eq!(mock.current_topology().unwrap().len(), 1);

        mock.set(vec![]);
        assert!(mock.current_topology().unwrap().is_empty());

        mock.fail();
        assert!(mock.current_topology().is_err());
        assert_eq!(mock.query_count(), 3);
    }
}
