//! Builds full-state `OPEN_SCREEN_RETURN` reports.

use display_core::protocol::messages::StateReport;
use display_core::OutboundMessage;

use crate::application::registry::DisplayRegistry;

/// Turns the registry into the message the control server expects after
/// every mutation.
#[derive(Debug, Default)]
pub struct StateReporter {
    reports_built: u64,
}

impl StateReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every display → URL pair.  Never a delta.
    pub fn build(&mut self, registry: &DisplayRegistry) -> OutboundMessage {
        self.reports_built += 1;
        OutboundMessage::OpenScreenReturn(StateReport {
            remote_display_url_map: registry.snapshot(),
        })
    }

    pub fn reports_built(&self) -> u64 {
        self.reports_built
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::application::events::event_channel;
    use crate::infrastructure::surface::mock::FakeSurfaceProvider;
    use display_core::{Bounds, Display, DisplayId, DisplayTopology};

    #[test]
    fn test_empty_registry_yields_empty_map() {
        let (tx, _rx) = event_channel();
        let registry = DisplayRegistry::new(Arc::new(FakeSurfaceProvider::new()), tx);
        let mut reporter = StateReporter::new();

        let msg = reporter.build(&registry);

        assert_eq!(msg, OutboundMessage::OpenScreenReturn(StateReport::default()));
        assert_eq!(reporter.reports_built(), 1);
    }

    #[test]
    fn test_report_contains_every_entry() {
        // Arrange
        let (tx, _rx) = event_channel();
        let mut registry = DisplayRegistry::new(Arc::new(FakeSurfaceProvider::new()), tx);
        let topology = DisplayTopology::new(vec![
            Display::new(1, Bounds::new(0, 0, 800, 600)),
            Display::new(2, Bounds::new(800, 0, 800, 600)),
        ]);
        registry.open_or_update(&topology, DisplayId(1), "https://a").unwrap();
        registry.open_or_update(&topology, DisplayId(2), "https://b").unwrap();

        // Act
        let msg = StateReporter::new().build(&registry);

        // Assert
        let OutboundMessage::OpenScreenReturn(report) = msg else {
            panic!("expected OPEN_SCREEN_RETURN");
        };
        assert_eq!(report.remote_display_url_map.len(), 2);
        assert_eq!(report.remote_display_url_map[&DisplayId(2)], "https://b");
    }
}
