//! Window surface port.
//!
//! A *surface* is an undecorated, full-screen content window bound to one
//! physical display.  The application layer only sees surfaces through the
//! [`Surface`] and [`SurfaceProvider`] traits; the concrete implementations
//! (a kiosk browser process per display, or an in-memory fake for tests) live
//! in the infrastructure layer.
//!
//! Surfaces report lifecycle changes that happen outside the agent's control
//! (the window was closed, the renderer hung or recovered) through the
//! [`SurfaceEventSink`] they are given at creation time.  The sink turns them
//! into [`AgentEvent`]s tagged with the surface's [`SurfaceKey`].

use display_core::{Display, DisplayId};
use futures_util::future::BoxFuture;
use thiserror::Error;

use crate::application::events::{AgentEvent, EventSender, SurfaceKey};

/// Error type for surface operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SurfaceError {
    /// The provider could not create a surface on the display.
    #[error("failed to create surface on display {display}: {reason}")]
    Create { display: DisplayId, reason: String },

    /// The surface no longer exists.
    #[error("surface has been destroyed")]
    Destroyed,

    /// The memory usage query failed.
    #[error("memory usage query failed: {0}")]
    MemoryQuery(String),

    /// The surface implementation cannot perform the operation.
    #[error("{0} is not supported by this surface")]
    Unsupported(&'static str),
}

/// Private (non-shared) memory held by a surface's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryUsage {
    /// Private memory in kibibytes.
    pub private_kb: u64,
}

impl MemoryUsage {
    pub fn from_kb(private_kb: u64) -> Self {
        Self { private_kb }
    }

    /// Convenience constructor for tests and fakes.
    pub fn from_mb(mb: u64) -> Self {
        Self {
            private_kb: mb.saturating_mul(1024),
        }
    }

    /// Private memory in mebibytes.
    pub fn megabytes(&self) -> f64 {
        self.private_kb as f64 / 1024.0
    }
}

/// Pending memory usage query.
///
/// The future is `'static` so the agent can hand it to a background task
/// without keeping the surface borrowed.
pub type MemoryQuery = BoxFuture<'static, Result<MemoryUsage, SurfaceError>>;

/// A live full-screen content window.
///
/// Surfaces are exclusively owned by the display registry.
pub trait Surface: Send {
    /// Loads `url`, replacing whatever the surface currently shows.
    ///
    /// Always performs the navigation, even when `url` is already shown.
    fn navigate(&mut self, url: &str);

    /// Reloads the current content, bypassing any HTTP cache.
    fn reload_bypassing_cache(&mut self);

    /// Returns `true` once the surface can no longer show content.
    fn is_destroyed(&self) -> bool;

    /// Starts an asynchronous private-memory query.
    fn memory_usage(&self) -> MemoryQuery;

    /// Runs a script in the context of the current content.
    ///
    /// # Errors
    ///
    /// Returns [`SurfaceError::Unsupported`] when the surface has no script
    /// channel, or [`SurfaceError::Destroyed`] when it is gone.
    fn execute_script(&mut self, script: &str) -> Result<(), SurfaceError>;
}

/// Creates surfaces positioned on physical displays.
pub trait SurfaceProvider: Send + Sync {
    /// Creates a borderless full-screen surface covering `display`'s bounds.
    ///
    /// The surface shows nothing until it is navigated.
    ///
    /// # Errors
    ///
    /// Returns [`SurfaceError::Create`] if the window cannot be created.
    fn create(
        &self,
        display: &Display,
        events: SurfaceEventSink,
    ) -> Result<Box<dyn Surface>, SurfaceError>;
}

/// Channel through which a surface reports lifecycle changes.
#[derive(Debug, Clone)]
pub struct SurfaceEventSink {
    key: SurfaceKey,
    events: EventSender,
}

impl SurfaceEventSink {
    pub fn new(key: SurfaceKey, events: EventSender) -> Self {
        Self { key, events }
    }

    pub fn key(&self) -> SurfaceKey {
        self.key
    }

    /// The surface was closed by the user or the OS.
    pub fn closed(&self) {
        self.emit(AgentEvent::SurfaceClosed(self.key));
    }

    /// The surface's renderer stopped responding.
    pub fn unresponsive(&self) {
        self.emit(AgentEvent::Unresponsive(self.key));
    }

    /// The surface's renderer is responding again.
    pub fn responsive(&self) {
        self.emit(AgentEvent::Responsive(self.key));
    }

    // A send error means the agent loop has exited; there is nobody left to tell.
    fn emit(&self, event: AgentEvent) {
        let _ = self.events.send(event);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::events::{event_channel, SurfaceId};

    #[test]
    fn test_memory_usage_megabytes_converts_from_kib() {
        assert_eq!(MemoryUsage::from_kb(512 * 1024).megabytes(), 512.0);
        assert_eq!(MemoryUsage::from_kb(1536).megabytes(), 1.5);
    }

    #[test]
    fn test_memory_usage_from_mb_round_trips_through_megabytes() {
        assert_eq!(MemoryUsage::from_mb(400).megabytes(), 400.0);
    }

    #[test]
    fn test_event_sink_tags_events_with_surface_key() {
        // Arrange
        let (tx, mut rx) = event_channel();
        let key = SurfaceKey::new(DisplayId(3), SurfaceId(9));
        let sink = SurfaceEventSink::new(key, tx);

        // Act
        sink.unresponsive();
        sink.responsive();
        sink.closed();

        // Assert
        assert!(matches!(rx.try_recv(), Ok(AgentEvent::Unresponsive(k)) if k == key));
        assert!(matches!(rx.try_recv(), Ok(AgentEvent::Responsive(k)) if k == key));
        assert!(matches!(rx.try_recv(), Ok(AgentEvent::SurfaceClosed(k)) if k == key));
    }

    #[test]
    fn test_event_sink_ignores_closed_agent_channel() {
        let (tx, rx) = event_channel();
        drop(rx);
        let sink = SurfaceEventSink::new(SurfaceKey::new(DisplayId(1), SurfaceId(1)), tx);

        // Must not panic.
        sink.closed();
    }
}
