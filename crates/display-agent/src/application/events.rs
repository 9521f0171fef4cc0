//! The closed set of events consumed by the agent's event loop.
//!
//! Everything that can happen to the agent (a socket opening or closing, a
//! frame arriving, a timer firing, a window being closed by the user, a
//! memory query completing) is turned into one [`AgentEvent`] and queued on
//! a single channel.  The agent drains that channel one event at a time, so
//! all state mutation happens on one logical thread without locks.
//!
//! Background tasks (the connection link, reconnect timers, watchdog
//! samplers, memory queries, browser process supervisors) only ever hold an
//! [`EventSender`]; they never touch agent state directly.

use std::fmt;

use display_core::DisplayId;
use tokio::sync::mpsc;

use crate::application::surface::{MemoryUsage, SurfaceError};

/// Producer half of the agent event channel.
pub type EventSender = mpsc::UnboundedSender<AgentEvent>;

/// Consumer half of the agent event channel; owned by the agent.
pub type EventReceiver = mpsc::UnboundedReceiver<AgentEvent>;

/// Creates a new agent event channel.
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Identifies one connection attempt to the control server.
///
/// Every call to `ConnectionManager::connect` allocates a fresh id, so
/// events from a link that has since been replaced can be recognised and
/// dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkId(pub u64);

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link#{}", self.0)
    }
}

/// Generation number of a window surface.
///
/// A display that loses its surface and receives a new one gets a new
/// `SurfaceId`, which keeps late events from the old surface (a closed
/// notification, a memory sample) from being applied to the new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceId(pub u64);

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "surface#{}", self.0)
    }
}

/// A specific surface on a specific display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceKey {
    pub display: DisplayId,
    pub surface: SurfaceId,
}

impl SurfaceKey {
    pub fn new(display: DisplayId, surface: SurfaceId) -> Self {
        Self { display, surface }
    }
}

impl fmt::Display for SurfaceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "display {} ({})", self.display, self.surface)
    }
}

/// Every input the agent reacts to.
#[derive(Debug)]
pub enum AgentEvent {
    /// A link finished its handshake; `outbound` queues text frames on it.
    Connected {
        link: LinkId,
        outbound: mpsc::UnboundedSender<String>,
    },
    /// A link failed to connect, errored, or was closed by the server.
    Disconnected { link: LinkId, reason: String },
    /// A text frame arrived on a link.
    FrameReceived { link: LinkId, frame: String },
    /// The reconnect delay after a disconnect has elapsed.
    ReconnectDue,
    /// A surface was closed by the user or the OS.
    SurfaceClosed(SurfaceKey),
    /// A watchdog sampler ticked for this surface.
    SampleDue(SurfaceKey),
    /// A memory query issued on a sampler tick completed.
    MemorySample {
        key: SurfaceKey,
        result: Result<MemoryUsage, SurfaceError>,
    },
    /// The surface's renderer stopped responding.
    Unresponsive(SurfaceKey),
    /// The surface's renderer is responding again.
    Responsive(SurfaceKey),
    /// Stop the event loop and release all surfaces.
    Shutdown,
}
