//! Display topology port.
//!
//! The agent needs to know which physical displays exist at two moments: when
//! it registers with the control server (every successful connect) and when a
//! show-command names a display.  It asks a [`TopologyProvider`] each time
//! instead of caching, because monitors can be attached or removed while the
//! agent is running.

use display_core::DisplayTopology;
use thiserror::Error;

/// Error type for display enumeration.
#[derive(Debug, Error)]
pub enum TopologyError {
    /// The platform tool or API used to enumerate displays failed.
    #[error("failed to enumerate displays: {0}")]
    Enumeration(String),

    /// Enumeration succeeded but its output could not be understood.
    #[error("could not parse display list: {0}")]
    Parse(String),
}

/// Source of the current display topology.
#[cfg_attr(test, mockall::automock)]
pub trait TopologyProvider: Send + Sync {
    /// Returns a fresh snapshot of the attached displays.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError`] if the displays cannot be enumerated.
    fn current_topology(&self) -> Result<DisplayTopology, TopologyError>;
}
