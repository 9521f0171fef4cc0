//! Device identity.

use serde::{Deserialize, Serialize};

/// Identity the agent registers with; retrieved once at startup and never
/// changed for the life of the process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    /// Stable hardware-derived identifier.
    pub id: String,
    /// Human-readable label shown in the control server's device list.
    pub name: String,
}

impl DeviceIdentity {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}
