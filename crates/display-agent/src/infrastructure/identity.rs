//! Device identity retrieval.
//!
//! The control server keys its device list on the identifier sent in
//! `REGISTER`, so the id must survive reboots and reinstalls of the agent.
//! Sources, in order:
//!
//! 1. `[device] id` in the config file.
//! 2. The OS machine id (`/etc/machine-id`, then `/var/lib/dbus/machine-id`).
//! 3. A random UUID generated on first run and stored as `device-id` in the
//!    agent's config directory.
//!
//! The name is `[device] name`, else the host name, else `display-agent`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use display_core::DeviceIdentity;
use sysinfo::System;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

const MACHINE_ID_PATHS: &[&str] = &["/etc/machine-id", "/var/lib/dbus/machine-id"];
const DEVICE_ID_FILE: &str = "device-id";
const FALLBACK_NAME: &str = "display-agent";

/// Error type for identity retrieval.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// The persisted fallback id could not be read or written.
    #[error("I/O error on device id file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Source of the [`DeviceIdentity`] sent in `REGISTER`.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn identity(&self) -> Result<DeviceIdentity, IdentityError>;
}

/// [`IdentityProvider`] for the local host.
#[derive(Debug, Clone, Default)]
pub struct HostIdentityProvider {
    id_override: Option<String>,
    name_override: Option<String>,
    /// Directory holding the persisted fallback id.  `None` means a fresh
    /// id every run.
    state_dir: Option<PathBuf>,
    machine_id_paths: Vec<PathBuf>,
}

impl HostIdentityProvider {
    pub fn new(
        id_override: Option<String>,
        name_override: Option<String>,
        state_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            id_override,
            name_override,
            state_dir,
            machine_id_paths: MACHINE_ID_PATHS.iter().map(PathBuf::from).collect(),
        }
    }

    /// Replaces the machine-id search paths.
    pub fn with_machine_id_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.machine_id_paths = paths;
        self
    }

    async fn resolve_id(&self) -> Result<String, IdentityError> {
        if let Some(id) = non_empty(self.id_override.as_deref()) {
            return Ok(id.to_string());
        }

        for path in &self.machine_id_paths {
            if let Ok(contents) = tokio::fs::read_to_string(path).await {
                if let Some(id) = non_empty(Some(contents.trim())) {
                    return Ok(id.to_string());
                }
            }
        }

        match &self.state_dir {
            Some(dir) => load_or_create_device_id(dir).await,
            None => {
                warn!("no machine id and no state directory; using a one-off device id");
                Ok(Uuid::new_v4().to_string())
            }
        }
    }

    fn resolve_name(&self) -> String {
        non_empty(self.name_override.as_deref())
            .map(str::to_string)
            .or_else(|| System::host_name().filter(|n| !n.trim().is_empty()))
            .unwrap_or_else(|| FALLBACK_NAME.to_string())
    }
}

#[async_trait]
impl IdentityProvider for HostIdentityProvider {
    async fn identity(&self) -> Result<DeviceIdentity, IdentityError> {
        let identity = DeviceIdentity::new(self.resolve_id().await?, self.resolve_name());
        info!("device identity: {} ({})", identity.name, identity.id);
        Ok(identity)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

async fn load_or_create_device_id(dir: &Path) -> Result<String, IdentityError> {
    let path = dir.join(DEVICE_ID_FILE);
    let io_error = |source| IdentityError::Io {
        path: path.clone(),
        source,
    };

    match tokio::fs::read_to_string(&path).await {
        Ok(contents) if !contents.trim().is_empty() => return Ok(contents.trim().to_string()),
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(io_error(e)),
    }

    let id = Uuid::new_v4().to_string();
    tokio::fs::create_dir_all(dir).await.map_err(io_error)?;
    tokio::fs::write(&path, &id).await.map_err(io_error)?;
    info!("generated device id {id} at {}", path.display());
    Ok(id)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
