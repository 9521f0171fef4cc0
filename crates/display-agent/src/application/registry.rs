//! Per-display window registry.
//!
//! The registry is the single source of truth for "what is showing where".
//! It maps each [`DisplayId`] to at most one [`WindowEntry`], which owns the
//! live surface and remembers the URL it was last told to show.
//!
//! # Invariants
//!
//! - At most one entry per display.
//! - An entry is only inserted after its surface was created *and* navigated,
//!   so `content_url` is always the URL the surface is showing (or loading).
//! - A destroyed surface is never navigated; it is removed and replaced.
//! - Entries are removed only by a generation-matched [`DisplayRegistry::remove`],
//!   so a late close notification for an old surface cannot evict its
//!   replacement.
//!
//! The registry does not send reports or start watchdogs.  It returns an
//! [`OpenOutcome`] and the agent decides what follows.

use std::collections::BTreeMap;
use std::sync::Arc;

use display_core::{DisplayId, DisplayTopology};
use thiserror::Error;
use tracing::{debug, info};

use crate::application::events::{EventSender, SurfaceId, SurfaceKey};
use crate::application::surface::{Surface, SurfaceError, SurfaceEventSink, SurfaceProvider};

/// Error type for [`DisplayRegistry::open_or_update`].
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The command named a display that is not attached.
    #[error("display {0} is not present in the current topology")]
    DisplayNotFound(DisplayId),

    /// A new surface was needed but could not be created.
    ///
    /// `replaced` is set when a destroyed entry was evicted before the
    /// creation attempt; the registry has changed and must be reported.
    #[error("could not create a surface on display {display}")]
    SurfaceCreation {
        display: DisplayId,
        replaced: Option<SurfaceId>,
        #[source]
        source: SurfaceError,
    },
}

/// What [`DisplayRegistry::open_or_update`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenOutcome {
    /// The existing live surface was navigated in place.
    Navigated(SurfaceKey),
    /// A new surface was created.  `replaced` names the destroyed surface it
    /// superseded, if any.
    Created {
        key: SurfaceKey,
        replaced: Option<SurfaceId>,
    },
}

impl OpenOutcome {
    pub fn key(&self) -> SurfaceKey {
        match self {
            OpenOutcome::Navigated(key) => *key,
            OpenOutcome::Created { key, .. } => *key,
        }
    }
}

/// One display's live surface and its content.
pub struct WindowEntry {
    pub display: DisplayId,
    pub surface_id: SurfaceId,
    pub surface: Box<dyn Surface>,
    /// URL the surface was last navigated to.
    pub content_url: String,
    /// Most recent successful watchdog sample, in MiB.
    pub last_memory_sample_mb: Option<f64>,
}

impl WindowEntry {
    pub fn key(&self) -> SurfaceKey {
        SurfaceKey::new(self.display, self.surface_id)
    }
}

impl std::fmt::Debug for WindowEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindowEntry")
            .field("display", &self.display)
            .field("surface_id", &self.surface_id)
            .field("content_url", &self.content_url)
            .field("destroyed", &self.surface.is_destroyed())
            .field("last_memory_sample_mb", &self.last_memory_sample_mb)
            .finish()
    }
}

/// Mapping from display to live surface.
pub struct DisplayRegistry {
    provider: Arc<dyn SurfaceProvider>,
    events: EventSender,
    entries: BTreeMap<DisplayId, WindowEntry>,
    next_surface_id: u64,
}

impl DisplayRegistry {
    pub fn new(provider: Arc<dyn SurfaceProvider>, events: EventSender) -> Self {
        Self {
            provider,
            events,
            entries: BTreeMap::new(),
            next_surface_id: 1,
        }
    }

    /// Shows `url` on `display`, reusing the live surface if there is one.
    ///
    /// The navigation is always performed, even when `url` equals the URL
    /// already shown.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::DisplayNotFound`] if `display` is not in `topology`.
    ///   The registry is untouched.
    /// - [`RegistryError::SurfaceCreation`] if a new surface was needed and
    ///   the provider failed.  No entry is inserted.
    pub fn open_or_update(
        &mut self,
        topology: &DisplayTopology,
        display: DisplayId,
        url: &str,
    ) -> Result<OpenOutcome, RegistryError> {
        let target = topology
            .find(display)
            .ok_or(RegistryError::DisplayNotFound(display))?;

        let mut replaced = None;
        if let Some(entry) = self.entries.get_mut(&display) {
            if !entry.surface.is_destroyed() {
                entry.surface.navigate(url);
                entry.content_url = url.to_string();
                debug!("navigated {} to {url}", entry.key());
                return Ok(OpenOutcome::Navigated(entry.key()));
            }
            replaced = Some(entry.surface_id);
        }
        if let Some(stale) = self.entries.remove(&display) {
            info!("replacing destroyed {}", stale.key());
        }

        let surface_id = self.allocate_surface_id();
        let key = SurfaceKey::new(display, surface_id);
        let sink = SurfaceEventSink::new(key, self.events.clone());
        let mut surface =
            self.provider
                .create(target, sink)
                .map_err(|source| RegistryError::SurfaceCreation {
                    display,
                    replaced,
                    source,
                })?;
        surface.navigate(url);

        self.entries.insert(
            display,
            WindowEntry {
                display,
                surface_id,
                surface,
                content_url: url.to_string(),
                last_memory_sample_mb: None,
            },
        );
        info!("created {key} showing {url}");
        Ok(OpenOutcome::Created { key, replaced })
    }

    /// Removes the entry for `key.display` if it still holds `key.surface`.
    ///
    /// Returns the removed entry, or `None` when the display has no entry or
    /// has since been given a different surface.
    pub fn remove(&mut self, key: SurfaceKey) -> Option<WindowEntry> {
        match self.entries.get(&key.display) {
            Some(entry) if entry.surface_id == key.surface => self.entries.remove(&key.display),
            _ => None,
        }
    }

    pub fn get(&self, display: DisplayId) -> Option<&WindowEntry> {
        self.entries.get(&display)
    }

    pub fn get_mut(&mut self, display: DisplayId) -> Option<&mut WindowEntry> {
        self.entries.get_mut(&display)
    }

    /// Returns the entry only if it still holds the surface named by `key`.
    pub fn entry(&self, key: SurfaceKey) -> Option<&WindowEntry> {
        self.entries
            .get(&key.display)
            .filter(|e| e.surface_id == key.surface)
    }

    /// Mutable variant of [`DisplayRegistry::entry`].
    pub fn entry_mut(&mut self, key: SurfaceKey) -> Option<&mut WindowEntry> {
        self.entries
            .get_mut(&key.display)
            .filter(|e| e.surface_id == key.surface)
    }

    /// Display → URL for every entry, in display order.
    pub fn snapshot(&self) -> BTreeMap<DisplayId, String> {
        self.entries
            .iter()
            .map(|(id, entry)| (*id, entry.content_url.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every entry, releasing all surfaces.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn allocate_surface_id(&mut self) -> SurfaceId {
        let id = SurfaceId(self.next_surface_id);
        self.next_surface_id += 1;
        id
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
