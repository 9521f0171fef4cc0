//! In-memory surfaces for testing.
//!
//! `FakeSurfaceProvider` creates [`FakeSurface`]s that record every call
//! instead of opening windows.  For each surface it creates, the provider
//! keeps a [`FakeSurfaceHandle`] that shares the surface's state, so a test
//! can both inspect what the agent did (navigations, reloads, injected
//! scripts) and play the part of the OS (close the window, make the renderer
//! hang, change the reported memory usage).
//!
//! # Usage in tests
//!
//! ```ignore
//! let provider = Arc::new(FakeSurfaceProvider::new());
//! // ... agent opens display 1 ...
//! let handle = provider.handle(0).unwrap();
//! assert_eq!(handle.navigations(), vec!["https://a".to_string()]);
//! handle.set_memory_mb(512);
//! handle.close();
//! ```

use std::sync::{Arc, Mutex};

use display_core::{Display, DisplayId};
use futures_util::future::{self, FutureExt};

use crate::application::events::SurfaceKey;
use crate::application::surface::{
    MemoryQuery, MemoryUsage, Surface, SurfaceError, SurfaceEventSink, SurfaceProvider,
};

#[derive(Debug, Default)]
struct FakeState {
    navigations: Vec<String>,
    reloads: usize,
    scripts: Vec<String>,
    memory_kb: u64,
    memory_error: Option<String>,
    destroyed: bool,
}

#[derive(Default)]
struct ProviderState {
    created: Vec<FakeSurfaceHandle>,
    fail_next: usize,
}

/// A [`SurfaceProvider`] that records instead of rendering.
#[derive(Default)]
pub struct FakeSurfaceProvider {
    state: Mutex<ProviderState>,
}

impl FakeSurfaceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` calls to `create` fail.
    pub fn fail_next_creations(&self, n: usize) {
        self.state.lock().unwrap().fail_next += n;
    }

    /// Number of surfaces successfully created.
    pub fn created_count(&self) -> usize {
        self.state.lock().unwrap().created.len()
    }

    /// Handle of the `index`-th created surface.
    pub fn handle(&self, index: usize) -> Option<FakeSurfaceHandle> {
        self.state.lock().unwrap().created.get(index).cloned()
    }

    /// Handle of the most recently created surface on `display`.
    pub fn latest_for(&self, display: DisplayId) -> Option<FakeSurfaceHandle> {
        self.state
            .lock()
            .unwrap()
            .created
            .iter()
            .rev()
            .find(|h| h.display() == display)
            .cloned()
    }
}

impl SurfaceProvider for FakeSurfaceProvider {
    fn create(
        &self,
        display: &Display,
        events: SurfaceEventSink,
    ) -> Result<Box<dyn Surface>, SurfaceError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(SurfaceError::Create {
                display: display.id,
                reason: "fake creation failure".to_string(),
            });
        }

        let shared = Arc::new(Mutex::new(FakeState::default()));
        state.created.push(FakeSurfaceHandle {
            display: display.id,
            state: Arc::clone(&shared),
            sink: events,
        });
        Ok(Box::new(FakeSurface { state: shared }))
    }
}

/// Test-side view of a [`FakeSurface`].
#[derive(Clone)]
pub struct FakeSurfaceHandle {
    display: DisplayId,
    state: Arc<Mutex<FakeState>>,
    sink: SurfaceEventSink,
}

impl FakeSurfaceHandle {
    pub fn display(&self) -> DisplayId {
        self.display
    }

    pub fn key(&self) -> SurfaceKey {
        self.sink.key()
    }

    pub fn navigations(&self) -> Vec<String> {
        self.state.lock().unwrap().navigations.clone()
    }

    pub fn reloads(&self) -> usize {
        self.state.lock().unwrap().reloads
    }

    pub fn scripts(&self) -> Vec<String> {
        self.state.lock().unwrap().scripts.clone()
    }

    pub fn is_destroyed(&self) -> bool {
        self.state.lock().unwrap().destroyed
    }

    /// Sets the value reported by subsequent memory queries.
    pub fn set_memory_mb(&self, mb: u64) {
        let mut state = self.state.lock().unwrap();
        state.memory_kb = mb * 1024;
        state.memory_error = None;
    }

    /// Makes subsequent memory queries fail.
    pub fn fail_memory_query(&self, reason: &str) {
        self.state.lock().unwrap().memory_error = Some(reason.to_string());
    }

    /// Simulates the user closing the window.
    pub fn close(&self) {
        self.state.lock().unwrap().destroyed = true;
        self.sink.closed();
    }

    /// Marks the surface destroyed without a close notification.
    pub fn destroy_silently(&self) {
        self.state.lock().unwrap().destroyed = true;
    }

    /// Simulates the renderer hanging.
    pub fn hang(&self) {
        self.sink.unresponsive();
    }

    /// Simulates the renderer recovering.
    pub fn recover(&self) {
        self.sink.responsive();
    }
}

/// A [`Surface`] whose state lives behind a shared mutex.
pub struct FakeSurface {
    state: Arc<Mutex<FakeState>>,
}

impl Surface for FakeSurface {
    fn navigate(&mut self, url: &str) {
        self.state.lock().unwrap().navigations.push(url.to_string());
    }

    fn reload_bypassing_cache(&mut self) {
        self.state.lock().unwrap().reloads += 1;
    }

    fn is_destroyed(&self) -> bool {
        self.state.lock().unwrap().destroyed
    }

    fn memory_usage(&self) -> MemoryQuery {
        let state = self.state.lock().unwrap();
        let result = if state.destroyed {
            Err(SurfaceError::Destroyed)
        } else if let Some(reason) = &state.memory_error {
            Err(SurfaceError::MemoryQuery(reason.clone()))
        } else {
            Ok(MemoryUsage::from_kb(state.memory_kb))
        };
        future::ready(result).boxed()
    }

    fn execute_script(&mut self, script: &str) -> Result<(), SurfaceError> {
        let mut state = self.state.lock().unwrap();
        if state.destroyed {
            return Err(SurfaceError::Destroyed);
        }
        state.scripts.push(script.to_string());
        Ok(())
    }
}
