//! Kiosk browser surfaces.
//!
//! Each surface is one Chromium-family browser process started in kiosk
//! mode, positioned and sized to cover exactly one display.  Every display
//! gets its own profile directory so the processes do not merge into one
//! browser instance.
//!
//! ```text
//!   BrowserSurface ──commands──▶ DevTools worker ──WebSocket──▶ browser
//!        │                                                      │
//!        └── stop (oneshot) ──▶ supervisor ◀──── child.wait() ──┘
//! ```
//!
//! The *supervisor* task owns the child process.  If the process exits on
//! its own (the user closed the window, it crashed) the surface is marked
//! destroyed and a close notification is sent.  Dropping the surface stops
//! the supervisor, which kills the process without notifying anyone.
//!
//! Content operations go through the DevTools worker (see
//! [`super::devtools`]); memory is the private memory of the browser's
//! renderer processes.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use display_core::{Bounds, Display};
use futures_util::future::{self, FutureExt};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::devtools::{self, DevToolsClient, DevToolsCommand};
use super::proc_memory;
use crate::application::surface::{
    MemoryQuery, Surface, SurfaceError, SurfaceEventSink, SurfaceProvider,
};

/// Default browser executable.
pub const DEFAULT_BROWSER: &str = "chromium";

/// How [`KioskBrowserProvider`] launches browsers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserConfig {
    /// Executable name or path.
    pub program: String,
    /// Extra command-line flags appended after the kiosk flags.
    pub extra_args: Vec<String>,
    /// Parent directory of the per-display profile directories.
    pub profile_root: PathBuf,
}

impl BrowserConfig {
    pub fn profile_dir(&self, display: &Display) -> PathBuf {
        self.profile_root.join(format!("display-{}", display.id))
    }
}

/// Command-line flags that make a browser window cover `bounds` with no
/// decorations.
pub fn kiosk_args(bounds: &Bounds, profile_dir: &Path) -> Vec<String> {
    vec![
        "--kiosk".to_string(),
        "--no-first-run".to_string(),
        "--no-default-browser-check".to_string(),
        "--noerrdialogs".to_string(),
        "--disable-session-crashed-bubble".to_string(),
        "--disable-infobars".to_string(),
        format!("--user-data-dir={}", profile_dir.display()),
        format!("--window-position={},{}", bounds.x, bounds.y),
        format!("--window-size={},{}", bounds.width, bounds.height),
        "--remote-debugging-port=0".to_string(),
    ]
}

/// [`SurfaceProvider`] that starts one kiosk browser per display.
#[derive(Debug, Clone)]
pub struct KioskBrowserProvider {
    config: BrowserConfig,
}

impl KioskBrowserProvider {
    pub fn new(config: BrowserConfig) -> Self {
        Self { config }
    }

    fn spawn_child(&self, display: &Display, profile_dir: &Path) -> Result<Child, SurfaceError> {
        let create_error = |reason: String| SurfaceError::Create {
            display: display.id,
            reason,
        };

        std::fs::create_dir_all(profile_dir)
            .map_err(|e| create_error(format!("profile {}: {e}", profile_dir.display())))?;
        // A port file left by a previous run would point at a dead browser.
        let _ = std::fs::remove_file(profile_dir.join("DevToolsActivePort"));

        Command::new(&self.config.program)
            .args(kiosk_args(&display.bounds, profile_dir))
            .args(&self.config.extra_args)
            .arg("about:blank")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| create_error(format!("{}: {e}", self.config.program)))
    }
}

impl SurfaceProvider for KioskBrowserProvider {
    fn create(
        &self,
        display: &Display,
        events: SurfaceEventSink,
    ) -> Result<Box<dyn Surface>, SurfaceError> {
        let profile_dir = self.config.profile_dir(display);
        let child = self.spawn_child(display, &profile_dir)?;
        let pid = child.id();
        info!("started {} (pid {pid:?}) for {}", self.config.program, events.key());

        let destroyed = Arc::new(AtomicBool::new(false));
        let (stop_tx, stop_rx) = oneshot::channel();
        tokio::spawn(supervise(child, stop_rx, Arc::clone(&destroyed), events.clone()));

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        tokio::spawn(devtools::run_worker(
            DevToolsClient::new(&profile_dir),
            commands_rx,
            events,
        ));

        Ok(Box::new(BrowserSurface {
            pid,
            destroyed,
            commands: commands_tx,
            _stop: stop_tx,
        }))
    }
}

/// Waits for the browser to exit, or kills it when the surface is dropped.
async fn supervise(
    mut child: Child,
    stop: oneshot::Receiver<()>,
    destroyed: Arc<AtomicBool>,
    events: SurfaceEventSink,
) {
    tokio::select! {
        status = child.wait() => {
            destroyed.store(true, Ordering::SeqCst);
            match status {
                Ok(status) => info!("browser for {} exited ({status})", events.key()),
                Err(e) => warn!("lost track of browser for {}: {e}", events.key()),
            }
            events.closed();
        }
        // Resolves with an error when the surface drops its sender.
        _ = stop => {
            destroyed.store(true, Ordering::SeqCst);
            if let Err(e) = child.kill().await {
                warn!("failed to stop browser for {}: {e}", events.key());
            }
            debug!("browser for {} stopped", events.key());
        }
    }
}

/// A kiosk browser window on one display.
pub struct BrowserSurface {
    pid: Option<u32>,
    destroyed: Arc<AtomicBool>,
    commands: mpsc::UnboundedSender<DevToolsCommand>,
    // Dropping this stops the supervisor and kills the browser.
    _stop: oneshot::Sender<()>,
}

impl BrowserSurface {
    fn queue(&self, command: DevToolsCommand) -> Result<(), SurfaceError> {
        if self.is_destroyed() {
            return Err(SurfaceError::Destroyed);
        }
        self.commands
            .send(command)
            .map_err(|_| SurfaceError::Destroyed)
    }
}

impl Surface for BrowserSurface {
    fn navigate(&mut self, url: &str) {
        if let Err(e) = self.queue(DevToolsCommand::Navigate(url.to_string())) {
            warn!("cannot navigate to {url}: {e}");
        }
    }

    fn reload_bypassing_cache(&mut self) {
        if let Err(e) = self.queue(DevToolsCommand::Reload { ignore_cache: true }) {
            warn!("cannot reload: {e}");
        }
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    fn memory_usage(&self) -> MemoryQuery {
        match self.pid {
            Some(pid) if !self.is_destroyed() => proc_memory::content_usage(pid).boxed(),
            _ => future::ready(Err(SurfaceError::Destroyed)).boxed(),
        }
    }

    fn execute_script(&mut self, script: &str) -> Result<(), SurfaceError> {
        self.queue(DevToolsCommand::Evaluate(script.to_string()))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::events::{event_channel, AgentEvent, SurfaceId, SurfaceKey};
    use display_core::DisplayId;

    #[test]
    fn test_kiosk_args_cover_display_bounds() {
        // Arrange
        let bounds = Bounds::new(-1080, 200, 1080, 1920);

        // Act
        let args = kiosk_args(&bounds, Path::new("/tmp/p"));

        // Assert
        assert!(args.contains(&"--kiosk".to_string()));
        assert!(args.contains(&"--window-position=-1080,200".to_string()));
        assert!(args.contains(&"--window-size=1080,1920".to_string()));
        assert!(args.contains(&"--user-data-dir=/tmp/p".to_string()));
    }

    #[test]
    fn test_profile_dir_is_per_display() {
        let config = BrowserConfig {
            program: DEFAULT_BROWSER.to_string(),
            extra_args: vec![],
            profile_root: PathBuf::from("/var/lib/display-agent/profiles"),
        };
        let a = config.profile_dir(&Display::new(1, Bounds::new(0, 0, 1, 1)));
        let b = config.profile_dir(&Display::new(2, Bounds::new(0, 0, 1, 1)));
        assert_ne!(a, b);
        assert!(a.ends_with("display-1"));
    }

    #[tokio::test]
    async fn test_missing_browser_executable_is_a_create_error() {
        // Arrange
        let root = std::env::temp_dir().join(format!("display-agent-test-{}", std::process::id()));
        let provider = KioskBrowserProvider::new(BrowserConfig {
            program: "/nonexistent/display-agent-browser".to_string(),
            extra_args: vec![],
            profile_root: root.clone(),
        });
        let (tx, _rx) = event_channel();
        let sink = SurfaceEventSink::new(SurfaceKey::new(DisplayId(1), SurfaceId(1)), tx);

        // Act
        let result = provider.create(&Display::new(1, Bounds::new(0, 0, 800, 600)), sink);

        // Assert
        assert!(matches!(result, Err(SurfaceError::Create { display: DisplayId(1), .. })));
        let _ = std::fs::remove_dir_all(root);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_exit_marks_surface_destroyed_and_notifies() {
        // Arrange: `true` ignores its arguments and exits immediately.
        let root = std::env::temp_dir().join(format!("display-agent-exit-{}", std::process::id()));
        let provider = KioskBrowserProvider::new(BrowserConfig {
            program: "true".to_string(),
            extra_args: vec![],
            profile_root: root.clone(),
        });
        let (tx, mut rx) = event_channel();
        let key = SurfaceKey::new(DisplayId(4), SurfaceId(7));

        // Act
        let surface = provider
            .create(&Display::new(4, Bounds::new(0, 0, 800, 600)), SurfaceEventSink::new(key, tx))
            .expect("create");

        // Assert
        assert!(matches!(rx.recv().await, Some(AgentEvent::SurfaceClosed(k)) if k == key));
        assert!(surface.is_destroyed());
        let _ = std::fs::remove_dir_all(root);
    }
}
