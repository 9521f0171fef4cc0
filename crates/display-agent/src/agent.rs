//! The agent aggregate and its event loop.
//!
//! # How the pieces fit (for beginners)
//!
//! ```text
//!            ┌──────────────── AgentEvent channel ◀─────────────────┐
//!            ▼                                                       │
//!   Agent::handle_event ──▶ ConnectionManager  (link task) ──────────┤
//!            │          ──▶ dispatch_frame ──▶ DisplayRegistry       │
//!            │          ──▶ ResourceWatchdog   (sampler tasks) ──────┤
//!            │          ──▶ StateReporter ──▶ ConnectionManager::send│
//!            └──────────────────────────────── (surface sinks) ──────┘
//! ```
//!
//! The [`Agent`] owns every piece of mutable state: the connection session,
//! the display registry, the watchdog's samplers and the reporter.  Nothing
//! else can reach them.  Background tasks talk to the agent only by posting
//! [`AgentEvent`]s, and [`Agent::handle_event`] processes one event at a time
//! without awaiting, so there are no locks and no interleaving inside a
//! handler.
//!
//! Every registry mutation (a surface created, navigated in place, or
//! removed) is followed by exactly one full-state `OPEN_SCREEN_RETURN`.  A
//! watchdog reload is not a mutation and is not reported.

use std::sync::Arc;
use std::time::Duration;

use display_core::protocol::messages::{LoginWebCommand, OpenScreenCommand, RegisterMessage};
use display_core::{DeviceIdentity, DisplayTopology, OutboundMessage};
use tokio::time;
use tracing::{debug, error, info, warn};

use crate::application::automation::{ContentAutomation, Credentials};
use crate::application::dispatcher::{dispatch_frame, CommandHandler};
use crate::application::events::{event_channel, AgentEvent, EventReceiver, EventSender, SurfaceKey};
use crate::application::registry::{DisplayRegistry, OpenOutcome, RegistryError};
use crate::application::reporter::StateReporter;
use crate::application::surface::SurfaceProvider;
use crate::application::topology::TopologyProvider;
use crate::application::watchdog::{ResourceWatchdog, TickOutcome, WatchdogConfig};
use crate::infrastructure::network::{ConnectionConfig, ConnectionError, ConnectionManager, Connector};

/// Whether the event loop should keep going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Tunables for an [`Agent`].
#[derive(Debug, Clone, Default)]
pub struct AgentSettings {
    pub connection: ConnectionConfig,
    pub watchdog: WatchdogConfig,
}

/// The adapters an [`Agent`] drives.
pub struct Collaborators {
    pub connector: Arc<dyn Connector>,
    pub surfaces: Arc<dyn SurfaceProvider>,
    pub topology: Arc<dyn TopologyProvider>,
    pub automation: Arc<dyn ContentAutomation>,
}

/// The display agent.
pub struct Agent {
    identity: DeviceIdentity,
    connection: ConnectionManager,
    registry: DisplayRegistry,
    watchdog: ResourceWatchdog,
    reporter: StateReporter,
    topology: Arc<dyn TopologyProvider>,
    automation: Arc<dyn ContentAutomation>,
    events_tx: EventSender,
    events_rx: EventReceiver,
}

impl Agent {
    pub fn new(identity: DeviceIdentity, settings: AgentSettings, collaborators: Collaborators) -> Self {
        let (events_tx, events_rx) = event_channel();
        Self {
            identity,
            connection: ConnectionManager::new(
                settings.connection,
                collaborators.connector,
                events_tx.clone(),
            ),
            registry: DisplayRegistry::new(collaborators.surfaces, events_tx.clone()),
            watchdog: ResourceWatchdog::new(settings.watchdog, events_tx.clone()),
            reporter: StateReporter::new(),
            topology: collaborators.topology,
            automation: collaborators.automation,
            events_tx,
            events_rx,
        }
    }

    /// A sender for posting events from outside (e.g. a signal handler).
    pub fn event_sender(&self) -> EventSender {
        self.events_tx.clone()
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn registry(&self) -> &DisplayRegistry {
        &self.registry
    }

    pub fn watchdog(&self) -> &ResourceWatchdog {
        &self.watchdog
    }

    pub fn reporter(&self) -> &StateReporter {
        &self.reporter
    }

    /// Issues the first connection attempt.
    pub fn start(&mut self) {
        info!(
            "display agent {} ({}) starting; server {}",
            self.identity.name,
            self.identity.id,
            self.connection.config().endpoint
        );
        self.connection.connect();
    }

    /// Starts the agent and processes events until [`AgentEvent::Shutdown`].
    pub async fn run(mut self) {
        self.start();
        while let Some(event) = self.events_rx.recv().await {
            if self.handle_event(event) == Flow::Stop {
                break;
            }
        }
        info!("display agent stopped");
    }

    /// Processes events for `duration`, then returns.
    ///
    /// Returns [`Flow::Stop`] if a shutdown was handled in that window.
    pub async fn run_for(&mut self, duration: Duration) -> Flow {
        let deadline = time::Instant::now() + duration;
        loop {
            tokio::select! {
                biased;
                event = self.events_rx.recv() => {
                    let Some(event) = event else {
                        return Flow::Stop;
                    };
                    if self.handle_event(event) == Flow::Stop {
                        return Flow::Stop;
                    }
                }
                _ = time::sleep_until(deadline) => return Flow::Continue,
            }
        }
    }

    /// Applies one event.  Never awaits.
    pub fn handle_event(&mut self, event: AgentEvent) -> Flow {
        match event {
            AgentEvent::Connected { link, outbound } => {
                if self.connection.on_connected(link, outbound) {
                    self.register();
                    self.report_state();
                }
            }
            AgentEvent::Disconnected { link, reason } => {
                self.connection.on_disconnected(link, &reason);
            }
            AgentEvent::FrameReceived { link, frame } => {
                if self.connection.is_current(link) {
                    debug!("frame from {link}: {} bytes", frame.len());
                    dispatch_frame(&frame, self);
                } else {
                    debug!("dropping frame from stale {link}");
                }
            }
            AgentEvent::ReconnectDue => self.connection.on_reconnect_due(),
            AgentEvent::SurfaceClosed(key) => {
                info!("{key} was closed");
                self.remove_surface(key);
            }
            AgentEvent::SampleDue(key) => {
                if self.watchdog.on_tick(&self.registry, key) == TickOutcome::SurfaceDestroyed {
                    self.remove_surface(key);
                }
            }
            AgentEvent::MemorySample { key, result } => {
                self.watchdog.on_sample(&mut self.registry, key, result);
            }
            AgentEvent::Unresponsive(key) => {
                if self.registry.entry(key).is_some() {
                    self.watchdog.on_unresponsive(key);
                }
            }
            AgentEvent::Responsive(key) => {
                if self.registry.entry(key).is_some() {
                    self.watchdog.on_responsive(key);
                }
            }
            AgentEvent::Shutdown => {
                self.shutdown();
                return Flow::Stop;
            }
        }
        Flow::Continue
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    fn current_topology(&self) -> DisplayTopology {
        self.topology.current_topology().unwrap_or_else(|e| {
            warn!("{e}; treating topology as empty");
            DisplayTopology::default()
        })
    }

    fn register(&mut self) {
        let displays = self.current_topology().into_displays();
        info!("registering {} display(s)", displays.len());
        self.send(&OutboundMessage::Register(RegisterMessage {
            device_id: self.identity.id.clone(),
            device_name: self.identity.name.clone(),
            displays,
        }));
    }

    fn report_state(&mut self) {
        let report = self.reporter.build(&self.registry);
        self.send(&report);
    }

    fn send(&self, msg: &OutboundMessage) {
        match self.connection.send(msg) {
            Ok(()) => {}
            Err(ConnectionError::NotConnected) => {
                debug!("{} not sent: not connected", msg.kind())
            }
            Err(e) => warn!("failed to send {}: {e}", msg.kind()),
        }
    }

    fn remove_surface(&mut self, key: SurfaceKey) {
        self.watchdog.unwatch(key);
        match self.registry.remove(key) {
            Some(entry) => {
                info!("removed {key} (was showing {})", entry.content_url);
                drop(entry);
                self.report_state();
            }
            None => debug!("{key} is not registered; nothing to remove"),
        }
    }

    fn shutdown(&mut self) {
        info!("shutting down; releasing {} surface(s)", self.registry.len());
        self.watchdog.clear();
        self.registry.clear();
        self.connection.close();
    }
}

impl CommandHandler for Agent {
    fn open_screen(&mut self, command: OpenScreenCommand) {
        let topology = self.current_topology();
        match self
            .registry
            .open_or_update(&topology, command.display_id, &command.url)
        {
            Ok(OpenOutcome::Navigated(key)) => {
                info!("{key} now showing {}", command.url);
                self.report_state();
            }
            Ok(OpenOutcome::Created { key, replaced }) => {
                if let Some(old) = replaced {
                    self.watchdog.unwatch(SurfaceKey::new(key.display, old));
                }
                self.watchdog.watch(key);
                self.report_state();
            }
            Err(RegistryError::DisplayNotFound(missing)) => {
                warn!("OPEN_SCREEN for unknown display {missing}; ignored");
            }
            Err(RegistryError::SurfaceCreation {
                display: target,
                replaced,
                source,
            }) => {
                error!("could not show {} on display {target}: {source}", command.url);
                // The destroyed entry that was evicted is gone either way.
                if let Some(old) = replaced {
                    self.watchdog.unwatch(SurfaceKey::new(target, old));
                    self.report_state();
                }
            }
        }
    }

    fn login_web(&mut self, command: LoginWebCommand) {
        let credentials = Credentials::new(command.acc, command.password);
        match self.registry.get_mut(command.display_id) {
            Some(entry) if !entry.surface.is_destroyed() => {
                info!("logging in on display {} as {}", command.display_id, credentials.account);
                self.automation.login(entry.surface.as_mut(), &credentials);
            }
            _ => info!(
                "LOGIN_WEB for display {} with no live surface; ignored",
                command.display_id
            ),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
