//! Resource watchdog: periodic memory sampling and forced reload.
//!
//! Every surface that enters the registry gets a sampler task.  The sampler
//! owns nothing but a timer and an [`EventSender`]: every
//! `sample_interval` it posts [`AgentEvent::SampleDue`].  The agent then asks
//! the watchdog what to do with the tick ([`ResourceWatchdog::on_tick`]):
//!
//! 1. No registry entry for this surface generation: the sampler stops.
//! 2. The surface has been destroyed: the sampler stops and the agent removes
//!    the entry.
//! 3. Otherwise a memory query is spawned; its result comes back as
//!    [`AgentEvent::MemorySample`] and is judged by
//!    [`ResourceWatchdog::on_sample`].  Strictly above the threshold means a
//!    cache-bypassing reload.
//!
//! Queries run off the event loop.  The generation check in `on_sample`
//! drops samples that complete after their surface was replaced.
//!
//! There is no cooldown: a surface that stays above the threshold is
//! reloaded on every tick.

use std::collections::HashMap;
use std::time::Duration;

use display_core::DisplayId;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::application::events::{AgentEvent, EventSender, SurfaceId, SurfaceKey};
use crate::application::registry::DisplayRegistry;
use crate::application::surface::{MemoryUsage, SurfaceError};

/// Default sampling period.
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_millis(3000);

/// Default private-memory ceiling, in MiB.
pub const DEFAULT_MEMORY_THRESHOLD_MB: f64 = 400.0;

/// Tunables for [`ResourceWatchdog`].
#[derive(Debug, Clone, PartialEq)]
pub struct WatchdogConfig {
    pub sample_interval: Duration,
    /// Reload when a sample is strictly greater than this many MiB.
    pub memory_threshold_mb: f64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            sample_interval: DEFAULT_SAMPLE_INTERVAL,
            memory_threshold_mb: DEFAULT_MEMORY_THRESHOLD_MB,
        }
    }
}

/// Result of [`ResourceWatchdog::on_tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The tick came from a sampler that is no longer registered.
    Ignored,
    /// The surface has left the registry; the sampler was stopped.
    Stopped,
    /// The surface is destroyed; the sampler was stopped and the caller must
    /// remove the entry.
    SurfaceDestroyed,
    /// A memory query is in flight.
    Sampling,
}

/// Result of [`ResourceWatchdog::on_sample`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleOutcome {
    /// The sample belongs to a surface that is no longer registered.
    Stale,
    /// The memory query failed; the sampler keeps running.
    QueryFailed,
    WithinLimit { mb: f64 },
    /// The sample exceeded the threshold and the surface was reloaded.
    Reloaded { mb: f64 },
}

struct Sampler {
    surface: SurfaceId,
    task: JoinHandle<()>,
}

/// Owns one sampler task per watched display.
pub struct ResourceWatchdog {
    config: WatchdogConfig,
    events: EventSender,
    samplers: HashMap<DisplayId, Sampler>,
    reloads_issued: u64,
}

impl ResourceWatchdog {
    pub fn new(config: WatchdogConfig, events: EventSender) -> Self {
        Self {
            config,
            events,
            samplers: HashMap::new(),
            reloads_issued: 0,
        }
    }

    pub fn config(&self) -> &WatchdogConfig {
        &self.config
    }

    /// Starts sampling `key`.  Any sampler for an older surface on the same
    /// display is stopped first.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn watch(&mut self, key: SurfaceKey) {
        if let Some(old) = self.samplers.remove(&key.display) {
            old.task.abort();
        }

        let period = self.config.sample_interval;
        let events = self.events.clone();
        let first_tick = Instant::now() + period;
        let task = tokio::spawn(async move {
            let mut ticker = interval_at(first_tick, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if events.send(AgentEvent::SampleDue(key)).is_err() {
                    break;
                }
            }
        });

        debug!("watchdog sampling {key} every {period:?}");
        self.samplers.insert(
            key.display,
            Sampler {
                surface: key.surface,
                task,
            },
        );
    }

    /// Stops the sampler for `key` if it is still the current one.
    pub fn unwatch(&mut self, key: SurfaceKey) {
        if self
            .samplers
            .get(&key.display)
            .is_some_and(|s| s.surface == key.surface)
        {
            if let Some(sampler) = self.samplers.remove(&key.display) {
                sampler.task.abort();
                debug!("watchdog stopped for {key}");
            }
        }
    }

    pub fn is_watching(&self, key: SurfaceKey) -> bool {
        self.samplers
            .get(&key.display)
            .is_some_and(|s| s.surface == key.surface)
    }

    /// Number of running samplers.
    pub fn watched(&self) -> usize {
        self.samplers.len()
    }

    /// Total forced reloads since start.
    pub fn reloads_issued(&self) -> u64 {
        self.reloads_issued
    }

    /// Handles a sampler tick.
    pub fn on_tick(&mut self, registry: &DisplayRegistry, key: SurfaceKey) -> TickOutcome {
        if !self.is_watching(key) {
            return TickOutcome::Ignored;
        }

        let Some(entry) = registry.entry(key) else {
            self.unwatch(key);
            return TickOutcome::Stopped;
        };

        if entry.surface.is_destroyed() {
            info!("{key} was destroyed; stopping watchdog");
            self.unwatch(key);
            return TickOutcome::SurfaceDestroyed;
        }

        let query = entry.surface.memory_usage();
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = query.await;
            let _ = events.send(AgentEvent::MemorySample { key, result });
        });
        TickOutcome::Sampling
    }

    /// Judges a completed memory query.
    pub fn on_sample(
        &mut self,
        registry: &mut DisplayRegistry,
        key: SurfaceKey,
        result: Result<MemoryUsage, SurfaceError>,
    ) -> SampleOutcome {
        let Some(entry) = registry.entry_mut(key) else {
            return SampleOutcome::Stale;
        };

        let usage = match result {
            Ok(usage) => usage,
            Err(e) => {
                error!("memory query for {key} failed: {e}");
                return SampleOutcome::QueryFailed;
            }
        };

        let mb = usage.megabytes();
        entry.last_memory_sample_mb = Some(mb);

        if mb > self.config.memory_threshold_mb {
            warn!(
                "{key} is using {mb:.1} MiB (limit {:.0} MiB); reloading without cache",
                self.config.memory_threshold_mb
            );
            entry.surface.reload_bypassing_cache();
            self.reloads_issued += 1;
            SampleOutcome::Reloaded { mb }
        } else {
            debug!("{key} memory {mb:.1} MiB");
            SampleOutcome::WithinLimit { mb }
        }
    }

    pub fn on_unresponsive(&self, key: SurfaceKey) {
        warn!("{key} stopped responding");
    }

    pub fn on_responsive(&self, key: SurfaceKey) {
        info!("{key} is responding again");
    }

    /// Stops every sampler.
    pub fn clear(&mut self) {
        for (_, sampler) in self.samplers.drain() {
            sampler.task.abort();
        }
    }
}

impl Drop for ResourceWatchdog {
    fn drop(&mut self) {
        self.clear();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::application::events::{event_channel, EventReceiver};
    use crate::infrastructure::surface::mock::FakeSurfaceProvider;
    use display_core::{Bounds, Display, DisplayTopology};

    struct Fixture {
        registry: DisplayRegistry,
        watchdog: ResourceWatchdog,
        provider: Arc<FakeSurfaceProvider>,
        rx: EventReceiver,
    }

    fn fixture() -> Fixture {
        let provider = Arc::new(FakeSurfaceProvider::new());
        let (tx, rx) = event_channel();
        Fixture {
            registry: DisplayRegistry::new(provider.clone(), tx.clone()),
            watchdog: ResourceWatchdog::new(WatchdogConfig::default(), tx),
            provider,
            rx,
        }
    }

    fn open(f: &mut Fixture, display: u64) -> SurfaceKey {
        let topology = DisplayTopology::new(vec![
            Display::new(1, Bounds::new(0, 0, 1920, 1080)),
            Display::new(2, Bounds::new(1920, 0, 1920, 1080)),
        ]);
        let key = f
            .registry
            .open_or_update(&topology, DisplayId(display), "https://a")
            .expect("open")
            .key();
        f.watchdog.watch(key);
        key
    }

    #[tokio::test(start_paused = true)]
    async fn test_sampler_ticks_after_each_interval() {
        // Arrange
        let mut f = fixture();
        let key = open(&mut f, 1);

        // Act
        tokio::time::advance(Duration::from_millis(2999)).await;
        let early = f.rx.try_recv();
        tokio::time::advance(Duration::from_millis(1)).await;
        tokio::task::yield_now().await;

        // Assert
        assert!(early.is_err(), "no tick before the first interval");
        assert!(matches!(f.rx.recv().await, Some(AgentEvent::SampleDue(k)) if k == key));
    }

    #[tokio::test]
    async fn test_sample_above_threshold_reloads() {
        let mut f = fixture();
        let key = open(&mut f, 1);

        let outcome = f
            .watchdog
            .on_sample(&mut f.registry, key, Ok(MemoryUsage::from_mb(401)));

        assert!(matches!(outcome, SampleOutcome::Reloaded { .. }));
        assert_eq!(f.provider.handle(0).unwrap().reloads(), 1);
        assert_eq!(f.watchdog.reloads_issued(), 1);
    }

    #[tokio::test]
    async fn test_sample_at_threshold_does_not_reload() {
        let mut f = fixture();
        let key = open(&mut f, 1);

        let outcome = f
            .watchdog
            .on_sample(&mut f.registry, key, Ok(MemoryUsage::from_mb(400)));

        assert_eq!(outcome, SampleOutcome::WithinLimit { mb: 400.0 });
        assert_eq!(f.provider.handle(0).unwrap().reloads(), 0);
        assert_eq!(f.registry.get(DisplayId(1)).unwrap().last_memory_sample_mb, Some(400.0));
    }

    #[tokio::test]
    async fn test_every_high_sample_reloads_without_cooldown() {
        let mut f = fixture();
        let key = open(&mut f, 1);

        for _ in 0..3 {
            f.watchdog
                .on_sample(&mut f.registry, key, Ok(MemoryUsage::from_mb(900)));
        }

        assert_eq!(f.provider.handle(0).unwrap().reloads(), 3);
    }

    #[tokio::test]
    async fn test_failed_query_neither_reloads_nor_stops() {
        let mut f = fixture();
        let key = open(&mut f, 1);

        let outcome = f.watchdog.on_sample(
            &mut f.registry,
            key,
            Err(SurfaceError::MemoryQuery("gone".into())),
        );

        assert_eq!(outcome, SampleOutcome::QueryFailed);
        assert_eq!(f.provider.handle(0).unwrap().reloads(), 0);
        assert!(f.watchdog.is_watching(key));
    }

    #[tokio::test]
    async fn test_tick_for_destroyed_surface_stops_sampler() {
        // Arrange
        let mut f = fixture();
        let key = open(&mut f, 1);
        f.provider.handle(0).unwrap().destroy_silently();

        // Act
        let outcome = f.watchdog.on_tick(&f.registry, key);

        // Assert
        assert_eq!(outcome, TickOutcome::SurfaceDestroyed);
        assert!(!f.watchdog.is_watching(key));
    }

    #[tokio::test]
    async fn test_tick_for_removed_entry_stops_sampler() {
        let mut f = fixture();
        let key = open(&mut f, 1);
        f.registry.remove(key);

        assert_eq!(f.watchdog.on_tick(&f.registry, key), TickOutcome::Stopped);
        assert_eq!(f.watchdog.watched(), 0);
    }

    #[tokio::test]
    async fn test_tick_for_live_surface_posts_memory_sample() {
        let mut f = fixture();
        let key = open(&mut f, 2);
        f.provider.handle(0).unwrap().set_memory_mb(120);

        assert_eq!(f.watchdog.on_tick(&f.registry, key), TickOutcome::Sampling);

        match f.rx.recv().await {
            Some(AgentEvent::MemorySample { key: k, result }) => {
                assert_eq!(k, key);
                assert_eq!(result, Ok(MemoryUsage::from_mb(120)));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_sample_for_replaced_surface_is_stale() {
        let mut f = fixture();
        let old = open(&mut f, 1);
        f.provider.handle(0).unwrap().destroy_silently();
        let _new = open(&mut f, 1);

        let outcome = f
            .watchdog
            .on_sample(&mut f.registry, old, Ok(MemoryUsage::from_mb(900)));

        assert_eq!(outcome, SampleOutcome::Stale);
        assert_eq!(f.provider.handle(1).unwrap().reloads(), 0);
    }

    #[tokio::test]
    async fn test_watch_replaces_older_sampler_for_same_display() {
        let mut f = fixture();
        let old = open(&mut f, 1);
        f.provider.handle(0).unwrap().destroy_silently();
        let new = open(&mut f, 1);

        f.watchdog.unwatch(old);

        assert!(!f.watchdog.is_watching(old));
        assert!(f.watchdog.is_watching(new));
        assert_eq!(f.watchdog.watched(), 1);
    }
}
