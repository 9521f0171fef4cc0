//! Linux display enumeration via the X RandR extension.
//!
//! `XRRGetMonitors` returns one record per logical monitor with its position
//! in the root window, which is exactly what a kiosk window needs to cover
//! it.  Plain Xlib only knows about X screens, and a multi-head setup is
//! normally one X screen spanning every output.
//!
//! Display ids are assigned in the order RandR lists monitors, starting at 1.
//! That order is stable for a given cabling, so the control server sees the
//! same id for the same physical display across reconnects.

use display_core::{Bounds, Display, DisplayTopology};
use tracing::debug;
use x11::{xlib, xrandr};

use crate::application::topology::{TopologyError, TopologyProvider};

/// Geometry of one RandR monitor, as reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawMonitor {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub primary: bool,
}

/// Builds a topology from RandR monitors.
///
/// Monitors with a non-positive size (disabled outputs that RandR still
/// lists) are skipped but still consume an id, so the remaining ids do not
/// shift when an output is switched off.
pub fn topology_from_monitors(monitors: &[RawMonitor]) -> DisplayTopology {
    monitors
        .iter()
        .enumerate()
        .filter(|(_, m)| m.width > 0 && m.height > 0)
        .map(|(index, m)| {
            Display::new(
                index as u64 + 1,
                Bounds::new(m.x, m.y, m.width as u32, m.height as u32),
            )
        })
        .collect()
}

/// [`TopologyProvider`] backed by the X server named in `DISPLAY`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandrTopologyProvider;

impl RandrTopologyProvider {
    pub fn new() -> Self {
        Self
    }
}

impl TopologyProvider for RandrTopologyProvider {
    fn current_topology(&self) -> Result<DisplayTopology, TopologyError> {
        let monitors = query_monitors()?;
        debug!("RandR reported {} monitor(s)", monitors.len());
        Ok(topology_from_monitors(&monitors))
    }
}

fn query_monitors() -> Result<Vec<RawMonitor>, TopologyError> {
    // SAFETY: a null name makes Xlib use $DISPLAY.  The returned pointer is
    // closed below and not used afterwards.
    let display = unsafe { xlib::XOpenDisplay(std::ptr::null()) };
    if display.is_null() {
        let display_env = std::env::var("DISPLAY").unwrap_or_else(|_| "<unset>".to_string());
        return Err(TopologyError::Enumeration(format!(
            "XOpenDisplay failed; DISPLAY={display_env}"
        )));
    }

    let mut count = 0;
    // SAFETY: `display` is a valid connection; the root window belongs to it.
    let infos = unsafe {
        let root = xlib::XDefaultRootWindow(display);
        xrandr::XRRGetMonitors(display, root, xlib::True, &mut count)
    };

    let result = if infos.is_null() {
        Err(TopologyError::Enumeration(
            "XRRGetMonitors returned no data (RandR 1.5 unavailable?)".to_string(),
        ))
    } else {
        // SAFETY: XRRGetMonitors returned `count` contiguous records.
        let records = unsafe { std::slice::from_raw_parts(infos, count.max(0) as usize) };
        let monitors = records
            .iter()
            .map(|m| RawMonitor {
                x: m.x,
                y: m.y,
                width: m.width,
                height: m.height,
                primary: m.primary != 0,
            })
            .collect();
        // SAFETY: `infos` came from XRRGetMonitors and is freed exactly once.
        unsafe { xrandr::XRRFreeMonitors(infos) };
        Ok(monitors)
    };

    // SAFETY: `display` was opened above and is not used after this.
    unsafe { xlib::XCloseDisplay(display) };
    result
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use display_core::DisplayId;

    fn monitor(x: i32, y: i32, width: i32, height: i32) -> RawMonitor {
        RawMonitor {
            x,
            y,
            width,
            height,
            primary: false,
        }
    }

    #[test]
    fn test_topology_ids_follow_randr_order_from_one() {
        // Arrange
        let monitors = [monitor(0, 0, 1920, 1080), monitor(1920, 0, 2560, 1440)];

        // Act
        let topology = topology_from_monitors(&monitors);

        // Assert
        assert_eq!(topology.len(), 2);
        let second = topology.find(DisplayId(2)).expect("display 2");
        assert_eq!(second.bounds, Bounds::new(1920, 0, 2560, 1440));
    }

    #[test]
    fn test_negative_offsets_are_preserved() {
        let topology = topology_from_monitors(&[monitor(-1080, -200, 1080, 1920)]);
        assert_eq!(
            topology.find(DisplayId(1)).map(|d| d.bounds),
            Some(Bounds::new(-1080, -200, 1080, 1920))
        );
    }

    #[test]
    fn test_disabled_monitor_is_skipped_without_shifting_ids() {
        let topology = topology_from_monitors(&[
            monitor(0, 0, 0, 0),
            monitor(0, 0, 1920, 1080),
        ]);
        assert_eq!(topology.len(), 1);
        assert!(topology.contains(DisplayId(2)));
    }

    /// Smoke test: with an X server this must succeed; without one it must
    /// fail with an enumeration error rather than panic.
    #[test]
    fn test_randr_provider_smoke() {
        let result = RandrTopologyProvider::new().current_topology();
        if std::env::var("DISPLAY").is_err() {
            assert!(matches!(result, Err(TopologyError::Enumeration(_))));
        }
    }
}
