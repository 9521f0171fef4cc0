//! Infrastructure layer for the display agent.
//!
//! Contains OS-facing adapters: the WebSocket control connection, kiosk
//! browser windows, display enumeration, device identity, local address
//! discovery and the config file.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `display_core`, but MUST NOT be imported by the `application` layer
//! outside of tests.
//!
//! # Sub-modules
//!
//! - **`network`** – `ConnectionManager`, the per-link task, and the
//!   WebSocket and mock connectors.
//!
//! - **`surface`** – `KioskBrowserProvider` (one browser process per display,
//!   driven over DevTools, memory from `/proc`) and `FakeSurfaceProvider` for
//!   tests.
//!
//! - **`screen_info`** – RandR, static and mock `TopologyProvider`s.
//!
//! - **`identity`** – Machine-id based `IdentityProvider`.
//!
//! - **`local_ip`** – Best local IPv4 address for locating the server.
//!
//! - **`storage`** – TOML config loading.

pub mod identity;
pub mod local_ip;
pub mod network;
pub mod screen_info;
pub mod storage;
pub mod surface;
