//! Surface adapters.
//!
//! - **`browser`** – `KioskBrowserProvider`, one kiosk browser process per
//!   display, driven over the DevTools protocol.
//! - **`devtools`** – The small DevTools client and per-window command worker
//!   used by `browser`.
//! - **`proc_memory`** – Private memory of a browser's renderer processes.
//! - **`mock`** – `FakeSurfaceProvider` for tests.

pub mod browser;
pub mod devtools;
pub mod mock;
pub mod proc_memory;
