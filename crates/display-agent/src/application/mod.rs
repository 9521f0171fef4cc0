//! Application layer of the display agent.
//!
//! # What lives here? (for beginners)
//!
//! Everything the agent *decides* lives in this layer; everything it *does*
//! to the outside world (sockets, browser processes, `/proc`, `xrandr`) is
//! behind a trait and implemented in `infrastructure`.
//!
//! - **`events`** – The single [`events::AgentEvent`] enum every background
//!   task posts to, plus the link and surface generation ids used to drop
//!   stale events.
//!
//! - **`surface`** – The `Surface` / `SurfaceProvider` port for full-screen
//!   content windows.
//!
//! - **`topology`** – The `TopologyProvider` port that enumerates displays.
//!
//! - **`registry`** – `DisplayRegistry`, the display → window map and the
//!   create-or-navigate rule behind `OPEN_SCREEN`.
//!
//! - **`watchdog`** – `ResourceWatchdog`, periodic memory sampling and
//!   forced reloads.
//!
//! - **`reporter`** – Builds the full-state `OPEN_SCREEN_RETURN` report.
//!
//! - **`dispatcher`** – Decodes inbound frames and routes them to a
//!   `CommandHandler`.
//!
//! - **`automation`** – Best-effort login form filling for `LOGIN_WEB`.

pub mod automation;
pub mod dispatcher;
pub mod events;
pub mod registry;
pub mod reporter;
pub mod surface;
pub mod topology;
pub mod watchdog;
