//! display-agent library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does display-agent do? (for beginners)
//!
//! The agent runs on a machine that drives one or more wall screens, kiosks
//! or signage displays.  A central *control server* decides what each screen
//! shows; the agent makes it happen:
//!
//! 1. Connects to the control server over a WebSocket and sends `REGISTER`
//!    with the machine's identity and its current display layout.
//! 2. On `OPEN_SCREEN`, shows the given URL full-screen on the given
//!    display, reusing the window already there or opening a new one.
//! 3. On `LOGIN_WEB`, fills in and submits the login form on a display.
//! 4. Every three seconds, checks how much memory each window uses and
//!    reloads any that has grown past its limit.
//! 5. After every change, sends `OPEN_SCREEN_RETURN` with the full
//!    display → URL map so the server always knows what is on screen.
//! 6. Whenever the connection drops, tries again three seconds later,
//!    forever.

/// The agent aggregate and its event loop.
pub mod agent;

/// Application layer: decisions, ports and events.
pub mod application;

/// Infrastructure layer: network, browser windows, OS adapters, config.
pub mod infrastructure;

pub use agent::{Agent, AgentSettings, Collaborators, Flow};
