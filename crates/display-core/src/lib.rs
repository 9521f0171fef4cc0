//! # display-core
//!
//! Shared library for the display agent containing the JSON wire protocol
//! spoken with the control server and the domain entities that describe the
//! machine's monitors and identity.
//!
//! This crate has zero dependencies on OS APIs, window toolkits, or network
//! sockets.
//!
//! # Architecture overview
//!
//! The display agent runs on every endpoint machine that drives one or more
//! physical monitors.  It keeps a single WebSocket connection open to a
//! central control server, registers the machine and its monitor topology, and
//! then obeys "show this URL on this display" commands.
//!
//! - **`protocol`** – The JSON messages exchanged with the control server and
//!   the codec that turns text frames into typed Rust values.
//!
//! - **`domain`** – Display identifiers, pixel bounds, the display topology,
//!   and the device identity.

pub mod domain;
pub mod protocol;

pub use domain::display::{Bounds, Display, DisplayId, DisplayTopology};
pub use domain::identity::DeviceIdentity;
pub use protocol::codec::{decode_inbound, encode_outbound, ProtocolError};
pub use protocol::messages::{InboundMessage, OutboundMessage};
