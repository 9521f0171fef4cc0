//! Domain entities for the display agent.
//!
//! This module contains pure data types with no infrastructure dependencies.
//! Code in the agent's application and infrastructure layers depends on these
//! types, but the domain never depends on them.

/// Physical displays, their bounds, and the topology snapshot.
pub mod display;

/// The immutable identity the agent registers with.
pub mod identity;
