//! Physical display entities.
//!
//! A *display* is one physical monitor attached to the endpoint machine.  The
//! control server addresses displays by the numeric identifier the host OS
//! assigns to them, so [`DisplayId`] is the key used everywhere: in the
//! registry, in commands, and in state reports.
//!
//! The set of displays known at a given moment is a [`DisplayTopology`].  The
//! topology is never cached for long: monitors can be unplugged and
//! reattached, so the agent takes a fresh snapshot whenever it needs one.

use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Identifier the host OS assigns to a physical display.
///
/// Serialized as a JSON number.  Deserialization also accepts a numeric
/// string (`"2"`), because JSON object keys are always strings and some
/// control-server builds send `displayId` as a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DisplayId(pub u64);

impl fmt::Display for DisplayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for DisplayId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl Serialize for DisplayId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.0)
    }
}

impl<'de> Deserialize<'de> for DisplayId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(DisplayIdVisitor)
    }
}

struct DisplayIdVisitor;

impl<'de> Visitor<'de> for DisplayIdVisitor {
    type Value = DisplayId;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a non-negative integer or a numeric string")
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<DisplayId, E> {
        Ok(DisplayId(value))
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<DisplayId, E> {
        u64::try_from(value)
            .map(DisplayId)
            .map_err(|_| E::invalid_value(de::Unexpected::Signed(value), &self))
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<DisplayId, E> {
        value
            .trim()
            .parse::<u64>()
            .map(DisplayId)
            .map_err(|_| E::invalid_value(de::Unexpected::Str(value), &self))
    }
}

/// Pixel rectangle of a display in the host's global desktop coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    /// X coordinate of the top-left corner (may be negative).
    pub x: i32,
    /// Y coordinate of the top-left corner (may be negative).
    pub y: i32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Bounds {
    /// Creates a new rectangle.
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// One physical display: its identifier plus where it sits on the desktop.
///
/// The serde shape (`{"id":..,"bounds":{..}}`) is exactly the element shape
/// of the `displays` array in a `REGISTER` message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Display {
    pub id: DisplayId,
    pub bounds: Bounds,
}

impl Display {
    pub fn new(id: impl Into<DisplayId>, bounds: Bounds) -> Self {
        Self {
            id: id.into(),
            bounds,
        }
    }
}

/// Ordered snapshot of every display attached to the machine.
///
/// Display identifiers are unique within a topology: when the source reports
/// the same identifier twice, the first occurrence wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisplayTopology {
    displays: Vec<Display>,
}

impl DisplayTopology {
    /// Builds a topology from an enumerated display list, preserving order and
    /// dropping duplicate identifiers.
    pub fn new(displays: impl IntoIterator<Item = Display>) -> Self {
        let mut unique: Vec<Display> = Vec::new();
        for display in displays {
            if !unique.iter().any(|d| d.id == display.id) {
                unique.push(display);
            }
        }
        Self { displays: unique }
    }

    /// Looks up a display by identifier.
    pub fn find(&self, id: DisplayId) -> Option<&Display> {
        self.displays.iter().find(|d| d.id == id)
    }

    pub fn contains(&self, id: DisplayId) -> bool {
        self.find(id).is_some()
    }

    pub fn displays(&self) -> &[Display] {
        &self.displays
    }

    pub fn len(&self) -> usize {
        self.displays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.displays.is_empty()
    }

    pub fn into_displays(self) -> Vec<Display> {
        self.displays
    }
}

impl FromIterator<Display> for DisplayTopology {
    fn from_iter<I: IntoIterator<Item = Display>>(iter: I) -> Self {
        Self::new(iter)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
