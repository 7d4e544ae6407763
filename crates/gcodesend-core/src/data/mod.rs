//! Data models for positions, status, and communicator state
//!
//! This module provides:
//! - Position tracking with full 6-axis support (X, Y, Z, A, B, C)
//! - Partial positions for selective axis changes
//! - Controller status reported out-of-band by the firmware
//! - Communicator lifecycle state
//! - Unit management (MM, INCH)

use serde::{Deserialize, Serialize};
use std::fmt;

/// Machine coordinate units (millimeters or inches)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Units {
    /// Millimeters (metric)
    #[default]
    MM,
    /// Inches (imperial)
    INCH,
}

impl Units {
    /// Convert a value from one unit to another
    pub fn convert(value: f64, from: Units, to: Units) -> f64 {
        match (from, to) {
            (Units::MM, Units::INCH) => value / 25.4,
            (Units::INCH, Units::MM) => value * 25.4,
            _ => value,
        }
    }

    /// Stable single-byte code used by the stream file format
    pub fn code(self) -> u8 {
        match self {
            Units::MM => 0,
            Units::INCH => 1,
        }
    }

    /// Inverse of [`Units::code`]
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Units::MM),
            1 => Some(Units::INCH),
            _ => None,
        }
    }
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Units::MM => write!(f, "mm"),
            Units::INCH => write!(f, "in"),
        }
    }
}

/// Axis identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    /// X axis
    X,
    /// Y axis
    Y,
    /// Z axis
    Z,
    /// A axis (rotary about X)
    A,
    /// B axis (rotary about Y)
    B,
    /// C axis (rotary about Z)
    C,
}

impl Axis {
    /// All axes in word order
    pub const ALL: [Axis; 6] = [Axis::X, Axis::Y, Axis::Z, Axis::A, Axis::B, Axis::C];

    /// Map a G-code word letter to an axis
    pub fn from_letter(letter: char) -> Option<Self> {
        match letter.to_ascii_uppercase() {
            'X' => Some(Axis::X),
            'Y' => Some(Axis::Y),
            'Z' => Some(Axis::Z),
            'A' => Some(Axis::A),
            'B' => Some(Axis::B),
            'C' => Some(Axis::C),
            _ => None,
        }
    }

    /// The G-code word letter for this axis
    pub fn letter(self) -> char {
        match self {
            Axis::X => 'X',
            Axis::Y => 'Y',
            Axis::Z => 'Z',
            Axis::A => 'A',
            Axis::B => 'B',
            Axis::C => 'C',
        }
    }

    /// Whether this is a rotary axis
    pub fn is_rotary(self) -> bool {
        matches!(self, Axis::A | Axis::B | Axis::C)
    }
}

/// A 6-axis machine coordinate with its unit tag
///
/// Value type: copied, never shared-mutated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// X-axis position
    pub x: f64,
    /// Y-axis position
    pub y: f64,
    /// Z-axis position
    pub z: f64,
    /// A-axis (4th axis) position
    pub a: f64,
    /// B-axis (5th axis) position
    pub b: f64,
    /// C-axis (6th axis) position
    pub c: f64,
    /// Coordinate unit
    pub unit: Units,
}

impl Position {
    /// Create a new position with all axes at zero
    pub fn new(unit: Units) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            a: 0.0,
            b: 0.0,
            c: 0.0,
            unit,
        }
    }

    /// Create a position from linear axes only
    pub fn xyz(x: f64, y: f64, z: f64, unit: Units) -> Self {
        Self {
            x,
            y,
            z,
            ..Self::new(unit)
        }
    }

    /// Create a position with specified 6-axis coordinates
    pub fn with_axes(x: f64, y: f64, z: f64, a: f64, b: f64, c: f64, unit: Units) -> Self {
        debug_assert!(
            x.is_finite()
                && y.is_finite()
                && z.is_finite()
                && a.is_finite()
                && b.is_finite()
                && c.is_finite(),
            "Position axes must be finite: x={x}, y={y}, z={z}, a={a}, b={b}, c={c}"
        );
        Self {
            x,
            y,
            z,
            a,
            b,
            c,
            unit,
        }
    }

    /// Read one axis
    pub fn get(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
            Axis::A => self.a,
            Axis::B => self.b,
            Axis::C => self.c,
        }
    }

    /// Write one axis
    pub fn set(&mut self, axis: Axis, value: f64) {
        match axis {
            Axis::X => self.x = value,
            Axis::Y => self.y = value,
            Axis::Z => self.z = value,
            Axis::A => self.a = value,
            Axis::B => self.b = value,
            Axis::C => self.c = value,
        }
    }

    /// Convert this position to a different unit
    ///
    /// Rotary axes are in degrees and are not scaled.
    pub fn convert_to(&self, target_unit: Units) -> Self {
        let convert = |value| Units::convert(value, self.unit, target_unit);

        Self {
            x: convert(self.x),
            y: convert(self.y),
            z: convert(self.z),
            a: self.a,
            b: self.b,
            c: self.c,
            unit: target_unit,
        }
    }

    /// Linear (XYZ) distance to another position in this position's units
    pub fn distance_to(&self, other: &Position) -> f64 {
        let other = other.convert_to(self.unit);
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// Axes whose value differs from `other`, carrying this position's values
    pub fn diff(&self, other: &Position) -> PartialPosition {
        let mut partial = PartialPosition::new();
        for axis in Axis::ALL {
            let value = self.get(axis);
            if value != other.get(axis) {
                partial.set(axis, value);
            }
        }
        partial
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::new(Units::MM)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "X:{:.3} Y:{:.3} Z:{:.3} A:{:.3} B:{:.3} C:{:.3} ({})",
            self.x, self.y, self.z, self.a, self.b, self.c, self.unit
        )
    }
}

/// Partial position, for updates that touch a subset of axes
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialPosition {
    /// X-axis position (optional)
    pub x: Option<f64>,
    /// Y-axis position (optional)
    pub y: Option<f64>,
    /// Z-axis position (optional)
    pub z: Option<f64>,
    /// A-axis position (optional)
    pub a: Option<f64>,
    /// B-axis position (optional)
    pub b: Option<f64>,
    /// C-axis position (optional)
    pub c: Option<f64>,
}

impl PartialPosition {
    /// Create an empty partial position
    pub fn new() -> Self {
        Self::default()
    }

    /// Read one axis
    pub fn get(&self, axis: Axis) -> Option<f64> {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
            Axis::A => self.a,
            Axis::B => self.b,
            Axis::C => self.c,
        }
    }

    /// Write one axis
    pub fn set(&mut self, axis: Axis, value: f64) {
        let slot = match axis {
            Axis::X => &mut self.x,
            Axis::Y => &mut self.y,
            Axis::Z => &mut self.z,
            Axis::A => &mut self.a,
            Axis::B => &mut self.b,
            Axis::C => &mut self.c,
        };
        *slot = Some(value);
    }

    /// Apply this partial position to a full position
    pub fn apply_to(&self, pos: &Position) -> Position {
        Position {
            x: self.x.unwrap_or(pos.x),
            y: self.y.unwrap_or(pos.y),
            z: self.z.unwrap_or(pos.z),
            a: self.a.unwrap_or(pos.a),
            b: self.b.unwrap_or(pos.b),
            c: self.c.unwrap_or(pos.c),
            unit: pos.unit,
        }
    }

    /// Present axes in word order
    pub fn axes(&self) -> impl Iterator<Item = (Axis, f64)> + '_ {
        Axis::ALL
            .into_iter()
            .filter_map(move |axis| self.get(axis).map(|v| (axis, v)))
    }

    /// Get the number of axes that are set
    pub fn axis_count(&self) -> usize {
        self.axes().count()
    }

    /// Check if no axes are set
    pub fn is_empty(&self) -> bool {
        self.axis_count() == 0
    }
}

/// Controller status as reported out-of-band by the firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ControllerStatus {
    /// Idle, ready for commands
    Idle,
    /// Executing motion
    Run,
    /// Feed hold
    Hold,
    /// Alarm lock
    Alarm,
    /// G-code check mode
    Check,
    /// Safety door open
    Door,
    /// Homing cycle
    Home,
    /// Sleep mode
    Sleep,
    /// Jogging
    Jog,
    /// Not yet reported
    #[default]
    Unknown,
}

impl ControllerStatus {
    /// Parse the state field of a status report (`Hold:0`, `Door:1` accepted)
    pub fn parse(state: &str) -> Self {
        let name = state.split(':').next().unwrap_or_default().trim();
        match name.to_ascii_lowercase().as_str() {
            "idle" => Self::Idle,
            "run" => Self::Run,
            "hold" => Self::Hold,
            "alarm" => Self::Alarm,
            "check" => Self::Check,
            "door" => Self::Door,
            "home" => Self::Home,
            "sleep" => Self::Sleep,
            "jog" => Self::Jog,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for ControllerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Run => write!(f, "Run"),
            Self::Hold => write!(f, "Hold"),
            Self::Alarm => write!(f, "Alarm"),
            Self::Check => write!(f, "Check"),
            Self::Door => write!(f, "Door"),
            Self::Home => write!(f, "Home"),
            Self::Sleep => write!(f, "Sleep"),
            Self::Jog => write!(f, "Jog"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Out-of-band status report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct StatusReport {
    /// Machine state
    pub status: ControllerStatus,
    /// Machine position
    pub machine_pos: Option<Position>,
    /// Work position
    pub work_pos: Option<Position>,
    /// Current feed rate
    pub feed_rate: Option<f64>,
    /// Current spindle speed
    pub spindle_speed: Option<f64>,
    /// Planner blocks and receive-buffer bytes available, if reported
    pub buffer: Option<(u16, u16)>,
}

/// Lifecycle state of the buffered communicator
///
/// `Disconnected → Connecting → Idle → Streaming ⇄ Paused → Cancelling → Idle`.
/// Any state may move to `Error` on a protocol failure; `Error` is terminal
/// until the next connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CommunicatorState {
    /// No transport
    #[default]
    Disconnected,
    /// Transport open, waiting for the controller banner
    Connecting,
    /// Connected with nothing to send
    Idle,
    /// Sending commands
    Streaming,
    /// Sending suspended; in-flight commands still complete
    Paused,
    /// Discarding the current session
    Cancelling,
    /// Protocol failure; reconnect required
    Error,
}

impl CommunicatorState {
    /// Whether the transport is open and the handshake completed
    pub fn is_connected(&self) -> bool {
        matches!(
            self,
            Self::Idle | Self::Streaming | Self::Paused | Self::Cancelling
        )
    }

    /// Check whether a transition is allowed
    pub fn can_transition_to(&self, target: CommunicatorState) -> bool {
        use CommunicatorState::*;
        if *self == target {
            return true;
        }
        match (self, target) {
            (_, Error) | (_, Disconnected) => true,
            (Disconnected, Connecting) => true,
            (Error, Connecting) => true,
            (Connecting, Idle) => true,
            (Idle, Streaming) => true,
            (Streaming, Paused | Idle | Cancelling) => true,
            (Paused, Streaming | Idle | Cancelling) => true,
            (Idle, Paused | Cancelling) => true,
            (Cancelling, Idle) => true,
            _ => false,
        }
    }
}

impl fmt::Display for CommunicatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Idle => write!(f, "Idle"),
            Self::Streaming => write!(f, "Streaming"),
            Self::Paused => write!(f, "Paused"),
            Self::Cancelling => write!(f, "Cancelling"),
            Self::Error => write!(f, "Error"),
        }
    }
}
