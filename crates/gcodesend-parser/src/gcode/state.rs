//! Modal G-code state and line tokenizer

use gcodesend_core::{Axis, GcodeError, Position, Units};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One letter/number word of a G-code line
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Word {
    /// Upper-case word letter
    pub letter: char,
    /// Numeric value
    pub value: f64,
}

impl Word {
    /// Create a word, normalising the letter to upper case
    pub fn new(letter: char, value: f64) -> Self {
        Self {
            letter: letter.to_ascii_uppercase(),
            value,
        }
    }

    /// Value in tenths, so `G90.1` compares as 901 and `G1` as 10
    pub fn code(&self) -> i64 {
        (self.value * 10.0).round() as i64
    }

    /// Whether this word is `letter` with the given code in tenths
    pub fn is(&self, letter: char, code_tenths: i64) -> bool {
        self.letter == letter && self.code() == code_tenths
    }

    /// The axis this word addresses, if any
    pub fn axis(&self) -> Option<Axis> {
        Axis::from_letter(self.letter)
    }
}

impl fmt::Display for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.letter, self.value)
    }
}

/// Split a line into words
///
/// `(...)` and `;` comments are stripped, as is the `%` program delimiter.
/// Controller system commands (lines starting with `$`) carry no words.
pub fn tokenize(text: &str) -> Result<Vec<Word>, GcodeError> {
    if text.trim_start().starts_with('$') {
        return Ok(Vec::new());
    }

    let mut words = Vec::new();
    let mut chars = text.char_indices().peekable();

    while let Some((start, ch)) = chars.next() {
        match ch {
            c if c.is_whitespace() || c == '%' => {}
            '(' => {
                // An unterminated comment runs to the end of the line
                for (_, c) in chars.by_ref() {
                    if c == ')' {
                        break;
                    }
                }
            }
            ';' => break,
            c if c.is_ascii_alphabetic() => {
                while chars.peek().is_some_and(|(_, c)| *c == ' ' || *c == '\t') {
                    chars.next();
                }
                let mut number = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_ascii_digit() || matches!(c, '.' | '-' | '+') {
                        number.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if number.is_empty() {
                    return Err(GcodeError::syntax(
                        text,
                        format!("missing value for '{}'", c.to_ascii_uppercase()),
                    ));
                }
                let value: f64 = number.parse().map_err(|_| {
                    GcodeError::syntax(text, format!("malformed number '{}'", number))
                })?;
                words.push(Word::new(c, value));
            }
            other => {
                return Err(GcodeError::syntax(
                    text,
                    format!("unexpected character '{}' at column {}", other, start + 1),
                ));
            }
        }
    }

    Ok(words)
}

/// Render a number the way commands are written back out
///
/// Rounds to `precision` decimals and drops trailing zeros.
pub fn format_number(value: f64, precision: usize) -> String {
    let mut text = format!("{:.*}", precision, value);
    if text.contains('.') {
        while text.ends_with('0') {
            text.pop();
        }
        if text.ends_with('.') {
            text.pop();
        }
    }
    if text == "-0" {
        text = "0".to_string();
    }
    text
}

/// Whether the words describe a move of at least one axis
///
/// Axis words under G92 or G10 set offsets and do not move the machine.
pub fn is_positional(words: &[Word]) -> bool {
    let offset_only = words
        .iter()
        .any(|w| w.is('G', 920) || w.is('G', 100));
    !offset_only && words.iter().any(|w| w.axis().is_some())
}

/// Motion mode, modal group 1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum MotionMode {
    /// G0 rapid traverse
    #[default]
    Rapid,
    /// G1 linear feed
    Linear,
    /// G2 clockwise arc
    ArcCw,
    /// G3 counter-clockwise arc
    ArcCcw,
}

impl MotionMode {
    /// G word that selects this mode
    pub fn gcode(self) -> &'static str {
        match self {
            Self::Rapid => "G0",
            Self::Linear => "G1",
            Self::ArcCw => "G2",
            Self::ArcCcw => "G3",
        }
    }

    /// Whether this is an arc mode
    pub fn is_arc(self) -> bool {
        matches!(self, Self::ArcCw | Self::ArcCcw)
    }

    fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Rapid),
            10 => Some(Self::Linear),
            20 => Some(Self::ArcCw),
            30 => Some(Self::ArcCcw),
            _ => None,
        }
    }

    /// Motion mode selected by `words`, if they contain one
    pub fn from_words(words: &[Word]) -> Option<Self> {
        words
            .iter()
            .filter(|w| w.letter == 'G')
            .filter_map(|w| Self::from_code(w.code()))
            .last()
    }
}

/// Arc plane, modal group 2
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Plane {
    /// G17
    #[default]
    XY,
    /// G18
    ZX,
    /// G19
    YZ,
}

impl Plane {
    /// G word that selects this plane
    pub fn gcode(self) -> &'static str {
        match self {
            Self::XY => "G17",
            Self::ZX => "G18",
            Self::YZ => "G19",
        }
    }

    /// The two in-plane axes, in rotation order, followed by the normal axis
    pub fn axes(self) -> (Axis, Axis, Axis) {
        match self {
            Self::XY => (Axis::X, Axis::Y, Axis::Z),
            Self::ZX => (Axis::Z, Axis::X, Axis::Y),
            Self::YZ => (Axis::Y, Axis::Z, Axis::X),
        }
    }

    /// Centre offset letters matching [`Plane::axes`]
    pub fn offset_letters(self) -> (char, char) {
        match self {
            Self::XY => ('I', 'J'),
            Self::ZX => ('K', 'I'),
            Self::YZ => ('J', 'K'),
        }
    }
}

/// Distance mode for axis words (G90/G91) or arc centres (G90.1/G91.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DistanceMode {
    /// Values are absolute coordinates
    Absolute,
    /// Values are offsets from the current point
    Incremental,
}

/// Feed rate interpretation, modal group 5
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum FeedRateMode {
    /// G93
    InverseTime,
    /// G94
    #[default]
    UnitsPerMinute,
    /// G95
    UnitsPerRevolution,
}

impl FeedRateMode {
    /// G word that selects this mode
    pub fn gcode(self) -> &'static str {
        match self {
            Self::InverseTime => "G93",
            Self::UnitsPerMinute => "G94",
            Self::UnitsPerRevolution => "G95",
        }
    }
}

/// Spindle direction (M3/M4/M5)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SpindleState {
    /// M5
    #[default]
    Off,
    /// M3
    Clockwise,
    /// M4
    CounterClockwise,
}

impl SpindleState {
    /// M word that selects this state
    pub fn mcode(self) -> &'static str {
        match self {
            Self::Off => "M5",
            Self::Clockwise => "M3",
            Self::CounterClockwise => "M4",
        }
    }
}

/// Modal interpreter state
///
/// Reflects the machine after the last applied command. The parser owns one
/// per session and mutates it in place.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GcodeState {
    /// Position after the last command, in `units`
    pub current_point: Position,
    /// Motion mode - Group 1 (G0, G1, G2, G3)
    pub motion_mode: MotionMode,
    /// Plane selection - Group 2 (G17, G18, G19)
    pub plane: Plane,
    /// Units - Group 6 (G20, G21)
    pub units: Units,
    /// Distance mode - Group 3 (G90, G91)
    pub distance_mode: DistanceMode,
    /// Arc centre distance mode (G90.1, G91.1)
    pub arc_distance_mode: DistanceMode,
    /// Feed rate mode - Group 5 (G93, G94, G95)
    pub feed_rate_mode: FeedRateMode,
    /// Work coordinate system - Group 12 (54 through 59)
    pub coordinate_system: u8,
    /// Current feed rate (F value)
    pub feed_rate: f64,
    /// Current spindle speed (S value)
    pub spindle_speed: f64,
    /// Spindle direction
    pub spindle: SpindleState,
    /// Tool number (T value)
    pub tool_number: u32,
}

impl Default for GcodeState {
    fn default() -> Self {
        Self {
            current_point: Position::new(Units::MM),
            motion_mode: MotionMode::Rapid,
            plane: Plane::XY,
            units: Units::MM,
            distance_mode: DistanceMode::Absolute,
            arc_distance_mode: DistanceMode::Incremental,
            feed_rate_mode: FeedRateMode::UnitsPerMinute,
            coordinate_system: 54,
            feed_rate: 0.0,
            spindle_speed: 0.0,
            spindle: SpindleState::Off,
            tool_number: 0,
        }
    }
}

impl GcodeState {
    /// Create a new G-Code state with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether G21 is active
    pub fn is_metric(&self) -> bool {
        self.units == Units::MM
    }

    /// Whether G90 is active
    pub fn is_absolute(&self) -> bool {
        self.distance_mode == DistanceMode::Absolute
    }

    /// Update the state with one line's words
    ///
    /// Unknown codes are ignored.
    pub fn apply(&mut self, words: &[Word]) {
        let mut set_position = false;
        let mut machine_coordinates = false;
        let mut return_home = false;

        for word in words {
            match word.letter {
                'G' => match word.code() {
                    0 | 10 | 20 | 30 => {
                        if let Some(mode) = MotionMode::from_code(word.code()) {
                            self.motion_mode = mode;
                        }
                    }
                    170 => self.plane = Plane::XY,
                    180 => self.plane = Plane::ZX,
                    190 => self.plane = Plane::YZ,
                    200 => self.set_units(Units::INCH),
                    210 => self.set_units(Units::MM),
                    280 | 300 => return_home = true,
                    530 => machine_coordinates = true,
                    540..=590 if word.code() % 10 == 0 => {
                        self.coordinate_system = (word.code() / 10) as u8;
                    }
                    900 => self.distance_mode = DistanceMode::Absolute,
                    910 => self.distance_mode = DistanceMode::Incremental,
                    901 => self.arc_distance_mode = DistanceMode::Absolute,
                    911 => self.arc_distance_mode = DistanceMode::Incremental,
                    920 => set_position = true,
                    930 => self.feed_rate_mode = FeedRateMode::InverseTime,
                    940 => self.feed_rate_mode = FeedRateMode::UnitsPerMinute,
                    950 => self.feed_rate_mode = FeedRateMode::UnitsPerRevolution,
                    _ => {}
                },
                'M' => match word.code() {
                    30 => self.spindle = SpindleState::Clockwise,
                    40 => self.spindle = SpindleState::CounterClockwise,
                    50 | 20 | 300 => self.spindle = SpindleState::Off,
                    _ => {}
                },
                'F' => self.feed_rate = word.value,
                'S' => self.spindle_speed = word.value,
                'T' if word.value >= 0.0 => self.tool_number = word.value as u32,
                _ => {}
            }
        }

        // Reference returns travel to a stored point we do not track
        if return_home {
            return;
        }

        let axes = || words.iter().filter_map(|w| w.axis().map(|a| (a, w.value)));

        if set_position {
            for (axis, value) in axes() {
                self.current_point.set(axis, value);
            }
            return;
        }

        if words.iter().any(|w| w.is('G', 100)) {
            return;
        }

        let incremental = self.distance_mode == DistanceMode::Incremental && !machine_coordinates;
        for (axis, value) in axes() {
            let target = if incremental {
                self.current_point.get(axis) + value
            } else {
                value
            };
            self.current_point.set(axis, target);
        }
    }

    /// The state that would result from applying `words`
    pub fn after(&self, words: &[Word]) -> GcodeState {
        let mut next = *self;
        next.apply(words);
        next
    }

    fn set_units(&mut self, units: Units) {
        if self.units != units {
            self.current_point = self.current_point.convert_to(units);
            self.units = units;
        }
    }
}
