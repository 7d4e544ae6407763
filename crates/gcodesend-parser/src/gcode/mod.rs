//! G-Code parser and state machine
//!
//! This module provides:
//! - Tokenizing and modal state tracking
//! - The command processor framework and built-in processors
//! - The line parser producing per-command metadata
//! - Persisted stream files

pub mod arc;
pub mod command;
pub(crate) mod motion;
pub mod parser;
pub mod pipeline;
pub mod processors;
pub mod rotation;
pub mod run_from;
pub mod state;
pub mod stream;

pub use arc::{ArcExpander, ArcGeometry};
pub use command::*;
pub use parser::*;
pub use pipeline::*;
pub use processors::*;
pub use rotation::RotationExpander;
pub use run_from::RunFromProcessor;
pub use state::{
    format_number, is_positional, tokenize, DistanceMode, FeedRateMode, GcodeState, MotionMode,
    Plane, SpindleState, Word,
};
pub use stream::{GcodeStreamReader, GcodeStreamWriter, StreamHeader};
