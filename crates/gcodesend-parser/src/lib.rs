//! # gcodesend parser
//!
//! G-code preprocessing: tokenizing, modal state tracking, the command
//! processor pipeline, and persisted stream files.

pub mod gcode;
pub mod utils;

pub use gcode::{
    ArcExpander, CommandLengthProcessor, CommandProcessor, CommandProcessorList,
    CommentProcessor, DecimalProcessor, EmptyLineRemoverProcessor, GcodeCommand, GcodeMeta,
    GcodeParser, GcodeState, GcodeStreamReader, GcodeStreamWriter, M30Processor, ParseResult,
    PatternRemover, ProcessorConfig, ProcessorRegistry, RotationExpander, RunFromProcessor,
    WhitespaceProcessor,
};

pub use utils::{preprocess_file, preprocess_reader, ParseErrorPolicy, PreprocessStats};
