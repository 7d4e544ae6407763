//! Utilities for working with G-code files

pub mod file_io;

pub use file_io::{preprocess_file, preprocess_reader, ParseErrorPolicy, PreprocessStats};
