//! Flow-controlled communication with a controller
//!
//! - [`Connection`]: the byte link (serial, TCP, ...) supplied by the caller
//! - [`StreamingEngine`]: synchronous character-counting flow control
//! - [`BufferedCommunicator`]: worker task and handle around the engine
//! - [`CommandSource`]: lazily streamed programs

pub mod buffered;
pub mod connection;
pub mod engine;
pub mod listener;
pub mod mock;
pub mod source;

pub use buffered::BufferedCommunicator;
pub use connection::{Connection, ConnectionParams, LineHandler};
pub use engine::{CommunicatorConfig, CommunicatorSnapshot, ErrorPolicy, StreamingEngine};
pub use listener::{BufferedCommand, CommandState, CommunicatorListener};
pub use mock::MockConnection;
pub use source::{CommandSource, SourceCommand, StreamSource, VecSource};
