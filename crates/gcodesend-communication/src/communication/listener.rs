//! Communicator events and the commands they describe

use gcodesend_core::{CommunicatorState, Error, StatusReport};
use serde::{Deserialize, Serialize};

/// Lifecycle of a command in the buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandState {
    /// Command is queued and waiting to be sent
    Queued,
    /// Command has been written to the controller
    Sent,
    /// Controller accepted the command
    Acked,
    /// Controller rejected the command
    Errored,
}

/// A command in the send queue or in flight
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferedCommand {
    /// The command text, without terminator
    pub command: String,
    /// Source line, when the command came from a program
    pub line_number: Option<u32>,
    /// Bytes the command occupies in the controller buffer, terminator included
    pub length: usize,
    /// Current state
    pub state: CommandState,
    /// Session the command belongs to; bumped on every cancel
    pub epoch: u64,
    /// Controller response once completed
    pub response: Option<String>,
}

impl BufferedCommand {
    /// Create a queued command
    pub fn new(command: impl Into<String>, line_number: Option<u32>, length: usize, epoch: u64) -> Self {
        Self {
            command: command.into(),
            line_number,
            length,
            state: CommandState::Queued,
            epoch,
            response: None,
        }
    }

    /// Whether the controller has responded
    pub fn is_done(&self) -> bool {
        matches!(self.state, CommandState::Acked | CommandState::Errored)
    }
}

/// Receives communicator events
///
/// All methods default to no-ops. Callbacks run on the communicator's
/// worker and must not block.
pub trait CommunicatorListener: Send + Sync {
    /// A command was written to the controller
    fn on_command_sent(&self, _command: &BufferedCommand) {}

    /// The controller answered a command; `response` is the raw line
    fn on_command_complete(&self, _command: &BufferedCommand, _response: &str) {}

    /// The communicator moved to a new state
    fn on_communicator_state_changed(&self, _state: CommunicatorState) {}

    /// Something went wrong; fatal errors are followed by a state change
    fn on_communicator_error(&self, _error: &Error) {}

    /// The controller reported its status
    fn on_status_report(&self, _report: &StatusReport) {}
}
