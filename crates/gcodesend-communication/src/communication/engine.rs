//! Flow-controlled streaming core
//!
//! [`StreamingEngine`] implements character-counting flow control: a command
//! is written only when its bytes fit in what is left of the controller's
//! receive buffer, and every `ok`/`error` frees the bytes of the oldest
//! in-flight command. The engine is synchronous and single-owner; the
//! [`BufferedCommunicator`](super::BufferedCommunicator) worker drives it.

use std::collections::VecDeque;
use std::time::Duration;

use gcodesend_core::{
    CapacityViolation, CommunicatorState, ConnectionError, ControllerError, ControllerStatus,
    Error, ListenerRegistry, ProtocolError, Result, StatusReport,
};
use serde::{Deserialize, Serialize};

use super::connection::{Connection, ConnectionParams, LineHandler};
use super::listener::{BufferedCommand, CommandState, CommunicatorListener};
use super::source::{CommandSource, SourceCommand};
use crate::firmware::{FirmwareProtocol, Response};

/// What to do when the controller rejects a command
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Stop the session; the communicator enters `Error`
    #[default]
    Halt,
    /// Stop sending and wait for resume
    Pause,
    /// Report the error and keep streaming
    Skip,
}

/// Communicator settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommunicatorConfig {
    /// Receive buffer size; `None` uses the firmware's value
    pub buffer_capacity: Option<usize>,
    /// Reaction to `error:` responses
    pub error_policy: ErrorPolicy,
    /// Send the firmware's soft reset when cancelling
    pub soft_reset_on_cancel: bool,
    /// Status query period in milliseconds; 0 disables polling
    pub status_poll_interval_ms: u64,
    /// Time allowed for the banner after connect; 0 skips the handshake
    pub handshake_timeout_ms: u64,
    /// Appended to every command
    pub line_terminator: String,
}

impl Default for CommunicatorConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: None,
            error_policy: ErrorPolicy::Halt,
            soft_reset_on_cancel: true,
            status_poll_interval_ms: 200,
            handshake_timeout_ms: 5_000,
            line_terminator: "\n".to_string(),
        }
    }
}

impl CommunicatorConfig {
    /// Polling period, if enabled
    pub fn status_poll_interval(&self) -> Option<Duration> {
        (self.status_poll_interval_ms > 0).then(|| Duration::from_millis(self.status_poll_interval_ms))
    }

    /// Handshake deadline, if the handshake is enabled
    pub fn handshake_timeout(&self) -> Option<Duration> {
        (self.handshake_timeout_ms > 0).then(|| Duration::from_millis(self.handshake_timeout_ms))
    }
}

/// Read-only view of the engine, mirrored by the worker after every message
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommunicatorSnapshot {
    /// Lifecycle state
    pub state: CommunicatorState,
    /// Last reported machine state
    pub controller_status: ControllerStatus,
    /// Last status report
    pub last_status: Option<StatusReport>,
    /// Bytes sent and not yet acknowledged
    pub outstanding_bytes: usize,
    /// Receive buffer size in use
    pub buffer_capacity: usize,
    /// Commands waiting to be sent
    pub queued: usize,
    /// Commands sent and awaiting a response
    pub in_flight: usize,
    /// Commands written this connection
    pub sent: u64,
    /// Commands answered this connection
    pub completed: u64,
    /// Session counter, bumped on every cancel
    pub epoch: u64,
}

/// Flow-control state machine for one connection
pub struct StreamingEngine {
    connection: Box<dyn Connection>,
    protocol: Box<dyn FirmwareProtocol>,
    config: CommunicatorConfig,
    listeners: ListenerRegistry<dyn CommunicatorListener>,
    capacity: usize,
    state: CommunicatorState,
    queue: VecDeque<BufferedCommand>,
    active: VecDeque<BufferedCommand>,
    source: Option<Box<dyn CommandSource>>,
    outstanding: usize,
    /// Lengths of commands in flight when the last session was cancelled
    stale: VecDeque<usize>,
    awaiting_reset: bool,
    epoch: u64,
    sent: u64,
    completed: u64,
    last_status: Option<StatusReport>,
}

impl StreamingEngine {
    /// Create a disconnected engine
    pub fn new(
        connection: Box<dyn Connection>,
        protocol: Box<dyn FirmwareProtocol>,
        config: CommunicatorConfig,
        listeners: ListenerRegistry<dyn CommunicatorListener>,
    ) -> Self {
        let capacity = config
            .buffer_capacity
            .unwrap_or_else(|| protocol.buffer_capacity());
        Self {
            connection,
            protocol,
            config,
            listeners,
            capacity,
            state: CommunicatorState::Disconnected,
            queue: VecDeque::new(),
            active: VecDeque::new(),
            source: None,
            outstanding: 0,
            stale: VecDeque::new(),
            awaiting_reset: false,
            epoch: 0,
            sent: 0,
            completed: 0,
            last_status: None,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> CommunicatorState {
        self.state
    }

    /// Bytes sent and not yet acknowledged
    pub fn outstanding_bytes(&self) -> usize {
        self.outstanding
    }

    /// Receive buffer size in use
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current session
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Commands waiting to be sent
    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    /// Commands awaiting a response, oldest first
    pub fn active(&self) -> impl Iterator<Item = &BufferedCommand> {
        self.active.iter()
    }

    /// Whether cancel is still waiting for the controller's reset banner
    pub fn is_awaiting_reset(&self) -> bool {
        self.awaiting_reset
    }

    /// Settings the engine was built with
    pub fn config(&self) -> &CommunicatorConfig {
        &self.config
    }

    /// Copy of the observable state
    pub fn snapshot(&self) -> CommunicatorSnapshot {
        CommunicatorSnapshot {
            state: self.state,
            controller_status: self
                .last_status
                .as_ref()
                .map(|s| s.status)
                .unwrap_or_default(),
            last_status: self.last_status.clone(),
            outstanding_bytes: self.outstanding,
            buffer_capacity: self.capacity,
            queued: self.queue.len(),
            in_flight: self.active.len(),
            sent: self.sent,
            completed: self.completed,
            epoch: self.epoch,
        }
    }

    /// Open the transport and start the handshake
    pub fn connect(&mut self, params: &ConnectionParams, on_line: LineHandler) -> Result<()> {
        match self.state {
            CommunicatorState::Disconnected | CommunicatorState::Error => {}
            _ => return Err(ConnectionError::AlreadyConnected.into()),
        }
        if self.connection.is_open() {
            self.connection.close()?;
        }

        self.reset_session();
        self.sent = 0;
        self.completed = 0;
        self.last_status = None;

        self.connection.open(params, on_line)?;
        tracing::info!(
            "Connected to {} ({}, {} byte buffer)",
            params.port,
            self.protocol.controller_type(),
            self.capacity
        );

        self.set_state(CommunicatorState::Connecting);
        if self.config.handshake_timeout().is_none() {
            self.set_state(CommunicatorState::Idle);
        }
        Ok(())
    }

    /// Close the transport and drop all pending work
    pub fn disconnect(&mut self) -> Result<()> {
        self.reset_session();
        let result = if self.connection.is_open() {
            self.connection.close()
        } else {
            Ok(())
        };
        self.set_state(CommunicatorState::Disconnected);
        result
    }

    /// Append one command to the send queue
    pub fn queue_command(&mut self, command: &str, line_number: Option<u32>) -> Result<()> {
        self.ensure_accepting("queue commands")?;
        self.push_command(command, line_number);
        self.fill();
        Ok(())
    }

    /// Stream every command of `source` after the queued ones
    pub fn stream(&mut self, source: Box<dyn CommandSource>) -> Result<()> {
        self.ensure_accepting("start streaming")?;
        if self.source.is_some() {
            return Err(self.invalid_state("start a second stream"));
        }
        self.source = Some(source);
        self.fill();
        Ok(())
    }

    /// Stop sending; in-flight commands still complete
    pub fn pause(&mut self) -> Result<()> {
        match self.state {
            CommunicatorState::Idle | CommunicatorState::Streaming => {
                self.set_state(CommunicatorState::Paused);
                Ok(())
            }
            CommunicatorState::Paused => Ok(()),
            _ => Err(self.invalid_state("pause")),
        }
    }

    /// Resume sending after a pause
    pub fn resume(&mut self) -> Result<()> {
        match self.state {
            CommunicatorState::Paused => {
                self.set_state(CommunicatorState::Streaming);
                self.fill();
                Ok(())
            }
            CommunicatorState::Idle | CommunicatorState::Streaming => Ok(()),
            _ => Err(self.invalid_state("resume")),
        }
    }

    /// Discard the queue, the source and the in-flight commands
    ///
    /// Responses still owed for discarded commands are ignored. With soft
    /// reset enabled the engine stays in `Cancelling` until the controller
    /// announces itself again.
    pub fn cancel(&mut self) -> Result<()> {
        if !self.state.is_connected() {
            return Err(self.invalid_state("cancel"));
        }
        self.set_state(CommunicatorState::Cancelling);

        let discarded = self.queue.len() + self.active.len();
        self.queue.clear();
        self.source = None;
        self.stale
            .extend(self.active.drain(..).map(|command| command.length));
        self.epoch += 1;
        tracing::info!(
            "Cancelled session, {} commands discarded, now in session {}",
            discarded,
            self.epoch
        );

        if self.config.soft_reset_on_cancel {
            if let Some(reset) = self.protocol.soft_reset() {
                if let Err(e) = self.write_bytes(reset) {
                    self.transport_failed(e);
                    return Ok(());
                }
                self.awaiting_reset = true;
                return Ok(());
            }
        }

        self.set_state(CommunicatorState::Idle);
        Ok(())
    }

    /// Give up waiting for the reset banner of session `epoch`
    pub fn reset_timed_out(&mut self, epoch: u64) {
        if !self.awaiting_reset || epoch != self.epoch {
            return;
        }
        tracing::warn!("No reset banner after cancel, assuming controller buffer is empty");
        self.finish_reset();
    }

    /// Fail the handshake if no banner arrived
    pub fn handshake_timed_out(&mut self) {
        if self.state == CommunicatorState::Connecting {
            self.protocol_failure(ProtocolError::HandshakeTimeout {
                timeout_ms: self.config.handshake_timeout_ms,
            });
        }
    }

    /// Ask the controller for a status report
    pub fn poll_status(&mut self) {
        if !self.state.is_connected() || self.awaiting_reset {
            return;
        }
        if let Some(query) = self.protocol.status_query() {
            if let Err(e) = self.write_bytes(query) {
                self.transport_failed(e);
            }
        }
    }

    /// Report an error to listeners
    pub fn report_error(&self, error: &Error) {
        self.listeners.notify(|l| l.on_communicator_error(error));
    }

    /// Handle one response line from the controller
    pub fn handle_line(&mut self, line: &str) {
        if matches!(
            self.state,
            CommunicatorState::Disconnected | CommunicatorState::Error
        ) {
            tracing::trace!("Ignoring '{}' while {}", line, self.state);
            return;
        }
        let Some(response) = self.protocol.parse_response(line) else {
            return;
        };

        match response {
            Response::Status(report) => {
                tracing::trace!("Status: {}", report.status);
                self.listeners.notify(|l| l.on_status_report(&report));
                self.last_status = Some(report);
            }
            Response::Message(text) => {
                tracing::debug!("Controller: {}", text);
            }
            Response::Banner(text) => self.handle_banner(&text),
            Response::Alarm { code, message } => {
                if self.state == CommunicatorState::Connecting {
                    self.handshake_failed(line);
                    return;
                }
                if self.awaiting_reset {
                    // GRBL raises ALARM:3 when reset interrupts motion
                    tracing::info!("ALARM:{} during reset: {}", code, message);
                    return;
                }
                tracing::error!("ALARM:{} {}", code, message);
                self.reset_session();
                self.report_error(&ControllerError::Alarm { code, message }.into());
                self.set_state(CommunicatorState::Error);
            }
            Response::Ack | Response::Error { .. } => self.handle_completion(line.trim(), response),
        }
    }

    fn handle_banner(&mut self, banner: &str) {
        if self.state == CommunicatorState::Connecting {
            tracing::info!("Controller ready: {}", banner);
            self.set_state(CommunicatorState::Idle);
            self.fill();
        } else if self.awaiting_reset {
            tracing::info!("Controller reset: {}", banner);
            self.finish_reset();
        } else if !self.active.is_empty() {
            self.protocol_failure(ProtocolError::UnexpectedResponse {
                response: banner.to_string(),
            });
        } else {
            tracing::warn!("Controller reset while idle: {}", banner);
            self.stale.clear();
            self.outstanding = 0;
        }
    }

    fn handle_completion(&mut self, raw: &str, response: Response) {
        if self.state == CommunicatorState::Connecting {
            self.handshake_failed(raw);
            return;
        }

        if let Some(length) = self.stale.pop_front() {
            self.outstanding = self.outstanding.saturating_sub(length);
            tracing::warn!("Ignoring '{}' for a cancelled command", raw);
            return;
        }
        if self.awaiting_reset {
            tracing::warn!("Ignoring '{}' while waiting for reset", raw);
            return;
        }

        let Some(mut command) = self.active.pop_front() else {
            self.protocol_failure(ProtocolError::UnexpectedResponse {
                response: raw.to_string(),
            });
            return;
        };
        self.outstanding = self.outstanding.saturating_sub(command.length);
        self.completed += 1;
        command.response = Some(raw.to_string());

        match response {
            Response::Error { code, message } => {
                command.state = CommandState::Errored;
                tracing::warn!(
                    "Command '{}' (line {:?}) failed: error:{} {}",
                    command.command,
                    command.line_number,
                    code,
                    message
                );
                self.listeners
                    .notify(|l| l.on_command_complete(&command, raw));
                self.report_error(
                    &ControllerError::CommandFailed {
                        line_number: command.line_number,
                        command: command.command.clone(),
                        code,
                        message,
                    }
                    .into(),
                );
                self.apply_error_policy();
            }
            _ => {
                command.state = CommandState::Acked;
                tracing::debug!("Acked '{}' ({} bytes outstanding)", command.command, self.outstanding);
                self.listeners
                    .notify(|l| l.on_command_complete(&command, raw));
            }
        }

        self.fill();
    }

    fn apply_error_policy(&mut self) {
        match self.config.error_policy {
            ErrorPolicy::Halt => {
                self.reset_session();
                self.set_state(CommunicatorState::Error);
            }
            ErrorPolicy::Pause => {
                if matches!(
                    self.state,
                    CommunicatorState::Idle | CommunicatorState::Streaming
                ) {
                    self.set_state(CommunicatorState::Paused);
                }
            }
            ErrorPolicy::Skip => {}
        }
    }

    /// Send as many queued commands as the controller buffer allows
    fn fill(&mut self) {
        if !matches!(
            self.state,
            CommunicatorState::Idle | CommunicatorState::Streaming
        ) {
            return;
        }

        loop {
            if self.queue.is_empty() && !self.pull_from_source() {
                break;
            }
            let Some(length) = self.queue.front().map(|c| c.length) else {
                break;
            };

            if length > self.capacity {
                if let Some(command) = self.queue.pop_front() {
                    tracing::error!(
                        "Dropping '{}': {} bytes never fit a {} byte buffer",
                        command.command,
                        length,
                        self.capacity
                    );
                }
                self.report_error(
                    &CapacityViolation {
                        requested: length,
                        outstanding: self.outstanding,
                        capacity: self.capacity,
                    }
                    .into(),
                );
                continue;
            }
            if self.outstanding + length > self.capacity {
                break;
            }

            let Some(mut command) = self.queue.pop_front() else {
                break;
            };
            let wire = format!("{}{}", command.command, self.config.line_terminator);
            if let Err(e) = self.write_bytes(wire.as_bytes()) {
                self.transport_failed(e);
                return;
            }
            command.state = CommandState::Sent;
            self.outstanding += command.length;
            self.sent += 1;
            tracing::debug!(
                "Sent '{}' ({}/{} bytes)",
                command.command,
                self.outstanding,
                self.capacity
            );
            self.listeners.notify(|l| l.on_command_sent(&command));
            self.active.push_back(command);
        }

        let busy = !self.queue.is_empty() || self.source.is_some() || !self.active.is_empty();
        self.set_state(if busy {
            CommunicatorState::Streaming
        } else {
            CommunicatorState::Idle
        });
    }

    /// Move one command from the source to the queue
    fn pull_from_source(&mut self) -> bool {
        let Some(source) = self.source.as_mut() else {
            return false;
        };
        match source.next_command() {
            Ok(Some(SourceCommand {
                command,
                line_number,
            })) => {
                self.push_command(&command, line_number);
                true
            }
            Ok(None) => {
                tracing::info!("Stream source exhausted");
                self.source = None;
                false
            }
            Err(e) => {
                tracing::error!("Stream source failed: {}", e);
                self.source = None;
                self.report_error(&e);
                false
            }
        }
    }

    fn push_command(&mut self, command: &str, line_number: Option<u32>) {
        let command = self.protocol.build_command(command);
        let length = command.len() + self.config.line_terminator.len();
        self.queue
            .push_back(BufferedCommand::new(command, line_number, length, self.epoch));
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let written = self.connection.write(bytes)?;
        if written != bytes.len() {
            return Err(ConnectionError::WriteFailed {
                reason: format!("short write: {} of {} bytes", written, bytes.len()),
            }
            .into());
        }
        Ok(())
    }

    fn finish_reset(&mut self) {
        self.awaiting_reset = false;
        self.stale.clear();
        self.outstanding = 0;
        self.set_state(CommunicatorState::Idle);
        self.fill();
    }

    fn ensure_accepting(&self, operation: &str) -> Result<()> {
        match self.state {
            CommunicatorState::Disconnected | CommunicatorState::Error => {
                Err(self.invalid_state(operation))
            }
            _ => Ok(()),
        }
    }

    fn invalid_state(&self, operation: &str) -> Error {
        ControllerError::InvalidState {
            operation: operation.to_string(),
            state: self.state.to_string(),
        }
        .into()
    }

    fn handshake_failed(&mut self, line: &str) {
        self.protocol_failure(ProtocolError::Handshake {
            reason: format!("expected banner, got '{}'", line.trim()),
        });
    }

    fn protocol_failure(&mut self, error: ProtocolError) {
        tracing::error!("Protocol failure: {}", error);
        self.reset_session();
        self.report_error(&error.into());
        self.set_state(CommunicatorState::Error);
    }

    fn transport_failed(&mut self, error: Error) {
        tracing::error!("Transport failure: {}", error);
        self.reset_session();
        if let Err(e) = self.connection.close() {
            tracing::debug!("Close after failure: {}", e);
        }
        self.report_error(&error);
        self.set_state(CommunicatorState::Disconnected);
    }

    fn reset_session(&mut self) {
        self.queue.clear();
        self.active.clear();
        self.source = None;
        self.stale.clear();
        self.outstanding = 0;
        self.awaiting_reset = false;
    }

    fn set_state(&mut self, state: CommunicatorState) {
        if self.state == state {
            return;
        }
        if !self.state.can_transition_to(state) {
            tracing::warn!("Unusual transition {} -> {}", self.state, state);
        }
        tracing::info!("Communicator {} -> {}", self.state, state);
        self.state = state;
        self.listeners
            .notify(|l| l.on_communicator_state_changed(state));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::communication::MockConnection;
    use crate::firmware::GrblProtocol;

    fn connected(capacity: usize, config: CommunicatorConfig) -> (StreamingEngine, MockConnection) {
        let mock = MockConnection::new();
        let mut engine = StreamingEngine::new(
            Box::new(mock.clone()),
            Box::new(GrblProtocol::with_capacity(capacity)),
            config,
            ListenerRegistry::new(),
        );
        engine
            .connect(&ConnectionParams::new("mock"), Box::new(|_| {}))
            .unwrap();
        engine.handle_line("Grbl 1.1h ['$' for help]");
        (engine, mock)
    }

    #[test]
    fn test_handshake() {
        let mock = MockConnection::new();
        let mut engine = StreamingEngine::new(
            Box::new(mock),
            Box::new(GrblProtocol::new()),
            CommunicatorConfig::default(),
            ListenerRegistry::new(),
        );
        engine
            .connect(&ConnectionParams::new("mock"), Box::new(|_| {}))
            .unwrap();
        assert_eq!(engine.state(), CommunicatorState::Connecting);
        engine.handle_line("[MSG:booting]");
        assert_eq!(engine.state(), CommunicatorState::Connecting);
        engine.handle_line("ok");
        assert_eq!(engine.state(), CommunicatorState::Error);
    }

    #[test]
    fn test_handshake_timeout() {
        let mock = MockConnection::new();
        let mut engine = StreamingEngine::new(
            Box::new(mock),
            Box::new(GrblProtocol::new()),
            CommunicatorConfig::default(),
            ListenerRegistry::new(),
        );
        engine
            .connect(&ConnectionParams::new("mock"), Box::new(|_| {}))
            .unwrap();
        engine.handshake_timed_out();
        assert_eq!(engine.state(), CommunicatorState::Error);
    }

    #[test]
    fn test_skipped_handshake() {
        let config = CommunicatorConfig {
            handshake_timeout_ms: 0,
            ..CommunicatorConfig::default()
        };
        let mock = MockConnection::new();
        let mut engine = StreamingEngine::new(
            Box::new(mock),
            Box::new(GrblProtocol::new()),
            config,
            ListenerRegistry::new(),
        );
        engine
            .connect(&ConnectionParams::new("mock"), Box::new(|_| {}))
            .unwrap();
        assert_eq!(engine.state(), CommunicatorState::Idle);
    }

    #[test]
    fn test_fills_to_capacity() {
        let (mut engine, mock) = connected(10, CommunicatorConfig::default());
        for _ in 0..3 {
            engine.queue_command("G1X", None).unwrap();
        }
        assert_eq!(mock.sent_commands(), vec!["G1X", "G1X"]);
        assert_eq!(engine.outstanding_bytes(), 8);
        assert_eq!(engine.queued_len(), 1);
        assert_eq!(engine.state(), CommunicatorState::Streaming);

        engine.handle_line("ok");
        assert_eq!(mock.sent_commands().len(), 3);
        assert_eq!(engine.outstanding_bytes(), 8);

        engine.handle_line("ok");
        engine.handle_line("ok");
        assert_eq!(engine.outstanding_bytes(), 0);
        assert_eq!(engine.state(), CommunicatorState::Idle);
    }

    #[test]
    fn test_oversized_command_dropped() {
        let (mut engine, mock) = connected(10, CommunicatorConfig::default());
        engine.queue_command("G1 X100 Y100", None).unwrap();
        engine.queue_command("G0", None).unwrap();
        assert_eq!(mock.sent_commands(), vec!["G0"]);
    }

    #[test]
    fn test_unexpected_ack() {
        let (mut engine, _mock) = connected(10, CommunicatorConfig::default());
        engine.handle_line("ok");
        assert_eq!(engine.state(), CommunicatorState::Error);
        assert!(engine.queue_command("G0", None).is_err());
    }

    #[test]
    fn test_error_policies() {
        let (mut engine, _mock) = connected(127, CommunicatorConfig::default());
        engine.queue_command("G0 X1", Some(1)).unwrap();
        engine.handle_line("error:20");
        assert_eq!(engine.state(), CommunicatorState::Error);

        let config = CommunicatorConfig {
            error_policy: ErrorPolicy::Pause,
            ..CommunicatorConfig::default()
        };
        let (mut engine, _mock) = connected(127, config);
        engine.queue_command("G0 X1", Some(1)).unwrap();
        engine.queue_command("G0 X2", Some(2)).unwrap();
        engine.handle_line("error:20");
        assert_eq!(engine.state(), CommunicatorState::Paused);

        let config = CommunicatorConfig {
            error_policy: ErrorPolicy::Skip,
            ..CommunicatorConfig::default()
        };
        let (mut engine, _mock) = connected(127, config);
        engine.queue_command("G0 X1", Some(1)).unwrap();
        engine.handle_line("error:20");
        assert_eq!(engine.state(), CommunicatorState::Idle);
    }

    #[test]
    fn test_alarm_enters_error() {
        let (mut engine, _mock) = connected(127, CommunicatorConfig::default());
        engine.queue_command("G0 X1", None).unwrap();
        engine.handle_line("ALARM:1");
        assert_eq!(engine.state(), CommunicatorState::Error);
        assert_eq!(engine.outstanding_bytes(), 0);
    }

    #[test]
    fn test_status_does_not_complete() {
        let (mut engine, _mock) = connected(127, CommunicatorConfig::default());
        engine.queue_command("G0 X1", None).unwrap();
        engine.handle_line("<Run|MPos:1.000,0.000,0.000|FS:0,0>");
        assert_eq!(engine.active().count(), 1);
        assert_eq!(engine.snapshot().controller_status, ControllerStatus::Run);
    }

    #[test]
    fn test_cancel_with_soft_reset() {
        let (mut engine, mock) = connected(127, CommunicatorConfig::default());
        engine.queue_command("G0 X1", None).unwrap();
        engine.queue_command("G0 X2", None).unwrap();
        engine.cancel().unwrap();
        assert_eq!(engine.state(), CommunicatorState::Cancelling);
        assert_eq!(mock.writes().last().unwrap(), &vec![0x18u8]);

        engine.queue_command("G0 X0", None).unwrap();
        assert_eq!(mock.sent_commands().len(), 2);
        engine.handle_line("ok");
        assert_eq!(engine.state(), CommunicatorState::Cancelling);

        engine.handle_line("Grbl 1.1h ['$' for help]");
        assert_eq!(engine.state(), CommunicatorState::Streaming);
        assert_eq!(mock.sent_commands().last().unwrap(), "G0 X0");
        assert_eq!(engine.active().next().unwrap().epoch, 1);
    }

    #[test]
    fn test_reset_alarm_mid_motion_is_not_fatal() {
        let (mut engine, mock) = connected(127, CommunicatorConfig::default());
        engine.queue_command("G1 X100 F10", None).unwrap();
        engine.queue_command("G1 Y100", None).unwrap();
        engine.cancel().unwrap();

        engine.handle_line("ALARM:3");
        assert_eq!(engine.state(), CommunicatorState::Cancelling);
        assert!(engine.is_awaiting_reset());

        engine.handle_line("Grbl 1.1h ['$' for help]");
        assert_eq!(engine.state(), CommunicatorState::Idle);
        assert_eq!(engine.outstanding_bytes(), 0);

        engine.queue_command("G0 X0", None).unwrap();
        assert_eq!(mock.sent_commands().last().unwrap(), "G0 X0");
    }

    #[test]
    fn test_invalid_operations() {
        let mock = MockConnection::new();
        let mut engine = StreamingEngine::new(
            Box::new(mock),
            Box::new(GrblProtocol::new()),
            CommunicatorConfig::default(),
            ListenerRegistry::new(),
        );
        assert!(engine.pause().is_err());
        assert!(engine.cancel().is_err());
        assert!(engine.queue_command("G0", None).is_err());
    }

    #[test]
    fn test_write_failure_disconnects() {
        let (mut engine, mock) = connected(127, CommunicatorConfig::default());
        mock.set_fail_writes(true);
        engine.queue_command("G0 X1", None).unwrap();
        assert_eq!(engine.state(), CommunicatorState::Disconnected);
    }
}
