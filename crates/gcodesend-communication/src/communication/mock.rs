//! In-memory connection for tests and dry runs

use std::sync::Arc;

use gcodesend_core::{ConnectionError, Result};
use parking_lot::Mutex;

use super::connection::{Connection, ConnectionParams, LineHandler};

#[derive(Default)]
struct MockState {
    open: bool,
    params: Option<ConnectionParams>,
    on_line: Option<LineHandler>,
    writes: Vec<Vec<u8>>,
    fail_writes: bool,
    /// Lines not yet handed to the handler
    pending: Vec<String>,
}

/// Connection that records writes and lets the caller play the controller
///
/// Clones share the same state, so a test keeps one clone to inject
/// responses while the communicator owns the other.
#[derive(Clone, Default)]
pub struct MockConnection {
    state: Arc<Mutex<MockState>>,
}

impl MockConnection {
    /// Create a closed mock connection
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a response line as if the controller had sent it
    ///
    /// Lines pushed before the connection is opened are delivered on open.
    pub fn push_line(&self, line: &str) {
        self.state.lock().pending.push(line.to_string());
        self.deliver_pending();
    }

    fn deliver_pending(&self) {
        loop {
            let (mut handler, lines) = {
                let mut state = self.state.lock();
                if state.pending.is_empty() {
                    return;
                }
                let Some(handler) = state.on_line.take() else {
                    return;
                };
                (handler, std::mem::take(&mut state.pending))
            };
            for line in lines {
                handler(line);
            }
            let mut state = self.state.lock();
            if state.open && state.on_line.is_none() {
                state.on_line = Some(handler);
            }
        }
    }

    /// Every write, in order
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.state.lock().writes.clone()
    }

    /// Terminated writes as text, terminators removed
    pub fn sent_commands(&self) -> Vec<String> {
        self.state
            .lock()
            .writes
            .iter()
            .filter(|w| w.ends_with(b"\n"))
            .map(|w| String::from_utf8_lossy(w).trim_end().to_string())
            .collect()
    }

    /// Forget recorded writes
    pub fn clear_writes(&self) {
        self.state.lock().writes.clear();
    }

    /// Make subsequent writes fail
    pub fn set_fail_writes(&self, fail: bool) {
        self.state.lock().fail_writes = fail;
    }

    /// Parameters the connection was opened with
    pub fn params(&self) -> Option<ConnectionParams> {
        self.state.lock().params.clone()
    }
}

impl Connection for MockConnection {
    fn open(&mut self, params: &ConnectionParams, on_line: LineHandler) -> Result<()> {
        {
            let mut state = self.state.lock();
            if state.open {
                return Err(ConnectionError::AlreadyConnected.into());
            }
            state.open = true;
            state.params = Some(params.clone());
            state.on_line = Some(on_line);
        }
        self.deliver_pending();
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<usize> {
        let mut state = self.state.lock();
        if !state.open {
            return Err(ConnectionError::NotConnected.into());
        }
        if state.fail_writes {
            return Err(ConnectionError::WriteFailed {
                reason: "mock write failure".to_string(),
            }
            .into());
        }
        state.writes.push(bytes.to_vec());
        Ok(bytes.len())
    }

    fn close(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        state.open = false;
        state.on_line = None;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.state.lock().open
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_writes_and_delivers_lines() {
        let mock = MockConnection::new();
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();

        let mut conn = mock.clone();
        conn.open(
            &ConnectionParams::new("mock"),
            Box::new(move |line| sink.lock().push(line)),
        )
        .unwrap();
        conn.write(b"G0 X1\n").unwrap();
        conn.write(b"?").unwrap();
        mock.push_line("ok");

        assert_eq!(mock.sent_commands(), vec!["G0 X1"]);
        assert_eq!(mock.writes().len(), 2);
        assert_eq!(*received.lock(), vec!["ok".to_string()]);
    }

    #[test]
    fn test_write_failures() {
        let mut conn = MockConnection::new();
        assert!(conn.write(b"x").is_err());
        conn.open(&ConnectionParams::default(), Box::new(|_| {})).unwrap();
        conn.set_fail_writes(true);
        assert!(conn.write(b"x").is_err());
    }

    #[test]
    fn test_lines_before_open_are_buffered() {
        let mock = MockConnection::new();
        mock.push_line("Grbl 1.1h ['$' for help]");
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        let mut conn = mock.clone();
        conn.open(
            &ConnectionParams::default(),
            Box::new(move |line| sink.lock().push(line)),
        )
        .unwrap();
        assert_eq!(received.lock().len(), 1);
    }
}
