//! Buffered communicator with flow control
//!
//! One tokio task per connection owns the [`StreamingEngine`]. Callers hold
//! a cheap, cloneable [`BufferedCommunicator`] handle that posts messages to
//! the task's inbox. Response lines from the connection and timer ticks are
//! posted to the same inbox, so every event is handled in arrival order.

use std::sync::Arc;
use std::time::Duration;

use gcodesend_core::{
    CommunicatorState, ConnectionError, ListenerRegistry, Result, StatusReport, Subscription,
};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::connection::{Connection, ConnectionParams};
use super::engine::{CommunicatorConfig, CommunicatorSnapshot, StreamingEngine};
use super::listener::CommunicatorListener;
use super::source::CommandSource;
use crate::firmware::FirmwareProtocol;

/// Messages handled by the worker task
enum WorkerMessage {
    Queue {
        command: String,
        line_number: Option<u32>,
    },
    Stream(Box<dyn CommandSource>),
    Pause,
    Resume,
    Cancel,
    Line(String),
    PollStatus,
    HandshakeTimeout,
    ResetTimeout(u64),
    Disconnect,
}

/// How long cancel waits for the reset banner when the handshake is disabled
const DEFAULT_RESET_TIMEOUT: Duration = Duration::from_secs(5);

struct Inner {
    tx: mpsc::UnboundedSender<WorkerMessage>,
    snapshot: Arc<RwLock<CommunicatorSnapshot>>,
    listeners: ListenerRegistry<dyn CommunicatorListener>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let _ = self.tx.send(WorkerMessage::Disconnect);
    }
}

/// Handle to a running communicator
///
/// Every method only posts a message; failures inside the worker reach
/// callers through [`CommunicatorListener::on_communicator_error`]. Methods
/// fail with [`ConnectionError::NotConnected`] once the worker has stopped.
/// The worker disconnects when the last handle is dropped.
#[derive(Clone)]
pub struct BufferedCommunicator {
    inner: Arc<Inner>,
}

impl BufferedCommunicator {
    /// Open `connection` and start the worker on the current tokio runtime
    ///
    /// Listeners registered on `listeners` before the call observe the
    /// handshake.
    pub fn connect(
        connection: Box<dyn Connection>,
        protocol: Box<dyn FirmwareProtocol>,
        params: &ConnectionParams,
        config: CommunicatorConfig,
        listeners: ListenerRegistry<dyn CommunicatorListener>,
    ) -> Result<Self> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| gcodesend_core::Error::other(format!("No tokio runtime: {}", e)))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let handshake_timeout = config.handshake_timeout();
        let poll_interval = config.status_poll_interval();

        let mut engine = StreamingEngine::new(connection, protocol, config, listeners.clone());
        let line_tx = tx.clone();
        engine.connect(
            params,
            Box::new(move |line| {
                let _ = line_tx.send(WorkerMessage::Line(line));
            }),
        )?;

        let snapshot = Arc::new(RwLock::new(engine.snapshot()));
        let task = runtime.spawn(run_worker(engine, rx, tx.clone(), Arc::clone(&snapshot)));

        if let Some(timeout) = handshake_timeout {
            let timer_tx = tx.clone();
            runtime.spawn(async move {
                tokio::time::sleep(timeout).await;
                let _ = timer_tx.send(WorkerMessage::HandshakeTimeout);
            });
        }

        if let Some(period) = poll_interval {
            let poll_tx = tx.clone();
            runtime.spawn(async move {
                let mut interval = tokio::time::interval(period);
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    interval.tick().await;
                    if poll_tx.send(WorkerMessage::PollStatus).is_err() {
                        break;
                    }
                }
            });
        }

        Ok(Self {
            inner: Arc::new(Inner {
                tx,
                snapshot,
                listeners,
                task: Mutex::new(Some(task)),
            }),
        })
    }

    /// Register a listener for communicator events
    #[must_use = "dropping the subscription unregisters the listener"]
    pub fn subscribe(&self, listener: Arc<dyn CommunicatorListener>) -> Subscription {
        self.inner.listeners.subscribe(listener)
    }

    /// Listener registry shared with the worker
    pub fn listeners(&self) -> &ListenerRegistry<dyn CommunicatorListener> {
        &self.inner.listeners
    }

    /// Latest observable state
    pub fn snapshot(&self) -> CommunicatorSnapshot {
        self.inner.snapshot.read().clone()
    }

    /// Current lifecycle state
    pub fn state(&self) -> CommunicatorState {
        self.inner.snapshot.read().state
    }

    /// Last status report received
    pub fn last_status(&self) -> Option<StatusReport> {
        self.inner.snapshot.read().last_status.clone()
    }

    /// Whether the worker is still running
    pub fn is_running(&self) -> bool {
        !self.inner.tx.is_closed()
    }

    /// Queue a single command
    pub fn send_command(&self, command: impl Into<String>) -> Result<()> {
        self.send(WorkerMessage::Queue {
            command: command.into(),
            line_number: None,
        })
    }

    /// Queue a command that belongs to a program line
    pub fn send_line(&self, command: impl Into<String>, line_number: u32) -> Result<()> {
        self.send(WorkerMessage::Queue {
            command: command.into(),
            line_number: Some(line_number),
        })
    }

    /// Stream every command from `source`
    pub fn stream(&self, source: impl CommandSource + 'static) -> Result<()> {
        self.send(WorkerMessage::Stream(Box::new(source)))
    }

    /// Stop sending; in-flight commands still complete
    pub fn pause(&self) -> Result<()> {
        self.send(WorkerMessage::Pause)
    }

    /// Resume sending
    pub fn resume(&self) -> Result<()> {
        self.send(WorkerMessage::Resume)
    }

    /// Drop everything queued and in flight
    pub fn cancel(&self) -> Result<()> {
        self.send(WorkerMessage::Cancel)
    }

    /// Close the connection and wait for the worker to stop
    pub async fn disconnect(&self) -> Result<()> {
        self.send(WorkerMessage::Disconnect)?;
        let task = self.inner.task.lock().take();
        if let Some(task) = task {
            task.await
                .map_err(|e| gcodesend_core::Error::other(format!("Worker failed: {}", e)))?;
        }
        Ok(())
    }

    fn send(&self, message: WorkerMessage) -> Result<()> {
        self.inner
            .tx
            .send(message)
            .map_err(|_| ConnectionError::NotConnected.into())
    }
}

impl std::fmt::Debug for BufferedCommunicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferedCommunicator")
            .field("snapshot", &*self.inner.snapshot.read())
            .finish()
    }
}

async fn run_worker(
    mut engine: StreamingEngine,
    mut rx: mpsc::UnboundedReceiver<WorkerMessage>,
    tx: mpsc::UnboundedSender<WorkerMessage>,
    snapshot: Arc<RwLock<CommunicatorSnapshot>>,
) {
    tracing::debug!("Communicator worker started");

    while let Some(message) = rx.recv().await {
        let result = match message {
            WorkerMessage::Queue {
                command,
                line_number,
            } => engine.queue_command(&command, line_number),
            WorkerMessage::Stream(source) => engine.stream(source),
            WorkerMessage::Pause => engine.pause(),
            WorkerMessage::Resume => engine.resume(),
            WorkerMessage::Cancel => {
                let result = engine.cancel();
                if engine.is_awaiting_reset() {
                    schedule_reset_timeout(&engine, &tx);
                }
                result
            }
            WorkerMessage::Line(line) => {
                engine.handle_line(&line);
                Ok(())
            }
            WorkerMessage::PollStatus => {
                engine.poll_status();
                Ok(())
            }
            WorkerMessage::HandshakeTimeout => {
                engine.handshake_timed_out();
                Ok(())
            }
            WorkerMessage::ResetTimeout(epoch) => {
                engine.reset_timed_out(epoch);
                Ok(())
            }
            WorkerMessage::Disconnect => {
                if let Err(e) = engine.disconnect() {
                    tracing::warn!("Error closing connection: {}", e);
                }
                *snapshot.write() = engine.snapshot();
                break;
            }
        };

        if let Err(e) = result {
            tracing::warn!("{}", e);
            engine.report_error(&e);
        }
        *snapshot.write() = engine.snapshot();

        if engine.state() == CommunicatorState::Disconnected {
            break;
        }
    }

    rx.close();
    tracing::debug!("Communicator worker stopped");
}

fn schedule_reset_timeout(engine: &StreamingEngine, tx: &mpsc::UnboundedSender<WorkerMessage>) {
    let timeout = engine
        .config()
        .handshake_timeout()
        .unwrap_or(DEFAULT_RESET_TIMEOUT);
    let epoch = engine.epoch();
    let tx = tx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        let _ = tx.send(WorkerMessage::ResetTimeout(epoch));
    });
}
