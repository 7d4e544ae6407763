use std::sync::Arc;
use std::time::Duration;

use gcodesend_communication::firmware::{GrblProtocol, TinyGProtocol};
use gcodesend_communication::{
    BufferedCommand, BufferedCommunicator, CommunicatorConfig, CommunicatorListener,
    ConnectionParams, MockConnection, VecSource,
};
use gcodesend_core::{
    CommunicatorState, ConnectionError, ControllerStatus, Error, ListenerRegistry, StatusReport,
};
use parking_lot::Mutex;

#[derive(Default)]
struct Recorder {
    states: Mutex<Vec<CommunicatorState>>,
    sent: Mutex<Vec<String>>,
    completed: Mutex<Vec<String>>,
    errors: Mutex<Vec<String>>,
    reports: Mutex<Vec<StatusReport>>,
}

impl CommunicatorListener for Recorder {
    fn on_command_sent(&self, command: &BufferedCommand) {
        self.sent.lock().push(command.command.clone());
    }

    fn on_command_complete(&self, command: &BufferedCommand, _response: &str) {
        self.completed.lock().push(command.command.clone());
    }

    fn on_communicator_state_changed(&self, state: CommunicatorState) {
        self.states.lock().push(state);
    }

    fn on_communicator_error(&self, error: &Error) {
        self.errors.lock().push(error.to_string());
    }

    fn on_status_report(&self, report: &StatusReport) {
        self.reports.lock().push(report.clone());
    }
}

async fn wait_for(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

fn quiet_config() -> CommunicatorConfig {
    CommunicatorConfig {
        status_poll_interval_ms: 0,
        ..CommunicatorConfig::default()
    }
}

fn start(
    capacity: usize,
    config: CommunicatorConfig,
) -> (BufferedCommunicator, MockConnection, Arc<Recorder>) {
    let mock = MockConnection::new();
    let listeners = ListenerRegistry::<dyn CommunicatorListener>::new();
    let recorder = Arc::new(Recorder::default());
    listeners.subscribe(recorder.clone()).detach();

    let communicator = BufferedCommunicator::connect(
        Box::new(mock.clone()),
        Box::new(GrblProtocol::with_capacity(capacity)),
        &ConnectionParams::new("/dev/ttyMOCK"),
        config,
        listeners,
    )
    .unwrap();
    (communicator, mock, recorder)
}

#[tokio::test]
async fn test_handshake_then_stream() {
    let (comm, mock, recorder) = start(20, quiet_config());
    assert_eq!(comm.state(), CommunicatorState::Connecting);
    assert_eq!(mock.params().unwrap().port, "/dev/ttyMOCK");

    mock.push_line("Grbl 1.1h ['$' for help]");
    wait_for(|| comm.state() == CommunicatorState::Idle).await;

    let lines = ["G21", "G90", "G0 X0 Y0", "G1 X50 F500", "G1 Y50", "M5"];
    comm.stream(VecSource::from_lines(lines)).unwrap();

    let mut acked = 0;
    while acked < lines.len() {
        wait_for(|| mock.sent_commands().len() > acked).await;
        mock.push_line("ok");
        acked += 1;
    }
    wait_for(|| comm.snapshot().completed == lines.len() as u64).await;
    wait_for(|| comm.state() == CommunicatorState::Idle).await;

    assert_eq!(mock.sent_commands(), lines);
    assert_eq!(*recorder.completed.lock(), lines);
    assert_eq!(*recorder.sent.lock(), lines);
    assert_eq!(comm.snapshot().outstanding_bytes, 0);

    let states = recorder.states.lock().clone();
    assert_eq!(states[0], CommunicatorState::Connecting);
    assert_eq!(states[1], CommunicatorState::Idle);
    assert!(states.contains(&CommunicatorState::Streaming));
}

#[tokio::test]
async fn test_handshake_rejects_ack_before_banner() {
    let (comm, mock, recorder) = start(127, quiet_config());
    mock.push_line("ok");
    wait_for(|| comm.state() == CommunicatorState::Error).await;
    assert!(recorder.errors.lock()[0].contains("Handshake"));
}

#[tokio::test]
async fn test_handshake_timeout() {
    let config = CommunicatorConfig {
        handshake_timeout_ms: 20,
        ..quiet_config()
    };
    let (comm, _mock, recorder) = start(127, config);
    wait_for(|| comm.state() == CommunicatorState::Error).await;
    assert!(recorder.errors.lock()[0].contains("timed out"));
}

#[tokio::test]
async fn test_status_polling() {
    let config = CommunicatorConfig {
        status_poll_interval_ms: 10,
        ..CommunicatorConfig::default()
    };
    let (comm, mock, recorder) = start(127, config);
    mock.push_line("Grbl 1.1h ['$' for help]");
    wait_for(|| comm.state() == CommunicatorState::Idle).await;

    wait_for(|| mock.writes().iter().any(|w| w.as_slice() == b"?")).await;
    mock.push_line("<Idle|MPos:1.000,2.000,3.000|FS:0,0>");
    wait_for(|| comm.last_status().is_some()).await;

    assert_eq!(comm.snapshot().controller_status, ControllerStatus::Idle);
    assert_eq!(recorder.reports.lock()[0].machine_pos.unwrap().y, 2.0);
}

#[tokio::test]
async fn test_cancel_soft_resets_and_waits_for_banner() {
    let (comm, mock, recorder) = start(127, quiet_config());
    mock.push_line("Grbl 1.1h ['$' for help]");
    wait_for(|| comm.state() == CommunicatorState::Idle).await;

    comm.send_command("G1 X100 F10").unwrap();
    comm.send_command("G1 Y100").unwrap();
    wait_for(|| mock.sent_commands().len() == 2).await;

    comm.cancel().unwrap();
    wait_for(|| comm.state() == CommunicatorState::Cancelling).await;
    assert!(mock.writes().iter().any(|w| w.as_slice() == b"\x18"));
    assert_eq!(comm.snapshot().epoch, 1);

    mock.push_line("ok");
    mock.push_line("Grbl 1.1h ['$' for help]");
    wait_for(|| comm.state() == CommunicatorState::Idle).await;
    assert!(recorder.completed.lock().is_empty());
    assert_eq!(comm.snapshot().outstanding_bytes, 0);
}

#[tokio::test]
async fn test_alarm_halts_stream() {
    let (comm, mock, recorder) = start(127, quiet_config());
    mock.push_line("Grbl 1.1h ['$' for help]");
    wait_for(|| comm.state() == CommunicatorState::Idle).await;

    comm.send_line("G1 X-500 F1000", 7).unwrap();
    wait_for(|| mock.sent_commands().len() == 1).await;
    mock.push_line("ALARM:1");
    wait_for(|| comm.state() == CommunicatorState::Error).await;
    assert!(recorder.errors.lock()[0].contains("Alarm: 1"));

    // The worker keeps running; new work is refused until reconnect
    comm.send_command("G0 X0").unwrap();
    wait_for(|| recorder.errors.lock().len() == 2).await;
    assert_eq!(mock.sent_commands().len(), 1);
}

#[tokio::test]
async fn test_disconnect_stops_worker() {
    let (comm, mock, _recorder) = start(127, quiet_config());
    mock.push_line("Grbl 1.1h ['$' for help]");
    wait_for(|| comm.state() == CommunicatorState::Idle).await;

    let other = comm.clone();
    comm.disconnect().await.unwrap();
    assert_eq!(other.state(), CommunicatorState::Disconnected);
    assert!(!other.is_running());
    assert!(matches!(
        other.pause(),
        Err(Error::Connection(ConnectionError::NotConnected))
    ));
}

#[tokio::test]
async fn test_tinyg_json_stream() {
    let mock = MockConnection::new();
    let listeners = ListenerRegistry::<dyn CommunicatorListener>::new();
    let comm = BufferedCommunicator::connect(
        Box::new(mock.clone()),
        Box::new(TinyGProtocol::tinyg()),
        &ConnectionParams::new("mock"),
        quiet_config(),
        listeners,
    )
    .unwrap();
    assert_eq!(comm.snapshot().buffer_capacity, 64);

    mock.push_line(r#"{"r":{"fv":0.97,"msg":"SYSTEM READY"},"f":[1,0,0]}"#);
    wait_for(|| comm.state() == CommunicatorState::Idle).await;

    comm.send_command("G0 X1").unwrap();
    wait_for(|| mock.sent_commands().len() == 1).await;
    mock.push_line(r#"{"r":{},"f":[1,0,6]}"#);
    wait_for(|| comm.snapshot().completed == 1).await;
    assert_eq!(comm.state(), CommunicatorState::Idle);
}

#[test]
fn test_connect_requires_runtime() {
    let result = BufferedCommunicator::connect(
        Box::new(MockConnection::new()),
        Box::new(GrblProtocol::new()),
        &ConnectionParams::new("mock"),
        quiet_config(),
        ListenerRegistry::new(),
    );
    assert!(result.is_err());
}
