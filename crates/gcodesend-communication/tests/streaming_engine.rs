use std::collections::VecDeque;
use std::sync::Arc;

use gcodesend_communication::firmware::GrblProtocol;
use gcodesend_communication::{
    BufferedCommand, CommunicatorConfig, CommunicatorListener, ConnectionParams, ErrorPolicy,
    MockConnection, StreamSource, StreamingEngine, VecSource,
};
use gcodesend_core::{CommunicatorState, Error, ListenerRegistry};
use gcodesend_parser::{preprocess_file, GcodeParser, GcodeStreamReader, ParseErrorPolicy};
use parking_lot::Mutex;
use proptest::prelude::*;

#[derive(Default)]
struct Recorder {
    completed: Mutex<Vec<(String, Option<u32>, u64)>>,
    errors: Mutex<Vec<String>>,
}

impl CommunicatorListener for Recorder {
    fn on_command_complete(&self, command: &BufferedCommand, _response: &str) {
        self.completed
            .lock()
            .push((command.command.clone(), command.line_number, command.epoch));
    }

    fn on_communicator_error(&self, error: &Error) {
        self.errors.lock().push(error.to_string());
    }
}

fn no_reset() -> CommunicatorConfig {
    CommunicatorConfig {
        soft_reset_on_cancel: false,
        status_poll_interval_ms: 0,
        ..CommunicatorConfig::default()
    }
}

fn connect(capacity: usize, config: CommunicatorConfig) -> (StreamingEngine, MockConnection, Arc<Recorder>) {
    let mock = MockConnection::new();
    let listeners = ListenerRegistry::<dyn CommunicatorListener>::new();
    let recorder = Arc::new(Recorder::default());
    listeners.subscribe(recorder.clone()).detach();

    let mut engine = StreamingEngine::new(
        Box::new(mock.clone()),
        Box::new(GrblProtocol::with_capacity(capacity)),
        config,
        listeners,
    );
    engine
        .connect(&ConnectionParams::new("mock"), Box::new(|_| {}))
        .unwrap();
    engine.handle_line("Grbl 1.1h ['$' for help]");
    assert_eq!(engine.state(), CommunicatorState::Idle);
    (engine, mock, recorder)
}

/// Ack every in-flight command until nothing is left to send
fn drain(engine: &mut StreamingEngine, mock: &MockConnection) {
    let mut acked = 0;
    while acked < mock.sent_commands().len() {
        engine.handle_line("ok");
        acked += 1;
    }
}

#[test]
fn test_capacity_ten_with_three_four_byte_commands() {
    let (mut engine, mock, recorder) = connect(10, no_reset());
    for _ in 0..3 {
        engine.queue_command("G1X", None).unwrap();
    }

    // 4 + 4 fits, a third 4 would make 12
    assert_eq!(mock.sent_commands().len(), 2);
    assert_eq!(engine.outstanding_bytes(), 8);

    engine.handle_line("ok");
    assert_eq!(mock.sent_commands().len(), 3);
    assert_eq!(engine.outstanding_bytes(), 8);

    engine.handle_line("ok");
    engine.handle_line("ok");
    assert_eq!(engine.outstanding_bytes(), 0);
    assert_eq!(recorder.completed.lock().len(), 3);
    assert_eq!(engine.state(), CommunicatorState::Idle);
}

#[test]
fn test_acks_match_commands_in_order() {
    let (mut engine, _mock, recorder) = connect(127, CommunicatorConfig {
        error_policy: ErrorPolicy::Skip,
        ..no_reset()
    });
    engine
        .stream(Box::new(VecSource::from_lines(["G21", "G0 X1", "G0 X2"])))
        .unwrap();
    engine.handle_line("ok");
    engine.handle_line("error:20");
    engine.handle_line("ok");

    let completed = recorder.completed.lock().clone();
    assert_eq!(
        completed,
        vec![
            ("G21".to_string(), Some(1), 0),
            ("G0 X1".to_string(), Some(2), 0),
            ("G0 X2".to_string(), Some(3), 0),
        ]
    );
    let errors = recorder.errors.lock();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("line 2"));
}

#[test]
fn test_pause_resume_sends_everything_once() {
    let (mut engine, mock, recorder) = connect(20, no_reset());
    let lines: Vec<String> = (0..12).map(|i| format!("G0 X{}", i)).collect();
    engine
        .stream(Box::new(VecSource::from_lines(lines.clone())))
        .unwrap();
    let before_pause = mock.sent_commands().len();
    assert!(before_pause > 0);

    engine.pause().unwrap();
    drain(&mut engine, &mock);
    assert_eq!(mock.sent_commands().len(), before_pause);
    assert_eq!(engine.outstanding_bytes(), 0);
    assert_eq!(engine.state(), CommunicatorState::Paused);

    engine.resume().unwrap();
    while engine.state() == CommunicatorState::Streaming {
        engine.handle_line("ok");
    }
    assert_eq!(mock.sent_commands(), lines);
    assert_eq!(recorder.completed.lock().len(), lines.len());
    assert_eq!(engine.state(), CommunicatorState::Idle);
}

#[test]
fn test_cancel_ignores_responses_of_old_session() {
    let (mut engine, mock, recorder) = connect(127, no_reset());
    engine.queue_command("G0 X1", Some(1)).unwrap();
    engine.queue_command("G0 X2", Some(2)).unwrap();
    engine.cancel().unwrap();
    assert_eq!(engine.state(), CommunicatorState::Idle);
    assert_eq!(engine.epoch(), 1);

    // The old bytes still occupy the controller buffer
    assert_eq!(engine.outstanding_bytes(), 12);

    engine.queue_command("G0 X9", Some(9)).unwrap();
    assert_eq!(mock.sent_commands().last().unwrap(), "G0 X9");

    engine.handle_line("ok");
    engine.handle_line("ok");
    assert!(recorder.completed.lock().is_empty());

    engine.handle_line("ok");
    assert_eq!(
        recorder.completed.lock().clone(),
        vec![("G0 X9".to_string(), Some(9), 1)]
    );
    assert_eq!(engine.outstanding_bytes(), 0);
    assert_eq!(engine.state(), CommunicatorState::Idle);
}

#[test]
fn test_streams_preprocessed_file() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("part.nc");
    let output = dir.path().join("part.gcs");
    std::fs::write(&input, "G21 G90\nG0 X0 Y0\nG1 X10 F300\nG1 Y10\nM5\n").unwrap();
    let mut parser = GcodeParser::new();
    let stats = preprocess_file(&input, &output, &mut parser, ParseErrorPolicy::Abort).unwrap();
    assert_eq!(stats.commands_written, 5);

    let (mut engine, mock, recorder) = connect(16, no_reset());
    let reader = GcodeStreamReader::open(&output).unwrap();
    engine.stream(Box::new(StreamSource::new(reader))).unwrap();
    while engine.state() == CommunicatorState::Streaming {
        engine.handle_line("ok");
    }

    assert_eq!(
        mock.sent_commands(),
        vec!["G21 G90", "G0 X0 Y0", "G1 X10 F300", "G1 Y10", "M5"]
    );
    let lines: Vec<Option<u32>> = recorder.completed.lock().iter().map(|c| c.1).collect();
    assert_eq!(lines, vec![Some(1), Some(2), Some(3), Some(4), Some(5)]);
}

#[derive(Debug, Clone)]
enum Op {
    Queue(usize),
    Ack,
    Reject,
    Pause,
    Resume,
    Cancel,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (2usize..40).prop_map(Op::Queue),
        4 => Just(Op::Ack),
        1 => Just(Op::Reject),
        1 => Just(Op::Pause),
        1 => Just(Op::Resume),
        1 => Just(Op::Cancel),
    ]
}

proptest! {
    #[test]
    fn prop_outstanding_never_exceeds_capacity(
        capacity in 10usize..64,
        ops in proptest::collection::vec(op(), 1..200),
    ) {
        let config = CommunicatorConfig {
            error_policy: ErrorPolicy::Skip,
            ..no_reset()
        };
        let (mut engine, mock, _recorder) = connect(capacity, config);

        // Bytes the controller has received and not yet answered
        let mut in_controller: VecDeque<usize> = VecDeque::new();
        let mut seen_writes = 0;

        for op in ops {
            match op {
                Op::Queue(len) => {
                    let text = format!("G{}", "1".repeat(len - 2));
                    let _ = engine.queue_command(&text, None);
                }
                Op::Ack | Op::Reject => {
                    if !in_controller.is_empty() {
                        in_controller.pop_front();
                        let line = if matches!(op, Op::Ack) { "ok" } else { "error:20" };
                        engine.handle_line(line);
                    }
                }
                Op::Pause => { let _ = engine.pause(); }
                Op::Resume => { let _ = engine.resume(); }
                Op::Cancel => { let _ = engine.cancel(); }
            }

            let sent = mock.sent_commands();
            for command in &sent[seen_writes..] {
                in_controller.push_back(command.len() + 1);
            }
            seen_writes = sent.len();

            let occupied: usize = in_controller.iter().sum();
            prop_assert!(occupied <= capacity);
            prop_assert_eq!(engine.outstanding_bytes(), occupied);
            prop_assert_ne!(engine.state(), CommunicatorState::Error);
        }
    }
}
