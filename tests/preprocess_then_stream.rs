use gcodesend::{
    preprocess_file, CommunicatorConfig, CommunicatorState, Config, ConnectionParams,
    GcodeParser, GcodeStreamReader, ListenerRegistry, ParseErrorPolicy, ProcessorRegistry,
    StreamSource, StreamingEngine,
};
use gcodesend_communication::MockConnection;
use gcodesend_parser::gcode::tokenize;

const PROGRAM: &str = "\
(square with a rounded corner)
G21 G90 G17
G0 X0 Y0 Z5
G1 Z-1 F200 ; plunge
G1 X20 F600
G2 X30 Y10 I0 J10
G1 Y30
M5
";

fn preprocess(config: &Config, run_from: Option<u32>) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("part.nc");
    let output = dir.path().join("part.gcs");
    std::fs::write(&input, PROGRAM).unwrap();

    let processors = config
        .processor_list(&ProcessorRegistry::with_builtins(), run_from)
        .unwrap();
    let mut parser = GcodeParser::with_processors(processors);
    let stats = preprocess_file(&input, &output, &mut parser, ParseErrorPolicy::Abort).unwrap();
    assert!(stats.is_clean());
    assert_eq!(stats.lines_read, 8);
    (dir, output)
}

#[test]
fn test_default_pipeline_expands_arcs_and_strips_comments() {
    let (_dir, output) = preprocess(&Config::default(), None);
    let records: Vec<_> = GcodeStreamReader::open(&output)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();

    assert!(records.iter().all(|m| !m.command.contains('(')));
    assert!(records.iter().all(|m| !m.command.contains(';')));
    let arc_words = records
        .iter()
        .flat_map(|m| tokenize(&m.command).unwrap())
        .filter(|w| w.is('G', 20) || w.is('G', 30))
        .count();
    assert_eq!(arc_words, 0);
    assert!(records.iter().any(|m| m.command == "G21 G90 G17"));

    let arc: Vec<_> = records.iter().filter(|m| m.line_number == 6).collect();
    assert!(arc.len() >= 2);
    let last = arc.last().unwrap();
    assert!((last.end.x - 30.0).abs() < 1e-9);
    assert!((last.end.y - 10.0).abs() < 1e-9);
}

#[test]
fn test_run_from_skips_earlier_lines() {
    let (_dir, output) = preprocess(&Config::default(), Some(7));
    let records: Vec<_> = GcodeStreamReader::open(&output)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();

    assert!(records.iter().all(|m| m.line_number >= 7));
    assert!(records.iter().any(|m| m.command == "G1 Y30"));
    assert!(records.iter().any(|m| m.command.starts_with("G0")));
}

#[test]
fn test_stream_file_through_engine() {
    let mut config = Config::default();
    config.streaming.soft_reset_on_cancel = false;
    config.streaming.status_poll_interval_ms = 0;
    config.streaming.line_terminator = "\r\n".to_string();
    let (_dir, output) = preprocess(&config, None);

    let reader = GcodeStreamReader::open(&output).unwrap();
    let expected = reader.record_count() as usize;
    let wire_bytes = reader.wire_bytes(2);

    let mock = MockConnection::new();
    let protocol = config
        .firmware_protocol(&gcodesend::FirmwareRegistry::with_builtins())
        .unwrap();
    let communicator: CommunicatorConfig = config.communicator_config();
    let mut engine = StreamingEngine::new(
        Box::new(mock.clone()),
        protocol,
        communicator,
        ListenerRegistry::new(),
    );
    engine
        .connect(&ConnectionParams::new("mock"), Box::new(|_| {}))
        .unwrap();
    engine.handle_line("Grbl 1.1h ['$' for help]");
    engine.stream(Box::new(StreamSource::new(reader))).unwrap();

    while engine.state() == CommunicatorState::Streaming {
        assert!(engine.outstanding_bytes() <= engine.capacity());
        engine.handle_line("ok");
    }
    assert_eq!(engine.state(), CommunicatorState::Idle);
    assert_eq!(mock.sent_commands().len(), expected);
    let written: usize = mock.writes().iter().map(|w| w.len()).sum();
    assert_eq!(written as u64, wire_bytes);
}
