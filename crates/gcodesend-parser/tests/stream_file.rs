//! Stream file persistence and file preprocessing

use gcodesend_core::{Position, Units};
use gcodesend_parser::{
    preprocess_file, ArcExpander, CommandProcessorList, CommentProcessor, GcodeMeta,
    GcodeParser, GcodeStreamReader, GcodeStreamWriter, ParseErrorPolicy, RunFromProcessor,
    WhitespaceProcessor,
};
use std::io::Write;

fn meta(i: u32) -> GcodeMeta {
    let x = i as f64 * 0.001;
    GcodeMeta {
        line_number: i + 1,
        original: format!("G1 X{}", x),
        command: format!("G1 X{}", x),
        start: Position::xyz(x - 0.001, 0.0, 0.0, Units::MM),
        end: Position::xyz(x, 0.0, 0.0, Units::MM),
        is_arc: false,
        is_z_movement: false,
        is_fast_traverse: false,
        is_rotation: false,
        is_motion: true,
        feed_rate: 1000.0,
        spindle_speed: 0.0,
    }
}

fn round_trip(count: u32) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("program.gcs");

    let mut writer = GcodeStreamWriter::create(&path).unwrap();
    let mut expected_bytes = 0u64;
    for i in 0..count {
        let meta = meta(i);
        expected_bytes += meta.command.len() as u64 + 1;
        writer.write(&meta).unwrap();
    }
    writer.finish().unwrap();

    let reader = GcodeStreamReader::open(&path).unwrap();
    assert_eq!(reader.record_count(), count as u64);
    assert_eq!(reader.total_bytes(), expected_bytes);

    let mut read = 0u32;
    for (i, record) in reader.enumerate() {
        assert_eq!(record.unwrap(), meta(i as u32));
        read += 1;
    }
    assert_eq!(read, count);
}

#[test]
fn round_trip_empty() {
    round_trip(0);
}

#[test]
fn round_trip_single() {
    round_trip(1);
}

#[test]
fn round_trip_million() {
    round_trip(1_000_000);
}

#[test]
fn skip_lands_on_record() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("skip.gcs");
    let mut writer = GcodeStreamWriter::create(&path).unwrap();
    for i in 0..10_000 {
        writer.write(&meta(i)).unwrap();
    }
    writer.finish().unwrap();

    let mut reader = GcodeStreamReader::open(&path).unwrap();
    assert_eq!(reader.skip_records(7_500).unwrap(), 7_500);
    assert_eq!(reader.position(), 7_500);
    assert_eq!(reader.next_record().unwrap().unwrap(), meta(7_500));
    assert_eq!(reader.count(), 2_499);
}

fn write_source(dir: &tempfile::TempDir, text: &str) -> std::path::PathBuf {
    let path = dir.path().join("program.nc");
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(text.as_bytes()).unwrap();
    path
}

#[test]
fn preprocess_file_writes_stream() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_source(
        &dir,
        "(header)\nG21 G90\nG0 X0 Y0\nG2 X10 Y0 I5 J0 F400 ; half circle\nM5\n",
    );
    let output = dir.path().join("program.gcs");

    let mut parser = GcodeParser::with_processors(
        CommandProcessorList::new()
            .with(WhitespaceProcessor::new())
            .with(CommentProcessor::new())
            .with(ArcExpander::new(0.05)),
    );
    let stats = preprocess_file(&input, &output, &mut parser, ParseErrorPolicy::Skip).unwrap();
    assert_eq!(stats.lines_read, 5);
    assert!(stats.is_clean());

    let records: Vec<GcodeMeta> = GcodeStreamReader::open(&output)
        .unwrap()
        .map(|r| r.unwrap())
        .collect();
    assert_eq!(records.len() as u64, stats.commands_written);
    assert!(records.iter().all(|r| !r.command.contains('(')));
    assert!(records.iter().filter(|r| r.line_number == 4).count() > 2);
    assert_eq!(records.last().unwrap().command, "M5");

    let arc_end = records.iter().rev().find(|r| r.is_motion).unwrap();
    assert_eq!((arc_end.end.x, arc_end.end.y), (10.0, 0.0));
}

#[test]
fn preprocess_file_run_from() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_source(&dir, "G21\nG0 X5\nG0 Y5\nG1 X10 F100\n");
    let output = dir.path().join("resume.gcs");

    let mut parser =
        GcodeParser::with_processors(CommandProcessorList::new().with(RunFromProcessor::new(4)));
    preprocess_file(&input, &output, &mut parser, ParseErrorPolicy::Abort).unwrap();

    let commands: Vec<String> = GcodeStreamReader::open(&output)
        .unwrap()
        .map(|r| r.unwrap().command)
        .collect();
    assert!(commands.contains(&"G0 X5 Y5".to_string()));
    assert_eq!(commands.last().unwrap(), "G1 X10 F100");
    assert!(!commands.contains(&"G0 X5".to_string()));
}
