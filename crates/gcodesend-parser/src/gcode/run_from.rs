//! Resume a program part-way through

use gcodesend_core::GcodeError;

use super::motion::exact_number;
use super::state::{tokenize, DistanceMode, GcodeState};
use super::{CommandProcessor, GcodeCommand, ProcessorConfig};

/// Run From Processor
///
/// Starts a program at `start_line`. Earlier lines are interpreted into a
/// private state but not emitted. When the start line arrives, the
/// processor first emits a modal preamble, one rapid catch-up move holding
/// only the axes that differ, and a trailer restoring distance and motion
/// mode, so the machine is in the state sequential execution would have
/// left it in.
#[derive(Debug, Clone)]
pub struct RunFromProcessor {
    config: ProcessorConfig,
    start_line: u32,
    /// State at the first processed line, before anything was skipped
    initial: Option<GcodeState>,
    /// State after the skipped lines
    skipped: GcodeState,
    started: bool,
}

impl RunFromProcessor {
    /// Start emitting at `start_line`
    pub fn new(start_line: u32) -> Self {
        Self {
            config: ProcessorConfig::new().with_option("start_line", start_line),
            start_line,
            initial: None,
            skipped: GcodeState::default(),
            started: false,
        }
    }

    /// Build from processor options (`start_line`)
    pub fn from_config(config: &ProcessorConfig) -> Self {
        Self::new(config.get_parsed("start_line").unwrap_or(0))
    }

    /// First emitted line
    pub fn start_line(&self) -> u32 {
        self.start_line
    }

    /// Commands that bring `live` to the skipped state
    fn catch_up(&self, live: &GcodeState, at: &GcodeCommand) -> Vec<GcodeCommand> {
        let target = &self.skipped;
        let mut commands = Vec::new();

        let mut modal = vec![
            if target.is_metric() { "G21" } else { "G20" }.to_string(),
            target.plane.gcode().to_string(),
            target.feed_rate_mode.gcode().to_string(),
            format!("G{}", target.coordinate_system),
            "G90".to_string(),
        ];
        if target.arc_distance_mode != live.arc_distance_mode {
            modal.push(
                match target.arc_distance_mode {
                    DistanceMode::Absolute => "G90.1",
                    DistanceMode::Incremental => "G91.1",
                }
                .to_string(),
            );
        }
        commands.push(at.generate(modal.join(" ")));

        if target.feed_rate > 0.0 || target.feed_rate != live.feed_rate {
            commands.push(at.generate(format!("F{}", exact_number(target.feed_rate))));
        }
        if target.tool_number != live.tool_number {
            commands.push(at.generate(format!("T{}", target.tool_number)));
        }
        let mut spindle = target.spindle.mcode().to_string();
        if target.spindle_speed > 0.0 || target.spindle_speed != live.spindle_speed {
            spindle.push_str(&format!(" S{}", exact_number(target.spindle_speed)));
        }
        commands.push(at.generate(spindle));

        // Where the preamble leaves the machine
        let mut simulated = *live;
        for cmd in &commands {
            if let Ok(words) = tokenize(&cmd.command) {
                simulated.apply(&words);
            }
        }

        let differing = target.current_point.diff(&simulated.current_point);
        if !differing.is_empty() {
            let mut rapid = String::from("G0");
            for (axis, value) in differing.axes() {
                rapid.push(' ');
                rapid.push(axis.letter());
                rapid.push_str(&exact_number(value));
            }
            if let Ok(words) = tokenize(&rapid) {
                simulated.apply(&words);
            }
            commands.push(at.generate(rapid));
        }

        let mut trailer = Vec::new();
        if target.distance_mode == DistanceMode::Incremental {
            trailer.push("G91");
        }
        if target.motion_mode != simulated.motion_mode {
            trailer.push(target.motion_mode.gcode());
        }
        if !trailer.is_empty() {
            commands.push(at.generate(trailer.join(" ")));
        }

        tracing::info!(
            "Resuming at line {} with {} catch-up commands",
            self.start_line,
            commands.len()
        );
        commands
    }
}

impl CommandProcessor for RunFromProcessor {
    fn name(&self) -> &str {
        "run_from"
    }

    fn description(&self) -> &str {
        "Skips lines before a start line and restores the machine state they set up"
    }

    fn process(
        &mut self,
        command: &GcodeCommand,
        state: &GcodeState,
    ) -> Result<Vec<GcodeCommand>, GcodeError> {
        if self.started {
            return Ok(vec![command.clone()]);
        }

        if command.line_number < self.start_line {
            if self.initial.is_none() {
                self.initial = Some(*state);
                self.skipped = *state;
            }
            let words = tokenize(&command.command)?;
            self.skipped.apply(&words);
            return Ok(vec![]);
        }

        self.started = true;
        if self.initial.is_none() {
            return Ok(vec![command.clone()]);
        }

        let mut commands = self.catch_up(state, command);
        commands.push(command.clone());
        Ok(commands)
    }

    fn config(&self) -> &ProcessorConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gcode::CommandProcessorList;

    const PROGRAM: &[&str] = &[
        "G21 G90",
        "G0 Z5",
        "G0 X10 Y10",
        "M3 S12000",
        "G1 Z-1 F300",
        "G91",
        "G1 X5",
        "G1 Y5",
        "G1 X-5",
    ];

    fn sequential(until: usize) -> GcodeState {
        let mut state = GcodeState::new();
        for line in &PROGRAM[..until] {
            state.apply(&tokenize(line).unwrap());
        }
        state
    }

    fn resumed(start: u32) -> (GcodeState, Vec<GcodeCommand>) {
        let mut list = CommandProcessorList::new().with(RunFromProcessor::new(start));
        let mut state = GcodeState::new();
        let mut emitted = Vec::new();
        for (i, line) in PROGRAM.iter().enumerate() {
            let number = i as u32 + 1;
            let out = list.process(&GcodeCommand::new(*line, number), &state).unwrap();
            for cmd in out {
                if !cmd.generated && cmd.line_number == start {
                    // The catch-up reproduces the state sequential execution reaches
                    assert_eq!(state, sequential(start as usize - 1));
                }
                state.apply(&tokenize(&cmd.command).unwrap());
                emitted.push(cmd);
            }
        }
        (state, emitted)
    }

    #[test]
    fn test_state_matches_sequential() {
        for start in 2..=PROGRAM.len() as u32 {
            let (state, _) = resumed(start);
            assert_eq!(state, sequential(PROGRAM.len()), "start line {}", start);
        }
    }

    #[test]
    fn test_single_catch_up_move() {
        let (_, emitted) = resumed(8);
        let before_start: Vec<_> = emitted.iter().filter(|c| c.generated).collect();
        let moves: Vec<_> = before_start
            .iter()
            .filter(|c| c.command.starts_with("G0 "))
            .collect();
        assert_eq!(moves.len(), 1);
        assert_eq!(moves[0].command, "G0 X15 Y10 Z-1");
        // Nothing from the skipped lines is emitted verbatim
        assert!(emitted
            .iter()
            .filter(|c| !c.generated)
            .all(|c| c.line_number >= 8));
        assert_eq!(emitted.last().unwrap().command, "G1 X-5");
    }

    #[test]
    fn test_preamble_restores_modes() {
        let (_, emitted) = resumed(8);
        let texts: Vec<&str> = emitted.iter().map(|c| c.command.as_str()).collect();
        assert_eq!(texts[0], "G21 G17 G94 G54 G90");
        assert!(texts.contains(&"F300"));
        assert!(texts.contains(&"M3 S12000"));
        assert!(texts.contains(&"G91 G1"));
    }

    #[test]
    fn test_start_at_first_line_passes_through() {
        let mut processor = RunFromProcessor::new(1);
        let out = processor
            .process(&GcodeCommand::new("G0 X1", 1), &GcodeState::new())
            .unwrap();
        assert_eq!(out.len(), 1);
        assert!(!out[0].generated);
    }

    #[test]
    fn test_no_catch_up_when_nothing_moved() {
        let mut processor = RunFromProcessor::new(3);
        let state = GcodeState::new();
        assert!(processor
            .process(&GcodeCommand::new("M3 S1000", 1), &state)
            .unwrap()
            .is_empty());
        assert!(processor
            .process(&GcodeCommand::new("G1 F100", 2), &state)
            .unwrap()
            .is_empty());
        let out = processor
            .process(&GcodeCommand::new("G1 X1", 3), &state)
            .unwrap();
        assert!(out.iter().all(|c| !c.command.starts_with("G0 ")));
        assert_eq!(out.last().unwrap().command, "G1 X1");
    }
}
