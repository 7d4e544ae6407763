//! Rotary axis move segmentation

use gcodesend_core::{Axis, GcodeError, Position};

use super::motion::{DecodedMove, SegmentWriter};
use super::{CommandProcessor, GcodeCommand, GcodeState, ProcessorConfig};

/// Default largest rotary change per emitted segment, in degrees
pub const DEFAULT_MAX_ROTATION_STEP: f64 = 5.0;

/// Rotation Expander Processor
///
/// Splits straight moves that turn a rotary axis (A, B or C) into segments
/// that each turn by at most `max_step` degrees. Linear axes are
/// interpolated in proportion, so a wrapped or indexed part follows the
/// programmed surface instead of cutting a chord across it.
#[derive(Debug, Clone)]
pub struct RotationExpander {
    config: ProcessorConfig,
    max_step: f64,
    precision: usize,
}

impl RotationExpander {
    /// Create an expander with the given step in degrees
    pub fn new(max_step: f64) -> Self {
        let max_step = if max_step > 0.0 {
            max_step
        } else {
            DEFAULT_MAX_ROTATION_STEP
        };
        Self {
            config: ProcessorConfig::new().with_option("max_step", max_step),
            max_step,
            precision: super::arc::DEFAULT_SEGMENT_PRECISION,
        }
    }

    /// Build from processor options (`max_step`, `precision`)
    pub fn from_config(config: &ProcessorConfig) -> Self {
        let mut expander = Self::new(
            config
                .get_parsed("max_step")
                .unwrap_or(DEFAULT_MAX_ROTATION_STEP),
        );
        if let Some(precision) = config.get_parsed("precision") {
            expander.precision = precision;
            expander.config = expander.config.with_option("precision", precision);
        }
        expander
    }

    /// Number of segments a move from `start` to `end` needs
    pub fn segments_for(&self, start: &Position, end: &Position) -> usize {
        let largest = [Axis::A, Axis::B, Axis::C]
            .into_iter()
            .map(|axis| (end.get(axis) - start.get(axis)).abs())
            .fold(0.0_f64, f64::max);
        ((largest / self.max_step).ceil() as usize).max(1)
    }
}

impl Default for RotationExpander {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ROTATION_STEP)
    }
}

impl CommandProcessor for RotationExpander {
    fn name(&self) -> &str {
        "rotation_expander"
    }

    fn description(&self) -> &str {
        "Splits rotary axis moves into segments of bounded angular change"
    }

    fn process(
        &mut self,
        command: &GcodeCommand,
        state: &GcodeState,
    ) -> Result<Vec<GcodeCommand>, GcodeError> {
        let decoded = match DecodedMove::decode(command, state)? {
            Some(decoded) if !decoded.motion().is_arc() => decoded,
            _ => return Ok(vec![command.clone()]),
        };

        let count = self.segments_for(&decoded.start, &decoded.end);
        if count <= 1 {
            return Ok(vec![command.clone()]);
        }

        let (start, end) = (decoded.start, decoded.end);
        let mut writer = SegmentWriter::new(&decoded, decoded.motion(), self.precision);
        let segments = (1..=count)
            .map(|i| {
                let t = i as f64 / count as f64;
                let point = if i == count {
                    end
                } else {
                    Position {
                        x: start.x + (end.x - start.x) * t,
                        y: start.y + (end.y - start.y) * t,
                        z: start.z + (end.z - start.z) * t,
                        a: start.a + (end.a - start.a) * t,
                        b: start.b + (end.b - start.b) * t,
                        c: start.c + (end.c - start.c) * t,
                        unit: end.unit,
                    }
                };
                command.derive(writer.segment(&point, i == count))
            })
            .collect();
        Ok(segments)
    }

    fn config(&self) -> &ProcessorConfig {
        &self.config
    }
}
