//! Arc expansion into line segments

use gcodesend_core::{GcodeError, Position, Units};
use std::f64::consts::TAU;

use super::motion::{DecodedMove, SegmentWriter};
use super::state::{DistanceMode, MotionMode, Plane};
use super::{CommandProcessor, GcodeCommand, GcodeState, ProcessorConfig};

/// Default maximum chord error, in millimetres
pub const DEFAULT_MAX_CHORD_ERROR: f64 = 0.01;

/// Default number of decimals written for intermediate segment coordinates
pub const DEFAULT_SEGMENT_PRECISION: usize = 4;

/// Share of the chord error left for rounding the segment endpoints
const ROUNDING_SHARE: f64 = 0.1;

/// Decimals needed so rounding a point on up to three axes moves it by at
/// most `ROUNDING_SHARE` of `max_error`
pub fn precision_for(max_error: f64) -> usize {
    if !(max_error > 0.0 && max_error.is_finite()) {
        return DEFAULT_SEGMENT_PRECISION;
    }
    let worst_offset = 0.5 * 3f64.sqrt();
    let decimals = (worst_offset / (ROUNDING_SHARE * max_error)).log10().ceil();
    decimals.clamp(0.0, 15.0) as usize
}

/// Length of a chord whose sagitta is `max_error` on a circle of `radius`
///
/// When the tolerance reaches the radius, any chord up to the diameter
/// qualifies.
pub fn segment_length(radius: f64, max_error: f64) -> f64 {
    if max_error >= radius {
        2.0 * radius
    } else {
        2.0 * (2.0 * radius * max_error - max_error * max_error).sqrt()
    }
}

/// Number of chords needed to keep an arc within `max_error`
///
/// Never fewer than two.
pub fn segment_count(radius: f64, sweep: f64, max_error: f64) -> usize {
    let chord = segment_length(radius, max_error);
    let length = radius * sweep.abs();
    if chord <= 0.0 || !length.is_finite() {
        return 2;
    }
    ((length / chord).ceil() as usize).max(2)
}

/// Resolved geometry of one arc, in the arc's own plane
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArcGeometry {
    /// Centre, first in-plane axis
    pub center_u: f64,
    /// Centre, second in-plane axis
    pub center_v: f64,
    /// Radius measured from the start point
    pub radius: f64,
    /// Angle of the start point
    pub start_angle: f64,
    /// Signed sweep; negative for clockwise
    pub sweep: f64,
}

/// Arc Expander Processor
///
/// Replaces G2/G3 moves with G1 segments that stay within a maximum chord
/// error of the true arc. Handles centre (IJK) and radius (R) formats in all
/// three planes, with a helical component on the normal axis. Arcs are
/// essential for controllers without native arc support.
#[derive(Debug, Clone)]
pub struct ArcExpander {
    config: ProcessorConfig,
    max_chord_error: f64,
    precision: usize,
}

impl ArcExpander {
    /// Create an expander with the given maximum chord error in millimetres
    pub fn new(max_chord_error: f64) -> Self {
        let max_chord_error = if max_chord_error > 0.0 {
            max_chord_error
        } else {
            DEFAULT_MAX_CHORD_ERROR
        };
        Self {
            config: ProcessorConfig::new()
                .with_option("max_chord_error", max_chord_error)
                .with_option("precision", DEFAULT_SEGMENT_PRECISION),
            max_chord_error,
            precision: DEFAULT_SEGMENT_PRECISION,
        }
    }

    /// Build from processor options (`max_chord_error`, `precision`)
    pub fn from_config(config: &ProcessorConfig) -> Self {
        let mut expander = Self::new(
            config
                .get_parsed("max_chord_error")
                .unwrap_or(DEFAULT_MAX_CHORD_ERROR),
        );
        if let Some(precision) = config.get_parsed("precision") {
            expander = expander.with_precision(precision);
        }
        expander
    }

    /// Set the decimals written for intermediate points
    pub fn with_precision(mut self, precision: usize) -> Self {
        self.precision = precision;
        self.config = self.config.with_option("precision", precision);
        self
    }

    /// Maximum chord error in millimetres
    pub fn max_chord_error(&self) -> f64 {
        self.max_chord_error
    }

    fn tolerance(&self, unit: Units) -> f64 {
        Units::convert(self.max_chord_error, Units::MM, unit)
    }

    /// Decimals written for intermediate points in `unit`
    ///
    /// At least the configured precision, more when the tolerance is finer
    /// than rounding to it would allow.
    pub fn segment_precision(&self, unit: Units) -> usize {
        self.precision.max(precision_for(self.tolerance(unit)))
    }

    /// Resolve centre, radius and sweep for an arc move
    pub fn geometry(
        &self,
        command: &GcodeCommand,
        state: &GcodeState,
    ) -> Result<Option<ArcGeometry>, GcodeError> {
        match DecodedMove::decode(command, state)? {
            Some(decoded) if decoded.motion().is_arc() => resolve(&decoded, command).map(Some),
            _ => Ok(None),
        }
    }

    /// Intermediate and final points of an arc, ending exactly at `end`
    pub fn points(
        &self,
        geometry: &ArcGeometry,
        start: &Position,
        end: &Position,
        plane: Plane,
    ) -> Vec<Position> {
        let tolerance = (1.0 - ROUNDING_SHARE) * self.tolerance(end.unit);
        let count = segment_count(geometry.radius, geometry.sweep, tolerance);
        let (u, v, _) = plane.axes();

        let mut points = Vec::with_capacity(count);
        for i in 1..count {
            let t = i as f64 / count as f64;
            let angle = geometry.start_angle + geometry.sweep * t;
            // Linear axes other than the plane interpolate, giving helices
            let mut point = Position {
                x: lerp(start.x, end.x, t),
                y: lerp(start.y, end.y, t),
                z: lerp(start.z, end.z, t),
                a: lerp(start.a, end.a, t),
                b: lerp(start.b, end.b, t),
                c: lerp(start.c, end.c, t),
                unit: end.unit,
            };
            point.set(u, geometry.center_u + geometry.radius * angle.cos());
            point.set(v, geometry.center_v + geometry.radius * angle.sin());
            points.push(point);
        }
        points.push(*end);
        points
    }
}

impl Default for ArcExpander {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CHORD_ERROR)
    }
}

fn lerp(from: f64, to: f64, t: f64) -> f64 {
    from + (to - from) * t
}

fn resolve(decoded: &DecodedMove, command: &GcodeCommand) -> Result<ArcGeometry, GcodeError> {
    let plane = decoded.after.plane;
    let (u, v, _) = plane.axes();
    let clockwise = decoded.motion() == MotionMode::ArcCw;
    let (start_u, start_v) = (decoded.start.get(u), decoded.start.get(v));
    let (end_u, end_v) = (decoded.end.get(u), decoded.end.get(v));

    let (center_u, center_v) = if let Some(r) = decoded.word('R') {
        radius_center(start_u, start_v, end_u, end_v, r, clockwise)
            .ok_or_else(|| GcodeError::arc(&command.command, "radius too small for endpoints"))?
    } else {
        let (lu, lv) = plane.offset_letters();
        let (off_u, off_v) = (decoded.word(lu), decoded.word(lv));
        if off_u.is_none() && off_v.is_none() {
            return Err(GcodeError::arc(&command.command, "missing centre offset or radius"));
        }
        match decoded.after.arc_distance_mode {
            DistanceMode::Incremental => (
                start_u + off_u.unwrap_or(0.0),
                start_v + off_v.unwrap_or(0.0),
            ),
            DistanceMode::Absolute => (off_u.unwrap_or(start_u), off_v.unwrap_or(start_v)),
        }
    };

    let radius = (start_u - center_u).hypot(start_v - center_v);
    if radius <= f64::EPSILON {
        return Err(GcodeError::arc(&command.command, "zero radius"));
    }

    let start_angle = (start_v - center_v).atan2(start_u - center_u);
    let end_angle = (end_v - center_v).atan2(end_u - center_u);
    let mut sweep = if clockwise {
        start_angle - end_angle
    } else {
        end_angle - start_angle
    };
    if sweep <= 0.0 {
        sweep += TAU;
    }
    // Coincident endpoints are a full circle
    if start_u == end_u && start_v == end_v {
        sweep = TAU;
    }

    Ok(ArcGeometry {
        center_u,
        center_v,
        radius,
        start_angle,
        sweep: if clockwise { -sweep } else { sweep },
    })
}

/// Centre of an R-format arc; a negative radius selects the long way round
fn radius_center(
    start_u: f64,
    start_v: f64,
    end_u: f64,
    end_v: f64,
    radius: f64,
    clockwise: bool,
) -> Option<(f64, f64)> {
    let du = end_u - start_u;
    let dv = end_v - start_v;
    let chord = du.hypot(dv);
    if chord == 0.0 {
        return None;
    }
    let h_squared = 4.0 * radius * radius - du * du - dv * dv;
    if h_squared < 0.0 {
        return None;
    }
    let mut h = -h_squared.sqrt() / chord;
    if !clockwise {
        h = -h;
    }
    if radius < 0.0 {
        h = -h;
    }
    Some((
        start_u + 0.5 * (du - dv * h),
        start_v + 0.5 * (dv + du * h),
    ))
}

impl CommandProcessor for ArcExpander {
    fn name(&self) -> &str {
        "arc_expander"
    }

    fn description(&self) -> &str {
        "Expands arc commands (G2/G3) into linear segments within a chord tolerance"
    }

    fn process(
        &mut self,
        command: &GcodeCommand,
        state: &GcodeState,
    ) -> Result<Vec<GcodeCommand>, GcodeError> {
        let decoded = match DecodedMove::decode(command, state)? {
            Some(decoded) if decoded.motion().is_arc() => decoded,
            _ => return Ok(vec![command.clone()]),
        };

        let geometry = resolve(&decoded, command)?;
        let points = self.points(&geometry, &decoded.start, &decoded.end, decoded.after.plane);
        tracing::trace!(
            "Line {}: arc r={:.4} expanded to {} segments",
            command.line_number,
            geometry.radius,
            points.len()
        );

        let precision = self.segment_precision(decoded.end.unit);
        let mut writer = SegmentWriter::new(&decoded, MotionMode::Linear, precision);
        let last = points.len() - 1;
        Ok(points
            .iter()
            .enumerate()
            .map(|(i, point)| command.derive(writer.segment(point, i == last)))
            .collect())
    }

    fn config(&self) -> &ProcessorConfig {
        &self.config
    }
}
