//! Arc expansion properties checked through the parser

use gcodesend_parser::{ArcExpander, CommandProcessorList, GcodeMeta, GcodeParser};
use proptest::prelude::*;

fn parser(max_error: f64) -> GcodeParser {
    GcodeParser::with_processors(CommandProcessorList::new().with(ArcExpander::new(max_error)))
}

/// Expand a counter-clockwise arc around (cx, cy) and return its segments
fn expand_ccw(cx: f64, cy: f64, r: f64, theta: f64, sweep: f64, max_error: f64) -> Vec<GcodeMeta> {
    let (sx, sy) = (cx + r * theta.cos(), cy + r * theta.sin());
    let (ex, ey) = (
        cx + r * (theta + sweep).cos(),
        cy + r * (theta + sweep).sin(),
    );
    let mut parser = parser(max_error);
    parser
        .add_command(&format!("G0 X{:.6} Y{:.6}", sx, sy), 1)
        .unwrap();
    parser
        .add_command(
            &format!(
                "G3 X{:.6} Y{:.6} I{:.6} J{:.6} F600",
                ex,
                ey,
                cx - sx,
                cy - sy
            ),
            2,
        )
        .unwrap()
}

proptest! {
    #[test]
    fn chords_stay_within_tolerance(
        cx in -50.0..50.0f64,
        cy in -50.0..50.0f64,
        r in 1.0..100.0f64,
        theta in -3.0..3.0f64,
        sweep in 0.1..6.0f64,
        max_error in 0.0002..0.5f64,
    ) {
        let segments = expand_ccw(cx, cy, r, theta, sweep, max_error);
        prop_assert!(segments.len() >= 2);
        for meta in &segments {
            let mid_x = (meta.start.x + meta.end.x) / 2.0;
            let mid_y = (meta.start.y + meta.end.y) / 2.0;
            let sagitta = r - (mid_x - cx).hypot(mid_y - cy);
            // Inputs are written with 6 decimals, which shifts the circle slightly
            prop_assert!(
                sagitta.abs() <= max_error * (1.0 + 1e-3) + 5e-6,
                "sagitta {} > {}",
                sagitta,
                max_error
            );

            let on_circle = (meta.end.x - cx).hypot(meta.end.y - cy);
            prop_assert!((on_circle - r).abs() < 1e-3);
        }
    }

    #[test]
    fn expansion_is_deterministic(
        r in 1.0..50.0f64,
        theta in -3.0..3.0f64,
        sweep in 0.1..6.0f64,
    ) {
        let first = expand_ccw(0.0, 0.0, r, theta, sweep, 0.01);
        let second = expand_ccw(0.0, 0.0, r, theta, sweep, 0.01);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn full_circle_never_degenerates(r in 0.01..200.0f64, max_error in 0.001..500.0f64) {
        let mut parser = parser(max_error);
        parser.add_command(&format!("G0 X{:.4} Y0", r), 1).unwrap();
        let segments = parser
            .add_command(&format!("G2 X{:.4} Y0 I{:.4} J0", r, -r), 2)
            .unwrap();
        prop_assert!(segments.len() >= 2);
        let last = segments.last().unwrap();
        prop_assert_eq!(last.end, segments[0].start);
    }
}

#[test]
fn endpoint_is_exact() {
    let segments = expand_ccw(3.0, -2.0, 7.5, 0.3, 2.0, 0.01);
    let last = segments.last().unwrap();
    let expected_x: f64 = format!("{:.6}", 3.0 + 7.5 * (2.3f64).cos()).parse().unwrap();
    let expected_y: f64 = format!("{:.6}", -2.0 + 7.5 * (2.3f64).sin()).parse().unwrap();
    assert_eq!(last.end.x, expected_x);
    assert_eq!(last.end.y, expected_y);
}

#[test]
fn tighter_tolerance_means_more_segments() {
    let coarse = expand_ccw(0.0, 0.0, 20.0, 0.0, 3.0, 0.1).len();
    let fine = expand_ccw(0.0, 0.0, 20.0, 0.0, 3.0, 0.001).len();
    assert!(fine > coarse);
}
