//! GRBL Response Parser
//!
//! Parses the GRBL 1.1 line protocol shared by GRBL, grblHAL and FluidNC:
//! `ok`, `error:n`, `ALARM:n`, `<...>` status reports, startup banners and
//! bracketed feedback messages.

use gcodesend_core::{ControllerStatus, Position, StatusReport, Units};

use super::error_decoder::{decode_alarm, decode_error};
use crate::firmware::Response;

/// Classify one GRBL-family line
///
/// `is_banner` decides which lines announce a (re)initialised controller.
pub fn parse_line(line: &str, is_banner: impl Fn(&str) -> bool) -> Option<Response> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    if line.eq_ignore_ascii_case("ok") {
        return Some(Response::Ack);
    }

    if let Some(code) = strip_prefix_ignore_case(line, "error:") {
        let code = code.trim();
        return Some(match code.parse::<u32>() {
            Ok(code) => Response::Error {
                code,
                message: decode_error(code).to_string(),
            },
            // GRBL 0.9 reports the description instead of a code
            Err(_) => Response::Error {
                code: 0,
                message: code.to_string(),
            },
        });
    }

    if let Some(code) = strip_prefix_ignore_case(line, "alarm:") {
        let code = code.trim();
        return Some(match code.parse::<u32>() {
            Ok(code) => Response::Alarm {
                code,
                message: decode_alarm(code).to_string(),
            },
            Err(_) => Response::Alarm {
                code: 0,
                message: code.to_string(),
            },
        });
    }

    if line.starts_with('<') && line.ends_with('>') {
        return Some(match parse_status_report(&line[1..line.len() - 1]) {
            Some(report) => Response::Status(report),
            None => Response::Message(line.to_string()),
        });
    }

    if is_banner(line) {
        return Some(Response::Banner(line.to_string()));
    }

    Some(Response::Message(line.to_string()))
}

fn strip_prefix_ignore_case<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    line.get(..prefix.len())
        .filter(|head| head.eq_ignore_ascii_case(prefix))
        .map(|_| &line[prefix.len()..])
}

/// Parse the body of a `<...>` status report
///
/// Work position is derived from `MPos` and `WCO` when the controller only
/// reports machine coordinates.
pub fn parse_status_report(body: &str) -> Option<StatusReport> {
    let mut parts = body.split('|');
    let state = parts.next()?.trim();
    if state.is_empty() {
        return None;
    }

    let mut report = StatusReport {
        status: ControllerStatus::parse(state),
        ..StatusReport::default()
    };
    let mut offset = None;

    for part in parts {
        let part = part.trim();
        if let Some(pos) = part.strip_prefix("MPos:") {
            report.machine_pos = parse_position(pos);
        } else if let Some(pos) = part.strip_prefix("WPos:") {
            report.work_pos = parse_position(pos);
        } else if let Some(pos) = part.strip_prefix("WCO:") {
            offset = parse_position(pos);
        } else if let Some(fs) = part.strip_prefix("FS:") {
            let mut values = fs.split(',').map(|v| v.trim().parse::<f64>().ok());
            report.feed_rate = values.next().flatten();
            report.spindle_speed = values.next().flatten();
        } else if let Some(feed) = part.strip_prefix("F:") {
            report.feed_rate = feed.trim().parse().ok();
        } else if let Some(buf) = part.strip_prefix("Bf:") {
            let mut values = buf.split(',').map(|v| v.trim().parse::<u16>().ok());
            if let (Some(Some(blocks)), Some(Some(bytes))) = (values.next(), values.next()) {
                report.buffer = Some((blocks, bytes));
            }
        }
    }

    if report.work_pos.is_none() {
        if let (Some(machine), Some(offset)) = (report.machine_pos, offset) {
            report.work_pos = Some(Position::with_axes(
                machine.x - offset.x,
                machine.y - offset.y,
                machine.z - offset.z,
                machine.a - offset.a,
                machine.b - offset.b,
                machine.c - offset.c,
                Units::MM,
            ));
        }
    }

    Some(report)
}

/// Parse a comma separated coordinate list (3 to 6 axes)
fn parse_position(text: &str) -> Option<Position> {
    let coords: Vec<f64> = text
        .split(',')
        .map(|s| s.trim().parse::<f64>())
        .collect::<std::result::Result<_, _>>()
        .ok()?;
    if coords.len() < 3 {
        return None;
    }
    let axis = |i: usize| coords.get(i).copied().unwrap_or(0.0);
    Some(Position::with_axes(
        axis(0),
        axis(1),
        axis(2),
        axis(3),
        axis(4),
        axis(5),
        Units::MM,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grbl(line: &str) -> Option<Response> {
        parse_line(line, |l| l.starts_with("Grbl "))
    }

    #[test]
    fn test_ack_and_errors() {
        assert_eq!(grbl("ok"), Some(Response::Ack));
        assert_eq!(grbl("  ok\r"), Some(Response::Ack));
        assert_eq!(grbl(""), None);

        match grbl("error:20") {
            Some(Response::Error { code, message }) => {
                assert_eq!(code, 20);
                assert!(message.contains("Unsupported"));
            }
            other => panic!("unexpected {:?}", other),
        }
        match grbl("error: Bad number format") {
            Some(Response::Error { code, message }) => {
                assert_eq!(code, 0);
                assert_eq!(message, "Bad number format");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(grbl("ALARM:1"), Some(Response::Alarm { code: 1, .. })));
        assert!(matches!(grbl("alarm:2"), Some(Response::Alarm { code: 2, .. })));
    }

    #[test]
    fn test_banner_and_messages() {
        assert_eq!(
            grbl("Grbl 1.1h ['$' for help]"),
            Some(Response::Banner("Grbl 1.1h ['$' for help]".to_string()))
        );
        assert_eq!(
            grbl("[MSG:'$H'|'$X' to unlock]"),
            Some(Response::Message("[MSG:'$H'|'$X' to unlock]".to_string()))
        );
        assert!(matches!(grbl("$10=1"), Some(Response::Message(_))));
    }

    #[test]
    fn test_status_report() {
        let Some(Response::Status(report)) =
            grbl("<Run|MPos:10.000,5.000,-1.000|Bf:15,128|FS:500,12000>")
        else {
            panic!("expected status");
        };
        assert_eq!(report.status, ControllerStatus::Run);
        assert_eq!(report.machine_pos.unwrap().x, 10.0);
        assert_eq!(report.feed_rate, Some(500.0));
        assert_eq!(report.spindle_speed, Some(12000.0));
        assert_eq!(report.buffer, Some((15, 128)));
        assert!(report.work_pos.is_none());
    }

    #[test]
    fn test_work_position_from_offset() {
        let report =
            parse_status_report("Hold:0|MPos:10.000,5.000,0.000|WCO:2.000,1.000,0.000").unwrap();
        assert_eq!(report.status, ControllerStatus::Hold);
        let work = report.work_pos.unwrap();
        assert_eq!((work.x, work.y, work.z), (8.0, 4.0, 0.0));
    }

    #[test]
    fn test_malformed_status_is_message() {
        assert!(matches!(grbl("<>"), Some(Response::Message(_))));
        let report = parse_status_report("Idle|MPos:1,2").unwrap();
        assert!(report.machine_pos.is_none());
    }
}
