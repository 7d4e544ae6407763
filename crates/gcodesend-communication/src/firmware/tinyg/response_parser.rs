//! TinyG Response Parser
//!
//! TinyG and g2core answer every line with a JSON object. A command response
//! is `{"r":{...},"f":[revision,status,rx_bytes]}` where a zero status means
//! the line was accepted. Status reports arrive as `{"sr":{...}}`, exception
//! reports as `{"er":{...}}`.

use gcodesend_core::{ControllerStatus, Position, StatusReport, Units};
use serde_json::{Map, Value};

use crate::firmware::Response;

/// Status code of an accepted command
const STAT_OK: u64 = 0;

/// Message carried by the startup response
const STARTUP_MESSAGE: &str = "SYSTEM READY";

/// Classify one TinyG / g2core line
///
/// Lines that are not JSON are echoes or console text. They and exception
/// reports become [`Response::Message`].
pub fn parse_line(line: &str) -> Option<Response> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let json = match serde_json::from_str::<Value>(line) {
        Ok(Value::Object(json)) => json,
        _ => return Some(Response::Message(line.to_string())),
    };

    if let Some(r) = json.get("r") {
        return Some(parse_command_response(line, r, json.get("f")));
    }

    if let Some(sr) = json.get("sr").and_then(Value::as_object) {
        return Some(Response::Status(parse_status_report(sr)));
    }

    Some(Response::Message(line.to_string()))
}

fn parse_command_response(line: &str, r: &Value, footer: Option<&Value>) -> Response {
    let message = r.get("msg").and_then(Value::as_str);
    if message.is_some_and(|m| m.eq_ignore_ascii_case(STARTUP_MESSAGE)) {
        return Response::Banner(line.to_string());
    }

    // Older firmware puts the footer inside the response body
    let status = footer
        .or_else(|| r.get("f"))
        .and_then(|f| f.get(1))
        .and_then(Value::as_u64)
        .unwrap_or(STAT_OK);

    if status == STAT_OK {
        Response::Ack
    } else {
        Response::Error {
            code: u32::try_from(status).unwrap_or(u32::MAX),
            message: message
                .map(str::to_string)
                .unwrap_or_else(|| format!("Status code {}", status)),
        }
    }
}

/// Map a TinyG `stat` machine state code
pub fn controller_status(stat: u64) -> ControllerStatus {
    match stat {
        0 | 1 | 3 | 4 => ControllerStatus::Idle,
        2 | 12 | 13 => ControllerStatus::Alarm,
        5 | 7 | 8 => ControllerStatus::Run,
        6 => ControllerStatus::Hold,
        9 => ControllerStatus::Home,
        10 => ControllerStatus::Jog,
        11 => ControllerStatus::Door,
        _ => ControllerStatus::Unknown,
    }
}

/// Parse the body of an `sr` object
///
/// Positions come either as flat keys (`posx`, `mpox`, ...) or nested
/// `pos` / `mpos` objects depending on firmware build.
pub fn parse_status_report(sr: &Map<String, Value>) -> StatusReport {
    let units = match sr.get("unit").and_then(Value::as_u64) {
        Some(0) => Units::INCH,
        _ => Units::MM,
    };

    StatusReport {
        status: sr
            .get("stat")
            .and_then(Value::as_u64)
            .map(controller_status)
            .unwrap_or_default(),
        machine_pos: flat_position(sr, "mpo", units).or_else(|| nested_position(sr, "mpos", units)),
        work_pos: flat_position(sr, "pos", units).or_else(|| nested_position(sr, "pos", units)),
        feed_rate: sr.get("vel").or_else(|| sr.get("feed")).and_then(Value::as_f64),
        spindle_speed: sr.get("sps").and_then(Value::as_f64),
        buffer: None,
    }
}

fn flat_position(sr: &Map<String, Value>, prefix: &str, units: Units) -> Option<Position> {
    let axis = |letter: char| {
        sr.get(&format!("{}{}", prefix, letter))
            .and_then(Value::as_f64)
    };
    build_position(axis('x'), axis('y'), axis('z'), axis('a'), axis('b'), axis('c'), units)
}

fn nested_position(sr: &Map<String, Value>, key: &str, units: Units) -> Option<Position> {
    let obj = sr.get(key)?.as_object()?;
    let axis = |letter: &str| obj.get(letter).and_then(Value::as_f64);
    build_position(axis("x"), axis("y"), axis("z"), axis("a"), axis("b"), axis("c"), units)
}

fn build_position(
    x: Option<f64>,
    y: Option<f64>,
    z: Option<f64>,
    a: Option<f64>,
    b: Option<f64>,
    c: Option<f64>,
    units: Units,
) -> Option<Position> {
    if x.is_none() && y.is_none() && z.is_none() {
        return None;
    }
    Some(Position::with_axes(
        x.unwrap_or_default(),
        y.unwrap_or_default(),
        z.unwrap_or_default(),
        a.unwrap_or_default(),
        b.unwrap_or_default(),
        c.unwrap_or_default(),
        units,
    ))
}
