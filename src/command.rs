//! Parsing of operator command lines into requests.
//!
//! ```text
//! Start_Alarm(<id>): Group(<group_id>) <interval> <seconds_until_expiry> <message...>
//! Change_Alarm(<id>): Group(<group_id>) <seconds_until_expiry> <message...>
//! Cancel_Alarm(<id>)
//! Suspend_Alarm(<id>)
//! Reactivate_Alarm(<id>)
//! View_Alarms
//! quit | exit
//! ```

use std::sync::LazyLock;

use chrono::{DateTime, Local};
use regex::{Captures, Regex};
use thiserror::Error;

use crate::alarm::{Alarm, RequestKind};

static START: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Start_Alarm\((-?\d+)\):\s*Group\((-?\d+)\)\s+(-?\d+)\s+(-?\d+)(?:\s(.*))?$")
        .expect("start pattern is valid")
});
static CHANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Change_Alarm\((-?\d+)\):\s*Group\((-?\d+)\)\s+(-?\d+)(?:\s(.*))?$")
        .expect("change pattern is valid")
});
static TARGETED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(Cancel|Suspend|Reactivate)_Alarm\((-?\d+)\)$")
        .expect("targeted pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Invalid parameters (IDs, interval, or time must be positive)")]
    InvalidParameters,
    #[error("Unrecognized command format")]
    UnrecognizedFormat,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Request(Alarm),
    Quit,
}

/// Parses one input line received at `received_at`.
///
/// # Errors
/// [`ParseError::InvalidParameters`] when a numeric field is not strictly
/// positive, [`ParseError::UnrecognizedFormat`] for anything else that does
/// not match the grammar.
pub fn parse_command(line: &str, received_at: DateTime<Local>) -> Result<Command, ParseError> {
    let line = line.trim_end_matches(['\r', '\n']);
    if matches!(line.trim(), "quit" | "exit") {
        return Ok(Command::Quit);
    }
    if line == "View_Alarms" {
        return Ok(Command::Request(Alarm::view(received_at)));
    }

    if let Some(caps) = START.captures(line) {
        let alarm_id = positive(&caps, 1)?;
        let group_id = positive(&caps, 2)?;
        let interval = positive(&caps, 3)?;
        let duration = positive(&caps, 4)?;
        return Ok(Command::Request(Alarm::start(
            alarm_id,
            group_id,
            interval,
            duration,
            message(&caps, 5),
            received_at,
        )));
    }

    if let Some(caps) = CHANGE.captures(line) {
        let alarm_id = positive(&caps, 1)?;
        let group_id = positive(&caps, 2)?;
        let duration = positive(&caps, 3)?;
        return Ok(Command::Request(Alarm::change(
            alarm_id,
            group_id,
            duration,
            message(&caps, 4),
            received_at,
        )));
    }

    if let Some(caps) = TARGETED.captures(line) {
        let kind = match &caps[1] {
            "Cancel" => RequestKind::Cancel,
            "Suspend" => RequestKind::Suspend,
            _ => RequestKind::Reactivate,
        };
        let alarm_id = positive(&caps, 2)?;
        return Ok(Command::Request(Alarm::targeted(kind, alarm_id, received_at)));
    }

    Err(ParseError::UnrecognizedFormat)
}

fn positive(caps: &Captures<'_>, index: usize) -> Result<u32, ParseError> {
    caps[index]
        .parse::<u32>()
        .ok()
        .filter(|value| *value > 0)
        .ok_or(ParseError::InvalidParameters)
}

fn message<'a>(caps: &Captures<'a>, index: usize) -> &'a str {
    caps.get(index).map_or("", |m| m.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Result<Command, ParseError> {
        parse_command(line, Local::now())
    }

    fn request(line: &str) -> Alarm {
        match parse(line) {
            Ok(Command::Request(alarm)) => alarm,
            other => panic!("expected a request for {line:?}, got {other:?}"),
        }
    }

    #[test]
    fn start_alarm() {
        let alarm = request("Start_Alarm(1): Group(5) 2 10 hello there");
        assert_eq!(alarm.kind, RequestKind::Start);
        assert_eq!(alarm.alarm_id, 1);
        assert_eq!(alarm.group_id, 5);
        assert_eq!(alarm.interval, 2);
        assert_eq!(alarm.duration, 10);
        assert_eq!(alarm.message, "hello there");
    }

    #[test]
    fn start_alarm_without_message() {
        let alarm = request("Start_Alarm(3): Group(1) 1 1");
        assert_eq!(alarm.message, "");
    }

    #[test]
    fn change_alarm_leaves_interval_unset() {
        let alarm = request("Change_Alarm(1): Group(7) 60 bye");
        assert_eq!(alarm.kind, RequestKind::Change);
        assert_eq!(alarm.group_id, 7);
        assert_eq!(alarm.duration, 60);
        assert_eq!(alarm.interval, 0);
        assert_eq!(alarm.message, "bye");
    }

    #[test]
    fn targeted_requests() {
        assert_eq!(request("Cancel_Alarm(4)").kind, RequestKind::Cancel);
        assert_eq!(request("Suspend_Alarm(123)").alarm_id, 123);
        assert_eq!(request("Reactivate_Alarm(456)").kind, RequestKind::Reactivate);
        assert_eq!(request("View_Alarms").kind, RequestKind::View);
    }

    #[test]
    fn quit_and_exit() {
        assert_eq!(parse("quit"), Ok(Command::Quit));
        assert_eq!(parse("exit\n"), Ok(Command::Quit));
    }

    #[test]
    fn non_positive_numbers_are_invalid_parameters() {
        for line in [
            "Start_Alarm(0): Group(5) 2 10 hi",
            "Start_Alarm(1): Group(-5) 2 10 hi",
            "Start_Alarm(1): Group(5) 0 10 hi",
            "Start_Alarm(1): Group(5) 2 -10 hi",
            "Change_Alarm(1): Group(0) 10 hi",
            "Cancel_Alarm(-1)",
            "Suspend_Alarm(0)",
            "Start_Alarm(99999999999): Group(5) 2 10 hi",
        ] {
            assert_eq!(parse(line), Err(ParseError::InvalidParameters), "{line}");
        }
    }

    #[test]
    fn garbage_is_unrecognized() {
        for line in [
            "",
            "Start_Alarm(a): Group(5) 2 10 hi",
            "start_alarm(1): Group(5) 2 10 hi",
            "Start_Alarm(1) Group(5) 2 10",
            "Change_Alarm(1): Group(5)",
            "View_Alarms please",
            "Cancel_Alarm()",
        ] {
            assert_eq!(parse(line), Err(ParseError::UnrecognizedFormat), "{line}");
        }
    }
}
