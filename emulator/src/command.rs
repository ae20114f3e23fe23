//! Command grammar of the emulator REPL.

use std::fmt;

use door_core::clock::{HOUR_MS, MINUTE_MS, SECOND_MS};
use winnow::ModalResult;
use winnow::ascii::{dec_uint, space0, space1};
use winnow::combinator::{alt, opt, preceded, terminated};
use winnow::prelude::*;
use winnow::token::take_while;

/// Hold time of `press` when no `for <duration>` is given.
pub const DEFAULT_HOLD_MS: u32 = 100;

pub const HELP_TOPICS: &[(&str, &str)] = &[
    ("advance", "advance <duration>           - run both nodes for 250ms, 10s, 2m or 1h"),
    ("door", "door <open|closed|split>     - move the door; split leaves one contact pressed"),
    (
        "press",
        "press <button> [for <dur>]   - keep-open, dash-keep-open, dash-close or dash-ack",
    ),
    ("link", "link <up|down>               - connect or cut the serial link"),
    ("status", "status                       - show both nodes"),
    (
        "telemetry",
        "telemetry [controller|dashboard] - dump the retained telemetry",
    ),
    ("help", "help [topic]                 - show help for a command"),
];

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DoorPosition {
    Open,
    Closed,
    /// Contacts disagree.
    Split,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ButtonId {
    /// Button wired to the controller.
    KeepOpen,
    DashboardKeepOpen,
    DashboardClose,
    DashboardAck,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum NodeId {
    Controller,
    Dashboard,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Command {
    Help(Option<String>),
    Status,
    Advance(u32),
    Door(DoorPosition),
    Press { button: ButtonId, hold_ms: u32 },
    Link(bool),
    Telemetry(Option<NodeId>),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandError {
    pub offset: usize,
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unrecognized input at column {}", self.offset + 1)
    }
}

/// Parses one REPL line; keywords are case-insensitive.
pub fn parse(line: &str) -> Result<Command, CommandError> {
    let line = line.trim().to_ascii_lowercase();
    terminated(command, space0)
        .parse(line.as_str())
        .map_err(|error| CommandError {
            offset: error.offset(),
        })
}

fn command(input: &mut &str) -> ModalResult<Command> {
    alt((
        preceded("help", opt(preceded(space1, topic))).map(Command::Help),
        "status".value(Command::Status),
        preceded(("advance", space1), duration).map(Command::Advance),
        preceded(("door", space1), door_position).map(Command::Door),
        preceded(("press", space1), press),
        preceded(("link", space1), alt(("up".value(true), "down".value(false))))
            .map(Command::Link),
        preceded("telemetry", opt(preceded(space1, node))).map(Command::Telemetry),
    ))
    .parse_next(input)
}

fn topic(input: &mut &str) -> ModalResult<String> {
    take_while(1.., |c: char| c.is_ascii_alphanumeric() || c == '-')
        .map(str::to_owned)
        .parse_next(input)
}

/// Decimal amount followed by `ms`, `s`, `m` or `h`.
fn duration(input: &mut &str) -> ModalResult<u32> {
    (
        dec_uint::<_, u32, _>,
        alt((
            "ms".value(1),
            "s".value(SECOND_MS),
            "m".value(MINUTE_MS),
            "h".value(HOUR_MS),
        )),
    )
        .verify_map(|(amount, unit)| amount.checked_mul(unit))
        .parse_next(input)
}

fn door_position(input: &mut &str) -> ModalResult<DoorPosition> {
    alt((
        "open".value(DoorPosition::Open),
        "closed".value(DoorPosition::Closed),
        "split".value(DoorPosition::Split),
    ))
    .parse_next(input)
}

fn press(input: &mut &str) -> ModalResult<Command> {
    let button = alt((
        "keep-open".value(ButtonId::KeepOpen),
        "dash-keep-open".value(ButtonId::DashboardKeepOpen),
        "dash-close".value(ButtonId::DashboardClose),
        "dash-ack".value(ButtonId::DashboardAck),
    ))
    .parse_next(input)?;
    let hold_ms = opt(preceded((space1, "for", space1), duration))
        .parse_next(input)?
        .unwrap_or(DEFAULT_HOLD_MS);

    Ok(Command::Press { button, hold_ms })
}

fn node(input: &mut &str) -> ModalResult<NodeId> {
    alt((
        "controller".value(NodeId::Controller),
        "dashboard".value(NodeId::Dashboard),
    ))
    .parse_next(input)
}
