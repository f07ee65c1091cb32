// Draft-room wire protocol: whitespace-delimited text commands.
//
//   SELECTING <team_id> <time_remaining_ms>
//   SELECTED  <pick_number> <player_id> <team_id> {<member_id>}
//   CLOCK     <team_id> <time_remaining_ms> [<round>]
//   AUTODRAFT <team_id> <true|false>
//   TOKEN | JOINED | LEFT | PING | PONG ...
//
// Anything else is an `Unknown` event and is ignored downstream.

use std::fmt;

use thiserror::Error;

/// Session-management traffic that carries no draft information.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    Token,
    Joined,
    Left,
    Ping,
    Pong,
}

impl SessionKind {
    fn from_command(command: &str) -> Option<Self> {
        match command {
            "TOKEN" => Some(SessionKind::Token),
            "JOINED" => Some(SessionKind::Joined),
            "LEFT" => Some(SessionKind::Left),
            "PING" => Some(SessionKind::Ping),
            "PONG" => Some(SessionKind::Pong),
            _ => None,
        }
    }

    pub fn is_heartbeat(&self) -> bool {
        matches!(self, SessionKind::Ping | SessionKind::Pong)
    }
}

/// A typed draft-room message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DraftEvent {
    /// A team has gone on the clock.
    Selecting { team_id: u32, time_remaining_ms: u64 },
    /// A pick has completed.
    Selected {
        pick_number: u32,
        player_id: String,
        team_id: u32,
        member_id: String,
    },
    /// Pick timer tick.
    Clock {
        team_id: u32,
        time_remaining_ms: u64,
        round: Option<u32>,
    },
    /// A team switched autodraft on or off.
    Autodraft { team_id: u32, enabled: bool },
    Session { kind: SessionKind, args: Vec<String> },
    /// A command this parser does not know about.
    Unknown { command: String },
}

impl DraftEvent {
    /// Short name used in logs and statistics.
    pub fn kind(&self) -> &'static str {
        match self {
            DraftEvent::Selecting { .. } => "SELECTING",
            DraftEvent::Selected { .. } => "SELECTED",
            DraftEvent::Clock { .. } => "CLOCK",
            DraftEvent::Autodraft { .. } => "AUTODRAFT",
            DraftEvent::Session { .. } => "SESSION",
            DraftEvent::Unknown { .. } => "UNKNOWN",
        }
    }
}

impl fmt::Display for DraftEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DraftEvent::Selecting { team_id, time_remaining_ms } => {
                write!(f, "SELECTING {team_id} {time_remaining_ms}")
            }
            DraftEvent::Selected { pick_number, player_id, team_id, member_id } => {
                write!(f, "SELECTED {pick_number} {player_id} {team_id} {{{member_id}}}")
            }
            DraftEvent::Clock { team_id, time_remaining_ms, round } => match round {
                Some(r) => write!(f, "CLOCK {team_id} {time_remaining_ms} {r}"),
                None => write!(f, "CLOCK {team_id} {time_remaining_ms}"),
            },
            DraftEvent::Autodraft { team_id, enabled } => write!(f, "AUTODRAFT {team_id} {enabled}"),
            DraftEvent::Session { kind, .. } => write!(f, "{kind:?}"),
            DraftEvent::Unknown { command } => write!(f, "{command}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("empty message")]
    Empty,

    #[error("{command}: expected {expected} fields, found {found}")]
    FieldCount {
        command: &'static str,
        expected: &'static str,
        found: usize,
    },

    #[error("{command}: field `{field}` is not an integer: {value:?}")]
    InvalidInteger {
        command: &'static str,
        field: &'static str,
        value: String,
    },

    #[error("{command}: field `{field}` is not a boolean: {value:?}")]
    InvalidBoolean {
        command: &'static str,
        field: &'static str,
        value: String,
    },

    #[error("SELECTED: member id must be wrapped in braces: {0:?}")]
    InvalidMemberId(String),
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse one raw line into a typed event.
///
/// Keywords are matched case-insensitively. Unknown keywords are not errors;
/// they produce [`DraftEvent::Unknown`].
pub fn parse(raw: &str) -> Result<DraftEvent, ParseError> {
    let parts: Vec<&str> = raw.split_whitespace().collect();
    let Some((&head, args)) = parts.split_first() else {
        return Err(ParseError::Empty);
    };
    let command = head.to_uppercase();

    match command.as_str() {
        "SELECTING" => {
            expect_fields("SELECTING", args, 2, 2)?;
            Ok(DraftEvent::Selecting {
                team_id: parse_int("SELECTING", "team_id", args[0])?,
                time_remaining_ms: parse_int("SELECTING", "time_remaining_ms", args[1])?,
            })
        }
        "SELECTED" => {
            expect_fields("SELECTED", args, 4, 4)?;
            Ok(DraftEvent::Selected {
                pick_number: parse_int("SELECTED", "pick_number", args[0])?,
                player_id: args[1].to_string(),
                team_id: parse_int("SELECTED", "team_id", args[2])?,
                member_id: parse_member_id(args[3])?,
            })
        }
        "CLOCK" => {
            expect_fields("CLOCK", args, 2, 3)?;
            // The room occasionally reports a slightly negative remainder.
            let remaining: i64 = parse_int("CLOCK", "time_remaining_ms", args[1])?;
            Ok(DraftEvent::Clock {
                team_id: parse_int("CLOCK", "team_id", args[0])?,
                time_remaining_ms: remaining.max(0) as u64,
                round: args
                    .get(2)
                    .map(|r| parse_int("CLOCK", "round", r))
                    .transpose()?,
            })
        }
        "AUTODRAFT" => {
            expect_fields("AUTODRAFT", args, 2, 2)?;
            let enabled = match args[1].to_lowercase().as_str() {
                "true" => true,
                "false" => false,
                _ => {
                    return Err(ParseError::InvalidBoolean {
                        command: "AUTODRAFT",
                        field: "enabled",
                        value: args[1].to_string(),
                    })
                }
            };
            Ok(DraftEvent::Autodraft {
                team_id: parse_int("AUTODRAFT", "team_id", args[0])?,
                enabled,
            })
        }
        other => match SessionKind::from_command(other) {
            Some(kind) => Ok(DraftEvent::Session {
                kind,
                args: args.iter().map(|s| s.to_string()).collect(),
            }),
            None => Ok(DraftEvent::Unknown { command: command.clone() }),
        },
    }
}

fn expect_fields(
    command: &'static str,
    args: &[&str],
    min: usize,
    max: usize,
) -> Result<(), ParseError> {
    if (min..=max).contains(&args.len()) {
        return Ok(());
    }
    let expected = match (min, max) {
        (2, 2) => "2",
        (4, 4) => "4",
        (2, 3) => "2 or 3",
        _ => "a fixed number of",
    };
    Err(ParseError::FieldCount {
        command,
        expected,
        found: args.len(),
    })
}

fn parse_int<T: std::str::FromStr>(
    command: &'static str,
    field: &'static str,
    value: &str,
) -> Result<T, ParseError> {
    value.parse().map_err(|_| ParseError::InvalidInteger {
        command,
        field,
        value: value.to_string(),
    })
}

fn parse_member_id(token: &str) -> Result<String, ParseError> {
    token
        .strip_prefix('{')
        .and_then(|rest| rest.strip_suffix('}'))
        .filter(|inner| !inner.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ParseError::InvalidMemberId(token.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_selecting() {
        assert_eq!(
            parse("SELECTING 1 30000"),
            Ok(DraftEvent::Selecting {
                team_id: 1,
                time_remaining_ms: 30_000
            })
        );
    }

    #[test]
    fn parses_selected_with_braced_member() {
        let event = parse("SELECTED 1 3918298 1 {M1}").unwrap();
        assert_eq!(
            event,
            DraftEvent::Selected {
                pick_number: 1,
                player_id: "3918298".into(),
                team_id: 1,
                member_id: "M1".into(),
            }
        );
        assert_eq!(event.kind(), "SELECTED");
    }

    #[test]
    fn parses_guid_member_id() {
        let event = parse("SELECTED 14 4362238 2 {6B3E1F0A-1C2D-4E5F-8A9B-0C1D2E3F4A5B}").unwrap();
        match event {
            DraftEvent::Selected { member_id, .. } => {
                assert_eq!(member_id, "6B3E1F0A-1C2D-4E5F-8A9B-0C1D2E3F4A5B")
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn tolerates_extra_whitespace_and_case() {
        assert_eq!(
            parse("  selecting\t4   90000 \n"),
            Ok(DraftEvent::Selecting {
                team_id: 4,
                time_remaining_ms: 90_000
            })
        );
    }

    #[test]
    fn empty_line_is_error() {
        assert_eq!(parse(""), Err(ParseError::Empty));
        assert_eq!(parse("   "), Err(ParseError::Empty));
    }

    #[test]
    fn wrong_field_count_is_error() {
        assert!(matches!(
            parse("SELECTING 1"),
            Err(ParseError::FieldCount { command: "SELECTING", found: 1, .. })
        ));
        assert!(matches!(
            parse("SELECTED 1 3918298 1 {M1} extra"),
            Err(ParseError::FieldCount { command: "SELECTED", found: 5, .. })
        ));
    }

    #[test]
    fn non_integer_fields_are_errors() {
        assert!(matches!(
            parse("SELECTING one 30000"),
            Err(ParseError::InvalidInteger { field: "team_id", .. })
        ));
        assert!(matches!(
            parse("SELECTED x 3918298 1 {M1}"),
            Err(ParseError::InvalidInteger { field: "pick_number", .. })
        ));
        assert!(matches!(
            parse("SELECTING -1 30000"),
            Err(ParseError::InvalidInteger { .. })
        ));
    }

    #[test]
    fn member_id_requires_braces() {
        assert_eq!(
            parse("SELECTED 1 3918298 1 M1"),
            Err(ParseError::InvalidMemberId("M1".into()))
        );
        assert_eq!(
            parse("SELECTED 1 3918298 1 {}"),
            Err(ParseError::InvalidMemberId("{}".into()))
        );
    }

    #[test]
    fn parses_clock_with_and_without_round() {
        assert_eq!(
            parse("CLOCK 3 15000 2"),
            Ok(DraftEvent::Clock {
                team_id: 3,
                time_remaining_ms: 15_000,
                round: Some(2)
            })
        );
        assert_eq!(
            parse("CLOCK 3 -120"),
            Ok(DraftEvent::Clock {
                team_id: 3,
                time_remaining_ms: 0,
                round: None
            })
        );
    }

    #[test]
    fn parses_autodraft() {
        assert_eq!(
            parse("AUTODRAFT 5 TRUE"),
            Ok(DraftEvent::Autodraft { team_id: 5, enabled: true })
        );
        assert!(matches!(
            parse("AUTODRAFT 5 maybe"),
            Err(ParseError::InvalidBoolean { .. })
        ));
    }

    #[test]
    fn session_messages_are_recognized() {
        match parse("PING").unwrap() {
            DraftEvent::Session { kind, args } => {
                assert!(kind.is_heartbeat());
                assert!(args.is_empty());
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(matches!(
            parse("JOINED 7 abc").unwrap(),
            DraftEvent::Session { kind: SessionKind::Joined, .. }
        ));
    }

    #[test]
    fn unknown_commands_are_not_errors() {
        assert_eq!(
            parse("TRADE 1 2 3"),
            Ok(DraftEvent::Unknown { command: "TRADE".into() })
        );
    }

    #[test]
    fn display_matches_wire_format() {
        let line = "SELECTED 1 3918298 1 {M1}";
        assert_eq!(parse(line).unwrap().to_string(), line);
    }
}
