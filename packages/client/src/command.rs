//! Parsing of the interactive command line.
//!
//! Pure functions only, so every command can be tested without a store.

use hanabi_core::domain::{
    ConfettiLaunch, GroupId, GroupName, Position, UserName, ValueObjectError, Vote,
};
use thiserror::Error;

pub const HELP: &str = "\
Commands:
  vote <card>                 cast a vote (0.5 1 2 3 5 8 13 21 34)
  unvote                      clear your vote
  show                        reveal or hide the votes
  reset                       hide the votes and clear every vote
  name <new name>             change your name
  group new                   create a group
  group rename <id> <name>    rename a group
  group delete <id>           delete a group (members move to the default group)
  group join <id>             move yourself to a group
  confetti [angle velocity x y]
                              launch confetti for everyone
  confetti drag <x1> <y1> <x2> <y2> [width height]
                              launch along a drag on a width x height
                              screen (100 x 100 by default)
  room                        print the room again
  help                        print this help
  quit                        leave the room";

/// One line typed by the user
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Vote(Vote),
    Unvote,
    ToggleShow,
    Reset,
    Rename(UserName),
    CreateGroup,
    RenameGroup(GroupId, GroupName),
    DeleteGroup(GroupId),
    JoinGroup(GroupId),
    Confetti(ConfettiLaunch),
    ShowRoom,
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq)]
pub enum CommandParseError {
    #[error("Unknown command '{0}'. Type 'help' for the list of commands.")]
    Unknown(String),

    #[error("Usage: {0}")]
    Usage(&'static str),

    #[error("'{0}' is not a number")]
    InvalidNumber(String),

    #[error(transparent)]
    InvalidValue(#[from] ValueObjectError),
}

/// Parse one input line. Surrounding whitespace is ignored.
pub fn parse_command(line: &str) -> Result<Command, CommandParseError> {
    let line = line.trim();
    let (keyword, rest) = split_word(line);

    match keyword {
        "vote" if rest.is_empty() => Err(CommandParseError::Usage("vote <card>")),
        "vote" => Ok(Command::Vote(Vote::parse(rest)?)),
        "unvote" => Ok(Command::Unvote),
        "show" => Ok(Command::ToggleShow),
        "reset" => Ok(Command::Reset),
        "name" => Ok(Command::Rename(UserName::new(rest.to_string())?)),
        "group" => parse_group(rest),
        "confetti" => parse_confetti(rest),
        "room" => Ok(Command::ShowRoom),
        "help" | "?" => Ok(Command::Help),
        "quit" | "exit" => Ok(Command::Quit),
        other => Err(CommandParseError::Unknown(other.to_string())),
    }
}

fn split_word(input: &str) -> (&str, &str) {
    match input.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (input, ""),
    }
}

fn parse_group(args: &str) -> Result<Command, CommandParseError> {
    let (action, rest) = split_word(args);
    let (id, name) = split_word(rest);

    match action {
        "new" => Ok(Command::CreateGroup),
        "rename" if !id.is_empty() && !name.is_empty() => Ok(Command::RenameGroup(
            GroupId::try_from(id)?,
            GroupName::new(name.to_string())?,
        )),
        "rename" => Err(CommandParseError::Usage("group rename <id> <name>")),
        "delete" if !id.is_empty() => Ok(Command::DeleteGroup(GroupId::try_from(id)?)),
        "delete" => Err(CommandParseError::Usage("group delete <id>")),
        "join" if !id.is_empty() => Ok(Command::JoinGroup(GroupId::try_from(id)?)),
        "join" => Err(CommandParseError::Usage("group join <id>")),
        _ => Err(CommandParseError::Usage(
            "group new | group rename <id> <name> | group delete <id> | group join <id>",
        )),
    }
}

/// Screen size assumed by `confetti drag` without an explicit size
const DRAG_VIEWPORT: (f64, f64) = (100.0, 100.0);

fn parse_numbers(args: &str) -> Result<Vec<f64>, CommandParseError> {
    args.split_whitespace()
        .map(|raw| {
            raw.parse::<f64>()
                .ok()
                .filter(|value| value.is_finite())
                .ok_or_else(|| CommandParseError::InvalidNumber(raw.to_string()))
        })
        .collect()
}

fn parse_confetti(args: &str) -> Result<Command, CommandParseError> {
    let (keyword, rest) = split_word(args);
    if keyword == "drag" {
        return parse_confetti_drag(rest);
    }

    match parse_numbers(args)?.as_slice() {
        [] => Ok(Command::Confetti(ConfettiLaunch::default())),
        [angle, velocity, x, y] => Ok(Command::Confetti(ConfettiLaunch {
            angle: *angle,
            velocity: *velocity,
            position: Position::new(x.clamp(0.0, 1.0), y.clamp(0.0, 1.0)),
        })),
        _ => Err(CommandParseError::Usage("confetti [angle velocity x y]")),
    }
}

fn parse_confetti_drag(args: &str) -> Result<Command, CommandParseError> {
    let (start, end, viewport) = match parse_numbers(args)?.as_slice() {
        [x1, y1, x2, y2] => ((*x1, *y1), (*x2, *y2), DRAG_VIEWPORT),
        [x1, y1, x2, y2, width, height] if *width > 0.0 && *height > 0.0 => {
            ((*x1, *y1), (*x2, *y2), (*width, *height))
        }
        _ => {
            return Err(CommandParseError::Usage(
                "confetti drag <x1> <y1> <x2> <y2> [width height]",
            ));
        }
    };

    let mut launch = ConfettiLaunch::from_drag(start, end, viewport);
    launch.position = Position::new(
        launch.position.x.clamp(0.0, 1.0),
        launch.position.y.clamp(0.0, 1.0),
    );
    Ok(Command::Confetti(launch))
}
