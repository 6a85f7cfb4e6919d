//! Line commands for the interactive client and server shells.

/// A line the shell could not turn into a command.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("unknown command {0:?}, try `help`")]
    Unknown(String),

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("{0:?} is not a unit count")]
    InvalidUnits(String),
}

const SPAWN_USAGE: &str = "spawn <territory> <units>";
const MOVE_USAGE: &str = "move <from> <units> <to> [<to> ...]";

/// Commands accepted by `peril-client`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    Spawn { territory: String, units: u32 },
    Move { from: String, to: Vec<String>, units: u32 },
    Status,
    Help,
    Quit,
}

/// Commands accepted by `peril-server`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerCommand {
    Pause,
    Resume,
    Help,
    Quit,
}

pub const CLIENT_HELP: &str = "\
Commands:
  spawn <territory> <units>            place new units
  move <from> <units> <to> [<to> ...]  send units into each destination
  status                               show your territories
  help                                 show this help
  quit                                 leave the game";

pub const SERVER_HELP: &str = "\
Commands:
  pause   pause the game
  resume  resume the game
  help    show this help
  quit    shut the server down";

fn parse_units(word: &str) -> Result<u32, CommandError> {
    word.parse()
        .map_err(|_| CommandError::InvalidUnits(word.to_string()))
}

/// Parses one client line. Returns `Ok(None)` for a blank line.
pub fn parse_client_command(line: &str) -> Result<Option<ClientCommand>, CommandError> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let Some((first, rest)) = words.split_first() else {
        return Ok(None);
    };
    let command = match first.to_ascii_lowercase().as_str() {
        "spawn" => match rest {
            [territory, units] => ClientCommand::Spawn {
                territory: (*territory).to_string(),
                units: parse_units(units)?,
            },
            _ => return Err(CommandError::Usage(SPAWN_USAGE)),
        },
        "move" => match rest {
            [from, units, to @ ..] if !to.is_empty() => ClientCommand::Move {
                from: (*from).to_string(),
                to: to.iter().map(|t| (*t).to_string()).collect(),
                units: parse_units(units)?,
            },
            _ => return Err(CommandError::Usage(MOVE_USAGE)),
        },
        "status" => ClientCommand::Status,
        "help" => ClientCommand::Help,
        "quit" | "exit" => ClientCommand::Quit,
        other => return Err(CommandError::Unknown(other.to_string())),
    };
    Ok(Some(command))
}

/// Parses one server line. Returns `Ok(None)` for a blank line.
pub fn parse_server_command(line: &str) -> Result<Option<ServerCommand>, CommandError> {
    let Some(first) = line.split_whitespace().next() else {
        return Ok(None);
    };
    let command = match first.to_ascii_lowercase().as_str() {
        "pause" => ServerCommand::Pause,
        "resume" => ServerCommand::Resume,
        "help" => ServerCommand::Help,
        "quit" | "exit" => ServerCommand::Quit,
        other => return Err(CommandError::Unknown(other.to_string())),
    };
    Ok(Some(command))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_commands() {
        assert_eq!(parse_client_command("   "), Ok(None));
        assert_eq!(
            parse_client_command("spawn gaul 3"),
            Ok(Some(ClientCommand::Spawn {
                territory: "gaul".into(),
                units: 3
            }))
        );
        assert_eq!(
            parse_client_command("MOVE rome 2 gaul iberia"),
            Ok(Some(ClientCommand::Move {
                from: "rome".into(),
                to: vec!["gaul".into(), "iberia".into()],
                units: 2
            }))
        );
        assert_eq!(parse_client_command("status"), Ok(Some(ClientCommand::Status)));
        assert_eq!(parse_client_command("quit"), Ok(Some(ClientCommand::Quit)));
    }

    #[test]
    fn test_client_command_errors() {
        assert_eq!(
            parse_client_command("spawn gaul"),
            Err(CommandError::Usage(SPAWN_USAGE))
        );
        assert_eq!(
            parse_client_command("move rome 2"),
            Err(CommandError::Usage(MOVE_USAGE))
        );
        assert_eq!(
            parse_client_command("spawn gaul many"),
            Err(CommandError::InvalidUnits("many".into()))
        );
        assert_eq!(
            parse_client_command("spawn gaul -1"),
            Err(CommandError::InvalidUnits("-1".into()))
        );
        assert_eq!(
            parse_client_command("attack"),
            Err(CommandError::Unknown("attack".into()))
        );
    }

    #[test]
    fn test_server_commands() {
        assert_eq!(parse_server_command(""), Ok(None));
        assert_eq!(parse_server_command("pause"), Ok(Some(ServerCommand::Pause)));
        assert_eq!(parse_server_command(" resume "), Ok(Some(ServerCommand::Resume)));
        assert_eq!(parse_server_command("exit"), Ok(Some(ServerCommand::Quit)));
        assert!(matches!(
            parse_server_command("reboot"),
            Err(CommandError::Unknown(_))
        ));
    }
}
