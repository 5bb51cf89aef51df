//! Parses line-oriented operator commands read from stdin.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    PresetVolume { pump: u8, nozzle: u8, volume_dl: u32, price: u16 },
    PresetMoney { pump: u8, nozzle: u8, money: u32, price: u16 },
    Pause { pump: u8 },
    Resume { pump: u8 },
    Cancel { pump: u8 },
    Status,
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty command")]
    Empty,
    #[error("unknown command {0:?}")]
    UnknownCommand(String),
    #[error("wrong number of arguments for {0:?}")]
    WrongArity(String),
    #[error("could not parse {0:?} as a number")]
    BadNumber(String),
}

fn number(token: &str) -> Result<u32, ParseError> {
    token.parse().map_err(|_| ParseError::BadNumber(token.to_string()))
}

/// Parses one line of operator input. Whitespace-separated tokens, case
/// insensitive command verb. Blank lines and `#`-prefixed comments parse as
/// an error rather than silently no-op, so a typo is never mistaken for a
/// deliberate blank line -- callers that want to skip those should check
/// before calling `parse_line`.
pub fn parse_line(line: &str) -> Result<ConsoleCommand, ParseError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let (verb, args) = tokens.split_first().ok_or(ParseError::Empty)?;

    match verb.to_ascii_lowercase().as_str() {
        "preset-volume" | "pv" => match args {
            [pump, nozzle, volume_dl, price] => Ok(ConsoleCommand::PresetVolume {
                pump: number(pump)? as u8,
                nozzle: number(nozzle)? as u8,
                volume_dl: number(volume_dl)?,
                price: number(price)? as u16,
            }),
            _ => Err(ParseError::WrongArity("preset-volume".into())),
        },
        "preset-money" | "pm" => match args {
            [pump, nozzle, money, price] => Ok(ConsoleCommand::PresetMoney {
                pump: number(pump)? as u8,
                nozzle: number(nozzle)? as u8,
                money: number(money)?,
                price: number(price)? as u16,
            }),
            _ => Err(ParseError::WrongArity("preset-money".into())),
        },
        "pause" => match args {
            [pump] => Ok(ConsoleCommand::Pause { pump: number(pump)? as u8 }),
            _ => Err(ParseError::WrongArity("pause".into())),
        },
        "resume" => match args {
            [pump] => Ok(ConsoleCommand::Resume { pump: number(pump)? as u8 }),
            _ => Err(ParseError::WrongArity("resume".into())),
        },
        "cancel" => match args {
            [pump] => Ok(ConsoleCommand::Cancel { pump: number(pump)? as u8 }),
            _ => Err(ParseError::WrongArity("cancel".into())),
        },
        "status" => Ok(ConsoleCommand::Status),
        "help" | "?" => Ok(ConsoleCommand::Help),
        "quit" | "exit" => Ok(ConsoleCommand::Quit),
        other => Err(ParseError::UnknownCommand(other.to_string())),
    }
}
