use thiserror::Error;

use crate::monitoring::types::EndpointKey;

pub const REGISTER_HINT: &str = "Use `/reg hostname port` to register server";
const DELETE_HINT: &str = "Use `/del hostname port` to remove server";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("{0}")]
    Usage(&'static str),

    #[error("Port must be a number between 1 and 65535, got `{0}`")]
    InvalidPort(String),
}

/// A command sent by a chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Register(EndpointKey),
    State,
    List,
    Delete(EndpointKey),
    Help,
}

impl Command {
    /// Parse a message. Text that is not a known command maps to [`Command::Help`].
    pub fn parse(text: &str) -> Result<Self, CommandError> {
        let mut parts = text.split_whitespace();

        let Some(name) = parts.next().and_then(|first| first.strip_prefix('/')) else {
            return Ok(Command::Help);
        };
        // Group chats address commands as `/state@botname`
        let name = name.split_once('@').map_or(name, |(name, _)| name);
        let args: Vec<&str> = parts.collect();

        match name.to_ascii_lowercase().as_str() {
            "reg" | "add" => parse_endpoint(&args, REGISTER_HINT).map(Command::Register),
            "del" => parse_endpoint(&args, DELETE_HINT).map(Command::Delete),
            "state" => Ok(Command::State),
            "list" => Ok(Command::List),
            _ => Ok(Command::Help),
        }
    }
}

fn parse_endpoint(args: &[&str], usage: &'static str) -> Result<EndpointKey, CommandError> {
    let [host, port] = args else {
        return Err(CommandError::Usage(usage));
    };

    let port = port
        .parse::<u16>()
        .ok()
        .filter(|&p| p != 0)
        .ok_or_else(|| CommandError::InvalidPort(port.to_string()))?;

    Ok(EndpointKey::new(*host, port))
}
