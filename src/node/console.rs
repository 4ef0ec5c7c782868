use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use super::events::EventReceiver;
use super::node::RingNode;
use crate::error::RingError;
use crate::ring::membership::EnterOutcome;
use crate::ring::state::NodeSnapshot;
use crate::ring::types::{Key, check_id};

/// One operator command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Enter,
    Exit,
    Lookup(Key),
    Insert(Key, String),
    Delete(Key),
    Print,
    Status,
    Quit,
}

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("")]
    Empty,
    #[error("unknown command '{0}' (try: enter, exit, lookup, insert, delete, print, status, quit)")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("invalid key '{0}'")]
    BadKey(String),
    #[error(transparent)]
    OutOfBounds(#[from] RingError),
}

pub fn parse_command(line: &str) -> Result<Command, CommandError> {
    let line = line.trim();
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };

    match verb {
        "" => Err(CommandError::Empty),
        "enter" => no_args(rest, Command::Enter, "enter"),
        "exit" => no_args(rest, Command::Exit, "exit"),
        "print" => no_args(rest, Command::Print, "print"),
        "status" => no_args(rest, Command::Status, "status"),
        "quit" => no_args(rest, Command::Quit, "quit"),
        "lookup" => Ok(Command::Lookup(single_key(rest, "lookup <key>")?)),
        "delete" => Ok(Command::Delete(single_key(rest, "delete <key>")?)),
        "insert" => {
            let (raw_key, value) = rest
                .split_once(char::is_whitespace)
                .ok_or(CommandError::Usage("insert <key> <value>"))?;
            let key = parse_key(raw_key)?;
            Ok(Command::Insert(key, value.trim().to_string()))
        }
        other => Err(CommandError::Unknown(other.to_string())),
    }
}

fn no_args(rest: &str, command: Command, usage: &'static str) -> Result<Command, CommandError> {
    if rest.is_empty() {
        Ok(command)
    } else {
        Err(CommandError::Usage(usage))
    }
}

fn single_key(rest: &str, usage: &'static str) -> Result<Key, CommandError> {
    if rest.is_empty() || rest.contains(char::is_whitespace) {
        return Err(CommandError::Usage(usage));
    }
    parse_key(rest)
}

fn parse_key(raw: &str) -> Result<Key, CommandError> {
    let key: u32 = raw
        .parse()
        .map_err(|_| CommandError::BadKey(raw.to_string()))?;
    Ok(check_id(key)?)
}

/// Runs one command and returns what the operator should see. Routed
/// results show up later as events, at the bootstrap node.
pub async fn execute(node: &RingNode, command: Command) -> String {
    let outcome = match command {
        Command::Enter => match node.enter().await {
            Ok(EnterOutcome::Joined(_)) => return String::new(),
            Ok(EnterOutcome::Pending) => {
                return "Entry request forwarded, waiting for admission".to_string();
            }
            Err(e) => Err(e),
        },
        Command::Exit => node.leave().await,
        Command::Lookup(key) => node.lookup(key).await,
        Command::Insert(key, value) => node.insert(key, value).await,
        Command::Delete(key) => node.delete(key).await,
        Command::Print => node.print().await,
        Command::Status => return format_status(&node.snapshot().await),
        Command::Quit => return String::new(),
    };

    match outcome {
        Ok(()) => String::new(),
        Err(e) => format!("Error: {}", e),
    }
}

pub fn format_status(snapshot: &NodeSnapshot) -> String {
    if !snapshot.joined {
        return format!("Node {} is not on the ring", snapshot.identity);
    }
    format!(
        "Node {}\nRange: {}\nPredecessor: {}\nSuccessor: {}\nKeys held: {}",
        snapshot.identity,
        snapshot.range,
        snapshot.predecessor,
        snapshot.successor,
        snapshot.keys.len()
    )
}

/// Operator loop: reads commands from `input` and prints node events as
/// they arrive. Returns on `quit` or end of input; the node keeps serving.
pub async fn run<R>(node: Arc<RingNode>, input: R, mut events: EventReceiver)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => match parse_command(&line) {
                    Ok(Command::Quit) => break,
                    Ok(command) => {
                        let output = execute(&node, command).await;
                        if !output.is_empty() {
                            println!("{}", output);
                        }
                    }
                    Err(CommandError::Empty) => {}
                    Err(e) => println!("{}", e),
                },
                Ok(None) => break,
                Err(e) => {
                    tracing::error!("Failed to read operator input: {}", e);
                    break;
                }
            },
            Some(event) = events.recv() => println!("{}", event),
        }
    }

    tracing::info!("Operator loop for node {} stopped", node.id());
}
