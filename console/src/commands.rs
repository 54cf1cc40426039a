//! Command interpreter: maps operator input onto registry and supervisor
//! operations.
//!
//! All operator-facing output goes to stdout via `println!`; refusals and
//! unknown input are reported there too and never escalate out of the
//! command loop.

use colored::{ColoredString, Colorize};

use otawake_shared::state::UploadState;

use crate::device::{DeviceSnapshot, HistoryEntry};
use crate::errors::ConsoleError;
use crate::supervisor::Supervisor;

const TIME_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

/// One parsed operator command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    List,
    States { raw: bool },
    Update(String),
    Stop(String),
    History(String),
    Clear(String),
    Exit,
    Empty,
    Unknown(String),
}

fn is_argument(text: &str) -> bool {
    !text.is_empty()
        && text
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// Parse one input line.
pub fn parse(line: &str) -> Command {
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else {
        return Command::Empty;
    };
    let argument = words.next();
    if words.next().is_some() {
        return Command::Unknown(line.trim().to_string());
    }
    if let Some(arg) = argument {
        if !is_argument(arg) {
            return Command::Unknown(line.trim().to_string());
        }
    }

    match (command, argument) {
        ("help", None) => Command::Help,
        ("list", None) => Command::List,
        ("states" | "state", None) => Command::States { raw: false },
        ("states" | "state", Some("raw")) => Command::States { raw: true },
        ("update" | "upload", Some(name)) => Command::Update(name.to_string()),
        ("stop", Some(name)) => Command::Stop(name.to_string()),
        ("history", Some(name)) => Command::History(name.to_string()),
        ("clear", Some(name)) => Command::Clear(name.to_string()),
        ("exit", None) => Command::Exit,
        _ => Command::Unknown(line.trim().to_string()),
    }
}

/// Execute one command. Returns `false` when the loop should exit.
pub async fn dispatch(supervisor: &Supervisor, command: Command) -> bool {
    match command {
        Command::Empty => {}
        Command::Exit => return false,
        Command::Help => print_help(),
        Command::List => {
            for name in supervisor.names() {
                println!("{}", name);
            }
        }
        Command::States { raw } => print_states(&supervisor.snapshots().await, raw),
        Command::Update(name) => report(supervisor.start(&name).await),
        Command::Stop(name) => report(supervisor.stop(&name).await),
        Command::History(name) => match supervisor.history(&name).await {
            Ok(history) => print_history(&name, &history),
            Err(e) => println!("{}", e),
        },
        Command::Clear(name) => report(supervisor.clear_history(&name).await),
        Command::Unknown(input) => println!("Unknown command: {}", input),
    }
    true
}

fn report(result: Result<(), ConsoleError>) {
    if let Err(e) = result {
        println!("{}", e);
    }
}

fn print_help() {
    println!(
        "Available commands:\n\n\
         - list                  Show the list of known devices\n\
         - states [raw]          Show the list of known devices with their current state\n\
         - update <device_name>  Start a task to upload a new code for a device\n\
         - stop <device_name>    Stop an upload task\n\
         - history <device_name> Show device upload states history\n\
         - clear <device_name>   Clear history\n\
         - exit                  Leave the application, stopping all upload tasks\n\
         - help                  Show this help screen\n"
    );
}

fn print_states(snapshots: &[DeviceSnapshot], raw: bool) {
    if !raw {
        println!("Device Name       Sleep Dur     State     Last Upload");
        println!("---------------- ---------- ------------- ---------------------");
    }

    for snap in snapshots {
        let last = snap
            .last_success
            .map(|when| when.format(TIME_FORMAT).to_string())
            .unwrap_or_else(|| "NONE".to_string());
        if raw {
            println!(
                "{},{},{},{}",
                snap.name, snap.sleep_duration, snap.state, last
            );
        } else {
            println!(
                "{:16} {:10} {} {}",
                snap.name,
                snap.sleep_duration,
                state_cell(snap.state),
                last
            );
        }
    }
}

/// Center and colorize the state column. The padding happens before the
/// color codes are added so the escape sequences cannot skew the width.
fn state_cell(state: UploadState) -> ColoredString {
    let cell = format!("{:^13}", state.as_str());
    let cell = cell.as_str();
    match state {
        UploadState::Success => cell.green(),
        UploadState::MqttError
        | UploadState::SyncingError
        | UploadState::CompileError
        | UploadState::TransmitError
        | UploadState::Error => cell.red(),
        UploadState::Cancelled => cell.yellow(),
        UploadState::Starting
        | UploadState::Compiling
        | UploadState::Syncing
        | UploadState::Uploading => cell.cyan(),
        UploadState::End | UploadState::None => cell.normal(),
    }
}

fn print_history(name: &str, history: &[HistoryEntry]) {
    println!("History of {} device:", name);
    println!("-------------------------------------");
    if history.is_empty() {
        println!("              Empty");
    } else {
        for (when, state) in history {
            println!("{} - {}", when.format(TIME_FORMAT), state);
        }
    }
    println!("-------------------------------------");
    println!("End History");
}
