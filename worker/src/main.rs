//! otawake-worker - Entry Point
//!
//! One invocation performs one OTA attempt for one deep-sleep device and
//! exits 0 on success, 2 when the device never woke up in time, 1 on any
//! other failure. The trailing `s` argument selects supervised mode, in
//! which stdout carries the status-line protocol.

use std::path::PathBuf;

use tracing::error;

use otawake_shared::logs::{init_logging, LogOptions};
use otawake_shared::settings::Settings;
use otawake_worker::engine::Engine;

const USAGE: &str = "Usage: otawake-worker [--config=<file>] <device> <max wait seconds> [s]";

#[derive(Debug, PartialEq, Eq)]
struct Args {
    device: String,
    max_wait_secs: u64,
    supervised: bool,
    config: Option<PathBuf>,
}

fn parse_args<I>(args: I) -> Result<Args, String>
where
    I: IntoIterator<Item = String>,
{
    let mut config = None;
    let mut positional = Vec::new();

    for arg in args {
        if let Some(value) = arg.strip_prefix("--config=") {
            config = Some(PathBuf::from(value));
        } else if arg.starts_with("--") {
            return Err(format!("Unknown option: {}", arg));
        } else {
            positional.push(arg);
        }
    }

    if positional.len() < 2 || positional.len() > 3 {
        return Err("Expected <device> <max wait seconds> [s]".to_string());
    }

    let supervised = match positional.get(2).map(String::as_str) {
        None => false,
        Some("s") => true,
        Some(other) => return Err(format!("Unknown flag: {}", other)),
    };

    let max_wait_secs = positional[1]
        .parse::<u64>()
        .map_err(|_| format!("Invalid wait duration: {}", positional[1]))?;

    Ok(Args {
        device: positional.swap_remove(0),
        max_wait_secs,
        supervised,
        config,
    })
}

#[tokio::main]
async fn main() {
    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}\n{}", e, USAGE);
            std::process::exit(1);
        }
    };

    let settings = match Settings::load_or_default(args.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = init_logging(LogOptions {
        log_level: settings.log_level.clone(),
    }) {
        eprintln!("{}", e);
    }

    let engine = match Engine::new(args.device, args.max_wait_secs, args.supervised, settings) {
        Ok(engine) => engine,
        Err(e) => {
            error!("Unable to start: {}", e);
            std::process::exit(1);
        }
    };

    let outcome = engine.run().await;
    std::process::exit(outcome.exit_code());
}
