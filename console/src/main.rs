//! otawake - Entry Point
//!
//! Interactive console driving concurrent OTA updates for deep-sleep
//! devices. Loads the device registry once at startup, then maps operator
//! commands onto the task supervisor until `exit`, which cancels or waits
//! out every in-flight attempt before leaving.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

use otawake::commands;
use otawake::registry;
use otawake::supervisor::Supervisor;
use otawake_shared::logs::{init_logging, LogOptions};
use otawake_shared::settings::Settings;

const USAGE: &str = "Usage: otawake [--config=<file>]";

#[tokio::main]
async fn main() {
    let mut config: Option<PathBuf> = None;
    for arg in std::env::args().skip(1) {
        if let Some(value) = arg.strip_prefix("--config=") {
            config = Some(PathBuf::from(value));
        } else {
            eprintln!("Unknown option: {}\n{}", arg, USAGE);
            std::process::exit(1);
        }
    }

    let settings = match Settings::load_or_default(config.as_deref()) {
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

    // A failed scan leaves the table empty, never partial.
    let table = match registry::scan(&settings) {
        Ok(table) => table,
        Err(e) => {
            error!("Device scan failed: {}", e);
            BTreeMap::new()
        }
    };
    info!("{} deep-sleep device(s) found", table.len());

    let supervisor = Supervisor::new(settings, config, table);
    if supervisor.is_empty() {
        println!("No deep-sleep devices found. Type help for the command list.");
    }

    interact(&supervisor).await;

    supervisor.shutdown().await;
}

async fn interact(supervisor: &Supervisor) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt();
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if !commands::dispatch(supervisor, commands::parse(&line)).await {
                        break;
                    }
                }
                Ok(None) => {
                    println!();
                    break;
                }
                Err(e) => {
                    error!("Input error: {}", e);
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupt received, shutting down...");
                println!();
                break;
            }
        }
    }
}

fn prompt() {
    let mut stdout = std::io::stdout().lock();
    let _ = write!(stdout, "> ");
    let _ = stdout.flush();
}
