//! External build and upload tool invocation.
//!
//! Both tools run with the device-config directory as working directory and
//! their combined output redirected to the device's log file: compile
//! truncates the file, upload appends to it.

use std::fs::{File, OpenOptions};
use std::process::Stdio;

use tokio::process::Command;
use tracing::info;

use otawake_shared::settings::Settings;

use crate::errors::WorkerError;

fn open_log(settings: &Settings, device: &str, append: bool) -> std::io::Result<File> {
    let path = settings.tool_log_file(device);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new()
        .create(true)
        .write(true)
        .append(append)
        .truncate(!append)
        .open(&path)
}

/// Run `<tool> compile <device>.yaml`.
pub async fn compile(settings: &Settings, device: &str) -> Result<(), WorkerError> {
    let log = open_log(settings, device, false)
        .map_err(|e| WorkerError::Compile(format!("Unable to open log file: {}", e)))?;

    let status = Command::new(&settings.esphome_bin)
        .arg("compile")
        .arg(settings.device_config(device))
        .current_dir(&settings.esphome_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::from(log.try_clone().map_err(WorkerError::Io)?))
        .stderr(Stdio::from(log))
        .status()
        .await
        .map_err(|e| WorkerError::Compile(format!("Unable to run {}: {}", settings.esphome_bin, e)))?;

    info!("Compilation result: {}", status);
    if !status.success() {
        return Err(WorkerError::Compile(status.to_string()));
    }
    Ok(())
}

/// Run `<tool> upload <device>.yaml --device <device>.<domain>`.
pub async fn upload(settings: &Settings, device: &str) -> Result<(), WorkerError> {
    let log = open_log(settings, device, true)
        .map_err(|e| WorkerError::Transmit(format!("Unable to open log file: {}", e)))?;

    let status = Command::new(&settings.esphome_bin)
        .arg("upload")
        .arg(settings.device_config(device))
        .arg("--device")
        .arg(settings.device_address(device))
        .current_dir(&settings.esphome_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::from(log.try_clone().map_err(WorkerError::Io)?))
        .stderr(Stdio::from(log))
        .status()
        .await
        .map_err(|e| WorkerError::Transmit(format!("Unable to run {}: {}", settings.esphome_bin, e)))?;

    info!("Transmission result: {}", status);
    if !status.success() {
        return Err(WorkerError::Transmit(status.to_string()));
    }
    Ok(())
}
