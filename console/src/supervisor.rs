//! Task supervisor: concurrent per-device worker lifecycles.
//!
//! The supervisor owns the device table built from the registry and runs
//! one detached worker process per in-flight device, draining each worker's
//! status stream on its own task. Devices never serialize each other: the
//! table itself is immutable after load and every record carries its own
//! lock.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, info, warn};

use otawake_shared::settings::Settings;
use otawake_shared::state::UploadState;
use otawake_shared::status::StatusLine;

use crate::device::{ActiveTask, Device, DeviceSnapshot, HistoryEntry};
use crate::errors::ConsoleError;

/// Grace between the cancellation signal and the hard kill; generously
/// covers the worker's wake-release sequence.
const KILL_GRACE: Duration = Duration::from_secs(30);

pub struct Supervisor {
    settings: Arc<Settings>,
    config_path: Option<PathBuf>,
    devices: BTreeMap<String, Arc<Device>>,
}

impl Supervisor {
    /// Build the device table from a registry scan result.
    ///
    /// `config_path` is forwarded to every spawned worker so both
    /// processes read the same settings file.
    pub fn new(
        settings: Settings,
        config_path: Option<PathBuf>,
        table: BTreeMap<String, u64>,
    ) -> Self {
        let devices = table
            .into_iter()
            .map(|(name, duration)| (name.clone(), Arc::new(Device::new(name, duration))))
            .collect();
        Self {
            settings: Arc::new(settings),
            config_path,
            devices,
        }
    }

    /// Registered device names, in listing order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.devices.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Start an OTA attempt for a device.
    ///
    /// Refused while a previous attempt is still running; the refusal is
    /// reported to the caller and changes nothing.
    pub async fn start(&self, name: &str) -> Result<(), ConsoleError> {
        let device = self.device(name)?;
        let mut status = device.status.lock().await;
        if status.active.is_some() {
            return Err(ConsoleError::TaskActive(name.to_string()));
        }

        status.apply(UploadState::Starting);

        let mut command = Command::new(self.worker_bin());
        if let Some(ref config) = self.config_path {
            command.arg(format!("--config={}", config.display()));
        }
        command
            .arg(&device.name)
            .arg(device.sleep_duration.to_string())
            .arg("s")
            .stdin(Stdio::null())
            .stdout(Stdio::piped());

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                status.apply(UploadState::Error);
                return Err(ConsoleError::Io(e));
            }
        };

        let pid = child.id().unwrap_or_default();
        let Some(stdout) = child.stdout.take() else {
            status.apply(UploadState::Error);
            let _ = child.start_kill();
            return Err(ConsoleError::Registry("Worker stdout was not captured".to_string()));
        };

        let handle = tokio::spawn(read_status_stream(device.clone(), child, stdout));
        status.active = Some(ActiveTask { pid, handle });
        info!("Started upload task for {} (pid {})", name, pid);
        Ok(())
    }

    /// Request cancellation of a device's attempt.
    ///
    /// Honored only while the worker is blocked in the wake wait; any
    /// other state is refused immediately because the compile and
    /// transmit subprocess boundaries are not safely interruptible.
    pub async fn stop(&self, name: &str) -> Result<(), ConsoleError> {
        let device = self.device(name)?;
        let status = device.status.lock().await;
        let Some(active) = status.active.as_ref() else {
            return Err(ConsoleError::NoTask(name.to_string()));
        };
        if status.state != UploadState::Syncing {
            return Err(ConsoleError::NotStoppable(name.to_string()));
        }

        let pid = active.pid;
        send_signal(pid, libc::SIGINT);
        info!("Cancellation requested for {} (pid {})", name, pid);

        // Last resort for a worker that never honors the cancel. A state
        // that moved past the wait means the stop lost the race; that
        // attempt is left to finish normally.
        let watched = device.clone();
        tokio::spawn(async move {
            tokio::time::sleep(KILL_GRACE).await;
            let status = watched.status.lock().await;
            let same_task = status.active.as_ref().map(|task| task.pid) == Some(pid);
            if same_task
                && matches!(
                    status.state,
                    UploadState::Syncing | UploadState::Cancelled
                )
            {
                warn!("[{}] Worker ignored cancellation, killing pid {}", watched.name, pid);
                send_signal(pid, libc::SIGKILL);
            }
        });

        Ok(())
    }

    /// Cancel every active attempt and wait for each worker to reach its
    /// end, wake release included. Workers past the wake wait are left to
    /// finish their pipeline.
    pub async fn shutdown(&self) {
        let mut handles = Vec::new();
        for device in self.devices.values() {
            let mut status = device.status.lock().await;
            if let Some(active) = status.active.take() {
                if status.state == UploadState::Syncing {
                    info!("Cancelling upload task for {}", device.name);
                    send_signal(active.pid, libc::SIGINT);
                } else {
                    info!("Waiting for the {} upload task to finish", device.name);
                }
                handles.push(active.handle);
            }
        }

        for handle in handles {
            let _ = handle.await;
        }
    }

    pub async fn snapshots(&self) -> Vec<DeviceSnapshot> {
        let mut snapshots = Vec::with_capacity(self.devices.len());
        for device in self.devices.values() {
            snapshots.push(device.snapshot().await);
        }
        snapshots
    }

    pub async fn snapshot(&self, name: &str) -> Result<DeviceSnapshot, ConsoleError> {
        Ok(self.device(name)?.snapshot().await)
    }

    pub async fn history(&self, name: &str) -> Result<Vec<HistoryEntry>, ConsoleError> {
        let device = self.device(name)?;
        let status = device.status.lock().await;
        Ok(status.history.clone())
    }

    /// Empty a device's history; current state and last-success stamp are
    /// untouched.
    pub async fn clear_history(&self, name: &str) -> Result<(), ConsoleError> {
        let device = self.device(name)?;
        device.status.lock().await.history.clear();
        Ok(())
    }

    fn device(&self, name: &str) -> Result<&Arc<Device>, ConsoleError> {
        self.devices
            .get(name)
            .ok_or_else(|| ConsoleError::UnknownDevice(name.to_string()))
    }

    /// Worker executable: the configured path, or the binary sitting next
    /// to the console's own executable.
    fn worker_bin(&self) -> PathBuf {
        if let Some(ref bin) = self.settings.worker_bin {
            return bin.clone();
        }
        std::env::current_exe()
            .map(|exe| exe.with_file_name("otawake-worker"))
            .unwrap_or_else(|_| PathBuf::from("otawake-worker"))
    }
}

/// Drain one worker's status stream until it closes, then reap the
/// process and release the device's active-task slot.
///
/// A malformed or foreign line degrades this device's view to `Error` but
/// never stops the loop; lines apply strictly in emission order.
async fn read_status_stream(device: Arc<Device>, mut child: Child, stdout: ChildStdout) {
    let mut lines = BufReader::new(stdout).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                debug!("[{}] --> {}", device.name, line);
                match StatusLine::parse(&line) {
                    Ok(status) if status.device == device.name => {
                        device.set_state(status.state).await;
                    }
                    Ok(status) => {
                        warn!(
                            "[{}] Status line for foreign device {:?}",
                            device.name, status.device
                        );
                        device.set_state(UploadState::Error).await;
                    }
                    Err(e) => {
                        warn!("[{}] {}", device.name, e);
                        device.set_state(UploadState::Error).await;
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!("[{}] Status stream error: {}", device.name, e);
                break;
            }
        }
    }

    match child.wait().await {
        Ok(exit) => info!("[{}] Worker finished: {}", device.name, exit),
        Err(e) => warn!("[{}] Unable to reap worker: {}", device.name, e),
    }

    let mut status = device.status.lock().await;
    if !status.state.is_terminal() {
        // The stream closed without a terminal report: the worker died.
        status.apply(UploadState::Error);
    }
    status.active = None;
}

fn send_signal(pid: u32, signal: i32) {
    unsafe {
        libc::kill(pid as libc::pid_t, signal);
    }
}
