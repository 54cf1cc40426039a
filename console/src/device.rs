//! Per-device record and attempt history.

use chrono::{DateTime, Local};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use otawake_shared::state::UploadState;

/// One history entry: when the device entered a state.
pub type HistoryEntry = (DateTime<Local>, UploadState);

/// An in-flight worker attached to a device.
pub struct ActiveTask {
    /// OS pid of the worker process
    pub pid: u32,

    /// Reader task draining the worker's status stream
    pub handle: JoinHandle<()>,
}

/// Mutable part of a device record, guarded by the record's mutex.
#[derive(Default)]
pub struct DeviceStatus {
    pub state: UploadState,
    pub last_success: Option<DateTime<Local>>,
    pub history: Vec<HistoryEntry>,
    pub active: Option<ActiveTask>,
}

impl DeviceStatus {
    /// Apply a state transition: every mutation appends one history entry,
    /// and entering `Success` stamps the last-success time.
    pub fn apply(&mut self, state: UploadState) {
        let now = Local::now();
        self.state = state;
        self.history.push((now, state));
        if state == UploadState::Success {
            self.last_success = Some(now);
        }
    }
}

/// One registered device. Name and sleep duration never change after
/// registry load; everything else lives behind the mutex.
pub struct Device {
    pub name: String,
    pub sleep_duration: u64,
    pub status: Mutex<DeviceStatus>,
}

/// Immutable copy of a device's visible state, for rendering.
#[derive(Debug, Clone)]
pub struct DeviceSnapshot {
    pub name: String,
    pub sleep_duration: u64,
    pub state: UploadState,
    pub last_success: Option<DateTime<Local>>,
}

impl Device {
    pub fn new(name: String, sleep_duration: u64) -> Self {
        Self {
            name,
            sleep_duration,
            status: Mutex::new(DeviceStatus::default()),
        }
    }

    pub async fn set_state(&self, state: UploadState) {
        self.status.lock().await.apply(state);
    }

    pub async fn snapshot(&self) -> DeviceSnapshot {
        let status = self.status.lock().await;
        DeviceSnapshot {
            name: self.name.clone(),
            sleep_duration: self.sleep_duration,
            state: status.state,
            last_success: status.last_success,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_new_device_has_no_history() {
        let device = Device::new("pond".to_string(), 600);
        let snap = device.snapshot().await;
        assert_eq!(snap.state, UploadState::None);
        assert!(snap.last_success.is_none());
        assert!(device.status.lock().await.history.is_empty());
    }

    #[tokio::test]
    async fn test_history_is_append_only_and_ordered() {
        let device = Device::new("pond".to_string(), 600);
        device.set_state(UploadState::Starting).await;
        device.set_state(UploadState::Compiling).await;
        device.set_state(UploadState::CompileError).await;

        let status = device.status.lock().await;
        let states: Vec<_> = status.history.iter().map(|(_, s)| *s).collect();
        assert_eq!(
            states,
            vec![
                UploadState::Starting,
                UploadState::Compiling,
                UploadState::CompileError
            ]
        );
        assert!(status
            .history
            .windows(2)
            .all(|pair| pair[0].0 <= pair[1].0));
    }

    #[tokio::test]
    async fn test_last_success_set_only_on_success() {
        let device = Device::new("pond".to_string(), 600);
        device.set_state(UploadState::Starting).await;
        assert!(device.snapshot().await.last_success.is_none());

        device.set_state(UploadState::Success).await;
        assert!(device.snapshot().await.last_success.is_some());
    }

    #[tokio::test]
    async fn test_clearing_history_keeps_state() {
        let device = Device::new("pond".to_string(), 600);
        device.set_state(UploadState::Success).await;

        let mut status = device.status.lock().await;
        status.history.clear();
        assert_eq!(status.state, UploadState::Success);
        assert!(status.last_success.is_some());
    }
}
