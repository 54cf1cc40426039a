//! The wake/compile/transmit pipeline for one device.
//!
//! Sequential with early exit: compile, connect, clear the request topic,
//! publish the wake intent, wait for READY, transmit. Once the intent is
//! out, the release sequence runs no matter how the rest of the attempt
//! ends, so the device is always allowed back into its sleep cycle.

use std::time::Duration;

use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::time::{sleep, Instant};
use tracing::{error, info, warn};

use otawake_shared::settings::Settings;
use otawake_shared::state::UploadState;
use otawake_shared::topics::{WAKE_OFF, WAKE_ON};

use crate::errors::WorkerError;
use crate::link::{OtaLink, WakeWait};
use crate::report::Reporter;
use crate::tools;

/// Margin applied to the device's sleep duration for the wake deadline.
const WAKE_MARGIN: f64 = 1.1;

/// Settle delay after each wake-release publish.
const RELEASE_DELAY: Duration = Duration::from_secs(5);

/// Final result of one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    MqttError,
    CompileError,
    TransmitError,
    Timeout,
    Cancelled,
}

impl Outcome {
    /// Terminal state reported for this outcome.
    pub fn final_state(&self) -> UploadState {
        match self {
            Outcome::Success => UploadState::Success,
            Outcome::MqttError => UploadState::MqttError,
            Outcome::CompileError => UploadState::CompileError,
            Outcome::TransmitError => UploadState::TransmitError,
            Outcome::Timeout => UploadState::SyncingError,
            Outcome::Cancelled => UploadState::Cancelled,
        }
    }

    /// Process exit code: 0 success, 2 wake timeout, 1 anything else.
    ///
    /// The timeout code is distinct because an unreachable device is an
    /// expected outcome for deep-sleep hardware, not a defect.
    pub fn exit_code(&self) -> i32 {
        match self {
            Outcome::Success => 0,
            Outcome::Timeout => 2,
            _ => 1,
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            Outcome::Success => "Completed",
            Outcome::MqttError => "Unable to talk to the MQTT broker",
            Outcome::CompileError => "Build failed",
            Outcome::TransmitError => "Transmission failed",
            Outcome::Timeout => "Waiting time exhausted",
            Outcome::Cancelled => "Cancelled",
        }
    }
}

/// One OTA attempt for one device.
pub struct Engine {
    device: String,
    max_wait_secs: u64,
    settings: Settings,
    reporter: Reporter,
    cancel: Signal,
}

impl Engine {
    /// Build an engine and install the cancellation handler.
    ///
    /// SIGINT is registered here so it never kills the process outright,
    /// but the signal is only ever consumed inside the wake wait: a stop
    /// arriving during compile or transmit lets that step finish.
    pub fn new(
        device: String,
        max_wait_secs: u64,
        supervised: bool,
        settings: Settings,
    ) -> Result<Self, WorkerError> {
        let cancel = signal(SignalKind::interrupt())?;
        let reporter = Reporter::new(device.as_str(), supervised);
        Ok(Self {
            device,
            max_wait_secs,
            settings,
            reporter,
            cancel,
        })
    }

    /// Run the attempt to completion, wake release included, and return
    /// the final outcome.
    pub async fn run(mut self) -> Outcome {
        info!(
            "About to send new binary code to {} with a {}s max wait time",
            self.device, self.max_wait_secs
        );

        let outcome = self.attempt().await;

        self.reporter.enter(outcome.final_state());
        info!("End result: {}", outcome.describe());
        self.reporter.enter(UploadState::End);
        info!("End of job");
        outcome
    }

    async fn attempt(&mut self) -> Outcome {
        self.reporter.enter(UploadState::Compiling);
        info!("Compiling new code for {}", self.device);
        if let Err(e) = tools::compile(&self.settings, &self.device).await {
            error!("{}", e);
            return Outcome::CompileError;
        }

        let mut link = match OtaLink::connect(
            &self.settings.mqtt,
            &self.settings.topic_prefix,
            &self.device,
        )
        .await
        {
            Ok(link) => link,
            Err(e) => {
                error!("{}", e);
                return Outcome::MqttError;
            }
        };

        if let Err(e) = link.clear_request().await {
            error!("{}", e);
            return Outcome::MqttError;
        }
        if let Err(e) = link.publish_request(WAKE_ON).await {
            error!("{}", e);
            return Outcome::MqttError;
        }

        // The wake intent is out: the device now holds off sleep until it
        // sees OFF, so the release below must run on every path.
        let outcome = self.synced_attempt(&mut link).await;
        self.release(&mut link).await;
        link.disconnect().await;
        outcome
    }

    /// The guarded section: wake wait, then transmit. Cancellation is
    /// honored only while waiting for READY.
    async fn synced_attempt(&mut self, link: &mut OtaLink) -> Outcome {
        self.reporter.enter(UploadState::Syncing);
        let wait = Duration::from_secs_f64(self.max_wait_secs as f64 * WAKE_MARGIN);
        let deadline = Instant::now() + wait;
        info!(
            "Waiting up to {}s for {} to be ready to receive new code",
            wait.as_secs(),
            self.device
        );

        let wake = tokio::select! {
            biased;
            _ = self.cancel.recv() => {
                warn!("Cancelled while waiting for {}", self.device);
                return Outcome::Cancelled;
            }
            wake = link.await_ready(deadline) => wake,
        };

        match wake {
            WakeWait::Ready => {}
            WakeWait::TimedOut => {
                error!("Waiting time exhausted");
                return Outcome::Timeout;
            }
            WakeWait::ConnectionLost => return Outcome::MqttError,
        }

        self.reporter.enter(UploadState::Uploading);
        info!("Transmitting new code to {}", self.device);
        match tools::upload(&self.settings, &self.device).await {
            Ok(()) => Outcome::Success,
            Err(e) => {
                error!("{}", e);
                Outcome::TransmitError
            }
        }
    }

    /// Release the device back to its sleep cycle: OFF, settle, clear,
    /// settle. Failures are logged but never override the outcome.
    async fn release(&mut self, link: &mut OtaLink) {
        if let Err(e) = link.publish_request(WAKE_OFF).await {
            warn!("Wake release failed: {}", e);
        }
        sleep(RELEASE_DELAY).await;
        if let Err(e) = link.clear_request().await {
            warn!("Request topic clear failed: {}", e);
        }
        sleep(RELEASE_DELAY).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_states() {
        assert_eq!(Outcome::Success.final_state(), UploadState::Success);
        assert_eq!(Outcome::Timeout.final_state(), UploadState::SyncingError);
        assert_eq!(Outcome::Cancelled.final_state(), UploadState::Cancelled);
        assert_eq!(Outcome::CompileError.final_state(), UploadState::CompileError);
        assert_eq!(Outcome::TransmitError.final_state(), UploadState::TransmitError);
        assert_eq!(Outcome::MqttError.final_state(), UploadState::MqttError);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(Outcome::Success.exit_code(), 0);
        assert_eq!(Outcome::Timeout.exit_code(), 2);
        assert_eq!(Outcome::Cancelled.exit_code(), 1);
        assert_eq!(Outcome::CompileError.exit_code(), 1);
        assert_eq!(Outcome::MqttError.exit_code(), 1);
    }

    #[tokio::test]
    async fn test_compile_failure_ends_the_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            esphome_dir: dir.path().to_path_buf(),
            log_dir: dir.path().join("logs"),
            esphome_bin: "/nonexistent/esphome".to_string(),
            ..Default::default()
        };

        let engine = Engine::new("bench-probe".to_string(), 30, false, settings).unwrap();
        let outcome = engine.run().await;
        assert_eq!(outcome, Outcome::CompileError);
        assert_eq!(outcome.exit_code(), 1);
    }
}
